//! The pending-confirmation entry (§3 `ConfirmData`) queued by a
//! manual-confirm rule and later drained by `operate_confirm` (§4.6).

use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value;

use crate::content::Content;
use crate::rule::OperationDescriptor;

/// Snapshotted at enqueue time so that acting later requires no
/// re-derivation (§3). `data` keys are operation-specific strings (e.g.
/// `"is_thread_author"`), populated by each operation's `store_data` hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmData {
    pub content: Content,
    #[serde(default)]
    pub data: JsonMap<String, Value>,
    /// The non-direct remainder of the matched rule's operation group,
    /// already expanded to descriptor form.
    pub operations: Vec<OperationDescriptor>,
    pub process_time: i64,
    pub rule_name: String,
}
