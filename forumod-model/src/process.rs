//! Audit rows written by the evaluator (C3) after every processed piece
//! of content (§4.5, `process_log`/`process_context` tables in §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{Pid, Tid, UserId};

/// One row per `(pid, user)`: which rule (if any) the content matched,
/// and whether the match was on the whitelist or blacklist side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProcessLog {
    pub pid: Pid,
    pub user: UserId,
    pub tid: Tid,
    pub create_time: i64,
    pub process_time: i64,
    pub result_rule: Option<String>,
    pub is_whitelist: Option<bool>,
}

/// One evaluated rule's contribution to a `ProcessContext` (§4.5): which
/// deduplicated condition-context indices it touched, and how it
/// resolved (strict short-circuit index, or a logic-expression
/// success/failure partition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleContext {
    pub rule_name: String,
    pub condition_indices: Vec<usize>,
    pub step_status: StepStatus,
}

/// The evaluator's per-rule outcome record (§4.5 `CheckResult.step_status`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepStatus {
    /// Evaluation was not performed (e.g. whitelist already matched, or
    /// the rule group was empty).
    NotEvaluated,
    /// Strict-AND short-circuited to false at this condition index.
    ShortCircuit { index: usize },
    /// A `logic` expression was evaluated; the success/failure partition
    /// of condition indices that were actually computed.
    Partition {
        successes: Vec<usize>,
        failures: Vec<usize>,
    },
    /// All conditions passed (strict-AND ran to completion) or the logic
    /// expression evaluated true using every condition it touched.
    Matched,
}

/// The deduplicated condition-context list plus per-rule summaries for
/// one `(pid, user)` (§4.5 "Context persistence", `process_context` table
/// in §6). `conditions` is indexed by each condition's `"type:key"`
/// identity; `RuleContext.condition_indices` points into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessContext {
    pub pid: Pid,
    pub user: UserId,
    pub rules: Vec<RuleContext>,
    /// Keyed by condition identity (`"type:key"`); value is whatever the
    /// condition's `get_value` computed, serialized for storage.
    pub conditions: Vec<(String, Value)>,
}
