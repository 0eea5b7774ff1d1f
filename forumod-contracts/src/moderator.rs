//! The moderator-API client seam (C4) and the operation contract (C2/C7)
//! that calls through it.
//!
//! Keeping both behind traits lets the rule registry build and test
//! `delete`/`block`/`author_delete`/custom operation templates against a
//! fake client, independent of the concrete `reqwest`-backed client that
//! `forumod-core` constructs at startup.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::content_like::ContentLike;
use crate::error::ContractError;
use forumod_model::ids::Tid;

/// Authentication lifecycle of a moderator client, per §4.8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    /// Constructed without both `bduss` and `stoken`.
    MissingCookie,
    /// `get_self_info` returned a non-zero `user_id`.
    Success,
    /// `get_self_info` failed or returned `user_id == 0`; carries the
    /// upstream-reported or locally-detected reason.
    Failed(String),
}

impl ClientStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ClientStatus::Success)
    }
}

/// The subset of the moderator API that operation templates call.
///
/// `forumod-core` implements this once over its cookie-authenticated
/// `reqwest::Client`; tests implement it over an in-memory fake.
#[async_trait]
pub trait ModeratorClient: Send + Sync {
    fn status(&self) -> ClientStatus;

    /// Deletes `content`: a thread deletion if `content.kind() ==
    /// ContentKind::Thread`, otherwise a post/comment deletion within its
    /// thread. Returns `Ok(true)` only on a success-indicating response.
    async fn delete(&self, content: &dyn ContentLike) -> Result<bool, ContractError>;

    /// Deletes the whole thread `tid` in `fname`, independent of which
    /// content variant triggered the call. Used by `delete_thread_if_author`
    /// (§4.6) to widen a reply deletion to a thread deletion once
    /// `is_thread_author` confirms the author is the thread's OP.
    async fn delete_thread(&self, fname: &str, tid: Tid) -> Result<bool, ContractError>;

    /// Blocks `content`'s author for `day` days with `reason`.
    async fn block(
        &self,
        content: &dyn ContentLike,
        day: u32,
        reason: &str,
    ) -> Result<bool, ContractError>;

    /// Resolves whether `content`'s author is the original poster of its
    /// own thread, consulted by `delete_thread_if_author` (§4.6). Backed
    /// by the "Tieba Info helper" lookup external to the core.
    async fn is_thread_author(&self, content: &dyn ContentLike) -> Result<bool, ContractError>;
}

/// Forum-level fallbacks an operation consults when its own options don't
/// override them (`block.day`/`block.reason` falling back to
/// `forum.block_day`/`forum.block_reason`, per §4.6).
#[derive(Debug, Clone, Copy)]
pub struct ForumDefaults<'a> {
    pub block_day: u32,
    pub block_reason: &'a str,
}

/// Everything an operation needs to run once a rule has decided to act.
pub struct OperationContext<'a> {
    pub content: &'a dyn ContentLike,
    pub client: &'a dyn ModeratorClient,
    pub forum: ForumDefaults<'a>,
    /// The opaque facts snapshotted by `store_data` at confirm-enqueue
    /// time (or empty, for operations that ran immediately).
    pub data: &'a Map<String, Value>,
}

impl<'a> OperationContext<'a> {
    /// Fails fast with [`ContractError::MissingAuth`] when `needs_bawu` is
    /// true and the client has no session, matching §4.6's "the attempt
    /// fails with a MissingAuth condition" short-circuit.
    pub fn require_auth(&self) -> Result<(), ContractError> {
        if self.client.status().is_authenticated() {
            Ok(())
        } else {
            Err(ContractError::MissingAuth)
        }
    }
}

/// A single registered operation kind (`delete`, `block`, `author_delete`,
/// or a plugin-supplied tag), per §4.4.
#[async_trait]
pub trait ModeratorOperation: Send + Sync + std::fmt::Debug {
    /// The registry tag this instance was constructed from.
    fn type_tag(&self) -> &'static str;

    /// Whether this operation runs immediately even under manual-confirm,
    /// before the rest of the group is queued (§4.6).
    fn direct(&self) -> bool {
        false
    }

    /// Whether executing this operation requires an authenticated
    /// moderator session at all (an `ignore`-shaped custom operation may
    /// not).
    fn needs_bawu(&self) -> bool {
        true
    }

    /// Pre-computes facts into the opaque `data` map at confirm-enqueue
    /// time, so `execute` later needs no re-derivation. The default is a
    /// no-op for operations with nothing to snapshot.
    async fn store_data(
        &self,
        _content: &dyn ContentLike,
        _data: &mut Map<String, Value>,
    ) -> Result<(), ContractError> {
        Ok(())
    }

    /// Runs the operation against `ctx`.
    async fn execute(&self, ctx: &OperationContext<'_>) -> Result<(), ContractError>;
}
