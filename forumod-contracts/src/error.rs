//! Errors surfaced across the trait seams in this crate.
//!
//! Concrete implementations (in `forumod-core`) wrap their own richer error
//! types into this one at the trait boundary; callers that only hold a
//! `dyn ModeratorClient`/`dyn ModeratorOperation` only ever see this enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    /// The moderator client has no usable session (missing or rejected
    /// `(bduss, stoken)` credentials).
    #[error("moderator client is not authenticated")]
    InvalidClient,

    /// The upstream moderator API call failed; `reason` is the platform's
    /// own error text or an HTTP status description.
    #[error("moderator API call failed: {reason}")]
    OperationFailed { reason: String },

    /// An operation declared `_need_bawu` but no moderator client was
    /// supplied in the execution context.
    #[error("operation requires an authenticated moderator session")]
    MissingAuth,
}
