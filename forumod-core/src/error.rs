//! The crawl-specific error taxonomy from `spec.md` §7.

use thiserror::Error;

use forumod_contracts::error::ContractError;
use forumod_model::ModelError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Network/5xx/rate-limit failure talking to an upstream forum
    /// endpoint. Logged at WARN; the current page/item step is skipped
    /// and the scan continues.
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// Malformed JSON or an unexpected schema shape from upstream. The
    /// raw payload is written to a diagnostics file by the caller; an
    /// empty result is substituted here.
    #[error("structural upstream error: {0}")]
    Structural(String),

    /// The underlying storage transaction failed. For the classifier,
    /// the caller drops the current content from the pass (cache state
    /// is left unchanged so the next pass re-observes it as a first
    /// sighting).
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A rule/condition/operation option failed validation; the
    /// offending item is excluded from its rule group at load time, not
    /// surfaced here except when loading is itself what failed.
    #[error("rule model error: {0}")]
    Model(#[from] ModelError),

    /// The moderator client had no usable session when a non-`ignore`
    /// operation was attempted.
    #[error("moderator client is not authenticated")]
    MissingAuth,

    /// `operate_confirm` was called with a pid not present in the
    /// confirmation store, or an unrecognized action.
    #[error("no pending confirmation for pid {0}")]
    ConfirmNotFound(u64),

    #[error("moderator API contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CoreError {
    /// Distinguishes a retryable crawl failure (network hiccup,
    /// temporary upstream 5xx/429) from one that should abort the
    /// current pass entirely.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_) | CoreError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
