//! Trait surfaces shared between the moderation engine's subsystems.
//!
//! These seams let `forumod-core`'s rule registry (C2), evaluator (C3), and
//! dispatcher (C7) talk about "a piece of content" and "a moderator action"
//! without depending on each other's concrete types.

pub mod content_like;
pub mod error;
pub mod moderator;

/// Frequently used trait combinators for downstream crates.
pub mod prelude {
    pub use super::content_like::{ContentKindLike, ContentLike, HasPid};
    pub use super::error::ContractError;
    pub use super::moderator::{ModeratorClient, ModeratorOperation, OperationContext};
}
