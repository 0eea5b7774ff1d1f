//! The forum-platform user who authored a piece of content (§3).

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// `user_name` may be absent on the platform (some accounts only have a
/// `nick_name`); `portrait` is an opaque avatar handle passed back to
/// `hash2image`/`get_portrait` verbatim. `level` is per-forum, so this
/// struct carries whatever level was attached to the content sighting,
/// not a single global value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub nick_name: String,
    pub portrait: String,
    pub level: u32,
}

impl User {
    /// The name shown to rules/operators: `user_name` if present, else
    /// `nick_name`.
    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.nick_name)
    }
}
