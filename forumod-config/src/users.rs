//! Loads the roster of per-user moderation configs (`forumod_model::UserConfig`)
//! that `forumod-server` wires one dispatcher worker per entry of (§3
//! "UserConfig", §9 "one application object created at startup").
//!
//! Distinct from [`crate::SystemConfig`]: this is the *owned* rule/forum
//! configuration each moderator account supplies, not process-wide tuning.

use std::path::Path;

use forumod_model::UserConfig;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Default)]
struct UsersDocument {
    #[serde(default, rename = "user")]
    users: Vec<UserConfig>,
}

/// Loads and parses a `[[user]] ...` TOML document into the roster of
/// configured moderator accounts.
pub struct UsersConfigLoader;

impl UsersConfigLoader {
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<UserConfig>, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Vec<UserConfig>, ConfigError> {
        let doc: UsersDocument = toml::from_str(raw)?;
        Ok(doc.users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_has_no_users() {
        let users = UsersConfigLoader::parse("").unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn parses_one_user_with_defaults() {
        let users = UsersConfigLoader::parse(
            r#"
            [[user]]
            username = "alice"

            [user.forum]
            fname = "rust"
            "#,
        )
        .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[0].forum.fname.as_str(), "rust");
        assert!(users[0].enable);
    }
}
