//! Per-user configuration (§3 `UserConfig`): moderator credentials, which
//! content layers this user cares about, confirmation/process policy, and
//! the owned rule list.

use serde::{Deserialize, Serialize};

use crate::ids::Fname;
use crate::rule::RuleConfig;

/// The forum this user moderates and which content layers it wants
/// crawled (§4.2 `CrawlNeed`, §3 `UserConfig.forum`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    pub fname: Fname,
    /// Moderator session cookie credential. Absent means the client
    /// starts in `MissingCookie` (§4.8).
    #[serde(default)]
    pub bduss: Option<String>,
    #[serde(default)]
    pub stoken: Option<String>,
    #[serde(default = "default_block_day")]
    pub block_day: u32,
    #[serde(default)]
    pub block_reason: String,
    #[serde(default = "default_true")]
    pub thread: bool,
    #[serde(default = "default_true")]
    pub post: bool,
    #[serde(default = "default_true")]
    pub comment: bool,
}

fn default_block_day() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl ForumConfig {
    /// `true` when the layer `kind` names is enabled for this forum.
    pub fn wants(&self, kind: crate::content::ContentKind) -> bool {
        match kind {
            crate::content::ContentKind::Thread => self.thread,
            crate::content::ContentKind::Post => self.post,
            crate::content::ContentKind::Comment => self.comment,
        }
    }

    /// The `CrawlNeed`-shaped triple this forum contributes to the
    /// crawler orchestrator's aggregate (§4.3 `update_needs`).
    pub fn crawl_need(&self) -> (bool, bool, bool) {
        (self.thread, self.post, self.comment)
    }
}

/// Confirmation and batching policy (§3 `UserConfig.process`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// When true, every matched blacklist rule is treated as
    /// manual-confirm regardless of the rule's own flag (§4.6).
    #[serde(default)]
    pub mandatory_confirm: bool,
    /// Stop at the first matching blacklist rule instead of evaluating
    /// the whole group (§4.5).
    #[serde(default = "default_true")]
    pub fast_process: bool,
    /// TTL, in seconds, for entries in this user's confirmation store
    /// (§3, default 86,400).
    #[serde(default = "default_confirm_expire")]
    pub confirm_expire: i64,
    /// TTL, in seconds, for content cache validity consulted by
    /// condition templates that care about staleness.
    #[serde(default = "default_content_validate_expire")]
    pub content_validate_expire: i64,
    /// Record context for every rule evaluated, not just matches.
    #[serde(default)]
    pub record_all_context: bool,
}

fn default_confirm_expire() -> i64 {
    86_400
}

fn default_content_validate_expire() -> i64 {
    86_400
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            mandatory_confirm: false,
            fast_process: true,
            confirm_expire: default_confirm_expire(),
            content_validate_expire: default_content_validate_expire(),
            record_all_context: false,
        }
    }
}

/// A user account owning one forum's moderation rules (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    /// Present only while editing; never logged or echoed back by the
    /// core (the HTTP/auth surface that owns this field is out of scope
    /// per `spec.md` §1).
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub password_last_update: Option<i64>,
    pub forum: ForumConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub permission: String,
}

impl UserConfig {
    /// Whether this user currently contributes to the crawler's need
    /// aggregate: enabled, has a forum, and owns at least one rule
    /// (§4.3 `update_needs`).
    pub fn contributes_to_crawl(&self) -> bool {
        self.enable && !self.forum.fname.as_str().is_empty() && !self.rules.is_empty()
    }
}
