//! Data model shared across the forum moderation engine's crates (§3).
//!
//! Every type here is plain data: no I/O, no registry dispatch (that
//! lives behind traits in `forumod-contracts` and is implemented in
//! `forumod-core`). `sqlx::FromRow` derives are gated behind the `sqlx`
//! feature so that a pure rule-authoring tool can depend on this crate
//! without pulling in a database driver.
#![allow(missing_docs)]

pub mod config;
pub mod confirm;
pub mod content;
pub mod error;
pub mod ids;
pub mod image;
pub mod prelude;
pub mod process;
pub mod rule;
pub mod user;

pub use config::{ForumConfig, ProcessConfig, UserConfig};
pub use confirm::ConfirmData;
pub use content::{
    Comment, Content, ContentCacheRecord, ContentKind, ContentKindColumn, Post, Thread,
    UpdateStatus,
};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{Fname, Pid, Tid, UserId};
pub use image::Image;
pub use process::{ProcessContext, ProcessLog, RuleContext, StepStatus};
pub use rule::{
    ConditionDescriptor, LogicExpr, LogicSpec, OperationDescriptor, OperationShorthand,
    OperationSpec, RuleConfig,
};
pub use user::User;
