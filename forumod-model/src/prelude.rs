//! Convenience re-export of the types most call sites need; prefer this
//! over reaching into individual submodules.

pub use super::config::{ForumConfig, ProcessConfig, UserConfig};
pub use super::confirm::ConfirmData;
pub use super::content::{Comment, Content, ContentCacheRecord, ContentKind, Post, Thread, UpdateStatus};
pub use super::ids::{Fname, Pid, Tid, UserId};
pub use super::image::Image;
pub use super::process::{ProcessContext, ProcessLog, RuleContext, StepStatus};
pub use super::rule::{
    ConditionDescriptor, LogicExpr, LogicSpec, OperationDescriptor, OperationShorthand,
    OperationSpec, RuleConfig,
};
pub use super::user::User;
