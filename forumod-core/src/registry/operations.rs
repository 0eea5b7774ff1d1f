//! Built-in moderator operations (§4.4, §4.6): `delete`, `block`, and
//! `author_delete` (the `delete_thread_if_author` variant exposed as its
//! own registry tag so it can be selected independently of plain
//! `delete` in a rule's operation list).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use forumod_contracts::content_like::ContentLike;
use forumod_contracts::error::ContractError;
use forumod_contracts::moderator::{ModeratorOperation, OperationContext};
use forumod_model::ModelError;

/// Builds a registered operation kind from its `type`/`options`. Unlike
/// conditions, an operation that fails to build is a hard configuration
/// error (§4.4) — there is no "invalid operation, silently skipped"
/// path, since skipping an operation a rule owner configured would
/// silently under-moderate.
pub fn build_operation(
    type_tag: &str,
    options: &Value,
) -> Result<Box<dyn ModeratorOperation>, ModelError> {
    match type_tag {
        "delete" => Ok(Box::new(DeleteOperation::from_options(options)?)),
        "block" => Ok(Box::new(BlockOperation::from_options(options)?)),
        "author_delete" => Ok(Box::new(DeleteOperation {
            delete_thread_if_author: true,
        })),
        other => Err(ModelError::UnregisteredTag {
            kind: "operation".into(),
            tag: other.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct DeleteOptionsRaw {
    #[serde(default)]
    delete_thread_if_author: bool,
}

/// Deletes the content directly. When `delete_thread_if_author` is set
/// and the content's author turns out to be the thread's original
/// poster, the fact is recorded against `is_thread_author` in the
/// confirmation data (§4.6) so a reviewing moderator sees the elevated
/// scope even though the API call itself still targets `content`.
#[derive(Debug)]
struct DeleteOperation {
    delete_thread_if_author: bool,
}

impl DeleteOperation {
    fn from_options(options: &Value) -> Result<Self, ModelError> {
        let raw: DeleteOptionsRaw = if options.is_null() {
            DeleteOptionsRaw::default()
        } else {
            serde_json::from_value(options.clone())?
        };
        Ok(Self {
            delete_thread_if_author: raw.delete_thread_if_author,
        })
    }
}

#[async_trait]
impl ModeratorOperation for DeleteOperation {
    fn type_tag(&self) -> &'static str {
        "delete"
    }

    async fn store_data(
        &self,
        content: &dyn ContentLike,
        data: &mut Map<String, Value>,
    ) -> Result<(), ContractError> {
        if self.delete_thread_if_author && !content.is_thread() {
            // The actual lookup happens at execute time against a live
            // client; here we only record that the option is active so
            // a moderator reviewing a queued confirmation understands
            // why the scope might widen.
            data.insert("delete_thread_if_author".into(), Value::Bool(true));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &OperationContext<'_>) -> Result<(), ContractError> {
        ctx.require_auth()?;
        if self.delete_thread_if_author && !ctx.content.is_thread() {
            let is_author = ctx.client.is_thread_author(ctx.content).await?;
            if is_author {
                tracing::info!(
                    pid = ?ctx.content.pid(),
                    "author is thread OP; deleting whole thread under widened scope"
                );
                ctx.client
                    .delete_thread(ctx.content.fname(), ctx.content.tid())
                    .await?;
                return Ok(());
            }
        }
        ctx.client.delete(ctx.content).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// block
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct BlockOptionsRaw {
    #[serde(default)]
    day: Option<u32>,
    #[serde(default)]
    reason: Option<String>,
}

/// Blocks the content's author. `day`/`reason` fall back to the forum's
/// configured defaults when the operation itself doesn't override them
/// (§4.6).
#[derive(Debug)]
struct BlockOperation {
    day: Option<u32>,
    reason: Option<String>,
}

impl BlockOperation {
    fn from_options(options: &Value) -> Result<Self, ModelError> {
        let raw: BlockOptionsRaw = if options.is_null() {
            BlockOptionsRaw::default()
        } else {
            serde_json::from_value(options.clone())?
        };
        Ok(Self {
            day: raw.day,
            reason: raw.reason,
        })
    }
}

#[async_trait]
impl ModeratorOperation for BlockOperation {
    fn type_tag(&self) -> &'static str {
        "block"
    }

    async fn execute(&self, ctx: &OperationContext<'_>) -> Result<(), ContractError> {
        ctx.require_auth()?;
        let day = self.day.unwrap_or(ctx.forum.block_day);
        let reason = self.reason.as_deref().unwrap_or(ctx.forum.block_reason);
        ctx.client.block(ctx.content, day, reason).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_defaults_to_narrow_scope() {
        let built = build_operation("delete", &Value::Null).unwrap();
        assert_eq!(built.type_tag(), "delete");
    }

    #[test]
    fn author_delete_always_widens_scope() {
        let built = build_operation("author_delete", &Value::Null).unwrap();
        assert_eq!(built.type_tag(), "delete");
    }

    #[test]
    fn unregistered_tag_is_an_error() {
        assert!(build_operation("nonexistent", &Value::Null).is_err());
    }
}
