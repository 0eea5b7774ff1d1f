//! The per-user dispatcher (C7, §4.6): evaluates every piece of content
//! the orchestrator broadcasts against one user's compiled rules, runs
//! direct operations immediately, and queues the rest for confirmation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use forumod_contracts::content_like::ContentLike;
use forumod_contracts::error::ContractError;
use forumod_contracts::moderator::{ForumDefaults, ModeratorClient, OperationContext};
use forumod_model::config::{ForumConfig, UserConfig};
use forumod_model::ids::{Pid, UserId};
use forumod_model::{Content, ConfirmData};
use serde_json::Map;

use crate::confirm_store::ConfirmStore;
use crate::db::ProcessRepo;
use crate::error::{CoreError, Result};
use crate::evaluator::Processer;
use crate::registry::ConditionRegistry;

/// What to do with a pending `ConfirmData` entry (§4.6 `operate_confirm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Run the queued operations now.
    Execute,
    /// Discard the entry without acting.
    Ignore,
}

/// One user's compiled rule set plus the runtime state
/// (`ConfirmStore`, moderator client) needed to act on matches (§3
/// "one worker per enabled user").
pub struct UserDispatcher {
    user_id: UserId,
    forum: ForumConfig,
    user_enabled: bool,
    mandatory_confirm: bool,
    processer: Processer,
    client: Arc<dyn ModeratorClient>,
    confirm_store: Arc<ConfirmStore>,
    process_repo: Arc<ProcessRepo>,
}

impl UserDispatcher {
    pub fn compile(
        user: &UserConfig,
        user_id: UserId,
        registry: &ConditionRegistry,
        client: Arc<dyn ModeratorClient>,
        process_repo: Arc<ProcessRepo>,
        confirm_cache_root: PathBuf,
    ) -> Result<Self> {
        let processer = Processer::compile(user, registry)?;
        let ttl = Duration::from_secs(user.process.confirm_expire.max(0) as u64);
        Ok(Self {
            user_id,
            forum: user.forum.clone(),
            user_enabled: user.enable,
            mandatory_confirm: user.process.mandatory_confirm,
            processer,
            client,
            confirm_store: Arc::new(ConfirmStore::new(confirm_cache_root, ttl)),
            process_repo,
        })
    }

    pub fn confirm_store(&self) -> Arc<ConfirmStore> {
        self.confirm_store.clone()
    }

    /// Evaluates `content` and acts on a blacklist match per §4.6: direct
    /// operations (and every operation, when the rule isn't
    /// manual-confirm) run now; the non-direct remainder of a
    /// manual-confirm match is snapshotted into the confirm store.
    pub async fn handle(&self, content: &Content, now: i64) {
        if !self.processer.accepts(content, &self.forum, self.user_enabled) {
            return;
        }

        let (matched, log, ctx) = self
            .processer
            .process(content, self.client.as_ref(), self.user_id, now)
            .await;

        if let Err(err) = self.process_repo.upsert_log(&log).await {
            tracing::warn!(error = %err, pid = log.pid.0, "failed to persist process log");
        }
        if let Err(err) = self.process_repo.upsert_context(&ctx).await {
            tracing::warn!(error = %err, pid = ctx.pid.0, "failed to persist process context");
        }

        let Some(rule_idx) = matched else {
            return;
        };
        let rule = &self.processer.blacklist_rules[rule_idx];
        let manual = rule.manual_confirm || self.mandatory_confirm;
        let forum_defaults = ForumDefaults {
            block_day: self.forum.block_day,
            block_reason: &self.forum.block_reason,
        };

        let mut queued = Vec::new();
        let mut queued_data = Map::new();
        for ((op, direct), desc) in rule.operations.iter().zip(rule.op_descs.iter()) {
            if *direct || !manual {
                let op_ctx = OperationContext {
                    content,
                    client: self.client.as_ref(),
                    forum: forum_defaults,
                    data: &Map::new(),
                };
                match op.execute(&op_ctx).await {
                    Ok(()) => {}
                    Err(ContractError::MissingAuth) => {
                        tracing::warn!(rule = %rule.name, "operation skipped: missing auth");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, rule = %rule.name, "operation failed");
                    }
                }
            } else {
                if let Err(err) = op.store_data(content, &mut queued_data).await {
                    tracing::warn!(error = %err, "store_data failed, queuing without snapshot");
                }
                queued.push(desc.clone());
            }
        }

        if manual && !queued.is_empty() {
            self.confirm_store
                .set(
                    content.pid(),
                    ConfirmData {
                        content: content.clone(),
                        data: queued_data,
                        operations: queued,
                        process_time: now,
                        rule_name: rule.name.clone(),
                    },
                )
                .await;
        }
    }

    /// Acts on a previously queued confirmation (§4.6 `operate_confirm`).
    /// `Ignore` simply discards the entry; `Execute` fails closed with
    /// [`CoreError::MissingAuth`] *before* touching the store if the
    /// client has no session — an unauthenticated attempt must not
    /// consume the entry, since a later authenticated attempt still
    /// needs to be able to execute it successfully exactly once (§8
    /// property 6). Otherwise it rebuilds and runs every queued
    /// operation, then discards the entry regardless of per-operation
    /// outcome (a failed operation is logged, not retried).
    pub async fn operate_confirm(&self, pid: Pid, action: ConfirmAction) -> Result<bool> {
        if action == ConfirmAction::Execute && !self.client.status().is_authenticated() {
            return Err(CoreError::MissingAuth);
        }

        let Some(entry) = self.confirm_store.get(pid).await else {
            return Ok(false);
        };

        if action == ConfirmAction::Execute {
            let op_descs = entry.operations.clone();
            match crate::registry::build_operations(&op_descs) {
                Ok(built) => {
                    let forum_defaults = ForumDefaults {
                        block_day: self.forum.block_day,
                        block_reason: &self.forum.block_reason,
                    };
                    for (op, _direct) in built {
                        let op_ctx = OperationContext {
                            content: &entry.content,
                            client: self.client.as_ref(),
                            forum: forum_defaults,
                            data: &entry.data,
                        };
                        if let Err(err) = op.execute(&op_ctx).await {
                            tracing::warn!(error = %err, pid = pid.0, "confirmed operation failed");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, pid = pid.0, "failed to rebuild queued operations");
                }
            }
        }

        self.confirm_store.delete(pid).await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forumod_contracts::moderator::ClientStatus;
    use forumod_model::content::{Comment, Content as ContentEnum};
    use forumod_model::config::ProcessConfig;
    use forumod_model::ids::{Fname, Tid};
    use forumod_model::rule::{ConditionDescriptor, OperationShorthand, OperationSpec, RuleConfig};
    use forumod_model::user::User;

    struct FakeClient;

    #[async_trait]
    impl ModeratorClient for FakeClient {
        fn status(&self) -> ClientStatus {
            ClientStatus::Success
        }
        async fn delete(&self, _content: &dyn ContentLike) -> std::result::Result<bool, ContractError> {
            Ok(true)
        }
        async fn delete_thread(
            &self,
            _fname: &str,
            _tid: forumod_model::ids::Tid,
        ) -> std::result::Result<bool, ContractError> {
            Ok(true)
        }
        async fn block(
            &self,
            _content: &dyn ContentLike,
            _day: u32,
            _reason: &str,
        ) -> std::result::Result<bool, ContractError> {
            Ok(true)
        }
        async fn is_thread_author(
            &self,
            _content: &dyn ContentLike,
        ) -> std::result::Result<bool, ContractError> {
            Ok(false)
        }
    }

    struct UnauthClient;

    #[async_trait]
    impl ModeratorClient for UnauthClient {
        fn status(&self) -> ClientStatus {
            ClientStatus::MissingCookie
        }
        async fn delete(&self, _content: &dyn ContentLike) -> std::result::Result<bool, ContractError> {
            panic!("execute must fail closed before attempting any operation");
        }
        async fn delete_thread(
            &self,
            _fname: &str,
            _tid: forumod_model::ids::Tid,
        ) -> std::result::Result<bool, ContractError> {
            panic!("execute must fail closed before attempting any operation");
        }
        async fn block(
            &self,
            _content: &dyn ContentLike,
            _day: u32,
            _reason: &str,
        ) -> std::result::Result<bool, ContractError> {
            panic!("execute must fail closed before attempting any operation");
        }
        async fn is_thread_author(
            &self,
            _content: &dyn ContentLike,
        ) -> std::result::Result<bool, ContractError> {
            panic!("execute must fail closed before attempting any operation");
        }
    }

    fn sample_content() -> ContentEnum {
        ContentEnum::Comment(Comment {
            fname: Fname::from("f1"),
            tid: Tid(100),
            pid: Pid(101),
            title: "hi".into(),
            text: "spam link".into(),
            create_time: 1_700_000_000,
            floor: 2,
            user: User {
                user_id: forumod_model::ids::UserId(7),
                user_name: Some("bad".into()),
                nick_name: "nick".into(),
                portrait: "p".into(),
                level: 3,
            },
        })
    }

    fn user_with_rule(manual_confirm: bool, mandatory_confirm: bool) -> UserConfig {
        UserConfig {
            username: "u".into(),
            password: None,
            code: None,
            password_last_update: None,
            forum: ForumConfig {
                fname: Fname::from("f1"),
                bduss: None,
                stoken: None,
                block_day: 1,
                block_reason: String::new(),
                thread: true,
                post: true,
                comment: true,
            },
            process: ProcessConfig {
                mandatory_confirm,
                ..ProcessConfig::default()
            },
            rules: vec![RuleConfig {
                name: "B".into(),
                manual_confirm,
                operations: OperationSpec::Shorthand(OperationShorthand::Delete),
                conditions: vec![ConditionDescriptor {
                    type_tag: "text".into(),
                    options: serde_json::json!({"text": "spam"}),
                    priority: 50.0,
                    key: None,
                }],
                last_modify: 0,
                whitelist: false,
                force_record_context: false,
                logic: None,
            }],
            enable: true,
            permission: String::new(),
        }
    }

    #[tokio::test]
    async fn manual_confirm_rule_queues_non_direct_operations() {
        let registry = ConditionRegistry::builtin();
        let user = user_with_rule(true, false);
        let pool = crate::db::pool::connect("sqlite::memory:", 1).await.unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let dispatcher = UserDispatcher::compile(
            &user,
            UserId(1),
            &registry,
            Arc::new(FakeClient),
            Arc::new(ProcessRepo::new(pool)),
            cache_dir.path().to_path_buf(),
        )
        .unwrap();

        let content = sample_content();
        dispatcher.handle(&content, 1_700_000_100).await;

        let pending = dispatcher.confirm_store().values().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].rule_name, "B");
    }

    #[tokio::test]
    async fn execute_confirm_drains_the_entry() {
        let registry = ConditionRegistry::builtin();
        let user = user_with_rule(true, false);
        let pool = crate::db::pool::connect("sqlite::memory:", 1).await.unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let dispatcher = UserDispatcher::compile(
            &user,
            UserId(1),
            &registry,
            Arc::new(FakeClient),
            Arc::new(ProcessRepo::new(pool)),
            cache_dir.path().to_path_buf(),
        )
        .unwrap();

        let content = sample_content();
        dispatcher.handle(&content, 1_700_000_100).await;
        assert_eq!(dispatcher.confirm_store().values().await.len(), 1);

        let acted = dispatcher
            .operate_confirm(Pid(101), ConfirmAction::Execute)
            .await
            .unwrap();
        assert!(acted);
        assert!(dispatcher.confirm_store().values().await.is_empty());
    }

    #[tokio::test]
    async fn execute_fails_closed_without_consuming_the_entry_when_unauthenticated() {
        let registry = ConditionRegistry::builtin();
        let user = user_with_rule(true, false);
        let pool = crate::db::pool::connect("sqlite::memory:", 1).await.unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let dispatcher = UserDispatcher::compile(
            &user,
            UserId(1),
            &registry,
            Arc::new(UnauthClient),
            Arc::new(ProcessRepo::new(pool)),
            cache_dir.path().to_path_buf(),
        )
        .unwrap();

        let content = sample_content();
        dispatcher.handle(&content, 1_700_000_100).await;
        assert_eq!(dispatcher.confirm_store().values().await.len(), 1);

        let err = dispatcher
            .operate_confirm(Pid(101), ConfirmAction::Execute)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingAuth));
        // The attempt must not have consumed the entry: it's still there
        // for a later, authenticated retry.
        assert_eq!(dispatcher.confirm_store().values().await.len(), 1);
    }
}
