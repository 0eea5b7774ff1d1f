//! Scenario 3 of `spec.md` §8 ("whitelist short-circuits delete") plus
//! invariant 2 ("at most one `process_log`/`process_context` row per
//! `(pid, user)`"): a whitelist match must suppress the blacklist
//! delete entirely and still leave exactly one audit row behind, even
//! after the same content is processed twice.

use std::sync::Arc;

use async_trait::async_trait;
use forumod_contracts::content_like::ContentLike;
use forumod_contracts::error::ContractError;
use forumod_contracts::moderator::{ClientStatus, ModeratorClient};
use forumod_core::db::{pool, ProcessRepo};
use forumod_core::dispatcher::UserDispatcher;
use forumod_core::registry::ConditionRegistry;
use forumod_model::config::{ForumConfig, UserConfig};
use forumod_model::content::{Comment, Content};
use forumod_model::ids::{Fname, Pid, Tid, UserId};
use forumod_model::rule::{OperationShorthand, OperationSpec, RuleConfig};
use forumod_model::user::User;
use forumod_model::ConditionDescriptor;

struct NeverCalledClient;

#[async_trait]
impl ModeratorClient for NeverCalledClient {
    fn status(&self) -> ClientStatus {
        ClientStatus::Success
    }
    async fn delete(&self, _content: &dyn ContentLike) -> Result<bool, ContractError> {
        panic!("whitelist match must never reach delete");
    }
    async fn delete_thread(&self, _fname: &str, _tid: Tid) -> Result<bool, ContractError> {
        panic!("whitelist match must never reach delete_thread");
    }
    async fn block(
        &self,
        _content: &dyn ContentLike,
        _day: u32,
        _reason: &str,
    ) -> Result<bool, ContractError> {
        panic!("whitelist match must never reach block");
    }
    async fn is_thread_author(&self, _content: &dyn ContentLike) -> Result<bool, ContractError> {
        Ok(false)
    }
}

fn good_user_content() -> Content {
    Content::Comment(Comment {
        fname: Fname::from("f1"),
        tid: Tid(200),
        pid: Pid(201),
        title: "hi".into(),
        text: "spam link".into(),
        create_time: 1_700_000_000,
        floor: 2,
        user: User {
            user_id: UserId(9),
            user_name: Some("good".into()),
            nick_name: "nick".into(),
            portrait: "p".into(),
            level: 3,
        },
    })
}

fn whitelist_then_blacklist_user() -> UserConfig {
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
        process: Default::default(),
        rules: vec![
            RuleConfig {
                name: "W".into(),
                manual_confirm: false,
                operations: OperationSpec::Shorthand(OperationShorthand::Ignore),
                conditions: vec![ConditionDescriptor {
                    type_tag: "text".into(),
                    options: serde_json::json!({"text": "good", "attr": "user_name"}),
                    priority: 50.0,
                    key: Some("username".into()),
                }],
                last_modify: 0,
                whitelist: true,
                force_record_context: false,
                logic: None,
            },
            RuleConfig {
                name: "B".into(),
                manual_confirm: false,
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
            },
        ],
        enable: true,
        permission: String::new(),
    }
}

#[tokio::test]
async fn whitelist_match_suppresses_blacklist_and_logs_once() {
    let registry = ConditionRegistry::builtin();
    let user = whitelist_then_blacklist_user();
    let pool = pool::connect("sqlite::memory:", 1).await.unwrap();
    let process_repo = Arc::new(ProcessRepo::new(pool.clone()));
    let cache_dir = tempfile::tempdir().unwrap();
    let dispatcher = UserDispatcher::compile(
        &user,
        UserId(1),
        &registry,
        Arc::new(NeverCalledClient),
        process_repo,
        cache_dir.path().to_path_buf(),
    )
    .unwrap();

    let content = good_user_content();

    // The whitelist condition targets `user_name`, which also contains
    // "spam link"'s author "good" -- so it matches before the blacklist
    // rule ever gets a chance to delete. A panic in `NeverCalledClient`
    // would fail this test outright if that ordering broke.
    dispatcher.handle(&content, 1_700_000_100).await;
    dispatcher.handle(&content, 1_700_000_200).await;

    let rows: Vec<(i64, i64)> = sqlx::query_as("SELECT pid, \"user\" FROM process_log WHERE pid = ?")
        .bind(201_i64)
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1, "at most one process_log row per (pid, user)");

    let ctx_rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT pid, \"user\" FROM process_context WHERE pid = ?")
            .bind(201_i64)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(ctx_rows.len(), 1, "at most one process_context row per (pid, user)");
}
