//! Scenario 4 of `spec.md` §8: a manual-confirm rule with one `direct`
//! sub-operation. The direct `block` must run immediately; the
//! non-direct `delete` is queued and only runs once `operate_confirm`
//! executes it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use forumod_contracts::content_like::ContentLike;
use forumod_contracts::error::ContractError;
use forumod_contracts::moderator::{ClientStatus, ModeratorClient};
use forumod_core::dispatcher::{ConfirmAction, UserDispatcher};
use forumod_core::db::{pool, ProcessRepo};
use forumod_core::registry::ConditionRegistry;
use forumod_model::config::{ForumConfig, ProcessConfig, UserConfig};
use forumod_model::content::{Comment, Content};
use forumod_model::ids::{Fname, Pid, Tid, UserId};
use forumod_model::rule::{OperationDescriptor, OperationSpec, RuleConfig};
use forumod_model::user::User;
use forumod_model::ConditionDescriptor;

#[derive(Default)]
struct RecordingClient {
    deletes: AtomicUsize,
    blocks: AtomicUsize,
    last_block_day: AtomicUsize,
}

#[async_trait]
impl ModeratorClient for RecordingClient {
    fn status(&self) -> ClientStatus {
        ClientStatus::Success
    }

    async fn delete(&self, _content: &dyn ContentLike) -> Result<bool, ContractError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete_thread(&self, _fname: &str, _tid: Tid) -> Result<bool, ContractError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn block(
        &self,
        _content: &dyn ContentLike,
        day: u32,
        _reason: &str,
    ) -> Result<bool, ContractError> {
        self.blocks.fetch_add(1, Ordering::SeqCst);
        self.last_block_day.store(day as usize, Ordering::SeqCst);
        Ok(true)
    }

    async fn is_thread_author(&self, _content: &dyn ContentLike) -> Result<bool, ContractError> {
        Ok(false)
    }
}

fn sample_content() -> Content {
    Content::Comment(Comment {
        fname: Fname::from("f1"),
        tid: Tid(100),
        pid: Pid(101),
        title: "hi".into(),
        text: "spam link".into(),
        create_time: 1_700_000_000,
        floor: 2,
        user: User {
            user_id: UserId(7),
            user_name: Some("bad".into()),
            nick_name: "nick".into(),
            portrait: "p".into(),
            level: 3,
        },
    })
}

fn manual_confirm_user() -> UserConfig {
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
            mandatory_confirm: false,
            ..ProcessConfig::default()
        },
        rules: vec![RuleConfig {
            name: "B".into(),
            manual_confirm: true,
            operations: OperationSpec::List(vec![
                OperationDescriptor {
                    type_tag: "delete".into(),
                    options: serde_json::Value::Null,
                    direct: false,
                },
                OperationDescriptor {
                    type_tag: "block".into(),
                    options: serde_json::json!({"day": 10}),
                    direct: true,
                },
            ]),
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
async fn direct_operation_runs_now_and_the_rest_waits_for_confirm() {
    let registry = ConditionRegistry::builtin();
    let user = manual_confirm_user();
    let pool = pool::connect("sqlite::memory:", 1).await.unwrap();
    let client = Arc::new(RecordingClient::default());
    let cache_dir = tempfile::tempdir().unwrap();
    let dispatcher = UserDispatcher::compile(
        &user,
        UserId(1),
        &registry,
        client.clone(),
        Arc::new(ProcessRepo::new(pool)),
        cache_dir.path().to_path_buf(),
    )
    .unwrap();

    let content = sample_content();
    dispatcher.handle(&content, 1_700_000_100).await;

    // The direct block ran immediately, with its own option overriding
    // forum.block_day.
    assert_eq!(client.blocks.load(Ordering::SeqCst), 1);
    assert_eq!(client.last_block_day.load(Ordering::SeqCst), 10);
    assert_eq!(client.deletes.load(Ordering::SeqCst), 0);

    // Only the non-direct delete was queued for confirmation.
    let pending = dispatcher.confirm_store().values().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operations.len(), 1);
    assert_eq!(pending[0].operations[0].type_tag, "delete");

    let acted = dispatcher
        .operate_confirm(Pid(101), ConfirmAction::Execute)
        .await
        .unwrap();
    assert!(acted);
    assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(client.blocks.load(Ordering::SeqCst), 1);
    assert!(dispatcher.confirm_store().values().await.is_empty());

    // A second execute on the same pid finds nothing left to act on.
    let acted_again = dispatcher
        .operate_confirm(Pid(101), ConfirmAction::Execute)
        .await
        .unwrap();
    assert!(!acted_again);
}
