//! The crawler orchestrator (C6, §4.3): aggregates every user's
//! `CrawlNeed` per forum, runs the Spider over that aggregate in an
//! infinite loop, persists what it finds, and fans it out through the
//! `Controller`'s `dispatch_content` bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use forumod_model::{Content, UserConfig};
use tokio::sync::{mpsc, RwLock};

use crate::db::{ContentCacheStore, UserRepo};
use crate::event_bus::Controller;
use crate::spider::{CrawlNeed, ScanParams, Spider};

/// `update_needs()`'s output: one `CrawlNeed` per forum short name.
pub type NeedMap = HashMap<String, CrawlNeed>;

/// Diffs the previous need map against a fresh aggregate over `users`,
/// logging every forum that gained or lost a layer (§4.3 "+ fname[layers]"
/// / "- fname[layers]").
pub fn update_needs(users: &[UserConfig]) -> NeedMap {
    let mut needs: NeedMap = HashMap::new();
    for user in users {
        if !user.contributes_to_crawl() {
            continue;
        }
        let (thread, post, comment) = user.forum.crawl_need();
        needs
            .entry(user.forum.fname.as_str().to_string())
            .or_default()
            .union(CrawlNeed { thread, post, comment });
    }
    needs
}

/// Logs exactly the layers gained/lost per forum, using `CrawlNeed`'s
/// set-difference arithmetic rather than a flat before/after dump (§4.3
/// "+ fname[layers] / - fname[layers]").
fn log_need_diff(old: &NeedMap, new: &NeedMap) {
    for (fname, need) in new {
        match old.get(fname) {
            Some(prev) if prev == need => {}
            Some(prev) => {
                let gained = need.difference(*prev);
                let lost = prev.difference(*need);
                if !gained.is_empty() {
                    tracing::info!(fname, ?gained, "+ crawl need");
                }
                if !lost.is_empty() {
                    tracing::info!(fname, ?lost, "- crawl need");
                }
            }
            None => tracing::info!(fname, ?need, "+ crawl need"),
        }
    }
    for (fname, need) in old {
        if !new.contains_key(fname) {
            tracing::info!(fname, ?need, "- crawl need");
        }
    }
}

/// The process-wide crawler loop (§4.3 `crawl()`). Owns the Spider and
/// the current need aggregate; restarts its scan parameters whenever
/// `Controller.system_config_change` fires (§4.3 `restart(event)`).
pub struct Orchestrator {
    spider: Arc<Spider>,
    user_repo: Arc<UserRepo>,
    controller: Arc<Controller>,
    params: Arc<RwLock<ScanParams>>,
    needs: Arc<RwLock<NeedMap>>,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<dyn ContentCacheStore>,
        user_repo: Arc<UserRepo>,
        controller: Arc<Controller>,
    ) -> Self {
        let cfg = controller.config();
        let params: ScanParams = (&cfg.scan).into();
        Self {
            spider: Arc::new(Spider::new(cache, params.query_cd)),
            user_repo,
            controller,
            params: Arc::new(RwLock::new(params)),
            needs: Arc::new(RwLock::new(NeedMap::new())),
        }
    }

    /// Recomputes the need aggregate from the latest roster (§4.3
    /// `update_needs`). Call this whenever the user roster changes.
    pub async fn update_needs(&self, users: &[UserConfig]) {
        let fresh = update_needs(users);
        let mut guard = self.needs.write().await;
        log_need_diff(&guard, &fresh);
        *guard = fresh;
    }

    /// Rebuilds scan parameters from a changed `SystemConfig` (§4.3
    /// `restart(event)`): swaps the pagination window knobs the next
    /// pass reads, and reconfigures the Spider's shared rate-limit gate
    /// so a `query_cd` change is observed by the very next outbound
    /// request rather than only on process restart.
    pub async fn restart(&self, new_params: ScanParams) {
        self.spider.set_query_cd(new_params.query_cd);
        *self.params.write().await = new_params;
        tracing::info!("orchestrator scan parameters updated");
    }

    /// The scan parameters the next pass will use; exposed for status
    /// surfaces and tests, since `params` itself is otherwise only read
    /// from inside `crawl()`.
    pub async fn scan_params(&self) -> ScanParams {
        *self.params.read().await
    }

    /// Runs forever: one pass over every forum in the need aggregate,
    /// then sleeps `loop_cd` before the next (§4.3). A failure while
    /// processing one forum is logged and does not abort the pass.
    pub async fn crawl(&self) {
        loop {
            if !self.controller.is_running() {
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }

            let needs = self.needs.read().await.clone();
            let params = *self.params.read().await;

            for (fname, need) in &needs {
                if need.is_empty() {
                    continue;
                }
                self.scan_one_forum(fname, *need, params).await;
            }

            tokio::time::sleep(Duration::from_secs_f64(params.loop_cd.max(0.0))).await;
        }
    }

    async fn scan_one_forum(&self, fname: &str, need: CrawlNeed, params: ScanParams) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Content>();
        let spider = self.spider.clone();
        let fname_owned = fname.to_string();

        let scan_task = tokio::spawn(async move {
            spider.scan_pass(&fname_owned, need, params, &tx).await;
        });

        while let Some(content) = rx.recv().await {
            if let Err(err) = self
                .user_repo
                .upsert_author(content.fname(), content.user())
                .await
            {
                tracing::warn!(error = %err, "failed to persist author, continuing pass");
            }
            self.controller.dispatch_content.broadcast(content).await;
        }

        if let Err(join_err) = scan_task.await {
            tracing::error!(error = %join_err, fname, "spider task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forumod_model::config::{ForumConfig, ProcessConfig};
    use forumod_model::ids::Fname;
    use forumod_model::rule::{OperationShorthand, OperationSpec, RuleConfig};

    fn placeholder_rule() -> RuleConfig {
        RuleConfig {
            name: "r".into(),
            manual_confirm: false,
            operations: OperationSpec::Shorthand(OperationShorthand::Ignore),
            conditions: vec![],
            last_modify: 0,
            whitelist: false,
            force_record_context: false,
            logic: None,
        }
    }

    fn user(fname: &str, thread: bool, post: bool, comment: bool, rules: usize) -> UserConfig {
        UserConfig {
            username: "u".into(),
            password: None,
            code: None,
            password_last_update: None,
            forum: ForumConfig {
                fname: Fname::from(fname),
                bduss: None,
                stoken: None,
                block_day: 1,
                block_reason: String::new(),
                thread,
                post,
                comment,
            },
            process: ProcessConfig::default(),
            rules: (0..rules).map(|_| placeholder_rule()).collect(),
            enable: true,
            permission: String::new(),
        }
    }

    #[test]
    fn aggregates_need_across_users_sharing_a_forum() {
        let users = vec![
            user("f1", true, false, false, 1),
            user("f1", false, true, false, 1),
            user("f2", false, false, true, 1),
        ];
        let needs = update_needs(&users);
        assert_eq!(
            needs["f1"],
            CrawlNeed { thread: true, post: true, comment: false }
        );
        assert_eq!(
            needs["f2"],
            CrawlNeed { thread: false, post: false, comment: true }
        );
    }

    #[test]
    fn user_with_no_rules_does_not_contribute() {
        let users = vec![user("f1", true, true, true, 0)];
        let needs = update_needs(&users);
        assert!(!needs.contains_key("f1"));
    }
}
