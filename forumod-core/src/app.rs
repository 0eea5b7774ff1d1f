//! The process-wide application object (§9 Design Notes: "Centralize
//! process-wide state in one application object created at startup and
//! passed explicitly"). Owns the database pool, the event bus, the
//! crawler orchestrator, and one `UserDispatcher` per enabled account.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use forumod_config::SystemConfig;
use forumod_model::ids::UserId;
use forumod_model::UserConfig;
use tokio::sync::RwLock;

use crate::confirm_store::ConfirmStore;
use crate::db::{pool, ContentCacheStore, ProcessRepo, SqlContentCacheStore, UserRepo};
use crate::dispatcher::{ConfirmAction, UserDispatcher};
use crate::error::{CoreError, Result};
use crate::event_bus::Controller;
use crate::moderator_client::TiebaModeratorClient;
use crate::orchestrator::Orchestrator;
use crate::registry::ConditionRegistry;
use forumod_model::ids::Pid;

/// Everything a dispatcher worker needs to act on one account, keyed by
/// username for `operate_confirm` lookups from the admin surface.
struct Account {
    user_id: UserId,
    dispatcher: Arc<UserDispatcher>,
}

pub struct Application {
    pub controller: Arc<Controller>,
    pub content_cache: Arc<dyn ContentCacheStore>,
    pub user_repo: Arc<UserRepo>,
    pub process_repo: Arc<ProcessRepo>,
    pub registry: Arc<ConditionRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    accounts: RwLock<HashMap<String, Account>>,
}

impl Application {
    /// Opens the database, builds the shared registry, and compiles one
    /// dispatcher per user in `users` (§9). Fatal per §7: a database the
    /// process can't open aborts the caller.
    pub async fn bootstrap(system_config: SystemConfig, users: Vec<UserConfig>) -> Result<Arc<Self>> {
        let db_pool = pool::connect(
            &system_config.database.url,
            system_config.database.max_connections,
        )
        .await?;

        let content_cache: Arc<dyn ContentCacheStore> =
            Arc::new(SqlContentCacheStore::new(db_pool.clone()));
        let user_repo = Arc::new(UserRepo::new(db_pool.clone()));
        let process_repo = Arc::new(ProcessRepo::new(db_pool.clone()));
        let registry = Arc::new(ConditionRegistry::builtin());
        let controller = Arc::new(Controller::new(system_config));

        let orchestrator = Arc::new(Orchestrator::new(
            content_cache.clone(),
            user_repo.clone(),
            controller.clone(),
        ));

        let app = Arc::new(Self {
            controller,
            content_cache,
            user_repo,
            process_repo,
            registry,
            orchestrator,
            accounts: RwLock::new(HashMap::new()),
        });

        app.reload_users(users).await?;
        Ok(app)
    }

    /// Recompiles every dispatcher from a fresh user roster and updates
    /// the orchestrator's crawl-need aggregate (§4.3 `update_needs`).
    /// Existing confirm stores are dropped along with their owning
    /// dispatcher — a rule/account reload forfeits any not-yet-confirmed
    /// entries, which is acceptable since reloads are rare operator
    /// actions, not part of the steady-state loop.
    pub async fn reload_users(&self, users: Vec<UserConfig>) -> Result<()> {
        let mut accounts = HashMap::new();
        for (i, user) in users.iter().enumerate() {
            if !user.enable {
                continue;
            }
            let user_id = UserId(i as u64 + 1);
            let client = Arc::new(TiebaModeratorClient::new(
                user.forum.bduss.clone(),
                user.forum.stoken.clone(),
            ));
            client.start().await;

            let confirm_cache_root = self
                .controller
                .config()
                .cache
                .confirm_cache_dir
                .join(&user.username);
            let dispatcher = Arc::new(UserDispatcher::compile(
                user,
                user_id,
                &self.registry,
                client,
                self.process_repo.clone(),
                confirm_cache_root,
            )?);

            accounts.insert(
                user.username.clone(),
                Account { user_id, dispatcher },
            );
        }

        *self.accounts.write().await = accounts;
        self.orchestrator.update_needs(&users).await;
        Ok(())
    }

    /// Wires the dispatch-content bus to every dispatcher and starts the
    /// crawler orchestrator and the cache sweeper. Runs until the
    /// process is torn down; intended to be spawned once at startup.
    pub async fn run(self: Arc<Self>) {
        let app = self.clone();
        let _dispatch_listener = self.controller.dispatch_content.on(move |content| {
            let app = app.clone();
            async move {
                let accounts = app.accounts.read().await;
                let now = chrono::Utc::now().timestamp();
                for account in accounts.values() {
                    account.dispatcher.handle(&content, now).await;
                }
            }
        });

        let orchestrator = self.orchestrator.clone();
        let _restart_listener = self.controller.system_config_change.on(move |change| {
            let orchestrator = orchestrator.clone();
            async move {
                let new_params: crate::spider::ScanParams = (&change.new.scan).into();
                orchestrator.restart(new_params).await;
            }
        });

        let sweep_cache = self.content_cache.clone();
        let sweep_cfg = self.controller.config();
        let _content_sweep_listener = self.controller.clear_cache.on(move |()| {
            let sweep_cache = sweep_cache.clone();
            let expire_secs = sweep_cfg.cache.pid_cache_expire_secs;
            async move {
                let now = chrono::Utc::now().timestamp();
                if let Err(err) = sweep_cache.sweep_expired(now, expire_secs).await {
                    tracing::warn!(error = %err, "content cache sweep failed");
                }
            }
        });

        let app = self.clone();
        let _confirm_sweep_listener = self.controller.clear_cache.on(move |()| {
            let app = app.clone();
            async move {
                let accounts = app.accounts.read().await;
                for account in accounts.values() {
                    let removed = account.dispatcher.confirm_store().sweep_expired().await;
                    if removed > 0 {
                        tracing::debug!(user_id = account.user_id.0, removed, "swept expired confirms");
                    }
                }
            }
        });

        let clear_cache = self.controller.clear_cache.clone();
        let sweep_interval = Duration::from_secs(self.controller.config().cache.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(sweep_interval).await;
                clear_cache.broadcast(()).await;
            }
        });

        self.controller.start().await;
        self.orchestrator.crawl().await;
    }

    /// Looks up `username`'s dispatcher and acts on one pending
    /// confirmation (§4.6 `operate_confirm`, exposed for the admin
    /// surface this core hands off to).
    pub async fn operate_confirm(
        &self,
        username: &str,
        pid: Pid,
        action: ConfirmAction,
    ) -> Result<bool> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(username)
            .ok_or_else(|| CoreError::Structural(format!("unknown account {username:?}")))?;
        account.dispatcher.operate_confirm(pid, action).await
    }

    pub async fn confirm_store(&self, username: &str) -> Option<Arc<ConfirmStore>> {
        self.accounts
            .read()
            .await
            .get(username)
            .map(|a| a.dispatcher.confirm_store())
    }
}
