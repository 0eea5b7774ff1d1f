//! Typed pub/sub (C9, §4.9) and the process-lifecycle `Controller` built
//! on top of it.
//!
//! `AsyncEvent<T>` deliberately isn't `tokio::sync::broadcast` — that
//! channel drops messages for slow/missing receivers and has no
//! `un_register`. Here every listener is a stored callback invoked by
//! `broadcast`, which is exactly the "listeners are callbacks" contract
//! §4.9 describes.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, warn};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Callback<T> = Arc<dyn Fn(T) -> BoxFuture + Send + Sync>;

struct Registration<T> {
    id: u64,
    callback: Callback<T>,
}

/// A typed event channel. Cloning an `AsyncEvent` shares the same
/// listener list (it's an `Arc` internally), so every handle broadcasts
/// to and registers on the same set.
pub struct AsyncEvent<T> {
    listeners: Arc<RwLock<Vec<Registration<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for AsyncEvent<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for AsyncEvent<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> AsyncEvent<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers a callback; returns a handle that unregisters it when
    /// `un_register` is called.
    pub fn on<F, Fut>(&self, f: F) -> Listener<T>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback<T> = Arc::new(move |payload| Box::pin(f(payload)));
        self.listeners.write().push(Registration { id, callback });
        Listener {
            id,
            listeners: self.listeners.clone(),
        }
    }

    /// Invokes every listener concurrently against a snapshot of the
    /// current registration list (§5 "broadcast reads a snapshot"). Each
    /// listener runs on its own task so a panicking listener can't take
    /// down the others or abort the broadcast (§4.9, §7 "Event listener
    /// exceptions").
    pub async fn broadcast(&self, payload: T) {
        let snapshot: Vec<Callback<T>> = self
            .listeners
            .read()
            .iter()
            .map(|r| r.callback.clone())
            .collect();

        let tasks: Vec<_> = snapshot
            .into_iter()
            .map(|cb| {
                let payload = payload.clone();
                tokio::spawn(async move { cb(payload).await })
            })
            .collect();

        for task in tasks {
            if let Err(join_err) = task.await {
                error!(error = %join_err, "event listener panicked");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

/// A registration handle returned by `AsyncEvent::on`.
pub struct Listener<T> {
    id: u64,
    listeners: Arc<RwLock<Vec<Registration<T>>>>,
}

impl<T> Listener<T> {
    pub fn un_register(self) {
        self.listeners.write().retain(|r| r.id != self.id);
    }
}

/// `SystemConfigChange` payload (§4.9).
#[derive(Debug, Clone)]
pub struct SystemConfigChange {
    pub old: Arc<forumod_config::SystemConfig>,
    pub new: Arc<forumod_config::SystemConfig>,
}

/// Owns the process-lifecycle buses and the running flag they guard
/// (§4.9). `DispatchContent` fans content out to every user worker;
/// `Start`/`Stop` bracket the crawler orchestrator's lifetime;
/// `SystemConfigChange` tells the orchestrator to restart its spider
/// task with new scan parameters.
pub struct Controller {
    pub start: AsyncEvent<()>,
    pub stop: AsyncEvent<()>,
    pub dispatch_content: AsyncEvent<forumod_model::Content>,
    pub system_config_change: AsyncEvent<SystemConfigChange>,
    /// Periodic TTL-sweep tick (§11 supplemented: the original drives
    /// its content-cache and confirm-store pruning off a shared
    /// `ClearCache` broadcast rather than two independent timers).
    /// Every listener sweeps its own store and ignores the payload.
    pub clear_cache: AsyncEvent<()>,
    running: Arc<AtomicBool>,
    config: Arc<RwLock<Arc<forumod_config::SystemConfig>>>,
}

impl Controller {
    pub fn new(config: forumod_config::SystemConfig) -> Self {
        Self {
            start: AsyncEvent::new(),
            stop: AsyncEvent::new(),
            dispatch_content: AsyncEvent::new(),
            system_config_change: AsyncEvent::new(),
            clear_cache: AsyncEvent::new(),
            running: Arc::new(AtomicBool::new(false)),
            config: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> Arc<forumod_config::SystemConfig> {
        self.config.read().clone()
    }

    /// Idempotent: a second `start()` while already running is a no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.start.broadcast(()).await;
    }

    /// Idempotent inverse of `start()`.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop.broadcast(()).await;
    }

    /// Replaces the in-memory config and broadcasts `SystemConfigChange`
    /// unless the new value is identical. Persisting the new config to
    /// disk is the HTTP-facing admin surface's job (`spec.md` §1
    /// Non-goal); this only updates what the core itself observes.
    pub async fn update_config(&self, new_cfg: forumod_config::SystemConfig) {
        let new = Arc::new(new_cfg);
        let old = {
            let mut guard = self.config.write();
            if configs_equal(&guard, &new) {
                return;
            }
            std::mem::replace(&mut *guard, new.clone())
        };
        self.system_config_change
            .broadcast(SystemConfigChange { old, new })
            .await;
    }
}

fn configs_equal(a: &forumod_config::SystemConfig, b: &forumod_config::SystemConfig) -> bool {
    // `SystemConfig` isn't `PartialEq` (its fields are tuning knobs, not
    // identity); compare through its canonical serialization instead.
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => {
            warn!("failed to compare system configs by serialization; treating as changed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn broadcast_reaches_all_listeners() {
        let event: AsyncEvent<u32> = AsyncEvent::new();
        let count = Arc::new(AtomicU32::new(0));

        let c1 = count.clone();
        let _l1 = event.on(move |_| {
            let c1 = c1.clone();
            async move {
                c1.fetch_add(1, Ordering::SeqCst);
            }
        });
        let c2 = count.clone();
        let _l2 = event.on(move |_| {
            let c2 = c2.clone();
            async move {
                c2.fetch_add(1, Ordering::SeqCst);
            }
        });

        event.broadcast(1).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn un_register_stops_future_broadcasts() {
        let event: AsyncEvent<u32> = AsyncEvent::new();
        let count = Arc::new(AtomicU32::new(0));
        let c1 = count.clone();
        let listener = event.on(move |_| {
            let c1 = c1.clone();
            async move {
                c1.fetch_add(1, Ordering::SeqCst);
            }
        });

        event.broadcast(1).await;
        listener.un_register();
        event.broadcast(1).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_stop_others() {
        let event: AsyncEvent<u32> = AsyncEvent::new();
        let count = Arc::new(AtomicU32::new(0));

        let _l1 = event.on(|_| async move {
            panic!("boom");
        });
        let c2 = count.clone();
        let _l2 = event.on(move |_| {
            let c2 = c2.clone();
            async move {
                c2.fetch_add(1, Ordering::SeqCst);
            }
        });

        event.broadcast(1).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn controller_start_stop_idempotent() {
        let controller = Controller::new(forumod_config::SystemConfig::default());
        let starts = Arc::new(AtomicU32::new(0));
        let s = starts.clone();
        let _l = controller.start.on(move |_| {
            let s = s.clone();
            async move {
                s.fetch_add(1, Ordering::SeqCst);
            }
        });

        controller.start().await;
        controller.start().await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(controller.is_running());
    }
}
