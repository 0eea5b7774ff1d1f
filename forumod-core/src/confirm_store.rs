//! The per-user confirmation store (C8, §4.7): holds `ConfirmData` queued
//! by a manual-confirm rule until a human calls `operate_confirm`, or
//! until its TTL elapses.
//!
//! Disk-backed via `cacache`, the same content-addressed cache the
//! teacher wraps for its image/media blob stores (`ferrex-core`'s
//! `infra::cache::{image_store, media_store}`, `ferrex-player`'s
//! `infra::cache::image_disk_cache`) — a pending confirmation must
//! survive a process restart, the same durability requirement those
//! stores have for an already-downloaded blob.
//!
//! Expiry is lazy: every entry's deadline is computed against the
//! *current* `ttl` and the write timestamp `cacache` itself records, not
//! a deadline frozen at insert time, so `set_expire_time` retroactively
//! lengthens or shortens every entry's remaining lifetime (§4.7, §8
//! "`set_expire_time(new)` with `new - old < -old` drops all entries" —
//! here that's just `new <= 0`, since every entry's age is already `>=
//! 0`).

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use forumod_model::ids::Pid;
use forumod_model::ConfirmData;
use parking_lot::RwLock;

const KEY_PREFIX: &str = "confirm/v1/";

pub struct ConfirmStore {
    root: PathBuf,
    ttl: RwLock<Duration>,
}

fn key_for(pid: Pid) -> String {
    format!("{KEY_PREFIX}{}", pid.0)
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Lists every confirm-store entry's index metadata. `cacache::index::ls`
/// is a synchronous index read (no blob I/O), so callers run it via
/// `spawn_blocking` the same way `ferrex-player`'s disk image cache does
/// for its eviction sweep.
fn list_entries(root: &Path) -> Vec<cacache::Metadata> {
    cacache::index::ls(root)
        .filter_map(|entry| match entry {
            Ok(m) if m.key.starts_with(KEY_PREFIX) => Some(m),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "confirm store index entry error");
                None
            }
        })
        .collect()
}

impl ConfirmStore {
    pub fn new(root: PathBuf, ttl: Duration) -> Self {
        Self {
            root,
            ttl: RwLock::new(ttl),
        }
    }

    fn is_expired(&self, written_at_ms: u128) -> bool {
        let ttl = *self.ttl.read();
        now_ms().saturating_sub(written_at_ms) >= ttl.as_millis()
    }

    /// Enqueues `data` under `pid`, replacing any existing entry.
    pub async fn set(&self, pid: Pid, data: ConfirmData) {
        let bytes = match serde_json::to_vec(&data) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, pid = pid.0, "failed to serialize confirm entry");
                return;
            }
        };
        if let Err(err) = cacache::write(&self.root, key_for(pid), bytes).await {
            tracing::warn!(error = %err, pid = pid.0, "failed to persist confirm entry");
        }
    }

    /// Returns the entry for `pid` if present and not expired, removing
    /// it from disk if it has expired.
    pub async fn get(&self, pid: Pid) -> Option<ConfirmData> {
        let key = key_for(pid);
        let meta = cacache::metadata(&self.root, &key).await.ok().flatten()?;
        if self.is_expired(meta.time) {
            let _ = cacache::remove(&self.root, &key).await;
            return None;
        }
        let bytes = cacache::read(&self.root, &key)
            .await
            .inspect_err(|err| tracing::warn!(error = %err, pid = pid.0, "confirm entry read failed"))
            .ok()?;
        serde_json::from_slice(&bytes)
            .inspect_err(|err| tracing::warn!(error = %err, pid = pid.0, "confirm entry corrupt"))
            .ok()
    }

    /// Removes `pid` unconditionally (used by `operate_confirm` after
    /// acting on an entry). Returns whether it was present.
    pub async fn delete(&self, pid: Pid) -> bool {
        let key = key_for(pid);
        if cacache::metadata(&self.root, &key).await.ok().flatten().is_none() {
            return false;
        }
        cacache::remove(&self.root, &key).await.is_ok()
    }

    /// Every non-expired entry, sweeping expired ones as a side effect.
    pub async fn values(&self) -> Vec<ConfirmData> {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || list_entries(&root))
            .await
            .unwrap_or_default();

        let mut out = Vec::with_capacity(entries.len());
        for meta in entries {
            if self.is_expired(meta.time) {
                let _ = cacache::remove(&self.root, &meta.key).await;
                continue;
            }
            if let Ok(bytes) = cacache::read(&self.root, &meta.key).await
                && let Ok(data) = serde_json::from_slice(&bytes)
            {
                out.push(data);
            }
        }
        out
    }

    /// Changes the TTL applied to every entry, past and future. A
    /// non-positive `new_ttl` makes every entry immediately expired; the
    /// next `get`/`values`/sweep call drops them.
    pub fn set_expire_time(&self, new_ttl: Duration) {
        *self.ttl.write() = new_ttl;
    }

    /// Drops every currently-expired entry without returning them
    /// (periodic maintenance call, distinct from the read paths above
    /// which sweep incidentally).
    pub async fn sweep_expired(&self) -> usize {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || list_entries(&root))
            .await
            .unwrap_or_default();

        let mut count = 0;
        for meta in entries {
            if self.is_expired(meta.time) && cacache::remove(&self.root, &meta.key).await.is_ok() {
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forumod_model::content::{Comment, Content};
    use forumod_model::ids::{Fname, Tid, UserId};
    use forumod_model::user::User;

    fn sample(pid: u64) -> ConfirmData {
        ConfirmData {
            content: Content::Comment(Comment {
                fname: Fname::from("rust"),
                tid: Tid(1),
                pid: Pid(pid),
                title: String::new(),
                text: "hi".into(),
                create_time: 0,
                floor: 2,
                user: User {
                    user_id: UserId(1),
                    user_name: None,
                    nick_name: "a".into(),
                    portrait: String::new(),
                    level: 0,
                },
            }),
            data: Default::default(),
            operations: vec![],
            process_time: 0,
            rule_name: "r".into(),
        }
    }

    fn store(ttl: Duration) -> (tempfile::TempDir, ConfirmStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfirmStore::new(dir.path().to_path_buf(), ttl);
        (dir, store)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (_dir, store) = store(Duration::from_secs(60));
        store.set(Pid(1), sample(1)).await;
        assert!(store.get(Pid(1)).await.is_some());
        assert_eq!(store.values().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let (_dir, store) = store(Duration::from_secs(60));
        store.set(Pid(1), sample(1)).await;
        assert!(store.delete(Pid(1)).await);
        assert!(store.get(Pid(1)).await.is_none());
        assert!(!store.delete(Pid(1)).await);
    }

    #[tokio::test]
    async fn nonpositive_ttl_expires_everything() {
        let (_dir, store) = store(Duration::from_secs(60));
        store.set(Pid(1), sample(1)).await;
        store.set_expire_time(Duration::from_secs(0));
        assert!(store.get(Pid(1)).await.is_none());
        assert!(store.values().await.is_empty());
    }

    #[tokio::test]
    async fn missing_pid_returns_none() {
        let (_dir, store) = store(Duration::from_secs(60));
        assert!(store.get(Pid(99)).await.is_none());
    }

    #[tokio::test]
    async fn entries_survive_store_recreation() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConfirmStore::new(dir.path().to_path_buf(), Duration::from_secs(60));
            store.set(Pid(7), sample(7)).await;
        }
        let reopened = ConfirmStore::new(dir.path().to_path_buf(), Duration::from_secs(60));
        assert!(reopened.get(Pid(7)).await.is_some());
    }
}
