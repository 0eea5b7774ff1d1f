//! `EtaSleep` (§4.2): a scoped rate-limit gate shared by every outbound
//! request a single Spider makes. Entry sleeps until
//! `monotonic_now >= last_release + cd`; exit stamps `last_release` to
//! the moment of release, so the cooldown always measures from the end
//! of the previous request, not its start.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Mutex;

pub struct EtaSleep {
    cd: RwLock<Duration>,
    last_release: Mutex<Option<Instant>>,
}

impl EtaSleep {
    pub fn new(cd: Duration) -> Self {
        Self {
            cd: RwLock::new(cd),
            last_release: Mutex::new(None),
        }
    }

    /// Changes the cooldown applied to the *next* acquire onward — used
    /// when a scan-config reload changes `query_cd` live (§4.3 `restart`).
    pub fn set_cd(&self, cd: Duration) {
        *self.cd.write() = cd;
    }

    /// Acquires the gate: sleeps (if needed) until `cd` has elapsed
    /// since the last release, then returns a guard whose drop stamps
    /// the new release time.
    ///
    /// Only one caller may hold the gate at a time — the inner mutex is
    /// held across the sleep, so concurrent callers queue in arrival
    /// order (§5 "The Spider's rate-limit gate is exclusive").
    pub async fn acquire(&self) -> EtaSleepGuard<'_> {
        let mut last_release = self.last_release.lock().await;
        let cd = *self.cd.read();
        if let Some(last) = *last_release {
            let ready_at = last + cd;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        // Stamp immediately: the cooldown window starts from this
        // acquisition, and is corrected again on release to measure
        // from when the request actually finished.
        *last_release = Some(Instant::now());
        drop(last_release);
        EtaSleepGuard { gate: self }
    }

    async fn release_now(&self) {
        *self.last_release.lock().await = Some(Instant::now());
    }
}

/// Held for the duration of one rate-limited request; on drop, spawns a
/// detached stamp of the release time (§4.2 "on exit stamps
/// `last_release = monotonic_now`").
pub struct EtaSleepGuard<'a> {
    gate: &'a EtaSleep,
}

impl Drop for EtaSleepGuard<'_> {
    fn drop(&mut self) {
        // Best-effort: `release_now` only ever shrinks the window (moves
        // `last_release` later), so a dropped guard without an await
        // still leaves the gate at least as conservative as the
        // acquire-time stamp.
        if let Ok(mut guard) = self.gate.last_release.try_lock() {
            *guard = Some(Instant::now());
        }
    }
}

impl EtaSleepGuard<'_> {
    /// Stamps the release time precisely; prefer this over relying on
    /// `Drop` when the caller can await.
    pub async fn release(self) {
        self.gate.release_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn second_acquire_waits_for_cooldown() {
        let gate = Arc::new(EtaSleep::new(Duration::from_millis(100)));
        let g = gate.acquire().await;
        g.release().await;

        let start = Instant::now();
        let g2 = gate.acquire().await;
        g2.release().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn set_cd_changes_the_next_wait() {
        let gate = Arc::new(EtaSleep::new(Duration::from_millis(100)));
        let g = gate.acquire().await;
        g.release().await;

        gate.set_cd(Duration::from_millis(10));
        let start = Instant::now();
        let g2 = gate.acquire().await;
        g2.release().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
