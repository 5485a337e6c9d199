//! In-memory webhook event deduplication
//!
//! Webhook providers deliver at least once, so the same event id can arrive
//! several times within seconds. The cache remembers claimed event ids for a
//! short window so concurrent or rapid redeliveries are skipped.
//!
//! The cache is advisory and process-local: a restart forgets every entry, and
//! a redelivery after the window is processed again. Every reconciliation path
//! is idempotent by subscription id, so reprocessing is wasteful but safe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long a claimed event id suppresses redeliveries
pub const DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// How often the background sweep removes expired entries
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A claimed event id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DedupEntry {
    expires_at: Instant,
}

impl DedupEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Time-windowed set of recently claimed event ids
#[derive(Debug)]
pub struct EventDedupCache {
    entries: RwLock<HashMap<String, DedupEntry>>,
    window: Duration,
}

impl Default for EventDedupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDedupCache {
    pub fn new() -> Self {
        Self::with_window(DEDUP_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Claim exclusive processing rights for an event id.
    ///
    /// Returns `true` when the caller may process the event, `false` when a
    /// live claim already exists (duplicate delivery). An expired entry that
    /// the sweep has not removed yet counts as absent and is replaced.
    pub async fn claim(&self, event_id: &str) -> bool {
        // Fast path: reject live duplicates under the shared lock
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(event_id) {
                if entry.is_live(Instant::now()) {
                    return false;
                }
            }
        }

        let mut entries = self.entries.write().await;
        let now = Instant::now();

        // Re-check: another task may have claimed between the two locks
        if let Some(entry) = entries.get(event_id) {
            if entry.is_live(now) {
                return false;
            }
        }

        entries.insert(
            event_id.to_string(),
            DedupEntry {
                expires_at: now + self.window,
            },
        );
        true
    }

    /// Whether a live claim exists for the event id
    pub async fn is_claimed(&self, event_id: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(event_id)
            .is_some_and(|entry| entry.is_live(Instant::now()))
    }

    /// Drop a claim so that a redelivery is processed again
    pub async fn release(&self, event_id: &str) {
        self.entries.write().await.remove(event_id);
    }

    /// Number of entries currently held, live or stale
    pub async fn stats(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Remove expired entries, returning how many were dropped
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` is cancelled
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.sweep().await;
                        if removed > 0 {
                            tracing::debug!(removed = removed, "Swept expired webhook dedup entries");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("Dedup sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
