use std::{collections::VecDeque, sync::Arc};

use tokio::sync::{watch, RwLock};

use crate::sensors::Reading;

/// Maximum number of readings retained for the trend charts.
pub const MAX_HISTORY: usize = 200;

/// Latest `Reading` for the active session plus a bounded history.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
/// Every write carries the epoch of the feed that produced it; writes from a
/// superseded feed are dropped.
#[derive(Clone)]
pub struct ReadingCache {
    inner: Arc<RwLock<CacheState>>,
    updates: Arc<watch::Sender<Option<Reading>>>,
}

#[derive(Default)]
struct CacheState {
    epoch: u64,
    latest: Option<Reading>,
    history: VecDeque<Reading>,
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingCache {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            inner: Arc::new(RwLock::new(CacheState::default())),
            updates: Arc::new(updates),
        }
    }

    /// Start a new epoch and forget everything cached under the previous one.
    /// Returns the new epoch.
    pub async fn reset(&self) -> u64 {
        let mut state = self.inner.write().await;
        state.epoch += 1;
        state.latest = None;
        state.history.clear();
        self.updates.send_replace(None);
        state.epoch
    }

    /// Store `reading` if `epoch` is still current. Returns whether it was kept.
    pub async fn publish(&self, epoch: u64, reading: Reading) -> bool {
        let mut state = self.inner.write().await;
        if state.epoch != epoch {
            return false;
        }
        if state.history.len() == MAX_HISTORY {
            state.history.pop_front();
        }
        state.history.push_back(reading);
        state.latest = Some(reading);
        self.updates.send_replace(Some(reading));
        true
    }

    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// The most recent reading, or `None` while the feed is still loading.
    pub async fn latest(&self) -> Option<Reading> {
        self.inner.read().await.latest
    }

    /// Snapshot of the retained history, oldest first.
    pub async fn history(&self) -> Vec<Reading> {
        self.inner.read().await.history.iter().copied().collect()
    }

    /// Observe every accepted reading (and every reset, as `None`).
    pub fn subscribe(&self) -> watch::Receiver<Option<Reading>> {
        self.updates.subscribe()
    }
}
