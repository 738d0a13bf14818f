//! Data-source strategies feeding the shared [`ReadingCache`].
//!
//! A [`ReadingSource`] turns an authenticated identity into a long-running
//! feed future. The session controller spawns exactly one such future per
//! session and aborts it on teardown, so implementations simply loop forever.

pub mod firebase;
pub mod http;
pub mod simulated;
pub mod sse;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::{
    reading_cache::ReadingCache,
    sensors::{normalize, Reading},
    session::Identity,
};

pub use firebase::FirebaseStreamSource;
pub use http::HttpPollSource;
pub use simulated::SimulatedSource;

pub trait ReadingSource: Send + Sync + 'static {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Build the feed for `identity`. The returned future runs until aborted.
    fn open(&self, identity: &Identity, publisher: FeedPublisher) -> BoxFuture<'static, ()>;
}

/// Write handle given to a feed. Bound to the epoch of the subscription that
/// created it, so results arriving after a newer subscription took over are
/// discarded.
#[derive(Clone)]
pub struct FeedPublisher {
    cache: ReadingCache,
    epoch: u64,
}

impl FeedPublisher {
    pub fn new(cache: ReadingCache, epoch: u64) -> Self {
        Self { cache, epoch }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Normalise `raw` and publish it. Readings without a source timestamp
    /// are stamped with the arrival time.
    pub async fn publish_raw(&self, raw: &Value) -> bool {
        let mut reading = normalize(raw);
        if reading.timestamp == 0 {
            reading.timestamp = chrono::Utc::now().timestamp_millis();
        }
        self.publish(reading).await
    }

    pub async fn publish(&self, reading: Reading) -> bool {
        let accepted = self.cache.publish(self.epoch, reading).await;
        if !accepted {
            debug!(epoch = self.epoch, "Dropping reading from superseded feed");
        }
        accepted
    }
}
