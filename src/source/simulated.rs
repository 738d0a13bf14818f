use std::{sync::Arc, time::Duration};

use anyhow::Result;
use futures_util::{future::BoxFuture, FutureExt};
use tokio::time;
use tracing::{debug, info, warn};

use super::{FeedPublisher, ReadingSource};
use crate::{
    sensors::{models::SensorRecord, Reading},
    session::Identity,
};

const TEMPERATURE_RANGE: (f64, f64) = (20.0, 30.0);
const HUMIDITY_RANGE: (f64, f64) = (40.0, 60.0);
const SOIL_RANGE: (f64, f64) = (30.0, 60.0);
const RAIN_PROBABILITY: f64 = 0.2;

/// Destination for readings produced on the service side.
pub trait ReadingSink: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn write(&self, identity: &Identity, record: SensorRecord) -> BoxFuture<'static, Result<()>>;
}

/// Demo source: generates a plausible reading every `interval`, writes it to
/// the sink and echoes it to observers without waiting for the write.
#[derive(Clone)]
pub struct SimulatedSource {
    sink: Arc<dyn ReadingSink>,
    interval: Duration,
    seed: Option<u64>,
}

impl SimulatedSource {
    pub fn new(sink: Arc<dyn ReadingSink>, interval: Duration, seed: Option<u64>) -> Self {
        Self { sink, interval, seed }
    }

    /// Generate one reading, hand the write to a background task and publish
    /// the reading locally without waiting for the write to land.
    pub async fn publish_synthetic_reading(
        &self,
        identity: &Identity,
        publisher: &FeedPublisher,
        rng: &mut fastrand::Rng,
    ) -> Reading {
        let reading = synthetic_reading(rng, chrono::Utc::now().timestamp_millis());
        debug!(uid = %identity.uid, reading = ?reading, "Synthetic reading generated");

        let write = self.sink.write(identity, reading.into());
        let sink = self.sink.name();
        let uid = identity.uid.clone();
        tokio::spawn(async move {
            if let Err(e) = write.await {
                warn!(uid = %uid, sink, error = %e, "Failed to write synthetic reading; local echo kept");
            }
        });

        publisher.publish(reading).await;
        reading
    }

    async fn run(self, identity: Identity, publisher: FeedPublisher) {
        info!(
            uid = %identity.uid,
            sink = self.sink.name(),
            interval_secs = self.interval.as_secs(),
            "Synthetic reading generator started"
        );
        let mut rng = self.seed.map(fastrand::Rng::with_seed).unwrap_or_else(fastrand::Rng::new);
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.publish_synthetic_reading(&identity, &publisher, &mut rng).await;
        }
    }
}

impl ReadingSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn open(&self, identity: &Identity, publisher: FeedPublisher) -> BoxFuture<'static, ()> {
        self.clone().run(identity.clone(), publisher).boxed()
    }
}

/// Random reading within the documented demo ranges, rounded to 0.1.
pub fn synthetic_reading(rng: &mut fastrand::Rng, timestamp: i64) -> Reading {
    let mut within = |(lo, hi): (f64, f64)| ((lo + rng.f64() * (hi - lo)) * 10.0).round() / 10.0;
    Reading {
        temperature: within(TEMPERATURE_RANGE),
        humidity: within(HUMIDITY_RANGE),
        soil_moisture: within(SOIL_RANGE),
        is_raining: rng.f64() < RAIN_PROBABILITY,
        timestamp,
    }
}
