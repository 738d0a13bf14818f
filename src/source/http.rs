use std::time::Duration;

use futures_util::{future::BoxFuture, FutureExt};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time;
use tracing::{debug, info, warn};

use super::{FeedPublisher, ReadingSource};
use crate::session::Identity;

/// Polls an ordered list of JSON endpoints on a fixed interval.
///
/// Each cycle tries the URLs in order and publishes the first HTTP 200 whose
/// body is a JSON object. When every URL fails the cycle is abandoned and the
/// last published reading stays in place.
#[derive(Debug, Clone)]
pub struct HttpPollSource {
    http: Client,
    urls: Vec<String>,
    interval: Duration,
    timeout: Duration,
}

impl HttpPollSource {
    pub fn new(http: Client, urls: Vec<String>, interval: Duration, timeout: Duration) -> Self {
        Self { http, urls, interval, timeout }
    }

    /// One polling cycle. `None` means every URL failed.
    pub async fn fetch_first_available(&self) -> Option<Value> {
        for url in &self.urls {
            match self.fetch_one(url).await {
                Ok(Some(body)) => {
                    debug!(url = %url, "Sensor endpoint answered");
                    return Some(body);
                }
                Ok(None) => {
                    warn!(url = %url, "Sensor endpoint returned no object; trying next");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Sensor fetch failed; trying next");
                }
            }
        }
        None
    }

    async fn fetch_one(&self, url: &str) -> anyhow::Result<Option<Value>> {
        let resp = self.http.get(url).timeout(self.timeout).send().await?;
        if resp.status() != StatusCode::OK {
            anyhow::bail!("unexpected status {}", resp.status());
        }
        let body: Value = resp.json().await?;
        Ok(body.is_object().then_some(body))
    }

    async fn run(self, uid: String, publisher: FeedPublisher) {
        info!(
            uid = %uid,
            interval_secs = self.interval.as_secs(),
            urls = self.urls.len(),
            "Sensor polling loop started"
        );
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.fetch_first_available().await {
                Some(body) => {
                    publisher.publish_raw(&body).await;
                }
                None => {
                    warn!(uid = %uid, "All sensor fetch attempts failed; keeping last reading");
                }
            }
        }
    }
}

impl ReadingSource for HttpPollSource {
    fn name(&self) -> &'static str {
        "http"
    }

    fn open(&self, identity: &Identity, publisher: FeedPublisher) -> BoxFuture<'static, ()> {
        self.clone().run(identity.uid.clone(), publisher).boxed()
    }
}
