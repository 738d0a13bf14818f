use std::{fmt, time::Duration};

use futures_util::{future::BoxFuture, FutureExt, StreamExt};
use reqwest::Response;
use serde_json::{Map, Value};
use tokio::time;
use tracing::{debug, info, warn};

use super::{
    sse::{SseDecoder, SseEvent},
    FeedPublisher, ReadingSource,
};
use crate::{
    firebase::{models::StreamPayload, FirebaseClient},
    session::Identity,
};

/// Push subscription to `users/{uid}/sensorData/latest` over the realtime
/// database streaming REST protocol.
///
/// A local JSON snapshot of the location is kept and every `put` / `patch`
/// is applied to it; the snapshot is published whenever it is an object.
/// When the stream ends it is reopened after `reconnect_delay`, keeping the
/// snapshot (and the last published reading) in the meantime.
#[derive(Debug, Clone)]
pub struct FirebaseStreamSource {
    client: FirebaseClient,
    reconnect_delay: Duration,
}

/// Why a stream stopped delivering events.
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    Closed,
    Cancelled,
    AuthRevoked,
    Failed(String),
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed by server"),
            Self::Cancelled => f.write_str("cancelled by security rules"),
            Self::AuthRevoked => f.write_str("auth token revoked"),
            Self::Failed(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl FirebaseStreamSource {
    pub fn new(client: FirebaseClient, reconnect_delay: Duration) -> Self {
        Self { client, reconnect_delay }
    }

    async fn run(self, identity: Identity, publisher: FeedPublisher) {
        info!(uid = %identity.uid, "Realtime database subscription started");
        let mut snapshot = Value::Null;

        loop {
            match self.client.open_latest_stream(&identity).await {
                Ok(resp) => {
                    let end = consume(resp, &mut snapshot, &publisher).await;
                    warn!(uid = %identity.uid, reason = %end, "Realtime database stream ended");
                }
                Err(e) => {
                    warn!(uid = %identity.uid, error = %e, "Failed to open realtime database stream");
                }
            }
            time::sleep(self.reconnect_delay).await;
        }
    }
}

impl ReadingSource for FirebaseStreamSource {
    fn name(&self) -> &'static str {
        "firebase"
    }

    fn open(&self, identity: &Identity, publisher: FeedPublisher) -> BoxFuture<'static, ()> {
        self.clone().run(identity.clone(), publisher).boxed()
    }
}

async fn consume(resp: Response, snapshot: &mut Value, publisher: &FeedPublisher) -> StreamEnd {
    let mut body = resp.bytes_stream();
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => return StreamEnd::Failed(e.to_string()),
        };
        let events = match decoder.push(&chunk) {
            Ok(events) => events,
            Err(e) => return StreamEnd::Failed(e.to_string()),
        };
        for event in events {
            match apply_event(snapshot, &event) {
                Ok(true) if snapshot.is_object() => {
                    publisher.publish_raw(snapshot).await;
                }
                Ok(_) => {}
                Err(end) => return end,
            }
        }
    }
    StreamEnd::Closed
}

/// Apply one stream event to `snapshot`. `Ok(true)` when the snapshot changed.
fn apply_event(snapshot: &mut Value, event: &SseEvent) -> Result<bool, StreamEnd> {
    match event.event.as_str() {
        "put" | "patch" => {
            let payload: StreamPayload = match serde_json::from_str(&event.data) {
                Ok(p) => p,
                Err(e) => {
                    warn!(event = %event.event, error = %e, "Malformed stream payload; ignoring");
                    return Ok(false);
                }
            };
            if event.event == "put" {
                set_at_path(snapshot, &payload.path, payload.data);
            } else if let Value::Object(fields) = payload.data {
                for (key, value) in fields {
                    set_at_path(snapshot, &format!("{}/{key}", payload.path), value);
                }
            }
            Ok(true)
        }
        "keep-alive" => Ok(false),
        "cancel" => Err(StreamEnd::Cancelled),
        "auth_revoked" => Err(StreamEnd::AuthRevoked),
        other => {
            debug!(event = %other, "Ignoring unknown stream event");
            Ok(false)
        }
    }
}

/// Replace the value at a `/`-separated `path` inside `root`, creating
/// intermediate objects. A `null` value deletes the key.
fn set_at_path(root: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map.entry(segment.to_string()).or_insert(Value::Null);
    }

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        if value.is_null() {
            map.remove(*last);
        } else {
            map.insert(last.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use axum::{
        extract::{Query, State},
        http::{header, StatusCode},
        response::{IntoResponse, Response as AxumResponse},
        routing::get,
        Router,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{config::Config, reading_cache::ReadingCache};

    const PUT_READING: &str =
        "event: put\ndata: {\"path\":\"/\",\"data\":{\"temperature\":\"23.5\",\"is_rain\":1}}\n\n";

    /// Serves a fixed event-stream body at the latest-reading location, then
    /// closes the response. Requests without `?auth=tok` are rejected.
    struct StreamServer {
        hits: AtomicUsize,
        body: String,
    }

    async fn stream_handler(
        State(server): State<Arc<StreamServer>>,
        Query(q): Query<HashMap<String, String>>,
    ) -> AxumResponse {
        server.hits.fetch_add(1, Ordering::SeqCst);
        if q.get("auth").map(String::as_str) != Some("tok") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        ([(header::CONTENT_TYPE, "text/event-stream")], server.body.clone()).into_response()
    }

    async fn spawn_stream(body: &str) -> (FirebaseClient, Arc<StreamServer>) {
        let server = Arc::new(StreamServer { hits: AtomicUsize::new(0), body: body.to_owned() });
        let router = Router::new()
            .route("/users/{uid}/sensorData/latest.json", get(stream_handler))
            .with_state(server.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let config = Config::for_tests(&format!("http://{addr}"));
        (FirebaseClient::new(&config, reqwest::Client::new()), server)
    }

    fn identity() -> Identity {
        Identity { uid: "uid-1".into(), email: None, id_token: Some("tok".into()) }
    }

    async fn publisher() -> (ReadingCache, FeedPublisher) {
        let cache = ReadingCache::new();
        let epoch = cache.reset().await;
        (cache.clone(), FeedPublisher::new(cache, epoch))
    }

    #[tokio::test]
    async fn feed_publishes_put_and_reconnects_after_close() {
        let (client, server) = spawn_stream(PUT_READING).await;
        let (cache, publisher) = publisher().await;
        let source = FirebaseStreamSource::new(client, Duration::from_millis(20));

        let feed = tokio::spawn(source.open(&identity(), publisher));
        for _ in 0..200 {
            if server.hits.load(Ordering::SeqCst) >= 3 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        feed.abort();

        assert!(server.hits.load(Ordering::SeqCst) >= 3);
        let reading = cache.latest().await.unwrap();
        assert_eq!(reading.temperature, 23.5);
        assert!(reading.is_raining);
    }

    #[tokio::test]
    async fn cancel_ends_stream_before_later_events() {
        let body = format!(
            "{PUT_READING}event: cancel\ndata: null\n\n\
             event: put\ndata: {{\"path\":\"/temperature\",\"data\":99}}\n\n"
        );
        let (client, _server) = spawn_stream(&body).await;
        let (cache, publisher) = publisher().await;

        let resp = client.open_latest_stream(&identity()).await.unwrap();
        let mut snapshot = Value::Null;
        let end = consume(resp, &mut snapshot, &publisher).await;

        assert_eq!(end, StreamEnd::Cancelled);
        assert_eq!(cache.latest().await.unwrap().temperature, 23.5);
    }

    #[tokio::test]
    async fn exhausted_body_reports_closed() {
        let (client, _server) = spawn_stream("event: keep-alive\ndata: null\n\n").await;
        let (cache, publisher) = publisher().await;

        let resp = client.open_latest_stream(&identity()).await.unwrap();
        let end = consume(resp, &mut Value::Null, &publisher).await;

        assert_eq!(end, StreamEnd::Closed);
        assert!(cache.latest().await.is_none());
    }

    #[tokio::test]
    async fn rejected_token_fails_to_open() {
        let (client, server) = spawn_stream(PUT_READING).await;
        let mut anonymous = identity();
        anonymous.id_token = None;

        assert!(client.open_latest_stream(&anonymous).await.is_err());
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    fn event(kind: &str, data: Value) -> SseEvent {
        SseEvent { event: kind.to_owned(), data: data.to_string() }
    }

    #[test]
    fn put_at_root_replaces_snapshot() {
        let mut snap = json!({ "old": 1 });
        let changed = apply_event(&mut snap, &event("put", json!({ "path": "/", "data": { "temperature": 21 } })));
        assert_eq!(changed, Ok(true));
        assert_eq!(snap, json!({ "temperature": 21 }));
    }

    #[test]
    fn put_at_child_path_sets_field() {
        let mut snap = json!({ "temperature": 21, "humidity": 40 });
        apply_event(&mut snap, &event("put", json!({ "path": "/humidity", "data": 55 }))).unwrap();
        assert_eq!(snap, json!({ "temperature": 21, "humidity": 55 }));
    }

    #[test]
    fn patch_merges_fields_and_null_deletes() {
        let mut snap = json!({ "temperature": 21, "humidity": 40 });
        apply_event(
            &mut snap,
            &event("patch", json!({ "path": "/", "data": { "humidity": null, "is_rain": 1 } })),
        )
        .unwrap();
        assert_eq!(snap, json!({ "temperature": 21, "is_rain": 1 }));
    }

    #[test]
    fn nested_put_creates_intermediate_objects() {
        let mut snap = Value::Null;
        set_at_path(&mut snap, "/sensor_data/temperature", json!("22.5"));
        assert_eq!(snap, json!({ "sensor_data": { "temperature": "22.5" } }));
    }

    #[test]
    fn control_events() {
        let mut snap = Value::Null;
        assert_eq!(apply_event(&mut snap, &event("keep-alive", Value::Null)), Ok(false));
        assert_eq!(apply_event(&mut snap, &event("cancel", Value::Null)), Err(StreamEnd::Cancelled));
        assert_eq!(
            apply_event(&mut snap, &event("auth_revoked", Value::Null)),
            Err(StreamEnd::AuthRevoked)
        );
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let mut snap = json!({ "temperature": 1 });
        let bad = SseEvent { event: "put".into(), data: "not json".into() };
        assert_eq!(apply_event(&mut snap, &bad), Ok(false));
        assert_eq!(snap, json!({ "temperature": 1 }));
    }
}
