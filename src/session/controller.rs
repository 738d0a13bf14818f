use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Identity, SessionPhase};
use crate::{
    reading_cache::ReadingCache,
    source::{FeedPublisher, ReadingSource},
};

/// Binds the lifetime of exactly one data feed to the lifetime of exactly one
/// authenticated identity.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SubscriptionController {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn ReadingSource>,
    cache: ReadingCache,
    session: Mutex<Option<Session>>,
}

/// The signed-in principal and the one feed it owns.
struct Session {
    identity: Identity,
    subscription: Subscription,
}

struct Subscription {
    id: Uuid,
    epoch: u64,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Abort the feed task and wait until it is gone.
    async fn cancel(self) {
        self.handle.abort();
        let _ = self.handle.await;
        debug!(subscription_id = %self.id, epoch = self.epoch, "Feed cancelled");
    }
}

impl SubscriptionController {
    pub fn new(source: Arc<dyn ReadingSource>, cache: ReadingCache) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                cache,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn cache(&self) -> &ReadingCache {
        &self.inner.cache
    }

    pub fn source_name(&self) -> &'static str {
        self.inner.source.name()
    }

    /// Single entry point for authentication-state transitions.
    ///
    /// - same identity as the current one: no-op
    /// - same uid with a new token: restart the feed with the new token,
    ///   keeping the readings already received
    /// - different identity: cancel the current feed, then attach a new one
    /// - `None`: cancel the current feed and reset readings to loading
    pub async fn on_identity_change(&self, identity: Option<Identity>) {
        let mut guard = self.inner.session.lock().await;

        let token_refresh = match (guard.as_ref(), identity.as_ref()) {
            (Some(current), Some(next)) if current.identity.uid == next.uid => {
                if current.identity.id_token == next.id_token {
                    debug!(uid = %next.uid, "Identity unchanged; keeping current feed");
                    return;
                }
                true
            }
            (None, None) => return,
            _ => false,
        };

        // The lock stays held across the cancel: nobody sees an empty slot
        // while the old feed is still running.
        if let Some(session) = guard.take() {
            if token_refresh {
                info!(uid = %session.identity.uid, "Token refreshed; restarting feed");
            } else {
                info!(uid = %session.identity.uid, "Ending session");
            }
            session.subscription.cancel().await;
        }

        // Same principal: the old feed is gone, so its epoch can be reused
        // and the current reading stays visible.
        let epoch = if token_refresh {
            self.inner.cache.epoch().await
        } else {
            self.inner.cache.reset().await
        };

        let Some(identity) = identity else {
            info!("Signed out; feed detached");
            return;
        };

        let publisher = FeedPublisher::new(self.inner.cache.clone(), epoch);
        let feed = self.inner.source.open(&identity, publisher);
        let subscription = Subscription {
            id: Uuid::new_v4(),
            epoch,
            handle: tokio::spawn(feed),
        };
        info!(
            uid = %identity.uid,
            subscription_id = %subscription.id,
            epoch,
            source = self.inner.source.name(),
            "Feed attached"
        );
        *guard = Some(Session { identity, subscription });
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.inner.session.lock().await.as_ref().map(|s| s.identity.clone())
    }

    pub async fn phase(&self) -> SessionPhase {
        let attached = self.inner.session.lock().await.is_some();
        if !attached {
            SessionPhase::Idle
        } else if self.inner.cache.latest().await.is_none() {
            SessionPhase::Attaching
        } else {
            SessionPhase::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex as StdMutex,
        },
        time::Duration,
    };

    use futures_util::{future::BoxFuture, FutureExt};
    use serde_json::json;

    use super::*;

    /// Counts live feed futures; a feed is live from its first poll until it
    /// is dropped.
    #[derive(Default)]
    struct Tracker {
        active: AtomicUsize,
        max_active: AtomicUsize,
        opened: StdMutex<Vec<String>>,
        publishers: StdMutex<Vec<FeedPublisher>>,
    }

    struct LiveGuard(Arc<Tracker>);

    impl LiveGuard {
        fn enter(tracker: Arc<Tracker>) -> Self {
            let now = tracker.active.fetch_add(1, Ordering::SeqCst) + 1;
            tracker.max_active.fetch_max(now, Ordering::SeqCst);
            Self(tracker)
        }
    }

    impl Drop for LiveGuard {
        fn drop(&mut self) {
            self.0.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeSource {
        tracker: Arc<Tracker>,
        publish_on_start: bool,
    }

    impl ReadingSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn open(&self, identity: &Identity, publisher: FeedPublisher) -> BoxFuture<'static, ()> {
            self.tracker.opened.lock().unwrap().push(identity.uid.clone());
            self.tracker.publishers.lock().unwrap().push(publisher.clone());
            let tracker = self.tracker.clone();
            let publish = self.publish_on_start;
            async move {
                let _live = LiveGuard::enter(tracker);
                if publish {
                    publisher.publish_raw(&json!({ "temperature": 21 })).await;
                }
                futures_util::future::pending::<()>().await;
            }
            .boxed()
        }
    }

    fn controller(publish_on_start: bool) -> (SubscriptionController, Arc<Tracker>) {
        let tracker = Arc::new(Tracker::default());
        let source = FakeSource { tracker: tracker.clone(), publish_on_start };
        (SubscriptionController::new(Arc::new(source), ReadingCache::new()), tracker)
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn starts_idle() {
        let (ctl, _) = controller(true);
        assert_eq!(ctl.phase().await, SessionPhase::Idle);
        assert!(ctl.identity().await.is_none());
    }

    #[tokio::test]
    async fn same_identity_twice_keeps_one_feed() {
        let (ctl, tracker) = controller(true);
        ctl.on_identity_change(Some(Identity::new("alice"))).await;
        wait_for(|| tracker.active.load(Ordering::SeqCst) == 1).await;

        ctl.on_identity_change(Some(Identity::new("alice"))).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(tracker.opened.lock().unwrap().len(), 1);
        assert_eq!(tracker.active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_token_for_same_user_restarts_feed_and_keeps_reading() {
        let (ctl, tracker) = controller(true);
        let mut expired = Identity::new("alice");
        expired.id_token = Some("expired".into());
        ctl.on_identity_change(Some(expired)).await;
        let mut rx = ctl.cache().subscribe();
        wait_for(|| rx.borrow_and_update().is_some()).await;
        let epoch = ctl.cache().epoch().await;

        let mut fresh = Identity::new("alice");
        fresh.id_token = Some("fresh".into());
        ctl.on_identity_change(Some(fresh.clone())).await;
        wait_for(|| tracker.opened.lock().unwrap().len() == 2).await;
        wait_for(|| tracker.active.load(Ordering::SeqCst) == 1).await;

        assert_eq!(ctl.identity().await.unwrap().id_token.as_deref(), Some("fresh"));
        assert_eq!(tracker.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.cache().epoch().await, epoch);
        assert!(ctl.cache().latest().await.is_some());

        // The same token again is still a no-op.
        ctl.on_identity_change(Some(fresh)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.opened.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn identity_swap_cancels_before_attaching() {
        let (ctl, tracker) = controller(true);
        ctl.on_identity_change(Some(Identity::new("alice"))).await;
        wait_for(|| tracker.active.load(Ordering::SeqCst) == 1).await;

        ctl.on_identity_change(Some(Identity::new("bob"))).await;
        wait_for(|| tracker.opened.lock().unwrap().len() == 2).await;
        wait_for(|| tracker.active.load(Ordering::SeqCst) == 1).await;

        assert_eq!(tracker.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.opened.lock().unwrap(), vec!["alice", "bob"]);
        assert_eq!(ctl.identity().await.unwrap().uid, "bob");
    }

    #[tokio::test]
    async fn sign_out_cancels_and_resets_reading() {
        let (ctl, tracker) = controller(true);
        ctl.on_identity_change(Some(Identity::new("alice"))).await;
        let cache = ctl.cache().clone();
        let mut rx = cache.subscribe();
        wait_for(|| rx.borrow_and_update().is_some()).await;
        assert_eq!(ctl.phase().await, SessionPhase::Active);

        ctl.on_identity_change(None).await;

        assert_eq!(tracker.active.load(Ordering::SeqCst), 0);
        assert_eq!(ctl.phase().await, SessionPhase::Idle);
        assert!(cache.latest().await.is_none());
    }

    #[tokio::test]
    async fn attaching_until_first_reading() {
        let (ctl, tracker) = controller(false);
        ctl.on_identity_change(Some(Identity::new("alice"))).await;
        assert_eq!(ctl.phase().await, SessionPhase::Attaching);

        let publisher = tracker.publishers.lock().unwrap()[0].clone();
        publisher.publish_raw(&json!({ "humidity": 50 })).await;
        assert_eq!(ctl.phase().await, SessionPhase::Active);
    }

    #[tokio::test]
    async fn late_result_from_previous_identity_is_ignored() {
        let (ctl, tracker) = controller(false);
        ctl.on_identity_change(Some(Identity::new("alice"))).await;
        ctl.on_identity_change(Some(Identity::new("bob"))).await;

        let alice_publisher = tracker.publishers.lock().unwrap()[0].clone();
        assert!(!alice_publisher.publish_raw(&json!({ "temperature": 99 })).await);
        assert!(ctl.cache().latest().await.is_none());
        assert_eq!(ctl.phase().await, SessionPhase::Attaching);
    }

    #[tokio::test]
    async fn sign_out_when_idle_is_noop() {
        let (ctl, tracker) = controller(true);
        let epoch = ctl.cache().epoch().await;
        ctl.on_identity_change(None).await;
        assert_eq!(ctl.cache().epoch().await, epoch);
        assert!(tracker.opened.lock().unwrap().is_empty());
    }
}
