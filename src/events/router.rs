//! Session-scoped event fan-out
//!
//! Every published event goes to the process-wide broadcast. Events that carry
//! a session id are additionally delivered to the subscribers registered for
//! exactly that id. Subscribers live in a sharded map, so publishing to one
//! session never waits on another session's subscribers.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::SessionEmitter;
use crate::models::{SessionEvent, SessionId};

struct SubscriberSlot {
    id: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

struct RouterInner {
    sessions: DashMap<SessionId, Vec<SubscriberSlot>>,
    firehose: broadcast::Sender<SessionEvent>,
    next_subscriber: AtomicU64,
}

impl RouterInner {
    fn deregister(&self, session_id: &SessionId, subscriber: u64) {
        let now_empty = match self.sessions.get_mut(session_id) {
            Some(mut slots) => {
                slots.retain(|slot| slot.id != subscriber);
                slots.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.sessions
                .remove_if(session_id, |_, slots| slots.is_empty());
        }
    }
}

/// Publish/subscribe hub keyed by session id
#[derive(Clone)]
pub struct SessionRouter {
    inner: Arc<RouterInner>,
}

impl SessionRouter {
    /// `buffer_size` bounds the process-wide broadcast; session streams are unbounded
    pub fn new(buffer_size: usize) -> Self {
        let (firehose, _) = broadcast::channel(buffer_size.max(1));
        Self {
            inner: Arc::new(RouterInner {
                sessions: DashMap::new(),
                firehose,
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    /// Deliver an event to everyone entitled to see it
    pub fn publish(&self, event: SessionEvent) {
        if let Some(session_id) = &event.session_id {
            if let Some(slots) = self.inner.sessions.get(session_id) {
                for slot in slots.iter() {
                    // A closed receiver is about to deregister itself.
                    let _ = slot.tx.send(event.clone());
                }
            }
        }

        let _ = self.inner.firehose.send(event);
    }

    /// Stream of events published for `session_id` from now on
    pub fn subscribe(&self, session_id: impl Into<SessionId>) -> Subscription {
        let session_id = session_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);

        self.inner
            .sessions
            .entry(session_id.clone())
            .or_default()
            .push(SubscriberSlot { id, tx });

        debug!(session_id = %session_id, subscriber = id, "Session subscriber registered");

        Subscription {
            session_id,
            id,
            stream: UnboundedReceiverStream::new(rx),
            router: Arc::downgrade(&self.inner),
        }
    }

    /// Every event, regardless of session
    pub fn subscribe_all(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.firehose.subscribe()
    }

    /// Emitter that stamps every event with `session_id`
    pub fn emitter(&self, session_id: SessionId) -> SessionEmitter {
        SessionEmitter::new(self.clone(), Some(session_id))
    }

    /// Emitter for events not attributable to any caller
    pub fn process_emitter(&self) -> SessionEmitter {
        SessionEmitter::new(self.clone(), None)
    }

    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.inner
            .sessions
            .get(session_id)
            .map(|slots| slots.len())
            .unwrap_or(0)
    }

    /// Number of sessions with at least one subscriber
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }
}

/// Live view of one session's events
///
/// Dropping the subscription deregisters it; publishers need not notice.
pub struct Subscription {
    session_id: SessionId,
    id: u64,
    stream: UnboundedReceiverStream<SessionEvent>,
    router: Weak<RouterInner>,
}

impl Subscription {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.stream.next().await
    }

    /// Deregister and return the events that were already queued
    pub fn unsubscribe(mut self) -> Vec<SessionEvent> {
        self.deregister();

        let mut remaining = Vec::new();
        while let Ok(event) = self.stream.as_mut().try_recv() {
            remaining.push(event);
        }
        remaining
    }

    fn deregister(&self) {
        if let Some(inner) = self.router.upgrade() {
            inner.deregister(&self.session_id, self.id);
            debug!(session_id = %self.session_id, subscriber = self.id, "Session subscriber removed");
        }
    }
}

impl Stream for Subscription {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.deregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::{assert_pending, task};

    async fn recv_within(sub: &mut Subscription) -> SessionEvent {
        timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("event should arrive")
            .expect("stream should stay open")
    }

    #[tokio::test]
    async fn test_subscriber_receives_only_its_session() {
        let router = SessionRouter::new(16);
        let mut s1 = router.subscribe("S1");

        router.publish(SessionEvent::info(Some("S2".into()), "for s2"));
        router.publish(SessionEvent::info(None, "process wide"));
        router.publish(SessionEvent::info(Some("s1".into()), "wrong case"));
        router.publish(SessionEvent::info(Some("S1".into()), "for s1"));

        let event = recv_within(&mut s1).await;
        assert_eq!(event.message, "for s1");

        let mut next = task::spawn(s1.recv());
        assert_pending!(next.poll());
    }

    #[tokio::test]
    async fn test_new_subscription_has_no_backlog() {
        let router = SessionRouter::new(16);
        let emitter = router.emitter("S1".into());
        emitter.info("before");

        let mut s1 = router.subscribe("S1");
        emitter.info("after");

        assert_eq!(recv_within(&mut s1).await.message, "after");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_same_session() {
        let router = SessionRouter::new(16);
        let mut a = router.subscribe("S1");
        let mut b = router.subscribe("S1");
        assert_eq!(router.subscriber_count(&"S1".into()), 2);

        router.emitter("S1".into()).success("done");

        assert_eq!(recv_within(&mut a).await.message, "done");
        assert_eq!(recv_within(&mut b).await.message, "done");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_are_isolated() {
        let router = SessionRouter::new(16);
        let mut s1 = router.subscribe("S1");
        let mut s2 = router.subscribe("S2");

        let mut publishers = Vec::new();
        for sid in ["S1", "S2"] {
            let emitter = router.emitter(sid.into());
            publishers.push(tokio::spawn(async move {
                for i in 0..50 {
                    emitter.info(format!("{sid}-{i}"));
                    tokio::task::yield_now().await;
                }
            }));
        }
        let global = router.process_emitter();
        publishers.push(tokio::spawn(async move {
            for i in 0..50 {
                global.warn(format!("global-{i}"));
                tokio::task::yield_now().await;
            }
        }));
        for publisher in publishers {
            publisher.await.unwrap();
        }

        for (sub, sid) in [(&mut s1, "S1"), (&mut s2, "S2")] {
            let mut messages = Vec::new();
            for _ in 0..50 {
                let event = recv_within(sub).await;
                assert_eq!(event.session_id, Some(SessionId::from(sid)));
                messages.push(event.message);
            }
            let expected: Vec<String> = (0..50).map(|i| format!("{sid}-{i}")).collect();
            assert_eq!(messages, expected);

            let mut extra = task::spawn(sub.recv());
            assert_pending!(extra.poll());
        }
    }

    #[tokio::test]
    async fn test_drop_deregisters_subscriber() {
        let router = SessionRouter::new(16);
        let s1 = router.subscribe("S1");
        let other = router.subscribe("S1");
        assert_eq!(router.session_count(), 1);

        drop(s1);
        assert_eq!(router.subscriber_count(&"S1".into()), 1);

        drop(other);
        assert_eq!(router.subscriber_count(&"S1".into()), 0);
        assert_eq!(router.session_count(), 0);

        router.publish(SessionEvent::info(Some("S1".into()), "nobody listening"));
    }

    #[tokio::test]
    async fn test_unsubscribe_returns_queued_events() {
        let router = SessionRouter::new(16);
        let sub = router.subscribe("S1");
        let emitter = router.emitter("S1".into());
        emitter.info("one");
        emitter.warn("two");
        emitter.error("three");

        let remaining = sub.unsubscribe();
        let messages: Vec<_> = remaining.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
        assert_eq!(router.session_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_during_publication() {
        let router = SessionRouter::new(16);
        let mut sub = router.subscribe("S1");

        let emitter = router.emitter("S1".into());
        let publisher = tokio::spawn(async move {
            for i in 0..1000 {
                emitter.debug(format!("tick {i}"));
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });

        for _ in 0..10 {
            recv_within(&mut sub).await;
        }
        drop(sub);

        publisher.await.unwrap();
        assert_eq!(router.session_count(), 0);
    }

    #[tokio::test]
    async fn test_firehose_sees_every_event() {
        let router = SessionRouter::new(16);
        let mut all = router.subscribe_all();

        router.process_emitter().info("global");
        router.emitter("S1".into()).info("scoped");

        let first = all.recv().await.unwrap();
        assert_eq!(first.session_id, None);
        let second = all.recv().await.unwrap();
        assert_eq!(second.session_id, Some("S1".into()));
    }
}
