//! Fan-out of accepted mutations to connected sessions.
//!
//! The broadcaster stamps each published body with a global sequence number
//! and enqueues it to every session under one short lock, so all sessions
//! observe the same total order. Each session has a bounded queue; a
//! session whose queue is full is evicted on the spot (its receiver ends)
//! rather than slowing the publisher down. An evicted owner resubscribes
//! and resyncs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dispatch_types::{Broadcast, BroadcastBody, DepartmentId, SyncEvent};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifies one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Hub {
    seq: u64,
    next_id: u64,
    sessions: BTreeMap<SubscriptionId, mpsc::Sender<Broadcast>>,
}

/// Session fan-out with per-session bounded queues.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    hub: Arc<Mutex<Hub>>,
    capacity: usize,
}

impl Broadcaster {
    /// Create a broadcaster whose sessions buffer at most `capacity`
    /// undelivered messages each.
    pub fn new(capacity: usize) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub::default())),
            capacity: capacity.max(1),
        }
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new session.
    ///
    /// The subscription receives every message published after this call
    /// returns, starting at [`Subscription::first_seq`].
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut hub = self.hub();
        hub.next_id = hub.next_id.saturating_add(1);
        let id = SubscriptionId(hub.next_id);
        hub.sessions.insert(id, tx);
        let first_seq = hub.seq.saturating_add(1);
        drop(hub);

        tracing::debug!(subscription = %id, first_seq, "Session subscribed");
        Subscription {
            id,
            rx,
            first_seq,
            hub: Arc::downgrade(&self.hub),
        }
    }

    /// Remove a session. Its receiver ends after draining what is queued.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.hub().sessions.remove(&id).is_some() {
            tracing::debug!(subscription = %id, "Session unsubscribed");
        }
    }

    /// Publish one message to every session. Returns its sequence number.
    ///
    /// Never blocks: sessions that cannot take the message are evicted.
    pub fn publish(&self, body: BroadcastBody) -> u64 {
        let mut hub = self.hub();
        hub.seq = hub.seq.saturating_add(1);
        let seq = hub.seq;

        let mut dropped = Vec::new();
        for (id, tx) in &hub.sessions {
            let message = Broadcast {
                seq,
                body: body.clone(),
            };
            match tx.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscription = %id, seq, "Session queue full, evicting");
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*id),
            }
        }
        for id in dropped {
            hub.sessions.remove(&id);
        }

        seq
    }

    /// Publish a batch of entity events in order.
    pub fn publish_events(&self, events: &[SyncEvent]) {
        for event in events {
            self.publish(BroadcastBody::Event(event.clone()));
        }
    }

    /// Tell sessions that a department's status catalog changed.
    pub fn publish_catalog_invalidated(&self, department: DepartmentId) -> u64 {
        self.publish(BroadcastBody::CatalogInvalidated(department))
    }

    /// Sequence number of the most recent publish (0 before the first).
    pub fn last_seq(&self) -> u64 {
        self.hub().seq
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.hub().sessions.len()
    }
}

/// One session's view of the broadcast stream.
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Broadcast>,
    first_seq: u64,
    hub: std::sync::Weak<Mutex<Hub>>,
}

impl Subscription {
    /// This subscription's id.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Sequence number of the first message this subscription can see.
    pub const fn first_seq(&self) -> u64 {
        self.first_seq
    }

    /// Next message. `None` once the session has been evicted or
    /// unsubscribed and its queue is drained.
    pub async fn recv(&mut self) -> Option<Broadcast> {
        self.rx.recv().await
    }

    /// Next message if one is queued.
    ///
    /// Returns `Err(Closed)` once the session has been evicted and drained.
    pub fn try_recv(&mut self) -> Result<Option<Broadcast>, Closed> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(Closed),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .sessions
                .remove(&self.id);
        }
    }
}

/// The subscription was evicted or the broadcaster is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("subscription closed")]
pub struct Closed;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use dispatch_types::CallId;

    use super::*;

    fn event(n: u64) -> BroadcastBody {
        BroadcastBody::Event(SyncEvent::call_deleted(CallId::new(), n))
    }

    #[tokio::test]
    async fn all_sessions_see_the_same_sequence() {
        let broadcaster = Broadcaster::new(16);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();
        assert_eq!(a.first_seq(), 1);

        let first = event(1);
        let second = event(2);
        broadcaster.publish(first.clone());
        broadcaster.publish(second.clone());

        for sub in [&mut a, &mut b] {
            let m1 = sub.recv().await.unwrap();
            let m2 = sub.recv().await.unwrap();
            assert_eq!((m1.seq, m1.body), (1, first.clone()));
            assert_eq!((m2.seq, m2.body), (2, second.clone()));
        }
    }

    #[tokio::test]
    async fn late_subscriber_starts_after_last_seq() {
        let broadcaster = Broadcaster::new(4);
        broadcaster.publish(event(1));
        let mut sub = broadcaster.subscribe();
        assert_eq!(sub.first_seq(), 2);
        broadcaster.publish(event(2));
        assert_eq!(sub.recv().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn full_queue_evicts_only_the_slow_session() {
        let broadcaster = Broadcaster::new(2);
        let mut slow = broadcaster.subscribe();
        let mut fast = broadcaster.subscribe();

        for n in 1..=2 {
            broadcaster.publish(event(n));
            fast.recv().await.unwrap();
        }
        // Third publish overflows the slow session.
        broadcaster.publish(event(3));
        assert_eq!(broadcaster.session_count(), 1);
        assert_eq!(fast.recv().await.unwrap().seq, 3);

        // The slow session drains what it had, then ends.
        assert_eq!(slow.recv().await.unwrap().seq, 1);
        assert_eq!(slow.recv().await.unwrap().seq, 2);
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let broadcaster = Broadcaster::new(4);
        let sub = broadcaster.subscribe();
        assert_eq!(broadcaster.session_count(), 1);
        drop(sub);
        assert_eq!(broadcaster.session_count(), 0);
    }

    #[test]
    fn publish_without_sessions_still_advances_seq() {
        let broadcaster = Broadcaster::new(4);
        assert_eq!(broadcaster.publish(event(1)), 1);
        assert_eq!(broadcaster.publish_catalog_invalidated(DepartmentId::new()), 2);
        assert_eq!(broadcaster.last_seq(), 2);
    }
}
