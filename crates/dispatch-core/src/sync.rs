//! In-process session that keeps a [`ClientMirror`] in step with the roster.
//!
//! The session subscribes before it takes a snapshot, so nothing published
//! in between is lost: those events are queued by the mirror and replayed
//! (or dropped as already reflected) once the snapshot lands. Eviction and
//! sequence gaps are handled the same way: resubscribe if needed, snapshot,
//! replay.

use crate::broadcast::{Broadcaster, Closed, Subscription};
use crate::mirror::{ApplyOutcome, ClientMirror};
use crate::roster::RosterView;

/// What one step of a [`SyncSession`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// A broadcast was fed to the mirror.
    Received(ApplyOutcome),
    /// The mirror was rebuilt from a fresh snapshot.
    Resynced,
}

/// One mirror wired to the broadcaster and the read view.
pub struct SyncSession {
    broadcaster: Broadcaster,
    view: RosterView,
    subscription: Subscription,
    mirror: ClientMirror,
    resyncs: u64,
}

impl SyncSession {
    /// Subscribe, then load the initial snapshot.
    pub async fn connect(broadcaster: Broadcaster, view: RosterView) -> Self {
        let subscription = broadcaster.subscribe();
        let mut session = Self {
            broadcaster,
            view,
            subscription,
            mirror: ClientMirror::new(),
            resyncs: 0,
        };
        session.mirror.begin_resync(session.subscription.first_seq());
        let snapshot = session.view.snapshot().await;
        session.mirror.apply_snapshot(snapshot);
        tracing::debug!(
            subscription = %session.subscription.id(),
            revision = session.mirror.watermark(),
            "Sync session connected"
        );
        session
    }

    /// The local mirror.
    pub const fn mirror(&self) -> &ClientMirror {
        &self.mirror
    }

    /// Number of resyncs after the initial snapshot.
    pub const fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Wait for the next broadcast and apply it.
    ///
    /// Recovers transparently from eviction and sequence gaps.
    pub async fn step(&mut self) -> SessionStep {
        match self.subscription.recv().await {
            Some(message) => self.feed(message).await,
            None => {
                self.resubscribe().await;
                SessionStep::Resynced
            }
        }
    }

    /// Apply everything already queued without waiting. Returns the
    /// number of steps taken.
    pub async fn drain(&mut self) -> usize {
        let mut steps = 0_usize;
        loop {
            match self.subscription.try_recv() {
                Ok(Some(message)) => {
                    self.feed(message).await;
                }
                Ok(None) => break,
                Err(Closed) => self.resubscribe().await,
            }
            steps = steps.saturating_add(1);
        }
        steps
    }

    /// Throw the mirror away and rebuild it from a snapshot on the current
    /// subscription.
    pub async fn resync(&mut self) {
        let next_seq = self.mirror.last_seq().saturating_add(1);
        self.mirror.begin_resync(next_seq);
        self.snapshot().await;
    }

    async fn feed(&mut self, message: dispatch_types::Broadcast) -> SessionStep {
        let outcome = self.mirror.receive(message);
        if outcome == ApplyOutcome::GapDetected {
            self.snapshot().await;
            return SessionStep::Resynced;
        }
        SessionStep::Received(outcome)
    }

    async fn resubscribe(&mut self) {
        tracing::info!(
            subscription = %self.subscription.id(),
            "Sync session evicted, resubscribing"
        );
        self.subscription = self.broadcaster.subscribe();
        self.mirror.begin_resync(self.subscription.first_seq());
        self.snapshot().await;
    }

    async fn snapshot(&mut self) {
        let snapshot = self.view.snapshot().await;
        self.mirror.apply_snapshot(snapshot);
        self.resyncs = self.resyncs.saturating_add(1);
    }
}
