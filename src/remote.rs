//! Remote change subscriber: one push-channel subscription per open record.
//!
//! DESIGN
//! ======
//! [`RemoteSubscriber::open`] subscribes to the backend feed for one record
//! and returns a [`SubscriptionHandle`]. Every snapshot the feed delivers is
//! fanned out synchronously to the [`SnapshotTarget`]s registered on the
//! handle (one per observed field). Each target decodes its own field, so a
//! bad property in a snapshot only affects that one field.
//!
//! Each upstream subscription is tagged with a generation number. Events from
//! an older generation, or any event after the handle is closed, are
//! discarded: nothing guarantees the feed stops calling the sink at the exact
//! moment it is told to unsubscribe.
//!
//! RECONNECT
//! =========
//! When the feed reports a disconnect, the dead subscription is released and a
//! local task resubscribes with exponential backoff plus jitter. A fresh
//! subscription does not replay what happened during the outage, so every
//! successful resubscribe is followed by one authoritative re-fetch of the
//! row, delivered to the targets like any other snapshot.
//!
//! Reconnect tasks run on the current `LocalSet`.
//!
//! LIFECYCLE
//! =========
//! Dropping or closing the handle releases the upstream subscription exactly
//! once, stops any reconnect in flight, and forgets all targets.

#[cfg(test)]
#[path = "remote_test.rs"]
mod remote_test;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_RESUBSCRIBE_BASE_MS, DEFAULT_RESUBSCRIBE_JITTER_MS, DEFAULT_RESUBSCRIBE_MAX_MS};
use crate::decode::Snapshot;
use crate::record::RecordId;
use crate::store::RecordStore;

// =============================================================================
// FEED CONTRACT
// =============================================================================

/// What a feed reports to its sink.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A persisted write happened; this is the full current row.
    Snapshot(Snapshot),
    /// The channel dropped. No further events will arrive on this subscription.
    Disconnected,
}

pub type FeedSink = Rc<dyn Fn(FeedEvent)>;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// Releases one upstream subscription.
pub trait FeedSubscription {
    fn unsubscribe(self: Box<Self>);
}

/// Backend push channel scoped to one record.
#[async_trait(?Send)]
pub trait RecordFeed {
    /// # Errors
    ///
    /// Returns a [`FeedError`] if the channel could not be joined.
    async fn subscribe(&self, record_id: RecordId, sink: FeedSink) -> Result<Box<dyn FeedSubscription>, FeedError>;
}

/// Receives every snapshot for the record it is registered on.
pub trait SnapshotTarget {
    fn apply_snapshot(&self, snapshot: &Snapshot);
}

// =============================================================================
// CONFIG
// =============================================================================

/// Backoff schedule for resubscribing after a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResubscribeConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter_ms: u64,
}

impl Default for ResubscribeConfig {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_RESUBSCRIBE_BASE_MS,
            max_ms: DEFAULT_RESUBSCRIBE_MAX_MS,
            jitter_ms: DEFAULT_RESUBSCRIBE_JITTER_MS,
        }
    }
}

impl ResubscribeConfig {
    /// Delay before resubscribe attempt `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self.base_ms.saturating_mul(1u64 << attempt.min(20)).min(self.max_ms);
        let jitter = if self.jitter_ms == 0 { 0 } else { rand::rng().random_range(0..=self.jitter_ms) };
        Duration::from_millis(backoff.saturating_add(jitter))
    }
}

// =============================================================================
// SUBSCRIBER
// =============================================================================

/// Opens per-record subscriptions on a shared feed.
pub struct RemoteSubscriber {
    feed: Rc<dyn RecordFeed>,
    store: Rc<dyn RecordStore>,
    config: ResubscribeConfig,
}

impl RemoteSubscriber {
    #[must_use]
    pub fn new(feed: Rc<dyn RecordFeed>, store: Rc<dyn RecordStore>, config: ResubscribeConfig) -> Self {
        Self { feed, store, config }
    }

    /// Subscribe to change notifications for `record_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`FeedError`] if the initial subscribe fails. Nothing is
    /// left allocated in that case.
    pub async fn open(&self, record_id: RecordId) -> Result<SubscriptionHandle, FeedError> {
        let channel = Rc::new(Channel {
            record_id,
            active: Cell::new(true),
            generation: Cell::new(0),
            targets: RefCell::new(Vec::new()),
            next_target: Cell::new(0),
            upstream: RefCell::new(None),
            reconnect: RefCell::new(None),
            dropped_during_reconnect: Cell::new(false),
            feed: Rc::clone(&self.feed),
            store: Rc::clone(&self.store),
            config: self.config,
        });

        let upstream = match self.feed.subscribe(record_id, Channel::sink(&channel, 0)).await {
            Ok(sub) => sub,
            Err(e) => {
                channel.active.set(false);
                warn!(%record_id, error = %e, "subscription open failed");
                return Err(e);
            }
        };
        *channel.upstream.borrow_mut() = Some(upstream);
        info!(%record_id, "subscription opened");

        Ok(SubscriptionHandle { channel })
    }
}

/// Identifies a registered target on one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetId(u64);

/// A live subscription. Released on [`close`](Self::close) or drop.
pub struct SubscriptionHandle {
    channel: Rc<Channel>,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        self.channel.record_id
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.channel.active.get()
    }

    /// Start routing snapshots to `target`.
    pub fn register(&self, target: Rc<dyn SnapshotTarget>) -> TargetId {
        let id = self.channel.next_target.get();
        self.channel.next_target.set(id + 1);
        self.channel.targets.borrow_mut().push((id, target));
        TargetId(id)
    }

    pub fn unregister(&self, id: TargetId) {
        self.channel.targets.borrow_mut().retain(|(t, _)| *t != id.0);
    }

    #[must_use]
    pub fn target_count(&self) -> usize {
        self.channel.targets.borrow().len()
    }

    /// Release the upstream subscription.
    pub fn close(self) {
        self.channel.shutdown();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.channel.shutdown();
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

struct Channel {
    record_id: RecordId,
    active: Cell<bool>,
    generation: Cell<u64>,
    targets: RefCell<Vec<(u64, Rc<dyn SnapshotTarget>)>>,
    next_target: Cell<u64>,
    upstream: RefCell<Option<Box<dyn FeedSubscription>>>,
    reconnect: RefCell<Option<JoinHandle<()>>>,
    dropped_during_reconnect: Cell<bool>,
    feed: Rc<dyn RecordFeed>,
    store: Rc<dyn RecordStore>,
    config: ResubscribeConfig,
}

impl Channel {
    fn sink(channel: &Rc<Self>, generation: u64) -> FeedSink {
        let weak = Rc::downgrade(channel);
        Rc::new(move |event| {
            if let Some(channel) = weak.upgrade() {
                channel.on_event(generation, event);
            }
        })
    }

    fn on_event(self: &Rc<Self>, generation: u64, event: FeedEvent) {
        if !self.active.get() || generation != self.generation.get() {
            debug!(record_id = %self.record_id, generation, "event from released subscription discarded");
            return;
        }
        match event {
            FeedEvent::Snapshot(snapshot) => self.deliver(&snapshot),
            FeedEvent::Disconnected => self.on_disconnect(),
        }
    }

    fn deliver(&self, snapshot: &Snapshot) {
        let targets: Vec<Rc<dyn SnapshotTarget>> = self.targets.borrow().iter().map(|(_, t)| Rc::clone(t)).collect();
        for target in targets {
            if !self.active.get() {
                return;
            }
            target.apply_snapshot(snapshot);
        }
    }

    /// Release whatever upstream subscription is installed.
    fn release_upstream(&self) {
        let upstream = self.upstream.borrow_mut().take();
        if let Some(upstream) = upstream {
            upstream.unsubscribe();
        }
    }

    fn on_disconnect(self: &Rc<Self>) {
        self.release_upstream();

        let running = self
            .reconnect
            .borrow()
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        if running {
            self.dropped_during_reconnect.set(true);
            return;
        }

        warn!(record_id = %self.record_id, "channel disconnected, resubscribing");
        let task = tokio::task::spawn_local(reconnect_loop(Rc::downgrade(self)));
        *self.reconnect.borrow_mut() = Some(task);
    }

    fn shutdown(&self) {
        if !self.active.replace(false) {
            return;
        }
        self.targets.borrow_mut().clear();
        let task = self.reconnect.borrow_mut().take();
        if let Some(task) = task {
            task.abort();
        }
        self.release_upstream();
        info!(record_id = %self.record_id, "subscription closed");
    }
}

async fn reconnect_loop(channel: Weak<Channel>) {
    let mut attempt: u32 = 0;
    loop {
        let delay = match channel.upgrade() {
            Some(ch) if ch.active.get() => ch.config.delay(attempt),
            _ => return,
        };
        tokio::time::sleep(delay).await;

        let Some(ch) = channel.upgrade() else {
            return;
        };
        if !ch.active.get() {
            return;
        }

        ch.release_upstream();
        let generation = ch.generation.get() + 1;
        ch.generation.set(generation);
        ch.dropped_during_reconnect.set(false);
        let feed = Rc::clone(&ch.feed);

        match feed.subscribe(ch.record_id, Channel::sink(&ch, generation)).await {
            Ok(sub) => {
                if !ch.active.get() {
                    sub.unsubscribe();
                    return;
                }
                *ch.upstream.borrow_mut() = Some(sub);
                info!(record_id = %ch.record_id, attempt, "resubscribed");
                refetch(&ch).await;

                if !ch.dropped_during_reconnect.get() {
                    return;
                }
                warn!(record_id = %ch.record_id, "channel dropped again during reconnect");
                attempt = 0;
            }
            Err(e) => {
                warn!(record_id = %ch.record_id, attempt, error = %e, "resubscribe failed");
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

async fn refetch(ch: &Channel) {
    let store = Rc::clone(&ch.store);
    match store.fetch(ch.record_id).await {
        Ok(snapshot) => {
            if ch.active.get() {
                debug!(record_id = %ch.record_id, "re-fetched row after reconnect");
                ch.deliver(&snapshot);
            }
        }
        Err(e) => {
            warn!(record_id = %ch.record_id, error = %e, "re-fetch after reconnect failed");
        }
    }
}
