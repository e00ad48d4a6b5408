//! In-memory fakes shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::Notify;

use crate::canvas::{CanvasSurface, ScreenRect};
use crate::decode::Snapshot;
use crate::fields::FieldValue;
use crate::record::{FieldKey, Record, RecordId};
use crate::remote::{FeedError, FeedEvent, FeedSink, FeedSubscription, RecordFeed, ResubscribeConfig};
use crate::store::{RecordStore, StoreError};

// =============================================================================
// BACKEND
// =============================================================================

#[derive(Default)]
struct BackendInner {
    rows: RefCell<HashMap<RecordId, Value>>,
    live: RefCell<Vec<(u64, RecordId, FeedSink)>>,
    issued: RefCell<Vec<(RecordId, FeedSink)>>,
    next_sub: Cell<u64>,
    subscribes: Cell<usize>,
    unsubscribes: Cell<usize>,
    fetches: Cell<usize>,
    writes: RefCell<Vec<(RecordId, FieldKey, FieldValue)>>,
    fail_writes: Cell<bool>,
    fail_fetches: Cell<bool>,
    failing_subscribes: Cell<usize>,
    hold_writes: Cell<bool>,
    release: Notify,
    echo_writes: Cell<bool>,
}

/// A backend that stores rows in memory and pushes the row to live
/// subscribers after every accepted write.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Rc<BackendInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let inner = BackendInner::default();
        inner.echo_writes.set(true);
        Self { inner: Rc::new(inner) }
    }

    pub fn with_record(record: &Record) -> Self {
        let backend = Self::new();
        backend.insert(record);
        backend
    }

    pub fn insert(&self, record: &Record) {
        let row = serde_json::to_value(record).unwrap();
        self.inner.rows.borrow_mut().insert(record.id, row);
    }

    pub fn row(&self, id: RecordId) -> Value {
        self.inner.rows.borrow().get(&id).cloned().unwrap()
    }

    /// Another client writes a column: store it and push the row.
    pub fn remote_write(&self, id: RecordId, key: FieldKey, value: Value) {
        self.write_column(id, key, value);
        self.push(id);
    }

    /// Push the current row to live subscribers of `id`.
    pub fn push(&self, id: RecordId) {
        let row = self.row(id);
        self.push_raw(id, row);
    }

    /// Push an arbitrary payload to live subscribers of `id`.
    pub fn push_raw(&self, id: RecordId, payload: Value) {
        let sinks: Vec<FeedSink> = self
            .inner
            .live
            .borrow()
            .iter()
            .filter(|(_, r, _)| *r == id)
            .map(|(_, _, s)| Rc::clone(s))
            .collect();
        for sink in sinks {
            sink(FeedEvent::Snapshot(Snapshot::new(payload.clone())));
        }
    }

    /// Deliver through every sink ever issued, including unsubscribed ones.
    pub fn push_late(&self, id: RecordId, payload: Value) {
        let sinks: Vec<FeedSink> = self
            .inner
            .issued
            .borrow()
            .iter()
            .filter(|(r, _)| *r == id)
            .map(|(_, s)| Rc::clone(s))
            .collect();
        for sink in sinks {
            sink(FeedEvent::Snapshot(Snapshot::new(payload.clone())));
        }
    }

    /// Drop every live channel for `id`.
    pub fn disconnect(&self, id: RecordId) {
        let sinks: Vec<FeedSink> = self
            .inner
            .live
            .borrow()
            .iter()
            .filter(|(_, r, _)| *r == id)
            .map(|(_, _, s)| Rc::clone(s))
            .collect();
        for sink in sinks {
            sink(FeedEvent::Disconnected);
        }
    }

    pub fn subscribes(&self) -> usize {
        self.inner.subscribes.get()
    }

    pub fn unsubscribes(&self) -> usize {
        self.inner.unsubscribes.get()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.inner.live.borrow().len()
    }

    pub fn fetches(&self) -> usize {
        self.inner.fetches.get()
    }

    pub fn writes(&self) -> Vec<(RecordId, FieldKey, FieldValue)> {
        self.inner.writes.borrow().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.set(fail);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.inner.fail_fetches.set(fail);
    }

    pub fn fail_next_subscribes(&self, count: usize) {
        self.inner.failing_subscribes.set(count);
    }

    /// Park writes until [`release_write`](Self::release_write).
    pub fn hold_writes(&self, hold: bool) {
        self.inner.hold_writes.set(hold);
    }

    pub fn release_write(&self) {
        self.inner.release.notify_one();
    }

    /// Whether a successful write pushes the row to subscribers.
    pub fn echo_writes(&self, echo: bool) {
        self.inner.echo_writes.set(echo);
    }

    fn write_column(&self, id: RecordId, key: FieldKey, value: Value) {
        let mut rows = self.inner.rows.borrow_mut();
        let row = rows.get_mut(&id).unwrap();
        let next = row
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
            + TimeDuration::seconds(1);
        row[key.column()] = value;
        row["updated_at"] = Value::String(next.format(&Rfc3339).unwrap());
    }
}

#[async_trait(?Send)]
impl RecordStore for MemoryBackend {
    async fn fetch(&self, record_id: RecordId) -> Result<Snapshot, StoreError> {
        self.inner.fetches.set(self.inner.fetches.get() + 1);
        if self.inner.fail_fetches.get() {
            return Err(StoreError::Transport("fetch refused".into()));
        }
        let row = self.inner.rows.borrow().get(&record_id).cloned();
        row.map(Snapshot::new).ok_or(StoreError::NotFound(record_id))
    }

    async fn persist_field(&self, record_id: RecordId, key: FieldKey, value: &FieldValue) -> Result<(), StoreError> {
        if self.inner.hold_writes.get() {
            self.inner.release.notified().await;
        }
        if self.inner.fail_writes.get() {
            return Err(StoreError::Status { status: 503, body: "unavailable".into() });
        }
        self.inner.writes.borrow_mut().push((record_id, key, value.clone()));
        self.write_column(record_id, key, serde_json::to_value(value)?);
        if self.inner.echo_writes.get() {
            self.push(record_id);
        }
        Ok(())
    }
}

struct MemorySubscription {
    backend: MemoryBackend,
    id: u64,
}

impl FeedSubscription for MemorySubscription {
    fn unsubscribe(self: Box<Self>) {
        let inner = &self.backend.inner;
        inner.live.borrow_mut().retain(|(id, _, _)| *id != self.id);
        inner.unsubscribes.set(inner.unsubscribes.get() + 1);
    }
}

#[async_trait(?Send)]
impl RecordFeed for MemoryBackend {
    async fn subscribe(&self, record_id: RecordId, sink: FeedSink) -> Result<Box<dyn FeedSubscription>, FeedError> {
        let failing = self.inner.failing_subscribes.get();
        if failing > 0 {
            self.inner.failing_subscribes.set(failing - 1);
            return Err(FeedError::Subscribe("channel refused".into()));
        }
        let id = self.inner.next_sub.get();
        self.inner.next_sub.set(id + 1);
        self.inner.subscribes.set(self.inner.subscribes.get() + 1);
        self.inner.live.borrow_mut().push((id, record_id, Rc::clone(&sink)));
        self.inner.issued.borrow_mut().push((record_id, sink));
        Ok(Box::new(MemorySubscription { backend: self.clone(), id }))
    }
}

// =============================================================================
// SURFACE
// =============================================================================

/// A canvas surface whose rectangle the test can change between events.
#[derive(Clone, Default)]
pub struct TestSurface {
    rect: Rc<Cell<Option<ScreenRect>>>,
}

impl TestSurface {
    pub fn mounted(rect: ScreenRect) -> Self {
        let surface = Self::default();
        surface.set(Some(rect));
        surface
    }

    pub fn set(&self, rect: Option<ScreenRect>) {
        self.rect.set(rect);
    }
}

impl CanvasSurface for TestSurface {
    fn screen_rect(&self) -> Option<ScreenRect> {
        self.rect.get()
    }
}

// =============================================================================
// ASYNC HELPERS
// =============================================================================

pub fn fast_resubscribe() -> ResubscribeConfig {
    ResubscribeConfig { base_ms: 1, max_ms: 4, jitter_ms: 0 }
}

/// Poll `cond` until it holds, yielding to other local tasks in between.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
