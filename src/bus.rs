//! Local event bus: same-process, synchronous field broadcasts.
//!
//! DESIGN
//! ======
//! A user's own edit is published here the moment it happens, before any
//! network round trip, so the initiating view and every other view open in
//! this process update immediately. Listeners are keyed by
//! `(record_id, field)`. The bus is an explicit value: views receive a clone
//! of it instead of reaching for a process-wide dispatcher, and dropping the
//! last clone drops every listener with it.
//!
//! Delivery is synchronous and at most once per listener per publish. The set
//! of recipients is fixed when `publish` starts: a listener added from inside
//! a handler misses the in-flight event, and one removed from inside a handler
//! is skipped if it has not run yet.
//!
//! `publish` runs on every pointer move of a drag, so it does not copy the
//! listener list. Ids are handed out in increasing order and each topic's list
//! stays sorted by id; delivery walks the list with an id cursor, re-reading
//! it between handlers, and stops at the first id issued after the publish
//! began.
//!
//! Nothing here crosses a process boundary; that is the remote subscriber's
//! job.

#[cfg(test)]
#[path = "bus_test.rs"]
mod bus_test;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::fields::FieldValue;
use crate::record::{FieldKey, RecordId};

type Topic = (RecordId, FieldKey);
type Handler = Rc<dyn Fn(&FieldValue)>;

struct Listener {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: Cell<u64>,
    listeners: RefCell<HashMap<Topic, Vec<Listener>>>,
}

impl BusInner {
    /// First listener on `topic` with `from <= id < until`.
    fn next_recipient(&self, topic: Topic, from: u64, until: u64) -> Option<(u64, Handler)> {
        let listeners = self.listeners.borrow();
        let list = listeners.get(&topic)?;
        let next = list.get(list.partition_point(|l| l.id < from))?;
        (next.id < until).then(|| (next.id, Rc::clone(&next.handler)))
    }

    fn remove(&self, topic: Topic, id: u64) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(list) = listeners.get_mut(&topic) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                listeners.remove(&topic);
            }
        }
    }
}

/// Handle to a shared in-process bus. Cloning shares the same listener set.
#[derive(Clone, Default)]
pub struct LocalEventBus {
    inner: Rc<BusInner>,
}

impl LocalEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `(record_id, key)`.
    ///
    /// The listener stays registered until the returned subscription is
    /// unsubscribed or dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        record_id: RecordId,
        key: FieldKey,
        handler: impl Fn(&FieldValue) + 'static,
    ) -> BusSubscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let active = Rc::new(Cell::new(true));

        self.inner
            .listeners
            .borrow_mut()
            .entry((record_id, key))
            .or_default()
            .push(Listener { id, handler: Rc::new(handler) });

        BusSubscription { bus: Rc::downgrade(&self.inner), topic: (record_id, key), id, active }
    }

    /// Deliver `value` to every listener currently registered for
    /// `(record_id, key)`. Returns how many handlers ran.
    pub fn publish(&self, record_id: RecordId, key: FieldKey, value: &FieldValue) -> usize {
        let topic = (record_id, key);
        let until = self.inner.next_id.get();
        let mut from = 0;
        let mut delivered = 0;
        while let Some((id, handler)) = self.inner.next_recipient(topic, from, until) {
            from = id + 1;
            handler(value);
            delivered += 1;
        }
        delivered
    }

    /// Number of live listeners for `(record_id, key)`.
    #[must_use]
    pub fn listener_count(&self, record_id: RecordId, key: FieldKey) -> usize {
        self.inner
            .listeners
            .borrow()
            .get(&(record_id, key))
            .map_or(0, Vec::len)
    }
}

/// Registration returned by [`LocalEventBus::subscribe`].
pub struct BusSubscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: u64,
    active: Rc<Cell<bool>>,
}

impl BusSubscription {
    /// Remove the listener. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.topic, self.id);
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
