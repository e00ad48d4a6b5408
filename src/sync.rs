//! Field sync handle: per-field reconciliation of initial, local, and remote values.
//!
//! DESIGN
//! ======
//! [`FieldSync`] is a small pure state machine. It starts `Idle` and becomes
//! `Populated` with the first accepted value, tagged with where that value
//! came from. The rules:
//!
//! - Initial value (mount-time fetch): applied only while `Idle`. Anything
//!   already accepted is newer than the fetch.
//! - Local broadcast: always overwrites.
//! - Remote snapshot: a rejected decode is ignored. Otherwise the remote value
//!   wins, because it is a confirmed persisted write, with one exception:
//!   while this view has an unsettled edit in flight, a remote value equal to
//!   the pre-edit value is treated as a stale echo and the local value is
//!   kept. Accepting a remote value clears the in-flight mark.
//!
//! Edits are counted. Overlapping edits on one field share the pre-edit value
//! of the first, and the field stays pending until the last one settles.
//!
//! TRADE-OFFS
//! ==========
//! There is no version token in the protocol. Two quick local edits racing a
//! single remote echo can still show a brief reversion (3 -> 5 locally, the
//! echo of 4 arrives, display shows 4 until the echo of 5). This is accepted.
//!
//! [`FieldHandle`] wraps the machine for sharing between the bus listener, the
//! remote subscriber, and the view, and adds the "still active" guard: once
//! deactivated, every update is discarded. [`FieldHandle::edit`] returns an
//! [`EditGuard`] that settles its edit when dropped.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

use tokio::time::Instant;
use tracing::debug;

use crate::decode::{Decoded, Rejection, Snapshot};
use crate::fields::Field;
use crate::record::RecordId;
use crate::remote::SnapshotTarget;

// =============================================================================
// STATE
// =============================================================================

/// Where the displayed value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Initial,
    Local,
    Remote,
}

/// The most recently accepted update.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub origin: Origin,
    pub applied_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncState<T> {
    /// No data yet.
    Idle,
    Populated(Applied<T>),
}

/// What an update did to the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted. `changed` is false when the value equals what was displayed.
    Accepted { changed: bool },
    /// Remote value matched the pre-edit value of an in-flight edit.
    StaleEcho,
    /// Initial value arrived after something newer.
    Superseded,
    /// The snapshot did not carry a usable value for this field.
    Ignored(Rejection),
    /// The handle was torn down.
    Inactive,
}

#[derive(Debug, Clone)]
struct PendingEdit<T> {
    /// Displayed value before the first unsettled local edit.
    previous: Option<T>,
    /// Edits begun and not yet settled.
    depth: u32,
}

/// Reconciliation state for one field of one record.
#[derive(Debug)]
pub struct FieldSync<F: Field> {
    state: SyncState<F::Value>,
    pending: Option<PendingEdit<F::Value>>,
    revision: u64,
    _field: PhantomData<fn() -> F>,
}

impl<F: Field> Default for FieldSync<F> {
    fn default() -> Self {
        Self { state: SyncState::Idle, pending: None, revision: 0, _field: PhantomData }
    }
}

impl<F: Field> FieldSync<F> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &SyncState<F::Value> {
        &self.state
    }

    #[must_use]
    pub fn displayed(&self) -> Option<&F::Value> {
        match &self.state {
            SyncState::Idle => None,
            SyncState::Populated(applied) => Some(&applied.value),
        }
    }

    #[must_use]
    pub fn origin(&self) -> Option<Origin> {
        match &self.state {
            SyncState::Idle => None,
            SyncState::Populated(applied) => Some(applied.origin),
        }
    }

    /// Bumped every time the displayed value actually changes.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether a local edit from this view is still waiting on its persist.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn apply_initial(&mut self, value: F::Value) -> Outcome {
        if matches!(self.state, SyncState::Populated(_)) {
            return Outcome::Superseded;
        }
        self.accept(value, Origin::Initial)
    }

    pub fn apply_local(&mut self, value: F::Value) -> Outcome {
        self.accept(value, Origin::Local)
    }

    pub fn apply_remote(&mut self, decoded: Decoded<F::Value>) -> Outcome {
        let value = match decoded {
            Decoded::Value(v) => v,
            Decoded::Rejected(rejection) => return Outcome::Ignored(rejection),
        };

        if let Some(pending) = &self.pending {
            let is_echo_of_previous = pending.previous.as_ref() == Some(&value);
            if is_echo_of_previous && self.displayed() != Some(&value) {
                return Outcome::StaleEcho;
            }
        }

        self.pending = None;
        self.accept(value, Origin::Remote)
    }

    /// Mark the start of a local edit that will be persisted.
    ///
    /// Nested edits keep the value from before the first one.
    pub fn begin_edit(&mut self) {
        match &mut self.pending {
            Some(pending) => pending.depth = pending.depth.saturating_add(1),
            None => self.pending = Some(PendingEdit { previous: self.displayed().cloned(), depth: 1 }),
        }
    }

    /// One in-flight edit finished, successfully or not. The pending mark
    /// clears once every begun edit has settled.
    pub fn settle_edit(&mut self) {
        if let Some(pending) = &mut self.pending {
            pending.depth = pending.depth.saturating_sub(1);
            if pending.depth == 0 {
                self.pending = None;
            }
        }
    }

    fn accept(&mut self, value: F::Value, origin: Origin) -> Outcome {
        let changed = self.displayed() != Some(&value);
        if changed {
            self.revision += 1;
        }
        self.state = SyncState::Populated(Applied { value, origin, applied_at: Instant::now() });
        Outcome::Accepted { changed }
    }
}

// =============================================================================
// SHARED HANDLE
// =============================================================================

struct HandleInner<F: Field> {
    record_id: RecordId,
    active: Cell<bool>,
    sync: RefCell<FieldSync<F>>,
}

/// Shared, guarded [`FieldSync`]. Clones refer to the same state.
pub struct FieldHandle<F: Field> {
    inner: Rc<HandleInner<F>>,
}

impl<F: Field> Clone for FieldHandle<F> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<F: Field> FieldHandle<F> {
    #[must_use]
    pub fn new(record_id: RecordId) -> Self {
        Self {
            inner: Rc::new(HandleInner { record_id, active: Cell::new(true), sync: RefCell::new(FieldSync::new()) }),
        }
    }

    #[must_use]
    pub fn record_id(&self) -> RecordId {
        self.inner.record_id
    }

    /// Current displayed value, if any.
    #[must_use]
    pub fn displayed(&self) -> Option<F::Value> {
        self.inner.sync.borrow().displayed().cloned()
    }

    #[must_use]
    pub fn origin(&self) -> Option<Origin> {
        self.inner.sync.borrow().origin()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.sync.borrow().revision()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.sync.borrow().is_pending()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Stop accepting updates. Anything delivered afterwards is discarded.
    pub fn deactivate(&self) {
        self.inner.active.set(false);
    }

    pub fn apply_initial(&self, value: F::Value) -> Outcome {
        self.guarded(|sync| sync.apply_initial(value))
    }

    pub fn apply_local(&self, value: F::Value) -> Outcome {
        self.guarded(|sync| sync.apply_local(value))
    }

    pub fn apply_remote(&self, decoded: Decoded<F::Value>) -> Outcome {
        let outcome = self.guarded(|sync| sync.apply_remote(decoded));
        match &outcome {
            Outcome::Ignored(Rejection::Missing) | Outcome::Accepted { .. } | Outcome::Superseded => {}
            Outcome::Ignored(rejection) => {
                debug!(record_id = %self.inner.record_id, field = %F::KEY, %rejection, "remote value ignored");
            }
            Outcome::StaleEcho => {
                debug!(record_id = %self.inner.record_id, field = %F::KEY, "stale echo kept local value");
            }
            Outcome::Inactive => {
                debug!(record_id = %self.inner.record_id, field = %F::KEY, "remote value after teardown discarded");
            }
        }
        outcome
    }

    pub fn begin_edit(&self) {
        if self.is_active() {
            self.inner.sync.borrow_mut().begin_edit();
        }
    }

    pub fn settle_edit(&self) {
        if self.is_active() {
            self.inner.sync.borrow_mut().settle_edit();
        }
    }

    /// Begin an edit that settles when the returned guard is dropped.
    #[must_use = "dropping the guard settles the edit immediately"]
    pub fn edit(&self) -> EditGuard<F> {
        self.begin_edit();
        EditGuard { handle: self.clone() }
    }

    fn guarded(&self, apply: impl FnOnce(&mut FieldSync<F>) -> Outcome) -> Outcome {
        if !self.inner.active.get() {
            return Outcome::Inactive;
        }
        apply(&mut self.inner.sync.borrow_mut())
    }
}

/// One unsettled edit on a [`FieldHandle`]. Dropping it settles the edit.
pub struct EditGuard<F: Field> {
    handle: FieldHandle<F>,
}

impl<F: Field> std::fmt::Debug for EditGuard<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditGuard")
            .field("record_id", &self.handle.record_id())
            .field("field", &F::KEY)
            .finish()
    }
}

impl<F: Field> Drop for EditGuard<F> {
    fn drop(&mut self) {
        self.handle.settle_edit();
    }
}

impl<F: Field> SnapshotTarget for FieldHandle<F> {
    fn apply_snapshot(&self, snapshot: &Snapshot) {
        self.apply_remote(F::decode(snapshot));
    }
}
