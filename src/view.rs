//! View composition: one mounted display of one record.
//!
//! DESIGN
//! ======
//! A [`RecordView`] owns everything a display needs for its lifetime and
//! nothing longer:
//!
//! - one [`FieldHandle`] per observed field
//! - one bus listener per field, feeding local broadcasts into the handle
//! - one remote subscription, with every handle registered as a target
//!
//! `mount` acquires all three, then seeds the handles from one fetch of the
//! row. Snapshots that arrive while the fetch is in flight are newer than it,
//! so the fetch only fills handles that are still idle.
//!
//! Dropping the view (or calling [`RecordView::unmount`]) deactivates every
//! handle, removes every bus listener, and releases the subscription in one
//! step. Anything still in flight afterwards finds an inactive handle and is
//! discarded.
//!
//! WRITES
//! ======
//! [`RecordView::commit`] is the only write path. It marks the field pending,
//! publishes the value on the bus so every same-process view updates at once,
//! then persists it. A failed persist is logged and returned; the optimistic
//! value stays on screen. The pending mark is held by an edit guard, so a
//! commit future dropped mid-persist still settles its edit.
//!
//! [`RecordView::drag_editor`] builds a drag editor wired to this view's bus
//! and layout field.

#[cfg(test)]
#[path = "view_test.rs"]
mod view_test;

use std::rc::Rc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::bus::{BusSubscription, LocalEventBus};
use crate::canvas::CanvasSurface;
use crate::decode::{Decoded, Snapshot};
use crate::drag::DragEditor;
use crate::fields::{AScore, ASide, BScore, BSide, Field, LivestreamEnabled, Name, Positions, UpdatedAt};
use crate::record::{ElementPositions, RecordId};
use crate::remote::{FeedError, RemoteSubscriber, SubscriptionHandle};
use crate::store::{RecordStore, StoreError};
use crate::sync::FieldHandle;

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("remote subscription failed: {0}")]
    Feed(#[from] FeedError),
}

// =============================================================================
// FIELDS
// =============================================================================

/// The handles of every observed field of one record.
#[derive(Clone)]
pub struct ViewFields {
    pub name: FieldHandle<Name>,
    pub a_side: FieldHandle<ASide>,
    pub b_side: FieldHandle<BSide>,
    pub a_score: FieldHandle<AScore>,
    pub b_score: FieldHandle<BScore>,
    pub updated_at: FieldHandle<UpdatedAt>,
    pub livestream_enabled: FieldHandle<LivestreamEnabled>,
    pub positions: FieldHandle<Positions>,
}

impl ViewFields {
    fn new(record_id: RecordId) -> Self {
        Self {
            name: FieldHandle::new(record_id),
            a_side: FieldHandle::new(record_id),
            b_side: FieldHandle::new(record_id),
            a_score: FieldHandle::new(record_id),
            b_score: FieldHandle::new(record_id),
            updated_at: FieldHandle::new(record_id),
            livestream_enabled: FieldHandle::new(record_id),
            positions: FieldHandle::new(record_id),
        }
    }

    fn deactivate(&self) {
        self.name.deactivate();
        self.a_side.deactivate();
        self.b_side.deactivate();
        self.a_score.deactivate();
        self.b_score.deactivate();
        self.updated_at.deactivate();
        self.livestream_enabled.deactivate();
        self.positions.deactivate();
    }

    fn revision(&self) -> u64 {
        self.name.revision()
            + self.a_side.revision()
            + self.b_side.revision()
            + self.a_score.revision()
            + self.b_score.revision()
            + self.updated_at.revision()
            + self.livestream_enabled.revision()
            + self.positions.revision()
    }
}

/// A field a [`RecordView`] can look up and commit.
pub trait ViewField: Field + Sized {
    fn handle(fields: &ViewFields) -> &FieldHandle<Self>;
}

macro_rules! view_field {
    ($($marker:ty => $slot:ident),* $(,)?) => {
        $(
            impl ViewField for $marker {
                fn handle(fields: &ViewFields) -> &FieldHandle<Self> {
                    &fields.$slot
                }
            }
        )*
    };
}

view_field! {
    Name => name,
    ASide => a_side,
    BSide => b_side,
    AScore => a_score,
    BScore => b_score,
    UpdatedAt => updated_at,
    LivestreamEnabled => livestream_enabled,
    Positions => positions,
}

/// Cached projection of the record as currently displayed. `None` means the
/// field has not received a value yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedRecord {
    pub id: RecordId,
    pub name: Option<Option<String>>,
    pub a_side: Option<String>,
    pub b_side: Option<String>,
    pub a_score: Option<i64>,
    pub b_score: Option<i64>,
    pub updated_at: Option<OffsetDateTime>,
    pub livestream_enabled: Option<bool>,
    pub element_positions: Option<ElementPositions>,
}

// =============================================================================
// VIEW
// =============================================================================

pub struct RecordView {
    record_id: RecordId,
    fields: ViewFields,
    bus: LocalEventBus,
    store: Rc<dyn RecordStore>,
    listeners: Vec<BusSubscription>,
    remote: Option<SubscriptionHandle>,
}

impl RecordView {
    /// Mount a view of `record_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Feed`] if the remote subscription cannot be
    /// opened. A failed initial fetch is not an error: the view mounts with
    /// idle fields and fills in from the next notification.
    pub async fn mount(
        record_id: RecordId,
        bus: &LocalEventBus,
        remote: &RemoteSubscriber,
        store: Rc<dyn RecordStore>,
    ) -> Result<Self, ViewError> {
        let fields = ViewFields::new(record_id);
        let listeners = vec![
            listen(bus, &fields.name),
            listen(bus, &fields.a_side),
            listen(bus, &fields.b_side),
            listen(bus, &fields.a_score),
            listen(bus, &fields.b_score),
            listen(bus, &fields.updated_at),
            listen(bus, &fields.livestream_enabled),
            listen(bus, &fields.positions),
        ];

        let handle = remote.open(record_id).await?;
        handle.register(Rc::new(fields.name.clone()));
        handle.register(Rc::new(fields.a_side.clone()));
        handle.register(Rc::new(fields.b_side.clone()));
        handle.register(Rc::new(fields.a_score.clone()));
        handle.register(Rc::new(fields.b_score.clone()));
        handle.register(Rc::new(fields.updated_at.clone()));
        handle.register(Rc::new(fields.livestream_enabled.clone()));
        handle.register(Rc::new(fields.positions.clone()));

        let view = Self { record_id, fields, bus: bus.clone(), store, listeners, remote: Some(handle) };
        view.seed().await;
        info!(%record_id, "view mounted");
        Ok(view)
    }

    async fn seed(&self) {
        let snapshot = match self.store.fetch(self.record_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(record_id = %self.record_id, error = %e, "initial fetch failed");
                return;
            }
        };
        seed(&self.fields.name, &snapshot);
        seed(&self.fields.a_side, &snapshot);
        seed(&self.fields.b_side, &snapshot);
        seed(&self.fields.a_score, &snapshot);
        seed(&self.fields.b_score, &snapshot);
        seed(&self.fields.updated_at, &snapshot);
        seed(&self.fields.livestream_enabled, &snapshot);
        seed(&self.fields.positions, &snapshot);
    }

    #[must_use]
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    #[must_use]
    pub fn fields(&self) -> &ViewFields {
        &self.fields
    }

    /// Sum of every field's revision. Changes exactly when something on
    /// screen changes.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.fields.revision()
    }

    #[must_use]
    pub fn displayed(&self) -> DisplayedRecord {
        DisplayedRecord {
            id: self.record_id,
            name: self.fields.name.displayed(),
            a_side: self.fields.a_side.displayed(),
            b_side: self.fields.b_side.displayed(),
            a_score: self.fields.a_score.displayed(),
            b_score: self.fields.b_score.displayed(),
            updated_at: self.fields.updated_at.displayed(),
            livestream_enabled: self.fields.livestream_enabled.displayed(),
            element_positions: self.fields.positions.displayed(),
        }
    }

    /// Displayed layout, or the default layout while it is still idle.
    #[must_use]
    pub fn positions(&self) -> ElementPositions {
        self.fields.positions.displayed().unwrap_or_default()
    }

    /// Apply `value` locally everywhere in this process, then persist it.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] from the write primitive. The local value
    /// is not rolled back.
    pub async fn commit<F: ViewField>(&self, value: F::Value) -> Result<(), StoreError> {
        let edit = F::handle(&self.fields).edit();
        let payload = F::wrap(value);
        self.bus.publish(self.record_id, F::KEY, &payload);

        let result = self.store.persist_field(self.record_id, F::KEY, &payload).await;
        drop(edit);

        if let Err(e) = &result {
            warn!(record_id = %self.record_id, field = %F::KEY, error = %e, "persist failed, keeping local value");
        }
        result
    }

    /// A drag editor for this record that holds the layout pending per gesture.
    #[must_use]
    pub fn drag_editor<S: CanvasSurface>(&self, surface: S) -> DragEditor<S> {
        DragEditor::new(self.record_id, surface, self.bus.clone()).tracking(self.fields.positions.clone())
    }

    /// Tear the view down. Same as dropping it.
    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for RecordView {
    fn drop(&mut self) {
        self.fields.deactivate();
        for listener in self.listeners.drain(..) {
            listener.unsubscribe();
        }
        if let Some(remote) = self.remote.take() {
            remote.close();
        }
        info!(record_id = %self.record_id, "view unmounted");
    }
}

fn listen<F: Field>(bus: &LocalEventBus, handle: &FieldHandle<F>) -> BusSubscription {
    let target = handle.clone();
    bus.subscribe(handle.record_id(), F::KEY, move |payload| {
        if let Some(value) = F::extract(payload) {
            target.apply_local(value);
        }
    })
}

fn seed<F: Field>(handle: &FieldHandle<F>, snapshot: &Snapshot) {
    match F::decode(snapshot) {
        Decoded::Value(value) => {
            handle.apply_initial(value);
        }
        Decoded::Rejected(rejection) => {
            debug!(record_id = %handle.record_id(), field = %F::KEY, %rejection, "initial value unusable");
        }
    }
}
