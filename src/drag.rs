//! Drag/coordinate editor: pointer-driven relocation of scoreboard elements.
//!
//! DESIGN
//! ======
//! A drag session exists only between pointer-down on an element and the
//! matching release. It remembers which element is moving and the offset
//! from the element's anchor to the pointer at grab time, in canvas units, so
//! the element does not jump to sit under the pointer.
//!
//! Every pointer position is mapped from screen space into canvas space with a
//! transform rebuilt from the surface's current on-screen rectangle. The
//! rectangle is re-read on every event: the canvas can be resized or reflowed
//! between two pointer moves.
//!
//! Moves are broadcast on the local event bus as previews, and the final
//! layout is broadcast once more on release. [`DragEditor::end_drag`] also
//! hands that layout back for the host to persist through
//! [`crate::view::RecordView::commit`], the same path as any other edit.
//!
//! A gesture is an unsettled local edit of the layout. An editor built with
//! [`DragEditor::tracking`] holds the view's positions field pending from
//! grab until the [`DragRelease`] (or [`LayoutReset`]) is dropped, so a
//! snapshot carrying the pre-drag layout cannot snap the element back under
//! the pointer. Keep the release alive until its commit returns.
//!
//! ERROR HANDLING
//! ==============
//! Grabbing before the canvas has a usable rectangle, or naming an element
//! that does not exist, is a silent no-op. Both happen routinely while the
//! first frame is still laying out.

#[cfg(test)]
#[path = "drag_test.rs"]
mod drag_test;

use tracing::debug;

use crate::bus::LocalEventBus;
use crate::canvas::{CanvasSurface, CanvasTransform, Point, Size};
use crate::consts::CANVAS_SIZE;
use crate::fields::{FieldValue, Positions};
use crate::record::{ElementId, ElementPositions, FieldKey, RecordId};
use crate::sync::{EditGuard, FieldHandle};

/// An element moved to a new canvas position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionChange {
    pub element: ElementId,
    pub x: f64,
    pub y: f64,
}

/// Final state handed back when a drag ends.
///
/// Holds the tracked field pending until dropped.
#[derive(Debug)]
pub struct DragRelease {
    /// Last position of the dragged element.
    pub change: PositionChange,
    /// Full layout including the move, ready to persist.
    pub positions: ElementPositions,
    _edit: Option<EditGuard<Positions>>,
}

impl PartialEq for DragRelease {
    fn eq(&self, other: &Self) -> bool {
        self.change == other.change && self.positions == other.positions
    }
}

/// Default layout handed back by [`DragEditor::reset_positions`].
///
/// Holds the tracked field pending until dropped.
#[derive(Debug)]
pub struct LayoutReset {
    pub positions: ElementPositions,
    _edit: Option<EditGuard<Positions>>,
}

impl PartialEq for LayoutReset {
    fn eq(&self, other: &Self) -> bool {
        self.positions == other.positions
    }
}

/// The in-progress gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub element: ElementId,
    /// Pointer minus element anchor at grab time, in canvas units.
    pub pointer_offset: Point,
    /// Most recent position emitted for the element.
    pub last: Point,
}

/// Pointer-to-canvas drag state machine for one record's layout.
pub struct DragEditor<S> {
    record_id: RecordId,
    surface: S,
    logical: Size,
    bus: LocalEventBus,
    session: Option<DragSession>,
    working: ElementPositions,
    tracked: Option<FieldHandle<Positions>>,
    edit: Option<EditGuard<Positions>>,
}

impl<S: CanvasSurface> DragEditor<S> {
    #[must_use]
    pub fn new(record_id: RecordId, surface: S, bus: LocalEventBus) -> Self {
        Self {
            record_id,
            surface,
            logical: CANVAS_SIZE,
            bus,
            session: None,
            working: ElementPositions::default(),
            tracked: None,
            edit: None,
        }
    }

    /// Hold `field` pending for the length of each gesture.
    #[must_use]
    pub fn tracking(mut self, field: FieldHandle<Positions>) -> Self {
        self.tracked = Some(field);
        self
    }

    /// Override the logical canvas size.
    #[must_use]
    pub fn with_logical_size(mut self, logical: Size) -> Self {
        self.logical = logical;
        self
    }

    #[must_use]
    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    /// Pointer-down on `element`. Returns whether a session started.
    pub fn begin_drag(&mut self, element: ElementId, pointer: Point, current: &ElementPositions) -> bool {
        let Some(canvas_pointer) = self.map_to_canvas(pointer) else {
            debug!(record_id = %self.record_id, ?element, "drag ignored: canvas has no transform yet");
            return false;
        };
        let anchor = current.get(element);
        if self.edit.is_none() {
            self.edit = self.tracked.as_ref().map(FieldHandle::edit);
        }
        self.working = *current;
        self.session = Some(DragSession { element, pointer_offset: canvas_pointer.sub(anchor), last: anchor });
        true
    }

    /// [`begin_drag`](Self::begin_drag) for a host that only has the element's key.
    pub fn begin_drag_named(&mut self, key: &str, pointer: Point, current: &ElementPositions) -> bool {
        match ElementId::from_key(key) {
            Some(element) => self.begin_drag(element, pointer, current),
            None => {
                debug!(record_id = %self.record_id, key, "drag ignored: unknown element");
                false
            }
        }
    }

    /// Pointer-move. Emits the element's new canvas position while a drag is active.
    pub fn update_drag(&mut self, pointer: Point) -> Option<PositionChange> {
        let session = self.session?;
        let canvas_pointer = self.map_to_canvas(pointer)?;
        let position = canvas_pointer.sub(session.pointer_offset);

        self.working.set(session.element, position);
        self.session = Some(DragSession { last: position, ..session });
        self.bus
            .publish(self.record_id, FieldKey::ElementPositions, &FieldValue::Positions(self.working));

        Some(PositionChange { element: session.element, x: position.x, y: position.y })
    }

    /// Release, normal or not. Always clears the session.
    ///
    /// Broadcasts the final layout once more and hands it back.
    pub fn end_drag(&mut self) -> Option<DragRelease> {
        let session = self.session.take()?;
        let change = PositionChange { element: session.element, x: session.last.x, y: session.last.y };
        self.bus
            .publish(self.record_id, FieldKey::ElementPositions, &FieldValue::Positions(self.working));
        Some(DragRelease { change, positions: self.working, _edit: self.edit.take() })
    }

    /// Abandon any drag and broadcast the default layout for `record_id`.
    ///
    /// Returns the layout for the host to persist.
    pub fn reset_positions(&mut self, record_id: RecordId) -> LayoutReset {
        self.session = None;
        let defaults = ElementPositions::default();
        let mut edit = None;
        if record_id == self.record_id {
            self.working = defaults;
            edit = self.edit.take().or_else(|| self.tracked.as_ref().map(FieldHandle::edit));
        }
        self.bus
            .publish(record_id, FieldKey::ElementPositions, &FieldValue::Positions(defaults));
        LayoutReset { positions: defaults, _edit: edit }
    }

    fn map_to_canvas(&self, pointer: Point) -> Option<Point> {
        let rect = self.surface.screen_rect()?;
        let transform = CanvasTransform::fit(self.logical, rect)?;
        Some(transform.screen_to_canvas(pointer))
    }
}
