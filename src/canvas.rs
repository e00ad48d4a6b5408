//! Canvas geometry: points, sizes, and the screen-to-canvas transform.
//!
//! DESIGN
//! ======
//! Element positions live in a fixed logical canvas (see
//! [`crate::consts::CANVAS_SIZE`]). The canvas is rendered "contain"-fit into
//! whatever on-screen rectangle the host gives it, so the scale is uniform and
//! any spare room on one axis becomes letterbox bars split evenly on both
//! sides. [`CanvasTransform::fit`] derives the mapping from the current
//! on-screen rectangle; callers rebuild it on every pointer event because the
//! rectangle can change between events.

#[cfg(test)]
#[path = "canvas_test.rs"]
mod canvas_test;

use serde::{Deserialize, Serialize};

/// A point in either screen space (CSS pixels) or canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Component-wise `self - other`.
    #[must_use]
    pub fn sub(self, other: Point) -> Point {
        Point { x: self.x - other.x, y: self.y - other.y }
    }
}

/// Width and height of the logical canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// The canvas element's rendered rectangle, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Uniform scale plus offset mapping canvas units to screen pixels.
///
/// `screen = canvas * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CanvasTransform {
    /// Fit a logical canvas into an on-screen rectangle, preserving aspect ratio.
    ///
    /// Returns `None` when either side has no area (canvas not laid out yet).
    #[must_use]
    pub fn fit(logical: Size, rect: ScreenRect) -> Option<Self> {
        if !(logical.width > 0.0 && logical.height > 0.0 && rect.width > 0.0 && rect.height > 0.0) {
            return None;
        }
        let scale = (rect.width / logical.width).min(rect.height / logical.height);
        let offset_x = rect.left + (rect.width - logical.width * scale) / 2.0;
        let offset_y = rect.top + (rect.height - logical.height * scale) / 2.0;
        Some(Self { scale, offset_x, offset_y })
    }

    /// Convert a screen-space point to canvas coordinates.
    #[must_use]
    pub fn screen_to_canvas(&self, screen: Point) -> Point {
        Point { x: (screen.x - self.offset_x) / self.scale, y: (screen.y - self.offset_y) / self.scale }
    }

    /// Convert a canvas point to screen coordinates.
    #[must_use]
    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        Point { x: canvas.x * self.scale + self.offset_x, y: canvas.y * self.scale + self.offset_y }
    }
}

/// Host-side view of the mounted canvas element.
pub trait CanvasSurface {
    /// The element's current on-screen rectangle, or `None` before it is mounted.
    fn screen_rect(&self) -> Option<ScreenRect>;
}
