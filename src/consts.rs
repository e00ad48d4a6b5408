//! Shared numeric constants for the sync core.

use crate::canvas::{Point, Size};

// ── Canvas ──────────────────────────────────────────────────────

/// Logical canvas size. Element positions are stored in these units
/// regardless of how large the canvas is rendered on screen.
pub const CANVAS_SIZE: Size = Size { width: 1920.0, height: 1080.0 };

// ── Default layout ──────────────────────────────────────────────

/// Default anchor of the scoreboard title.
pub const DEFAULT_TITLE: Point = Point { x: 960.0, y: 120.0 };

/// Default anchor of the side-A name label.
pub const DEFAULT_A_SIDE: Point = Point { x: 480.0, y: 380.0 };

/// Default anchor of the side-B name label.
pub const DEFAULT_B_SIDE: Point = Point { x: 1440.0, y: 380.0 };

/// Default anchor of the side-A score.
pub const DEFAULT_A_SCORE: Point = Point { x: 480.0, y: 680.0 };

/// Default anchor of the side-B score.
pub const DEFAULT_B_SCORE: Point = Point { x: 1440.0, y: 680.0 };

// ── Remote channel ──────────────────────────────────────────────

/// First resubscribe delay after a channel drop, in milliseconds.
pub const DEFAULT_RESUBSCRIBE_BASE_MS: u64 = 500;

/// Ceiling for the exponential resubscribe delay, in milliseconds.
pub const DEFAULT_RESUBSCRIBE_MAX_MS: u64 = 10_000;

/// Upper bound of the random jitter added to each resubscribe delay.
pub const DEFAULT_RESUBSCRIBE_JITTER_MS: u64 = 250;

/// How often the polling feed re-reads the row.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

// ── Identity ────────────────────────────────────────────────────

/// Extra `ensure_identity` attempts before a write is rejected.
pub const IDENTITY_RETRIES: usize = 1;
