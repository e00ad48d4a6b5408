//! The scoreboard record and its element layout.
//!
//! SYSTEM CONTEXT
//! ==============
//! The backend store owns the authoritative record. This crate only ever holds
//! a projection of it per open view (see [`crate::view::DisplayedRecord`]),
//! rebuilt from accepted updates. [`Record`] is the full row shape as the
//! backend serves it.

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::canvas::Point;
use crate::consts;

/// Opaque record identifier.
pub type RecordId = Uuid;

// =============================================================================
// FIELD KEYS
// =============================================================================

/// One observed column of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Name,
    ASide,
    BSide,
    AScore,
    BScore,
    UpdatedAt,
    LivestreamEnabled,
    ElementPositions,
}

impl FieldKey {
    pub const ALL: [FieldKey; 8] = [
        FieldKey::Name,
        FieldKey::ASide,
        FieldKey::BSide,
        FieldKey::AScore,
        FieldKey::BScore,
        FieldKey::UpdatedAt,
        FieldKey::LivestreamEnabled,
        FieldKey::ElementPositions,
    ];

    /// Column name on the wire.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::ASide => "a_side",
            Self::BSide => "b_side",
            Self::AScore => "a_score",
            Self::BScore => "b_score",
            Self::UpdatedAt => "updated_at",
            Self::LivestreamEnabled => "livestream_enabled",
            Self::ElementPositions => "element_positions",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// =============================================================================
// ELEMENT POSITIONS
// =============================================================================

/// A draggable slot on the scoreboard canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementId {
    Title,
    ASide,
    BSide,
    AScore,
    BScore,
}

impl ElementId {
    pub const ALL: [ElementId; 5] =
        [ElementId::Title, ElementId::ASide, ElementId::BSide, ElementId::AScore, ElementId::BScore];

    /// Key used for this slot inside the `element_positions` object.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::ASide => "a_side",
            Self::BSide => "b_side",
            Self::AScore => "a_score",
            Self::BScore => "b_score",
        }
    }

    /// Parse a slot key; unknown keys yield `None`.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.key() == key)
    }
}

/// Canvas-space anchor for every slot. Every slot always has a position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementPositions {
    pub title: Point,
    pub a_side: Point,
    pub b_side: Point,
    pub a_score: Point,
    pub b_score: Point,
}

impl Default for ElementPositions {
    /// The documented default layout.
    fn default() -> Self {
        Self {
            title: consts::DEFAULT_TITLE,
            a_side: consts::DEFAULT_A_SIDE,
            b_side: consts::DEFAULT_B_SIDE,
            a_score: consts::DEFAULT_A_SCORE,
            b_score: consts::DEFAULT_B_SCORE,
        }
    }
}

impl ElementPositions {
    #[must_use]
    pub fn get(&self, id: ElementId) -> Point {
        match id {
            ElementId::Title => self.title,
            ElementId::ASide => self.a_side,
            ElementId::BSide => self.b_side,
            ElementId::AScore => self.a_score,
            ElementId::BScore => self.b_score,
        }
    }

    pub fn set(&mut self, id: ElementId, pos: Point) {
        let slot = match id {
            ElementId::Title => &mut self.title,
            ElementId::ASide => &mut self.a_side,
            ElementId::BSide => &mut self.b_side,
            ElementId::AScore => &mut self.a_score,
            ElementId::BScore => &mut self.b_score,
        };
        *slot = pos;
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// Full row as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: Option<String>,
    pub a_side: String,
    pub b_side: String,
    #[serde(default)]
    pub a_score: i64,
    #[serde(default)]
    pub b_score: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub livestream_enabled: bool,
    #[serde(default)]
    pub element_positions: ElementPositions,
}

impl Record {
    /// A fresh record with zero scores and the default layout.
    #[must_use]
    pub fn new(id: RecordId, a_side: impl Into<String>, b_side: impl Into<String>) -> Self {
        Self {
            id,
            name: None,
            a_side: a_side.into(),
            b_side: b_side.into(),
            a_score: 0,
            b_score: 0,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            livestream_enabled: false,
            element_positions: ElementPositions::default(),
        }
    }
}
