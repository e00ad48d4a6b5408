//! Observed field types.
//!
//! Each column the display tracks gets a zero-sized marker implementing
//! [`Field`]. The marker ties together the column key, the typed value, the
//! snapshot decoder, and the conversion to and from the untyped
//! [`FieldValue`] carried by the local event bus and the write primitive.

#[cfg(test)]
#[path = "fields_test.rs"]
mod fields_test;

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::decode::{self, Decoded, Snapshot};
use crate::record::{ElementPositions, FieldKey};

/// Payload of a local broadcast or a persist request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    OptionalText(Option<String>),
    Text(String),
    Integer(i64),
    Flag(bool),
    Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    Positions(ElementPositions),
}

/// One observed column of the record.
pub trait Field: 'static {
    type Value: Clone + PartialEq + fmt::Debug;

    const KEY: FieldKey;

    /// Decode this field out of a full-row snapshot.
    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value>;

    fn wrap(value: Self::Value) -> FieldValue;

    /// Typed view of a bus payload; `None` if it belongs to another field type.
    fn extract(value: &FieldValue) -> Option<Self::Value>;
}

/// `name`: optional title text.
#[derive(Debug)]
pub struct Name;

/// `a_side`: side-A display name.
#[derive(Debug)]
pub struct ASide;

/// `b_side`: side-B display name.
#[derive(Debug)]
pub struct BSide;

/// `a_score`.
#[derive(Debug)]
pub struct AScore;

/// `b_score`.
#[derive(Debug)]
pub struct BScore;

/// `updated_at`: last persisted write.
#[derive(Debug)]
pub struct UpdatedAt;

/// `livestream_enabled`.
#[derive(Debug)]
pub struct LivestreamEnabled;

/// `element_positions`: the draggable layout.
#[derive(Debug)]
pub struct Positions;

impl Field for Name {
    type Value = Option<String>;
    const KEY: FieldKey = FieldKey::Name;

    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value> {
        decode::optional_text(snapshot, Self::KEY)
    }

    fn wrap(value: Self::Value) -> FieldValue {
        FieldValue::OptionalText(value)
    }

    fn extract(value: &FieldValue) -> Option<Self::Value> {
        match value {
            FieldValue::OptionalText(v) => Some(v.clone()),
            FieldValue::Text(v) => Some(Some(v.clone())),
            _ => None,
        }
    }
}

impl Field for ASide {
    type Value = String;
    const KEY: FieldKey = FieldKey::ASide;

    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value> {
        decode::text(snapshot, Self::KEY)
    }

    fn wrap(value: Self::Value) -> FieldValue {
        FieldValue::Text(value)
    }

    fn extract(value: &FieldValue) -> Option<Self::Value> {
        text_of(value)
    }
}

impl Field for BSide {
    type Value = String;
    const KEY: FieldKey = FieldKey::BSide;

    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value> {
        decode::text(snapshot, Self::KEY)
    }

    fn wrap(value: Self::Value) -> FieldValue {
        FieldValue::Text(value)
    }

    fn extract(value: &FieldValue) -> Option<Self::Value> {
        text_of(value)
    }
}

impl Field for AScore {
    type Value = i64;
    const KEY: FieldKey = FieldKey::AScore;

    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value> {
        decode::integer(snapshot, Self::KEY)
    }

    fn wrap(value: Self::Value) -> FieldValue {
        FieldValue::Integer(value)
    }

    fn extract(value: &FieldValue) -> Option<Self::Value> {
        integer_of(value)
    }
}

impl Field for BScore {
    type Value = i64;
    const KEY: FieldKey = FieldKey::BScore;

    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value> {
        decode::integer(snapshot, Self::KEY)
    }

    fn wrap(value: Self::Value) -> FieldValue {
        FieldValue::Integer(value)
    }

    fn extract(value: &FieldValue) -> Option<Self::Value> {
        integer_of(value)
    }
}

impl Field for UpdatedAt {
    type Value = OffsetDateTime;
    const KEY: FieldKey = FieldKey::UpdatedAt;

    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value> {
        decode::timestamp(snapshot, Self::KEY)
    }

    fn wrap(value: Self::Value) -> FieldValue {
        FieldValue::Timestamp(value)
    }

    fn extract(value: &FieldValue) -> Option<Self::Value> {
        match value {
            FieldValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl Field for LivestreamEnabled {
    type Value = bool;
    const KEY: FieldKey = FieldKey::LivestreamEnabled;

    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value> {
        decode::flag(snapshot, Self::KEY)
    }

    fn wrap(value: Self::Value) -> FieldValue {
        FieldValue::Flag(value)
    }

    fn extract(value: &FieldValue) -> Option<Self::Value> {
        match value {
            FieldValue::Flag(v) => Some(*v),
            _ => None,
        }
    }
}

impl Field for Positions {
    type Value = ElementPositions;
    const KEY: FieldKey = FieldKey::ElementPositions;

    fn decode(snapshot: &Snapshot) -> Decoded<Self::Value> {
        decode::positions(snapshot, Self::KEY)
    }

    fn wrap(value: Self::Value) -> FieldValue {
        FieldValue::Positions(value)
    }

    fn extract(value: &FieldValue) -> Option<Self::Value> {
        match value {
            FieldValue::Positions(v) => Some(*v),
            _ => None,
        }
    }
}

fn text_of(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Text(v) => Some(v.clone()),
        _ => None,
    }
}

fn integer_of(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Integer(v) => Some(*v),
        _ => None,
    }
}
