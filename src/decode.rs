//! Decoding of remote snapshots, one field at a time.
//!
//! DESIGN
//! ======
//! Change notifications carry the whole row as untyped JSON. Nothing about the
//! wire shape is trusted: each field is decoded on its own into a
//! [`Decoded`], and a rejection only affects that field. Absent or mistyped
//! properties never blank a displayed value.

#[cfg(test)]
#[path = "decode_test.rs"]
mod decode_test;

use std::fmt;

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::canvas::Point;
use crate::record::{ElementId, ElementPositions, FieldKey};

/// Full current state of a record as delivered by a change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot(Value);

impl Snapshot {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Raw property for `key`, if present.
    #[must_use]
    pub fn get(&self, key: FieldKey) -> Option<&Value> {
        self.0.get(key.column())
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Snapshot {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Why a property was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The snapshot has no such property.
    Missing,
    /// The property exists but has the wrong JSON type.
    WrongType { expected: &'static str },
    /// The type is right but the content does not parse.
    Malformed(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::WrongType { expected } => write!(f, "expected {expected}"),
            Self::Malformed(reason) => write!(f, "malformed: {reason}"),
        }
    }
}

/// Result of decoding one field from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Value(T),
    Rejected(Rejection),
}

impl<T> Decoded<T> {
    #[must_use]
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Rejected(_) => None,
        }
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

fn property(snapshot: &Snapshot, key: FieldKey) -> Result<&Value, Rejection> {
    snapshot.get(key).ok_or(Rejection::Missing)
}

fn finish<T>(result: Result<T, Rejection>) -> Decoded<T> {
    match result {
        Ok(v) => Decoded::Value(v),
        Err(r) => Decoded::Rejected(r),
    }
}

/// Required text column.
#[must_use]
pub fn text(snapshot: &Snapshot, key: FieldKey) -> Decoded<String> {
    finish(property(snapshot, key).and_then(|v| {
        v.as_str()
            .map(str::to_owned)
            .ok_or(Rejection::WrongType { expected: "string" })
    }))
}

/// Nullable text column. An explicit `null` is a real value.
#[must_use]
pub fn optional_text(snapshot: &Snapshot, key: FieldKey) -> Decoded<Option<String>> {
    finish(property(snapshot, key).and_then(|v| match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(Rejection::WrongType { expected: "string or null" }),
    }))
}

/// Integer column. Integral floats (`4.0`) are accepted; fractional ones are not.
#[must_use]
pub fn integer(snapshot: &Snapshot, key: FieldKey) -> Decoded<i64> {
    finish(property(snapshot, key).and_then(|v| {
        if let Some(n) = v.as_i64() {
            return Ok(n);
        }
        match v.as_f64() {
            Some(f) => integral(f).ok_or_else(|| Rejection::Malformed(format!("non-integral number {f}"))),
            None => Err(Rejection::WrongType { expected: "integer" }),
        }
    }))
}

#[allow(clippy::cast_possible_truncation)]
fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

/// Boolean column.
#[must_use]
pub fn flag(snapshot: &Snapshot, key: FieldKey) -> Decoded<bool> {
    finish(property(snapshot, key).and_then(|v| v.as_bool().ok_or(Rejection::WrongType { expected: "boolean" })))
}

/// RFC 3339 timestamp column.
#[must_use]
pub fn timestamp(snapshot: &Snapshot, key: FieldKey) -> Decoded<OffsetDateTime> {
    finish(property(snapshot, key).and_then(|v| {
        let raw = v.as_str().ok_or(Rejection::WrongType { expected: "timestamp string" })?;
        OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| Rejection::Malformed(e.to_string()))
    }))
}

/// Element layout column.
///
/// `null` means "use the default layout". Inside the object, a slot that is
/// missing or has non-numeric coordinates keeps its default, and unknown slot
/// keys are skipped.
#[must_use]
pub fn positions(snapshot: &Snapshot, key: FieldKey) -> Decoded<ElementPositions> {
    finish(property(snapshot, key).and_then(|v| match v {
        Value::Null => Ok(ElementPositions::default()),
        Value::Object(slots) => {
            let mut out = ElementPositions::default();
            for (name, slot) in slots {
                let Some(id) = ElementId::from_key(name) else {
                    continue;
                };
                if let Some(point) = point(slot) {
                    out.set(id, point);
                }
            }
            Ok(out)
        }
        _ => Err(Rejection::WrongType { expected: "object or null" }),
    }))
}

fn point(slot: &Value) -> Option<Point> {
    let x = slot.get("x")?.as_f64()?;
    let y = slot.get("y")?.as_f64()?;
    (x.is_finite() && y.is_finite()).then_some(Point { x, y })
}
