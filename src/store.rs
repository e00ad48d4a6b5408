//! Write and read primitives consumed from the backend.
//!
//! The core never implements storage. It depends on two capabilities: read
//! the current row, and persist one field of it. Retry policy for a failed
//! write, if any, belongs to the implementation behind this trait.

use async_trait::async_trait;

use crate::decode::Snapshot;
use crate::fields::FieldValue;
use crate::record::{FieldKey, RecordId};

/// Errors produced by a [`RecordStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record does not exist (or is not visible to this identity).
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// The request never produced a response.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}")]
    Status { status: u16, body: String },

    /// The payload could not be encoded or the response could not be read.
    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The write was refused before it reached the backend.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Backend row access for one table of records.
#[async_trait(?Send)]
pub trait RecordStore {
    /// Read the current full row.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the row is missing or the request fails.
    async fn fetch(&self, record_id: RecordId) -> Result<Snapshot, StoreError>;

    /// Persist a single field.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write is refused or fails.
    async fn persist_field(&self, record_id: RecordId, key: FieldKey, value: &FieldValue) -> Result<(), StoreError>;
}

#[async_trait(?Send)]
impl<S: RecordStore + ?Sized> RecordStore for std::rc::Rc<S> {
    async fn fetch(&self, record_id: RecordId) -> Result<Snapshot, StoreError> {
        (**self).fetch(record_id).await
    }

    async fn persist_field(&self, record_id: RecordId, key: FieldKey, value: &FieldValue) -> Result<(), StoreError> {
        (**self).persist_field(record_id, key, value).await
    }
}
