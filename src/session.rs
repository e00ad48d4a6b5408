//! Session bootstrap: the identity gate in front of every write.
//!
//! DESIGN
//! ======
//! Identity creation lives outside this crate. The core only needs an
//! idempotent `ensure_identity` it can call before the first write-triggering
//! action. [`GatedStore`] wraps any [`RecordStore`] and makes every
//! `persist_field` go through that gate, with a best-effort retry.
//!
//! ERROR HANDLING
//! ==============
//! If no identity can be obtained the write is refused with the generic
//! [`StoreError::Rejected`]; callers do not get a distinct error kind for it.
//! Reads pass straight through.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::consts::IDENTITY_RETRIES;
use crate::decode::Snapshot;
use crate::fields::FieldValue;
use crate::record::{FieldKey, RecordId};
use crate::store::{RecordStore, StoreError};

/// Who is writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("identity unavailable: {0}")]
    Unavailable(String),
}

/// External identity capability. Must be safe to call when an identity already exists.
#[async_trait(?Send)]
pub trait IdentityProvider {
    /// # Errors
    ///
    /// Returns a [`SessionError`] if no identity could be established.
    async fn ensure_identity(&self) -> Result<Identity, SessionError>;
}

/// A fixed, already-established identity.
pub struct StaticIdentity(pub Identity);

#[async_trait(?Send)]
impl IdentityProvider for StaticIdentity {
    async fn ensure_identity(&self) -> Result<Identity, SessionError> {
        Ok(self.0.clone())
    }
}

/// Remembers the first identity a provider hands out.
pub struct CachedIdentity<P> {
    provider: P,
    cached: RefCell<Option<Identity>>,
}

impl<P: IdentityProvider> CachedIdentity<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider, cached: RefCell::new(None) }
    }
}

#[async_trait(?Send)]
impl<P: IdentityProvider> IdentityProvider for CachedIdentity<P> {
    async fn ensure_identity(&self) -> Result<Identity, SessionError> {
        if let Some(identity) = self.cached.borrow().as_ref() {
            return Ok(identity.clone());
        }
        let identity = self.provider.ensure_identity().await?;
        info!(user_id = %identity.user_id, "identity established");
        *self.cached.borrow_mut() = Some(identity.clone());
        Ok(identity)
    }
}

/// A [`RecordStore`] whose writes wait for an identity first.
pub struct GatedStore<S> {
    inner: S,
    identity: Rc<dyn IdentityProvider>,
}

impl<S: RecordStore> GatedStore<S> {
    #[must_use]
    pub fn new(inner: S, identity: Rc<dyn IdentityProvider>) -> Self {
        Self { inner, identity }
    }

    async fn ensure_identity(&self) -> Result<Identity, StoreError> {
        let mut last_error = None;
        for attempt in 0..=IDENTITY_RETRIES {
            match self.identity.ensure_identity().await {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    warn!(attempt, error = %e, "identity bootstrap failed");
                    last_error = Some(e);
                }
            }
        }
        let reason = last_error.map_or_else(|| "no identity".to_owned(), |e| e.to_string());
        Err(StoreError::Rejected(reason))
    }
}

#[async_trait(?Send)]
impl<S: RecordStore> RecordStore for GatedStore<S> {
    async fn fetch(&self, record_id: RecordId) -> Result<Snapshot, StoreError> {
        self.inner.fetch(record_id).await
    }

    async fn persist_field(&self, record_id: RecordId, key: FieldKey, value: &FieldValue) -> Result<(), StoreError> {
        self.ensure_identity().await?;
        self.inner.persist_field(record_id, key, value).await
    }
}
