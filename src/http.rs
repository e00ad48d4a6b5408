//! REST adapters for a PostgREST-style backend.
//!
//! [`HttpRecordStore`] reads a row with `GET {base}/rest/v1/{table}?id=eq.{id}`
//! and writes one column with a `PATCH` of a single-key JSON body.
//! [`PollingFeed`] turns any [`RecordStore`] into a [`RecordFeed`] by
//! re-reading the row on an interval. Pure request/response shaping lives in
//! free functions for testability.

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::decode::Snapshot;
use crate::fields::FieldValue;
use crate::record::{FieldKey, RecordId};
use crate::remote::{FeedError, FeedEvent, FeedSink, FeedSubscription, RecordFeed};
use crate::store::{RecordStore, StoreError};

// =============================================================================
// STORE
// =============================================================================

pub struct HttpRecordStore {
    http: reqwest::Client,
    base_url: String,
    table: String,
    api_key: String,
}

impl HttpRecordStore {
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.backend_url.clone(),
            table: config.table.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[async_trait(?Send)]
impl RecordStore for HttpRecordStore {
    async fn fetch(&self, record_id: RecordId) -> Result<Snapshot, StoreError> {
        let url = format!("{}&select=*", row_url(&self.base_url, &self.table, record_id));
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(StoreError::Status { status: status.as_u16(), body: text });
        }

        parse_rows(&text, record_id)
    }

    async fn persist_field(&self, record_id: RecordId, key: FieldKey, value: &FieldValue) -> Result<(), StoreError> {
        let body = patch_body(key, value)?;
        let response = self
            .authorized(self.http.patch(row_url(&self.base_url, &self.table, record_id)))
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = failure_body(response.text().await);
            return Err(StoreError::Status { status: status.as_u16(), body });
        }
        debug!(%record_id, field = %key, "field persisted");
        Ok(())
    }
}

// =============================================================================
// WIRE SHAPING
// =============================================================================

fn row_url(base_url: &str, table: &str, record_id: RecordId) -> String {
    format!("{base_url}/rest/v1/{table}?id=eq.{record_id}")
}

/// Pick the row out of a PostgREST array response.
fn parse_rows(text: &str, record_id: RecordId) -> Result<Snapshot, StoreError> {
    let rows: Vec<Value> = serde_json::from_str(text)?;
    rows.into_iter()
        .next()
        .map(Snapshot::new)
        .ok_or(StoreError::NotFound(record_id))
}

/// Error body for a failed write. A body that cannot be read is reported in
/// its place.
fn failure_body<E: std::fmt::Display>(read: Result<String, E>) -> String {
    match read {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "failed to read error response body");
            format!("<unreadable body: {e}>")
        }
    }
}

/// One-column update body: `{"<column>": <value>}`.
fn patch_body(key: FieldKey, value: &FieldValue) -> Result<Value, StoreError> {
    let mut body = Map::new();
    body.insert(key.column().to_string(), serde_json::to_value(value)?);
    Ok(Value::Object(body))
}

// =============================================================================
// POLLING FEED
// =============================================================================

/// A [`RecordFeed`] that re-reads the row on a fixed interval.
///
/// Emits a snapshot for the first read and whenever the row differs from the
/// previous read. A failed read reports `Disconnected` and ends the
/// subscription. Polling tasks run on the current `LocalSet`.
pub struct PollingFeed<S> {
    store: Rc<S>,
    interval: Duration,
}

impl<S> PollingFeed<S> {
    #[must_use]
    pub fn new(store: Rc<S>, interval: Duration) -> Self {
        Self { store, interval }
    }
}

struct PollingSubscription {
    task: JoinHandle<()>,
}

impl FeedSubscription for PollingSubscription {
    fn unsubscribe(self: Box<Self>) {
        self.task.abort();
    }
}

#[async_trait(?Send)]
impl<S: RecordStore + 'static> RecordFeed for PollingFeed<S> {
    async fn subscribe(&self, record_id: RecordId, sink: FeedSink) -> Result<Box<dyn FeedSubscription>, FeedError> {
        let store = Rc::clone(&self.store);
        let interval = self.interval;
        let task = tokio::task::spawn_local(async move {
            let mut last: Option<Value> = None;
            loop {
                match store.fetch(record_id).await {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(snapshot.as_value()) {
                            last = Some(snapshot.as_value().clone());
                            sink(FeedEvent::Snapshot(snapshot));
                        }
                    }
                    Err(e) => {
                        warn!(%record_id, error = %e, "poll failed");
                        sink(FeedEvent::Disconnected);
                        return;
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });
        Ok(Box::new(PollingSubscription { task }))
    }
}
