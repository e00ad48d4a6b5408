use super::*;
use crate::config::{HttpTimeouts, SyncConfig};
use crate::record::{ElementPositions, Record};
use crate::remote::ResubscribeConfig;
use crate::test_helpers::{MemoryBackend, wait_until};
use serde_json::json;
use std::cell::RefCell;
use tokio::task::LocalSet;
use uuid::Uuid;

fn config() -> SyncConfig {
    SyncConfig {
        backend_url: "https://db.example.test".into(),
        api_key: "anon".into(),
        table: "scoreboards".into(),
        poll_interval: Duration::from_millis(5),
        resubscribe: ResubscribeConfig::default(),
        timeouts: HttpTimeouts { request_secs: 1, connect_secs: 1 },
    }
}

// =============================================================
// Wire shaping
// =============================================================

#[test]
fn row_url_filters_by_id() {
    let id = Uuid::nil();
    assert_eq!(
        row_url("https://db.example.test", "scoreboards", id),
        "https://db.example.test/rest/v1/scoreboards?id=eq.00000000-0000-0000-0000-000000000000"
    );
}

#[test]
fn parse_rows_takes_first_row() {
    let id = Uuid::new_v4();
    let text = format!(r#"[{{"id":"{id}","a_score":2}}]"#);
    let snapshot = parse_rows(&text, id).unwrap();
    assert_eq!(snapshot.get(FieldKey::AScore), Some(&json!(2)));
}

#[test]
fn parse_rows_empty_array_is_not_found() {
    let id = Uuid::new_v4();
    assert!(matches!(parse_rows("[]", id), Err(StoreError::NotFound(missing)) if missing == id));
}

#[test]
fn parse_rows_rejects_non_array() {
    assert!(matches!(parse_rows(r#"{"message":"nope"}"#, Uuid::new_v4()), Err(StoreError::Encoding(_))));
}

#[test]
fn patch_body_has_one_column() {
    let body = patch_body(FieldKey::BScore, &FieldValue::Integer(7)).unwrap();
    assert_eq!(body, json!({ "b_score": 7 }));

    let body = patch_body(FieldKey::Name, &FieldValue::OptionalText(None)).unwrap();
    assert_eq!(body, json!({ "name": null }));
}

#[test]
fn patch_body_serializes_layout() {
    let body = patch_body(FieldKey::ElementPositions, &FieldValue::Positions(ElementPositions::default())).unwrap();
    let positions = &body["element_positions"];
    assert_eq!(positions["title"], json!({ "x": 960.0, "y": 120.0 }));
    assert_eq!(positions.as_object().map(Map::len), Some(5));
}

#[test]
fn failure_body_keeps_read_error() {
    assert_eq!(failure_body(Ok::<_, String>("row is locked".into())), "row is locked");
    assert_eq!(
        failure_body(Err::<String, _>("connection reset")),
        "<unreadable body: connection reset>"
    );
}

#[test]
fn store_builds_from_config() {
    let store = HttpRecordStore::new(&config()).unwrap();
    assert_eq!(store.base_url, "https://db.example.test");
    assert_eq!(store.table, "scoreboards");
}

// =============================================================
// Polling feed
// =============================================================

fn recording_sink() -> (FeedSink, Rc<RefCell<Vec<FeedEvent>>>) {
    let events = Rc::new(RefCell::new(Vec::<FeedEvent>::new()));
    let sink_events = Rc::clone(&events);
    let sink: FeedSink = Rc::new(move |event: FeedEvent| sink_events.borrow_mut().push(event));
    (sink, events)
}

fn snapshots(events: &RefCell<Vec<FeedEvent>>) -> usize {
    events
        .borrow()
        .iter()
        .filter(|e| matches!(e, FeedEvent::Snapshot(_)))
        .count()
}

#[tokio::test]
async fn polling_emits_first_read_and_changes_only() {
    LocalSet::new()
        .run_until(async {
            let record = Record::new(Uuid::new_v4(), "Home", "Away");
            let backend = MemoryBackend::with_record(&record);
            let feed = PollingFeed::new(Rc::new(backend.clone()), Duration::from_millis(5));
            let (sink, events) = recording_sink();

            let sub = feed.subscribe(record.id, sink).await.unwrap();
            wait_until(|| snapshots(&events) == 1).await;

            let fetches = backend.fetches();
            wait_until(|| backend.fetches() >= fetches + 3).await;
            assert_eq!(snapshots(&events), 1);

            backend.remote_write(record.id, FieldKey::AScore, json!(1));
            wait_until(|| snapshots(&events) == 2).await;
            sub.unsubscribe();
        })
        .await;
}

#[tokio::test]
async fn polling_failure_reports_disconnect_and_stops() {
    LocalSet::new()
        .run_until(async {
            let record = Record::new(Uuid::new_v4(), "Home", "Away");
            let backend = MemoryBackend::with_record(&record);
            let feed = PollingFeed::new(Rc::new(backend.clone()), Duration::from_millis(5));
            let (sink, events) = recording_sink();

            let _sub = feed.subscribe(record.id, sink).await.unwrap();
            wait_until(|| snapshots(&events) == 1).await;
            backend.fail_fetches(true);

            wait_until(|| matches!(events.borrow().last(), Some(FeedEvent::Disconnected))).await;
            let fetches = backend.fetches();
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(backend.fetches(), fetches);
        })
        .await;
}

#[tokio::test]
async fn unsubscribe_stops_polling() {
    LocalSet::new()
        .run_until(async {
            let record = Record::new(Uuid::new_v4(), "Home", "Away");
            let backend = MemoryBackend::with_record(&record);
            let feed = PollingFeed::new(Rc::new(backend.clone()), Duration::from_millis(5));
            let (sink, events) = recording_sink();

            let sub = feed.subscribe(record.id, sink).await.unwrap();
            wait_until(|| snapshots(&events) == 1).await;
            sub.unsubscribe();

            let fetches = backend.fetches();
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(backend.fetches(), fetches);
        })
        .await;
}
