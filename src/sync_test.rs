use super::*;
use crate::fields::{AScore, ASide, Name};
use serde_json::json;
use uuid::Uuid;

fn remote(value: i64) -> Decoded<i64> {
    Decoded::Value(value)
}

// =============================================================
// FieldSync transitions
// =============================================================

#[test]
fn starts_idle() {
    let sync = FieldSync::<AScore>::new();
    assert_eq!(sync.state(), &SyncState::Idle);
    assert_eq!(sync.displayed(), None);
    assert_eq!(sync.revision(), 0);
}

#[test]
fn initial_populates_idle_handle() {
    let mut sync = FieldSync::<AScore>::new();
    assert_eq!(sync.apply_initial(3), Outcome::Accepted { changed: true });
    assert_eq!(sync.displayed(), Some(&3));
    assert_eq!(sync.origin(), Some(Origin::Initial));
}

#[test]
fn initial_after_remote_is_superseded() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_remote(remote(5));
    assert_eq!(sync.apply_initial(3), Outcome::Superseded);
    assert_eq!(sync.displayed(), Some(&5));
}

#[test]
fn local_always_overwrites() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_remote(remote(5));
    assert_eq!(sync.apply_local(9), Outcome::Accepted { changed: true });
    assert_eq!(sync.displayed(), Some(&9));
    assert_eq!(sync.origin(), Some(Origin::Local));
}

#[test]
fn rejected_remote_keeps_display() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_initial(3);
    let outcome = sync.apply_remote(Decoded::Rejected(Rejection::WrongType { expected: "integer" }));
    assert_eq!(outcome, Outcome::Ignored(Rejection::WrongType { expected: "integer" }));
    assert_eq!(sync.displayed(), Some(&3));
    assert_eq!(sync.origin(), Some(Origin::Initial));
}

#[test]
fn rejected_remote_on_idle_stays_idle() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_remote(Decoded::Rejected(Rejection::Missing));
    assert_eq!(sync.state(), &SyncState::Idle);
}

#[test]
fn local_then_matching_remote_does_not_flicker() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_initial(3);
    sync.begin_edit();
    sync.apply_local(4);
    let after_local = sync.revision();

    assert_eq!(sync.apply_remote(remote(4)), Outcome::Accepted { changed: false });
    assert_eq!(sync.displayed(), Some(&4));
    assert_eq!(sync.origin(), Some(Origin::Remote));
    assert_eq!(sync.revision(), after_local);
    assert!(!sync.is_pending());
}

#[test]
fn stale_echo_of_previous_value_keeps_local() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_initial(3);
    sync.begin_edit();
    sync.apply_local(4);

    assert_eq!(sync.apply_remote(remote(3)), Outcome::StaleEcho);
    assert_eq!(sync.displayed(), Some(&4));
    assert!(sync.is_pending());
}

#[test]
fn previous_value_after_settle_is_a_real_write() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_initial(3);
    sync.begin_edit();
    sync.apply_local(4);
    sync.settle_edit();

    assert_eq!(sync.apply_remote(remote(3)), Outcome::Accepted { changed: true });
    assert_eq!(sync.displayed(), Some(&3));
}

#[test]
fn nested_edits_remember_first_previous() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_initial(3);
    sync.begin_edit();
    sync.apply_local(4);
    sync.begin_edit();
    sync.apply_local(5);

    assert_eq!(sync.apply_remote(remote(3)), Outcome::StaleEcho);
    // The echo of the first edit still lands: brief reversion is accepted.
    assert_eq!(sync.apply_remote(remote(4)), Outcome::Accepted { changed: true });
    assert_eq!(sync.displayed(), Some(&4));
}

#[test]
fn overlapping_edits_stay_pending_until_last_settles() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_initial(3);
    sync.begin_edit();
    sync.apply_local(4);
    sync.begin_edit();
    sync.apply_local(5);

    // First persist finishes while the second is still in flight.
    sync.settle_edit();
    assert!(sync.is_pending());
    assert_eq!(sync.apply_remote(remote(3)), Outcome::StaleEcho);
    assert_eq!(sync.displayed(), Some(&5));

    sync.settle_edit();
    assert!(!sync.is_pending());
    assert_eq!(sync.apply_remote(remote(3)), Outcome::Accepted { changed: true });
}

#[test]
fn settle_without_edit_is_harmless() {
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_initial(3);
    sync.settle_edit();
    sync.begin_edit();
    assert!(sync.is_pending());
    sync.settle_edit();
    sync.settle_edit();
    assert!(!sync.is_pending());
}

#[test]
fn concurrent_remote_write_wins_and_converges() {
    // a_score starts at 3; user bumps to 4; another client's 5 lands first.
    let mut sync = FieldSync::<AScore>::new();
    sync.apply_initial(3);
    sync.begin_edit();
    sync.apply_local(4);
    assert_eq!(sync.displayed(), Some(&4));

    sync.apply_remote(remote(5));
    assert_eq!(sync.displayed(), Some(&5));

    // Our delayed write settles and the backend's confirmed value arrives.
    sync.settle_edit();
    sync.apply_remote(remote(5));
    assert_eq!(sync.displayed(), Some(&5));
    sync.apply_remote(remote(6));
    assert_eq!(sync.displayed(), Some(&6));
}

#[test]
fn revision_counts_only_real_changes() {
    let mut sync = FieldSync::<ASide>::new();
    sync.apply_initial("Home".into());
    sync.apply_remote(Decoded::Value("Home".into()));
    sync.apply_local("Home".into());
    assert_eq!(sync.revision(), 1);
    sync.apply_local("Guests".into());
    assert_eq!(sync.revision(), 2);
}

#[test]
fn optional_name_can_be_cleared_remotely() {
    let mut sync = FieldSync::<Name>::new();
    sync.apply_initial(Some("Final".into()));
    sync.apply_remote(Decoded::Value(None));
    assert_eq!(sync.displayed(), Some(&None));
}

// =============================================================
// FieldHandle
// =============================================================

#[test]
fn handle_clones_share_state() {
    let a = FieldHandle::<AScore>::new(Uuid::new_v4());
    let b = a.clone();
    a.apply_local(2);
    assert_eq!(b.displayed(), Some(2));
}

#[test]
fn deactivated_handle_discards_everything() {
    let handle = FieldHandle::<AScore>::new(Uuid::new_v4());
    handle.apply_initial(1);
    handle.deactivate();

    assert_eq!(handle.apply_local(2), Outcome::Inactive);
    assert_eq!(handle.apply_remote(remote(3)), Outcome::Inactive);
    handle.begin_edit();
    assert!(!handle.is_pending());
    assert_eq!(handle.displayed(), Some(1));
}

#[test]
fn edit_guard_settles_on_drop() {
    let handle = FieldHandle::<AScore>::new(Uuid::new_v4());
    handle.apply_initial(3);

    let outer = handle.edit();
    let inner = handle.edit();
    handle.apply_local(4);
    drop(inner);
    assert!(handle.is_pending());
    assert_eq!(handle.apply_remote(remote(3)), Outcome::StaleEcho);

    drop(outer);
    assert!(!handle.is_pending());
}

#[test]
fn snapshot_target_decodes_own_field_only() {
    let score = FieldHandle::<AScore>::new(Uuid::new_v4());
    let side = FieldHandle::<ASide>::new(Uuid::new_v4());
    score.apply_initial(1);
    side.apply_initial("Home".into());

    let snapshot = Snapshot::new(json!({ "a_score": "lots", "a_side": "Visitors" }));
    score.apply_snapshot(&snapshot);
    side.apply_snapshot(&snapshot);

    assert_eq!(score.displayed(), Some(1));
    assert_eq!(side.displayed(), Some("Visitors".to_owned()));
}
