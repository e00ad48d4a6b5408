//! Live scoreboard state reconciliation.
//!
//! A scoreboard display shows several fields of one backend record. Those
//! fields change three ways: the local user edits them, other clients edit
//! them, and backend processes edit them. This crate folds all three into one
//! displayed value per field. It stays instant for the local user and never
//! flickers back to a stale value. It also includes the pointer-driven editor
//! that moves scoreboard elements around a fixed logical canvas.
//!
//! Everything runs on one thread. State lives in `Rc`/`RefCell`, and
//! background work (resubscribe, polling) is spawned on the current
//! `tokio::task::LocalSet`.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`view`] | Mounts one record: bus listeners, remote subscription, initial fetch; the commit path |
//! | [`sync`] | Per-field reconciliation state machine and shared handle |
//! | [`bus`] | Explicit same-process broadcast of local edits |
//! | [`remote`] | Per-record feed subscription with resubscribe and re-fetch |
//! | [`decode`] | Defensive decoding of untrusted row snapshots |
//! | [`fields`] | Typed markers for each observed column |
//! | [`record`] | Row shape, field keys, element layout |
//! | [`store`] | Read/write primitive consumed from the backend |
//! | [`session`] | Identity gate in front of writes |
//! | [`drag`] | Drag session and pointer-to-canvas mapping |
//! | [`canvas`] | Geometry and the contain-fit transform |
//! | [`http`] | REST store and polling feed adapters |
//! | [`config`] | Environment configuration |
//! | [`consts`] | Canvas size, default layout, timing defaults |

pub mod bus;
pub mod canvas;
pub mod config;
pub mod consts;
pub mod decode;
pub mod drag;
pub mod fields;
pub mod http;
pub mod record;
pub mod remote;
pub mod session;
pub mod store;
pub mod sync;
pub mod view;

#[cfg(test)]
pub mod test_helpers;
