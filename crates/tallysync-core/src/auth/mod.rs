//! Authentication scope for persisted data.
//!
//! Authentication itself happens elsewhere; the data layer only needs to
//! know whose snapshots it is reading and when that identity goes away.
//! `Session` is persisted next to the snapshots and expires after 12 hours.

pub mod session;

pub use session::{Session, SessionData};
