//! Durable write-ahead queue and deferred synchronization.
//!
//! Writes that fail to reach the origin are persisted here and replayed by
//! the sync coordinator once a trigger fires. Replay is all-or-nothing per
//! pass: the store is cleared only when every pending record is accepted.

mod store;
mod sync;
mod trigger;

pub use store::{PendingRecord, RecordStore, SqliteQueue};
pub use sync::{DrainOutcome, SyncCoordinator};
pub use trigger::SyncScheduler;
