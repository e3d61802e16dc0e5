//! The sync core: a pure collection with its fold, and the controller that
//! drives it from the store.

pub mod collection;
pub mod controller;

pub use collection::{fold, Collection, CommitOutcome, FoldOutcome};
pub use controller::{Controller, Snapshot, SyncStatus};
