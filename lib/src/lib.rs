pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod store;
pub mod sync;
pub mod utils;

// Re-export the types most callers need
pub use auth::AuthState;
pub use error::BukusyncError;
pub use sync::{Controller, Snapshot, SyncStatus};
