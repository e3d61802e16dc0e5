use crate::models::bookmark::BookmarkId;

/// Errors reported to the caller of a controller operation.
///
/// Title-fetch failures never show up here: they are soft and replaced by the
/// fallback title (see `fetch::FetchError`).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A mutation was attempted while no owner is signed in
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The store rejected the request or could not be reached
    #[error("{0}")]
    RemoteFailure(String),

    /// The target is still a provisional entry the store does not know about
    #[error("Bookmark {0} has not been saved yet")]
    NotCommitted(BookmarkId),
}

/// Errors returned by a `RemoteStore` implementation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store rejected request: {0}")]
    Rejected(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::RemoteFailure(err.to_string())
    }
}
