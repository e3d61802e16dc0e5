//! Contract of the remote bookmark store and its change stream.
//!
//! The store owns the authoritative rows. Mutations are request/response; the
//! change stream pushes every committed mutation to the owner's subscribers with
//! at-least-once delivery and no ordering guarantee across event kinds.

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::models::errors::StoreError;
use crate::models::{Bookmark, BookmarkPatch, NewBookmark, OwnerId, ServerId};

pub use memory::{Delivery, MemoryStore, StoreOp};

/// One notification from the change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert(Bookmark),
    Update(Bookmark),
    Delete(ServerId),
}

impl ChangeEvent {
    /// Server id the event refers to. `None` only for a malformed record
    /// carrying a provisional id.
    pub fn server_id(&self) -> Option<&ServerId> {
        match self {
            ChangeEvent::Insert(bookmark) | ChangeEvent::Update(bookmark) => bookmark.server_id(),
            ChangeEvent::Delete(id) => Some(id),
        }
    }
}

/// Callback the store invokes for every event of a subscription.
pub type EventSink = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Token returned by `subscribe`, handed back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Remote collection of bookmarks, scoped by owner.
pub trait RemoteStore: Send + Sync {
    /// All bookmarks of `owner`, newest first.
    fn list(
        &self,
        owner: &OwnerId,
    ) -> impl Future<Output = Result<Vec<Bookmark>, StoreError>> + Send;

    /// Commit a new row; the store assigns id and timestamps.
    fn insert(
        &self,
        owner: &OwnerId,
        bookmark: NewBookmark,
    ) -> impl Future<Output = Result<Bookmark, StoreError>> + Send;

    /// Apply `patch` stamped `updated_at`. Last write wins: a patch older than
    /// the stored row is dropped without an event, and the call still succeeds.
    fn update(
        &self,
        id: &ServerId,
        patch: BookmarkPatch,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete(&self, id: &ServerId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Start pushing `owner`'s changes to `sink`.
    fn subscribe(&self, owner: &OwnerId, sink: EventSink) -> SubscriptionHandle;

    /// Request the subscription be closed. Events already in flight may still
    /// reach the sink afterwards.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

impl<S: RemoteStore> RemoteStore for Arc<S> {
    fn list(
        &self,
        owner: &OwnerId,
    ) -> impl Future<Output = Result<Vec<Bookmark>, StoreError>> + Send {
        (**self).list(owner)
    }

    fn insert(
        &self,
        owner: &OwnerId,
        bookmark: NewBookmark,
    ) -> impl Future<Output = Result<Bookmark, StoreError>> + Send {
        (**self).insert(owner, bookmark)
    }

    fn update(
        &self,
        id: &ServerId,
        patch: BookmarkPatch,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).update(id, patch, updated_at)
    }

    fn delete(&self, id: &ServerId) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).delete(id)
    }

    fn subscribe(&self, owner: &OwnerId, sink: EventSink) -> SubscriptionHandle {
        (**self).subscribe(owner, sink)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        (**self).unsubscribe(handle)
    }
}
