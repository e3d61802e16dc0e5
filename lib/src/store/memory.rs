//! In-process store implementing the remote contract.
//!
//! Update and delete of unknown ids succeed without effect, like a filtered
//! `UPDATE`/`DELETE` against a SQL table. An update stamped older than the
//! stored row is accepted but not applied. The change stream can be delivered
//! inline or queued, and queued events can be replayed reversed or twice to
//! exercise at-least-once, unordered delivery.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::{ChangeEvent, EventSink, RemoteStore, SubscriptionHandle};
use crate::models::errors::StoreError;
use crate::models::{Bookmark, BookmarkId, BookmarkPatch, NewBookmark, OwnerId, ServerId};

/// How change events reach subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Sinks run before the mutating call returns
    #[default]
    Immediate,
    /// Events wait in a queue until `flush`
    Manual,
}

/// Store operations that can be failed or paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Insert,
    Update,
    Delete,
}

struct Subscriber {
    owner: OwnerId,
    sink: EventSink,
}

type Dispatch = Vec<(EventSink, ChangeEvent)>;

#[derive(Default)]
struct Inner {
    rows: Vec<Bookmark>,
    next_id: u64,
    next_handle: u64,
    subscribers: BTreeMap<u64, Subscriber>,
    delivery: Delivery,
    // Sinks are captured when the event is emitted, so a queued event still
    // reaches a subscription closed before the flush.
    pending: Dispatch,
    last_delivered: Dispatch,
    failures: HashMap<StoreOp, String>,
}

impl Inner {
    fn take_failure(&mut self, op: StoreOp) -> Result<(), StoreError> {
        match self.failures.remove(&op) {
            Some(message) => Err(StoreError::Rejected(message)),
            None => Ok(()),
        }
    }

    /// Route an event to the owner's subscribers; returns what must be called now.
    fn emit(&mut self, owner: &OwnerId, event: ChangeEvent) -> Dispatch {
        let targets: Dispatch = self
            .subscribers
            .values()
            .filter(|s| &s.owner == owner)
            .map(|s| (s.sink.clone(), event.clone()))
            .collect();

        match self.delivery {
            Delivery::Immediate => {
                self.last_delivered = targets.clone();
                targets
            }
            Delivery::Manual => {
                self.pending.extend(targets);
                Vec::new()
            }
        }
    }
}

fn dispatch(batch: Dispatch) {
    for (sink, event) in batch {
        sink(event);
    }
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    paused: watch::Sender<HashSet<StoreOp>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_delivery(Delivery::Immediate)
    }

    pub fn with_delivery(delivery: Delivery) -> Self {
        let (paused, _) = watch::channel(HashSet::new());
        Self {
            inner: Mutex::new(Inner {
                delivery,
                ..Inner::default()
            }),
            paused,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call of `op` fail with `message`.
    pub fn fail_next(&self, op: StoreOp, message: impl Into<String>) {
        self.lock().failures.insert(op, message.into());
    }

    /// Hold calls of `op` until `resume`.
    pub fn pause(&self, op: StoreOp) {
        self.paused.send_modify(|ops| {
            ops.insert(op);
        });
    }

    pub fn resume(&self, op: StoreOp) {
        self.paused.send_modify(|ops| {
            ops.remove(&op);
        });
    }

    async fn gate(&self, op: StoreOp) {
        let mut rx = self.paused.subscribe();
        // The sender lives as long as the store, so this only ends when resumed.
        let _ = rx.wait_for(|ops| !ops.contains(&op)).await;
    }

    /// Deliver queued events in arrival order.
    pub fn flush(&self) -> usize {
        let batch = self.take_pending();
        let count = batch.len();
        dispatch(batch);
        count
    }

    /// Deliver queued events newest first.
    pub fn flush_reversed(&self) -> usize {
        let mut batch = self.take_pending();
        batch.reverse();
        let count = batch.len();
        dispatch(batch);
        count
    }

    /// Deliver the last delivered batch once more.
    pub fn redeliver_last(&self) -> usize {
        let batch = self.lock().last_delivered.clone();
        let count = batch.len();
        dispatch(batch);
        count
    }

    fn take_pending(&self) -> Dispatch {
        let mut inner = self.lock();
        let batch = std::mem::take(&mut inner.pending);
        inner.last_delivered = batch.clone();
        batch
    }

    /// Push an arbitrary event to `owner`'s subscribers without touching rows.
    pub fn emit(&self, owner: &OwnerId, event: ChangeEvent) {
        let batch = self.lock().emit(owner, event);
        dispatch(batch);
    }

    pub fn pending_events(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Stored rows of `owner`, in insertion order.
    pub fn rows(&self, owner: &OwnerId) -> Vec<Bookmark> {
        self.lock()
            .rows
            .iter()
            .filter(|row| &row.owner == owner)
            .cloned()
            .collect()
    }
}

impl RemoteStore for MemoryStore {
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Bookmark>, StoreError> {
        self.gate(StoreOp::List).await;
        let mut inner = self.lock();
        inner.take_failure(StoreOp::List)?;

        let mut rows: Vec<Bookmark> = inner
            .rows
            .iter()
            .rev()
            .filter(|row| &row.owner == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, owner: &OwnerId, bookmark: NewBookmark) -> Result<Bookmark, StoreError> {
        self.gate(StoreOp::Insert).await;
        let (row, batch) = {
            let mut inner = self.lock();
            inner.take_failure(StoreOp::Insert)?;

            inner.next_id += 1;
            let now = Utc::now();
            let row = Bookmark {
                id: BookmarkId::Committed(ServerId::new(format!("srv-{}", inner.next_id))),
                owner: owner.clone(),
                url: bookmark.url,
                title: bookmark.title,
                favicon_url: bookmark.favicon_url,
                created_at: now,
                updated_at: now,
            };
            inner.rows.push(row.clone());
            let batch = inner.emit(owner, ChangeEvent::Insert(row.clone()));
            (row, batch)
        };

        debug!("Inserted {} for {}", row.id, owner);
        dispatch(batch);
        Ok(row)
    }

    async fn update(
        &self,
        id: &ServerId,
        patch: BookmarkPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.gate(StoreOp::Update).await;
        let batch = {
            let mut inner = self.lock();
            inner.take_failure(StoreOp::Update)?;

            let target = inner
                .rows
                .iter_mut()
                .find(|row| row.server_id() == Some(id))
                .and_then(|row| {
                    if row.updated_at > updated_at {
                        debug!("Ignoring update of {} older than the stored row", id);
                        return None;
                    }
                    row.apply_patch(&patch, updated_at);
                    Some(row.clone())
                });
            match target {
                Some(row) => {
                    let owner = row.owner.clone();
                    inner.emit(&owner, ChangeEvent::Update(row))
                }
                None => Vec::new(),
            }
        };

        dispatch(batch);
        Ok(())
    }

    async fn delete(&self, id: &ServerId) -> Result<(), StoreError> {
        self.gate(StoreOp::Delete).await;
        let batch = {
            let mut inner = self.lock();
            inner.take_failure(StoreOp::Delete)?;

            match inner.rows.iter().position(|row| row.server_id() == Some(id)) {
                Some(pos) => {
                    let row = inner.rows.remove(pos);
                    inner.emit(&row.owner, ChangeEvent::Delete(id.clone()))
                }
                None => Vec::new(),
            }
        };

        dispatch(batch);
        Ok(())
    }

    fn subscribe(&self, owner: &OwnerId, sink: EventSink) -> SubscriptionHandle {
        let mut inner = self.lock();
        inner.next_handle += 1;
        let handle = SubscriptionHandle::new(inner.next_handle);
        inner.subscribers.insert(
            handle.id(),
            Subscriber {
                owner: owner.clone(),
                sink,
            },
        );
        debug!("Subscription {} opened for {}", handle.id(), owner);
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if self.lock().subscribers.remove(&handle.id()).is_some() {
            debug!("Subscription {} closed", handle.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn alice() -> OwnerId {
        OwnerId::new("alice")
    }

    fn recorder() -> (EventSink, Arc<Mutex<Vec<ChangeEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: EventSink = Arc::new(move |event| sink_seen.lock().unwrap().push(event));
        (sink, seen)
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_server_ids() {
        let store = MemoryStore::new();
        let first = store.insert(&alice(), NewBookmark::new("https://a.com", "A")).await.unwrap();
        let second = store.insert(&alice(), NewBookmark::new("https://b.com", "B")).await.unwrap();

        assert_eq!(first.server_id(), Some(&ServerId::new("srv-1")));
        assert_eq!(second.server_id(), Some(&ServerId::new("srv-2")));
        assert_eq!(first.created_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_newest_first() {
        let store = MemoryStore::new();
        store.insert(&alice(), NewBookmark::new("https://a.com", "A")).await.unwrap();
        store.insert(&OwnerId::new("bob"), NewBookmark::new("https://b.com", "B")).await.unwrap();
        store.insert(&alice(), NewBookmark::new("https://c.com", "C")).await.unwrap();

        let rows = store.list(&alice()).await.unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A"]);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Insert, "quota exceeded");

        let err = store
            .insert(&alice(), NewBookmark::new("https://a.com", "A"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Rejected("quota exceeded".to_string()));
        assert!(store.rows(&alice()).is_empty());

        assert!(store.insert(&alice(), NewBookmark::new("https://a.com", "A")).await.is_ok());
    }

    #[tokio::test]
    async fn test_immediate_delivery_is_owner_scoped() {
        let store = MemoryStore::new();
        let (sink, seen) = recorder();
        store.subscribe(&alice(), sink);

        store.insert(&OwnerId::new("bob"), NewBookmark::new("https://b.com", "B")).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());

        let row = store.insert(&alice(), NewBookmark::new("https://a.com", "A")).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![ChangeEvent::Insert(row)]);
    }

    #[tokio::test]
    async fn test_manual_delivery_reaches_closed_subscription() {
        let store = MemoryStore::with_delivery(Delivery::Manual);
        let (sink, seen) = recorder();
        let handle = store.subscribe(&alice(), sink);

        store.insert(&alice(), NewBookmark::new("https://a.com", "A")).await.unwrap();
        assert_eq!(store.pending_events(), 1);

        store.unsubscribe(handle);
        assert_eq!(store.subscriber_count(), 0);
        assert_eq!(store.flush(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert_eq!(store.redeliver_last(), 1);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_flush_reversed_order() {
        let store = MemoryStore::with_delivery(Delivery::Manual);
        let (sink, seen) = recorder();
        store.subscribe(&alice(), sink);

        let row = store.insert(&alice(), NewBookmark::new("https://a.com", "A")).await.unwrap();
        let id = row.server_id().cloned().unwrap();
        store.delete(&id).await.unwrap();
        store.flush_reversed();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], ChangeEvent::Delete(id));
        assert!(matches!(seen[1], ChangeEvent::Insert(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_ids_are_noops() {
        let store = MemoryStore::new();
        let (sink, seen) = recorder();
        store.subscribe(&alice(), sink);

        let missing = ServerId::new("srv-404");
        assert!(store
            .update(&missing, BookmarkPatch::default().with_title("x"), Utc::now())
            .await
            .is_ok());
        assert!(store.delete(&missing).await.is_ok());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_emits_patched_row() {
        let store = MemoryStore::new();
        let row = store.insert(&alice(), NewBookmark::new("https://a.com", "A")).await.unwrap();
        let (sink, seen) = recorder();
        store.subscribe(&alice(), sink);

        let at = row.updated_at + chrono::Duration::seconds(1);
        store
            .update(row.server_id().unwrap(), BookmarkPatch::default().with_title("Renamed"), at)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        match &seen[0] {
            ChangeEvent::Update(updated) => {
                assert_eq!(updated.title, "Renamed");
                assert_eq!(updated.updated_at, at);
                assert_eq!(updated.created_at, row.created_at);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_paused_insert_waits_for_resume() {
        let store = MemoryStore::new();
        store.pause(StoreOp::Insert);

        let owner = alice();
        let insert = store.insert(&owner, NewBookmark::new("https://a.com", "A"));
        let release = async {
            tokio::task::yield_now().await;
            assert!(store.rows(&alice()).is_empty());
            store.resume(StoreOp::Insert);
        };
        let (result, ()) = tokio::join!(insert, release);

        assert!(result.is_ok());
        assert_eq!(store.rows(&alice()).len(), 1);
    }

    #[tokio::test]
    async fn test_update_older_than_row_is_ignored() {
        let store = MemoryStore::new();
        let row = store.insert(&alice(), NewBookmark::new("https://a.com", "A")).await.unwrap();
        let id = row.server_id().cloned().unwrap();
        let newer = row.updated_at + chrono::Duration::seconds(2);
        let older = row.updated_at + chrono::Duration::seconds(1);
        store
            .update(&id, BookmarkPatch::default().with_title("Newer"), newer)
            .await
            .unwrap();

        let (sink, seen) = recorder();
        store.subscribe(&alice(), sink);
        assert!(store
            .update(&id, BookmarkPatch::default().with_title("Older"), older)
            .await
            .is_ok());

        let stored = &store.rows(&alice())[0];
        assert_eq!(stored.title, "Newer");
        assert_eq!(stored.updated_at, newer);
        assert!(seen.lock().unwrap().is_empty());
    }
}
