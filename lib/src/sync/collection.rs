//! The ordered bookmark list and the fold of change events into it.
//!
//! Every step here is synchronous and total: no panics, no I/O. Deleted server
//! ids are remembered as tombstones so that a late insert or update for an id
//! the list has already dropped cannot bring it back. Server ids are never
//! reused, so a tombstone can only ever match stale data.
//!
//! Tombstones are never pruned while a subscription lives: they carry over
//! through `rebase` and only `clear` (an owner change) drops them. The set grows
//! by one id per delete seen in that time.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;

use crate::models::{Bookmark, BookmarkId, BookmarkPatch, LocalId, ServerId};
use crate::store::ChangeEvent;

/// What a single fold step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Inserted,
    Updated,
    Removed,
    Ignored,
}

/// How a committed insert was reconciled with its provisional entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The provisional entry became the committed record
    Replaced,
    /// The stream delivered the record first; the provisional entry was dropped
    AlreadyPresent,
    /// The record was deleted before the commit was seen; the provisional entry was dropped
    AlreadyDeleted,
    /// The provisional entry is gone (collection cleared)
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    entries: Vec<Bookmark>,
    tombstones: HashSet<ServerId>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a store listing, dropping anything without a server id and
    /// restoring newest-first order.
    pub fn from_rows(rows: Vec<Bookmark>) -> Self {
        let mut collection = Self::new();
        collection.entries = rows.into_iter().filter(|b| !b.is_provisional()).collect();
        collection
            .entries
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        collection
    }

    pub fn entries(&self) -> &[Bookmark] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<Bookmark> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &BookmarkId) -> Option<&Bookmark> {
        self.entries.iter().find(|b| &b.id == id)
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.position(id).is_some()
    }

    pub fn is_tombstoned(&self, id: &ServerId) -> bool {
        self.tombstones.contains(id)
    }

    fn position(&self, id: &BookmarkId) -> Option<usize> {
        self.entries.iter().position(|b| &b.id == id)
    }

    fn position_committed(&self, id: &ServerId) -> Option<usize> {
        self.entries.iter().position(|b| b.server_id() == Some(id))
    }

    /// Insert keeping newest-first order: before the first entry that is not newer.
    fn merge(&mut self, bookmark: Bookmark) {
        let pos = self
            .entries
            .iter()
            .position(|e| e.created_at <= bookmark.created_at)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, bookmark);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.tombstones.clear();
    }

    /// Fold one stream event. Idempotent: applying the same event again is a no-op.
    pub fn apply(&mut self, event: &ChangeEvent) -> FoldOutcome {
        match event {
            ChangeEvent::Insert(bookmark) => {
                let Some(id) = bookmark.server_id() else {
                    debug!("Ignoring insert event with provisional id {}", bookmark.id);
                    return FoldOutcome::Ignored;
                };
                if self.is_tombstoned(id) || self.position_committed(id).is_some() {
                    return FoldOutcome::Ignored;
                }
                self.merge(bookmark.clone());
                FoldOutcome::Inserted
            }
            ChangeEvent::Update(incoming) => {
                let Some(id) = incoming.server_id() else {
                    return FoldOutcome::Ignored;
                };
                if self.is_tombstoned(id) {
                    return FoldOutcome::Ignored;
                }
                let Some(pos) = self.position_committed(id) else {
                    return FoldOutcome::Ignored;
                };
                let current = &mut self.entries[pos];
                // Last write wins; a tie goes to the stream.
                if incoming.updated_at < current.updated_at {
                    debug!("Ignoring stale update for {}", id);
                    return FoldOutcome::Ignored;
                }
                current.absorb(incoming);
                FoldOutcome::Updated
            }
            ChangeEvent::Delete(id) => {
                self.tombstones.insert(id.clone());
                match self.position_committed(id) {
                    Some(pos) => {
                        self.entries.remove(pos);
                        FoldOutcome::Removed
                    }
                    None => FoldOutcome::Ignored,
                }
            }
        }
    }

    /// Put a locally created entry at the front.
    pub fn push_provisional(&mut self, bookmark: Bookmark) {
        self.entries.insert(0, bookmark);
    }

    pub fn retitle_provisional(&mut self, local: LocalId, title: &str) -> bool {
        match self.position(&BookmarkId::Provisional(local)) {
            Some(pos) => {
                self.entries[pos].title = title.to_string();
                true
            }
            None => false,
        }
    }

    /// Remove a provisional entry whose insert failed.
    pub fn discard_provisional(&mut self, local: LocalId) -> bool {
        match self.position(&BookmarkId::Provisional(local)) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Reconcile a committed insert with the provisional entry it came from.
    /// The committed server id is the key: if the stream already delivered it,
    /// the provisional entry is simply dropped.
    pub fn commit(&mut self, local: LocalId, committed: Bookmark) -> CommitOutcome {
        let Some(pos) = self.position(&BookmarkId::Provisional(local)) else {
            return CommitOutcome::Missing;
        };
        let Some(id) = committed.server_id() else {
            return CommitOutcome::Missing;
        };

        if self.is_tombstoned(id) {
            self.entries.remove(pos);
            return CommitOutcome::AlreadyDeleted;
        }
        if self.position_committed(id).is_some() {
            self.entries.remove(pos);
            return CommitOutcome::AlreadyPresent;
        }

        self.entries[pos] = committed;
        CommitOutcome::Replaced
    }

    /// Apply a confirmed local update. Returns the resulting record, or `None`
    /// when the entry is gone or already holds a newer write.
    pub fn apply_patch(
        &mut self,
        id: &ServerId,
        patch: &BookmarkPatch,
        updated_at: DateTime<Utc>,
    ) -> Option<Bookmark> {
        let pos = self.position_committed(id)?;
        let current = &mut self.entries[pos];
        if current.updated_at > updated_at {
            return None;
        }
        current.apply_patch(patch, updated_at);
        Some(current.clone())
    }

    /// Remove a committed entry after a confirmed delete.
    pub fn remove_committed(&mut self, id: &ServerId) -> bool {
        self.apply(&ChangeEvent::Delete(id.clone())) == FoldOutcome::Removed
    }

    pub fn provisional(&self) -> impl Iterator<Item = &Bookmark> {
        self.entries.iter().filter(|b| b.is_provisional())
    }

    /// Replace the committed entries with a fresh listing, then replay what
    /// was folded since the listing was requested. Provisional entries and
    /// tombstones carry over.
    pub fn rebase(&self, rows: Vec<Bookmark>, replay: &[ChangeEvent]) -> Collection {
        let mut next = Collection::from_rows(rows);
        next.entries
            .retain(|b| b.server_id().map_or(true, |id| !self.tombstones.contains(id)));
        next.tombstones = self.tombstones.clone();

        let pending: Vec<Bookmark> = self.provisional().cloned().collect();
        next.entries.splice(0..0, pending);

        for event in replay {
            next.apply(event);
        }
        next
    }
}

/// Pure form of [`Collection::apply`].
pub fn fold(mut collection: Collection, event: &ChangeEvent) -> Collection {
    collection.apply(event);
    collection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnerId;
    use rstest::rstest;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn committed(id: &str, created: i64) -> Bookmark {
        Bookmark {
            id: BookmarkId::Committed(ServerId::new(id)),
            owner: OwnerId::new("alice"),
            url: format!("https://{}.example", id),
            title: id.to_string(),
            favicon_url: None,
            created_at: at(created),
            updated_at: at(created),
        }
    }

    fn provisional(local: LocalId, created: i64) -> Bookmark {
        Bookmark {
            id: BookmarkId::Provisional(local),
            ..committed("pending", created)
        }
    }

    fn ids(collection: &Collection) -> Vec<String> {
        collection.entries().iter().map(|b| b.id.to_string()).collect()
    }

    fn renamed(id: &str, created: i64, title: &str, updated: i64) -> Bookmark {
        let mut b = committed(id, created);
        b.title = title.to_string();
        b.updated_at = at(updated);
        b
    }

    #[rstest]
    #[case::insert(ChangeEvent::Insert(committed("srv-9", 50)))]
    #[case::update(ChangeEvent::Update(renamed("srv-1", 10, "Renamed", 60)))]
    #[case::delete(ChangeEvent::Delete(ServerId::new("srv-2")))]
    #[case::delete_absent(ChangeEvent::Delete(ServerId::new("srv-404")))]
    #[case::update_absent(ChangeEvent::Update(renamed("srv-404", 10, "Ghost", 60)))]
    fn test_fold_is_idempotent(#[case] event: ChangeEvent) {
        let base = Collection::from_rows(vec![committed("srv-1", 10), committed("srv-2", 20)]);

        let once = fold(base.clone(), &event);
        let twice = fold(once.clone(), &event);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_from_rows_sorts_newest_first() {
        let collection =
            Collection::from_rows(vec![committed("a", 1), committed("c", 3), committed("b", 2)]);
        assert_eq!(ids(&collection), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_insert_merges_by_creation_time() {
        let mut collection = Collection::from_rows(vec![committed("new", 30), committed("old", 10)]);

        assert_eq!(collection.apply(&ChangeEvent::Insert(committed("mid", 20))), FoldOutcome::Inserted);
        assert_eq!(collection.apply(&ChangeEvent::Insert(committed("newest", 40))), FoldOutcome::Inserted);
        assert_eq!(collection.apply(&ChangeEvent::Insert(committed("oldest", 0))), FoldOutcome::Inserted);

        assert_eq!(ids(&collection), vec!["newest", "new", "mid", "old", "oldest"]);
    }

    #[test]
    fn test_insert_tie_goes_in_front() {
        let mut collection = Collection::from_rows(vec![committed("a", 10)]);
        collection.apply(&ChangeEvent::Insert(committed("b", 10)));
        assert_eq!(ids(&collection), vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_insert_ignored() {
        let mut collection = Collection::from_rows(vec![committed("srv-1", 10)]);
        assert_eq!(
            collection.apply(&ChangeEvent::Insert(committed("srv-1", 10))),
            FoldOutcome::Ignored
        );
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_update_replaces_mutable_fields_in_place() {
        let mut collection =
            Collection::from_rows(vec![committed("srv-2", 20), committed("srv-1", 10)]);

        let outcome = collection.apply(&ChangeEvent::Update(renamed("srv-1", 10, "Renamed", 30)));

        assert_eq!(outcome, FoldOutcome::Updated);
        assert_eq!(ids(&collection), vec!["srv-2", "srv-1"]);
        assert_eq!(collection.entries()[1].title, "Renamed");
        assert_eq!(collection.entries()[1].updated_at, at(30));
    }

    #[test]
    fn test_stale_update_loses_to_newer_write() {
        let mut collection = Collection::from_rows(vec![renamed("srv-1", 10, "Newest", 50)]);

        let outcome = collection.apply(&ChangeEvent::Update(renamed("srv-1", 10, "Older", 40)));

        assert_eq!(outcome, FoldOutcome::Ignored);
        assert_eq!(collection.entries()[0].title, "Newest");
    }

    #[test]
    fn test_update_for_absent_id_ignored() {
        let mut collection = Collection::new();
        assert_eq!(
            collection.apply(&ChangeEvent::Update(committed("srv-1", 10))),
            FoldOutcome::Ignored
        );
        assert!(collection.is_empty());
    }

    #[test]
    fn test_delete_is_monotonic() {
        let mut collection = Collection::from_rows(vec![committed("srv-1", 10)]);
        let id = ServerId::new("srv-1");

        assert_eq!(collection.apply(&ChangeEvent::Delete(id.clone())), FoldOutcome::Removed);
        assert_eq!(
            collection.apply(&ChangeEvent::Insert(committed("srv-1", 10))),
            FoldOutcome::Ignored
        );
        assert_eq!(
            collection.apply(&ChangeEvent::Update(renamed("srv-1", 10, "Back", 99))),
            FoldOutcome::Ignored
        );
        assert!(collection.is_empty());
        assert!(collection.is_tombstoned(&id));
    }

    #[test]
    fn test_insert_and_delete_commute() {
        let insert = ChangeEvent::Insert(committed("srv-1", 10));
        let delete = ChangeEvent::Delete(ServerId::new("srv-1"));

        let forward = fold(fold(Collection::new(), &insert), &delete);
        let backward = fold(fold(Collection::new(), &delete), &insert);

        assert_eq!(forward.entries(), backward.entries());
        assert!(forward.is_empty());
    }

    #[test]
    fn test_commit_replaces_provisional_in_place() {
        let local = LocalId::generate();
        let mut collection = Collection::from_rows(vec![committed("srv-1", 10)]);
        collection.push_provisional(provisional(local, 20));

        let outcome = collection.commit(local, committed("srv-2", 21));

        assert_eq!(outcome, CommitOutcome::Replaced);
        assert_eq!(ids(&collection), vec!["srv-2", "srv-1"]);
        assert_eq!(collection.provisional().count(), 0);
    }

    #[test]
    fn test_commit_after_stream_insert_drops_provisional() {
        let local = LocalId::generate();
        let mut collection = Collection::new();
        collection.push_provisional(provisional(local, 20));
        collection.apply(&ChangeEvent::Insert(committed("srv-1", 21)));
        assert_eq!(collection.len(), 2);

        let outcome = collection.commit(local, committed("srv-1", 21));

        assert_eq!(outcome, CommitOutcome::AlreadyPresent);
        assert_eq!(ids(&collection), vec!["srv-1"]);
    }

    #[test]
    fn test_commit_after_stream_delete_drops_provisional() {
        let local = LocalId::generate();
        let mut collection = Collection::new();
        collection.push_provisional(provisional(local, 20));
        collection.apply(&ChangeEvent::Insert(committed("srv-1", 21)));
        collection.apply(&ChangeEvent::Delete(ServerId::new("srv-1")));

        let outcome = collection.commit(local, committed("srv-1", 21));

        assert_eq!(outcome, CommitOutcome::AlreadyDeleted);
        assert!(collection.is_empty());
    }

    #[test]
    fn test_commit_without_provisional_is_missing() {
        let mut collection = Collection::new();
        assert_eq!(
            collection.commit(LocalId::generate(), committed("srv-1", 1)),
            CommitOutcome::Missing
        );
        assert!(collection.is_empty());
    }

    #[test]
    fn test_discard_restores_previous_state() {
        let local = LocalId::generate();
        let before = Collection::from_rows(vec![committed("srv-1", 10)]);
        let mut collection = before.clone();
        collection.push_provisional(provisional(local, 20));

        assert!(collection.discard_provisional(local));
        assert_eq!(collection, before);
        assert!(!collection.discard_provisional(local));
    }

    #[test]
    fn test_retitle_provisional() {
        let local = LocalId::generate();
        let mut collection = Collection::new();
        collection.push_provisional(provisional(local, 20));

        assert!(collection.retitle_provisional(local, "Fetched"));
        assert_eq!(collection.entries()[0].title, "Fetched");
        assert!(!collection.retitle_provisional(LocalId::generate(), "Other"));
    }

    #[test]
    fn test_apply_patch_respects_newer_write() {
        let mut collection = Collection::from_rows(vec![renamed("srv-1", 10, "Stream", 50)]);
        let id = ServerId::new("srv-1");

        let stale = collection.apply_patch(&id, &BookmarkPatch::default().with_title("Local"), at(40));
        assert!(stale.is_none());
        assert_eq!(collection.entries()[0].title, "Stream");

        let fresh = collection
            .apply_patch(&id, &BookmarkPatch::default().with_title("Local"), at(60))
            .unwrap();
        assert_eq!(fresh.title, "Local");
        assert_eq!(collection.entries()[0].updated_at, at(60));
    }

    #[test]
    fn test_remove_committed() {
        let mut collection = Collection::from_rows(vec![committed("srv-1", 10)]);
        let id = ServerId::new("srv-1");
        assert!(collection.remove_committed(&id));
        assert!(!collection.remove_committed(&id));
        assert!(collection.is_empty());
    }

    #[test]
    fn test_rebase_keeps_provisional_and_replays() {
        let local = LocalId::generate();
        let mut current = Collection::from_rows(vec![committed("srv-1", 10)]);
        current.push_provisional(provisional(local, 100));
        current.apply(&ChangeEvent::Delete(ServerId::new("srv-2")));

        let replay = vec![
            ChangeEvent::Insert(committed("srv-4", 40)),
            ChangeEvent::Update(renamed("srv-3", 30, "Renamed", 35)),
        ];
        let rows = vec![committed("srv-3", 30), committed("srv-2", 20), committed("srv-1", 10)];

        let next = current.rebase(rows, &replay);

        assert_eq!(
            ids(&next),
            vec![local.to_string(), "srv-4".into(), "srv-3".into(), "srv-1".into()]
        );
        assert_eq!(next.entries()[2].title, "Renamed");
        assert!(next.is_tombstoned(&ServerId::new("srv-2")));
    }

    #[test]
    fn test_fold_never_panics_on_any_order() {
        let events = vec![
            ChangeEvent::Update(renamed("srv-1", 10, "A", 11)),
            ChangeEvent::Delete(ServerId::new("srv-1")),
            ChangeEvent::Insert(committed("srv-1", 10)),
            ChangeEvent::Insert(committed("srv-2", 20)),
            ChangeEvent::Update(renamed("srv-2", 20, "B", 21)),
        ];

        let mut forward = Collection::new();
        for event in &events {
            forward.apply(event);
        }
        let mut backward = Collection::new();
        for event in events.iter().rev() {
            backward.apply(event);
        }

        assert!(forward.get(&BookmarkId::Committed(ServerId::new("srv-1"))).is_none());
        assert!(backward.get(&BookmarkId::Committed(ServerId::new("srv-1"))).is_none());
        assert!(forward.contains(&BookmarkId::Committed(ServerId::new("srv-2"))));
        assert!(backward.contains(&BookmarkId::Committed(ServerId::new("srv-2"))));
    }

    #[test]
    fn test_tombstones_live_until_clear() {
        let mut collection = Collection::from_rows(vec![committed("srv-1", 10)]);
        let id = ServerId::new("srv-1");
        collection.apply(&ChangeEvent::Delete(id.clone()));

        let reloaded = collection.rebase(vec![committed("srv-1", 10)], &[]);
        assert!(reloaded.is_tombstoned(&id));
        assert!(reloaded.is_empty());

        let mut reloaded = reloaded;
        reloaded.clear();
        assert!(!reloaded.is_tombstoned(&id));
        assert_eq!(
            reloaded.apply(&ChangeEvent::Insert(committed("srv-1", 10))),
            FoldOutcome::Inserted
        );
    }
}
