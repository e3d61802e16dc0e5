//! Synchronized collection controller.
//!
//! Owns one user's bookmark list, mediates every write against the remote
//! store and folds the store's change stream into the list. All state lives
//! behind one mutex that is only ever held by synchronous code, so every
//! transition runs to completion before the next one starts; async operations
//! suspend only at their store (and title) calls.
//!
//! Each subscription is tagged with a generation number. Closing bumps the
//! generation, and every stream callback or late operation completion that
//! carries an older generation is dropped.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

use super::collection::{Collection, CommitOutcome, FoldOutcome};
use crate::config::Config;
use crate::fetch::TitleFetcher;
use crate::models::errors::SyncError;
use crate::models::{Bookmark, BookmarkId, BookmarkPatch, LocalId, NewBookmark, OwnerId, ServerId};
use crate::store::{ChangeEvent, EventSink, RemoteStore, SubscriptionHandle};
use crate::utils;

/// Load state of the collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Idle,
    Loading,
    Error(String),
}

/// Published view of the controller after a transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub owner: Option<OwnerId>,
    pub status: SyncStatus,
    pub bookmarks: Vec<Bookmark>,
}

#[derive(Default)]
struct State {
    owner: Option<OwnerId>,
    generation: u64,
    status: SyncStatus,
    collection: Collection,
    subscription: Option<SubscriptionHandle>,
    // Load in flight: its sequence number and everything folded since it started.
    load_seq: u64,
    replay: Option<Vec<ChangeEvent>>,
}

impl State {
    fn journal(&mut self, event: ChangeEvent) {
        if let Some(replay) = self.replay.as_mut() {
            replay.push(event);
        }
    }
}

/// Ticket identifying a write against the generation it started in.
struct Ticket {
    owner: OwnerId,
    generation: u64,
}

struct LoadTicket {
    owner: OwnerId,
    generation: u64,
    seq: u64,
}

/// The state shared between the controller and its subscription callback.
struct Shared {
    state: Mutex<State>,
    snapshots: watch::Sender<Snapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.snapshots.send_replace(Snapshot {
            owner: state.owner.clone(),
            status: state.status.clone(),
            bookmarks: state.collection.to_vec(),
        });
    }

    fn ticket(&self) -> Result<Ticket, SyncError> {
        let state = self.lock();
        match &state.owner {
            Some(owner) => Ok(Ticket {
                owner: owner.clone(),
                generation: state.generation,
            }),
            None => Err(SyncError::NotAuthenticated),
        }
    }

    /// Close the current subscription and forget everything about its owner.
    fn reset(
        &self,
        owner: Option<OwnerId>,
        status: SyncStatus,
    ) -> (Option<SubscriptionHandle>, u64) {
        let mut state = self.lock();
        state.generation += 1;
        let handle = state.subscription.take();
        state.owner = owner;
        state.status = status;
        state.collection.clear();
        state.replay = None;
        self.publish(&state);
        (handle, state.generation)
    }

    /// Keep `handle` if `generation` is still current, otherwise hand it back.
    fn attach(&self, generation: u64, handle: SubscriptionHandle) -> Option<SubscriptionHandle> {
        let mut state = self.lock();
        if state.generation == generation {
            state.subscription = Some(handle);
            None
        } else {
            Some(handle)
        }
    }

    fn take_subscription(&self) -> Option<SubscriptionHandle> {
        self.lock().subscription.take()
    }

    fn fold(&self, generation: u64, event: ChangeEvent) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!("Dropping {:?} from a closed subscription", event.server_id());
            return;
        }

        let outcome = state.collection.apply(&event);
        debug!("Folded {:?}: {:?}", event.server_id(), outcome);
        state.journal(event);
        if outcome != FoldOutcome::Ignored {
            self.publish(&state);
        }
    }

    fn begin_load(&self) -> Option<LoadTicket> {
        let mut state = self.lock();
        let Some(owner) = state.owner.clone() else {
            state.collection.clear();
            state.status = SyncStatus::Idle;
            self.publish(&state);
            return None;
        };

        state.load_seq += 1;
        state.status = SyncStatus::Loading;
        state.replay = Some(Vec::new());
        self.publish(&state);
        Some(LoadTicket {
            owner,
            generation: state.generation,
            seq: state.load_seq,
        })
    }

    fn finish_load(&self, ticket: LoadTicket, result: Result<Vec<Bookmark>, SyncError>) {
        let mut state = self.lock();
        if state.generation != ticket.generation || state.load_seq != ticket.seq {
            debug!("Discarding stale load for {}", ticket.owner);
            return;
        }

        let replay = state.replay.take().unwrap_or_default();
        match result {
            Ok(rows) => {
                state.collection = state.collection.rebase(rows, &replay);
                state.status = SyncStatus::Idle;
                info!(
                    "Loaded {} bookmarks for {}",
                    state.collection.len(),
                    ticket.owner
                );
            }
            Err(e) => {
                warn!("Loading bookmarks for {} failed: {}", ticket.owner, e);
                state.status = SyncStatus::Error(e.to_string());
            }
        }
        self.publish(&state);
    }

    fn begin_add(
        &self,
        local: LocalId,
        url: &str,
        title: &str,
        favicon_url: Option<String>,
    ) -> Result<Ticket, SyncError> {
        let mut state = self.lock();
        let Some(owner) = state.owner.clone() else {
            return Err(SyncError::NotAuthenticated);
        };

        let now = Utc::now();
        state.collection.push_provisional(Bookmark {
            id: BookmarkId::Provisional(local),
            owner: owner.clone(),
            url: url.to_string(),
            title: title.to_string(),
            favicon_url,
            created_at: now,
            updated_at: now,
        });
        self.publish(&state);
        Ok(Ticket {
            owner,
            generation: state.generation,
        })
    }

    fn retitle(&self, ticket: &Ticket, local: LocalId, title: &str) {
        let mut state = self.lock();
        if state.generation != ticket.generation {
            return;
        }
        if state.collection.retitle_provisional(local, title) {
            self.publish(&state);
        }
    }

    fn commit(&self, ticket: &Ticket, local: LocalId, committed: Bookmark) {
        let mut state = self.lock();
        if state.generation != ticket.generation {
            debug!("Owner changed before {} committed", committed.id);
            return;
        }

        let outcome = state.collection.commit(local, committed.clone());
        debug!("Commit of {} as {}: {:?}", local, committed.id, outcome);
        if outcome == CommitOutcome::Replaced {
            state.journal(ChangeEvent::Insert(committed));
        }
        self.publish(&state);
    }

    fn discard(&self, ticket: &Ticket, local: LocalId) {
        let mut state = self.lock();
        if state.generation == ticket.generation && state.collection.discard_provisional(local) {
            self.publish(&state);
        }
    }

    fn confirm_update(
        &self,
        ticket: &Ticket,
        id: &ServerId,
        patch: &BookmarkPatch,
        updated_at: DateTime<Utc>,
    ) {
        let mut state = self.lock();
        if state.generation != ticket.generation {
            return;
        }
        if let Some(updated) = state.collection.apply_patch(id, patch, updated_at) {
            state.journal(ChangeEvent::Update(updated));
            self.publish(&state);
        }
    }

    fn confirm_remove(&self, ticket: &Ticket, id: &ServerId) {
        let mut state = self.lock();
        if state.generation != ticket.generation {
            return;
        }
        let removed = state.collection.remove_committed(id);
        state.journal(ChangeEvent::Delete(id.clone()));
        if removed {
            self.publish(&state);
        }
    }
}

/// Keeps one owner's bookmarks in sync with a remote store.
pub struct Controller<S: RemoteStore, F: TitleFetcher> {
    store: S,
    fetcher: F,
    shared: Arc<Shared>,
    default_scheme: String,
}

impl<S: RemoteStore, F: TitleFetcher> Controller<S, F> {
    pub fn new(store: S, fetcher: F) -> Self {
        let (snapshots, _) = watch::channel(Snapshot::default());
        Self {
            store,
            fetcher,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                snapshots,
            }),
            default_scheme: utils::DEFAULT_SCHEME.to_string(),
        }
    }

    pub fn from_config(store: S, fetcher: F, config: &Config) -> Self {
        Self::new(store, fetcher).with_default_scheme(&config.default_scheme)
    }

    pub fn with_default_scheme(mut self, scheme: &str) -> Self {
        self.default_scheme = scheme.to_string();
        self
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshots.borrow().clone()
    }

    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.shared.lock().collection.to_vec()
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.lock().status.clone()
    }

    pub fn active_owner(&self) -> Option<OwnerId> {
        self.shared.lock().owner.clone()
    }

    /// Receiver that sees a new snapshot after every visible transition.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Wait until the controller shows `owner` with no load in flight.
    pub async fn settled(&self, owner: Option<&OwnerId>) -> Snapshot {
        let mut rx = self.watch();
        let settled = rx
            .wait_for(|s| s.owner.as_ref() == owner && s.status != SyncStatus::Loading)
            .await
            .map(|snapshot| snapshot.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// Close the current subscription and clear the collection.
    pub fn close(&self) {
        let (handle, _) = self.shared.reset(None, SyncStatus::Idle);
        if let Some(handle) = handle {
            self.store.unsubscribe(handle);
            info!("Closed subscription {}", handle.id());
        }
    }

    /// Switch to `owner`: close the previous subscription, clear the list and
    /// subscribe to `owner`'s change stream. Does not load; see `load`.
    pub fn open(&self, owner: OwnerId) {
        self.open_with(owner, SyncStatus::Idle);
    }

    // Opening for an immediate load starts out as Loading, so observers never
    // see the new owner with an empty, idle list.
    fn open_with(&self, owner: OwnerId, status: SyncStatus) {
        let (previous, generation) = self.shared.reset(Some(owner.clone()), status);
        if let Some(previous) = previous {
            self.store.unsubscribe(previous);
            info!("Closed subscription {}", previous.id());
        }

        let handle = self.store.subscribe(&owner, self.sink(generation));
        match self.shared.attach(generation, handle) {
            None => info!("Subscribed to changes of {}", owner),
            Some(stale) => self.store.unsubscribe(stale),
        }
    }

    fn sink(&self, generation: u64) -> EventSink {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |event| {
            if let Some(shared) = shared.upgrade() {
                shared.fold(generation, event);
            }
        })
    }

    /// Bring the controller to `owner`. Returns whether a load is needed.
    fn switch_owner(&self, owner: Option<OwnerId>) -> bool {
        let (current, status) = {
            let state = self.shared.lock();
            (state.owner.clone(), state.status.clone())
        };
        match owner {
            None => {
                if current.is_some() {
                    self.close();
                }
                false
            }
            Some(owner) if current.as_ref() == Some(&owner) => status == SyncStatus::Loading,
            Some(owner) => {
                self.open_with(owner, SyncStatus::Loading);
                true
            }
        }
    }

    /// Follow `owner`: open and load on a new owner, close on `None`.
    /// Setting the owner that is already active does nothing.
    pub async fn set_owner(&self, owner: Option<OwnerId>) {
        if self.switch_owner(owner) {
            self.load().await;
        }
    }

    /// Track the auth signal until its sender goes away. An owner change that
    /// arrives while a load is in flight abandons that load.
    pub async fn bind(&self, mut auth: watch::Receiver<Option<OwnerId>>) {
        loop {
            let owner = auth.borrow_and_update().clone();
            if self.switch_owner(owner) {
                tokio::select! {
                    _ = self.load() => {}
                    changed = auth.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue;
                    }
                }
            }
            if auth.changed().await.is_err() {
                return;
            }
        }
    }

    /// Replace the collection with the store's listing for the active owner.
    /// Failures surface through `status`.
    pub async fn load(&self) {
        let Some(ticket) = self.shared.begin_load() else {
            return;
        };
        let result = self.store.list(&ticket.owner).await.map_err(SyncError::from);
        self.shared.finish_load(ticket, result);
    }

    /// Add a bookmark. The provisional entry is in the list before the first
    /// suspension point; it is committed or rolled back by the time this resolves.
    pub async fn add(&self, input: NewBookmark) -> Result<(), SyncError> {
        let url = utils::normalize_url(&input.url, &self.default_scheme);
        let fallback = utils::fallback_title(&url);
        let explicit = Some(input.title.trim().to_string()).filter(|t| !t.is_empty());
        let favicon_url = input.favicon_url.filter(|f| !f.trim().is_empty());

        let local = LocalId::generate();
        let shown = explicit.as_deref().unwrap_or(&fallback);
        let ticket = self.shared.begin_add(local, &url, shown, favicon_url.clone())?;
        debug!("Added provisional {} for {}", local, url);

        let title = match explicit {
            Some(title) => title,
            None => match self.fetcher.fetch_title(&url).await {
                Some(fetched) if !fetched.trim().is_empty() => {
                    let fetched = fetched.trim().to_string();
                    self.shared.retitle(&ticket, local, &fetched);
                    fetched
                }
                _ => {
                    debug!("No title found for {}, using {}", url, fallback);
                    fallback
                }
            },
        };

        let request = NewBookmark {
            url,
            title,
            favicon_url,
        };
        match self.store.insert(&ticket.owner, request).await {
            Ok(committed) => {
                self.shared.commit(&ticket, local, committed);
                Ok(())
            }
            Err(e) => {
                warn!("Insert for {} failed: {}", ticket.owner, e);
                self.shared.discard(&ticket, local);
                Err(e.into())
            }
        }
    }

    /// Update the mutable fields of a committed bookmark. The local entry
    /// changes only once the store accepted the write.
    pub async fn update(&self, id: &BookmarkId, patch: BookmarkPatch) -> Result<(), SyncError> {
        let ticket = self.shared.ticket()?;
        let server_id = committed_id(id)?;

        let patch = patch.normalized(&self.default_scheme);
        if patch.is_empty() {
            return Ok(());
        }

        let updated_at = Utc::now();
        if let Err(e) = self.store.update(server_id, patch.clone(), updated_at).await {
            warn!("Update of {} failed: {}", server_id, e);
            return Err(e.into());
        }
        self.shared.confirm_update(&ticket, server_id, &patch, updated_at);
        Ok(())
    }

    /// Delete a committed bookmark; it leaves the list as soon as the store confirms.
    pub async fn remove(&self, id: &BookmarkId) -> Result<(), SyncError> {
        let ticket = self.shared.ticket()?;
        let server_id = committed_id(id)?;

        if let Err(e) = self.store.delete(server_id).await {
            warn!("Delete of {} failed: {}", server_id, e);
            return Err(e.into());
        }
        self.shared.confirm_remove(&ticket, server_id);
        Ok(())
    }
}

fn committed_id(id: &BookmarkId) -> Result<&ServerId, SyncError> {
    id.as_committed()
        .ok_or_else(|| SyncError::NotCommitted(id.clone()))
}

impl<S: RemoteStore, F: TitleFetcher> Drop for Controller<S, F> {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.take_subscription() {
            self.store.unsubscribe(handle);
        }
    }
}
