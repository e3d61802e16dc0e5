//! Signed-in user signal shared by every controller of a process.

use log::info;
use tokio::sync::watch;

use crate::models::OwnerId;

/// Current signed-in owner, observable through [`AuthState::watch`].
#[derive(Debug)]
pub struct AuthState {
    tx: watch::Sender<Option<OwnerId>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn login(&self, owner: OwnerId) {
        info!("Signed in as {}", owner);
        self.tx.send_replace(Some(owner));
    }

    pub fn logout(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            info!("Signed out {}", previous);
        }
    }

    pub fn current_owner(&self) -> Option<OwnerId> {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<OwnerId>> {
        self.tx.subscribe()
    }
}
