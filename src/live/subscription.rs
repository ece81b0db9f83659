//! Subscriptions and their handles

use std::collections::BTreeMap;
use std::sync::Weak;

use tokio::sync::mpsc;

use super::Registry;
use crate::storage::document::{Document, Value};
use crate::storage::store::{ChangeKind, ChangeSet};

/// Identifier of a live query
pub type SubscriptionId = u64;

/// Lifecycle of a live query. `Unsubscribed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Unsubscribed,
}

/// A new result set for a live query
#[derive(Debug, Clone)]
pub struct QueryUpdate {
    /// Store version the result reflects
    pub version: u64,
    /// Matching documents in insertion order
    pub documents: Vec<Document>,
}

/// Engine-side state of one subscription
pub(crate) struct Subscription {
    field: String,
    value: Value,
    /// Version of the initial snapshot
    since: u64,
    /// Current members keyed by insertion sequence
    members: BTreeMap<u64, Document>,
    tx: mpsc::UnboundedSender<QueryUpdate>,
}

impl Subscription {
    pub(crate) fn new(
        field: String,
        value: Value,
        since: u64,
        initial: &[Document],
        tx: mpsc::UnboundedSender<QueryUpdate>,
    ) -> Self {
        let members = initial
            .iter()
            .map(|doc| (doc.meta.seq, doc.clone()))
            .collect();
        Self {
            field,
            value,
            since,
            members,
            tx,
        }
    }

    /// Fold a change set into the result. Returns true if the result changed.
    pub(crate) fn apply(&mut self, set: &ChangeSet) -> bool {
        if set.version <= self.since {
            return false;
        }

        let mut changed = false;
        for change in &set.changes {
            let seq = change.document.meta.seq;
            let matches = change.kind == ChangeKind::Put
                && change.document.matches(&self.field, &self.value);

            if matches {
                if self.members.get(&seq) != Some(&change.document) {
                    self.members.insert(seq, change.document.clone());
                    changed = true;
                }
            } else if self.members.remove(&seq).is_some() {
                changed = true;
            }
        }
        changed
    }

    /// Push the current result. Returns false if the handle is gone.
    pub(crate) fn deliver(&self, version: u64) -> bool {
        let update = QueryUpdate {
            version,
            documents: self.members.values().cloned().collect(),
        };
        self.tx.send(update).is_ok()
    }
}

/// Handle to a live query
///
/// Dropping the handle unsubscribes it.
pub struct LiveQuery {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<QueryUpdate>,
    registry: Weak<Registry>,
    state: SubscriptionState,
}

impl LiveQuery {
    pub(crate) fn new(
        id: SubscriptionId,
        rx: mpsc::UnboundedReceiver<QueryUpdate>,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            id,
            rx,
            registry,
            state: SubscriptionState::Active,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Wait for the next result set
    ///
    /// Returns `None` once unsubscribed or when the engine has stopped.
    pub async fn next(&mut self) -> Option<QueryUpdate> {
        if self.state == SubscriptionState::Unsubscribed {
            return None;
        }
        self.rx.recv().await
    }

    /// Take a queued result set without waiting
    pub fn try_next(&mut self) -> Option<QueryUpdate> {
        if self.state == SubscriptionState::Unsubscribed {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stop receiving updates; queued updates are discarded
    pub fn unsubscribe(&mut self) {
        if self.state == SubscriptionState::Unsubscribed {
            return;
        }
        self.state = SubscriptionState::Unsubscribed;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}
