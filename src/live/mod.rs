//! Live queries for sitedb
//!
//! A live query is a standing `(field, value)` subscription whose result set
//! follows the store without re-polling. The engine owns one worker task
//! that consumes the store's change sets in commit order and, for every
//! subscription whose result changed, pushes the full new result set.
//!
//! ```text
//! Store.put/delete ──► ChangeSet ──► worker ──► Subscription.apply ──► QueryUpdate ──► LiveQuery
//! ```
//!
//! Because a single worker delivers every update, a handle never sees
//! results out of write order. Each subscription remembers the store version
//! of its initial snapshot and ignores change sets it already reflects.

mod subscription;

pub use subscription::{LiveQuery, QueryUpdate, SubscriptionId, SubscriptionState};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::storage::document::{Document, Value};
use crate::storage::store::{ChangeSet, Store};
use subscription::Subscription;

/// Subscription table shared between the engine, its worker and handles
#[derive(Default)]
pub(crate) struct Registry {
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Subscription>> {
        match self.subscriptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!("Removed live query {}", id);
        }
        removed
    }

    /// Route one change set to every subscription
    fn apply(&self, set: &ChangeSet) {
        let mut subscriptions = self.lock();
        subscriptions.retain(|id, sub| {
            if !sub.apply(set) {
                return true;
            }
            let delivered = sub.deliver(set.version);
            if !delivered {
                tracing::debug!("Dropping live query {} with closed receiver", id);
            }
            delivered
        });
    }
}

/// Maintains live queries over a store
pub struct LiveQueryEngine {
    store: Arc<Store>,
    registry: Arc<Registry>,
    worker: JoinHandle<()>,
}

impl LiveQueryEngine {
    /// Start the engine's worker on the current tokio runtime
    pub fn start(store: Arc<Store>) -> Self {
        let mut changes = store.changes();
        let registry = Arc::new(Registry::default());

        let worker_registry = Arc::clone(&registry);
        let worker = tokio::spawn(async move {
            tracing::debug!("Live query worker started");
            while let Some(set) = changes.recv().await {
                worker_registry.apply(&set);
            }
            tracing::debug!("Live query worker stopped");
        });

        Self {
            store,
            registry,
            worker,
        }
    }

    /// Subscribe to all documents whose `field` equals `value`
    ///
    /// Returns the current result set and a handle that yields every later
    /// result set, in insertion order of the documents.
    pub fn subscribe(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(Vec<Document>, LiveQuery)> {
        let field = field.into();
        let value = value.into();
        let (tx, rx) = mpsc::unbounded_channel();

        // The snapshot is taken while the table is locked, so the worker
        // cannot route a newer change set before this subscription exists.
        let mut subscriptions = self.registry.lock();
        let (version, docs) = self.store.snapshot_by_field(&field, &value)?;
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!("Live query {} on {} = {:?} at version {}", id, field, value, version);
        subscriptions.insert(id, Subscription::new(field, value, version, &docs, tx));
        drop(subscriptions);

        Ok((docs, LiveQuery::new(id, rx, Arc::downgrade(&self.registry))))
    }

    /// Stop a subscription. Safe to call any number of times.
    pub fn unsubscribe(&self, handle: &mut LiveQuery) {
        handle.unsubscribe();
    }

    /// Number of active subscriptions
    pub fn active_subscriptions(&self) -> usize {
        self.registry.lock().len()
    }

    /// The store this engine follows
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

impl Drop for LiveQueryEngine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::StoreOptions;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<Store>, LiveQueryEngine) {
        let tmp = TempDir::new().unwrap();
        let options = StoreOptions {
            history: false,
            ..Default::default()
        };
        let store = Arc::new(Store::open(tmp.path(), options).await.unwrap());
        let engine = LiveQueryEngine::start(store.clone());
        (tmp, store, engine)
    }

    async fn next_update(query: &mut LiveQuery) -> QueryUpdate {
        tokio::time::timeout(Duration::from_secs(2), query.next())
            .await
            .expect("timed out waiting for update")
            .expect("subscription closed")
    }

    async fn assert_quiet(query: &mut LiveQuery) {
        let waited = tokio::time::timeout(Duration::from_millis(100), query.next()).await;
        assert!(waited.is_err(), "unexpected update: {:?}", waited);
    }

    fn testimonial(name: &str) -> Document {
        let mut doc = Document::new("testimonial");
        doc.set("name", name);
        doc
    }

    #[tokio::test]
    async fn test_initial_result_and_enter() {
        let (_tmp, store, engine) = setup().await;
        store.put(testimonial("Before")).await.unwrap();

        let (initial, mut query) = engine.subscribe("type", "testimonial").unwrap();
        assert_eq!(initial.len(), 1);

        store.put(testimonial("After")).await.unwrap();
        let update = next_update(&mut query).await;
        let names: Vec<_> = update.documents.iter().filter_map(|d| d.get_str("name")).collect();
        assert_eq!(names, ["Before", "After"]);
    }

    #[tokio::test]
    async fn test_non_matching_write_is_not_delivered() {
        let (_tmp, store, engine) = setup().await;
        let (_, mut query) = engine.subscribe("type", "business-info").unwrap();

        store.put(testimonial("Elsewhere")).await.unwrap();
        assert_quiet(&mut query).await;
    }

    #[tokio::test]
    async fn test_leave_on_delete() {
        let (_tmp, store, engine) = setup().await;
        let id = store.put(testimonial("Gone")).await.unwrap();
        let (initial, mut query) = engine.subscribe("type", "testimonial").unwrap();
        assert_eq!(initial.len(), 1);

        store.delete(&id).await.unwrap();
        let update = next_update(&mut query).await;
        assert!(update.documents.is_empty());
    }

    #[tokio::test]
    async fn test_leave_when_field_changes() {
        let (_tmp, store, engine) = setup().await;
        let mut doc = Document::with_id("shop", "business-info");
        doc.set("city", "Anytown");
        store.put(doc.clone()).await.unwrap();

        let (initial, mut query) = engine.subscribe("city", "Anytown").unwrap();
        assert_eq!(initial.len(), 1);

        doc.set("city", "Othertown");
        store.put(doc).await.unwrap();
        let update = next_update(&mut query).await;
        assert!(update.documents.is_empty());
    }

    #[tokio::test]
    async fn test_updates_arrive_in_write_order() {
        let (_tmp, store, engine) = setup().await;
        let (_, mut query) = engine.subscribe("type", "testimonial").unwrap();

        for i in 0..5 {
            store.put(testimonial(&format!("T{}", i))).await.unwrap();
        }

        let mut last_version = 0;
        for expected_len in 1..=5 {
            let update = next_update(&mut query).await;
            assert!(update.version > last_version);
            assert_eq!(update.documents.len(), expected_len);
            last_version = update.version;
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_silences() {
        let (_tmp, store, engine) = setup().await;
        let (_, mut query) = engine.subscribe("type", "testimonial").unwrap();
        assert_eq!(engine.active_subscriptions(), 1);

        engine.unsubscribe(&mut query);
        query.unsubscribe();
        assert_eq!(query.state(), SubscriptionState::Unsubscribed);
        assert_eq!(engine.active_subscriptions(), 0);

        store.put(testimonial("Unseen")).await.unwrap();
        assert!(query.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_discards_in_flight_update() {
        let (_tmp, store, engine) = setup().await;
        let (_, mut query) = engine.subscribe("type", "testimonial").unwrap();

        store.put(testimonial("Racing")).await.unwrap();
        // Give the worker time to queue the update before unsubscribing.
        tokio::time::sleep(Duration::from_millis(50)).await;
        query.unsubscribe();

        assert!(query.try_next().is_none());
        assert!(query.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_handle_unsubscribes() {
        let (_tmp, _store, engine) = setup().await;
        let (_, query) = engine.subscribe("type", "testimonial").unwrap();
        assert_eq!(engine.active_subscriptions(), 1);
        drop(query);
        assert_eq!(engine.active_subscriptions(), 0);
    }
}
