//! Integration tests for sitedb
//!
//! Exercises the store, live queries and the generation pipeline together
//! through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sitedb::site::{self, BusinessProfile, ContactRequest, Testimonial};
use sitedb::{
    Config, Database, Document, Error, FieldKind, GenerationRequest, GenerationService,
    ResultSchema, Store, StoreOptions,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Generation service answering with a fixed payload
struct MockService {
    payload: String,
    calls: AtomicUsize,
}

impl MockService {
    fn new(payload: &str) -> Self {
        Self {
            payload: payload.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl GenerationService for MockService {
    async fn generate(&self, _request: &GenerationRequest) -> sitedb::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

/// Helper to create a test database
async fn setup_test_db() -> (TempDir, Database) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(tmp.path()).await.expect("Failed to open database");
    (tmp, db)
}

async fn next_update(handle: &mut sitedb::LiveQuery) -> sitedb::QueryUpdate {
    tokio::time::timeout(Duration::from_secs(2), handle.next())
        .await
        .expect("timed out waiting for update")
        .expect("subscription closed")
}

fn testimonial_schema() -> ResultSchema {
    ResultSchema::new("testimonials")
        .field("name", FieldKind::String)
        .field("service", FieldKind::String)
        .field("text", FieldKind::String)
}

// =============================================================================
// Store Tests
// =============================================================================

#[tokio::test]
async fn test_put_then_get_returns_input_plus_envelope() {
    let (_tmp, db) = setup_test_db().await;
    let mut doc = Document::new("note");
    doc.set("title", "Hello").set("pinned", true);

    let id = db.store().put(doc.clone()).await.unwrap();
    let stored = db.store().get(&id).unwrap().unwrap();

    assert_eq!(stored.id.as_deref(), Some(id.as_str()));
    assert!(stored.created_at.is_some());
    assert_eq!(stored.fields, doc.fields);
    assert_eq!(stored.doc_type, "note");
}

#[tokio::test]
async fn test_delete_then_get_is_none() {
    let (_tmp, db) = setup_test_db().await;
    let id = db.store().put(Document::new("note")).await.unwrap();

    assert!(db.store().delete(&id).await.unwrap());
    assert!(db.store().get(&id).unwrap().is_none());
    assert!(!db.store().delete(&id).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_puts_are_all_listed_in_write_order() {
    let (_tmp, db) = setup_test_db().await;
    let store = Arc::clone(db.store());
    let mut changes = store.changes();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let mut doc = Document::new(Testimonial::TAG);
            doc.set("name", format!("Customer {}", i))
                .set("service", "Screen")
                .set("text", "Great");
            store.put(doc).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Change sets are published in commit order
    let mut committed = Vec::new();
    for _ in 0..8 {
        let set = changes.recv().await.expect("change set");
        assert_eq!(set.changes.len(), 1);
        committed.push(set.changes[0].id.clone());
    }

    let listed: Vec<String> = store
        .query_by_field("type", Testimonial::TAG)
        .unwrap()
        .iter()
        .map(|d| d.id_str().to_string())
        .collect();
    assert_eq!(listed, committed);
}

#[tokio::test]
async fn test_reopen_preserves_documents_and_order() {
    let tmp = TempDir::new().unwrap();
    let ids = {
        let db = Database::open(tmp.path()).await.unwrap();
        let mut ids = Vec::new();
        for title in ["first", "second", "third"] {
            let mut doc = Document::new("note");
            doc.set("title", title);
            ids.push(db.store().put(doc).await.unwrap());
        }
        ids
    };

    let db = Database::open(tmp.path()).await.unwrap();
    let listed: Vec<String> = db
        .store()
        .query_by_field("type", "note")
        .unwrap()
        .iter()
        .map(|d| d.id_str().to_string())
        .collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_type_change_rejected() {
    let (_tmp, db) = setup_test_db().await;
    let id = db.store().put(Document::new("note")).await.unwrap();

    let err = db.store().put(Document::with_id(&id, "todo")).await.unwrap_err();
    assert!(matches!(err, Error::ImmutableType { .. }));
}

#[tokio::test]
async fn test_contact_request_is_append_only() {
    let (_tmp, db) = setup_test_db().await;
    let request = ContactRequest {
        name: "Lee".to_string(),
        phone: "555-0199".to_string(),
        email: "lee@example.com".to_string(),
        message: "Water damage".to_string(),
    };
    let id = db.submit_contact(&request).await.unwrap();

    let mut rewrite = db.store().get(&id).unwrap().unwrap();
    rewrite.set("message", "Edited");
    let err = db.store().put(rewrite).await.unwrap_err();
    assert!(matches!(err, Error::AppendOnly { .. }));
}

#[tokio::test]
async fn test_writes_are_committed_to_history() {
    let (_tmp, db) = setup_test_db().await;
    let id = db.store().put(Document::new("note")).await.unwrap();

    let message = db.store().last_commit_message().await.unwrap();
    assert_eq!(message, Some(format!("put note: {}", id)));
}

// =============================================================================
// Live Query Tests
// =============================================================================

#[tokio::test]
async fn test_profile_subscription_sees_single_put() {
    let (_tmp, db) = setup_test_db().await;

    let (initial, mut handle) = db.subscribe("type", BusinessProfile::TAG).unwrap();
    assert!(initial.is_empty());

    let (id, created) = db.ensure_profile().await.unwrap();
    assert!(created);

    let update = next_update(&mut handle).await;
    assert_eq!(update.documents.len(), 1);
    assert_eq!(update.documents[0].id_str(), id);
    assert!(handle.try_next().is_none());
}

#[tokio::test]
async fn test_unsubscribed_handle_receives_nothing() {
    let (_tmp, db) = setup_test_db().await;
    let (_, mut handle) = db.subscribe("type", "note").unwrap();

    db.live().unsubscribe(&mut handle);
    db.live().unsubscribe(&mut handle);
    assert_eq!(db.live().active_subscriptions(), 0);

    db.store().put(Document::new("note")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.try_next().is_none());
    assert!(handle.next().await.is_none());
}

#[tokio::test]
async fn test_non_matching_writes_are_not_pushed() {
    let (_tmp, db) = setup_test_db().await;
    let (_, mut handle) = db.subscribe("type", "note").unwrap();

    db.store().put(Document::new("todo")).await.unwrap();
    db.store().put(Document::new("note")).await.unwrap();

    let update = next_update(&mut handle).await;
    assert_eq!(update.documents.len(), 1);
    assert_eq!(update.documents[0].doc_type, "note");
}

// =============================================================================
// Profile Tests
// =============================================================================

#[tokio::test]
async fn test_concurrent_ensure_profile_yields_one_document() {
    let (_tmp, db) = setup_test_db().await;
    let store = Arc::clone(db.store());
    let default = BusinessProfile::default();

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let store = Arc::clone(&store);
        let default = default.clone();
        tasks.push(tokio::spawn(async move {
            site::ensure_profile(&store, &default).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    let mut created = 0;
    for task in tasks {
        let (id, was_created) = task.await.unwrap();
        ids.push(id);
        created += usize::from(was_created);
    }

    assert_eq!(created, 1);
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.query_by_field("type", BusinessProfile::TAG).unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_profile_document_is_rejected() {
    let (_tmp, db) = setup_test_db().await;
    let (id, _) = db.ensure_profile().await.unwrap();

    let err = db
        .store()
        .put(BusinessProfile::default().to_document())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SingletonExists { ref existing, .. } if *existing == id));

    let profiles = db.store().query_by_field("type", BusinessProfile::TAG).unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(db.profile().unwrap(), BusinessProfile::default());
}

#[tokio::test]
async fn test_configured_default_profile() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.history.enabled = false;
    config.profile.name = "Corner Repairs".to_string();
    let db = Database::open_with(tmp.path(), config).await.unwrap();

    assert_eq!(db.profile().unwrap().name, "Corner Repairs");
    assert!(db.store().is_empty().unwrap());
}

// =============================================================================
// Generation Pipeline Tests
// =============================================================================

#[tokio::test]
async fn test_generated_testimonial_is_persisted() {
    let (_tmp, db) = setup_test_db().await;
    let pipeline = db.pipeline(MockService::new(
        r#"[{"name":"Alice","service":"Screen repair","text":"Great!"}]"#,
    ));

    let docs = pipeline
        .generate_into("one testimonial", &testimonial_schema(), Testimonial::TAG)
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);

    let stored = db.store().get(docs[0].id_str()).unwrap().unwrap();
    assert_eq!(stored.get_str("name"), Some("Alice"));
    assert_eq!(stored.get_str("service"), Some("Screen repair"));
    assert_eq!(stored.get_str("text"), Some("Great!"));
    assert!(stored.created_at.is_some());
    assert_eq!(stored.doc_type, Testimonial::TAG);
}

#[tokio::test]
async fn test_invalid_payload_persists_nothing() {
    let (_tmp, db) = setup_test_db().await;
    let pipeline = db.pipeline(MockService::new(r#"[{"name":"Alice","text":"Great!"}]"#));

    let err = pipeline
        .generate_into("one testimonial", &testimonial_schema(), Testimonial::TAG)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(db.testimonials().unwrap().is_empty());
}

#[tokio::test]
async fn test_generated_batch_reaches_subscribers_once() {
    let (_tmp, db) = setup_test_db().await;
    let (initial, mut handle) = site::subscribe_testimonials(db.live()).unwrap();
    assert!(initial.is_empty());

    let pipeline = db.pipeline(MockService::new(
        r#"{"testimonials": [
            {"name": "Ana", "service": "Battery", "text": "Quick"},
            {"name": "Raj", "service": "Screen", "text": "Perfect"},
            {"name": "Mo", "service": "Keyboard", "text": "Friendly"}
        ]}"#,
    ));
    let generated = site::generate_testimonials(&pipeline, 3, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(generated.len(), 3);

    let update = next_update(&mut handle).await;
    let names: Vec<_> = update
        .documents
        .iter()
        .map(|d| d.get_str("name").unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, ["Ana", "Raj", "Mo"]);
    assert!(handle.try_next().is_none());

    let message = db.store().last_commit_message().await.unwrap();
    assert_eq!(message.as_deref(), Some("put batch: 3 document(s)"));
}

#[tokio::test]
async fn test_cancelled_generation_never_calls_store() {
    let tmp = TempDir::new().unwrap();
    let options = StoreOptions {
        history: false,
        ..Default::default()
    };
    let store = Arc::new(Store::open(tmp.path(), options).await.unwrap());
    let pipeline = sitedb::Pipeline::new(MockService::new("[]"), Arc::clone(&store));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = pipeline
        .generate_into_with_cancel("x", &testimonial_schema(), Testimonial::TAG, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(store.is_empty().unwrap());
}
