//! SiteDB - a local-first data layer for a small business website
//!
//! Documents are markdown files with YAML frontmatter, versioned in a local
//! git repository, and observed through live queries.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Database                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  Site records           │   │  Generation Pipeline        │  │
//! │  │  (profile, contact,     │   │  service → parse →          │  │
//! │  │   testimonials)         │   │  validate → put_batch       │  │
//! │  └────────────┬────────────┘   └──────────────┬──────────────┘  │
//! │               │                               │                 │
//! │               ▼                               ▼                 │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                    Document Store                           ││
//! │  │  single writer · in-memory index · staged batch rollback    ││
//! │  └──────────┬──────────────────────────────────┬───────────────┘│
//! │             │ ChangeSet                        │                │
//! │             ▼                                  ▼                │
//! │  ┌─────────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  Live Query Engine      │   │  Git History                │  │
//! │  │  (field = value)        │   │  (one commit per write)     │  │
//! │  └─────────────────────────┘   └─────────────────────────────┘  │
//! │                                                │                │
//! │                                                ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │              File System (Markdown Files)                   ││
//! │  │  /collections/{type}/{id}.md   /.sitedb/config.yaml         ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod generation;
pub mod git;
pub mod live;
pub mod schema;
pub mod site;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
pub use generation::{GenerationRequest, GenerationService, HttpGenerationService, Pipeline};
pub use live::{LiveQuery, LiveQueryEngine, QueryUpdate, SubscriptionState};
pub use schema::{FieldKind, ResultSchema};
pub use site::{BusinessProfile, ContactRequest, Testimonial};
pub use storage::document::{Document, Value};
pub use storage::store::{ChangeSet, Store, StoreOptions};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main database handle
///
/// Bundles the store, its live query engine and the loaded configuration.
pub struct Database {
    root: PathBuf,
    config: Config,
    store: Arc<Store>,
    live: LiveQueryEngine,
}

impl Database {
    /// Open or create a database at the given path with its stored configuration
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        let config = Config::load(&root)?;
        Self::open_with(root, config).await
    }

    /// Open or create a database with an explicit configuration
    pub async fn open_with(path: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let root = path.into();
        let store = Arc::new(Store::open(&root, site::store_options(&config)).await?);
        let live = LiveQueryEngine::start(Arc::clone(&store));
        Ok(Self {
            root,
            config,
            store,
            live,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn live(&self) -> &LiveQueryEngine {
        &self.live
    }

    /// The stored business profile, or the configured default view
    pub fn profile(&self) -> Result<BusinessProfile> {
        site::get_or_default(&self.store, &self.config.profile)
    }

    /// Persist the configured default profile unless one exists
    pub async fn ensure_profile(&self) -> Result<(String, bool)> {
        site::ensure_profile(&self.store, &self.config.profile).await
    }

    /// Validate and store a contact form submission
    pub async fn submit_contact(&self, request: &ContactRequest) -> Result<String> {
        site::submit_contact_request(&self.store, request).await
    }

    pub fn testimonials(&self) -> Result<Vec<Testimonial>> {
        site::list_testimonials(&self.store)
    }

    /// A generation pipeline over this store, bounded by the configured timeout
    pub fn pipeline<S: GenerationService>(&self, service: S) -> Pipeline<S> {
        Pipeline::new(service, Arc::clone(&self.store)).with_timeout(self.config.generation.timeout())
    }

    /// A pipeline using the configured HTTP generation service
    pub fn http_pipeline(&self) -> Result<Pipeline<HttpGenerationService>> {
        let service = HttpGenerationService::from_config(&self.config.generation)?;
        Ok(self.pipeline(service))
    }

    /// Subscribe to all documents whose `field` equals `value`
    pub fn subscribe(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(Vec<Document>, LiveQuery)> {
        self.live.subscribe(field, value)
    }
}
