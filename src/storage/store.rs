//! Document store
//!
//! The store keeps every document in an in-memory index backed by one
//! markdown file per document under `collections/{type}/`. Writes are
//! serialized through a single writer lock: each write lands on disk,
//! optionally becomes a git commit, and only then is swapped into the
//! index and announced to change listeners. Readers never wait on disk.
//!
//! Multi-document writes (`put_batch`) are all-or-nothing: a failure at any
//! point removes the files already written and leaves the index untouched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::collection::Collection;
use super::document::{Document, Value};
use crate::error::{Error, Result};
use crate::git;
use crate::validation::{validate_document_id, validate_type_tag};

/// Options fixed when the store is opened
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Record each write as a git commit
    pub history: bool,
    /// Types whose documents can be created and deleted but never rewritten
    pub append_only: Vec<String>,
    /// Types that hold at most one document at a time
    pub singleton: Vec<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            history: true,
            append_only: Vec::new(),
            singleton: Vec::new(),
        }
    }
}

/// What happened to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Put,
    Delete,
}

/// A single document change, keyed by `(doc_type, id)`
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub doc_type: String,
    pub id: String,
    /// The written document, or the last state of a deleted one
    pub document: Document,
}

/// All changes produced by one committed write
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Store version after the write
    pub version: u64,
    pub changes: Vec<Change>,
}

#[derive(Debug, Default)]
struct Index {
    docs: HashMap<String, Document>,
    /// Insertion sequence -> id
    order: BTreeMap<u64, String>,
    version: u64,
}

impl Index {
    fn insert(&mut self, doc: Document) {
        let id = doc.id_str().to_string();
        if let Some(old) = self.docs.get(&id) {
            self.order.remove(&old.meta.seq);
        }
        self.order.insert(doc.meta.seq, id.clone());
        self.docs.insert(id, doc);
    }

    fn remove(&mut self, id: &str) -> Option<Document> {
        let doc = self.docs.remove(id)?;
        self.order.remove(&doc.meta.seq);
        Some(doc)
    }

    fn ordered(&self) -> impl Iterator<Item = &Document> {
        self.order.values().filter_map(|id| self.docs.get(id))
    }

    fn scan(&self, field: &str, value: &Value) -> Vec<Document> {
        self.ordered()
            .filter(|doc| doc.matches(field, value))
            .cloned()
            .collect()
    }
}

struct Writer {
    history: Option<git::Repository>,
    next_seq: u64,
}

/// A staged write, kept so it can be undone
enum Staged {
    Put {
        doc: Document,
        previous: Option<Document>,
    },
    Delete {
        doc: Document,
    },
}

/// The document store
pub struct Store {
    root: PathBuf,
    append_only: HashSet<String>,
    singleton: HashSet<String>,
    index: RwLock<Index>,
    writer: tokio::sync::Mutex<Writer>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<ChangeSet>>>,
}

impl Store {
    /// Open or create a store at the given path and load all documents
    pub async fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let root = path.into();
        let collections = root.join("collections");
        tokio::fs::create_dir_all(&collections)
            .await
            .map_err(|source| Error::FileWriteError {
                path: collections.clone(),
                source,
            })?;

        let history = if options.history {
            Some(git::Repository::open_or_init(&root)?)
        } else {
            None
        };

        let (index, next_seq) = load_index(&root)?;
        tracing::info!(
            "Opened store at {:?} with {} document(s)",
            root,
            index.docs.len()
        );

        Ok(Self {
            root,
            append_only: options.append_only.into_iter().collect(),
            singleton: options.singleton.into_iter().collect(),
            index: RwLock::new(index),
            writer: tokio::sync::Mutex::new(Writer { history, next_seq }),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a document, assigning an id if it has none, and return the id
    ///
    /// A document with an id that already exists replaces the stored one,
    /// keeping its `created_at` and insertion position. The type tag can
    /// never change and append-only types can never be rewritten.
    pub async fn put(&self, doc: Document) -> Result<String> {
        let mut writer = self.writer.lock().await;
        let staged = self.stage_put(doc, &mut writer)?;
        let (doc_type, id) = staged.key();
        let message = format!("put {}: {}", doc_type, id);
        self.apply(&mut writer, vec![staged], &message).await?;
        Ok(id)
    }

    /// Write several documents as one unit
    ///
    /// Either every document is persisted and announced in a single change
    /// set, or none is. A batch may create at most one document of each
    /// singleton type.
    pub async fn put_batch(&self, docs: Vec<Document>) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = self.writer.lock().await;
        let mut staged = Vec::with_capacity(docs.len());
        let mut seen = HashSet::new();
        let mut created_singletons: HashMap<String, String> = HashMap::new();
        for doc in docs {
            let s = self.stage_put(doc, &mut writer)?;
            let (doc_type, id) = s.key();
            if !seen.insert(id.clone()) {
                return Err(Error::storage(format!("document '{}' appears twice in batch", id)));
            }
            if s.creates() && self.singleton.contains(&doc_type) {
                if let Some(existing) = created_singletons.insert(doc_type.clone(), id) {
                    return Err(Error::SingletonExists { doc_type, existing });
                }
            }
            staged.push(s);
        }

        let ids: Vec<String> = staged.iter().map(|s| s.key().1).collect();
        let message = format!("put batch: {} document(s)", ids.len());
        self.apply(&mut writer, staged, &message).await?;
        Ok(ids)
    }

    /// Insert `doc` unless a document with `field == value` already exists
    ///
    /// The check and the insert happen under the writer lock, so concurrent
    /// callers agree on a single document. Returns its id and whether this
    /// call created it.
    pub async fn put_if_absent(
        &self,
        field: &str,
        value: impl Into<Value>,
        doc: Document,
    ) -> Result<(String, bool)> {
        let value = value.into();
        let mut writer = self.writer.lock().await;

        let existing = self
            .read_index()?
            .ordered()
            .find(|d| d.matches(field, &value))
            .map(|d| d.id_str().to_string());
        if let Some(id) = existing {
            return Ok((id, false));
        }

        let staged = self.stage_put(doc, &mut writer)?;
        let (doc_type, id) = staged.key();
        let message = format!("put {}: {}", doc_type, id);
        self.apply(&mut writer, vec![staged], &message).await?;
        Ok((id, true))
    }

    /// Delete a document by id. Returns false if it does not exist.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut writer = self.writer.lock().await;
        let doc = self.read_index()?.docs.get(id).cloned();
        let Some(doc) = doc else {
            return Ok(false);
        };

        let message = format!("delete {}: {}", doc.doc_type, id);
        self.apply(&mut writer, vec![Staged::Delete { doc }], &message)
            .await?;
        Ok(true)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a document by id
    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read_index()?.docs.get(id).cloned())
    }

    /// All documents whose `field` equals `value`, in insertion order
    pub fn query_by_field(&self, field: &str, value: impl Into<Value>) -> Result<Vec<Document>> {
        let value = value.into();
        Ok(self.read_index()?.scan(field, &value))
    }

    /// Like [`Store::query_by_field`], together with the version it reflects
    pub fn snapshot_by_field(&self, field: &str, value: &Value) -> Result<(u64, Vec<Document>)> {
        let index = self.read_index()?;
        Ok((index.version, index.scan(field, value)))
    }

    /// Current store version, incremented by every committed write
    pub fn version(&self) -> Result<u64> {
        Ok(self.read_index()?.version)
    }

    /// Number of documents
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_index()?.docs.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of documents per type tag
    pub fn count_by_type(&self) -> Result<BTreeMap<String, usize>> {
        let index = self.read_index()?;
        let mut counts = BTreeMap::new();
        for doc in index.docs.values() {
            *counts.entry(doc.doc_type.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Summary of the most recent history commit, if history is enabled
    pub async fn last_commit_message(&self) -> Result<Option<String>> {
        let writer = self.writer.lock().await;
        match &writer.history {
            Some(repo) => Ok(Some(repo.head_message()?)),
            None => Ok(None),
        }
    }

    /// State of the git history, if history is enabled
    pub async fn history(&self) -> Result<Option<git::HistorySummary>> {
        let writer = self.writer.lock().await;
        match &writer.history {
            Some(repo) => Ok(Some(repo.summary()?)),
            None => Ok(None),
        }
    }

    /// Register a listener for change sets
    ///
    /// Change sets arrive in commit order. Listeners whose receiver has been
    /// dropped are pruned on the next write.
    pub fn changes(&self) -> mpsc::UnboundedReceiver<ChangeSet> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn read_index(&self) -> Result<RwLockReadGuard<'_, Index>> {
        self.index
            .read()
            .map_err(|_| Error::storage("document index lock poisoned"))
    }

    /// Validate a document and fill in its envelope
    fn stage_put(&self, mut doc: Document, writer: &mut Writer) -> Result<Staged> {
        validate_type_tag(&doc.doc_type)?;
        if let Some(field) = doc.reserved_field() {
            return Err(Error::ReservedField {
                field: field.to_string(),
            });
        }

        let previous = match &doc.id {
            Some(id) => {
                validate_document_id(id)?;
                self.read_index()?.docs.get(id).cloned()
            }
            None => None,
        };

        match &previous {
            Some(prev) => {
                if prev.doc_type != doc.doc_type {
                    return Err(Error::ImmutableType {
                        id: prev.id_str().to_string(),
                        existing: prev.doc_type.clone(),
                        attempted: doc.doc_type,
                    });
                }
                if self.append_only.contains(&prev.doc_type) {
                    return Err(Error::AppendOnly {
                        id: prev.id_str().to_string(),
                        doc_type: prev.doc_type.clone(),
                    });
                }
                doc.created_at = prev.created_at;
                doc.meta.seq = prev.meta.seq;
            }
            None => {
                if self.singleton.contains(&doc.doc_type) {
                    let existing = self
                        .read_index()?
                        .ordered()
                        .find(|d| d.doc_type == doc.doc_type)
                        .map(|d| d.id_str().to_string());
                    if let Some(existing) = existing {
                        return Err(Error::SingletonExists {
                            doc_type: doc.doc_type,
                            existing,
                        });
                    }
                }
                if doc.id.is_none() {
                    doc.id = Some(Uuid::new_v4().to_string());
                }
                doc.created_at = Some(now_millis());
                doc.meta.seq = writer.next_seq;
                writer.next_seq += 1;
            }
        }

        Ok(Staged::Put { doc, previous })
    }

    /// Persist staged writes, commit them, then publish them
    async fn apply(&self, writer: &mut Writer, staged: Vec<Staged>, message: &str) -> Result<()> {
        for (i, s) in staged.iter().enumerate() {
            if let Err(e) = self.write_staged(s).await {
                self.rollback(&staged[..i]).await;
                return Err(e);
            }
        }

        if let Some(repo) = &writer.history {
            if let Err(e) = repo.commit(message) {
                self.rollback(&staged).await;
                return Err(e);
            }
        }

        let set = {
            let mut index = self
                .index
                .write()
                .map_err(|_| Error::storage("document index lock poisoned"))?;
            index.version += 1;
            let version = index.version;
            let changes = staged
                .into_iter()
                .map(|s| match s {
                    Staged::Put { doc, .. } => {
                        index.insert(doc.clone());
                        Change {
                            kind: ChangeKind::Put,
                            doc_type: doc.doc_type.clone(),
                            id: doc.id_str().to_string(),
                            document: doc,
                        }
                    }
                    Staged::Delete { doc } => {
                        index.remove(doc.id_str());
                        Change {
                            kind: ChangeKind::Delete,
                            doc_type: doc.doc_type.clone(),
                            id: doc.id_str().to_string(),
                            document: doc,
                        }
                    }
                })
                .collect();
            ChangeSet { version, changes }
        };

        tracing::info!("{} (version {})", message, set.version);
        self.notify(set);
        Ok(())
    }

    async fn write_staged(&self, staged: &Staged) -> Result<()> {
        match staged {
            Staged::Put { doc, .. } => Collection::open(&doc.doc_type, &self.root).write(doc).await,
            Staged::Delete { doc } => Collection::open(&doc.doc_type, &self.root)
                .remove(doc.id_str())
                .await
                .map(|_| ()),
        }
    }

    /// Undo already-written staged writes, newest first
    async fn rollback(&self, written: &[Staged]) {
        for s in written.iter().rev() {
            let result = match s {
                Staged::Put {
                    previous: Some(prev),
                    ..
                } => Collection::open(&prev.doc_type, &self.root).write(prev).await,
                Staged::Put { doc, previous: None } => Collection::open(&doc.doc_type, &self.root)
                    .remove(doc.id_str())
                    .await
                    .map(|_| ()),
                Staged::Delete { doc } => Collection::open(&doc.doc_type, &self.root).write(doc).await,
            };
            if let Err(e) = result {
                let (doc_type, id) = s.key();
                tracing::error!("Rollback of {} '{}' failed: {}", doc_type, id, e);
            }
        }
        if !written.is_empty() {
            tracing::warn!("Rolled back {} write(s)", written.len());
        }
    }

    fn notify(&self, set: ChangeSet) {
        let mut listeners = match self.listeners.lock() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.retain(|tx| tx.send(set.clone()).is_ok());
    }
}

impl Staged {
    /// True if this write introduces a new document
    fn creates(&self) -> bool {
        matches!(self, Staged::Put { previous: None, .. })
    }

    fn key(&self) -> (String, String) {
        let doc = match self {
            Staged::Put { doc, .. } | Staged::Delete { doc } => doc,
        };
        (doc.doc_type.clone(), doc.id_str().to_string())
    }
}

/// Load every collection under the root into a fresh index
fn load_index(root: &Path) -> Result<(Index, u64)> {
    let collections = root.join("collections");
    let mut docs = Vec::new();

    let entries = std::fs::read_dir(&collections).map_err(|source| Error::FileReadError {
        path: collections.clone(),
        source,
    })?;
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if validate_type_tag(&name).is_err() {
            tracing::warn!("Ignoring directory with invalid type tag: {}", name);
            continue;
        }
        docs.extend(
            Collection::open(&name, root)
                .list()?
                .into_iter()
                .filter(|doc| doc.doc_type == name),
        );
    }

    // Files without `_seq` were written by hand and go after everything
    // the store sequenced itself.
    let (mut sequenced, mut unsequenced): (Vec<_>, Vec<_>) =
        docs.into_iter().partition(|doc| doc.meta.seq > 0);
    sequenced.sort_by(|a, b| {
        (a.meta.seq, a.created_at, a.id.as_deref()).cmp(&(b.meta.seq, b.created_at, b.id.as_deref()))
    });
    unsequenced.sort_by(|a, b| (a.created_at, a.id.as_deref()).cmp(&(b.created_at, b.id.as_deref())));

    // Hand-edited files may repeat a sequence; keep their order but make seqs unique.
    let mut index = Index::default();
    let mut next_seq = 1;
    for mut doc in sequenced.into_iter().chain(unsequenced) {
        doc.meta.seq = doc.meta.seq.max(next_seq);
        next_seq = doc.meta.seq + 1;
        index.insert(doc);
    }

    Ok((index, next_seq))
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
