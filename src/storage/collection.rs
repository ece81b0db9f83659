//! Collection - the documents of one type, stored in a directory
//!
//! Directory structure:
//! ```text
//! /collections/
//!   /business-info/
//!     6f1c....md
//!   /testimonial/
//!     0b4f....md
//!     93aa....md
//! ```
//!
//! Each write goes to a temporary file first and is renamed into place, so
//! a reader never sees a half-written document.

use super::document::Document;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// A collection of documents sharing one type tag
#[derive(Debug)]
pub struct Collection {
    /// Type tag (directory name)
    pub name: String,
    /// Path to the collection directory
    pub path: PathBuf,
}

impl Collection {
    /// Open a collection at the given path
    pub fn open(name: impl Into<String>, base_path: &Path) -> Self {
        let name = name.into();
        let path = base_path.join("collections").join(&name);
        Self { name, path }
    }

    /// Create the collection directory if it doesn't exist
    pub async fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.path)
            .await
            .map_err(|source| Error::FileWriteError {
                path: self.path.clone(),
                source,
            })
    }

    /// Path of the file holding the given document
    pub fn document_path(&self, id: &str) -> PathBuf {
        self.path.join(format!("{}.md", id))
    }

    /// List all documents in the collection, in directory order
    ///
    /// Files that fail to parse are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        if !self.path.exists() {
            return Ok(documents);
        }

        for entry in WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().map(|e| e == "md").unwrap_or(false) {
                match self.read_document(path) {
                    Ok(doc) => documents.push(doc),
                    Err(e) => tracing::warn!("Skipping unreadable document {:?}: {}", path, e),
                }
            }
        }

        Ok(documents)
    }

    /// Write a document, replacing any previous version
    pub async fn write(&self, doc: &Document) -> Result<()> {
        self.ensure_exists().await?;
        let path = self.document_path(doc.id_str());
        let tmp_path = self.path.join(format!(".{}.md.tmp", doc.id_str()));

        let content = doc.render()?;
        fs::write(&tmp_path, content)
            .await
            .map_err(|source| Error::FileWriteError {
                path: tmp_path.clone(),
                source,
            })?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| Error::FileWriteError { path, source })
    }

    /// Delete a document by ID
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let path = self.document_path(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .await
            .map_err(|source| Error::FileWriteError { path, source })?;
        Ok(true)
    }

    /// Read a document from a path
    fn read_document(&self, path: &Path) -> Result<Document> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = Document::parse(&content)?;

        let stem = path.file_stem().and_then(|s| s.to_str());
        if stem != doc.id.as_deref() {
            return Err(Error::storage(format!(
                "file name {:?} does not match document id '{}'",
                path,
                doc.id_str()
            )));
        }

        Ok(doc)
    }
}
