//! Git history for sitedb
//!
//! Every committed store write becomes one local git commit, so the store
//! directory carries a full, inspectable history of its documents. Pushing
//! to or pulling from a remote is not done here.

use git2::{IndexAddOption, Repository as Git2Repo, Signature};
use std::path::Path;

use crate::error::Result;

/// Snapshot of the history for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySummary {
    /// HEAD commit hash
    pub head: String,
    /// Summary line of the HEAD commit
    pub message: String,
    /// Commits reachable from HEAD
    pub commits: usize,
    /// Files differing from HEAD, e.g. hand edits
    pub uncommitted: bool,
}

/// Git repository wrapper for the store directory
pub struct Repository {
    inner: Git2Repo,
}

impl Repository {
    /// Open an existing repository or initialize a new one
    pub fn open_or_init(path: &Path) -> Result<Self> {
        let inner = match Git2Repo::open(path) {
            Ok(repo) => repo,
            Err(_) => {
                let repo = Git2Repo::init(path)?;
                Self::create_initial_commit(&repo)?;
                tracing::info!("Initialized document history at {:?}", path);
                repo
            }
        };

        Ok(Self { inner })
    }

    /// Create the initial commit for a new repository
    fn create_initial_commit(repo: &Git2Repo) -> Result<()> {
        let sig = Signature::now("sitedb", "sitedb@local")?;
        let tree_id = repo.index()?.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        repo.commit(Some("HEAD"), &sig, &sig, "Initialize sitedb store", &tree, &[])?;

        Ok(())
    }

    /// Stage every change under the working tree, including removals, and commit
    pub fn commit(&self, message: &str) -> Result<git2::Oid> {
        let sig = self.signature()?;
        let mut index = self.inner.index()?;

        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.inner.find_tree(tree_id)?;

        let head = self.inner.head()?;
        let parent = head.peel_to_commit()?;

        let oid = self
            .inner
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;

        tracing::debug!("Committed {}: {}", oid, message);
        Ok(oid)
    }

    /// Get the current HEAD commit hash
    fn head_hash(&self) -> Result<String> {
        let head = self.inner.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Summary line of the HEAD commit
    pub fn head_message(&self) -> Result<String> {
        let commit = self.inner.head()?.peel_to_commit()?;
        Ok(commit.summary().unwrap_or_default().to_string())
    }

    /// Number of commits reachable from HEAD
    fn commit_count(&self) -> Result<usize> {
        let mut walk = self.inner.revwalk()?;
        walk.push_head()?;
        Ok(walk.count())
    }

    /// Check if there are uncommitted changes
    fn has_changes(&self) -> Result<bool> {
        let statuses = self.inner.statuses(None)?;
        Ok(!statuses.is_empty())
    }

    pub fn summary(&self) -> Result<HistorySummary> {
        Ok(HistorySummary {
            head: self.head_hash()?,
            message: self.head_message()?,
            commits: self.commit_count()?,
            uncommitted: self.has_changes()?,
        })
    }

    /// Get a signature for commits
    fn signature(&self) -> Result<Signature<'_>> {
        // Try to get from git config, fall back to defaults
        self.inner
            .signature()
            .or_else(|_| Signature::now("sitedb", "sitedb@local"))
            .map_err(Into::into)
    }
}
