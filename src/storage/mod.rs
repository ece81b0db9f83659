//! Storage layer for sitedb
//!
//! Documents are markdown files with YAML frontmatter, one directory per
//! type tag. [`store::Store`] owns the files and the in-memory index.

pub mod collection;
pub mod document;
pub mod frontmatter;
pub mod store;
