//! # tagtable-rs - Tag-Based File Index
//!
//! `tagtable-rs` maps string tags to sets of indexed files and answers
//! boolean queries over them:
//!
//! - **Tag table** hashing tag names to buckets, with reusable numeric tag ids
//! - **Three set backends**: unsorted array, sorted array and treap
//! - **Boolean queries** combining tags with `&`/`/` (intersection) and
//!   `|`/`+` (union), evaluated strictly left to right
//! - **Persistence** to a flat binary record
//!
//! ## Quick Start
//!
//! ```rust
//! use tagtable_rs::{Result, TagIndex};
//!
//! # fn main() -> Result<()> {
//! let index = TagIndex::new()?;
//!
//! index.insert_tag("letter", 100, "a.txt")?;
//! index.insert_tag("first", 100, "a.txt")?;
//! index.insert_tag("number", 201, "1.txt")?;
//! index.insert_tag("first", 201, "1.txt")?;
//!
//! let hits = index.query_ids("first & number")?;
//! assert_eq!(hits, vec![201]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use tagtable_rs::{Backend, Result, TagIndexBuilder};
//!
//! # fn main() -> Result<()> {
//! let index = TagIndexBuilder::new()
//!     .backend(Backend::Sorted)
//!     .hash_bits(12)
//!     .expr_cache_size(256)
//!     .open("tags.idx")?;
//!
//! index.insert_tag("draft", 7, "notes.md")?;
//! index.save("tags.idx")?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;

pub use crate::core::{
    codec,
    config::IndexConfig,
    element::{Backend, Element, EntrySet},
    entry::{Entry, EntryRef, FileId},
    expr::{Expr, ExprCache, OpKind},
    table::{TagId, TagTable, MAX_TAG_LEN},
};
pub use crate::error::{Result, TagError};

use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Thread-safe tag index
///
/// Wraps a [`TagTable`] behind a reader/writer lock. Mutations hold the
/// write lock for their whole duration, so readers see a tag either absent
/// or fully created. Queries parse outside the lock and evaluate under a
/// read lock; concurrent queries do not block each other.
///
/// The index also keeps an optional query context: a current working
/// expression that can be re-evaluated as the tags change.
///
/// # Examples
///
/// ```rust
/// use tagtable_rs::{TagError, TagIndex};
///
/// # fn main() -> tagtable_rs::Result<()> {
/// let index = TagIndex::new()?;
/// index.insert_tag("a", 1, "one")?;
/// index.insert_tag("b", 2, "two")?;
///
/// assert_eq!(index.query_ids("a | b")?, vec![1, 2]);
/// assert!(index.query_ids("a & b")?.is_empty());
/// assert!(matches!(index.query("zzz"), Err(TagError::TagNotFound(_))));
/// # Ok(())
/// # }
/// ```
pub struct TagIndex {
    table: RwLock<TagTable>,
    cache: Mutex<ExprCache>,
    context: RwLock<Option<Arc<Expr>>>,
    config: IndexConfig,
}

impl TagIndex {
    /// Create an empty index with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(IndexConfig::default())
    }

    /// Create an empty index
    pub fn with_config(config: IndexConfig) -> Result<Self> {
        let table = TagTable::with_config(&config)?;
        debug!(
            "Created tag index ({} backend, {} buckets)",
            config.backend,
            config.bucket_count()
        );
        Ok(Self::from_table(table, config))
    }

    /// Load an index saved with [`save`](Self::save)
    pub fn open<P: AsRef<Path>>(path: P, config: IndexConfig) -> Result<Self> {
        let table = codec::load_from_path(path, &config)?;
        Ok(Self::from_table(table, config))
    }

    fn from_table(table: TagTable, config: IndexConfig) -> Self {
        TagIndex {
            table: RwLock::new(table),
            cache: Mutex::new(ExprCache::new(config.expr_cache_size)),
            context: RwLock::new(None),
            config,
        }
    }

    pub fn builder() -> TagIndexBuilder {
        TagIndexBuilder::new()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Tag a file
    ///
    /// `name` is kept only when this is the file's first tag.
    pub fn insert_tag(&self, tag: &str, file_id: FileId, name: &str) -> Result<()> {
        self.table.write().insert_tag(tag, file_id, name)
    }

    /// Untag a file; no-op if it does not carry the tag
    pub fn remove_tag(&self, tag: &str, file_id: FileId) -> Result<()> {
        self.table.write().remove_tag(tag, file_id)
    }

    pub fn rename_tag(&self, old: &str, new: &str) -> Result<()> {
        self.table.write().rename_tag(old, new)
    }

    /// Untag a file everywhere; returns how many tags it lost
    pub fn remove_file(&self, file_id: FileId) -> Result<usize> {
        self.table.write().remove_file(file_id)
    }

    fn parse(&self, expression: &str) -> Result<Arc<Expr>> {
        self.cache.lock().get_or_parse(expression)
    }

    fn run(&self, expr: &Expr) -> Result<Vec<Entry>> {
        let table = self.table.read();
        let result = table.query_expr(expr)?;
        Ok(table.resolve(&result))
    }

    /// Evaluate a boolean tag expression
    ///
    /// Returns the matching entries sorted by file id. A malformed expression
    /// fails with `Parse`, an expression naming no existing tag with
    /// `TagNotFound`; a valid expression matching nothing returns an empty
    /// list.
    pub fn query(&self, expression: &str) -> Result<Vec<Entry>> {
        let expr = self.parse(expression)?;
        self.run(&expr)
    }

    /// Like [`query`](Self::query), returning only file ids
    pub fn query_ids(&self, expression: &str) -> Result<Vec<FileId>> {
        Ok(self.query(expression)?.into_iter().map(|e| e.id).collect())
    }

    pub fn tag_name(&self, id: TagId) -> Option<String> {
        self.table.read().tag_name(id).map(str::to_string)
    }

    pub fn tag_id(&self, tag: &str) -> Option<TagId> {
        self.table.read().tag_id(tag)
    }

    /// All tags as `(id, name)` in id order
    pub fn tags(&self) -> Vec<(TagId, String)> {
        self.table
            .read()
            .tags()
            .map(|(id, name)| (id, name.to_string()))
            .collect()
    }

    /// Tags carried by a file, in tag id order
    pub fn tags_of(&self, file_id: FileId) -> Vec<String> {
        self.table
            .read()
            .tags_of(file_id)
            .into_iter()
            .map(|(_, name)| name.to_string())
            .collect()
    }

    pub fn entry(&self, file_id: FileId) -> Option<Entry> {
        self.table.read().entry(file_id).cloned()
    }

    pub fn num_tags(&self) -> usize {
        self.table.read().num_tags()
    }

    pub fn num_entries(&self) -> usize {
        self.table.read().num_entries()
    }

    /// Set the current working expression
    ///
    /// The expression must parse; its tags need not exist yet.
    pub fn set_context(&self, expression: &str) -> Result<()> {
        let expr = self.parse(expression)?;
        debug!("Query context set to {}", expr);
        *self.context.write() = Some(expr);
        Ok(())
    }

    /// Current working expression in canonical form
    pub fn context(&self) -> Option<String> {
        self.context.read().as_ref().map(|e| e.to_string())
    }

    pub fn clear_context(&self) {
        *self.context.write() = None;
    }

    /// Evaluate the current working expression
    ///
    /// Fails with `InvalidArgument` when no context is set.
    pub fn context_results(&self) -> Result<Vec<Entry>> {
        let expr = self
            .context
            .read()
            .clone()
            .ok_or_else(|| TagError::InvalidArgument("no query context set".to_string()))?;
        self.run(&expr)
    }

    /// Persist the index to `path` (blocking)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        codec::save_to_path(&self.table.read(), path)
    }

    /// Replace the index contents with the record at `path` (blocking)
    ///
    /// On failure the current contents are kept.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let table = codec::load_from_path(path, &self.config)?;
        *self.table.write() = table;
        self.cache.lock().clear();
        Ok(())
    }

    /// Drop every tag and entry
    pub fn clear(&self) -> Result<()> {
        self.table.write().clear()?;
        info!("Cleared tag index");
        Ok(())
    }

    /// Run `f` with shared access to the underlying table
    pub fn with_table<R>(&self, f: impl FnOnce(&TagTable) -> R) -> R {
        let table = self.table.read();
        f(&*table)
    }
}

/// Builder for [`TagIndex`]
///
/// # Examples
///
/// ```rust
/// use tagtable_rs::{Backend, TagIndexBuilder};
///
/// # fn main() -> tagtable_rs::Result<()> {
/// let index = TagIndexBuilder::new()
///     .backend(Backend::Unsorted)
///     .hash_bits(4)
///     .build()?;
/// assert_eq!(index.config().backend, Backend::Unsorted);
/// # Ok(())
/// # }
/// ```
pub struct TagIndexBuilder {
    config: IndexConfig,
}

impl TagIndexBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        TagIndexBuilder {
            config: IndexConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the backend used by every tag bucket
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the bucket count to `2^bits`
    pub fn hash_bits(mut self, bits: u32) -> Self {
        self.config.hash_bits = bits;
        self
    }

    /// Set the initial tag id capacity
    pub fn initial_tag_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_tag_capacity = capacity;
        self
    }

    /// Set the parsed-expression cache size (0 disables it)
    pub fn expr_cache_size(mut self, size: usize) -> Self {
        self.config.expr_cache_size = size;
        self
    }

    /// Build an empty index
    pub fn build(self) -> Result<TagIndex> {
        info!(
            "Building tag index: backend={}, hash_bits={}",
            self.config.backend, self.config.hash_bits
        );
        TagIndex::with_config(self.config)
    }

    /// Load `path` if it exists, otherwise build an empty index
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<TagIndex> {
        let path = path.as_ref();
        if path.exists() {
            TagIndex::open(path, self.config)
        } else {
            debug!("{} does not exist, starting empty", path.display());
            self.build()
        }
    }
}

impl Default for TagIndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_query() -> Result<()> {
        let index = TagIndex::new()?;
        index.insert_tag("a", 1, "one")?;
        index.insert_tag("a", 2, "two")?;
        index.insert_tag("b", 2, "two")?;

        let entries = index.query("a & b")?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "two");
        assert_eq!(entries[0].refcount, 2);
        Ok(())
    }

    #[test]
    fn test_builder() -> Result<()> {
        let index = TagIndexBuilder::new()
            .backend(Backend::Sorted)
            .hash_bits(3)
            .initial_tag_capacity(1)
            .expr_cache_size(0)
            .build()?;
        assert_eq!(index.config().backend, Backend::Sorted);
        index.with_table(|t| assert_eq!(t.hash_bits(), 3));

        for i in 0..10 {
            index.insert_tag(&format!("t{}", i), i, "f")?;
        }
        assert_eq!(index.num_tags(), 10);
        Ok(())
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        assert!(matches!(
            TagIndexBuilder::new().hash_bits(0).build(),
            Err(TagError::Config(_))
        ));
    }

    #[test]
    fn test_context() -> Result<()> {
        let index = TagIndex::new()?;
        assert!(matches!(
            index.context_results(),
            Err(TagError::InvalidArgument(_))
        ));

        index.set_context("a | b")?;
        assert_eq!(index.context().as_deref(), Some("(a | b)"));
        assert!(matches!(
            index.context_results(),
            Err(TagError::TagNotFound(_))
        ));

        index.insert_tag("b", 9, "nine")?;
        let ids: Vec<FileId> = index.context_results()?.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![9]);

        assert!(index.set_context("a |").is_err());
        assert_eq!(index.context().as_deref(), Some("(a | b)"));

        index.clear_context();
        assert!(index.context().is_none());
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("index.tags");

        let index = TagIndex::new()?;
        index.insert_tag("keep", 1, "one")?;
        index.save(&path)?;

        index.insert_tag("later", 2, "two")?;
        index.query_ids("keep | later")?;
        assert_eq!(index.cache.lock().len(), 1);
        index.load(&path)?;
        assert!(index.cache.lock().is_empty());
        assert_eq!(index.tags(), vec![(0, "keep".to_string())]);
        assert!(index.entry(2).is_none());

        let reopened = TagIndexBuilder::new().open(&path)?;
        assert_eq!(reopened.query_ids("keep")?, vec![1]);
        Ok(())
    }

    #[test]
    fn test_failed_load_keeps_contents() -> Result<()> {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage");
        std::fs::write(&path, b"not an index").unwrap();

        let index = TagIndex::new()?;
        index.insert_tag("a", 1, "one")?;
        assert!(matches!(index.load(&path), Err(TagError::CorruptData(_))));
        assert_eq!(index.query_ids("a")?, vec![1]);
        Ok(())
    }

    #[test]
    fn test_tags_of_and_remove_file() -> Result<()> {
        let index = TagIndex::new()?;
        index.insert_tag("x", 5, "five")?;
        index.insert_tag("y", 5, "five")?;
        assert_eq!(index.tags_of(5), vec!["x", "y"]);

        assert_eq!(index.remove_file(5)?, 2);
        assert_eq!(index.num_tags(), 0);
        assert_eq!(index.num_entries(), 0);
        Ok(())
    }
}
