//! Tag table
//!
//! A fixed array of `2^hash_bits` hash chains maps tag strings to buckets.
//! Each bucket holds the tag's name, its numeric id and the [`Element`] of
//! files carrying the tag. A [`TagLookup`] maps ids back to names.
//!
//! Entries are shared between buckets through the table's [`EntryArena`]:
//! every bucket insert retains the entry, every bucket removal releases it,
//! and the entry is destroyed with its last tag.
//!
//! The bucket array is never rehashed. Long chains are the price of an
//! undersized `hash_bits`.

pub mod hash;
pub mod lookup;

use crate::core::config::IndexConfig;
use crate::core::element::{Backend, Element};
use crate::core::entry::{Entry, EntryArena, FileId};
use crate::core::expr::{self, Expr};
use crate::error::{Result, TagError};
use tracing::debug;

pub use hash::hash_tag;
pub use lookup::{Assigned, TagId, TagLookup};

/// Maximum tag length in bytes
pub const MAX_TAG_LEN: usize = 255;

/// Validate a tag string: 1..=255 bytes, no NUL
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(TagError::InvalidArgument("tag cannot be empty".to_string()));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(TagError::InvalidArgument(format!(
            "tag too long ({} bytes, max {})",
            tag.len(),
            MAX_TAG_LEN
        )));
    }
    if tag.contains('\0') {
        return Err(TagError::InvalidArgument(
            "tag cannot contain NUL".to_string(),
        ));
    }
    Ok(())
}

/// One tag's chain node
#[derive(Debug, Clone)]
pub struct TagBucket {
    name: String,
    id: TagId,
    element: Element,
}

impl TagBucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> TagId {
        self.id
    }

    pub fn element(&self) -> &Element {
        &self.element
    }
}

/// Hash-indexed map from tag strings to entry sets
#[derive(Debug)]
pub struct TagTable {
    buckets: Vec<Vec<TagBucket>>,
    lookup: TagLookup,
    arena: EntryArena,
    num_tags: usize,
    hash_bits: u32,
    backend: Backend,
}

impl TagTable {
    /// Create a table with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(&IndexConfig::default())
    }

    pub fn with_config(config: &IndexConfig) -> Result<Self> {
        config.validate()?;
        let count = config.bucket_count();
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(count)?;
        buckets.resize_with(count, Vec::new);

        Ok(TagTable {
            buckets,
            lookup: TagLookup::with_capacity(config.initial_tag_capacity)?,
            arena: EntryArena::new(),
            num_tags: 0,
            hash_bits: config.hash_bits,
            backend: config.backend,
        })
    }

    /// Reassemble a table from decoded parts
    ///
    /// `buckets` holds `(tag id, element)` pairs; names come from `lookup`.
    /// The caller has already retained every bucket's entries in `arena`.
    pub(crate) fn from_parts(
        config: &IndexConfig,
        lookup: TagLookup,
        arena: EntryArena,
        buckets: Vec<(TagId, Element)>,
    ) -> Result<Self> {
        let mut table = TagTable::with_config(config)?;
        table.lookup = lookup;
        table.arena = arena;

        for (id, element) in buckets {
            let name = table
                .lookup
                .name(id)
                .ok_or_else(|| TagError::corrupt(format!("tag id {} has no name", id)))?
                .to_string();
            let idx = table.bucket_index(&name);
            if table.buckets[idx].iter().any(|b| b.name == name) {
                return Err(TagError::corrupt(format!("duplicate tag name '{}'", name)));
            }
            table.buckets[idx].try_reserve(1)?;
            table.buckets[idx].push(TagBucket { name, id, element });
            table.num_tags += 1;
        }
        Ok(table)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn hash_bits(&self) -> u32 {
        self.hash_bits
    }

    /// Number of live tags
    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Number of files carrying at least one tag
    pub fn num_entries(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn arena(&self) -> &EntryArena {
        &self.arena
    }

    pub(crate) fn lookup_table(&self) -> &TagLookup {
        &self.lookup
    }

    fn bucket_index(&self, tag: &str) -> usize {
        hash_tag(tag, self.hash_bits)
    }

    fn locate(&self, tag: &str) -> Option<(usize, usize)> {
        let idx = self.bucket_index(tag);
        self.buckets[idx]
            .iter()
            .position(|b| b.name == tag)
            .map(|pos| (idx, pos))
    }

    fn bucket(&self, tag: &str) -> Option<&TagBucket> {
        self.locate(tag)
            .map(|(idx, pos)| &self.buckets[idx][pos])
    }

    /// Tag `file_id` with `tag`, creating the tag on first use
    ///
    /// `name` is recorded only when this is the file's first tag. Fails with
    /// `Duplicate` if the file already carries the tag. On any failure the
    /// table is left exactly as it was.
    pub fn insert_tag(&mut self, tag: &str, file_id: FileId, name: &str) -> Result<()> {
        validate_tag(tag)?;

        let (idx, pos, created) = match self.locate(tag) {
            Some((idx, pos)) => (idx, pos, None),
            None => {
                let idx = self.bucket_index(tag);
                self.buckets[idx].try_reserve(1)?;
                let assigned = self.lookup.assign(tag)?;
                self.buckets[idx].push(TagBucket {
                    name: tag.to_string(),
                    id: assigned.id,
                    element: Element::new(self.backend),
                });
                (idx, self.buckets[idx].len() - 1, Some(assigned))
            }
        };

        let interned = self.arena.intern(file_id, name);
        let result = match interned {
            Ok(entry) => match self.buckets[idx][pos].element.insert(entry) {
                Ok(()) => {
                    self.arena.retain(entry);
                    Ok(())
                }
                Err(e) => {
                    self.arena.discard_unreferenced(entry);
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        match (result, created) {
            (Ok(()), Some(assigned)) => {
                self.num_tags += 1;
                debug!("Created tag '{}' with id {}", tag, assigned.id);
                Ok(())
            }
            (Ok(()), None) => Ok(()),
            (Err(e), Some(assigned)) => {
                self.buckets[idx].pop();
                self.lookup.unassign(assigned);
                Err(e)
            }
            (Err(e), None) => Err(e),
        }
    }

    /// Remove `file_id` from `tag`; no-op if either is absent
    ///
    /// A tag whose set becomes empty is deleted and its id freed for reuse.
    pub fn remove_tag(&mut self, tag: &str, file_id: FileId) -> Result<()> {
        validate_tag(tag)?;
        let (idx, pos) = match self.locate(tag) {
            Some(found) => found,
            None => return Ok(()),
        };

        let bucket = &mut self.buckets[idx][pos];
        if let Some(entry) = bucket.element.remove(file_id)? {
            self.arena.release(entry);
        }

        if bucket.element.is_empty() {
            let removed = self.buckets[idx].remove(pos);
            self.lookup.release(removed.id);
            self.num_tags -= 1;
            debug!("Removed tag '{}' (id {} freed)", removed.name, removed.id);
        }
        Ok(())
    }

    /// Rename a tag in place; its id and members are preserved
    pub fn rename_tag(&mut self, old: &str, new: &str) -> Result<()> {
        validate_tag(old)?;
        validate_tag(new)?;

        let (idx, pos) = self
            .locate(old)
            .ok_or_else(|| TagError::TagNotFound(old.to_string()))?;
        if old == new {
            return Ok(());
        }
        if self.locate(new).is_some() {
            return Err(TagError::AlreadyExists(new.to_string()));
        }

        let new_idx = self.bucket_index(new);
        self.buckets[new_idx].try_reserve(1)?;
        let mut bucket = self.buckets[idx].remove(pos);
        bucket.name = new.to_string();
        self.lookup.rename(bucket.id, new.to_string());
        debug!("Renamed tag '{}' -> '{}' (id {})", old, new, bucket.id);
        self.buckets[new_idx].push(bucket);
        Ok(())
    }

    /// Live set for `tag`
    ///
    /// This is the bucket itself, not a copy.
    pub fn lookup(&self, tag: &str) -> Option<&Element> {
        self.bucket(tag).map(|b| &b.element)
    }

    pub fn tag_name(&self, id: TagId) -> Option<&str> {
        self.lookup.name(id)
    }

    pub fn tag_id(&self, tag: &str) -> Option<TagId> {
        self.bucket(tag).map(|b| b.id)
    }

    /// Live tags as `(id, name)` in id order
    pub fn tags(&self) -> impl Iterator<Item = (TagId, &str)> {
        self.lookup.iter()
    }

    /// Shared entry for a file
    pub fn entry(&self, file_id: FileId) -> Option<&Entry> {
        self.arena.find(file_id)
    }

    /// Tags carried by a file, in tag id order
    pub fn tags_of(&self, file_id: FileId) -> Vec<(TagId, &str)> {
        if self.arena.lookup(file_id).is_none() {
            return Vec::new();
        }
        self.tags()
            .filter(|(_, name)| {
                self.lookup(name)
                    .map_or(false, |element| element.contains(file_id))
            })
            .collect()
    }

    /// Untag a file everywhere; returns how many tags it lost
    pub fn remove_file(&mut self, file_id: FileId) -> Result<usize> {
        let tags: Vec<String> = self
            .tags_of(file_id)
            .into_iter()
            .map(|(_, name)| name.to_string())
            .collect();
        for tag in &tags {
            self.remove_tag(tag, file_id)?;
        }
        if !tags.is_empty() {
            debug!("Removed file {} from {} tags", file_id, tags.len());
        }
        Ok(tags.len())
    }

    /// Entries of a set, sorted by file id
    ///
    /// Handles that no longer resolve (the file lost its last tag since the
    /// set was built) are skipped.
    pub fn resolve(&self, element: &Element) -> Vec<Entry> {
        let mut entries: Vec<Entry> = element
            .to_vec()
            .into_iter()
            .filter_map(|r| self.arena.get(r).cloned())
            .collect();
        entries.sort_unstable_by_key(|e| e.id);
        entries
    }

    /// Parse and evaluate `expression`, returning an owned read-only set
    pub fn query(&self, expression: &str) -> Result<Element> {
        let parsed = Expr::parse(expression)?;
        self.query_expr(&parsed)
    }

    pub fn query_expr(&self, expression: &Expr) -> Result<Element> {
        expr::eval::evaluate_owned(expression, self)
    }

    /// Drop every tag and entry
    pub fn clear(&mut self) -> Result<()> {
        let capacity = self.lookup.capacity();
        self.lookup = TagLookup::with_capacity(capacity)?;
        for chain in &mut self.buckets {
            chain.clear();
        }
        self.arena.clear();
        self.num_tags = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(backend: Backend) -> TagTable {
        TagTable::with_config(&IndexConfig {
            backend,
            hash_bits: 4,
            ..IndexConfig::default()
        })
        .unwrap()
    }

    fn occupied_buckets(t: &TagTable) -> usize {
        t.buckets.iter().map(Vec::len).sum()
    }

    #[test]
    fn test_insert_and_lookup() {
        for backend in Backend::ALL {
            let mut t = table(backend);
            t.insert_tag("letter", 100, "a.txt").unwrap();
            t.insert_tag("letter", 101, "b.txt").unwrap();

            assert_eq!(t.lookup("letter").unwrap().ids(), vec![100, 101]);
            assert_eq!(t.tag_id("letter"), Some(0));
            assert_eq!(t.tag_name(0), Some("letter"));
            assert_eq!(t.num_tags(), 1);
            assert!(t.lookup("number").is_none());
        }
    }

    #[test]
    fn test_duplicate_insert_leaves_table_unchanged() {
        let mut t = table(Backend::Sorted);
        t.insert_tag("a", 1, "one").unwrap();
        assert!(matches!(
            t.insert_tag("a", 1, "one"),
            Err(TagError::Duplicate(1))
        ));
        assert_eq!(t.entry(1).unwrap().refcount, 1);
        assert_eq!(t.num_tags(), 1);
    }

    #[test]
    fn test_failed_create_rolls_back() {
        let mut t = table(Backend::Treap);
        let long_name = "n".repeat(300);
        assert!(t.insert_tag("fresh", 1, &long_name).is_err());
        assert_eq!(t.num_tags(), 0);
        assert!(t.lookup("fresh").is_none());
        assert_eq!(occupied_buckets(&t), 0);

        // the id that would have been used is still the next one handed out
        t.insert_tag("fresh", 1, "ok").unwrap();
        assert_eq!(t.tag_id("fresh"), Some(0));
    }

    #[test]
    fn test_invalid_tags_rejected() {
        let mut t = table(Backend::Unsorted);
        for bad in ["", "nul\0tag"] {
            assert!(matches!(
                t.insert_tag(bad, 1, "x"),
                Err(TagError::InvalidArgument(_))
            ));
        }
        let long = "t".repeat(MAX_TAG_LEN + 1);
        assert!(t.insert_tag(&long, 1, "x").is_err());
        assert!(t.insert_tag(&"t".repeat(MAX_TAG_LEN), 1, "x").is_ok());
    }

    #[test]
    fn test_refcount_tracks_buckets() {
        let mut t = table(Backend::Treap);
        for tag in ["a", "b", "c"] {
            t.insert_tag(tag, 7, "seven").unwrap();
        }
        assert_eq!(t.entry(7).unwrap().refcount, 3);

        t.remove_tag("a", 7).unwrap();
        t.remove_tag("b", 7).unwrap();
        assert_eq!(t.entry(7).unwrap().refcount, 1);

        t.remove_tag("c", 7).unwrap();
        assert!(t.entry(7).is_none());
        assert_eq!(t.num_entries(), 0);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut t = table(Backend::Sorted);
        t.insert_tag("a", 1, "one").unwrap();
        t.remove_tag("missing", 1).unwrap();
        t.remove_tag("a", 99).unwrap();
        assert_eq!(t.lookup("a").unwrap().ids(), vec![1]);
    }

    #[test]
    fn test_empty_tag_deleted_and_id_reused() {
        let mut t = table(Backend::Unsorted);
        t.insert_tag("a", 1, "one").unwrap();
        t.insert_tag("b", 1, "one").unwrap();
        t.insert_tag("c", 1, "one").unwrap();

        t.remove_tag("b", 1).unwrap();
        assert!(t.lookup("b").is_none());
        assert_eq!(t.tag_name(1), None);
        assert_eq!(t.num_tags(), 2);

        t.insert_tag("d", 2, "two").unwrap();
        assert_eq!(t.tag_id("d"), Some(1));
    }

    #[test]
    fn test_num_tags_matches_buckets_and_slots() {
        let mut t = table(Backend::Treap);
        for i in 0..40u64 {
            t.insert_tag(&format!("tag{}", i % 13), i, "f").unwrap();
        }
        for i in (0..40u64).step_by(2) {
            t.remove_tag(&format!("tag{}", i % 13), i).unwrap();
        }
        assert_eq!(t.num_tags(), occupied_buckets(&t));
        assert_eq!(t.num_tags(), t.tags().count());
    }

    #[test]
    fn test_rename_preserves_id_and_members() {
        let mut t = table(Backend::Sorted);
        t.insert_tag("old", 1, "one").unwrap();
        t.insert_tag("old", 2, "two").unwrap();
        let id = t.tag_id("old").unwrap();

        t.rename_tag("old", "new").unwrap();
        assert!(t.lookup("old").is_none());
        assert_eq!(t.tag_id("new"), Some(id));
        assert_eq!(t.tag_name(id), Some("new"));
        assert_eq!(t.lookup("new").unwrap().ids(), vec![1, 2]);
        assert_eq!(t.num_tags(), 1);
    }

    #[test]
    fn test_rename_errors() {
        let mut t = table(Backend::Treap);
        t.insert_tag("a", 1, "one").unwrap();
        t.insert_tag("b", 2, "two").unwrap();

        assert!(matches!(
            t.rename_tag("a", "b"),
            Err(TagError::AlreadyExists(_))
        ));
        assert!(matches!(
            t.rename_tag("zzz", "c"),
            Err(TagError::TagNotFound(_))
        ));
        t.rename_tag("a", "a").unwrap();
        assert_eq!(t.lookup("a").unwrap().ids(), vec![1]);
    }

    #[test]
    fn test_tags_of_and_remove_file() {
        let mut t = table(Backend::Treap);
        t.insert_tag("letter", 100, "a").unwrap();
        t.insert_tag("first", 100, "a").unwrap();
        t.insert_tag("letter", 101, "b").unwrap();

        let tags: Vec<&str> = t.tags_of(100).into_iter().map(|(_, n)| n).collect();
        assert_eq!(tags, vec!["letter", "first"]);

        assert_eq!(t.remove_file(100).unwrap(), 2);
        assert!(t.entry(100).is_none());
        assert!(t.lookup("first").is_none());
        assert_eq!(t.lookup("letter").unwrap().ids(), vec![101]);
        assert_eq!(t.remove_file(100).unwrap(), 0);
    }

    #[test]
    fn test_first_name_wins() {
        let mut t = table(Backend::Sorted);
        t.insert_tag("a", 5, "original.txt").unwrap();
        t.insert_tag("b", 5, "ignored.txt").unwrap();
        assert_eq!(t.entry(5).unwrap().name, "original.txt");
    }

    #[test]
    fn test_resolve_sorted_entries() {
        let mut t = table(Backend::Unsorted);
        for id in [30, 10, 20] {
            t.insert_tag("x", id, &format!("f{}", id)).unwrap();
        }
        let entries = t.resolve(t.lookup("x").unwrap());
        let ids: Vec<FileId> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(entries[0].name, "f10");
    }

    #[test]
    fn test_clear() {
        let mut t = table(Backend::Treap);
        t.insert_tag("a", 1, "one").unwrap();
        t.clear().unwrap();
        assert_eq!(t.num_tags(), 0);
        assert_eq!(t.num_entries(), 0);
        t.insert_tag("b", 1, "one").unwrap();
        assert_eq!(t.tag_id("b"), Some(0));
    }
}
