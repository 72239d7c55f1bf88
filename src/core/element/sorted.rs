//! Sorted array backend
//!
//! Entries are kept in ascending id order, so lookups are binary searches and
//! union/intersection are single merge passes over both operands.

use super::{grow_for_push, EntrySet};
use crate::core::entry::{EntryRef, FileId};
use crate::error::{Result, TagError};
use std::cmp::Ordering;

const START_CAPACITY: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    entries: Vec<EntryRef>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn search(&self, id: FileId) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by(|e| e.id().cmp(&id))
    }

    /// Append without the ordering check; merge output is already sorted
    fn push_end(&mut self, entry: EntryRef) -> Result<()> {
        grow_for_push(&mut self.entries, START_CAPACITY)?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn as_slice(&self) -> &[EntryRef] {
        &self.entries
    }
}

impl EntrySet for SortedSet {
    fn insert(&mut self, entry: EntryRef) -> Result<()> {
        match self.search(entry.id()) {
            Ok(_) => Err(TagError::Duplicate(entry.id())),
            Err(idx) => {
                grow_for_push(&mut self.entries, START_CAPACITY)?;
                self.entries.insert(idx, entry);
                Ok(())
            }
        }
    }

    fn remove(&mut self, id: FileId) -> Option<EntryRef> {
        let idx = self.search(id).ok()?;
        Some(self.entries.remove(idx))
    }

    fn find(&self, id: FileId) -> Option<EntryRef> {
        self.search(id).ok().map(|idx| self.entries[idx])
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn to_vec(&self) -> Vec<EntryRef> {
        self.entries.clone()
    }

    fn union(&self, other: &Self) -> Result<Self> {
        let mut result = SortedSet::new();
        let (a, b) = (&self.entries, &other.entries);
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            match a[i].id().cmp(&b[j].id()) {
                Ordering::Less => {
                    result.push_end(a[i])?;
                    i += 1;
                }
                Ordering::Greater => {
                    result.push_end(b[j])?;
                    j += 1;
                }
                Ordering::Equal => {
                    result.push_end(b[j])?;
                    i += 1;
                    j += 1;
                }
            }
        }
        for &entry in a[i..].iter().chain(b[j..].iter()) {
            result.push_end(entry)?;
        }
        Ok(result)
    }

    fn intersect(&self, other: &Self) -> Result<Self> {
        let mut result = SortedSet::new();
        let (a, b) = (&self.entries, &other.entries);
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            match a[i].id().cmp(&b[j].id()) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    result.push_end(b[j])?;
                    i += 1;
                    j += 1;
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[FileId]) -> SortedSet {
        let mut s = SortedSet::new();
        for &id in ids {
            s.insert(EntryRef::new(id, 0)).unwrap();
        }
        s
    }

    fn ids(s: &SortedSet) -> Vec<FileId> {
        s.as_slice().iter().map(EntryRef::id).collect()
    }

    #[test]
    fn test_insert_keeps_order() {
        let s = set(&[5, 1, 9, 3]);
        assert_eq!(ids(&s), vec![1, 3, 5, 9]);
    }

    #[test]
    fn test_duplicate_leaves_set_unchanged() {
        let mut s = set(&[1, 2, 3]);
        assert!(matches!(
            s.insert(EntryRef::new(2, 0)),
            Err(TagError::Duplicate(2))
        ));
        assert_eq!(ids(&s), vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_middle_and_absent() {
        let mut s = set(&[1, 2, 3]);
        assert_eq!(s.remove(2).map(|e| e.id()), Some(2));
        assert!(s.remove(42).is_none());
        assert_eq!(ids(&s), vec![1, 3]);
    }

    #[test]
    fn test_merge_union() {
        let a = set(&[1, 3, 5, 7]);
        let b = set(&[2, 3, 6, 7, 8]);
        assert_eq!(ids(&a.union(&b).unwrap()), vec![1, 2, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn test_merge_intersect() {
        let a = set(&[1, 3, 5, 7]);
        let b = set(&[2, 3, 6, 7, 8]);
        assert_eq!(ids(&a.intersect(&b).unwrap()), vec![3, 7]);
        assert!(a.intersect(&SortedSet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_union_with_empty() {
        let a = set(&[4, 2]);
        let empty = SortedSet::new();
        assert_eq!(ids(&a.union(&empty).unwrap()), vec![2, 4]);
        assert_eq!(ids(&empty.union(&a).unwrap()), vec![2, 4]);
    }
}
