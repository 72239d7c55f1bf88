//! Unsorted array backend
//!
//! Baseline implementation: entries are appended in insertion order, and
//! duplicate checks and removals scan the array.

use super::{grow_for_push, EntrySet};
use crate::core::entry::{EntryRef, FileId};
use crate::error::{Result, TagError};
use ahash::AHashMap;

const START_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct UnsortedSet {
    entries: Vec<EntryRef>,
}

impl UnsortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, id: FileId) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == id)
    }

    fn push(&mut self, entry: EntryRef) -> Result<()> {
        grow_for_push(&mut self.entries, START_CAPACITY)?;
        self.entries.push(entry);
        Ok(())
    }
}

impl EntrySet for UnsortedSet {
    fn insert(&mut self, entry: EntryRef) -> Result<()> {
        if self.position(entry.id()).is_some() {
            return Err(TagError::Duplicate(entry.id()));
        }
        self.push(entry)
    }

    fn remove(&mut self, id: FileId) -> Option<EntryRef> {
        let idx = self.position(id)?;
        Some(self.entries.remove(idx))
    }

    fn find(&self, id: FileId) -> Option<EntryRef> {
        self.position(id).map(|idx| self.entries[idx])
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn to_vec(&self) -> Vec<EntryRef> {
        self.entries.clone()
    }

    fn union(&self, other: &Self) -> Result<Self> {
        let mut result = UnsortedSet::new();
        let mut index: AHashMap<FileId, usize> = AHashMap::new();
        index.try_reserve(self.len() + other.len())?;

        for &entry in self.entries.iter().chain(other.entries.iter()) {
            match index.get(&entry.id()) {
                // later operand wins the tie
                Some(&idx) => result.entries[idx] = entry,
                None => {
                    index.insert(entry.id(), result.entries.len());
                    result.push(entry)?;
                }
            }
        }
        Ok(result)
    }

    fn intersect(&self, other: &Self) -> Result<Self> {
        let mut ids: AHashMap<FileId, ()> = AHashMap::new();
        ids.try_reserve(self.len())?;
        for entry in &self.entries {
            ids.insert(entry.id(), ());
        }

        let mut result = UnsortedSet::new();
        for &entry in &other.entries {
            if ids.contains_key(&entry.id()) {
                result.push(entry)?;
            }
        }
        Ok(result)
    }
}
