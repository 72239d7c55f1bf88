//! Indexed file entries and the shared entry arena
//!
//! A file's `Entry` is shared by every tag bucket that contains it. Buckets
//! never own entries: they hold `EntryRef` handles into an `EntryArena`, and
//! the arena keeps one reference count per slot. An entry is destroyed when
//! the last bucket releases it.

use crate::error::{Result, TagError};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Opaque file identifier supplied by the host
pub type FileId = u64;

/// Maximum entry name length in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Index record for one file
///
/// Identity is the file id: two entries are equal iff their ids match.
/// `name` and `refcount` are metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// File identifier
    pub id: FileId,
    /// Display name
    pub name: String,
    /// Number of tag buckets currently holding this entry
    pub refcount: u32,
}

impl Entry {
    pub fn new(id: FileId, name: impl Into<String>) -> Self {
        Entry {
            id,
            name: name.into(),
            refcount: 0,
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Handle to an arena slot, as stored in every set backend
///
/// Ordering and equality only consider the file id.
#[derive(Debug, Clone, Copy)]
pub struct EntryRef {
    id: FileId,
    slot: u32,
}

impl EntryRef {
    /// Build a handle; only meaningful for a slot of the arena it came from
    pub fn new(id: FileId, slot: u32) -> Self {
        EntryRef { id, slot }
    }

    /// File id of the referenced entry
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Arena slot of the referenced entry
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl PartialEq for EntryRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntryRef {}

impl PartialOrd for EntryRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntryRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// Validate an entry name
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(TagError::InvalidArgument(format!(
            "entry name too long ({} bytes, max {})",
            name.len(),
            MAX_NAME_LEN
        )));
    }
    if name.contains('\0') {
        return Err(TagError::InvalidArgument(
            "entry name cannot contain NUL".to_string(),
        ));
    }
    Ok(())
}

/// Slab of shared entries with per-slot reference counts
#[derive(Debug, Default)]
pub struct EntryArena {
    slots: Vec<Option<Entry>>,
    free_slots: Vec<u32>,
    by_id: AHashMap<FileId, u32>,
}

impl EntryArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Find the entry for `id`, or create it with a zero refcount
    ///
    /// An existing entry keeps its name.
    pub fn intern(&mut self, id: FileId, name: &str) -> Result<EntryRef> {
        if let Some(&slot) = self.by_id.get(&id) {
            return Ok(EntryRef::new(id, slot));
        }
        validate_name(name)?;

        self.by_id.try_reserve(1)?;
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(Entry::new(id, name));
                slot
            }
            None => {
                self.slots.try_reserve(1)?;
                let slot = u32::try_from(self.slots.len()).map_err(|_| {
                    TagError::NoMemory("entry arena exhausted u32 slot space".to_string())
                })?;
                self.slots.push(Some(Entry::new(id, name)));
                slot
            }
        };
        self.by_id.insert(id, slot);
        Ok(EntryRef::new(id, slot))
    }

    /// Handle for a live entry
    pub fn lookup(&self, id: FileId) -> Option<EntryRef> {
        self.by_id.get(&id).map(|&slot| EntryRef::new(id, slot))
    }

    /// Entry behind a handle
    pub fn get(&self, entry: EntryRef) -> Option<&Entry> {
        self.slots
            .get(entry.slot as usize)
            .and_then(|slot| slot.as_ref())
            .filter(|e| e.id == entry.id)
    }

    /// Entry for a file id
    pub fn find(&self, id: FileId) -> Option<&Entry> {
        self.lookup(id).and_then(|entry| self.get(entry))
    }

    /// Record one more bucket holding this entry
    pub fn retain(&mut self, entry: EntryRef) {
        if let Some(Some(e)) = self.slots.get_mut(entry.slot as usize) {
            e.refcount += 1;
        }
    }

    /// Drop one bucket reference; destroys the entry at zero
    ///
    /// Returns true when the entry was destroyed.
    pub fn release(&mut self, entry: EntryRef) -> bool {
        let destroyed = match self.slots.get_mut(entry.slot as usize) {
            Some(Some(e)) if e.id == entry.id => {
                e.refcount = e.refcount.saturating_sub(1);
                e.refcount == 0
            }
            _ => false,
        };
        if destroyed {
            self.free_slot(entry);
        }
        destroyed
    }

    /// Destroy a freshly interned entry that no bucket ended up holding
    pub fn discard_unreferenced(&mut self, entry: EntryRef) {
        let unreferenced = matches!(
            self.slots.get(entry.slot as usize),
            Some(Some(e)) if e.id == entry.id && e.refcount == 0
        );
        if unreferenced {
            self.free_slot(entry);
        }
    }

    fn free_slot(&mut self, entry: EntryRef) {
        self.slots[entry.slot as usize] = None;
        self.by_id.remove(&entry.id);
        self.free_slots.push(entry.slot);
    }

    /// Live entries with their handles, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (EntryRef, &Entry)> {
        self.slots.iter().enumerate().filter_map(|(slot, e)| {
            e.as_ref()
                .map(|e| (EntryRef::new(e.id, slot as u32), e))
        })
    }

    /// Release every entry at once
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_slots.clear();
        self.by_id.clear();
    }
}
