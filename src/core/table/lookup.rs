//! Tag id <-> name lookup array
//!
//! Slot `i` holds the name of tag id `i`, or `None` when the id is free.
//! Freed ids queue up in FIFO order and are handed out again before the
//! array grows; growth doubles the capacity.

use crate::error::{Result, TagError};
use std::collections::VecDeque;

/// Small integer handle for a tag name
pub type TagId = u32;

/// Outcome of [`TagLookup::assign`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assigned {
    pub id: TagId,
    /// True when the id came off the free list
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct TagLookup {
    slots: Vec<Option<String>>,
    free: VecDeque<TagId>,
    /// First id never handed out
    next: usize,
}

impl TagLookup {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        slots.resize(capacity, None);
        let mut free = VecDeque::new();
        free.try_reserve(capacity)?;
        Ok(TagLookup {
            slots,
            free,
            next: 0,
        })
    }

    /// Rebuild from persisted slots; free ids are queued in ascending order
    pub fn from_slots(slots: Vec<Option<String>>) -> Result<Self> {
        if slots.is_empty() {
            return Err(TagError::corrupt("lookup capacity is zero"));
        }
        let mut free = VecDeque::new();
        free.try_reserve(slots.len())?;
        for (id, slot) in slots.iter().enumerate() {
            if slot.is_none() {
                free.push_back(id as TagId);
            }
        }
        let next = slots.len();
        Ok(TagLookup { slots, free, next })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn name(&self, id: TagId) -> Option<&str> {
        self.slots.get(id as usize).and_then(|s| s.as_deref())
    }

    /// Reserve an id for `name`
    pub fn assign(&mut self, name: &str) -> Result<Assigned> {
        let owned = name.to_string();
        if let Some(id) = self.free.pop_front() {
            self.slots[id as usize] = Some(owned);
            return Ok(Assigned { id, reused: true });
        }
        if self.next == self.slots.len() {
            let grow = self.slots.len();
            self.slots.try_reserve_exact(grow)?;
            // the free list never holds more ids than there are slots
            self.free.try_reserve(self.slots.len() + grow - self.free.len())?;
            self.slots.resize(self.slots.len() + grow, None);
        }
        let id = TagId::try_from(self.next)
            .map_err(|_| TagError::NoMemory("tag id space exhausted".to_string()))?;
        self.slots[self.next] = Some(owned);
        self.next += 1;
        Ok(Assigned { id, reused: false })
    }

    /// Undo an [`assign`](Self::assign) that was not followed by a bucket
    pub fn unassign(&mut self, assigned: Assigned) {
        self.slots[assigned.id as usize] = None;
        if assigned.reused {
            self.free.push_front(assigned.id);
        } else {
            self.next -= 1;
        }
    }

    /// Return an id to the back of the free list
    pub fn release(&mut self, id: TagId) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            if slot.take().is_some() {
                self.free.push_back(id);
            }
        }
    }

    pub fn rename(&mut self, id: TagId, name: String) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = Some(name);
        }
    }

    /// All slots, occupied or not, up to capacity
    pub fn slots(&self) -> &[Option<String>] {
        &self.slots
    }

    /// Occupied `(id, name)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (TagId, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, s)| s.as_deref().map(|name| (id as TagId, name)))
    }
}
