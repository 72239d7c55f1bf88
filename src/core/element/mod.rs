//! Sets of entries backing tag buckets and query results
//!
//! Three interchangeable backends share one contract:
//! - [`unsorted`] - dynamic array, O(1) amortized append, linear lookups
//! - [`sorted`] - dynamic array in ascending id order, merge-based set algebra
//! - [`treap`] - randomized balanced tree, split/join set algebra
//!
//! On an id collision during union or intersection the entry from the second
//! operand (`b`) survives.

pub mod sorted;
pub mod treap;
pub mod unsorted;

use crate::core::entry::{EntryRef, FileId};
use crate::error::{Result, TagError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use sorted::SortedSet;
use treap::TreapSet;
use unsorted::UnsortedSet;

/// Set backend trait
///
/// Defines the operations every backend provides. Backends are plain
/// containers; the read-only flag and refcount bookkeeping live above them.
pub trait EntrySet: Sized {
    /// Insert an entry, rejecting a duplicate id
    fn insert(&mut self, entry: EntryRef) -> Result<()>;

    /// Remove the entry with this id, returning it if present
    fn remove(&mut self, id: FileId) -> Option<EntryRef>;

    /// Find the entry with this id
    fn find(&self, id: FileId) -> Option<EntryRef>;

    /// Number of entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the entries in the backend's natural order
    fn to_vec(&self) -> Vec<EntryRef>;

    /// Set union; `other` wins ties
    fn union(&self, other: &Self) -> Result<Self>;

    /// Set intersection; surviving entries come from `other`
    fn intersect(&self, other: &Self) -> Result<Self>;
}

/// Grow `vec` by doubling when it is full
///
/// `initial` is the capacity used for the first allocation.
pub(crate) fn grow_for_push<T>(vec: &mut Vec<T>, initial: usize) -> Result<()> {
    if vec.len() == vec.capacity() {
        let additional = vec.capacity().max(initial);
        vec.try_reserve_exact(additional)?;
    }
    Ok(())
}

fn backend_mismatch() -> TagError {
    TagError::InvalidArgument("element backends differ".to_string())
}

/// Which backend an element uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Unsorted,
    Sorted,
    #[default]
    Treap,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Unsorted, Backend::Sorted, Backend::Treap];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Unsorted => "unsorted",
            Backend::Sorted => "sorted",
            Backend::Treap => "treap",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unsorted" => Ok(Backend::Unsorted),
            "sorted" => Ok(Backend::Sorted),
            "treap" => Ok(Backend::Treap),
            other => Err(TagError::Config(format!(
                "unknown element backend '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
enum Repr {
    Unsorted(UnsortedSet),
    Sorted(SortedSet),
    Treap(TreapSet),
}

/// A de-duplicated set of entries
///
/// Mutable elements back live tag buckets. Elements produced by
/// [`Element::union`] and [`Element::intersect`] are read-only and reject
/// mutation with `ReadOnly`; they are owned and dropped by the caller.
#[derive(Debug, Clone)]
pub struct Element {
    repr: Repr,
    read_only: bool,
}

impl Element {
    /// Create an empty mutable element
    pub fn new(backend: Backend) -> Self {
        let repr = match backend {
            Backend::Unsorted => Repr::Unsorted(UnsortedSet::new()),
            Backend::Sorted => Repr::Sorted(SortedSet::new()),
            Backend::Treap => Repr::Treap(TreapSet::new()),
        };
        Element {
            repr,
            read_only: false,
        }
    }

    /// Build a mutable element from entries, rejecting duplicates
    pub fn from_entries<I>(backend: Backend, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = EntryRef>,
    {
        let mut element = Element::new(backend);
        for entry in entries {
            element.insert(entry)?;
        }
        Ok(element)
    }

    pub fn backend(&self) -> Backend {
        match self.repr {
            Repr::Unsorted(_) => Backend::Unsorted,
            Repr::Sorted(_) => Backend::Sorted,
            Repr::Treap(_) => Backend::Treap,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Insert an entry
    ///
    /// Fails with `Duplicate` if the id is present, `ReadOnly` on derived sets.
    pub fn insert(&mut self, entry: EntryRef) -> Result<()> {
        if self.read_only {
            return Err(TagError::ReadOnly);
        }
        match &mut self.repr {
            Repr::Unsorted(set) => set.insert(entry),
            Repr::Sorted(set) => set.insert(entry),
            Repr::Treap(set) => set.insert(entry),
        }
    }

    /// Remove the entry with this id; no-op if absent
    ///
    /// The removed handle is returned so the owner can release its refcount.
    pub fn remove(&mut self, id: FileId) -> Result<Option<EntryRef>> {
        if self.read_only {
            return Err(TagError::ReadOnly);
        }
        Ok(match &mut self.repr {
            Repr::Unsorted(set) => set.remove(id),
            Repr::Sorted(set) => set.remove(id),
            Repr::Treap(set) => set.remove(id),
        })
    }

    pub fn find(&self, id: FileId) -> Option<EntryRef> {
        match &self.repr {
            Repr::Unsorted(set) => set.find(id),
            Repr::Sorted(set) => set.find(id),
            Repr::Treap(set) => set.find(id),
        }
    }

    pub fn contains(&self, id: FileId) -> bool {
        self.find(id).is_some()
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Unsorted(set) => set.len(),
            Repr::Sorted(set) => set.len(),
            Repr::Treap(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in backend order (insertion order for unsorted, ascending id otherwise)
    pub fn to_vec(&self) -> Vec<EntryRef> {
        match &self.repr {
            Repr::Unsorted(set) => set.to_vec(),
            Repr::Sorted(set) => set.to_vec(),
            Repr::Treap(set) => set.to_vec(),
        }
    }

    /// File ids in ascending order
    pub fn ids(&self) -> Vec<FileId> {
        let mut ids: Vec<FileId> = self.to_vec().iter().map(EntryRef::id).collect();
        ids.sort_unstable();
        ids
    }

    /// Set union of `a` and `b` as a read-only element
    ///
    /// Both operands stay valid. If the backends differ, `b` is converted to
    /// `a`'s backend first.
    pub fn union(a: &Element, b: &Element) -> Result<Element> {
        Self::combine(a, b, |x, y| match (x, y) {
            (Repr::Unsorted(x), Repr::Unsorted(y)) => x.union(y).map(Repr::Unsorted),
            (Repr::Sorted(x), Repr::Sorted(y)) => x.union(y).map(Repr::Sorted),
            (Repr::Treap(x), Repr::Treap(y)) => x.union(y).map(Repr::Treap),
            _ => Err(backend_mismatch()),
        })
    }

    /// Set intersection of `a` and `b` as a read-only element
    pub fn intersect(a: &Element, b: &Element) -> Result<Element> {
        Self::combine(a, b, |x, y| match (x, y) {
            (Repr::Unsorted(x), Repr::Unsorted(y)) => x.intersect(y).map(Repr::Unsorted),
            (Repr::Sorted(x), Repr::Sorted(y)) => x.intersect(y).map(Repr::Sorted),
            (Repr::Treap(x), Repr::Treap(y)) => x.intersect(y).map(Repr::Treap),
            _ => Err(backend_mismatch()),
        })
    }

    fn combine<F>(a: &Element, b: &Element, op: F) -> Result<Element>
    where
        F: Fn(&Repr, &Repr) -> Result<Repr>,
    {
        let repr = if a.backend() == b.backend() {
            op(&a.repr, &b.repr)?
        } else {
            let converted = Element::from_entries(a.backend(), b.to_vec())?;
            op(&a.repr, &converted.repr)?
        };
        Ok(Element {
            repr,
            read_only: true,
        })
    }
}
