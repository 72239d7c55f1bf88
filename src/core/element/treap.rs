//! Treap backend
//!
//! A binary search tree keyed by file id where every node also carries a
//! uniformly random priority kept in min-heap order, which balances the tree
//! in expectation.
//!
//! Nodes live in a per-set arena (`Vec<TreapNode>`) and link to each other by
//! index. Union and intersection first copy both operands into the result's
//! arena, then combine them there with split/join, so the operands are never
//! touched and stay independently usable:
//!
//! - `union(t1, t2)`: the root with the smaller priority stays on top; the
//!   other tree is split at its key and each half is merged recursively.
//! - `intersect(t1, t2)`: same recursion, but the top node is kept only when
//!   the split found its key in the other tree; otherwise the two recursive
//!   results are joined.
//!
//! Expected cost is O(log n) for insert/remove/find and
//! O(m log(n/m + 1)) for the combining step.

use super::EntrySet;
use crate::core::entry::{EntryRef, FileId};
use crate::error::{Result, TagError};
use rand::Rng;
use std::cmp::Ordering;

type NodeId = u32;
type Link = Option<NodeId>;

#[derive(Debug, Clone, Copy)]
struct TreapNode {
    entry: EntryRef,
    prio: u64,
    left: Link,
    right: Link,
}

/// Which operand a node was copied from during union/intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

#[derive(Debug, Clone, Default)]
pub struct TreapSet {
    nodes: Vec<TreapNode>,
    free: Vec<NodeId>,
    root: Link,
    len: usize,
}

impl TreapSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(capacity: usize) -> Result<Self> {
        let mut set = TreapSet::new();
        set.nodes.try_reserve_exact(capacity)?;
        Ok(set)
    }

    fn node(&self, id: NodeId) -> &TreapNode {
        &self.nodes[id as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut TreapNode {
        &mut self.nodes[id as usize]
    }

    fn key(&self, id: NodeId) -> FileId {
        self.node(id).entry.id()
    }

    fn prio(&self, id: NodeId) -> u64 {
        self.node(id).prio
    }

    fn alloc(&mut self, entry: EntryRef, prio: u64) -> Result<NodeId> {
        let node = TreapNode {
            entry,
            prio,
            left: None,
            right: None,
        };
        if let Some(id) = self.free.pop() {
            *self.node_mut(id) = node;
            return Ok(id);
        }
        if self.nodes.len() == self.nodes.capacity() {
            let additional = self.nodes.capacity().max(8);
            self.nodes.try_reserve_exact(additional)?;
        }
        let id = NodeId::try_from(self.nodes.len())
            .map_err(|_| TagError::NoMemory("treap node space exhausted".to_string()))?;
        self.nodes.push(node);
        Ok(id)
    }

    fn release(&mut self, id: NodeId) {
        self.free.push(id);
    }

    /// Priority of the root, for inspecting heap order
    #[cfg(test)]
    fn root_prio(&self) -> Option<u64> {
        self.root.map(|r| self.prio(r))
    }

    // ---- rotations ----

    /// Lift the left child of `y` into its place
    fn rotate_right(&mut self, y: NodeId) -> NodeId {
        let x = match self.node(y).left {
            Some(x) => x,
            None => return y,
        };
        self.node_mut(y).left = self.node(x).right;
        self.node_mut(x).right = Some(y);
        x
    }

    /// Lift the right child of `x` into its place
    fn rotate_left(&mut self, x: NodeId) -> NodeId {
        let y = match self.node(x).right {
            Some(y) => y,
            None => return x,
        };
        self.node_mut(x).right = self.node(y).left;
        self.node_mut(y).left = Some(x);
        y
    }

    // ---- point operations ----

    /// BST descent, then rotate the new leaf up while its parent's priority is larger
    fn insert_at(&mut self, link: Link, new: NodeId) -> NodeId {
        let cur = match link {
            Some(cur) => cur,
            None => return new,
        };
        if self.key(new) < self.key(cur) {
            let child = self.insert_at(self.node(cur).left, new);
            self.node_mut(cur).left = Some(child);
            if self.prio(child) < self.prio(cur) {
                return self.rotate_right(cur);
            }
        } else {
            let child = self.insert_at(self.node(cur).right, new);
            self.node_mut(cur).right = Some(child);
            if self.prio(child) < self.prio(cur) {
                return self.rotate_left(cur);
            }
        }
        cur
    }

    /// Rotate `cur` down past its smaller-priority child until it is a leaf,
    /// then detach it. Returns the new subtree root.
    fn sink(&mut self, cur: NodeId) -> Link {
        let TreapNode { left, right, .. } = *self.node(cur);
        let lift_left = match (left, right) {
            (None, None) => return None,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(l), Some(r)) => self.prio(l) < self.prio(r),
        };
        if lift_left {
            let top = self.rotate_right(cur);
            let rest = self.sink(cur);
            self.node_mut(top).right = rest;
            Some(top)
        } else {
            let top = self.rotate_left(cur);
            let rest = self.sink(cur);
            self.node_mut(top).left = rest;
            Some(top)
        }
    }

    fn remove_at(&mut self, link: Link, id: FileId) -> (Link, Option<NodeId>) {
        let cur = match link {
            Some(cur) => cur,
            None => return (None, None),
        };
        match id.cmp(&self.key(cur)) {
            Ordering::Less => {
                let (child, removed) = self.remove_at(self.node(cur).left, id);
                self.node_mut(cur).left = child;
                (Some(cur), removed)
            }
            Ordering::Greater => {
                let (child, removed) = self.remove_at(self.node(cur).right, id);
                self.node_mut(cur).right = child;
                (Some(cur), removed)
            }
            Ordering::Equal => (self.sink(cur), Some(cur)),
        }
    }

    fn find_node(&self, id: FileId) -> Option<NodeId> {
        let mut cur = self.root;
        while let Some(n) = cur {
            cur = match id.cmp(&self.key(n)) {
                Ordering::Less => self.node(n).left,
                Ordering::Greater => self.node(n).right,
                Ordering::Equal => return Some(n),
            };
        }
        None
    }

    fn collect_in_order(&self, link: Link, out: &mut Vec<EntryRef>) {
        let mut stack = Vec::new();
        let mut cur = link;
        loop {
            while let Some(n) = cur {
                stack.push(n);
                cur = self.node(n).left;
            }
            match stack.pop() {
                Some(n) => {
                    out.push(self.node(n).entry);
                    cur = self.node(n).right;
                }
                None => break,
            }
        }
    }

    fn count(&self, link: Link) -> usize {
        match link {
            None => 0,
            Some(n) => 1 + self.count(self.node(n).left) + self.count(self.node(n).right),
        }
    }

    // ---- split / join ----

    /// Split `link` at `key` into (keys < key, node with key, keys > key)
    fn split(&mut self, link: Link, key: FileId) -> (Link, Link, Link) {
        let n = match link {
            Some(n) => n,
            None => return (None, None, None),
        };
        match self.key(n).cmp(&key) {
            Ordering::Less => {
                let (less, found, greater) = self.split(self.node(n).right, key);
                self.node_mut(n).right = less;
                (Some(n), found, greater)
            }
            Ordering::Greater => {
                let (less, found, greater) = self.split(self.node(n).left, key);
                self.node_mut(n).left = greater;
                (less, found, Some(n))
            }
            Ordering::Equal => {
                let TreapNode { left, right, .. } = *self.node(n);
                let node = self.node_mut(n);
                node.left = None;
                node.right = None;
                (left, Some(n), right)
            }
        }
    }

    /// Join two treaps where every key in `a` is below every key in `b`
    fn join(&mut self, a: Link, b: Link) -> Link {
        match (a, b) {
            (None, other) | (other, None) => other,
            (Some(x), Some(y)) => {
                if self.prio(x) < self.prio(y) {
                    let right = self.join(self.node(x).right, Some(y));
                    self.node_mut(x).right = right;
                    Some(x)
                } else {
                    let left = self.join(Some(x), self.node(y).left);
                    self.node_mut(y).left = left;
                    Some(y)
                }
            }
        }
    }

    /// Copy the nodes reachable from `other.root` into this arena
    fn graft(&mut self, other: &TreapSet) -> Result<Link> {
        let root = match other.root {
            Some(r) => r,
            None => return Ok(None),
        };
        self.nodes.try_reserve(other.len)?;

        // Pre-order copy with an explicit stack; children are patched once
        // their new ids are known.
        let mut new_root = None;
        let mut stack: Vec<(NodeId, Option<(NodeId, bool)>)> = vec![(root, None)];
        while let Some((src, parent)) = stack.pop() {
            let node = *other.node(src);
            let dst = self.alloc(node.entry, node.prio)?;
            match parent {
                Some((p, true)) => self.node_mut(p).left = Some(dst),
                Some((p, false)) => self.node_mut(p).right = Some(dst),
                None => new_root = Some(dst),
            }
            if let Some(r) = node.right {
                stack.push((r, Some((dst, false))));
            }
            if let Some(l) = node.left {
                stack.push((l, Some((dst, true))));
            }
        }
        Ok(new_root)
    }

    fn union_links(&mut self, t1: Link, s1: Side, t2: Link, s2: Side) -> Link {
        let (mut n1, mut n2) = match (t1, t2) {
            (None, other) | (other, None) => return other,
            (Some(n1), Some(n2)) => (n1, n2),
        };
        let (mut s1, mut s2) = (s1, s2);
        if self.prio(n1) > self.prio(n2) {
            std::mem::swap(&mut n1, &mut n2);
            std::mem::swap(&mut s1, &mut s2);
        }

        let key = self.key(n1);
        let (less, dup, greater) = self.split(Some(n2), key);
        if let Some(d) = dup {
            if s2 == Side::B {
                self.node_mut(n1).entry = self.node(d).entry;
            }
            self.release(d);
        }

        let (left, right) = (self.node(n1).left, self.node(n1).right);
        let left = self.union_links(left, s1, less, s2);
        let right = self.union_links(right, s1, greater, s2);
        let node = self.node_mut(n1);
        node.left = left;
        node.right = right;
        Some(n1)
    }

    fn intersect_links(&mut self, t1: Link, s1: Side, t2: Link, s2: Side) -> Link {
        let (mut n1, mut n2) = match (t1, t2) {
            (Some(n1), Some(n2)) => (n1, n2),
            _ => return None,
        };
        let (mut s1, mut s2) = (s1, s2);
        if self.prio(n1) > self.prio(n2) {
            std::mem::swap(&mut n1, &mut n2);
            std::mem::swap(&mut s1, &mut s2);
        }

        let key = self.key(n1);
        let (less, dup, greater) = self.split(Some(n2), key);
        let (left, right) = (self.node(n1).left, self.node(n1).right);
        let left = self.intersect_links(left, s1, less, s2);
        let right = self.intersect_links(right, s1, greater, s2);

        match dup {
            Some(d) => {
                if s2 == Side::B {
                    self.node_mut(n1).entry = self.node(d).entry;
                }
                self.release(d);
                let node = self.node_mut(n1);
                node.left = left;
                node.right = right;
                Some(n1)
            }
            None => {
                self.release(n1);
                self.join(left, right)
            }
        }
    }

    /// Rebuild the arena so it holds only the nodes reachable from the root
    fn compact(self) -> Result<Self> {
        let mut out = TreapSet::with_capacity(self.len)?;
        out.root = out.graft(&self)?;
        out.len = self.len;
        Ok(out)
    }

    fn combine<F>(a: &TreapSet, b: &TreapSet, op: F) -> Result<TreapSet>
    where
        F: FnOnce(&mut TreapSet, Link, Link) -> Link,
    {
        let mut work = TreapSet::with_capacity(a.len + b.len)?;
        let ra = work.graft(a)?;
        let rb = work.graft(b)?;
        work.root = op(&mut work, ra, rb);
        work.len = work.count(work.root);
        work.free.clear();
        work.compact()
    }
}

impl EntrySet for TreapSet {
    fn insert(&mut self, entry: EntryRef) -> Result<()> {
        if self.find_node(entry.id()).is_some() {
            return Err(TagError::Duplicate(entry.id()));
        }
        let prio = rand::thread_rng().gen::<u64>();
        let new = self.alloc(entry, prio)?;
        self.root = Some(self.insert_at(self.root, new));
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, id: FileId) -> Option<EntryRef> {
        let (root, removed) = self.remove_at(self.root, id);
        self.root = root;
        let removed = removed?;
        let entry = self.node(removed).entry;
        self.release(removed);
        self.len -= 1;
        Some(entry)
    }

    fn find(&self, id: FileId) -> Option<EntryRef> {
        self.find_node(id).map(|n| self.node(n).entry)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn to_vec(&self) -> Vec<EntryRef> {
        let mut out = Vec::with_capacity(self.len);
        self.collect_in_order(self.root, &mut out);
        out
    }

    fn union(&self, other: &Self) -> Result<Self> {
        TreapSet::combine(self, other, |work, ra, rb| {
            work.union_links(ra, Side::A, rb, Side::B)
        })
    }

    fn intersect(&self, other: &Self) -> Result<Self> {
        TreapSet::combine(self, other, |work, ra, rb| {
            work.intersect_links(ra, Side::A, rb, Side::B)
        })
    }
}
