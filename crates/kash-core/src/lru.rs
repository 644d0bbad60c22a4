//! Bounded recency cache
//!
//! A fixed-capacity associative container ordered by most-recent access.
//! Used standalone or as the memory tier in front of the disk store.
//!
//! # Layout
//! ```text
//! map: key → slot
//!
//! head (most recent)                         tail (least recent)
//!   [slot 3] <-> [slot 0] <-> [slot 5] <-> [slot 1]
//! ```
//!
//! Nodes live in a slab (`Vec<Option<Node>>`) and link to each other by
//! index, so get/put/remove/evict are O(1). Freed slots are recycled through
//! a free list. Capacity is counted in entries, one unit per key.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::error::{KashError, Result};

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    /// Tracked weight, one per entry
    size: usize,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn node(&self, slot: usize) -> Option<&Node<K, V>> {
        self.slots.get(slot).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(slot).and_then(|n| n.as_mut())
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.node(slot) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.node_mut(h) {
                node.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn touch(&mut self, slot: usize) {
        if self.head != Some(slot) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    fn alloc(&mut self, key: K, value: V) -> usize {
        let node = Node {
            key,
            value,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Detach a slot from the list and the map, returning its node
    fn take(&mut self, slot: usize) -> Option<Node<K, V>> {
        self.unlink(slot);
        let node = self.slots.get_mut(slot).and_then(|n| n.take())?;
        self.map.remove(&node.key);
        self.free.push(slot);
        Some(node)
    }

    /// Evict least-recently-used entries until `size <= max_size`
    fn trim_to_size(&mut self, max_size: usize) -> Result<usize> {
        let mut evicted = 0;
        loop {
            if self.map.is_empty() && self.size != 0 {
                return Err(self.violation(format!(
                    "recency cache is empty but tracks size {}",
                    self.size
                )));
            }

            if self.size <= max_size {
                return Ok(evicted);
            }

            let Some(tail) = self.tail else {
                return Err(self.violation(format!(
                    "recency list has no tail with {} entries mapped",
                    self.map.len()
                )));
            };

            if self.take(tail).is_none() {
                return Err(self.violation(format!("tail slot {} is vacant", tail)));
            }
            self.size = match self.size.checked_sub(1) {
                Some(size) => size,
                None => return Err(self.violation("tracked size underflow".into())),
            };
            evicted += 1;
        }
    }

    fn violation(&self, detail: String) -> KashError {
        error!("recency cache bookkeeping is inconsistent: {}", detail);
        KashError::InvariantViolation(detail)
    }
}

/// Capacity-bounded, recency-ordered cache
///
/// Every operation takes the same lock, so each call is atomic with respect
/// to every other call on the same instance.
pub struct RecencyCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> RecencyCache<K, V> {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(KashError::Configuration(
                "recency cache capacity must be positive".into(),
            ));
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                map: HashMap::with_capacity(capacity.min(1024)),
                slots: Vec::with_capacity(capacity.min(1024)),
                free: Vec::new(),
                head: None,
                tail: None,
                size: 0,
                capacity,
            }),
        })
    }

    /// Get a value and mark it most recently used
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        let slot = *inner.map.get(key)?;
        inner.touch(slot);
        inner.node(slot).map(|node| node.value.clone())
    }

    /// Get a value without affecting recency
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.inner.lock();
        let slot = *inner.map.get(key)?;
        inner.node(slot).map(|node| node.value.clone())
    }

    /// Check for a key without affecting recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().map.contains_key(key)
    }

    /// Insert or replace a value, returning the previous one
    ///
    /// Only a previously absent key adds weight; the cache is trimmed back to
    /// capacity afterwards.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        let mut inner = self.inner.lock();

        if let Some(&slot) = inner.map.get(&key) {
            inner.touch(slot);
            let previous = inner
                .node_mut(slot)
                .map(|node| std::mem::replace(&mut node.value, value));
            return Ok(previous);
        }

        let slot = inner.alloc(key.clone(), value);
        inner.map.insert(key, slot);
        inner.push_front(slot);
        inner.size += 1;

        let capacity = inner.capacity;
        let evicted = inner.trim_to_size(capacity)?;
        if evicted > 0 {
            trace!("recency cache: evicted {} entries", evicted);
        }
        Ok(None)
    }

    /// Remove a key, returning its value
    pub fn remove<Q>(&self, key: &Q) -> Result<Option<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        let Some(&slot) = inner.map.get(key) else {
            return Ok(None);
        };
        let Some(node) = inner.take(slot) else {
            return Err(inner.violation(format!("mapped slot {} is vacant", slot)));
        };
        inner.size = match inner.size.checked_sub(1) {
            Some(size) => size,
            None => return Err(inner.violation("size underflow on remove".to_string())),
        };
        Ok(Some(node.value))
    }

    /// Change the capacity and trim to it immediately
    pub fn resize(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(KashError::InvalidArgument(
                "recency cache capacity must be positive".into(),
            ));
        }

        let mut inner = self.inner.lock();
        inner.capacity = capacity;
        inner.trim_to_size(capacity)?;
        Ok(())
    }

    /// Remove every entry
    pub fn evict_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.trim_to_size(0)?;
        Ok(())
    }

    /// Current number of entries
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Keys ordered from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.lock();
        let mut keys = Vec::with_capacity(inner.map.len());
        let mut cursor = inner.head;
        while let Some(slot) = cursor {
            match inner.node(slot) {
                Some(node) => {
                    keys.push(node.key.clone());
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }
}
