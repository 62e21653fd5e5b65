//! Open-hashed intrusive hash map shared by the string interner, the
//! section map, and every table section's entry map (§4.3, §9
//! "Polymorphism": "one hash-map implementation serves both").
//!
//! Grounded on `lsml_hm_get_node[_reg]`, `lsml_hm_get_or_create_node`, and
//! `lsml_hm_rehash_if_needed` in `original_source/c/lsml.c`. The common node
//! header (`next`, key) is the generic [`Node<V>`] here instead of a shared
//! C struct prefix, which is the Rust-idiomatic way to express "every node
//! starts with the same header" without relying on struct-layout aliasing.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::arena::Arena;
use crate::chunked::{mod_chunklen, ChunkedVec};
use crate::error::LsmlError;
use crate::intern::RegisteredString;

pub(crate) struct Node<V> {
    next: Cell<Option<NonNull<Node<V>>>>,
    pub key: RegisteredString,
    pub value: V,
}

/// The three load factors the original's `LSML_LOAD_FACTOR` build-time
/// switch allows (§4.3); `EightTenths` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadFactor {
    One,
    Half,
    #[default]
    EightTenths,
}

impl LoadFactor {
    /// Returns `true` if no rehash is needed yet, i.e. `count <= alpha *
    /// capacity` still holds, expressed with the same integer-scaled
    /// comparisons the original uses for its three build-time options.
    fn within_bounds(self, n_elems: usize, old_cap: usize) -> bool {
        match self {
            LoadFactor::One => n_elems <= old_cap,
            LoadFactor::Half => n_elems.saturating_mul(2) <= old_cap,
            LoadFactor::EightTenths => (n_elems + n_elems / 4) <= old_cap,
        }
    }
}

pub(crate) struct HashMap<V, const C: usize = 8> {
    buckets: ChunkedVec<NonNull<Node<V>>, C>,
    n_elems: Cell<usize>,
    load_factor: LoadFactor,
}

impl<V, const C: usize> HashMap<V, C> {
    pub(crate) fn new(load_factor: LoadFactor) -> Self {
        HashMap {
            buckets: ChunkedVec::new(),
            n_elems: Cell::new(0),
            load_factor,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.n_elems.get()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buckets.capacity()
    }

    fn bucket_index(&self, hash: u32) -> Option<usize> {
        let cap = self.buckets.capacity();
        if cap == 0 {
            return None;
        }
        Some((hash as usize) % cap)
    }

    /// Lookup by raw bytes (byte-equality chain walk) — used when the key
    /// string is not registered yet.
    pub(crate) fn get_by_bytes(&self, hash: u32, bytes: &[u8]) -> Option<NonNull<Node<V>>> {
        let idx = self.bucket_index(hash)?;
        let mut cur = self.buckets.get_bucket(idx);
        while let Some(node) = cur {
            // SAFETY: every bucket entry is a live node owned by this map.
            let node_ref = unsafe { node.as_ref() };
            if node_ref.key.hash() == hash && node_ref.key.as_bytes_raw() == bytes {
                return Some(node);
            }
            cur = node_ref.next.get();
        }
        None
    }

    /// Lookup by registered-string pointer identity — used once the key is
    /// already interned, avoiding a byte comparison entirely.
    pub(crate) fn get_by_reg(&self, key: RegisteredString) -> Option<NonNull<Node<V>>> {
        let idx = self.bucket_index(key.hash())?;
        let mut cur = self.buckets.get_bucket(idx);
        while let Some(node) = cur {
            // SAFETY: see `get_by_bytes`.
            let node_ref = unsafe { node.as_ref() };
            if node_ref.key == key {
                return Some(node);
            }
            cur = node_ref.next.get();
        }
        None
    }

    /// Lookup-or-insert keyed by an already-registered string. On miss, the
    /// new node's value is produced by `make_value` (called at most once).
    /// Tail-insertion preserves first-seen order within a bucket.
    pub(crate) fn get_or_create(
        &self,
        arena: &Arena,
        key: RegisteredString,
        make_value: impl FnOnce() -> V,
    ) -> Result<(NonNull<Node<V>>, bool), LsmlError> {
        self.buckets.ensure_first_chunk(arena)?;
        if let Some(existing) = self.get_by_reg(key) {
            return Ok((existing, false));
        }
        let node = arena.alloc(Node {
            next: Cell::new(None),
            key,
            value: make_value(),
        })?;
        let idx = (key.hash() as usize) % self.buckets.capacity();
        match self.buckets.get_bucket(idx) {
            None => self.buckets.set_bucket(idx, Some(node)),
            Some(head) => {
                let mut cur = head;
                loop {
                    // SAFETY: chain nodes are all live, arena-owned.
                    let next = unsafe { cur.as_ref() }.next.get();
                    match next {
                        Some(n) => cur = n,
                        None => break,
                    }
                }
                // SAFETY: `cur` is the tail of the chain just walked.
                unsafe { cur.as_ref() }.next.set(Some(node));
            }
        }
        self.n_elems.set(self.n_elems.get() + 1);
        Ok((node, true))
    }

    /// Checked **before** insertion. Doubles the chunk count if the load
    /// factor would otherwise be exceeded, then relocates only the nodes
    /// whose bucket actually changed, leaving freshly-appended (and
    /// therefore empty) chunks unscanned.
    pub(crate) fn rehash_if_needed(&self, arena: &Arena) -> Result<(), LsmlError> {
        let old_n_chunks = self.buckets.n_chunks();
        if old_n_chunks == 0 {
            return Ok(());
        }
        let old_cap = old_n_chunks * C;
        if self.load_factor.within_bounds(self.n_elems.get(), old_cap) {
            return Ok(());
        }
        let old_tail = self.buckets.grow(arena, old_n_chunks)?;
        let new_cap = self.buckets.capacity();
        for chunk in self.buckets.chunks_until(old_tail) {
            for slot_idx in 0..C {
                let mut prev: Option<NonNull<Node<V>>> = None;
                // SAFETY: `chunk` is a live, pre-existing chunk of this map.
                let mut cur = unsafe { chunk.as_ref() }.slots[slot_idx].get();
                while let Some(node) = cur {
                    // SAFETY: node is a live map node.
                    let node_ref = unsafe { node.as_ref() };
                    let next = node_ref.next.get();
                    let old_bucket = (node_ref.key.hash() as usize) % old_cap;
                    let new_bucket = (node_ref.key.hash() as usize) % new_cap;
                    if old_bucket != new_bucket {
                        // Unlink from the current chain.
                        match prev {
                            None => unsafe { chunk.as_ref() }.slots[slot_idx].set(next),
                            Some(p) => unsafe { p.as_ref() }.next.set(next),
                        }
                        node_ref.next.set(None);
                        self.append_to_bucket(new_bucket, node);
                    } else {
                        prev = Some(node);
                    }
                    cur = next;
                }
            }
        }
        Ok(())
    }

    fn append_to_bucket(&self, bucket: usize, node: NonNull<Node<V>>) {
        match self.buckets.get_bucket(bucket) {
            None => self.buckets.set_bucket(bucket, Some(node)),
            Some(head) => {
                let mut cur = head;
                loop {
                    // SAFETY: chain nodes are live.
                    let next = unsafe { cur.as_ref() }.next.get();
                    match next {
                        Some(n) => cur = n,
                        None => break,
                    }
                }
                // SAFETY: `cur` is the chain tail.
                unsafe { cur.as_ref() }.next.set(Some(node));
            }
        }
    }

    /// Bucket-chain-by-bucket-chain iteration in implementation-defined
    /// order (§4.5 "Iteration"), expressed as a plain Rust iterator rather
    /// than a caller-managed `{chunk, slot, element}` triple: exhaustion
    /// naturally yields `None` forever after, matching the original's
    /// "safe to re-call" sentinel behavior for free.
    pub(crate) fn iter(&self) -> impl Iterator<Item = NonNull<Node<V>>> + '_ {
        let cap = self.buckets.capacity();
        let mut bucket = 0usize;
        let mut cur: Option<NonNull<Node<V>>> = None;
        std::iter::from_fn(move || {
            loop {
                if let Some(node) = cur {
                    // SAFETY: node is a live map node.
                    cur = unsafe { node.as_ref() }.next.get();
                    return Some(node);
                }
                if bucket >= cap {
                    return None;
                }
                cur = self.buckets.get_bucket(bucket);
                bucket += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn insert_lookup_and_rehash_preserve_entries() {
        let arena = Arena::new(1 << 16);
        let interner = Interner::new();
        let map: HashMap<()> = HashMap::new(LoadFactor::EightTenths);
        let mut keys = Vec::new();
        for i in 0..200 {
            let s = format!("key-{i}");
            let key = interner.intern_copy(&arena, s.as_bytes()).unwrap();
            map.rehash_if_needed(&arena).unwrap();
            let (_, created) = map.get_or_create(&arena, key, || ()).unwrap();
            assert!(created);
            keys.push(key);
        }
        assert_eq!(map.len(), 200);
        for key in keys {
            assert!(map.get_by_reg(key).is_some());
        }
    }
}
