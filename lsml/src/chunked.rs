//! Singly-linked list of fixed-size slot arrays — the substrate shared by
//! hash-map bucket storage and array element storage alike (§4.2, §9
//! "Arena + chunked vectors in place of growable buffers").
//!
//! Grounded on `lsml_cha_chunk_t`/`lsml_cha_get`/`lsml_cha_get_bucket` in
//! `original_source/c/lsml.c`, and on the chunked-storage shape of
//! `codegraph-core::memory::arena::ChunkArena` (fixed-size backing chunks,
//! append-only growth, no relocation). `C` is a const generic rather than a
//! single global constant so the type can satisfy "MUST work with any
//! `C >= 1`" while still defaulting to a small power-of-two.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::arena::Arena;
use crate::error::LsmlError;

pub(crate) struct Chunk<T, const C: usize> {
    next: Cell<Option<NonNull<Chunk<T, C>>>>,
    slots: [Cell<Option<T>>; C],
}

impl<T: Copy, const C: usize> Chunk<T, C> {
    fn empty() -> Self {
        Chunk {
            next: Cell::new(None),
            slots: std::array::from_fn(|_| Cell::new(None)),
        }
    }
}

/// A grow-only, append-only chunked vector. Holds no direct reference to the
/// arena it was allocated from; every mutating method takes `&Arena`
/// explicitly, mirroring the original's convention of passing the
/// allocator alongside the structure it services.
pub(crate) struct ChunkedVec<T, const C: usize = 8> {
    head: Cell<Option<NonNull<Chunk<T, C>>>>,
    tail: Cell<Option<NonNull<Chunk<T, C>>>>,
    n_elems: Cell<usize>,
    n_chunks: Cell<usize>,
}

impl<T: Copy, const C: usize> ChunkedVec<T, C> {
    pub(crate) fn new() -> Self {
        ChunkedVec {
            head: Cell::new(None),
            tail: Cell::new(None),
            n_elems: Cell::new(0),
            n_chunks: Cell::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.n_elems.get()
    }

    pub(crate) fn n_chunks(&self) -> usize {
        self.n_chunks.get()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.n_chunks.get() * C
    }

    pub(crate) fn head(&self) -> Option<NonNull<Chunk<T, C>>> {
        self.head.get()
    }

    fn link_new_chunk(&self, arena: &Arena) -> Result<NonNull<Chunk<T, C>>, LsmlError> {
        let chunk = arena.alloc(Chunk::empty())?;
        match self.tail.get() {
            None => self.head.set(Some(chunk)),
            Some(tail) => {
                // SAFETY: `tail` was produced by this vector's own prior
                // `link_new_chunk` call and the arena never frees it.
                unsafe { tail.as_ref() }.next.set(Some(chunk));
            }
        }
        self.tail.set(Some(chunk));
        self.n_chunks.set(self.n_chunks.get() + 1);
        Ok(chunk)
    }

    /// Appends `value` as a new element, linking a fresh chunk if the tail
    /// chunk is full. Returns the absolute index the value was written at.
    pub(crate) fn push(&self, arena: &Arena, value: T) -> Result<usize, LsmlError> {
        let index = self.n_elems.get();
        if index >= self.capacity() {
            self.link_new_chunk(arena)?;
        }
        let tail = self.tail.get().expect("tail chunk just ensured");
        let slot_idx = mod_chunklen(index, C);
        // SAFETY: `tail` is a live chunk owned by this vector's arena.
        unsafe { tail.as_ref() }.slots[slot_idx].set(Some(value));
        self.n_elems.set(index + 1);
        Ok(index)
    }

    /// Walks to the chunk containing element `index`, `index / C` hops from
    /// the head. Returns `None` if `index >= len()`.
    pub(crate) fn get(&self, index: usize) -> Option<T> {
        if index >= self.n_elems.get() {
            return None;
        }
        let chunk = self.chunk_at(index / C)?;
        // SAFETY: `chunk` is a live chunk belonging to this vector.
        unsafe { chunk.as_ref() }.slots[mod_chunklen(index, C)].get()
    }

    /// Like [`ChunkedVec::get`] but bounds-checks against chunk *capacity*
    /// (`n_chunks * C`) rather than element count — used by the hash map to
    /// read bucket heads, which may be unpopulated slots within an
    /// otherwise-allocated chunk.
    pub(crate) fn get_bucket(&self, index: usize) -> Option<T> {
        if index >= self.capacity() {
            return None;
        }
        let chunk = self.chunk_at(index / C)?;
        // SAFETY: see `get`.
        unsafe { chunk.as_ref() }.slots[mod_chunklen(index, C)].get()
    }

    pub(crate) fn set_bucket(&self, index: usize, value: Option<T>) {
        if let Some(chunk) = self.chunk_at(index / C) {
            // SAFETY: see `get`.
            unsafe { chunk.as_ref() }.slots[mod_chunklen(index, C)].set(value);
        }
    }

    fn chunk_at(&self, hops: usize) -> Option<NonNull<Chunk<T, C>>> {
        let mut cur = self.head.get()?;
        for _ in 0..hops {
            // SAFETY: every chunk in the chain was allocated by this vector.
            cur = unsafe { cur.as_ref() }.next.get()?;
        }
        Some(cur)
    }

    /// Ensure at least one chunk exists (lazy bucket-vector init for a
    /// freshly-created table/array section).
    pub(crate) fn ensure_first_chunk(&self, arena: &Arena) -> Result<(), LsmlError> {
        if self.n_chunks.get() == 0 {
            self.link_new_chunk(arena)?;
        }
        Ok(())
    }

    /// Appends `n_chunks` fresh chunks to the tail, returning the chunk that
    /// was the tail *before* growth (the last chunk callers must stop
    /// relocation-scanning at, since everything after it is new and
    /// provably empty).
    pub(crate) fn grow(
        &self,
        arena: &Arena,
        n_new_chunks: usize,
    ) -> Result<Option<NonNull<Chunk<T, C>>>, LsmlError> {
        let old_tail = self.tail.get();
        let old_offset = arena.offset();
        for _ in 0..n_new_chunks {
            if self.link_new_chunk(arena).is_err() {
                arena.reset_to(old_offset);
                return Err(LsmlError::OutOfMemory);
            }
        }
        Ok(old_tail)
    }

    /// Iterate chunk-by-chunk from the head up to and including
    /// `stop_after` (or the whole chain if `stop_after` is `None`), yielding
    /// each chunk pointer. Used by rehash to scan only pre-existing chunks.
    pub(crate) fn chunks_until(
        &self,
        stop_after: Option<NonNull<Chunk<T, C>>>,
    ) -> impl Iterator<Item = NonNull<Chunk<T, C>>> {
        let mut cur = self.head.get();
        let stop_after = stop_after.map(|p| p.as_ptr() as usize);
        let mut done = false;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let chunk = cur?;
            if let Some(stop) = stop_after {
                if chunk.as_ptr() as usize == stop {
                    done = true;
                }
            }
            cur = unsafe { chunk.as_ref() }.next.get();
            Some(chunk)
        })
    }
}

/// `a mod b`, using the fast `& (b-1)` path when `b` is a power of two (the
/// recommended but not required case) and plain integer modulo otherwise.
pub(crate) fn mod_chunklen(a: usize, b: usize) -> usize {
    if b.is_power_of_two() {
        a & (b - 1)
    } else {
        a % b
    }
}

pub(crate) fn chunk_slot_get<T: Copy, const C: usize>(
    chunk: NonNull<Chunk<T, C>>,
    slot_idx: usize,
) -> Option<T> {
    // SAFETY: caller (within this crate) guarantees `chunk` is live.
    unsafe { chunk.as_ref() }.slots[slot_idx].get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_get_across_chunk_boundary() {
        let arena = Arena::new(4096);
        let vec: ChunkedVec<u32, 4> = ChunkedVec::new();
        for i in 0..10u32 {
            let idx = vec.push(&arena, i).unwrap();
            assert_eq!(idx as u32, i);
        }
        assert_eq!(vec.len(), 10);
        for i in 0..10u32 {
            assert_eq!(vec.get(i as usize), Some(i));
        }
        assert_eq!(vec.get(10), None);
    }
}
