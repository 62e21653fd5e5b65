//! String interning: deduplicates variable-length byte strings to a unique,
//! pointer-identity-comparable [`RegisteredString`] (§4.4).
//!
//! Grounded on `lsml_reg_str_t`/`lsml_hash_string`/`lsml_data_register_string`
//! in `original_source/c/lsml.c`, and on the intern-by-pointer-equality
//! pattern in `datadog-profiling::collections::string_table::StringTable`
//! (arena-backed bytes, a `HashSet`-style dedup map keyed by content, a
//! cheap `Copy` handle for everything downstream).

use std::ptr::NonNull;

use crate::arena::Arena;
use crate::error::LsmlError;
use crate::hashmap::{HashMap, LoadFactor};

/// An interned, deduplicated byte string living inside a [`crate::Data`]'s
/// arena. Two `RegisteredString`s with equal byte content are *the same
/// object* (`==` compares pointer identity, matching §3 "Registered
/// string"). Has no lifetime parameter by design — see
/// `Data::resolve` for the only safe way to view its bytes, which ties the
/// borrow to the owning `Data`.
#[derive(Clone, Copy)]
pub struct RegisteredString {
    ptr: NonNull<u8>,
    len: u32,
    hash: u32,
}

impl RegisteredString {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn hash(&self) -> u32 {
        self.hash
    }

    /// # Safety (informal)
    /// Valid for as long as the owning `Data`'s arena is alive; callers
    /// within this crate only ever invoke this while holding a live
    /// reference to that `Data`.
    pub(crate) fn as_bytes_raw(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len as usize) }
    }
}

impl PartialEq for RegisteredString {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}
impl Eq for RegisteredString {}

impl std::fmt::Debug for RegisteredString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredString")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// The exact FNV-like recurrence from `lsml_hash_string`: seed with the
/// length, then fold in bytes from the *last* to the *first*. This
/// recurrence is fixed forever, since hashes are cached in registered
/// strings — changing it would silently corrupt any serialized/cached hash.
pub(crate) fn hash_string(bytes: &[u8]) -> u32 {
    let mut h: u32 = bytes.len() as u32;
    for i in (0..bytes.len()).rev() {
        let b = bytes[i] as u32;
        h ^= (h << 5).wrapping_add(h >> 2).wrapping_add(b);
    }
    h
}

pub(crate) struct Interner {
    map: HashMap<(), 8>,
}

impl Interner {
    pub(crate) fn new() -> Self {
        Interner {
            map: HashMap::new(LoadFactor::EightTenths),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    fn find_existing(&self, hash: u32, bytes: &[u8]) -> Option<RegisteredString> {
        self.map
            .get_by_bytes(hash, bytes)
            // SAFETY: node returned by this map is live for the map's lifetime.
            .map(|node| unsafe { node.as_ref() }.key)
    }

    /// Copy path (§4.4): allocate `len + 1` bytes, copy the input in, and
    /// append a NUL.
    pub(crate) fn intern_copy(&self, arena: &Arena, bytes: &[u8]) -> Result<RegisteredString, LsmlError> {
        let hash = hash_string(bytes);
        if let Some(existing) = self.find_existing(hash, bytes) {
            return Ok(existing);
        }
        let dst = arena.alloc_bytes(bytes.len() + 1, 1)?;
        // SAFETY: `dst` is `bytes.len() + 1` freshly bump-allocated bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len());
            *dst.as_ptr().add(bytes.len()) = 0;
        }
        let reg = RegisteredString {
            ptr: dst,
            len: bytes.len() as u32,
            hash,
        };
        self.map.get_or_create(arena, reg, || ())?;
        self.map.rehash_if_needed(arena)?;
        Ok(reg)
    }

    /// Move path (§4.4): `ptr..ptr+len` must already sit at the arena's
    /// current cursor, immediately followed by a NUL byte — the shape a
    /// [`crate::parser::string_lexer::TempString`] builds in place. Returns
    /// whichever `RegisteredString` now represents this content; if that is
    /// not the one built at `ptr` (a duplicate already existed), the caller
    /// is responsible for discarding the tentative bytes by rewinding the
    /// arena, exactly as `lsml_register_temp_string` does.
    pub(crate) fn intern_move(
        &self,
        arena: &Arena,
        ptr: NonNull<u8>,
        len: usize,
    ) -> Result<RegisteredString, LsmlError> {
        // SAFETY: caller guarantees `ptr..ptr+len` was just written by the
        // temporary-string builder and is still live arena memory.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) };
        let hash = hash_string(bytes);
        if let Some(existing) = self.find_existing(hash, bytes) {
            return Ok(existing);
        }
        let reg = RegisteredString {
            ptr,
            len: len as u32,
            hash,
        };
        self.map.get_or_create(arena, reg, || ())?;
        self.map.rehash_if_needed(arena)?;
        Ok(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_equal_strings_dedupe_to_same_object() {
        let arena = Arena::new(1 << 16);
        let interner = Interner::new();
        let a = interner.intern_copy(&arena, b"hello").unwrap();
        let b = interner.intern_copy(&arena, b"hello").unwrap();
        assert_eq!(a, b);
        let c = interner.intern_copy(&arena, b"world").unwrap();
        assert_ne!(a, c);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn hash_matches_reference_recurrence() {
        fn reference(bytes: &[u8]) -> u32 {
            let mut h: u32 = bytes.len() as u32;
            for i in (0..bytes.len()).rev() {
                h ^= (h << 5).wrapping_add(h >> 2).wrapping_add(bytes[i] as u32);
            }
            h
        }
        assert_eq!(hash_string(b"abc"), reference(b"abc"));
        assert_eq!(hash_string(b""), 0);
    }
}
