//! The top-level container: one arena, one section map, one string
//! interner, tied together behind a single owning type (§4 "Entities",
//! "Data").
//!
//! Grounded on `lsml_data_t`/`lsml_data_create`/`lsml_data_clear`/
//! `lsml_data_copy` in `original_source/c/lsml.c`.

use std::ptr::NonNull;

use tracing::warn;

use crate::arena::Arena;
use crate::error::LsmlError;
use crate::hashmap::{HashMap, LoadFactor, Node};
use crate::intern::{hash_string, Interner, RegisteredString};
use crate::section::{SectionBody, SectionKind};

/// The chunk length used by every hash map and chunked vector inside a
/// `Data`. A single constant (rather than per-map tuning) matches the
/// original's one build-time `LSML_CHUNK_LEN`.
pub(crate) const CHUNK_LEN: usize = 8;

/// An opaque, `Copy` reference to a section living inside a particular
/// [`Data`]. Never outlives the `Data` it came from in practice (nothing
/// enforces that at the type level, matching the original's raw-pointer
/// section handles — callers are expected not to mix handles across data
/// instances, and every accessor takes `&Data` so a dangling reuse after
/// `clear()` cannot return wrong results, only `None`/an error).
#[derive(Clone, Copy)]
pub struct SectionHandle(NonNull<Node<SectionBody<CHUNK_LEN>>>);

impl PartialEq for SectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for SectionHandle {}

/// Top-level LSML document store: an arena, a map of sections keyed by
/// name, and a string interner, all owned together so that a whole
/// document can be reset or dropped as a unit.
pub struct Data {
    arena: Arena,
    sections: HashMap<SectionBody<CHUNK_LEN>, CHUNK_LEN>,
    strings: Interner,
    load_factor: LoadFactor,
}

impl Data {
    /// Creates an empty document backed by a freshly allocated arena of
    /// `capacity` bytes, using the default 0.8 load factor.
    pub fn new(capacity: usize) -> Self {
        Self::with_load_factor(capacity, LoadFactor::EightTenths)
    }

    pub fn with_load_factor(capacity: usize, load_factor: LoadFactor) -> Self {
        Data {
            arena: Arena::new(capacity),
            sections: HashMap::new(load_factor),
            strings: Interner::new(),
            load_factor,
        }
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn strings(&self) -> &Interner {
        &self.strings
    }

    pub(crate) fn load_factor(&self) -> LoadFactor {
        self.load_factor
    }

    /// Bytes of the arena currently in use.
    pub fn mem_usage(&self) -> usize {
        self.arena.offset()
    }

    pub fn mem_capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Discards every section, table entry, array element, and interned
    /// string, reclaiming the whole arena. The original rewinds its bump
    /// cursor to just past the embedded data header and leaves the map
    /// structures' bucket-vector pointers as-is, relying on nothing
    /// referencing freed memory post-reset. This implementation's maps hold
    /// their own `ChunkedVec` bucket-vector state outside the arena
    /// (Rust-side struct fields rather than an in-arena header), so a plain
    /// cursor rewind would leave those fields pointing at memory the next
    /// allocation is free to overwrite; `clear` therefore rebuilds every
    /// map from scratch alongside the cursor rewind. See `DESIGN.md`.
    pub fn clear(&mut self) {
        let capacity = self.arena.capacity();
        *self = Data::with_load_factor(capacity, self.load_factor);
    }

    /// Interns `s`, then creates a new, empty section of `kind` under that
    /// name. Fails with `SectionNameReused` if the name is already taken.
    pub fn add_section(&self, name: &str, kind: SectionKind) -> Result<SectionHandle, LsmlError> {
        let key = self.strings.intern_copy(&self.arena, name.as_bytes())?;
        self.add_section_reg(key, kind)
    }

    /// As `add_section`, but takes an already-registered name — used by the
    /// parser, which has already interned the section name via the
    /// temporary-string protocol before it knows whether the name is unique
    /// (original: `lsml_data_add_section_internal`).
    pub(crate) fn add_section_reg(&self, key: RegisteredString, kind: SectionKind) -> Result<SectionHandle, LsmlError> {
        self.sections.rehash_if_needed(&self.arena)?;
        if self.sections.get_by_reg(key).is_some() {
            return Err(LsmlError::SectionNameReused);
        }
        let body = SectionBody::new(kind, &self.arena, self.load_factor)?;
        let (node, _created) = self.sections.get_or_create(&self.arena, key, || body)?;
        Ok(SectionHandle(node))
    }

    pub fn get_section(&self, name: &str) -> Option<SectionHandle> {
        let hash = hash_string(name.as_bytes());
        self.sections
            .get_by_bytes(hash, name.as_bytes())
            .map(SectionHandle)
    }

    pub fn section_name(&self, handle: SectionHandle) -> &str {
        // SAFETY: `handle` wraps a node owned by `self.sections`.
        self.resolve(unsafe { handle.0.as_ref() }.key)
    }

    pub fn section_kind(&self, handle: SectionHandle) -> SectionKind {
        // SAFETY: see `section_name`.
        unsafe { handle.0.as_ref() }.value.kind()
    }

    pub fn sections(&self) -> impl Iterator<Item = SectionHandle> + '_ {
        self.sections.iter().map(SectionHandle)
    }

    fn section_body(&self, handle: SectionHandle) -> &SectionBody<CHUNK_LEN> {
        // SAFETY: see `section_name`.
        &unsafe { handle.0.as_ref() }.value
    }

    // -- Table sections --------------------------------------------------

    pub fn table_len(&self, handle: SectionHandle) -> Result<usize, LsmlError> {
        Ok(self.section_body(handle).as_table()?.len())
    }

    pub fn add_table_entry(&self, handle: SectionHandle, key: &str, value: &str) -> Result<(), LsmlError> {
        let k = self.strings.intern_copy(&self.arena, key.as_bytes())?;
        let v = self.strings.intern_copy(&self.arena, value.as_bytes())?;
        self.section_body(handle).as_table()?.add_entry(&self.arena, k, v)
    }

    /// As `add_table_entry`, but takes already-registered strings — used by
    /// the parser (original: `lsml_table_add_entry_internal`).
    pub(crate) fn add_table_entry_reg(
        &self,
        handle: SectionHandle,
        key: RegisteredString,
        value: RegisteredString,
    ) -> Result<(), LsmlError> {
        self.section_body(handle).as_table()?.add_entry(&self.arena, key, value)
    }

    /// Looks up a table entry by an already-registered key, for the
    /// parser's key-reuse check (original: `lsml_hm_get_node_reg`).
    pub(crate) fn table_get_reg(&self, handle: SectionHandle, key: RegisteredString) -> Result<Option<RegisteredString>, LsmlError> {
        Ok(self.section_body(handle).as_table()?.get(key))
    }

    pub fn table_get(&self, handle: SectionHandle, key: &str) -> Result<Option<&str>, LsmlError> {
        let hash = hash_string(key.as_bytes());
        let table = self.section_body(handle).as_table()?;
        Ok(table.get_by_bytes(hash, key.as_bytes()).map(|v| self.resolve(v)))
    }

    pub fn table_entries(&self, handle: SectionHandle) -> Result<impl Iterator<Item = (&str, &str)> + '_, LsmlError> {
        let table = self.section_body(handle).as_table()?;
        Ok(table.iter().map(move |(k, v)| (self.resolve(k), self.resolve(v))))
    }

    // -- Array sections ---------------------------------------------------

    pub fn array_len(&self, handle: SectionHandle) -> Result<usize, LsmlError> {
        Ok(self.section_body(handle).as_array()?.len())
    }

    pub fn array_append(&self, handle: SectionHandle, value: &str, newrow: bool) -> Result<usize, LsmlError> {
        let v = self.strings.intern_copy(&self.arena, value.as_bytes())?;
        self.section_body(handle).as_array()?.append(&self.arena, v, newrow)
    }

    /// As `array_append`, but takes an already-registered value — used by
    /// the parser (original: `lsml_array_add_entry_internal`).
    pub(crate) fn array_append_reg(&self, handle: SectionHandle, value: RegisteredString, newrow: bool) -> Result<usize, LsmlError> {
        self.section_body(handle).as_array()?.append(&self.arena, value, newrow)
    }

    pub fn array_get(&self, handle: SectionHandle, index: usize) -> Result<Option<&str>, LsmlError> {
        let array = self.section_body(handle).as_array()?;
        Ok(array.get(index).map(|v| self.resolve(v)))
    }

    pub fn array_get_2d(&self, handle: SectionHandle, row: usize, col: usize) -> Result<Option<&str>, LsmlError> {
        let array = self.section_body(handle).as_array()?;
        Ok(array.get_2d(row, col).map(|v| self.resolve(v)))
    }

    pub fn array_size_2d(&self, handle: SectionHandle, jagged: bool) -> Result<(usize, usize), LsmlError> {
        Ok(self.section_body(handle).as_array()?.size_2d(jagged))
    }

    pub fn array_get_many(
        &self,
        handle: SectionHandle,
        start_index: usize,
        n_elems: usize,
    ) -> Result<Option<Vec<&str>>, LsmlError> {
        let array = self.section_body(handle).as_array()?;
        Ok(array
            .get_many(start_index, n_elems)
            .map(|v| v.into_iter().map(|s| self.resolve(s)).collect()))
    }

    pub fn array_iter(&self, handle: SectionHandle) -> Result<impl Iterator<Item = &str> + '_, LsmlError> {
        let array = self.section_body(handle).as_array()?;
        Ok(array.iter().map(move |v| self.resolve(v)))
    }

    /// Absolute element indices where a new row begins (row 0's sentinel
    /// excluded). Used by the writer to place row-break newlines while
    /// emitting an array's elements in flat order.
    pub(crate) fn array_row_start_indices(&self, handle: SectionHandle) -> Result<Vec<usize>, LsmlError> {
        Ok(self.section_body(handle).as_array()?.row_start_indices())
    }

    // -- Strings ------------------------------------------------------------

    /// The only safe way to view a [`RegisteredString`]'s bytes: the
    /// returned `&str`'s lifetime is tied to `&self`, so it cannot outlive
    /// this `Data` (or survive a `clear()`, which takes `&mut self`).
    pub fn resolve(&self, s: RegisteredString) -> &str {
        // SAFETY: every `RegisteredString` handed out by this `Data`'s
        // interner holds valid UTF-8 input bytes (the parser and public API
        // both only ever intern `&str`/validated-UTF-8 input).
        unsafe { std::str::from_utf8_unchecked(s.as_bytes_raw()) }
    }

    pub(crate) fn intern(&self, bytes: &[u8]) -> Result<RegisteredString, LsmlError> {
        self.strings.intern_copy(&self.arena, bytes)
    }

    /// Appends every section, table entry, and array element of `src` into
    /// `self` (§4.9). The original's own body is a non-functional stub;
    /// this behavior is defined fresh from the original header's doc
    /// comment ("this appends to dest, so call `clear(dest)` first if you
    /// want no conflicts") — see `DESIGN.md` and `SPEC_FULL.md` §4.9.
    pub fn merge_from(&self, src: &Data, overwrite_conflicts: bool) -> Result<(), LsmlError> {
        for src_handle in src.sections() {
            let name = src.section_name(src_handle);
            let kind = src.section_kind(src_handle);
            let dest_handle = match self.add_section(name, kind) {
                Ok(h) => h,
                Err(LsmlError::SectionNameReused) => match self.get_section(name) {
                    Some(h) if self.section_kind(h) == kind => h,
                    Some(_) => {
                        warn!(section = name, "skipping merge: section kind mismatch");
                        continue;
                    }
                    None => return Err(LsmlError::InvalidData),
                },
                Err(e) => return Err(e),
            };
            match kind {
                SectionKind::Table => {
                    for (key, value) in src.table_entries(src_handle)? {
                        let k = self.intern(key.as_bytes())?;
                        let v = self.intern(value.as_bytes())?;
                        let table = self.section_body(dest_handle).as_table()?;
                        match table.add_entry(&self.arena, k, v) {
                            Ok(()) => {}
                            Err(LsmlError::TableKeyReused) if overwrite_conflicts => {
                                table.add_or_overwrite_entry(&self.arena, k, v)?;
                            }
                            Err(LsmlError::TableKeyReused) => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
                SectionKind::Array => {
                    let src_array = src.section_body(src_handle).as_array()?;
                    let dest_array = self.section_body(dest_handle).as_array()?;
                    let mut row_starts = src_array.row_start_indices().into_iter().peekable();
                    for i in 0..src_array.len() {
                        let value = src_array.get(i).expect("index within bounds");
                        let newrow = if row_starts.peek() == Some(&i) {
                            row_starts.next();
                            true
                        } else {
                            false
                        };
                        let v = self.intern(src.resolve(value).as_bytes())?;
                        dest_array.append(&self.arena, v, newrow)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_query_table_section() {
        let data = Data::new(1 << 16);
        let h = data.add_section("server", SectionKind::Table).unwrap();
        data.add_table_entry(h, "host", "localhost").unwrap();
        data.add_table_entry(h, "port", "8080").unwrap();
        assert_eq!(data.table_get(h, "host").unwrap(), Some("localhost"));
        assert_eq!(data.table_get(h, "missing").unwrap(), None);
        assert_eq!(
            data.add_section("server", SectionKind::Table).unwrap_err(),
            LsmlError::SectionNameReused
        );
    }

    #[test]
    fn add_and_query_array_section() {
        let data = Data::new(1 << 16);
        let h = data.add_section("tags", SectionKind::Array).unwrap();
        data.array_append(h, "red", false).unwrap();
        data.array_append(h, "green", false).unwrap();
        data.array_append(h, "blue", true).unwrap();
        assert_eq!(data.array_len(h).unwrap(), 3);
        assert_eq!(data.array_get(h, 2).unwrap(), Some("blue"));
    }

    #[test]
    fn clear_resets_everything() {
        let mut data = Data::new(1 << 16);
        data.add_section("s", SectionKind::Table).unwrap();
        assert_eq!(data.section_count(), 1);
        data.clear();
        assert_eq!(data.section_count(), 0);
        assert_eq!(data.mem_usage(), 0);
    }

    #[test]
    fn merge_from_respects_overwrite_flag() {
        let src = Data::new(1 << 16);
        let sh = src.add_section("server", SectionKind::Table).unwrap();
        src.add_table_entry(sh, "host", "from-src").unwrap();

        let dest = Data::new(1 << 16);
        let dh = dest.add_section("server", SectionKind::Table).unwrap();
        dest.add_table_entry(dh, "host", "from-dest").unwrap();

        dest.merge_from(&src, false).unwrap();
        assert_eq!(dest.table_get(dh, "host").unwrap(), Some("from-dest"));

        dest.merge_from(&src, true).unwrap();
        assert_eq!(dest.table_get(dh, "host").unwrap(), Some("from-src"));
    }
}
