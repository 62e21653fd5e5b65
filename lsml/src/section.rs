//! Section bodies: a table (key → value map) or an array (ordered list with
//! row breaks), per §4.5 "Section model".
//!
//! Grounded on `lsml_section_t`/`lsml_table_entry_add`/`lsml_array_push`/
//! `lsml_array_get_2d`/`lsml_array_get_2d_size` in `original_source/c/lsml.c`.
//! The original tags a section's kind with a null-vs-non-null map pointer;
//! here the kind is a plain two-variant enum, which the compiler, rather
//! than a comment, keeps exhaustive.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::arena::Arena;
use crate::chunked::ChunkedVec;
use crate::error::LsmlError;
use crate::hashmap::{HashMap, LoadFactor};
use crate::intern::RegisteredString;

/// Which of the two section shapes a section is. Exposed publicly so
/// callers of `Data::add_section` can request one without reaching into
/// `SectionBody`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Table,
    Array,
}

pub(crate) struct TableSection<const C: usize = 8> {
    entries: HashMap<Cell<RegisteredString>, C>,
}

impl<const C: usize> TableSection<C> {
    fn new(load_factor: LoadFactor) -> Self {
        TableSection {
            entries: HashMap::new(load_factor),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Lazily initializes the bucket vector on first entry (handled inside
    /// `HashMap::get_or_create`); rejects a key that is already present.
    pub(crate) fn add_entry(
        &self,
        arena: &Arena,
        key: RegisteredString,
        value: RegisteredString,
    ) -> Result<(), LsmlError> {
        self.entries.rehash_if_needed(arena)?;
        let (_, created) = self.entries.get_or_create(arena, key, || Cell::new(value))?;
        if !created {
            return Err(LsmlError::TableKeyReused);
        }
        Ok(())
    }

    /// Insert-or-overwrite, used by `Data::merge_from` when
    /// `overwrite_conflicts` is set (§4.9).
    pub(crate) fn add_or_overwrite_entry(
        &self,
        arena: &Arena,
        key: RegisteredString,
        value: RegisteredString,
    ) -> Result<(), LsmlError> {
        self.entries.rehash_if_needed(arena)?;
        let (node, _created) = self.entries.get_or_create(arena, key, || Cell::new(value))?;
        // SAFETY: node returned by this map is a live entry of this section.
        unsafe { node.as_ref() }.value.set(value);
        Ok(())
    }

    pub(crate) fn get(&self, key: RegisteredString) -> Option<RegisteredString> {
        // SAFETY: node returned by this map is a live entry of this section.
        self.entries.get_by_reg(key).map(|n| unsafe { n.as_ref() }.value.get())
    }

    pub(crate) fn get_by_bytes(&self, hash: u32, bytes: &[u8]) -> Option<RegisteredString> {
        // SAFETY: see `get`.
        self.entries
            .get_by_bytes(hash, bytes)
            .map(|n| unsafe { n.as_ref() }.value.get())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (RegisteredString, RegisteredString)> + '_ {
        // SAFETY: see `get`.
        self.entries.iter().map(|n| {
            let r = unsafe { n.as_ref() };
            (r.key, r.value.get())
        })
    }
}

struct RowNode {
    next: Cell<Option<NonNull<RowNode>>>,
    /// Absolute element index at which this row begins.
    index: usize,
}

pub(crate) struct ArraySection<const C: usize = 8> {
    elements: ChunkedVec<RegisteredString, C>,
    rows_head: Cell<Option<NonNull<RowNode>>>,
    rows_tail: Cell<Option<NonNull<RowNode>>>,
    n_rows: Cell<usize>,
}

impl<const C: usize> ArraySection<C> {
    fn new() -> Self {
        ArraySection {
            elements: ChunkedVec::new(),
            rows_head: Cell::new(None),
            rows_tail: Cell::new(None),
            n_rows: Cell::new(0),
        }
    }

    fn push_row_start(&self, arena: &Arena, index: usize) -> Result<(), LsmlError> {
        let node = arena.alloc(RowNode {
            next: Cell::new(None),
            index,
        })?;
        match self.rows_tail.get() {
            None => self.rows_head.set(Some(node)),
            // SAFETY: `tail` was linked by a prior call on this same section.
            Some(tail) => unsafe { tail.as_ref() }.next.set(Some(node)),
        }
        self.rows_tail.set(Some(node));
        self.n_rows.set(self.n_rows.get() + 1);
        Ok(())
    }

    /// The sentinel row-start node ("row 0 starts at element 0"), written
    /// once at section creation — *not* counted as a row break itself.
    fn init_sentinel_row(&self, arena: &Arena) -> Result<(), LsmlError> {
        self.push_row_start(arena, 0)
    }

    pub(crate) fn len(&self) -> usize {
        self.elements.len()
    }

    /// Appends `value`; `newrow` starts a new row at this element unless
    /// this is the very first element (which always belongs to row 0's
    /// sentinel, already recorded by `init_sentinel_row`).
    pub(crate) fn append(
        &self,
        arena: &Arena,
        value: RegisteredString,
        newrow: bool,
    ) -> Result<usize, LsmlError> {
        let current_count = self.elements.len();
        let index = self.elements.push(arena, value)?;
        if newrow && current_count > 0 {
            self.push_row_start(arena, index)?;
        }
        Ok(index)
    }

    pub(crate) fn get(&self, index: usize) -> Option<RegisteredString> {
        self.elements.get(index)
    }

    /// Returns `(this row's start index, next row's start index if any)`.
    fn row_bounds(&self, row: usize) -> Option<(usize, Option<usize>)> {
        let mut cur = self.rows_head.get();
        let mut i = 0;
        while let Some(node) = cur {
            // SAFETY: row nodes are arena-owned for this section's lifetime.
            let node_ref = unsafe { node.as_ref() };
            if i == row {
                let next = node_ref.next.get();
                // SAFETY: see above.
                let next_start = next.map(|n| unsafe { n.as_ref() }.index);
                return Some((node_ref.index, next_start));
            }
            cur = node_ref.next.get();
            i += 1;
        }
        None
    }

    pub(crate) fn get_2d(&self, row: usize, col: usize) -> Option<RegisteredString> {
        let (start, next_start) = self.row_bounds(row)?;
        let abs = start + col;
        if let Some(next) = next_start {
            if abs >= next {
                return None;
            }
        }
        self.elements.get(abs)
    }

    /// `(row_count, column_count)`; `jagged` selects max- vs. min-width
    /// across rows. Zero rows report columns = 0 (jagged) or the total
    /// element count (rectangular), per §4.5.
    pub(crate) fn size_2d(&self, jagged: bool) -> (usize, usize) {
        let n_rows = self.n_rows.get();
        if n_rows == 0 {
            return (0, if jagged { 0 } else { self.elements.len() });
        }
        let total = self.elements.len();
        let mut cur = self.rows_head.get();
        let mut best: Option<usize> = None;
        while let Some(node) = cur {
            // SAFETY: see `row_bounds`.
            let node_ref = unsafe { node.as_ref() };
            let next = node_ref.next.get();
            let this_len = match next {
                // SAFETY: see `row_bounds`.
                Some(n) => unsafe { n.as_ref() }.index - node_ref.index,
                None => total - node_ref.index,
            };
            best = Some(match best {
                None => this_len,
                Some(b) => {
                    if jagged {
                        b.max(this_len)
                    } else {
                        b.min(this_len)
                    }
                }
            });
            cur = next;
        }
        (n_rows, best.unwrap_or(0))
    }

    /// Up to `n_elems` consecutive elements starting at `start_index`,
    /// truncated at the array's length. `start_index >= len()` is "not
    /// found" (§4.5 "Array get-many").
    pub(crate) fn get_many(&self, start_index: usize, n_elems: usize) -> Option<Vec<RegisteredString>> {
        let len = self.elements.len();
        if start_index >= len {
            return None;
        }
        let end = (start_index + n_elems).min(len);
        Some((start_index..end).filter_map(|i| self.elements.get(i)).collect())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = RegisteredString> + '_ {
        (0..self.elements.len()).filter_map(move |i| self.elements.get(i))
    }

    /// Absolute indices of every row start *except* the row-0 sentinel —
    /// exactly the indices originally pushed with `newrow = true`. Used to
    /// replay a source array's row structure onto a destination array.
    pub(crate) fn row_start_indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = self.rows_head.get();
        let mut first = true;
        while let Some(node) = cur {
            // SAFETY: row nodes are arena-owned for this section's lifetime.
            let node_ref = unsafe { node.as_ref() };
            if !first {
                out.push(node_ref.index);
            }
            first = false;
            cur = node_ref.next.get();
        }
        out
    }
}

/// A section's payload — the value half of the `Data`-level section map's
/// `Node<SectionBody>`.
pub(crate) enum SectionBody<const C: usize = 8> {
    Table(TableSection<C>),
    Array(ArraySection<C>),
}

impl<const C: usize> SectionBody<C> {
    pub(crate) fn new(kind: SectionKind, arena: &Arena, load_factor: LoadFactor) -> Result<Self, LsmlError> {
        Ok(match kind {
            SectionKind::Table => SectionBody::Table(TableSection::new(load_factor)),
            SectionKind::Array => {
                let array = ArraySection::new();
                array.init_sentinel_row(arena)?;
                SectionBody::Array(array)
            }
        })
    }

    pub(crate) fn kind(&self) -> SectionKind {
        match self {
            SectionBody::Table(_) => SectionKind::Table,
            SectionBody::Array(_) => SectionKind::Array,
        }
    }

    pub(crate) fn as_table(&self) -> Result<&TableSection<C>, LsmlError> {
        match self {
            SectionBody::Table(t) => Ok(t),
            SectionBody::Array(_) => Err(LsmlError::SectionType),
        }
    }

    pub(crate) fn as_array(&self) -> Result<&ArraySection<C>, LsmlError> {
        match self {
            SectionBody::Array(a) => Ok(a),
            SectionBody::Table(_) => Err(LsmlError::SectionType),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            SectionBody::Table(t) => t.len(),
            SectionBody::Array(a) => a.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    fn reg(arena: &Arena, interner: &Interner, s: &str) -> RegisteredString {
        interner.intern_copy(arena, s.as_bytes()).unwrap()
    }

    #[test]
    fn table_rejects_duplicate_keys() {
        let arena = Arena::new(1 << 16);
        let interner = Interner::new();
        let body = SectionBody::<8>::new(SectionKind::Table, &arena, LoadFactor::EightTenths).unwrap();
        let table = body.as_table().unwrap();
        let k = reg(&arena, &interner, "color");
        let v1 = reg(&arena, &interner, "red");
        let v2 = reg(&arena, &interner, "blue");
        table.add_entry(&arena, k, v1).unwrap();
        assert_eq!(table.add_entry(&arena, k, v2), Err(LsmlError::TableKeyReused));
        assert_eq!(table.get(k), Some(v1));
    }

    #[test]
    fn array_rows_and_2d_access() {
        let arena = Arena::new(1 << 16);
        let interner = Interner::new();
        let body = SectionBody::<8>::new(SectionKind::Array, &arena, LoadFactor::EightTenths).unwrap();
        let array = body.as_array().unwrap();
        // Row 0: "a", "b"; row 1: "c"; row 2: "d", "e", "f"
        array.append(&arena, reg(&arena, &interner, "a"), false).unwrap();
        array.append(&arena, reg(&arena, &interner, "b"), false).unwrap();
        array.append(&arena, reg(&arena, &interner, "c"), true).unwrap();
        array.append(&arena, reg(&arena, &interner, "d"), true).unwrap();
        array.append(&arena, reg(&arena, &interner, "e"), false).unwrap();
        array.append(&arena, reg(&arena, &interner, "f"), false).unwrap();

        let (rows, cols) = array.size_2d(true);
        assert_eq!(rows, 3);
        assert_eq!(cols, 3);
        let (_, cols_min) = array.size_2d(false);
        assert_eq!(cols_min, 1);

        assert_eq!(array.get_2d(1, 0), Some(reg(&arena, &interner, "c")));
        assert_eq!(array.get_2d(2, 2), Some(reg(&arena, &interner, "f")));
        assert_eq!(array.get_2d(1, 1), None);
        assert_eq!(array.get_2d(3, 0), None);

        let many = array.get_many(1, 3).unwrap();
        assert_eq!(many.len(), 3);
        assert_eq!(many[0], reg(&arena, &interner, "b"));
    }
}
