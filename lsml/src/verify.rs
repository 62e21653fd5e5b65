//! Reference verification and template matching (§4.8). Declared in the
//! original's `lsml.h` with documentation but never implemented anywhere in
//! the provided `lsml.c` — no function body exists to port. Behavior here
//! is derived purely from the header's doc comments; see `DESIGN.md`.
//!
//! `bitflags` is the idiomatic analogue of the original's `LSML_MATCH_*`
//! `int` bitmask constants (`#define LSML_MATCH_SECTIONS (1<<0)`, etc.).

use bitflags::bitflags;

use crate::data::Data;
use crate::error::LsmlError;
use crate::section::SectionKind;
use crate::value::as_reference;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MatchFlags: u32 {
        const SECTIONS       = 1 << 0;
        const KEYS           = 1 << 1;
        const LENGTHS        = 1 << 2;
        const ROWS           = 1 << 3;
        const COLS           = 1 << 4;
        const TABLE_VALUES   = 1 << 5;
        const ARRAY_VALUES   = 1 << 6;
        const ARRAY_VALUES_2D = 1 << 7;

        const LOOKUP_1D = Self::SECTIONS.bits() | Self::KEYS.bits() | Self::LENGTHS.bits();
        const LOOKUP_2D = Self::SECTIONS.bits() | Self::KEYS.bits() | Self::ROWS.bits() | Self::COLS.bits();
        const LOOKUP    = Self::SECTIONS.bits() | Self::KEYS.bits() | Self::LENGTHS.bits() | Self::ROWS.bits() | Self::COLS.bits();
        const ALL       = Self::SECTIONS.bits() | Self::KEYS.bits() | Self::LENGTHS.bits() | Self::ROWS.bits()
            | Self::COLS.bits() | Self::TABLE_VALUES.bits() | Self::ARRAY_VALUES.bits() | Self::ARRAY_VALUES_2D.bits();
    }
}

/// Walks every table value and array element in `data`; for any value whose
/// content parses as a reference (§4.7), resolves the named section and
/// checks it exists with a compatible kind. Non-reference-shaped values are
/// skipped, not treated as failures.
pub fn verify_references(data: &Data) -> Result<bool, LsmlError> {
    for handle in data.sections() {
        match data.section_kind(handle) {
            SectionKind::Table => {
                for (_, value) in data.table_entries(handle)? {
                    if !reference_resolves(data, value) {
                        return Ok(false);
                    }
                }
            }
            SectionKind::Array => {
                for value in data.array_iter(handle)? {
                    if !reference_resolves(data, value) {
                        return Ok(false);
                    }
                }
            }
        }
    }
    Ok(true)
}

fn reference_resolves(data: &Data, value: &str) -> bool {
    let reference = match as_reference(value) {
        Ok(r) => r,
        Err(_) => return true, // not reference-shaped: nothing to check
    };
    let expected_kind = match reference.kind {
        crate::value::ReferenceKind::Table => SectionKind::Table,
        crate::value::ReferenceKind::Array => SectionKind::Array,
    };
    match data.get_section(reference.section_name) {
        Some(target) => data.section_kind(target) == expected_kind,
        None => false,
    }
}

/// Compares `data` against `template` under `flags`, walking sections in
/// `data`'s own iteration order. Returns `(matched, first_mismatched_section)`
/// — on the first mismatch, returns `false` and the template section name
/// that failed to find a match; a `SECTIONS` failure short-circuits the
/// remaining checks for that section.
/// Expands "implies" relationships from §4.8 into literal bits, so a caller
/// who only sets e.g. `TABLE_VALUES` still gets the `KEYS`/`SECTIONS` checks
/// that value comparison depends on.
fn effective_flags(flags: MatchFlags) -> MatchFlags {
    let mut f = flags;
    if f.contains(MatchFlags::TABLE_VALUES) {
        f |= MatchFlags::KEYS;
    }
    if f.contains(MatchFlags::ARRAY_VALUES) {
        f |= MatchFlags::LENGTHS;
    }
    if f.contains(MatchFlags::ARRAY_VALUES_2D) {
        f |= MatchFlags::ROWS | MatchFlags::COLS;
    }
    if f.intersects(MatchFlags::KEYS | MatchFlags::LENGTHS | MatchFlags::ROWS | MatchFlags::COLS) {
        f |= MatchFlags::SECTIONS;
    }
    f
}

pub fn verify_matches_template(
    data: &Data,
    template: &Data,
    flags: MatchFlags,
) -> Result<(bool, Option<String>), LsmlError> {
    let flags = effective_flags(flags);
    for t_handle in template.sections() {
        let name = template.section_name(t_handle);
        let kind = template.section_kind(t_handle);

        if !flags.contains(MatchFlags::SECTIONS) {
            continue;
        }
        let d_handle = match data.get_section(name) {
            Some(h) if data.section_kind(h) == kind => h,
            _ => return Ok((false, Some(name.to_string()))),
        };

        match kind {
            SectionKind::Table => {
                if flags.intersects(MatchFlags::KEYS | MatchFlags::TABLE_VALUES) {
                    for (key, t_value) in template.table_entries(t_handle)? {
                        match data.table_get(d_handle, key)? {
                            None => return Ok((false, Some(name.to_string()))),
                            Some(d_value) => {
                                if flags.contains(MatchFlags::TABLE_VALUES) && d_value != t_value {
                                    return Ok((false, Some(name.to_string())));
                                }
                            }
                        }
                    }
                }
            }
            SectionKind::Array => {
                if flags.contains(MatchFlags::LENGTHS) || flags.contains(MatchFlags::ARRAY_VALUES) {
                    let t_len = template.array_len(t_handle)?;
                    let d_len = data.array_len(d_handle)?;
                    if d_len < t_len {
                        return Ok((false, Some(name.to_string())));
                    }
                    if flags.contains(MatchFlags::ARRAY_VALUES) {
                        for i in 0..t_len {
                            if data.array_get(d_handle, i)? != template.array_get(t_handle, i)? {
                                return Ok((false, Some(name.to_string())));
                            }
                        }
                    }
                }
                if flags.contains(MatchFlags::ROWS)
                    || flags.contains(MatchFlags::COLS)
                    || flags.contains(MatchFlags::ARRAY_VALUES_2D)
                {
                    let (t_rows, t_cols) = template.array_size_2d(t_handle, false)?;
                    let (d_rows, d_cols) = data.array_size_2d(d_handle, false)?;
                    if flags.contains(MatchFlags::ROWS) && d_rows != t_rows {
                        return Ok((false, Some(name.to_string())));
                    }
                    if flags.contains(MatchFlags::COLS) && d_cols != t_cols {
                        return Ok((false, Some(name.to_string())));
                    }
                    if flags.contains(MatchFlags::ARRAY_VALUES_2D) {
                        for row in 0..t_rows {
                            for col in 0..t_cols {
                                if data.array_get_2d(d_handle, row, col)? != template.array_get_2d(t_handle, row, col)?
                                {
                                    return Ok((false, Some(name.to_string())));
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    Ok((true, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionKind;

    #[test]
    fn reference_verification_catches_dangling_target() {
        let data = Data::new(1 << 16);
        let h = data.add_section("aliases", SectionKind::Table).unwrap();
        data.add_table_entry(h, "primary", "{}server").unwrap();
        assert_eq!(verify_references(&data).unwrap(), false);

        data.add_section("server", SectionKind::Table).unwrap();
        assert_eq!(verify_references(&data).unwrap(), true);
    }

    #[test]
    fn non_reference_values_are_ignored() {
        let data = Data::new(1 << 16);
        let h = data.add_section("server", SectionKind::Table).unwrap();
        data.add_table_entry(h, "host", "localhost").unwrap();
        assert_eq!(verify_references(&data).unwrap(), true);
    }

    #[test]
    fn template_matching_checks_keys_and_values() {
        let template = Data::new(1 << 16);
        let th = template.add_section("server", SectionKind::Table).unwrap();
        template.add_table_entry(th, "host", "localhost").unwrap();

        let data = Data::new(1 << 16);
        let dh = data.add_section("server", SectionKind::Table).unwrap();
        data.add_table_entry(dh, "host", "example.com").unwrap();

        let (ok, _) = verify_matches_template(&data, &template, MatchFlags::LOOKUP).unwrap();
        assert!(ok);

        let (ok, bad) = verify_matches_template(&data, &template, MatchFlags::TABLE_VALUES).unwrap();
        assert!(!ok);
        assert_eq!(bad.as_deref(), Some("server"));
    }
}
