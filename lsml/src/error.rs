//! Error kinds returned by every fallible LSML operation.
//!
//! Grounded on `bxmlrs::nom_parser::ParseError`: a flat, `thiserror`-derived
//! enum with one variant per failure mode, `#[error("...")]` messages taken
//! in meaning from `lsml_strerr` in `original_source/c/lsml.c`.

use thiserror::Error;

/// Every way an LSML operation can fail. Values are `Copy` since no variant
/// carries an owned allocation — matching the original's plain integer
/// error codes, which could be compared and returned by value everywhere.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsmlError {
    // -- System
    #[error("out of memory")]
    OutOfMemory,
    #[error("parsing was aborted by the error callback")]
    ParseAborted,

    // -- Retrieval
    #[error("not found")]
    NotFound,
    #[error("invalid data handle")]
    InvalidData,
    #[error("invalid key")]
    InvalidKey,
    #[error("invalid section handle")]
    InvalidSection,
    #[error("section is the wrong type (table vs. array)")]
    SectionType,

    // -- Value interpretation
    #[error("value is null")]
    ValueNull,
    #[error("value has the wrong format for the requested type")]
    ValueFormat,
    #[error("value is out of range for the requested type")]
    ValueRange,

    // -- Parse
    #[error("missing end quote")]
    MissingEndQuote,
    #[error("invalid escape sequence in text")]
    TextInvalidEscape,
    #[error("text outside of any section")]
    TextOutsideSection,
    #[error("text after end quote")]
    TextAfterEndQuote,
    #[error("text after section header")]
    TextAfterSectionHeader,
    #[error("section header is unclosed")]
    SectionHeaderUnclosed,
    #[error("section name is empty")]
    SectionNameEmpty,
    #[error("section name reused")]
    SectionNameReused,
    #[error("table key reused")]
    TableKeyReused,
    #[error("table entry is missing its '='")]
    TableEntryMissingEquals,
}

/// One-based line number, reported by the parser's error logger exactly as
/// `lsml_index_t line` is in the original.
pub type LineNo = u64;

/// Returned by a parse error logger to say whether the parser should give
/// up. Named rather than a bare `bool` so call sites read as intent
/// (`Abort::Yes`/`Abort::No`) instead of an ambiguous boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    No,
    Yes,
}

impl From<bool> for Abort {
    fn from(abort: bool) -> Self {
        if abort {
            Abort::Yes
        } else {
            Abort::No
        }
    }
}

/// A numeric conversion that succeeded but had to clamp its result to the
/// target type's representable range. Carries the clamped value so callers
/// who don't care about precision loss can use it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clamped<T> {
    pub value: T,
}

/// Result of a numeric value conversion (see §4.7): either an exact value,
/// or a clamped value alongside the error that explains why it was clamped.
pub type ValueResult<T> = Result<T, ClampedError<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedError<T> {
    pub clamped: T,
    pub error: LsmlError,
}
