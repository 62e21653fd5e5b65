//! LSML: Listed Sections Markup Language — a line-oriented configuration
//! format with a single-arena, pointer-stable in-memory model (§1, §4).
//!
//! Grounded on `original_source/c/lsml.h`/`lsml_io.h`/`lsml.c`: this crate
//! keeps the original's single-allocation-arena design and its table/array
//! section split, expressed through an ownership-checked `Data` instead of
//! a raw `lsml_data_t*` and manual `lsml_data_destroy`.
//!
//! ```
//! use lsml::{Data, SectionKind, io, parser};
//!
//! let data = Data::new(1 << 16);
//! let mut reader = io::from_bytes(b"{server}\nhost=\"localhost\"\n");
//! parser::parse(&data, &mut reader, &mut parser::ParseOptions::new(), |_, _| lsml::Abort::No).unwrap();
//!
//! let server = data.get_section("server").unwrap();
//! assert_eq!(data.section_kind(server), SectionKind::Table);
//! assert_eq!(data.table_get(server, "host").unwrap(), Some("localhost"));
//! ```

mod arena;
mod chunked;
mod data;
mod error;
mod hashmap;
mod intern;
mod section;
mod value;
mod verify;

pub mod io;
pub mod parser;
pub mod writer;

pub use data::{Data, SectionHandle};
pub use error::{Abort, Clamped, ClampedError, LineNo, LsmlError, ValueResult};
pub use hashmap::LoadFactor;
pub use intern::RegisteredString;
pub use section::SectionKind;
pub use value::{
    as_bool, as_f32, as_f64, as_i32, as_i64, as_reference, as_u32, as_u64, Reference, ReferenceKind,
};
pub use verify::{verify_matches_template, verify_references, MatchFlags};
