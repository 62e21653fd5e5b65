//! Top-level parse loop: reads a byte stream line by line, dispatching each
//! line to a section header, a table entry, or an array's comma-separated
//! entries (§4.6 "Parsing").
//!
//! Grounded on `lsml_parser_t`/`lsml_parse`/`lsml_parse_section_header`/
//! `lsml_parse_table_entry`/`lsml_parse_array_entries` in
//! `original_source/c/lsml.c`. `cur`/`next` stay `i32` rather than
//! `Option<u8>` here, matching the original's `int`-with-negative-sentinel
//! scheme directly — the lexer leans on arithmetic comparisons (`c >= 0`,
//! `c != delim`) constantly enough that mirroring the original's
//! representation keeps this translation honest.

mod string_lexer;

use crate::data::{Data, SectionHandle};
use crate::error::{Abort, LineNo, LsmlError};
use crate::io::Reader;
use crate::section::SectionKind;

const EOF: i32 = -1;

/// What sections a parse accepts, and how many. Built-in analogue of the
/// original's `lsml_parse_options_t` (`n_sections`, `condition`,
/// `condition_userdata` collapse into a closure) plus `err_log`/
/// `err_log_userdata`, which are passed to [`parse`] directly as a closure
/// instead of living on this struct.
pub struct ParseOptions<'a> {
    /// Stop accepting new section headers once this many have been seen.
    /// `0` means unlimited (original: `options.n_sections`).
    pub n_sections: usize,
    condition: Option<Box<dyn FnMut(&str, SectionKind) -> bool + 'a>>,
}

impl<'a> Default for ParseOptions<'a> {
    fn default() -> Self {
        ParseOptions {
            n_sections: 0,
            condition: None,
        }
    }
}

impl<'a> ParseOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sections(mut self, n_sections: usize) -> Self {
        self.n_sections = n_sections;
        self
    }

    /// Only sections for which `condition` returns `true` are parsed; others
    /// are skipped (their entries are read and discarded, as if they were
    /// unparseable text outside a section).
    pub fn with_condition(mut self, condition: impl FnMut(&str, SectionKind) -> bool + 'a) -> Self {
        self.condition = Some(Box::new(condition));
        self
    }

    /// Only accept sections that already exist (with a matching kind) in
    /// `template` (original: `lsml_parse_condition_sections_match`).
    pub fn matching_template(template: &'a Data) -> Self {
        Self::new().with_condition(move |name, kind| {
            template
                .get_section(name)
                .map(|h| template.section_kind(h) == kind)
                .unwrap_or(false)
        })
    }
}

struct Parser<'r, R: Reader + ?Sized> {
    reader: &'r mut R,
    log_err: &'r mut dyn FnMut(LsmlError, LineNo) -> Abort,
    line: LineNo,
    cur: i32,
    next: i32,
}

impl<'r, R: Reader + ?Sized> Parser<'r, R> {
    fn getc(&mut self) -> i32 {
        match self.reader.read_byte() {
            Some(b) => b as i32,
            None => EOF,
        }
    }

    /// Advances to the next character, returning the new `cur`.
    fn nextchar(&mut self) -> i32 {
        let c = self.next;
        if self.cur == b'\n' as i32 {
            self.line += 1;
        }
        self.cur = c;
        self.next = self.getc();
        c
    }

    /// Reports a recoverable parse error through the caller's logger.
    /// Returns whether the caller asked to abort.
    fn log_err(&mut self, err: LsmlError) -> Abort {
        (self.log_err)(err, self.line)
    }
}

fn is_space(c: i32) -> bool {
    matches!(c, 0x20 | 0x09 | 0x0D | 0x0A)
}

fn skip_whitespace<R: Reader + ?Sized>(p: &mut Parser<R>) {
    while is_space(p.cur) {
        p.nextchar();
    }
}

fn skip_comment<R: Reader + ?Sized>(p: &mut Parser<R>) {
    let mut c = p.cur;
    while c >= 0 && c != b'\n' as i32 {
        c = p.nextchar();
    }
}

fn skip_line<R: Reader + ?Sized>(p: &mut Parser<R>) {
    let mut c = p.cur;
    while c >= 0 && c != b'\n' as i32 {
        c = p.nextchar();
    }
    if c == b'\n' as i32 {
        p.nextchar();
    }
}

/// Consumes trailing whitespace/comment up to (and including) a line's end,
/// logging `on_text` for the first non-whitespace byte found — shared by
/// section-header and quoted-string "text after end delimiter" handling.
fn skip_trailing_and_log<R: Reader + ?Sized>(
    p: &mut Parser<R>,
    on_text: LsmlError,
) -> Result<(), LsmlError> {
    let mut c = p.cur;
    let mut logged = false;
    while c >= 0 && c != b'\n' as i32 {
        if c == b'#' as i32 {
            skip_comment(p);
            break;
        }
        if !logged && !is_space(c) {
            if p.log_err(on_text) == Abort::Yes {
                return Err(LsmlError::ParseAborted);
            }
            logged = true;
        }
        c = p.nextchar();
    }
    Ok(())
}

fn parse_section_header<R: Reader + ?Sized>(
    data: &Data,
    p: &mut Parser<R>,
    options: &mut ParseOptions,
) -> Result<Option<SectionHandle>, LsmlError> {
    let (delim, kind) = match p.cur {
        c if c == b'{' as i32 => (b'}', SectionKind::Table),
        c if c == b'[' as i32 => (b']', SectionKind::Array),
        _ => return Err(LsmlError::SectionType),
    };
    p.nextchar();

    let temp = match string_lexer::parse_temp_string(data, p, delim, true) {
        Ok(t) => t,
        Err(LsmlError::InvalidKey) => return Err(LsmlError::SectionNameEmpty),
        Err(e) => return Err(e),
    };

    if p.cur == delim as i32 {
        p.nextchar();
    } else if p.log_err(LsmlError::SectionHeaderUnclosed) == Abort::Yes {
        return Err(LsmlError::ParseAborted);
    }

    skip_trailing_and_log(p, LsmlError::TextAfterSectionHeader)?;

    let accept = match &mut options.condition {
        Some(cond) => cond(temp.as_str(data), kind),
        None => true,
    };
    if !accept {
        temp.discard(data);
        return Ok(None);
    }

    // Registering now is fine even on a name collision: the string is
    // already known to be a duplicate, so nothing is wasted.
    let name = temp.commit(data)?;
    match data.add_section_reg(name, kind) {
        Ok(handle) => Ok(Some(handle)),
        Err(e) => Err(e),
    }
}

fn parse_table_entry<R: Reader + ?Sized>(
    data: &Data,
    p: &mut Parser<R>,
    table: SectionHandle,
) -> Result<(), LsmlError> {
    let temp_key = string_lexer::parse_temp_string(data, p, b'=', false)?;

    if p.cur == b'=' as i32 {
        p.nextchar();
    } else {
        temp_key.discard(data);
        if p.log_err(LsmlError::TableEntryMissingEquals) == Abort::Yes {
            return Err(LsmlError::ParseAborted);
        }
        return Ok(());
    }

    let key = temp_key.commit(data)?;
    if data.table_get_reg(table, key)?.is_some() {
        if p.log_err(LsmlError::TableKeyReused) == Abort::Yes {
            return Err(LsmlError::ParseAborted);
        }
        return Ok(());
    }

    // Newline delimiter forces the same "text after end quote" check a
    // quoted value would otherwise skip.
    let temp_val = string_lexer::parse_temp_string(data, p, b'\n', false)?;
    let value = temp_val.commit(data)?;

    data.add_table_entry_reg(table, key, value)
}

fn parse_array_entries<R: Reader + ?Sized>(
    data: &Data,
    p: &mut Parser<R>,
    array: SectionHandle,
) -> Result<(), LsmlError> {
    let mut newrow = true;
    while p.cur >= 0 && p.cur != b'\n' as i32 && p.cur != b'#' as i32 {
        let temp_val = string_lexer::parse_temp_string(data, p, b',', false)?;
        let value = temp_val.commit(data)?;
        data.array_append_reg(array, value, newrow)?;
        newrow = false;

        if p.cur == b',' as i32 {
            p.nextchar();
        }
        if p.cur == b'\n' as i32 {
            break;
        }
        skip_whitespace(p);
    }
    Ok(())
}

/// Parses `reader`'s contents into `data`, appending any sections/entries
/// found to whatever `data` already contains.
///
/// `log_err` is called for every recoverable parse error with the error
/// and the one-based line it occurred on; returning `Abort::Yes` stops the
/// whole parse with `Err(LsmlError::ParseAborted)`. Fatal errors
/// (`OutOfMemory`) always stop the parse regardless of what `log_err`
/// returns (original: `lsml_parse`).
pub fn parse<R: Reader + ?Sized>(
    data: &Data,
    reader: &mut R,
    options: &mut ParseOptions,
    mut log_err: impl FnMut(LsmlError, LineNo) -> Abort,
) -> Result<(), LsmlError> {
    let mut p = Parser {
        reader,
        log_err: &mut log_err,
        line: 1,
        cur: 0,
        next: 0,
    };
    p.nextchar();
    let mut c = p.nextchar();

    let mut section: Option<SectionHandle> = None;
    let mut n_sections_parsed: usize = 0;

    while c >= 0 {
        // INVARIANT: loop top is always the start of a line.
        skip_whitespace(&mut p);
        c = p.cur;

        if (c == b'{' as i32 && p.next != b'}' as i32) || (c == b'[' as i32 && p.next != b']' as i32) {
            if options.n_sections != 0 && n_sections_parsed >= options.n_sections {
                return Ok(());
            }
            n_sections_parsed += 1;
            match parse_section_header(data, &mut p, options) {
                Ok(handle) => section = handle,
                Err(e @ (LsmlError::SectionNameReused | LsmlError::SectionNameEmpty)) => {
                    section = None;
                    if p.log_err(e) == Abort::Yes {
                        return Err(LsmlError::ParseAborted);
                    }
                }
                Err(e) => return Err(e),
            }
        } else if c == b'#' as i32 {
            skip_comment(&mut p);
        } else if c >= 0 {
            if let Some(handle) = section {
                let result = if data.section_kind(handle) == SectionKind::Array {
                    parse_array_entries(data, &mut p, handle)
                } else {
                    parse_table_entry(data, &mut p, handle)
                };
                match result {
                    Ok(()) => {}
                    Err(e @ (LsmlError::OutOfMemory | LsmlError::ParseAborted)) => return Err(e),
                    Err(e) => {
                        if p.log_err(e) == Abort::Yes {
                            return Err(LsmlError::ParseAborted);
                        }
                    }
                }
            } else if data.section_count() == 0 && p.log_err(LsmlError::TextOutsideSection) == Abort::Yes {
                return Err(LsmlError::ParseAborted);
            }
            // If there's no active section but sections already exist, this
            // entry belongs to a section that was skipped (name collision or
            // rejected by `condition`) — already logged there, if at all.
        }

        // INVARIANT: if the line ended on a newline, `cur` is left on it so
        // `skip_line` doesn't eat the next line.
        skip_line(&mut p);
        c = p.cur;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Data;
    use crate::io::from_bytes;

    fn parse_str(data: &Data, text: &str) -> Result<(), LsmlError> {
        let mut reader = from_bytes(text.as_bytes());
        parse(data, &mut reader, &mut ParseOptions::new(), |_, _| Abort::No)
    }

    #[test]
    fn parses_table_and_array_sections() {
        let data = Data::new(1 << 16);
        parse_str(
            &data,
            "{server}\nhost=localhost\nport=8080\n\n[tags]\na, b,\nc,\n",
        )
        .unwrap();

        let server = data.get_section("server").unwrap();
        assert_eq!(data.section_kind(server), SectionKind::Table);
        assert_eq!(data.table_get(server, "host").unwrap(), Some("localhost"));
        assert_eq!(data.table_get(server, "port").unwrap(), Some("8080"));

        let tags = data.get_section("tags").unwrap();
        assert_eq!(data.section_kind(tags), SectionKind::Array);
        assert_eq!(data.array_len(tags).unwrap(), 3);
        let (rows, _) = data.array_size_2d(tags, true).unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn skips_section_with_reused_name_and_keeps_parsing() {
        let data = Data::new(1 << 16);
        let mut aborts = Vec::new();
        let mut reader = from_bytes(b"{a}\nx=1\n{a}\ny=2\n");
        parse(&data, &mut reader, &mut ParseOptions::new(), |e, _| {
            aborts.push(e);
            Abort::No
        })
        .unwrap();
        assert_eq!(aborts, vec![LsmlError::SectionNameReused]);
        let a = data.get_section("a").unwrap();
        assert_eq!(data.table_get(a, "x").unwrap(), Some("1"));
        assert_eq!(data.table_get(a, "y").unwrap(), None);
    }

    #[test]
    fn text_outside_any_section_is_logged() {
        let data = Data::new(1 << 16);
        let mut errs = Vec::new();
        let mut reader = from_bytes(b"stray=1\n{a}\nx=1\n");
        parse(&data, &mut reader, &mut ParseOptions::new(), |e, _| {
            errs.push(e);
            Abort::No
        })
        .unwrap();
        assert_eq!(errs, vec![LsmlError::TextOutsideSection]);
    }

    #[test]
    fn condition_skips_unwanted_sections() {
        let template = Data::new(1 << 16);
        template.add_section("keep", SectionKind::Table).unwrap();

        let data = Data::new(1 << 16);
        let mut reader = from_bytes(b"{keep}\na=1\n{drop}\nb=2\n");
        let mut options = ParseOptions::matching_template(&template);
        parse(&data, &mut reader, &mut options, |_, _| Abort::No).unwrap();

        assert!(data.get_section("keep").is_some());
        assert!(data.get_section("drop").is_none());
    }

    #[test]
    fn backtick_strings_support_escapes_and_references() {
        let data = Data::new(1 << 16);
        parse_str(&data, "{server}\nname=`a\\tb`\nalias={}server\n").unwrap();
        let server = data.get_section("server").unwrap();
        assert_eq!(data.table_get(server, "name").unwrap(), Some("a\tb"));
        assert_eq!(data.table_get(server, "alias").unwrap(), Some("{}server"));
    }

    #[test]
    fn quoted_strings_support_escapes() {
        // `"..."`, `'...'`, and `` `...` `` all share one escape grammar;
        // only the terminator byte differs.
        let data = Data::new(1 << 16);
        parse_str(&data, "{server}\nname=\"a\\tb\"\n").unwrap();
        let server = data.get_section("server").unwrap();
        assert_eq!(data.table_get(server, "name").unwrap(), Some("a\tb"));
    }
}
