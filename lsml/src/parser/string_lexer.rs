//! The single-line string sub-language: unquoted/quoted/escaped values,
//! reference prefixes, and the escape grammar (§4.6.1, §4.6.2).
//!
//! Grounded on `lsml_parse_temp_string`/`lsml_helper_unicode_parse`/
//! `lsml_discard_temp_string`/`lsml_register_temp_string` in
//! `original_source/c/lsml.c`. The original builds a string by bumping a
//! raw pointer through the data's arena directly; `TempString` here wraps
//! that same one-byte-at-a-time bump allocation (`Arena::alloc_bytes`)
//! behind the same discard/commit protocol the original's comments
//! describe: never allocate anything else while a `TempString` is open,
//! `commit` to keep it, `discard` to rewind the arena past it.

use super::{is_space, skip_comment, Parser};
use crate::arena::Arena;
use crate::data::Data;
use crate::error::{Abort, LsmlError};
use crate::intern::RegisteredString;
use crate::io::Reader;

const NL: i32 = b'\n' as i32;
const HASH: i32 = b'#' as i32;
const BACKTICK: i32 = b'`' as i32;
const DQUOTE: i32 = b'"' as i32;
const SQUOTE: i32 = b'\'' as i32;
const BACKSLASH: i32 = b'\\' as i32;
const LBRACE: i32 = b'{' as i32;
const RBRACE: i32 = b'}' as i32;
const LBRACK: i32 = b'[' as i32;
const RBRACK: i32 = b']' as i32;

/// A string under construction at the tail of a `Data`'s arena. No other
/// allocation may happen on that arena while one of these is open.
pub(crate) struct TempString<'a> {
    arena: &'a Arena,
    start_offset: usize,
    len: usize,
}

impl<'a> TempString<'a> {
    fn new(data: &'a Data) -> Self {
        let arena = data.arena();
        TempString {
            arena,
            start_offset: arena.offset(),
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), LsmlError> {
        let ptr = self.arena.alloc_bytes(1, 1)?;
        // SAFETY: `ptr` is one freshly bump-allocated, exclusively-owned byte.
        unsafe { ptr.as_ptr().write(byte) };
        self.len += 1;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `[start_offset, start_offset+len)` was written byte-by-byte
        // by `push` above and is still this arena's uncommitted tail — no
        // other allocation happens while a `TempString` is alive.
        unsafe { self.arena.resolve_bytes(self.arena.ptr_at(self.start_offset), self.len) }
    }

    fn trim_trailing_whitespace(&mut self) {
        while self.len > 0 && is_space(self.bytes()[self.len - 1] as i32) {
            self.len -= 1;
        }
        self.arena.reset_to(self.start_offset + self.len);
    }

    /// Views the in-progress bytes, for the section-header accept/reject
    /// condition, which runs before the name is committed. Non-UTF-8
    /// content (impossible for any input this crate itself produces) reads
    /// as empty rather than panicking.
    pub(crate) fn as_str(&self, _data: &Data) -> &str {
        std::str::from_utf8(self.bytes()).unwrap_or("")
    }

    /// Rewinds the arena past this string's bytes (original:
    /// `lsml_discard_temp_string`). Must not be called after any other
    /// allocation has happened since this string was created.
    pub(crate) fn discard(self, _data: &Data) {
        self.arena.reset_to(self.start_offset);
    }

    /// Moves this string into the interner, deduplicating it against any
    /// byte-identical registered string (original:
    /// `lsml_register_temp_string`). This crate's public API is `&str`
    /// throughout (a deliberate departure from the original's raw-byte
    /// `lsml_string_t`, see `DESIGN.md`), so non-UTF-8 content — only
    /// reachable via a raw `\xHH`/`\ooo` escape whose byte isn't part of a
    /// valid sequence — is rejected here as `TextInvalidEscape` rather than
    /// silently interned.
    pub(crate) fn commit(self, data: &Data) -> Result<RegisteredString, LsmlError> {
        if std::str::from_utf8(self.bytes()).is_err() {
            self.arena.reset_to(self.start_offset);
            return Err(LsmlError::TextInvalidEscape);
        }
        let ptr = self.arena.ptr_at(self.start_offset);
        let len = self.len;
        let nul = self.arena.alloc_bytes(1, 1)?;
        // SAFETY: one freshly bump-allocated byte, immediately after `ptr`.
        unsafe { nul.as_ptr().write(0) };
        let reg = data.strings().intern_move(self.arena, ptr, len)?;
        if reg.as_bytes_raw().as_ptr() != ptr.as_ptr() {
            // A byte-identical string was already registered; discard this
            // tentative allocation (original: `lsml_register_temp_string`).
            self.arena.reset_to(self.start_offset);
        }
        Ok(reg)
    }
}

fn oct_digit_value(c: i32) -> Option<u32> {
    if (b'0' as i32..=b'7' as i32).contains(&c) {
        Some((c - b'0' as i32) as u32)
    } else {
        None
    }
}

fn hex_digit_value(c: i32) -> Option<u32> {
    match c {
        c if (b'0' as i32..=b'9' as i32).contains(&c) => Some((c - b'0' as i32) as u32),
        c if (b'A' as i32..=b'F' as i32).contains(&c) => Some((c - b'A' as i32 + 10) as u32),
        c if (b'a' as i32..=b'f' as i32).contains(&c) => Some((c - b'a' as i32 + 10) as u32),
        _ => None,
    }
}

/// Encodes `codepoint` as UTF-8 into `scratch`, returning the byte count.
/// A codepoint outside every valid range (original: the unguarded
/// `<=0x7F / 0x80..=0x7FF / 0x800..=0xFFFF / 0x10000..=0x10FFFF` ladder,
/// which — faithfully kept here — does not itself special-case surrogates)
/// logs `TextInvalidEscape` and falls back to writing the escape's literal
/// hex digits unchanged.
fn encode_codepoint_or_literal<R: Reader + ?Sized>(
    p: &mut Parser<R>,
    codepoint: u32,
    scratch: &mut [u8; 16],
    len_expect: usize,
) -> Result<usize, LsmlError> {
    if codepoint <= 0x7F {
        scratch[0] = codepoint as u8;
        Ok(1)
    } else if (0x80..=0x7FF).contains(&codepoint) {
        scratch[0] = 0b1100_0000 | ((codepoint >> 6) as u8 & 0b0001_1111);
        scratch[1] = 0b1000_0000 | (codepoint as u8 & 0b0011_1111);
        Ok(2)
    } else if (0x800..=0xFFFF).contains(&codepoint) {
        scratch[0] = 0b1110_0000 | ((codepoint >> 12) as u8 & 0b0000_1111);
        scratch[1] = 0b1000_0000 | ((codepoint >> 6) as u8 & 0b0011_1111);
        scratch[2] = 0b1000_0000 | (codepoint as u8 & 0b0011_1111);
        Ok(3)
    } else if (0x1_0000..=0x10_FFFF).contains(&codepoint) {
        scratch[0] = 0b1111_0000 | ((codepoint >> 18) as u8 & 0b0000_0111);
        scratch[1] = 0b1000_0000 | ((codepoint >> 12) as u8 & 0b0011_1111);
        scratch[2] = 0b1000_0000 | ((codepoint >> 6) as u8 & 0b0011_1111);
        scratch[3] = 0b1000_0000 | (codepoint as u8 & 0b0011_1111);
        Ok(4)
    } else {
        if p.log_err(LsmlError::TextInvalidEscape) == Abort::Yes {
            return Err(LsmlError::ParseAborted);
        }
        Ok(len_expect)
    }
}

/// Parses a `\uHHHH`/`\UHHHHHHHH` escape, window `[cur, next] = ['\\', 'u'
/// or 'U']`, pushing the resulting UTF-8 bytes (or, on a malformed hex
/// sequence, the literal characters read so far) directly onto `temp`.
/// Leaves `cur` at the character right after whatever was consumed
/// (original: `lsml_helper_unicode_parse`).
fn parse_unicode_escape<R: Reader + ?Sized>(p: &mut Parser<R>, temp: &mut TempString) -> Result<(), LsmlError> {
    let mut scratch = [0u8; 16];
    scratch[0] = p.cur as u8;
    scratch[1] = p.next as u8;
    let mut codepoint: u32 = 0;
    p.nextchar(); // cur = 'u' or 'U'
    let len_expect = if p.cur == b'U' as i32 { 10 } else { 6 };
    let mut i = 2usize;
    let mut complete = true;
    while i < len_expect {
        let c = p.nextchar();
        match hex_digit_value(c) {
            Some(d) => {
                codepoint = (codepoint << 4) + d;
                scratch[i] = c as u8;
                i += 1;
            }
            None => {
                complete = false;
                break;
            }
        }
    }
    let n = if complete {
        p.nextchar(); // pass the last hex digit
        encode_codepoint_or_literal(p, codepoint, &mut scratch, len_expect)?
    } else {
        i
    };
    for &b in &scratch[..n] {
        temp.push(b)?;
    }
    Ok(())
}

enum EscapeOutcome {
    /// A single substituted byte, to be pushed and followed by the normal
    /// advance-and-continue the outer loop already does for plain bytes.
    Byte(i32),
    /// Bytes were already pushed directly (hex-invalid literal fallback, or
    /// a unicode escape); resume the outer loop with `cur` at this value,
    /// skipping the generic push.
    Continue(i32),
}

/// Resolves one `\...` escape, window `[cur, next] = ['\\', ?]` (original:
/// the `case '\\':` arm of `lsml_parse_temp_string`'s escaped-string loop).
fn resolve_escape<R: Reader + ?Sized>(
    p: &mut Parser<R>,
    temp: &mut TempString,
) -> Result<EscapeOutcome, LsmlError> {
    let next = p.next;
    let byte = match next {
        x if x == b'a' as i32 => {
            p.nextchar();
            0x07
        }
        x if x == b'b' as i32 => {
            p.nextchar();
            0x08
        }
        x if x == b'e' as i32 => {
            p.nextchar();
            0x1B
        }
        x if x == b'f' as i32 => {
            p.nextchar();
            0x0C
        }
        x if x == b'n' as i32 => {
            p.nextchar();
            0x0A
        }
        x if x == b'r' as i32 => {
            p.nextchar();
            0x0D
        }
        x if x == b't' as i32 => {
            p.nextchar();
            0x09
        }
        x if x == BACKSLASH => {
            p.nextchar();
            0x5C
        }
        x if x == SQUOTE => {
            p.nextchar();
            0x27
        }
        x if x == DQUOTE => {
            p.nextchar();
            0x22
        }
        x if x == BACKTICK => {
            p.nextchar();
            0x60
        }
        x if x == b'?' as i32 => {
            p.nextchar();
            0x3F
        }
        x if (b'0' as i32..=b'7' as i32).contains(&x) => {
            let mut val: u32 = (x - b'0' as i32) as u32;
            p.nextchar();
            if let Some(d) = oct_digit_value(p.next) {
                val = val * 8 + d;
                p.nextchar();
                if let Some(d2) = oct_digit_value(p.next) {
                    val = val * 8 + d2;
                    p.nextchar();
                }
            }
            val.min(255) as i32
        }
        x if x == b'x' as i32 => {
            p.nextchar(); // cur = 'x'
            match hex_digit_value(p.next) {
                Some(d1) => {
                    let mut val = d1;
                    p.nextchar();
                    if let Some(d2) = hex_digit_value(p.next) {
                        val = val * 16 + d2;
                        p.nextchar();
                    }
                    val as i32
                }
                None => {
                    // Invalid hex escape: keep the backslash literally and
                    // reprocess whatever follows as plain text.
                    temp.push(b'\\')?;
                    let c = p.cur;
                    if p.log_err(LsmlError::TextInvalidEscape) == Abort::Yes {
                        return Err(LsmlError::ParseAborted);
                    }
                    return Ok(EscapeOutcome::Continue(c));
                }
            }
        }
        x if x == b'u' as i32 || x == b'U' as i32 => {
            parse_unicode_escape(p, temp)?;
            return Ok(EscapeOutcome::Continue(p.cur));
        }
        _ => {
            if p.log_err(LsmlError::TextInvalidEscape) == Abort::Yes {
                return Err(LsmlError::ParseAborted);
            }
            BACKSLASH
        }
    };
    Ok(EscapeOutcome::Byte(byte))
}

/// Consumes up to `end_delim` (or a comment/newline/EOF), logging
/// `TextAfterEndQuote` for the first non-whitespace byte found — the
/// "did anything follow the closing quote" check every quoted/escaped
/// string runs once its delimiter closes.
fn consume_to_end_delim<R: Reader + ?Sized>(p: &mut Parser<R>, mut c: i32, end_delim: i32) -> Result<(), LsmlError> {
    if c >= 0 && c != NL && c != end_delim {
        let mut logged = false;
        while c >= 0 && c != NL && c != end_delim {
            if c == HASH {
                skip_comment(p);
                break;
            }
            if !logged && !is_space(c) {
                if p.log_err(LsmlError::TextAfterEndQuote) == Abort::Yes {
                    return Err(LsmlError::ParseAborted);
                }
                logged = true;
            }
            c = p.nextchar();
        }
    }
    Ok(())
}

fn finalize(temp: TempString<'_>, is_name: bool) -> Result<TempString<'_>, LsmlError> {
    if is_name && temp.is_empty() {
        return Err(LsmlError::InvalidKey);
    }
    Ok(temp)
}

/// Parses one single-line string value: unquoted, `"`/`'`-quoted, or
/// `` ` ``-escaped, optionally prefixed with a `{}`/`[]` section-reference
/// marker. Leaves `cur` at `end_delim` (or the line's end) on return.
///
/// `is_name` rejects an empty result as `InvalidKey` — callers translate
/// that into whatever empty-name error fits their context (original:
/// `lsml_parse_temp_string`).
pub(crate) fn parse_temp_string<'a, R: Reader + ?Sized>(
    data: &'a Data,
    p: &mut Parser<R>,
    end_delim: u8,
    is_name: bool,
) -> Result<TempString<'a>, LsmlError> {
    let mut temp = TempString::new(data);
    let end_delim = end_delim as i32;
    let mut c = p.cur;
    let delim: i32;

    loop {
        if c < 0 || c == NL || c == end_delim {
            return finalize(temp, is_name);
        } else if temp.is_empty() && ((c == LBRACE && p.next == RBRACE) || (c == LBRACK && p.next == RBRACK)) {
            temp.push(c as u8)?;
            temp.push(p.next as u8)?;
            p.nextchar(); // pass '{'/'['
            c = p.nextchar(); // pass '}'/']'
            continue;
        } else if c == BACKTICK {
            delim = BACKTICK;
            c = p.nextchar();
            break;
        } else if c == DQUOTE || c == SQUOTE {
            delim = c;
            c = p.nextchar();
            break;
        } else if !is_space(c) {
            delim = NL;
            break;
        }
        c = p.nextchar();
    }

    if delim == NL {
        loop {
            if c < 0 || c == NL || c == HASH || c == end_delim {
                if c == HASH {
                    skip_comment(p);
                }
                temp.trim_trailing_whitespace();
                break;
            }
            temp.push(c as u8)?;
            c = p.nextchar();
        }
    } else {
        // `"`, `'`, and `` ` `` all share one escape grammar and differ
        // only in which byte terminates them (`delim`).
        loop {
            if c < 0 || c == NL {
                if p.log_err(LsmlError::MissingEndQuote) == Abort::Yes {
                    return Err(LsmlError::ParseAborted);
                }
                break;
            }
            if c == delim {
                break;
            }
            if c == BACKSLASH {
                match resolve_escape(p, &mut temp)? {
                    EscapeOutcome::Byte(b) => c = b,
                    EscapeOutcome::Continue(next_c) => {
                        c = next_c;
                        continue;
                    }
                }
            }
            temp.push(c as u8)?;
            c = p.nextchar();
        }
        if c == delim {
            c = p.nextchar();
        }
        consume_to_end_delim(p, c, end_delim)?;
    }

    finalize(temp, is_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Abort;
    use crate::io::{from_bytes, StringReader};

    fn parser_for(bytes: &[u8]) -> (Box<dyn FnMut(LsmlError, crate::error::LineNo) -> Abort>, StringReader<'_>) {
        (Box::new(|_, _| Abort::No), from_bytes(bytes))
    }

    fn run<'d, 'r>(
        data: &'d Data,
        reader: &'r mut StringReader<'r>,
        log_err: &'r mut dyn FnMut(LsmlError, crate::error::LineNo) -> Abort,
        end_delim: u8,
        is_name: bool,
    ) -> Result<String, LsmlError> {
        let mut p = Parser {
            reader,
            log_err,
            line: 1,
            cur: 0,
            next: 0,
        };
        p.nextchar();
        p.nextchar();
        let temp = parse_temp_string(data, &mut p, end_delim, is_name)?;
        let reg = temp.commit(data)?;
        Ok(data.resolve(reg).to_string())
    }

    #[test]
    fn unquoted_trims_trailing_whitespace() {
        let data = Data::new(1 << 16);
        let (mut log, mut reader) = parser_for(b"hello world  \n");
        let s = run(&data, &mut reader, &mut log, b'\n', false).unwrap();
        assert_eq!(s, "hello world");
    }

    #[test]
    fn backtick_string_handles_named_escapes() {
        let data = Data::new(1 << 16);
        let (mut log, mut reader) = parser_for(b"`a\\tb\\nc`\n");
        let s = run(&data, &mut reader, &mut log, b'\n', false).unwrap();
        assert_eq!(s, "a\tb\nc");
    }

    #[test]
    fn double_quoted_string_handles_named_escapes() {
        let data = Data::new(1 << 16);
        let (mut log, mut reader) = parser_for(b"\"a\\tb\\nc\"\n");
        let s = run(&data, &mut reader, &mut log, b'\n', false).unwrap();
        assert_eq!(s, "a\tb\nc");
    }

    #[test]
    fn single_quoted_string_handles_named_escapes() {
        let data = Data::new(1 << 16);
        let (mut log, mut reader) = parser_for(b"'a\\tb\\nc'\n");
        let s = run(&data, &mut reader, &mut log, b'\n', false).unwrap();
        assert_eq!(s, "a\tb\nc");
    }

    #[test]
    fn escaped_string_supports_octal_and_hex() {
        let data = Data::new(1 << 16);
        let (mut log, mut reader) = parser_for(b"`\\101\\x42`\n"); // \101 = 'A', \x42 = 'B'
        let s = run(&data, &mut reader, &mut log, b'\n', false).unwrap();
        assert_eq!(s, "AB");
    }

    #[test]
    fn unicode_escape_encodes_utf8() {
        let data = Data::new(1 << 16);
        let (mut log, mut reader) = parser_for(b"`\\u00e9`\n");
        let s = run(&data, &mut reader, &mut log, b'\n', false).unwrap();
        assert_eq!(s, "\u{e9}");
    }

    #[test]
    fn reference_prefix_is_kept_literally() {
        let data = Data::new(1 << 16);
        let (mut log, mut reader) = parser_for(b"{}server\n");
        let s = run(&data, &mut reader, &mut log, b'\n', false).unwrap();
        assert_eq!(s, "{}server");
    }

    #[test]
    fn empty_name_is_rejected() {
        let data = Data::new(1 << 16);
        let (mut log, mut reader) = parser_for(b"\n");
        let err = run(&data, &mut reader, &mut log, b'\n', true).unwrap_err();
        assert_eq!(err, LsmlError::InvalidKey);
    }

    #[test]
    fn invalid_hex_escape_falls_back_to_literal() {
        let data = Data::new(1 << 16);
        let mut aborts = Vec::new();
        let mut log: Box<dyn FnMut(LsmlError, crate::error::LineNo) -> Abort> = Box::new(|e, _| {
            aborts.push(e);
            Abort::No
        });
        let mut reader = from_bytes(b"`\\xZZ`\n");
        let s = run(&data, &mut reader, &mut log, b'\n', false).unwrap();
        assert_eq!(s, "\\xZZ");
        assert_eq!(aborts, vec![LsmlError::TextInvalidEscape]);
    }
}
