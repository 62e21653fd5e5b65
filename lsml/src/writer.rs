//! Canonical LSML emission: rendering a [`Data`] back to text (§6 "Emitted
//! form").
//!
//! Grounded on `lsml_write_quoted`/`lsml_write_section`/`lsml_write_data` in
//! `original_source/c/lsml_io.h`. Those work byte-at-a-time off a raw
//! `lsml_string_t`; here the same bit-twiddling runs over `str::as_bytes()`,
//! which is always valid UTF-8, so the "invalid/overlong sequence" fallback
//! branches are kept for fidelity even though a `&str` input can never reach
//! them.

use crate::data::{Data, SectionHandle};
use crate::error::LsmlError;
use crate::io::Writer;
use crate::section::SectionKind;

fn hex_digit(val: u8) -> u8 {
    match val {
        0..=9 => b'0' + val,
        10..=15 => b'A' + (val - 10),
        _ => b'?',
    }
}

fn io_err(_: std::io::Error) -> LsmlError {
    LsmlError::OutOfMemory
}

fn write_hex_byte(w: &mut impl Writer, c: u8) -> Result<(), LsmlError> {
    w.write_byte(b'\\').map_err(io_err)?;
    w.write_byte(b'x').map_err(io_err)?;
    w.write_byte(hex_digit(c >> 4)).map_err(io_err)?;
    w.write_byte(hex_digit(c & 0b1111)).map_err(io_err)
}

/// Writes `s` as a double-quoted LSML string literal, escaping control
/// bytes, `"` and `\`, and (in `ascii` mode) every multibyte UTF-8 sequence.
pub fn write_quoted(w: &mut impl Writer, s: &str, ascii: bool) -> Result<(), LsmlError> {
    let bytes = s.as_bytes();
    w.write_byte(b'"').map_err(io_err)?;
    let mut index = 0;
    while index < bytes.len() {
        let c = bytes[index];
        if c < 32 {
            let named = match c {
                0x00 => Some(b'0'),
                0x07 => Some(b'a'),
                0x08 => Some(b'b'),
                0x09 => Some(b't'),
                0x0A => Some(b'n'),
                0x0B => Some(b'v'),
                0x0C => Some(b'f'),
                0x0D => Some(b'r'),
                _ => None,
            };
            match named {
                Some(c) => {
                    w.write_byte(b'\\').map_err(io_err)?;
                    w.write_byte(c).map_err(io_err)?;
                }
                None => write_hex_byte(w, c)?,
            }
            index += 1;
        } else if c < 128 {
            match c {
                b'"' | b'\\' => {
                    w.write_byte(b'\\').map_err(io_err)?;
                    w.write_byte(c).map_err(io_err)?;
                }
                _ => w.write_byte(c).map_err(io_err)?,
            }
            index += 1;
        } else if c & 0b1110_0000 == 0b1100_0000 && index + 1 < bytes.len() {
            let c2 = bytes[index + 1];
            if !ascii {
                w.write_byte(c).map_err(io_err)?;
                w.write_byte(c2).map_err(io_err)?;
            } else {
                w.write_byte(b'\\').map_err(io_err)?;
                w.write_byte(b'u').map_err(io_err)?;
                w.write_byte(b'0').map_err(io_err)?;
                w.write_byte(hex_digit((c & 0b0011_1100) >> 2)).map_err(io_err)?;
                w.write_byte(hex_digit(((c & 0b11) << 2) | ((c2 & 0b0011_0000) >> 4)))
                    .map_err(io_err)?;
                w.write_byte(hex_digit(c2 & 0b1111)).map_err(io_err)?;
            }
            index += 2;
        } else if c & 0b1111_0000 == 0b1110_0000 && index + 2 < bytes.len() {
            let c2 = bytes[index + 1];
            let c3 = bytes[index + 2];
            if !ascii {
                w.write_byte(c).map_err(io_err)?;
                w.write_byte(c2).map_err(io_err)?;
                w.write_byte(c3).map_err(io_err)?;
            } else {
                w.write_byte(b'\\').map_err(io_err)?;
                w.write_byte(b'u').map_err(io_err)?;
                w.write_byte(hex_digit(c & 0b1111)).map_err(io_err)?;
                w.write_byte(hex_digit((c2 & 0b0011_1100) >> 2)).map_err(io_err)?;
                w.write_byte(hex_digit(((c2 & 0b11) << 2) | ((c3 & 0b0011_0000) >> 4)))
                    .map_err(io_err)?;
                w.write_byte(hex_digit(c3 & 0b1111)).map_err(io_err)?;
            }
            index += 3;
        } else if c & 0b1111_1000 == 0b1111_0000 && index + 3 < bytes.len() {
            let c2 = bytes[index + 1];
            let high = ((c & 0b111) << 2) | ((c2 & 0b0011_0000) >> 4);
            if ((c & 0b1111) << 2 | ((c2 & 0b0011_0000) >> 4)) > 0x10 || high == 0 {
                write_hex_byte(w, c)?;
                index += 1;
                continue;
            }
            let c3 = bytes[index + 2];
            let c4 = bytes[index + 3];
            if !ascii {
                w.write_byte(c).map_err(io_err)?;
                w.write_byte(c2).map_err(io_err)?;
                w.write_byte(c3).map_err(io_err)?;
                w.write_byte(c4).map_err(io_err)?;
            } else {
                w.write_byte(b'\\').map_err(io_err)?;
                w.write_byte(b'U').map_err(io_err)?;
                w.write_byte(b'0').map_err(io_err)?;
                w.write_byte(b'0').map_err(io_err)?;
                w.write_byte(hex_digit((c & 0b100) >> 2)).map_err(io_err)?;
                w.write_byte(hex_digit(((c & 0b11) << 2) | ((c2 & 0b0011_0000) >> 4)))
                    .map_err(io_err)?;
                w.write_byte(hex_digit(c2 & 0b1111)).map_err(io_err)?;
                w.write_byte(hex_digit((c3 & 0b0011_1100) >> 2)).map_err(io_err)?;
                w.write_byte(hex_digit(((c3 & 0b11) << 2) | ((c4 & 0b0011_0000) >> 4)))
                    .map_err(io_err)?;
                w.write_byte(hex_digit(c4 & 0b1111)).map_err(io_err)?;
            }
            index += 4;
        } else {
            write_hex_byte(w, c)?;
            index += 1;
        }
    }
    w.write_byte(b'"').map_err(io_err)
}

/// Writes one section. `no_header`/`no_contents` let a caller emit only a
/// section's header or only its body — used by nothing in this crate's own
/// [`write_data`], but kept as a public knob since the original exposes it
/// on every call to `lsml_write_section`.
pub fn write_section(
    w: &mut impl Writer,
    data: &Data,
    handle: SectionHandle,
    no_header: bool,
    no_contents: bool,
    ascii: bool,
) -> Result<(), LsmlError> {
    if no_header && no_contents {
        return Ok(());
    }
    let name = data.section_name(handle);
    match data.section_kind(handle) {
        SectionKind::Table => {
            if !no_header {
                w.write_byte(b'{').map_err(io_err)?;
                write_quoted(w, name, ascii)?;
                w.write_byte(b'}').map_err(io_err)?;
                w.write_byte(b'\n').map_err(io_err)?;
            }
            if !no_contents {
                for (key, value) in data.table_entries(handle)? {
                    write_quoted(w, key, ascii)?;
                    w.write_byte(b'=').map_err(io_err)?;
                    write_quoted(w, value, ascii)?;
                    w.write_byte(b'\n').map_err(io_err)?;
                }
            }
        }
        SectionKind::Array => {
            if !no_header {
                w.write_byte(b'[').map_err(io_err)?;
                write_quoted(w, name, ascii)?;
                w.write_byte(b']').map_err(io_err)?;
                if no_contents {
                    w.write_byte(b'\n').map_err(io_err)?;
                }
            }
            if !no_contents {
                let row_starts = data.array_row_start_indices(handle)?;
                let mut row_starts = row_starts.into_iter().peekable();
                let len = data.array_len(handle)?;
                for index in 0..len {
                    let is_row_start = index == 0 || row_starts.peek() == Some(&index);
                    if is_row_start && row_starts.peek() == Some(&index) {
                        row_starts.next();
                    }
                    // row 0's own break only appears if a header line preceded it;
                    // every later row break always gets one.
                    let print_newline = if index == 0 { !no_header } else { is_row_start };
                    if print_newline {
                        w.write_byte(b'\n').map_err(io_err)?;
                    }
                    let value = data.array_get(handle, index)?.expect("index < len");
                    write_quoted(w, value, ascii)?;
                    w.write_byte(b',').map_err(io_err)?;
                }
                w.write_byte(b'\n').map_err(io_err)?;
            }
        }
    }
    Ok(())
}

/// Writes every section of `data`, in its own iteration order.
pub fn write_data(w: &mut impl Writer, data: &Data, ascii: bool) -> Result<(), LsmlError> {
    for handle in data.sections() {
        write_section(w, data, handle, false, false, ascii)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::to_io;
    use crate::section::SectionKind;

    fn render(data: &Data, ascii: bool) -> String {
        let mut buf = Vec::new();
        {
            let mut writer = to_io(&mut buf);
            write_data(&mut writer, data, ascii).unwrap();
        }
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn quotes_control_and_special_bytes() {
        let mut buf = Vec::new();
        {
            let mut writer = to_io(&mut buf);
            write_quoted(&mut writer, "a\"b\\c\n", false).unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "\"a\\\"b\\\\c\\n\"");
    }

    #[test]
    fn ascii_mode_escapes_multibyte_utf8() {
        let mut buf = Vec::new();
        {
            let mut writer = to_io(&mut buf);
            write_quoted(&mut writer, "\u{e9}", true).unwrap(); // 'é', 2-byte
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "\"\\u00E9\"");
    }

    #[test]
    fn table_section_round_trips_through_writer() {
        let data = Data::new(1 << 16);
        let h = data.add_section("server", SectionKind::Table).unwrap();
        data.add_table_entry(h, "host", "localhost").unwrap();
        let text = render(&data, false);
        assert_eq!(text, "{\"server\"}\n\"host\"=\"localhost\"\n");
    }

    #[test]
    fn array_section_emits_rows_with_trailing_commas() {
        let data = Data::new(1 << 16);
        let h = data.add_section("tags", SectionKind::Array).unwrap();
        data.array_append(h, "a", false).unwrap();
        data.array_append(h, "b", false).unwrap();
        data.array_append(h, "c", true).unwrap();
        let text = render(&data, false);
        assert_eq!(text, "[\"tags\"]\n\"a\",\"b\",\n\"c\",\n");
    }
}
