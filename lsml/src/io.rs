//! Byte-at-a-time reader/writer contracts the parser and the canonical
//! writer are built against (§6 "External interfaces").
//!
//! Grounded on `lsml_reader_t`/`lsml_writer_t` and their built-in adapters
//! (`lsml_reader_from_stream`, `lsml_reader_from_string`,
//! `lsml_writer_to_stream`, `lsml_writer_to_buffer`) in
//! `original_source/c/lsml_io.h`.

use std::io::{self, Read, Write};

/// A one-byte-at-a-time input source. `None` stands in for the original's
/// "any negative value" end-of-stream/error sentinel — the parser treats
/// every such case identically.
pub trait Reader {
    fn read_byte(&mut self) -> Option<u8>;
}

/// Wraps any [`std::io::Read`] as a byte-at-a-time [`Reader`] (original:
/// `lsml_reader_from_stream`).
pub struct IoReader<R: Read> {
    inner: R,
}

impl<R: Read> IoReader<R> {
    pub fn new(inner: R) -> Self {
        IoReader { inner }
    }
}

impl<R: Read> Reader for IoReader<R> {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.inner.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }
}

/// Reads bytes out of a borrowed slice (original: `lsml_reader_from_string`,
/// whose own header warns it mutates the caller's pointer/length as it
/// consumes; here the cursor lives inside this adapter instead, so there is
/// no caller-visible mutation hazard).
pub struct StringReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> StringReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        StringReader { bytes, pos: 0 }
    }
}

impl Reader for StringReader<'_> {
    fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }
}

pub fn from_io<R: Read>(reader: R) -> IoReader<R> {
    IoReader::new(reader)
}

pub fn from_bytes(bytes: &[u8]) -> StringReader<'_> {
    StringReader::new(bytes)
}

/// A one-byte-at-a-time output sink.
pub trait Writer {
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &b in bytes {
            self.write_byte(b)?;
        }
        Ok(())
    }
}

/// Wraps any [`std::io::Write`] as a byte-at-a-time [`Writer`] (original:
/// `lsml_writer_to_stream`/`lsml_writer_to_buffer`, unified here since Rust's
/// `Write` already abstracts over streams and in-memory buffers alike).
pub struct IoWriter<W: Write> {
    inner: W,
}

impl<W: Write> IoWriter<W> {
    pub fn new(inner: W) -> Self {
        IoWriter { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Writer for IoWriter<W> {
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.inner.write_all(&[byte])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }
}

pub fn to_io<W: Write>(writer: W) -> IoWriter<W> {
    IoWriter::new(writer)
}
