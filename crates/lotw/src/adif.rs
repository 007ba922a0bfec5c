// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! ADIF report parsing.
//!
//! Parsing happens in two layers. [`RecordTokenizer`] splits a byte stream into raw records
//! on the `<EOR>` marker, wherever it appears, and strips the `<EOH>`-terminated header. Then
//! [`decode_record`] turns one raw record into a [`Record`] of `<NAME:LENGTH[:TYPE]>VALUE` fields.
//!
//! Decoding is best effort and never fails: stray angle brackets, tags without a numeric length
//! and lengths that run past the end of the record all degrade to missing or truncated fields.
//! Callers interpret known fields defensively.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};

use tracing::trace;

use crate::constants::{END_OF_HEADER, END_OF_RECORD};
use crate::errors::ParseError;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// One decoded contact: uppercase field name to raw value. No fixed schema.
pub type Record = BTreeMap<String, String>;

/// A parsed `<NAME:LENGTH[:TYPE]>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTag {
    pub name: String,
    pub length: usize,
    /// Recognized but never interpreted.
    pub type_hint: Option<String>,
}

/// Parses the content between `<` and `>`.
///
/// Returns `None` for anything that is not a data field, e.g. `<EOH>` or a tag whose length is
/// not a non-negative integer.
#[must_use]
pub fn parse_tag(content: &str) -> Option<FieldTag> {
    let mut parts = content.split(':');
    let name = parts.next()?.to_uppercase();
    let length = parts.next()?.parse::<usize>().ok()?;
    let type_hint = parts.next().map(str::to_string);
    Some(FieldTag {
        name,
        length,
        type_hint,
    })
}

/// Decodes the tagged fields of one raw record.
///
/// Declared lengths count bytes. A record that is valid UTF-8 is decoded as such, with a length
/// that lands inside a character backed off to the previous boundary. Any other record is read as
/// ISO-8859-1, the legacy ADIF character set, so every byte is one character.
///
/// A later duplicate of a field overwrites the earlier value. A record without any valid tag
/// decodes to an empty map.
#[must_use]
pub fn decode_record(raw: &[u8]) -> Record {
    let utf8 = std::str::from_utf8(raw).is_ok();
    let mut record = Record::new();
    let mut rest = raw;

    while let Some(open) = rest.iter().position(|&b| b == b'<') {
        let Some(close) = rest[open..]
            .iter()
            .position(|&b| b == b'>')
            .map(|offset| open + offset)
        else {
            // unterminated tag, nothing left to decode
            break;
        };
        let value_and_rest = &rest[close + 1..];

        match std::str::from_utf8(&rest[open + 1..close]).ok().and_then(parse_tag) {
            Some(tag) => {
                let end = if utf8 {
                    clip_to_boundary(value_and_rest, tag.length)
                } else {
                    tag.length.min(value_and_rest.len())
                };
                let value = &value_and_rest[..end];
                let value = if utf8 {
                    String::from_utf8_lossy(value).into_owned()
                } else {
                    value.iter().map(|&b| char::from(b)).collect()
                };
                record.insert(tag.name, value);
                rest = &value_and_rest[end..];
            }
            None => {
                trace!(
                    "Skipping non-data tag: {}",
                    String::from_utf8_lossy(&rest[open..=close])
                );
                rest = value_and_rest;
            }
        }
    }

    record
}

/// Clamps a declared length to what is left of `bytes`, backing off to a UTF-8 char boundary.
fn clip_to_boundary(bytes: &[u8], length: usize) -> usize {
    let mut end = length.min(bytes.len());
    // continuation bytes are 0b10xx_xxxx
    while end > 0 && end < bytes.len() && bytes[end] & 0xC0 == 0x80 {
        end -= 1;
    }
    end
}

fn trim_ascii_whitespace(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !first.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}

fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Lazily splits a report stream into raw records.
///
/// Records are delimited by a case-insensitive `<EOR>` anywhere in the stream, not by lines. A
/// trailing fragment without a marker is still yielded, so the last item may be malformed.
/// Whitespace-only fragments are dropped. A record longer than `max_record_bytes` fails with
/// [`ParseError::StreamTooLarge`], whether or not it arrived in a single read. The iterator ends
/// after the first error.
pub struct RecordTokenizer<R> {
    reader: R,
    buf: Vec<u8>,
    // bytes at the front of `buf` already known not to start a marker
    searched: usize,
    max_record_bytes: usize,
    header_stripped: bool,
    eof: bool,
    done: bool,
}

impl<R: Read> RecordTokenizer<R> {
    #[must_use]
    pub fn new(reader: R, max_record_bytes: usize) -> Self {
        RecordTokenizer {
            reader,
            buf: Vec::new(),
            searched: 0,
            max_record_bytes,
            header_stripped: false,
            eof: false,
            done: false,
        }
    }

    fn take_record(&mut self, end: usize, consumed: usize) -> Option<Vec<u8>> {
        let fragment: Vec<u8> = self.buf.drain(..consumed).take(end).collect();
        self.searched = 0;
        self.finish_fragment(&fragment)
    }

    fn too_large(&mut self) -> ParseError {
        self.done = true;
        ParseError::StreamTooLarge {
            limit: self.max_record_bytes,
        }
    }

    fn finish_fragment(&mut self, fragment: &[u8]) -> Option<Vec<u8>> {
        let mut fragment = fragment;
        if !self.header_stripped {
            if let Some(idx) = find_ignore_ascii_case(fragment, END_OF_HEADER) {
                trace!("Stripped {} byte report header", idx);
                fragment = &fragment[idx + END_OF_HEADER.len()..];
                self.header_stripped = true;
            }
        }
        let fragment = trim_ascii_whitespace(fragment);
        if fragment.is_empty() {
            None
        } else {
            Some(fragment.to_vec())
        }
    }

    fn fill_buf(&mut self) -> std::io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Iterator for RecordTokenizer<R> {
    type Item = Result<Vec<u8>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some(offset) = find_ignore_ascii_case(&self.buf[self.searched..], END_OF_RECORD)
            {
                let end = self.searched + offset;
                if end > self.max_record_bytes {
                    return Some(Err(self.too_large()));
                }
                match self.take_record(end, end + END_OF_RECORD.len()) {
                    Some(record) => return Some(Ok(record)),
                    None => continue,
                }
            }
            // a marker may straddle the next read
            self.searched = self.buf.len().saturating_sub(END_OF_RECORD.len() - 1);

            // until EOF, the buffer may also hold the start of the marker
            let limit = if self.eof {
                self.max_record_bytes
            } else {
                self.max_record_bytes.saturating_add(END_OF_RECORD.len() - 1)
            };
            if self.buf.len() > limit {
                return Some(Err(self.too_large()));
            }

            if self.eof {
                self.done = true;
                let fragment = std::mem::take(&mut self.buf);
                return self.finish_fragment(&fragment).map(Ok);
            }

            if let Err(e) = self.fill_buf() {
                self.done = true;
                return Some(Err(e.into()));
            }
        }
        None
    }
}

/// Tokenizes and decodes a whole report, dropping records without any field.
pub fn parse<R: Read>(reader: R, max_record_bytes: usize) -> Result<Vec<Record>, ParseError> {
    let mut records = Vec::new();
    for raw in RecordTokenizer::new(reader, max_record_bytes) {
        let record = decode_record(&raw?);
        if !record.is_empty() {
            records.push(record);
        }
    }
    Ok(records)
}
