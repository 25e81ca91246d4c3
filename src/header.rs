//! Fixed-width `ar` member header and the global archive signature.
//!
//! # Layout
//!
//! | Field      | Offset | Width | Encoding                          |
//! |------------|--------|-------|-----------------------------------|
//! | name       | 0      | 16    | text, space padded                |
//! | mtime      | 16     | 12    | decimal seconds since the epoch   |
//! | owner id   | 28     | 6     | decimal                           |
//! | group id   | 34     | 6     | decimal                           |
//! | mode       | 40     | 8     | decimal (6 digits + 2 pad bytes)  |
//! | size       | 48     | 10    | decimal byte count                |
//! | terminator | 58     | 2     | `` "`\n" ``                       |
//!
//! Every field is ASCII, left-justified and padded with spaces.  The mode is
//! written in decimal, not octal: `644` on disk means the number 644.

use std::ops::Range;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Global signature at offset 0 of every archive.
pub const MAGIC: [u8; 8] = *b"!<arch>\n";
pub const MAGIC_SIZE: usize = MAGIC.len();

/// Size of one member header on disk.
pub const HEADER_SIZE: usize = 60;

/// Last two bytes of every member header.
pub const TERMINATOR: [u8; 2] = *b"`\n";

pub const DEFAULT_MODE: u32 = 644;

/// Largest size the 10-digit size field can carry.
pub const MAX_ENTRY_SIZE: u64 = 9_999_999_999;

const NAME:  Range<usize> = 0..16;
const MTIME: Range<usize> = 16..28;
const OWNER: Range<usize> = 28..34;
const GROUP: Range<usize> = 34..40;
const MODE:  Range<usize> = 40..48;
const SIZE:  Range<usize> = 48..58;
const TERM:  Range<usize> = 58..60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name:     String,
    /// Seconds since the Unix epoch.
    pub mtime:    u64,
    pub owner_id: u32,
    pub group_id: u32,
    pub mode:     u32,
    /// Number of data bytes that follow the header.
    pub size:     u64,
}

impl Header {
    /// A header with owner 0, group 0 and mode 644.
    pub fn new(name: impl Into<String>, mtime: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            mtime,
            owner_id: 0,
            group_id: 0,
            mode: DEFAULT_MODE,
            size,
        }
    }

    /// Decode one 60-byte window.
    ///
    /// Returns `None` when any field fails to parse, the name is empty or the
    /// terminator does not match.  Callers scanning for the next header treat
    /// every failure the same way, so no reason is reported.
    pub fn decode(window: &[u8; HEADER_SIZE]) -> Option<Self> {
        if window[TERM] != TERMINATOR {
            return None;
        }
        let name = std::str::from_utf8(&window[NAME]).ok()?.trim_end_matches(' ');
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name:     name.to_owned(),
            mtime:    parse_decimal(&window[MTIME])?,
            owner_id: u32::try_from(parse_decimal(&window[OWNER])?).ok()?,
            group_id: u32::try_from(parse_decimal(&window[GROUP])?).ok()?,
            mode:     u32::try_from(parse_decimal(&window[MODE])?).ok()?,
            size:     parse_decimal(&window[SIZE])?,
        })
    }

    /// Encode into the on-disk layout.
    ///
    /// Names longer than 16 bytes are truncated at a character boundary.
    /// Numbers wider than their field saturate to all nines; the encoder
    /// rejects oversized entries before they get here.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [b' '; HEADER_SIZE];
        write_text(&mut out[NAME], &self.name);
        write_decimal(&mut out[MTIME], self.mtime);
        write_decimal(&mut out[OWNER], u64::from(self.owner_id));
        write_decimal(&mut out[GROUP], u64::from(self.group_id));
        write_decimal(&mut out[MODE.start..MODE.start + 6], u64::from(self.mode));
        write_decimal(&mut out[SIZE], self.size);
        out[TERM].copy_from_slice(&TERMINATOR);
        out
    }

    /// Modification time as a calendar timestamp.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.mtime).ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

/// Encode a header with the default owner, group and mode.
pub fn encode_header(name: &str, mtime: u64, size: u64) -> [u8; HEADER_SIZE] {
    Header::new(name, mtime, size).encode()
}

/// Decimal digits surrounded by optional spaces.  Blank fields, embedded
/// spaces, signs and overflow all fail.
fn parse_decimal(field: &[u8]) -> Option<u64> {
    let start = field.iter().position(|&c| c != b' ')?;
    let end = field.iter().rposition(|&c| c != b' ')? + 1;
    let mut result: u64 = 0;
    for &c in &field[start..end] {
        let digit = (c as char).to_digit(10)?;
        result = result.checked_mul(10)?.checked_add(u64::from(digit))?;
    }
    Some(result)
}

/// The part of `name` that fits the 16-byte name field.
pub(crate) fn stored_name(name: &str) -> &str {
    truncate(name, NAME.len())
}

fn truncate(text: &str, max: usize) -> &str {
    let mut len = text.len().min(max);
    while !text.is_char_boundary(len) {
        len -= 1;
    }
    &text[..len]
}

fn write_text(out: &mut [u8], text: &str) {
    let text = truncate(text, out.len());
    out[..text.len()].copy_from_slice(text.as_bytes());
}

fn write_decimal(out: &mut [u8], value: u64) {
    let digits = value.to_string();
    if digits.len() > out.len() {
        out.fill(b'9');
    } else {
        out[..digits.len()].copy_from_slice(digits.as_bytes());
    }
}
