//! Resynchronising header scan.
//!
//! The scanner slides a 60-byte window forward one byte at a time and stops
//! at the first window that decodes as a [`Header`].  Bytes in front of that
//! window are skipped.  When no window matches, every start position that was
//! fully tested is reported as discardable and only the last 59 bytes need to
//! be kept for the next attempt; the outcome therefore does not depend on
//! where the input was split into chunks.

use crate::header::{Header, HEADER_SIZE, TERMINATOR};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Scan {
    /// A header starts `skipped` bytes into the buffer.
    Found { skipped: usize, header: Header },
    /// No header yet.  The first `discard` bytes can never start one.
    Pending { discard: usize },
}

pub(crate) fn find_header(buf: &[u8]) -> Scan {
    if buf.len() < HEADER_SIZE {
        return Scan::Pending { discard: 0 };
    }
    for (start, window) in buf.windows(HEADER_SIZE).enumerate() {
        // Cheap rejection before the full field parse.
        if window[HEADER_SIZE - 2..] != TERMINATOR {
            continue;
        }
        let Ok(window) = <&[u8; HEADER_SIZE]>::try_from(window) else {
            continue;
        };
        if let Some(header) = Header::decode(window) {
            return Scan::Found { skipped: start, header };
        }
    }
    Scan::Pending { discard: buf.len() - (HEADER_SIZE - 1) }
}
