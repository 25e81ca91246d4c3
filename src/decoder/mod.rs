//! Push-driven archive decoder.
//!
//! # State machine
//!
//! ```text
//! AwaitingSignature ──► Scanning ◄──► Streaming
//!          │                │             │
//!          └──── error ─────┴── finish ───┴──► Terminated
//! ```
//!
//! [`Decoder::consume`] accepts chunks of any size, down to a single byte.
//! Unused bytes are carried over to the next call, so the sequence of
//! entries produced depends only on the cumulative byte order of the input,
//! never on how it was chunked.
//!
//! # Resynchronisation
//!
//! While scanning, bytes that do not form a valid header are skipped one at a
//! time until one does.  A corrupt stream therefore yields
//! fewer entries instead of an error.  Only a bad signature is fatal.
//!
//! # Backpressure
//!
//! Each entry's channel holds at most [`DecoderOptions::entry_buffer`] bytes.
//! When it is full the decoder stops delivering and [`Decoder::is_paused`]
//! turns true; undelivered bytes stay in the carry-over buffer.  Drain the
//! [`EntryReader`] and call [`Decoder::resume`] to continue.

mod scanner;

use std::mem;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::entry::{entry_channel, AbortCause, EntryReader, EntrySender};
use crate::error::{ArError, Result};
use crate::header::{Header, HEADER_SIZE, MAGIC, MAGIC_SIZE};
use scanner::{find_header, Scan};

/// Default per-entry buffer: 64 KiB.
pub const DEFAULT_ENTRY_BUFFER: usize = 64 * 1024;
/// Default read size used by the helpers that drive a decoder from a reader.
pub const DEFAULT_READ_CHUNK:   usize = 16 * 1024;

/// Configuration for [`Decoder::with_options`].
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Bytes an entry may buffer before the decoder pauses.
    pub entry_buffer: usize,
    /// Chunk size for [`crate::archive`] helpers reading from `io::Read`.
    pub read_chunk:   usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            entry_buffer: DEFAULT_ENTRY_BUFFER,
            read_chunk:   DEFAULT_READ_CHUNK,
        }
    }
}

/// One decoded archive member: its header and a reader for its data.
#[derive(Debug)]
pub struct Entry {
    pub header: Header,
    pub data:   EntryReader,
}

impl Entry {
    pub fn into_parts(self) -> (Header, EntryReader) {
        (self.header, self.data)
    }
}

/// Counters reported by [`Decoder::summary`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeSummary {
    pub entries:        u64,
    pub bytes_consumed: u64,
    /// Bytes dropped while searching for the next header.
    pub bytes_skipped:  u64,
    /// Entries cut short by the end of input.
    pub truncated:      u64,
}

#[derive(Debug)]
struct OpenEntry {
    sender:    EntrySender,
    name:      String,
    remaining: u64,
}

#[derive(Debug)]
enum Phase {
    AwaitingSignature,
    Scanning,
    Streaming(OpenEntry),
    Terminated,
}

/// Incremental `ar` decoder.  See the module docs.
#[derive(Debug)]
pub struct Decoder {
    options: DecoderOptions,
    phase:   Phase,
    /// Carry-over bytes; everything before `pos` has been consumed.
    buf:     Vec<u8>,
    pos:     usize,
    /// Set by `finish`: deliver without regard to channel capacity.
    eof:     bool,
    summary: DecodeSummary,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_options(DecoderOptions::default())
    }

    pub fn with_options(options: DecoderOptions) -> Self {
        Self {
            options,
            phase:   Phase::AwaitingSignature,
            buf:     Vec::new(),
            pos:     0,
            eof:     false,
            summary: DecodeSummary::default(),
        }
    }

    /// Feed one chunk of input and return the entries whose headers were
    /// recognised, in archive order.
    ///
    /// Data already buffered for those entries is delivered before this
    /// returns.  An invalid signature terminates the decoder.
    pub fn consume(&mut self, chunk: &[u8]) -> Result<Vec<Entry>> {
        if matches!(self.phase, Phase::Terminated) {
            return Err(ArError::Terminated);
        }
        self.buf.extend_from_slice(chunk);
        self.summary.bytes_consumed += chunk.len() as u64;

        let mut entries = Vec::new();
        let result = self.advance(&mut entries);
        self.compact();
        match result {
            Ok(()) => Ok(entries),
            Err(err) => {
                self.terminate();
                Err(err)
            }
        }
    }

    /// Retry delivery after the consumer drained the open entry.
    pub fn resume(&mut self) -> Result<Vec<Entry>> {
        self.consume(&[])
    }

    /// True while the open entry's buffer is full.
    pub fn is_paused(&self) -> bool {
        match &self.phase {
            Phase::Streaming(open) => !open.sender.has_capacity(),
            _ => false,
        }
    }

    /// Signal end of input.
    ///
    /// Buffered bytes are delivered regardless of backpressure, so entries
    /// still hidden behind a paused one are returned here.  An entry left
    /// short is aborted with [`ArError::Truncated`]; input that never carried
    /// a complete signature is [`ArError::InvalidSignature`].
    pub fn finish(&mut self) -> Result<Vec<Entry>> {
        if matches!(self.phase, Phase::Terminated) {
            return Err(ArError::Terminated);
        }
        if matches!(self.phase, Phase::AwaitingSignature) {
            let found = String::from_utf8_lossy(&self.buf[self.pos..]).into_owned();
            self.terminate();
            return Err(ArError::InvalidSignature { found });
        }

        self.eof = true;
        let mut entries = Vec::new();
        self.advance(&mut entries)?;

        match mem::replace(&mut self.phase, Phase::Terminated) {
            Phase::Streaming(open) => {
                warn!(name = %open.name, missing = open.remaining, "input ended inside entry");
                self.summary.truncated += 1;
                open.sender.abort(AbortCause::Truncated { missing: open.remaining });
            }
            _ => {
                let leftover = self.buf.len() - self.pos;
                if leftover > 0 {
                    trace!(bytes = leftover, "discarding trailing bytes");
                    self.summary.bytes_skipped += leftover as u64;
                }
            }
        }
        self.buf = Vec::new();
        self.pos = 0;
        debug!(
            entries = self.summary.entries,
            consumed = self.summary.bytes_consumed,
            skipped = self.summary.bytes_skipped,
            "archive decoded"
        );
        Ok(entries)
    }

    /// Stop decoding.  An open entry is aborted with `reason`.
    pub fn abort(&mut self, reason: &str) {
        if let Phase::Streaming(open) = mem::replace(&mut self.phase, Phase::Terminated) {
            warn!(name = %open.name, reason, "decoder aborted mid-entry");
            open.sender.abort(AbortCause::Cancelled(reason.to_owned()));
        }
        self.buf = Vec::new();
        self.pos = 0;
    }

    pub fn summary(&self) -> &DecodeSummary {
        &self.summary
    }

    /// Bytes held over for the next call.
    pub fn carried(&self) -> usize {
        self.buf.len() - self.pos
    }

    // ── State machine ────────────────────────────────────────────────────────

    fn advance(&mut self, entries: &mut Vec<Entry>) -> Result<()> {
        loop {
            match self.phase {
                Phase::AwaitingSignature => {
                    let pending = &self.buf[self.pos..];
                    if pending.len() < MAGIC_SIZE {
                        return Ok(());
                    }
                    let signature = &pending[..MAGIC_SIZE];
                    if signature != MAGIC {
                        return Err(ArError::InvalidSignature {
                            found: String::from_utf8_lossy(signature).into_owned(),
                        });
                    }
                    self.pos += MAGIC_SIZE;
                    self.phase = Phase::Scanning;
                }

                Phase::Streaming(ref mut open) => {
                    let pending = &self.buf[self.pos..];
                    let wanted = usize::try_from(open.remaining)
                        .map_or(pending.len(), |r| r.min(pending.len()));
                    let taken = if self.eof {
                        open.sender.deliver_all(&pending[..wanted])
                    } else {
                        open.sender.deliver(&pending[..wanted])
                    };
                    self.pos += taken;
                    open.remaining -= taken as u64;
                    if open.remaining > 0 {
                        // Out of input, or the consumer is full.
                        return Ok(());
                    }
                    if let Phase::Streaming(open) = mem::replace(&mut self.phase, Phase::Scanning) {
                        trace!(name = %open.name, bytes = open.sender.delivered(), "entry complete");
                        open.sender.complete();
                    }
                }

                Phase::Scanning => match find_header(&self.buf[self.pos..]) {
                    Scan::Found { skipped, header } => {
                        if skipped > 0 {
                            trace!(bytes = skipped, "skipped bytes before header");
                            self.summary.bytes_skipped += skipped as u64;
                        }
                        self.pos += skipped + HEADER_SIZE;
                        self.summary.entries += 1;
                        debug!(name = %header.name, size = header.size, "entry");

                        let (sender, reader) = entry_channel(&header.name, self.options.entry_buffer);
                        self.phase = Phase::Streaming(OpenEntry {
                            sender,
                            name: header.name.clone(),
                            remaining: header.size,
                        });
                        entries.push(Entry { header, data: reader });
                    }
                    Scan::Pending { discard } => {
                        if discard > 0 {
                            trace!(bytes = discard, "no header in window, discarding");
                            self.summary.bytes_skipped += discard as u64;
                            self.pos += discard;
                        }
                        return Ok(());
                    }
                },

                Phase::Terminated => return Err(ArError::Terminated),
            }
        }
    }

    fn terminate(&mut self) {
        self.abort("decoder terminated");
    }

    fn compact(&mut self) {
        if self.pos == self.buf.len() {
            self.buf.clear();
        } else if self.pos > 0 {
            self.buf.drain(..self.pos);
        }
        self.pos = 0;
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.abort("decoder dropped");
    }
}
