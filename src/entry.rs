//! Per-entry data sources.
//!
//! When the decoder recognises a header it creates a channel: the
//! [`EntrySender`] stays with the decoder and the [`EntryReader`] goes to the
//! consumer, often before any of the entry's bytes have arrived.  Bytes are
//! copied into the channel as owned segments and moved out again on read, so
//! the reader never aliases the decoder's carry-over buffer.
//!
//! The channel is bounded by a byte capacity.  A full channel refuses further
//! bytes, which is how the decoder learns that it must pause.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use crate::error::{ArError, Result};

/// Why an entry ended before its declared size was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    /// Input ended with `missing` bytes of the entry still outstanding.
    Truncated { missing: u64 },
    /// The decoder was aborted or dropped.
    Cancelled(String),
}

impl AbortCause {
    fn to_error(&self, name: &str) -> ArError {
        match self {
            AbortCause::Truncated { missing } => ArError::Truncated {
                name:    name.to_owned(),
                missing: *missing,
            },
            AbortCause::Cancelled(reason) => ArError::EntryAborted {
                name:   name.to_owned(),
                reason: reason.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// More bytes may still arrive.
    Open,
    /// Every declared byte has been delivered.
    Complete,
    Aborted(AbortCause),
}

/// Result of [`EntryReader::try_next_chunk`].
#[derive(Debug, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    /// Nothing buffered yet; the entry is still open.
    Pending,
    /// Everything was delivered and read.
    End,
}

#[derive(Debug)]
struct Channel {
    segments: VecDeque<Vec<u8>>,
    /// Read position inside the front segment.
    offset:   usize,
    buffered: usize,
    capacity: usize,
    state:    EntryState,
}

/// Create a connected sender/reader pair for the entry called `name`.
///
/// `capacity` bounds the bytes buffered between the two ends; it is raised
/// to 1 so that a channel can always make progress.
pub fn entry_channel(name: &str, capacity: usize) -> (EntrySender, EntryReader) {
    let shared = Rc::new(RefCell::new(Channel {
        segments: VecDeque::new(),
        offset:   0,
        buffered: 0,
        capacity: capacity.max(1),
        state:    EntryState::Open,
    }));
    let sender = EntrySender { shared: Rc::clone(&shared), delivered: 0 };
    let reader = EntryReader { name: name.to_owned(), shared };
    (sender, reader)
}

// ── Sender ───────────────────────────────────────────────────────────────────

/// Decoder-side half: push bytes, then either complete or abort.
///
/// Both terminal operations consume the sender, so an entry is closed at most
/// once.  Dropping an open sender aborts the entry.
#[derive(Debug)]
pub struct EntrySender {
    shared:    Rc<RefCell<Channel>>,
    delivered: u64,
}

impl EntrySender {
    /// Copy as much of `bytes` as the channel has room for and return the
    /// number of bytes taken.
    ///
    /// If the reader has been dropped every byte is accepted and discarded.
    pub fn deliver(&mut self, bytes: &[u8]) -> usize {
        let room = if self.reader_dropped() {
            bytes.len()
        } else {
            let ch = self.shared.borrow();
            ch.capacity.saturating_sub(ch.buffered)
        };
        self.push(&bytes[..bytes.len().min(room)])
    }

    /// Copy all of `bytes`, ignoring the capacity.  Used once input has ended
    /// and pausing would gain nothing.
    pub fn deliver_all(&mut self, bytes: &[u8]) -> usize {
        self.push(bytes)
    }

    fn push(&mut self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        self.delivered += bytes.len() as u64;
        if !self.reader_dropped() {
            let mut ch = self.shared.borrow_mut();
            ch.buffered += bytes.len();
            ch.segments.push_back(bytes.to_vec());
        }
        bytes.len()
    }

    pub fn has_capacity(&self) -> bool {
        if self.reader_dropped() {
            return true;
        }
        let ch = self.shared.borrow();
        ch.buffered < ch.capacity
    }

    /// Total bytes pushed through this sender.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Signal end-of-entry.
    pub fn complete(self) {
        self.shared.borrow_mut().state = EntryState::Complete;
    }

    /// Put the entry into the aborted state; the reader fails once its
    /// buffered bytes are exhausted.
    pub fn abort(self, cause: AbortCause) {
        self.shared.borrow_mut().state = EntryState::Aborted(cause);
    }

    fn reader_dropped(&self) -> bool {
        Rc::strong_count(&self.shared) == 1
    }
}

impl Drop for EntrySender {
    fn drop(&mut self) {
        let mut ch = self.shared.borrow_mut();
        if ch.state == EntryState::Open {
            ch.state = EntryState::Aborted(AbortCause::Cancelled("entry source dropped".into()));
        }
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Consumer-side half: a forward-only byte sequence for one entry.
///
/// [`Read`] returns `WouldBlock` while the entry is open and nothing is
/// buffered, `Ok(0)` after completion, and an error once an aborted entry
/// has been drained.
#[derive(Debug)]
pub struct EntryReader {
    name:   String,
    shared: Rc<RefCell<Channel>>,
}

impl EntryReader {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> EntryState {
        self.shared.borrow().state.clone()
    }

    /// Bytes delivered but not yet read.
    pub fn buffered(&self) -> usize {
        self.shared.borrow().buffered
    }

    /// True once the entry completed and every byte was read.
    pub fn is_finished(&self) -> bool {
        let ch = self.shared.borrow();
        ch.state == EntryState::Complete && ch.buffered == 0
    }

    /// Take the next delivered segment whole.
    pub fn try_next_chunk(&mut self) -> Result<Chunk> {
        let mut ch = self.shared.borrow_mut();
        if let Some(mut segment) = ch.segments.pop_front() {
            let offset = std::mem::take(&mut ch.offset);
            if offset > 0 {
                segment.drain(..offset);
            }
            ch.buffered -= segment.len();
            return Ok(Chunk::Data(segment));
        }
        match &ch.state {
            EntryState::Open => Ok(Chunk::Pending),
            EntryState::Complete => Ok(Chunk::End),
            EntryState::Aborted(cause) => Err(cause.to_error(&self.name)),
        }
    }

    /// Write every buffered byte to `out` and return how many were written.
    /// Fails if the entry was aborted and nothing is left to drain.
    pub fn drain_to<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        let mut written = 0u64;
        loop {
            match self.try_next_chunk()? {
                Chunk::Data(segment) => {
                    out.write_all(&segment)?;
                    written += segment.len() as u64;
                }
                Chunk::Pending | Chunk::End => return Ok(written),
            }
        }
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut ch = self.shared.borrow_mut();
        let Channel { segments, offset, buffered, state, .. } = &mut *ch;
        if let Some(front) = segments.front() {
            let available = &front[*offset..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            *offset += n;
            *buffered -= n;
            if *offset == front.len() {
                segments.pop_front();
                *offset = 0;
            }
            return Ok(n);
        }
        match state {
            EntryState::Open => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("entry `{}` has no buffered data yet", self.name),
            )),
            EntryState::Complete => Ok(0),
            EntryState::Aborted(cause) => Err(cause.to_error(&self.name).into()),
        }
    }
}
