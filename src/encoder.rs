//! Sequential archive writer.
//!
//! [`Encoder`] writes the signature as soon as it is constructed, then one
//! member at a time: the 60-byte header followed by exactly the declared
//! number of data bytes.  Bytes beyond the declared size are dropped.  A
//! source that ends early is *not* zero-filled, so the archive is then short
//! of what its header declares; readers see that entry as truncated.
//!
//! Only one file may be in flight.  [`Encoder::begin_file`] takes the write
//! lock and [`Encoder::end_file`] releases it; [`Encoder::add_file`] does both
//! around a copy from an `io::Read`.  Starting a second file while one is
//! pending fails with [`ArError::WriteLocked`] and leaves the first intact.

use std::io::{self, Read, Write};
use std::path::Path;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{ArError, Result};
use crate::header::{stored_name, Header, DEFAULT_MODE, MAGIC, MAX_ENTRY_SIZE};

const COPY_BUFFER: usize = 8 * 1024;

/// Ownership and permission fields written into every header.
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub owner_id: u32,
    pub group_id: u32,
    /// Written as decimal text, e.g. `644`.
    pub mode:     u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self { owner_id: 0, group_id: 0, mode: DEFAULT_MODE }
    }
}

#[derive(Debug)]
enum Lock {
    Idle,
    Writing { name: String, remaining: u64, written: u64 },
    /// A sink or source error left the archive mid-entry.
    Poisoned,
    Closed,
}

pub struct Encoder<W: Write> {
    sink:    W,
    options: EncoderOptions,
    lock:    Lock,
    files:   u64,
}

impl<W: Write> Encoder<W> {
    pub fn new(sink: W) -> Result<Self> {
        Self::with_options(sink, EncoderOptions::default())
    }

    /// Write the signature to `sink` and return a ready encoder.
    pub fn with_options(mut sink: W, options: EncoderOptions) -> Result<Self> {
        sink.write_all(&MAGIC)?;
        Ok(Self { sink, options, lock: Lock::Idle, files: 0 })
    }

    // ── Two-phase writing ────────────────────────────────────────────────────

    /// Take the write lock and write the header for one member.
    ///
    /// Only the final path component of `name` is stored.  `mtime` defaults
    /// to the current time.
    pub fn begin_file(&mut self, name: &str, size: u64, mtime: Option<u64>) -> Result<()> {
        if !matches!(self.lock, Lock::Idle) {
            return Err(ArError::WriteLocked);
        }
        let name = archive_name(name)?;
        if size > MAX_ENTRY_SIZE {
            return Err(ArError::TooLarge { name, size });
        }
        let header = Header {
            name:     name.clone(),
            mtime:    mtime.unwrap_or_else(now),
            owner_id: self.options.owner_id,
            group_id: self.options.group_id,
            mode:     self.options.mode,
            size,
        };
        self.lock = Lock::Writing { name, remaining: size, written: 0 };
        let encoded = header.encode();
        self.write_or_poison(&encoded)
    }

    /// Write data for the pending member.
    ///
    /// Returns how many bytes of `bytes` were written; anything past the
    /// declared size is dropped.
    pub fn write_data(&mut self, bytes: &[u8]) -> Result<usize> {
        let take = match &self.lock {
            Lock::Writing { remaining, .. } => {
                usize::try_from(*remaining).map_or(bytes.len(), |r| r.min(bytes.len()))
            }
            Lock::Idle => return Err(ArError::NoPendingFile),
            Lock::Poisoned | Lock::Closed => return Err(ArError::WriteLocked),
        };
        self.write_or_poison(&bytes[..take])?;
        if let Lock::Writing { remaining, written, .. } = &mut self.lock {
            *remaining -= take as u64;
            *written += take as u64;
        }
        Ok(take)
    }

    /// Bytes still owed to the pending member, if any.
    pub fn remaining(&self) -> Option<u64> {
        match &self.lock {
            Lock::Writing { remaining, .. } => Some(*remaining),
            _ => None,
        }
    }

    /// Release the write lock and return the data bytes written for the
    /// member.  A short member is left short.
    pub fn end_file(&mut self) -> Result<u64> {
        match std::mem::replace(&mut self.lock, Lock::Idle) {
            Lock::Writing { name, remaining, written } => {
                if remaining > 0 {
                    warn!(%name, written, missing = remaining, "source ended before declared size");
                }
                debug!(%name, bytes = written, "file written");
                self.files += 1;
                Ok(written)
            }
            Lock::Idle => Err(ArError::NoPendingFile),
            other => {
                self.lock = other;
                Err(ArError::WriteLocked)
            }
        }
    }

    // ── Whole-file helpers ───────────────────────────────────────────────────

    /// Add one member whose data comes from `source`.
    ///
    /// Reading stops at end of input or once `size` bytes were written.
    pub fn add_file<R: Read>(
        &mut self,
        mut source: R,
        name:       &str,
        size:       u64,
        mtime:      Option<u64>,
    ) -> Result<u64> {
        self.begin_file(name, size, mtime)?;
        let mut buf = vec![0u8; COPY_BUFFER];
        while self.remaining().unwrap_or(0) > 0 {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.lock = Lock::Poisoned;
                    return Err(e.into());
                }
            };
            self.write_data(&buf[..n])?;
        }
        self.end_file()
    }

    /// Add an in-memory member; its size is `data.len()`.
    pub fn add_bytes(&mut self, name: &str, data: &[u8], mtime: Option<u64>) -> Result<u64> {
        self.begin_file(name, data.len() as u64, mtime)?;
        self.write_data(data)?;
        self.end_file()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Lock the encoder for good and flush the sink.
    pub fn close(&mut self) -> Result<()> {
        if let Lock::Writing { name, .. } = &self.lock {
            warn!(%name, "closing with a file still pending");
        }
        self.lock = Lock::Closed;
        self.sink.flush()?;
        debug!(files = self.files, "archive closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.lock, Lock::Closed)
    }

    /// Members completed so far.
    pub fn files(&self) -> u64 {
        self.files
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Close (if not already) and return the sink.
    pub fn into_inner(mut self) -> Result<W> {
        if !self.is_closed() {
            self.close()?;
        }
        Ok(self.sink)
    }

    fn write_or_poison(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.sink.write_all(bytes) {
            self.lock = Lock::Poisoned;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Final path component of `name`, cut to what the header can hold.
fn archive_name(name: &str) -> Result<String> {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let stored = stored_name(&base);
    if stored.trim_end_matches(' ').is_empty() {
        return Err(ArError::InvalidName(name.to_owned()));
    }
    Ok(stored.to_owned())
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
