//! High-level helpers built on [`Encoder`] and [`Decoder`].
//!
//! ```no_run
//! use arstream::archive::{pack_dir, unpack};
//! use arstream::{DecoderOptions, EncoderOptions};
//! use std::fs::File;
//!
//! // Write
//! let mut ar = pack_dir("assets", File::create("assets.a")?, EncoderOptions::default())?;
//! ar.add_bytes("extra.txt", b"Hello, world!", None)?;
//! ar.close()?;
//!
//! // Read
//! let summary = unpack(File::open("assets.a")?, "out", &DecoderOptions::default())?;
//! println!("{} entries", summary.entries);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, info, warn};

use crate::decoder::{DecodeSummary, Decoder, DecoderOptions, Entry};
use crate::encoder::{Encoder, EncoderOptions};
use crate::entry::EntryReader;
use crate::error::{ArError, Result};
use crate::header::Header;

// ── Packing ───────────────────────────────────────────────────────────────────

/// Build an archive from the regular files directly inside `dir`.
///
/// Files are added in name order with their on-disk size and modification
/// time.  Subdirectories are not descended into.  The path is checked before
/// anything is written to `sink`.  The returned encoder is still open so the
/// caller can add more members before closing it.
pub fn pack_dir<P: AsRef<Path>, W: Write>(
    dir:     P,
    sink:    W,
    options: EncoderOptions,
) -> Result<Encoder<W>> {
    let dir = dir.as_ref();
    let meta = match fs::metadata(dir) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArError::Setup(format!("path does not exist: {}", dir.display())));
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_dir() {
        return Err(ArError::Setup(format!("path is a file, not a folder: {}", dir.display())));
    }

    let mut files: Vec<(PathBuf, fs::Metadata)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let meta = fs::metadata(&path)?;
        if meta.is_file() {
            files.push((path, meta));
        }
    }
    files.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

    let mut encoder = Encoder::with_options(sink, options)?;
    for (path, meta) in files {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        let name = path.to_string_lossy();
        encoder.add_file(File::open(&path)?, &name, meta.len(), mtime)?;
        info!(path = %path.display(), size = meta.len(), "packed");
    }
    Ok(encoder)
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Receives decoder output while [`drive`] pumps a reader through it.
trait EntryVisitor {
    fn entry(&mut self, entry: Entry) -> Result<()>;

    /// Called after every decoder step to drain buffered entry data.
    fn pump(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Feed `source` through a decoder, honouring pause/resume, until end of
/// input.
fn drive<R: Read, V: EntryVisitor>(
    mut source: R,
    options:    &DecoderOptions,
    visitor:    &mut V,
) -> Result<DecodeSummary> {
    let mut decoder = Decoder::with_options(options.clone());
    let mut buf = vec![0u8; options.read_chunk.max(1)];
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                decoder.abort(&e.to_string());
                return Err(e.into());
            }
        };
        let mut entries = decoder.consume(&buf[..n])?;
        loop {
            for entry in entries {
                visitor.entry(entry)?;
            }
            visitor.pump()?;
            if !decoder.is_paused() {
                break;
            }
            entries = decoder.resume()?;
        }
    }
    for entry in decoder.finish()? {
        visitor.entry(entry)?;
    }
    visitor.pump()?;
    Ok(decoder.summary().clone())
}

struct Extractor {
    dest:    PathBuf,
    current: Option<(EntryReader, BufWriter<File>)>,
}

impl Extractor {
    fn flush_current(&mut self) -> Result<()> {
        if let Some((reader, out)) = &mut self.current {
            reader.drain_to(out)?;
            if reader.is_finished() {
                out.flush()?;
                debug!(name = reader.name(), "extracted");
                self.current = None;
            }
        }
        Ok(())
    }
}

impl EntryVisitor for Extractor {
    fn entry(&mut self, entry: Entry) -> Result<()> {
        self.flush_current()?;
        let (header, reader) = entry.into_parts();
        let Some(file_name) = Path::new(&header.name).file_name() else {
            warn!(name = %header.name, "skipping entry without a usable file name");
            return Ok(());
        };
        let path = self.dest.join(file_name);
        debug!(path = %path.display(), size = header.size, "extracting");
        let out = BufWriter::new(File::create(&path)?);
        self.current = Some((reader, out));
        self.flush_current()
    }

    fn pump(&mut self) -> Result<()> {
        self.flush_current()
    }
}

/// Extract every entry of the archive read from `source` into `dest`.
///
/// Only the final path component of each entry name is used.  An entry cut
/// short by the end of input fails with [`ArError::Truncated`] after its
/// available bytes were written.
pub fn unpack<R: Read, P: AsRef<Path>>(
    source:  R,
    dest:    P,
    options: &DecoderOptions,
) -> Result<DecodeSummary> {
    let dest = dest.as_ref();
    fs::create_dir_all(dest)?;
    let mut extractor = Extractor { dest: dest.to_path_buf(), current: None };
    drive(source, options, &mut extractor)
}

struct Lister(Vec<Header>);

impl EntryVisitor for Lister {
    fn entry(&mut self, entry: Entry) -> Result<()> {
        // Dropping the reader discards its data without pausing the decoder.
        self.0.push(entry.header);
        Ok(())
    }
}

/// Read the archive from `source` and return its headers in archive order.
pub fn list<R: Read>(source: R, options: &DecoderOptions) -> Result<Vec<Header>> {
    let mut lister = Lister(Vec::new());
    drive(source, options, &mut lister)?;
    Ok(lister.0)
}

/// Decode the whole archive, discarding data, and report the counters.
///
/// Useful on damaged archives: `bytes_skipped` shows how much input the
/// decoder had to step over to find headers.
pub fn scan<R: Read>(source: R, options: &DecoderOptions) -> Result<DecodeSummary> {
    drive(source, options, &mut Lister(Vec::new()))
}
