//! Streaming codec for the classic Unix `ar` archive format.
//!
//! [`Decoder`] turns chunks of bytes, split anywhere, into [`Entry`] values
//! whose data arrives through an [`EntryReader`]. [`Encoder`] writes members
//! one at a time into any `io::Write` without holding the archive in memory.

pub mod error;
pub mod header;
pub mod entry;
pub mod decoder;
pub mod encoder;
pub mod archive;

pub use error::{ArError, Result};
pub use header::{Header, encode_header, MAGIC, HEADER_SIZE};
pub use entry::{EntryReader, EntryState, Chunk};
pub use decoder::{Decoder, DecoderOptions, DecodeSummary, Entry};
pub use encoder::{Encoder, EncoderOptions};
