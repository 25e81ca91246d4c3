use std::io;
use thiserror::Error;

/// Every failure the codec can surface.
///
/// A window that fails to decode as a header is not represented here: the
/// decoder treats it as a resynchronisation point, not an error.
#[derive(Error, Debug)]
pub enum ArError {
    #[error("Invalid ar signature, received: {found:?}")]
    InvalidSignature { found: String },
    #[error("Entry `{name}` aborted: {reason}")]
    EntryAborted { name: String, reason: String },
    #[error("Entry `{name}` truncated: {missing} byte(s) missing at end of input")]
    Truncated { name: String, missing: u64 },
    #[error("Write locked")]
    WriteLocked,
    #[error("No file is pending")]
    NoPendingFile,
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),
    #[error("Entry `{name}` is too large for the size field: {size} bytes")]
    TooLarge { name: String, size: u64 },
    #[error("Setup error: {0}")]
    Setup(String),
    #[error("Decoder terminated")]
    Terminated,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ArError>;

impl From<ArError> for io::Error {
    fn from(err: ArError) -> Self {
        match err {
            ArError::Io(e) => e,
            ArError::Truncated { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            ArError::InvalidSignature { .. } => io::Error::new(io::ErrorKind::InvalidData, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
