//! Protocol-fatal error taxonomy.
//!
//! Every variant here aborts the session: there is no in-protocol recovery
//! once the carrier or the sequence envelope has failed. Per-command
//! failures never appear as `ShellError`; they are reported to the host
//! inside the response frame instead.

use std::fmt;
use std::io;

/// Session-wide `Result` alias.
pub type ShellResult<T> = Result<T, ShellError>;

#[derive(Debug)]
pub enum ShellError {
    /// The USB control-feature carrier failed.
    Carrier(io::Error),
    /// A carrier exchange moved fewer (or more) bytes than the frame size.
    ShortTransfer { expected: usize, got: usize },
    /// The received sequence envelope does not match the local counter.
    SequenceMismatch { expected: u32, got: u32 },
    /// Local I/O failed mid-stream; the in-progress transfer is abandoned.
    Stream(io::Error),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Carrier(e) => write!(f, "carrier error: {e}"),
            Self::ShortTransfer { expected, got } => {
                write!(f, "short transfer: expected {expected} bytes, got {got}")
            }
            Self::SequenceMismatch { expected, got } => {
                write!(f, "sequence error: expected {expected}, got {got}")
            }
            Self::Stream(e) => write!(f, "stream I/O error: {e}"),
        }
    }
}

impl std::error::Error for ShellError {}
