//! Error types for kernel memory introspection

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Broad classes of failure, used by callers that only care about the category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required symbol could not be resolved or the symbol table is unusable
    Resolution,
    /// The foreign memory could not be read (or not completely)
    Read,
    /// Local configuration (layout, domain count) is invalid or unavailable
    Config,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot open memory source {path:?}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid memory image: {0}")]
    InvalidImage(String),

    #[error("Address {address:#x} is not mapped")]
    Unmapped { address: u64 },

    #[error("Short read at {address:#x}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        address: u64,
        wanted: usize,
        got: usize,
    },

    #[error("Read of {size} bytes at {address:#x} failed: {source}")]
    Io {
        address: u64,
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("Failed to resolve symbols: {}", .0.join(", "))]
    UnresolvedSymbols(Vec<String>),

    #[error("Failed to load symbol table: {0}")]
    SymbolTable(String),

    #[error("Invalid layout: {0}")]
    Layout(String),

    #[error("Cannot determine memory domain count: {0}")]
    DomainCount(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnresolvedSymbols(_) | Error::SymbolTable(_) => ErrorKind::Resolution,
            Error::SourceUnavailable { .. }
            | Error::InvalidImage(_)
            | Error::Unmapped { .. }
            | Error::ShortRead { .. }
            | Error::Io { .. } => ErrorKind::Read,
            Error::Layout(_) | Error::DomainCount(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
