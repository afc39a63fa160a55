//! Error types for devicedetect.

use thiserror::Error;

/// Error type for dataset operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error outside the structured read path (open, close, delete)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error while decoding a section, with position context
    #[error("read failed in {section} at offset {offset}: {source}")]
    Read {
        section: &'static str,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// Read past the end of the data source
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEof(u64),

    /// On-disk invariant violated
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Format version tag not recognised
    #[error("unsupported data format version: {0}")]
    UnsupportedVersion(u32),

    /// A configured cache is neither LRU-shaped nor put-through-shaped
    #[error("invalid cache for {0:?}: capacity must be non-zero")]
    InvalidCacheKind(crate::dataset::CacheType),

    /// Operation attempted after the dataset or pool was closed
    #[error("dataset is closed")]
    Closed,

    /// Key outside a fixed-length section's `[0, count)`
    #[error("index {index} out of range for {section} (count {count})")]
    IndexOutOfRange {
        section: &'static str,
        index: u32,
        count: u32,
    },
}

impl Error {
    /// Attach section context to a low-level reader error.
    pub(crate) fn in_section(self, section: &'static str, offset: u64) -> Self {
        match self {
            Error::Io(source) => Error::Read {
                section,
                offset,
                source,
            },
            other => other,
        }
    }
}

/// Result type alias for dataset operations.
pub type Result<T> = std::result::Result<T, Error>;
