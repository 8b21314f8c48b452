use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for varfile operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, writing, or indexing variant
/// data.
///
/// Every failure names the offending path, field, or option. Format and I/O
/// errors are surfaced immediately; a malformed record is never dropped
/// silently.
#[derive(Debug, Error)]
pub enum Error {
    /// Source file does not exist, or an index was required but none was
    /// found at the conventional sibling paths.
    #[error("file not found: {path}")]
    NotFound {
        /// Path that could not be resolved
        path: PathBuf,
    },

    /// Empty file, truncated BGZF stream, unknown magic, or unparseable
    /// header/record content.
    #[error("format error: {msg}")]
    Format {
        /// What was malformed and where
        msg: String,
    },

    /// Mutually exclusive or otherwise invalid open options.
    #[error("invalid configuration: {msg}")]
    Config {
        /// Which options conflict
        msg: String,
    },

    /// A contig/FILTER/INFO/FORMAT name was not declared by the target
    /// header during record translation.
    #[error("unknown {kind} '{name}' in target header")]
    SchemaLookup {
        /// Dictionary the lookup ran against ("contig", "FILTER", ...)
        kind: &'static str,
        /// The name that failed to resolve
        name: String,
    },

    /// Operation on a closed file, or a header mutation after the header
    /// was frozen by a writer.
    #[error("invalid state: {msg}")]
    State {
        /// Which state rule was violated
        msg: String,
    },

    /// I/O error from the underlying byte source/sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format { msg: msg.into() }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config { msg: msg.into() }
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Error::State { msg: msg.into() }
    }
}
