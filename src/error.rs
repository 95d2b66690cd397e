//! Error types for s-archive

use std::io;
use std::path::PathBuf;

/// Result type for s-archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Error types that can occur while compressing or extracting an archive
///
/// Every variant is terminal for the operation that produced it. Nothing is
/// retried internally and partially written output is left on disk.
#[derive(Debug)]
pub enum ArchiveError {
    /// No format is registered under this identifier
    UnknownFormat(String),
    /// The file name does not end in any registered extension
    UnrecognizedExtension(String),
    /// The container/codec pairing cannot be constructed for this request
    CodecUnavailable(String),
    /// A selected input disappeared or could not be read
    SourceUnreadable { path: PathBuf, source: io::Error },
    /// The output location could not be created or written
    SinkUnwritable { path: PathBuf, source: io::Error },
    /// Container framing or compressed stream is inconsistent
    MalformedArchive(String),
    /// The descriptor or engine options were rejected before any I/O happened
    InvalidOptions(String),
}

impl ArchiveError {
    pub(crate) fn source_unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiveError::SourceUnreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn sink_unwritable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiveError::SinkUnwritable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(context: impl std::fmt::Display, source: io::Error) -> Self {
        ArchiveError::MalformedArchive(format!("{}: {}", context, source))
    }
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::UnknownFormat(id) => write!(f, "Unknown archive format: {}", id),
            ArchiveError::UnrecognizedExtension(name) => {
                write!(f, "Unrecognized archive extension: {}", name)
            }
            ArchiveError::CodecUnavailable(msg) => write!(f, "Codec unavailable: {}", msg),
            ArchiveError::SourceUnreadable { path, source } => {
                write!(f, "Cannot read '{}': {}", path.display(), source)
            }
            ArchiveError::SinkUnwritable { path, source } => {
                write!(f, "Cannot write '{}': {}", path.display(), source)
            }
            ArchiveError::MalformedArchive(msg) => write!(f, "Malformed archive: {}", msg),
            ArchiveError::InvalidOptions(msg) => write!(f, "Invalid options: {}", msg),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::SourceUnreadable { source, .. } => Some(source),
            ArchiveError::SinkUnwritable { source, .. } => Some(source),
            _ => None,
        }
    }
}
