//! # s-archive: Streaming Archive Engine
//!
//! `s-archive` composes a container format (TAR or ZIP) with a byte-stream
//! codec (gzip, bzip2, lzma, xz) and moves whole directory trees in and out of
//! the result. Data always travels in fixed-size chunks, so memory use does
//! not grow with file or archive size.
//!
//! ## Features
//!
//! - **Format Registry**: `ZIP`, `TAR`, `TAR_GZ`, `TAR_BZ2`, `TAR_LZMA`, `TAR_XZ`, `GZIP`
//!   resolved by identifier or by longest matching file extension
//! - **Streaming Compose**: container layered over codec, no temp files
//! - **Lazy Walker**: depth-first traversal on an explicit stack, cycle safe
//! - **Integrity Checks**: CRC-32, entry sizes and end-of-archive markers verified on extract
//! - **Options**: compression level, name filter, progress callback, collision policy
//!
//! ## Quick Start
//!
//! ### Compressing a directory
//!
//! ```no_run
//! use s_archive::{compress, ArchiveDescriptor, ArchiveFormat, EngineOptions};
//!
//! let descriptor = ArchiveDescriptor::builder(ArchiveFormat::TarGz)
//!     .input("project")
//!     .output_dir("/tmp/out")
//!     .archive_name("bundle")
//!     .build()?;
//!
//! let report = compress(&descriptor, &EngineOptions::default())?;
//! println!("{} files -> {}", report.files, report.archive_path.display());
//! # Ok::<(), s_archive::ArchiveError>(())
//! ```
//!
//! ### Extracting an archive
//!
//! ```no_run
//! use s_archive::{extract, EngineOptions};
//!
//! // Unpacks into /tmp/extracted/bundle/
//! let report = extract("/tmp/out/bundle.tar.gz", "/tmp/extracted", &EngineOptions::default())?;
//! println!("{} bytes written", report.bytes_written);
//! # Ok::<(), s_archive::ArchiveError>(())
//! ```
//!
//! ### Streaming entries into any writer
//!
//! ```no_run
//! use s_archive::{ArchiveFormat, ArchiveWriter, CompressionLevel, EntryHeader};
//! use std::io::{Cursor, Write};
//!
//! let mut writer = ArchiveWriter::open(
//!     ArchiveFormat::TarXz.triple(),
//!     Cursor::new(Vec::new()),
//!     CompressionLevel::Default,
//! )?;
//!
//! let mut entry = writer.start_entry(&EntryHeader::file("data.txt", 5))?;
//! entry.write_all(b"hello")?;
//! entry.finish()?;
//!
//! let bytes = writer.finish()?.into_inner();
//! println!("Created archive with {} bytes", bytes.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod codec;
mod naming;
mod tarball;

pub mod compose;
pub mod compress;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod options;
pub mod progress;
pub mod registry;
pub mod walker;
pub mod zip;

pub use compose::{ArchiveReader, ArchiveWriter, EntryHeader, EntryInfo, EntryKind, EntryWriter};
pub use compress::{compress, CompressReport};
pub use descriptor::{ArchiveDescriptor, ArchiveDescriptorBuilder};
pub use error::{ArchiveError, Result};
pub use extract::{extract, ExtractReport};
pub use options::{
    CollisionPolicy, CompressionLevel, EngineOptions, EntryFilter, DEFAULT_CHUNK_SIZE,
};
pub use progress::{Progress, ProgressCallback};
pub use registry::{
    formats, resolve, resolve_by_extension, ArchiveFormat, Codec, Container, FormatTriple,
    Layering,
};
pub use walker::{walk, TraversalEntry, Walker};
