//! Format registry - maps archive identifiers and file extensions to the
//! container/codec pair they require
//!
//! The table is a `static` built at compile time, so lookups never lock and
//! the registry can be shared freely between concurrent operations.

use crate::error::{ArchiveError, Result};
use std::fmt;
use std::str::FromStr;

/// Symbolic identifier of a supported archive type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarLzma,
    TarXz,
    Gzip,
}

impl ArchiveFormat {
    /// Every registered format, in registry order
    pub const ALL: [ArchiveFormat; 7] = [
        ArchiveFormat::Zip,
        ArchiveFormat::Tar,
        ArchiveFormat::TarGz,
        ArchiveFormat::TarBz2,
        ArchiveFormat::TarLzma,
        ArchiveFormat::TarXz,
        ArchiveFormat::Gzip,
    ];

    /// The identifier this format is registered under (e.g. `TAR_GZ`)
    pub fn identifier(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "ZIP",
            ArchiveFormat::Tar => "TAR",
            ArchiveFormat::TarGz => "TAR_GZ",
            ArchiveFormat::TarBz2 => "TAR_BZ2",
            ArchiveFormat::TarLzma => "TAR_LZMA",
            ArchiveFormat::TarXz => "TAR_XZ",
            ArchiveFormat::Gzip => "GZIP",
        }
    }

    /// Registry entry for this format
    pub fn triple(self) -> &'static FormatTriple {
        // ALL and FORMATS share the same order
        &FORMATS[self as usize]
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for ArchiveFormat {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        resolve(s).map(|triple| triple.format)
    }
}

/// Layer that groups several named entries into one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// No grouping: the archive holds exactly one compressed stream
    None,
    Tar,
    /// ZIP frames and compresses each entry itself
    Zip,
}

/// Layer that compresses a single byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Bytes pass through untouched
    Store,
    /// Raw DEFLATE, applied per entry by the ZIP container
    Deflate,
    Gzip,
    Bzip2,
    /// Legacy `.lzma` (LZMA-alone) stream
    Lzma,
    Xz,
}

impl Codec {
    pub const ALL: [Codec; 6] = [
        Codec::Store,
        Codec::Deflate,
        Codec::Gzip,
        Codec::Bzip2,
        Codec::Lzma,
        Codec::Xz,
    ];

    /// Whether a compression level changes this codec's output
    pub fn supports_level(self) -> bool {
        !matches!(self, Codec::Store)
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::Store => "store",
            Codec::Deflate => "deflate",
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Lzma => "lzma",
            Codec::Xz => "xz",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = ArchiveError;

    /// Parse a codec name (`gzip`, `xz`, ... case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Codec::ALL
            .into_iter()
            .find(|codec| codec.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ArchiveError::CodecUnavailable(format!("unknown codec '{}'", s)))
    }
}

/// How the stream composer stacks the two layers of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layering {
    /// Container entries are written into a codec stream that wraps the sink
    ContainerOverCodec,
    /// A single layer does both jobs (ZIP) or one of them is absent (TAR, GZIP)
    Single,
}

/// One supported (container, codec, extensions) combination
#[derive(Debug, PartialEq, Eq)]
pub struct FormatTriple {
    pub format: ArchiveFormat,
    pub container: Container,
    pub codec: Codec,
    /// Recognized extensions, canonical one first, all lowercase with leading dot
    pub extensions: &'static [&'static str],
    pub layering: Layering,
}

static FORMATS: [FormatTriple; 7] = [
    FormatTriple {
        format: ArchiveFormat::Zip,
        container: Container::Zip,
        codec: Codec::Deflate,
        extensions: &[".zip"],
        layering: Layering::Single,
    },
    FormatTriple {
        format: ArchiveFormat::Tar,
        container: Container::Tar,
        codec: Codec::Store,
        extensions: &[".tar"],
        layering: Layering::Single,
    },
    FormatTriple {
        format: ArchiveFormat::TarGz,
        container: Container::Tar,
        codec: Codec::Gzip,
        extensions: &[".tar.gz", ".tgz", ".tar.gzip"],
        layering: Layering::ContainerOverCodec,
    },
    FormatTriple {
        format: ArchiveFormat::TarBz2,
        container: Container::Tar,
        codec: Codec::Bzip2,
        extensions: &[".tar.bz2", ".tbz2", ".tar.bzip2"],
        layering: Layering::ContainerOverCodec,
    },
    FormatTriple {
        format: ArchiveFormat::TarLzma,
        container: Container::Tar,
        codec: Codec::Lzma,
        extensions: &[".tlz", ".tar.lzma", ".tar.lz"],
        layering: Layering::ContainerOverCodec,
    },
    FormatTriple {
        format: ArchiveFormat::TarXz,
        container: Container::Tar,
        codec: Codec::Xz,
        extensions: &[".txz", ".tar.xz"],
        layering: Layering::ContainerOverCodec,
    },
    FormatTriple {
        format: ArchiveFormat::Gzip,
        container: Container::None,
        codec: Codec::Gzip,
        extensions: &[".gz", ".gzip"],
        layering: Layering::Single,
    },
];

impl FormatTriple {
    /// Extension appended to archive names that carry none of ours
    pub fn canonical_extension(&self) -> &'static str {
        self.extensions[0]
    }

    /// Whether this format groups multiple named entries
    pub fn has_container(&self) -> bool {
        self.container != Container::None
    }

    /// Whether the container can record directory entries with no payload
    pub fn supports_directories(&self) -> bool {
        matches!(self.container, Container::Tar | Container::Zip)
    }

    /// Longest of this format's extensions that `file_name` ends with
    ///
    /// The comparison is ASCII case-insensitive and the name must keep a
    /// non-empty stem in front of the extension.
    pub fn matched_extension(&self, file_name: &str) -> Option<&'static str> {
        let lower = file_name.to_ascii_lowercase();
        self.extensions
            .iter()
            .copied()
            .filter(|ext| lower.len() > ext.len() && lower.ends_with(ext))
            .max_by_key(|ext| ext.len())
    }

    /// `file_name` without its matched extension, if it has one
    pub fn strip_extension<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        self.matched_extension(file_name)
            .map(|ext| &file_name[..file_name.len() - ext.len()])
    }

    /// `archive_name` with the canonical extension appended when it lacks a
    /// recognized one
    pub fn ensure_extension(&self, archive_name: &str) -> String {
        match self.matched_extension(archive_name) {
            Some(_) => archive_name.to_string(),
            None => format!("{}{}", archive_name, self.canonical_extension()),
        }
    }
}

/// All registered formats
pub fn formats() -> &'static [FormatTriple] {
    &FORMATS
}

/// Look up a format by identifier (`ZIP`, `TAR_GZ`, ... case-insensitive)
pub fn resolve(identifier: &str) -> Result<&'static FormatTriple> {
    let wanted = identifier.trim();
    FORMATS
        .iter()
        .find(|triple| triple.format.identifier().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| ArchiveError::UnknownFormat(identifier.to_string()))
}

/// Look up a format by the longest registered extension `file_name` ends with
///
/// `archive.tar.gz` resolves to TAR_GZ rather than GZIP because `.tar.gz`
/// is the longer match.
pub fn resolve_by_extension(file_name: &str) -> Result<&'static FormatTriple> {
    FORMATS
        .iter()
        .filter_map(|triple| {
            triple
                .matched_extension(file_name)
                .map(|ext| (ext.len(), triple))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, triple)| triple)
        .ok_or_else(|| ArchiveError::UnrecognizedExtension(file_name.to_string()))
}
