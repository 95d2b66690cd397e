//! Archive descriptor - what to compress, with which format, and where

use crate::error::{ArchiveError, Result};
use crate::options::CompressionLevel;
use crate::registry::{self, ArchiveFormat, Codec, FormatTriple};
use std::path::{Path, PathBuf};

/// Immutable description of one compress operation
///
/// # Example
/// ```
/// use s_archive::{ArchiveDescriptor, ArchiveFormat};
///
/// let descriptor = ArchiveDescriptor::builder(ArchiveFormat::TarGz)
///     .input("notes.txt")
///     .output_dir("/tmp/out")
///     .archive_name("bundle")
///     .level(9)
///     .build()?;
///
/// assert_eq!(descriptor.archive_file_name(), "bundle.tar.gz");
/// # Ok::<(), s_archive::ArchiveError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveDescriptor {
    format: &'static FormatTriple,
    codec: Codec,
    level: CompressionLevel,
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    archive_name: String,
}

impl ArchiveDescriptor {
    pub fn builder(format: ArchiveFormat) -> ArchiveDescriptorBuilder {
        ArchiveDescriptorBuilder::new(format.triple())
    }

    /// Start a descriptor from a registry identifier such as `TAR_XZ`
    pub fn builder_for(identifier: &str) -> Result<ArchiveDescriptorBuilder> {
        registry::resolve(identifier).map(ArchiveDescriptorBuilder::new)
    }

    pub fn format(&self) -> &'static FormatTriple {
        self.format
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Archive name as given by the caller
    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    /// Archive name with the canonical extension appended if it lacks one
    pub fn archive_file_name(&self) -> String {
        self.format.ensure_extension(&self.archive_name)
    }

    /// Where the archive goes, before any collision handling
    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(self.archive_file_name())
    }
}

/// Builder for [`ArchiveDescriptor`]
#[derive(Debug, Clone)]
pub struct ArchiveDescriptorBuilder {
    format: &'static FormatTriple,
    codec: Option<Codec>,
    level: Option<u32>,
    inputs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    archive_name: Option<String>,
}

impl ArchiveDescriptorBuilder {
    fn new(format: &'static FormatTriple) -> Self {
        Self {
            format,
            codec: None,
            level: None,
            inputs: Vec::new(),
            output_dir: None,
            archive_name: None,
        }
    }

    /// Override the codec; defaults to the format's own
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Compression level 0..=9; the codec default is used when unset
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<ArchiveDescriptor> {
        if self.inputs.is_empty() {
            return Err(ArchiveError::InvalidOptions(
                "at least one input path is required".to_string(),
            ));
        }

        let level = match self.level {
            Some(level) => CompressionLevel::new(level)?,
            None => CompressionLevel::Default,
        };

        let output_dir = self.output_dir.ok_or_else(|| {
            ArchiveError::InvalidOptions("output directory is required".to_string())
        })?;

        let archive_name = self
            .archive_name
            .ok_or_else(|| ArchiveError::InvalidOptions("archive name is required".to_string()))?;
        if archive_name.trim().is_empty() || archive_name.contains(['/', '\\']) {
            return Err(ArchiveError::InvalidOptions(format!(
                "archive name '{}' must be a plain file name",
                archive_name
            )));
        }

        Ok(ArchiveDescriptor {
            format: self.format,
            codec: self.codec.unwrap_or(self.format.codec),
            level,
            inputs: self.inputs,
            output_dir,
            archive_name,
        })
    }
}
