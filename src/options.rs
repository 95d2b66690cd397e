//! Engine configuration - everything an operation needs besides the paths

use crate::error::{ArchiveError, Result};
use crate::progress::ProgressCallback;
use regex::Regex;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Chunk size used for every streaming read/write unless overridden
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Compression level requested for an archive
///
/// Codecs without levels (plain TAR) ignore it silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Whatever the codec considers its default
    #[default]
    Default,
    /// Explicit level, 0 (fastest) to 9 (smallest)
    Level(u32),
}

impl CompressionLevel {
    pub const MAX: u32 = 9;

    /// Validated explicit level
    pub fn new(level: u32) -> Result<Self> {
        if level > Self::MAX {
            return Err(ArchiveError::InvalidOptions(format!(
                "compression level {} is outside 0..={}",
                level,
                Self::MAX
            )));
        }
        Ok(CompressionLevel::Level(level))
    }

    /// Explicit level or `default` when the codec default is requested
    pub fn or(self, default: u32) -> u32 {
        match self {
            CompressionLevel::Default => default,
            CompressionLevel::Level(level) => level.min(Self::MAX),
        }
    }
}

/// What to do when the output path already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Truncate and replace the existing file
    #[default]
    Overwrite,
    /// Pick the first free name by appending 1, 2, ... to the stem
    Rename,
    /// Refuse with `SinkUnwritable`
    Fail,
}

/// Name filter applied to files on compress and entries on extract
///
/// Matching is unanchored: the pattern only has to occur somewhere in the name.
#[derive(Clone)]
pub struct EntryFilter {
    pattern: Regex,
}

impl EntryFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ArchiveError::InvalidOptions(format!("invalid filter pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl fmt::Debug for EntryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntryFilter").field(&self.as_str()).finish()
    }
}

/// Options shared by compress and extract
#[derive(Clone)]
pub struct EngineOptions {
    chunk_size: NonZeroUsize,
    collision_policy: CollisionPolicy,
    filter: Option<EntryFilter>,
    progress: Option<Arc<ProgressCallback>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            collision_policy: CollisionPolicy::default(),
            filter: None,
            progress: None,
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the streaming chunk size in bytes
    pub fn set_chunk_size(&mut self, chunk_size: NonZeroUsize) -> &mut Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn set_collision_policy(&mut self, policy: CollisionPolicy) -> &mut Self {
        self.collision_policy = policy;
        self
    }

    /// Only archive files (or extract entries) whose name matches `filter`
    pub fn set_filter(&mut self, filter: EntryFilter) -> &mut Self {
        self.filter = Some(filter);
        self
    }

    pub fn clear_filter(&mut self) -> &mut Self {
        self.filter = None;
        self
    }

    /// Receive progress updates, at most one per whole percent
    ///
    /// # Example
    /// ```
    /// use s_archive::EngineOptions;
    ///
    /// let mut options = EngineOptions::new();
    /// options.set_progress(|p| println!("{:.0}%", p.percent));
    /// ```
    pub fn set_progress<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(crate::progress::Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collision_policy
    }

    pub fn filter(&self) -> Option<&EntryFilter> {
        self.filter.as_ref()
    }

    pub(crate) fn progress(&self) -> Option<&Arc<ProgressCallback>> {
        self.progress.as_ref()
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("chunk_size", &self.chunk_size)
            .field("collision_policy", &self.collision_policy)
            .field("filter", &self.filter)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
