//! Lazy depth-first directory walker
//!
//! Each root is walked with `walkdir`, which keeps its own explicit stack, so
//! arbitrarily deep trees cost heap, not call stack. Each call to [`walk`]
//! starts a fresh traversal.

use crate::error::{ArchiveError, Result};
use std::ffi::OsStr;
use std::fs::Metadata;
use std::io;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::vec;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Separator used inside entry names, whatever the host platform uses
pub const ENTRY_SEPARATOR: char = '/';

/// One file or empty directory found during a walk
#[derive(Debug, Clone)]
pub struct TraversalEntry {
    /// Absolute path of the file on disk
    pub source: PathBuf,
    /// Path relative to the parent of the traversal root, `/`-separated
    pub name: String,
    pub is_dir: bool,
    pub metadata: Metadata,
}

impl TraversalEntry {
    /// File size in bytes (0 for directories)
    pub fn size(&self) -> u64 {
        if self.is_dir {
            0
        } else {
            self.metadata.len()
        }
    }
}

/// Iterator over the files below a list of roots
///
/// Files are yielded in pre-order. A directory is only yielded itself when it
/// has no children, so containers can still record it. Siblings are visited
/// in file-name order and roots in the order given.
///
/// A root that is a symbolic link is resolved. Links found below a root are
/// skipped, never followed, so a link can neither duplicate data nor form a
/// cycle. File names must be valid UTF-8; anything else is reported as
/// `SourceUnreadable` instead of being renamed on the way into the archive.
pub struct Walker {
    roots: vec::IntoIter<PathBuf>,
    current: Option<RootWalk>,
}

/// Start a traversal over `roots`
pub fn walk<I, P>(roots: I) -> Walker
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let roots: Vec<PathBuf> = roots
        .into_iter()
        .map(|root| root.as_ref().to_path_buf())
        .collect();

    Walker {
        roots: roots.into_iter(),
        current: None,
    }
}

impl Iterator for Walker {
    type Item = Result<TraversalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(current) = self.current.as_mut() else {
                let root = self.roots.next()?;
                match RootWalk::open(&root) {
                    Ok(walk) => self.current = Some(walk),
                    Err(e) => return Some(Err(e)),
                }
                continue;
            };

            let Some(item) = current.entries.next() else {
                self.current = None;
                continue;
            };
            match current.visit(item) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Traversal of a single root
struct RootWalk {
    /// Absolute root path, the prefix of every entry path
    root: PathBuf,
    /// Entry name of the root itself; empty for a file-system root
    name: String,
    entries: Peekable<walkdir::IntoIter>,
}

impl RootWalk {
    fn open(root: &Path) -> Result<Self> {
        let root =
            std::path::absolute(root).map_err(|e| ArchiveError::source_unreadable(root, e))?;
        let name = root_name(&root)?;
        let entries = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .peekable();

        Ok(Self {
            root,
            name,
            entries,
        })
    }

    fn visit(&mut self, item: walkdir::Result<DirEntry>) -> Result<Option<TraversalEntry>> {
        let entry = item.map_err(walk_error)?;
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            warn!(path = %entry.path().display(), "not following symbolic link");
            return Ok(None);
        }

        if file_type.is_dir() {
            let has_children = match self.entries.peek() {
                Some(Ok(next)) => next.depth() > entry.depth(),
                Some(Err(err)) => err.depth() > entry.depth(),
                None => false,
            };
            if has_children {
                debug!(path = %entry.path().display(), "descending");
                return Ok(None);
            }
        } else if !file_type.is_file() {
            warn!(path = %entry.path().display(), "skipping special file");
            return Ok(None);
        }

        let name = self.entry_name(&entry)?;
        let metadata = entry.metadata().map_err(walk_error)?;
        Ok(Some(TraversalEntry {
            source: entry.into_path(),
            name,
            is_dir: file_type.is_dir(),
            metadata,
        }))
    }

    /// Root name followed by the entry's path below the root
    fn entry_name(&self, entry: &DirEntry) -> Result<String> {
        let relative = entry.path().strip_prefix(&self.root).unwrap_or(Path::new(""));

        let mut name = self.name.clone();
        for component in relative.components() {
            let part = utf8_name(component.as_os_str(), entry.path())?;
            if !name.is_empty() {
                name.push(ENTRY_SEPARATOR);
            }
            name.push_str(part);
        }
        Ok(name)
    }
}

/// Base name of a traversal root; empty for a file-system root
fn root_name(source: &Path) -> Result<String> {
    let resolved;
    let base = match source.file_name() {
        Some(name) => name,
        // `.` and `..` have no file name until resolved
        None => {
            resolved = source
                .canonicalize()
                .map_err(|e| ArchiveError::source_unreadable(source, e))?;
            match resolved.file_name() {
                Some(name) => name,
                None => return Ok(String::new()),
            }
        }
    };
    utf8_name(base, source).map(str::to_string)
}

fn utf8_name<'a>(name: &'a OsStr, path: &Path) -> Result<&'a str> {
    name.to_str().ok_or_else(|| {
        ArchiveError::source_unreadable(
            path,
            io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"),
        )
    })
}

fn walk_error(err: walkdir::Error) -> ArchiveError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    let message = err.to_string();
    let source = err.into_io_error().unwrap_or_else(|| io::Error::other(message));
    ArchiveError::source_unreadable(path, source)
}
