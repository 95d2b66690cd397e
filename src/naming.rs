//! Output naming: collision handling and entry-name to path mapping

use crate::error::{ArchiveError, Result};
use crate::options::CollisionPolicy;
use crate::registry::FormatTriple;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Separators recognized inside entry names
///
/// `\` is an ordinary file-name character on Unix, so it only splits names
/// on Windows.
#[cfg(windows)]
pub(crate) const SEPARATORS: &[char] = &['/', '\\'];
#[cfg(not(windows))]
pub(crate) const SEPARATORS: &[char] = &['/'];

/// Apply `policy` to an output path that may already exist
///
/// `Rename` inserts a counter between stem and extension. The extension is
/// the one `format` matches when given (so `.tar.gz` stays whole), otherwise
/// the last dot-suffix of the file name.
pub(crate) fn resolve_collision(
    path: PathBuf,
    policy: CollisionPolicy,
    format: Option<&FormatTriple>,
) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path);
    }

    match policy {
        CollisionPolicy::Overwrite => {
            debug!(path = %path.display(), "overwriting existing output");
            Ok(path)
        }
        CollisionPolicy::Fail => Err(ArchiveError::sink_unwritable(
            &path,
            io::Error::new(io::ErrorKind::AlreadyExists, "output already exists"),
        )),
        CollisionPolicy::Rename => {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let (stem, extension) = split_extension(&file_name, format);
            let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

            let mut counter: u64 = 1;
            loop {
                let candidate = parent.join(format!("{}{}{}", stem, counter, extension));
                if !candidate.exists() {
                    debug!(path = %candidate.display(), "output exists, renamed");
                    return Ok(candidate);
                }
                counter += 1;
            }
        }
    }
}

fn split_extension<'a>(file_name: &'a str, format: Option<&FormatTriple>) -> (&'a str, &'a str) {
    if let Some(stem) = format.and_then(|f| f.strip_extension(file_name)) {
        return (stem, &file_name[stem.len()..]);
    }
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name.split_at(dot),
        _ => (file_name, ""),
    }
}

/// Map an entry name onto a path below `root`
///
/// Names are split on [`SEPARATORS`]. Names that are absolute or climb
/// out with `..` are rejected as malformed; a name with no components left
/// (such as `./`) maps to `None`.
pub(crate) fn entry_path(root: &Path, name: &str) -> Result<Option<PathBuf>> {
    let unsafe_name = || {
        warn!(entry = %name, "refusing entry that would escape the extraction root");
        ArchiveError::MalformedArchive(format!("unsafe entry name '{}'", name))
    };

    if name.starts_with(SEPARATORS) || has_drive_prefix(name) {
        return Err(unsafe_name());
    }

    let mut path = root.to_path_buf();
    let mut depth = 0usize;
    for part in name.split(SEPARATORS) {
        match part {
            "" | "." => continue,
            ".." => return Err(unsafe_name()),
            part => {
                // A lone segment must still be a plain name on this platform
                let mut components = Path::new(part).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => {}
                    _ => return Err(unsafe_name()),
                }
                path.push(part);
                depth += 1;
            }
        }
    }

    Ok((depth > 0).then_some(path))
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    cfg!(windows) && bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Whether `name` can be used as-is for a file directly inside a directory
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(SEPARATORS)
        && !has_drive_prefix(name)
}
