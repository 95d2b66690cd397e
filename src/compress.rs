//! Compress engine - walks the inputs and streams every file into one archive

use crate::compose::{ArchiveWriter, EntryHeader};
use crate::descriptor::ArchiveDescriptor;
use crate::error::{ArchiveError, Result};
use crate::naming;
use crate::options::EngineOptions;
use crate::progress::ProgressTracker;
use crate::walker::{self, TraversalEntry};
use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a successful [`compress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressReport {
    /// Final archive location, after collision handling
    pub archive_path: PathBuf,
    pub files: u64,
    /// Empty directories recorded as entries
    pub directories: u64,
    /// Source bytes streamed into the archive
    pub bytes_read: u64,
}

/// Write every selected file below the descriptor's inputs into one archive
///
/// On failure the partially written archive is left where it is.
pub fn compress(descriptor: &ArchiveDescriptor, options: &EngineOptions) -> Result<CompressReport> {
    let format = descriptor.format();
    info!(
        format = %format.format,
        codec = %descriptor.codec(),
        inputs = descriptor.inputs().len(),
        "compressing"
    );

    if !format.has_container() {
        check_single_file(descriptor)?;
    }

    let output_dir = descriptor.output_dir();
    fs::create_dir_all(output_dir)
        .map_err(|e| ArchiveError::sink_unwritable(output_dir, e))?;
    let archive_path = naming::resolve_collision(
        descriptor.archive_path(),
        options.collision_policy(),
        Some(format),
    )?;

    let total_bytes = match options.progress() {
        Some(_) => selected_size(descriptor, options),
        None => 0,
    };
    let mut progress = ProgressTracker::new(options.progress().cloned(), total_bytes);

    let sink = File::create(&archive_path)
        .map_err(|e| ArchiveError::sink_unwritable(&archive_path, e))?;
    let mut writer = ArchiveWriter::open_with_codec(
        format,
        descriptor.codec(),
        BufWriter::new(sink),
        descriptor.level(),
    )?;

    let mut report = CompressReport {
        archive_path: archive_path.clone(),
        files: 0,
        directories: 0,
        bytes_read: 0,
    };
    let mut buffer = vec![0u8; options.chunk_size()];
    let archive_source = std::path::absolute(&archive_path).ok();

    for entry in walker::walk(descriptor.inputs()) {
        let entry = entry?;

        if archive_source.as_ref() == Some(&entry.source) {
            warn!(entry = %entry.name, "not adding the archive to itself");
            continue;
        }

        if entry.is_dir {
            if format.supports_directories() {
                writer
                    .add_directory(&entry.name, entry.metadata.modified().ok())
                    .map_err(|e| ArchiveError::sink_unwritable(&archive_path, e))?;
                debug!(entry = %entry.name, "added empty directory");
                report.directories += 1;
            } else {
                debug!(entry = %entry.name, "format has no directory entries, skipped");
            }
            continue;
        }

        if !is_selected(&entry, options) {
            debug!(entry = %entry.name, "filtered out");
            continue;
        }

        let copied = add_file(&mut writer, &entry, &archive_path, &mut buffer, &mut progress)?;
        debug!(entry = %entry.name, bytes = copied, "added file");
        report.files += 1;
        report.bytes_read += copied;
    }

    let sink = writer
        .finish()
        .map_err(|e| ArchiveError::sink_unwritable(&archive_path, e))?;
    sink.into_inner()
        .map_err(|e| ArchiveError::sink_unwritable(&archive_path, e.into_error()))?;

    progress.complete();
    info!(
        archive = %archive_path.display(),
        files = report.files,
        directories = report.directories,
        bytes = report.bytes_read,
        "archive written"
    );
    Ok(report)
}

/// Stream one file into a new entry, `buffer.len()` bytes at a time
fn add_file<W: Write + io::Seek + 'static>(
    writer: &mut ArchiveWriter<W>,
    entry: &TraversalEntry,
    archive_path: &Path,
    buffer: &mut [u8],
    progress: &mut ProgressTracker,
) -> Result<u64> {
    let file =
        File::open(&entry.source).map_err(|e| ArchiveError::source_unreadable(&entry.source, e))?;
    let size = entry.size();

    let mut header = EntryHeader::file(entry.name.as_str(), size);
    header.modified = entry.metadata.modified().ok();
    header.mode = unix_mode(&entry.metadata);

    let mut handle = writer
        .start_entry(&header)
        .map_err(|e| ArchiveError::sink_unwritable(archive_path, e))?;

    // The header already promised `size` bytes; growth after the walk is ignored
    let mut source = file.take(size);
    let mut copied = 0u64;
    loop {
        let n = source
            .read(buffer)
            .map_err(|e| ArchiveError::source_unreadable(&entry.source, e))?;
        if n == 0 {
            break;
        }
        handle
            .write_all(&buffer[..n])
            .map_err(|e| ArchiveError::sink_unwritable(archive_path, e))?;
        copied += n as u64;
        progress.advance(n as u64);
    }

    if copied != size {
        return Err(ArchiveError::source_unreadable(
            &entry.source,
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank from {} to {} bytes while being read", size, copied),
            ),
        ));
    }

    handle
        .finish()
        .map_err(|e| ArchiveError::sink_unwritable(archive_path, e))?;
    Ok(copied)
}

/// A container-less format holds exactly one plain file
fn check_single_file(descriptor: &ArchiveDescriptor) -> Result<()> {
    let format = descriptor.format().format;
    let [input] = descriptor.inputs() else {
        return Err(ArchiveError::CodecUnavailable(format!(
            "{} holds a single file, {} inputs given",
            format,
            descriptor.inputs().len()
        )));
    };

    let metadata =
        fs::metadata(input).map_err(|e| ArchiveError::source_unreadable(input, e))?;
    if !metadata.is_file() {
        return Err(ArchiveError::CodecUnavailable(format!(
            "{} cannot hold directory '{}'",
            format,
            input.display()
        )));
    }
    Ok(())
}

/// Sum of the sizes of every file the main walk will archive
///
/// Errors are left for the main walk to report.
fn selected_size(descriptor: &ArchiveDescriptor, options: &EngineOptions) -> u64 {
    walker::walk(descriptor.inputs())
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.is_dir && is_selected(entry, options))
        .map(|entry| entry.size())
        .sum()
}

/// The filter looks at the base name only
fn is_selected(entry: &TraversalEntry, options: &EngineOptions) -> bool {
    match options.filter() {
        Some(filter) => {
            let base = entry
                .name
                .rsplit(walker::ENTRY_SEPARATOR)
                .next()
                .unwrap_or(&entry.name);
            filter.matches(base)
        }
        None => true,
    }
}

#[cfg(unix)]
fn unix_mode(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &Metadata) -> Option<u32> {
    None
}
