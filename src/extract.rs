//! Extract engine - materializes the entries of an archive on disk

use crate::compose::{ArchiveReader, EntryInfo};
use crate::error::{ArchiveError, Result};
use crate::naming;
use crate::options::EngineOptions;
use crate::progress::ProgressTracker;
use crate::registry::{self, FormatTriple};
use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

/// Outcome of a successful [`extract`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    /// Root folder for container formats, the single output file otherwise
    pub output_path: PathBuf,
    pub files: u64,
    pub directories: u64,
    /// Decompressed bytes written to disk
    pub bytes_written: u64,
}

/// Unpack `archive_path` below `output_dir`
///
/// The format is inferred from the archive's extension. Container formats
/// unpack into a folder named after the archive without its extension,
/// created when missing and reused when present. A bare compressed stream
/// becomes a single file directly in `output_dir`.
pub fn extract(
    archive_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    options: &EngineOptions,
) -> Result<ExtractReport> {
    let archive_path = archive_path.as_ref();
    let output_dir = output_dir.as_ref();

    let file_name = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = registry::resolve_by_extension(&file_name)?;
    info!(archive = %archive_path.display(), format = %format.format, "extracting");

    let file =
        File::open(archive_path).map_err(|e| ArchiveError::source_unreadable(archive_path, e))?;
    let archive_len = file
        .metadata()
        .map_err(|e| ArchiveError::source_unreadable(archive_path, e))?
        .len();

    let consumed = Rc::new(Cell::new(0u64));
    let source = CountingReader {
        inner: file,
        consumed: consumed.clone(),
    };
    let reader = ArchiveReader::open(format, source)?;

    let mut extraction = Extraction {
        format,
        archive_name: file_name,
        output_dir: output_dir.to_path_buf(),
        options,
        buffer: vec![0u8; options.chunk_size()],
        progress: ProgressTracker::new(options.progress().cloned(), archive_len),
        consumed,
        report: ExtractReport {
            output_path: output_dir.to_path_buf(),
            files: 0,
            directories: 0,
            bytes_written: 0,
        },
    };

    if format.has_container() {
        let root = output_dir.join(root_folder_name(format, &extraction.archive_name));
        fs::create_dir_all(&root).map_err(|e| ArchiveError::sink_unwritable(&root, e))?;
        extraction.report.output_path = root;
    } else {
        fs::create_dir_all(output_dir)
            .map_err(|e| ArchiveError::sink_unwritable(output_dir, e))?;
    }

    reader.read_entries(|info, data| extraction.entry(info, data))?;

    extraction.progress.complete();
    let report = extraction.report;
    info!(
        output = %report.output_path.display(),
        files = report.files,
        directories = report.directories,
        bytes = report.bytes_written,
        "archive extracted"
    );
    Ok(report)
}

/// Archive name without the matched extension
fn root_folder_name(format: &FormatTriple, archive_name: &str) -> String {
    format
        .strip_extension(archive_name)
        .unwrap_or(archive_name)
        .to_string()
}

/// State shared by every entry of one extract run
struct Extraction<'a> {
    format: &'static FormatTriple,
    archive_name: String,
    output_dir: PathBuf,
    options: &'a EngineOptions,
    buffer: Vec<u8>,
    progress: ProgressTracker,
    consumed: Rc<Cell<u64>>,
    report: ExtractReport,
}

impl Extraction<'_> {
    fn entry(&mut self, info: &EntryInfo, data: &mut dyn Read) -> Result<()> {
        if self.format.has_container() {
            self.container_entry(info, data)
        } else {
            self.single_stream(info, data)
        }
    }

    fn container_entry(&mut self, info: &EntryInfo, data: &mut dyn Read) -> Result<()> {
        let name = info.name.trim_end_matches(naming::SEPARATORS);

        if let Some(filter) = self.options.filter() {
            if !info.is_dir && !filter.matches(name) {
                debug!(entry = %name, "filtered out");
                return Ok(());
            }
        }

        let root = &self.report.output_path;
        let target = match naming::entry_path(root, name)? {
            Some(target) => target,
            None if info.is_dir => return Ok(()),
            None => {
                return Err(ArchiveError::MalformedArchive(format!(
                    "file entry '{}' has no name",
                    info.name
                )))
            }
        };

        if info.is_dir {
            fs::create_dir_all(&target).map_err(|e| ArchiveError::sink_unwritable(&target, e))?;
            debug!(entry = %name, "created directory");
            self.report.directories += 1;
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::sink_unwritable(parent, e))?;
        }
        let written = self.write_file(&target, name, data)?;
        restore_mode(&target, info.mode)?;

        debug!(entry = %name, bytes = written, "extracted file");
        self.report.files += 1;
        Ok(())
    }

    fn single_stream(&mut self, info: &EntryInfo, data: &mut dyn Read) -> Result<()> {
        let name = if naming::is_plain_file_name(&info.name) {
            info.name.clone()
        } else {
            root_folder_name(self.format, &self.archive_name)
        };

        if let Some(filter) = self.options.filter() {
            if !filter.matches(&name) {
                debug!(entry = %name, "filtered out");
                return Ok(());
            }
        }

        let target = naming::resolve_collision(
            self.output_dir.join(&name),
            self.options.collision_policy(),
            None,
        )?;
        let written = self.write_file(&target, &name, data)?;

        debug!(file = %target.display(), bytes = written, "extracted stream");
        self.report.output_path = target;
        self.report.files += 1;
        Ok(())
    }

    /// Copy `data` into a new file at `target`, one chunk at a time
    fn write_file(&mut self, target: &Path, name: &str, data: &mut dyn Read) -> Result<u64> {
        let mut file =
            File::create(target).map_err(|e| ArchiveError::sink_unwritable(target, e))?;

        let mut written = 0u64;
        loop {
            let n = data
                .read(&mut self.buffer)
                .map_err(|e| ArchiveError::malformed(name, e))?;
            if n == 0 {
                break;
            }
            file.write_all(&self.buffer[..n])
                .map_err(|e| ArchiveError::sink_unwritable(target, e))?;
            written += n as u64;
            self.progress.update(self.consumed.get());
        }

        file.flush()
            .map_err(|e| ArchiveError::sink_unwritable(target, e))?;
        self.report.bytes_written += written;
        Ok(written)
    }
}

#[cfg(unix)]
fn restore_mode(target: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let Some(mode) = mode else {
        return Ok(());
    };
    fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o777))
        .map_err(|e| ArchiveError::sink_unwritable(target, e))
}

#[cfg(not(unix))]
fn restore_mode(_target: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

/// Counts archive bytes handed to the decoders, for progress
struct CountingReader<R> {
    inner: R,
    consumed: Rc<Cell<u64>>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.set(self.consumed.get() + n as u64);
        Ok(n)
    }
}

impl<R: Seek> Seek for CountingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
