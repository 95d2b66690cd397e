//! Stream composer - stacks the container and codec layers of a format
//!
//! Writing, bytes flow `entry -> container -> codec -> sink`; reading, they
//! flow `source -> codec -> container -> entry`. The order comes from the
//! registry's [`Layering`] column rather than being guessed per format.
//!
//! Entries are streamed: [`EntryWriter`] implements [`Write`] and the reader
//! hands each entry to a visitor as a [`Read`], so no layer ever holds a
//! whole entry in memory.

use crate::codec::{self, CodecWrite, GzipMeta};
use crate::error::{ArchiveError, Result};
use crate::options::CompressionLevel;
use crate::registry::{Codec, Container, FormatTriple, Layering};
use crate::tarball::{padded_size, TarContainerWriter, TrailerCheck};
use crate::zip::{CompressionMethod, StreamingZipReader, StreamingZipWriter};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// What an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file with a payload of exactly `size` bytes
    File { size: u64 },
    /// Directory with no payload
    Directory,
}

/// Header of an entry about to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// `/`-separated path inside the archive
    pub name: String,
    pub kind: EntryKind,
    pub modified: Option<SystemTime>,
    /// Unix permission bits, recorded by TAR only
    pub mode: Option<u32>,
}

impl EntryHeader {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File { size },
            modified: None,
            mode: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            modified: None,
            mode: None,
        }
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Entry as found while reading an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Name as recorded; empty when a bare stream carries no name
    pub name: String,
    pub is_dir: bool,
    /// Payload size, when the container records it up front
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
    pub mode: Option<u32>,
}

/// Fail with `CodecUnavailable` unless `codec` can be paired with the
/// container of `format`
pub(crate) fn check_pairing(format: &FormatTriple, codec: Codec) -> Result<()> {
    let supported = match (format.container, format.layering) {
        (Container::Zip, Layering::Single) => matches!(codec, Codec::Deflate | Codec::Store),
        (Container::Tar, Layering::Single) => codec == Codec::Store,
        (Container::Tar, Layering::ContainerOverCodec) => {
            codec == format.codec && !matches!(codec, Codec::Store | Codec::Deflate)
        }
        (Container::None, Layering::Single) => {
            codec == format.codec && !matches!(codec, Codec::Store | Codec::Deflate)
        }
        _ => false,
    };

    if supported {
        Ok(())
    } else {
        Err(ArchiveError::CodecUnavailable(format!(
            "{} cannot be written with the {} codec",
            format.format, codec
        )))
    }
}

enum WriterLayers<W: Write + Seek + 'static> {
    Tar(TarContainerWriter<Box<dyn CodecWrite<W>>>),
    Zip(StreamingZipWriter<W>),
    Bare(BareStream<W>),
}

/// Composite writer for one archive
pub struct ArchiveWriter<W: Write + Seek + 'static> {
    format: &'static FormatTriple,
    layers: WriterLayers<W>,
    entry_open: bool,
    entries_written: u64,
}

impl<W: Write + Seek + 'static> ArchiveWriter<W> {
    /// Build the writer pipeline for `format` over `sink`
    pub fn open(format: &'static FormatTriple, sink: W, level: CompressionLevel) -> Result<Self> {
        Self::open_with_codec(format, format.codec, sink, level)
    }

    /// Like [`open`](Self::open) with an explicit codec
    ///
    /// The only pairing beyond each format's own codec is ZIP with `store`.
    pub fn open_with_codec(
        format: &'static FormatTriple,
        codec: Codec,
        sink: W,
        level: CompressionLevel,
    ) -> Result<Self> {
        check_pairing(format, codec)?;

        let layers = match format.container {
            Container::Zip => {
                let method = match codec {
                    Codec::Store => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflate,
                };
                WriterLayers::Zip(StreamingZipWriter::with_method(sink, method, level.or(6)))
            }
            Container::Tar => {
                let encoded = codec::encoder(codec, level, sink, None)?;
                WriterLayers::Tar(TarContainerWriter::new(encoded))
            }
            Container::None => WriterLayers::Bare(BareStream {
                codec,
                level,
                state: BareState::Idle(sink),
            }),
        };

        Ok(Self {
            format,
            layers,
            entry_open: false,
            entries_written: 0,
        })
    }

    pub fn format(&self) -> &'static FormatTriple {
        self.format
    }

    /// Number of entries started so far
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Begin an entry; its payload is written through the returned handle
    ///
    /// An entry left open by a dropped handle is closed first.
    pub fn start_entry(&mut self, header: &EntryHeader) -> io::Result<EntryWriter<'_, W>> {
        self.close_open_entry()?;

        match &mut self.layers {
            WriterLayers::Tar(tar) => tar.begin_entry(header)?,
            WriterLayers::Zip(zip) => match header.kind {
                EntryKind::File { size } => {
                    zip.start_entry_with_size(&header.name, header.modified, Some(size))?
                }
                EntryKind::Directory => zip.add_directory(&header.name, header.modified)?,
            },
            WriterLayers::Bare(bare) => bare.begin_entry(header)?,
        }

        self.entry_open = true;
        self.entries_written += 1;
        Ok(EntryWriter { archive: self })
    }

    /// Record a directory with no payload
    pub fn add_directory(&mut self, name: &str, modified: Option<SystemTime>) -> io::Result<()> {
        let mut header = EntryHeader::directory(name);
        header.modified = modified;
        self.start_entry(&header)?.finish()
    }

    /// Close the last entry, write the container trailer and flush the codec
    pub fn finish(mut self) -> io::Result<W> {
        self.close_open_entry()?;
        match self.layers {
            WriterLayers::Tar(tar) => tar.finish()?.finish_codec(),
            WriterLayers::Zip(zip) => zip.finish(),
            WriterLayers::Bare(bare) => bare.finish(),
        }
    }

    fn write_entry_data(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.layers {
            WriterLayers::Tar(tar) => tar.write_entry_data(data),
            WriterLayers::Zip(zip) => zip.write_data(data),
            WriterLayers::Bare(bare) => bare.write_entry_data(data),
        }
    }

    fn close_open_entry(&mut self) -> io::Result<()> {
        if !mem::replace(&mut self.entry_open, false) {
            return Ok(());
        }
        match &mut self.layers {
            WriterLayers::Tar(tar) => tar.end_entry(),
            WriterLayers::Zip(zip) => zip.finish_current_entry(),
            WriterLayers::Bare(_) => Ok(()),
        }
    }
}

/// Write handle for the entry most recently started
///
/// Call [`finish`](Self::finish) before starting the next entry so that
/// framing errors surface where they happen.
pub struct EntryWriter<'a, W: Write + Seek + 'static> {
    archive: &'a mut ArchiveWriter<W>,
}

impl<W: Write + Seek + 'static> EntryWriter<'_, W> {
    /// Close the entry (pads TAR blocks, writes the ZIP data descriptor)
    pub fn finish(self) -> io::Result<()> {
        self.archive.close_open_entry()
    }
}

impl<W: Write + Seek + 'static> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.archive.write_entry_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Codec with no container: exactly one unnamed-or-named stream
struct BareStream<W: Write + 'static> {
    codec: Codec,
    level: CompressionLevel,
    state: BareState<W>,
}

enum BareState<W: Write + 'static> {
    Idle(W),
    Writing(Box<dyn CodecWrite<W>>),
    Taken,
}

impl<W: Write + 'static> BareStream<W> {
    fn begin_entry(&mut self, header: &EntryHeader) -> io::Result<()> {
        if header.kind == EntryKind::Directory {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("a {} stream cannot hold directory '{}'", self.codec, header.name),
            ));
        }

        match mem::replace(&mut self.state, BareState::Taken) {
            BareState::Idle(sink) => {
                let meta = GzipMeta {
                    file_name: header
                        .name
                        .rsplit('/')
                        .next()
                        .filter(|name| !name.is_empty())
                        .map(str::to_string),
                    modified: header.modified,
                };
                let encoder = codec::encoder(self.codec, self.level, sink, Some(&meta))
                    .map_err(|e| io::Error::new(io::ErrorKind::Unsupported, e.to_string()))?;
                self.state = BareState::Writing(encoder);
                Ok(())
            }
            other => {
                self.state = other;
                Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("a {} stream holds a single file", self.codec),
                ))
            }
        }
    }

    fn write_entry_data(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.state {
            BareState::Writing(encoder) => encoder.write_all(data),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "No entry started")),
        }
    }

    fn finish(self) -> io::Result<W> {
        match self.state {
            BareState::Writing(encoder) => encoder.finish_codec(),
            // Nothing selected: still produce a valid, empty stream
            BareState::Idle(sink) => codec::encoder(self.codec, self.level, sink, None)
                .map_err(|e| io::Error::new(io::ErrorKind::Unsupported, e.to_string()))?
                .finish_codec(),
            BareState::Taken => Err(io::Error::new(
                io::ErrorKind::Other,
                "stream was lost after a failed entry",
            )),
        }
    }
}

/// Composite reader for one archive
pub struct ArchiveReader<R: Read + Seek + 'static> {
    format: &'static FormatTriple,
    source: R,
}

impl<R: Read + Seek + 'static> ArchiveReader<R> {
    /// Build the reader pipeline for `format` over `source`
    ///
    /// A zero-length source is rejected up front as `MalformedArchive`.
    pub fn open(format: &'static FormatTriple, mut source: R) -> Result<Self> {
        check_pairing(format, format.codec)?;

        let len = source
            .seek(SeekFrom::End(0))
            .and_then(|len| source.seek(SeekFrom::Start(0)).map(|_| len))
            .map_err(|e| ArchiveError::malformed("cannot seek archive", e))?;
        if len == 0 {
            return Err(ArchiveError::MalformedArchive(
                "archive is empty".to_string(),
            ));
        }

        Ok(Self { format, source })
    }

    pub fn format(&self) -> &'static FormatTriple {
        self.format
    }

    /// Hand every entry, in archive order, to `visit`
    ///
    /// Whatever part of an entry the visitor leaves unread is consumed
    /// afterwards, so integrity checks still run on skipped entries. Errors
    /// returned by the visitor stop the walk and are passed through as is;
    /// failures in the archive's own framing or decoding become
    /// `MalformedArchive`.
    pub fn read_entries<F>(self, visit: F) -> Result<()>
    where
        F: FnMut(&EntryInfo, &mut dyn Read) -> Result<()>,
    {
        match self.format.container {
            Container::Zip => read_zip(self.source, visit),
            Container::Tar => read_tar(self.format.codec, self.source, visit),
            Container::None => read_bare(self.format.codec, self.source, visit),
        }
    }
}

fn read_zip<R, F>(source: R, mut visit: F) -> Result<()>
where
    R: Read + Seek,
    F: FnMut(&EntryInfo, &mut dyn Read) -> Result<()>,
{
    let mut reader =
        StreamingZipReader::new(source).map_err(|e| ArchiveError::malformed("zip", e))?;
    let entries = reader.entries().to_vec();

    for entry in entries {
        let info = EntryInfo {
            name: entry.name.clone(),
            is_dir: entry.is_dir(),
            size: Some(entry.uncompressed_size),
            modified: None,
            mode: None,
        };

        if info.is_dir {
            visit(&info, &mut io::empty())?;
            continue;
        }

        let mut data = reader.read_entry_streaming(&entry).map_err(|e| {
            if e.kind() == io::ErrorKind::Unsupported {
                ArchiveError::CodecUnavailable(e.to_string())
            } else {
                ArchiveError::malformed(&entry.name, e)
            }
        })?;
        visit_entry(&info, &mut data, &mut visit)?;
    }
    Ok(())
}

fn read_tar<R, F>(codec: Codec, source: R, mut visit: F) -> Result<()>
where
    R: Read + 'static,
    F: FnMut(&EntryInfo, &mut dyn Read) -> Result<()>,
{
    let decoded = codec::decoder(codec, source)?;
    let mut archive = tar::Archive::new(TrailerCheck::new(decoded));
    // Decoded offset where the end-of-archive block has to start
    let mut entries_end = 0u64;

    {
        let entries = archive
            .entries()
            .map_err(|e| ArchiveError::malformed("tar", e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| ArchiveError::malformed("tar header", e))?;
            let stored = entry
                .header()
                .entry_size()
                .map_err(|e| ArchiveError::malformed("tar header", e))?;
            entries_end = entry.raw_file_position() + padded_size(stored);
            let entry_type = entry.header().entry_type();
            let name = entry
                .path()
                .map_err(|e| ArchiveError::malformed("tar entry name", e))?
                .to_string_lossy()
                .into_owned();

            let is_dir = entry_type.is_dir();
            if !is_dir && !entry_type.is_file() && entry_type != tar::EntryType::Continuous {
                warn!(entry = %name, kind = ?entry_type, "skipping unsupported tar entry");
                continue;
            }

            let header = entry.header();
            let info = EntryInfo {
                size: (!is_dir).then(|| entry.size()),
                modified: header
                    .mtime()
                    .ok()
                    .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
                mode: header.mode().ok(),
                name,
                is_dir,
            };
            visit_entry(&info, &mut entry, &mut visit)?;
        }
    }

    let mut trailer = archive.into_inner();
    if !trailer.zero_block_at(entries_end) {
        return Err(ArchiveError::MalformedArchive(
            "tar stream ends without an end-of-archive marker".to_string(),
        ));
    }

    // Runs the codec to its own trailer, where checksums live
    io::copy(&mut trailer, &mut io::sink())
        .map_err(|e| ArchiveError::malformed("trailing data", e))?;
    if !trailer.is_block_aligned() {
        return Err(ArchiveError::MalformedArchive(
            "tar stream ends inside a block".to_string(),
        ));
    }
    Ok(())
}

fn read_bare<R, F>(codec: Codec, source: R, mut visit: F) -> Result<()>
where
    R: Read + 'static,
    F: FnMut(&EntryInfo, &mut dyn Read) -> Result<()>,
{
    let (mut decoded, name, modified): (Box<dyn Read>, String, Option<SystemTime>) = match codec {
        Codec::Gzip => {
            let decoder = codec::gzip_decoder(source);
            let header = decoder.header();
            let name = header
                .and_then(|h| h.filename())
                .map(|raw| String::from_utf8_lossy(raw).into_owned())
                .unwrap_or_default();
            let modified = header
                .map(|h| h.mtime())
                .filter(|&secs| secs != 0)
                .map(|secs| UNIX_EPOCH + Duration::from_secs(u64::from(secs)));
            (Box::new(decoder) as Box<dyn Read>, name, modified)
        }
        other => (codec::decoder(other, source)?, String::new(), None),
    };

    let info = EntryInfo {
        name,
        is_dir: false,
        size: None,
        modified,
        mode: None,
    };
    visit_entry(&info, &mut decoded, &mut visit)
}

/// Run the visitor, drain what it left and check the delivered length
fn visit_entry<F>(info: &EntryInfo, data: &mut dyn Read, visit: &mut F) -> Result<()>
where
    F: FnMut(&EntryInfo, &mut dyn Read) -> Result<()>,
{
    let mut counted = CountedRead {
        inner: data,
        count: 0,
    };
    visit(info, &mut counted)?;
    io::copy(&mut counted, &mut io::sink())
        .map_err(|e| ArchiveError::malformed(&info.name, e))?;

    match info.size {
        Some(size) if !info.is_dir && counted.count != size => {
            Err(ArchiveError::MalformedArchive(format!(
                "'{}' holds {} of its {} bytes",
                info.name, counted.count, size
            )))
        }
        _ => Ok(()),
    }
}

struct CountedRead<'a> {
    inner: &'a mut dyn Read,
    count: u64,
}

impl Read for CountedRead<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
