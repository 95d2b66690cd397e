//! Streaming ZIP writer that compresses entry data on the fly
//!
//! Each entry is written as local header, compressed data and a trailing data
//! descriptor, so nothing has to be known about an entry before its bytes
//! arrive. Compressed output is staged in a small buffer and drained to the
//! sink whenever it crosses the flush threshold; memory stays bounded
//! regardless of entry size.

use super::{
    dos_datetime, CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE, DOS_DIRECTORY_ATTRIBUTE,
    END_OF_CENTRAL_DIRECTORY_SIGNATURE, FLAG_DATA_DESCRIPTOR, FLAG_UTF8,
    LOCAL_FILE_HEADER_SIGNATURE, ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE,
    ZIP64_LOCATOR_SIGNATURE,
};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Seek, Write};
use std::time::SystemTime;

/// Compressed bytes held back before they are written to the sink
const FLUSH_THRESHOLD: usize = 64 * 1024;

/// Entries announced at or above this size get ZIP64 framing up front,
/// leaving headroom for deflate's worst-case growth
const ZIP64_ENTRY_THRESHOLD: u64 = 0xF000_0000;

/// Version needed to extract: plain deflate vs. ZIP64 extensions
const VERSION_DEFAULT: u8 = 20;
const VERSION_ZIP64: u8 = 45;

/// Compression method to use for ZIP entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression (stored)
    Stored,
    /// DEFLATE compression (most common)
    Deflate,
}

impl CompressionMethod {
    pub(crate) fn to_zip_method(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
        }
    }
}

/// Entry already written, remembered for the central directory
struct WrittenEntry {
    name: String,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    compression_method: u16,
    flags: u16,
    dos_time: u16,
    dos_date: u16,
    external_attributes: u32,
    /// Local header carries a ZIP64 extra and the descriptor 8-byte sizes
    zip64: bool,
}

/// Streaming ZIP writer that compresses data on-the-fly
pub struct StreamingZipWriter<W: Write + Seek> {
    output: W,
    entries: Vec<WrittenEntry>,
    current_entry: Option<CurrentEntry>,
    compression_level: u32,
    compression_method: CompressionMethod,
}

struct CurrentEntry {
    name: String,
    local_header_offset: u64,
    encoder: EntryEncoder,
    counter: CrcCounter,
    dos_time: u16,
    dos_date: u16,
    zip64: bool,
}

enum EntryEncoder {
    Stored(CompressedBuffer),
    Deflate(DeflateEncoder<CompressedBuffer>),
}

impl EntryEncoder {
    fn method(&self) -> CompressionMethod {
        match self {
            EntryEncoder::Stored(_) => CompressionMethod::Stored,
            EntryEncoder::Deflate(_) => CompressionMethod::Deflate,
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            EntryEncoder::Stored(buffer) => buffer.write_all(data),
            EntryEncoder::Deflate(encoder) => encoder.write_all(data),
        }
    }

    fn buffer_mut(&mut self) -> &mut CompressedBuffer {
        match self {
            EntryEncoder::Stored(buffer) => buffer,
            EntryEncoder::Deflate(encoder) => encoder.get_mut(),
        }
    }

    fn finish(self) -> io::Result<CompressedBuffer> {
        match self {
            EntryEncoder::Stored(buffer) => Ok(buffer),
            EntryEncoder::Deflate(encoder) => encoder.finish(),
        }
    }
}

/// Metadata tracker for CRC and byte counts
struct CrcCounter {
    crc: Crc32,
    uncompressed_count: u64,
    compressed_count: u64,
}

impl CrcCounter {
    fn new() -> Self {
        Self {
            crc: Crc32::new(),
            uncompressed_count: 0,
            compressed_count: 0,
        }
    }

    fn update_uncompressed(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.uncompressed_count += data.len() as u64;
    }

    fn add_compressed(&mut self, count: u64) {
        self.compressed_count += count;
    }

    fn finalize(&self) -> u32 {
        self.crc.clone().finalize()
    }
}

/// Staging buffer between the encoder and the sink
struct CompressedBuffer {
    buffer: Vec<u8>,
}

impl CompressedBuffer {
    fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FLUSH_THRESHOLD),
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= FLUSH_THRESHOLD
    }
}

impl Write for CompressedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write + Seek> StreamingZipWriter<W> {
    /// Create a new ZIP writer over `writer`, using DEFLATE at level 6
    pub fn new(writer: W) -> Self {
        Self::with_method(writer, CompressionMethod::Deflate, 6)
    }

    /// Create a new ZIP writer with specified compression method and level
    ///
    /// # Arguments
    /// * `writer` - Any writer implementing Write + Seek
    /// * `method` - Compression method for file entries
    /// * `compression_level` - Compression level (0-9, DEFLATE only)
    pub fn with_method(writer: W, method: CompressionMethod, compression_level: u32) -> Self {
        Self {
            output: writer,
            entries: Vec::new(),
            current_entry: None,
            compression_level: compression_level.min(9),
            compression_method: method,
        }
    }

    /// Start a new file entry of unknown size; any entry still open is
    /// finished first
    ///
    /// Without a size the entry is written with ZIP64 framing.
    pub fn start_entry(&mut self, name: &str, modified: Option<SystemTime>) -> io::Result<()> {
        self.start_entry_with_size(name, modified, None)
    }

    /// Start a new file entry whose uncompressed size is known up front
    ///
    /// Small entries keep the classic 32-bit layout; large or unknown ones
    /// get a ZIP64 extra in the local header and 64-bit sizes in the data
    /// descriptor.
    pub fn start_entry_with_size(
        &mut self,
        name: &str,
        modified: Option<SystemTime>,
        size: Option<u64>,
    ) -> io::Result<()> {
        self.finish_current_entry()?;

        let local_header_offset = self.output.stream_position()?;
        let (dos_time, dos_date) = dos_datetime(modified.unwrap_or(SystemTime::UNIX_EPOCH));
        let method = self.compression_method.to_zip_method();
        let zip64 = size.map_or(true, |size| size >= ZIP64_ENTRY_THRESHOLD);

        // Sizes and CRC are unknown until the data is through, they go into
        // the data descriptor instead
        self.write_local_header(
            name,
            FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
            method,
            (dos_time, dos_date),
            zip64,
        )?;

        let encoder = match self.compression_method {
            CompressionMethod::Deflate => EntryEncoder::Deflate(DeflateEncoder::new(
                CompressedBuffer::new(),
                Compression::new(self.compression_level),
            )),
            CompressionMethod::Stored => EntryEncoder::Stored(CompressedBuffer::new()),
        };

        self.current_entry = Some(CurrentEntry {
            name: name.to_string(),
            local_header_offset,
            encoder,
            counter: CrcCounter::new(),
            dos_time,
            dos_date,
            zip64,
        });

        Ok(())
    }

    /// Write a directory entry (`name` gets a trailing `/`)
    pub fn add_directory(&mut self, name: &str, modified: Option<SystemTime>) -> io::Result<()> {
        self.finish_current_entry()?;

        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{}/", name)
        };
        let local_header_offset = self.output.stream_position()?;
        let (dos_time, dos_date) = dos_datetime(modified.unwrap_or(SystemTime::UNIX_EPOCH));
        let method = CompressionMethod::Stored.to_zip_method();

        // Empty payload: sizes and CRC are all zero and known up front
        self.write_local_header(&name, FLAG_UTF8, method, (dos_time, dos_date), false)?;

        self.entries.push(WrittenEntry {
            name,
            local_header_offset,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            compression_method: method,
            flags: FLAG_UTF8,
            dos_time,
            dos_date,
            external_attributes: DOS_DIRECTORY_ATTRIBUTE,
            zip64: false,
        });
        Ok(())
    }

    /// Write uncompressed data to current entry (will be compressed on-the-fly)
    pub fn write_data(&mut self, data: &[u8]) -> io::Result<()> {
        let entry = self
            .current_entry
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "No entry started"))?;

        entry.counter.update_uncompressed(data);
        entry.encoder.write_all(data)?;

        // Drain staged output to keep memory usage low
        let buffer = entry.encoder.buffer_mut();
        if buffer.should_flush() {
            let compressed_data = buffer.take();
            self.output.write_all(&compressed_data)?;
            entry.counter.add_compressed(compressed_data.len() as u64);
        }

        Ok(())
    }

    /// Finish current entry and write its data descriptor
    pub fn finish_current_entry(&mut self) -> io::Result<()> {
        if let Some(mut entry) = self.current_entry.take() {
            let method = entry.encoder.method().to_zip_method();
            let mut buffer = entry.encoder.finish()?;

            let remaining_data = buffer.take();
            if !remaining_data.is_empty() {
                self.output.write_all(&remaining_data)?;
                entry.counter.add_compressed(remaining_data.len() as u64);
            }

            let crc = entry.counter.finalize();
            let compressed_size = entry.counter.compressed_count;
            let uncompressed_size = entry.counter.uncompressed_count;

            if !entry.zip64
                && (compressed_size > u32::MAX as u64 || uncompressed_size > u32::MAX as u64)
            {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "'{}' outgrew its announced size and needs ZIP64 framing",
                        entry.name
                    ),
                ));
            }

            self.output
                .write_all(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes())?;
            self.output.write_all(&crc.to_le_bytes())?;
            // The descriptor width follows the local header's ZIP64 extra
            if entry.zip64 {
                self.output.write_all(&compressed_size.to_le_bytes())?;
                self.output.write_all(&uncompressed_size.to_le_bytes())?;
            } else {
                self.output
                    .write_all(&(compressed_size as u32).to_le_bytes())?;
                self.output
                    .write_all(&(uncompressed_size as u32).to_le_bytes())?;
            }

            self.entries.push(WrittenEntry {
                name: entry.name,
                local_header_offset: entry.local_header_offset,
                crc32: crc,
                compressed_size,
                uncompressed_size,
                compression_method: method,
                flags: FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
                dos_time: entry.dos_time,
                dos_date: entry.dos_date,
                external_attributes: 0,
                zip64: entry.zip64,
            });
        }
        Ok(())
    }

    fn write_local_header(
        &mut self,
        name: &str,
        flags: u16,
        method: u16,
        (dos_time, dos_date): (u16, u16),
        zip64: bool,
    ) -> io::Result<()> {
        // ZIP64: both 32-bit sizes point at the extra field, whose own
        // values stay zero until the data descriptor
        let (version, size_field, extra) = if zip64 {
            let mut extra = Vec::with_capacity(20);
            extra.extend_from_slice(&0x0001u16.to_le_bytes());
            extra.extend_from_slice(&16u16.to_le_bytes());
            extra.extend_from_slice(&[0u8; 16]);
            (VERSION_ZIP64, 0xFFFF_FFFFu32, extra)
        } else {
            (VERSION_DEFAULT, 0u32, Vec::new())
        };

        self.output
            .write_all(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes())?;
        self.output.write_all(&[version, 0])?; // version needed
        self.output.write_all(&flags.to_le_bytes())?;
        self.output.write_all(&method.to_le_bytes())?;
        self.output.write_all(&dos_time.to_le_bytes())?;
        self.output.write_all(&dos_date.to_le_bytes())?;
        self.output.write_all(&0u32.to_le_bytes())?; // crc32
        self.output.write_all(&size_field.to_le_bytes())?; // compressed size
        self.output.write_all(&size_field.to_le_bytes())?; // uncompressed size
        self.output.write_all(&name_len(name)?.to_le_bytes())?;
        self.output.write_all(&(extra.len() as u16).to_le_bytes())?;
        self.output.write_all(name.as_bytes())?;
        self.output.write_all(&extra)?;
        Ok(())
    }

    /// Finish ZIP file (write central directory and return the writer)
    pub fn finish(mut self) -> io::Result<W> {
        self.finish_current_entry()?;

        let central_dir_offset = self.output.stream_position()?;

        for entry in &self.entries {
            // ZIP64 extra field carries whichever values overflowed, in this order
            let mut data: Vec<u8> = Vec::new();
            if entry.uncompressed_size > u32::MAX as u64 {
                data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
            }
            if entry.compressed_size > u32::MAX as u64 {
                data.extend_from_slice(&entry.compressed_size.to_le_bytes());
            }
            if entry.local_header_offset > u32::MAX as u64 {
                data.extend_from_slice(&entry.local_header_offset.to_le_bytes());
            }
            let mut extra_field: Vec<u8> = Vec::new();
            if !data.is_empty() {
                extra_field.extend_from_slice(&0x0001u16.to_le_bytes());
                extra_field.extend_from_slice(&(data.len() as u16).to_le_bytes());
                extra_field.extend_from_slice(&data);
            }
            let version = if entry.zip64 || !data.is_empty() {
                VERSION_ZIP64
            } else {
                VERSION_DEFAULT
            };

            self.output
                .write_all(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
            self.output.write_all(&[version, 0])?; // version made by
            self.output.write_all(&[version, 0])?; // version needed
            self.output.write_all(&entry.flags.to_le_bytes())?;
            self.output
                .write_all(&entry.compression_method.to_le_bytes())?;
            self.output.write_all(&entry.dos_time.to_le_bytes())?;
            self.output.write_all(&entry.dos_date.to_le_bytes())?;
            self.output.write_all(&entry.crc32.to_le_bytes())?;
            self.output
                .write_all(&clamp_u32(entry.compressed_size).to_le_bytes())?;
            self.output
                .write_all(&clamp_u32(entry.uncompressed_size).to_le_bytes())?;
            self.output.write_all(&name_len(&entry.name)?.to_le_bytes())?;
            self.output
                .write_all(&(extra_field.len() as u16).to_le_bytes())?; // extra len
            self.output.write_all(&0u16.to_le_bytes())?; // file comment len
            self.output.write_all(&0u16.to_le_bytes())?; // disk number start
            self.output.write_all(&0u16.to_le_bytes())?; // internal attrs
            self.output
                .write_all(&entry.external_attributes.to_le_bytes())?;
            self.output
                .write_all(&clamp_u32(entry.local_header_offset).to_le_bytes())?;
            self.output.write_all(entry.name.as_bytes())?;
            self.output.write_all(&extra_field)?;
        }

        let central_dir_size = self.output.stream_position()? - central_dir_offset;

        let need_zip64 = self.entries.len() > u16::MAX as usize
            || central_dir_size > u32::MAX as u64
            || central_dir_offset > u32::MAX as u64;

        if need_zip64 {
            let zip64_eocd_pos = central_dir_offset + central_dir_size;

            self.output
                .write_all(&ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
            // remaining record: versions(4), disks(8), counts(16), cd size and offset(16)
            self.output.write_all(&44u64.to_le_bytes())?;
            self.output.write_all(&[VERSION_ZIP64, 0])?;
            self.output.write_all(&[VERSION_ZIP64, 0])?;
            self.output.write_all(&0u32.to_le_bytes())?;
            self.output.write_all(&0u32.to_le_bytes())?;
            self.output
                .write_all(&(self.entries.len() as u64).to_le_bytes())?;
            self.output
                .write_all(&(self.entries.len() as u64).to_le_bytes())?;
            self.output.write_all(&central_dir_size.to_le_bytes())?;
            self.output.write_all(&central_dir_offset.to_le_bytes())?;

            self.output.write_all(&ZIP64_LOCATOR_SIGNATURE.to_le_bytes())?;
            self.output.write_all(&0u32.to_le_bytes())?;
            self.output.write_all(&zip64_eocd_pos.to_le_bytes())?;
            self.output.write_all(&1u32.to_le_bytes())?; // total number of disks
        }

        self.output
            .write_all(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
        self.output.write_all(&0u16.to_le_bytes())?; // disk number
        self.output.write_all(&0u16.to_le_bytes())?; // disk with central dir

        let entry_count = if self.entries.len() > u16::MAX as usize {
            0xFFFF
        } else {
            self.entries.len() as u16
        };
        self.output.write_all(&entry_count.to_le_bytes())?;
        self.output.write_all(&entry_count.to_le_bytes())?;
        self.output
            .write_all(&clamp_u32(central_dir_size).to_le_bytes())?;
        self.output
            .write_all(&clamp_u32(central_dir_offset).to_le_bytes())?;
        self.output.write_all(&0u16.to_le_bytes())?; // comment len

        self.output.flush()?;
        Ok(self.output)
    }
}

/// 32-bit field value, or the ZIP64 placeholder when it does not fit
fn clamp_u32(value: u64) -> u32 {
    if value > u32::MAX as u64 {
        0xFFFFFFFF
    } else {
        value as u32
    }
}

fn name_len(name: &str) -> io::Result<u16> {
    u16::try_from(name.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "entry name longer than 65535 bytes: {}...",
                name.chars().take(32).collect::<String>()
            ),
        )
    })
}
