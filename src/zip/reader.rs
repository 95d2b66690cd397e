//! Streaming ZIP reader
//!
//! Only the central directory is held in memory. Entry data is decompressed
//! on the fly and checked against the recorded CRC-32 and size as it is read.

use super::{
    CENTRAL_DIRECTORY_SIGNATURE, DOS_DIRECTORY_ATTRIBUTE, END_OF_CENTRAL_DIRECTORY_SIGNATURE,
    LOCAL_FILE_HEADER_SIGNATURE, ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE,
};
use crc32fast::Hasher as Crc32;
use flate2::read::DeflateDecoder;
use std::io::{self, BufReader, Read, Seek, SeekFrom};

/// EOCD is 22 bytes plus a comment of up to 65535 bytes
const EOCD_SEARCH_WINDOW: u64 = 65557;

/// Entry in the ZIP central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    pub offset: u64,
    external_attributes: u32,
}

impl ZipEntry {
    /// Directory entries end in `/` or carry the DOS directory attribute
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.external_attributes & DOS_DIRECTORY_ATTRIBUTE != 0
    }
}

/// Streaming ZIP archive reader
pub struct StreamingZipReader<R: Read + Seek> {
    file: BufReader<R>,
    entries: Vec<ZipEntry>,
}

impl<R: Read + Seek> StreamingZipReader<R> {
    /// Open a ZIP stream and read its central directory
    pub fn new(reader: R) -> io::Result<Self> {
        let mut file = BufReader::new(reader);
        let entries = read_central_directory(&mut file)?;
        Ok(StreamingZipReader { file, entries })
    }

    /// Get list of all entries in the ZIP, in central directory order
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Get a streaming reader for an entry
    ///
    /// The returned reader decompresses on the fly and fails with
    /// `InvalidData` at end of stream if the CRC-32 or size do not match
    /// the central directory.
    pub fn read_entry_streaming(&mut self, entry: &ZipEntry) -> io::Result<Box<dyn Read + '_>> {
        self.file.seek(SeekFrom::Start(entry.offset))?;

        let signature = read_u32_le(&mut self.file)?;
        if signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(invalid(format!(
                "invalid local file header signature for '{}'",
                entry.name
            )));
        }

        // version, flags, method, time, date, crc, sizes: the central
        // directory copies are authoritative
        self.file.seek(SeekFrom::Current(22))?;

        let filename_len = read_u16_le(&mut self.file)? as i64;
        let extra_len = read_u16_le(&mut self.file)? as i64;
        self.file
            .seek(SeekFrom::Current(filename_len + extra_len))?;

        let limited_reader = (&mut self.file).take(entry.compressed_size);

        let decoded: Box<dyn Read + '_> = match entry.compression_method {
            0 => Box::new(limited_reader),
            8 => Box::new(DeflateDecoder::new(limited_reader)),
            method => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!(
                        "unsupported compression method {} for '{}'",
                        method, entry.name
                    ),
                ))
            }
        };

        Ok(Box::new(CheckedReader {
            inner: decoded,
            name: entry.name.clone(),
            crc: Crc32::new(),
            expected_crc: entry.crc32,
            expected_size: entry.uncompressed_size,
            count: 0,
        }))
    }
}

/// Verifies CRC-32 and length once the wrapped stream reports EOF
struct CheckedReader<R> {
    inner: R,
    name: String,
    crc: Crc32,
    expected_crc: u32,
    expected_size: u64,
    count: u64,
}

impl<R: Read> Read for CheckedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.crc.update(&buf[..n]);
            self.count += n as u64;
            if self.count > self.expected_size {
                return Err(invalid(format!(
                    "'{}' is longer than its recorded {} bytes",
                    self.name, self.expected_size
                )));
            }
        } else if buf.is_empty() {
            return Ok(0);
        } else if self.count != self.expected_size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "'{}' ended after {} of {} bytes",
                    self.name, self.count, self.expected_size
                ),
            ));
        } else if self.crc.clone().finalize() != self.expected_crc {
            return Err(invalid(format!("CRC-32 mismatch for '{}'", self.name)));
        }
        Ok(n)
    }
}

/// Read the central directory from the ZIP stream
fn read_central_directory<R: Read + Seek>(file: &mut R) -> io::Result<Vec<ZipEntry>> {
    let eocd_offset = find_eocd(file)?;
    file.seek(SeekFrom::Start(eocd_offset))?;

    let signature = read_u32_le(file)?;
    if signature != END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(invalid(format!(
            "invalid end of central directory signature: 0x{:08x}",
            signature
        )));
    }

    // Skip disk number fields (4 bytes)
    file.seek(SeekFrom::Current(4))?;
    let _entries_on_disk = read_u16_le(file)?;

    // These values may be placeholder 0xFFFF/0xFFFFFFFF when ZIP64 is used
    let total_entries_16 = read_u16_le(file)?;
    let cd_size_32 = read_u32_le(file)?;
    let cd_offset_32 = read_u32_le(file)?;

    let mut total_entries = total_entries_16 as u64;
    let mut cd_offset = cd_offset_32 as u64;

    if total_entries_16 == 0xFFFF || cd_size_32 == 0xFFFFFFFF || cd_offset_32 == 0xFFFFFFFF {
        let (zip64_total_entries, zip64_cd_offset) = read_zip64_eocd(file, eocd_offset)?;
        total_entries = zip64_total_entries;
        cd_offset = zip64_cd_offset;
    }

    if cd_offset > eocd_offset {
        return Err(invalid(format!(
            "central directory offset {} lies past its end record",
            cd_offset
        )));
    }

    file.seek(SeekFrom::Start(cd_offset))?;

    // Never trust the count for the allocation size
    let mut entries = Vec::with_capacity(total_entries.min(4096) as usize);
    for index in 0..total_entries {
        let signature = read_u32_le(file)?;
        if signature != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(invalid(format!(
                "central directory record {} of {} has signature 0x{:08x}",
                index, total_entries, signature
            )));
        }

        // Skip version made by, version needed, flags
        file.seek(SeekFrom::Current(6))?;
        let compression_method = read_u16_le(file)?;

        // Skip modification time and date
        file.seek(SeekFrom::Current(4))?;
        let crc32 = read_u32_le(file)?;

        // Sizes may be 0xFFFFFFFF meaning the real value is in the ZIP64 extra
        let compressed_size_32 = read_u32_le(file)? as u64;
        let uncompressed_size_32 = read_u32_le(file)? as u64;
        let filename_len = read_u16_le(file)? as usize;
        let extra_len = read_u16_le(file)? as usize;
        let comment_len = read_u16_le(file)? as usize;

        // Skip disk number and internal attributes
        file.seek(SeekFrom::Current(4))?;
        let external_attributes = read_u32_le(file)?;
        let offset_32 = read_u32_le(file)? as u64;

        let mut filename_buf = vec![0u8; filename_len];
        file.read_exact(&mut filename_buf)?;
        let name = String::from_utf8_lossy(&filename_buf).into_owned();

        let mut extra_buf = vec![0u8; extra_len];
        file.read_exact(&mut extra_buf)?;

        let mut uncompressed_size = uncompressed_size_32;
        let mut compressed_size = compressed_size_32;
        let mut offset = offset_32;

        if let Some(zip64) = find_extra_field(&extra_buf, 0x0001) {
            // Values appear in this fixed order, each only if its 32-bit field overflowed
            let mut values = zip64
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]));
            if uncompressed_size_32 == 0xFFFFFFFF {
                uncompressed_size = values.next().unwrap_or(uncompressed_size);
            }
            if compressed_size_32 == 0xFFFFFFFF {
                compressed_size = values.next().unwrap_or(compressed_size);
            }
            if offset_32 == 0xFFFFFFFF {
                offset = values.next().unwrap_or(offset);
            }
        }

        if comment_len > 0 {
            file.seek(SeekFrom::Current(comment_len as i64))?;
        }

        entries.push(ZipEntry {
            name,
            compressed_size,
            uncompressed_size,
            compression_method,
            crc32,
            offset,
            external_attributes,
        });
    }

    Ok(entries)
}

/// Payload of the first extra field with the given header id
fn find_extra_field(extra: &[u8], wanted: u16) -> Option<&[u8]> {
    let mut i = 0usize;
    while i + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[i], extra[i + 1]]);
        let data_len = u16::from_le_bytes([extra[i + 2], extra[i + 3]]) as usize;
        i += 4;
        if i + data_len > extra.len() {
            return None;
        }
        if id == wanted {
            return Some(&extra[i..i + data_len]);
        }
        i += data_len;
    }
    None
}

/// When EOCD indicates ZIP64 usage, find and read ZIP64 EOCD locator and record
///
/// Returns (total entries, central directory offset).
fn read_zip64_eocd<R: Read + Seek>(file: &mut R, eocd_offset: u64) -> io::Result<(u64, u64)> {
    // The locator is 20 bytes and sits right before the classic EOCD
    let locator_offset = eocd_offset
        .checked_sub(20)
        .ok_or_else(|| invalid("ZIP64 EOCD locator not found"))?;
    file.seek(SeekFrom::Start(locator_offset))?;

    let mut locator = [0u8; 20];
    file.read_exact(&mut locator)?;
    if locator[0..4] != [0x50, 0x4b, 0x06, 0x07] {
        return Err(invalid("ZIP64 EOCD locator not found"));
    }
    let zip64_eocd_offset = u64::from_le_bytes([
        locator[8],
        locator[9],
        locator[10],
        locator[11],
        locator[12],
        locator[13],
        locator[14],
        locator[15],
    ]);

    file.seek(SeekFrom::Start(zip64_eocd_offset))?;
    let sig = read_u32_le(file)?;
    if sig != ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(invalid(format!("invalid ZIP64 EOCD signature: 0x{:08x}", sig)));
    }

    // record size (8), versions (4), disk numbers (8), entries on this disk (8)
    file.seek(SeekFrom::Current(28))?;
    let total_entries = read_u64_le(file)?;
    let _cd_size = read_u64_le(file)?;
    let cd_offset = read_u64_le(file)?;

    Ok((total_entries, cd_offset))
}

/// Find the end of central directory record by scanning from the end of the stream
fn find_eocd<R: Read + Seek>(file: &mut R) -> io::Result<u64> {
    let file_size = file.seek(SeekFrom::End(0))?;

    let search_start = file_size.saturating_sub(EOCD_SEARCH_WINDOW);
    file.seek(SeekFrom::Start(search_start))?;

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    // Search for EOCD signature from the end
    for i in (0..buffer.len().saturating_sub(21)).rev() {
        if buffer[i..i + 4] == [0x50, 0x4b, 0x05, 0x06] {
            return Ok(search_start + i as u64);
        }
    }

    Err(invalid("end of central directory not found"))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn read_u16_le<R: Read>(file: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    file.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(file: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read>(file: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
