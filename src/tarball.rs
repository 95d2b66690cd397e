//! TAR container layer
//!
//! Headers come from the `tar` crate; entry payloads are pushed through in
//! caller-sized chunks instead of being pulled from a reader, so an entry can
//! be fed by any byte source without buffering it.

use crate::compose::{EntryHeader, EntryKind};
use std::io::{self, Read, Write};
use std::time::UNIX_EPOCH;
use tar::{EntryType, Header};

const BLOCK_SIZE: u64 = 512;

/// Bytes the name field of an old-style header can hold
const NAME_FIELD_LEN: usize = 100;

/// Entry currently being streamed
struct OpenEntry {
    name: String,
    declared: u64,
    written: u64,
}

/// Writes TAR framing into `W`, usually a codec encoder
pub(crate) struct TarContainerWriter<W: Write> {
    builder: tar::Builder<W>,
    open: Option<OpenEntry>,
}

impl<W: Write> TarContainerWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            builder: tar::Builder::new(inner),
            open: None,
        }
    }

    pub(crate) fn begin_entry(&mut self, entry: &EntryHeader) -> io::Result<()> {
        if let Some(open) = &self.open {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry '{}' is still open", open.name),
            ));
        }

        let (name, size, entry_type, default_mode) = match entry.kind {
            EntryKind::File { size } => (entry.name.clone(), size, EntryType::Regular, 0o644),
            EntryKind::Directory => (
                format!("{}/", entry.name.trim_end_matches('/')),
                0,
                EntryType::Directory,
                0o755,
            ),
        };

        let mut header = Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_size(size);
        header.set_mode(entry.mode.unwrap_or(default_mode) & 0o7777);
        header.set_mtime(
            entry
                .modified
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0),
        );
        self.write_name(&mut header, &name)?;
        header.set_cksum();

        self.builder.get_mut().write_all(header.as_bytes())?;
        self.open = Some(OpenEntry {
            name,
            declared: size,
            written: 0,
        });
        Ok(())
    }

    pub(crate) fn write_entry_data(&mut self, data: &[u8]) -> io::Result<()> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "No entry started"))?;

        if open.written + data.len() as u64 > open.declared {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "'{}' received more than its declared {} bytes",
                    open.name, open.declared
                ),
            ));
        }
        self.builder.get_mut().write_all(data)?;
        open.written += data.len() as u64;
        Ok(())
    }

    pub(crate) fn end_entry(&mut self) -> io::Result<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        if open.written != open.declared {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "'{}' declared {} bytes but received {}",
                    open.name, open.declared, open.written
                ),
            ));
        }
        write_padding(self.builder.get_mut(), open.written)
    }

    /// Write the end-of-archive blocks and hand back the inner writer
    pub(crate) fn finish(mut self) -> io::Result<W> {
        self.end_entry()?;
        self.builder.into_inner()
    }

    /// Store `name` in the header, preceded by a GNU long-name record when it
    /// does not fit the 100-byte field
    fn write_name(&mut self, header: &mut Header, name: &str) -> io::Result<()> {
        let bytes = name.as_bytes();
        if bytes.len() > NAME_FIELD_LEN {
            let mut long = Header::new_gnu();
            long.set_entry_type(EntryType::GNULongName);
            long.set_mode(0o644);
            long.set_mtime(0);
            // name plus its NUL terminator
            long.set_size(bytes.len() as u64 + 1);
            if let Some(gnu) = long.as_gnu_mut() {
                gnu.name[..13].copy_from_slice(b"././@LongLink");
            }
            long.set_cksum();

            let inner = self.builder.get_mut();
            inner.write_all(long.as_bytes())?;
            inner.write_all(bytes)?;
            inner.write_all(&[0])?;
            write_padding(inner, bytes.len() as u64 + 1)?;
        }

        let field = &mut header.as_old_mut().name;
        let len = bytes.len().min(NAME_FIELD_LEN);
        field[..len].copy_from_slice(&bytes[..len]);
        Ok(())
    }
}

fn write_padding<W: Write>(inner: &mut W, written: u64) -> io::Result<()> {
    let remainder = written % BLOCK_SIZE;
    if remainder != 0 {
        let zeros = [0u8; BLOCK_SIZE as usize];
        inner.write_all(&zeros[..(BLOCK_SIZE - remainder) as usize])?;
    }
    Ok(())
}

/// Size of an entry's payload once padded to whole blocks
pub(crate) fn padded_size(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Watches the decoded TAR stream for the all-zero end-of-archive block
///
/// The `tar` crate treats a clean EOF at a header boundary the same as the
/// end-of-archive marker, so a stream truncated between two entries would
/// otherwise look complete. Zeros at the tail of a payload are not a marker:
/// the caller says where the last entry's padded data ends and
/// `zero_block_at` checks that a zero block was actually read from there.
pub(crate) struct TrailerCheck<R> {
    inner: R,
    total: u64,
    /// Offset just past the last non-zero byte
    last_nonzero_end: u64,
}

impl<R: Read> TrailerCheck<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            total: 0,
            last_nonzero_end: 0,
        }
    }

    /// Whether a full zero block was read starting at `offset`, with nothing
    /// but zeros after it so far
    pub(crate) fn zero_block_at(&self, offset: u64) -> bool {
        self.last_nonzero_end <= offset && self.total >= offset + BLOCK_SIZE
    }

    /// Whether everything read so far adds up to whole blocks
    pub(crate) fn is_block_aligned(&self) -> bool {
        self.total % BLOCK_SIZE == 0
    }
}

impl<R: Read> Read for TrailerCheck<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(last) = buf[..n].iter().rposition(|&b| b != 0) {
            self.last_nonzero_end = self.total + last as u64 + 1;
        }
        self.total += n as u64;
        Ok(n)
    }
}
