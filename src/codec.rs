//! Byte-stream compression layer
//!
//! Wraps a sink or source in the encoder/decoder of one codec. This layer
//! knows nothing about entries; containers sit on top of it.

use crate::error::{ArchiveError, Result};
use crate::options::CompressionLevel;
use crate::registry::Codec;
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::GzBuilder;
use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use xz2::read::XzDecoder;
use xz2::stream::{LzmaOptions, Stream};
use xz2::write::XzEncoder;

/// Level used when the caller asks for the codec default
const DEFAULT_LEVEL: u32 = 6;

/// An encoder that can be finished to recover the sink it wraps
pub(crate) trait CodecWrite<W>: Write {
    /// Flush the codec trailer and hand back the sink
    fn finish_codec(self: Box<Self>) -> io::Result<W>;
}

/// Store codec: bytes go straight through
struct Passthrough<W: Write> {
    inner: W,
}

impl<W: Write> Write for Passthrough<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> CodecWrite<W> for Passthrough<W> {
    fn finish_codec(self: Box<Self>) -> io::Result<W> {
        Ok(self.inner)
    }
}

impl<W: Write> CodecWrite<W> for GzEncoder<W> {
    fn finish_codec(self: Box<Self>) -> io::Result<W> {
        (*self).finish()
    }
}

impl<W: Write> CodecWrite<W> for BzEncoder<W> {
    fn finish_codec(self: Box<Self>) -> io::Result<W> {
        (*self).finish()
    }
}

impl<W: Write> CodecWrite<W> for XzEncoder<W> {
    fn finish_codec(self: Box<Self>) -> io::Result<W> {
        (*self).finish()
    }
}

/// Gzip header fields, only meaningful when gzip is the sole layer
#[derive(Debug, Default, Clone)]
pub(crate) struct GzipMeta {
    pub file_name: Option<String>,
    pub modified: Option<SystemTime>,
}

/// Wrap `sink` in the encoder for `codec`
pub(crate) fn encoder<'a, W: Write + 'a>(
    codec: Codec,
    level: CompressionLevel,
    sink: W,
    gzip_meta: Option<&GzipMeta>,
) -> Result<Box<dyn CodecWrite<W> + 'a>> {
    let level_value = level.or(DEFAULT_LEVEL);
    match codec {
        Codec::Store => Ok(Box::new(Passthrough { inner: sink })),
        Codec::Gzip => {
            let mut builder = GzBuilder::new();
            if let Some(meta) = gzip_meta {
                if let Some(name) = &meta.file_name {
                    builder = builder.filename(name.as_bytes());
                }
                if let Some(modified) = meta.modified {
                    // gzip MTIME is 32-bit seconds; 0 means "unknown"
                    let secs = modified
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    builder = builder.mtime(u32::try_from(secs).unwrap_or(0));
                }
            }
            Ok(Box::new(
                builder.write(sink, flate2::Compression::new(level_value)),
            ))
        }
        Codec::Bzip2 => Ok(Box::new(BzEncoder::new(
            sink,
            // bzip2 block sizes run 1..=9
            bzip2::Compression::new(level_value.clamp(1, 9)),
        ))),
        Codec::Xz => Ok(Box::new(XzEncoder::new(sink, level_value))),
        Codec::Lzma => {
            let options = LzmaOptions::new_preset(level_value).map_err(|e| {
                ArchiveError::CodecUnavailable(format!("lzma preset {}: {}", level_value, e))
            })?;
            let stream = Stream::new_lzma_encoder(&options)
                .map_err(|e| ArchiveError::CodecUnavailable(format!("lzma encoder: {}", e)))?;
            Ok(Box::new(XzEncoder::new_stream(sink, stream)))
        }
        Codec::Deflate => Err(ArchiveError::CodecUnavailable(
            "raw deflate is only available inside a ZIP container".to_string(),
        )),
    }
}

/// Wrap `source` in the decoder for `codec`
pub(crate) fn decoder<'a, R: Read + 'a>(codec: Codec, source: R) -> Result<Box<dyn Read + 'a>> {
    match codec {
        Codec::Store => Ok(Box::new(source)),
        // Multi-member decoders accept output of parallel compressors too
        Codec::Gzip => Ok(Box::new(MultiGzDecoder::new(source))),
        Codec::Bzip2 => Ok(Box::new(MultiBzDecoder::new(source))),
        Codec::Xz => Ok(Box::new(XzDecoder::new(source))),
        Codec::Lzma => {
            let stream = Stream::new_lzma_decoder(u64::MAX)
                .map_err(|e| ArchiveError::CodecUnavailable(format!("lzma decoder: {}", e)))?;
            Ok(Box::new(XzDecoder::new_stream(source, stream)))
        }
        Codec::Deflate => Err(ArchiveError::CodecUnavailable(
            "raw deflate is only available inside a ZIP container".to_string(),
        )),
    }
}

/// Gzip decoder that exposes the header, for container-less extraction
pub(crate) fn gzip_decoder<R: Read>(source: R) -> MultiGzDecoder<R> {
    MultiGzDecoder::new(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(codec: Codec, level: CompressionLevel, data: &[u8]) -> Vec<u8> {
        let mut writer = encoder(codec, level, Vec::new(), None).unwrap();
        for chunk in data.chunks(4096) {
            writer.write_all(chunk).unwrap();
        }
        let encoded = writer.finish_codec().unwrap();

        let mut reader = decoder(codec, &encoded[..]).unwrap();
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        decoded
    }

    #[test]
    fn test_every_stream_codec_roundtrips() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        for codec in [Codec::Store, Codec::Gzip, Codec::Bzip2, Codec::Lzma, Codec::Xz] {
            assert_eq!(
                roundtrip(codec, CompressionLevel::Default, &data),
                data,
                "{}",
                codec.name()
            );
        }
    }

    #[test]
    fn test_level_zero_and_nine() {
        let data = b"The quick brown fox jumps over the lazy dog. ".repeat(200);
        for codec in [Codec::Gzip, Codec::Bzip2, Codec::Xz, Codec::Lzma] {
            for level in [0, 9] {
                let level = CompressionLevel::new(level).unwrap();
                assert_eq!(roundtrip(codec, level, &data), data);
            }
        }
    }

    #[test]
    fn test_deflate_needs_container() {
        assert!(matches!(
            encoder(Codec::Deflate, CompressionLevel::Default, Vec::new(), None),
            Err(ArchiveError::CodecUnavailable(_))
        ));
    }

    #[test]
    fn test_gzip_header_carries_name() {
        let meta = GzipMeta {
            file_name: Some("notes.txt".to_string()),
            modified: None,
        };
        let mut writer =
            encoder(Codec::Gzip, CompressionLevel::Default, Vec::new(), Some(&meta)).unwrap();
        writer.write_all(b"hello").unwrap();
        let encoded = writer.finish_codec().unwrap();

        let mut decoder = gzip_decoder(&encoded[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
        let name = decoder.header().and_then(|h| h.filename()).unwrap();
        assert_eq!(name, b"notes.txt");
    }
}
