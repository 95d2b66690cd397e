//! ZIP container - streaming writer and reader
//!
//! ZIP is the one format whose container compresses its own entries, so the
//! stream composer uses it as a single layer.

mod reader;
mod writer;

pub use reader::{StreamingZipReader, ZipEntry};
pub use writer::{CompressionMethod, StreamingZipWriter};

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// ZIP local file header signature
pub(crate) const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP central directory signature
pub(crate) const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub(crate) const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// ZIP64 end of central directory record signature
pub(crate) const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;

/// ZIP64 end of central directory locator signature
pub(crate) const ZIP64_LOCATOR_SIGNATURE: u32 = 0x07064b50;

/// Data descriptor signature
pub(crate) const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// General purpose flag: sizes and CRC follow the data in a descriptor
pub(crate) const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// General purpose flag: name is UTF-8
pub(crate) const FLAG_UTF8: u16 = 1 << 11;

/// MS-DOS directory attribute, stored in the external attributes
pub(crate) const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Earliest DOS stamp, 1980-01-01 00:00:00
const DOS_MIN: (u16, u16) = (0, (1 << 5) | 1);

/// Latest DOS stamp, 2107-12-31 23:59:58
const DOS_MAX: (u16, u16) = ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);

/// Convert a timestamp to the MS-DOS (time, date) pair ZIP headers carry
///
/// DOS time has two-second resolution and covers 1980 to 2107; anything
/// outside clamps to the nearest end. Times are taken as UTC.
pub(crate) fn dos_datetime(time: SystemTime) -> (u16, u16) {
    let Ok(since_epoch) = time.duration_since(UNIX_EPOCH) else {
        return DOS_MIN;
    };
    let utc = i64::try_from(since_epoch.as_secs())
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    let Some(utc) = utc else {
        return DOS_MAX;
    };

    match utc.year() {
        ..=1979 => DOS_MIN,
        2108.. => DOS_MAX,
        year => {
            let time = (utc.hour() << 11) | (utc.minute() << 5) | (utc.second() / 2);
            let date = (((year - 1980) as u32) << 9) | (utc.month() << 5) | utc.day();
            (time as u16, date as u16)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_dos_datetime() {
        // 2024-02-29 13:45:58 UTC
        let time = UNIX_EPOCH + Duration::from_secs(1_709_214_358);
        let (t, d) = dos_datetime(time);
        assert_eq!(d >> 9, 2024 - 1980);
        assert_eq!((d >> 5) & 0x0f, 2);
        assert_eq!(d & 0x1f, 29);
        assert_eq!(t >> 11, 13);
        assert_eq!((t >> 5) & 0x3f, 45);
        assert_eq!((t & 0x1f) * 2, 58);
    }

    #[test]
    fn test_dos_datetime_clamps() {
        assert_eq!(dos_datetime(UNIX_EPOCH), (0, 0x21));
        assert_eq!(dos_datetime(UNIX_EPOCH - Duration::from_secs(86_400)), (0, 0x21));

        // 2200-01-01
        let late = UNIX_EPOCH + Duration::from_secs(7_258_118_400);
        assert_eq!(dos_datetime(late), DOS_MAX);
    }

    #[test]
    fn test_dos_datetime_last_representable_second() {
        // 2107-12-31 23:59:59 UTC rounds down to an even second
        let time = UNIX_EPOCH + Duration::from_secs(4_354_819_199);
        assert_eq!(dos_datetime(time), DOS_MAX);
    }
}
