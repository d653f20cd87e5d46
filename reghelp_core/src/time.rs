use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Duration, Utc};

/// Microseconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH_DIFF_MICROS: i64 = 11_644_473_600_000_000;

/// Converts a FILETIME (100-nanosecond ticks since 1601-01-01) to a UTC date.
/// Sub-microsecond precision is truncated.
pub fn filetime_to_datetime(ticks: u64) -> DateTime<Utc> {
    // u64::MAX ticks is roughly year 60055, well inside chrono's range
    let micros = (ticks / 10) as i64 - FILETIME_UNIX_EPOCH_DIFF_MICROS;
    DateTime::<Utc>::default() + Duration::microseconds(micros)
}

/// Formats a FILETIME the way `ctime` does, suffixed with the time zone:
/// `Mon Jan  1 00:00:00 1601 UTC`.
pub fn format_timestamp(ticks: u64) -> String {
    filetime_to_datetime(ticks)
        .format("%a %b %e %H:%M:%S %Y UTC")
        .to_string()
}

/// Reads a little-endian FILETIME from the first 8 bytes of a binary value.
pub fn filetime_from_bytes(bytes: &[u8]) -> Option<u64> {
    bytes.get(..8).map(LittleEndian::read_u64)
}

#[test]
fn format_timestamp_epoch() {
    let formatted = format_timestamp(0);
    assert_eq!(formatted, "Mon Jan  1 00:00:00 1601 UTC");
    assert!(formatted.starts_with("Mon"));
    assert!(formatted.ends_with("1601 UTC"));
}

#[test]
fn format_timestamp_unix_epoch() {
    assert_eq!(format_timestamp(116_444_736_000_000_000), "Thu Jan  1 00:00:00 1970 UTC");
}

#[test]
fn format_timestamp_truncates_sub_microseconds() {
    // 2021-03-14 15:09:26.535897 UTC plus 9 extra ticks
    let ticks = 132_602_081_665_358_979;
    assert_eq!(format_timestamp(ticks), "Sun Mar 14 15:09:26 2021 UTC");
    assert_eq!(filetime_to_datetime(ticks).timestamp_subsec_micros(), 535_897);
}

#[test]
fn format_timestamp_max_ticks() {
    assert!(format_timestamp(u64::MAX).ends_with("UTC"));
}

#[test]
fn filetime_from_bytes_reads_little_endian() {
    let bytes = 116_444_736_000_000_000u64.to_le_bytes();
    assert_eq!(filetime_from_bytes(&bytes), Some(116_444_736_000_000_000));
    assert_eq!(filetime_from_bytes(&[1, 2, 3]), None);
}
