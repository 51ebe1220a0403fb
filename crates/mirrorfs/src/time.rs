//! Time conversion utilities to Windows FILETIME.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between Unix epoch (1970-01-01) and Windows epoch (1601-01-01)
/// in 100-nanosecond intervals.
const UNIX_TO_WINDOWS_EPOCH_DIFF: i64 = 116444736000000000;

/// Convert a `SystemTime` to Windows FILETIME.
///
/// FILETIME is a 64-bit value representing 100-nanosecond intervals since
/// January 1, 1601 (UTC). Times before the Unix epoch clamp to it.
#[inline]
pub fn to_filetime(time: SystemTime) -> i64 {
    let since_unix = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    let intervals =
        since_unix.as_secs() as i64 * 10_000_000 + (since_unix.subsec_nanos() / 100) as i64;
    intervals + UNIX_TO_WINDOWS_EPOCH_DIFF
}

/// Get the current time as a Windows FILETIME value.
#[inline]
pub fn now_as_filetime() -> i64 {
    to_filetime(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch_to_filetime() {
        assert_eq!(to_filetime(UNIX_EPOCH), UNIX_TO_WINDOWS_EPOCH_DIFF);
    }

    #[test]
    fn test_one_hour() {
        let ft0 = to_filetime(UNIX_EPOCH);
        let ft = to_filetime(UNIX_EPOCH + Duration::from_secs(3600));
        assert_eq!(ft - ft0, 3600 * 10_000_000);
    }

    #[test]
    fn test_sub_second_precision() {
        let ft = to_filetime(UNIX_EPOCH + Duration::from_nanos(1_500));
        assert_eq!(ft - UNIX_TO_WINDOWS_EPOCH_DIFF, 15);
    }

    #[test]
    fn test_now_is_after_epoch() {
        assert!(now_as_filetime() > UNIX_TO_WINDOWS_EPOCH_DIFF);
    }
}
