//! Wide-string conversion at the ProjFS boundary.

use windows::core::PCWSTR;

pub use mirrorfs::path::to_wide_string;

/// Convert a PCWSTR to Rust String.
///
/// # Safety
/// The pointer must be null or valid and null-terminated.
pub unsafe fn pcwstr_to_string(s: PCWSTR) -> String {
    if s.is_null() {
        return String::new();
    }
    // SAFETY: We're in an unsafe fn and caller guarantees validity
    unsafe {
        let ptr = s.0;
        let len = (0..).find(|&i| *ptr.add(i) == 0).unwrap_or(0);
        String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
    }
}

/// Like [`pcwstr_to_string`], but a null pointer is `None`.
///
/// # Safety
/// The pointer must be null or valid and null-terminated.
pub unsafe fn pcwstr_to_option(s: PCWSTR) -> Option<String> {
    if s.is_null() {
        None
    } else {
        // SAFETY: checked non-null, caller guarantees termination
        Some(unsafe { pcwstr_to_string(s) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let wide = to_wide_string("a\\B.txt");
        let back = unsafe { pcwstr_to_string(PCWSTR(wide.as_ptr())) };
        assert_eq!(back, "a\\B.txt");
    }

    #[test]
    fn test_null() {
        assert_eq!(unsafe { pcwstr_to_string(PCWSTR::null()) }, "");
        assert_eq!(unsafe { pcwstr_to_option(PCWSTR::null()) }, None);
    }
}
