//! Status codes returned across the host callback boundary, and startup errors.

use std::fmt;
use std::path::PathBuf;

/// Win32 error numbers the engine reports.
pub mod win32 {
    pub const ERROR_FILE_NOT_FOUND: u32 = 2;
    pub const ERROR_ACCESS_DENIED: u32 = 5;
    pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
    pub const ERROR_READ_FAULT: u32 = 30;
    pub const ERROR_INVALID_PARAMETER: u32 = 87;
    pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
    pub const ERROR_ALREADY_EXISTS: u32 = 183;
    pub const ERROR_ALREADY_INITIALIZED: u32 = 1247;
    pub const ERROR_INTERNAL_ERROR: u32 = 1359;
}

/// A status value in the host's HRESULT space.
///
/// Every callback returns one of these; nothing else crosses the boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub const OK: HResult = HResult(0);
    pub const FILE_NOT_FOUND: HResult = HResult::from_win32(win32::ERROR_FILE_NOT_FOUND as i32);
    pub const ACCESS_DENIED: HResult = HResult::from_win32(win32::ERROR_ACCESS_DENIED as i32);
    pub const INVALID_ARG: HResult = HResult::from_win32(win32::ERROR_INVALID_PARAMETER as i32);
    pub const INSUFFICIENT_BUFFER: HResult =
        HResult::from_win32(win32::ERROR_INSUFFICIENT_BUFFER as i32);
    pub const ALREADY_EXISTS: HResult = HResult::from_win32(win32::ERROR_ALREADY_EXISTS as i32);
    pub const ALREADY_INITIALIZED: HResult =
        HResult::from_win32(win32::ERROR_ALREADY_INITIALIZED as i32);
    pub const INTERNAL_ERROR: HResult = HResult::from_win32(win32::ERROR_INTERNAL_ERROR as i32);

    /// `HRESULT_FROM_WIN32`: non-positive values pass through unchanged,
    /// everything else lands in the Win32 facility.
    #[inline]
    pub const fn from_win32(code: i32) -> HResult {
        if code <= 0 {
            HResult(code)
        } else {
            HResult(((code as u32 & 0x0000_FFFF) | 0x8007_0000) as i32)
        }
    }

    /// Map a backing-store I/O error into the status space.
    pub fn from_io_error(err: &std::io::Error) -> HResult {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => HResult::FILE_NOT_FOUND,
            ErrorKind::PermissionDenied => HResult::ACCESS_DENIED,
            ErrorKind::InvalidInput => HResult::INVALID_ARG,
            ErrorKind::OutOfMemory => HResult::from_win32(win32::ERROR_NOT_ENOUGH_MEMORY as i32),
            _ => native_error(err),
        }
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            HResult::OK => "OK",
            HResult::FILE_NOT_FOUND => "FILE_NOT_FOUND",
            HResult::ACCESS_DENIED => "ACCESS_DENIED",
            HResult::INVALID_ARG => "INVALID_ARG",
            HResult::INSUFFICIENT_BUFFER => "INSUFFICIENT_BUFFER",
            HResult::ALREADY_EXISTS => "ALREADY_EXISTS",
            HResult::ALREADY_INITIALIZED => "ALREADY_INITIALIZED",
            HResult::INTERNAL_ERROR => "INTERNAL_ERROR",
            _ => return None,
        })
    }
}

#[cfg(windows)]
fn native_error(err: &std::io::Error) -> HResult {
    match err.raw_os_error() {
        Some(code) => HResult::from_win32(code),
        None => HResult::from_win32(win32::ERROR_READ_FAULT as i32),
    }
}

// errno values are not Win32 codes, so they cannot be passed through.
#[cfg(not(windows))]
fn native_error(_err: &std::io::Error) -> HResult {
    HResult::from_win32(win32::ERROR_READ_FAULT as i32)
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "HResult({})", name),
            None => write!(f, "HResult(0x{:08X})", self.0 as u32),
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08X}", self.0 as u32),
        }
    }
}

/// Outcome of a backing-store operation that did not fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSystemResult {
    Success,
    FileNotFound,
    /// Short read or a rejected chunk.
    IoError,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up a virtualization root.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Backing store `{}` does not exist", .path.display())]
    BackingRootMissing { path: PathBuf },

    #[error("Backing store `{}` is not a directory", .path.display())]
    BackingRootNotDirectory { path: PathBuf },

    #[error("Cannot create virtualization root `{}`", .path.display())]
    CreateVirtualRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot mark `{}` as a virtualization root: {hresult}", .path.display())]
    MarkRoot { path: PathBuf, hresult: HResult },

    #[error("Cannot start virtualizing `{}`: {hresult}", .path.display())]
    StartVirtualizing { path: PathBuf, hresult: HResult },
}
