//! ProjFsInstance - the host primitives over the ProjFS API.

use std::ffi::c_void;
use std::path::Path;
use std::sync::{Arc, RwLock};

use mirrorfs::error::win32;
use mirrorfs::host::{FileBasicInfo, StartOptions, WriteBuffer};
use mirrorfs::{HResult, RequiredCallbacks, StreamId, VirtualizationInstance};
use windows::core::{GUID, PCWSTR};
use windows::Win32::Storage::ProjectedFileSystem::*;

use crate::path::to_wide_string;

/// Leaked callback table handed to ProjFS as the instance context.
pub(crate) type CallbackContext = Arc<dyn RequiredCallbacks>;

/// Convert a windows error to our status type.
pub(crate) fn hresult(err: &windows::core::Error) -> HResult {
    HResult(err.code().0)
}

pub(crate) fn to_prj_basic_info(info: &FileBasicInfo) -> PRJ_FILE_BASIC_INFO {
    PRJ_FILE_BASIC_INFO {
        IsDirectory: info.is_directory.into(),
        FileSize: info.file_size,
        CreationTime: info.creation_time,
        LastAccessTime: info.last_access_time,
        LastWriteTime: info.last_write_time,
        ChangeTime: info.change_time,
        FileAttributes: info.file_attributes,
    }
}

#[derive(Default)]
struct Running {
    context: Option<PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT>,
    callbacks: Option<*mut CallbackContext>,
}

/// One ProjFS virtualization instance.
///
/// Holds the namespace handle once virtualization has started, and the
/// callback table ProjFS calls back into until it stops.
pub struct ProjFsInstance {
    running: RwLock<Running>,
}

// Safety: ProjFsInstance is thread-safe because:
// - the namespace handle may be used from any thread
// - the callback table pointer is only created and reclaimed under the lock
unsafe impl Send for ProjFsInstance {}
unsafe impl Sync for ProjFsInstance {}

impl ProjFsInstance {
    pub fn new() -> Self {
        Self {
            running: RwLock::new(Running::default()),
        }
    }

    fn context(&self) -> Result<PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT, HResult> {
        let running = self.running.read().map_err(|_| HResult::INTERNAL_ERROR)?;
        running.context.ok_or_else(|| {
            tracing::error!("ProjFS instance is not running");
            HResult::INTERNAL_ERROR
        })
    }
}

impl Default for ProjFsInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProjFsInstance {
    fn drop(&mut self) {
        self.stop_virtualizing();
    }
}

/// A buffer from `PrjAllocateAlignedBuffer`, freed on drop.
pub struct AlignedBuffer {
    ptr: *mut c_void,
    len: usize,
}

impl AlignedBuffer {
    pub fn as_ptr(&self) -> *const c_void {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl WriteBuffer for AlignedBuffer {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is a live allocation of len bytes owned by self
        unsafe { std::slice::from_raw_parts_mut(self.ptr as *mut u8, self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated by PrjAllocateAlignedBuffer and freed only here
        unsafe { PrjFreeAlignedBuffer(self.ptr) }
    }
}

fn notification_mappings(
    options: &StartOptions,
    roots: &[Vec<u16>],
) -> Vec<PRJ_NOTIFICATION_MAPPING> {
    options
        .notification_mappings
        .iter()
        .zip(roots)
        .map(|(mapping, root)| PRJ_NOTIFICATION_MAPPING {
            NotificationBitMask: PRJ_NOTIFY_TYPES(mapping.mask.bits()),
            NotificationRoot: PCWSTR(root.as_ptr()),
        })
        .collect()
}

impl VirtualizationInstance for ProjFsInstance {
    type WriteBuffer = AlignedBuffer;

    fn mark_as_virtualization_root(&self, root: &Path) -> HResult {
        let instance_id = match GUID::new() {
            Ok(id) => id,
            Err(e) => return hresult(&e),
        };
        let root_wide = to_wide_string(&root.to_string_lossy());

        // SAFETY: root_wide is a valid null-terminated wide string
        let result = unsafe {
            PrjMarkDirectoryAsPlaceholder(
                PCWSTR(root_wide.as_ptr()),
                PCWSTR::null(),
                None,
                &instance_id,
            )
        };

        match result {
            Ok(()) => HResult::OK,
            // Already a virtualization root
            Err(e) if hresult(&e) == HResult::ALREADY_EXISTS => HResult::OK,
            Err(e) => {
                tracing::error!("PrjMarkDirectoryAsPlaceholder failed: {:?}", e);
                hresult(&e)
            }
        }
    }

    fn start_virtualizing(
        &self,
        root: &Path,
        options: &StartOptions,
        callbacks: Arc<dyn RequiredCallbacks>,
    ) -> HResult {
        let mut running = match self.running.write() {
            Ok(running) => running,
            Err(_) => return HResult::INTERNAL_ERROR,
        };
        if running.context.is_some() {
            return HResult::ALREADY_INITIALIZED;
        }

        let root_wide = to_wide_string(&root.to_string_lossy());
        let mapping_roots: Vec<Vec<u16>> = options
            .notification_mappings
            .iter()
            .map(|mapping| to_wide_string(&mapping.root))
            .collect();
        let mut mappings = notification_mappings(options, &mapping_roots);

        let start_options = PRJ_STARTVIRTUALIZING_OPTIONS {
            Flags: if options.enable_negative_path_cache {
                PRJ_FLAG_USE_NEGATIVE_PATH_CACHE
            } else {
                PRJ_FLAG_NONE
            },
            PoolThreadCount: options.pool_thread_count,
            ConcurrentThreadCount: options.concurrent_thread_count,
            NotificationMappings: if mappings.is_empty() {
                std::ptr::null_mut()
            } else {
                mappings.as_mut_ptr()
            },
            NotificationMappingsCount: mappings.len() as u32,
        };

        let table = crate::callbacks::callback_table();

        // Leaked for the lifetime of virtualization, reclaimed on stop
        let context_ptr = Box::into_raw(Box::new(callbacks));

        // SAFETY: all parameters are valid, callbacks are extern "system" fns
        let result = unsafe {
            PrjStartVirtualizing(
                PCWSTR(root_wide.as_ptr()),
                &table,
                Some(context_ptr as *const c_void),
                Some(&start_options),
            )
        };

        match result {
            Ok(context) => {
                running.context = Some(context);
                running.callbacks = Some(context_ptr);
                HResult::OK
            }
            Err(e) => {
                // SAFETY: ProjFS did not start, nothing else holds the pointer
                drop(unsafe { Box::from_raw(context_ptr) });
                tracing::error!("PrjStartVirtualizing failed: {:?}", e);
                hresult(&e)
            }
        }
    }

    fn stop_virtualizing(&self) {
        // In-flight callbacks still read the context, so the lock is not held
        // while ProjFS drains them.
        let context = match self.running.read() {
            Ok(running) => running.context,
            Err(poisoned) => poisoned.into_inner().context,
        };
        if let Some(context) = context {
            // SAFETY: context came from PrjStartVirtualizing
            unsafe { PrjStopVirtualizing(context) };
        }

        let mut running = match self.running.write() {
            Ok(running) => running,
            Err(poisoned) => poisoned.into_inner(),
        };
        running.context = None;
        if let Some(ptr) = running.callbacks.take() {
            // SAFETY: created with Box::into_raw in start_virtualizing
            drop(unsafe { Box::from_raw(ptr) });
        }
    }

    fn write_placeholder_info(&self, relative_path: &str, info: &FileBasicInfo) -> HResult {
        let context = match self.context() {
            Ok(context) => context,
            Err(hresult) => return hresult,
        };

        let placeholder_info = PRJ_PLACEHOLDER_INFO {
            FileBasicInfo: to_prj_basic_info(info),
            ..Default::default()
        };
        let path_wide = to_wide_string(relative_path);

        // SAFETY: path_wide is null-terminated, placeholder_info is fully initialized
        let result = unsafe {
            PrjWritePlaceholderInfo(
                context,
                PCWSTR(path_wide.as_ptr()),
                &placeholder_info,
                std::mem::size_of::<PRJ_PLACEHOLDER_INFO>() as u32,
            )
        };

        match result {
            Ok(()) => HResult::OK,
            Err(e) => {
                tracing::error!("PrjWritePlaceholderInfo failed for {}: {:?}", relative_path, e);
                hresult(&e)
            }
        }
    }

    fn create_write_buffer(&self, desired_size: usize) -> Result<AlignedBuffer, HResult> {
        let context = self.context()?;

        // SAFETY: context is a live namespace handle
        let ptr = unsafe { PrjAllocateAlignedBuffer(context, desired_size) };
        if ptr.is_null() {
            tracing::error!("Failed to allocate aligned buffer of {} bytes", desired_size);
            return Err(HResult::from_win32(win32::ERROR_NOT_ENOUGH_MEMORY as i32));
        }

        Ok(AlignedBuffer {
            ptr,
            len: desired_size,
        })
    }

    fn write_file_data(
        &self,
        stream_id: StreamId,
        buffer: &AlignedBuffer,
        byte_offset: u64,
        length: u32,
    ) -> HResult {
        if length as usize > buffer.len() {
            return HResult::INVALID_ARG;
        }
        let context = match self.context() {
            Ok(context) => context,
            Err(hresult) => return hresult,
        };
        let stream_id = GUID::from_u128(stream_id.0);

        // SAFETY: buffer holds at least length bytes
        let result = unsafe {
            PrjWriteFileData(context, &stream_id, buffer.as_ptr(), byte_offset, length)
        };

        match result {
            Ok(()) => HResult::OK,
            Err(e) => {
                tracing::error!("PrjWriteFileData failed at offset {}: {:?}", byte_offset, e);
                hresult(&e)
            }
        }
    }

    fn file_name_match(name: &str, pattern: &str) -> bool {
        let name_wide = to_wide_string(name);
        let pattern_wide = to_wide_string(pattern);

        // SAFETY: both are null-terminated wide strings
        let matched = unsafe {
            PrjFileNameMatch(PCWSTR(name_wide.as_ptr()), PCWSTR(pattern_wide.as_ptr()))
        };
        bool::from(matched)
    }
}
