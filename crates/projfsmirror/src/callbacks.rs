//! ProjFS callback trampolines.
//!
//! These callbacks are invoked by Windows when the filesystem is accessed.
//! Each one recovers the [`RequiredCallbacks`] table from the instance
//! context, converts the arguments and forwards the call. A panic never
//! unwinds into the driver; it is reported as an internal error.

use std::panic::{catch_unwind, AssertUnwindSafe};

use mirrorfs::host::DirectoryEnumerationResults;
use mirrorfs::{
    EnumerationId, FileBasicInfo, HResult, NotificationType, RequiredCallbacks, StreamId,
};
use windows::core::{GUID, HRESULT, PCWSTR};
use windows::Win32::Storage::ProjectedFileSystem::*;

use crate::instance::{hresult, to_prj_basic_info, CallbackContext};
use crate::path::{pcwstr_to_option, pcwstr_to_string, to_wide_string};

/// The callback table registered with `PrjStartVirtualizing`.
pub fn callback_table() -> PRJ_CALLBACKS {
    PRJ_CALLBACKS {
        StartDirectoryEnumerationCallback: Some(start_directory_enumeration),
        EndDirectoryEnumerationCallback: Some(end_directory_enumeration),
        GetDirectoryEnumerationCallback: Some(get_directory_enumeration),
        GetPlaceholderInfoCallback: Some(get_placeholder_info),
        GetFileDataCallback: Some(get_file_data),
        QueryFileNameCallback: Some(query_file_name),
        NotificationCallback: Some(notification),
        CancelCommandCallback: None,
    }
}

/// Get the callback table from callback data.
///
/// # Safety
/// Assumes InstanceContext is the pointer leaked by `start_virtualizing`.
unsafe fn get_callbacks<'a>(callback_data: &PRJ_CALLBACK_DATA) -> &'a dyn RequiredCallbacks {
    // SAFETY: Caller guarantees InstanceContext is a valid CallbackContext pointer
    unsafe { &**(callback_data.InstanceContext as *const CallbackContext) }
}

fn guarded<F: FnOnce() -> HResult>(name: &str, f: F) -> HRESULT {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => HRESULT(status.0),
        Err(_) => {
            tracing::error!("{} panicked", name);
            HRESULT(HResult::INTERNAL_ERROR.0)
        }
    }
}

/// Directory entries go straight into the ProjFS buffer.
pub struct DirEntryBuffer {
    handle: PRJ_DIR_ENTRY_BUFFER_HANDLE,
}

impl DirectoryEnumerationResults for DirEntryBuffer {
    fn add(&mut self, file_name: &str, info: &FileBasicInfo) -> Result<(), HResult> {
        let name_wide = to_wide_string(file_name);
        let basic_info = to_prj_basic_info(info);

        // SAFETY: name_wide is null-terminated, handle is live for this call
        let result = unsafe {
            PrjFillDirEntryBuffer(PCWSTR(name_wide.as_ptr()), Some(&basic_info), self.handle)
        };

        result.map_err(|e| {
            let status = hresult(&e);
            if status != HResult::INSUFFICIENT_BUFFER {
                tracing::error!("PrjFillDirEntryBuffer failed for {}: {:?}", file_name, e);
            }
            status
        })
    }
}

/// PRJ_START_DIRECTORY_ENUMERATION_CB implementation.
pub unsafe extern "system" fn start_directory_enumeration(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
) -> HRESULT {
    guarded("start_directory_enumeration", || {
        // SAFETY: ProjFS guarantees callback_data and enumeration_id are valid
        unsafe {
            let data = &*callback_data;
            let path = pcwstr_to_string(data.FilePathName);
            let id = EnumerationId((*enumeration_id).to_u128());
            get_callbacks(data).start_directory_enumeration(id, &path)
        }
    })
}

/// PRJ_GET_DIRECTORY_ENUMERATION_CB implementation.
pub unsafe extern "system" fn get_directory_enumeration(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
    search_expression: PCWSTR,
    dir_entry_buffer_handle: PRJ_DIR_ENTRY_BUFFER_HANDLE,
) -> HRESULT {
    guarded("get_directory_enumeration", || {
        // SAFETY: ProjFS guarantees all pointers are valid
        unsafe {
            let data = &*callback_data;
            let id = EnumerationId((*enumeration_id).to_u128());
            let filter = pcwstr_to_option(search_expression);
            let restart = (data.Flags.0 & PRJ_CB_DATA_FLAG_ENUM_RESTART_SCAN.0) != 0;

            let mut buffer = DirEntryBuffer {
                handle: dir_entry_buffer_handle,
            };
            get_callbacks(data).get_directory_enumeration(
                id,
                filter.as_deref(),
                restart,
                &mut buffer,
            )
        }
    })
}

/// PRJ_END_DIRECTORY_ENUMERATION_CB implementation.
pub unsafe extern "system" fn end_directory_enumeration(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
) -> HRESULT {
    guarded("end_directory_enumeration", || {
        // SAFETY: ProjFS guarantees pointers are valid
        unsafe {
            let data = &*callback_data;
            let id = EnumerationId((*enumeration_id).to_u128());
            get_callbacks(data).end_directory_enumeration(id)
        }
    })
}

/// PRJ_GET_PLACEHOLDER_INFO_CB implementation.
pub unsafe extern "system" fn get_placeholder_info(
    callback_data: *const PRJ_CALLBACK_DATA,
) -> HRESULT {
    guarded("get_placeholder_info", || {
        // SAFETY: ProjFS guarantees callback_data is valid
        unsafe {
            let data = &*callback_data;
            let path = pcwstr_to_string(data.FilePathName);
            get_callbacks(data).get_placeholder_info(&path)
        }
    })
}

/// PRJ_GET_FILE_DATA_CB implementation.
pub unsafe extern "system" fn get_file_data(
    callback_data: *const PRJ_CALLBACK_DATA,
    byte_offset: u64,
    length: u32,
) -> HRESULT {
    guarded("get_file_data", || {
        // SAFETY: ProjFS guarantees callback_data is valid
        unsafe {
            let data = &*callback_data;
            let path = pcwstr_to_string(data.FilePathName);
            let stream_id = StreamId(data.DataStreamId.to_u128());
            get_callbacks(data).get_file_data(&path, stream_id, byte_offset, length)
        }
    })
}

/// PRJ_QUERY_FILE_NAME_CB implementation.
pub unsafe extern "system" fn query_file_name(callback_data: *const PRJ_CALLBACK_DATA) -> HRESULT {
    guarded("query_file_name", || {
        // SAFETY: ProjFS guarantees callback_data is valid
        unsafe {
            let data = &*callback_data;
            let path = pcwstr_to_string(data.FilePathName);
            get_callbacks(data).query_file_name(&path)
        }
    })
}

fn permit(allowed: bool) -> HResult {
    if allowed {
        HResult::OK
    } else {
        HResult::ACCESS_DENIED
    }
}

fn notify_types(mask: NotificationType) -> PRJ_NOTIFY_TYPES {
    PRJ_NOTIFY_TYPES(mask.bits())
}

/// PRJ_NOTIFICATION_CB implementation.
///
/// Pre-operation notifications veto by returning an error. Post-create and
/// rename notifications hand back the mask for the new path.
pub unsafe extern "system" fn notification(
    callback_data: *const PRJ_CALLBACK_DATA,
    is_directory: bool,
    notification: PRJ_NOTIFICATION,
    destination_file_name: PCWSTR,
    operation_parameters: *mut PRJ_NOTIFICATION_PARAMETERS,
) -> HRESULT {
    guarded("notification", || {
        // SAFETY: ProjFS guarantees pointers are valid for the notification kind
        unsafe {
            let data = &*callback_data;
            let callbacks = get_callbacks(data);
            let path = pcwstr_to_string(data.FilePathName);

            match notification {
                PRJ_NOTIFICATION_NEW_FILE_CREATED => {
                    let mask = callbacks.on_new_file_created(&path, is_directory);
                    if !operation_parameters.is_null() {
                        (*operation_parameters).PostCreate.NotificationMask = notify_types(mask);
                    }
                    HResult::OK
                }
                PRJ_NOTIFICATION_FILE_RENAMED => {
                    let destination = pcwstr_to_string(destination_file_name);
                    let mask = callbacks.on_file_renamed(&path, &destination, is_directory);
                    if !operation_parameters.is_null() {
                        (*operation_parameters).FileRenamed.NotificationMask = notify_types(mask);
                    }
                    HResult::OK
                }
                PRJ_NOTIFICATION_HARDLINK_CREATED => {
                    let destination = pcwstr_to_string(destination_file_name);
                    callbacks.on_hardlink_created(&path, &destination);
                    HResult::OK
                }
                PRJ_NOTIFICATION_PRE_DELETE => {
                    permit(callbacks.on_pre_delete(&path, is_directory))
                }
                PRJ_NOTIFICATION_FILE_PRE_CONVERT_TO_FULL => {
                    permit(callbacks.on_file_pre_convert_to_full(&path))
                }
                PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_MODIFIED => {
                    callbacks.on_file_modified_or_deleted(&path, is_directory, true, false);
                    HResult::OK
                }
                PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_DELETED => {
                    let modified = !operation_parameters.is_null()
                        && bool::from(
                            (*operation_parameters).FileDeletedOnHandleClose.IsFileModified,
                        );
                    callbacks.on_file_modified_or_deleted(&path, is_directory, modified, true);
                    HResult::OK
                }
                other => {
                    tracing::debug!("Unhandled notification {:?} for {}", other, path);
                    HResult::OK
                }
            }
        }
    })
}
