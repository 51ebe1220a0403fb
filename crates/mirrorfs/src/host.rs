//! The boundary with the host virtualization subsystem.
//!
//! The host owns the virtualization root and the placeholder cache. It calls
//! into a [`RequiredCallbacks`] implementation from its own worker threads,
//! and exposes a few primitives ([`VirtualizationInstance`]) for writing
//! placeholders and file data back.

use std::path::Path;
use std::sync::Arc;

use crate::error::HResult;

/// Opaque id the host assigns to one directory enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumerationId(pub u128);

impl From<u128> for EnumerationId {
    fn from(id: u128) -> Self {
        EnumerationId(id)
    }
}

/// Id of the data stream a file-data request writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u128);

impl From<u128> for StreamId {
    fn from(id: u128) -> Self {
        StreamId(id)
    }
}

/// Windows file attribute constants.
pub mod file_attributes {
    pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x00000010;
    pub const FILE_ATTRIBUTE_ARCHIVE: u32 = 0x00000020;
    pub const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x00000400;
}

/// Basic metadata for a directory entry or placeholder.
///
/// Times are Windows FILETIME values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileBasicInfo {
    pub is_directory: bool,
    pub file_size: i64,
    pub creation_time: i64,
    pub last_access_time: i64,
    pub last_write_time: i64,
    pub change_time: i64,
    pub file_attributes: u32,
}

bitflags::bitflags! {
    /// Notification classes, with the host's bit values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NotificationType: u32 {
        const NONE = 0x0000_0000;
        const SUPPRESS_NOTIFICATIONS = 0x0000_0001;
        const FILE_OPENED = 0x0000_0002;
        const NEW_FILE_CREATED = 0x0000_0004;
        const FILE_OVERWRITTEN = 0x0000_0008;
        const PRE_DELETE = 0x0000_0010;
        const PRE_RENAME = 0x0000_0020;
        const PRE_SET_HARDLINK = 0x0000_0040;
        const FILE_RENAMED = 0x0000_0080;
        const HARDLINK_CREATED = 0x0000_0100;
        const FILE_HANDLE_CLOSED_NO_MODIFICATION = 0x0000_0200;
        const FILE_HANDLE_CLOSED_FILE_MODIFIED = 0x0000_0400;
        const FILE_HANDLE_CLOSED_FILE_DELETED = 0x0000_0800;
        const FILE_PRE_CONVERT_TO_FULL = 0x0000_1000;
        /// Keep whatever mask is already registered for the path.
        const USE_EXISTING_MASK = 0xFFFF_FFFF;
    }
}

/// Notifications requested for everything under `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMapping {
    pub mask: NotificationType,
    /// Host-relative root of the mapping; empty means the whole tree.
    pub root: String,
}

/// Parameters for [`VirtualizationInstance::start_virtualizing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    pub pool_thread_count: u32,
    pub concurrent_thread_count: u32,
    pub enable_negative_path_cache: bool,
    pub notification_mappings: Vec<NotificationMapping>,
}

/// Sink the host provides for one batch of directory entries.
pub trait DirectoryEnumerationResults {
    /// Offer one entry.
    ///
    /// `Err(HResult::INSUFFICIENT_BUFFER)` means the host's buffer is full;
    /// the entry was not taken and must be offered again on the next call.
    /// Any other error ends the batch with that status.
    fn add(&mut self, file_name: &str, info: &FileBasicInfo) -> Result<(), HResult>;
}

/// A host-owned transfer buffer for file data.
pub trait WriteBuffer {
    fn as_mut_slice(&mut self) -> &mut [u8];
}

/// Primitives the host exposes to the provider.
pub trait VirtualizationInstance: Send + Sync {
    type WriteBuffer: WriteBuffer;

    fn mark_as_virtualization_root(&self, root: &Path) -> HResult;

    fn start_virtualizing(
        &self,
        root: &Path,
        options: &StartOptions,
        callbacks: Arc<dyn RequiredCallbacks>,
    ) -> HResult;

    fn stop_virtualizing(&self);

    fn write_placeholder_info(&self, relative_path: &str, info: &FileBasicInfo) -> HResult;

    fn create_write_buffer(&self, desired_size: usize) -> Result<Self::WriteBuffer, HResult>;

    /// Write `length` bytes from the start of `buffer` at `byte_offset`.
    fn write_file_data(
        &self,
        stream_id: StreamId,
        buffer: &Self::WriteBuffer,
        byte_offset: u64,
        length: u32,
    ) -> HResult;

    /// Whether `name` matches the search expression `pattern` the host
    /// passed to an enumeration, using the host's own wildcard rules.
    fn file_name_match(name: &str, pattern: &str) -> bool {
        crate::enumeration::matches_search_expression(name, pattern)
    }
}

/// The callback table registered with the host.
///
/// Handlers are invoked concurrently from the host's thread pool and must
/// never panic or unwind; failures are reported through the return value.
pub trait RequiredCallbacks: Send + Sync {
    fn start_directory_enumeration(&self, id: EnumerationId, relative_path: &str) -> HResult;

    fn get_directory_enumeration(
        &self,
        id: EnumerationId,
        filter: Option<&str>,
        restart_scan: bool,
        results: &mut dyn DirectoryEnumerationResults,
    ) -> HResult;

    fn end_directory_enumeration(&self, id: EnumerationId) -> HResult;

    fn get_placeholder_info(&self, relative_path: &str) -> HResult;

    fn get_file_data(
        &self,
        relative_path: &str,
        stream_id: StreamId,
        byte_offset: u64,
        length: u32,
    ) -> HResult;

    fn query_file_name(&self, relative_path: &str) -> HResult;

    /// Returns whether the delete may proceed.
    fn on_pre_delete(&self, relative_path: &str, is_directory: bool) -> bool;

    /// Returns the notification mask for the new file.
    fn on_new_file_created(&self, relative_path: &str, is_directory: bool) -> NotificationType;

    fn on_file_modified_or_deleted(
        &self,
        relative_path: &str,
        is_directory: bool,
        is_file_modified: bool,
        is_file_deleted: bool,
    );

    /// Returns the notification mask for the renamed file.
    fn on_file_renamed(
        &self,
        source_path: &str,
        destination_path: &str,
        is_directory: bool,
    ) -> NotificationType;

    fn on_hardlink_created(&self, existing_path: &str, new_link_path: &str);

    /// Returns whether the placeholder may become a full file.
    fn on_file_pre_convert_to_full(&self, relative_path: &str) -> bool;
}
