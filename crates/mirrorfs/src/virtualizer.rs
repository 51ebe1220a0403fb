//! MirrorVirtualizer - answers the host's callbacks from the backing store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::enlistment::Enlistment;
use crate::enumeration::EnumerationSession;
use crate::error::{Error, FileSystemResult, HResult, Result};
use crate::host::{
    file_attributes, DirectoryEnumerationResults, EnumerationId, FileBasicInfo, NotificationType,
    RequiredCallbacks, StreamId, VirtualizationInstance, WriteBuffer,
};
use crate::mirror::{self, ProjectedFileInfo};
use crate::options::MirrorOptions;
use crate::path;
use crate::time::now_as_filetime;

type SessionTable = RwLock<HashMap<EnumerationId, Arc<Mutex<EnumerationSession>>>>;

/// The mirror provider.
///
/// Owns the enlistment, the options and the table of live enumeration
/// sessions. The host calls into it through [`RequiredCallbacks`] from its
/// own thread pool, so it must outlive virtualization.
pub struct MirrorVirtualizer<I: VirtualizationInstance> {
    enlistment: Enlistment,
    options: MirrorOptions,
    instance: I,
    /// Active enumeration sessions, keyed by the host's enumeration id.
    enumerations: SessionTable,
}

impl<I: VirtualizationInstance> MirrorVirtualizer<I> {
    pub fn new(enlistment: Enlistment, options: MirrorOptions, instance: I) -> Self {
        Self {
            enlistment,
            options,
            instance,
            enumerations: RwLock::new(HashMap::new()),
        }
    }

    pub fn enlistment(&self) -> &Enlistment {
        &self.enlistment
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    pub fn instance(&self) -> &I {
        &self.instance
    }

    /// Number of enumeration sessions currently open.
    pub fn active_enumerations(&self) -> usize {
        self.enumerations.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Mark the virtualization root. Needed once per root; an existing mark
    /// is accepted by the host.
    pub fn mark_virtualization_root(&self) -> Result<()> {
        let root = self.enlistment.virtual_root();
        let hresult = self.instance.mark_as_virtualization_root(root);
        if hresult.is_err() {
            return Err(Error::MarkRoot {
                path: root.to_path_buf(),
                hresult,
            });
        }
        Ok(())
    }

    /// Stop virtualizing.
    pub fn stop(&self) {
        self.instance.stop_virtualizing();
        tracing::info!(
            "Stopped virtualization at {}",
            self.enlistment.virtual_root().display()
        );
    }

    fn create_enumeration(&self, id: EnumerationId, session: EnumerationSession) -> HResult {
        let mut enums = match self.enumerations.write() {
            Ok(enums) => enums,
            Err(_) => return poisoned(),
        };
        if enums.contains_key(&id) {
            tracing::warn!("Enumeration session already exists: {:x}", id.0);
            return HResult::INTERNAL_ERROR;
        }
        enums.insert(id, Arc::new(Mutex::new(session)));
        HResult::OK
    }

    fn enumeration(
        &self,
        id: EnumerationId,
    ) -> std::result::Result<Arc<Mutex<EnumerationSession>>, HResult> {
        let enums = self.enumerations.read().map_err(|_| poisoned())?;
        match enums.get(&id) {
            Some(session) => Ok(Arc::clone(session)),
            None => {
                tracing::warn!("Enumeration session not found: {:x}", id.0);
                Err(HResult::INTERNAL_ERROR)
            }
        }
    }

    fn remove_enumeration(&self, id: EnumerationId) -> HResult {
        let mut enums = match self.enumerations.write() {
            Ok(enums) => enums,
            Err(_) => return poisoned(),
        };
        match enums.remove(&id) {
            Some(_) => HResult::OK,
            None => {
                tracing::warn!("Enumeration session not found: {:x}", id.0);
                HResult::INTERNAL_ERROR
            }
        }
    }
}

impl<I: VirtualizationInstance + 'static> MirrorVirtualizer<I> {
    /// Register the callbacks with the host and start virtualizing.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let root = self.enlistment.virtual_root();
        let callbacks: Arc<dyn RequiredCallbacks> = self.clone();
        let hresult = self
            .instance
            .start_virtualizing(root, &self.options.start_options(), callbacks);
        if hresult.is_err() {
            return Err(Error::StartVirtualizing {
                path: root.to_path_buf(),
                hresult,
            });
        }

        tracing::info!(
            "Started virtualization of {} at {}",
            self.enlistment.backing_root().display(),
            root.display()
        );
        Ok(())
    }
}

fn poisoned() -> HResult {
    tracing::error!("Enumeration session table lock poisoned");
    HResult::INTERNAL_ERROR
}

/// Basic info as presented to the host. Times are not mirrored.
fn basic_info(info: &ProjectedFileInfo) -> FileBasicInfo {
    let now = now_as_filetime();
    let is_directory = info.is_directory();

    FileBasicInfo {
        is_directory,
        file_size: if is_directory { 0 } else { info.size as i64 },
        creation_time: now,
        last_access_time: now,
        last_write_time: now,
        change_time: now,
        file_attributes: if is_directory {
            file_attributes::FILE_ATTRIBUTE_DIRECTORY
        } else {
            file_attributes::FILE_ATTRIBUTE_ARCHIVE
        },
    }
}

impl<I: VirtualizationInstance> RequiredCallbacks for MirrorVirtualizer<I> {
    fn start_directory_enumeration(&self, id: EnumerationId, relative_path: &str) -> HResult {
        tracing::debug!("start_directory_enumeration: {} ({:x})", relative_path, id.0);

        let children = match mirror::child_items(&self.enlistment, relative_path)
            .and_then(|items| items.collect::<std::io::Result<Vec<_>>>())
        {
            Ok(children) => children,
            Err(e) => {
                tracing::error!("Listing {} failed: {}", relative_path, e);
                return HResult::from_io_error(&e);
            }
        };

        self.create_enumeration(
            id,
            EnumerationSession::with_matcher(children, I::file_name_match),
        )
    }

    fn get_directory_enumeration(
        &self,
        id: EnumerationId,
        filter: Option<&str>,
        restart_scan: bool,
        results: &mut dyn DirectoryEnumerationResults,
    ) -> HResult {
        tracing::debug!(
            "get_directory_enumeration: {:x}, filter={:?}, restart={}",
            id.0,
            filter,
            restart_scan
        );

        let session = match self.enumeration(id) {
            Ok(session) => session,
            Err(hresult) => return hresult,
        };
        let mut session = match session.lock() {
            Ok(session) => session,
            Err(_) => {
                tracing::error!("Enumeration session {:x} lock poisoned", id.0);
                return HResult::INTERNAL_ERROR;
            }
        };

        if restart_scan {
            session.restart(filter);
        } else {
            session.try_save_filter(filter);
        }

        let mut added = 0usize;
        while let Some(entry) = session.current() {
            match results.add(&entry.name, &basic_info(entry)) {
                Ok(()) => {}
                Err(HResult::INSUFFICIENT_BUFFER) => {
                    tracing::debug!(
                        "Buffer full after {} entries, cursor at {}",
                        added,
                        session.position()
                    );
                    return if added > 0 {
                        HResult::OK
                    } else {
                        HResult::INSUFFICIENT_BUFFER
                    };
                }
                Err(hresult) => {
                    tracing::error!("Adding {} to enumeration failed: {}", entry.name, hresult);
                    return hresult;
                }
            }
            added += 1;
            session.advance();
        }

        HResult::OK
    }

    fn end_directory_enumeration(&self, id: EnumerationId) -> HResult {
        tracing::debug!("end_directory_enumeration: {:x}", id.0);
        self.remove_enumeration(id)
    }

    fn get_placeholder_info(&self, relative_path: &str) -> HResult {
        tracing::debug!("get_placeholder_info: {}", relative_path);

        let info = match mirror::file_info(
            &self.enlistment,
            relative_path,
            self.options.case_sensitivity,
        ) {
            Ok(Some(info)) => info,
            Ok(None) => {
                tracing::debug!("Path not found: {}", relative_path);
                return HResult::FILE_NOT_FOUND;
            }
            Err(e) => {
                tracing::error!("Lookup of {} failed: {}", relative_path, e);
                return HResult::from_io_error(&e);
            }
        };

        // Keep the host's casing for the parent, the backing store's for the leaf.
        let (parent, _) = path::split_parent(relative_path);
        let placeholder_path = path::join_virtual(parent, &info.name);

        let hresult = self
            .instance
            .write_placeholder_info(&placeholder_path, &basic_info(&info));
        if hresult.is_err() {
            tracing::error!("Writing placeholder for {} failed: {}", placeholder_path, hresult);
        }
        hresult
    }

    fn get_file_data(
        &self,
        relative_path: &str,
        stream_id: StreamId,
        byte_offset: u64,
        length: u32,
    ) -> HResult {
        tracing::debug!(
            "get_file_data: {} offset={} length={}",
            relative_path,
            byte_offset,
            length
        );

        if !mirror::file_exists(&self.enlistment, relative_path) {
            tracing::warn!("File not found: {}", relative_path);
            return HResult::FILE_NOT_FOUND;
        }

        let chunk_size = self.options.chunk_size;
        let mut buffer = match self.instance.create_write_buffer(chunk_size) {
            Ok(buffer) => buffer,
            Err(hresult) => {
                tracing::error!("Failed to allocate write buffer: {}", hresult);
                return hresult;
            }
        };

        let mut write_offset = 0u64;
        let mut write_status = HResult::OK;
        let result = mirror::hydrate_file(&self.enlistment, relative_path, chunk_size, |chunk| {
            let dest = buffer.as_mut_slice();
            if dest.len() < chunk.len() {
                write_status = HResult::INSUFFICIENT_BUFFER;
                return false;
            }
            dest[..chunk.len()].copy_from_slice(chunk);

            let hresult =
                self.instance
                    .write_file_data(stream_id, &buffer, write_offset, chunk.len() as u32);
            if hresult.is_err() {
                write_status = hresult;
                return false;
            }

            write_offset += chunk.len() as u64;
            true
        });

        match result {
            Ok(FileSystemResult::Success) => HResult::OK,
            Ok(FileSystemResult::FileNotFound) => {
                tracing::warn!("File vanished during hydration: {}", relative_path);
                HResult::FILE_NOT_FOUND
            }
            Ok(FileSystemResult::IoError) => {
                tracing::error!(
                    "Hydration of {} failed at offset {}: {}",
                    relative_path,
                    write_offset,
                    write_status
                );
                HResult::INTERNAL_ERROR
            }
            Err(e) => {
                tracing::error!("Hydration of {} failed: {}", relative_path, e);
                HResult::INTERNAL_ERROR
            }
        }
    }

    fn query_file_name(&self, relative_path: &str) -> HResult {
        tracing::debug!("query_file_name: {}", relative_path);

        // Empty path = root, always exists
        if relative_path.is_empty() {
            return HResult::OK;
        }

        let (parent, file_name) = path::split_parent(relative_path);
        let children = match mirror::child_items(&self.enlistment, parent) {
            Ok(children) => children,
            Err(e) => {
                tracing::error!("Listing {} failed: {}", parent, e);
                return HResult::from_io_error(&e);
            }
        };

        for child in children {
            match child {
                Ok(child)
                    if path::names_equal(&child.name, file_name, self.options.case_sensitivity) =>
                {
                    return HResult::OK;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Listing {} failed: {}", parent, e);
                    return HResult::from_io_error(&e);
                }
            }
        }

        HResult::FILE_NOT_FOUND
    }

    fn on_pre_delete(&self, relative_path: &str, is_directory: bool) -> bool {
        tracing::debug!("on_pre_delete: {} directory={}", relative_path, is_directory);
        true
    }

    fn on_new_file_created(&self, relative_path: &str, is_directory: bool) -> NotificationType {
        tracing::debug!("on_new_file_created: {} directory={}", relative_path, is_directory);
        NotificationType::USE_EXISTING_MASK
    }

    fn on_file_modified_or_deleted(
        &self,
        relative_path: &str,
        is_directory: bool,
        is_file_modified: bool,
        is_file_deleted: bool,
    ) {
        tracing::debug!(
            "on_file_modified_or_deleted: {} directory={} modified={} deleted={}",
            relative_path,
            is_directory,
            is_file_modified,
            is_file_deleted
        );
    }

    fn on_file_renamed(
        &self,
        source_path: &str,
        destination_path: &str,
        is_directory: bool,
    ) -> NotificationType {
        tracing::debug!(
            "on_file_renamed: {} -> {} directory={}",
            source_path,
            destination_path,
            is_directory
        );
        NotificationType::USE_EXISTING_MASK
    }

    fn on_hardlink_created(&self, existing_path: &str, new_link_path: &str) {
        tracing::debug!("on_hardlink_created: {} -> {}", existing_path, new_link_path);
    }

    fn on_file_pre_convert_to_full(&self, relative_path: &str) -> bool {
        tracing::debug!("on_file_pre_convert_to_full: {}", relative_path);
        true
    }
}
