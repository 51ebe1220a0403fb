//! Reading the backing store: metadata lookup, child listing and hydration.
//!
//! Nothing here caches. Every call goes back to the backing directory tree,
//! which stays the only source of truth.

use std::fs;
use std::io::{self, Read};

use crate::enlistment::Enlistment;
use crate::error::FileSystemResult;
use crate::path::{self, CaseSensitivity};

/// Kind of a backing-store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Neither a file, a directory nor a link (sockets, pipes, devices).
    /// Never projected.
    Invalid,
    File,
    Directory,
    SymLink,
}

/// One backing-store entry as presented to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedFileInfo {
    /// Name with the backing store's on-disk casing.
    pub name: String,
    /// Size in bytes; 0 for anything but files.
    pub size: u64,
    pub file_type: FileType,
}

impl ProjectedFileInfo {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            file_type: FileType::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            file_type: FileType::Directory,
        }
    }

    pub fn symlink(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            file_type: FileType::SymLink,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    fn invalid(name: String) -> Self {
        Self {
            name,
            size: 0,
            file_type: FileType::Invalid,
        }
    }
}

pub fn directory_exists(enlistment: &Enlistment, relative_path: &str) -> bool {
    enlistment
        .full_path_in_backing_store(relative_path)
        .is_dir()
}

pub fn file_exists(enlistment: &Enlistment, relative_path: &str) -> bool {
    enlistment
        .full_path_in_backing_store(relative_path)
        .is_file()
}

/// Whether the entry carries reparse data.
///
/// Any reparse point is reported as a symlink. This is not exact (mount
/// points and other reparse tags are also caught) but matches what the
/// host has always been shown.
#[cfg(windows)]
fn has_reparse_data(metadata: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;

    metadata.file_attributes() & crate::host::file_attributes::FILE_ATTRIBUTE_REPARSE_POINT != 0
}

#[cfg(not(windows))]
fn has_reparse_data(metadata: &fs::Metadata) -> bool {
    metadata.file_type().is_symlink()
}

/// Classify a directory entry without following links.
fn classify(entry: &fs::DirEntry) -> io::Result<ProjectedFileInfo> {
    let name = entry.file_name().to_string_lossy().into_owned();
    let metadata = entry.metadata()?;

    Ok(if has_reparse_data(&metadata) {
        ProjectedFileInfo::symlink(name)
    } else if metadata.is_dir() {
        ProjectedFileInfo::directory(name)
    } else if metadata.is_file() {
        ProjectedFileInfo::file(name, metadata.len())
    } else {
        ProjectedFileInfo::invalid(name)
    })
}

/// Lazy listing of one backing-store directory, in source order.
///
/// A missing directory lists as empty. [`FileType::Invalid`] entries are
/// left out.
pub struct ChildItems {
    inner: Option<fs::ReadDir>,
}

impl Iterator for ChildItems {
    type Item = io::Result<ProjectedFileInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.as_mut()?.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            match classify(&entry) {
                Ok(info) if info.file_type == FileType::Invalid => continue,
                other => return Some(other),
            }
        }
    }
}

/// List the immediate children of a backing-store directory.
pub fn child_items(enlistment: &Enlistment, relative_path: &str) -> io::Result<ChildItems> {
    if !directory_exists(enlistment, relative_path) {
        return Ok(ChildItems { inner: None });
    }

    let full_path = enlistment.full_path_in_backing_store(relative_path);
    Ok(ChildItems {
        inner: Some(fs::read_dir(&full_path)?),
    })
}

/// Look up one entry, recovering its on-disk casing.
///
/// Returns `None` if the parent directory or the entry does not exist, or
/// if the entry is [`FileType::Invalid`].
pub fn file_info(
    enlistment: &Enlistment,
    relative_path: &str,
    case: CaseSensitivity,
) -> io::Result<Option<ProjectedFileInfo>> {
    let (parent, file_name) = path::split_parent(relative_path);
    if file_name.is_empty() {
        return Ok(None);
    }

    if !directory_exists(enlistment, parent) {
        return Ok(None);
    }

    let parent_path = enlistment.full_path_in_backing_store(parent);
    for entry in fs::read_dir(&parent_path)? {
        let entry = entry?;
        let name = entry.file_name();
        if path::names_equal(&name.to_string_lossy(), file_name, case) {
            let info = classify(&entry)?;
            return Ok((info.file_type != FileType::Invalid).then_some(info));
        }
    }

    Ok(None)
}

/// Stream a backing-store file through `sink` in `chunk_size` pieces.
///
/// The buffer handed to `sink` is reused for the next chunk; the sink must
/// copy out whatever it needs before returning. Returning `false` from the
/// sink aborts the transfer with [`FileSystemResult::IoError`], as does a
/// short read. Faults opening or reading the file are returned as `Err`.
pub fn hydrate_file<F>(
    enlistment: &Enlistment,
    relative_path: &str,
    chunk_size: usize,
    mut sink: F,
) -> io::Result<FileSystemResult>
where
    F: FnMut(&[u8]) -> bool,
{
    let full_path = enlistment.full_path_in_backing_store(relative_path);
    if !full_path.is_file() {
        return Ok(FileSystemResult::FileNotFound);
    }

    let mut file = fs::File::open(&full_path)?;
    let mut remaining = file.metadata()?.len();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    while remaining > 0 {
        let to_copy = remaining.min(buffer.len() as u64) as usize;
        match file.read_exact(&mut buffer[..to_copy]) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::warn!(path = relative_path, remaining, "short read from backing store");
                return Ok(FileSystemResult::IoError);
            }
            Err(e) => return Err(e),
        }

        if !sink(&buffer[..to_copy]) {
            return Ok(FileSystemResult::IoError);
        }

        remaining -= to_copy as u64;
    }

    Ok(FileSystemResult::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backing_store() -> (TempDir, Enlistment) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("a").join("B.txt"), b"hello world!").unwrap();
        fs::create_dir(root.join("a").join("c")).unwrap();
        fs::write(root.join("empty.bin"), b"").unwrap();
        let enlistment = Enlistment::from_paths(root.join("virtual"), root);
        (tmp, enlistment)
    }

    #[test]
    fn test_file_info_recovers_casing() {
        let (_tmp, enlistment) = backing_store();
        let info = file_info(&enlistment, "a\\b.txt", CaseSensitivity::Insensitive)
            .unwrap()
            .unwrap();
        assert_eq!(info, ProjectedFileInfo::file("B.txt", 12));
    }

    #[test]
    fn test_file_info_case_sensitive_miss() {
        let (_tmp, enlistment) = backing_store();
        let info = file_info(&enlistment, "a\\b.txt", CaseSensitivity::Sensitive).unwrap();
        assert!(info.is_none());
        let info = file_info(&enlistment, "a\\B.txt", CaseSensitivity::Sensitive).unwrap();
        assert!(info.is_some());
    }

    #[test]
    fn test_file_info_directory() {
        let (_tmp, enlistment) = backing_store();
        let info = file_info(&enlistment, "A\\C", CaseSensitivity::Insensitive)
            .unwrap()
            .unwrap();
        assert_eq!(info, ProjectedFileInfo::directory("c"));
        assert!(info.is_directory());
    }

    #[test]
    fn test_file_info_missing_parent() {
        let (_tmp, enlistment) = backing_store();
        let info = file_info(&enlistment, "nope\\b.txt", CaseSensitivity::Insensitive).unwrap();
        assert!(info.is_none());
    }

    #[test]
    fn test_file_info_missing_leaf() {
        let (_tmp, enlistment) = backing_store();
        let info = file_info(&enlistment, "a\\d.txt", CaseSensitivity::Insensitive).unwrap();
        assert!(info.is_none());
    }

    #[test]
    fn test_file_info_root_is_none() {
        let (_tmp, enlistment) = backing_store();
        assert!(file_info(&enlistment, "", CaseSensitivity::Insensitive)
            .unwrap()
            .is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_classified_as_symlink() {
        let (tmp, enlistment) = backing_store();
        std::os::unix::fs::symlink("B.txt", tmp.path().join("a").join("link")).unwrap();
        let info = file_info(&enlistment, "a\\link", CaseSensitivity::Insensitive)
            .unwrap()
            .unwrap();
        assert_eq!(info, ProjectedFileInfo::symlink("link"));
    }

    #[test]
    fn test_child_items() {
        let (_tmp, enlistment) = backing_store();
        let mut children: Vec<ProjectedFileInfo> = child_items(&enlistment, "a")
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            children,
            vec![
                ProjectedFileInfo::file("B.txt", 12),
                ProjectedFileInfo::directory("c"),
            ]
        );
    }

    #[test]
    fn test_child_items_missing_directory_is_empty() {
        let (_tmp, enlistment) = backing_store();
        assert_eq!(child_items(&enlistment, "missing").unwrap().count(), 0);
    }

    #[test]
    fn test_child_items_of_file_is_empty() {
        let (_tmp, enlistment) = backing_store();
        assert_eq!(child_items(&enlistment, "a\\B.txt").unwrap().count(), 0);
    }

    #[test]
    fn test_exists_probes() {
        let (_tmp, enlistment) = backing_store();
        assert!(directory_exists(&enlistment, "a"));
        assert!(!directory_exists(&enlistment, "a\\B.txt"));
        assert!(file_exists(&enlistment, "a\\B.txt"));
        assert!(!file_exists(&enlistment, "a\\c"));
    }

    #[test]
    fn test_hydrate_reassembles_file() {
        let (_tmp, enlistment) = backing_store();
        let mut assembled = Vec::new();
        let mut calls = 0;
        let result = hydrate_file(&enlistment, "a\\B.txt", 5, |chunk| {
            calls += 1;
            assert!(chunk.len() <= 5);
            assembled.extend_from_slice(chunk);
            true
        })
        .unwrap();

        assert_eq!(result, FileSystemResult::Success);
        assert_eq!(assembled, b"hello world!");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_hydrate_exact_multiple_of_chunk() {
        let (_tmp, enlistment) = backing_store();
        let mut sizes = Vec::new();
        let result = hydrate_file(&enlistment, "a\\B.txt", 4, |chunk| {
            sizes.push(chunk.len());
            true
        })
        .unwrap();
        assert_eq!(result, FileSystemResult::Success);
        assert_eq!(sizes, vec![4, 4, 4]);
    }

    #[test]
    fn test_hydrate_empty_file_never_calls_sink() {
        let (_tmp, enlistment) = backing_store();
        let result = hydrate_file(&enlistment, "empty.bin", 16, |_| {
            panic!("sink called for an empty file")
        })
        .unwrap();
        assert_eq!(result, FileSystemResult::Success);
    }

    #[test]
    fn test_hydrate_missing_file() {
        let (_tmp, enlistment) = backing_store();
        let result = hydrate_file(&enlistment, "a\\missing.txt", 16, |_| true).unwrap();
        assert_eq!(result, FileSystemResult::FileNotFound);
    }

    #[test]
    fn test_hydrate_directory_is_not_found() {
        let (_tmp, enlistment) = backing_store();
        let result = hydrate_file(&enlistment, "a\\c", 16, |_| true).unwrap();
        assert_eq!(result, FileSystemResult::FileNotFound);
    }

    #[test]
    fn test_hydrate_reuses_one_buffer() {
        let (_tmp, enlistment) = backing_store();
        let mut chunks: Vec<*const u8> = Vec::new();
        let mut previous: Option<(*const u8, Vec<u8>)> = None;
        let result = hydrate_file(&enlistment, "a\\B.txt", 5, |chunk| {
            if let Some((ptr, bytes)) = &previous {
                // The previous chunk's storage now holds this chunk.
                assert_eq!(*ptr, chunk.as_ptr());
                assert_ne!(bytes.as_slice(), chunk);
            }
            chunks.push(chunk.as_ptr());
            previous = Some((chunk.as_ptr(), chunk.to_vec()));
            true
        })
        .unwrap();

        assert_eq!(result, FileSystemResult::Success);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|&ptr| ptr == chunks[0]));
    }

    #[cfg(unix)]
    #[test]
    fn test_special_files_are_not_projected() {
        use std::os::unix::net::UnixListener;

        let (tmp, enlistment) = backing_store();
        let _listener = UnixListener::bind(tmp.path().join("a").join("sock")).unwrap();

        let info = file_info(&enlistment, "a\\sock", CaseSensitivity::Insensitive).unwrap();
        assert!(info.is_none());

        let names: Vec<String> = child_items(&enlistment, "a")
            .unwrap()
            .map(|item| item.unwrap().name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(!names.iter().any(|name| name == "sock"));
    }

    #[test]
    fn test_hydrate_sink_rejection_stops() {
        let (_tmp, enlistment) = backing_store();
        let mut calls = 0;
        let result = hydrate_file(&enlistment, "a\\B.txt", 4, |_| {
            calls += 1;
            false
        })
        .unwrap();
        assert_eq!(result, FileSystemResult::IoError);
        assert_eq!(calls, 1);
    }
}
