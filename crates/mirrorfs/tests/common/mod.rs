//! An in-memory host for driving the engine in tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mirrorfs::{
    DirectoryEnumerationResults, Enlistment, FileBasicInfo, HResult, MirrorOptions,
    MirrorVirtualizer, RequiredCallbacks, StartOptions, StreamId, VirtualizationInstance,
    WriteBuffer,
};
use tempfile::TempDir;

pub struct MockBuffer(Vec<u8>);

impl WriteBuffer for MockBuffer {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// One `write_file_data` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataWrite {
    pub stream_id: StreamId,
    pub offset: u64,
    pub data: Vec<u8>,
}

#[derive(Default)]
pub struct MockInstance {
    pub marked: Mutex<Vec<PathBuf>>,
    pub started: Mutex<Option<StartOptions>>,
    pub callbacks: Mutex<Option<Arc<dyn RequiredCallbacks>>>,
    pub placeholders: Mutex<Vec<(String, FileBasicInfo)>>,
    pub writes: Mutex<Vec<DataWrite>>,
    pub buffers_created: AtomicUsize,

    /// Status returned by `mark_as_virtualization_root`.
    pub mark_status: Option<HResult>,
    /// Status returned by `start_virtualizing`.
    pub start_status: Option<HResult>,
    /// Refuse every write buffer with this status.
    pub buffer_failure: Option<HResult>,
    /// Fail writes once this many have succeeded.
    pub fail_writes_after: Option<usize>,
}

impl MockInstance {
    pub fn written_data(&self) -> Vec<u8> {
        let writes = self.writes.lock().unwrap();
        let mut data = Vec::new();
        for write in writes.iter() {
            assert_eq!(write.offset, data.len() as u64, "writes must be contiguous");
            data.extend_from_slice(&write.data);
        }
        data
    }

    pub fn placeholder_paths(&self) -> Vec<String> {
        self.placeholders
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl VirtualizationInstance for MockInstance {
    type WriteBuffer = MockBuffer;

    fn mark_as_virtualization_root(&self, root: &Path) -> HResult {
        self.marked.lock().unwrap().push(root.to_path_buf());
        self.mark_status.unwrap_or(HResult::OK)
    }

    fn start_virtualizing(
        &self,
        _root: &Path,
        options: &StartOptions,
        callbacks: Arc<dyn RequiredCallbacks>,
    ) -> HResult {
        if let Some(status) = self.start_status {
            return status;
        }
        *self.started.lock().unwrap() = Some(options.clone());
        *self.callbacks.lock().unwrap() = Some(callbacks);
        HResult::OK
    }

    fn stop_virtualizing(&self) {
        self.started.lock().unwrap().take();
        self.callbacks.lock().unwrap().take();
    }

    fn write_placeholder_info(&self, relative_path: &str, info: &FileBasicInfo) -> HResult {
        self.placeholders
            .lock()
            .unwrap()
            .push((relative_path.to_string(), *info));
        HResult::OK
    }

    fn create_write_buffer(&self, desired_size: usize) -> Result<MockBuffer, HResult> {
        if let Some(status) = self.buffer_failure {
            return Err(status);
        }
        self.buffers_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockBuffer(vec![0; desired_size]))
    }

    fn write_file_data(
        &self,
        stream_id: StreamId,
        buffer: &MockBuffer,
        byte_offset: u64,
        length: u32,
    ) -> HResult {
        let mut writes = self.writes.lock().unwrap();
        if let Some(limit) = self.fail_writes_after {
            if writes.len() >= limit {
                return HResult::ACCESS_DENIED;
            }
        }
        writes.push(DataWrite {
            stream_id,
            offset: byte_offset,
            data: buffer.0[..length as usize].to_vec(),
        });
        HResult::OK
    }
}

/// A directory-entry sink that holds at most `capacity` entries per batch.
pub struct LimitedResults {
    pub capacity: usize,
    pub entries: Vec<(String, FileBasicInfo)>,
    /// Refuse every entry with this status instead of taking it.
    pub failure: Option<HResult>,
}

impl LimitedResults {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
            failure: None,
        }
    }

    pub fn failing(status: HResult) -> Self {
        Self {
            failure: Some(status),
            ..Self::unbounded()
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl DirectoryEnumerationResults for LimitedResults {
    fn add(&mut self, file_name: &str, info: &FileBasicInfo) -> Result<(), HResult> {
        if let Some(status) = self.failure {
            return Err(status);
        }
        if self.entries.len() >= self.capacity {
            return Err(HResult::INSUFFICIENT_BUFFER);
        }
        self.entries.push((file_name.to_string(), *info));
        Ok(())
    }
}

/// Backing store:
///
/// ```text
/// a/B.txt     "hello world!"
/// a/c/
/// a/c/deep.txt
/// empty.bin
/// Zeta.md
/// ```
pub fn backing_store() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let backing = tmp.path().join("backing");
    fs::create_dir_all(backing.join("a").join("c")).unwrap();
    fs::write(backing.join("a").join("B.txt"), b"hello world!").unwrap();
    fs::write(backing.join("a").join("c").join("deep.txt"), b"deep").unwrap();
    fs::write(backing.join("empty.bin"), b"").unwrap();
    fs::write(backing.join("Zeta.md"), b"# zeta\n").unwrap();
    tmp
}

pub fn virtualizer_with(
    tmp: &TempDir,
    options: MirrorOptions,
    instance: MockInstance,
) -> Arc<MirrorVirtualizer<MockInstance>> {
    let enlistment =
        Enlistment::new(tmp.path().join("virtual"), tmp.path().join("backing")).unwrap();
    Arc::new(MirrorVirtualizer::new(enlistment, options, instance))
}

pub fn virtualizer(tmp: &TempDir) -> Arc<MirrorVirtualizer<MockInstance>> {
    virtualizer_with(tmp, MirrorOptions::default(), MockInstance::default())
}
