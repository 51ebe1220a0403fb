use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A virtualization root paired with the backing store it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enlistment {
    virtual_root: PathBuf,
    backing_root: PathBuf,
}

impl Enlistment {
    /// Pair a virtualization root with a backing store.
    ///
    /// The backing store must be an existing directory. The virtualization
    /// root is created if it does not exist yet.
    pub fn new(
        virtual_root: impl Into<PathBuf>,
        backing_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let virtual_root = virtual_root.into();
        let backing_root = backing_root.into();

        match std::fs::metadata(&backing_root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(Error::BackingRootNotDirectory { path: backing_root }),
            Err(_) => return Err(Error::BackingRootMissing { path: backing_root }),
        }

        std::fs::create_dir_all(&virtual_root).map_err(|source| Error::CreateVirtualRoot {
            path: virtual_root.clone(),
            source,
        })?;

        Ok(Self {
            virtual_root,
            backing_root,
        })
    }

    /// Pair two paths without touching the file system.
    pub fn from_paths(
        virtual_root: impl Into<PathBuf>,
        backing_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            virtual_root: virtual_root.into(),
            backing_root: backing_root.into(),
        }
    }

    pub fn virtual_root(&self) -> &Path {
        &self.virtual_root
    }

    pub fn backing_root(&self) -> &Path {
        &self.backing_root
    }

    /// Absolute backing-store path for a host-relative path.
    pub fn full_path_in_backing_store(&self, relative_path: &str) -> PathBuf {
        crate::path::resolve(&self.backing_root, relative_path)
    }
}
