//! mirrorfs - projects a backing directory tree into a virtualization root.
//!
//! The host virtualization subsystem (Windows ProjFS) owns the virtual root
//! and asks a provider what a directory contains, what a file holds and what
//! just happened to a path. [`MirrorVirtualizer`] answers those questions
//! from an ordinary directory tree on disk, streaming file content in chunks
//! and keeping one enumeration session per directory listing in flight.
//!
//! The host is reached only through the traits in [`host`], so the engine
//! runs and is tested on every platform. The `projfsmirror` crate binds
//! those traits to the real ProjFS API.

pub mod enlistment;
pub mod enumeration;
pub mod error;
pub mod host;
pub mod mirror;
pub mod options;
pub mod path;
pub mod time;
pub mod virtualizer;

pub use enlistment::Enlistment;
pub use enumeration::{EnumerationSession, NameMatcher};
pub use error::{Error, FileSystemResult, HResult, Result};
pub use host::{
    DirectoryEnumerationResults, EnumerationId, FileBasicInfo, NotificationType, RequiredCallbacks,
    StartOptions, StreamId, VirtualizationInstance, WriteBuffer,
};
pub use mirror::{FileType, ProjectedFileInfo};
pub use options::MirrorOptions;
pub use path::CaseSensitivity;
pub use virtualizer::MirrorVirtualizer;
