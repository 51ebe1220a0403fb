//! projfsmirror - Windows ProjFS host for the mirrorfs provider.
//!
//! This crate binds the host traits of `mirrorfs` to the Windows Projected
//! File System, so that a local directory tree appears, lazily hydrated,
//! under a virtualization root.
//!
//! # Requirements
//!
//! - Windows 10 version 1809 or later
//! - ProjFS feature must be enabled:
//!   ```powershell
//!   Enable-WindowsOptionalFeature -Online -FeatureName Client-ProjFS -NoRestart
//!   ```

#![cfg(windows)]

pub mod callbacks;
pub mod instance;
pub mod path;

pub use instance::{AlignedBuffer, ProjFsInstance};
