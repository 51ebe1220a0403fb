//! Configuration for the mirror provider.

use crate::host::{NotificationMapping, NotificationType, StartOptions};
use crate::path::CaseSensitivity;

/// Default hydration chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Provider configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    /// Bytes read from the backing store per write to the host.
    pub chunk_size: usize,

    /// Name matching used by metadata lookup and file-name queries.
    pub case_sensitivity: CaseSensitivity,

    /// Host worker pool size.
    pub pool_thread_count: u32,

    /// Host concurrently-active thread limit.
    pub concurrent_thread_count: u32,

    /// Let the host remember paths we reported as missing.
    pub enable_negative_path_cache: bool,

    /// Notifications to receive for the whole tree.
    pub notifications: NotificationType,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        let threads = default_thread_count();
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            case_sensitivity: CaseSensitivity::Insensitive,
            pool_thread_count: threads,
            concurrent_thread_count: threads,
            enable_negative_path_cache: false,
            notifications: default_notifications(),
        }
    }
}

impl MirrorOptions {
    /// Set the hydration chunk size. Zero is raised to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_case_sensitivity(mut self, case_sensitivity: CaseSensitivity) -> Self {
        self.case_sensitivity = case_sensitivity;
        self
    }

    /// Set both the pool and the concurrent thread count.
    pub fn with_thread_count(mut self, count: u32) -> Self {
        self.pool_thread_count = count;
        self.concurrent_thread_count = count;
        self
    }

    pub fn with_negative_path_cache(mut self, enabled: bool) -> Self {
        self.enable_negative_path_cache = enabled;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationType) -> Self {
        self.notifications = notifications;
        self
    }

    /// Options handed to the host when virtualization starts.
    pub fn start_options(&self) -> StartOptions {
        let notification_mappings = if self.notifications.is_empty() {
            Vec::new()
        } else {
            vec![NotificationMapping {
                mask: self.notifications,
                root: String::new(),
            }]
        };

        StartOptions {
            pool_thread_count: self.pool_thread_count,
            concurrent_thread_count: self.concurrent_thread_count,
            enable_negative_path_cache: self.enable_negative_path_cache,
            notification_mappings,
        }
    }
}

/// Twice the number of logical processors.
pub fn default_thread_count() -> u32 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus as u32).saturating_mul(2)
}

fn default_notifications() -> NotificationType {
    NotificationType::NEW_FILE_CREATED
        | NotificationType::PRE_DELETE
        | NotificationType::FILE_RENAMED
        | NotificationType::HARDLINK_CREATED
        | NotificationType::FILE_HANDLE_CLOSED_FILE_MODIFIED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MirrorOptions::default();
        assert_eq!(options.chunk_size, 64 * 1024);
        assert_eq!(options.case_sensitivity, CaseSensitivity::Insensitive);
        assert!(!options.enable_negative_path_cache);
        assert_eq!(options.pool_thread_count, default_thread_count());
        assert!(options.pool_thread_count >= 2);
        assert_eq!(options.pool_thread_count % 2, 0);
    }

    #[test]
    fn test_start_options_single_mapping() {
        let start = MirrorOptions::default().with_thread_count(3).start_options();
        assert_eq!(start.pool_thread_count, 3);
        assert_eq!(start.concurrent_thread_count, 3);
        assert_eq!(start.notification_mappings.len(), 1);

        let mapping = &start.notification_mappings[0];
        assert!(mapping.root.is_empty());
        assert!(mapping.mask.contains(NotificationType::PRE_DELETE));
        assert!(mapping
            .mask
            .contains(NotificationType::FILE_HANDLE_CLOSED_FILE_MODIFIED));
        assert!(!mapping
            .mask
            .contains(NotificationType::FILE_HANDLE_CLOSED_FILE_DELETED));
    }

    #[test]
    fn test_no_notifications_no_mappings() {
        let start = MirrorOptions::default()
            .with_notifications(NotificationType::NONE)
            .start_options();
        assert!(start.notification_mappings.is_empty());
    }

    #[test]
    fn test_zero_chunk_size_raised() {
        assert_eq!(MirrorOptions::default().with_chunk_size(0).chunk_size, 1);
    }
}
