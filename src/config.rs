//! Configuration and paths

use crate::sync::uploader::UploaderConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of records per upload call
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Idle delay before a partially filled queue is uploaded
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(5 * 60);

/// Upper bound on a single upload call
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Backend used when nothing else is configured
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

/// Delay between retries of a failed batch round.
///
/// The n-th consecutive failure waits `base_delay * 2^(n-1)`, capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Same delay for every retry
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
        }
    }

    /// Delay before retrying after `failures` consecutive failed rounds
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BATCH_DELAY,
            max_delay: Duration::from_secs(60 * 60),
        }
    }
}

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub api_base_url: String,
    pub device_id: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub upload_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fastpay-sync");

        Self {
            state_dir,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            device_id: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            state_dir: temp_dir.join("state"),
            api_base_url: "http://127.0.0.1:9".to_string(),
            device_id: "test-device".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::from_secs(1),
            upload_timeout: Duration::from_secs(5),
            retry: RetryPolicy::fixed(Duration::from_secs(1)),
        }
    }

    /// Snapshot file for a queue, keyed by the record's snapshot key
    pub fn queue_file(&self, snapshot_key: &str) -> PathBuf {
        self.state_dir.join(format!("{}_queue.json", snapshot_key))
    }

    /// Uploader settings derived from this config
    pub fn uploader(&self) -> UploaderConfig {
        UploaderConfig {
            device_id: self.device_id.clone(),
            batch_size: self.batch_size,
            batch_delay: self.batch_delay,
            upload_timeout: self.upload_timeout,
            retry: self.retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_delay, Duration::from_secs(300));
        assert!(config.state_dir.ends_with("fastpay-sync"));
    }

    #[test]
    fn test_test_config() {
        let temp = std::env::temp_dir();
        let config = Config::for_test(&temp);
        assert_eq!(config.state_dir, temp.join("state"));
        assert_eq!(config.device_id, "test-device");
    }

    #[test]
    fn test_queue_file() {
        let config = Config::for_test(Path::new("/tmp/x"));
        assert_eq!(
            config.queue_file("contacts"),
            PathBuf::from("/tmp/x/state/contacts_queue.json")
        );
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for(4), Duration::from_secs(60));
        assert_eq!(policy.delay_for(100), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::fixed(Duration::from_secs(300));
        assert_eq!(policy.delay_for(1), Duration::from_secs(300));
        assert_eq!(policy.delay_for(7), Duration::from_secs(300));
    }

    #[test]
    fn test_default_first_retry_matches_batch_delay() {
        assert_eq!(RetryPolicy::default().delay_for(1), DEFAULT_BATCH_DELAY);
    }

    #[test]
    fn test_uploader_config() {
        let config = Config::for_test(Path::new("/tmp/x"));
        let uploader = config.uploader();
        assert_eq!(uploader.batch_size, config.batch_size);
        assert_eq!(uploader.device_id, "test-device");
    }
}
