//! Shared constants for Concord components.

/// PBKDF2 iteration count for published hashes
pub const PBKDF2_ITERATIONS: u32 = 5000;

/// Length of a derived hash in bytes (512 bits)
pub const HASH_LENGTH_BYTES: usize = 64;

/// Length of the random salt generated per setting per publish
pub const SALT_LENGTH_BYTES: usize = 16;

/// Separator between salt and hash in a published entry
pub const ENTRY_SEPARATOR: char = ':';

/// Source name of the cluster state update that publishes hashes
pub const PUBLISH_TASK_SOURCE: &str = "publish-secure-settings-hashes";

/// Default node HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9400";

/// Default config file path
pub const DEFAULT_CONFIG_PATH: &str = "config/concord.toml";

/// Interval of the periodic consistency check (seconds)
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
