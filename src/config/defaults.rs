use std::env;
use std::path::PathBuf;

pub const DEFAULT_HOSTNAME: &str = "catbell";
pub const DEFAULT_WIFI_RETRY_MAX_COUNT: u32 = 10;
pub const DEFAULT_WIFI_RETRY_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_COOLDOWN_SECS: u64 = 600;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.85;
pub const DEFAULT_TARGET_LABEL: &str = "meow";
pub const DEFAULT_CLASSIFY_INTERVAL_MS: u64 = 20;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 100;

pub(super) const MAX_WIFI_RETRY_COUNT: u32 = 100;
pub(super) const MIN_WIFI_RETRY_INTERVAL_MS: u64 = 100;
pub(super) const MAX_WIFI_RETRY_INTERVAL_MS: u64 = 60_000;
pub(super) const MAX_COOLDOWN_SECS: u64 = 24 * 60 * 60;
pub(super) const MAX_NOTIFY_TIMEOUT_MS: u64 = 60_000;
pub(super) const MAX_TASK_INTERVAL_MS: u64 = 10_000;
pub(super) const MAX_FEATURE_SLICE_SIZE: usize = 1_024;
pub(super) const MAX_FEATURE_SLICE_COUNT: usize = 1_024;

pub(super) fn default_state_dir() -> PathBuf {
    env::temp_dir().join("catbell")
}
