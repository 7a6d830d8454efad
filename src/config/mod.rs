//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use crate::audio::{DEFAULT_SLICE_COUNT, DEFAULT_SLICE_SIZE, DEFAULT_SLICE_STRIDE_MS};
use crate::audio::{ClassifierSettings, FeatureLayout};
use crate::connectivity::{Credentials, RetryPolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use defaults::default_state_dir;
pub use defaults::{
    DEFAULT_CLASSIFY_INTERVAL_MS, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_COOLDOWN_SECS,
    DEFAULT_FRAME_INTERVAL_MS, DEFAULT_HOSTNAME, DEFAULT_NOTIFY_TIMEOUT_MS, DEFAULT_TARGET_LABEL,
    DEFAULT_WIFI_RETRY_INTERVAL_MS, DEFAULT_WIFI_RETRY_MAX_COUNT,
};

/// CLI options for the catbell detector. Every value can also come from a
/// `CATBELL_*` environment variable.
#[derive(Debug, Parser, Clone)]
#[command(about = "catbell: camera and microphone cat detector that rings a webhook", author, version)]
pub struct AppConfig {
    /// Network name to associate with
    #[arg(long = "wifi-ssid", env = "CATBELL_WIFI_SSID", default_value = "")]
    pub wifi_ssid: String,

    /// Network password (never logged)
    #[arg(
        long = "wifi-password",
        env = "CATBELL_WIFI_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub wifi_password: String,

    /// Hostname the device announces on the network
    #[arg(long, env = "CATBELL_HOSTNAME", default_value = DEFAULT_HOSTNAME)]
    pub hostname: String,

    /// Wait cycles for network association before restarting
    #[arg(
        long = "wifi-retry-max-count",
        env = "CATBELL_WIFI_RETRY_MAX_COUNT",
        default_value_t = DEFAULT_WIFI_RETRY_MAX_COUNT
    )]
    pub wifi_retry_max_count: u32,

    /// Delay between association checks (milliseconds)
    #[arg(
        long = "wifi-retry-interval-ms",
        env = "CATBELL_WIFI_RETRY_INTERVAL_MS",
        default_value_t = DEFAULT_WIFI_RETRY_INTERVAL_MS
    )]
    pub wifi_retry_interval_ms: u64,

    /// Endpoint that receives an empty POST for each notification
    #[arg(long = "notify-url", env = "CATBELL_NOTIFY_URL")]
    pub notify_url: String,

    /// Timeout for the outbound notification call (milliseconds)
    #[arg(
        long = "notify-timeout-ms",
        env = "CATBELL_NOTIFY_TIMEOUT_MS",
        default_value_t = DEFAULT_NOTIFY_TIMEOUT_MS
    )]
    pub notify_timeout_ms: u64,

    /// Minimum time between two notifications on one channel (seconds)
    #[arg(
        long = "cooldown-secs",
        env = "CATBELL_COOLDOWN_SECS",
        default_value_t = DEFAULT_COOLDOWN_SECS
    )]
    pub cooldown_secs: u64,

    /// Whether vision and audio share one cooldown window
    #[arg(
        long = "notify-mode",
        env = "CATBELL_NOTIFY_MODE",
        value_enum,
        default_value_t = NotifyMode::PerChannel
    )]
    pub notify_mode: NotifyMode,

    /// Audio score the target label must exceed
    #[arg(
        long = "confidence-threshold",
        env = "CATBELL_CONFIDENCE_THRESHOLD",
        default_value_t = DEFAULT_CONFIDENCE_THRESHOLD
    )]
    pub confidence_threshold: f32,

    /// Audio category that counts as a detection
    #[arg(
        long = "target-label",
        env = "CATBELL_TARGET_LABEL",
        default_value = DEFAULT_TARGET_LABEL
    )]
    pub target_label: String,

    /// Directory for persistent device state
    #[arg(long = "state-dir", env = "CATBELL_STATE_DIR", default_value_os_t = default_state_dir())]
    pub state_dir: PathBuf,

    /// Quantized audio model (JSON)
    #[arg(long = "audio-model", env = "CATBELL_AUDIO_MODEL")]
    pub audio_model: Option<PathBuf>,

    /// Recorded feature slices to replay (JSON lines)
    #[arg(long = "audio-slices", env = "CATBELL_AUDIO_SLICES")]
    pub audio_slices: Option<PathBuf>,

    /// Values per feature slice
    #[arg(long = "feature-slice-size", default_value_t = DEFAULT_SLICE_SIZE)]
    pub feature_slice_size: usize,

    /// Slices per feature window
    #[arg(long = "feature-slice-count", default_value_t = DEFAULT_SLICE_COUNT)]
    pub feature_slice_count: usize,

    /// Spacing between feature slices (milliseconds)
    #[arg(long = "feature-stride-ms", default_value_t = DEFAULT_SLICE_STRIDE_MS)]
    pub feature_stride_ms: i64,

    /// Pause between audio classification cycles (milliseconds)
    #[arg(long = "classify-interval-ms", default_value_t = DEFAULT_CLASSIFY_INTERVAL_MS)]
    pub classify_interval_ms: u64,

    /// Scripted camera verdicts (JSON)
    #[arg(long = "vision-script", env = "CATBELL_VISION_SCRIPT")]
    pub vision_script: Option<PathBuf>,

    /// Pause between captured frames (milliseconds)
    #[arg(long = "frame-interval-ms", default_value_t = DEFAULT_FRAME_INTERVAL_MS)]
    pub frame_interval_ms: u64,

    /// Most verbose log level to emit
    #[arg(long = "log-level", env = "CATBELL_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long = "log-json", env = "CATBELL_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Disable all logging (overrides --log-level)
    #[arg(long = "no-logs", env = "CATBELL_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,
}

/// How notification state is split between sensing channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NotifyMode {
    /// One notifier task and one cooldown window per modality.
    PerChannel,
    /// One notifier task draining both modalities with a single window.
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl AppConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            ssid: self.wifi_ssid.clone(),
            password: self.wifi_password.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.wifi_retry_max_count,
            interval: Duration::from_millis(self.wifi_retry_interval_ms),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn feature_layout(&self) -> FeatureLayout {
        FeatureLayout {
            slice_size: self.feature_slice_size,
            slice_count: self.feature_slice_count,
            stride_ms: self.feature_stride_ms,
        }
    }

    pub fn classifier_settings(&self, labels: Vec<String>) -> ClassifierSettings {
        ClassifierSettings {
            labels,
            target_label: self.target_label.clone(),
            threshold: self.confidence_threshold,
        }
    }

    pub fn classify_interval(&self) -> Duration {
        Duration::from_millis(self.classify_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_model.is_some() && self.audio_slices.is_some()
    }

    pub fn vision_enabled(&self) -> bool {
        self.vision_script.is_some()
    }
}
