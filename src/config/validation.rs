use super::defaults::{
    MAX_COOLDOWN_SECS, MAX_FEATURE_SLICE_COUNT, MAX_FEATURE_SLICE_SIZE, MAX_NOTIFY_TIMEOUT_MS,
    MAX_TASK_INTERVAL_MS, MAX_WIFI_RETRY_COUNT, MAX_WIFI_RETRY_INTERVAL_MS,
    MIN_WIFI_RETRY_INTERVAL_MS,
};
use super::AppConfig;
use anyhow::{bail, Context, Result};
use clap::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const MAX_LABEL_BYTES: usize = 64;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if self.wifi_retry_max_count > MAX_WIFI_RETRY_COUNT {
            bail!(
                "--wifi-retry-max-count must be between 0 and {MAX_WIFI_RETRY_COUNT}, got {}",
                self.wifi_retry_max_count
            );
        }
        if !(MIN_WIFI_RETRY_INTERVAL_MS..=MAX_WIFI_RETRY_INTERVAL_MS)
            .contains(&self.wifi_retry_interval_ms)
        {
            bail!(
                "--wifi-retry-interval-ms must be between {MIN_WIFI_RETRY_INTERVAL_MS} and {MAX_WIFI_RETRY_INTERVAL_MS}, got {}",
                self.wifi_retry_interval_ms
            );
        }
        if self.cooldown_secs == 0 || self.cooldown_secs > MAX_COOLDOWN_SECS {
            bail!(
                "--cooldown-secs must be between 1 and {MAX_COOLDOWN_SECS}, got {}",
                self.cooldown_secs
            );
        }
        if self.notify_timeout_ms == 0 || self.notify_timeout_ms > MAX_NOTIFY_TIMEOUT_MS {
            bail!(
                "--notify-timeout-ms must be between 1 and {MAX_NOTIFY_TIMEOUT_MS}, got {}",
                self.notify_timeout_ms
            );
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            bail!(
                "--confidence-threshold must be greater than 0.0 and at most 1.0, got {}",
                self.confidence_threshold
            );
        }
        if self.classify_interval_ms == 0 || self.classify_interval_ms > MAX_TASK_INTERVAL_MS {
            bail!(
                "--classify-interval-ms must be between 1 and {MAX_TASK_INTERVAL_MS}, got {}",
                self.classify_interval_ms
            );
        }
        if self.frame_interval_ms > MAX_TASK_INTERVAL_MS {
            bail!(
                "--frame-interval-ms must be at most {MAX_TASK_INTERVAL_MS}, got {}",
                self.frame_interval_ms
            );
        }
        if !(1..=MAX_FEATURE_SLICE_SIZE).contains(&self.feature_slice_size) {
            bail!("--feature-slice-size must be between 1 and {MAX_FEATURE_SLICE_SIZE}");
        }
        if !(1..=MAX_FEATURE_SLICE_COUNT).contains(&self.feature_slice_count) {
            bail!("--feature-slice-count must be between 1 and {MAX_FEATURE_SLICE_COUNT}");
        }
        if !(1..=1_000).contains(&self.feature_stride_ms) {
            bail!(
                "--feature-stride-ms must be between 1 and 1000, got {}",
                self.feature_stride_ms
            );
        }

        self.hostname = validate_hostname(&self.hostname)?;
        self.target_label = validate_label(&self.target_label)?;
        self.notify_url = validate_notify_url(&self.notify_url)?;

        match (&self.audio_model, &self.audio_slices) {
            (Some(model), Some(slices)) => {
                self.audio_model = Some(existing_file(model, "--audio-model")?);
                self.audio_slices = Some(existing_file(slices, "--audio-slices")?);
            }
            (None, None) => {}
            _ => bail!("--audio-model and --audio-slices must be given together"),
        }
        if let Some(script) = &self.vision_script {
            self.vision_script = Some(existing_file(script, "--vision-script")?);
        }
        if !self.vision_enabled() && !self.audio_enabled() {
            bail!("no sensing pipeline configured: pass --vision-script, or --audio-model with --audio-slices");
        }

        Ok(())
    }
}

/// RFC 1123 host label: letters, digits and inner hyphens, at most 63 bytes.
pub(super) fn validate_hostname(raw: &str) -> Result<String> {
    static HOSTNAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = HOSTNAME_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")
            .expect("hostname regex should compile")
    });
    let trimmed = raw.trim();
    if !re.is_match(trimmed) {
        bail!("--hostname '{raw}' must be 1-63 letters, digits or inner hyphens");
    }
    Ok(trimmed.to_ascii_lowercase())
}

pub(super) fn validate_label(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_LABEL_BYTES {
        bail!("--target-label must be 1-{MAX_LABEL_BYTES} bytes");
    }
    if trimmed.chars().any(char::is_control) {
        bail!("--target-label must not contain control characters");
    }
    Ok(trimmed.to_string())
}

pub(super) fn validate_notify_url(raw: &str) -> Result<String> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        Regex::new(r"^https?://[^\s/?#@]+(?:@[^\s/?#]+)?(?:[/?#]\S*)?$")
            .expect("url regex should compile")
    });
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("--notify-url is required");
    }
    if !re.is_match(trimmed) {
        bail!("--notify-url must be an http:// or https:// URL, got '{raw}'");
    }
    Ok(trimmed.to_string())
}

fn existing_file(path: &Path, flag: &str) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("{flag} {} does not exist", path.display()))?;
    if !canonical.is_file() {
        bail!("{flag} {} is not a file", canonical.display());
    }
    Ok(canonical)
}
