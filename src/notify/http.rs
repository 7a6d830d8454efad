use super::NotificationSink;
use crate::event::DetectionEvent;
use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

/// Posts an empty body to the configured endpoint for every notification.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NotificationSink for HttpNotifier {
    fn send(&mut self, event: &DetectionEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .body("")
            .send()
            .with_context(|| format!("POST {} failed", self.url))?;
        let status = response.status();
        debug!(source = event.source.label(), %status, "notification endpoint responded");
        if !status.is_success() {
            bail!("notification endpoint returned {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Source;

    #[test]
    fn unreachable_endpoint_surfaces_error() {
        // Port 9 (discard) on loopback is closed on CI hosts.
        let mut notifier =
            HttpNotifier::new("http://127.0.0.1:9/ring", Duration::from_millis(500)).unwrap();
        let err = notifier
            .send(&DetectionEvent::positive(Source::Audio))
            .unwrap_err();
        assert!(format!("{err:#}").contains("POST http://127.0.0.1:9/ring failed"));
    }
}
