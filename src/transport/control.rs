use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// `currentPattern` reported by the display while it is in UDP streaming mode.
const STREAMING_PATTERN: u32 = 255;

#[derive(Debug, Deserialize)]
struct InfoReply {
    #[serde(rename = "currentPattern")]
    current_pattern: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Idle,
}

/// HTTP control plane of the display controller.
pub struct StreamControl {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl StreamControl {
    /// `host` may carry an explicit port (`10.0.0.5:8080`); plain HTTP is assumed.
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("http://{}", host),
        })
    }

    /// Ask `/info` whether the display is already streaming.
    pub fn probe(&self) -> Result<StreamState> {
        let url = format!("{}/info", self.base_url);
        let body = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {} failed", url))?
            .text()
            .context("Failed to read /info reply")?;
        parse_info(&body)
    }

    /// Switch the display into UDP streaming mode.
    pub fn request_stream(&self) -> Result<()> {
        let url = format!("{}/stream", self.base_url);
        self.client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {} failed", url))?;
        Ok(())
    }

    /// Probe, then request streaming if needed. Failures are logged, never returned:
    /// the display may already be listening for frames.
    pub fn ensure_streaming(&self) -> bool {
        match self.probe() {
            Ok(StreamState::Streaming) => {
                log::info!("Display already in streaming mode");
                return true;
            }
            Ok(StreamState::Idle) => {}
            Err(err) => log::debug!("Stream probe failed: {:#}", err),
        }

        match self.request_stream() {
            Ok(()) => {
                log::info!("Display switched to streaming mode");
                true
            }
            Err(err) => {
                log::warn!("Could not enable streaming mode ({:#}); sending frames anyway", err);
                false
            }
        }
    }
}

fn parse_info(body: &str) -> Result<StreamState> {
    let info: InfoReply = serde_json::from_str(body).context("Malformed /info reply")?;
    Ok(match info.current_pattern {
        Some(STREAMING_PATTERN) => StreamState::Streaming,
        _ => StreamState::Idle,
    })
}
