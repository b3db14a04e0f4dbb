use crate::error::{Error, Result};
use crate::record::MetricsRecord;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const CLIENT_HEADER: &str = "X-AI-Monitor-Client";
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_TIMEOUT: Duration = Duration::from_secs(4);

/// Collector reply to `GET /poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollResponse {
    pub seq: u64,
    #[serde(default)]
    pub refresh: bool,
}

/// HTTP client for the collector. The base URL is passed per call so a
/// settings change takes effect on the next request.
#[derive(Clone)]
pub struct CollectorClient {
    http: Client,
    push_timeout: Duration,
    poll_timeout: Duration,
}

impl Default for CollectorClient {
    fn default() -> Self {
        Self::new(PUSH_TIMEOUT, POLL_TIMEOUT)
    }
}

impl CollectorClient {
    pub fn new(push_timeout: Duration, poll_timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            push_timeout,
            poll_timeout,
        }
    }

    /// `POST {base}/update`. A record without data fields is refused
    /// before anything goes on the wire.
    pub async fn push(&self, base_url: &str, record: &MetricsRecord) -> Result<()> {
        if !record.has_data() {
            return Err(Error::EmptyExtraction);
        }

        let endpoint = format!("{}/update", base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&endpoint)
            .header(CLIENT_HEADER, "1")
            .timeout(self.push_timeout)
            .json(record)
            .send()
            .await
            .map_err(Error::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::TransportRejected(status.as_u16()));
        }
        Ok(())
    }

    /// `GET {base}/poll?seq={known}`. Every failure, including a body that
    /// is not a poll response, comes back as `Error::Poll`.
    pub async fn poll(&self, base_url: &str, known_seq: u64) -> Result<PollResponse> {
        let endpoint = format!("{}/poll", base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&endpoint)
            .query(&[("seq", known_seq)])
            .timeout(self.poll_timeout)
            .send()
            .await
            .map_err(|e| Error::Poll(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Poll(format!("HTTP {}", status.as_u16())));
        }

        resp.json::<PollResponse>()
            .await
            .map_err(|e| Error::Poll(e.to_string()))
    }
}
