//! Endpoint probing.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// A probe could not produce an HTTP status at all.
///
/// The monitor treats this the same as a wrong status code: one failed
/// endpoint for the cycle. It is never rethrown past the cycle.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The request did not complete within the probe timeout.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, DNS, or protocol failure.
    #[error("probe transport error: {0}")]
    Transport(String),
}

/// Result of probing a single endpoint.
#[derive(Debug, Clone)]
pub struct Probe {
    /// Whether the endpoint returned the expected status code.
    pub healthy: bool,
    /// The status code the endpoint returned.
    pub status_code: u16,
    /// Round-trip time of the probe.
    pub latency: Duration,
}

/// Performs a single endpoint check.
///
/// This is the seam between the monitor and the network: production uses
/// [`HttpProber`], tests substitute a scripted implementation.
#[async_trait]
pub trait EndpointProber: Send + Sync {
    /// Probe `url`, expecting `expected_status`, within `timeout`.
    async fn probe(
        &self,
        url: &str,
        expected_status: u16,
        timeout: Duration,
    ) -> Result<Probe, ProbeError>;
}

/// HTTP prober backed by a shared reqwest client.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a prober with a default client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointProber for HttpProber {
    async fn probe(
        &self,
        url: &str,
        expected_status: u16,
        timeout: Duration,
    ) -> Result<Probe, ProbeError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Transport(err.to_string())
                }
            })?;

        let status_code = response.status().as_u16();
        let latency = start.elapsed();
        debug!(url, status_code, ?latency, "probe complete");

        Ok(Probe {
            healthy: status_code == expected_status,
            status_code,
            latency,
        })
    }
}
