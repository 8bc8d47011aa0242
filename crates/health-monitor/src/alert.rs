//! Alert types and the external alert transport seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Alert severity, ordered by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Informational (e.g. recovery).
    Info,
    /// First threshold crossing.
    Warning,
    /// Failures reached twice the threshold.
    Critical,
    /// Failures reached three times the threshold.
    Emergency,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

/// One alert, emitted once per state-transition edge (never once per poll).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Severity of the condition.
    pub severity: AlertSeverity,
    /// Machine-readable alert type (e.g. `health-threshold`).
    pub kind: String,
    /// The service this alert is about.
    pub service_id: String,
    /// Human-readable description.
    pub message: String,
    /// Routing hint from the service's health-check configuration.
    pub channel: Option<String>,
    /// Additional structured context for the transport.
    pub context: serde_json::Value,
}

/// External alert transport. Delivery (webhook, log, page) is entirely the
/// implementor's responsibility; the monitor only emits.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert.
    async fn send(&self, alert: Alert);
}

/// Sink that forwards alerts onto a channel, for embedding and tests.
pub struct ChannelSink {
    tx: async_channel::Sender<Alert>,
}

impl ChannelSink {
    /// Create a sink and the receiver its alerts arrive on.
    pub fn new(capacity: usize) -> (Self, async_channel::Receiver<Alert>) {
        let (tx, rx) = async_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertSink for ChannelSink {
    async fn send(&self, alert: Alert) {
        // A closed or full receiver drops the alert; delivery is the
        // transport's concern, not the monitor's.
        let _ = self.tx.send(alert).await;
    }
}

/// Sink that writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Info => info!(
                service_id = %alert.service_id,
                kind = %alert.kind,
                "{}",
                alert.message
            ),
            _ => warn!(
                service_id = %alert.service_id,
                kind = %alert.kind,
                severity = %alert.severity,
                "{}",
                alert.message
            ),
        }
    }
}
