//! Error type for the health monitor.

use thiserror::Error;

/// Health monitor error type.
///
/// Probe failures never appear here: they are absorbed into the cycle as
/// failed endpoints. Only registry access from the reconciliation loop can
/// surface an error.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The service registry failed.
    #[error("registry error: {0}")]
    Registry(#[from] service_registry::Error),
}
