//! Per-device error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::collector::CollectorError;
use crate::session::SessionState;
use crate::transport::TransportError;

/// Errors raised while starting or polling one device.
///
/// None of these leave the device's own task; other devices are never
/// affected.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device could not be reached or refused the login.
    #[error("device '{device}': connect failed: {source}")]
    Connect {
        device: String,
        #[source]
        source: TransportError,
    },

    /// A collector could not register its metric families.
    #[error("device '{device}': collector '{collector}' failed to declare: {source}")]
    Declare {
        device: String,
        collector: &'static str,
        #[source]
        source: prometheus::Error,
    },

    /// A collector failed during a tick.
    #[error("device '{device}': collector '{collector}' failed: {source}")]
    Collect {
        device: String,
        collector: &'static str,
        #[source]
        source: CollectorError,
    },

    /// A collect exceeded its budget.
    #[error("device '{device}': collect exceeded {budget:?}")]
    ScrapeTimeout { device: String, budget: Duration },

    /// Startup of this device did not finish within its budget.
    #[error("device '{device}': startup did not finish within {budget:?}")]
    StartupTimeout { device: String, budget: Duration },

    /// No open connection.
    #[error("device '{device}': not connected")]
    NotConnected { device: String },

    /// Operation not allowed in the current session state.
    #[error("device '{device}': cannot {operation} while {state}")]
    InvalidState {
        device: String,
        operation: &'static str,
        state: SessionState,
    },

    /// The startup task panicked or was cancelled.
    #[error("device '{device}': startup task failed: {reason}")]
    Task { device: String, reason: String },
}

impl DeviceError {
    /// Name of the device the error belongs to.
    pub fn device(&self) -> &str {
        match self {
            Self::Connect { device, .. }
            | Self::Declare { device, .. }
            | Self::Collect { device, .. }
            | Self::ScrapeTimeout { device, .. }
            | Self::StartupTimeout { device, .. }
            | Self::NotConnected { device }
            | Self::InvalidState { device, .. }
            | Self::Task { device, .. } => device,
        }
    }

    /// Whether the session should drop its connection and reconnect.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::ScrapeTimeout { .. } | Self::NotConnected { .. } => true,
            Self::Collect { source, .. } => source.is_connection_loss(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trap_during_collect_keeps_connection() {
        let err = DeviceError::Collect {
            device: "r1".to_string(),
            collector: "poe",
            source: CollectorError::Transport(TransportError::Trap {
                command: "/interface/ethernet/poe/print".to_string(),
                message: "no such command".to_string(),
            }),
        };
        assert!(!err.is_connection_loss());
        assert_eq!(err.device(), "r1");
        assert!(err.to_string().contains("'poe'"));
    }

    #[test]
    fn test_timeout_drops_connection() {
        let err = DeviceError::ScrapeTimeout {
            device: "r1".to_string(),
            budget: Duration::from_secs(30),
        };
        assert!(err.is_connection_loss());
    }
}
