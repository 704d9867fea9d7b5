//! Device transport seam.
//!
//! The orchestration core never talks to a socket directly. A
//! [`DeviceConnector`] opens a [`DeviceTransport`] for one device, and
//! collectors issue commands through it.
//!
//! - [`RouterOsConnector`]: RouterOS API over TCP, optionally wrapped in TLS

mod routeros;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::{DeviceProfile, TlsMode};

pub use routeros::{ApiConnection, RouterOsConnector};

/// One reply record: attribute name to value.
pub type Record = BTreeMap<String, String>;

/// Errors raised by a device transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect or reply read exceeded the socket timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// TLS setup or handshake failed.
    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),

    /// The device rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The device rejected one command; the session stays usable.
    #[error("command '{command}' failed: {message}")]
    Trap { command: String, message: String },

    /// The device terminated the session.
    #[error("session terminated by device: {0}")]
    Fatal(String),

    /// The byte stream did not follow the API framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport was already closed.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Whether the link has to be re-established before the next command.
    pub fn is_connection_loss(&self) -> bool {
        !matches!(self, Self::Trap { .. })
    }
}

/// Everything needed to open a session with one device.
#[derive(Clone)]
pub struct ConnectTarget {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub tls: TlsMode,
    /// Bounds the connect and every reply read.
    pub timeout: Duration,
}

impl ConnectTarget {
    /// Derive connection parameters from a resolved profile.
    pub fn from_profile(profile: &DeviceProfile, timeout: Duration) -> Self {
        Self {
            hostname: profile.effective_hostname().to_string(),
            port: profile.effective_port(),
            username: profile.effective_username().to_string(),
            password: profile.effective_password().to_string(),
            tls: profile.tls_mode(),
            timeout,
        }
    }

    /// `host:port` form of the target.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// An open command channel to one device.
///
/// A transport is owned by exactly one session and is never shared.
#[async_trait::async_trait]
pub trait DeviceTransport: Send {
    /// Run a command and return its reply records in order.
    ///
    /// `args` are raw API words such as `=.proplist=name,version`.
    async fn run(&mut self, command: &str, args: &[&str]) -> Result<Vec<Record>, TransportError>;

    /// Release the underlying connection. Calling it twice is harmless.
    async fn close(&mut self);
}

/// Opens transports. Shared by every device task.
#[async_trait::async_trait]
pub trait DeviceConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DeviceTransport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_target_from_profile() {
        let mut profile = DeviceProfile::new("r1");
        profile.hostname = Some("10.0.0.1".to_string());
        profile.use_ssl = Some(true);
        profile.password = Some("hunter2".to_string());

        let target = ConnectTarget::from_profile(&profile, Duration::from_secs(5));
        assert_eq!(target.address(), "10.0.0.1:8729");
        assert_eq!(target.username, "admin");
        assert_eq!(target.tls, TlsMode::Verified);

        let debug = format!("{target:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_trap_keeps_connection() {
        let trap = TransportError::Trap {
            command: "/x".to_string(),
            message: "no such command".to_string(),
        };
        assert!(!trap.is_connection_loss());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_connection_loss());
        assert!(TransportError::Fatal("bye".to_string()).is_connection_loss());
    }
}
