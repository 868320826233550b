//! Transport layer: the raw byte pipes a session drives.
//!
//! Three variants share one contract:
//! - [`SshShellTransport`]: interactive shell over an authenticated russh connection
//! - [`TelnetTransport`]: raw TCP stream with telnet option negotiation handled inline
//! - [`ProcessTransport`]: an interactive client process running in a pseudo-terminal
//!
//! The pagination-aware receive loop lives one layer up in
//! [`TransportChannel`](crate::channel::TransportChannel); transports only
//! move bytes.

pub mod config;
mod process;
mod ssh;
mod telnet;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::TransportError;

pub use config::{DeviceProfile, HostKeyVerification, ProcessConfig, SessionConfig};
pub use process::{ProcessConnector, ProcessTransport};
pub use ssh::{SshConnector, SshShellTransport};
pub use telnet::{TelnetConnector, TelnetTransport};

/// Far enough ahead to never fire; about 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline `timeout` from now. Timeouts too large to represent saturate.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Which built-in transport a session connects with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Interactive shell over russh.
    #[default]
    Ssh,

    /// Telnet over TCP.
    Telnet,

    /// External `ssh` client spawned in a pseudo-terminal.
    SshProcess,
}

impl TransportKind {
    /// Default port for this transport.
    pub fn default_port(self) -> u16 {
        match self {
            TransportKind::Ssh | TransportKind::SshProcess => 22,
            TransportKind::Telnet => 23,
        }
    }

    /// Built-in connector for this transport.
    pub fn connector(self) -> Arc<dyn Connector> {
        match self {
            TransportKind::Ssh => Arc::new(SshConnector),
            TransportKind::Telnet => Arc::new(TelnetConnector),
            TransportKind::SshProcess => Arc::new(ProcessConnector),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Ssh => "ssh",
            TransportKind::Telnet => "telnet",
            TransportKind::SshProcess => "ssh-process",
        };
        f.write_str(name)
    }
}

/// A connected, bidirectional byte pipe to a device CLI.
///
/// Implementations hide their chunk sizes and flow control. `read` must be
/// cancel-safe: the channel races it against a deadline and drops the future
/// when the deadline fires.
#[async_trait]
pub trait Transport: Send {
    /// Write bytes to the device.
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Wait for the next chunk of output. `Ok(None)` means end of stream.
    async fn read(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Collect output that has already arrived, without waiting.
    fn drain(&mut self) -> Vec<u8>;

    /// Close the underlying connection or process.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Which variant this is.
    fn kind(&self) -> TransportKind;

    /// Line terminator appended to commands.
    fn line_ending(&self) -> &'static str {
        "\r"
    }

    /// Keystroke that advances a device pager.
    fn pager_key(&self) -> &'static [u8] {
        b" "
    }
}

/// Opens a [`Transport`] for a session.
///
/// Sessions hold an `Arc<dyn Connector>` so callers can substitute their own
/// connection logic (jump hosts, console servers, test doubles).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate, returning a transport positioned at the
    /// device's first output.
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn Transport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(TransportKind::Ssh.default_port(), 22);
        assert_eq!(TransportKind::SshProcess.default_port(), 22);
        assert_eq!(TransportKind::Telnet.default_port(), 23);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(TransportKind::Ssh.to_string(), "ssh");
        assert_eq!(TransportKind::Telnet.to_string(), "telnet");
        assert_eq!(TransportKind::SshProcess.to_string(), "ssh-process");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_saturates() {
        let now = Instant::now();
        assert!(deadline_after(Duration::MAX) >= now + FAR_FUTURE);
        assert_eq!(deadline_after(Duration::from_secs(3)), now + Duration::from_secs(3));
    }
}
