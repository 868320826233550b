//! Session connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use super::TransportKind;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,

    /// Accept and learn unknown keys, reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For lab use only.
    Disabled,
}

/// How the pty-style transport launches its client.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Program to run (default `ssh`).
    pub program: String,

    /// Extra arguments placed before the destination, e.g. `-1` or `-o KexAlgorithms=...`.
    pub extra_args: Vec<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Resolved connection settings for one device.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device address (hostname or IP).
    pub host: String,

    /// Port to connect to.
    pub port: u16,

    /// Login username.
    pub username: String,

    /// Login password.
    pub password: SecretString,

    /// Enable (privileged mode) password. Carried for callers; login does not use it.
    pub enable_password: Option<SecretString>,

    /// Default timeout for login and `execute`.
    pub timeout: Duration,

    /// Which transport to use.
    pub transport: TransportKind,

    /// Terminal width requested from the device.
    pub terminal_width: u32,

    /// Terminal height requested from the device.
    pub terminal_height: u32,

    /// SSH host key policy.
    pub host_key_verification: HostKeyVerification,

    /// Alternate known_hosts file.
    pub known_hosts_path: Option<PathBuf>,

    /// Client process settings for [`TransportKind::SshProcess`].
    pub process: ProcessConfig,
}

impl SessionConfig {
    /// `host:port` string for log messages and socket connects.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One device entry as loaded from an inventory file.
///
/// ```rust
/// let profile: netforward::DeviceProfile = serde_json::from_str(
///     r#"{"address": "10.0.0.1", "username": "admin", "password": "secret",
///         "transport": "telnet", "dialect": "maipu"}"#,
/// ).unwrap();
/// assert_eq!(profile.resolved_port(), 23);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceProfile {
    /// Device address.
    pub address: String,

    /// Port override; the transport default applies when absent.
    #[serde(default)]
    pub port: Option<u16>,

    /// Login username.
    pub username: String,

    /// Login password.
    pub password: String,

    /// Enable password.
    #[serde(default)]
    pub enable_password: Option<String>,

    /// Transport to connect with.
    #[serde(default)]
    pub transport: TransportKind,

    /// Registered dialect name.
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_dialect() -> String {
    "generic".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl DeviceProfile {
    /// Port after applying the transport default.
    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.transport.default_port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let profile: DeviceProfile = serde_json::from_str(
            r#"{"address": "192.0.2.10", "username": "admin", "password": "pw"}"#,
        )
        .unwrap();

        assert_eq!(profile.transport, TransportKind::Ssh);
        assert_eq!(profile.dialect, "generic");
        assert_eq!(profile.timeout_secs, 30);
        assert_eq!(profile.resolved_port(), 22);
        assert!(profile.enable_password.is_none());
    }

    #[test]
    fn test_profile_overrides() {
        let profile: DeviceProfile = serde_json::from_str(
            r#"{"address": "192.0.2.11", "port": 2323, "username": "ops",
                "password": "pw", "enable_password": "en",
                "transport": "ssh_process", "dialect": "ruijie", "timeout_secs": 5}"#,
        )
        .unwrap();

        assert_eq!(profile.transport, TransportKind::SshProcess);
        assert_eq!(profile.resolved_port(), 2323);
        assert_eq!(profile.dialect, "ruijie");
        assert_eq!(profile.timeout_secs, 5);
        assert_eq!(profile.enable_password.as_deref(), Some("en"));
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let parsed: Result<DeviceProfile, _> = serde_json::from_str(
            r#"{"address": "a", "username": "u", "password": "p", "transport": "rsh"}"#,
        );
        assert!(parsed.is_err());
    }
}
