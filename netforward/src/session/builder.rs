//! Builder for creating sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use super::Session;
use crate::channel::DEFAULT_SEARCH_DEPTH;
use crate::error::{Result, SessionError};
use crate::platform::{Dialect, DialectRegistry};
use crate::transport::{
    Connector, DeviceProfile, HostKeyVerification, ProcessConfig, SessionConfig, TransportKind,
};

/// Builder for constructing sessions.
///
/// # Example
///
/// ```rust,no_run
/// use netforward::{SessionBuilder, TransportKind};
///
/// # async fn example() -> Result<(), netforward::Error> {
/// let mut session = SessionBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .transport(TransportKind::Telnet)
///     .dialect("maipu")
///     .build()?;
///
/// let login = session.login().await;
/// assert!(login.status, "{}", login.error_log);
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<SecretString>,
    enable_password: Option<SecretString>,
    timeout: Duration,
    transport: TransportKind,
    dialect_name: Option<String>,
    custom_dialect: Option<Dialect>,
    connector: Option<Arc<dyn Connector>>,
    terminal_width: u32,
    terminal_height: u32,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    process: ProcessConfig,
    search_depth: usize,
}

impl SessionBuilder {
    /// Create a new session builder for the specified address.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: None,
            password: None,
            enable_password: None,
            timeout: Duration::from_secs(30),
            transport: TransportKind::default(),
            dialect_name: None,
            custom_dialect: None,
            connector: None,
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            process: ProcessConfig::default(),
            search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }

    /// Set the port (default: 22 for SSH variants, 23 for telnet).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the login username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the login password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the enable password. Carried in the config; login does not use it.
    pub fn enable_password(mut self, password: impl Into<String>) -> Self {
        self.enable_password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the timeout for login and `execute` (default: 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the transport (default: SSH).
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Use a registered dialect by name (default: "generic").
    pub fn dialect(mut self, name: impl Into<String>) -> Self {
        self.dialect_name = Some(name.into());
        self
    }

    /// Use a dialect that is not in the registry.
    pub fn custom_dialect(mut self, dialect: Dialect) -> Self {
        self.custom_dialect = Some(dialect);
        self
    }

    /// Replace the built-in connector for the selected transport.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set terminal dimensions.
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Set the SSH host key policy (default: accept new keys).
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use an alternate known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Client program for [`TransportKind::SshProcess`] (default: `ssh`).
    pub fn process_program(mut self, program: impl Into<String>) -> Self {
        self.process.program = program.into();
        self
    }

    /// Extra client arguments for [`TransportKind::SshProcess`].
    pub fn process_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// How many trailing bytes prompt matching looks at (default: 1000).
    pub fn search_depth(mut self, depth: usize) -> Self {
        self.search_depth = depth;
        self
    }

    /// Build the session.
    ///
    /// This does not connect. Call `login()` on the returned session.
    pub fn build(self) -> Result<Session> {
        let username = self.username.ok_or_else(|| SessionError::InvalidConfig {
            message: "username is required".to_string(),
        })?;
        let password = self.password.ok_or_else(|| SessionError::InvalidConfig {
            message: "password is required".to_string(),
        })?;
        if self.timeout.is_zero() {
            return Err(SessionError::InvalidConfig {
                message: "timeout must be positive".to_string(),
            }
            .into());
        }

        let dialect = match (self.custom_dialect, self.dialect_name) {
            (Some(custom), _) => custom,
            (None, Some(name)) => DialectRegistry::lookup(&name)?,
            (None, None) => DialectRegistry::lookup("generic")?,
        };

        let config = SessionConfig {
            port: self.port.unwrap_or_else(|| self.transport.default_port()),
            host: self.host,
            username,
            password,
            enable_password: self.enable_password,
            timeout: self.timeout,
            transport: self.transport,
            terminal_width: self.terminal_width,
            terminal_height: self.terminal_height,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
            process: self.process,
        };

        let connector = self
            .connector
            .unwrap_or_else(|| config.transport.connector());

        Ok(Session::new(config, dialect, connector, self.search_depth))
    }
}

impl DeviceProfile {
    /// Start a [`SessionBuilder`] from this profile.
    pub fn builder(&self) -> SessionBuilder {
        let mut builder = SessionBuilder::new(&self.address)
            .username(&self.username)
            .password(&self.password)
            .transport(self.transport)
            .dialect(&self.dialect)
            .timeout(Duration::from_secs(self.timeout_secs));
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(ref enable) = self.enable_password {
            builder = builder.enable_password(enable);
        }
        builder
    }
}

impl From<DeviceProfile> for SessionBuilder {
    fn from(profile: DeviceProfile) -> Self {
        profile.builder()
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::error::{DialectError, Error};

    #[test]
    fn test_defaults() {
        let session = SessionBuilder::new("192.0.2.1")
            .username("admin")
            .password("pw")
            .build()
            .unwrap();

        let config = session.config();
        assert_eq!(config.port, 22);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.transport, TransportKind::Ssh);
        assert_eq!((config.terminal_width, config.terminal_height), (511, 24));
        assert_eq!(session.dialect().name, "generic");
        assert!(config.enable_password.is_none());
    }

    #[test]
    fn test_telnet_port_default() {
        let session = SessionBuilder::new("192.0.2.1")
            .username("admin")
            .password("pw")
            .transport(TransportKind::Telnet)
            .build()
            .unwrap();
        assert_eq!(session.config().port, 23);
    }

    #[test]
    fn test_explicit_port_wins() {
        let session = SessionBuilder::new("192.0.2.1")
            .username("admin")
            .password("pw")
            .transport(TransportKind::Telnet)
            .port(2323)
            .build()
            .unwrap();
        assert_eq!(session.config().port, 2323);
    }

    #[test]
    fn test_missing_username() {
        let result = SessionBuilder::new("192.0.2.1").password("pw").build();
        assert!(matches!(
            result,
            Err(Error::Session(SessionError::InvalidConfig { .. }))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = SessionBuilder::new("192.0.2.1")
            .username("admin")
            .password("pw")
            .timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_dialect() {
        let result = SessionBuilder::new("192.0.2.1")
            .username("admin")
            .password("pw")
            .dialect("nonexistent")
            .build();
        assert!(matches!(
            result,
            Err(Error::Dialect(DialectError::UnknownDialect { .. }))
        ));
    }

    #[test]
    fn test_custom_dialect_overrides_name() {
        let session = SessionBuilder::new("192.0.2.1")
            .username("admin")
            .password("pw")
            .dialect("ruijie")
            .custom_dialect(Dialect::new("bench"))
            .build()
            .unwrap();
        assert_eq!(session.dialect().name, "bench");
    }

    #[test]
    fn test_profile_into_builder() {
        let profile: DeviceProfile = serde_json::from_str(
            r#"{"address": "192.0.2.7", "username": "ops", "password": "pw",
                "enable_password": "en", "transport": "telnet",
                "dialect": "maipu", "timeout_secs": 12}"#,
        )
        .unwrap();

        let session = SessionBuilder::from(profile).build().unwrap();
        let config = session.config();
        assert_eq!(config.host, "192.0.2.7");
        assert_eq!(config.port, 23);
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.password.expose_secret(), "pw");
        assert_eq!(
            config.enable_password.as_ref().map(|p| p.expose_secret().to_string()),
            Some("en".to_string())
        );
        assert_eq!(session.dialect().name, "maipu");
    }
}
