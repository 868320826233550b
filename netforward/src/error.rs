//! Error types for netforward.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for netforward operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (connect, authentication, spawn)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session-level errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Dialect errors
    #[error("Dialect error: {0}")]
    Dialect(#[from] DialectError),
}

/// Transport layer errors (connection setup, authentication, process spawn).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key not present in known_hosts (strict mode)
    #[error("Unknown host key for {host}:{port}")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the recorded one
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Failed to spawn the terminal client process
    #[error("Failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    /// Login dialogue did not complete
    #[error("Login handshake failed: {0}")]
    Handshake(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Channel already closed
    #[error("Channel closed")]
    Closed,

    /// Writing to the transport failed
    #[error("Send failed: {0}")]
    SendFailed(#[source] TransportError),

    /// Reading from the transport failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(#[source] TransportError),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Session layer errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session is not in the ready state
    #[error("Device not logged in")]
    NotLoggedIn,

    /// Caller passed invalid arguments
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// Device demands a password change before a shell is granted
    #[error("{host}: password expired, needs to be updated")]
    PasswordExpired { host: String },

    /// No base prompt observed in time
    #[error("{host}: timeout, can not get prompt after {timeout:?}")]
    PromptDiscoveryTimeout { host: String, timeout: Duration },

    /// Echo or trailing prompt boundary missing from output
    #[error("Prompt not found in output: {message}")]
    PromptNotFound { message: String },

    /// Invalid builder configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Login did not reach a ready shell
    #[error("{host}: login failed: {reason}")]
    LoginFailed { host: String, reason: String },
}

/// Dialect definition errors.
#[derive(Error, Debug)]
pub enum DialectError {
    /// Unknown dialect name
    #[error("Unknown dialect: {name}")]
    UnknownDialect { name: String },

    /// Dialect name already taken
    #[error("Dialect already registered: {name}")]
    AlreadyRegistered { name: String },

    /// Invalid dialect definition
    #[error("Invalid dialect definition: {message}")]
    InvalidDefinition { message: String },
}

/// Result type alias using netforward's Error.
pub type Result<T> = std::result::Result<T, Error>;
