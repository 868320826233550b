//! Result types for session operations.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Why an operation returned `status = false`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Session is not in the ready state
    #[error("not logged in")]
    NotLoggedIn,

    /// Writing to the transport failed
    #[error("send failure")]
    SendFailure,

    /// No outcome pattern matched before the deadline
    #[error("receive timeout")]
    ReceiveTimeout,

    /// No base prompt was seen during login
    #[error("prompt discovery timeout")]
    PromptDiscoveryTimeout,

    /// The device demanded a password change
    #[error("password expired")]
    PasswordExpired,

    /// Output matched but its payload could not be isolated
    #[error("extraction failure")]
    ExtractionFailure,

    /// The transport reported an error while closing
    #[error("transport close failure")]
    TransportCloseFailure,

    /// The transport could not be opened
    #[error("connect failure")]
    ConnectFailure,

    /// The peer closed the transport mid-exchange
    #[error("connection lost")]
    ConnectionLost,
}

/// Outcome of `login`/`logout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    /// Whether the action succeeded.
    pub status: bool,

    /// Human-readable failure description; empty on success.
    pub error_log: String,

    /// Failure category when `status` is false.
    pub failure: Option<FailureKind>,
}

impl ActionResult {
    /// A successful action.
    pub fn ok() -> Self {
        Self {
            status: true,
            error_log: String::new(),
            failure: None,
        }
    }

    /// A failed action.
    pub fn failed(kind: FailureKind, error_log: impl Into<String>) -> Self {
        Self {
            status: false,
            error_log: error_log.into(),
            failure: Some(kind),
        }
    }

    /// Check if the action succeeded.
    pub fn is_success(&self) -> bool {
        self.status
    }
}

/// Result of `execute`, `command` or `reply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The command (or masked reply) that was sent.
    pub command: String,

    /// Whether an outcome pattern matched.
    pub status: bool,

    /// Cleaned output. On failure, whatever was read before the failure.
    pub content: String,

    /// Human-readable failure description; empty on success.
    pub error_log: String,

    /// Label of the matched outcome. `Some` whenever `status` is true.
    pub outcome: Option<String>,

    /// Failure category when `status` is false.
    pub failure: Option<FailureKind>,

    /// Time from send to match or failure.
    pub elapsed: Duration,
}

impl CommandResult {
    /// A successful result.
    pub fn success(
        command: impl Into<String>,
        content: impl Into<String>,
        outcome: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            status: true,
            content: content.into(),
            error_log: String::new(),
            outcome: Some(outcome.into()),
            failure: None,
            elapsed,
        }
    }

    /// A failed result.
    pub fn failed(
        command: impl Into<String>,
        kind: FailureKind,
        error_log: impl Into<String>,
        content: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            status: false,
            content: content.into(),
            error_log: error_log.into(),
            outcome: None,
            failure: Some(kind),
            elapsed,
        }
    }

    /// Check if the command succeeded.
    pub fn is_success(&self) -> bool {
        self.status
    }

    /// Whether the given outcome label matched.
    pub fn is_outcome(&self, label: &str) -> bool {
        self.outcome.as_deref() == Some(label)
    }

    /// Get the content lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.lines()
    }

    /// Check if the content contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.content.contains(pattern)
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_carries_outcome() {
        let result = CommandResult::success("show clock", "12:00\r\n", "success", Duration::ZERO);
        assert!(result.is_success());
        assert!(result.is_outcome("success"));
        assert!(result.failure.is_none());
        assert_eq!(result.lines().collect::<Vec<_>>(), ["12:00"]);
    }

    #[test]
    fn test_failed_keeps_content() {
        let result = CommandResult::failed(
            "show run",
            FailureKind::ReceiveTimeout,
            "timed out",
            "partial",
            Duration::from_secs(3),
        );
        assert!(!result.is_success());
        assert_eq!(result.outcome, None);
        assert_eq!(result.failure, Some(FailureKind::ReceiveTimeout));
        assert_eq!(result.to_string(), "partial");
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::NotLoggedIn.to_string(), "not logged in");
        assert_eq!(FailureKind::ReceiveTimeout.to_string(), "receive timeout");
    }
}
