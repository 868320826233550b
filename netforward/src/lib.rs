//! # Netforward
//!
//! Async CLI session library for network device automation.
//!
//! Netforward logs into routers, switches and Linux hosts over SSH, Telnet
//! or a spawned `ssh` process, discovers the shell prompt, and runs commands
//! with pager handling and output cleanup.
//!
//! ## Features
//!
//! - SSH via russh, Telnet with option negotiation, or the system `ssh` client on a PTY
//! - Tail-only pattern matching on the last output line
//! - Automatic `--More--` answering with banner removal
//! - Caller-supplied outcome maps for interactive commands
//! - Per-vendor dialects (generic, linux, ruijie, maipu) behind a registry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netforward::SessionBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netforward::Error> {
//!     let mut session = SessionBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .dialect("ruijie")
//!         .build()?;
//!
//!     let login = session.login().await;
//!     if !login.status {
//!         eprintln!("login failed: {}", login.error_log);
//!         return Ok(());
//!     }
//!
//!     let result = session.execute("show version").await;
//!     println!("{}", result.content);
//!
//!     session.logout().await;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod platform;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use channel::{PatternSet, PromptMap, ReadOutcome, TransportChannel};
pub use error::{Error, Result};
pub use platform::{Dialect, DialectRegistry, Mode, ModeRule};
pub use session::{ActionResult, CommandResult, FailureKind, LoginState, Session, SessionBuilder};
pub use transport::{
    Connector, DeviceProfile, HostKeyVerification, SessionConfig, Transport, TransportKind,
};
