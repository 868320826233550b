//! Pseudo-terminal transport: drives an external `ssh` client.
//!
//! Useful for devices whose SSH implementation only an OpenSSH client with
//! legacy options can still talk to. The client is spawned in a pty, its
//! output is pumped by a blocking reader task into an unbounded channel, and
//! the child is killed when the transport is closed or dropped.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use regex::bytes::Regex;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;

use super::config::{HostKeyVerification, SessionConfig};
use super::{Connector, Transport, TransportKind, deadline_after};
use crate::error::TransportError;

/// Terminal clients page on carriage return.
const PAGER_KEY: &[u8] = b"\r";

static HOST_KEY_CONFIRM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(yes/no[^)]*\)\?\s*$").unwrap());
static PASSWORD_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)password:\s*$").unwrap());
static PERMISSION_DENIED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)permission denied|connection refused|could not resolve").unwrap());

/// Connects [`ProcessTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessConnector;

#[async_trait]
impl Connector for ProcessConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn Transport>, TransportError> {
        let transport = ProcessTransport::spawn(config).await?;
        Ok(Box::new(transport))
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// An interactive client process attached to a pseudo-terminal.
pub struct ProcessTransport {
    program: String,
    // Dropping the master closes the pty.
    _master: Box<dyn MasterPty + Send>,
    // Shared with the blocking task that performs each write.
    writer: SharedWriter,
    child: Box<dyn Child + Send + Sync>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: bool,
}

impl ProcessTransport {
    /// Spawn the client and answer its host-key and password prompts.
    pub async fn spawn(config: &SessionConfig) -> Result<Self, TransportError> {
        let program = config.process.program.clone();
        let spawn_error = |message: String| TransportError::Spawn {
            program: program.clone(),
            message,
        };

        let args = client_args(config);
        debug!("process: spawning {} {}", program, args.join(" "));

        let mut cmd = CommandBuilder::new(&program);
        cmd.args(&args);
        cmd.env("TERM", "xterm");

        let size = PtySize {
            rows: clamp_u16(config.terminal_height),
            cols: clamp_u16(config.terminal_width),
            pixel_width: 0,
            pixel_height: 0,
        };
        let attached = attach(cmd, size).map_err(spawn_error)?;

        let mut transport = Self {
            program,
            _master: attached.master,
            writer: Arc::new(Mutex::new(attached.writer)),
            child: attached.child,
            output: attached.output,
            closed: false,
        };

        let deadline = deadline_after(config.timeout);
        if let Err(e) = transport.authenticate(config, deadline).await {
            transport.kill();
            return Err(e);
        }

        Ok(transport)
    }

    async fn authenticate(
        &mut self,
        config: &SessionConfig,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        let mut seen = Vec::new();

        loop {
            let chunk = match tokio::time::timeout_at(deadline, self.read()).await {
                Ok(chunk) => chunk?,
                Err(_) => {
                    return Err(TransportError::Handshake(format!(
                        "{} did not ask for a password within {:?}",
                        self.program, config.timeout
                    )));
                }
            };
            let Some(chunk) = chunk else {
                return Err(TransportError::Handshake(format!(
                    "{} exited: {}",
                    self.program,
                    String::from_utf8_lossy(&seen).trim()
                )));
            };
            seen.extend_from_slice(&chunk);

            if HOST_KEY_CONFIRM.is_match(&seen) {
                debug!("process: confirming host key for {}", config.host);
                self.write(b"yes\r").await?;
                seen.clear();
            } else if PASSWORD_PROMPT.is_match(&seen) {
                let line = format!("{}\r", config.password.expose_secret());
                self.write(line.as_bytes()).await?;
                return Ok(());
            } else if PERMISSION_DENIED.is_match(&seen) {
                return Err(TransportError::AuthenticationFailed {
                    user: config.username.clone(),
                });
            }
        }
    }

    fn kill(&mut self) {
        self.closed = true;
        if let Ok(Some(status)) = self.child.try_wait() {
            trace!("process: {} already exited: {:?}", self.program, status);
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!("process: failed to kill {}: {}", self.program, e);
        }
    }
}

/// Arguments for an OpenSSH-compatible client.
fn client_args(config: &SessionConfig) -> Vec<String> {
    let mut args = config.process.extra_args.clone();

    let strict = match config.host_key_verification {
        HostKeyVerification::Strict => "yes",
        HostKeyVerification::AcceptNew => "accept-new",
        HostKeyVerification::Disabled => "no",
    };
    args.push("-o".to_string());
    args.push(format!("StrictHostKeyChecking={}", strict));

    if let Some(ref path) = config.known_hosts_path {
        args.push("-o".to_string());
        args.push(format!("UserKnownHostsFile={}", path.display()));
    } else if config.host_key_verification == HostKeyVerification::Disabled {
        args.push("-o".to_string());
        args.push("UserKnownHostsFile=/dev/null".to_string());
    }

    args.push("-p".to_string());
    args.push(config.port.to_string());
    args.push(format!("{}@{}", config.username, config.host));
    args
}

/// A child running on a fresh pty, with its output already being pumped.
struct Attached {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
}

fn attach(cmd: CommandBuilder, size: PtySize) -> Result<Attached, String> {
    let pair = native_pty_system().openpty(size).map_err(|e| e.to_string())?;
    let child = pair.slave.spawn_command(cmd).map_err(|e| e.to_string())?;
    // Only the child may hold the slave, or its exit never reaches the reader.
    drop(pair.slave);
    let writer = pair.master.take_writer().map_err(|e| e.to_string())?;
    let reader = pair.master.try_clone_reader().map_err(|e| e.to_string())?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || pump_output(reader, tx));

    Ok(Attached {
        master: pair.master,
        writer,
        child,
        output: rx,
    })
}

/// Write on the blocking pool; pty writes can stall on a full terminal buffer.
async fn write_shared(writer: SharedWriter, data: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut writer = writer
            .lock()
            .map_err(|_| io::Error::other("pty writer lock poisoned"))?;
        writer.write_all(&data)?;
        writer.flush()
    })
    .await
    .map_err(io::Error::other)?
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

fn pump_output(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                // EIO is how a pty reports the child hanging up.
                trace!("process: pty read ended: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        write_shared(Arc::clone(&self.writer), data.to_vec()).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.output.recv().await {
            Some(chunk) => Ok(Some(Bytes::from(chunk))),
            None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    fn drain(&mut self) -> Vec<u8> {
        let mut drained = Vec::new();
        loop {
            match self.output.try_recv() {
                Ok(chunk) => drained.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        drained
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.kill();
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::SshProcess
    }

    fn pager_key(&self) -> &'static [u8] {
        PAGER_KEY
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if !self.closed {
            self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;
    use crate::transport::config::ProcessConfig;

    fn config() -> SessionConfig {
        SessionConfig {
            host: "192.0.2.1".to_string(),
            port: 2222,
            username: "admin".to_string(),
            password: SecretString::from("pw".to_string()),
            enable_password: None,
            timeout: Duration::from_secs(5),
            transport: TransportKind::SshProcess,
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::AcceptNew,
            known_hosts_path: None,
            process: ProcessConfig {
                program: "ssh".to_string(),
                extra_args: vec!["-o".to_string(), "KexAlgorithms=+diffie-hellman-group1-sha1".to_string()],
            },
        }
    }

    #[test]
    fn test_client_args() {
        let args = client_args(&config());
        assert_eq!(
            args,
            vec![
                "-o",
                "KexAlgorithms=+diffie-hellman-group1-sha1",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-p",
                "2222",
                "admin@192.0.2.1",
            ]
        );
    }

    #[test]
    fn test_client_args_known_hosts() {
        let mut cfg = config();
        cfg.process.extra_args.clear();
        cfg.host_key_verification = HostKeyVerification::Disabled;
        assert!(client_args(&cfg).contains(&"UserKnownHostsFile=/dev/null".to_string()));

        cfg.known_hosts_path = Some(PathBuf::from("/tmp/kh"));
        assert!(client_args(&cfg).contains(&"UserKnownHostsFile=/tmp/kh".to_string()));
    }

    #[test]
    fn test_handshake_patterns() {
        assert!(HOST_KEY_CONFIRM.is_match(
            b"Are you sure you want to continue connecting (yes/no/[fingerprint])? "
        ));
        assert!(PASSWORD_PROMPT.is_match(b"admin@192.0.2.1's password: "));
        assert!(PERMISSION_DENIED.is_match(b"Permission denied, please try again."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_round_trip_and_exit() {
        let mut cmd = CommandBuilder::new("head");
        cmd.args(["-n", "1"]);
        let mut attached = attach(cmd, PtySize::default()).unwrap();
        let writer: SharedWriter = Arc::new(Mutex::new(attached.writer));

        write_shared(writer, b"ping\n".to_vec()).await.unwrap();

        // The stream only ends once the exited child held the last slave handle.
        let mut seen = Vec::new();
        let collect = async {
            while let Some(chunk) = attached.output.recv().await {
                seen.extend_from_slice(&chunk);
            }
        };
        tokio::time::timeout(Duration::from_secs(10), collect)
            .await
            .expect("pty output never closed");
        assert!(String::from_utf8_lossy(&seen).contains("ping"));
        let _ = attached.child.kill();
    }

    #[test]
    fn test_pager_key_is_carriage_return() {
        assert_eq!(PAGER_KEY, b"\r");
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_u16(80), 80);
        assert_eq!(clamp_u16(100_000), u16::MAX);
    }
}
