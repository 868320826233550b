//! Telnet transport: raw TCP with inline option negotiation.
//!
//! The device is refused every option it asks us to enable. Its offers to
//! echo and to suppress go-ahead are accepted, since most device CLIs expect
//! a character-at-a-time terminal. Everything else is declined.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::config::SessionConfig;
use super::{Connector, Transport, TransportKind, deadline_after};
use crate::error::TransportError;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

const READ_CHUNK: usize = 4096;

static LOGIN_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(login|username)[: ]*$").unwrap());
static PASSWORD_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)password[: ]*$").unwrap());
static LOGIN_REJECTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(login incorrect|authentication failed|access denied)").unwrap());

/// Connects [`TelnetTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelnetConnector;

#[async_trait]
impl Connector for TelnetConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn Transport>, TransportError> {
        let transport = TelnetTransport::connect(config).await?;
        Ok(Box::new(transport))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IacState {
    Data,
    Iac,
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Strips telnet commands out of a byte stream and produces negotiation replies.
///
/// State carries across calls, so a command split between two reads is
/// still recognised.
#[derive(Debug)]
pub(crate) struct IacFilter {
    state: IacState,
}

impl IacFilter {
    pub(crate) fn new() -> Self {
        Self {
            state: IacState::Data,
        }
    }

    /// Filter one chunk. Returns `(data, replies)`.
    pub(crate) fn feed(&mut self, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::with_capacity(input.len());
        let mut replies = Vec::new();

        for &byte in input {
            self.state = match self.state {
                IacState::Data if byte == IAC => IacState::Iac,
                IacState::Data => {
                    data.push(byte);
                    IacState::Data
                }
                IacState::Iac => match byte {
                    IAC => {
                        data.push(IAC);
                        IacState::Data
                    }
                    WILL | WONT | DO | DONT => IacState::Negotiate(byte),
                    SB => IacState::Subnegotiation,
                    _ => IacState::Data,
                },
                IacState::Negotiate(command) => {
                    Self::answer(command, byte, &mut replies);
                    IacState::Data
                }
                IacState::Subnegotiation if byte == IAC => IacState::SubnegotiationIac,
                IacState::Subnegotiation => IacState::Subnegotiation,
                IacState::SubnegotiationIac if byte == SE => IacState::Data,
                IacState::SubnegotiationIac => IacState::Subnegotiation,
            };
        }

        (data, replies)
    }

    fn answer(command: u8, option: u8, replies: &mut Vec<u8>) {
        match command {
            DO => replies.extend_from_slice(&[IAC, WONT, option]),
            WILL if option == OPT_ECHO || option == OPT_SGA => {
                replies.extend_from_slice(&[IAC, DO, option])
            }
            WILL => replies.extend_from_slice(&[IAC, DONT, option]),
            _ => {}
        }
    }
}

/// Telnet session over a TCP stream.
pub struct TelnetTransport {
    stream: TcpStream,
    filter: IacFilter,
    closed: bool,
}

impl TelnetTransport {
    /// Open the TCP connection and answer the device's login prompts.
    ///
    /// Output following the password is left unread for the session's
    /// prompt handshake.
    pub async fn connect(config: &SessionConfig) -> Result<Self, TransportError> {
        let addr = config.socket_addr();
        debug!("telnet: connecting to {}", addr);

        let stream = tokio::time::timeout(config.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout(config.timeout))?
            .map_err(|source| TransportError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;

        let mut transport = Self {
            stream,
            filter: IacFilter::new(),
            closed: false,
        };

        let deadline = deadline_after(config.timeout);
        transport.authenticate(config, deadline).await?;

        debug!("telnet: credentials sent to {}", addr);
        Ok(transport)
    }

    async fn authenticate(
        &mut self,
        config: &SessionConfig,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        let mut seen = Vec::new();
        let mut sent_username = false;

        loop {
            let chunk = match tokio::time::timeout_at(deadline, self.read()).await {
                Ok(chunk) => chunk?,
                Err(_) => {
                    return Err(TransportError::Handshake(format!(
                        "no password prompt within {:?}",
                        config.timeout
                    )));
                }
            };
            let Some(chunk) = chunk else {
                return Err(TransportError::Disconnected);
            };
            seen.extend_from_slice(&chunk);

            if LOGIN_REJECTED.is_match(&seen) {
                return Err(TransportError::AuthenticationFailed {
                    user: config.username.clone(),
                });
            }

            let tail = trim_trailing_whitespace(&seen);
            if PASSWORD_PROMPT.is_match(tail) {
                let line = format!("{}{}", config.password.expose_secret(), self.line_ending());
                self.write(line.as_bytes()).await?;
                return Ok(());
            }
            if !sent_username && LOGIN_PROMPT.is_match(tail) {
                let line = format!("{}{}", config.username, self.line_ending());
                self.write(line.as_bytes()).await?;
                sent_username = true;
                seen.clear();
            }
        }
    }

    fn filter_chunk(&mut self, raw: &[u8]) -> Vec<u8> {
        let (data, replies) = self.filter.feed(raw);
        if !replies.is_empty() {
            trace!("telnet: negotiation reply {:?}", replies);
            // Non-blocking so `read` stays cancel-safe; replies are a few bytes.
            if let Err(e) = self.stream.try_write(&replies) {
                debug!("telnet: negotiation reply not sent: {}", e);
            }
        }
        data
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &data[..end]
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        self.stream.write_all(data).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Bytes>, TransportError> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                self.closed = true;
                return Ok(None);
            }
            let data = self.filter_chunk(&buf[..n]);
            if !data.is_empty() {
                return Ok(Some(Bytes::from(data)));
            }
        }
    }

    fn drain(&mut self) -> Vec<u8> {
        let mut drained = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.stream.try_read(&mut buf) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(n) => {
                    let data = self.filter_chunk(&buf[..n]);
                    drained.extend_from_slice(&data);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("telnet: drain stopped: {}", e);
                    break;
                }
            }
        }
        drained
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.stream.shutdown().await?;
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Telnet
    }

    fn line_ending(&self) -> &'static str {
        "\r\n"
    }
}
