//! Device sessions: login, prompt discovery and command execution.
//!
//! A [`Session`] owns one [`TransportChannel`] and moves through
//! [`LoginState`]s. Operational failures (timeouts, broken transports,
//! unexpected output) come back as [`CommandResult`]/[`ActionResult`] values
//! with `status = false`, so a caller working through many devices can keep
//! going after one fails. Only caller misuse, such as an empty command or a
//! prompt map with fewer than two entries, is returned as `Err`.

mod builder;
mod response;

pub use builder::SessionBuilder;
pub use response::{ActionResult, CommandResult, FailureKind};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use regex::bytes::Regex;
use tokio::time::Instant;

use crate::channel::{
    MatchedRead, PatternSet, PromptMap, ReadOutcome, TransportChannel, literal_prompt_pattern,
    scrub,
};
use crate::error::{ChannelError, Error, Result, SessionError};
use crate::platform::{Dialect, Mode, PASSWORD_EXPIRED_LABEL, PROMPT_LABEL};
use crate::transport::{Connector, SessionConfig};

const HIDDEN_INPUT: &str = "******";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoginState {
    /// No transport.
    #[default]
    Disconnected,

    /// Transport is being opened.
    Connecting,

    /// Transport is open; waiting for the first prompt.
    Authenticated,

    /// Prompt discovered; commands may be sent.
    Ready,

    /// `logout` was called.
    LoggedOut,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginState::Disconnected => "disconnected",
            LoginState::Connecting => "connecting",
            LoginState::Authenticated => "authenticated",
            LoginState::Ready => "ready",
            LoginState::LoggedOut => "logged out",
        };
        f.write_str(name)
    }
}

/// The prompt seen at the end of login.
#[derive(Debug, Clone)]
struct DiscoveredPrompt {
    text: String,
    escaped: String,
    pattern: Regex,
}

/// An interactive CLI session with one device.
///
/// Operations take `&mut self`, so a session runs one command at a time.
/// Run one session per device to work on many devices concurrently.
pub struct Session {
    config: SessionConfig,
    dialect: Dialect,
    connector: Arc<dyn Connector>,
    search_depth: usize,
    channel: Option<TransportChannel>,
    state: LoginState,
    mode: Mode,
    prompt: Option<DiscoveredPrompt>,
}

/// What a single exchange was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// The discovered prompt; content is the text between echo and prompt.
    Prompt,
    /// Caller outcomes; content is everything read.
    Outcomes,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        dialect: Dialect,
        connector: Arc<dyn Connector>,
        search_depth: usize,
    ) -> Self {
        Self {
            config,
            dialect,
            connector,
            search_depth,
            channel: None,
            state: LoginState::Disconnected,
            mode: Mode::default(),
            prompt: None,
        }
    }

    /// The resolved connection settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The dialect this session speaks.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Current lifecycle state.
    pub fn login_state(&self) -> LoginState {
        self.state
    }

    /// Whether commands may be sent.
    pub fn is_ready(&self) -> bool {
        self.state == LoginState::Ready
    }

    /// CLI mode inferred from the discovered prompt.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The discovered prompt, escaped for use inside a regex.
    pub fn get_prompt(&self) -> Result<&str> {
        match (&self.prompt, self.state) {
            (Some(prompt), LoginState::Ready) => Ok(&prompt.escaped),
            _ => Err(SessionError::NotLoggedIn.into()),
        }
    }

    /// The discovered prompt as the device printed it.
    pub fn prompt_text(&self) -> Option<&str> {
        match self.state {
            LoginState::Ready => self.prompt.as_ref().map(|p| p.text.as_str()),
            _ => None,
        }
    }

    /// Connect, wait for the device's first prompt, and discover it.
    ///
    /// Never returns `Err`; failures are reported in the result and leave the
    /// session `Disconnected`. Calling this on a ready session is a no-op.
    pub async fn login(&mut self) -> ActionResult {
        if self.state == LoginState::Ready {
            return ActionResult::ok();
        }
        if let Some(mut stale) = self.channel.take() {
            if let Err(e) = stale.close().await {
                debug!("{}: closing stale transport: {}", self.config.host, e);
            }
        }

        self.state = LoginState::Connecting;
        info!(
            "{}: connecting via {} on port {}",
            self.config.host, self.config.transport, self.config.port
        );

        let transport = match self.connector.connect(&self.config).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!("{}: connect failed: {}", self.config.host, e);
                self.state = LoginState::Disconnected;
                return ActionResult::failed(FailureKind::ConnectFailure, e.to_string());
            }
        };
        self.channel = Some(TransportChannel::with_search_depth(transport, self.search_depth));
        self.state = LoginState::Authenticated;

        if let Err(failure) = self.await_shell().await {
            self.abandon().await;
            return failure;
        }

        if let Err(e) = self.refresh_prompt().await {
            self.abandon().await;
            return ActionResult::failed(failure_kind(&e), e.to_string());
        }

        self.state = LoginState::Ready;
        info!(
            "{}: logged in, prompt {:?} ({} mode)",
            self.config.host,
            self.prompt_text().unwrap_or_default(),
            self.mode
        );
        ActionResult::ok()
    }

    /// Wait for the first shell prompt, catching forced password changes.
    async fn await_shell(&mut self) -> std::result::Result<(), ActionResult> {
        let host = self.config.host.clone();
        let timeout = self.config.timeout;
        let patterns = self.dialect.login_set();

        let outcome = self
            .channel_mut()
            .map_err(|e| ActionResult::failed(FailureKind::ConnectFailure, e.to_string()))?
            .read_until(&patterns, timeout)
            .await;

        match outcome {
            Ok(ReadOutcome::Matched(read)) if read.label == PASSWORD_EXPIRED_LABEL => {
                let err = SessionError::PasswordExpired { host };
                warn!("{}", err);
                Err(ActionResult::failed(FailureKind::PasswordExpired, err.to_string()))
            }
            Ok(ReadOutcome::Matched(_)) => Ok(()),
            Ok(ReadOutcome::TimedOut { partial, .. }) => {
                let err = SessionError::PromptDiscoveryTimeout { host, timeout };
                warn!("{} [{}]", err, String::from_utf8_lossy(&partial));
                Err(ActionResult::failed(
                    FailureKind::PromptDiscoveryTimeout,
                    err.to_string(),
                ))
            }
            Err(e) => {
                warn!("{}: login read failed: {}", host, e);
                Err(ActionResult::failed(channel_failure(&e), e.to_string()))
            }
        }
    }

    /// Close and forget the transport after a failed login.
    async fn abandon(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("{}: close after failed login: {}", self.config.host, e);
            }
        }
        self.prompt = None;
        self.state = LoginState::Disconnected;
    }

    /// Re-discover the prompt and mode, e.g. after switching CLI mode.
    pub async fn discover_prompt(&mut self) -> Result<&str> {
        self.ensure_ready()?;
        if let Err(e) = self.refresh_prompt().await {
            self.note_channel_state();
            return Err(e);
        }
        self.get_prompt()
    }

    async fn refresh_prompt(&mut self) -> Result<()> {
        let host = self.config.host.clone();
        let timeout = self.config.timeout;
        let patterns = self.dialect.base_prompt_set();

        let channel = self.channel_mut()?;
        channel.drain();
        let line_ending = channel.line_ending();
        channel.send(line_ending.as_bytes()).await?;

        let read = match channel.read_until(&patterns, timeout).await? {
            ReadOutcome::Matched(read) => read,
            ReadOutcome::TimedOut { .. } => {
                return Err(SessionError::PromptDiscoveryTimeout { host, timeout }.into());
            }
        };

        let text = prompt_from(&read.consumed);
        let (escaped, pattern) = literal_prompt_pattern(&text).map_err(ChannelError::from)?;
        self.mode = self.dialect.detect_mode(&text);
        debug!("{}: prompt {:?}, {} mode", host, text, self.mode);
        self.prompt = Some(DiscoveredPrompt {
            text,
            escaped,
            pattern,
        });
        Ok(())
    }

    /// Close the transport. Always ends in `LoggedOut`.
    ///
    /// Closing a session that has no open transport reports a
    /// `TransportCloseFailure` but is otherwise harmless.
    pub async fn logout(&mut self) -> ActionResult {
        let result = match self.channel.take() {
            Some(mut channel) if channel.is_open() => match channel.close().await {
                Ok(()) => ActionResult::ok(),
                Err(e) => {
                    warn!("{}: close failed: {}", self.config.host, e);
                    ActionResult::failed(FailureKind::TransportCloseFailure, e.to_string())
                }
            },
            _ => ActionResult::failed(
                FailureKind::TransportCloseFailure,
                format!("{}: transport already closed", self.config.host),
            ),
        };

        if result.status {
            info!("{}: logged out", self.config.host);
        }
        self.prompt = None;
        self.state = LoginState::LoggedOut;
        result
    }

    /// Discard stale output and resynchronise on a fresh prompt.
    pub async fn clean_buffer(&mut self) -> Result<()> {
        self.ensure_ready()?;
        let result = self.resync().await;
        self.note_channel_state();
        result.map_err(Error::from)
    }

    /// Drain, send a bare line terminator, and read to the next base prompt.
    ///
    /// A timeout is logged and tolerated; the following read still has its
    /// own deadline.
    async fn resync(&mut self) -> std::result::Result<(), ChannelError> {
        let host = self.config.host.clone();
        let timeout = self.config.timeout;
        let patterns = self.dialect.base_prompt_set();

        let Some(channel) = self.channel.as_mut() else {
            return Err(ChannelError::Closed);
        };
        let discarded = channel.drain();
        if discarded > 0 {
            trace!("{}: dropped {} stale bytes", host, discarded);
        }
        let line_ending = channel.line_ending();
        channel.send(line_ending.as_bytes()).await?;

        match channel.read_until(&patterns, timeout).await? {
            ReadOutcome::Matched(_) => Ok(()),
            ReadOutcome::TimedOut { partial, .. } => {
                warn!(
                    "{}: no prompt while cleaning buffer after {:?} [{}]",
                    host,
                    timeout,
                    String::from_utf8_lossy(&partial)
                );
                Ok(())
            }
        }
    }

    /// Run `cmd` and return the output between its echo and the prompt.
    ///
    /// Uses the session timeout. The discovered prompt is the only outcome.
    pub async fn execute(&mut self, cmd: &str) -> CommandResult {
        let start = Instant::now();
        let prompt_pattern = match self.ready_prompt() {
            Ok(pattern) => pattern,
            Err(e) => return not_logged_in(cmd, &e, start),
        };
        debug!("{}: execute {:?}", self.config.host, cmd);

        if let Err(e) = self.resync().await {
            let result = self.failure_from_channel(cmd, &e, start);
            self.note_channel_state();
            return result;
        }

        let outcomes = [(PROMPT_LABEL.to_string(), prompt_pattern)];
        let timeout = self.config.timeout;
        let data = line(cmd, self.line_ending());
        self.exchange(cmd, &data, Expect::Prompt, &outcomes, timeout, start)
            .await
    }

    /// Run `cmd` and wait for whichever of `prompts` matches first.
    ///
    /// `prompts` needs at least two entries; their order is match priority.
    /// Returns `Err` only for invalid arguments, in which case nothing is
    /// sent.
    ///
    /// Patterns are tested against the last line of output only. An error
    /// message followed by a fresh prompt therefore matches the prompt, so
    /// look for device errors in `content`.
    ///
    /// ```rust,no_run
    /// use std::time::Duration;
    /// use netforward::{PromptMap, Session};
    ///
    /// # async fn example(session: &mut Session) -> Result<(), netforward::Error> {
    /// let prompts = PromptMap::new()
    ///     .with("confirm", r"\[confirm\]\s*$")
    ///     .with("done", r"(>|#|\$)\s*$");
    /// let result = session
    ///     .command("clear counters", &prompts, Duration::from_secs(30))
    ///     .await?;
    /// if result.is_outcome("confirm") {
    ///     session.reply("y", &prompts, Duration::from_secs(30)).await?;
    /// } else if result.content.contains("Invalid input") {
    ///     eprintln!("rejected: {}", result.content);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn command(
        &mut self,
        cmd: &str,
        prompts: &PromptMap,
        timeout: Duration,
    ) -> Result<CommandResult> {
        let outcomes = validate(cmd, prompts, timeout)?;
        let start = Instant::now();
        if let Err(e) = self.ensure_ready() {
            return Ok(not_logged_in(cmd, &e, start));
        }
        debug!("{}: command {:?}", self.config.host, cmd);

        if let Err(e) = self.resync().await {
            let result = self.failure_from_channel(cmd, &e, start);
            self.note_channel_state();
            return Ok(result);
        }

        let data = line(cmd, self.line_ending());
        Ok(self
            .exchange(cmd, &data, Expect::Outcomes, &outcomes, timeout, start)
            .await)
    }

    /// Answer an interactive question raised by the previous command.
    ///
    /// Like [`command`](Self::command), but only drains stale bytes first and
    /// sends `input` exactly as given, with no line terminator.
    pub async fn reply(
        &mut self,
        input: &str,
        prompts: &PromptMap,
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.reply_inner(input, input, prompts, timeout).await
    }

    /// [`reply`](Self::reply) for secrets: the input is masked in logs and
    /// in the result.
    pub async fn reply_hidden(
        &mut self,
        input: &str,
        prompts: &PromptMap,
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.reply_inner(input, HIDDEN_INPUT, prompts, timeout).await
    }

    async fn reply_inner(
        &mut self,
        input: &str,
        shown: &str,
        prompts: &PromptMap,
        timeout: Duration,
    ) -> Result<CommandResult> {
        let outcomes = validate(input, prompts, timeout)?;
        let start = Instant::now();
        if let Err(e) = self.ensure_ready() {
            return Ok(not_logged_in(shown, &e, start));
        }
        debug!("{}: reply {:?}", self.config.host, shown);

        if let Some(channel) = self.channel.as_mut() {
            channel.drain();
        }
        Ok(self
            .exchange(shown, input.as_bytes(), Expect::Outcomes, &outcomes, timeout, start)
            .await)
    }

    /// Send `data` and read until one of `outcomes` matches.
    async fn exchange(
        &mut self,
        shown: &str,
        data: &[u8],
        expect: Expect,
        outcomes: &[(String, Regex)],
        timeout: Duration,
        start: Instant,
    ) -> CommandResult {
        let mut patterns =
            PatternSet::new().with_pagination(self.dialect.pagination.clone());
        for (label, pattern) in outcomes {
            patterns = patterns.with_outcome(label.clone(), pattern.clone());
        }

        let outcome = match self.channel.as_mut() {
            Some(channel) => match channel.send(data).await {
                Ok(()) => channel.read_until(&patterns, timeout).await,
                Err(e) => Err(e),
            },
            None => Err(ChannelError::Closed),
        };

        let result = match outcome {
            Ok(ReadOutcome::Matched(read)) => self.finish(shown, read, expect, start),
            Ok(ReadOutcome::TimedOut { partial, banners }) => {
                let content = lossy(scrub(&partial, &banners));
                warn!(
                    "{}: {:?} timed out after {:?}",
                    self.config.host, shown, timeout
                );
                CommandResult::failed(
                    shown,
                    FailureKind::ReceiveTimeout,
                    format!("receive timeout after {:?} [{}]", timeout, content),
                    content,
                    start.elapsed(),
                )
            }
            Err(e) => self.failure_from_channel(shown, &e, start),
        };
        self.note_channel_state();
        result
    }

    fn finish(
        &self,
        shown: &str,
        read: MatchedRead,
        expect: Expect,
        start: Instant,
    ) -> CommandResult {
        let text = lossy(read.scrubbed());
        if !read.banners.is_empty() {
            trace!(
                "{}: {} pages collected",
                self.config.host,
                read.banners.len() + 1
            );
        }

        let prompt = match (expect, self.prompt.as_ref()) {
            (Expect::Outcomes, _) => {
                return CommandResult::success(shown, text, read.label, start.elapsed());
            }
            (Expect::Prompt, Some(prompt)) => prompt,
            (Expect::Prompt, None) => {
                return not_logged_in(shown, &Error::from(SessionError::NotLoggedIn), start);
            }
        };

        match extract_between_echo_and_prompt(&text, &prompt.pattern) {
            Ok(content) => CommandResult::success(shown, content, read.label, start.elapsed()),
            Err(e) => {
                warn!("{}: {}", self.config.host, e);
                CommandResult::failed(
                    shown,
                    FailureKind::ExtractionFailure,
                    e.to_string(),
                    text,
                    start.elapsed(),
                )
            }
        }
    }

    /// Build a failed result from a channel error, attaching buffered output.
    fn failure_from_channel(
        &mut self,
        shown: &str,
        err: &ChannelError,
        start: Instant,
    ) -> CommandResult {
        let partial = self
            .channel
            .as_mut()
            .map(|channel| lossy(channel.take_buffer()))
            .unwrap_or_default();
        warn!("{}: {:?} failed: {}", self.config.host, shown, err);
        CommandResult::failed(
            shown,
            channel_failure(err),
            err.to_string(),
            partial,
            start.elapsed(),
        )
    }

    /// Drop to `Disconnected` if the transport went away underneath us.
    fn note_channel_state(&mut self) {
        let open = self.channel.as_ref().is_some_and(TransportChannel::is_open);
        if self.state == LoginState::Ready && !open {
            warn!("{}: transport closed by peer", self.config.host);
            self.channel = None;
            self.prompt = None;
            self.state = LoginState::Disconnected;
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == LoginState::Ready && self.channel.is_some() {
            Ok(())
        } else {
            Err(SessionError::NotLoggedIn.into())
        }
    }

    fn ready_prompt(&self) -> Result<Regex> {
        self.ensure_ready()?;
        self.prompt
            .as_ref()
            .map(|p| p.pattern.clone())
            .ok_or_else(|| SessionError::NotLoggedIn.into())
    }

    fn channel_mut(&mut self) -> Result<&mut TransportChannel> {
        self.channel
            .as_mut()
            .ok_or_else(|| ChannelError::Closed.into())
    }

    fn line_ending(&self) -> &'static str {
        self.channel
            .as_ref()
            .map_or("\r", TransportChannel::line_ending)
    }

    /// Log in, run `f`, and log out whatever `f` did.
    ///
    /// ```rust,no_run
    /// use netforward::SessionBuilder;
    ///
    /// # async fn example() -> Result<(), netforward::Error> {
    /// let session = SessionBuilder::new("10.0.0.1")
    ///     .username("admin")
    ///     .password("secret")
    ///     .build()?;
    /// let version = session
    ///     .scoped(async |s| s.execute("show version").await.content)
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scoped<F, T>(mut self, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Session) -> T,
    {
        let login = self.login().await;
        if !login.status {
            return Err(SessionError::LoginFailed {
                host: self.config.host.clone(),
                reason: login.error_log,
            }
            .into());
        }

        let value = f(&mut self).await;

        let logout = self.logout().await;
        if !logout.status {
            warn!("{}: {}", self.config.host, logout.error_log);
        }
        Ok(value)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == LoginState::Ready {
            warn!(
                "{}: session dropped while logged in; transport released without logout",
                self.config.host
            );
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("transport", &self.config.transport)
            .field("dialect", &self.dialect.name)
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("prompt", &self.prompt.as_ref().map(|p| p.text.as_str()))
            .finish()
    }
}

fn not_logged_in(shown: &str, err: &Error, start: Instant) -> CommandResult {
    CommandResult::failed(
        shown,
        FailureKind::NotLoggedIn,
        err.to_string(),
        "",
        start.elapsed(),
    )
}

/// Check `command`/`reply` arguments and compile the prompt map.
fn validate(cmd: &str, prompts: &PromptMap, timeout: Duration) -> Result<Vec<(String, Regex)>> {
    let invalid = |message: String| Error::from(SessionError::InvalidParameters { message });

    if cmd.is_empty() {
        return Err(invalid("command must not be empty".to_string()));
    }
    if prompts.len() < 2 {
        return Err(invalid(format!(
            "prompt map needs at least two entries, got {}, e.g. {{\"success\": ..., \"error\": ...}}",
            prompts.len()
        )));
    }
    if timeout.is_zero() {
        return Err(invalid("timeout must be positive".to_string()));
    }
    prompts
        .compile()
        .map_err(|e| invalid(format!("invalid prompt pattern: {}", e)))
}

fn line(cmd: &str, line_ending: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(cmd.len() + line_ending.len());
    data.extend_from_slice(cmd.as_bytes());
    data.extend_from_slice(line_ending.as_bytes());
    data
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// The visible prompt on the last line of `output`.
fn prompt_from(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let last_line = text.rsplit('\n').next().unwrap_or_default().trim_end();
    let visible = last_line.rsplit('\r').next().unwrap_or_default();
    visible.to_string()
}

/// Text after the echoed command line and before the trailing prompt line.
fn extract_between_echo_and_prompt(
    text: &str,
    prompt: &Regex,
) -> std::result::Result<String, SessionError> {
    let not_found = |message: &str| SessionError::PromptNotFound {
        message: message.to_string(),
    };

    let echo_end = text
        .find(['\r', '\n'])
        .ok_or_else(|| not_found("no line break after the command echo"))?;
    let body_start = text[echo_end..]
        .find(|c| c != '\r' && c != '\n')
        .map_or(text.len(), |i| echo_end + i);

    let prompt_start = text.rfind('\n').map_or(0, |i| i + 1);
    if !prompt.is_match(text[prompt_start..].as_bytes()) {
        return Err(not_found("last line is not the session prompt"));
    }
    if prompt_start < body_start {
        // Echo line break is the same one that precedes the prompt.
        return Ok(String::new());
    }

    Ok(text[body_start..prompt_start]
        .trim_matches(['\r', '\n'])
        .to_string())
}

fn channel_failure(err: &ChannelError) -> FailureKind {
    match err {
        ChannelError::SendFailed(_) | ChannelError::Closed => FailureKind::SendFailure,
        ChannelError::ReceiveFailed(_) => FailureKind::ConnectionLost,
        ChannelError::InvalidPattern(_) => FailureKind::ExtractionFailure,
    }
}

fn failure_kind(err: &Error) -> FailureKind {
    match err {
        Error::Session(SessionError::PromptDiscoveryTimeout { .. }) => {
            FailureKind::PromptDiscoveryTimeout
        }
        Error::Session(SessionError::PasswordExpired { .. }) => FailureKind::PasswordExpired,
        Error::Session(SessionError::NotLoggedIn) => FailureKind::NotLoggedIn,
        Error::Channel(e) => channel_failure(e),
        Error::Transport(_) => FailureKind::ConnectFailure,
        _ => FailureKind::ExtractionFailure,
    }
}
