//! Channel layer: the pagination-aware receive loop.
//!
//! [`TransportChannel`] wraps a [`Transport`] with a [`PatternBuffer`] and
//! reads until one of a [`PatternSet`]'s outcome patterns matches the last
//! line of output. Pagination banners encountered on the way are answered
//! with the transport's pager key and recorded so [`scrub`] can remove them
//! once the read completes.

mod buffer;
#[cfg(test)]
pub(crate) mod mock;
mod patterns;
mod scrub;

use std::ops::Range;
use std::time::Duration;

use log::{debug, trace};

use crate::error::{ChannelError, TransportError};
use crate::transport::{Transport, TransportKind, deadline_after};

pub use buffer::PatternBuffer;
pub use patterns::{PatternSet, PromptMap, literal_prompt_pattern};
pub use scrub::scrub;

/// Default number of trailing bytes searched for patterns.
pub const DEFAULT_SEARCH_DEPTH: usize = 1000;

/// A successful [`TransportChannel::read_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRead {
    /// Index of the matched outcome in the pattern set.
    pub index: usize,

    /// Label of the matched outcome.
    pub label: String,

    /// Output up to and including the match.
    pub consumed: Vec<u8>,

    /// Output after the match. It is also left in the channel buffer.
    pub remainder: Vec<u8>,

    /// Pagination banners answered during the read, in order seen.
    pub banners: Vec<Vec<u8>>,
}

impl MatchedRead {
    /// `consumed` with pagination debris removed.
    pub fn scrubbed(&self) -> Vec<u8> {
        scrub(&self.consumed, &self.banners)
    }
}

/// How a read ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// An outcome pattern matched.
    Matched(MatchedRead),

    /// The deadline passed first. Everything read so far is attached.
    TimedOut {
        /// Accumulated output.
        partial: Vec<u8>,

        /// Banners answered before the deadline.
        banners: Vec<Vec<u8>>,
    },
}

/// Owns a transport and drives pattern-based reads over it.
pub struct TransportChannel {
    transport: Box<dyn Transport>,

    /// Pattern buffer for accumulating output.
    buffer: PatternBuffer,

    /// Whether the channel is open.
    is_open: bool,
}

impl TransportChannel {
    /// Wrap a connected transport.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_search_depth(transport, DEFAULT_SEARCH_DEPTH)
    }

    /// Wrap a connected transport with a custom search depth.
    pub fn with_search_depth(transport: Box<dyn Transport>, search_depth: usize) -> Self {
        Self {
            transport,
            buffer: PatternBuffer::new(search_depth),
            is_open: true,
        }
    }

    /// Check if the channel is open.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Which transport variant is underneath.
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Line terminator for this transport.
    pub fn line_ending(&self) -> &'static str {
        self.transport.line_ending()
    }

    /// Write raw bytes.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        if !self.is_open {
            return Err(ChannelError::Closed);
        }
        self.transport
            .write(data)
            .await
            .map_err(ChannelError::SendFailed)
    }

    /// Write `line` followed by the transport's line terminator, as one write.
    pub async fn send_line(&mut self, line: &str) -> Result<(), ChannelError> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(self.transport.line_ending().as_bytes());
        self.send(&data).await
    }

    /// Discard buffered output, both ours and the transport's.
    ///
    /// Returns how many bytes were thrown away.
    pub fn drain(&mut self) -> usize {
        if !self.is_open {
            return 0;
        }
        let stale = self.transport.drain();
        let discarded = self.buffer.len() + stale.len();
        self.buffer.clear();
        if discarded > 0 {
            trace!("channel: discarded {} stale bytes", discarded);
        }
        discarded
    }

    /// Take whatever is currently buffered.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        self.buffer.take()
    }

    /// Read until an outcome in `patterns` matches the last line, or
    /// `timeout` elapses.
    ///
    /// Each new pagination banner is answered with exactly one pager
    /// keystroke. Banner matches are checked before outcomes, and outcomes
    /// are checked in declaration order. On error the accumulated output
    /// stays buffered; see [`take_buffer`](Self::take_buffer).
    pub async fn read_until(
        &mut self,
        patterns: &PatternSet,
        timeout: Duration,
    ) -> Result<ReadOutcome, ChannelError> {
        if !self.is_open {
            return Err(ChannelError::Closed);
        }

        let deadline = deadline_after(timeout);
        let mut banners: Vec<Vec<u8>> = Vec::new();
        // Banners ending at or before this offset have been answered.
        let mut pager_mark = 0usize;
        let mut answered: Option<Range<usize>> = None;

        loop {
            let chunk = match tokio::time::timeout_at(deadline, self.transport.read()).await {
                Err(_) => {
                    debug!(
                        "channel: no match within {:?} ({} bytes read)",
                        timeout,
                        self.buffer.len()
                    );
                    return Ok(ReadOutcome::TimedOut {
                        partial: self.buffer.take(),
                        banners,
                    });
                }
                Ok(Err(e)) => return Err(ChannelError::ReceiveFailed(e)),
                Ok(Ok(None)) => {
                    self.is_open = false;
                    return Err(ChannelError::ReceiveFailed(TransportError::Disconnected));
                }
                Ok(Ok(Some(chunk))) => chunk,
            };

            trace!("channel: read {} bytes", chunk.len());
            self.buffer.extend(&chunk);

            if let Some(last) = answered.as_mut() {
                let end = banner_tail(self.buffer.as_slice(), last.clone());
                if end > last.end {
                    last.end = end;
                    pager_mark = pager_mark.max(end);
                    if let Some(banner) = banners.last_mut() {
                        *banner = self.buffer.as_slice()[last.clone()].to_vec();
                    }
                }
            }

            if let Some(pagination) = patterns.pagination() {
                let fresh = self
                    .buffer
                    .find_all_in_last_line(pagination)
                    .into_iter()
                    .find(|m| m.start >= pager_mark);

                if let Some(range) = fresh {
                    let banner = self.buffer.as_slice()[range.clone()].to_vec();
                    debug!(
                        "channel: pagination banner {:?}, advancing",
                        String::from_utf8_lossy(&banner)
                    );
                    pager_mark = range.end;
                    answered = Some(range);
                    banners.push(banner);
                    let key = self.transport.pager_key();
                    self.send(key).await?;
                    continue;
                }
            }

            for (index, (label, pattern)) in patterns.outcomes().iter().enumerate() {
                if let Some(range) = self.buffer.find_in_last_line(pattern) {
                    trace!("channel: matched outcome {:?}", label);
                    let consumed = self.buffer.split_to(range.end);
                    let remainder = self.buffer.as_slice().to_vec();
                    return Ok(ReadOutcome::Matched(MatchedRead {
                        index,
                        label: label.clone(),
                        consumed,
                        remainder,
                        banners,
                    }));
                }
            }
        }
    }

    /// Close the transport. Later sends and reads fail with
    /// [`ChannelError::Closed`].
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        self.buffer.clear();
        self.transport.close().await
    }
}

/// End of an answered banner, extended over closing dashes (and the `>` of
/// a `<--- More --->` style banner) that arrived in a later chunk.
fn banner_tail(buf: &[u8], banner: Range<usize>) -> usize {
    let mut end = banner.end;
    if end == 0 || buf.get(end - 1) != Some(&b'-') {
        return end;
    }
    while buf.get(end) == Some(&b'-') {
        end += 1;
    }
    if buf.get(banner.start) == Some(&b'<') {
        let close = end + buf[end..].iter().take_while(|&&b| b == b' ').count();
        if buf.get(close) == Some(&b'>') {
            end = close + 1;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use regex::bytes::Regex;

    use super::mock::MockTransport;
    use super::*;

    fn more() -> Regex {
        Regex::new(r"(< *)?(-)+( |\()?[Mm]ore.*(\)| )?(-)+( *>)?|\(Q to quit\)").unwrap()
    }

    fn prompt_set() -> PatternSet {
        PatternSet::new()
            .with_pagination(more())
            .with_outcome("success", Regex::new(r"device#\s*$").unwrap())
    }

    #[tokio::test]
    async fn test_match_splits_buffer() {
        let mock = MockTransport::new().output(b"hello\r\ndevice# ");
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel
            .read_until(&prompt_set(), Duration::from_secs(5))
            .await
            .unwrap();

        let ReadOutcome::Matched(read) = outcome else {
            panic!("expected match");
        };
        assert_eq!(read.index, 0);
        assert_eq!(read.label, "success");
        assert_eq!(read.consumed, b"hello\r\ndevice# ");
        assert!(read.remainder.is_empty());
        assert!(read.banners.is_empty());
    }

    #[tokio::test]
    async fn test_prompt_split_across_reads() {
        let mock = MockTransport::new()
            .output(b"output\r\ndev")
            .output(b"ice#");
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel
            .read_until(&prompt_set(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(outcome, ReadOutcome::Matched(ref r) if r.consumed == b"output\r\ndevice#"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_pends_without_prompt() {
        let mock = MockTransport::new().output(b"Building configuration...\r\n");
        let mut channel = TransportChannel::new(Box::new(mock));
        let patterns = prompt_set();

        let mut read = tokio_test::task::spawn(channel.read_until(&patterns, Duration::from_secs(5)));
        tokio_test::assert_pending!(read.poll());
        tokio_test::assert_pending!(read.poll());
    }

    #[tokio::test]
    async fn test_pager_advanced_once_per_banner() {
        let mock = MockTransport::new()
            .output(b"page one\r\n --More-- ")
            .on_write(b" ", &[b"\r          \rpage two\r\n", b" --More-- "])
            .on_write(b" ", &[b"\r          \rpage three\r\ndevice#"]);
        let handle = mock.handle();
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel
            .read_until(&prompt_set(), Duration::from_secs(5))
            .await
            .unwrap();

        let ReadOutcome::Matched(read) = outcome else {
            panic!("expected match");
        };
        assert_eq!(handle.count_of(b" "), 2);
        assert_eq!(read.banners.len(), 2);
        assert_eq!(
            String::from_utf8(read.scrubbed()).unwrap(),
            "page one\r\npage two\r\npage three\r\ndevice#"
        );
    }

    #[tokio::test]
    async fn test_banner_split_across_chunks() {
        let mut erase = b"-".to_vec();
        erase.extend([0x08; 8]);
        erase.extend([b' '; 8]);
        erase.extend([0x08; 8]);
        let mock = MockTransport::new()
            .output(b"line one\r\n--More-")
            .on_write(b" ", &[&erase, b"line two\r\ndevice#"]);
        let handle = mock.handle();
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel
            .read_until(&prompt_set(), Duration::from_secs(5))
            .await
            .unwrap();

        let ReadOutcome::Matched(read) = outcome else {
            panic!("expected match");
        };
        assert_eq!(handle.count_of(b" "), 1);
        assert_eq!(read.banners, vec![b"--More--".to_vec()]);
        assert_eq!(
            String::from_utf8(read.scrubbed()).unwrap(),
            "line one\r\nline two\r\ndevice#"
        );
    }

    #[test]
    fn test_banner_tail() {
        assert_eq!(banner_tail(b"--More--", 0..7), 8);
        assert_eq!(banner_tail(b"--More--\x08\x08", 0..8), 8);
        assert_eq!(banner_tail(b"<--- More --- >", 0..13), 15);
        assert_eq!(banner_tail(b"(Q to quit)-", 0..11), 11);
    }

    #[tokio::test]
    async fn test_pager_key_comes_from_transport() {
        let mock = MockTransport::new()
            .with_pager_key(b"\r")
            .output(b"x\r\n--More--")
            .on_write(b"\r", &[b"\r        \rdone\r\ndevice#"]);
        let handle = mock.handle();
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel
            .read_until(&prompt_set(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(matches!(outcome, ReadOutcome::Matched(_)));
        assert_eq!(handle.count_of(b"\r"), 1);
        assert_eq!(handle.count_of(b" "), 0);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_overflow() {
        let mock = MockTransport::new().output(b"ok\r\ndevice#");
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel.read_until(&prompt_set(), Duration::MAX).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Matched(_)));
    }

    #[tokio::test]
    async fn test_banner_not_reanswered_when_line_grows() {
        // The redraw arrives on the same line as the banner it erases.
        let mock = MockTransport::new()
            .output(b"a\r\n--More--")
            .on_write(b" ", &[b"\r        \r", b"tail", b"\r\ndevice#"]);
        let handle = mock.handle();
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel
            .read_until(&prompt_set(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(matches!(outcome, ReadOutcome::Matched(_)));
        assert_eq!(handle.count_of(b" "), 1);
    }

    #[tokio::test]
    async fn test_first_declared_outcome_wins() {
        let set = PatternSet::new()
            .with_outcome("specific", Regex::new(r"\[y/n\]#\s*$").unwrap())
            .with_outcome("generic", Regex::new(r"#\s*$").unwrap());
        let mock = MockTransport::new().output(b"Proceed? [y/n]#");
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel.read_until(&set, Duration::from_secs(5)).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Matched(ref r) if r.label == "specific" && r.index == 0));

        let reversed = PatternSet::new()
            .with_outcome("generic", Regex::new(r"#\s*$").unwrap())
            .with_outcome("specific", Regex::new(r"\[y/n\]#\s*$").unwrap());
        let mock = MockTransport::new().output(b"Proceed? [y/n]#");
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel.read_until(&reversed, Duration::from_secs(5)).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Matched(ref r) if r.label == "generic"));
    }

    #[tokio::test]
    async fn test_only_last_line_is_tested() {
        let mock = MockTransport::new()
            .output(b"device# was here\r\n")
            .output(b"more output\r\ndevice#");
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel
            .read_until(&prompt_set(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(outcome, ReadOutcome::Matched(ref r) if r.consumed.ends_with(b"more output\r\ndevice#")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_partial() {
        let mock = MockTransport::new().output(b"partial output\r\nstill going");
        let mut channel = TransportChannel::new(Box::new(mock));

        let outcome = channel
            .read_until(&prompt_set(), Duration::from_secs(3))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReadOutcome::TimedOut {
                partial: b"partial output\r\nstill going".to_vec(),
                banners: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn test_eof_is_receive_failure() {
        let mock = MockTransport::new().output(b"bye\r\n").eof_when_empty();
        let mut channel = TransportChannel::new(Box::new(mock));

        let err = channel
            .read_until(&prompt_set(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ReceiveFailed(TransportError::Disconnected)));
        assert!(!channel.is_open());
        assert_eq!(channel.take_buffer(), b"bye\r\n");
    }

    #[tokio::test]
    async fn test_closed_channel_fails_fast() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let mut channel = TransportChannel::new(Box::new(mock));

        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert_eq!(handle.close_count(), 1);

        assert!(matches!(channel.send(b"x").await, Err(ChannelError::Closed)));
        assert!(matches!(
            channel.read_until(&prompt_set(), Duration::from_secs(1)).await,
            Err(ChannelError::Closed)
        ));
        assert_eq!(handle.write_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_discards_stale_output() {
        let mock = MockTransport::new().output(b"old output\r\ndevice#");
        let mut channel = TransportChannel::new(Box::new(mock));

        assert_eq!(channel.drain(), 19);
        assert!(channel.take_buffer().is_empty());
    }

    #[tokio::test]
    async fn test_send_line_is_single_write() {
        let mock = MockTransport::new().with_line_ending("\r\n");
        let handle = mock.handle();
        let mut channel = TransportChannel::new(Box::new(mock));

        channel.send_line("show clock").await.unwrap();
        assert_eq!(handle.writes(), vec![b"show clock\r\n".to_vec()]);
    }
}
