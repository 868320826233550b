//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::transport::{Connector, SessionConfig, Transport, TransportKind};

/// Observes a [`MockTransport`] after it has been moved into a session.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockHandle {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
}

impl MockHandle {
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Writes that equal `data`.
    pub(crate) fn count_of(&self, data: &[u8]) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.as_slice() == data)
            .count()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Replays device output.
///
/// Output queued with [`output`](Self::output) is available immediately.
/// Output registered with [`on_write`](Self::on_write) is queued when the
/// matching input is written; each reaction fires once, in registration
/// order. With nothing queued, `read` waits forever, which lets paused-clock
/// tests drive timeouts.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    pending: VecDeque<Bytes>,
    reactions: Vec<(Vec<u8>, Vec<Bytes>)>,
    handle: MockHandle,
    eof: bool,
    fail_close: bool,
    fail_write_on: Option<Vec<u8>>,
    line_ending: Option<&'static str>,
    pager_key: Option<&'static [u8]>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn output(mut self, data: &[u8]) -> Self {
        self.pending.push_back(Bytes::copy_from_slice(data));
        self
    }

    pub(crate) fn on_write(mut self, trigger: &[u8], chunks: &[&[u8]]) -> Self {
        let chunks = chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect();
        self.reactions.push((trigger.to_vec(), chunks));
        self
    }

    /// Report end-of-stream once the queue is empty.
    pub(crate) fn eof_when_empty(mut self) -> Self {
        self.eof = true;
        self
    }

    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Fail the write of exactly `trigger` with a broken pipe.
    pub(crate) fn failing_write(mut self, trigger: &[u8]) -> Self {
        self.fail_write_on = Some(trigger.to_vec());
        self
    }

    pub(crate) fn with_pager_key(mut self, key: &'static [u8]) -> Self {
        self.pager_key = Some(key);
        self
    }

    pub(crate) fn with_line_ending(mut self, ending: &'static str) -> Self {
        self.line_ending = Some(ending);
        self
    }

    pub(crate) fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.handle.writes.lock().unwrap().push(data.to_vec());
        if self.fail_write_on.as_deref() == Some(data) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        if let Some(pos) = self.reactions.iter().position(|(t, _)| t == data) {
            let (_, chunks) = self.reactions.remove(pos);
            self.pending.extend(chunks);
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Bytes>, TransportError> {
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }
        if self.eof {
            return Ok(None);
        }
        std::future::pending().await
    }

    fn drain(&mut self) -> Vec<u8> {
        self.pending.drain(..).flatten().collect()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.handle.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    fn line_ending(&self) -> &'static str {
        self.line_ending.unwrap_or("\r")
    }

    fn pager_key(&self) -> &'static [u8] {
        self.pager_key.unwrap_or(b" ")
    }
}

/// Hands out one prepared [`MockTransport`]; later connects fail.
#[derive(Debug, Default)]
pub(crate) struct MockConnector {
    transport: Mutex<Option<MockTransport>>,
}

impl MockConnector {
    pub(crate) fn new(transport: MockTransport) -> Arc<Self> {
        Arc::new(Self {
            transport: Mutex::new(Some(transport)),
        })
    }

    pub(crate) fn refusing() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn Transport>, TransportError> {
        match self.transport.lock().unwrap().take() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(TransportError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            }),
        }
    }
}
