//! Command Channel
//!
//! Request/response exchange with an ELM327 adapter. One command is in flight
//! at a time: the command is written with a carriage return and bytes are read
//! until the `>` prompt or the timeout elapses. Every exchange is published to
//! a raw trace stream for diagnostics.

use crate::error::ObdError;
use crate::protocol::ObdProtocol;
use crate::sample::now_ms;
use crate::transport::{self, BoxedStream, TransportConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// Default timeout for general commands
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Timeout for data requests inside a polling cycle
pub const POLL_TIMEOUT_MS: u64 = 100;

/// Capacity of the raw trace broadcast
pub const TRACE_CAPACITY: usize = 256;

/// One command/response exchange as seen on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTrace {
    pub command: String,
    /// Raw text preceding the prompt
    pub response: Option<String>,
    pub error: Option<String>,
    pub timestamp_ms: u64,
}

/// Channel handle shared between the poll loop and on-demand requests.
/// The async mutex serializes access, so requests are queued in FIFO order.
pub type SharedChannel = Arc<Mutex<CommandChannel>>;

/// Serialized command/response link to one adapter
pub struct CommandChannel {
    stream: Option<BoxedStream>,
    timeout: Duration,
    protocol: ObdProtocol,
    trace_tx: broadcast::Sender<RawTrace>,
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("open", &self.stream.is_some())
            .field("timeout", &self.timeout)
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl CommandChannel {
    /// Wrap an open stream
    pub fn new(stream: BoxedStream) -> Self {
        let (trace_tx, _) = broadcast::channel(TRACE_CAPACITY);
        Self {
            stream: Some(stream),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            protocol: ObdProtocol::Auto,
            trace_tx,
        }
    }

    /// Publish traces on an existing broadcast sender
    pub fn with_trace_sender(mut self, trace_tx: broadcast::Sender<RawTrace>) -> Self {
        self.trace_tx = trace_tx;
        self
    }

    /// Protocol selected during [`initialize`](Self::initialize)
    pub fn with_protocol(mut self, protocol: ObdProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Subscribe to the raw trace stream
    pub fn subscribe_trace(&self) -> broadcast::Receiver<RawTrace> {
        self.trace_tx.subscribe()
    }

    /// Default command timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn protocol(&self) -> ObdProtocol {
        self.protocol
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Send a command using the default timeout
    pub async fn send(&mut self, command: &str) -> Result<String, ObdError> {
        let timeout = self.timeout;
        self.send_with_timeout(command, timeout).await
    }

    /// Send a command and wait for the prompt.
    ///
    /// A timeout leaves the channel usable; a transport failure does not.
    pub async fn send_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ObdError> {
        let result = self.exchange(command, timeout).await;

        let trace = match &result {
            Ok(response) => RawTrace {
                command: command.to_string(),
                response: Some(response.clone()),
                error: None,
                timestamp_ms: now_ms(),
            },
            Err(err) => RawTrace {
                command: command.to_string(),
                response: None,
                error: Some(err.to_string()),
                timestamp_ms: now_ms(),
            },
        };
        // No subscribers is fine
        let _ = self.trace_tx.send(trace);

        if let Err(err) = &result {
            if err.is_fatal() {
                warn!("Transport failure on {}: {}", command, err);
                self.stream = None;
            }
        }
        result
    }

    async fn exchange(&mut self, command: &str, timeout: Duration) -> Result<String, ObdError> {
        let stream = self.stream.as_mut().ok_or(ObdError::NotConnected)?;

        debug!("Sending to adapter: {:?}", command);
        // Write and read share one deadline; a stalled port must not block the caller
        let round_trip = async {
            stream.write_all(format!("{}\r", command).as_bytes()).await?;
            stream.flush().await?;

            let mut response = Vec::new();
            let mut buffer = [0u8; 64];
            loop {
                let n = stream.read(&mut buffer).await?;
                if n == 0 {
                    return Err(ObdError::Transport("adapter closed the connection".to_string()));
                }
                response.extend_from_slice(&buffer[..n]);
                if let Some(end) = response.iter().position(|b| *b == b'>') {
                    return Ok(String::from_utf8_lossy(&response[..end]).into_owned());
                }
            }
        };

        match tokio::time::timeout(timeout, round_trip).await {
            Ok(result) => {
                let response = result?;
                debug!("Adapter response: {:?}", response);
                Ok(response)
            }
            Err(_) => Err(ObdError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Run the startup sequence (reset, echo off, linefeeds off, headers on,
    /// protocol select). Any failure aborts the sequence.
    pub async fn initialize(&mut self) -> Result<(), ObdError> {
        info!("Initializing adapter with protocol {:?}", self.protocol);
        for command in self.protocol.init_sequence() {
            let response = self.send(command).await.map_err(|err| ObdError::InitializationFailed {
                command: command.to_string(),
                reason: err.to_string(),
            })?;

            let text = response.to_ascii_uppercase();
            let rejected = text.contains('?') || text.contains("ERROR");
            // Reset answers with a version banner rather than OK
            let acknowledged = command == "ATZ" || text.contains("OK");
            if rejected || !acknowledged {
                return Err(ObdError::InitializationFailed {
                    command: command.to_string(),
                    reason: format!("unexpected response {:?}", response.trim()),
                });
            }
        }
        info!("Adapter initialized");
        Ok(())
    }

    /// Drop the stream; later sends fail with `NotConnected`
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            info!("Adapter channel closed");
        }
    }

    /// Move into a shared handle
    pub fn shared(self) -> SharedChannel {
        Arc::new(Mutex::new(self))
    }
}

/// Open the transport and initialize the adapter
pub async fn connect(
    config: &TransportConfig,
    protocol: ObdProtocol,
    trace_tx: broadcast::Sender<RawTrace>,
) -> Result<CommandChannel, ObdError> {
    let stream = transport::open(config)?;
    initialize_stream(stream, protocol, trace_tx).await
}

/// Initialize an adapter over an already open stream. The stream is shut
/// down before an initialization error is returned.
pub async fn initialize_stream(
    stream: BoxedStream,
    protocol: ObdProtocol,
    trace_tx: broadcast::Sender<RawTrace>,
) -> Result<CommandChannel, ObdError> {
    let mut channel = CommandChannel::new(stream)
        .with_trace_sender(trace_tx)
        .with_protocol(protocol);

    if let Err(err) = channel.initialize().await {
        error!("Adapter initialization failed: {}", err);
        channel.close().await;
        return Err(err);
    }
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAdapter, MockReply};

    fn channel(adapter: MockAdapter) -> CommandChannel {
        CommandChannel::new(Box::new(adapter.spawn()))
    }

    #[tokio::test]
    async fn test_initialize_sends_startup_sequence() {
        let adapter = MockAdapter::new();
        let log = adapter.command_log();
        let mut channel = channel(adapter);

        channel.initialize().await.unwrap();
        assert_eq!(log.commands(), vec!["ATZ", "ATE0", "ATL0", "ATH1", "ATSP0"]);
    }

    #[tokio::test]
    async fn test_initialize_fails_on_rejected_command() {
        let adapter = MockAdapter::new().reply("ATH1", "?");
        let mut channel = channel(adapter);

        let err = channel.initialize().await.unwrap_err();
        assert!(matches!(err, ObdError::InitializationFailed { ref command, .. } if command == "ATH1"));
    }

    #[tokio::test]
    async fn test_send_returns_text_without_prompt() {
        let adapter = MockAdapter::new().reply("010C", "41 0C 1A F8");
        let mut channel = channel(adapter);
        channel.initialize().await.unwrap();

        let response = channel.send("010C").await.unwrap();
        assert!(response.contains("41 0C 1A F8"));
        assert!(!response.contains('>'));
    }

    #[tokio::test]
    async fn test_timeout_keeps_channel_open() {
        let adapter = MockAdapter::new().behave("010D", MockReply::Silent);
        let mut channel = channel(adapter);

        let err = channel
            .send_with_timeout("010D", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ObdError::Timeout(20)));
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_hangup_is_fatal() {
        let adapter = MockAdapter::new().behave("010C", MockReply::Hangup);
        let mut channel = channel(adapter);

        let err = channel.send("010C").await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!channel.is_open());
        assert!(matches!(channel.send("010C").await, Err(ObdError::NotConnected)));
    }

    #[tokio::test]
    async fn test_every_exchange_is_traced() {
        let adapter = MockAdapter::new().behave("010D", MockReply::Silent);
        let mut channel = channel(adapter);
        let mut trace = channel.subscribe_trace();

        channel.send("ATZ").await.unwrap();
        let _ = channel.send_with_timeout("010D", Duration::from_millis(10)).await;

        let first = trace.recv().await.unwrap();
        assert_eq!(first.command, "ATZ");
        assert!(first.response.unwrap().contains("ELM327"));
        let second = trace.recv().await.unwrap();
        assert_eq!(second.command, "010D");
        assert!(second.error.is_some());
    }

    #[tokio::test]
    async fn test_rejected_init_shuts_the_stream() {
        let adapter = MockAdapter::new().reply("ATH1", "?");
        let log = adapter.command_log();
        let (trace_tx, _) = broadcast::channel(TRACE_CAPACITY);

        let result = initialize_stream(Box::new(adapter.spawn()), ObdProtocol::Auto, trace_tx).await;
        assert!(matches!(result, Err(ObdError::InitializationFailed { .. })));

        tokio::time::timeout(Duration::from_secs(1), log.closed()).await.unwrap();
        assert_eq!(log.commands().last().map(String::as_str), Some("ATH1"));
    }

    #[tokio::test]
    async fn test_connect_to_emulator() {
        let (trace_tx, _) = broadcast::channel(TRACE_CAPACITY);
        let channel = connect(&TransportConfig::Mock, ObdProtocol::Auto, trace_tx)
            .await
            .unwrap();
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_stalled_write_times_out() {
        // Nobody drains the other end, so the write fills the pipe and waits
        let (client, _server) = tokio::io::duplex(1);
        let mut channel = CommandChannel::new(Box::new(client));

        let err = tokio::time::timeout(
            Duration::from_secs(1),
            channel.send_with_timeout("010C", Duration::from_millis(20)),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, ObdError::Timeout(20)));
    }

    #[tokio::test]
    async fn test_closed_channel_is_not_connected() {
        let mut channel = channel(MockAdapter::new());
        channel.close().await;
        assert!(matches!(channel.send("ATZ").await, Err(ObdError::NotConnected)));
    }
}
