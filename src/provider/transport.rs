//! Transports that carry provider messages.
//!
//! A transport hands back a pair of channels on connect: a stream of decoded
//! incoming messages and a sink for outgoing ones. The wire format is
//! newline-delimited JSON over a child process's stdio, or JSON text frames
//! over a WebSocket. Background tasks own the raw I/O; the channels insulate
//! the client from it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::error::ProviderError;
use super::types::RpcMessage;

/// Stream of decoded messages arriving from the provider.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<RpcMessage, ProviderError>> + Send>>;

/// Sink accepting messages bound for the provider.
pub type MessageSink = Pin<Box<dyn Sink<RpcMessage, Error = ProviderError> + Send>>;

/// The connected channel pair a transport produces.
pub struct TransportChannels {
    pub incoming: MessageStream,
    pub outgoing: MessageSink,
}

impl std::fmt::Debug for TransportChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannels").finish_non_exhaustive()
    }
}

/// Connection lifecycle for one provider endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection and hand back its channels.
    async fn connect(&mut self) -> Result<TransportChannels, ProviderError>;

    /// Tear the connection down.
    async fn disconnect(&mut self) -> Result<(), ProviderError>;

    /// Whether `connect` has succeeded and `disconnect` has not run since.
    fn is_connected(&self) -> bool;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

/// Configuration for a stdio child-process transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdioConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Transport that spawns a child process and speaks newline-delimited JSON
/// over its stdin/stdout. The child's stderr is discarded.
pub struct StdioTransport {
    config: StdioConfig,
    child: Option<Child>,
    connected: bool,
}

impl StdioTransport {
    pub fn new(config: StdioConfig) -> Self {
        Self {
            config,
            child: None,
            connected: false,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&mut self) -> Result<TransportChannels, ProviderError> {
        if self.connected {
            return Err(ProviderError::transport("transport already connected"));
        }

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            command.env(key, value);
        }
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            ProviderError::transport(format!("failed to spawn '{}': {e}", self.config.command))
        })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::transport("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::transport("child stdout unavailable"))?;

        let (read_tx, (write_tx, mut writer_rx), channels) = channel_pair();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<RpcMessage>(line) {
                            Ok(message) => {
                                if read_tx.send(Ok(message)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "skipping undecodable provider line");
                            }
                        }
                    }
                    Ok(None) => {
                        debug!("provider stdout closed");
                        break;
                    }
                    Err(e) => {
                        let _ = read_tx
                            .send(Err(ProviderError::transport(format!("read failed: {e}"))));
                        break;
                    }
                }
            }
        });

        drop(write_tx);
        tokio::spawn(async move {
            while let Some(message) = writer_rx.recv().await {
                let mut line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "dropping unencodable outgoing message");
                        continue;
                    }
                };
                line.push('\n');
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        self.child = Some(child);
        self.connected = true;
        Ok(channels)
    }

    async fn disconnect(&mut self) -> Result<(), ProviderError> {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn endpoint(&self) -> String {
        if self.config.args.is_empty() {
            self.config.command.clone()
        } else {
            format!("{} {}", self.config.command, self.config.args.join(" "))
        }
    }
}

/// Transport that connects to a WebSocket endpoint and speaks JSON text
/// frames.
pub struct WebSocketTransport {
    url: String,
    connected: bool,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connected: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<TransportChannels, ProviderError> {
        if self.connected {
            return Err(ProviderError::transport("transport already connected"));
        }

        let url = Url::parse(&self.url).map_err(|e| {
            ProviderError::transport(format!("invalid websocket url '{}': {e}", self.url))
        })?;
        let (socket, _) = connect_async(url.as_str()).await.map_err(|e| {
            ProviderError::transport(format!("websocket connect to '{}' failed: {e}", self.url))
        })?;
        let (mut ws_sink, mut ws_stream) = socket.split();

        let (read_tx, (write_tx, mut writer_rx), channels) = channel_pair();

        tokio::spawn(async move {
            while let Some(frame) = ws_stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<RpcMessage>(&text) {
                        Ok(message) => {
                            if read_tx.send(Ok(message)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "skipping undecodable websocket frame");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        debug!("websocket closed by provider");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = read_tx
                            .send(Err(ProviderError::transport(format!("read failed: {e}"))));
                        break;
                    }
                }
            }
        });

        drop(write_tx);
        tokio::spawn(async move {
            while let Some(message) = writer_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "dropping unencodable outgoing message");
                        continue;
                    }
                };
                if ws_sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sink.send(Message::Close(None)).await;
        });

        self.connected = true;
        Ok(channels)
    }

    async fn disconnect(&mut self) -> Result<(), ProviderError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// Convenience constructors for boxed transports.
pub struct TransportFactory;

impl TransportFactory {
    pub fn stdio(config: StdioConfig) -> Box<dyn Transport> {
        Box::new(StdioTransport::new(config))
    }

    pub fn websocket(url: impl Into<String>) -> Box<dyn Transport> {
        Box::new(WebSocketTransport::new(url))
    }
}

type WriterHandles = (
    mpsc::UnboundedSender<RpcMessage>,
    mpsc::UnboundedReceiver<RpcMessage>,
);

fn channel_pair() -> (
    mpsc::UnboundedSender<Result<RpcMessage, ProviderError>>,
    WriterHandles,
    TransportChannels,
) {
    let (read_tx, read_rx) = mpsc::unbounded_channel();
    let (write_tx, write_rx) = mpsc::unbounded_channel::<RpcMessage>();

    let incoming: MessageStream = Box::pin(UnboundedReceiverStream::new(read_rx));
    let sink_tx = write_tx.clone();
    let outgoing: MessageSink = Box::pin(futures::sink::unfold(
        sink_tx,
        |tx, message: RpcMessage| async move {
            tx.send(message)
                .map_err(|_| ProviderError::connection_lost("writer task ended"))?;
            Ok(tx)
        },
    ));

    (
        read_tx,
        (write_tx, write_rx),
        TransportChannels { incoming, outgoing },
    )
}

/// Build an unconnected channel pair for driving a client from a test:
/// messages pushed into the returned sender appear on the incoming stream,
/// and messages the client writes arrive on the returned receiver.
pub fn create_test_channels() -> (
    mpsc::UnboundedSender<Result<RpcMessage, ProviderError>>,
    mpsc::UnboundedReceiver<RpcMessage>,
    TransportChannels,
) {
    let (read_tx, writer, channels) = channel_pair();
    (read_tx, writer.1, channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::{methods, RpcRequest};
    use serde_json::json;

    #[test]
    fn test_stdio_config_defaults() {
        let config = StdioConfig::default();
        assert!(config.command.is_empty());
        assert!(config.args.is_empty());
        assert!(config.env.is_empty());
        assert!(config.working_dir.is_none());
    }

    #[test]
    fn test_factory_endpoints() {
        let stdio = StdioTransport::new(StdioConfig {
            command: "python3".to_string(),
            args: vec!["-m".to_string(), "notes_server".to_string()],
            ..Default::default()
        });
        assert_eq!(stdio.endpoint(), "python3 -m notes_server");
        assert!(!stdio.is_connected());

        let ws = WebSocketTransport::new("ws://localhost:9001/rpc");
        assert_eq!(ws.endpoint(), "ws://localhost:9001/rpc");
        assert!(!ws.is_connected());
    }

    #[tokio::test]
    async fn test_test_channels_round_trip() {
        let (read_tx, mut write_rx, mut channels) = create_test_channels();

        let outbound = RpcMessage::Request(RpcRequest::new(json!(1), methods::LIST_TOOLS, None));
        channels.outgoing.send(outbound.clone()).await.unwrap();
        assert_eq!(write_rx.recv().await.unwrap(), outbound);

        let inbound = RpcMessage::Request(RpcRequest::new(json!(2), methods::CALL_TOOL, None));
        read_tx.send(Ok(inbound.clone())).unwrap();
        let received = channels.incoming.next().await.unwrap().unwrap();
        assert_eq!(received, inbound);
    }

    #[tokio::test]
    async fn test_connect_on_connected_transport_fails() {
        let mut ws = WebSocketTransport::new("ws://localhost:9001/rpc");
        ws.connected = true;
        let err = ws.connect().await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport { .. }));
    }
}
