//! Request/response client for one provider connection.
//!
//! The client owns a transport and runs two background tasks: a writer that
//! drains outgoing messages into the transport sink, and a reader that
//! correlates responses with pending requests by id. Callers get plain
//! `async fn` request methods; concurrency, timeouts, and connection loss are
//! handled here. All methods take `&self`, so a connected client can be
//! shared behind an `Arc` by every tool that proxies to it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::ProviderError;
use super::transport::{Transport, TransportChannels};
use super::types::{
    methods, CallToolResult, ClientCapabilities, GetPromptResult, InitializeResult,
    ListPromptsResult, ListResourcesResult, ListToolsResult, PromptInfo, ReadResourceResult,
    RequestId, ResourceInfo, RpcError, RpcMessage, RpcNotification, RpcRequest, RpcResponse,
    RpcResponsePayload, ServerCapabilities, ToolInfo, PROTOCOL_VERSION,
};

/// Tunables for a provider client.
#[derive(Debug, Clone)]
pub struct ProviderClientConfig {
    /// Name reported to the provider during the handshake.
    pub client_name: String,
    /// Version reported to the provider during the handshake.
    pub client_version: String,
    /// How long to wait for any single response.
    pub request_timeout: Duration,
}

impl Default for ProviderClientConfig {
    fn default() -> Self {
        Self {
            client_name: "docent".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// What the provider told us about itself during the handshake.
#[derive(Debug, Clone, Default)]
pub struct ProviderSession {
    pub server_capabilities: Option<ServerCapabilities>,
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    pub is_active: bool,
}

struct PendingRequest {
    response_tx: oneshot::Sender<Result<RpcResponse, ProviderError>>,
    method: String,
}

/// Client for a single provider endpoint.
pub struct ProviderClient {
    name: String,
    config: ProviderClientConfig,
    transport: Mutex<Box<dyn Transport>>,
    session: Arc<RwLock<ProviderSession>>,
    request_id_counter: AtomicI64,
    pending_requests: Arc<Mutex<HashMap<RequestId, PendingRequest>>>,
    is_connected: Arc<AtomicBool>,
    background_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<mpsc::UnboundedSender<()>>>,
    write_tx: Mutex<Option<mpsc::UnboundedSender<RpcMessage>>>,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ProviderClient {
    pub fn new(
        name: impl Into<String>,
        config: ProviderClientConfig,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            transport: Mutex::new(transport),
            session: Arc::new(RwLock::new(ProviderSession::default())),
            request_id_counter: AtomicI64::new(1),
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            is_connected: Arc::new(AtomicBool::new(false)),
            background_handle: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            write_tx: Mutex::new(None),
        }
    }

    /// Name this client was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    pub async fn server_name(&self) -> Option<String> {
        self.session.read().await.server_name.clone()
    }

    pub async fn server_version(&self) -> Option<String> {
        self.session.read().await.server_version.clone()
    }

    pub async fn supports_tools(&self) -> bool {
        let session = self.session.read().await;
        session
            .server_capabilities
            .as_ref()
            .is_some_and(|caps| caps.tools.is_some())
    }

    pub async fn supports_prompts(&self) -> bool {
        let session = self.session.read().await;
        session
            .server_capabilities
            .as_ref()
            .is_some_and(|caps| caps.prompts.is_some())
    }

    pub async fn supports_resources(&self) -> bool {
        let session = self.session.read().await;
        session
            .server_capabilities
            .as_ref()
            .is_some_and(|caps| caps.resources.is_some())
    }

    /// Connect the transport, start the message handler, and run the
    /// initialize handshake. On handshake failure the connection is torn
    /// back down.
    pub async fn connect(&self) -> Result<(), ProviderError> {
        if self.is_connected() {
            return Err(ProviderError::transport(format!(
                "provider '{}' is already connected",
                self.name
            )));
        }

        let channels = {
            let mut transport = self.transport.lock().await;
            transport.connect().await?
        };
        self.start_message_handler(channels).await;
        self.is_connected.store(true, Ordering::SeqCst);

        if let Err(e) = self.initialize_session().await {
            let _ = self.disconnect().await;
            return Err(ProviderError::handshake(format!(
                "initialize with provider '{}' failed: {e}",
                self.name
            )));
        }
        Ok(())
    }

    /// Stop the background tasks and close the transport. Safe to call on a
    /// client that never connected.
    pub async fn disconnect(&self) -> Result<(), ProviderError> {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.background_handle.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                warn!(provider = %self.name, "message handler did not stop in time");
            }
        }
        *self.write_tx.lock().await = None;
        {
            let mut transport = self.transport.lock().await;
            if transport.is_connected() {
                transport.disconnect().await?;
            }
        }
        self.session.write().await.is_active = false;
        self.is_connected.store(false, Ordering::SeqCst);
        debug!(provider = %self.name, "disconnected");
        Ok(())
    }

    /// Fetch the provider's tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, ProviderError> {
        let response = self.send_request(methods::LIST_TOOLS, None).await?;
        let result = expect_success(response, "tools/list")?;
        let parsed: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ProviderError::protocol(format!("malformed tools/list result: {e}")))?;
        Ok(parsed.tools)
    }

    /// Invoke one provider tool and return its raw result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ProviderError> {
        let params = json!({ "name": name, "arguments": arguments });
        let response = self.send_request(methods::CALL_TOOL, Some(params)).await?;
        let result = expect_success(response, "tools/call")?;
        serde_json::from_value(result)
            .map_err(|e| ProviderError::protocol(format!("malformed tools/call result: {e}")))
    }

    /// Fetch the provider's prompt catalog. Providers that do not advertise
    /// the prompts capability yield an empty list without a round trip.
    pub async fn list_prompts(&self) -> Result<Vec<PromptInfo>, ProviderError> {
        if !self.supports_prompts().await {
            debug!(provider = %self.name, "provider does not advertise prompts");
            return Ok(Vec::new());
        }
        let response = self.send_request(methods::LIST_PROMPTS, None).await?;
        let result = expect_success(response, "prompts/list")?;
        let parsed: ListPromptsResult = serde_json::from_value(result)
            .map_err(|e| ProviderError::protocol(format!("malformed prompts/list result: {e}")))?;
        Ok(parsed.prompts)
    }

    /// Render one prompt by name.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult, ProviderError> {
        let mut params = json!({ "name": name });
        if let Some(arguments) = arguments {
            params["arguments"] = arguments;
        }
        let response = self.send_request(methods::GET_PROMPT, Some(params)).await?;
        let result = expect_success(response, "prompts/get")?;
        serde_json::from_value(result)
            .map_err(|e| ProviderError::protocol(format!("malformed prompts/get result: {e}")))
    }

    /// Fetch the provider's resource catalog. Capability-guarded like
    /// [`list_prompts`](Self::list_prompts).
    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>, ProviderError> {
        if !self.supports_resources().await {
            debug!(provider = %self.name, "provider does not advertise resources");
            return Ok(Vec::new());
        }
        let response = self.send_request(methods::LIST_RESOURCES, None).await?;
        let result = expect_success(response, "resources/list")?;
        let parsed: ListResourcesResult = serde_json::from_value(result)
            .map_err(|e| ProviderError::protocol(format!("malformed resources/list result: {e}")))?;
        Ok(parsed.resources)
    }

    /// Read one resource by uri.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ProviderError> {
        let params = json!({ "uri": uri });
        let response = self
            .send_request(methods::READ_RESOURCE, Some(params))
            .await?;
        let result = expect_success(response, "resources/read")?;
        serde_json::from_value(result)
            .map_err(|e| ProviderError::protocol(format!("malformed resources/read result: {e}")))
    }

    /// Send one request and wait for its correlated response.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<RpcResponse, ProviderError> {
        if !self.is_connected() {
            return Err(ProviderError::not_connected(format!(
                "provider '{}' is not connected",
                self.name
            )));
        }

        let id = json!(self.request_id_counter.fetch_add(1, Ordering::SeqCst));
        let (response_tx, response_rx) = oneshot::channel();
        {
            let mut pending = self.pending_requests.lock().await;
            pending.insert(
                id.clone(),
                PendingRequest {
                    response_tx,
                    method: method.to_string(),
                },
            );
        }

        let request = RpcMessage::Request(RpcRequest::new(id.clone(), method, params));
        let send_result = {
            let guard = self.write_tx.lock().await;
            match guard.as_ref() {
                Some(tx) => tx
                    .send(request)
                    .map_err(|_| ProviderError::connection_lost("writer task ended")),
                None => Err(ProviderError::not_connected(format!(
                    "provider '{}' is not connected",
                    self.name
                ))),
            }
        };
        if let Err(e) = send_result {
            self.pending_requests.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, response_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ProviderError::connection_lost(format!(
                "connection to provider '{}' closed before '{method}' completed",
                self.name
            ))),
            Err(_) => {
                self.pending_requests.lock().await.remove(&id);
                warn!(provider = %self.name, method = %method, "request timed out");
                Err(ProviderError::timeout(self.config.request_timeout))
            }
        }
    }

    /// Send a notification; nothing comes back.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), ProviderError> {
        let notification = RpcMessage::Notification(RpcNotification::new(method, params));
        let guard = self.write_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => tx
                .send(notification)
                .map_err(|_| ProviderError::connection_lost("writer task ended")),
            None => Err(ProviderError::not_connected(format!(
                "provider '{}' is not connected",
                self.name
            ))),
        }
    }

    async fn initialize_session(&self) -> Result<(), ProviderError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": ClientCapabilities::default(),
            "clientInfo": {
                "name": self.config.client_name,
                "version": self.config.client_version,
            },
        });

        let response = self.send_request(methods::INITIALIZE, Some(params)).await?;
        let result = expect_success(response, "initialize")?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| ProviderError::protocol(format!("malformed initialize result: {e}")))?;

        debug!(
            provider = %self.name,
            protocol = %init.protocol_version,
            "provider session established"
        );

        {
            let mut session = self.session.write().await;
            session.server_capabilities = Some(init.capabilities);
            session.server_name = init
                .server_info
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string);
            session.server_version = init
                .server_info
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_string);
            session.is_active = true;
        }

        self.send_notification(methods::INITIALIZED_NOTIFICATION, None)
            .await
    }

    async fn start_message_handler(&self, channels: TransportChannels) {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<RpcMessage>();
        let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel::<()>();
        let TransportChannels {
            mut incoming,
            mut outgoing,
        } = channels;

        let write_handle = tokio::spawn(async move {
            while let Some(message) = write_rx.recv().await {
                if outgoing.send(message).await.is_err() {
                    debug!("outgoing sink closed");
                    break;
                }
            }
        });

        let pending = Arc::clone(&self.pending_requests);
        let is_connected = Arc::clone(&self.is_connected);
        let provider = self.name.clone();
        let reply_tx = write_tx.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(provider = %provider, "message handler shutting down");
                        break;
                    }
                    message = incoming.next() => {
                        match message {
                            Some(Ok(message)) => {
                                Self::handle_incoming(&provider, &pending, &reply_tx, message)
                                    .await;
                            }
                            Some(Err(e)) => {
                                warn!(provider = %provider, error = %e, "transport read error");
                            }
                            None => {
                                debug!(provider = %provider, "incoming stream ended");
                                break;
                            }
                        }
                    }
                }
            }
            is_connected.store(false, Ordering::SeqCst);
            write_handle.abort();
            let mut pending = pending.lock().await;
            for (_, request) in pending.drain() {
                let _ = request.response_tx.send(Err(ProviderError::connection_lost(
                    format!(
                        "connection to provider '{provider}' closed before '{}' completed",
                        request.method
                    ),
                )));
            }
        });

        *self.write_tx.lock().await = Some(write_tx);
        *self.background_handle.lock().await = Some(handle);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);
    }

    async fn handle_incoming(
        provider: &str,
        pending: &Arc<Mutex<HashMap<RequestId, PendingRequest>>>,
        reply_tx: &mpsc::UnboundedSender<RpcMessage>,
        message: RpcMessage,
    ) {
        match message {
            RpcMessage::Response(response) => {
                let entry = pending.lock().await.remove(&response.id);
                match entry {
                    Some(request) => {
                        if request.response_tx.send(Ok(response)).is_err() {
                            debug!(
                                provider = %provider,
                                method = %request.method,
                                "caller gave up before the response arrived"
                            );
                        }
                    }
                    None => {
                        warn!(provider = %provider, id = %response.id, "response with no matching request");
                    }
                }
            }
            RpcMessage::Request(request) => {
                warn!(provider = %provider, method = %request.method, "rejecting provider-initiated request");
                let reply = RpcMessage::Response(RpcResponse::error(
                    request.id,
                    RpcError::method_not_found(request.method),
                ));
                let _ = reply_tx.send(reply);
            }
            RpcMessage::Notification(notification) => {
                if notification.method == methods::TOOLS_LIST_CHANGED {
                    info!(provider = %provider, "provider tool catalog changed");
                } else {
                    debug!(provider = %provider, method = %notification.method, "ignoring notification");
                }
            }
        }
    }
}

fn expect_success(response: RpcResponse, context: &str) -> Result<Value, ProviderError> {
    match response.payload {
        RpcResponsePayload::Success { result } => Ok(result),
        RpcResponsePayload::Error { error } => Err(ProviderError::protocol(format!(
            "{context} failed: {} (code {})",
            error.message, error.code
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::transport::create_test_channels;
    use crate::provider::types::Content;
    use async_trait::async_trait;

    type Responder = Arc<dyn Fn(&RpcRequest) -> Option<RpcResponse> + Send + Sync>;

    /// Transport whose far end is a closure deciding how to answer each
    /// request. Returning `None` swallows the request.
    struct ScriptedTransport {
        responder: Responder,
        connected: bool,
    }

    impl ScriptedTransport {
        fn new(responder: Responder) -> Self {
            Self {
                responder,
                connected: false,
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&mut self) -> Result<TransportChannels, ProviderError> {
            let (read_tx, mut write_rx, channels) = create_test_channels();
            let responder = Arc::clone(&self.responder);
            tokio::spawn(async move {
                while let Some(message) = write_rx.recv().await {
                    if let RpcMessage::Request(request) = message {
                        if let Some(response) = responder(&request) {
                            if read_tx.send(Ok(RpcMessage::Response(response))).is_err() {
                                break;
                            }
                        }
                    }
                }
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
            "scripted".to_string()
        }
    }

    fn notes_responder() -> Responder {
        Arc::new(|request: &RpcRequest| match request.method.as_str() {
            methods::INITIALIZE => Some(RpcResponse::success(
                request.id.clone(),
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}, "prompts": {}},
                    "serverInfo": {"name": "notes", "version": "0.3.1"}
                }),
            )),
            methods::LIST_TOOLS => Some(RpcResponse::success(
                request.id.clone(),
                json!({
                    "tools": [{
                        "name": "search_notes",
                        "description": "Search stored notes",
                        "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}
                    }]
                }),
            )),
            methods::CALL_TOOL => Some(RpcResponse::success(
                request.id.clone(),
                json!({
                    "content": [{"type": "text", "text": "two notes found"}],
                    "isError": false
                }),
            )),
            _ => Some(RpcResponse::error(
                request.id.clone(),
                RpcError::method_not_found(request.method.clone()),
            )),
        })
    }

    fn connected_client(responder: Responder) -> ProviderClient {
        ProviderClient::new(
            "notes",
            ProviderClientConfig::default(),
            Box::new(ScriptedTransport::new(responder)),
        )
    }

    #[tokio::test]
    async fn test_connect_performs_handshake() {
        let client = connected_client(notes_responder());
        client.connect().await.unwrap();

        assert!(client.is_connected());
        assert_eq!(client.server_name().await, Some("notes".to_string()));
        assert_eq!(client.server_version().await, Some("0.3.1".to_string()));
        assert!(client.supports_tools().await);
        assert!(client.supports_prompts().await);
        assert!(!client.supports_resources().await);

        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_list_tools_parses_catalog() {
        let client = connected_client(notes_responder());
        client.connect().await.unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search_notes");
        assert_eq!(tools[0].input_schema["type"], json!("object"));
    }

    #[tokio::test]
    async fn test_call_tool_round_trip() {
        let client = connected_client(notes_responder());
        client.connect().await.unwrap();

        let result = client
            .call_tool("search_notes", json!({"query": "meeting"}))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(
            result.content,
            vec![Content::Text(crate::provider::types::TextContent {
                text: "two notes found".to_string()
            })]
        );
    }

    #[tokio::test]
    async fn test_request_times_out_without_response() {
        let responder: Responder = Arc::new(|request: &RpcRequest| {
            if request.method == methods::INITIALIZE {
                Some(RpcResponse::success(
                    request.id.clone(),
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "slow"}
                    }),
                ))
            } else {
                None
            }
        });
        let client = ProviderClient::new(
            "slow",
            ProviderClientConfig {
                request_timeout: Duration::from_millis(50),
                ..Default::default()
            },
            Box::new(ScriptedTransport::new(responder)),
        );
        client.connect().await.unwrap();

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_prompts_yield_empty_catalog() {
        let responder: Responder = Arc::new(|request: &RpcRequest| {
            if request.method == methods::INITIALIZE {
                Some(RpcResponse::success(
                    request.id.clone(),
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "toolsonly"}
                    }),
                ))
            } else {
                // Any catalog request would fail loudly.
                Some(RpcResponse::error(
                    request.id.clone(),
                    RpcError::method_not_found(request.method.clone()),
                ))
            }
        });
        let client = ProviderClient::new(
            "toolsonly",
            ProviderClientConfig::default(),
            Box::new(ScriptedTransport::new(responder)),
        );
        client.connect().await.unwrap();

        assert_eq!(client.list_prompts().await.unwrap(), Vec::new());
        assert_eq!(client.list_resources().await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn test_request_before_connect_fails() {
        let client = connected_client(notes_responder());
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn test_protocol_error_surfaces_method_and_code() {
        let client = connected_client(notes_responder());
        client.connect().await.unwrap();

        let response = client.send_request("bogus/method", None).await.unwrap();
        let err = expect_success(response, "bogus/method").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("bogus/method"), "unexpected error: {text}");
        assert!(text.contains("-32601"), "unexpected error: {text}");
    }
}
