//! The assistant: sessions, tools, and the model behind one entry point.
//!
//! An [`Assistant`] owns the tool registry, the session store, and a round
//! engine wired to one model backend. Messages go through
//! [`handle_message`](Assistant::handle_message): the session's transcript is
//! locked, the round loop runs until the model answers without tool calls,
//! and the reply comes back as plain text. Provider connections are made at
//! build time; a provider that fails to connect is logged and skipped so the
//! rest of the assistant still comes up.
//!
//! ```no_run
//! use docent::agent::Assistant;
//! use docent::gateway::{AnthropicConfig, AnthropicGateway};
//!
//! # async fn example() -> docent::Result<()> {
//! let assistant = Assistant::builder()
//!     .backend(AnthropicGateway::new(AnthropicConfig::new(
//!         std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
//!         "claude-3-5-sonnet-20241022",
//!     )))
//!     .build()
//!     .await?;
//!
//! let outcome = assistant
//!     .handle_message("chat-1", "ann", "create a collection called tasks")
//!     .await?;
//! println!("{}", outcome.reply);
//! # Ok(())
//! # }
//! ```

pub mod round;

pub use round::{RoundConfig, RoundEngine, RoundOutcome};

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversation::{SlidingWindow, WindowConfig};
use crate::dispatch::ToolDispatcher;
use crate::error::DocentError;
use crate::gateway::ModelBackend;
use crate::provider::{
    register_provider_prompts, register_provider_resources, register_provider_tools,
    GetPromptResult, ProviderClient, ProviderClientConfig, ReadResourceResult, Transport,
};
use crate::registry::{PromptSpec, Registry, ResourceSpec, Tool};
use crate::session::{MemorySessionStore, SessionStore};
use crate::store::tools::register_document_tools;
use crate::store::DocumentStore;

/// Default instructions given to the model.
pub const SYSTEM_PROMPT: &str = "\
You are a personal data assistant. You help one user at a time manage their \
own document collections through the tools available to you.

Rules:
- You are the only one who talks to the user. Tool results are raw material \
for your replies, never something the user sees directly.
- Use the tools to create, inspect, and change the user's collections; never \
invent data you did not read.
- Documents in one collection share one set of fields. If an insert is \
rejected because of new fields, add those fields to every document with \
extend_collection_schema first, then retry the insert.
- If an insert is rejected because a field has the wrong type, correct the \
value instead of changing the schema.
- Keep replies short and factual; confirm what changed and mention ids the \
user may need later.";

/// One configured assistant. Cheap to share behind an `Arc`; all state lives
/// in the stores it owns.
pub struct Assistant {
    registry: Registry,
    engine: RoundEngine,
    sessions: Arc<dyn SessionStore>,
    store: DocumentStore,
    providers: Vec<Arc<ProviderClient>>,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant").finish_non_exhaustive()
    }
}

impl Assistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::new()
    }

    /// Handle one user message in the named session. The session is created
    /// on first use and bound to `identity`; later messages must carry the
    /// same identity.
    pub async fn handle_message(
        &self,
        session_key: &str,
        identity: &str,
        message: &str,
    ) -> crate::Result<RoundOutcome> {
        self.handle_message_with_cancellation(session_key, identity, message, &CancellationToken::new())
            .await
    }

    /// Like [`handle_message`](Self::handle_message), but abortable. On
    /// cancellation any tool calls that never ran get failure results, so
    /// the session stays usable.
    pub async fn handle_message_with_cancellation(
        &self,
        session_key: &str,
        identity: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> crate::Result<RoundOutcome> {
        let handle = self.sessions.open(session_key, identity).await?;
        let mut session = handle.lock().await;
        debug!(session = %session_key, identity = %identity, "handling message");

        let result = self
            .engine
            .run(&mut session.transcript, identity, message, cancel)
            .await;
        session.touch();

        match &result {
            Ok(outcome) => info!(
                session = %session_key,
                rounds = outcome.rounds,
                tool_calls = outcome.tool_calls,
                "message handled"
            ),
            Err(e) => warn!(session = %session_key, error = %e, "message handling failed"),
        }
        result
    }

    /// Create (or touch) a session without sending a message.
    pub async fn open_session(&self, session_key: &str, identity: &str) -> crate::Result<()> {
        self.sessions.open(session_key, identity).await.map(|_| ())
    }

    /// Drop a session and its transcript.
    pub async fn close_session(&self, session_key: &str) -> crate::Result<()> {
        if self.sessions.remove(session_key).await {
            Ok(())
        } else {
            Err(DocentError::session_not_found(session_key))
        }
    }

    /// Drop every expired session; returns how many went.
    pub async fn sweep_sessions(&self) -> usize {
        self.sessions.sweep_expired().await
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn document_store(&self) -> &DocumentStore {
        &self.store
    }

    /// Prompts advertised by connected providers.
    pub async fn prompts(&self) -> Vec<PromptSpec> {
        self.registry.prompts().await
    }

    /// Render a provider prompt by name.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> crate::Result<GetPromptResult> {
        let spec = self
            .registry
            .resolve_prompt(name)
            .await
            .ok_or_else(|| DocentError::invalid_input(format!("prompt '{name}' is not registered")))?;
        let client = self.provider(&spec.provider)?;
        Ok(client.get_prompt(name, arguments).await?)
    }

    /// Resources advertised by connected providers.
    pub async fn resources(&self) -> Vec<ResourceSpec> {
        self.registry.resources().await
    }

    /// Read a provider resource by uri.
    pub async fn read_resource(&self, uri: &str) -> crate::Result<ReadResourceResult> {
        let spec = self
            .registry
            .resolve_resource(uri)
            .await
            .ok_or_else(|| DocentError::invalid_input(format!("resource '{uri}' is not registered")))?;
        let client = self.provider(&spec.provider)?;
        Ok(client.read_resource(uri).await?)
    }

    /// Disconnect every provider. Failures are logged, not propagated, so
    /// one stuck provider cannot block shutdown.
    pub async fn shutdown(&self) {
        for client in &self.providers {
            if let Err(e) = client.disconnect().await {
                warn!(provider = %client.name(), error = %e, "provider disconnect failed");
            }
        }
    }

    fn provider(&self, name: &str) -> crate::Result<&Arc<ProviderClient>> {
        self.providers
            .iter()
            .find(|client| client.name() == name)
            .ok_or_else(|| DocentError::provider(format!("provider '{name}' is not connected")))
    }
}

/// Step-by-step construction for [`Assistant`].
pub struct AssistantBuilder {
    backend: Option<Arc<dyn ModelBackend>>,
    system_prompt: String,
    window: WindowConfig,
    round: RoundConfig,
    sessions: Option<Arc<dyn SessionStore>>,
    store: Option<DocumentStore>,
    tools: Vec<Box<dyn Tool>>,
    provider_transports: Vec<(String, Box<dyn Transport>)>,
    client_config: ProviderClientConfig,
    document_tools: bool,
}

impl AssistantBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
            window: WindowConfig::default(),
            round: RoundConfig::default(),
            sessions: None,
            store: None,
            tools: Vec::new(),
            provider_transports: Vec::new(),
            client_config: ProviderClientConfig::default(),
            document_tools: true,
        }
    }

    /// The model backend. Required.
    pub fn backend<B: ModelBackend + 'static>(self, backend: B) -> Self {
        self.backend_shared(Arc::new(backend))
    }

    /// A pre-shared model backend.
    pub fn backend_shared(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    pub fn round_config(mut self, round: RoundConfig) -> Self {
        self.round = round;
        self
    }

    pub fn session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Share a document store with the rest of the application.
    pub fn document_store(mut self, store: DocumentStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Skip registering the built-in document tools.
    pub fn without_document_tools(mut self) -> Self {
        self.document_tools = false;
        self
    }

    /// Add a single tool.
    pub fn tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Add multiple tools.
    pub fn tools(mut self, mut tools: Vec<Box<dyn Tool>>) -> Self {
        self.tools.append(&mut tools);
        self
    }

    /// Queue a provider to connect during build.
    pub fn provider(mut self, name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        self.provider_transports.push((name.into(), transport));
        self
    }

    pub fn provider_client_config(mut self, config: ProviderClientConfig) -> Self {
        self.client_config = config;
        self
    }

    pub async fn build(self) -> crate::Result<Assistant> {
        let backend = self
            .backend
            .ok_or_else(|| DocentError::configuration("a model backend is required"))?;
        let window = SlidingWindow::new(self.window)?;
        let store = self.store.unwrap_or_default();
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));

        let registry = Registry::new();
        if self.document_tools {
            register_document_tools(&registry, &store).await;
        }
        for tool in self.tools {
            registry.register_tool(tool).await;
        }

        let mut providers = Vec::new();
        for (name, transport) in self.provider_transports {
            let client = Arc::new(ProviderClient::new(
                name.clone(),
                self.client_config.clone(),
                transport,
            ));
            match connect_provider(&registry, &client).await {
                Ok(tool_count) => {
                    info!(provider = %name, tools = tool_count, "provider connected");
                    providers.push(client);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "skipping provider");
                    let _ = client.disconnect().await;
                }
            }
        }

        let dispatcher = ToolDispatcher::new(registry.clone());
        let engine = RoundEngine::new(backend, dispatcher, window, self.system_prompt, self.round);

        Ok(Assistant {
            registry,
            engine,
            sessions,
            store,
            providers,
        })
    }
}

impl Default for AssistantBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Connect one provider and register everything it advertises. Returns the
/// number of tools registered.
async fn connect_provider(
    registry: &Registry,
    client: &Arc<ProviderClient>,
) -> Result<usize, crate::provider::ProviderError> {
    client.connect().await?;
    let tools = register_provider_tools(registry, client).await?;
    register_provider_prompts(registry, client).await?;
    register_provider_resources(registry, client).await?;
    Ok(tools.len())
}
