//! Bridges provider catalogs into the tool registry.
//!
//! Each advertised provider tool is wrapped in a [`ProviderTool`] that
//! forwards invocations over the shared client. Call failures and
//! provider-flagged errors never escape as `Err`; they come back as failure
//! outcomes so the model can read them and adjust.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::registry::{PromptSpec, Registry, ResourceSpec, Tool, ToolOutcome};

use super::client::ProviderClient;
use super::types::{Content, ToolInfo};

/// A remote tool exposed through the registry. Holds the catalog entry and a
/// handle to the client that serves it.
pub struct ProviderTool {
    info: ToolInfo,
    client: Arc<ProviderClient>,
}

impl ProviderTool {
    pub fn new(info: ToolInfo, client: Arc<ProviderClient>) -> Self {
        Self { info, client }
    }
}

impl fmt::Debug for ProviderTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTool")
            .field("name", &self.info.name)
            .field("provider", &self.client.name())
            .finish()
    }
}

#[async_trait]
impl Tool for ProviderTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.info.description
    }

    fn parameters_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        debug!(
            tool = %self.info.name,
            provider = %self.client.name(),
            "invoking provider tool"
        );
        let result = match self.client.call_tool(&self.info.name, arguments).await {
            Ok(result) => result,
            Err(e) => {
                return Ok(ToolOutcome::failure(format!(
                    "provider tool '{}' failed: {e}",
                    self.info.name
                )));
            }
        };

        let mut rendered = render_content(&result.content);
        if rendered.trim().is_empty() {
            rendered = format!("provider tool '{}' returned no content", self.info.name);
        }
        if result.is_error == Some(true) {
            Ok(ToolOutcome::failure(rendered))
        } else {
            Ok(ToolOutcome::text(rendered))
        }
    }
}

/// Flatten content parts into one newline-joined string. Non-text parts are
/// summarized; resource parts surface their inline text when present.
pub fn render_content(parts: &[Content]) -> String {
    parts
        .iter()
        .map(|part| match part {
            Content::Text(text) => text.text.clone(),
            Content::Image(image) => format!(
                "[image {} ({} bytes base64)]",
                image.mime_type,
                image.data.len()
            ),
            Content::Resource(resource) => match &resource.text {
                Some(text) => text.clone(),
                None => format!("[resource {}]", resource.uri),
            },
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetch the provider's tool catalog and register every entry. Returns the
/// registered names in catalog order.
pub async fn register_provider_tools(
    registry: &Registry,
    client: &Arc<ProviderClient>,
) -> Result<Vec<String>, super::error::ProviderError> {
    let tools = client.list_tools().await?;
    let mut registered = Vec::with_capacity(tools.len());
    for info in tools {
        let name = info.name.clone();
        registry
            .register_tool(Box::new(ProviderTool::new(info, Arc::clone(client))))
            .await;
        registered.push(name);
    }
    info!(
        provider = %client.name(),
        count = registered.len(),
        "registered provider tools"
    );
    Ok(registered)
}

/// Fetch and register the provider's prompt catalog. Returns registered
/// prompt names.
pub async fn register_provider_prompts(
    registry: &Registry,
    client: &Arc<ProviderClient>,
) -> Result<Vec<String>, super::error::ProviderError> {
    let prompts = client.list_prompts().await?;
    let mut registered = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        let spec = PromptSpec {
            name: prompt.name.clone(),
            description: prompt.description.clone(),
            provider: client.name().to_string(),
        };
        registry.register_prompt(spec).await;
        registered.push(prompt.name);
    }
    Ok(registered)
}

/// Fetch and register the provider's resource catalog. Returns registered
/// resource uris.
pub async fn register_provider_resources(
    registry: &Registry,
    client: &Arc<ProviderClient>,
) -> Result<Vec<String>, super::error::ProviderError> {
    let resources = client.list_resources().await?;
    let mut registered = Vec::with_capacity(resources.len());
    for resource in resources {
        let spec = ResourceSpec {
            uri: resource.uri.clone(),
            name: resource.name.clone(),
            description: resource.description.clone(),
            mime_type: resource.mime_type.clone(),
            provider: client.name().to_string(),
        };
        registry.register_resource(spec).await;
        registered.push(resource.uri);
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::client::ProviderClientConfig;
    use crate::provider::transport::{
        create_test_channels, Transport, TransportChannels, TransportFactory,
    };
    use crate::provider::types::{
        methods, ImageContent, ResourceContent, RpcMessage, RpcResponse, TextContent,
        PROTOCOL_VERSION,
    };
    use crate::provider::ProviderError;
    use serde_json::json;

    /// Transport backed by a canned notes provider: one tool, one prompt,
    /// one resource. `tool_is_error` controls the isError flag on calls.
    struct NotesTransport {
        connected: bool,
        tool_is_error: bool,
    }

    #[async_trait]
    impl Transport for NotesTransport {
        async fn connect(&mut self) -> Result<TransportChannels, ProviderError> {
            let (read_tx, mut write_rx, channels) = create_test_channels();
            let tool_is_error = self.tool_is_error;
            tokio::spawn(async move {
                while let Some(message) = write_rx.recv().await {
                    let request = match message {
                        RpcMessage::Request(request) => request,
                        _ => continue,
                    };
                    let result = match request.method.as_str() {
                        methods::INITIALIZE => json!({
                            "protocolVersion": PROTOCOL_VERSION,
                            "capabilities": {"tools": {}, "prompts": {}, "resources": {}},
                            "serverInfo": {"name": "notes", "version": "0.3.1"}
                        }),
                        methods::LIST_TOOLS => json!({
                            "tools": [{
                                "name": "lookup_note",
                                "description": "Look up one note",
                                "inputSchema": {"type": "object", "properties": {"id": {"type": "integer"}}}
                            }]
                        }),
                        methods::CALL_TOOL => json!({
                            "content": [{"type": "text", "text": "note 7: buy milk"}],
                            "isError": tool_is_error
                        }),
                        methods::LIST_PROMPTS => json!({
                            "prompts": [{"name": "summarize", "description": "Summarize a note"}]
                        }),
                        methods::LIST_RESOURCES => json!({
                            "resources": [{"uri": "notes://all", "name": "all-notes", "mimeType": "text/plain"}]
                        }),
                        _ => json!({}),
                    };
                    let reply = RpcMessage::Response(RpcResponse::success(request.id, result));
                    if read_tx.send(Ok(reply)).is_err() {
                        break;
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
            "notes-fixture".to_string()
        }
    }

    async fn notes_client(tool_is_error: bool) -> Arc<ProviderClient> {
        let client = Arc::new(ProviderClient::new(
            "notes",
            ProviderClientConfig::default(),
            Box::new(NotesTransport {
                connected: false,
                tool_is_error,
            }),
        ));
        client.connect().await.unwrap();
        client
    }

    #[test]
    fn test_render_content_joins_parts() {
        let parts = vec![
            Content::Text(TextContent {
                text: "alpha".to_string(),
            }),
            Content::Image(ImageContent {
                data: "QUJD".to_string(),
                mime_type: "image/png".to_string(),
            }),
            Content::Resource(ResourceContent {
                uri: "notes://7".to_string(),
                mime_type: None,
                text: Some("beta".to_string()),
            }),
            Content::Resource(ResourceContent {
                uri: "notes://8".to_string(),
                mime_type: None,
                text: None,
            }),
        ];
        assert_eq!(
            render_content(&parts),
            "alpha\n[image image/png (4 bytes base64)]\nbeta\n[resource notes://8]"
        );
        assert_eq!(render_content(&[]), "");
    }

    #[tokio::test]
    async fn test_register_provider_tools_bridges_catalog() {
        let registry = Registry::new();
        let client = notes_client(false).await;

        let names = register_provider_tools(&registry, &client).await.unwrap();
        assert_eq!(names, vec!["lookup_note".to_string()]);

        let tool = registry.resolve("lookup_note").await.unwrap();
        assert_eq!(tool.description(), "Look up one note");
        assert_eq!(tool.parameters_schema()["type"], json!("object"));

        let outcome = tool.execute(json!({"id": 7})).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.content.to_display_string(), "note 7: buy milk");
    }

    #[tokio::test]
    async fn test_error_flag_becomes_failure_outcome() {
        let registry = Registry::new();
        let client = notes_client(true).await;
        register_provider_tools(&registry, &client).await.unwrap();

        let tool = registry.resolve("lookup_note").await.unwrap();
        let outcome = tool.execute(json!({"id": 7})).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("note 7: buy milk"));
    }

    #[tokio::test]
    async fn test_unreachable_provider_fails_softly() {
        let client = Arc::new(ProviderClient::new(
            "offline",
            ProviderClientConfig::default(),
            TransportFactory::websocket("ws://127.0.0.1:9/unused"),
        ));
        let tool = ProviderTool::new(
            ToolInfo {
                name: "lookup_note".to_string(),
                description: String::new(),
                input_schema: json!({"type": "object"}),
            },
            client,
        );

        let outcome = tool.execute(json!({})).await.unwrap();
        assert!(!outcome.success);
        let message = outcome.error.unwrap();
        assert!(
            message.contains("provider tool 'lookup_note' failed"),
            "unexpected message: {message}"
        );
        assert!(message.contains("not connected"), "unexpected message: {message}");
    }

    #[tokio::test]
    async fn test_register_prompts_and_resources() {
        let registry = Registry::new();
        let client = notes_client(false).await;

        let prompts = register_provider_prompts(&registry, &client).await.unwrap();
        assert_eq!(prompts, vec!["summarize".to_string()]);
        let prompt = registry.resolve_prompt("summarize").await.unwrap();
        assert_eq!(prompt.provider, "notes");
        assert_eq!(prompt.description.as_deref(), Some("Summarize a note"));

        let resources = register_provider_resources(&registry, &client)
            .await
            .unwrap();
        assert_eq!(resources, vec!["notes://all".to_string()]);
        let resource = registry.resolve_resource("notes://all").await.unwrap();
        assert_eq!(resource.provider, "notes");
        assert_eq!(resource.mime_type.as_deref(), Some("text/plain"));
    }
}
