//! Tool, prompt, and resource registry.
//!
//! The registry is the single lookup surface the orchestration loop and the
//! assistant share. Tools are executable and keyed by name; prompts and
//! resources are provider-attributed descriptors kept in parallel namespaces
//! so requests for them can be routed back to the provider that advertised
//! them.
//!
//! Registration is last-writer-wins in every namespace: registering under a
//! name that is already taken replaces the previous entry and logs a warning.
//! This lets a reconnecting provider refresh its catalog without a separate
//! unregister step.
//!
//! # Quick Start
//!
//! ```no_run
//! use docent::registry::{Registry, Tool, ToolOutcome};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//!
//! #[derive(Debug)]
//! struct Ping;
//!
//! #[async_trait]
//! impl Tool for Ping {
//!     fn name(&self) -> &str {
//!         "ping"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Reply with pong"
//!     }
//!
//!     fn parameters_schema(&self) -> Value {
//!         json!({ "type": "object", "properties": {} })
//!     }
//!
//!     async fn execute(&self, _arguments: Value) -> docent::Result<ToolOutcome> {
//!         Ok(ToolOutcome::text("pong"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Registry::new();
//!     registry.register_tool(Box::new(Ping)).await;
//!     assert!(registry.has_tool("ping").await);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::{ContentBlock, ToolResultContent};

/// Executable capability the model can request by name.
///
/// Implementations must be thread-safe; the registry shares them across
/// sessions behind an `Arc`. Domain failures belong in
/// [`ToolOutcome::failure`], not in the `Err` channel; `Err` is reserved for
/// faults the tool cannot express as a result.
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    /// Name the model calls this tool by.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `arguments` is always a JSON object by the time it
    /// arrives here; the caller identity has already been injected.
    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome>;
}

/// Result of a tool execution, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the execution succeeded.
    pub success: bool,
    /// The result content handed back to the model.
    pub content: ToolResultContent,
    /// Error message when execution failed.
    pub error: Option<String>,
}

impl ToolOutcome {
    /// Successful outcome carrying plain text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: ToolResultContent::text(content),
            error: None,
        }
    }

    /// Successful outcome carrying a JSON value.
    pub fn json(content: Value) -> Self {
        Self {
            success: true,
            content: ToolResultContent::json(content),
            error: None,
        }
    }

    /// Failed outcome. The message is what the model sees.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            content: ToolResultContent::text(message.clone()),
            error: Some(message),
        }
    }

    /// Render this outcome as the tool-result block answering `call_id`.
    pub fn to_result_block(&self, call_id: &str) -> ContentBlock {
        if self.success {
            ContentBlock::tool_result_success(call_id, self.content.clone())
        } else {
            ContentBlock::tool_result_error(
                call_id,
                self.error.as_deref().unwrap_or("tool execution failed"),
            )
        }
    }
}

/// Tool definition in the shape model gateways serialize into requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Prompt advertised by a provider, kept with its owner for routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub name: String,
    pub description: Option<String>,
    /// Provider that advertised the prompt.
    pub provider: String,
}

/// Resource advertised by a provider, keyed by URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    /// Provider that advertised the resource.
    pub provider: String,
}

/// Thread-safe registry shared by every session of an assistant.
///
/// Cloning is cheap; all clones observe the same entries.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
    prompts: Arc<RwLock<HashMap<String, PromptSpec>>>,
    resources: Arc<RwLock<HashMap<String, ResourceSpec>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous holder.
    pub async fn register_tool(&self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().await;
        if tools.insert(name.clone(), Arc::from(tool)).is_some() {
            warn!(tool = %name, "replacing previously registered tool");
        } else {
            debug!(tool = %name, "registered tool");
        }
    }

    /// Whether a tool with this name is registered.
    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Look up a tool for execution.
    pub async fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub async fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Tool definitions for model requests, sorted by name so payloads are
    /// stable across runs.
    pub async fn tool_specs(&self) -> Vec<ToolSpec> {
        let tools = self.tools.read().await;
        let mut specs: Vec<ToolSpec> = tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Register a prompt descriptor, replacing any previous holder of the
    /// name.
    pub async fn register_prompt(&self, spec: PromptSpec) {
        let mut prompts = self.prompts.write().await;
        let name = spec.name.clone();
        if prompts.insert(name.clone(), spec).is_some() {
            warn!(prompt = %name, "replacing previously registered prompt");
        } else {
            debug!(prompt = %name, "registered prompt");
        }
    }

    /// Look up a prompt by name.
    pub async fn resolve_prompt(&self, name: &str) -> Option<PromptSpec> {
        self.prompts.read().await.get(name).cloned()
    }

    /// All registered prompts, sorted by name.
    pub async fn prompts(&self) -> Vec<PromptSpec> {
        let mut specs: Vec<PromptSpec> = self.prompts.read().await.values().cloned().collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Register a resource descriptor, replacing any previous holder of the
    /// URI.
    pub async fn register_resource(&self, spec: ResourceSpec) {
        let mut resources = self.resources.write().await;
        let uri = spec.uri.clone();
        if resources.insert(uri.clone(), spec).is_some() {
            warn!(resource = %uri, "replacing previously registered resource");
        } else {
            debug!(resource = %uri, "registered resource");
        }
    }

    /// Look up a resource by URI.
    pub async fn resolve_resource(&self, uri: &str) -> Option<ResourceSpec> {
        self.resources.read().await.get(uri).cloned()
    }

    /// All registered resources, sorted by URI.
    pub async fn resources(&self) -> Vec<ResourceSpec> {
        let mut specs: Vec<ResourceSpec> = self.resources.read().await.values().cloned().collect();
        specs.sort_by(|a, b| a.uri.cmp(&b.uri));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct StaticTool {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "static reply for testing"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _arguments: Value) -> crate::Result<ToolOutcome> {
            Ok(ToolOutcome::text(self.reply))
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = Registry::new();
        registry
            .register_tool(Box::new(StaticTool {
                name: "ping",
                reply: "pong",
            }))
            .await;

        assert!(registry.has_tool("ping").await);
        assert!(!registry.has_tool("pong").await);
        assert_eq!(registry.tool_count().await, 1);

        let tool = registry.resolve("ping").await.unwrap();
        let outcome = tool.execute(json!({})).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.content, ToolResultContent::text("pong"));
    }

    #[tokio::test]
    async fn test_registration_is_last_writer_wins() {
        let registry = Registry::new();
        registry
            .register_tool(Box::new(StaticTool {
                name: "ping",
                reply: "first",
            }))
            .await;
        registry
            .register_tool(Box::new(StaticTool {
                name: "ping",
                reply: "second",
            }))
            .await;

        assert_eq!(registry.tool_count().await, 1);
        let tool = registry.resolve("ping").await.unwrap();
        let outcome = tool.execute(json!({})).await.unwrap();
        assert_eq!(outcome.content, ToolResultContent::text("second"));
    }

    #[tokio::test]
    async fn test_tool_specs_sorted_by_name() {
        let registry = Registry::new();
        registry
            .register_tool(Box::new(StaticTool {
                name: "zeta",
                reply: "z",
            }))
            .await;
        registry
            .register_tool(Box::new(StaticTool {
                name: "alpha",
                reply: "a",
            }))
            .await;

        let specs = registry.tool_specs().await;
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(specs[0].description, "static reply for testing");
    }

    #[tokio::test]
    async fn test_prompt_namespace_is_independent() {
        let registry = Registry::new();
        registry
            .register_tool(Box::new(StaticTool {
                name: "shared_name",
                reply: "tool",
            }))
            .await;
        registry
            .register_prompt(PromptSpec {
                name: "shared_name".to_string(),
                description: Some("greeting template".to_string()),
                provider: "notes".to_string(),
            })
            .await;

        assert!(registry.has_tool("shared_name").await);
        let prompt = registry.resolve_prompt("shared_name").await.unwrap();
        assert_eq!(prompt.provider, "notes");
    }

    #[tokio::test]
    async fn test_resource_replacement_keeps_latest() {
        let registry = Registry::new();
        registry
            .register_resource(ResourceSpec {
                uri: "docs://readme".to_string(),
                name: "readme".to_string(),
                description: None,
                mime_type: Some("text/markdown".to_string()),
                provider: "alpha".to_string(),
            })
            .await;
        registry
            .register_resource(ResourceSpec {
                uri: "docs://readme".to_string(),
                name: "readme".to_string(),
                description: None,
                mime_type: Some("text/markdown".to_string()),
                provider: "beta".to_string(),
            })
            .await;

        assert_eq!(registry.resources().await.len(), 1);
        let resource = registry.resolve_resource("docs://readme").await.unwrap();
        assert_eq!(resource.provider, "beta");
    }

    #[tokio::test]
    async fn test_failure_outcome_renders_error_block() {
        let outcome = ToolOutcome::failure("collection 'people' does not exist");
        let block = outcome.to_result_block("call_1");
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "call_1");
                assert_eq!(is_error, Some(true));
            }
            other => panic!("expected tool result block, got {other:?}"),
        }
    }
}
