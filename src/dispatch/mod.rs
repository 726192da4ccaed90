//! Tool dispatch with caller identity injection.
//!
//! The dispatcher sits between the orchestration loop and the registry. It
//! normalizes argument payloads, stamps the caller's identity into them, and
//! converts every possible failure (unknown tool, malformed arguments, an
//! executor returning `Err`) into a failure [`ToolOutcome`] the model can
//! read and react to. Nothing that happens inside a tool call aborts the
//! round.
//!
//! The identity stamp is not advisory: whatever the model put in the
//! [`IDENTITY_ARGUMENT`] slot is discarded and replaced with the identity
//! bound to the session, so a tool can trust that field no matter what the
//! model asked for.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::registry::{Registry, ToolOutcome};

/// Argument key that carries the caller identity into every tool execution.
pub const IDENTITY_ARGUMENT: &str = "identity";

/// Executes model-requested tool calls against a [`Registry`].
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Registry,
}

impl ToolDispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher resolves tools from.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execute one tool call on behalf of `caller_identity`.
    ///
    /// Always returns an outcome; failures are encoded in it rather than
    /// raised.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: Value,
        caller_identity: &str,
    ) -> ToolOutcome {
        let mut arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                warn!(tool = %tool_name, "rejecting non-object tool arguments");
                return ToolOutcome::failure(format!(
                    "arguments for tool '{tool_name}' must be a JSON object, got {}",
                    value_kind(&other)
                ));
            }
        };

        let tool = match self.registry.resolve(tool_name).await {
            Some(tool) => tool,
            None => {
                warn!(tool = %tool_name, "model requested unregistered tool");
                return ToolOutcome::failure(format!("tool '{tool_name}' is not registered"));
            }
        };

        if arguments.contains_key(IDENTITY_ARGUMENT) {
            warn!(tool = %tool_name, "discarding model-supplied identity argument");
        }
        arguments.insert(
            IDENTITY_ARGUMENT.to_string(),
            Value::String(caller_identity.to_string()),
        );

        debug!(tool = %tool_name, identity = %caller_identity, "executing tool");
        let started = Instant::now();
        let outcome = match tool.execute(Value::Object(arguments)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "tool execution failed");
                ToolOutcome::failure(e.to_string())
            }
        };
        debug!(
            tool = %tool_name,
            success = outcome.success,
            duration_ms = started.elapsed().as_millis() as u64,
            "tool finished"
        );
        outcome
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tool;
    use crate::types::ToolResultContent;
    use crate::DocentError;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug)]
    struct ArgumentEcho;

    #[async_trait]
    impl Tool for ArgumentEcho {
        fn name(&self) -> &str {
            "echo_arguments"
        }

        fn description(&self) -> &str {
            "Return the arguments as received"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
            Ok(ToolOutcome::json(arguments))
        }
    }

    #[derive(Debug)]
    struct AlwaysErr;

    #[async_trait]
    impl Tool for AlwaysErr {
        fn name(&self) -> &str {
            "always_err"
        }

        fn description(&self) -> &str {
            "Fail with an internal error"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, _arguments: Value) -> crate::Result<ToolOutcome> {
            Err(DocentError::invalid_input("broken on purpose"))
        }
    }

    async fn dispatcher_with_echo() -> ToolDispatcher {
        let registry = Registry::new();
        registry.register_tool(Box::new(ArgumentEcho)).await;
        ToolDispatcher::new(registry)
    }

    fn received_arguments(outcome: &ToolOutcome) -> Map<String, Value> {
        match &outcome.content {
            ToolResultContent::Json(Value::Object(map)) => map.clone(),
            other => panic!("expected JSON object content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_identity_is_injected() {
        let dispatcher = dispatcher_with_echo().await;
        let outcome = dispatcher
            .invoke("echo_arguments", json!({"topic": "birds"}), "mira")
            .await;

        assert!(outcome.success);
        let arguments = received_arguments(&outcome);
        assert_eq!(arguments[IDENTITY_ARGUMENT], json!("mira"));
        assert_eq!(arguments["topic"], json!("birds"));
    }

    #[tokio::test]
    async fn test_model_supplied_identity_is_discarded() {
        let dispatcher = dispatcher_with_echo().await;
        let outcome = dispatcher
            .invoke("echo_arguments", json!({"identity": "someone_else"}), "mira")
            .await;

        let arguments = received_arguments(&outcome);
        assert_eq!(arguments[IDENTITY_ARGUMENT], json!("mira"));
    }

    #[tokio::test]
    async fn test_null_arguments_normalized_to_object() {
        let dispatcher = dispatcher_with_echo().await;
        let outcome = dispatcher.invoke("echo_arguments", Value::Null, "mira").await;

        let arguments = received_arguments(&outcome);
        assert_eq!(arguments.len(), 1);
        assert_eq!(arguments[IDENTITY_ARGUMENT], json!("mira"));
    }

    #[tokio::test]
    async fn test_non_object_arguments_become_failure() {
        let dispatcher = dispatcher_with_echo().await;
        let outcome = dispatcher
            .invoke("echo_arguments", json!("just a string"), "mira")
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("JSON object"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_failure() {
        let dispatcher = dispatcher_with_echo().await;
        let outcome = dispatcher.invoke("missing_tool", json!({}), "mira").await;

        assert!(!outcome.success);
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .contains("'missing_tool' is not registered"));
    }

    #[tokio::test]
    async fn test_executor_error_becomes_failure() {
        let registry = Registry::new();
        registry.register_tool(Box::new(AlwaysErr)).await;
        let dispatcher = ToolDispatcher::new(registry);

        let outcome = dispatcher.invoke("always_err", json!({}), "mira").await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("broken on purpose"));
    }
}
