//! Tool trait and the name-keyed registry the agent dispatches through.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, ToolError};
use crate::schema::InputSchema;

/// Result of a successful tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Text handed back to the model.
    pub text: String,
    /// Structured extras for callers; never sent to the model.
    pub details: Option<Value>,
}

impl Observation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// A capability the model can request by name.
///
/// Implementations hold configuration only; no state carries over between
/// invocations.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> &InputSchema;

    /// Run the tool. `args` has already been validated against
    /// [`AgentTool::input_schema`].
    async fn execute(
        &self,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<Observation, ToolError>;
}

/// Description of a tool as surfaced to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Fixed set of tools, built once at startup and shared read-only.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateToolName(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every registered tool, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.input_schema().to_json_schema(),
            })
            .collect()
    }

    /// Look up `name`, validate `args`, then run the tool.
    pub async fn dispatch(
        &self,
        name: &str,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<Observation, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        tool.input_schema().validate(&args)?;
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        tracing::debug!(tool = name, "Dispatching tool");
        let result = tool.execute(args, cancel).await;
        if let Err(e) = &result {
            tracing::debug!(tool = name, kind = e.kind(), error = %e, "Tool failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool {
        schema: InputSchema,
        calls: AtomicUsize,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                schema: InputSchema::new().required("text", ParamKind::String, "Text to echo"),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AgentTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo text back"
        }

        fn input_schema(&self) -> &InputSchema {
            &self.schema
        }

        async fn execute(
            &self,
            args: Value,
            _cancel: &CancellationToken,
        ) -> Result<Observation, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Observation::text(args["text"].as_str().unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn test_dispatch_known_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new())).unwrap();

        let obs = registry
            .dispatch("echo", json!({"text": "hi"}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(obs.text, "hi");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .dispatch("nope", json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Unknown("nope".into()));
    }

    #[tokio::test]
    async fn test_invalid_args_never_reach_the_tool() {
        let tool = Arc::new(EchoTool::new());
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone()).unwrap();

        let err = registry
            .dispatch("echo", json!({"text": 5}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new())).unwrap();
        let err = registry.register(Arc::new(EchoTool::new())).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateToolName("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new())).unwrap();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"], json!(["text"]));
    }
}
