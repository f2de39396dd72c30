//! Tool Registry
//!
//! Maps a tool name to a synchronous handler and the JSON schema of its
//! arguments. Dispatch through [`ToolRegistry::invoke`] is total: unknown
//! tools, malformed arguments, handler errors and handler panics all come
//! back as an error-shaped [`ToolResult`] carrying the invocation's id.

use crate::generic_types::{ToolInvocation, ToolResult};
use schemars::{JsonSchema, SchemaGenerator};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};

/// Errors a tool call can end in. Never escapes [`ToolRegistry::invoke`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown function: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {name}: {source}")]
    InvalidArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Failed(String),
    #[error("Function {0} panicked")]
    Panicked(String),
}

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: Value,
}

type Handler = Box<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>;

struct RegisteredTool {
    declaration: ToolDeclaration,
    handler: Handler,
}

/// Name → handler table. Built once at startup and shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed handler. The argument schema is derived from `A`.
    pub fn register<A, R, F>(&mut self, name: &str, description: &str, handler: F) -> &mut Self
    where
        A: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Result<R, String> + Send + Sync + 'static,
    {
        let tool_name = name.to_string();
        let wrapped: Handler = Box::new(move |args: Value| {
            let parsed: A =
                serde_json::from_value(args).map_err(|source| ToolError::InvalidArguments {
                    name: tool_name.clone(),
                    source,
                })?;
            let result = handler(parsed).map_err(ToolError::Failed)?;
            serde_json::to_value(result).map_err(|e| ToolError::Failed(e.to_string()))
        });

        self.tools.insert(
            name.to_string(),
            RegisteredTool {
                declaration: ToolDeclaration {
                    name: name.to_string(),
                    description: description.to_string(),
                    parameters: parameters_schema::<A>(),
                },
                handler: wrapped,
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations for every registered tool, ordered by name.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|t| t.declaration.clone()).collect()
    }

    /// Runs a tool by name. Panics inside the handler are caught.
    pub fn call(&self, name: &str, args: Map<String, Value>) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        panic::catch_unwind(AssertUnwindSafe(|| (tool.handler)(Value::Object(args))))
            .unwrap_or_else(|_| Err(ToolError::Panicked(name.to_string())))
    }

    /// Answers an invocation with exactly one result keyed by its id.
    pub fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
        let ToolInvocation { id, name, args } = invocation;
        info!(tool = %name, args = ?args, "Function call");

        let outcome = match self.call(&name, args) {
            Ok(value) => Ok(value),
            Err(e @ ToolError::UnknownTool(_)) => {
                warn!(tool = %name, "Model requested an unknown function");
                Err(e.to_string())
            }
            Err(e) => {
                error!(tool = %name, error = %e, "Error executing function");
                Err(e.to_string())
            }
        };

        ToolResult { id, name, outcome }
    }
}

fn parameters_schema<A: JsonSchema>() -> Value {
    let schema = SchemaGenerator::default().into_root_schema_for::<A>();
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        /// Text to echo back.
        text: String,
    }

    #[derive(Deserialize, JsonSchema)]
    struct NoArgs {}

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register("echo", "Echo the input", |args: EchoArgs| {
                Ok(json!({ "echo": args.text }))
            })
            .register("fail", "Always fails", |_: NoArgs| -> Result<Value, String> {
                Err("backend unavailable".to_string())
            })
            .register("explode", "Always panics", |_: NoArgs| -> Result<Value, String> {
                panic!("boom")
            });
        registry
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_invoke_known_tool() {
        let result = registry().invoke(ToolInvocation::new(
            Some("abc".into()),
            "echo",
            args(json!({"text": "hi"})),
        ));
        assert_eq!(result.id.as_deref(), Some("abc"));
        assert_eq!(result.name, "echo");
        assert_eq!(result.outcome, Ok(json!({"echo": "hi"})));
    }

    #[test]
    fn test_unknown_tools_yield_error_results() {
        let registry = registry();
        for name in ["", "get_weather", "ECHO", "echo "] {
            let result =
                registry.invoke(ToolInvocation::new(Some("id-9".into()), name, Map::new()));
            assert_eq!(result.id.as_deref(), Some("id-9"));
            assert!(result.is_error());
            assert!(result.response().contains_key("error"));
        }
    }

    #[test]
    fn test_handler_failures_keep_correlation_id() {
        let registry = registry();

        let failed = registry.invoke(ToolInvocation::new(Some("f1".into()), "fail", Map::new()));
        assert_eq!(failed.id.as_deref(), Some("f1"));
        assert_eq!(failed.outcome, Err("backend unavailable".to_string()));

        let panicked =
            registry.invoke(ToolInvocation::new(Some("p1".into()), "explode", Map::new()));
        assert_eq!(panicked.id.as_deref(), Some("p1"));
        assert_eq!(panicked.outcome, Err("Function explode panicked".to_string()));

        let invalid = registry.invoke(ToolInvocation::new(
            Some("i1".into()),
            "echo",
            args(json!({"text": 7})),
        ));
        assert_eq!(invalid.id.as_deref(), Some("i1"));
        assert!(invalid.is_error());
    }

    #[test]
    fn test_declarations_carry_schema() {
        let declarations = registry().declarations();
        let names: Vec<_> = declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "explode", "fail"]);

        let echo = &declarations[0];
        assert_eq!(echo.description, "Echo the input");
        assert_eq!(echo.parameters["type"], "object");
        assert_eq!(echo.parameters["properties"]["text"]["type"], "string");
        assert_eq!(echo.parameters["required"], json!(["text"]));
        assert!(echo.parameters.get("$schema").is_none());
    }
}
