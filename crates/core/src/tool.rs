//! Tool trait, registry, and the normalized result envelope.
//!
//! Every tool declares a JSON-schema input contract. The registry validates
//! input against the contract before dispatch; validation failures come back
//! as `{success: false, message}` envelopes — never as raised errors — so
//! the model can observe the failure and adjust.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ToolDefinition;
use crate::ui::UiCommand;

/// The shape every tool handler returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub success: bool,
    pub message: String,
    /// Tool-specific payload, flattened into the envelope on the wire.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_command: Option<UiCommand>,
}

impl ToolEnvelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: serde_json::Map::new(),
            ui_command: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: serde_json::Map::new(),
            ui_command: None,
        }
    }

    /// Attach a payload field.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Attach a UI command.
    pub fn with_ui(mut self, command: UiCommand) -> Self {
        self.ui_command = Some(command);
        self
    }

    /// The full envelope as a JSON value (what gets recorded as a tool
    /// result and fed back to the model).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({"success": false, "message": "envelope serialization failed"})
        })
    }
}

/// A named, schema-validated operation the model may request.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Description sent to the LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for the input contract.
    fn input_schema(&self) -> Value;

    /// Execute with already-validated input.
    async fn call(&self, input: Value) -> ToolEnvelope;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Registry mapping tool names to handlers. Registration order is preserved
/// so the tool enumeration sent to the model is deterministic.
pub struct ToolRegistry {
    tools: Vec<Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn ToolHandler>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Validate and dispatch. Unknown tools and contract violations return
    /// failure envelopes rather than errors.
    pub async fn dispatch(&self, name: &str, input: Value) -> ToolEnvelope {
        let Some(tool) = self.get(name) else {
            return ToolEnvelope::fail(format!("Unknown tool: {name}"));
        };

        if let Err(reason) = schema::validate(&tool.input_schema(), &input) {
            return ToolEnvelope::fail(format!("Invalid input for {name}: {reason}"));
        }

        tool.call(input).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal JSON-schema validation covering the subset the tool contracts
/// use: object types, required fields, property types, string enums, and
/// array item schemas. Anything else passes.
pub mod schema {
    use serde_json::Value;

    pub fn validate(schema: &Value, input: &Value) -> Result<(), String> {
        validate_at(schema, input, "input")
    }

    fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
        if let Some(ty) = schema.get("type").and_then(Value::as_str) {
            check_type(ty, value, path)?;
        }

        if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                return Err(format!("{path} must be one of [{}]", names.join(", ")));
            }
        }

        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            if let Some(obj) = value.as_object() {
                if let Some(required) = schema.get("required").and_then(Value::as_array) {
                    for req in required.iter().filter_map(Value::as_str) {
                        if !obj.contains_key(req) {
                            return Err(format!("{path} is missing required field '{req}'"));
                        }
                    }
                }
                for (key, prop_schema) in props {
                    if let Some(field) = obj.get(key) {
                        if !field.is_null() {
                            validate_at(prop_schema, field, &format!("{path}.{key}"))?;
                        }
                    }
                }
            }
        }

        if let Some(items) = schema.get("items") {
            if let Some(arr) = value.as_array() {
                for (i, item) in arr.iter().enumerate() {
                    validate_at(items, item, &format!("{path}[{i}]"))?;
                }
            }
        }

        Ok(())
    }

    fn check_type(ty: &str, value: &Value, path: &str) -> Result<(), String> {
        let ok = match ty {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{path} must be of type {ty}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "Echoes back the input text"
        }
        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "mode": {"type": "string", "enum": ["plain", "loud"]}
                },
                "required": ["text"]
            })
        }
        async fn call(&self, input: Value) -> ToolEnvelope {
            let text = input["text"].as_str().unwrap_or_default();
            ToolEnvelope::ok("echoed").with("text", json!(text))
        }
    }

    #[tokio::test]
    async fn dispatch_validates_and_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let env = registry.dispatch("echo", json!({"text": "hello"})).await;
        assert!(env.success);
        assert_eq!(env.payload["text"], "hello");
    }

    #[tokio::test]
    async fn missing_required_field_fails_softly() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let env = registry.dispatch("echo", json!({})).await;
        assert!(!env.success);
        assert!(env.message.contains("required field 'text'"));
    }

    #[tokio::test]
    async fn enum_violation_fails_softly() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let env = registry
            .dispatch("echo", json!({"text": "hi", "mode": "whisper"}))
            .await;
        assert!(!env.success);
        assert!(env.message.contains("mode"));
    }

    #[tokio::test]
    async fn unknown_tool_fails_softly() {
        let registry = ToolRegistry::new();
        let env = registry.dispatch("nonexistent", json!({})).await;
        assert!(!env.success);
        assert!(env.message.contains("Unknown tool"));
    }

    #[test]
    fn envelope_flattens_payload() {
        let env = ToolEnvelope::ok("done").with("count", json!(3));
        let value = env.to_value();
        assert_eq!(value["success"], true);
        assert_eq!(value["count"], 3);
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn registry_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.definitions().len(), 1);
    }

    #[test]
    fn schema_validates_array_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ids": {"type": "array", "items": {"type": "integer"}}
            }
        });
        assert!(schema::validate(&schema, &json!({"ids": [1, 2]})).is_ok());
        let err = schema::validate(&schema, &json!({"ids": [1, "two"]})).unwrap_err();
        assert!(err.contains("ids[1]"));
    }
}
