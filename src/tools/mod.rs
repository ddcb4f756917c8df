//! Server-side tools the chat route can offer to models.

mod calculator;
mod datetime;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::llm::{ToolCall, ToolCallHandler, ToolDefinition, ToolExecutionError};

pub use calculator::{evaluate, Calculator, EvalError};
pub use datetime::CurrentDateTime;

pub trait BuiltinTool {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    type Params: DeserializeOwned;

    /// JSON schema of `Params`.
    fn parameters() -> Value;

    fn run(params: Self::Params) -> Result<String, ToolExecutionError>;

    fn definition() -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: Self::DESCRIPTION.to_string(),
            parameters: Self::parameters(),
        }
    }
}

fn invoke<T: BuiltinTool>(arguments: &Value) -> Result<String, ToolExecutionError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        // Some providers double-encode; an unparseable string is reported below.
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| arguments.clone()),
        other => other.clone(),
    };
    let params: T::Params = serde_json::from_value(arguments)
        .map_err(|e| ToolExecutionError::new(format!("invalid arguments for {}: {e}", T::NAME)))?;
    T::run(params)
}

/// Dispatches tool calls to the built-in tools by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolRegistry;

impl ToolRegistry {
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![Calculator::definition(), CurrentDateTime::definition()]
    }
}

#[async_trait]
impl ToolCallHandler for ToolRegistry {
    async fn handle(&self, call: &ToolCall) -> Result<String, ToolExecutionError> {
        tracing::debug!(tool = %call.name, call_id = %call.id, "Running built-in tool");
        match call.name.as_str() {
            name if name == Calculator::NAME => invoke::<Calculator>(&call.arguments),
            name if name == CurrentDateTime::NAME => invoke::<CurrentDateTime>(&call.arguments),
            other => Err(ToolExecutionError::new(format!("unknown tool: {other}"))),
        }
    }
}
