//! Translation between tool-host catalogs and model function specs.

use crate::llm::ToolSpec;
use mcp::{CallToolResult, Tool, ToolContent};
use serde_json::{Map, Value};
use tracing::debug;

/// Map each tool to a function spec, one to one and in order.
pub fn to_function_specs(tools: &[Tool]) -> Vec<ToolSpec> {
    tools
        .iter()
        .map(|tool| ToolSpec {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        })
        .collect()
}

/// Decode model-produced arguments.
///
/// Anything that is not a JSON object, including the empty string, becomes
/// an empty object.
pub fn parse_arguments(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            debug!(kind = value_kind(&other), "tool arguments are not an object, using {{}}");
            Map::new()
        }
        Err(e) => {
            debug!(error = %e, "tool arguments are not valid JSON, using {{}}");
            Map::new()
        }
    }
}

/// The payload handed back to the caller for a successful call.
///
/// Structured content wins when the host provides it, so a tool returning
/// rows yields the rows themselves rather than text blocks that encode them.
/// Hosts that wrap non-object output (e.g. `{"result": [...]}`) are passed
/// through with the wrapper. Without structured content the blocks are
/// returned exactly as they arrived.
pub fn tool_payload(result: CallToolResult) -> Value {
    match result.structured_content {
        Some(structured) => structured,
        None => Value::Array(
            result
                .content
                .into_iter()
                .map(ToolContent::into_value)
                .collect(),
        ),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
