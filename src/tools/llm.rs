// src/tools/llm.rs: Bridging tool calls to and from model responses
//
// Three response shapes are understood: OpenAI-style chat completions
// (`choices[0].message.tool_calls`), a bare `tool_calls` array, and
// Anthropic-style `content` blocks with `type == "tool_use"`.

use serde_json::{json, Value};

use super::executor::{ToolCall, ToolCallStatus};
use super::Params;

/// Extract tool calls from a model response. Malformed entries are skipped.
pub fn parse_tool_calls(response: &Value) -> Vec<ToolCall> {
    if let Some(choices) = response.get("choices").and_then(Value::as_array) {
        let Some(message) = choices.first().and_then(|c| c.get("message")) else {
            tracing::warn!("Model response has an empty choices array");
            return Vec::new();
        };
        return message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| parse_function_calls(calls))
            .unwrap_or_default();
    }

    if let Some(calls) = response.get("tool_calls").and_then(Value::as_array) {
        return parse_function_calls(calls);
    }

    if let Some(blocks) = response.get("content").and_then(Value::as_array) {
        return blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
            .enumerate()
            .filter_map(|(i, b)| {
                let name = b.get("name")?.as_str()?;
                let id = b
                    .get("id")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("call_{i}"));
                let params = b
                    .get("input")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                Some(ToolCall::with_id(id, name, params))
            })
            .collect();
    }

    Vec::new()
}

fn parse_function_calls(calls: &[Value]) -> Vec<ToolCall> {
    let mut parsed = Vec::new();
    for (i, tc) in calls.iter().enumerate() {
        if tc.get("type").and_then(Value::as_str) != Some("function") {
            tracing::debug!("Skipping non-function tool call");
            continue;
        }
        let Some(function) = tc.get("function") else {
            continue;
        };
        let Some(name) = function.get("name").and_then(Value::as_str) else {
            continue;
        };
        let params = match function.get("arguments") {
            // Chat completions send arguments as a JSON-encoded string.
            Some(Value::String(raw)) => match serde_json::from_str::<Params>(raw) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(tool = %name, "Unparseable tool arguments: {}", e);
                    continue;
                }
            },
            Some(Value::Object(map)) => map.clone(),
            _ => Params::new(),
        };
        let id = tc
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format!("call_{i}"));
        parsed.push(ToolCall::with_id(id, name, params));
    }
    parsed
}

/// Render finished calls as tool-result messages a model can consume.
pub fn format_results_for_llm(calls: &[ToolCall]) -> Vec<Value> {
    calls
        .iter()
        .map(|tc| {
            let elapsed = tc.elapsed.map(|d| d.as_secs_f64()).unwrap_or(0.0);
            let content = match (&tc.status, &tc.result) {
                (ToolCallStatus::Completed, Some(result)) if result.success => json!({
                    "success": true,
                    "data": result.data,
                    "execution_time": elapsed,
                }),
                (ToolCallStatus::Completed, Some(result)) => json!({
                    "success": false,
                    "error": result.error,
                    "execution_time": elapsed,
                }),
                _ => json!({
                    "success": false,
                    "error": tc.error.clone().unwrap_or_else(|| {
                        format!("Tool call failed with status: {}", tc.status.as_str())
                    }),
                    "execution_time": elapsed,
                }),
            };
            json!({
                "tool_call_id": tc.id,
                "content": content.to_string(),
            })
        })
        .collect()
}
