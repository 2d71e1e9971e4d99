//! Renders the `<details>`-wrapped tool-invocation and tool-result blocks
//! the orchestrator streams to the caller around an MCP dispatch (§4.4).

use serde_json::Value;

/// The pre-feedback block shown before a tool call is dispatched.
pub fn format_invocation(tool_name: &str, hostname: &str, arguments: &Value) -> String {
    let pretty = serde_json::to_string_pretty(arguments).unwrap_or_else(|_| arguments.to_string());
    format!(
        "<details>\n<summary>Calling <code>{tool_name}</code> on {hostname}</summary>\n\n```json\n{pretty}\n```\n</details>\n\n"
    )
}

/// Renders a successful `tools/call` JSON-RPC result.
pub fn format_result(result: &Value) -> String {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return format_error(&format!(
            "MCP server returned a malformed result: {result}"
        ));
    };
    if content.is_empty() {
        return format_error("MCP server returned an empty result");
    }

    let mut body = String::new();
    for block in content {
        let block_type = block.get("type").and_then(Value::as_str).unwrap_or("");
        match block_type {
            "text" => {
                let text = block.get("text").and_then(Value::as_str).unwrap_or("");
                if serde_json::from_str::<Value>(text).is_ok() {
                    body.push_str(&format!("```json\n{text}\n```\n\n"));
                } else {
                    body.push_str(&format!("```markdown\n{text}\n```\n\n"));
                }
            }
            "image" => {
                let data = block.get("data").and_then(Value::as_str).unwrap_or("");
                body.push_str(&format!("[Image: {data}]\n\n"));
            }
            _ => {
                body.push_str(&format!("```json\n{block}\n```\n\n"));
            }
        }
    }

    let approx_tokens = body.chars().count() / 5;
    format!(
        "<details>\n<summary>Result (~{approx_tokens} tokens)</summary>\n\n{body}</details>\n\n"
    )
}

/// Renders a JSON-RPC result with no usable `content` array, or any
/// dispatch-time failure surfaced into the conversation.
pub fn format_error(message: &str) -> String {
    format!("<details open>\n<summary>Error</summary>\n\n{message}\n</details>\n\n")
}

/// The plain `**Error**: ...` tool message form used when dispatch itself
/// fails (init failure, non-2xx, JSON-RPC error, session expiry).
pub fn format_dispatch_error(message: &str) -> String {
    format!("**Error**: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_text_block_as_json_fence_when_valid_json() {
        let result = json!({"content": [{"type": "text", "text": "{\"a\":1}"}]});
        let rendered = format_result(&result);
        assert!(rendered.contains("```json"));
        assert!(rendered.contains("{\"a\":1}"));
    }

    #[test]
    fn renders_text_block_as_markdown_fence_when_not_json() {
        let result = json!({"content": [{"type": "text", "text": "found it"}]});
        let rendered = format_result(&result);
        assert!(rendered.contains("```markdown"));
        assert!(rendered.contains("found it"));
    }

    #[test]
    fn renders_image_block() {
        let result = json!({"content": [{"type": "image", "data": "base64=="}]});
        let rendered = format_result(&result);
        assert!(rendered.contains("[Image: base64==]"));
    }

    #[test]
    fn missing_content_array_renders_as_error() {
        let result = json!({"something_else": true});
        let rendered = format_result(&result);
        assert!(rendered.contains("Error"));
    }

    #[test]
    fn empty_content_array_renders_as_error() {
        let result = json!({"content": []});
        let rendered = format_result(&result);
        assert!(rendered.contains("Error"));
    }
}
