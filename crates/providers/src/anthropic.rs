//! Anthropic native provider.
//!
//! Uses the Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field, marked `cache_control: ephemeral`
//!   so the prompt prefix (system + tools) is cached between turns
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with `content_block_delta` events
//!
//! The SSE decoding lives in [`AnthropicDecoder`] so it can be exercised
//! against fixtures without a network.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use voxtask_core::{
    ChatMessage, ChatRole, EventStream, LlmProvider, ProviderError, StopReason, StreamEvent,
    StreamRequest, TokenUsage, ToolDefinition,
};

use crate::sse::SseFramer;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Custom base URL (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert provider-agnostic messages to Anthropic content blocks.
    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg.role {
                ChatRole::User => {
                    if msg.tool_results.is_empty() {
                        result.push(ApiMessage {
                            role: "user".into(),
                            content: ApiContent::Text(msg.content.clone()),
                        });
                    } else {
                        let blocks = msg
                            .tool_results
                            .iter()
                            .map(|r| ContentBlock::ToolResult {
                                tool_use_id: r.tool_use_id.clone(),
                                content: r.content.clone(),
                            })
                            .collect();
                        result.push(ApiMessage {
                            role: "user".into(),
                            content: ApiContent::Blocks(blocks),
                        });
                    }
                }
                ChatRole::Assistant => {
                    if msg.tool_calls.is_empty() {
                        result.push(ApiMessage {
                            role: "assistant".into(),
                            content: ApiContent::Text(msg.content.clone()),
                        });
                    } else {
                        let mut blocks: Vec<ContentBlock> = Vec::new();
                        if !msg.content.is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: msg.content.clone(),
                            });
                        }
                        for call in &msg.tool_calls {
                            blocks.push(ContentBlock::ToolUse {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                input: call.input.clone(),
                            });
                        }
                        result.push(ApiMessage {
                            role: "assistant".into(),
                            content: ApiContent::Blocks(blocks),
                        });
                    }
                }
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
        tools
            .iter()
            .map(|t| ApiTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: StreamRequest) -> Result<EventStream, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_output_tokens,
            "stream": true,
            "system": [{
                "type": "text",
                "text": request.system,
                "cache_control": {"type": "ephemeral"},
            }],
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(model = %self.model, messages = request.messages.len(), "Anthropic stream request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut framer = SseFramer::new();
            let mut decoder = AnthropicDecoder::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for payload in framer.push(&bytes) {
                    for event in decoder.decode(&payload) {
                        if tx.send(Ok(event)).await.is_err() {
                            return; // receiver dropped; stop reading
                        }
                    }
                    if decoder.finished {
                        return;
                    }
                }
            }

            if !decoder.finished {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(
                        "stream ended before message_stop".into(),
                    )))
                    .await;
            }
        });

        Ok(rx)
    }
}

/// Translates Anthropic SSE payloads into normalized stream events.
/// Tool-call argument JSON arrives as `input_json_delta` fragments; they are
/// buffered per content block and parsed at `content_block_stop`.
#[derive(Debug, Default)]
pub(crate) struct AnthropicDecoder {
    current_tool: Option<(String, String)>,
    args_buffer: String,
    usage: TokenUsage,
    stop_reason: Option<StopReason>,
    pub(crate) finished: bool,
}

impl AnthropicDecoder {
    pub(crate) fn decode(&mut self, payload: &str) -> Vec<StreamEvent> {
        let event: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, payload, "Ignoring unparseable Anthropic SSE payload");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                let usage = &event["message"]["usage"];
                self.usage.input_tokens = usage["input_tokens"].as_u64().unwrap_or(0);
                self.usage.cache_write_tokens =
                    usage["cache_creation_input_tokens"].as_u64().unwrap_or(0);
                self.usage.cache_read_tokens =
                    usage["cache_read_input_tokens"].as_u64().unwrap_or(0);
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    let id = block["id"].as_str().unwrap_or_default().to_string();
                    let name = block["name"].as_str().unwrap_or_default().to_string();
                    self.args_buffer.clear();
                    out.push(StreamEvent::ToolCallStart {
                        id: id.clone(),
                        name: name.clone(),
                    });
                    self.current_tool = Some((id, name));
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str() {
                            out.push(StreamEvent::TextDelta { text: text.into() });
                        }
                    }
                    "input_json_delta" => {
                        if let Some(fragment) = delta["partial_json"].as_str() {
                            self.args_buffer.push_str(fragment);
                            if let Some((id, _)) = &self.current_tool {
                                out.push(StreamEvent::ToolCallArgsDelta {
                                    id: id.clone(),
                                    fragment: fragment.into(),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some((id, name)) = self.current_tool.take() {
                    let input = parse_args(&self.args_buffer);
                    self.args_buffer.clear();
                    out.push(StreamEvent::ToolCallComplete { id, name, input });
                }
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(map_stop_reason(reason));
                }
                if let Some(output) = event["usage"]["output_tokens"].as_u64() {
                    self.usage.output_tokens = output;
                }
            }
            "message_stop" => {
                out.push(StreamEvent::Usage { usage: self.usage });
                out.push(StreamEvent::Stop {
                    reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
                });
                self.finished = true;
            }
            "error" => {
                // Surface as an error stop; the agent treats it as transient.
                out.push(StreamEvent::Stop {
                    reason: StopReason::Error,
                });
                self.finished = true;
            }
            _ => {}
        }
        out
    }
}

/// Empty or malformed argument JSON falls back to an empty object; the
/// dispatcher's schema validation reports the miss to the model.
fn parse_args(buffer: &str) -> Value {
    if buffer.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(buffer).unwrap_or_else(|e| {
        warn!(error = %e, raw = buffer, "Failed to parse tool input JSON");
        Value::Object(serde_json::Map::new())
    })
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" => StopReason::EndTurn,
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        _ => StopReason::Error,
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxtask_core::{ToolInvocation, ToolOutcome};

    #[test]
    fn message_conversion_tool_results_go_as_user_blocks() {
        let msg = ChatMessage::tool_results(vec![ToolOutcome {
            tool_use_id: "toolu_1".into(),
            content: r#"{"success":true}"#.into(),
        }]);
        let api = AnthropicProvider::to_api_messages(&[msg]);
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].role, "user");
        match &api[0].content {
            ApiContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    assert_eq!(tool_use_id, "toolu_1")
                }
                _ => panic!("expected tool_result block"),
            },
            _ => panic!("expected blocks"),
        }
    }

    #[test]
    fn message_conversion_assistant_with_tools() {
        let msg = ChatMessage::assistant_with_tools(
            "Creating it",
            vec![ToolInvocation {
                id: "toolu_2".into(),
                name: "create_task".into(),
                input: serde_json::json!({"title": "Call the dentist"}),
            }],
        );
        let api = AnthropicProvider::to_api_messages(&[msg]);
        match &api[0].content {
            ApiContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2); // text + tool_use
                assert!(matches!(blocks[0], ContentBlock::Text { .. }));
                assert!(matches!(blocks[1], ContentBlock::ToolUse { .. }));
            }
            _ => panic!("expected blocks"),
        }
    }

    #[test]
    fn decoder_text_stream() {
        let mut decoder = AnthropicDecoder::default();
        let mut events = Vec::new();

        for payload in [
            r#"{"type":"message_start","message":{"usage":{"input_tokens":120,"cache_creation_input_tokens":800,"cache_read_input_tokens":2400}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Do"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"ne"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
            r#"{"type":"message_stop"}"#,
        ] {
            events.extend(decoder.decode(payload));
        }

        let texts: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Do", "ne"]);

        match &events[events.len() - 2] {
            StreamEvent::Usage { usage } => {
                assert_eq!(usage.input_tokens, 120);
                assert_eq!(usage.cache_write_tokens, 800);
                assert_eq!(usage.cache_read_tokens, 2400);
                assert_eq!(usage.output_tokens, 5);
            }
            other => panic!("expected usage, got {other:?}"),
        }
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Stop {
                reason: StopReason::EndTurn
            })
        ));
        assert!(decoder.finished);
    }

    #[test]
    fn decoder_assembles_tool_args_across_fragments() {
        let mut decoder = AnthropicDecoder::default();
        let mut events = Vec::new();

        for payload in [
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_9","name":"create_task"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"title\": \"Call"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":" the dentist\"}"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":30}}"#,
            r#"{"type":"message_stop"}"#,
        ] {
            events.extend(decoder.decode(payload));
        }

        assert!(matches!(
            &events[0],
            StreamEvent::ToolCallStart { id, name } if id == "toolu_9" && name == "create_task"
        ));

        let complete = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::ToolCallComplete { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .expect("tool call must complete");
        assert_eq!(complete.0, "toolu_9");
        assert_eq!(complete.1, "create_task");
        assert_eq!(complete.2["title"], "Call the dentist");

        assert!(matches!(
            events.last(),
            Some(StreamEvent::Stop {
                reason: StopReason::ToolUse
            })
        ));
    }

    #[test]
    fn decoder_empty_tool_args_become_empty_object() {
        let mut decoder = AnthropicDecoder::default();
        decoder.decode(
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"get_task_stats"}}"#,
        );
        let events = decoder.decode(r#"{"type":"content_block_stop","index":0}"#);
        match &events[0] {
            StreamEvent::ToolCallComplete { input, .. } => {
                assert_eq!(input, &serde_json::json!({}));
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn decoder_ignores_garbage() {
        let mut decoder = AnthropicDecoder::default();
        assert!(decoder.decode("not json").is_empty());
        assert!(decoder.decode(r#"{"type":"ping"}"#).is_empty());
    }

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(map_stop_reason("end_turn"), StopReason::EndTurn);
        assert_eq!(map_stop_reason("tool_use"), StopReason::ToolUse);
        assert_eq!(map_stop_reason("max_tokens"), StopReason::MaxTokens);
        assert_eq!(map_stop_reason("refusal"), StopReason::Error);
    }
}
