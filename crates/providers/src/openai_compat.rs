//! OpenAI-compatible provider.
//!
//! Works with any `/v1/chat/completions` endpoint. Differences from the
//! Anthropic dialect that this adapter absorbs:
//! - tools wrapped in `{"type": "function", "function": {...}}`
//! - tool results as `role: "tool"` messages keyed by `tool_call_id`
//! - tool-call argument deltas keyed by array index, not block
//! - usage in a trailing chunk (`stream_options.include_usage`), with
//!   cached input inside `prompt_tokens_details.cached_tokens` and
//!   **included** in `prompt_tokens` — the decoder subtracts it so the
//!   four usage counters stay non-overlapping.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use voxtask_core::{
    ChatMessage, ChatRole, EventStream, LlmProvider, ProviderError, StopReason, StreamEvent,
    StreamRequest, TokenUsage, ToolDefinition,
};

use crate::sse::SseFramer;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatProvider {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
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

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_api_messages(system: &str, messages: &[ChatMessage]) -> Vec<ApiMessage> {
        let mut result = vec![ApiMessage {
            role: "system".into(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }];

        for msg in messages {
            match msg.role {
                ChatRole::User if !msg.tool_results.is_empty() => {
                    for outcome in &msg.tool_results {
                        result.push(ApiMessage {
                            role: "tool".into(),
                            content: Some(outcome.content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(outcome.tool_use_id.clone()),
                        });
                    }
                }
                ChatRole::User => result.push(ApiMessage {
                    role: "user".into(),
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                }),
                ChatRole::Assistant => {
                    let tool_calls = if msg.tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            msg.tool_calls
                                .iter()
                                .map(|call| ApiToolCall {
                                    id: call.id.clone(),
                                    r#type: "function".into(),
                                    function: ApiFunction {
                                        name: call.name.clone(),
                                        arguments: call.input.to_string(),
                                    },
                                })
                                .collect(),
                        )
                    };
                    result.push(ApiMessage {
                        role: "assistant".into(),
                        content: Some(msg.content.clone()),
                        tool_calls,
                        tool_call_id: None,
                    });
                }
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: StreamRequest) -> Result<EventStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.system, &request.messages),
            "max_tokens": request.max_output_tokens,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(Self::to_api_tools(&request.tools));
        }

        debug!(model = %self.model, messages = request.messages.len(), "OpenAI stream request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "OpenAI-compatible API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut framer = SseFramer::new();
            let mut decoder = OpenAiDecoder::default();

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
                            return;
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
                        "stream ended before [DONE]".into(),
                    )))
                    .await;
            }
        });

        Ok(rx)
    }
}

/// Per-index accumulator for streamed tool-call deltas.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
    started: bool,
}

/// Translates OpenAI-style SSE payloads into normalized stream events.
#[derive(Debug, Default)]
pub(crate) struct OpenAiDecoder {
    accumulators: BTreeMap<u64, ToolCallAccumulator>,
    usage: Option<TokenUsage>,
    stop_reason: Option<StopReason>,
    flushed: bool,
    pub(crate) finished: bool,
}

impl OpenAiDecoder {
    pub(crate) fn decode(&mut self, payload: &str) -> Vec<StreamEvent> {
        if payload == "[DONE]" {
            let mut out = self.flush_tool_calls();
            if let Some(usage) = self.usage.take() {
                out.push(StreamEvent::Usage { usage });
            }
            out.push(StreamEvent::Stop {
                reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
            });
            self.finished = true;
            return out;
        }

        let chunk: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, payload, "Ignoring unparseable OpenAI SSE payload");
                return Vec::new();
            }
        };

        let mut out = Vec::new();

        // The usage-only trailer has an empty choices array.
        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0);
            let cached = usage["prompt_tokens_details"]["cached_tokens"]
                .as_u64()
                .unwrap_or(0);
            self.usage = Some(TokenUsage {
                input_tokens: prompt.saturating_sub(cached),
                output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
                cache_read_tokens: cached,
                cache_write_tokens: 0,
            });
        }

        let Some(choice) = chunk["choices"].get(0) else {
            return out;
        };

        let delta = &choice["delta"];
        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                out.push(StreamEvent::TextDelta { text: text.into() });
            }
        }

        if let Some(tool_deltas) = delta["tool_calls"].as_array() {
            for tc in tool_deltas {
                let index = tc["index"].as_u64().unwrap_or(0);
                let acc = self.accumulators.entry(index).or_default();
                if let Some(id) = tc["id"].as_str() {
                    acc.id = id.into();
                }
                if let Some(name) = tc["function"]["name"].as_str() {
                    acc.name.push_str(name);
                }
                if !acc.started && !acc.id.is_empty() && !acc.name.is_empty() {
                    acc.started = true;
                    out.push(StreamEvent::ToolCallStart {
                        id: acc.id.clone(),
                        name: acc.name.clone(),
                    });
                }
                if let Some(fragment) = tc["function"]["arguments"].as_str() {
                    if !fragment.is_empty() {
                        acc.arguments.push_str(fragment);
                        out.push(StreamEvent::ToolCallArgsDelta {
                            id: acc.id.clone(),
                            fragment: fragment.into(),
                        });
                    }
                }
            }
        }

        if let Some(reason) = choice["finish_reason"].as_str() {
            self.stop_reason = Some(match reason {
                "tool_calls" => StopReason::ToolUse,
                "stop" => StopReason::EndTurn,
                "length" => StopReason::MaxTokens,
                _ => StopReason::Error,
            });
            out.extend(self.flush_tool_calls());
        }

        out
    }

    /// Emit `ToolCallComplete` for every fully-accumulated call, once.
    fn flush_tool_calls(&mut self) -> Vec<StreamEvent> {
        if self.flushed {
            return Vec::new();
        }
        self.flushed = true;

        self.accumulators
            .values()
            .map(|acc| {
                let input = if acc.arguments.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&acc.arguments).unwrap_or_else(|e| {
                        warn!(error = %e, raw = %acc.arguments, "Failed to parse tool arguments");
                        Value::Object(serde_json::Map::new())
                    })
                };
                StreamEvent::ToolCallComplete {
                    id: acc.id.clone(),
                    name: acc.name.clone(),
                    input,
                }
            })
            .collect()
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}
