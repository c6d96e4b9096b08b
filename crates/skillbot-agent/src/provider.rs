//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (DashScope compatible mode, OpenRouter, vLLM, ...).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use skillbot_config::ModelConfig;
use skillbot_tools::ToolDefinition;
use skillbot_types::{ConversationState, ModelReply, Role, ToolCall, Turn};

use crate::error::ModelError;
use crate::model::{ChatModel, TextStream};

pub struct OpenAiCompatModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    /// Whole-request limit for `respond`; per-chunk idle limit for `stream`.
    timeout: Duration,
}

// -- wire types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl OpenAiCompatModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        // No client-wide total timeout: it would also cut long SSE bodies.
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ModelError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build from configuration, reading the key from `api_key_env`.
    pub fn from_config(config: &ModelConfig, timeout: Duration) -> Result<Self, ModelError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| ModelError::MissingApiKey(config.api_key_env.clone()))?;
        let model = Self::new(&config.base_url, &config.model, api_key, timeout)?;
        tracing::info!(model = %model.model, base_url = %model.base_url, "Model client initialized");
        Ok(model)
    }

    async fn post(
        &self,
        body: &ChatRequest<'_>,
        total_timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).bearer_auth(&self.api_key).json(body);
        if let Some(timeout) = total_timeout {
            request = request.timeout(timeout);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(text);
            tracing::warn!(status = %status, error = %message, "Model API error");
            return Err(ModelError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn id(&self) -> &str {
        &self.model
    }

    async fn respond(
        &self,
        state: &ConversationState,
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages: state.turns().iter().map(to_wire).collect(),
            tools: tools
                .iter()
                .map(|function| WireTool {
                    kind: "function",
                    function,
                })
                .collect(),
            parallel_tool_calls: (!tools.is_empty()).then_some(false),
            stream: false,
        };
        tracing::debug!(model = %self.model, messages = body.messages.len(), "Invoking model");

        let resp: ChatResponse = self
            .post(&body, Some(self.timeout))
            .await?
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        let message = resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ModelError::InvalidResponse("no choices".into()))?;
        parse_reply(message)
    }

    async fn stream(&self, turns: Vec<Turn>) -> Result<TextStream, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages: turns.iter().map(to_wire).collect(),
            tools: Vec::new(),
            parallel_tool_calls: None,
            stream: true,
        };
        let idle = self.timeout;
        let resp = tokio::time::timeout(idle, self.post(&body, None))
            .await
            .map_err(|_| {
                ModelError::Unavailable(format!("no response within {}s", idle.as_secs_f64()))
            })??;
        let bytes = Box::pin(resp.bytes_stream());

        let chunks = futures::stream::unfold(
            (bytes, Vec::<u8>::new(), false),
            move |(mut bytes, mut buf, mut done)| async move {
                loop {
                    if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        match parse_sse_line(String::from_utf8_lossy(&line).trim()) {
                            SseLine::Text(text) => return Some((Ok(text), (bytes, buf, done))),
                            SseLine::Done => return None,
                            SseLine::Skip => continue,
                        }
                    }
                    if done {
                        let rest = std::mem::take(&mut buf);
                        return match parse_sse_line(String::from_utf8_lossy(&rest).trim()) {
                            SseLine::Text(text) => Some((Ok(text), (bytes, buf, done))),
                            _ => None,
                        };
                    }
                    match tokio::time::timeout(idle, bytes.next()).await {
                        Ok(Some(Ok(chunk))) => buf.extend_from_slice(&chunk),
                        Ok(Some(Err(e))) => {
                            buf.clear();
                            return Some((
                                Err(ModelError::Unavailable(e.to_string())),
                                (bytes, buf, true),
                            ));
                        }
                        Ok(None) => done = true,
                        Err(_) => {
                            buf.clear();
                            return Some((
                                Err(ModelError::Unavailable(format!(
                                    "stream idle for {}s",
                                    idle.as_secs_f64()
                                ))),
                                (bytes, buf, true),
                            ));
                        }
                    }
                }
            },
        );
        Ok(chunks.boxed())
    }
}

fn to_wire(turn: &Turn) -> WireMessage {
    let role = match turn.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let tool_calls = turn
        .tool_call
        .iter()
        .map(|call| WireToolCall {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: match &call.arguments {
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                },
            },
        })
        .collect::<Vec<_>>();
    WireMessage {
        role: role.to_string(),
        content: if tool_calls.is_empty() {
            Some(turn.content.clone())
        } else {
            None
        },
        tool_calls,
        tool_call_id: turn.tool_call_id.clone(),
    }
}

/// Only the first tool call is honoured; one tool runs per cycle.
fn parse_reply(message: WireMessage) -> Result<ModelReply, ModelError> {
    if let Some(call) = message.tool_calls.into_iter().next() {
        let raw = call.function.arguments;
        let arguments = if raw.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        };
        return Ok(ModelReply::ToolCall(ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }));
    }
    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(ModelReply::FinalAnswer(text.trim().to_string())),
        _ => Err(ModelError::InvalidResponse("empty reply".into())),
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Text(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    serde_json::from_str::<StreamChunk>(data)
        .ok()
        .and_then(|chunk| chunk.choices.into_iter().next())
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty())
        .map(SseLine::Text)
        .unwrap_or(SseLine::Skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(v: Value) -> WireMessage {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_parse_final_answer() {
        let reply = parse_reply(message(json!({"role": "assistant", "content": " Hi! "}))).unwrap();
        assert_eq!(reply, ModelReply::FinalAnswer("Hi!".into()));
    }

    #[test]
    fn test_parse_first_tool_call_only() {
        let reply = parse_reply(message(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [
                {"id": "a", "type": "function", "function": {"name": "read_file", "arguments": "{\"path\":\"x\"}"}},
                {"id": "b", "type": "function", "function": {"name": "list_files", "arguments": "{}"}}
            ]
        })))
        .unwrap();
        assert_eq!(
            reply,
            ModelReply::ToolCall(ToolCall {
                id: "a".into(),
                name: "read_file".into(),
                arguments: json!({"path": "x"}),
            })
        );
    }

    #[test]
    fn test_malformed_arguments_kept_raw() {
        let reply = parse_reply(message(json!({
            "role": "assistant",
            "tool_calls": [{"id": "a", "function": {"name": "read_file", "arguments": "{path"}}]
        })))
        .unwrap();
        let ModelReply::ToolCall(call) = reply else {
            panic!("expected tool call");
        };
        assert_eq!(call.arguments, Value::String("{path".into()));
    }

    #[test]
    fn test_empty_reply_is_invalid() {
        let err = parse_reply(message(json!({"role": "assistant", "content": ""}))).unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    #[test]
    fn test_to_wire_tool_turns() {
        let call = ToolCall {
            id: "c1".into(),
            name: "list_files".into(),
            arguments: json!({"path": "."}),
        };
        let request = to_wire(&Turn::tool_request(call));
        assert_eq!(request.role, "assistant");
        assert_eq!(request.content, None);
        assert_eq!(request.tool_calls[0].function.arguments, "{\"path\":\".\"}");

        let observation = to_wire(&Turn::observation("c1", "a.txt"));
        assert_eq!(observation.role, "tool");
        assert_eq!(observation.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(observation.content.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_request_serialization_with_tools() {
        let def = ToolDefinition {
            name: "list_files".into(),
            description: "List".into(),
            parameters: json!({"type": "object"}),
        };
        let body = ChatRequest {
            model: "qwen-plus",
            messages: vec![to_wire(&Turn::user("hi"))],
            tools: vec![WireTool {
                kind: "function",
                function: &def,
            }],
            parallel_tool_calls: Some(false),
            stream: false,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["tools"][0]["type"], "function");
        assert_eq!(v["tools"][0]["function"]["name"], "list_files");
        assert_eq!(v["parallel_tool_calls"], false);
        assert_eq!(v["messages"][0], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"你好"}}]}"#),
            SseLine::Text("你好".into())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
    }

    /// Serves one SSE response, pausing `gap` between chunks.
    async fn slow_sse_server(chunks: Vec<&'static str>, gap: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let head = b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
            if socket.write_all(head).await.is_err() {
                return;
            }
            for chunk in chunks {
                tokio::time::sleep(gap).await;
                let event = format!(
                    "data: {}\n\n",
                    json!({"choices": [{"delta": {"content": chunk}}]})
                );
                if socket.write_all(event.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"data: [DONE]\n\n").await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_stream_outlives_model_timeout() {
        let base_url =
            slow_sse_server(vec!["one ", "two ", "three"], Duration::from_millis(300)).await;
        let model = OpenAiCompatModel::new(base_url, "m", "key", Duration::from_millis(800)).unwrap();

        let chunks: Vec<_> = model
            .stream(vec![Turn::user("count")])
            .await
            .unwrap()
            .collect()
            .await;
        let text: String = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, "one two three");
    }

    #[tokio::test]
    async fn test_stream_idle_gap_is_an_error() {
        let base_url = slow_sse_server(vec!["late"], Duration::from_millis(600)).await;
        let model = OpenAiCompatModel::new(base_url, "m", "key", Duration::from_millis(200)).unwrap();

        let mut chunks = model.stream(vec![Turn::user("wait")]).await.unwrap();
        assert!(matches!(
            chunks.next().await,
            Some(Err(ModelError::Unavailable(_)))
        ));
        assert!(chunks.next().await.is_none());
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = ModelConfig {
            api_key_env: "SKILLBOT_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..ModelConfig::default()
        };
        let err = OpenAiCompatModel::from_config(&config, Duration::from_secs(5))
            .err()
            .unwrap();
        assert_eq!(
            err,
            ModelError::MissingApiKey("SKILLBOT_TEST_KEY_THAT_IS_NEVER_SET".into())
        );
    }
}
