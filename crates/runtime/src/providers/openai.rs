//! OpenAI-compatible chat-completions backend.
//!
//! Serves every registered provider; only the base URL, key and model differ.

use crate::llm::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall,
    ToolSpec, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Bound on a single completion call.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatConfig {
    pub api_key: String,
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ApiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDef<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Chat client for any endpoint speaking the OpenAI chat-completions shape.
#[derive(Debug)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        Self::with_http(reqwest::Client::new(), config)
    }

    /// Reuse an existing HTTP client for connection pooling.
    pub fn with_http(http: reqwest::Client, config: OpenAiCompatConfig) -> Self {
        Self { http, config }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn message_to_api(msg: &Message) -> Vec<ApiMessage> {
        match msg.role {
            // Each tool result is its own wire message.
            Role::Tool => msg
                .parts
                .iter()
                .filter_map(|part| match part {
                    Part::ToolResult(result) => Some(ApiMessage {
                        role: "tool",
                        content: Some(result.content.clone()),
                        tool_calls: Vec::new(),
                        tool_call_id: Some(result.tool_call_id.clone()),
                    }),
                    // A tool message without a call id is rejected upstream.
                    Part::Text(_) | Part::ToolCall(_) => None,
                })
                .collect(),
            role => {
                let text = msg.text();
                let tool_calls: Vec<ApiToolCall> = msg
                    .tool_calls()
                    .into_iter()
                    .map(|call| ApiToolCall {
                        id: call.id,
                        call_type: function_type(),
                        function: ApiFunctionCall {
                            name: call.name,
                            arguments: call.arguments,
                        },
                    })
                    .collect();
                let content = if text.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(text)
                };
                vec![ApiMessage {
                    role: role.as_str(),
                    content,
                    tool_calls,
                    tool_call_id: None,
                }]
            }
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiFunctionDef {
                name: &spec.name,
                description: spec.description.as_deref(),
                parameters: &spec.parameters,
            },
        }
    }

    fn response_to_message(message: ApiResponseMessage) -> Message {
        let mut parts = Vec::new();
        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text));
        }
        for call in message.tool_calls.unwrap_or_default() {
            parts.push(Part::ToolCall(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }));
        }
        Message {
            role: Role::Assistant,
            parts,
        }
    }

    /// Pull a readable message out of an error body.
    fn error_message(status: reqwest::StatusCode, body: &str) -> String {
        if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
            return envelope.error.message;
        }
        let body = body.trim();
        if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.to_string()
        }
    }
}

impl std::fmt::Display for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai-compat({})", self.config.base_url)
    }
}

impl Backend for OpenAiCompatClient {
    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len(), tools = request.tools.len()))]
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let tools: Vec<ApiTool<'_>> = request.tools.iter().map(Self::tool_to_api).collect();
        // The model always decides whether to call a tool.
        let tool_choice = (!tools.is_empty()).then_some("auto");

        let api_request = ApiRequest {
            model: request.model,
            messages: request
                .messages
                .iter()
                .flat_map(Self::message_to_api)
                .collect(),
            tools,
            tool_choice,
        };

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Network(format!(
                        "request timed out after {}s",
                        self.config.timeout.as_secs()
                    ))
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = Self::error_message(status, &body);
            debug!(status = status.as_u16(), %message, "provider rejected request");
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("response has no choices".into()))?;

        let usage = api_response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            message: Self::response_to_message(choice.message),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base_url: String) -> OpenAiCompatClient {
        OpenAiCompatClient::new(OpenAiCompatConfig {
            api_key: "sk-test".into(),
            base_url,
            timeout: Duration::from_secs(5),
        })
    }

    fn weather_tool() -> ToolSpec {
        ToolSpec {
            name: "get_weather".into(),
            description: Some("Look up weather".into()),
            parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        }
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = OpenAiCompatConfig {
            api_key: "sk-super-secret".into(),
            base_url: "https://api.openai.com/v1".into(),
            timeout: DEFAULT_LLM_TIMEOUT,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn client_debug_redacts_api_key() {
        let client = OpenAiCompatClient::new(OpenAiCompatConfig {
            api_key: "sk-super-secret".into(),
            base_url: "https://api.openai.com/v1".into(),
            timeout: DEFAULT_LLM_TIMEOUT,
        });
        let debug = format!("{client:?}");
        assert!(debug.contains("OpenAiCompatClient"));
        assert!(!debug.contains("sk-super-secret"));
    }

    #[test]
    fn tool_text_without_call_id_is_not_sent() {
        let msg = Message::new(Role::Tool, "orphan output");
        assert!(OpenAiCompatClient::message_to_api(&msg).is_empty());
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        let client = client("https://api.deepseek.com/v1/".into());
        assert_eq!(
            client.completions_url(),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn tool_messages_keep_their_call_id() {
        let msg = Message::tool_result("call_1", r#"{"ok":true}"#);
        let api = OpenAiCompatClient::message_to_api(&msg);
        assert_eq!(api.len(), 1);
        let value = serde_json::to_value(&api[0]).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
        assert_eq!(value["content"], r#"{"ok":true}"#);
    }

    #[test]
    fn assistant_tool_calls_have_null_content() {
        let msg = Message {
            role: Role::Assistant,
            parts: vec![Part::ToolCall(ToolCall {
                id: "call_1".into(),
                name: "get_weather".into(),
                arguments: r#"{"city":"Paris"}"#.into(),
            })],
        };
        let api = OpenAiCompatClient::message_to_api(&msg);
        let value = serde_json::to_value(&api[0]).unwrap();
        assert!(value["content"].is_null());
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(value["tool_calls"][0]["function"]["name"], "get_weather");
    }

    #[test]
    fn error_message_prefers_envelope() {
        let status = reqwest::StatusCode::UNAUTHORIZED;
        assert_eq!(
            OpenAiCompatClient::error_message(
                status,
                r#"{"error":{"message":"Incorrect API key provided"}}"#
            ),
            "Incorrect API key provided"
        );
        assert_eq!(
            OpenAiCompatClient::error_message(status, "plain failure"),
            "plain failure"
        );
        assert_eq!(OpenAiCompatClient::error_message(status, ""), "Unauthorized");
    }

    #[tokio::test]
    async fn sends_tools_and_parses_tool_calls() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(
                        r#"{"model":"gpt-4o-mini","tool_choice":"auto","tools":[{"type":"function","function":{"name":"get_weather"}}]}"#,
                    );
                then.status(200).json_body(json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": null,
                            "tool_calls": [{
                                "id": "call_1",
                                "type": "function",
                                "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                            }]
                        }
                    }],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 7}
                }));
            })
            .await;

        let client = client(server.url("/v1"));
        let messages = vec![Message::user("weather in Paris?")];
        let tools = vec![weather_tool()];
        let response = client
            .complete(ModelRequest {
                model: "gpt-4o-mini",
                messages: &messages,
                tools: &tools,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        let calls = response.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments, r#"{"city":"Paris"}"#);
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 7);
    }

    #[tokio::test]
    async fn plain_text_reply() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "Hello!"}}]
                }));
            })
            .await;

        let client = client(server.base_url());
        let messages = vec![Message::user("hi")];
        let response = client
            .complete(ModelRequest {
                model: "deepseek-chat",
                messages: &messages,
                tools: &[],
            })
            .await
            .unwrap();

        assert_eq!(response.message.text(), "Hello!");
        assert!(response.message.tool_calls().is_empty());
        assert_eq!(response.usage, Usage::default());
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429)
                    .json_body(json!({"error": {"message": "Rate limit reached"}}));
            })
            .await;

        let client = client(server.base_url());
        let messages = vec![Message::user("hi")];
        let err = client
            .complete(ModelRequest {
                model: "gpt-4o",
                messages: &messages,
                tools: &[],
            })
            .await
            .unwrap_err();

        match err {
            ModelError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({"choices": []}));
            })
            .await;

        let client = client(server.base_url());
        let messages = vec![Message::user("hi")];
        let err = client
            .complete(ModelRequest {
                model: "gpt-4o",
                messages: &messages,
                tools: &[],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }
}
