//! Scripted stand-ins for the LLM provider and the tool host.
//!
//! Everything here is in-memory and counts its interactions, so tests can
//! assert not only what was returned but also whether the network would
//! have been touched at all.
//!
//! ```rust,ignore
//! use runtime::mock::{StubBackend, StubFactory, StubToolHost};
//!
//! let backend = StubBackend::new().reply_text("hello");
//! let host = StubToolHost::new();
//! let orchestrator = Orchestrator::new(StubFactory::new(backend.clone()), host.clone());
//! ```

use crate::error::ConfigError;
use crate::factory::ClientFactory;
use crate::llm::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolSpec,
    Usage,
};
use crate::providers::Provider;
use mcp::{
    CallToolResult, Connector, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Tool,
    ToolContent, Transport,
};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM side
// ─────────────────────────────────────────────────────────────────────────────

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

#[derive(Default)]
struct BackendState {
    replies: Mutex<VecDeque<Result<Message, ModelError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Backend answering from a queue of scripted replies.
///
/// Clones share the queue and the recorded requests. An exhausted queue
/// yields [`ModelError::InvalidResponse`].
#[derive(Clone, Default)]
pub struct StubBackend {
    state: Arc<BackendState>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, message: Message) -> Self {
        lock(&self.state.replies).push_back(Ok(message));
        self
    }

    pub fn reply_text(self, text: &str) -> Self {
        self.reply(Message::assistant(text))
    }

    /// Reply with tool calls given as `(name, raw arguments)`.
    pub fn reply_tool_calls(self, calls: &[(&str, &str)]) -> Self {
        let parts = calls
            .iter()
            .enumerate()
            .map(|(i, (name, arguments))| {
                Part::ToolCall(ToolCall {
                    id: format!("call_{}", i + 1),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                })
            })
            .collect();
        self.reply(Message {
            role: Role::Assistant,
            parts,
        })
    }

    pub fn fail(self, error: ModelError) -> Self {
        lock(&self.state.replies).push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.state.requests).len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }
}

impl Backend for StubBackend {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        lock(&self.state.requests).push(RecordedRequest {
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
            tools: request.tools.to_vec(),
        });
        let reply = lock(&self.state.replies)
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidResponse("no scripted reply".into())));
        reply.map(|message| ModelResponse {
            message,
            usage: Usage::default(),
        })
    }
}

/// Factory handing out clones of one [`StubBackend`].
#[derive(Clone)]
pub struct StubFactory {
    backend: StubBackend,
    provider: Result<Provider, ConfigError>,
    model: String,
    builds: Arc<AtomicUsize>,
}

impl StubFactory {
    pub fn new(backend: StubBackend) -> Self {
        Self {
            backend,
            provider: Ok(Provider::OpenAi),
            model: Provider::OpenAi.profile().default_model.to_string(),
            builds: Arc::default(),
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.model = provider.profile().default_model.to_string();
        self.provider = Ok(provider);
        self
    }

    /// Make provider resolution fail.
    pub fn with_config_error(mut self, error: ConfigError) -> Self {
        self.provider = Err(error);
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ClientFactory for StubFactory {
    type Client = StubBackend;

    fn provider(&self) -> Result<Provider, ConfigError> {
        self.provider.clone()
    }

    fn build(&self, _provider: Provider) -> Result<(StubBackend, String), ConfigError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok((self.backend.clone(), self.model.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool-host side
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct HostState {
    tools: Mutex<Vec<Tool>>,
    results: Mutex<HashMap<String, CallToolResult>>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    unreachable: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// In-memory tool host. Acts as its own [`Connector`].
#[derive(Clone, Default)]
pub struct StubToolHost {
    state: Arc<HostState>,
}

impl StubToolHost {
    pub const ENDPOINT: &'static str = "stub://tool-host";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(self, name: &str, description: &str, input_schema: Value) -> Self {
        lock(&self.state.tools).push(Tool {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema,
        });
        self
    }

    /// Answer calls to `name` with structured content.
    pub fn with_result(self, name: &str, result: Value) -> Self {
        let result = CallToolResult {
            content: vec![ToolContent::text(result.to_string())],
            structured_content: Some(result),
            is_error: false,
        };
        lock(&self.state.results).insert(name.to_string(), result);
        self
    }

    /// Answer calls to `name` with an `isError` result.
    pub fn with_failure(self, name: &str, message: &str) -> Self {
        let result = CallToolResult {
            content: vec![ToolContent::text(message)],
            structured_content: None,
            is_error: true,
        };
        lock(&self.state.results).insert(name.to_string(), result);
        self
    }

    /// Refuse every connection.
    pub fn unreachable(self) -> Self {
        self.state.unreachable.store(true, Ordering::SeqCst);
        self
    }

    /// Connection attempts, successful or not.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Times a transport was closed.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Tool invocations in arrival order.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        lock(&self.state.calls).clone()
    }

    fn answer(&self, request: &JsonRpcRequest) -> Result<Value, String> {
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": mcp::PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "stub-tool-host"}
            })),
            "tools/list" => {
                let tools = lock(&self.state.tools).clone();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let params = request.params.clone().unwrap_or(Value::Null);
                let name = params["name"].as_str().unwrap_or_default().to_string();
                let arguments = match params.get("arguments") {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Map::new(),
                };
                lock(&self.state.calls).push((name.clone(), arguments));

                let result = lock(&self.state.results)
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| CallToolResult {
                        content: vec![ToolContent::text(format!("unknown tool: {name}"))],
                        structured_content: None,
                        is_error: true,
                    });
                serde_json::to_value(result).map_err(|e| e.to_string())
            }
            other => Err(format!("method not found: {other}")),
        }
    }
}

impl Connector for StubToolHost {
    type Transport = StubTransport;

    fn endpoint(&self) -> &str {
        Self::ENDPOINT
    }

    async fn connect(&self) -> mcp::Result<StubTransport> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.unreachable.load(Ordering::SeqCst) {
            return Err(mcp::Error::Connect {
                url: Self::ENDPOINT.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(StubTransport { host: self.clone() })
    }
}

/// Transport of a [`StubToolHost`].
pub struct StubTransport {
    host: StubToolHost,
}

impl Transport for StubTransport {
    async fn request(&self, request: JsonRpcRequest) -> mcp::Result<JsonRpcResponse> {
        let (result, error) = match self.host.answer(&request) {
            Ok(result) => (Some(result), None),
            Err(message) => (
                None,
                Some(mcp::JsonRpcError {
                    code: -32601,
                    message,
                    data: None,
                }),
            ),
        };
        Ok(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: request.id,
            result,
            error,
        })
    }

    async fn notify(&self, _notification: JsonRpcNotification) -> mcp::Result<()> {
        Ok(())
    }

    fn close(&self) {
        self.host.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}
