//! Chat request handling.
//!
//! One [`Orchestrator::chat`] call validates the request, resolves the LLM
//! client, opens a tool-host session for the duration of the request, asks
//! the model for a reply and, when it asks for tools, runs them.

use crate::agents::{AgentId, AgentProfile};
use crate::error::{ConfigError, Error, Result};
use crate::factory::{ClientFactory, ResolvedInvocation, resolve_invocation};
use crate::llm::{Backend, Message, ModelRequest, Role, ToolCall, ToolSpec};
use crate::providers::{FALLBACK_MODELS, Provider};
use crate::schema::{parse_arguments, to_function_specs, tool_payload};
use futures::future::join_all;
use mcp::{Connector, DEFAULT_CONNECT_TIMEOUT, Session, Tool, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{Span, debug, error, field, info, instrument, warn};

/// The only supported interaction mode.
pub const CHAT_MODE: &str = "chat";

/// One chat turn as sent by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Overrides the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl ChatTurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Reject anything the handler will not process.
    pub fn validate(&self) -> Result<()> {
        match self.mode.as_deref() {
            None | Some("") | Some(CHAT_MODE) => {}
            Some(_) => {
                return Err(Error::InvalidRequest(
                    "only chat mode is supported".into(),
                ));
            }
        }
        if self.message.is_empty() {
            return Err(Error::InvalidRequest("message must not be empty".into()));
        }
        Ok(())
    }
}

/// A prior turn. Only user and assistant entries with content are replayed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl HistoryEntry {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            content: Some(content.into()),
        }
    }

    fn to_message(&self) -> Option<Message> {
        let role = match self.role.as_deref()?.parse().ok()? {
            role @ (Role::User | Role::Assistant) => role,
            // The agent prompt is the only system message, and tool messages
            // need a call id the caller cannot supply.
            Role::System | Role::Tool => return None,
        };
        let content = self.content.as_ref()?;
        Some(Message::new(role, content.clone()))
    }
}

/// What the caller gets back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatReply {
    /// The model answered directly.
    Text { content: String },
    /// The model asked for tools; these are their outcomes in call order.
    ToolResult { data: Vec<ToolOutput> },
}

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool: String,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Result(Value),
    Error(String),
}

impl ToolOutput {
    pub fn result(tool: impl Into<String>, result: Value) -> Self {
        Self {
            tool: tool.into(),
            outcome: ToolOutcome::Result(result),
        }
    }

    pub fn error(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            outcome: ToolOutcome::Error(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    /// Text fed back to the model in a follow-up round.
    fn feedback(&self) -> String {
        match &self.outcome {
            ToolOutcome::Result(value) => value.to_string(),
            ToolOutcome::Error(error) => json!({ "error": error }).to_string(),
        }
    }
}

/// Name and description of a tool, as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

impl From<Tool> for ToolSummary {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
        }
    }
}

/// Tunables for request handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Bound on tool-host connect plus handshake.
    pub connect_timeout: Duration,
    /// Model calls per request. With 1, tool results go straight back to
    /// the caller; above 1 they are fed to the model until it answers in
    /// text or the bound is hit.
    pub max_tool_rounds: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_tool_rounds: 1,
        }
    }
}

/// Handles chat turns and the advisory listing endpoints.
pub struct Orchestrator<F, C> {
    factory: F,
    connector: C,
    settings: OrchestratorSettings,
}

impl<F, C> Orchestrator<F, C>
where
    F: ClientFactory,
    C: Connector,
{
    pub fn new(factory: F, connector: C) -> Self {
        Self::with_settings(factory, connector, OrchestratorSettings::default())
    }

    pub fn with_settings(factory: F, connector: C, settings: OrchestratorSettings) -> Self {
        Self {
            factory,
            connector,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn tool_host(&self) -> &str {
        self.connector.endpoint()
    }

    /// Handle one chat turn.
    ///
    /// Configuration is resolved before the tool host is contacted, so an
    /// invalid or misconfigured request makes no network call at all.
    #[instrument(
        name = "chat",
        skip_all,
        fields(
            user_id = request.user_id.as_deref().unwrap_or("-"),
            agent = field::Empty,
            model = field::Empty,
        )
    )]
    pub async fn chat(&self, request: &ChatTurnRequest) -> Result<ChatReply> {
        request.validate()?;

        let invocation = resolve_invocation(&self.factory, request.model.as_deref())?;
        let agent = AgentId::resolve(request.agent_id.as_deref());
        let span = Span::current();
        span.record("agent", agent.profile().id);
        span.record("model", invocation.model.as_str());

        let session = self.open_session().await?;
        let tools = session.list_tools().await?;
        let specs = to_function_specs(&tools);

        let messages = assemble_messages(agent, &request.history, &request.message);
        debug!(
            provider = %invocation.provider,
            messages = messages.len(),
            tools = specs.len(),
            "calling model"
        );

        let reply = self.run(&invocation, &session, messages, &specs).await?;
        session.close();
        Ok(reply)
    }

    async fn run(
        &self,
        invocation: &ResolvedInvocation<F::Client>,
        session: &Session<C::Transport>,
        mut messages: Vec<Message>,
        specs: &[ToolSpec],
    ) -> Result<ChatReply> {
        let max_rounds = self.settings.max_tool_rounds.max(1);
        let mut round = 1;

        loop {
            let response = invocation
                .client
                .complete(ModelRequest {
                    model: &invocation.model,
                    messages: &messages,
                    tools: specs,
                })
                .await?;

            let calls = response.message.tool_calls();
            if calls.is_empty() {
                info!(round, "model replied with text");
                return Ok(ChatReply::Text {
                    content: response.message.text(),
                });
            }

            let outputs = dispatch(session, &calls).await;
            let failed = outputs.iter().filter(|o| o.is_error()).count();
            info!(round, calls = calls.len(), failed, "tool calls completed");

            if round >= max_rounds {
                return Ok(ChatReply::ToolResult { data: outputs });
            }

            messages.push(response.message);
            for (call, output) in calls.iter().zip(&outputs) {
                messages.push(Message::tool_result(&call.id, output.feedback()));
            }
            round += 1;
        }
    }

    /// Models offered to callers: the active default first, then the
    /// provider's curated list. Falls back to a generic list when the
    /// provider cannot be resolved.
    pub fn list_models(&self) -> Vec<String> {
        match self.active_model() {
            Ok((provider, model)) => {
                let mut models = vec![model];
                for candidate in provider.profile().models {
                    if !models.iter().any(|m| m == candidate) {
                        models.push(candidate.to_string());
                    }
                }
                models
            }
            Err(e) => {
                warn!(error = %e, "provider not resolvable, offering fallback models");
                FALLBACK_MODELS.iter().map(|m| m.to_string()).collect()
            }
        }
    }

    /// The active provider and the model a request without override uses.
    pub fn active_model(&self) -> std::result::Result<(Provider, String), ConfigError> {
        let provider = self.factory.provider()?;
        let (_, model) = self.factory.build(provider)?;
        Ok((provider, model))
    }

    /// The tool host's current catalog.
    pub async fn catalog(&self) -> Result<Vec<Tool>> {
        let session = self.open_session().await?;
        let tools = session.list_tools().await?;
        session.close();
        Ok(tools)
    }

    /// Tool names and descriptions; empty when the tool host is unreachable.
    pub async fn list_tools(&self) -> Vec<ToolSummary> {
        match self.catalog().await {
            Ok(tools) => tools.into_iter().map(ToolSummary::from).collect(),
            Err(e) => {
                warn!(tool_host = self.connector.endpoint(), error = %e, "tool listing unavailable");
                Vec::new()
            }
        }
    }

    pub fn list_agents(&self) -> Vec<&'static AgentProfile> {
        AgentId::ALL.iter().map(|agent| agent.profile()).collect()
    }

    async fn open_session(&self) -> Result<Session<C::Transport>> {
        Session::open(&self.connector, self.settings.connect_timeout)
            .await
            .map_err(|e| {
                let tool_host = self.connector.endpoint();
                if e.is_connectivity() {
                    warn!(tool_host, error = %e, "tool host unreachable");
                } else {
                    error!(tool_host, error = %e, "tool host rejected the session");
                }
                Error::ToolHost(e)
            })
    }
}

/// System prompt, then usable history in caller order, then the new turn.
pub fn assemble_messages(agent: AgentId, history: &[HistoryEntry], message: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(agent.system_prompt()));
    messages.extend(history.iter().filter_map(HistoryEntry::to_message));
    messages.push(Message::user(message));
    messages
}

/// Run every call concurrently. Each failure is confined to its own output
/// and outputs keep the order of `calls`.
async fn dispatch<T: Transport>(session: &Session<T>, calls: &[ToolCall]) -> Vec<ToolOutput> {
    let futures = calls.iter().map(|call| async move {
        let arguments = parse_arguments(&call.arguments);
        match session.call_tool(&call.name, arguments).await {
            Ok(result) => ToolOutput::result(&call.name, tool_payload(result)),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool call failed");
                ToolOutput::error(&call.name, e.to_string())
            }
        }
    });
    join_all(futures).await
}
