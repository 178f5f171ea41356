//! Club gateway runtime: chat orchestration over an LLM provider and a
//! tool host.
//!
//! # Overview
//!
//! - **Orchestrator**: handles one chat turn end to end and serves the
//!   advisory model, tool and agent listings.
//! - **ClientFactory**: resolves the active provider from settings and
//!   builds an OpenAI-compatible chat client for it.
//! - **CredentialResolver**: looks settings up in the environment, then in a
//!   local JSON key file.
//! - **AgentId**: the fixed set of personas a request can pick.
//!
//! # Example
//!
//! ```no_run
//! use mcp::SseConnector;
//! use runtime::{ChatTurnRequest, EnvClientFactory, Orchestrator};
//!
//! # async fn example() -> runtime::Result<()> {
//! let orchestrator = Orchestrator::new(
//!     EnvClientFactory::from_process_env(),
//!     SseConnector::new("http://127.0.0.1:3333/sse"),
//! );
//! let reply = orchestrator.chat(&ChatTurnRequest::new("find Alice")).await?;
//! println!("{}", serde_json::to_string(&reply).unwrap());
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod credentials;
mod error;
pub mod factory;
pub mod llm;
pub mod orchestrator;
pub mod providers;
pub mod schema;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use agents::{AgentId, AgentProfile};
pub use credentials::{CredentialResolver, EnvSource, KeyStore, MapEnv, ProcessEnv};
pub use error::{ConfigError, Error, Result};
pub use factory::{ClientFactory, EnvClientFactory, ResolvedInvocation, resolve_invocation};
pub use llm::{Backend, ModelError};
pub use orchestrator::{
    CHAT_MODE, ChatReply, ChatTurnRequest, HistoryEntry, Orchestrator, OrchestratorSettings,
    ToolOutcome, ToolOutput, ToolSummary,
};
pub use providers::{OpenAiCompatClient, Provider, ProviderProfile};
