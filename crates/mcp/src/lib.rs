//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for talking to a tool host over HTTP + SSE:
//! listing its tool catalog and invoking tools by name.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{DEFAULT_CONNECT_TIMEOUT, Session, SseConnector};
//!
//! # async fn example() -> mcp::Result<()> {
//! let connector = SseConnector::new("http://127.0.0.1:3333/sse");
//! let session = Session::open(&connector, DEFAULT_CONNECT_TIMEOUT).await?;
//!
//! for tool in session.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("keyword".into(), "Alice".into());
//! let result = session.call_tool("search_members", args).await?;
//! println!("{}", result.text());
//!
//! // The stream is closed here, or earlier with `session.close()`.
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod session;
mod sse;
mod transport;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    PROTOCOL_VERSION, RequestId, ServerCapabilities, ServerInfo, Tool, ToolContent,
};
pub use session::{DEFAULT_CONNECT_TIMEOUT, Session};
pub use sse::{DEFAULT_REQUEST_TIMEOUT, SseConnector, SseDecoder, SseEvent, SseTransport};
pub use transport::{Connector, Transport};
