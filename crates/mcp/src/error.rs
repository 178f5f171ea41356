//! MCP error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to tool host at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("timeout waiting for {0}")]
    Timeout(String),

    #[error("tool host disconnected")]
    Disconnected,

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),
}

impl Error {
    /// Whether the failure concerns reaching the tool host at all, as opposed
    /// to a single operation being rejected by it.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Http(_) | Self::Timeout(_) | Self::Disconnected
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_classification() {
        assert!(Error::Disconnected.is_connectivity());
        assert!(Error::Timeout("initialize".into()).is_connectivity());
        assert!(!Error::ToolCallFailed("boom".into()).is_connectivity());
        assert!(
            !Error::JsonRpc(JsonRpcError {
                code: -32602,
                message: "invalid params".into(),
                data: None,
            })
            .is_connectivity()
        );
    }
}
