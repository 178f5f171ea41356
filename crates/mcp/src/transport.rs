//! Transport abstraction between a session and a tool host.

use std::future::Future;

use crate::error::Result;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// A bidirectional message channel to a tool host.
///
/// Implementations must allow several requests to be in flight at once and
/// correlate each response with its request by id.
pub trait Transport: Send + Sync {
    /// Send a request and wait for the matching response.
    fn request(
        &self,
        request: JsonRpcRequest,
    ) -> impl Future<Output = Result<JsonRpcResponse>> + Send;

    /// Send a notification; no response is expected.
    fn notify(&self, notification: JsonRpcNotification) -> impl Future<Output = Result<()>> + Send;

    /// Tear down the underlying stream. Must be idempotent.
    fn close(&self);
}

/// Produces fresh transports, one per session.
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    /// Human-readable location of the tool host, used in logs and errors.
    fn endpoint(&self) -> &str;

    /// Open a new transport. The returned transport has not been initialized.
    fn connect(&self) -> impl Future<Output = Result<Self::Transport>> + Send;
}
