//! Scoped tool-host sessions.
//!
//! A [`Session`] owns its transport. Opening one connects and performs the
//! `initialize` handshake; dropping it (or calling [`Session::close`]) tears
//! the transport down. Every exit path, including errors raised while the
//! session is in use and futures cancelled mid-flight, therefore releases the
//! stream exactly once.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsParams, ListToolsResult, RequestId, Tool,
};
use crate::transport::{Connector, Transport};

/// Default bound on connect + handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An initialized session with a tool host.
pub struct Session<T: Transport> {
    transport: T,
    next_id: AtomicI64,
    server_info: Option<InitializeResult>,
}

impl<T: Transport> Session<T> {
    /// Connect through `connector` and perform the handshake, bounded by
    /// `connect_timeout`.
    pub async fn open<C>(connector: &C, connect_timeout: Duration) -> Result<Self>
    where
        C: Connector<Transport = T>,
    {
        let endpoint = connector.endpoint();
        debug!(endpoint, "opening tool host session");

        let opened = timeout(connect_timeout, async {
            let transport = connector.connect().await?;
            Self::handshake(transport).await
        })
        .await;

        match opened {
            Ok(session) => session,
            Err(_) => Err(Error::Timeout(format!("tool host handshake at {endpoint}"))),
        }
    }

    /// Initialize an already connected transport.
    ///
    /// On failure the transport is closed before the error is returned.
    pub async fn handshake(transport: T) -> Result<Self> {
        let mut session = Self {
            transport,
            next_id: AtomicI64::new(1),
            server_info: None,
        };

        let result: InitializeResult = session
            .request("initialize", Some(InitializeParams::default()))
            .await?;
        session
            .transport
            .notify(JsonRpcNotification::new("notifications/initialized"))
            .await?;

        info!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "tool host session initialized"
        );
        session.server_info = Some(result);
        Ok(session)
    }

    /// Server info reported during the handshake.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Fetch the host's current tool catalog, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor = None;

        loop {
            let page: ListToolsResult = self
                .request("tools/list", Some(ListToolsParams { cursor }))
                .await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = tools.len(), "listed tools");
        Ok(tools)
    }

    /// Invoke a tool by name.
    ///
    /// Arguments are passed through untouched; the host validates them
    /// against its own schema. A result flagged `isError` is returned as
    /// [`Error::ToolCallFailed`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult> {
        debug!(tool = name, "calling tool");

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.text()));
        }
        Ok(result)
    }

    /// Close the session now instead of at the end of scope.
    pub fn close(self) {
        drop(self);
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p)?;
        }

        let response = self.transport.request(request).await?;

        if response.id != id {
            return Err(Error::InvalidResponse(format!(
                "response ID mismatch: expected {id}, got {}",
                response.id
            )));
        }

        let value = response.into_result()?;
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidResponse(format!("invalid {method} result: {e}")))
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.transport.close();
        debug!("tool host session closed");
    }
}
