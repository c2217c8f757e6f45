//! Pluggable capability handlers for peer-initiated control requests.
//!
//! A [`CapabilityRegistry`] is a read-only snapshot handed to the router at
//! start. The control core never interprets the handlers' decisions; it
//! only routes requests to them and encodes their results on the wire.
//!
//! | Inbound subtype | Capability                |
//! |-----------------|---------------------------|
//! | `can_use_tool`  | [`PermissionHandler`]     |
//! | `hook_callback` | [`HookCallback`] by id    |
//! | `mcp_message`   | [`McpServer`] by name     |

pub mod policy;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Boxed future returned by capability handlers.
pub type HandlerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Tool permission query forwarded from a `can_use_tool` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPermissionRequest {
    /// Name of the tool the peer wants to run.
    pub tool_name: String,
    /// Tool input as sent by the peer.
    pub input: Value,
    /// Permission updates the peer suggests applying.
    pub suggestions: Vec<Value>,
    /// Path that triggered the request, when the peer reports one.
    pub blocked_path: Option<String>,
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    /// Let the tool run, optionally with rewritten input or new rules.
    Allow {
        /// Replacement tool input.
        updated_input: Option<Value>,
        /// Permission updates to apply.
        updated_permissions: Option<Vec<Value>>,
    },
    /// Refuse the tool.
    Deny {
        /// Human-readable reason reported to the peer.
        reason: String,
        /// Whether the peer should stop the current turn.
        interrupt: bool,
    },
}

impl PermissionDecision {
    /// Plain allow with no rewrites.
    #[must_use]
    pub fn allow() -> Self {
        Self::Allow {
            updated_input: None,
            updated_permissions: None,
        }
    }

    /// Deny with `reason`, without interrupting.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
            interrupt: false,
        }
    }
}

/// Decides whether the peer may run a tool.
pub trait PermissionHandler: Send + Sync {
    /// Evaluate `request`.
    ///
    /// # Errors
    ///
    /// Any error is reported to the peer as a control error response.
    fn check(
        &self,
        request: ToolPermissionRequest,
        cancel: CancellationToken,
    ) -> HandlerFuture<'_, PermissionDecision>;
}

/// Callback registered for a hook id.
pub trait HookCallback: Send + Sync {
    /// Run the hook with its `input` and the optional tool-use id.
    ///
    /// `cancel` is the router's token; long-running hooks should observe it.
    ///
    /// # Errors
    ///
    /// Any error is reported to the peer as a control error response.
    fn call(
        &self,
        input: Value,
        tool_use_id: Option<String>,
        cancel: CancellationToken,
    ) -> HandlerFuture<'_, Value>;
}

/// In-process MCP server reachable through `mcp_message` requests.
pub trait McpServer: Send + Sync {
    /// Handle one raw JSON-RPC message and return the raw response bytes.
    ///
    /// # Errors
    ///
    /// Errors are folded into a JSON-RPC internal error object.
    fn handle(&self, message: Vec<u8>) -> HandlerFuture<'_, Vec<u8>>;
}

/// Read-only snapshot of the capability handlers.
///
/// Cheap to clone; all handlers are reference counted.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    permission: Option<Arc<dyn PermissionHandler>>,
    hooks: HashMap<String, Arc<dyn HookCallback>>,
    mcp_servers: HashMap<String, Arc<dyn McpServer>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the permission handler.
    #[must_use]
    pub fn with_permission_handler(mut self, handler: Arc<dyn PermissionHandler>) -> Self {
        self.permission = Some(handler);
        self
    }

    /// Register `callback` under `callback_id`, replacing any previous entry.
    #[must_use]
    pub fn with_hook(mut self, callback_id: impl Into<String>, callback: Arc<dyn HookCallback>) -> Self {
        self.hooks.insert(callback_id.into(), callback);
        self
    }

    /// Register `server` under `name`, replacing any previous entry.
    #[must_use]
    pub fn with_mcp_server(mut self, name: impl Into<String>, server: Arc<dyn McpServer>) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    /// The permission handler, if configured.
    #[must_use]
    pub fn permission_handler(&self) -> Option<&Arc<dyn PermissionHandler>> {
        self.permission.as_ref()
    }

    /// Hook callback registered under `callback_id`.
    #[must_use]
    pub fn hook(&self, callback_id: &str) -> Option<&Arc<dyn HookCallback>> {
        self.hooks.get(callback_id)
    }

    /// MCP server registered under `name`.
    #[must_use]
    pub fn mcp_server(&self, name: &str) -> Option<&Arc<dyn McpServer>> {
        self.mcp_servers.get(name)
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<&String> = self.hooks.keys().collect();
        hooks.sort();
        let mut servers: Vec<&String> = self.mcp_servers.keys().collect();
        servers.sort();
        f.debug_struct("CapabilityRegistry")
            .field("permission", &self.permission.is_some())
            .field("hooks", &hooks)
            .field("mcp_servers", &servers)
            .finish()
    }
}

// Verify Send + Sync at compile time.
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<CapabilityRegistry>();
    }
    let _ = check;
};
