//! Inbound control request dispatcher.
//!
//! Routes one peer-initiated control request to the matching capability in
//! the [`CapabilityRegistry`] and produces the response payload.
//!
//! | Subtype          | Handler                                  | Missing handler                 |
//! |------------------|------------------------------------------|---------------------------------|
//! | `can_use_tool`   | [`PermissionHandler`](crate::capability::PermissionHandler) | dispatch error |
//! | `hook_callback`  | [`HookCallback`](crate::capability::HookCallback) by id     | dispatch error naming the id |
//! | `mcp_message`    | [`McpServer`](crate::capability::McpServer) by name         | JSON-RPC `-32601` payload (success) |
//! | *(any other)*    | none                                     | dispatch error naming the subtype |
//!
//! Dispatch errors never escape the router; the caller turns them into an
//! `error` control response.

use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capability::{CapabilityRegistry, PermissionDecision, ToolPermissionRequest};
use crate::{AppError, Result};

/// JSON-RPC "method not found"; used for unknown MCP servers.
pub const JSONRPC_METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC "internal error"; used for malformed MCP traffic.
pub const JSONRPC_INTERNAL_ERROR: i64 = -32603;

/// Peer-initiated control request, tagged by `subtype`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum InboundRequest {
    /// Ask whether a tool may run.
    CanUseTool {
        /// Tool name.
        tool_name: String,
        /// Tool input.
        #[serde(default)]
        input: Value,
        /// Suggested permission updates.
        #[serde(default)]
        permission_suggestions: Option<Vec<Value>>,
        /// Path that triggered the check.
        #[serde(default)]
        blocked_path: Option<String>,
    },
    /// Invoke a registered hook callback.
    HookCallback {
        /// Registered callback id.
        callback_id: String,
        /// Hook input.
        #[serde(default)]
        input: Value,
        /// Tool-use id the hook relates to.
        #[serde(default)]
        tool_use_id: Option<String>,
    },
    /// Forward a JSON-RPC message to an in-process MCP server.
    McpMessage {
        /// Target server name.
        server_name: String,
        /// Raw JSON-RPC message.
        #[serde(default)]
        message: Value,
    },
}

impl InboundRequest {
    /// Known inbound subtypes.
    pub const SUBTYPES: [&'static str; 3] = ["can_use_tool", "hook_callback", "mcp_message"];

    /// Decode `request` (the inner payload of a `control_request` frame).
    ///
    /// # Errors
    ///
    /// - [`AppError::Dispatch`]`("unsupported control request subtype: …")`
    ///   for a missing or unknown subtype.
    /// - [`AppError::Dispatch`]`("malformed … request: …")` when a known
    ///   subtype lacks required fields.
    pub fn parse(request: Value) -> Result<Self> {
        let subtype = request
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        if !Self::SUBTYPES.contains(&subtype.as_str()) {
            return Err(AppError::Dispatch(format!(
                "unsupported control request subtype: '{subtype}'"
            )));
        }

        serde_json::from_value(request)
            .map_err(|e| AppError::Dispatch(format!("malformed {subtype} request: {e}")))
    }
}

/// Dispatch one inbound request against `registry`.
///
/// `cancel` is forwarded into the capability handlers.
///
/// # Errors
///
/// Returns [`AppError::Dispatch`] for unknown subtypes, a missing permission
/// handler, or an unknown hook id, and propagates handler errors.
pub async fn dispatch(
    request: Value,
    registry: &CapabilityRegistry,
    cancel: CancellationToken,
) -> Result<Value> {
    match InboundRequest::parse(request)? {
        InboundRequest::CanUseTool {
            tool_name,
            input,
            permission_suggestions,
            blocked_path,
        } => {
            let request = ToolPermissionRequest {
                tool_name,
                input,
                suggestions: permission_suggestions.unwrap_or_default(),
                blocked_path,
            };
            handle_permission(request, registry, cancel).await
        }
        InboundRequest::HookCallback {
            callback_id,
            input,
            tool_use_id,
        } => {
            let Some(callback) = registry.hook(&callback_id) else {
                return Err(AppError::Dispatch(format!(
                    "no hook callback found for id '{callback_id}'"
                )));
            };
            debug!(callback_id = %callback_id, "invoking hook callback");
            callback.call(input, tool_use_id, cancel).await
        }
        InboundRequest::McpMessage {
            server_name,
            message,
        } => Ok(handle_mcp_message(&server_name, &message, registry).await),
    }
}

async fn handle_permission(
    request: ToolPermissionRequest,
    registry: &CapabilityRegistry,
    cancel: CancellationToken,
) -> Result<Value> {
    let Some(handler) = registry.permission_handler() else {
        return Err(AppError::Dispatch("no permission handler configured".into()));
    };

    let tool_name = request.tool_name.clone();
    let decision = handler.check(request, cancel).await?;
    debug!(
        tool_name = %tool_name,
        allowed = matches!(decision, PermissionDecision::Allow { .. }),
        "permission decided"
    );
    Ok(permission_payload(decision))
}

/// Encode a permission decision as the `can_use_tool` response payload.
#[must_use]
pub fn permission_payload(decision: PermissionDecision) -> Value {
    match decision {
        PermissionDecision::Allow {
            updated_input,
            updated_permissions,
        } => {
            let mut payload = json!({ "allow": true });
            if let Some(input) = updated_input {
                payload["input"] = input;
            }
            if let Some(permissions) = updated_permissions {
                payload["updatedPermissions"] = Value::Array(permissions);
            }
            payload
        }
        PermissionDecision::Deny { reason, interrupt } => {
            let mut payload = json!({ "allow": false, "reason": reason });
            if interrupt {
                payload["interrupt"] = Value::Bool(true);
            }
            payload
        }
    }
}

/// Route an MCP message; every failure degrades to a JSON-RPC error object.
async fn handle_mcp_message(server_name: &str, message: &Value, registry: &CapabilityRegistry) -> Value {
    let message_id = message.get("id").cloned().unwrap_or(Value::Null);

    let Some(server) = registry.mcp_server(server_name) else {
        debug!(server_name, "mcp message for unknown server");
        return mcp_response(jsonrpc_error(
            &message_id,
            JSONRPC_METHOD_NOT_FOUND,
            &format!("Server '{server_name}' not found"),
        ));
    };

    let bytes = match serde_json::to_vec(message) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(server_name, error = %e, "mcp message could not be encoded");
            return mcp_response(jsonrpc_error(&message_id, JSONRPC_INTERNAL_ERROR, &e.to_string()));
        }
    };

    let reply = match server.handle(bytes).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(server_name, error = %e, "mcp server failed");
            return mcp_response(jsonrpc_error(&message_id, JSONRPC_INTERNAL_ERROR, &e.to_string()));
        }
    };

    match serde_json::from_slice::<Value>(&reply) {
        Ok(value) => mcp_response(value),
        Err(e) => {
            warn!(server_name, error = %e, "mcp server returned malformed json");
            mcp_response(jsonrpc_error(
                &message_id,
                JSONRPC_INTERNAL_ERROR,
                &format!("invalid response from server '{server_name}': {e}"),
            ))
        }
    }
}

fn mcp_response(body: Value) -> Value {
    json!({ "mcp_response": body })
}

fn jsonrpc_error(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}
