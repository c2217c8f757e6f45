//! Control envelope encoding and inbound frame classification.
//!
//! # Wire shapes
//!
//! ```text
//! outbound request  {"type":"control_request","request_id":ID,"request":{"subtype":…}}
//! inbound response  {"type":"control_response","response":{"subtype":"success","request_id":ID,"response":{…}}}
//!                   {"type":"control_response","response":{"subtype":"error","request_id":ID,"error":"…"}}
//! inbound request   {"type":"control_request","request_id":ID,"request":{"subtype":…}}
//! cancellation      {"type":"control_cancel_request","request_id":ID}
//! ```
//!
//! Responses carry their correlation id inside the `response` object. Only
//! that inner id is authoritative; any outer id is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{AppError, Result};

/// Discriminant of control requests, in both directions.
pub const CONTROL_REQUEST: &str = "control_request";
/// Discriminant of control responses.
pub const CONTROL_RESPONSE: &str = "control_response";
/// Discriminant of peer cancellations.
pub const CONTROL_CANCEL_REQUEST: &str = "control_cancel_request";

/// Outbound control request payload, tagged by `subtype`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Stop the peer's current turn.
    Interrupt,
    /// Switch the peer's permission mode.
    SetPermissionMode {
        /// Mode name, e.g. `default` or `acceptEdits`.
        mode: String,
    },
    /// Switch the peer's model; `None` restores the default.
    SetModel {
        /// Model identifier.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Announce client capabilities such as hook registrations.
    Initialize {
        /// Hook matcher configuration keyed by hook event.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hooks: Option<Value>,
    },
}

impl ControlRequest {
    /// Wire subtype string of this request.
    #[must_use]
    pub fn subtype(&self) -> &'static str {
        match self {
            Self::Interrupt => "interrupt",
            Self::SetPermissionMode { .. } => "set_permission_mode",
            Self::SetModel { .. } => "set_model",
            Self::Initialize { .. } => "initialize",
        }
    }
}

/// Result delivered to a pending waiter.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    /// The peer answered with `success`; carries the inner `response` object.
    Success(Value),
    /// The peer answered with `error`; carries its message.
    Error(String),
    /// The peer cancelled the request.
    Cancelled,
}

/// One inbound frame, classified for routing.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Answer to one of our outbound requests.
    Response {
        /// Inner correlation id.
        request_id: String,
        /// Decoded outcome.
        outcome: ControlOutcome,
    },
    /// Peer-initiated request awaiting dispatch.
    Request {
        /// Correlation id to echo in our response.
        request_id: String,
        /// Inner request payload (carries `subtype`).
        request: Value,
    },
    /// Peer cancellation of one of our outbound requests.
    Cancel {
        /// Correlation id being cancelled.
        request_id: String,
    },
    /// Anything else; forwarded to the domain output untouched.
    Domain(Value),
    /// A control frame missing required fields.
    Malformed {
        /// Discriminant of the offending frame.
        kind: &'static str,
        /// Parse failure description.
        reason: String,
    },
}

#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    request_id: &'a str,
    request: &'a ControlRequest,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    subtype: String,
    request_id: String,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    request_id: String,
    request: Value,
}

#[derive(Debug, Deserialize)]
struct CancelEnvelope {
    request_id: String,
}

/// Serialise an outbound control request envelope to one line.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if serialisation fails.
pub fn encode_request(request_id: &str, request: &ControlRequest) -> Result<String> {
    let envelope = OutboundEnvelope {
        kind: CONTROL_REQUEST,
        request_id,
        request,
    };
    serde_json::to_string(&envelope)
        .map_err(|e| AppError::Protocol(format!("failed to serialise control request: {e}")))
}

/// Build the control response frame answering peer request `request_id`.
///
/// `Ok(payload)` becomes a `success` response; `Err(e)` becomes an `error`
/// response carrying `e`'s display text.
#[must_use]
pub fn response_frame(request_id: &str, result: &Result<Value>) -> Value {
    match result {
        Ok(payload) => json!({
            "type": CONTROL_RESPONSE,
            "response": {
                "subtype": "success",
                "request_id": request_id,
                "response": payload,
            }
        }),
        Err(err) => json!({
            "type": CONTROL_RESPONSE,
            "response": {
                "subtype": "error",
                "request_id": request_id,
                "error": err.to_string(),
            }
        }),
    }
}

/// Serialise `frame` to one line.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if serialisation fails.
pub fn to_line(frame: &Value) -> Result<String> {
    serde_json::to_string(frame)
        .map_err(|e| AppError::Protocol(format!("failed to serialise frame: {e}")))
}

/// Classify an inbound frame by its `type` discriminant.
#[must_use]
pub fn classify(frame: Value) -> InboundFrame {
    let kind = match frame.get("type").and_then(Value::as_str) {
        Some(CONTROL_RESPONSE) => CONTROL_RESPONSE,
        Some(CONTROL_REQUEST) => CONTROL_REQUEST,
        Some(CONTROL_CANCEL_REQUEST) => CONTROL_CANCEL_REQUEST,
        _ => return InboundFrame::Domain(frame),
    };

    let malformed = |e: serde_json::Error| InboundFrame::Malformed {
        kind,
        reason: e.to_string(),
    };

    match kind {
        CONTROL_RESPONSE => match serde_json::from_value::<ResponseEnvelope>(frame) {
            Ok(env) => decode_response(env.response),
            Err(e) => malformed(e),
        },
        CONTROL_REQUEST => match serde_json::from_value::<RequestEnvelope>(frame) {
            Ok(env) => InboundFrame::Request {
                request_id: env.request_id,
                request: env.request,
            },
            Err(e) => malformed(e),
        },
        _ => match serde_json::from_value::<CancelEnvelope>(frame) {
            Ok(env) => InboundFrame::Cancel {
                request_id: env.request_id,
            },
            Err(e) => malformed(e),
        },
    }
}

fn decode_response(body: ResponseBody) -> InboundFrame {
    let outcome = match body.subtype.as_str() {
        "success" => ControlOutcome::Success(
            body.response
                .unwrap_or_else(|| Value::Object(Map::new())),
        ),
        "error" => ControlOutcome::Error(
            body.error
                .unwrap_or_else(|| "peer reported an error without a message".to_owned()),
        ),
        // The id is authoritative, so the waiter still gets an answer.
        other => ControlOutcome::Error(format!("unknown response subtype '{other}'")),
    };

    InboundFrame::Response {
        request_id: body.request_id,
        outcome,
    }
}
