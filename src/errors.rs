//! Error types shared across the control plane.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all control-plane failure modes.
///
/// Only [`AppError::Transport`] is terminal for the router; every other
/// variant is surfaced to the single caller (outbound path) or converted to
/// a wire-level error payload (inbound path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Read or write failure on the underlying byte transport.
    Transport(String),
    /// No correlated response arrived within the request window.
    ///
    /// Carries the subtype of the request that timed out.
    ControlTimeout(String),
    /// The peer answered a control request with an `error` subtype.
    ///
    /// Carries the peer's message text verbatim.
    Control(String),
    /// An inbound control request could not be dispatched.
    Dispatch(String),
    /// The operation was cancelled, locally or by the peer.
    Cancelled(String),
    /// Malformed frame or framing violation.
    Protocol(String),
}

impl AppError {
    /// Whether this error ends the router (transport-fatal).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::ControlTimeout(subtype) => {
                write!(f, "control timeout: no response to '{subtype}' request")
            }
            Self::Control(msg) => write!(f, "control error: {msg}"),
            Self::Dispatch(msg) => write!(f, "dispatch: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
