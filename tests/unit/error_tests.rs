//! Unit tests for `AppError` display format and classification.

use agent_control::AppError;

#[test]
fn control_timeout_names_the_request_subtype() {
    let err = AppError::ControlTimeout("set_model".into());
    assert_eq!(
        err.to_string(),
        "control timeout: no response to 'set_model' request"
    );
}

#[test]
fn control_error_preserves_peer_message() {
    let err = AppError::Control("model not available".into());
    assert_eq!(err.to_string(), "control error: model not available");
}

#[test]
fn display_prefixes_are_distinct() {
    let transport = AppError::Transport("closed".into());
    let dispatch = AppError::Dispatch("closed".into());
    let cancelled = AppError::Cancelled("closed".into());
    assert!(transport.to_string().starts_with("transport:"));
    assert!(dispatch.to_string().starts_with("dispatch:"));
    assert!(cancelled.to_string().starts_with("cancelled:"));
    assert_ne!(transport.to_string(), dispatch.to_string());
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Protocol("malformed json".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn only_transport_errors_are_fatal() {
    assert!(AppError::Transport("eof".into()).is_fatal());
    assert!(!AppError::ControlTimeout("interrupt".into()).is_fatal());
    assert!(!AppError::Control("nope".into()).is_fatal());
    assert!(!AppError::Dispatch("nope".into()).is_fatal());
    assert!(!AppError::Cancelled("nope".into()).is_fatal());
    assert!(!AppError::Protocol("nope".into()).is_fatal());
}

#[test]
fn io_error_converts_to_transport() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err = AppError::from(io);
    assert_eq!(err, AppError::Transport("pipe closed".into()));
}

#[test]
fn toml_error_converts_to_config() {
    let err: AppError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config:")));
}
