//! Unit tests for the static permission policy.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use agent_control::capability::policy::StaticPermissionPolicy;
use agent_control::capability::{PermissionDecision, PermissionHandler, ToolPermissionRequest};
use agent_control::config::{DefaultBehavior, PermissionConfig};

fn policy(default: DefaultBehavior) -> StaticPermissionPolicy {
    StaticPermissionPolicy::new(&PermissionConfig {
        default,
        allowed_tools: vec!["Read".into(), "Bash".into()],
        denied_tools: vec!["Bash".into()],
    })
}

#[test]
fn allowed_tool_is_allowed() {
    assert_eq!(
        policy(DefaultBehavior::Deny).evaluate("Read"),
        PermissionDecision::allow()
    );
}

#[test]
fn deny_list_wins_over_allow_list() {
    let decision = policy(DefaultBehavior::Allow).evaluate("Bash");
    assert!(matches!(decision, PermissionDecision::Deny { ref reason, interrupt: false } if reason.contains("Bash")));
}

#[test]
fn unlisted_tool_follows_default() {
    assert!(matches!(
        policy(DefaultBehavior::Deny).evaluate("Write"),
        PermissionDecision::Deny { .. }
    ));
    assert_eq!(
        policy(DefaultBehavior::Allow).evaluate("Write"),
        PermissionDecision::allow()
    );
}

#[tokio::test]
async fn handler_check_uses_tool_name() {
    let handler = policy(DefaultBehavior::Deny);
    let decision = handler
        .check(
            ToolPermissionRequest {
                tool_name: "Read".into(),
                input: json!({ "file_path": "/tmp/x" }),
                suggestions: Vec::new(),
                blocked_path: None,
            },
            CancellationToken::new(),
        )
        .await
        .expect("static policy never fails");
    assert_eq!(decision, PermissionDecision::allow());
}
