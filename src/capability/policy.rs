//! Static tool permission policy.
//!
//! Answers `can_use_tool` requests from fixed allow/deny lists. Evaluation
//! order:
//! 1. Tool in `denied_tools` → deny.
//! 2. Tool in `allowed_tools` → allow.
//! 3. Otherwise apply the configured default.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span};

use crate::capability::{HandlerFuture, PermissionDecision, PermissionHandler, ToolPermissionRequest};
use crate::config::{DefaultBehavior, PermissionConfig};

/// Permission handler backed by static allow/deny lists.
#[derive(Debug, Clone)]
pub struct StaticPermissionPolicy {
    default: DefaultBehavior,
    allowed: HashSet<String>,
    denied: HashSet<String>,
}

impl StaticPermissionPolicy {
    /// Build a policy from the `[permissions]` config section.
    #[must_use]
    pub fn new(config: &PermissionConfig) -> Self {
        Self {
            default: config.default,
            allowed: config.allowed_tools.iter().cloned().collect(),
            denied: config.denied_tools.iter().cloned().collect(),
        }
    }

    /// Evaluate `tool_name` against the lists.
    #[must_use]
    pub fn evaluate(&self, tool_name: &str) -> PermissionDecision {
        let _span = info_span!("permission_evaluate", tool_name = %tool_name).entered();

        if self.denied.contains(tool_name) {
            info!("tool denied by rule");
            return PermissionDecision::deny(format!("tool '{tool_name}' is denied by policy"));
        }

        if self.allowed.contains(tool_name) {
            info!("tool allowed by rule");
            return PermissionDecision::allow();
        }

        match self.default {
            DefaultBehavior::Allow => PermissionDecision::allow(),
            DefaultBehavior::Deny => {
                info!("tool matched no rule, denying");
                PermissionDecision::deny(format!("tool '{tool_name}' is not in the allow list"))
            }
        }
    }
}

impl PermissionHandler for StaticPermissionPolicy {
    fn check(
        &self,
        request: ToolPermissionRequest,
        _cancel: CancellationToken,
    ) -> HandlerFuture<'_, PermissionDecision> {
        let decision = self.evaluate(&request.tool_name);
        Box::pin(async move { Ok(decision) })
    }
}
