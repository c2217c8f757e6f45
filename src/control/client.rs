//! Control client: one correlation table, one issuer, one router.
//!
//! [`ControlClient::start`] wires the pieces over a transport and returns
//! the client handle, the router's two outputs, and the router task.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capability::CapabilityRegistry;
use crate::config::ClientSettings;
use crate::control::correlation::CorrelationTable;
use crate::control::envelope::ControlRequest;
use crate::control::issuer::RequestIssuer;
use crate::control::router::{MessageRouter, RouterOutputs};
use crate::transport::{InboundStreams, Transport};
use crate::Result;

/// Handle for issuing control requests to the peer.
///
/// The correlation table lives as long as the client.
pub struct ControlClient {
    table: CorrelationTable,
    issuer: RequestIssuer,
}

impl ControlClient {
    /// Start the router over `inbound` and return the client handle.
    ///
    /// `registry` is snapshotted for the router's lifetime. `cancel` stops
    /// the router, is passed into every inbound dispatch, and resolves every
    /// in-flight request as cancelled. Once the router has stopped, for any
    /// reason, requests fail with [`AppError::Cancelled`](crate::AppError::Cancelled)
    /// instead of waiting out the timeout.
    #[must_use]
    pub fn start(
        transport: Arc<dyn Transport>,
        inbound: InboundStreams,
        registry: CapabilityRegistry,
        settings: &ClientSettings,
        cancel: CancellationToken,
    ) -> (Self, RouterOutputs, JoinHandle<()>) {
        let table = CorrelationTable::new();
        let stopped = cancel.child_token();
        let issuer = RequestIssuer::new(table.clone(), Arc::clone(&transport), settings.request_timeout)
            .with_stop_signal(stopped.clone());

        let mut router = MessageRouter::new(table.clone(), transport, registry, settings.channel_capacity)
            .with_stop_signal(stopped);
        if let Some(limit) = settings.max_concurrent_dispatches {
            router = router.with_dispatch_limit(limit);
        }
        let (outputs, handle) = router.spawn(inbound, cancel);

        info!(timeout = ?settings.request_timeout, "control client started");
        (Self { table, issuer }, outputs, handle)
    }

    /// Send `request` and wait for its response payload.
    ///
    /// # Errors
    ///
    /// See [`RequestIssuer::send`].
    pub async fn send(&self, request: &ControlRequest, cancel: &CancellationToken) -> Result<Value> {
        self.issuer.send(request, cancel).await
    }

    /// Ask the peer to stop its current turn.
    ///
    /// # Errors
    ///
    /// See [`RequestIssuer::send`].
    pub async fn interrupt(&self, cancel: &CancellationToken) -> Result<Value> {
        self.send(&ControlRequest::Interrupt, cancel).await
    }

    /// Switch the peer's model; `None` restores its default.
    ///
    /// # Errors
    ///
    /// See [`RequestIssuer::send`].
    pub async fn set_model(&self, model: Option<String>, cancel: &CancellationToken) -> Result<Value> {
        self.send(&ControlRequest::SetModel { model }, cancel).await
    }

    /// Switch the peer's permission mode.
    ///
    /// # Errors
    ///
    /// See [`RequestIssuer::send`].
    pub async fn set_permission_mode(&self, mode: impl Into<String>, cancel: &CancellationToken) -> Result<Value> {
        self.send(&ControlRequest::SetPermissionMode { mode: mode.into() }, cancel)
            .await
    }

    /// Announce client capabilities, such as hook registrations.
    ///
    /// # Errors
    ///
    /// See [`RequestIssuer::send`].
    pub async fn initialize(&self, hooks: Option<Value>, cancel: &CancellationToken) -> Result<Value> {
        self.send(&ControlRequest::Initialize { hooks }, cancel).await
    }

    /// Number of outbound requests still awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.table.len()
    }
}
