//! Outbound control request issuer.
//!
//! Sends one control request and waits for its correlated response,
//! racing the response against a fixed timeout and the caller's
//! cancellation token. Exactly one frame is written per call; retries are
//! the caller's business.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::control::correlation::{CorrelationIds, CorrelationTable};
use crate::control::envelope::{self, ControlOutcome, ControlRequest};
use crate::transport::Transport;
use crate::{AppError, Result};

/// Issues outbound control requests over a shared transport.
pub struct RequestIssuer {
    table: CorrelationTable,
    ids: CorrelationIds,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    stopped: CancellationToken,
}

impl RequestIssuer {
    /// Create an issuer writing to `transport` and waiting in `table`.
    #[must_use]
    pub fn new(table: CorrelationTable, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            table,
            ids: CorrelationIds::new(),
            transport,
            timeout,
            stopped: CancellationToken::new(),
        }
    }

    /// Fail pending and future requests once `stopped` fires.
    ///
    /// The client wires this to the router's lifetime: nothing can deliver a
    /// response after the router has stopped.
    #[must_use]
    pub fn with_stop_signal(mut self, stopped: CancellationToken) -> Self {
        self.stopped = stopped;
        self
    }

    /// Send `request` and wait for the peer's response payload.
    ///
    /// The waiter is removed from the correlation table on every exit path,
    /// so a response arriving after a timeout or cancellation is dropped.
    ///
    /// # Errors
    ///
    /// - [`AppError::Transport`]: the frame could not be written; no
    ///   response is awaited.
    /// - [`AppError::Control`]: the peer answered with an `error` subtype.
    /// - [`AppError::ControlTimeout`]: no response inside the window;
    ///   carries the request subtype.
    /// - [`AppError::Cancelled`]: `cancel` fired, the stop signal fired, or
    ///   the peer cancelled the request.
    pub async fn send(&self, request: &ControlRequest, cancel: &CancellationToken) -> Result<Value> {
        let request_id = self.ids.next_id();
        let subtype = request.subtype();
        let span = info_span!("control_request", request_id = %request_id, subtype);

        async move {
            if self.stopped.is_cancelled() {
                debug!("control router stopped, not sending");
                return Err(AppError::Cancelled(format!(
                    "'{subtype}' request not sent: control router stopped"
                )));
            }

            let frame = envelope::encode_request(&request_id, request)?;
            let mut waiter = self.table.register(&request_id)?;

            if let Err(err) = self.transport.write(frame).await {
                warn!(error = %err, "control request write failed");
                self.table.remove(&request_id);
                return Err(err);
            }
            debug!("control request written, awaiting response");

            let outcome = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    self.table.remove(&request_id);
                    debug!("control request cancelled by caller");
                    return Err(AppError::Cancelled(format!("'{subtype}' request cancelled by caller")));
                }

                received = tokio::time::timeout(self.timeout, waiter.recv()) => received,

                () = self.stopped.cancelled() => {
                    self.table.remove(&request_id);
                    debug!("control router stopped while awaiting response");
                    return Err(AppError::Cancelled(format!(
                        "'{subtype}' request abandoned: control router stopped"
                    )));
                }
            };

            match outcome {
                Err(_elapsed) => {
                    self.table.remove(&request_id);
                    warn!(timeout = ?self.timeout, "control request timed out");
                    Err(AppError::ControlTimeout(subtype.to_owned()))
                }
                Ok(None) => Err(AppError::Cancelled(format!(
                    "'{subtype}' request abandoned before a response arrived"
                ))),
                Ok(Some(ControlOutcome::Success(payload))) => Ok(payload),
                Ok(Some(ControlOutcome::Error(message))) => {
                    debug!(error = %message, "peer reported control error");
                    Err(AppError::Control(message))
                }
                Ok(Some(ControlOutcome::Cancelled)) => Err(AppError::Cancelled(format!(
                    "'{subtype}' request cancelled by peer"
                ))),
            }
        }
        .instrument(span)
        .await
    }
}
