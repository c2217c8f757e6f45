//! Message router: the single consumer of the transport's inbound frames.
//!
//! # Routing
//!
//! | Frame `type`              | Destination                                        |
//! |---------------------------|----------------------------------------------------|
//! | `control_response`        | [`CorrelationTable::deliver`] by the inner id     |
//! | `control_request`         | spawned dispatch task, answer written back         |
//! | `control_cancel_request`  | [`CorrelationTable::deliver`] with `Cancelled`     |
//! | *(any other)*             | [`RouterOutputs::messages`], unchanged, in order   |
//!
//! The loop ends on transport EOF, on the first fatal transport error
//! (forwarded once to [`RouterOutputs::errors`]), or when the cancellation
//! token fires. Both outputs are owned by the loop and close exactly once
//! when it returns, at which point the stop signal fires so that pending
//! outbound waits resolve instead of running out their timeout.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::capability::CapabilityRegistry;
use crate::control::correlation::CorrelationTable;
use crate::control::dispatcher;
use crate::control::envelope::{self, ControlOutcome, InboundFrame};
use crate::transport::{InboundStreams, Transport};
use crate::AppError;

/// Consumer side of a running router.
#[derive(Debug)]
pub struct RouterOutputs {
    /// Domain payloads in transport emission order.
    pub messages: mpsc::Receiver<Value>,
    /// Terminal transport errors (at most one).
    pub errors: mpsc::Receiver<AppError>,
}

/// Routes inbound frames to waiters, capability handlers, and the domain output.
pub struct MessageRouter {
    table: CorrelationTable,
    transport: Arc<dyn Transport>,
    registry: Arc<CapabilityRegistry>,
    dispatch_limit: Option<Arc<Semaphore>>,
    stopped: CancellationToken,
    capacity: usize,
}

impl MessageRouter {
    /// Create a router delivering responses into `table` and writing
    /// dispatch results to `transport`.
    #[must_use]
    pub fn new(
        table: CorrelationTable,
        transport: Arc<dyn Transport>,
        registry: CapabilityRegistry,
        capacity: usize,
    ) -> Self {
        Self {
            table,
            transport,
            registry: Arc::new(registry),
            dispatch_limit: None,
            stopped: CancellationToken::new(),
            capacity: capacity.max(1),
        }
    }

    /// Cap the number of concurrently running inbound dispatch tasks.
    ///
    /// Excess requests are still spawned immediately but wait for a permit
    /// inside their task, so the router loop never blocks on the cap.
    #[must_use]
    pub fn with_dispatch_limit(mut self, limit: usize) -> Self {
        self.dispatch_limit = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    /// Cancel `stopped` when the routing loop returns, whatever the reason.
    #[must_use]
    pub fn with_stop_signal(mut self, stopped: CancellationToken) -> Self {
        self.stopped = stopped;
        self
    }

    /// Spawn the routing loop over `inbound`.
    #[must_use]
    pub fn spawn(self, inbound: InboundStreams, cancel: CancellationToken) -> (RouterOutputs, JoinHandle<()>) {
        let (msg_tx, messages) = mpsc::channel(self.capacity);
        let (err_tx, errors) = mpsc::channel(1);
        let handle = tokio::spawn(
            self.run(inbound, msg_tx, err_tx, cancel)
                .instrument(info_span!("control_router")),
        );
        (RouterOutputs { messages, errors }, handle)
    }

    /// Routing loop; see the module docs.
    ///
    /// `msg_tx` and `err_tx` are dropped on return, closing both outputs.
    pub async fn run(
        self,
        mut inbound: InboundStreams,
        msg_tx: mpsc::Sender<Value>,
        err_tx: mpsc::Sender<AppError>,
        cancel: CancellationToken,
    ) {
        info!("control router started");
        let _stopped = self.stopped.clone().drop_guard();
        let mut errors_open = true;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("control router: cancellation received, stopping");
                    break;
                }

                frame = inbound.frames.recv() => match frame {
                    Some(frame) => self.route(frame, &msg_tx, &cancel).await,
                    None => {
                        // The transport closes its frame queue after reporting an error.
                        if let Ok(err) = inbound.errors.try_recv() {
                            report_fatal(&err_tx, err).await;
                        } else {
                            debug!("control router: inbound stream ended");
                        }
                        break;
                    }
                },

                err = inbound.errors.recv(), if errors_open => match err {
                    Some(err) => {
                        report_fatal(&err_tx, err).await;
                        break;
                    }
                    None => errors_open = false,
                },
            }
        }

        info!(pending = self.table.len(), "control router stopped");
    }

    async fn route(&self, frame: Value, msg_tx: &mpsc::Sender<Value>, cancel: &CancellationToken) {
        match envelope::classify(frame) {
            InboundFrame::Response {
                request_id,
                outcome,
            } => {
                let delivered = self.table.deliver(&request_id, outcome);
                debug!(request_id = %request_id, delivered, "control response routed");
            }

            InboundFrame::Request {
                request_id,
                request,
            } => self.spawn_dispatch(request_id, request, cancel.clone()),

            InboundFrame::Cancel { request_id } => {
                let delivered = self.table.deliver(&request_id, ControlOutcome::Cancelled);
                self.table.remove(&request_id);
                debug!(request_id = %request_id, delivered, "control cancellation routed");
            }

            InboundFrame::Domain(frame) => {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        debug!("control router: cancelled while forwarding, dropping frame");
                    }

                    sent = msg_tx.send(frame) => {
                        if sent.is_err() {
                            debug!("control router: domain consumer gone, dropping frame");
                        }
                    }
                }
            }

            InboundFrame::Malformed { kind, reason } => {
                warn!(kind, reason = %reason, "control router: malformed control frame, skipping");
            }
        }
    }

    fn spawn_dispatch(&self, request_id: String, request: Value, cancel: CancellationToken) {
        let subtype = request
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let span = info_span!("control_dispatch", request_id = %request_id, subtype = %subtype);

        let registry = Arc::clone(&self.registry);
        let transport = Arc::clone(&self.transport);
        let limit = self.dispatch_limit.clone();

        tokio::spawn(
            async move {
                let _permit = match limit {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };

                let result = dispatcher::dispatch(request, &registry, cancel).await;
                if let Err(ref err) = result {
                    warn!(error = %err, "inbound control request failed");
                }

                let frame = envelope::response_frame(&request_id, &result);
                let written = match envelope::to_line(&frame) {
                    Ok(line) => transport.write(line).await,
                    Err(err) => Err(err),
                };
                match written {
                    Ok(()) => debug!("control response written"),
                    Err(err) => warn!(error = %err, "failed to write control response"),
                }
            }
            .instrument(span),
        );
    }
}

async fn report_fatal(err_tx: &mpsc::Sender<AppError>, err: AppError) {
    warn!(error = %err, "control router: fatal transport error");
    if err_tx.send(err).await.is_err() {
        debug!("control router: error consumer gone");
    }
}
