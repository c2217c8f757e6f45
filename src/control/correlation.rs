//! Correlation table for outbound control requests.
//!
//! Maps a correlation id to the single-slot channel its caller waits on.
//! The table is a rendezvous point only: it never writes to the transport
//! and never exposes iteration over its entries.
//!
//! # Lifecycle
//!
//! 1. The issuer calls [`CorrelationTable::register`] and keeps the
//!    returned [`Waiter`].
//! 2. The router calls [`CorrelationTable::deliver`] when a response or a
//!    peer cancellation arrives; delivery removes the entry.
//! 3. Timeout, caller cancellation, or dropping the [`Waiter`] removes the
//!    entry through [`CorrelationTable::remove`], which is idempotent.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::control::envelope::ControlOutcome;
use crate::{AppError, Result};

type PendingMap = HashMap<String, oneshot::Sender<ControlOutcome>>;

/// Thread-safe map of pending waiters keyed by correlation id.
///
/// Clones share the same underlying map. The lock is never held across an
/// await point or any I/O.
#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<Mutex<PendingMap>>,
}

impl CorrelationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if a waiter for `id` is already
    /// pending; the live entry is left untouched.
    pub fn register(&self, id: &str) -> Result<Waiter> {
        let (tx, rx) = oneshot::channel();
        match self.lock().entry(id.to_owned()) {
            Entry::Occupied(_) => {
                warn!(request_id = id, "correlation table: id already pending");
                return Err(AppError::Protocol(format!(
                    "correlation id already pending: {id}"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        debug!(request_id = id, "correlation table: waiter registered");
        Ok(Waiter {
            id: id.to_owned(),
            rx,
            table: self.clone(),
        })
    }

    /// Deliver `outcome` to the waiter for `id`, removing the entry.
    ///
    /// Returns `true` if a waiter existed and received the outcome. Unknown
    /// or already-resolved ids are silently dropped and return `false`.
    pub fn deliver(&self, id: &str, outcome: ControlOutcome) -> bool {
        let Some(tx) = self.lock().remove(id) else {
            debug!(request_id = id, "correlation table: no waiter, dropping outcome");
            return false;
        };

        if tx.send(outcome).is_err() {
            debug!(request_id = id, "correlation table: waiter already gone");
            return false;
        }

        true
    }

    /// Remove the waiter for `id`. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) {
        if self.lock().remove(id).is_some() {
            debug!(request_id = id, "correlation table: waiter removed");
        }
    }

    /// Whether a waiter is registered for `id`.
    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of live waiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no waiters are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Receiving half of one pending request.
///
/// Dropping a `Waiter` removes its table entry, so an abandoned wait never
/// leaks.
#[derive(Debug)]
pub struct Waiter {
    id: String,
    rx: oneshot::Receiver<ControlOutcome>,
    table: CorrelationTable,
}

impl Waiter {
    /// Wait for the outcome.
    ///
    /// Returns `None` if the entry was removed without a delivery.
    pub async fn recv(&mut self) -> Option<ControlOutcome> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

/// Generator of correlation ids: `req_<counter>_<random suffix>`.
///
/// The counter is monotonic per generator; the random suffix keeps ids
/// distinct across generator restarts.
#[derive(Debug, Default)]
pub struct CorrelationIds {
    counter: AtomicU64,
}

impl CorrelationIds {
    /// Create a generator starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next id.
    #[must_use]
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let suffix = Uuid::new_v4().simple().to_string();
        format!("req_{n}_{}", &suffix[..8])
    }
}
