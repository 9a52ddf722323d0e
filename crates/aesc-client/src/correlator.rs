//! Request/response correlation.
//!
//! Outbound requests get monotonic decimal string ids. Inbound frames
//! carrying an id resolve or reject the matching waiter; frames without
//! an id belong to the FSM. On teardown every outstanding waiter is
//! rejected with a transport error carrying the last inbound error
//! frame, if one was seen.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use aesc_core::ChannelError;
use aesc_rpc::types::{OutboundFrame, RpcErrorBody};

type Waiter = oneshot::Sender<Result<Value, ChannelError>>;

/// Pairs outbound requests with inbound responses by id.
pub struct Correlator {
    next_id: u64,
    pending: HashMap<String, Waiter>,
    last_error: Option<RpcErrorBody>,
}

impl Correlator {
    /// Create an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            last_error: None,
        }
    }

    /// Register a request and return the frame to send.
    pub fn register(
        &mut self,
        method: impl Into<String>,
        params: Value,
        reply: Waiter,
    ) -> OutboundFrame {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let _ = self.pending.insert(id.clone(), reply);
        OutboundFrame::request(id, method, params)
    }

    /// Resolve the waiter for `id` with a result payload.
    ///
    /// Returns `false` when no waiter is pending under that id (late or
    /// duplicate response).
    pub fn resolve(&mut self, id: &str, result: Value) -> bool {
        match self.pending.remove(id) {
            Some(waiter) => {
                let _ = waiter.send(Ok(result));
                true
            }
            None => {
                warn!(id, "response for unknown request id");
                false
            }
        }
    }

    /// Reject the waiter for `id` with a node error, recording the
    /// error as the last one seen.
    pub fn reject(&mut self, id: &str, error: RpcErrorBody) -> bool {
        let rpc_error = ChannelError::Rpc {
            code: error.code,
            message: error.message.clone(),
        };
        self.last_error = Some(error);
        match self.pending.remove(id) {
            Some(waiter) => {
                let _ = waiter.send(Err(rpc_error));
                true
            }
            None => {
                warn!(id, "error for unknown request id");
                false
            }
        }
    }

    /// Record an error frame that did not target a pending request.
    pub fn record_error(&mut self, error: RpcErrorBody) {
        self.last_error = Some(error);
    }

    /// The most recent inbound error frame, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&RpcErrorBody> {
        self.last_error.as_ref()
    }

    /// Number of outstanding waiters.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reject every outstanding waiter with a transport error.
    ///
    /// The error message carries the last inbound error frame when one
    /// was seen, so callers learn why the session went away.
    pub fn teardown(&mut self, reason: &str) {
        let detail = match &self.last_error {
            Some(err) => format!("{reason} (last node error {}: {})", err.code, err.message),
            None => reason.to_owned(),
        };
        debug!(
            outstanding = self.pending.len(),
            reason, "correlator teardown"
        );
        for (_, waiter) in self.pending.drain() {
            let _ = waiter.send(Err(ChannelError::Connection(detail.clone())));
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
