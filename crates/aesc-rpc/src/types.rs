//! JSON-RPC 2.0 frame types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol version sent in every outbound frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound request or notification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Method name (e.g. `channels.update.new`).
    pub method: String,
    /// Parameters object.
    pub params: Value,
}

impl OutboundFrame {
    /// Build a correlated request.
    #[must_use]
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Build a fire-and-forget notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: None,
            method: method.into(),
            params,
        }
    }
}

/// Error body inside an inbound error frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Node-assigned error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A classified inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// Response to a correlated request.
    Response {
        /// Echoed request id.
        id: String,
        /// Result payload.
        result: Value,
    },

    /// Error frame. `id` is present when the error answers a correlated
    /// request; absent when the node reports asynchronously.
    Error {
        /// Echoed request id, if any.
        id: Option<String>,
        /// Error body.
        error: RpcErrorBody,
    },

    /// Server-originated notification, routed to the FSM.
    Notification {
        /// Method name (e.g. `channels.info`).
        method: String,
        /// Parameters object.
        params: Value,
    },
}

/// Frame-level decode failure.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The text was not valid JSON.
    #[error("invalid JSON frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The JSON did not match any frame shape.
    #[error("frame is neither response, error nor notification")]
    UnrecognizedShape,
}

/// Classify a raw inbound text frame.
///
/// An `id` plus `result` is a response; an `error` body (with or
/// without an id) is an error frame; a `method` without an id is a
/// notification. Ids the node echoes as JSON numbers are normalized to
/// their decimal string form.
pub fn classify(text: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(text)?;

    let id = match value.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    if let Some(error) = value.get("error") {
        let error: RpcErrorBody = serde_json::from_value(error.clone())?;
        return Ok(InboundFrame::Error { id, error });
    }

    if let (Some(id), Some(result)) = (id.clone(), value.get("result")) {
        return Ok(InboundFrame::Response {
            id,
            result: result.clone(),
        });
    }

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        return Ok(InboundFrame::Notification {
            method: method.to_owned(),
            params: value.get("params").cloned().unwrap_or(Value::Null),
        });
    }

    Err(FrameError::UnrecognizedShape)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
