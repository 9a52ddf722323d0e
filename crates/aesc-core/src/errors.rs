//! Error taxonomy for the channel client.
//!
//! Built on [`thiserror`]. Every variant carries a machine-readable
//! code via [`ChannelError::code`], mirroring the wire-level error
//! taxonomy. Argument validation fails synchronously at the action
//! surface; transport and FSM errors fail the pending action and are
//! mirrored onto the event bus.

use serde_json::Value;
use thiserror::Error;

/// Exact message emitted when the FSM cannot map a message to a legal
/// transition.
pub const UNKNOWN_STATE_MESSAGE: &str = "State Channels FSM entered unknown state";

/// Top-level error type for channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Caller supplied invalid parameters.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// The action cannot be funded off-chain.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Transport refused the connection or dropped it.
    #[error("channel connection error: {0}")]
    Connection(String),

    /// The node replied with an error frame while a notification was
    /// being handled. Carries the raw inbound message and the
    /// classified handler error.
    #[error("error handling incoming message: {handler}")]
    IncomingMessage {
        /// The raw inbound frame.
        raw: Value,
        /// Classified description of what went wrong.
        handler: String,
    },

    /// The FSM encountered a message it could not map to a legal
    /// transition. Non-fatal: the session keeps processing messages.
    #[error("{UNKNOWN_STATE_MESSAGE}")]
    UnknownChannelState {
        /// The offending method or info event.
        context: String,
    },

    /// A round-trip exceeded the configured ttl.
    #[error("`{method}` timed out")]
    Timeout {
        /// The method that timed out.
        method: String,
    },

    /// Node error passed through unchanged.
    #[error("node error {code}: {message}")]
    Rpc {
        /// Node-assigned error code.
        code: i64,
        /// Node-assigned message.
        message: String,
    },

    /// The channel session has already terminated.
    #[error("channel is {status}")]
    NotActive {
        /// Terminal status the channel is in.
        status: String,
    },
}

impl ChannelError {
    /// Machine-readable error code for this variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::IllegalArgument(_) => "ILLEGAL_ARGUMENT",
            Self::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::IncomingMessage { .. } => "INCOMING_MESSAGE_ERROR",
            Self::UnknownChannelState { .. } => "UNKNOWN_CHANNEL_STATE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Rpc { .. } => "NODE_ERROR",
            Self::NotActive { .. } => "NOT_ACTIVE",
        }
    }

    /// Whether a reconnect may recover from this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout { .. } | Self::UnknownChannelState { .. }
        )
    }

    /// Wrap a raw inbound frame alongside its classified handler error.
    #[must_use]
    pub fn incoming(raw: Value, handler: impl Into<String>) -> Self {
        Self::IncomingMessage {
            raw,
            handler: handler.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            ChannelError::IllegalArgument("x".into()).code(),
            "ILLEGAL_ARGUMENT"
        );
        assert_eq!(
            ChannelError::InsufficientBalance("x".into()).code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(
            ChannelError::Connection("refused".into()).code(),
            "CONNECTION_ERROR"
        );
        assert_eq!(
            ChannelError::Timeout {
                method: "channels.get.poi".into()
            }
            .code(),
            "TIMEOUT"
        );
    }

    #[test]
    fn unknown_state_message_is_exact() {
        let err = ChannelError::UnknownChannelState {
            context: "channels.bogus".into(),
        };
        assert_eq!(err.to_string(), "State Channels FSM entered unknown state");
    }

    #[test]
    fn incoming_wraps_raw_frame() {
        let raw = json!({"method": "channels.info", "params": {}});
        let err = ChannelError::incoming(raw.clone(), "no pending action");
        match &err {
            ChannelError::IncomingMessage { raw: r, handler } => {
                assert_eq!(r, &raw);
                assert_eq!(handler, "no pending action");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.to_string().contains("no pending action"));
    }

    #[test]
    fn rpc_error_passes_code_through() {
        let err = ChannelError::Rpc {
            code: 100,
            message: "broken_encoding".into(),
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("broken_encoding"));
    }

    #[test]
    fn recoverable_classification() {
        assert!(ChannelError::Connection("dropped".into()).is_recoverable());
        assert!(ChannelError::UnknownChannelState {
            context: String::new()
        }
        .is_recoverable());
        assert!(!ChannelError::IllegalArgument("bad".into()).is_recoverable());
    }

    #[test]
    fn is_std_error() {
        let err = ChannelError::Connection("x".into());
        let _: &dyn std::error::Error = &err;
    }
}
