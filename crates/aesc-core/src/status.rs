//! Public channel status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally observable lifecycle status of a channel session.
///
/// Coarser than the internal FSM state: several FSM states map onto one
/// status. `statusChanged` bus events fire exactly once per transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelStatus {
    /// WebSocket connect in progress.
    Connecting,
    /// Transport up, opening handshake not finished.
    Connected,
    /// Waiting for the co-signed create/deposit/withdraw transaction to
    /// reach the chain.
    AwaitingOnChainTx,
    /// Transaction seen on chain, waiting for confirmations.
    AwaitingOnChainConfirmation,
    /// Reestablish handshake in progress.
    AwaitingReestablish,
    /// Channel open; no blocking on-chain confirmation pending.
    Open,
    /// Deposit round in flight.
    AwaitingDeposit,
    /// Withdraw round in flight.
    AwaitingWithdraw,
    /// Generic co-signed update round in flight.
    AwaitingUpdate,
    /// Transport lost or released; reconnect is possible.
    Disconnected,
    /// Mutual close in progress.
    Closing,
    /// Channel closed normally. Terminal.
    Closed,
    /// Unrecoverable failure. Terminal.
    Died,
}

impl ChannelStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Died)
    }

    /// The camelCase name used on the event bus.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::AwaitingOnChainTx => "awaitingOnChainTx",
            Self::AwaitingOnChainConfirmation => "awaitingOnChainConfirmation",
            Self::AwaitingReestablish => "awaitingReestablish",
            Self::Open => "open",
            Self::AwaitingDeposit => "awaitingDeposit",
            Self::AwaitingWithdraw => "awaitingWithdraw",
            Self::AwaitingUpdate => "awaitingUpdate",
            Self::Disconnected => "disconnected",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Died => "died",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
