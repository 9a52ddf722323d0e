//! Payloads delivered on the channel event bus.
//!
//! Subscribers receive a [`ChannelEvent`] per observable occurrence.
//! `StatusChanged` fires exactly once per status transition and is
//! delivered before any dependent action's completion resolves. Errors
//! that arrive with no pending action are only visible here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::AccountId;
use crate::status::ChannelStatus;
use crate::tx::TxBlob;

/// A message exchanged between channel participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Sending account.
    pub from: AccountId,
    /// Receiving account.
    pub to: AccountId,
    /// Message payload (plain text or JSON-encoded by convention).
    pub info: String,
}

/// Error surfaced on the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Machine-readable code of the classified error.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// The offending inbound frame, when one exists.
    pub raw: Option<Value>,
}

/// Events observable by channel subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// The public status changed. Fires once per transition.
    StatusChanged(ChannelStatus),

    /// A new co-signed off-chain state was adopted.
    StateChanged {
        /// The co-signed state transaction.
        signed_tx: TxBlob,
    },

    /// A participant message arrived.
    Message(ChannelMessage),

    /// An error was classified. Also delivered to the pending action's
    /// completion when one is in flight.
    Error(ErrorEvent),

    /// A channel-originated transaction was observed on chain.
    OnChainTx {
        /// The signed on-chain transaction.
        tx: TxBlob,
        /// Node-supplied context (e.g. `channel_create_tx`), if any.
        info: Option<String>,
    },

    /// The local party's deposit reached enough confirmations.
    OwnDepositLocked,
    /// Both parties' deposits are locked.
    DepositLocked,
    /// The local party's withdrawal reached enough confirmations.
    OwnWithdrawLocked,
    /// Both parties' withdrawals are locked.
    WithdrawLocked,
}

impl ChannelEvent {
    /// Event name as exposed to subscribers filtering by kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusChanged(_) => "statusChanged",
            Self::StateChanged { .. } => "stateChanged",
            Self::Message(_) => "message",
            Self::Error(_) => "error",
            Self::OnChainTx { .. } => "onChainTx",
            Self::OwnDepositLocked => "ownDepositLocked",
            Self::DepositLocked => "depositLocked",
            Self::OwnWithdrawLocked => "ownWithdrawLocked",
            Self::WithdrawLocked => "withdrawLocked",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
