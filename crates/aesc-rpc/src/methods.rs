//! Channel method names and the sign-tag mapping.
//!
//! The node asks for signatures with `channels.sign.<tag>` and expects
//! the signed transaction back as `channels.<tag>`. Tags are a closed
//! sum type so an unexpected tag is a classification error, not a
//! silently dropped request.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Caller-driven requests ──────────────────────────────────────────

/// Start a generic co-signed update round.
pub const UPDATE_NEW: &str = "channels.update.new";
/// Start a co-signed deposit round.
pub const DEPOSIT: &str = "channels.deposit";
/// Start a co-signed withdraw round.
pub const WITHDRAW: &str = "channels.withdraw";
/// Start a co-signed round creating a contract.
pub const UPDATE_NEW_CONTRACT: &str = "channels.update.new_contract";
/// Start a co-signed round calling a contract.
pub const UPDATE_CALL_CONTRACT: &str = "channels.update.call_contract";
/// Request a force-progress transaction.
pub const FORCE_PROGRESS: &str = "channels.force_progress";
/// Start a cooperative mutual close.
pub const SHUTDOWN: &str = "channels.shutdown";
/// Release the FSM session, keeping channel state on the node.
pub const LEAVE: &str = "channels.leave";
/// Participant message (both directions).
pub const MESSAGE: &str = "channels.message";
/// Error report (both directions; used to propagate signer aborts).
pub const ERROR: &str = "channels.error";

// ── Correlated queries ──────────────────────────────────────────────

/// Fetch balances for a set of accounts.
pub const GET_BALANCES: &str = "channels.get.balances";
/// Fetch a proof of inclusion.
pub const GET_POI: &str = "channels.get.poi";
/// Fetch the result of a past contract call round.
pub const GET_CONTRACT_CALL: &str = "channels.get.contract_call";
/// Fetch encoded contract state.
pub const GET_CONTRACT: &str = "channels.get.contract";
/// Dry-run a contract call against the current state.
pub const DRY_RUN_CALL_CONTRACT: &str = "channels.dry_run.call_contract";
/// Prune stored contract call results.
pub const CLEAN_CONTRACT_CALLS: &str = "channels.clean_contract_calls";

// ── Node-originated notifications ───────────────────────────────────

/// Lifecycle info events (`params.data.event`).
pub const INFO: &str = "channels.info";
/// New co-signed off-chain state (`params.data.state`).
pub const UPDATE: &str = "channels.update";
/// A channel transaction was observed on chain.
pub const ON_CHAIN_TX: &str = "channels.on_chain_tx";

const SIGN_PREFIX: &str = "channels.sign.";

/// Why the node is asking for a signature.
///
/// Own-action tags (`update`, `deposit_tx`, ...) are routed to the
/// untagged signer supplied with the pending action; acknowledgement
/// tags are routed to the channel's tagged signer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignTag {
    /// Initiator's signature on the opening `ChannelCreateTx`.
    InitiatorSign,
    /// Responder's signature on the opening `ChannelCreateTx`.
    ResponderSign,
    /// Initiator-side signature on an update the local caller started.
    Update,
    /// Counterparty acknowledgement of an update round.
    UpdateAck,
    /// Signature on a deposit the local caller started.
    DepositTx,
    /// Counterparty acknowledgement of a deposit round.
    DepositAck,
    /// Signature on a withdrawal the local caller started.
    WithdrawTx,
    /// Counterparty acknowledgement of a withdraw round.
    WithdrawAck,
    /// Signature on a mutual close the local caller started.
    ShutdownSign,
    /// Counterparty acknowledgement of a mutual close.
    ShutdownSignAck,
    /// Signature on a force-progress transaction.
    ForceProgressTx,
}

impl SignTag {
    /// The tag's wire spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitiatorSign => "initiator_sign",
            Self::ResponderSign => "responder_sign",
            Self::Update => "update",
            Self::UpdateAck => "update_ack",
            Self::DepositTx => "deposit_tx",
            Self::DepositAck => "deposit_ack",
            Self::WithdrawTx => "withdraw_tx",
            Self::WithdrawAck => "withdraw_ack",
            Self::ShutdownSign => "shutdown_sign",
            Self::ShutdownSignAck => "shutdown_sign_ack",
            Self::ForceProgressTx => "force_progress_tx",
        }
    }

    /// Parse a `channels.sign.<tag>` method name.
    #[must_use]
    pub fn from_sign_method(method: &str) -> Option<Self> {
        let tag = method.strip_prefix(SIGN_PREFIX)?;
        match tag {
            "initiator_sign" => Some(Self::InitiatorSign),
            "responder_sign" => Some(Self::ResponderSign),
            "update" => Some(Self::Update),
            "update_ack" => Some(Self::UpdateAck),
            "deposit_tx" => Some(Self::DepositTx),
            "deposit_ack" => Some(Self::DepositAck),
            "withdraw_tx" => Some(Self::WithdrawTx),
            "withdraw_ack" => Some(Self::WithdrawAck),
            "shutdown_sign" => Some(Self::ShutdownSign),
            "shutdown_sign_ack" => Some(Self::ShutdownSignAck),
            "force_progress_tx" => Some(Self::ForceProgressTx),
            _ => None,
        }
    }

    /// The method the node uses to request this signature.
    #[must_use]
    pub fn request_method(self) -> String {
        format!("{SIGN_PREFIX}{}", self.as_str())
    }

    /// The method the client uses to return the signed transaction.
    #[must_use]
    pub fn reply_method(self) -> String {
        format!("channels.{}", self.as_str())
    }

    /// Whether this tag is signed by the untagged signer of the pending
    /// caller action (as opposed to the channel's tagged signer).
    #[must_use]
    pub fn uses_action_signer(self) -> bool {
        matches!(
            self,
            Self::Update
                | Self::DepositTx
                | Self::WithdrawTx
                | Self::ShutdownSign
                | Self::ForceProgressTx
        )
    }
}

impl fmt::Display for SignTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
