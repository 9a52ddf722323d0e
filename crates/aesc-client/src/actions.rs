//! Caller-driven actions and their outcomes.
//!
//! At most one action is in flight per channel; further submissions
//! queue FIFO behind it. Each action carries its untagged signer, an
//! optional on-chain callback bundle and a completion sink.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;

use aesc_core::address::{AccountId, ContractId};
use aesc_core::{ChannelError, ChannelId, ChannelStatus, TxBlob};

use crate::signer::TransactionSigner;

/// Kind of a caller-driven action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// Generic co-signed balance transfer.
    Transfer,
    /// On-chain deposit into the channel.
    Deposit,
    /// On-chain withdrawal from the channel.
    Withdraw,
    /// Off-chain contract creation.
    NewContract,
    /// Off-chain contract call.
    CallContract,
    /// Force-progress a contract call on chain.
    ForceProgress,
    /// Cooperative mutual close.
    Shutdown,
}

impl ActionKind {
    /// Status the channel reports while this action's round is in flight.
    #[must_use]
    pub fn in_flight_status(self) -> ChannelStatus {
        match self {
            Self::Transfer | Self::NewContract | Self::CallContract | Self::ForceProgress => {
                ChannelStatus::AwaitingUpdate
            }
            Self::Deposit => ChannelStatus::AwaitingDeposit,
            Self::Withdraw => ChannelStatus::AwaitingWithdraw,
            Self::Shutdown => ChannelStatus::Closing,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transfer => "transfer",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::NewContract => "new_contract",
            Self::CallContract => "call_contract",
            Self::ForceProgress => "force_progress",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Terminal result of a co-signed action.
///
/// Exactly one of the accepted/rejected shapes is produced per action:
/// `accepted == true` comes with the co-signed transaction; a rejection
/// optionally carries the counterparty's abort code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Whether the round was co-signed and adopted.
    pub accepted: bool,
    /// The co-signed transaction (accepted outcomes only).
    pub signed_tx: Option<TxBlob>,
    /// Contract address (accepted `create_contract` outcomes only).
    pub address: Option<ContractId>,
    /// User-defined abort code, when the round was aborted with one.
    pub error_code: Option<i64>,
    /// `"user-defined"` for abort codes; node text otherwise.
    pub error_message: Option<String>,
}

impl ActionOutcome {
    /// An accepted outcome carrying the co-signed transaction.
    #[must_use]
    pub fn accepted(signed_tx: TxBlob) -> Self {
        Self {
            accepted: true,
            signed_tx: Some(signed_tx),
            address: None,
            error_code: None,
            error_message: None,
        }
    }

    /// A plain rejection.
    #[must_use]
    pub fn rejected() -> Self {
        Self {
            accepted: false,
            signed_tx: None,
            address: None,
            error_code: None,
            error_message: None,
        }
    }

    /// A rejection caused by a user-defined abort code.
    #[must_use]
    pub fn aborted(code: i64) -> Self {
        Self {
            accepted: false,
            signed_tx: None,
            address: None,
            error_code: Some(code),
            error_message: Some("user-defined".into()),
        }
    }

    /// Attach the derived contract address.
    #[must_use]
    pub fn with_address(mut self, address: ContractId) -> Self {
        self.address = Some(address);
        self
    }
}

/// Result of a `leave` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaveResult {
    /// The channel left behind on the node.
    pub channel_id: ChannelId,
    /// Last co-signed off-chain state, usable for reestablish.
    pub signed_tx: Option<TxBlob>,
}

type TxCallback = Box<dyn Fn(&TxBlob) + Send + Sync>;
type LockCallback = Box<dyn Fn() + Send + Sync>;

/// On-chain lifecycle callbacks passed at action submission.
///
/// The bundle lives as long as the on-chain sequence the action started;
/// it is dropped once both sides are locked (or the channel closes).
#[derive(Default)]
pub struct OnChainCallbacks {
    pub(crate) on_chain_tx: Option<TxCallback>,
    pub(crate) own_deposit_locked: Option<LockCallback>,
    pub(crate) deposit_locked: Option<LockCallback>,
    pub(crate) own_withdraw_locked: Option<LockCallback>,
    pub(crate) withdraw_locked: Option<LockCallback>,
}

impl OnChainCallbacks {
    /// An empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the co-signed transaction is observed on chain.
    #[must_use]
    pub fn on_on_chain_tx(mut self, f: impl Fn(&TxBlob) + Send + Sync + 'static) -> Self {
        self.on_chain_tx = Some(Box::new(f));
        self
    }

    /// Called when the local party's deposit is confirmed.
    #[must_use]
    pub fn on_own_deposit_locked(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.own_deposit_locked = Some(Box::new(f));
        self
    }

    /// Called when both parties' deposits are confirmed.
    #[must_use]
    pub fn on_deposit_locked(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.deposit_locked = Some(Box::new(f));
        self
    }

    /// Called when the local party's withdrawal is confirmed.
    #[must_use]
    pub fn on_own_withdraw_locked(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.own_withdraw_locked = Some(Box::new(f));
        self
    }

    /// Called when both parties' withdrawals are confirmed.
    #[must_use]
    pub fn on_withdraw_locked(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.withdraw_locked = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for OnChainCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnChainCallbacks")
            .field("on_chain_tx", &self.on_chain_tx.is_some())
            .field("own_deposit_locked", &self.own_deposit_locked.is_some())
            .field("deposit_locked", &self.deposit_locked.is_some())
            .field("own_withdraw_locked", &self.own_withdraw_locked.is_some())
            .field("withdraw_locked", &self.withdraw_locked.is_some())
            .finish()
    }
}

/// A caller action travelling from the handle into the FSM.
pub(crate) struct PendingAction {
    pub kind: ActionKind,
    /// Method for the opening request.
    pub method: &'static str,
    /// Parameters for the opening request.
    pub params: Value,
    /// Untagged signer for this action.
    pub signer: Arc<dyn TransactionSigner>,
    /// On-chain callback bundle.
    pub callbacks: OnChainCallbacks,
    /// Contract owner, for `create_contract` address derivation.
    pub owner: Option<AccountId>,
    /// Completion sink.
    pub reply: oneshot::Sender<Result<ActionOutcome, ChannelError>>,
}

impl PendingAction {
    /// Complete this action, consuming it. A dropped receiver is fine:
    /// the caller gave up waiting.
    pub fn complete(self, result: Result<ActionOutcome, ChannelError>) {
        let _ = self.reply.send(result);
    }

    /// Detach the callback bundle so it can outlive completion.
    pub fn take_callbacks(&mut self) -> OnChainCallbacks {
        std::mem::take(&mut self.callbacks)
    }
}

impl fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAction")
            .field("kind", &self.kind)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_outcome_shape() {
        let outcome = ActionOutcome::accepted(TxBlob::from("tx_s"));
        assert!(outcome.accepted);
        assert_eq!(outcome.signed_tx.as_ref().unwrap().as_str(), "tx_s");
        assert!(outcome.error_code.is_none());
        assert!(outcome.error_message.is_none());
    }

    #[test]
    fn rejected_outcome_shape() {
        let outcome = ActionOutcome::rejected();
        assert!(!outcome.accepted);
        assert!(outcome.signed_tx.is_none());
        assert!(outcome.error_code.is_none());
    }

    #[test]
    fn aborted_outcome_carries_user_defined_message() {
        let outcome = ActionOutcome::aborted(1234);
        assert!(!outcome.accepted);
        assert_eq!(outcome.error_code, Some(1234));
        assert_eq!(outcome.error_message.as_deref(), Some("user-defined"));
    }

    #[test]
    fn with_address_attaches() {
        let addr = ContractId::new("ct_derived").unwrap();
        let outcome = ActionOutcome::accepted(TxBlob::from("tx")).with_address(addr.clone());
        assert_eq!(outcome.address, Some(addr));
    }

    #[test]
    fn in_flight_statuses() {
        assert_eq!(
            ActionKind::Transfer.in_flight_status(),
            ChannelStatus::AwaitingUpdate
        );
        assert_eq!(
            ActionKind::Deposit.in_flight_status(),
            ChannelStatus::AwaitingDeposit
        );
        assert_eq!(
            ActionKind::Withdraw.in_flight_status(),
            ChannelStatus::AwaitingWithdraw
        );
        assert_eq!(
            ActionKind::Shutdown.in_flight_status(),
            ChannelStatus::Closing
        );
        assert_eq!(
            ActionKind::NewContract.in_flight_status(),
            ChannelStatus::AwaitingUpdate
        );
    }

    #[test]
    fn callbacks_builder_flags() {
        let bundle = OnChainCallbacks::new()
            .on_on_chain_tx(|_| {})
            .on_deposit_locked(|| {});
        assert!(bundle.on_chain_tx.is_some());
        assert!(bundle.deposit_locked.is_some());
        assert!(bundle.own_deposit_locked.is_none());
        let debug = format!("{bundle:?}");
        assert!(debug.contains("on_chain_tx: true"));
    }

    #[test]
    fn action_kind_display() {
        assert_eq!(ActionKind::NewContract.to_string(), "new_contract");
        assert_eq!(ActionKind::Shutdown.to_string(), "shutdown");
    }
}
