//! Off-chain update operations.
//!
//! Every co-signed state advance carries a list of typed sub-operations.
//! The node names the variant in an `op` tag; modeling them as a closed
//! sum type means an unexpected operation fails deserialization instead
//! of being silently mis-handled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::{AccountId, ContractId};
use crate::amount::Amount;

/// A single operation inside an off-chain update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum UpdateOp {
    /// Move `amount` from one participant to the other.
    OffChainTransfer {
        /// Paying account.
        from: AccountId,
        /// Receiving account.
        to: AccountId,
        /// Transferred amount.
        amount: Amount,
    },

    /// Move on-chain funds into the channel.
    OffChainDeposit {
        /// Depositing account.
        from: AccountId,
        /// Deposited amount.
        amount: Amount,
    },

    /// Move channel funds back on-chain.
    OffChainWithdrawal {
        /// Receiving account.
        to: AccountId,
        /// Withdrawn amount.
        amount: Amount,
    },

    /// Create a contract inside the channel state tree.
    OffChainNewContract {
        /// Contract owner.
        owner: AccountId,
        /// Compiled contract code (opaque encoded blob).
        code: String,
        /// Encoded constructor call data.
        call_data: String,
        /// Initial contract balance.
        deposit: Amount,
        /// Virtual machine version.
        vm_version: u32,
        /// ABI version.
        abi_version: u32,
    },

    /// Call a contract inside the channel state tree.
    OffChainCallContract {
        /// Calling account.
        caller: AccountId,
        /// Called contract.
        contract: ContractId,
        /// ABI version.
        abi_version: u32,
        /// Amount attached to the call.
        amount: Amount,
        /// Encoded call data.
        call_data: String,
        /// Nested call stack (empty for direct calls).
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        call_stack: Vec<ContractId>,
        /// Gas price in aettos.
        gas_price: Amount,
        /// Gas limit.
        gas: u64,
    },

    /// Attach opaque metadata to the round.
    OffChainMeta {
        /// Free-form payload; never interpreted by the client.
        data: Value,
    },
}

impl UpdateOp {
    /// The wire name of this operation.
    #[must_use]
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::OffChainTransfer { .. } => "OffChainTransfer",
            Self::OffChainDeposit { .. } => "OffChainDeposit",
            Self::OffChainWithdrawal { .. } => "OffChainWithdrawal",
            Self::OffChainNewContract { .. } => "OffChainNewContract",
            Self::OffChainCallContract { .. } => "OffChainCallContract",
            Self::OffChainMeta { .. } => "OffChainMeta",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
