//! The public channel handle.
//!
//! [`Channel::initialize`] connects the transport and spawns the
//! per-channel worker; the returned handle is a thin command front-end.
//! Co-signed actions resolve to an [`ActionOutcome`] once their round
//! completes; queries go through the correlator with the configured
//! ttl; state accessors read the worker's shared snapshot.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use aesc_core::address::{AccountId, ContractId};
use aesc_core::{Amount, ChannelError, ChannelEvent, ChannelId, ChannelStatus, FsmId, TxBlob};
use aesc_rpc::methods;
use aesc_rpc::params::Role;
use serde::Deserialize;

use crate::actions::{ActionKind, ActionOutcome, LeaveResult, OnChainCallbacks, PendingAction};
use crate::fsm::{ChannelFsm, SharedState};
use crate::options::ChannelOptions;
use crate::signer::{SignBroker, TaggedSigner, TransactionSigner};
use crate::transport::Transport;
use crate::worker::{Command, Worker};

/// Parameters for [`Channel::create_contract`].
#[derive(Clone, Debug)]
pub struct NewContractParams {
    /// Compiled contract code (opaque encoded blob).
    pub code: String,
    /// Encoded constructor call data.
    pub call_data: String,
    /// Initial contract balance.
    pub deposit: Amount,
    /// Virtual machine version.
    pub vm_version: u32,
    /// ABI version.
    pub abi_version: u32,
}

/// Parameters for [`Channel::call_contract`] and
/// [`Channel::force_progress`].
#[derive(Clone, Debug)]
pub struct CallContractParams {
    /// Called contract.
    pub contract: ContractId,
    /// Encoded call data.
    pub call_data: String,
    /// Amount attached to the call.
    pub amount: Amount,
    /// ABI version.
    pub abi_version: u32,
}

/// One entry of a [`Channel::balances`] reply.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AccountBalance {
    /// The queried account.
    pub account: AccountId,
    /// Its channel balance.
    pub balance: Amount,
}

/// A two-party state channel session.
///
/// One handle per session; dropping it releases the worker. All waits
/// are asynchronous and all state transitions are observed from the
/// channel's own worker task.
pub struct Channel {
    commands: mpsc::Sender<Command>,
    shared: Arc<SharedState>,
    events: broadcast::Sender<ChannelEvent>,
    cancel: CancellationToken,
    ttl: Duration,
    role: Role,
    initiator_id: AccountId,
    responder_id: AccountId,
}

impl Channel {
    /// Connect to the node and start the channel session.
    ///
    /// Resolves once the transport is up; the opening (or reestablish)
    /// handshake proceeds in the background. Subscribe to
    /// [`ChannelEvent::StatusChanged`] to observe it reaching `open`.
    #[instrument(skip_all, fields(role = %options.role))]
    pub async fn initialize(
        options: ChannelOptions,
        signer: Arc<dyn TaggedSigner>,
    ) -> Result<Self, ChannelError> {
        options.validate()?;
        let url = options.to_open_params().connect_url(&options.url)?;
        let (transport, inbound) = Transport::connect(&url).await?;

        let (events, _) = broadcast::channel(256);
        let shared = Arc::new(SharedState::new());
        let fsm = ChannelFsm::new(
            options.role,
            options.is_reestablish(),
            events.clone(),
            shared.clone(),
        );
        let broker = SignBroker::new(signer);
        let (commands, command_rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();

        let worker = Worker::new(
            transport,
            inbound,
            command_rx,
            fsm,
            broker,
            cancel.clone(),
            options.debug,
        );
        let _ = tokio::spawn(worker.run());

        Ok(Self {
            commands,
            shared,
            events,
            cancel,
            ttl: options.ttl,
            role: options.role,
            initiator_id: options.initiator_id,
            responder_id: options.responder_id,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Subscribe to channel events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Current public status.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        self.shared.read().status
    }

    /// Current off-chain round, when known.
    #[must_use]
    pub fn round(&self) -> Option<u64> {
        self.shared.read().round
    }

    /// Node-assigned channel id, once open.
    #[must_use]
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.shared.read().channel_id
    }

    /// Node-side FSM session id.
    #[must_use]
    pub fn fsm_id(&self) -> Option<FsmId> {
        self.shared.read().fsm_id
    }

    /// Last co-signed off-chain state.
    #[must_use]
    pub fn last_signed_tx(&self) -> Option<TxBlob> {
        self.shared.read().last_signed_tx
    }

    /// This side's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// This side's account.
    #[must_use]
    pub fn own_account(&self) -> &AccountId {
        match self.role {
            Role::Initiator => &self.initiator_id,
            Role::Responder => &self.responder_id,
        }
    }

    // ── Co-signed actions ───────────────────────────────────────────

    /// Transfer `amount` from `from` to `to` off-chain.
    pub async fn update(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        signer: impl TransactionSigner + 'static,
    ) -> Result<ActionOutcome, ChannelError> {
        ensure_positive(&amount, "transfer amount")?;
        if from == to {
            return Err(ChannelError::IllegalArgument(
                "cannot transfer to the sending account".into(),
            ));
        }
        self.submit(
            ActionKind::Transfer,
            methods::UPDATE_NEW,
            json!({ "from": from, "to": to, "amount": amount }),
            signer,
            OnChainCallbacks::new(),
            None,
        )
        .await
    }

    /// Deposit `amount` into the channel from on-chain funds.
    pub async fn deposit(
        &self,
        amount: Amount,
        signer: impl TransactionSigner + 'static,
        callbacks: OnChainCallbacks,
    ) -> Result<ActionOutcome, ChannelError> {
        ensure_positive(&amount, "deposit amount")?;
        self.submit(
            ActionKind::Deposit,
            methods::DEPOSIT,
            json!({ "amount": amount }),
            signer,
            callbacks,
            None,
        )
        .await
    }

    /// Withdraw `amount` from the channel back on-chain.
    pub async fn withdraw(
        &self,
        amount: Amount,
        signer: impl TransactionSigner + 'static,
        callbacks: OnChainCallbacks,
    ) -> Result<ActionOutcome, ChannelError> {
        ensure_positive(&amount, "withdraw amount")?;
        self.submit(
            ActionKind::Withdraw,
            methods::WITHDRAW,
            json!({ "amount": amount }),
            signer,
            callbacks,
            None,
        )
        .await
    }

    /// Create a contract inside the channel.
    ///
    /// On acceptance the outcome carries the contract address, derived
    /// from this side's account and the round the contract was created
    /// at.
    pub async fn create_contract(
        &self,
        params: NewContractParams,
        signer: impl TransactionSigner + 'static,
    ) -> Result<ActionOutcome, ChannelError> {
        if params.code.is_empty() {
            return Err(ChannelError::IllegalArgument("empty contract code".into()));
        }
        let owner = self.own_account().clone();
        self.submit(
            ActionKind::NewContract,
            methods::UPDATE_NEW_CONTRACT,
            json!({
                "code": params.code,
                "call_data": params.call_data,
                "deposit": params.deposit,
                "vm_version": params.vm_version,
                "abi_version": params.abi_version,
            }),
            signer,
            OnChainCallbacks::new(),
            Some(owner),
        )
        .await
    }

    /// Call a contract inside the channel.
    pub async fn call_contract(
        &self,
        params: CallContractParams,
        signer: impl TransactionSigner + 'static,
    ) -> Result<ActionOutcome, ChannelError> {
        self.submit(
            ActionKind::CallContract,
            methods::UPDATE_CALL_CONTRACT,
            json!({
                "contract_id": params.contract,
                "call_data": params.call_data,
                "amount": params.amount,
                "abi_version": params.abi_version,
            }),
            signer,
            OnChainCallbacks::new(),
            None,
        )
        .await
    }

    /// Force a contract call's result on chain when the counterparty
    /// refuses to co-sign.
    ///
    /// Resolves with the serialized force-progress transaction; posting
    /// it on chain is the caller's responsibility.
    pub async fn force_progress(
        &self,
        params: CallContractParams,
        signer: impl TransactionSigner + 'static,
        callbacks: OnChainCallbacks,
    ) -> Result<ActionOutcome, ChannelError> {
        self.submit(
            ActionKind::ForceProgress,
            methods::FORCE_PROGRESS,
            json!({
                "contract_id": params.contract,
                "call_data": params.call_data,
                "amount": params.amount,
                "abi_version": params.abi_version,
            }),
            signer,
            callbacks,
            None,
        )
        .await
    }

    /// Cooperative mutual close.
    ///
    /// On acceptance the outcome carries the co-signed
    /// `ChannelCloseMutualTx`; the status moves through `closing` to
    /// `closed`.
    pub async fn shutdown(
        &self,
        signer: impl TransactionSigner + 'static,
    ) -> Result<ActionOutcome, ChannelError> {
        self.submit(
            ActionKind::Shutdown,
            methods::SHUTDOWN,
            json!({}),
            signer,
            OnChainCallbacks::new(),
            None,
        )
        .await
    }

    /// Release the FSM session, keeping channel state on the node.
    ///
    /// The result carries the channel id and the last off-chain state,
    /// usable to reestablish later.
    pub async fn leave(&self) -> Result<LeaveResult, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Leave(reply)).await?;
        rx.await
            .map_err(|_| ChannelError::Connection("channel worker stopped".into()))?
    }

    /// Close the transport and stop the worker. The channel becomes
    /// `disconnected`; reconnecting is possible via
    /// [`ChannelOptions::with_reestablish`].
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send_command(Command::Disconnect(reply)).await.is_ok() {
            let _ = rx.await;
        }
        self.cancel.cancel();
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Send a message to the counterparty through the node.
    pub async fn send_message(
        &self,
        to: AccountId,
        info: impl Into<String>,
    ) -> Result<(), ChannelError> {
        self.send_command(Command::Notify {
            method: methods::MESSAGE.into(),
            params: json!({ "to": to, "info": info.into() }),
        })
        .await
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Fetch channel balances for `accounts`.
    pub async fn balances(
        &self,
        accounts: &[AccountId],
    ) -> Result<Vec<AccountBalance>, ChannelError> {
        if accounts.is_empty() {
            return Err(ChannelError::IllegalArgument(
                "balances requires at least one account".into(),
            ));
        }
        let result = self
            .call(methods::GET_BALANCES, json!({ "accounts": accounts }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| ChannelError::incoming(Value::Null, format!("malformed balances: {e}")))
    }

    /// Fetch a proof of inclusion covering `accounts` and `contracts`.
    ///
    /// The proof is an opaque encoded blob; decoding it needs the
    /// Merkle proof library.
    pub async fn poi(
        &self,
        accounts: &[AccountId],
        contracts: &[ContractId],
    ) -> Result<String, ChannelError> {
        if accounts.is_empty() && contracts.is_empty() {
            return Err(ChannelError::IllegalArgument(
                "poi requires at least one account or contract".into(),
            ));
        }
        let result = self
            .call(
                methods::GET_POI,
                json!({ "accounts": accounts, "contracts": contracts }),
            )
            .await?;
        result
            .get("poi")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ChannelError::incoming(result, "poi reply without proof"))
    }

    /// Fetch the result of the contract call performed at `round`.
    pub async fn get_contract_call(
        &self,
        caller: &AccountId,
        contract: &ContractId,
        round: u64,
    ) -> Result<Value, ChannelError> {
        self.call(
            methods::GET_CONTRACT_CALL,
            json!({ "caller": caller, "contract": contract, "round": round }),
        )
        .await
    }

    /// Dry-run a contract call against the current off-chain state.
    pub async fn call_contract_static(
        &self,
        params: CallContractParams,
    ) -> Result<Value, ChannelError> {
        self.call(
            methods::DRY_RUN_CALL_CONTRACT,
            json!({
                "contract_id": params.contract,
                "call_data": params.call_data,
                "amount": params.amount,
                "abi_version": params.abi_version,
            }),
        )
        .await
    }

    /// Fetch a contract's encoded state. The `contractState` blob is
    /// returned untouched.
    pub async fn get_contract_state(
        &self,
        contract: &ContractId,
    ) -> Result<Value, ChannelError> {
        self.call(methods::GET_CONTRACT, json!({ "pubkey": contract }))
            .await
    }

    /// Prune stored contract call results on the node.
    pub async fn clean_contract_calls(&self) -> Result<(), ChannelError> {
        let _ = self.call(methods::CLEAN_CONTRACT_CALLS, json!({})).await?;
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn submit(
        &self,
        kind: ActionKind,
        method: &'static str,
        params: Value,
        signer: impl TransactionSigner + 'static,
        callbacks: OnChainCallbacks,
        owner: Option<AccountId>,
    ) -> Result<ActionOutcome, ChannelError> {
        let (reply, rx) = oneshot::channel();
        let action = PendingAction {
            kind,
            method,
            params,
            signer: Arc::new(signer),
            callbacks,
            owner,
            reply,
        };
        self.send_command(Command::Action(action)).await?;
        rx.await
            .map_err(|_| ChannelError::Connection("channel worker stopped".into()))?
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Call {
            method: method.to_owned(),
            params,
            reply,
        })
        .await?;
        match tokio::time::timeout(self.ttl, rx).await {
            Err(_) => Err(ChannelError::Timeout {
                method: method.to_owned(),
            }),
            Ok(Err(_)) => Err(ChannelError::Connection("channel worker stopped".into())),
            Ok(Ok(result)) => result,
        }
    }

    async fn send_command(&self, command: Command) -> Result<(), ChannelError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChannelError::NotActive {
                status: self.status().to_string(),
            })
    }
}

fn ensure_positive(amount: &Amount, what: &str) -> Result<(), ChannelError> {
    if amount.is_zero() {
        return Err(ChannelError::IllegalArgument(format!(
            "{what} must be positive"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
