//! The channel finite-state machine.
//!
//! Deterministic core of the client: consumes inbound notifications,
//! caller actions and sign results; produces outbound frames, sign
//! requests and bus events. The FSM performs no I/O itself — the worker
//! sends its frames and awaits its sign requests, then feeds the
//! outcome back through [`ChannelFsm::sign_completed`].
//!
//! Round bookkeeping: `round` becomes 1 when the channel opens and
//! advances by exactly 1 per accepted co-signed round (whether this
//! side initiated or acknowledged it). Rejected rounds leave `round`
//! and `last_signed_tx` untouched. After reestablish the round is
//! unknown and stays unknown: the state blob cannot be decoded without
//! the transaction codec.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use aesc_core::address::ContractId;
use aesc_core::errors::UNKNOWN_STATE_MESSAGE;
use aesc_core::events::ErrorEvent;
use aesc_core::{
    ChannelError, ChannelEvent, ChannelId, ChannelMessage, ChannelStatus, FsmId, TxBlob, UpdateOp,
};
use aesc_rpc::params::Role;
use aesc_rpc::types::{OutboundFrame, RpcErrorBody};
use aesc_rpc::{methods, SignTag};

use crate::actions::{ActionKind, ActionOutcome, LeaveResult, OnChainCallbacks, PendingAction};
use crate::signer::{SignMeta, SignOutcome, TransactionSigner};

// ─────────────────────────────────────────────────────────────────────────────
// States
// ─────────────────────────────────────────────────────────────────────────────

/// Internal FSM state. Finer-grained than [`ChannelStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FsmState {
    /// WebSocket connect in progress.
    Connecting,
    /// Transport up, waiting for the node to drive the open handshake.
    Initialized,
    /// Reestablish handshake in progress.
    AwaitingReestablish,
    /// Open handshake announced, awaiting our create signature request.
    HalfSigned,
    /// Create transaction signed, awaiting funding progress.
    Signed,
    /// Waiting for the funding transaction to reach the chain.
    AwaitingOnChainTx,
    /// Funding seen on chain, waiting for confirmations.
    AwaitingOnChainConfirmation,
    /// Channel open and idle.
    Open,
    /// A generic co-signed round is in flight.
    AwaitingUpdate,
    /// A deposit round (and its confirmations) is in flight.
    AwaitingDeposit,
    /// A withdraw round (and its confirmations) is in flight.
    AwaitingWithdraw,
    /// Waiting for the node to acknowledge `leave`.
    AwaitingLeaveAck,
    /// Waiting for the mutual-close round to complete.
    AwaitingShutdownAck,
    /// Mutual close co-signed, waiting for the chain.
    Closing,
    /// Transport lost or released; reconnect is possible.
    Disconnected,
    /// Closed normally. Terminal.
    Closed,
    /// Unrecoverable. Terminal.
    Died,
}

impl FsmState {
    fn status(self) -> ChannelStatus {
        match self {
            Self::Connecting => ChannelStatus::Connecting,
            Self::Initialized | Self::HalfSigned | Self::Signed => ChannelStatus::Connected,
            Self::AwaitingReestablish => ChannelStatus::AwaitingReestablish,
            Self::AwaitingOnChainTx => ChannelStatus::AwaitingOnChainTx,
            Self::AwaitingOnChainConfirmation => ChannelStatus::AwaitingOnChainConfirmation,
            Self::Open | Self::AwaitingLeaveAck => ChannelStatus::Open,
            Self::AwaitingUpdate => ChannelStatus::AwaitingUpdate,
            Self::AwaitingDeposit => ChannelStatus::AwaitingDeposit,
            Self::AwaitingWithdraw => ChannelStatus::AwaitingWithdraw,
            Self::AwaitingShutdownAck | Self::Closing => ChannelStatus::Closing,
            Self::Disconnected => ChannelStatus::Disconnected,
            Self::Closed => ChannelStatus::Closed,
            Self::Died => ChannelStatus::Died,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Died)
    }
}

fn action_state(kind: ActionKind) -> FsmState {
    match kind {
        ActionKind::Transfer
        | ActionKind::NewContract
        | ActionKind::CallContract
        | ActionKind::ForceProgress => FsmState::AwaitingUpdate,
        ActionKind::Deposit => FsmState::AwaitingDeposit,
        ActionKind::Withdraw => FsmState::AwaitingWithdraw,
        ActionKind::Shutdown => FsmState::AwaitingShutdownAck,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Info events
// ─────────────────────────────────────────────────────────────────────────────

/// Known `channels.info` lifecycle events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum InfoEvent {
    FsmUp { fsm_id: Option<FsmId> },
    ChannelOpen,
    ChannelAccept,
    FundingCreated,
    FundingSigned,
    OwnFundingLocked,
    FundingLocked,
    Open,
    ChannelReestablished,
    DepositCreated,
    OwnDepositLocked,
    DepositLocked,
    WithdrawCreated,
    OwnWithdrawLocked,
    WithdrawLocked,
    PeerDisconnected,
    Shutdown,
    Closing,
    Closed,
    Died,
    Other(String),
}

impl InfoEvent {
    fn parse(params: &Value) -> Option<Self> {
        let data = params.get("data")?;
        let event = data.get("event")?.as_str()?;
        Some(match event {
            "fsm_up" => Self::FsmUp {
                fsm_id: data
                    .get("fsm_id")
                    .and_then(Value::as_str)
                    .map(FsmId::from),
            },
            "channel_open" => Self::ChannelOpen,
            "channel_accept" => Self::ChannelAccept,
            "funding_created" => Self::FundingCreated,
            "funding_signed" => Self::FundingSigned,
            "own_funding_locked" => Self::OwnFundingLocked,
            "funding_locked" => Self::FundingLocked,
            "open" => Self::Open,
            "channel_reestablished" => Self::ChannelReestablished,
            "deposit_created" => Self::DepositCreated,
            "own_deposit_locked" => Self::OwnDepositLocked,
            "deposit_locked" => Self::DepositLocked,
            "withdraw_created" => Self::WithdrawCreated,
            "own_withdraw_locked" => Self::OwnWithdrawLocked,
            "withdraw_locked" => Self::WithdrawLocked,
            "peer_disconnected" => Self::PeerDisconnected,
            "shutdown" => Self::Shutdown,
            "closing" => Self::Closing,
            "closed" => Self::Closed,
            "died" => Self::Died,
            other => Self::Other(other.to_owned()),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

/// A signature the worker must obtain before feeding
/// [`ChannelFsm::sign_completed`].
pub(crate) struct SignRequest {
    pub tag: SignTag,
    pub tx: TxBlob,
    pub meta: SignMeta,
    /// Route to the pending action's untagged signer instead of the
    /// channel's tagged signer.
    pub use_action_signer: bool,
}

/// What a transition asks the worker to do.
#[derive(Default)]
pub(crate) struct FsmOutput {
    /// Frames to send, in order.
    pub frames: Vec<OutboundFrame>,
    /// At most one sign request (signer invocations are serialized).
    pub sign: Option<SignRequest>,
}

impl FsmOutput {
    fn send(frame: OutboundFrame) -> Self {
        Self {
            frames: vec![frame],
            sign: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Channel state visible to the `Channel` handle's accessors.
#[derive(Clone, Debug)]
pub(crate) struct Snapshot {
    pub status: ChannelStatus,
    pub round: Option<u64>,
    pub channel_id: Option<ChannelId>,
    pub fsm_id: Option<FsmId>,
    pub last_signed_tx: Option<TxBlob>,
}

impl Snapshot {
    fn initial() -> Self {
        Self {
            status: ChannelStatus::Connecting,
            round: None,
            channel_id: None,
            fsm_id: None,
            last_signed_tx: None,
        }
    }
}

/// Snapshot holder shared between the worker and the handle.
pub(crate) struct SharedState(RwLock<Snapshot>);

impl SharedState {
    pub fn new() -> Self {
        Self(RwLock::new(Snapshot::initial()))
    }

    pub fn read(&self) -> Snapshot {
        self.0.read().clone()
    }

    fn store(&self, snapshot: Snapshot) {
        *self.0.write() = snapshot;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// The FSM
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct ChannelFsm {
    role: Role,
    reestablish: bool,
    state: FsmState,
    round: Option<u64>,
    channel_id: Option<ChannelId>,
    fsm_id: Option<FsmId>,
    last_signed_tx: Option<TxBlob>,

    /// The single in-flight caller action.
    pending: Option<PendingAction>,
    /// FIFO queue of actions waiting for the pending one.
    queue: VecDeque<PendingAction>,
    /// Outstanding `leave` completion.
    pending_leave: Option<oneshot::Sender<Result<LeaveResult, ChannelError>>>,
    /// Sign request currently out with the broker.
    pending_sign: Option<SignTag>,
    /// Callback bundle kept alive after its action completed, until the
    /// on-chain sequence finishes.
    watch: Option<OnChainCallbacks>,
    /// Set when this side just co-signed an acknowledgement; the next
    /// `channels.update` then advances the round.
    acked_round: bool,

    events: broadcast::Sender<ChannelEvent>,
    shared: Arc<SharedState>,
}

impl ChannelFsm {
    pub fn new(
        role: Role,
        reestablish: bool,
        events: broadcast::Sender<ChannelEvent>,
        shared: Arc<SharedState>,
    ) -> Self {
        let fsm = Self {
            role,
            reestablish,
            state: FsmState::Connecting,
            round: None,
            channel_id: None,
            fsm_id: None,
            last_signed_tx: None,
            pending: None,
            queue: VecDeque::new(),
            pending_leave: None,
            pending_sign: None,
            watch: None,
            acked_round: false,
            events,
            shared,
        };
        fsm.sync_shared();
        fsm
    }

    // ── Accessors (worker + tests) ──────────────────────────────────

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn status(&self) -> ChannelStatus {
        self.state.status()
    }

    pub fn round(&self) -> Option<u64> {
        self.round
    }

    pub fn pending_action_signer(&self) -> Option<Arc<dyn TransactionSigner>> {
        self.pending.as_ref().map(|a| a.signer.clone())
    }

    // ── Entry points ────────────────────────────────────────────────

    /// Transport is up.
    pub fn on_connected(&mut self) {
        let next = if self.reestablish {
            FsmState::AwaitingReestablish
        } else {
            FsmState::Initialized
        };
        self.set_state(next);
        self.sync_shared();
    }

    /// A server-originated notification arrived.
    pub fn handle_notification(&mut self, method: &str, params: Value) -> FsmOutput {
        let output = match method {
            methods::INFO => self.handle_info(&params),
            methods::UPDATE => self.handle_update(&params),
            methods::ON_CHAIN_TX => self.handle_on_chain_tx(&params),
            methods::MESSAGE => self.handle_message(&params),
            methods::ERROR => self.handle_error_notification(&params),
            methods::LEAVE => self.handle_leave_reply(&params),
            other => match SignTag::from_sign_method(other) {
                Some(tag) => self.handle_sign_request(tag, &params),
                None => {
                    self.unknown_message(other, &params);
                    FsmOutput::default()
                }
            },
        };
        self.sync_shared();
        output
    }

    /// An error frame without an id arrived.
    pub fn handle_error_frame(&mut self, error: &RpcErrorBody, raw: Value) -> FsmOutput {
        warn!(code = error.code, message = %error.message, "node error frame");
        if self.state == FsmState::AwaitingReestablish {
            self.unknown_message(methods::ERROR, &raw);
            self.sync_shared();
            return FsmOutput::default();
        }
        self.emit(ChannelEvent::Error(ErrorEvent {
            code: "NODE_ERROR".into(),
            message: format!("{} ({})", error.message, error.code),
            raw: Some(raw),
        }));
        if let Some(action) = self.pending.take() {
            self.back_to_open();
            action.complete(Ok(ActionOutcome {
                accepted: false,
                signed_tx: None,
                address: None,
                error_code: Some(error.code),
                error_message: Some(error.message.clone()),
            }));
        }
        let output = self.start_next();
        self.sync_shared();
        output
    }

    /// The broker resolved the outstanding sign request.
    pub fn sign_completed(&mut self, outcome: SignOutcome) -> FsmOutput {
        let Some(tag) = self.pending_sign.take() else {
            warn!("sign completion without outstanding request");
            return FsmOutput::default();
        };
        let output = match outcome {
            SignOutcome::Signed(signed_tx) => {
                if matches!(tag, SignTag::InitiatorSign | SignTag::ResponderSign) {
                    self.set_state(FsmState::Signed);
                }
                if matches!(
                    tag,
                    SignTag::UpdateAck | SignTag::DepositAck | SignTag::WithdrawAck
                ) {
                    self.acked_round = true;
                }
                FsmOutput::send(OutboundFrame::notification(
                    tag.reply_method(),
                    json!({ "signed_tx": signed_tx }),
                ))
            }
            SignOutcome::Abort(code) => self.sign_refused(tag, Some(code)),
            SignOutcome::Rejected => self.sign_refused(tag, None),
        };
        self.sync_shared();
        output
    }

    /// Caller submitted an action.
    pub fn submit_action(&mut self, action: PendingAction) -> FsmOutput {
        if self.state.is_terminal() || self.state == FsmState::Disconnected {
            action.complete(Err(ChannelError::NotActive {
                status: self.state.status().to_string(),
            }));
            return FsmOutput::default();
        }
        if self.pending.is_some() || self.state != FsmState::Open {
            debug!(kind = %action.kind, "queueing action behind pending work");
            self.queue.push_back(action);
            return FsmOutput::default();
        }
        let output = self.start_action(action);
        self.sync_shared();
        output
    }

    /// Caller requested `leave`.
    pub fn submit_leave(
        &mut self,
        reply: oneshot::Sender<Result<LeaveResult, ChannelError>>,
    ) -> FsmOutput {
        if self.state != FsmState::Open || self.pending_leave.is_some() {
            let _ = reply.send(Err(ChannelError::NotActive {
                status: self.state.status().to_string(),
            }));
            return FsmOutput::default();
        }
        self.pending_leave = Some(reply);
        self.set_state(FsmState::AwaitingLeaveAck);
        self.sync_shared();
        FsmOutput::send(OutboundFrame::notification(methods::LEAVE, json!({})))
    }

    /// The transport dropped.
    pub fn connection_lost(&mut self, reason: Option<&str>) {
        if self.state.is_terminal() {
            return;
        }
        let message = reason.unwrap_or("connection lost").to_owned();
        self.emit(ChannelEvent::Error(ErrorEvent {
            code: "CONNECTION_ERROR".into(),
            message: message.clone(),
            raw: None,
        }));
        self.fail_all(&message);
        self.set_state(FsmState::Disconnected);
        self.sync_shared();
    }

    /// The caller disconnected deliberately.
    pub fn disconnected_by_caller(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.fail_all("disconnect requested");
        self.set_state(FsmState::Disconnected);
        self.sync_shared();
    }

    // ── Notification handlers ───────────────────────────────────────

    fn handle_info(&mut self, params: &Value) -> FsmOutput {
        let Some(event) = InfoEvent::parse(params) else {
            self.emit(ChannelEvent::Error(ErrorEvent {
                code: "INCOMING_MESSAGE_ERROR".into(),
                message: "info notification without event".into(),
                raw: Some(params.clone()),
            }));
            return FsmOutput::default();
        };
        debug!(state = ?self.state, event = ?event, "info event");

        match event {
            InfoEvent::FsmUp { fsm_id } => {
                if let Some(id) = fsm_id {
                    self.fsm_id = Some(id);
                }
            }
            InfoEvent::ChannelOpen | InfoEvent::ChannelAccept => {
                self.set_state(FsmState::HalfSigned);
            }
            InfoEvent::FundingCreated | InfoEvent::FundingSigned => {
                self.set_state(FsmState::AwaitingOnChainTx);
            }
            InfoEvent::OwnFundingLocked | InfoEvent::FundingLocked => {
                // Confirmation progress; status already reflects it.
            }
            InfoEvent::Open => {
                if let Some(id) = params.get("channel_id").and_then(Value::as_str) {
                    self.channel_id = Some(ChannelId::from(id));
                }
                self.round = Some(1);
                self.set_state(FsmState::Open);
                return self.start_next();
            }
            InfoEvent::ChannelReestablished => {
                // Round unknown until a fresh open; state blob is opaque.
                self.set_state(FsmState::Open);
                return self.start_next();
            }
            InfoEvent::DepositCreated => self.set_state(FsmState::AwaitingDeposit),
            InfoEvent::WithdrawCreated => self.set_state(FsmState::AwaitingWithdraw),
            InfoEvent::OwnDepositLocked => {
                self.run_lock_callback(|c| c.own_deposit_locked.as_deref());
                self.emit(ChannelEvent::OwnDepositLocked);
            }
            InfoEvent::DepositLocked => {
                self.run_lock_callback(|c| c.deposit_locked.as_deref());
                self.emit(ChannelEvent::DepositLocked);
                self.watch = None;
                if self.state == FsmState::AwaitingDeposit {
                    self.back_to_open();
                    return self.start_next();
                }
            }
            InfoEvent::OwnWithdrawLocked => {
                self.run_lock_callback(|c| c.own_withdraw_locked.as_deref());
                self.emit(ChannelEvent::OwnWithdrawLocked);
            }
            InfoEvent::WithdrawLocked => {
                self.run_lock_callback(|c| c.withdraw_locked.as_deref());
                self.emit(ChannelEvent::WithdrawLocked);
                self.watch = None;
                if self.state == FsmState::AwaitingWithdraw {
                    self.back_to_open();
                    return self.start_next();
                }
            }
            InfoEvent::PeerDisconnected => {
                self.emit(ChannelEvent::Error(ErrorEvent {
                    code: "PEER_DISCONNECTED".into(),
                    message: "peer disconnected from the channel".into(),
                    raw: None,
                }));
            }
            InfoEvent::Shutdown | InfoEvent::Closing => self.set_state(FsmState::Closing),
            InfoEvent::Closed => {
                self.watch = None;
                self.fail_all("channel closed");
                self.set_state(FsmState::Closed);
            }
            InfoEvent::Died => {
                self.watch = None;
                self.fail_all("channel died");
                self.set_state(FsmState::Died);
            }
            InfoEvent::Other(name) => self.unknown_message(&format!("channels.info:{name}"), params),
        }
        FsmOutput::default()
    }

    fn handle_update(&mut self, params: &Value) -> FsmOutput {
        let Some(state) = params
            .pointer("/data/state")
            .and_then(Value::as_str)
            .map(TxBlob::from)
        else {
            self.emit(ChannelEvent::Error(ErrorEvent {
                code: "INCOMING_MESSAGE_ERROR".into(),
                message: "update notification without state".into(),
                raw: Some(params.clone()),
            }));
            return FsmOutput::default();
        };

        self.last_signed_tx = Some(state.clone());

        // Shutdown and force-progress resolve through `on_chain_tx`.
        let completes_pending = self.pending.as_ref().is_some_and(|a| {
            !matches!(a.kind, ActionKind::Shutdown | ActionKind::ForceProgress)
        });

        if completes_pending || self.acked_round {
            self.round = self.round.map(|r| r + 1);
            self.acked_round = false;
        }

        self.emit(ChannelEvent::StateChanged {
            signed_tx: state.clone(),
        });

        if completes_pending {
            let mut action = self.pending.take().expect("pending action");
            let mut outcome = ActionOutcome::accepted(state);
            if action.kind == ActionKind::NewContract {
                if let (Some(owner), Some(round)) = (action.owner.as_ref(), self.round) {
                    outcome = outcome.with_address(ContractId::compute(owner, round));
                }
            }
            // Deposits and withdrawals keep their callbacks alive for
            // the confirmation sequence that follows completion.
            if matches!(action.kind, ActionKind::Deposit | ActionKind::Withdraw) {
                self.watch = Some(action.take_callbacks());
            }

            // Deposit/withdraw hold their awaiting state until both
            // sides are locked; everything else returns to open. The
            // status event goes out before the completion resolves.
            let reopened = self.state == FsmState::AwaitingUpdate;
            if reopened {
                self.back_to_open();
            }
            action.complete(Ok(outcome));
            if reopened {
                return self.start_next();
            }
        } else if self.state == FsmState::AwaitingUpdate && self.pending.is_none() {
            // Acknowledged round finished on the responder side.
            self.back_to_open();
            return self.start_next();
        }
        FsmOutput::default()
    }

    fn handle_on_chain_tx(&mut self, params: &Value) -> FsmOutput {
        let Some(tx) = params
            .pointer("/data/tx")
            .and_then(Value::as_str)
            .map(TxBlob::from)
        else {
            self.emit(ChannelEvent::Error(ErrorEvent {
                code: "INCOMING_MESSAGE_ERROR".into(),
                message: "on_chain_tx notification without tx".into(),
                raw: Some(params.clone()),
            }));
            return FsmOutput::default();
        };
        let info = params
            .pointer("/data/info")
            .and_then(Value::as_str)
            .map(str::to_owned);

        if let Some(cb) = self
            .pending
            .as_ref()
            .and_then(|a| a.callbacks.on_chain_tx.as_deref())
            .or_else(|| self.watch.as_ref().and_then(|w| w.on_chain_tx.as_deref()))
        {
            cb(&tx);
        }
        self.emit(ChannelEvent::OnChainTx {
            tx: tx.clone(),
            info,
        });

        if self.state == FsmState::AwaitingOnChainTx {
            self.set_state(FsmState::AwaitingOnChainConfirmation);
        }

        // A mutual close resolves with the co-signed close transaction;
        // force-progress resolves with the serialized transaction the
        // caller must post (the round stays untouched until the node
        // notifies a state change).
        match self.pending.as_ref().map(|a| a.kind) {
            Some(ActionKind::Shutdown) => {
                let action = self.pending.take().expect("pending action");
                action.complete(Ok(ActionOutcome::accepted(tx)));
                self.set_state(FsmState::Closing);
            }
            Some(ActionKind::ForceProgress) => {
                let mut action = self.pending.take().expect("pending action");
                self.watch = Some(action.take_callbacks());
                self.back_to_open();
                action.complete(Ok(ActionOutcome::accepted(tx)));
                return self.start_next();
            }
            _ => {}
        }
        FsmOutput::default()
    }

    fn handle_sign_request(&mut self, tag: SignTag, params: &Value) -> FsmOutput {
        let Some(tx) = params
            .pointer("/data/tx")
            .and_then(Value::as_str)
            .map(TxBlob::from)
        else {
            self.emit(ChannelEvent::Error(ErrorEvent {
                code: "INCOMING_MESSAGE_ERROR".into(),
                message: format!("sign request `{tag}` without tx"),
                raw: Some(params.clone()),
            }));
            return FsmOutput::default();
        };

        let updates = match params.pointer("/data/updates") {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => match serde_json::from_value::<Vec<UpdateOp>>(raw.clone()) {
                Ok(updates) => updates,
                Err(e) => {
                    self.emit(ChannelEvent::Error(ErrorEvent {
                        code: "INCOMING_MESSAGE_ERROR".into(),
                        message: format!("sign request `{tag}` carries malformed updates: {e}"),
                        raw: Some(params.clone()),
                    }));
                    return FsmOutput::default();
                }
            },
        };

        if tag.uses_action_signer() && self.pending.is_none() {
            self.unknown_message(&tag.request_method(), params);
            return FsmOutput::default();
        }

        // Acknowledgement requests move the responder into the round's
        // awaiting state.
        match tag {
            SignTag::UpdateAck if self.state == FsmState::Open => {
                self.set_state(FsmState::AwaitingUpdate);
            }
            SignTag::DepositAck if self.state == FsmState::Open => {
                self.set_state(FsmState::AwaitingDeposit);
            }
            SignTag::WithdrawAck if self.state == FsmState::Open => {
                self.set_state(FsmState::AwaitingWithdraw);
            }
            SignTag::ShutdownSignAck => self.set_state(FsmState::AwaitingShutdownAck),
            _ => {}
        }

        self.pending_sign = Some(tag);
        FsmOutput {
            frames: Vec::new(),
            sign: Some(SignRequest {
                tag,
                tx,
                meta: SignMeta { updates },
                use_action_signer: tag.uses_action_signer(),
            }),
        }
    }

    fn handle_message(&mut self, params: &Value) -> FsmOutput {
        match params
            .pointer("/data/message")
            .cloned()
            .map(serde_json::from_value::<ChannelMessage>)
        {
            Some(Ok(message)) => self.emit(ChannelEvent::Message(message)),
            _ => {
                self.emit(ChannelEvent::Error(ErrorEvent {
                    code: "INCOMING_MESSAGE_ERROR".into(),
                    message: "malformed channels.message payload".into(),
                    raw: Some(params.clone()),
                }));
            }
        }
        FsmOutput::default()
    }

    fn handle_error_notification(&mut self, params: &Value) -> FsmOutput {
        if self.state == FsmState::AwaitingReestablish {
            // The node knows no FSM session for the supplied ids.
            self.unknown_message(methods::ERROR, params);
            return FsmOutput::default();
        }
        let code = params.pointer("/data/code").and_then(Value::as_i64);
        let message = params
            .pointer("/data/message")
            .and_then(Value::as_str)
            .unwrap_or("channel error")
            .to_owned();

        let bus_code = if message.contains("insufficient_balance") {
            "INSUFFICIENT_BALANCE"
        } else {
            "CHANNEL_ERROR"
        };
        self.emit(ChannelEvent::Error(ErrorEvent {
            code: bus_code.into(),
            message: message.clone(),
            raw: Some(params.clone()),
        }));

        if let Some(action) = self.pending.take() {
            // A user-defined abort code from the counterparty is tagged
            // as such; everything else is a plain rejection.
            let outcome = match code {
                Some(code) => ActionOutcome::aborted(code),
                None => ActionOutcome::rejected(),
            };
            self.back_to_open();
            action.complete(Ok(outcome));
            return self.start_next();
        }
        if matches!(
            self.state,
            FsmState::AwaitingUpdate | FsmState::AwaitingDeposit | FsmState::AwaitingWithdraw
        ) {
            // An acknowledged round fell through on the far side.
            self.acked_round = false;
            self.back_to_open();
            return self.start_next();
        }
        FsmOutput::default()
    }

    fn handle_leave_reply(&mut self, params: &Value) -> FsmOutput {
        let channel_id = params
            .get("channel_id")
            .and_then(Value::as_str)
            .map(ChannelId::from)
            .or_else(|| self.channel_id.clone());
        let state = params
            .pointer("/data/state")
            .and_then(Value::as_str)
            .map(TxBlob::from);

        if let Some(tx) = &state {
            self.last_signed_tx = Some(tx.clone());
        }
        match (self.pending_leave.take(), channel_id) {
            (Some(reply), Some(channel_id)) => {
                let _ = reply.send(Ok(LeaveResult {
                    channel_id,
                    signed_tx: state,
                }));
                // Anything still queued can no longer run in this session.
                self.fail_all("channel session released by leave");
                self.set_state(FsmState::Disconnected);
            }
            (Some(reply), None) => {
                let _ = reply.send(Err(ChannelError::incoming(
                    params.clone(),
                    "leave reply without channel id",
                )));
            }
            (None, _) => self.unknown_message(methods::LEAVE, params),
        }
        FsmOutput::default()
    }

    // ── Sign plumbing ───────────────────────────────────────────────

    fn sign_refused(&mut self, tag: SignTag, code: Option<i64>) -> FsmOutput {
        debug!(%tag, ?code, "signer refused");
        let params = match code {
            Some(code) => json!({ "error": code }),
            None => json!({ "reason": "rejected" }),
        };
        let output = FsmOutput::send(OutboundFrame::notification(methods::ERROR, params));

        if tag.uses_action_signer() {
            // A local refusal terminates the action without touching
            // round or state.
            let action = self.pending.take();
            self.back_to_open();
            if let Some(action) = action {
                let outcome = match code {
                    Some(code) => ActionOutcome::aborted(code),
                    None => ActionOutcome::rejected(),
                };
                action.complete(Ok(outcome));
            }
        } else if matches!(
            tag,
            SignTag::UpdateAck
                | SignTag::DepositAck
                | SignTag::WithdrawAck
                | SignTag::ShutdownSignAck
        ) {
            self.back_to_open();
        }
        output
    }

    // ── Action plumbing ─────────────────────────────────────────────

    fn start_action(&mut self, action: PendingAction) -> FsmOutput {
        debug!(kind = %action.kind, method = action.method, "starting action");
        let frame = OutboundFrame::notification(action.method, action.params.clone());
        self.set_state(action_state(action.kind));
        self.pending = Some(action);
        FsmOutput::send(frame)
    }

    fn start_next(&mut self) -> FsmOutput {
        if self.state != FsmState::Open || self.pending.is_some() {
            return FsmOutput::default();
        }
        match self.queue.pop_front() {
            Some(action) => self.start_action(action),
            None => FsmOutput::default(),
        }
    }

    fn back_to_open(&mut self) {
        if matches!(
            self.state,
            FsmState::AwaitingUpdate
                | FsmState::AwaitingDeposit
                | FsmState::AwaitingWithdraw
                | FsmState::AwaitingShutdownAck
        ) {
            self.set_state(FsmState::Open);
        }
    }

    fn fail_all(&mut self, reason: &str) {
        if let Some(action) = self.pending.take() {
            action.complete(Err(ChannelError::Connection(reason.to_owned())));
        }
        for action in self.queue.drain(..) {
            action.complete(Err(ChannelError::Connection(reason.to_owned())));
        }
        if let Some(reply) = self.pending_leave.take() {
            let _ = reply.send(Err(ChannelError::Connection(reason.to_owned())));
        }
        self.pending_sign = None;
    }

    // ── Events and shared state ─────────────────────────────────────

    fn set_state(&mut self, next: FsmState) {
        if self.state == next {
            return;
        }
        let before = self.state.status();
        let after = next.status();
        debug!(from = ?self.state, to = ?next, "fsm transition");
        self.state = next;
        if before != after {
            self.sync_shared();
            self.emit(ChannelEvent::StatusChanged(after));
        }
    }

    fn emit(&self, event: ChannelEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn run_lock_callback<'a>(
        &'a self,
        pick: impl Fn(&'a OnChainCallbacks) -> Option<&'a (dyn Fn() + Send + Sync)>,
    ) {
        let bundle = self
            .pending
            .as_ref()
            .map(|a| &a.callbacks)
            .or(self.watch.as_ref());
        if let Some(cb) = bundle.and_then(pick) {
            cb();
        }
    }

    fn unknown_message(&self, context: &str, raw: &Value) {
        warn!(context, "message outside any legal transition");
        self.emit(ChannelEvent::Error(ErrorEvent {
            code: "UNKNOWN_CHANNEL_STATE".into(),
            message: UNKNOWN_STATE_MESSAGE.into(),
            raw: Some(raw.clone()),
        }));
    }

    fn sync_shared(&self) {
        self.shared.store(Snapshot {
            status: self.state.status(),
            round: self.round,
            channel_id: self.channel_id.clone(),
            fsm_id: self.fsm_id.clone(),
            last_signed_tx: self.last_signed_tx.clone(),
        });
    }
}

impl std::fmt::Debug for ChannelFsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFsm")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("round", &self.round)
            .field("pending", &self.pending.is_some())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
