//! Channel initialization options.
//!
//! All state lives in the channel instance; options are validated
//! synchronously before any I/O happens.

use std::time::Duration;

use aesc_core::address::AccountId;
use aesc_core::{Amount, ChannelError, ChannelId, FsmId, TxBlob};
use aesc_rpc::params::{ChannelOpenParams, Role};

/// Default round-trip ttl when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Parameters for [`Channel::initialize`].
///
/// [`Channel::initialize`]: crate::Channel::initialize
#[derive(Clone, Debug)]
pub struct ChannelOptions {
    /// Node channel WebSocket endpoint (e.g. `ws://localhost:3014/channel`).
    pub url: String,
    /// Initiator host announced to the responder.
    pub host: String,
    /// Initiator port announced to the responder.
    pub port: u16,
    /// This client's role.
    pub role: Role,
    /// Initiator account.
    pub initiator_id: AccountId,
    /// Responder account.
    pub responder_id: AccountId,
    /// Initiator's opening balance.
    pub initiator_amount: Amount,
    /// Responder's opening balance.
    pub responder_amount: Amount,
    /// Amount moved to the responder as part of opening.
    pub push_amount: Amount,
    /// Minimum balance either side must keep.
    pub channel_reserve: Amount,
    /// Blocks a solo-closing party must wait before settling.
    pub lock_period: u64,
    /// Round-trip ttl for correlated requests.
    pub ttl: Duration,
    /// Node-side idle timeout in milliseconds.
    pub timeout_idle: Option<u64>,
    /// Password for the node's state cache.
    pub state_password: Option<String>,
    /// Log every wire frame at info level instead of debug.
    pub debug: bool,
    /// Reestablish: the existing channel.
    pub existing_channel_id: Option<ChannelId>,
    /// Reestablish: the existing FSM session.
    pub existing_fsm_id: Option<FsmId>,
    /// Reestablish: last known co-signed off-chain state.
    pub offchain_tx: Option<TxBlob>,
}

impl ChannelOptions {
    /// Create options with the mandatory parameters and defaults for the
    /// rest (`push_amount` 0, `channel_reserve` 0, `lock_period` 10,
    /// 30 s ttl).
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        role: Role,
        initiator_id: AccountId,
        responder_id: AccountId,
    ) -> Self {
        Self {
            url: url.into(),
            host: "localhost".into(),
            port: 3001,
            role,
            initiator_id,
            responder_id,
            initiator_amount: Amount::zero(),
            responder_amount: Amount::zero(),
            push_amount: Amount::zero(),
            channel_reserve: Amount::zero(),
            lock_period: 10,
            ttl: DEFAULT_TTL,
            timeout_idle: None,
            state_password: None,
            debug: false,
            existing_channel_id: None,
            existing_fsm_id: None,
            offchain_tx: None,
        }
    }

    /// Set the announced host and port.
    #[must_use]
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set both opening balances.
    #[must_use]
    pub fn with_amounts(mut self, initiator: Amount, responder: Amount) -> Self {
        self.initiator_amount = initiator;
        self.responder_amount = responder;
        self
    }

    /// Set the push amount.
    #[must_use]
    pub fn with_push_amount(mut self, amount: Amount) -> Self {
        self.push_amount = amount;
        self
    }

    /// Set the channel reserve.
    #[must_use]
    pub fn with_channel_reserve(mut self, reserve: Amount) -> Self {
        self.channel_reserve = reserve;
        self
    }

    /// Set the lock period.
    #[must_use]
    pub fn with_lock_period(mut self, blocks: u64) -> Self {
        self.lock_period = blocks;
        self
    }

    /// Set the round-trip ttl.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the node state-cache password.
    #[must_use]
    pub fn with_state_password(mut self, password: impl Into<String>) -> Self {
        self.state_password = Some(password.into());
        self
    }

    /// Log every wire frame at info level.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Select the reestablish path for an existing channel session.
    #[must_use]
    pub fn with_reestablish(
        mut self,
        channel_id: ChannelId,
        fsm_id: FsmId,
        offchain_tx: Option<TxBlob>,
    ) -> Self {
        self.existing_channel_id = Some(channel_id);
        self.existing_fsm_id = Some(fsm_id);
        self.offchain_tx = offchain_tx;
        self
    }

    /// Whether these options select the reestablish path.
    #[must_use]
    pub fn is_reestablish(&self) -> bool {
        self.existing_fsm_id.is_some()
    }

    /// Validate the option set.
    ///
    /// Fails with [`ChannelError::IllegalArgument`] before any I/O when
    /// the parameters cannot form a valid channel.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.url.is_empty() {
            return Err(ChannelError::IllegalArgument("empty node url".into()));
        }
        if self.initiator_id == self.responder_id {
            return Err(ChannelError::IllegalArgument(
                "initiator and responder must be distinct accounts".into(),
            ));
        }
        if self.ttl.is_zero() {
            return Err(ChannelError::IllegalArgument("ttl must be positive".into()));
        }
        if self.is_reestablish() {
            // Amount checks do not apply when resuming an existing channel.
            if self.existing_channel_id.is_none() {
                return Err(ChannelError::IllegalArgument(
                    "existing_fsm_id requires existing_channel_id".into(),
                ));
            }
            return Ok(());
        }
        if self.initiator_amount < self.channel_reserve {
            return Err(ChannelError::IllegalArgument(
                "initiator_amount is below channel_reserve".into(),
            ));
        }
        if self.responder_amount < self.channel_reserve {
            return Err(ChannelError::IllegalArgument(
                "responder_amount is below channel_reserve".into(),
            ));
        }
        if self.initiator_amount < self.push_amount {
            return Err(ChannelError::IllegalArgument(
                "push_amount exceeds initiator_amount".into(),
            ));
        }
        Ok(())
    }

    /// Lower into the wire-level parameter set.
    #[must_use]
    pub fn to_open_params(&self) -> ChannelOpenParams {
        ChannelOpenParams {
            host: self.host.clone(),
            port: self.port,
            role: self.role,
            initiator_id: self.initiator_id.clone(),
            responder_id: self.responder_id.clone(),
            initiator_amount: self.initiator_amount.clone(),
            responder_amount: self.responder_amount.clone(),
            push_amount: self.push_amount.clone(),
            channel_reserve: self.channel_reserve.clone(),
            lock_period: self.lock_period,
            timeout_idle: self.timeout_idle,
            state_password: self.state_password.clone(),
            existing_channel_id: self.existing_channel_id.clone(),
            existing_fsm_id: self.existing_fsm_id.clone(),
            offchain_tx: self.offchain_tx.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
