//! Channel-open parameters and their query-string encoding.
//!
//! The node reads the opening (or reestablish) parameter set from the
//! WebSocket URL query string: snake_case keys, decimal-string amounts,
//! `protocol=json-rpc` always present.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use aesc_core::{Amount, ChannelError, ChannelId, FsmId, TxBlob};
use aesc_core::address::AccountId;

/// Which side of the channel this client plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Opens the channel and funds `initiator_amount`.
    Initiator,
    /// Accepts the channel and funds `responder_amount`.
    Responder,
}

impl Role {
    /// The wire spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full opening parameter set the node's channel WS API accepts.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelOpenParams {
    /// Initiator's host, announced to the responder.
    pub host: String,
    /// Initiator's port, announced to the responder.
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
    /// Node-side idle timeout in milliseconds, if overridden.
    pub timeout_idle: Option<u64>,
    /// Password for the node's state cache, if any.
    pub state_password: Option<String>,
    /// Reestablish: the existing channel.
    pub existing_channel_id: Option<ChannelId>,
    /// Reestablish: the existing FSM session.
    pub existing_fsm_id: Option<FsmId>,
    /// Reestablish: last known co-signed off-chain state.
    pub offchain_tx: Option<TxBlob>,
}

impl ChannelOpenParams {
    /// Whether this parameter set selects the reestablish path.
    #[must_use]
    pub fn is_reestablish(&self) -> bool {
        self.existing_fsm_id.is_some()
    }

    /// Build the node WebSocket URL for these parameters.
    ///
    /// `base` is the node's channel endpoint (e.g.
    /// `ws://localhost:3014/channel`); its path is preserved.
    pub fn connect_url(&self, base: &str) -> Result<Url, ChannelError> {
        let mut url = Url::parse(base)
            .map_err(|e| ChannelError::IllegalArgument(format!("invalid node url `{base}`: {e}")))?;

        {
            let mut q = url.query_pairs_mut();
            let _ = q
                .append_pair("protocol", "json-rpc")
                .append_pair("role", self.role.as_str())
                .append_pair("host", &self.host)
                .append_pair("port", &self.port.to_string())
                .append_pair("initiator_id", self.initiator_id.as_str())
                .append_pair("responder_id", self.responder_id.as_str())
                .append_pair("initiator_amount", &self.initiator_amount.to_decimal())
                .append_pair("responder_amount", &self.responder_amount.to_decimal())
                .append_pair("push_amount", &self.push_amount.to_decimal())
                .append_pair("channel_reserve", &self.channel_reserve.to_decimal())
                .append_pair("lock_period", &self.lock_period.to_string());

            if let Some(timeout) = self.timeout_idle {
                let _ = q.append_pair("timeout_idle", &timeout.to_string());
            }
            if let Some(password) = &self.state_password {
                let _ = q.append_pair("state_password", password);
            }
            if let Some(channel_id) = &self.existing_channel_id {
                let _ = q.append_pair("existing_channel_id", channel_id.as_str());
            }
            if let Some(fsm_id) = &self.existing_fsm_id {
                let _ = q.append_pair("existing_fsm_id", fsm_id.as_str());
            }
            if let Some(tx) = &self.offchain_tx {
                let _ = q.append_pair("offchain_tx", tx.as_str());
            }
        }

        Ok(url)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ChannelOpenParams {
        ChannelOpenParams {
            host: "localhost".into(),
            port: 3001,
            role: Role::Initiator,
            initiator_id: AccountId::new("ak_initiator00000000000000000000000000000000000000000")
                .unwrap(),
            responder_id: AccountId::new("ak_responder00000000000000000000000000000000000000000")
                .unwrap(),
            initiator_amount: Amount::ae(100),
            responder_amount: Amount::ae(100),
            push_amount: Amount::zero(),
            channel_reserve: Amount::from(2u64),
            lock_period: 1,
            timeout_idle: None,
            state_password: None,
            existing_channel_id: None,
            existing_fsm_id: None,
            offchain_tx: None,
        }
    }

    #[test]
    fn query_includes_required_pairs() {
        let url = params().connect_url("ws://localhost:3014/channel").unwrap();
        let q = url.query().unwrap();
        assert!(q.contains("protocol=json-rpc"));
        assert!(q.contains("role=initiator"));
        assert!(q.contains("initiator_amount=100000000000000000000"));
        assert!(q.contains("lock_period=1"));
        assert!(q.contains("port=3001"));
    }

    #[test]
    fn query_omits_absent_optionals() {
        let url = params().connect_url("ws://localhost:3014/channel").unwrap();
        let q = url.query().unwrap();
        assert!(!q.contains("existing_channel_id"));
        assert!(!q.contains("existing_fsm_id"));
        assert!(!q.contains("state_password"));
        assert!(!q.contains("timeout_idle"));
    }

    #[test]
    fn reestablish_fields_appended() {
        let mut p = params();
        p.existing_channel_id = Some(ChannelId::from("ch_existing"));
        p.existing_fsm_id = Some(FsmId::from("ba_existing"));
        p.offchain_tx = Some(TxBlob::from("tx_last"));
        assert!(p.is_reestablish());

        let url = p.connect_url("ws://localhost:3014/channel").unwrap();
        let q = url.query().unwrap();
        assert!(q.contains("existing_channel_id=ch_existing"));
        assert!(q.contains("existing_fsm_id=ba_existing"));
        assert!(q.contains("offchain_tx=tx_last"));
    }

    #[test]
    fn path_is_preserved() {
        let url = params().connect_url("ws://node.example:3014/channel").unwrap();
        assert_eq!(url.path(), "/channel");
        assert_eq!(url.scheme(), "ws");
    }

    #[test]
    fn invalid_base_url_is_illegal_argument() {
        let err = params().connect_url("not a url").unwrap_err();
        assert!(matches!(err, ChannelError::IllegalArgument(_)));
    }

    #[test]
    fn role_wire_spelling() {
        assert_eq!(Role::Initiator.as_str(), "initiator");
        assert_eq!(Role::Responder.to_string(), "responder");
        assert_eq!(serde_json::to_string(&Role::Responder).unwrap(), "\"responder\"");
    }

    #[test]
    fn is_reestablish_requires_fsm_id() {
        let mut p = params();
        p.existing_channel_id = Some(ChannelId::from("ch_x"));
        assert!(!p.is_reestablish());
        p.existing_fsm_id = Some(FsmId::from("ba_x"));
        assert!(p.is_reestablish());
    }
}
