//! # aesc-client
//!
//! State channel client for the æternity blockchain: a driver for the
//! node's channel FSM service over a persistent JSON-RPC 2.0 WebSocket
//! session.
//!
//! ## Layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`options`] | Validated initialization parameters |
//! | [`transport`] | WebSocket connection and inbound frame stream |
//! | [`correlator`] | Request/response pairing for correlated queries |
//! | [`signer`] | Signing surfaces and the per-channel sign broker |
//! | `fsm` | The channel state machine (no I/O) |
//! | `worker` | Per-channel actor wiring the pieces together |
//! | [`channel`] | Public [`Channel`] handle and action surface |
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use aesc_client::{Channel, ChannelOptions, Role, SignMeta, SignOutcome, TaggedSigner};
//! use aesc_core::address::AccountId;
//! use aesc_core::{Amount, TxBlob};
//! use aesc_rpc::SignTag;
//!
//! struct Wallet;
//!
//! #[async_trait::async_trait]
//! impl TaggedSigner for Wallet {
//!     async fn sign(&self, _tag: SignTag, tx: &TxBlob, _meta: &SignMeta) -> SignOutcome {
//!         // Hand `tx` to the account/signer abstraction here.
//!         SignOutcome::Signed(tx.clone())
//!     }
//! }
//!
//! # async fn run() -> Result<(), aesc_core::ChannelError> {
//! let initiator = AccountId::new("ak_2MGLPW2CHTDXJhqFJezqSwYSNwbZokSKkG7wSbGtVmeyjGfHtm")?;
//! let responder = AccountId::new("ak_gvxNbZf5CuxYVfcUFoKAP4geZatWaC2Yy4jpx5vZoCKank4Gc")?;
//! let options = ChannelOptions::new(
//!     "ws://localhost:3014/channel",
//!     Role::Initiator,
//!     initiator.clone(),
//!     responder.clone(),
//! )
//! .with_amounts(Amount::ae(100), Amount::ae(100))
//! .with_lock_period(1);
//!
//! let channel = Channel::initialize(options, Arc::new(Wallet)).await?;
//! let outcome = channel
//!     .update(initiator, responder, Amount::ae(10), |tx: &TxBlob, _: &SignMeta| {
//!         SignOutcome::Signed(tx.clone())
//!     })
//!     .await?;
//! assert!(outcome.accepted);
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod channel;
pub mod correlator;
pub mod options;
pub mod signer;
pub mod transport;

mod fsm;
mod worker;

pub use actions::{ActionKind, ActionOutcome, LeaveResult, OnChainCallbacks};
pub use channel::{AccountBalance, CallContractParams, Channel, NewContractParams};
pub use options::ChannelOptions;
pub use signer::{SignBroker, SignMeta, SignOutcome, TaggedSigner, TransactionSigner};

pub use aesc_rpc::params::Role;

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup; subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}
