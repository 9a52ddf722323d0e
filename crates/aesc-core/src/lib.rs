//! # aesc-core
//!
//! Core domain types for the æternity state channel client:
//!
//! - [`ids`]: branded identifier newtypes (`ChannelId`, `FsmId`)
//! - [`address`]: prefixed account/contract identifiers and the
//!   deterministic contract-address derivation
//! - [`amount`]: arbitrary-precision token amounts with decimal-string serde
//! - [`tx`]: opaque encoded transaction blobs
//! - [`update`]: the off-chain update operation sum type
//! - [`status`]: the public channel status enum
//! - [`events`]: payloads delivered on the channel event bus
//! - [`errors`]: the [`ChannelError`] taxonomy
//!
//! Nothing in this crate performs I/O; it is shared by the wire layer
//! (`aesc-rpc`) and the client runtime (`aesc-client`).
//!
//! [`ChannelError`]: errors::ChannelError

pub mod address;
pub mod amount;
pub mod errors;
pub mod events;
pub mod ids;
pub mod status;
pub mod tx;
pub mod update;

pub use address::{AccountId, ContractId};
pub use amount::Amount;
pub use errors::ChannelError;
pub use events::{ChannelEvent, ChannelMessage};
pub use ids::{ChannelId, FsmId};
pub use status::ChannelStatus;
pub use tx::TxBlob;
pub use update::UpdateOp;
