//! # aesc-rpc
//!
//! JSON-RPC 2.0 wire format for the æternity channel WebSocket API:
//!
//! - [`types`]: outbound framing and inbound frame classification
//! - [`methods`]: channel method names and the sign-tag mapping
//! - [`params`]: channel-open parameters and their query-string encoding
//!
//! The channel FSM service speaks framed JSON-RPC 2.0 text. Requests
//! carry ids only when a direct response is expected; FSM-driven flows
//! are notifications in both directions.

pub mod methods;
pub mod params;
pub mod types;

pub use methods::SignTag;
pub use params::ChannelOpenParams;
pub use types::{InboundFrame, OutboundFrame, RpcErrorBody};
