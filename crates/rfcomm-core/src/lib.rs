//! # RFCOMM Core
//!
//! Contracts between the TTY multiplexing layer and the collaborators it sits
//! between:
//!
//! - **Link**: one RFCOMM data-link channel (open/close/send, MTU, credits)
//! - **LinkListener**: the three callbacks a link delivers to its owner
//! - **PortConsumer**: the character-stream consumer bound to an open port
//! - **DeviceNodes**: device-node registration (`rfcomm<N>`)
//!
//! None of these types know about the device registry; they only describe
//! what the layer may ask of its neighbours.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod addr;
pub mod consumer;
pub mod link;
pub mod nodes;
pub mod rpn;
pub mod v24;

pub use addr::{AddrParseError, BdAddr};
pub use consumer::PortConsumer;
pub use link::{
    Link, LinkError, LinkFactory, LinkListener, LinkState, OwnerToken, TxBuffer, TxOwner,
};
pub use nodes::{DeviceNodes, NodeAttributes, NodeError, NodeParent};
pub use rpn::RemotePortNegotiation;
