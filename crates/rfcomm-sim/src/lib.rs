//! # RFCOMM Simulation
//!
//! In-memory stand-ins for the collaborators the TTY layer talks to:
//!
//! - [`MemoryLink`]: a data-link channel whose remote side is driven by the
//!   caller (connect, hang up, deliver frames, grant credits, acknowledge
//!   transmitted buffers). Like a real connection layer it invokes listener
//!   callbacks while holding its own lock.
//! - [`MemoryLinkFactory`]: hands out fresh links and keeps them reachable
//!   for inspection.
//! - [`CaptureConsumer`]: a port consumer that records everything it is told.
//! - [`NodeTable`]: a device-node registry with parent tracking.
//!
//! Used by the demo binary and by the driver's integration tests.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod consumer;
pub mod link;
pub mod nodes;

pub use consumer::CaptureConsumer;
pub use link::{MemoryLink, MemoryLinkFactory, DEFAULT_CREDITS, DEFAULT_MTU};
pub use nodes::NodeTable;
