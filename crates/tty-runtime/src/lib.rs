//! # TTY Runtime
//!
//! Runtime infrastructure shared by the RFCOMM TTY driver.
//!
//! This crate defines:
//! - **Actor trait**: base trait for background workers with lifecycle methods
//! - **Channel management**: reaper inbox and the driver event stream
//! - **Cancellation**: interruptible waits for blocking port operations
//! - **Logging macros**: `tty_debug!` and friends, backed by `tracing`
//!
//! ## Architecture
//!
//! Link callbacks run in the connection layer's context, often with its lock
//! held. Anything they trigger that needs the device registry lock is sent
//! as a message to an actor instead of being called directly:
//!
//! ```text
//! Link ──state_change──► DeviceBridge ──ReaperMessage──► HangupReaper
//!                                                          │
//!                                                          ▼
//!                                                      Registry
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tty_runtime::{spawn_actor, ChannelManager};
//!
//! let (mut manager, handles) = ChannelManager::new(1024);
//! spawn_actor(reaper, handles.reaper_rx, handles.events);
//! let events = manager.take_event_receiver();
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod actor;
pub mod cancellation;
pub mod channels;
pub mod logging;

pub use actor::{spawn_actor, Actor};
pub use cancellation::{race_with_cancellation, CancelToken};
pub use channels::{ActorHandles, ChannelManager, EventSink, ReaperMessage, ReaperSender};

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}
