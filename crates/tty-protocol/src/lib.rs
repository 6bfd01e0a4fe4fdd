//! # TTY Protocol
//!
//! Type definitions shared by the RFCOMM TTY layer and its control plane.
//!
//! This crate has no runtime dependencies: everything here is plain data and
//! pure logic, so it is fully testable without a link or an executor.
//!
//! ## Contents
//!
//! - **DeviceRequest / ReleaseRequest**: administrative requests
//! - **DeviceInfo**: per-device summary returned by list/info queries
//! - **DriverEvent**: lifecycle notifications emitted by the driver
//! - **PortState**: attach/detach state machine (pure logic, no side effects)
//! - **DeviceFlags**: creation flags plus internal lifecycle bits
//! - **LineSettings**: serial line parameters and their RPN translation
//! - **modem**: TIOCM bitmap ⇄ V.24 signal mapping
//!
//! ## Request Flow
//!
//! ```text
//! control plane → DeviceRequest → Driver → Registry
//!                                    ↓
//!                               DriverEvent → observers
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod errors;
pub mod flags;
pub mod line;
pub mod messages;
pub mod modem;
pub mod state;

pub use errors::TtyError;
pub use flags::DeviceFlags;
pub use line::{FlowControl, LineSettings, ParityMode};
pub use messages::{Credentials, DeviceInfo, DeviceRequest, DriverEvent, ReleaseRequest};
pub use state::PortState;
