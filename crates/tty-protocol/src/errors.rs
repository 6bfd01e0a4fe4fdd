//! Error Handling Guidelines
//!
//! All error messages should follow this format:
//!
//! 1. **What failed**: Describe the operation that failed
//! 2. **Why it failed**: Provide the root cause if known
//! 3. **What to do**: Suggest user action when possible
//!
//! Examples:
//! - ✅ "Device id 3 is already in use. Release it or request automatic id assignment."
//! - ❌ "EADDRINUSE" (lacks context and action)
//!
//! Every variant also maps to the classic errno value via [`TtyError::errno`]
//! so control-plane transports can keep their numeric contract.

use rfcomm_core::{LinkError, NodeError};
use thiserror::Error;

/// Unified error type for device management and port operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TtyError {
    /// Allocation of the device or its link failed
    #[error("Failed to create device: out of memory")]
    OutOfMemory,

    /// Requested device id is taken by a live device
    #[error("Device id {0} is already in use. Release it or request automatic id assignment.")]
    AddressInUse(u16),

    /// Requested id is outside `[0, max)`, or no id is left
    #[error("No device id available: {id} is outside the valid range 0..{max}")]
    OutOfRange { id: u32, max: u16 },

    /// Caller lacks the capability the operation requires
    #[error("Permission denied: {0} requires network administration rights")]
    PermissionDenied(String),

    /// No live (unreleased) device with this id
    #[error("Device {0} not found. It was never created or has already been released.")]
    NotFound(u16),

    /// Adopt mode needs a connected link
    #[error("Cannot adopt link: it is not connected. Connect the socket before creating the device.")]
    NotConnected,

    /// Link closed while an attach was waiting for it
    #[error("Connection closed (code {code})")]
    LinkClosed { code: i32 },

    /// Link refused to start connecting
    #[error("Failed to open connection: {0}")]
    LinkOpen(LinkError),

    /// Link refused a transmit buffer
    #[error("Failed to send data: {0}")]
    Send(LinkError),

    /// Attach wait was cancelled by the caller
    #[error("Interrupted while waiting for the connection")]
    Interrupted,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Device node could not be registered
    #[error("Failed to register device node: {0}")]
    Registration(NodeError),
}

impl TtyError {
    /// Negative errno equivalent
    pub fn errno(&self) -> i32 {
        match self {
            TtyError::OutOfMemory => -12,
            TtyError::AddressInUse(_) => -98,
            TtyError::OutOfRange { .. } => -23,
            TtyError::PermissionDenied(_) => -1,
            TtyError::NotFound(_) => -19,
            TtyError::NotConnected => -77,
            TtyError::LinkClosed { code } => -code.abs(),
            TtyError::LinkOpen(_) | TtyError::Send(_) => -5,
            TtyError::Interrupted => -4,
            TtyError::InvalidArgument(_) => -22,
            TtyError::Registration(NodeError::Exists(_)) => -17,
            TtyError::Registration(NodeError::Failed(_)) => -5,
        }
    }
}

impl From<NodeError> for TtyError {
    fn from(e: NodeError) -> Self {
        TtyError::Registration(e)
    }
}
