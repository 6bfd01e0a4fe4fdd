use crate::flags::DeviceFlags;
use crate::state::PortState;
use rfcomm_core::{BdAddr, LinkState};
use serde::{Deserialize, Serialize};

/// Administrative request to create a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRequest {
    /// Requested id, or `None` for the lowest free one
    pub dev_id: Option<u16>,
    pub flags: DeviceFlags,
    pub src: BdAddr,
    pub dst: BdAddr,
    pub channel: u8,
}

impl DeviceRequest {
    /// Auto-id request with no flags
    pub fn new(src: BdAddr, dst: BdAddr, channel: u8) -> Self {
        Self {
            dev_id: None,
            flags: DeviceFlags::empty(),
            src,
            dst,
            channel,
        }
    }

    pub fn with_id(mut self, id: u16) -> Self {
        self.dev_id = Some(id);
        self
    }

    pub fn with_flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Administrative request to release a device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReleaseRequest {
    pub dev_id: u16,
    /// Only `HANGUP_NOW` is meaningful here
    pub flags: DeviceFlags,
}

impl ReleaseRequest {
    pub fn new(dev_id: u16) -> Self {
        Self {
            dev_id,
            flags: DeviceFlags::empty(),
        }
    }

    pub fn hangup_now(dev_id: u16) -> Self {
        Self {
            dev_id,
            flags: DeviceFlags::HANGUP_NOW,
        }
    }
}

/// Capabilities of the caller issuing an administrative request
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Holder may create privileged devices and release any device
    pub net_admin: bool,
}

impl Credentials {
    pub fn admin() -> Self {
        Self { net_admin: true }
    }

    pub fn unprivileged() -> Self {
        Self { net_admin: false }
    }
}

/// Snapshot of one device as returned by list and info queries.
///
/// Taken without the device's own locks, so fields may be mutually stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    pub id: u16,
    pub flags: DeviceFlags,
    pub state: LinkState,
    pub channel: u8,
    pub src: BdAddr,
    pub dst: BdAddr,
    /// Error code recorded when the link last closed (0 = none)
    pub last_error: i32,
}

/// Lifecycle notifications emitted by the driver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DriverEvent {
    /// Device published in the registry
    DeviceCreated { id: u16, flags: DeviceFlags },

    /// Port moved through its attach/detach state machine
    StateChanged { id: u16, state: PortState },

    /// A consumer attached; `open_count` is the count after the attach
    PortAttached { id: u16, open_count: u32 },

    /// A consumer detached; `open_count` is the count after the detach
    PortDetached { id: u16, open_count: u32 },

    /// Attached consumer was told the connection hung up
    Hangup { id: u16 },

    /// Device removed from the registry
    DeviceReleased { id: u16 },

    /// Last reference dropped; the id may be reused
    DeviceDestroyed { id: u16 },

    /// Error that could not be returned to a caller
    Error { id: Option<u16>, message: String },
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_device_request_serialization() {
        let req = DeviceRequest::new(BdAddr::ANY, BdAddr([1, 2, 3, 4, 5, 6]), 5)
            .with_id(3)
            .with_flags(DeviceFlags::RELEASE_ON_HANGUP);
        let json = serde_json::to_string(&req).unwrap();
        let deserialized: DeviceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, deserialized);
    }

    #[test]
    fn test_release_request_hangup_now() {
        let req = ReleaseRequest::hangup_now(2);
        assert!(req.flags.contains(DeviceFlags::HANGUP_NOW));
        assert!(!ReleaseRequest::new(2).flags.contains(DeviceFlags::HANGUP_NOW));
    }

    #[test]
    fn test_driver_event_serialization() {
        let event = DriverEvent::PortAttached {
            id: 0,
            open_count: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: DriverEvent = serde_json::from_str(&json).unwrap();

        match deserialized {
            DriverEvent::PortAttached { id, open_count } => {
                assert_eq!(id, 0);
                assert_eq!(open_count, 1);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_device_info_serialization() {
        let info = DeviceInfo {
            id: 1,
            flags: DeviceFlags::REUSE_DLC,
            state: LinkState::Connected,
            channel: 3,
            src: BdAddr::ANY,
            dst: BdAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
            last_error: 0,
        };
        let json = serde_json::to_string(&info).unwrap();
        let deserialized: DeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, deserialized);
    }

    #[test]
    fn test_credentials_default_unprivileged() {
        assert_eq!(Credentials::default(), Credentials::unprivileged());
        assert!(Credentials::admin().net_admin);
    }
}
