use crate::constants::{channels, devices};
use serde::{Deserialize, Serialize};
use tty_protocol::TtyError;

/// Driver tunables
///
/// Every field is optional when deserializing; missing fields take the
/// values from [`crate::constants`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Ids are handed out from `0..max_devices`
    pub max_devices: u16,
    /// Largest listing a caller may request
    pub list_limit: usize,
    pub event_queue: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_devices: devices::MAX_DEVICES,
            list_limit: devices::LIST_LIMIT,
            event_queue: channels::EVENT_QUEUE,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), TtyError> {
        if self.max_devices == 0 {
            return Err(TtyError::InvalidArgument(
                "max_devices must be at least 1".into(),
            ));
        }
        if self.list_limit == 0 {
            return Err(TtyError::InvalidArgument(
                "list_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
