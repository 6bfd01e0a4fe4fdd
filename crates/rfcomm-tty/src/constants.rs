//! Centralized constants for the RFCOMM TTY layer
//!
//! Values that mirror the wire protocol or the host serial layer are fixed
//! here with their basis. Values an operator may want to tune have defaults
//! here and can be overridden through [`crate::config::DriverConfig`].
//!
//! **Before changing any constant:**
//! 1. Read its full documentation comment
//! 2. Check whether the value is fixed by the protocol or only a default
//! 3. Update documentation with your findings

/// Device numbering and enumeration limits
pub mod devices {
    /// Number of device ids the driver hands out (ids `0..MAX_DEVICES`)
    ///
    /// **Value**: 256
    ///
    /// **Rationale**: Matches the minor-number range reserved for RFCOMM
    /// serial nodes on the host. Ids beyond it have no node to bind to.
    ///
    /// **Used in**: config.rs (default `max_devices`), registry.rs
    pub const MAX_DEVICES: u16 = 256;

    /// Largest `max` accepted by a device listing
    ///
    /// **Value**: 682
    ///
    /// **Rationale**: A listing reply is bounded to four 4 KiB pages of
    /// fixed-size 24-byte records: 16384 / 24 = 682. Larger requests are
    /// rejected rather than truncated, so callers learn about the limit.
    ///
    /// **Used in**: config.rs (default `list_limit`), driver.rs
    pub const LIST_LIMIT: usize = 682;

    /// Prefix of the device node name, followed by the decimal id
    pub const NAME_PREFIX: &str = "rfcomm";
}

/// Transmit buffer accounting
pub mod flow {
    /// Bytes reserved in front of each transmit payload for the frame header
    ///
    /// **Value**: 8 bytes
    ///
    /// **Rationale**: Address, control, a two-byte length and the credit
    /// byte, rounded up. Charged against the write budget so that
    /// `write_room` reflects what the link actually holds.
    pub const TX_HEADROOM: usize = 8;

    /// Bytes reserved after each transmit payload for the frame check sequence
    ///
    /// **Value**: 2 bytes
    pub const TX_TAILROOM: usize = 2;

    /// Total per-buffer overhead charged on top of the payload
    pub const TX_RESERVE: usize = TX_HEADROOM + TX_TAILROOM;

    /// Credits assumed when the remote has granted none
    ///
    /// **Value**: 1
    ///
    /// **Rationale**: A link without credit-based flow control still accepts
    /// one frame at a time. Treating zero credits as one keeps `write_room`
    /// from reporting a permanently stalled port.
    pub const MIN_CREDITS: u32 = 1;
}

/// Channel capacities
pub mod channels {
    /// Capacity of the driver event stream
    ///
    /// **Value**: 1024 events
    ///
    /// **Rationale**: Events are best effort. A slow observer loses events
    /// instead of stalling link callbacks, and a few hundred devices cycling
    /// through attach and detach fit without loss.
    ///
    /// **Used in**: config.rs (default `event_queue`)
    pub const EVENT_QUEUE: usize = 1024;
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_list_limit_fits_four_pages() {
        assert_eq!(devices::LIST_LIMIT, (4096 * 4) / 24);
    }

    #[test]
    fn test_tx_reserve() {
        assert_eq!(flow::TX_RESERVE, 10);
    }
}
