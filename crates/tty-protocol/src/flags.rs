use serde::{Deserialize, Serialize};
use std::fmt;

/// Device flag bits.
///
/// The low bits are requested at creation time and never change afterwards;
/// `ATTACHED`, `RELEASED` and `HUNG_UP` are lifecycle bits owned by the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFlags(u32);

impl DeviceFlags {
    /// Adopt an already connected link instead of allocating one
    pub const REUSE_DLC: DeviceFlags = DeviceFlags(1 << 0);
    /// Tear the device down when the connection hangs up
    pub const RELEASE_ON_HANGUP: DeviceFlags = DeviceFlags(1 << 1);
    /// Release request only: close the link immediately
    pub const HANGUP_NOW: DeviceFlags = DeviceFlags(1 << 2);
    /// A consumer is bound to the port
    pub const ATTACHED: DeviceFlags = DeviceFlags(1 << 3);
    /// Release has begun; the device is no longer reachable by id
    pub const RELEASED: DeviceFlags = DeviceFlags(1 << 4);
    /// The link hung up under an attached consumer; cleared by the last detach
    pub const HUNG_UP: DeviceFlags = DeviceFlags(1 << 5);

    /// Flags an unprivileged caller may request
    pub const NOCAP: DeviceFlags = DeviceFlags(Self::REUSE_DLC.0 | Self::RELEASE_ON_HANGUP.0);

    /// Bits kept from a creation request
    pub const CREATE_MASK: DeviceFlags = Self::NOCAP;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: DeviceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: DeviceFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: DeviceFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: DeviceFlags) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn difference(self, other: DeviceFlags) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every set bit may be requested without privileges
    pub const fn is_unprivileged(self) -> bool {
        self.difference(Self::NOCAP).is_empty()
    }
}

impl std::ops::BitOr for DeviceFlags {
    type Output = DeviceFlags;

    fn bitor(self, rhs: DeviceFlags) -> DeviceFlags {
        self.union(rhs)
    }
}

impl fmt::Debug for DeviceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(DeviceFlags, &str); 6] = [
            (DeviceFlags::REUSE_DLC, "REUSE_DLC"),
            (DeviceFlags::RELEASE_ON_HANGUP, "RELEASE_ON_HANGUP"),
            (DeviceFlags::HANGUP_NOW, "HANGUP_NOW"),
            (DeviceFlags::ATTACHED, "ATTACHED"),
            (DeviceFlags::RELEASED, "RELEASED"),
            (DeviceFlags::HUNG_UP, "HUNG_UP"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "DeviceFlags({:#x}: {})", self.0, set.join(" | "))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_unprivileged_subset() {
        assert!(DeviceFlags::empty().is_unprivileged());
        assert!(DeviceFlags::RELEASE_ON_HANGUP.is_unprivileged());
        assert!(DeviceFlags::NOCAP.is_unprivileged());
        assert!(!(DeviceFlags::NOCAP | DeviceFlags::HANGUP_NOW).is_unprivileged());
        assert!(!DeviceFlags::from_bits(1 << 9).is_unprivileged());
    }

    #[test]
    fn test_create_mask_drops_lifecycle_bits() {
        let requested =
            DeviceFlags::RELEASE_ON_HANGUP | DeviceFlags::ATTACHED | DeviceFlags::HUNG_UP;
        assert_eq!(
            requested.intersection(DeviceFlags::CREATE_MASK),
            DeviceFlags::RELEASE_ON_HANGUP
        );
    }

    #[test]
    fn test_debug_lists_names() {
        let flags = DeviceFlags::REUSE_DLC | DeviceFlags::RELEASED;
        let text = format!("{:?}", flags);
        assert!(text.contains("REUSE_DLC"));
        assert!(text.contains("RELEASED"));
        assert!(!text.contains("ATTACHED"));
    }

    #[test]
    fn test_serializes_as_bits() {
        let json = serde_json::to_string(&DeviceFlags::NOCAP).unwrap();
        assert_eq!(json, "3");
    }
}
