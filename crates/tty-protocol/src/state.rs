/// # Port Attach State Machine
///
/// Tracks one device's consumer attachment. Only the first attach drives the
/// link; later attaches join whatever state the port is already in.
///
/// ## State Transition Diagram
///
/// ```text
///                ┌──────────────┐
///        ┌──────►│  Unattached  │◄───────────┐
///        │       └──────┬───────┘            │
///        │              │ first attach       │ detach complete
///        │              ▼                    │
///        │       ┌──────────────┐     ┌──────┴──────┐
///        │       │  Connecting  │────►│   Closing   │
///        │       └──────┬───────┘     └──────▲──────┘
///        │              │ link up            │ last detach
///        │              ▼                    │
///        │       ┌──────────────┐            │
///        │       │  Connected   │────────────┘
///        │       └──────────────┘
///        │
///   (re-entrant: a device can be attached again after it returns to
///    Unattached, unless it has been destroyed)
/// ```
///
/// ## State Invariants
///
/// - **Unattached**: no consumer bound, `open_count == 0`, inbound data goes
///   to the pending queue
/// - **Connecting**: consumer bound, first attach waiting for the link
/// - **Connected**: consumer bound, link established, pending queue drained
/// - **Closing**: last reference going away, link close issued
///
/// A failed or interrupted attach goes Connecting → Closing → Unattached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PortState {
    /// No consumer attached
    Unattached,

    /// First attach is waiting for the link to connect
    Connecting,

    /// Link is up and the consumer receives data directly
    Connected,

    /// Final detach is tearing the attachment down
    Closing,
}

impl PortState {
    /// Is a consumer bound in this state?
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// User-facing status text
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Unattached => "Idle",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Closing => "Closing...",
        }
    }

    /// Validate if transition to new_state is allowed from current state
    pub fn can_transition_to(&self, new_state: PortState) -> bool {
        use PortState::*;

        match (self, new_state) {
            (Unattached, Connecting) => true, // First attach
            (Unattached, Unattached) => true, // Idempotent (no-op)

            (Connecting, Connected) => true, // Link up
            (Connecting, Closing) => true,   // Link closed, interrupted, or refused

            (Connected, Closing) => true, // Last detach

            (Closing, Unattached) => true, // Teardown complete

            _ => false,
        }
    }

    /// Convert state to u8 value for atomic storage
    pub fn to_u8(self) -> u8 {
        match self {
            PortState::Unattached => 0,
            PortState::Connecting => 1,
            PortState::Connected => 2,
            PortState::Closing => 3,
        }
    }

    /// Convert u8 value back to state.
    /// Returns None if value is invalid
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PortState::Unattached),
            1 => Some(PortState::Connecting),
            2 => Some(PortState::Connected),
            3 => Some(PortState::Closing),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conversion_roundtrip() {
        let states = [
            PortState::Unattached,
            PortState::Connecting,
            PortState::Connected,
            PortState::Closing,
        ];

        for state in states {
            let u8_val = state.to_u8();
            let recovered = PortState::from_u8(u8_val).unwrap();
            assert_eq!(state, recovered);
        }
        assert_eq!(PortState::from_u8(4), None);
    }

    #[test]
    fn test_valid_transitions() {
        assert!(PortState::Unattached.can_transition_to(PortState::Connecting));
        assert!(PortState::Connecting.can_transition_to(PortState::Connected));
        assert!(PortState::Connected.can_transition_to(PortState::Closing));
        assert!(PortState::Closing.can_transition_to(PortState::Unattached));
        // Failed attach
        assert!(PortState::Connecting.can_transition_to(PortState::Closing));
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot skip the connect wait
        assert!(!PortState::Unattached.can_transition_to(PortState::Connected));

        // Closing never goes back up without passing through Unattached
        assert!(!PortState::Closing.can_transition_to(PortState::Connecting));
        assert!(!PortState::Connected.can_transition_to(PortState::Unattached));
    }

    #[test]
    fn test_is_attached() {
        assert!(!PortState::Unattached.is_attached());
        assert!(PortState::Connecting.is_attached());
        assert!(PortState::Connected.is_attached());
        assert!(!PortState::Closing.is_attached());
    }

    #[test]
    fn test_serialization() {
        let state = PortState::Connected;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: PortState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
