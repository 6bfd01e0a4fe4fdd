use crate::addr::BdAddr;
use crate::nodes::NodeParent;
use crate::rpn::RemotePortNegotiation;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// No memory for a new data-link channel
    #[error("Failed to allocate data link: out of memory")]
    OutOfMemory,

    /// Operation requires a connected link
    #[error("Data link is not connected")]
    NotConnected,

    /// Link has no multiplexer session to carry control frames
    #[error("Data link has no active session")]
    NoSession,

    /// Link refused the operation
    #[error("Data link refused operation: {0}")]
    Refused(String),
}

/// Data-link channel state as reported by the connection layer.
///
/// ```text
///   Open ──open()──► Connecting ──► Config ──► Connected
///    ▲                   │                        │
///    │                   ▼                        ▼
///    └──────────────── Closed ◄──── Disconnecting ┘
/// ```
///
/// `Closed` is also re-enterable: a closed link may be opened again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// Allocated, never opened
    Open,
    /// Connection request in flight
    Connecting,
    /// Parameter negotiation in progress
    Config,
    /// Channel established, data may flow
    Connected,
    /// Disconnect in progress
    Disconnecting,
    /// Channel closed (locally or by the remote side)
    Closed,
}

impl LinkState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }

    /// Wire value reported in device info records
    pub fn to_u8(self) -> u8 {
        match self {
            LinkState::Connected => 1,
            LinkState::Open => 2,
            LinkState::Connecting => 5,
            LinkState::Config => 6,
            LinkState::Disconnecting => 7,
            LinkState::Closed => 8,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(LinkState::Connected),
            2 => Some(LinkState::Open),
            5 => Some(LinkState::Connecting),
            6 => Some(LinkState::Config),
            7 => Some(LinkState::Disconnecting),
            8 => Some(LinkState::Closed),
            _ => None,
        }
    }
}

/// Identifies the party that installed the current listener on a link.
///
/// Tokens are process-unique; a device uses its token to sever the owner
/// back-reference only if it is still the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

impl OwnerToken {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Callbacks a link delivers to its owner.
///
/// Links may invoke these while holding their own internal lock. Listeners
/// must therefore not block on anything that can call back into the link's
/// locked operations; they may call [`Link::release_owner`], which
/// implementations guard with a separate owner-slot lock.
pub trait LinkListener: Send + Sync {
    /// A frame of payload arrived from the remote side
    fn data_ready(&self, data: Vec<u8>);

    /// The link moved to `state`; `err` is the reason code (0 = none)
    fn state_change(&self, state: LinkState, err: i32);

    /// Remote V.24 signals changed
    fn modem_status(&self, v24: u8);
}

/// Accounting hook for transmit buffers.
///
/// Called exactly once when a [`TxBuffer`] carrying this owner is dropped,
/// whether it was acknowledged, purged or rejected.
pub trait TxOwner: Send + Sync {
    fn release(&self, truesize: usize);
}

/// Transmit buffer handed to [`Link::send`].
///
/// `truesize` is the backing size charged against the owner, which is larger
/// than the payload by the link headroom/tailroom.
pub struct TxBuffer {
    data: Vec<u8>,
    truesize: usize,
    owner: Option<Arc<dyn TxOwner>>,
}

impl TxBuffer {
    /// Buffer charged to `owner`; released back when dropped
    pub fn charged(payload_capacity: usize, truesize: usize, owner: Arc<dyn TxOwner>) -> Self {
        Self {
            data: Vec::with_capacity(payload_capacity),
            truesize,
            owner: Some(owner),
        }
    }

    /// Buffer not charged to anyone (control traffic, tests)
    pub fn uncharged(data: Vec<u8>) -> Self {
        let truesize = data.len();
        Self {
            data,
            truesize,
            owner: None,
        }
    }

    pub fn put(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn truesize(&self) -> usize {
        self.truesize
    }
}

impl std::fmt::Debug for TxBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxBuffer")
            .field("len", &self.data.len())
            .field("truesize", &self.truesize)
            .field("charged", &self.owner.is_some())
            .finish()
    }
}

impl Drop for TxBuffer {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.release(self.truesize);
        }
    }
}

/// One RFCOMM data-link channel, owned by the connection layer.
///
/// All methods are internally synchronized. `state()` already reports the
/// new state by the time the matching `state_change` callback runs.
pub trait Link: Send + Sync {
    /// Start connecting to `dst` on `channel`; completion is reported through
    /// [`LinkListener::state_change`]
    fn open(&self, src: BdAddr, dst: BdAddr, channel: u8) -> Result<(), LinkError>;

    /// Non-destructive close; the link can be opened again
    fn close(&self, err: i32);

    /// Queue a buffer for transmission. On error the buffer is dropped,
    /// which releases its charge.
    fn send(&self, buf: TxBuffer) -> Result<(), LinkError>;

    fn state(&self) -> LinkState;

    /// Maximum payload per frame
    fn mtu(&self) -> usize;

    /// Remaining transmit credits granted by the remote side
    fn tx_credits(&self) -> u32;

    /// Buffers queued but not yet handed to the session
    fn tx_queue_len(&self) -> usize;

    /// Drop every queued transmit buffer
    fn purge_tx_queue(&self);

    /// Ask the remote side to stop sending
    fn throttle(&self);

    fn unthrottle(&self);

    /// Last V.24 signals received from the remote side
    fn remote_v24(&self) -> u8;

    /// V.24 signals this side advertises
    fn local_v24(&self) -> u8;

    fn set_local_v24(&self, v24: u8);

    /// Whether a multiplexer session exists to carry control frames
    fn has_session(&self) -> bool;

    /// Send a remote port negotiation request
    fn send_rpn(&self, rpn: &RemotePortNegotiation) -> Result<(), LinkError>;

    /// Install `listener` as the owner's callback target, replacing any
    /// previous owner. Returns the previous owner token.
    fn set_listener(&self, owner: OwnerToken, listener: Arc<dyn LinkListener>) -> Option<OwnerToken>;

    /// Remove the listener if `owner` is still the current owner
    fn release_owner(&self, owner: OwnerToken) -> bool;

    /// Take a connected link over from its previous receiver in one step.
    ///
    /// Under the link's lock: throttles the link, installs `listener` for
    /// `owner`, hands the frames the previous receiver had queued to
    /// `listener` in arrival order, then reports the current remote signals
    /// through [`LinkListener::modem_status`]. No frame can arrive in
    /// between. The previous receiver stops getting data and its receive
    /// memory accounting is credited back. Returns the previous owner token.
    fn adopt(&self, owner: OwnerToken, listener: Arc<dyn LinkListener>) -> Option<OwnerToken>;

    /// Node representing the underlying baseband connection, if any
    fn parent_node(&self) -> Option<NodeParent>;
}

/// Allocates fresh data-link channels for newly created devices.
pub trait LinkFactory: Send + Sync {
    fn alloc(&self) -> Result<Arc<dyn Link>, LinkError>;
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize, AtomicUsize);

    impl TxOwner for Counter {
        fn release(&self, truesize: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
            self.1.fetch_add(truesize, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_state_conversion_roundtrip() {
        let states = [
            LinkState::Open,
            LinkState::Connecting,
            LinkState::Config,
            LinkState::Connected,
            LinkState::Disconnecting,
            LinkState::Closed,
        ];

        for state in states {
            assert_eq!(LinkState::from_u8(state.to_u8()), Some(state));
        }
        assert_eq!(LinkState::from_u8(0), None);
    }

    #[test]
    fn test_charged_buffer_released_once_on_drop() {
        let counter = Arc::new(Counter(AtomicUsize::new(0), AtomicUsize::new(0)));
        {
            let mut buf = TxBuffer::charged(4, 14, counter.clone());
            buf.put(b"ping");
            assert_eq!(buf.payload(), b"ping");
            assert_eq!(buf.truesize(), 14);
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(counter.1.load(Ordering::SeqCst), 14);
    }

    #[test]
    fn test_owner_tokens_are_unique() {
        let a = OwnerToken::next();
        let b = OwnerToken::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&LinkState::Connected).unwrap();
        let state: LinkState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, LinkState::Connected);
    }
}
