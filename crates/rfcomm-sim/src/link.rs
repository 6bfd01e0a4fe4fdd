use parking_lot::Mutex;
use rfcomm_core::{
    BdAddr, Link, LinkError, LinkFactory, LinkListener, LinkState, NodeParent, OwnerToken,
    RemotePortNegotiation, TxBuffer,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// RFCOMM default frame size
pub const DEFAULT_MTU: usize = 127;
/// Credits granted by a freshly connected remote
pub const DEFAULT_CREDITS: u32 = 7;

struct LinkInner {
    state: LinkState,
    mtu: usize,
    credits: u32,
    session: bool,
    auto_connect: bool,
    fail_open: Option<LinkError>,
    tx_queue: VecDeque<TxBuffer>,
    sent: Vec<Vec<u8>>,
    rx_queue: Vec<Vec<u8>>,
    throttled: bool,
    remote_v24: u8,
    local_v24: u8,
    rpn_log: Vec<RemotePortNegotiation>,
    parent: Option<NodeParent>,
    addressing: Option<(BdAddr, BdAddr, u8)>,
    open_calls: usize,
    close_codes: Vec<i32>,
}

struct Owner {
    token: OwnerToken,
    listener: Arc<dyn LinkListener>,
}

/// In-memory data-link channel.
///
/// Listener callbacks run while the link's state lock is held, as they do in
/// a real connection layer. The owner slot has its own lock so a listener
/// being torn down inside a callback can still call
/// [`Link::release_owner`].
pub struct MemoryLink {
    inner: Mutex<LinkInner>,
    owner: Mutex<Option<Owner>>,
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLink {
    /// Never-opened link with default MTU and credits
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                state: LinkState::Open,
                mtu: DEFAULT_MTU,
                credits: DEFAULT_CREDITS,
                session: false,
                auto_connect: false,
                fail_open: None,
                tx_queue: VecDeque::new(),
                sent: Vec::new(),
                rx_queue: Vec::new(),
                throttled: false,
                remote_v24: 0,
                local_v24: 0,
                rpn_log: Vec::new(),
                parent: None,
                addressing: None,
                open_calls: 0,
                close_codes: Vec::new(),
            }),
            owner: Mutex::new(None),
        }
    }

    /// Link that is already connected, as handed over by a listening socket
    pub fn connected() -> Self {
        let link = Self::new();
        {
            let mut inner = link.inner.lock();
            inner.state = LinkState::Connected;
            inner.session = true;
        }
        link
    }

    pub fn with_mtu(self, mtu: usize) -> Self {
        self.inner.lock().mtu = mtu;
        self
    }

    pub fn with_credits(self, credits: u32) -> Self {
        self.inner.lock().credits = credits;
        self
    }

    /// Connect immediately when opened instead of waiting for
    /// [`MemoryLink::remote_connect`]
    pub fn with_auto_connect(self, auto_connect: bool) -> Self {
        self.inner.lock().auto_connect = auto_connect;
        self
    }

    fn listener(&self) -> Option<Arc<dyn LinkListener>> {
        self.owner.lock().as_ref().map(|o| o.listener.clone())
    }

    /// Move to `state` and notify the listener with the state lock held
    fn transition(&self, inner: &mut LinkInner, state: LinkState, err: i32) {
        inner.state = state;
        tracing::trace!(?state, err, "memory link state change");
        if let Some(listener) = self.listener() {
            listener.state_change(state, err);
        }
    }

    // ---- remote side controls ----

    /// Remote side accepted the connection
    pub fn remote_connect(&self) {
        let mut inner = self.inner.lock();
        inner.session = true;
        self.transition(&mut inner, LinkState::Connected, 0);
    }

    /// Remote side dropped the connection with reason `err`
    pub fn remote_hangup(&self, err: i32) {
        let mut inner = self.inner.lock();
        let purged = std::mem::take(&mut inner.tx_queue);
        inner.session = false;
        self.transition(&mut inner, LinkState::Closed, err);
        drop(inner);
        drop(purged);
    }

    /// A frame arrived from the remote side.
    ///
    /// Without a listener the frame waits in the receive queue.
    pub fn deliver(&self, data: &[u8]) {
        let inner = self.inner.lock();
        match self.listener() {
            Some(listener) => listener.data_ready(data.to_vec()),
            None => {
                let mut inner = inner;
                inner.rx_queue.push(data.to_vec());
            }
        }
    }

    /// Remote V.24 signals changed
    pub fn set_remote_v24(&self, signals: u8) {
        let mut inner = self.inner.lock();
        inner.remote_v24 = signals;
        if let Some(listener) = self.listener() {
            listener.modem_status(signals);
        }
    }

    pub fn set_credits(&self, credits: u32) {
        self.inner.lock().credits = credits;
    }

    pub fn set_mtu(&self, mtu: usize) {
        self.inner.lock().mtu = mtu;
    }

    pub fn set_session(&self, session: bool) {
        self.inner.lock().session = session;
    }

    pub fn set_parent(&self, parent: Option<NodeParent>) {
        self.inner.lock().parent = parent;
    }

    /// Make the next `open` fail with `err`
    pub fn fail_next_open(&self, err: LinkError) {
        self.inner.lock().fail_open = Some(err);
    }

    /// Transmit and acknowledge up to `count` queued buffers, releasing their
    /// charge. Returns how many were acknowledged.
    pub fn ack(&self, count: usize) -> usize {
        let mut inner = self.inner.lock();
        let n = count.min(inner.tx_queue.len());
        let acked: Vec<TxBuffer> = inner.tx_queue.drain(..n).collect();
        for buf in &acked {
            inner.sent.push(buf.payload().to_vec());
        }
        drop(inner);
        drop(acked);
        n
    }

    pub fn ack_all(&self) -> usize {
        self.ack(usize::MAX)
    }

    // ---- inspection ----

    /// Payloads acknowledged so far, in transmit order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.lock().sent.clone()
    }

    /// Payloads still waiting in the transmit queue
    pub fn queued(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .tx_queue
            .iter()
            .map(|b| b.payload().to_vec())
            .collect()
    }

    pub fn is_throttled(&self) -> bool {
        self.inner.lock().throttled
    }

    pub fn rpn_requests(&self) -> Vec<RemotePortNegotiation> {
        self.inner.lock().rpn_log.clone()
    }

    pub fn open_calls(&self) -> usize {
        self.inner.lock().open_calls
    }

    /// Reason codes passed to every `close` call
    pub fn close_codes(&self) -> Vec<i32> {
        self.inner.lock().close_codes.clone()
    }

    /// Addressing used by the last successful `open`
    pub fn addressing(&self) -> Option<(BdAddr, BdAddr, u8)> {
        self.inner.lock().addressing
    }

    pub fn owner(&self) -> Option<OwnerToken> {
        self.owner.lock().as_ref().map(|o| o.token)
    }
}

impl Link for MemoryLink {
    fn open(&self, src: BdAddr, dst: BdAddr, channel: u8) -> Result<(), LinkError> {
        let mut inner = self.inner.lock();
        inner.open_calls += 1;
        if let Some(err) = inner.fail_open.take() {
            return Err(err);
        }
        if !matches!(inner.state, LinkState::Open | LinkState::Closed) {
            return Ok(());
        }

        inner.addressing = Some((src, dst, channel));
        inner.session = true;
        self.transition(&mut inner, LinkState::Connecting, 0);
        if inner.auto_connect {
            self.transition(&mut inner, LinkState::Connected, 0);
        }
        Ok(())
    }

    fn close(&self, err: i32) {
        let mut inner = self.inner.lock();
        inner.close_codes.push(err);
        if matches!(inner.state, LinkState::Open | LinkState::Closed) {
            return;
        }
        let purged = std::mem::take(&mut inner.tx_queue);
        self.transition(&mut inner, LinkState::Closed, err);
        drop(inner);
        drop(purged);
    }

    fn send(&self, buf: TxBuffer) -> Result<(), LinkError> {
        let mut inner = self.inner.lock();
        if !inner.state.is_connected() {
            drop(inner);
            return Err(LinkError::NotConnected);
        }
        inner.tx_queue.push_back(buf);
        Ok(())
    }

    fn state(&self) -> LinkState {
        self.inner.lock().state
    }

    fn mtu(&self) -> usize {
        self.inner.lock().mtu
    }

    fn tx_credits(&self) -> u32 {
        self.inner.lock().credits
    }

    fn tx_queue_len(&self) -> usize {
        self.inner.lock().tx_queue.len()
    }

    fn purge_tx_queue(&self) {
        let purged = std::mem::take(&mut self.inner.lock().tx_queue);
        drop(purged);
    }

    fn throttle(&self) {
        self.inner.lock().throttled = true;
    }

    fn unthrottle(&self) {
        self.inner.lock().throttled = false;
    }

    fn remote_v24(&self) -> u8 {
        self.inner.lock().remote_v24
    }

    fn local_v24(&self) -> u8 {
        self.inner.lock().local_v24
    }

    fn set_local_v24(&self, v24: u8) {
        self.inner.lock().local_v24 = v24;
    }

    fn has_session(&self) -> bool {
        self.inner.lock().session
    }

    fn send_rpn(&self, rpn: &RemotePortNegotiation) -> Result<(), LinkError> {
        let mut inner = self.inner.lock();
        if !inner.session {
            return Err(LinkError::NoSession);
        }
        inner.rpn_log.push(*rpn);
        Ok(())
    }

    fn set_listener(&self, owner: OwnerToken, listener: Arc<dyn LinkListener>) -> Option<OwnerToken> {
        let previous = self.owner.lock().replace(Owner {
            token: owner,
            listener,
        });
        previous.map(|o| o.token)
    }

    fn release_owner(&self, owner: OwnerToken) -> bool {
        let mut slot = self.owner.lock();
        match slot.as_ref() {
            Some(current) if current.token == owner => {
                // Drop the listener after the slot lock is released
                let released = slot.take();
                drop(slot);
                drop(released);
                true
            }
            _ => false,
        }
    }

    fn adopt(&self, owner: OwnerToken, listener: Arc<dyn LinkListener>) -> Option<OwnerToken> {
        let mut inner = self.inner.lock();
        inner.throttled = true;
        let previous = self.set_listener(owner, listener.clone());
        for frame in std::mem::take(&mut inner.rx_queue) {
            listener.data_ready(frame);
        }
        listener.modem_status(inner.remote_v24);
        previous
    }

    fn parent_node(&self) -> Option<NodeParent> {
        self.inner.lock().parent.clone()
    }
}

/// Allocates [`MemoryLink`]s and remembers them for inspection
pub struct MemoryLinkFactory {
    links: Mutex<Vec<Arc<MemoryLink>>>,
    mtu: usize,
    credits: u32,
    auto_connect: bool,
    parent: Option<NodeParent>,
    fail_next: Mutex<bool>,
}

impl Default for MemoryLinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLinkFactory {
    pub fn new() -> Self {
        Self {
            links: Mutex::new(Vec::new()),
            mtu: DEFAULT_MTU,
            credits: DEFAULT_CREDITS,
            auto_connect: false,
            parent: None,
            fail_next: Mutex::new(false),
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_credits(mut self, credits: u32) -> Self {
        self.credits = credits;
        self
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Parent node every allocated link reports
    pub fn with_parent(mut self, parent: NodeParent) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Make the next `alloc` fail with out-of-memory
    pub fn fail_next_alloc(&self) {
        *self.fail_next.lock() = true;
    }

    /// Links allocated so far, oldest first
    pub fn links(&self) -> Vec<Arc<MemoryLink>> {
        self.links.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<MemoryLink>> {
        self.links.lock().last().cloned()
    }
}

impl LinkFactory for MemoryLinkFactory {
    fn alloc(&self) -> Result<Arc<dyn Link>, LinkError> {
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(LinkError::OutOfMemory);
        }
        let link = Arc::new(
            MemoryLink::new()
                .with_mtu(self.mtu)
                .with_credits(self.credits)
                .with_auto_connect(self.auto_connect),
        );
        link.set_parent(self.parent.clone());
        self.links.lock().push(link.clone());
        Ok(link)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rfcomm_core::{v24, TxOwner};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        data: Mutex<Vec<Vec<u8>>>,
        states: Mutex<Vec<(LinkState, i32)>>,
        signals: Mutex<Vec<u8>>,
    }

    impl LinkListener for Recorder {
        fn data_ready(&self, data: Vec<u8>) {
            self.data.lock().push(data);
        }

        fn state_change(&self, state: LinkState, err: i32) {
            self.states.lock().push((state, err));
        }

        fn modem_status(&self, v24: u8) {
            self.signals.lock().push(v24);
        }
    }

    #[derive(Default)]
    struct Charge(AtomicUsize);

    impl TxOwner for Charge {
        fn release(&self, truesize: usize) {
            self.0.fetch_add(truesize, Ordering::SeqCst);
        }
    }

    fn attach(link: &MemoryLink) -> (OwnerToken, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let token = OwnerToken::next();
        link.set_listener(token, recorder.clone());
        (token, recorder)
    }

    #[test]
    fn test_open_then_remote_connect() {
        let link = MemoryLink::new();
        let (_, rec) = attach(&link);

        link.open(BdAddr::ANY, BdAddr([1; 6]), 4).unwrap();
        assert_eq!(link.state(), LinkState::Connecting);
        link.remote_connect();
        assert_eq!(link.state(), LinkState::Connected);

        assert_eq!(
            *rec.states.lock(),
            vec![(LinkState::Connecting, 0), (LinkState::Connected, 0)]
        );
        assert_eq!(link.addressing(), Some((BdAddr::ANY, BdAddr([1; 6]), 4)));
    }

    #[test]
    fn test_open_while_connected_is_noop() {
        let link = MemoryLink::connected();
        let (_, rec) = attach(&link);
        link.open(BdAddr::ANY, BdAddr::ANY, 1).unwrap();
        assert!(rec.states.lock().is_empty());
        assert_eq!(link.open_calls(), 1);
    }

    #[test]
    fn test_failed_open() {
        let link = MemoryLink::new();
        link.fail_next_open(LinkError::Refused("busy".into()));
        assert!(link.open(BdAddr::ANY, BdAddr::ANY, 1).is_err());
        assert_eq!(link.state(), LinkState::Open);
        assert!(link.open(BdAddr::ANY, BdAddr::ANY, 1).is_ok());
    }

    #[test]
    fn test_send_requires_connection_and_releases_charge() {
        let link = MemoryLink::new();
        let charge = Arc::new(Charge::default());

        let err = link
            .send(TxBuffer::charged(4, 14, charge.clone()))
            .unwrap_err();
        assert_eq!(err, LinkError::NotConnected);
        assert_eq!(charge.0.load(Ordering::SeqCst), 14);
    }

    #[test]
    fn test_ack_releases_in_order() {
        let link = MemoryLink::connected();
        let charge = Arc::new(Charge::default());
        for payload in [b"one".as_slice(), b"two", b"three"] {
            let mut buf = TxBuffer::charged(payload.len(), payload.len() + 10, charge.clone());
            buf.put(payload);
            link.send(buf).unwrap();
        }
        assert_eq!(link.tx_queue_len(), 3);

        assert_eq!(link.ack(2), 2);
        assert_eq!(link.sent(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(charge.0.load(Ordering::SeqCst), 26);
        assert_eq!(link.queued(), vec![b"three".to_vec()]);

        link.purge_tx_queue();
        assert_eq!(link.tx_queue_len(), 0);
        assert_eq!(charge.0.load(Ordering::SeqCst), 41);
    }

    #[test]
    fn test_adopt_hands_over_queued_frames() {
        let link = MemoryLink::connected();
        link.set_remote_v24(v24::RTC | v24::DV);
        link.deliver(b"a");
        link.deliver(b"b");

        let recorder = Arc::new(Recorder::default());
        let token = OwnerToken::next();
        assert_eq!(link.adopt(token, recorder.clone()), None);
        assert_eq!(link.owner(), Some(token));
        assert!(link.is_throttled());
        assert_eq!(*recorder.signals.lock(), vec![v24::RTC | v24::DV]);

        link.deliver(b"c");
        assert_eq!(
            *recorder.data.lock(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn test_adopt_races_with_delivery() {
        let link = Arc::new(MemoryLink::connected());
        for i in 0..50u8 {
            link.deliver(&[i]);
        }

        let feeder = {
            let link = link.clone();
            std::thread::spawn(move || {
                for i in 50..200u8 {
                    link.deliver(&[i]);
                }
            })
        };
        let recorder = Arc::new(Recorder::default());
        link.adopt(OwnerToken::next(), recorder.clone());
        feeder.join().unwrap();

        // Frames queued before the handover come first; none are lost
        let arrival: Vec<u8> = recorder.data.lock().iter().flatten().copied().collect();
        assert_eq!(arrival, (0..200u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_release_owner_only_for_current_owner() {
        let link = MemoryLink::new();
        let (first, _) = attach(&link);
        let (second, _) = attach(&link);

        assert!(!link.release_owner(first));
        assert_eq!(link.owner(), Some(second));
        assert!(link.release_owner(second));
        assert_eq!(link.owner(), None);
    }

    #[test]
    fn test_close_and_hangup() {
        let link = MemoryLink::new().with_auto_connect(true);
        let (_, rec) = attach(&link);
        link.open(BdAddr::ANY, BdAddr::ANY, 2).unwrap();
        link.close(0);
        link.close(0);
        assert_eq!(link.close_codes(), vec![0, 0]);
        assert_eq!(
            rec.states.lock().last().copied(),
            Some((LinkState::Closed, 0))
        );

        link.open(BdAddr::ANY, BdAddr::ANY, 2).unwrap();
        link.remote_hangup(104);
        assert_eq!(
            rec.states.lock().last().copied(),
            Some((LinkState::Closed, 104))
        );
        assert!(!link.has_session());
    }

    #[test]
    fn test_rpn_requires_session() {
        let link = MemoryLink::new();
        let rpn = RemotePortNegotiation {
            baud: 3,
            data_bits: 3,
            stop_bits: 0,
            parity: 0,
            flow_control: 0,
            xon_char: 0x11,
            xoff_char: 0x13,
            param_mask: 1,
        };
        assert_eq!(link.send_rpn(&rpn), Err(LinkError::NoSession));
        link.set_session(true);
        link.send_rpn(&rpn).unwrap();
        assert_eq!(link.rpn_requests(), vec![rpn]);
    }

    #[test]
    fn test_modem_signals_reach_listener() {
        let link = MemoryLink::connected();
        let (_, rec) = attach(&link);
        link.set_remote_v24(0x8C);
        assert_eq!(link.remote_v24(), 0x8C);
        assert_eq!(*rec.signals.lock(), vec![0x8C]);
    }

    #[test]
    fn test_factory_tracks_links() {
        let factory = MemoryLinkFactory::new()
            .with_mtu(100)
            .with_credits(2)
            .with_parent(NodeParent("hci0:42".into()));
        let link = factory.alloc().unwrap();
        assert_eq!(link.mtu(), 100);
        assert_eq!(link.tx_credits(), 2);
        assert_eq!(link.parent_node(), Some(NodeParent("hci0:42".into())));
        assert_eq!(factory.links().len(), 1);

        factory.fail_next_alloc();
        assert_eq!(factory.alloc().err(), Some(LinkError::OutOfMemory));
        assert!(factory.alloc().is_ok());
        assert_eq!(factory.links().len(), 2);
    }
}
