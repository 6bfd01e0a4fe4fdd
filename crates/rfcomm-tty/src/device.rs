//! Virtual serial device
//!
//! A [`Device`] binds one data link to one numbered serial node. It is
//! reference counted: the registry holds one reference while the device is
//! listed, every open [`crate::TtyHandle`] holds one, and every charged
//! transmit buffer still queued on the link holds one. Teardown runs in
//! `Drop` once the last of them is gone.
//!
//! Fields touched by link callbacks (consumer binding, pending queue, modem
//! status) sit behind `inner`. Link callbacks run with the link's own lock
//! held, so `inner` is always taken after it and never held while calling
//! into the link.

use crate::constants::devices::NAME_PREFIX;
use parking_lot::Mutex;
use rfcomm_core::{BdAddr, DeviceNodes, Link, NodeAttributes, NodeError, OwnerToken, PortConsumer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tty_protocol::{DeviceFlags, DeviceInfo, DriverEvent, LineSettings, PortState};
use tty_runtime::{tty_debug, tty_info, tty_warn, EventSink};

/// Everything needed to build a device except its id
pub(crate) struct DeviceParams {
    pub flags: DeviceFlags,
    pub src: BdAddr,
    pub dst: BdAddr,
    pub channel: u8,
    pub link: Arc<dyn Link>,
    pub nodes: Arc<dyn DeviceNodes>,
    pub events: EventSink,
}

pub(crate) struct DeviceInner {
    pub consumer: Option<Arc<dyn PortConsumer>>,
    /// Frames received while no consumer was attached, oldest first
    pub pending: VecDeque<Vec<u8>>,
    /// Remote modem lines in TIOCM_* form
    pub modem_status: u32,
    pub line: LineSettings,
}

pub(crate) struct PortInner {
    pub open_count: u32,
    pub state: PortState,
}

pub struct Device {
    id: u16,
    name: String,
    src: BdAddr,
    dst: BdAddr,
    channel: u8,
    link: Arc<dyn Link>,
    token: OwnerToken,
    nodes: Arc<dyn DeviceNodes>,
    events: EventSink,

    flags: AtomicU32,
    last_error: AtomicI32,
    pub(crate) wmem_alloc: AtomicUsize,

    listed: AtomicBool,
    registered: AtomicBool,
    // Set by the first administrative release to get past lookup
    release_claimed: AtomicBool,
    // Shared with the registry slot so the id stays reserved until teardown
    destroyed: Arc<AtomicBool>,

    pub(crate) state_changed: Notify,
    pub(crate) inner: Mutex<DeviceInner>,
    pub(crate) port: Mutex<PortInner>,
}

impl Device {
    pub(crate) fn new(id: u16, params: DeviceParams) -> Self {
        Self {
            id,
            name: format!("{}{}", NAME_PREFIX, id),
            src: params.src,
            dst: params.dst,
            channel: params.channel,
            link: params.link,
            token: OwnerToken::next(),
            nodes: params.nodes,
            events: params.events,
            flags: AtomicU32::new(params.flags.bits()),
            last_error: AtomicI32::new(0),
            wmem_alloc: AtomicUsize::new(0),
            listed: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            release_claimed: AtomicBool::new(false),
            destroyed: Arc::new(AtomicBool::new(false)),
            state_changed: Notify::new(),
            inner: Mutex::new(DeviceInner {
                consumer: None,
                pending: VecDeque::new(),
                modem_status: 0,
                line: LineSettings::default(),
            }),
            port: Mutex::new(PortInner {
                open_count: 0,
                state: PortState::Unattached,
            }),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Node name, `rfcomm<id>`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn src(&self) -> BdAddr {
        self.src
    }

    pub fn dst(&self) -> BdAddr {
        self.dst
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn link(&self) -> &Arc<dyn Link> {
        &self.link
    }

    /// Identity under which this device owns its link's callbacks
    pub fn token(&self) -> OwnerToken {
        self.token
    }

    pub(crate) fn events(&self) -> &EventSink {
        &self.events
    }

    // ---- flags ----

    pub fn flags(&self) -> DeviceFlags {
        DeviceFlags::from_bits(self.flags.load(Ordering::SeqCst))
    }

    /// Flags fixed at creation, without lifecycle bits
    pub fn creation_flags(&self) -> DeviceFlags {
        self.flags().intersection(DeviceFlags::CREATE_MASK)
    }

    pub fn has_flag(&self, flag: DeviceFlags) -> bool {
        self.flags().contains(flag)
    }

    /// Set `flag`, returning the flags as they were before
    pub(crate) fn set_flag(&self, flag: DeviceFlags) -> DeviceFlags {
        DeviceFlags::from_bits(self.flags.fetch_or(flag.bits(), Ordering::SeqCst))
    }

    pub(crate) fn clear_flag(&self, flag: DeviceFlags) {
        self.flags.fetch_and(!flag.bits(), Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.has_flag(DeviceFlags::RELEASED)
    }

    /// True for exactly one caller; later administrative releases of the
    /// same device report it as gone
    pub(crate) fn claim_release(&self) -> bool {
        !self.release_claimed.swap(true, Ordering::SeqCst)
    }

    // ---- link-side state ----

    /// Error code from the most recent link state change
    pub fn last_error(&self) -> i32 {
        self.last_error.load(Ordering::SeqCst)
    }

    pub(crate) fn set_last_error(&self, err: i32) {
        self.last_error.store(err, Ordering::SeqCst);
    }

    /// Remote modem lines in TIOCM_* form
    pub fn modem_status(&self) -> u32 {
        self.inner.lock().modem_status
    }

    pub(crate) fn set_modem_status(&self, status: u32) {
        self.inner.lock().modem_status = status;
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Bytes charged to transmit buffers the link has not yet released
    pub fn outstanding_tx(&self) -> usize {
        self.wmem_alloc.load(Ordering::SeqCst)
    }

    pub fn line_settings(&self) -> LineSettings {
        self.inner.lock().line.clone()
    }

    pub(crate) fn replace_line_settings(&self, line: LineSettings) -> LineSettings {
        std::mem::replace(&mut self.inner.lock().line, line)
    }

    #[cfg(test)]
    pub(crate) fn queue_pending(&self, frames: Vec<Vec<u8>>) {
        self.inner.lock().pending.extend(frames);
    }

    // ---- consumer binding ----

    pub(crate) fn consumer(&self) -> Option<Arc<dyn PortConsumer>> {
        self.inner.lock().consumer.clone()
    }

    pub(crate) fn bind_consumer(&self, consumer: Arc<dyn PortConsumer>) {
        self.inner.lock().consumer = Some(consumer);
    }

    pub(crate) fn unbind_consumer(&self) -> Option<Arc<dyn PortConsumer>> {
        self.inner.lock().consumer.take()
    }

    /// Hand every pending frame to the bound consumer, oldest first.
    ///
    /// Runs under `inner`, so frames arriving meanwhile queue behind the
    /// ones being drained. Returns the number of frames delivered.
    pub(crate) fn drain_pending(&self) -> usize {
        let mut inner = self.inner.lock();
        let Some(consumer) = inner.consumer.clone() else {
            return 0;
        };
        let mut delivered = 0;
        while let Some(frame) = inner.pending.pop_front() {
            consumer.receive(&frame);
            delivered += 1;
        }
        if delivered > 0 {
            consumer.push();
        }
        delivered
    }

    // ---- port ----

    pub fn open_count(&self) -> u32 {
        self.port.lock().open_count
    }

    pub fn port_state(&self) -> PortState {
        self.port.lock().state
    }

    /// Move the port state machine, reporting the change.
    ///
    /// Caller holds `port`.
    pub(crate) fn transition_locked(&self, port: &mut PortInner, next: PortState) {
        if port.state == next {
            return;
        }
        if !port.state.can_transition_to(next) {
            tty_warn!(
                "{}: unexpected port transition {:?} → {:?}",
                self.name,
                port.state,
                next
            );
        }
        tty_debug!("{}: {:?} → {:?}", self.name, port.state, next);
        port.state = next;
        self.events.emit(DriverEvent::StateChanged {
            id: self.id,
            state: next,
        });
    }

    pub(crate) fn transition(&self, next: PortState) {
        let mut port = self.port.lock();
        self.transition_locked(&mut port, next);
    }

    // ---- registry bookkeeping ----

    pub fn is_listed(&self) -> bool {
        self.listed.load(Ordering::SeqCst)
    }

    pub(crate) fn set_listed(&self, listed: bool) {
        self.listed.store(listed, Ordering::SeqCst);
    }

    pub(crate) fn destroyed_flag(&self) -> Arc<AtomicBool> {
        self.destroyed.clone()
    }

    pub(crate) fn register_node(&self) -> Result<(), NodeError> {
        let attrs = NodeAttributes {
            name: self.name.clone(),
            address: self.dst,
            channel: self.channel,
        };
        self.nodes.register(self.id, &attrs)?;
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn reparent_node(&self) {
        let parent = self.link.parent_node();
        self.nodes.reparent(self.id, parent.as_ref());
    }

    pub(crate) fn orphan_node(&self) {
        self.nodes.reparent(self.id, None);
    }

    /// Snapshot for list and info queries
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id,
            flags: self.flags(),
            state: self.link.state(),
            channel: self.channel,
            src: self.src,
            dst: self.dst,
            last_error: self.last_error(),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("flags", &self.flags())
            .field("channel", &self.channel)
            .field("dst", &self.dst)
            .finish()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        assert!(
            !*self.listed.get_mut(),
            "{}: torn down while still listed",
            self.name
        );
        assert_eq!(
            self.port.get_mut().open_count,
            0,
            "{}: torn down while attached",
            self.name
        );

        self.link.release_owner(self.token);

        if *self.registered.get_mut() {
            self.nodes.unregister(self.id);
            self.events.emit(DriverEvent::DeviceDestroyed { id: self.id });
            tty_info!("{}: destroyed", self.name);
        }

        self.destroyed.store(true, Ordering::SeqCst);
    }
}
