use crate::bridge::DeviceBridge;
use crate::config::DriverConfig;
use crate::device::{Device, DeviceParams};
use crate::port::{self, TtyHandle};
use crate::reaper::HangupReaper;
use crate::registry::Registry;
use futures_channel::mpsc;
use parking_lot::Mutex;
use rfcomm_core::{DeviceNodes, Link, LinkError, LinkFactory, PortConsumer};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tty_protocol::{
    Credentials, DeviceFlags, DeviceInfo, DeviceRequest, DriverEvent, ReleaseRequest, TtyError,
};
use tty_runtime::{
    spawn_actor, tty_info, tty_warn, CancelToken, ChannelManager, EventSink, ReaperSender,
};

/// Driver manages virtual serial devices and their administrative surface
///
/// Responsibilities:
/// - Create devices on fresh or adopted links, with permission checks
/// - Release, list and describe devices
/// - Attach consumers to device ports
/// - Run the hangup reaper that releases devices whose link went away
pub struct Driver {
    config: DriverConfig,
    registry: Arc<Registry>,
    factory: Arc<dyn LinkFactory>,
    nodes: Arc<dyn DeviceNodes>,
    channels: Mutex<ChannelManager>,
    reaper_tx: ReaperSender,
    events: EventSink,
    reaper_task: JoinHandle<()>,
}

impl Driver {
    /// Build a driver and start its reaper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: DriverConfig,
        factory: Arc<dyn LinkFactory>,
        nodes: Arc<dyn DeviceNodes>,
    ) -> Result<Self, TtyError> {
        config.validate()?;

        let (channels, handles) = ChannelManager::new(config.event_queue);
        let events = channels.event_sink();
        let reaper_tx = channels.reaper_sender();
        let registry = Arc::new(Registry::new(config.max_devices, events.clone()));

        let reaper = HangupReaper::new(Arc::downgrade(&registry));
        let reaper_task = spawn_actor(reaper, handles.reaper_rx, handles.events);

        tty_info!(
            max_devices = config.max_devices,
            "RFCOMM TTY driver started"
        );

        Ok(Self {
            config,
            registry,
            factory,
            nodes,
            channels: Mutex::new(channels),
            reaper_tx,
            events,
            reaper_task,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Take the driver event stream. Returns `None` once taken.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<DriverEvent>> {
        self.channels.lock().take_event_receiver()
    }

    /// Create a device on a newly allocated link
    pub fn create(&self, creds: &Credentials, req: &DeviceRequest) -> Result<u16, TtyError> {
        check_create_permission(creds, req.flags)?;
        if req.flags.contains(DeviceFlags::REUSE_DLC) {
            return Err(TtyError::InvalidArgument(
                "REUSE_DLC needs a connected link; use create_adopting".into(),
            ));
        }

        let link = self.factory.alloc().map_err(|e| match e {
            LinkError::OutOfMemory => TtyError::OutOfMemory,
            other => TtyError::LinkOpen(other),
        })?;

        self.add_device(req, req.flags, link, false)
    }

    /// Create a device on an already connected link.
    ///
    /// Frames the link received before the call are kept and delivered to
    /// the first consumer that attaches. The link is throttled until then.
    pub fn create_adopting(
        &self,
        creds: &Credentials,
        req: &DeviceRequest,
        link: Arc<dyn Link>,
    ) -> Result<u16, TtyError> {
        let flags = req.flags | DeviceFlags::REUSE_DLC;
        check_create_permission(creds, flags)?;

        if !link.state().is_connected() {
            return Err(TtyError::NotConnected);
        }

        self.add_device(req, flags, link, true)
    }

    fn add_device(
        &self,
        req: &DeviceRequest,
        flags: DeviceFlags,
        link: Arc<dyn Link>,
        adopt: bool,
    ) -> Result<u16, TtyError> {
        let flags = flags.intersection(DeviceFlags::CREATE_MASK);

        let dev = self.registry.insert_with(req.dev_id, |id| {
            let dev = Arc::new(Device::new(
                id,
                DeviceParams {
                    flags,
                    src: req.src,
                    dst: req.dst,
                    channel: req.channel,
                    link: link.clone(),
                    nodes: self.nodes.clone(),
                    events: self.events.clone(),
                },
            ));

            if adopt {
                DeviceBridge::adopt(&dev, self.reaper_tx.clone());
            } else {
                DeviceBridge::install(&dev, self.reaper_tx.clone());
            }
            dev
        })?;

        if let Err(e) = dev.register_node() {
            tty_warn!("{}: node registration failed: {}", dev.name(), e);
            self.registry.discard(&dev);
            return Err(e.into());
        }

        tty_info!(
            "{}: created for {} channel {} ({:?})",
            dev.name(),
            dev.dst(),
            dev.channel(),
            flags
        );
        self.events.emit(DriverEvent::DeviceCreated {
            id: dev.id(),
            flags,
        });
        Ok(dev.id())
    }

    /// Release a device. Attached consumers are hung up first; the device
    /// leaves the registry once the last of them detaches.
    ///
    /// Of several concurrent releases of one device, one succeeds and the
    /// rest get `NotFound`.
    pub fn release(&self, creds: &Credentials, req: &ReleaseRequest) -> Result<(), TtyError> {
        let dev = self
            .registry
            .lookup(req.dev_id)
            .ok_or(TtyError::NotFound(req.dev_id))?;

        if dev.creation_flags() != DeviceFlags::NOCAP && !creds.net_admin {
            return Err(TtyError::PermissionDenied(format!(
                "releasing {}",
                dev.name()
            )));
        }

        // A concurrent release that also got past lookup wins
        if !dev.claim_release() {
            return Err(TtyError::NotFound(req.dev_id));
        }

        if req.flags.contains(DeviceFlags::HANGUP_NOW) {
            dev.link().close(0);
        }

        port::force_hangup(&self.registry, &dev);

        // Release-on-hangup devices with a consumer were released above
        self.registry.release_if_listed(&dev);
        Ok(())
    }

    /// Describe up to `max` devices in id order
    pub fn list(&self, max: usize) -> Result<Vec<DeviceInfo>, TtyError> {
        if max == 0 || max > self.config.list_limit {
            return Err(TtyError::InvalidArgument(format!(
                "list size must be 1..={}, got {}",
                self.config.list_limit, max
            )));
        }
        Ok(self.registry.snapshot(max))
    }

    pub fn device_info(&self, id: u16) -> Result<DeviceInfo, TtyError> {
        self.registry
            .lookup(id)
            .map(|dev| dev.info())
            .ok_or(TtyError::NotFound(id))
    }

    /// Attach `consumer` to device `id`.
    ///
    /// The first attach opens the link and waits until it connects, fails
    /// or `cancel` fires.
    pub async fn open(
        &self,
        id: u16,
        consumer: Arc<dyn PortConsumer>,
        cancel: &CancelToken,
    ) -> Result<TtyHandle, TtyError> {
        let dev = self.registry.lookup(id).ok_or(TtyError::NotFound(id))?;
        port::attach(self.registry.clone(), dev, consumer, cancel).await
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.reaper_task.abort();
    }
}

/// Unprivileged callers may only ask for adoption and release-on-hangup
fn check_create_permission(creds: &Credentials, flags: DeviceFlags) -> Result<(), TtyError> {
    if flags.is_unprivileged() || creds.net_admin {
        Ok(())
    } else {
        Err(TtyError::PermissionDenied(format!(
            "creating a device with flags {:?}",
            flags
        )))
    }
}
