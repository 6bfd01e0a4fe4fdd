//! Port open/close state machine
//!
//! The first attach binds a consumer, opens the link and waits for it to
//! connect; later attaches only bump the open count. The last detach
//! undoes all of it and completes a deferred release, or the release a
//! link hangup asked for while the port was open.
//!
//! ```text
//! Unattached ──attach──► Connecting ──link up──► Connected
//!     ▲                      │                       │
//!     │                 fail/cancel             last detach
//!     │                      ▼                       │
//!     └──────────────────  Closing  ◄────────────────┘
//! ```

use crate::device::Device;
use crate::registry::Registry;
use rfcomm_core::{LinkState, PortConsumer};
use std::sync::Arc;
use tty_protocol::modem::apply_to_v24;
use tty_protocol::{DeviceFlags, DriverEvent, LineSettings, PortState, TtyError};
use tty_runtime::{race_with_cancellation, tty_debug, tty_error, tty_info, CancelToken};

/// An open reference to a device's serial port.
///
/// Dropping the handle detaches it.
pub struct TtyHandle {
    dev: Arc<Device>,
    registry: Arc<Registry>,
    attached: bool,
}

/// Attach a consumer to `dev`, waiting for the link if this is the first
/// attach. `consumer` is ignored when the port is already open.
pub(crate) async fn attach(
    registry: Arc<Registry>,
    dev: Arc<Device>,
    consumer: Arc<dyn PortConsumer>,
    cancel: &CancelToken,
) -> Result<TtyHandle, TtyError> {
    let open_count = {
        let mut port = dev.port.lock();
        // Checked under the port lock so a concurrent release either sees
        // this attach or is seen by it
        if dev.is_released() {
            return Err(TtyError::NotFound(dev.id()));
        }
        port.open_count += 1;
        if port.open_count == 1 {
            dev.transition_locked(&mut port, PortState::Connecting);
        }
        port.open_count
    };

    let handle = TtyHandle {
        dev: dev.clone(),
        registry,
        attached: true,
    };

    if open_count > 1 {
        dev.events().emit(DriverEvent::PortAttached {
            id: dev.id(),
            open_count,
        });
        return Ok(handle);
    }

    // From here on an error drops `handle`, which runs the detach path
    dev.bind_consumer(consumer);
    dev.set_flag(DeviceFlags::ATTACHED);

    dev.link()
        .open(dev.src(), dev.dst(), dev.channel())
        .map_err(TtyError::LinkOpen)?;

    wait_for_link(&dev, cancel).await?;

    dev.transition(PortState::Connected);
    dev.reparent_node();
    let drained = dev.drain_pending();
    if drained > 0 {
        tty_debug!("{}: delivered {} pending frames", dev.name(), drained);
    }
    dev.link().unthrottle();

    tty_info!("{}: attached", dev.name());
    dev.events().emit(DriverEvent::PortAttached {
        id: dev.id(),
        open_count: 1,
    });
    Ok(handle)
}

async fn wait_for_link(dev: &Device, cancel: &CancelToken) -> Result<(), TtyError> {
    loop {
        // Register before checking, so a state change in between still wakes us
        let notified = dev.state_changed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match dev.link().state() {
            LinkState::Connected => return Ok(()),
            LinkState::Closed => {
                return Err(TtyError::LinkClosed {
                    code: dev.last_error(),
                })
            }
            _ => {}
        }

        if race_with_cancellation(notified, cancel).await.is_none() {
            tty_debug!("{}: attach interrupted", dev.name());
            return Err(TtyError::Interrupted);
        }
    }
}

impl TtyHandle {
    pub fn id(&self) -> u16 {
        self.dev.id()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.dev
    }

    /// Queue `data` for transmission; see [`Device::write`]
    pub fn write(&self, data: &[u8]) -> Result<usize, TtyError> {
        self.dev.write(data)
    }

    pub fn write_room(&self) -> usize {
        self.dev.write_room()
    }

    pub fn chars_in_buffer(&self) -> usize {
        self.dev.chars_in_buffer()
    }

    pub fn flush_buffer(&self) {
        self.dev.flush_buffer();
    }

    pub fn throttle(&self) {
        self.dev.link().throttle();
    }

    pub fn unthrottle(&self) {
        self.dev.link().unthrottle();
    }

    pub fn line_settings(&self) -> LineSettings {
        self.dev.line_settings()
    }

    /// Apply new line settings and negotiate the changed ones with the
    /// remote port. Nothing is sent while the link has no session.
    pub fn set_line_settings(&self, settings: LineSettings) -> Result<(), TtyError> {
        let old = self.dev.replace_line_settings(settings.clone());

        if !self.dev.link().has_session() {
            return Ok(());
        }

        if let Some(rpn) = settings.negotiation_from(&old) {
            tty_debug!("{}: negotiating {:?}", self.dev.name(), rpn);
            self.dev.link().send_rpn(&rpn).map_err(TtyError::Send)?;
        }
        Ok(())
    }

    /// Remote modem lines in TIOCM_* form
    pub fn tiocmget(&self) -> u32 {
        self.dev.modem_status()
    }

    /// Raise `set` then drop `clear` on the local modem lines
    pub fn tiocmset(&self, set: u32, clear: u32) {
        let link = self.dev.link();
        link.set_local_v24(apply_to_v24(link.local_v24(), set, clear));
    }

    /// The consumer saw a hangup. Flushes output and, for devices created
    /// with `RELEASE_ON_HANGUP`, releases the device.
    pub fn hangup(&self) {
        hangup_port(&self.registry, &self.dev);
    }

    /// Detach explicitly; same as dropping the handle
    pub fn close(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !std::mem::replace(&mut self.attached, false) {
            return;
        }
        let dev = &self.dev;

        let remaining = {
            let mut port = dev.port.lock();
            let Some(remaining) = port.open_count.checked_sub(1) else {
                tty_error!("{}: detach without attach", dev.name());
                return;
            };
            port.open_count = remaining;
            if remaining == 0 {
                dev.transition_locked(&mut port, PortState::Closing);
            }
            remaining
        };

        if remaining > 0 {
            dev.events().emit(DriverEvent::PortDetached {
                id: dev.id(),
                open_count: remaining,
            });
            return;
        }

        dev.orphan_node();
        // Unbound before closing so the close is not reported as a hangup
        let consumer = dev.unbind_consumer();
        dev.link().close(0);
        let hung_up = dev.has_flag(DeviceFlags::HUNG_UP);
        dev.clear_flag(DeviceFlags::ATTACHED | DeviceFlags::HUNG_UP);
        drop(consumer);

        dev.transition(PortState::Unattached);
        tty_info!("{}: detached", dev.name());
        dev.events().emit(DriverEvent::PortDetached {
            id: dev.id(),
            open_count: 0,
        });

        if dev.is_released() {
            self.registry.finish_release(dev);
        } else if hung_up {
            hangup_port(&self.registry, dev);
        }
    }
}

/// Hangup as seen from the port: flush and, for release-on-hangup devices,
/// release unless that already happened.
pub(crate) fn hangup_port(registry: &Registry, dev: &Arc<Device>) {
    dev.flush_buffer();
    if dev.has_flag(DeviceFlags::RELEASE_ON_HANGUP) && registry.release_if_listed(dev) {
        tty_debug!("{}: released on hangup", dev.name());
    }
}

/// Make an attached consumer observe a hangup now
pub(crate) fn force_hangup(registry: &Registry, dev: &Arc<Device>) {
    let Some(consumer) = dev.consumer() else {
        return;
    };
    consumer.hangup();
    dev.events().emit(DriverEvent::Hangup { id: dev.id() });
    hangup_port(registry, dev);
}

impl Drop for TtyHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for TtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtyHandle")
            .field("id", &self.dev.id())
            .field("attached", &self.attached)
            .finish()
    }
}
