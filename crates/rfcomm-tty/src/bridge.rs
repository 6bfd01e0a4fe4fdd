//! Link callback adapter
//!
//! [`DeviceBridge`] is installed as the link's listener when a device is
//! created. Its methods run in the link's context with the link lock held,
//! so they never call back into the link and never take the registry lock.
//! Releasing a device from here is handed to the hangup reaper instead.

use crate::device::Device;
use rfcomm_core::{LinkListener, LinkState};
use std::sync::{Arc, Weak};
use tty_protocol::modem::{carrier_lost, from_v24};
use tty_protocol::{DeviceFlags, DriverEvent};
use tty_runtime::{tty_debug, tty_error, ReaperSender};

pub struct DeviceBridge {
    dev: Weak<Device>,
    reaper: ReaperSender,
}

impl DeviceBridge {
    pub(crate) fn new(dev: &Arc<Device>, reaper: ReaperSender) -> Self {
        Self {
            dev: Arc::downgrade(dev),
            reaper,
        }
    }

    /// Claim the device's link callbacks and seed its modem status
    pub(crate) fn install(dev: &Arc<Device>, reaper: ReaperSender) {
        let bridge = Arc::new(Self::new(dev, reaper));
        if let Some(previous) = dev.link().set_listener(dev.token(), bridge) {
            tty_debug!("{}: took link over from owner {}", dev.name(), previous.raw());
        }
        dev.set_modem_status(from_v24(dev.link().remote_v24()));
    }

    /// Take over a connected link. Frames its previous receiver had queued
    /// land in the device's pending queue ahead of anything arriving later.
    pub(crate) fn adopt(dev: &Arc<Device>, reaper: ReaperSender) {
        let bridge = Arc::new(Self::new(dev, reaper));
        if let Some(previous) = dev.link().adopt(dev.token(), bridge) {
            tty_debug!("{}: adopted link from owner {}", dev.name(), previous.raw());
        }
    }
}

impl LinkListener for DeviceBridge {
    fn data_ready(&self, data: Vec<u8>) {
        let Some(dev) = self.dev.upgrade() else {
            return;
        };

        let mut inner = dev.inner.lock();
        match inner.consumer.clone() {
            // Earlier frames still waiting keep their place in line
            Some(consumer) if inner.pending.is_empty() => {
                consumer.receive(&data);
                consumer.push();
            }
            _ => inner.pending.push_back(data),
        }
    }

    fn state_change(&self, state: LinkState, err: i32) {
        let Some(dev) = self.dev.upgrade() else {
            return;
        };

        dev.set_last_error(err);
        dev.state_changed.notify_waiters();

        if state != LinkState::Closed {
            return;
        }

        match dev.consumer() {
            Some(consumer) => {
                tty_debug!("{}: link closed ({}), hanging up consumer", dev.name(), err);
                // The last detach finishes what the consumer's hangup started
                dev.set_flag(DeviceFlags::HUNG_UP);
                consumer.hangup();
                dev.events().emit(DriverEvent::Hangup { id: dev.id() });
            }
            None => {
                let flags = dev.flags();
                if flags.contains(DeviceFlags::ATTACHED)
                    || !flags.contains(DeviceFlags::RELEASE_ON_HANGUP)
                {
                    return;
                }
                if let Err(message) = self.reaper.request_release(dev.id(), dev.token()) {
                    tty_error!("{}: {}", dev.name(), message);
                    dev.events().emit(DriverEvent::Error {
                        id: Some(dev.id()),
                        message,
                    });
                }
            }
        }
    }

    fn modem_status(&self, v24: u8) {
        let Some(dev) = self.dev.upgrade() else {
            return;
        };

        let hangup = {
            let mut inner = dev.inner.lock();
            let lost = carrier_lost(inner.modem_status, v24);
            inner.modem_status = from_v24(v24);
            match &inner.consumer {
                Some(consumer) if lost && !consumer.ignores_modem_lines() => {
                    Some(consumer.clone())
                }
                _ => None,
            }
        };

        if let Some(consumer) = hangup {
            tty_debug!("{}: carrier lost", dev.name());
            dev.set_flag(DeviceFlags::HUNG_UP);
            consumer.hangup();
            dev.events().emit(DriverEvent::Hangup { id: dev.id() });
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::device::DeviceParams;
    use futures::stream::StreamExt;
    use rfcomm_core::{v24, BdAddr};
    use rfcomm_sim::{CaptureConsumer, MemoryLink, NodeTable};
    use tty_protocol::modem::{TIOCM_CD, TIOCM_DSR, TIOCM_DTR};
    use tty_runtime::{ActorHandles, ChannelManager, ReaperMessage};

    struct Fixture {
        dev: Arc<Device>,
        link: Arc<MemoryLink>,
        handles: ActorHandles,
    }

    fn fixture(flags: DeviceFlags, link: MemoryLink) -> Fixture {
        let (manager, handles) = ChannelManager::new(64);
        let link = Arc::new(link);
        let dev = Arc::new(Device::new(
            1,
            DeviceParams {
                flags,
                src: BdAddr::ANY,
                dst: BdAddr([1, 2, 3, 4, 5, 6]),
                channel: 2,
                link: link.clone(),
                nodes: Arc::new(NodeTable::new()),
                events: manager.event_sink(),
            },
        ));
        DeviceBridge::install(&dev, manager.reaper_sender());
        Fixture { dev, link, handles }
    }

    #[test]
    fn test_install_claims_link_and_reads_signals() {
        let link = MemoryLink::connected();
        link.set_remote_v24(v24::RTC | v24::DV);
        let f = fixture(DeviceFlags::empty(), link);

        assert_eq!(f.link.owner(), Some(f.dev.token()));
        assert_eq!(f.dev.modem_status(), TIOCM_DSR | TIOCM_DTR | TIOCM_CD);
    }

    #[test]
    fn test_data_without_consumer_is_queued() {
        let f = fixture(DeviceFlags::empty(), MemoryLink::connected());
        f.link.deliver(b"one");
        f.link.deliver(b"two");
        assert_eq!(f.dev.pending_len(), 2);
    }

    #[test]
    fn test_data_with_consumer_is_delivered() {
        let f = fixture(DeviceFlags::empty(), MemoryLink::connected());
        let consumer = Arc::new(CaptureConsumer::new());
        f.dev.bind_consumer(consumer.clone());

        f.link.deliver(b"hello");
        assert_eq!(consumer.received(), b"hello".to_vec());
        assert_eq!(consumer.pushes(), 1);
        assert_eq!(f.dev.pending_len(), 0);
    }

    #[test]
    fn test_data_waits_behind_pending_frames() {
        let f = fixture(DeviceFlags::empty(), MemoryLink::connected());
        f.dev.queue_pending(vec![b"old".to_vec()]);
        let consumer = Arc::new(CaptureConsumer::new());
        f.dev.bind_consumer(consumer.clone());

        f.link.deliver(b"new");
        assert!(consumer.chunks().is_empty());

        f.dev.drain_pending();
        assert_eq!(consumer.chunks(), vec![b"old".to_vec(), b"new".to_vec()]);
    }

    #[test]
    fn test_close_hangs_up_attached_consumer() {
        let f = fixture(DeviceFlags::RELEASE_ON_HANGUP, MemoryLink::connected());
        let consumer = Arc::new(CaptureConsumer::new());
        f.dev.bind_consumer(consumer.clone());
        f.dev.set_flag(DeviceFlags::ATTACHED);

        f.link.remote_hangup(104);
        assert_eq!(consumer.hangups(), 1);
        assert_eq!(f.dev.last_error(), 104);
        assert!(f.dev.has_flag(DeviceFlags::HUNG_UP));
    }

    #[tokio::test]
    async fn test_close_unattached_requests_release() {
        let mut f = fixture(DeviceFlags::RELEASE_ON_HANGUP, MemoryLink::connected());
        f.link.remote_hangup(0);

        let msg = f.handles.reaper_rx.next().await.unwrap();
        assert_eq!(
            msg,
            ReaperMessage::Release {
                id: 1,
                owner: f.dev.token()
            }
        );
    }

    #[test]
    fn test_close_without_release_on_hangup_is_ignored() {
        let mut f = fixture(DeviceFlags::empty(), MemoryLink::connected());
        f.link.remote_hangup(0);
        assert!(f.handles.reaper_rx.try_next().is_err());
    }

    #[test]
    fn test_close_mid_detach_is_ignored() {
        let mut f = fixture(DeviceFlags::RELEASE_ON_HANGUP, MemoryLink::connected());
        // Consumer already unbound, ATTACHED not yet cleared
        f.dev.set_flag(DeviceFlags::ATTACHED);
        f.link.remote_hangup(0);
        assert!(f.handles.reaper_rx.try_next().is_err());
    }

    #[test]
    fn test_carrier_loss_hangs_up() {
        let link = MemoryLink::connected();
        link.set_remote_v24(v24::DV);
        let f = fixture(DeviceFlags::empty(), link);
        let consumer = Arc::new(CaptureConsumer::new());
        f.dev.bind_consumer(consumer.clone());

        f.link.set_remote_v24(v24::RTC);
        assert_eq!(consumer.hangups(), 1);
        assert!(f.dev.has_flag(DeviceFlags::HUNG_UP));
        assert_eq!(f.dev.modem_status(), TIOCM_DSR | TIOCM_DTR);
    }

    #[test]
    fn test_carrier_loss_ignored_by_clocal_consumer() {
        let link = MemoryLink::connected();
        link.set_remote_v24(v24::DV);
        let f = fixture(DeviceFlags::empty(), link);
        let consumer = Arc::new(CaptureConsumer::clocal());
        f.dev.bind_consumer(consumer.clone());

        f.link.set_remote_v24(0);
        assert_eq!(consumer.hangups(), 0);
        assert_eq!(f.dev.modem_status(), 0);
    }

    #[test]
    fn test_callbacks_after_teardown_are_dropped() {
        let link = Arc::new(MemoryLink::connected());
        let (manager, _handles) = ChannelManager::new(4);
        let dev = Arc::new(Device::new(
            0,
            DeviceParams {
                flags: DeviceFlags::empty(),
                src: BdAddr::ANY,
                dst: BdAddr::ANY,
                channel: 1,
                link: link.clone(),
                nodes: Arc::new(NodeTable::new()),
                events: manager.event_sink(),
            },
        ));
        let bridge = DeviceBridge::new(&dev, manager.reaper_sender());
        drop(dev);

        bridge.data_ready(b"late".to_vec());
        bridge.state_change(LinkState::Closed, 0);
        bridge.modem_status(0);
    }
}
