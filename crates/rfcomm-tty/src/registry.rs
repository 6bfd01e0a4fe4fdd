//! Device registry
//!
//! Maps ids to live devices. A device leaves the registry in two steps:
//! [`Registry::begin_release`] marks it released, which hides it from lookups,
//! and it is unlisted as soon as no consumer is attached. The id stays
//! reserved until the device is actually torn down, so a new device never
//! shares an id with one that is still dying.
//!
//! Lock order is registry, then a device's port lock, then the link.

use crate::device::Device;
use parking_lot::Mutex;
use rfcomm_core::OwnerToken;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tty_protocol::{DeviceFlags, DeviceInfo, DriverEvent, TtyError};
use tty_runtime::{tty_debug, tty_info, EventSink};

enum Slot {
    Live(Arc<Device>),
    /// Unlisted, waiting for its last reference to go
    Retiring(Arc<AtomicBool>),
}

pub struct Registry {
    slots: Mutex<BTreeMap<u16, Slot>>,
    max_devices: u16,
    events: EventSink,
}

impl Registry {
    pub fn new(max_devices: u16, events: EventSink) -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
            max_devices,
            events,
        }
    }

    pub fn max_devices(&self) -> u16 {
        self.max_devices
    }

    /// Live device with `id`, unless it has been released
    pub fn lookup(&self, id: u16) -> Option<Arc<Device>> {
        match self.slots.lock().get(&id) {
            Some(Slot::Live(dev)) if !dev.is_released() => Some(dev.clone()),
            _ => None,
        }
    }

    /// Pick an id and publish the device `build` makes for it.
    ///
    /// `build` runs under the registry lock so the id cannot be taken
    /// meanwhile.
    pub(crate) fn insert_with<F>(&self, requested: Option<u16>, build: F) -> Result<Arc<Device>, TtyError>
    where
        F: FnOnce(u16) -> Arc<Device>,
    {
        let mut slots = self.slots.lock();
        slots.retain(|_, slot| match slot {
            Slot::Live(_) => true,
            Slot::Retiring(destroyed) => !destroyed.load(Ordering::SeqCst),
        });

        let id = match requested {
            Some(id) if id >= self.max_devices => {
                return Err(TtyError::OutOfRange {
                    id: u32::from(id),
                    max: self.max_devices,
                });
            }
            Some(id) if slots.contains_key(&id) => return Err(TtyError::AddressInUse(id)),
            Some(id) => id,
            None => (0..self.max_devices)
                .find(|id| !slots.contains_key(id))
                .ok_or(TtyError::OutOfRange {
                    id: u32::from(self.max_devices),
                    max: self.max_devices,
                })?,
        };

        let dev = build(id);
        dev.set_listed(true);
        slots.insert(id, Slot::Live(dev.clone()));
        tty_debug!("{}: listed", dev.name());
        Ok(dev)
    }

    /// Mark `dev` released and unlist it if nobody is attached.
    ///
    /// Must be called at most once per device.
    pub fn begin_release(&self, dev: &Arc<Device>) {
        let removed = {
            let mut slots = self.slots.lock();
            self.begin_release_locked(&mut slots, dev)
        };
        drop(removed);
    }

    /// Release `dev` if it is still the listed, unreleased device for its
    /// id. Returns whether this call did the release.
    pub fn release_if_listed(&self, dev: &Arc<Device>) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            match slots.get(&dev.id()) {
                Some(Slot::Live(listed)) if Arc::ptr_eq(listed, dev) && !dev.is_released() => {}
                _ => return false,
            }
            self.begin_release_locked(&mut slots, dev)
        };
        drop(removed);
        true
    }

    /// Release the device listed under `id` if it is the one owning `owner`
    pub fn release_matching(&self, id: u16, owner: OwnerToken) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            let dev = match slots.get(&id) {
                Some(Slot::Live(dev)) if dev.token() == owner && !dev.is_released() => dev.clone(),
                _ => return false,
            };
            self.begin_release_locked(&mut slots, &dev)
        };
        drop(removed);
        true
    }

    /// Unlist a released device whose last consumer just detached
    pub(crate) fn finish_release(&self, dev: &Arc<Device>) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            self.unlist_locked(&mut slots, dev)
        };
        removed.is_some()
    }

    /// Unlist a device that never finished creation. No release event.
    pub(crate) fn discard(&self, dev: &Arc<Device>) {
        let removed = {
            let mut slots = self.slots.lock();
            match slots.get(&dev.id()) {
                Some(Slot::Live(listed)) if Arc::ptr_eq(listed, dev) => {
                    dev.set_listed(false);
                    slots.insert(dev.id(), Slot::Retiring(dev.destroyed_flag()))
                }
                _ => None,
            }
        };
        drop(removed);
    }

    fn begin_release_locked(
        &self,
        slots: &mut BTreeMap<u16, Slot>,
        dev: &Arc<Device>,
    ) -> Option<Arc<Device>> {
        let before = dev.set_flag(DeviceFlags::RELEASED);
        assert!(
            !before.contains(DeviceFlags::RELEASED),
            "{}: released twice",
            dev.name()
        );

        if dev.open_count() > 0 {
            tty_debug!("{}: release deferred until last detach", dev.name());
            return None;
        }
        self.unlist_locked(slots, dev)
    }

    /// Swap the live slot for a retiring one. The removed reference is
    /// returned so callers drop it after unlocking.
    fn unlist_locked(&self, slots: &mut BTreeMap<u16, Slot>, dev: &Arc<Device>) -> Option<Arc<Device>> {
        match slots.get(&dev.id()) {
            Some(Slot::Live(listed)) if Arc::ptr_eq(listed, dev) => {}
            _ => return None,
        }

        dev.set_listed(false);
        tty_info!("{}: released", dev.name());
        self.events.emit(DriverEvent::DeviceReleased { id: dev.id() });

        match slots.insert(dev.id(), Slot::Retiring(dev.destroyed_flag())) {
            Some(Slot::Live(removed)) => Some(removed),
            _ => None,
        }
    }

    /// Up to `max` unreleased devices in id order
    pub fn snapshot(&self, max: usize) -> Vec<DeviceInfo> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(dev) if !dev.is_released() => Some(dev.info()),
                _ => None,
            })
            .take(max)
            .collect()
    }

    /// Number of listed devices, released or not
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let slots = std::mem::take(self.slots.get_mut());
        for slot in slots.into_values() {
            if let Slot::Live(dev) = slot {
                dev.set_listed(false);
            }
        }
    }
}
