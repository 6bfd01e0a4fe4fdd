use crate::registry::Registry;
use std::sync::Weak;
use tty_protocol::TtyError;
use tty_runtime::{tty_debug, Actor, ReaperMessage};

/// HangupReaper releases devices whose link hung up with nobody attached
///
/// Link callbacks cannot take the registry lock, so the bridge posts a
/// [`ReaperMessage`] and the reaper does the release from its own task. A
/// request is ignored when the device it names is gone, already released,
/// or was replaced by a new device under the same id.
pub struct HangupReaper {
    registry: Weak<Registry>,
}

impl HangupReaper {
    pub fn new(registry: Weak<Registry>) -> Self {
        Self { registry }
    }
}

impl Actor for HangupReaper {
    type Message = ReaperMessage;

    fn name(&self) -> &'static str {
        "HangupReaper"
    }

    async fn handle(&mut self, msg: Self::Message) -> Result<(), TtyError> {
        match msg {
            ReaperMessage::Release { id, owner } => {
                let Some(registry) = self.registry.upgrade() else {
                    return Ok(());
                };
                if registry.release_matching(id, owner) {
                    tty_debug!("rfcomm{}: released after hangup", id);
                } else {
                    tty_debug!("rfcomm{}: stale hangup release ignored", id);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceParams};
    use rfcomm_core::{BdAddr, OwnerToken};
    use rfcomm_sim::{MemoryLink, NodeTable};
    use std::sync::Arc;
    use tty_protocol::DeviceFlags;
    use tty_runtime::ChannelManager;

    fn registry_with_device() -> (Arc<Registry>, Arc<Device>) {
        let (manager, _handles) = ChannelManager::new(64);
        let events = manager.event_sink();
        let registry = Arc::new(Registry::new(8, events.clone()));
        let dev = registry
            .insert_with(None, |id| {
                Arc::new(Device::new(
                    id,
                    DeviceParams {
                        flags: DeviceFlags::RELEASE_ON_HANGUP,
                        src: BdAddr::ANY,
                        dst: BdAddr::ANY,
                        channel: 1,
                        link: Arc::new(MemoryLink::new()),
                        nodes: Arc::new(NodeTable::new()),
                        events: events.clone(),
                    },
                ))
            })
            .unwrap();
        (registry, dev)
    }

    #[tokio::test]
    async fn test_release_matching_owner() {
        let (registry, dev) = registry_with_device();
        let mut reaper = HangupReaper::new(Arc::downgrade(&registry));

        reaper
            .handle(ReaperMessage::Release {
                id: 0,
                owner: dev.token(),
            })
            .await
            .unwrap();

        assert!(dev.is_released());
        assert!(!dev.is_listed());
    }

    #[tokio::test]
    async fn test_stale_owner_is_ignored() {
        let (registry, dev) = registry_with_device();
        let mut reaper = HangupReaper::new(Arc::downgrade(&registry));

        reaper
            .handle(ReaperMessage::Release {
                id: 0,
                owner: OwnerToken::next(),
            })
            .await
            .unwrap();

        assert!(!dev.is_released());
        assert!(registry.lookup(0).is_some());
    }

    #[tokio::test]
    async fn test_gone_registry_is_ignored() {
        let (registry, dev) = registry_with_device();
        let mut reaper = HangupReaper::new(Arc::downgrade(&registry));
        let owner = dev.token();
        drop(registry);

        assert!(reaper
            .handle(ReaperMessage::Release { id: 0, owner })
            .await
            .is_ok());
    }
}
