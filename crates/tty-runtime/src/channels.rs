use futures_channel::mpsc;
use parking_lot::Mutex;
use rfcomm_core::OwnerToken;
use std::sync::Arc;
use tty_protocol::DriverEvent;

/// Requests handled by the hangup reaper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaperMessage {
    /// The link of device `id` closed with nobody attached and the device
    /// asked to be released on hangup. `owner` identifies the device that
    /// saw the hangup, so a later device reusing the id is left alone.
    Release { id: u16, owner: OwnerToken },
}

/// Sending half of the reaper inbox, usable from synchronous callbacks.
///
/// The inbox is unbounded: a device asks for its release at most once per
/// hangup, and a dropped request would leave it registered forever.
#[derive(Clone)]
pub struct ReaperSender {
    tx: mpsc::UnboundedSender<ReaperMessage>,
}

impl ReaperSender {
    /// Queue a release request without blocking
    pub fn request_release(&self, id: u16, owner: OwnerToken) -> Result<(), String> {
        self.tx
            .unbounded_send(ReaperMessage::Release { id, owner })
            .map_err(|_| {
                format!(
                    "Hangup reaper stopped: release of device {} dropped. Release it manually.",
                    id
                )
            })
    }
}

/// Non-blocking publisher for [`DriverEvent`]s.
///
/// Events are best-effort: when the queue is full or nobody listens, they
/// are dropped rather than stalling the caller.
#[derive(Clone)]
pub struct EventSink {
    tx: Arc<Mutex<mpsc::Sender<DriverEvent>>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<DriverEvent>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(tx)),
        }
    }

    pub fn emit(&self, event: DriverEvent) {
        let result = self.tx.lock().try_send(event);
        if let Err(e) = result {
            if e.is_full() {
                crate::tty_debug!("Event queue full, dropping {:?}", e.into_inner());
            }
        }
    }
}

/// Handles for spawning actors
pub struct ActorHandles {
    pub reaper_rx: mpsc::UnboundedReceiver<ReaperMessage>,
    pub events: EventSink,
}

/// Channel manager for driver communication
///
/// Owns the reaper inbox sender and the event stream, handing out clones to
/// devices and bridges.
pub struct ChannelManager {
    reaper_tx: ReaperSender,
    events: EventSink,

    // Taken once by whoever observes the driver
    event_rx: Option<mpsc::Receiver<DriverEvent>>,
}

impl ChannelManager {
    /// Create a new channel manager and actor handles
    ///
    /// Returns (ChannelManager for the driver, ActorHandles for spawning the reaper)
    pub fn new(event_capacity: usize) -> (Self, ActorHandles) {
        let (reaper_tx, reaper_rx) = mpsc::unbounded();
        let (event_tx, event_rx) = mpsc::channel(event_capacity);

        let events = EventSink::new(event_tx);

        let handles = ActorHandles {
            reaper_rx,
            events: events.clone(),
        };

        let manager = Self {
            reaper_tx: ReaperSender { tx: reaper_tx },
            events,
            event_rx: Some(event_rx),
        };

        (manager, handles)
    }

    pub fn reaper_sender(&self) -> ReaperSender {
        self.reaper_tx.clone()
    }

    pub fn event_sink(&self) -> EventSink {
        self.events.clone()
    }

    /// Take ownership of the event receiver.
    ///
    /// Returns `None` once it has been taken.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<DriverEvent>> {
        self.event_rx.take()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use futures::stream::StreamExt;

    #[tokio::test]
    async fn test_release_request_reaches_reaper() {
        let (manager, mut handles) = ChannelManager::new(4);
        let owner = OwnerToken::next();

        manager.reaper_sender().request_release(3, owner).unwrap();

        let msg = handles.reaper_rx.next().await.unwrap();
        assert_eq!(msg, ReaperMessage::Release { id: 3, owner });
    }

    #[tokio::test]
    async fn test_hangup_burst_keeps_every_request() {
        let (manager, mut handles) = ChannelManager::new(4);
        let sender = manager.reaper_sender();
        let owner = OwnerToken::next();

        for id in 0..1000u16 {
            sender.clone().request_release(id, owner).unwrap();
        }
        drop(sender);
        drop(manager);

        let ids: Vec<u16> = handles
            .reaper_rx
            .map(|ReaperMessage::Release { id, .. }| id)
            .collect()
            .await;
        assert_eq!(ids, (0..1000).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stopped_reaper_reports_error() {
        let (manager, handles) = ChannelManager::new(4);
        drop(handles);

        let err = manager
            .reaper_sender()
            .request_release(1, OwnerToken::next())
            .unwrap_err();
        assert!(err.contains("reaper stopped"));
    }

    #[tokio::test]
    async fn test_event_receiver() {
        let (mut manager, handles) = ChannelManager::new(4);
        let mut rx = manager.take_event_receiver().unwrap();
        assert!(manager.take_event_receiver().is_none());

        handles.events.emit(DriverEvent::DeviceCreated {
            id: 0,
            flags: Default::default(),
        });

        let event = rx.next().await.unwrap();
        match event {
            DriverEvent::DeviceCreated { id, .. } => assert_eq!(id, 0),
            _ => panic!("Wrong event type"),
        }
    }

    #[tokio::test]
    async fn test_emit_without_listener_is_silent() {
        let (mut manager, _handles) = ChannelManager::new(1);
        drop(manager.take_event_receiver());
        let sink = manager.event_sink();
        for id in 0..8 {
            sink.emit(DriverEvent::DeviceDestroyed { id });
        }
    }
}
