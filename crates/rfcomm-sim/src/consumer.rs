use parking_lot::Mutex;
use rfcomm_core::PortConsumer;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Port consumer that records what the port tells it
#[derive(Default)]
pub struct CaptureConsumer {
    chunks: Mutex<Vec<Vec<u8>>>,
    pushes: AtomicUsize,
    wakeups: AtomicUsize,
    hangups: AtomicUsize,
    clocal: AtomicBool,
}

impl CaptureConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumer that ignores modem control lines
    pub fn clocal() -> Self {
        let consumer = Self::default();
        consumer.clocal.store(true, Ordering::SeqCst);
        consumer
    }

    pub fn set_clocal(&self, clocal: bool) {
        self.clocal.store(clocal, Ordering::SeqCst);
    }

    /// Every chunk received, in order
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().clone()
    }

    /// All received bytes concatenated
    pub fn received(&self) -> Vec<u8> {
        self.chunks.lock().concat()
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn wakeups(&self) -> usize {
        self.wakeups.load(Ordering::SeqCst)
    }

    pub fn hangups(&self) -> usize {
        self.hangups.load(Ordering::SeqCst)
    }
}

impl PortConsumer for CaptureConsumer {
    fn receive(&self, data: &[u8]) -> usize {
        self.chunks.lock().push(data.to_vec());
        data.len()
    }

    fn push(&self) {
        self.pushes.fetch_add(1, Ordering::SeqCst);
    }

    fn wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::SeqCst);
    }

    fn hangup(&self) {
        self.hangups.fetch_add(1, Ordering::SeqCst);
    }

    fn ignores_modem_lines(&self) -> bool {
        self.clocal.load(Ordering::SeqCst)
    }
}
