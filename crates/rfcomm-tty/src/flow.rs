//! Transmit flow control
//!
//! Each device charges the buffers it hands to its link against a budget of
//! `mtu × credits` bytes. A buffer is charged its payload plus the framing
//! reserve and returns the charge when the link drops it, which also wakes
//! the attached consumer so a stalled writer can retry.

use crate::constants::flow::{MIN_CREDITS, TX_RESERVE};
use crate::device::Device;
use rfcomm_core::{TxBuffer, TxOwner};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tty_protocol::{DeviceFlags, TtyError};

impl Device {
    /// Bytes the link may hold for this device right now
    pub fn tx_capacity(&self) -> usize {
        let credits = self.link().tx_credits().max(MIN_CREDITS);
        self.link().mtu().saturating_mul(credits as usize)
    }

    /// Charge a transmit buffer for `payload` bytes.
    ///
    /// Granted only while the outstanding charge is below capacity; the
    /// grant itself may then overshoot by up to one buffer.
    pub fn try_allocate(self: &Arc<Self>, payload: usize) -> Option<TxBuffer> {
        let capacity = self.tx_capacity();
        let truesize = payload + TX_RESERVE;
        self.wmem_alloc
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |outstanding| {
                (outstanding < capacity).then(|| outstanding + truesize)
            })
            .ok()?;

        let owner: Arc<dyn TxOwner> = self.clone();
        Some(TxBuffer::charged(payload, truesize, owner))
    }

    /// Free transmit budget, zero when overcommitted
    pub fn write_room(&self) -> usize {
        self.tx_capacity().saturating_sub(self.outstanding_tx())
    }

    /// Split `data` into MTU-sized frames and queue them on the link.
    ///
    /// Stops at the first frame that cannot be charged or sent. Returns the
    /// bytes queued, or the send error if nothing was queued.
    pub fn write(self: &Arc<Self>, data: &[u8]) -> Result<usize, TtyError> {
        let mtu = self.link().mtu().max(1);
        let mut sent = 0;

        for chunk in data.chunks(mtu) {
            let Some(mut buf) = self.try_allocate(chunk.len()) else {
                break;
            };
            buf.put(chunk);

            if let Err(e) = self.link().send(buf) {
                if sent == 0 {
                    return Err(TtyError::Send(e));
                }
                break;
            }
            sent += chunk.len();
        }

        Ok(sent)
    }

    /// One MTU while the link still has frames queued, otherwise zero
    pub fn chars_in_buffer(&self) -> usize {
        if self.link().tx_queue_len() > 0 {
            self.link().mtu()
        } else {
            0
        }
    }

    /// Discard queued transmit frames and wake the consumer
    pub fn flush_buffer(&self) {
        self.link().purge_tx_queue();
        if let Some(consumer) = self.consumer() {
            consumer.wakeup();
        }
    }
}

impl TxOwner for Device {
    fn release(&self, truesize: usize) {
        self.wmem_alloc.fetch_sub(truesize, Ordering::SeqCst);
        if self.has_flag(DeviceFlags::ATTACHED) {
            if let Some(consumer) = self.consumer() {
                consumer.wakeup();
            }
        }
    }
}
