use heapless::Deque;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use super::packet::RxPacket;

/// Packets a gateway can hold before the oldest is dropped
pub const UPLINK_BUFFER_CAPACITY: usize = 64;

/// Bounded, non-blocking queue of packets heard by one gateway
///
/// Pushing never waits: when the queue is full the oldest packet is
/// discarded. The owning gateway task is woken through [`Notify`].
#[derive(Debug, Default)]
pub struct UplinkBuffer {
    queue: Mutex<Deque<RxPacket, UPLINK_BUFFER_CAPACITY>>,
    notify: Notify,
}

impl UplinkBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet, evicting the oldest one if full
    pub fn push(&self, packet: RxPacket) {
        {
            let mut queue = self.queue.lock();
            if queue.is_full() {
                queue.pop_front();
                warn!("uplink buffer full, dropping oldest packet");
            }
            // cannot fail, a slot was freed above
            let _ = queue.push_back(packet);
        }
        self.notify.notify_one();
    }

    /// Take every queued packet in arrival order
    pub fn drain(&self) -> Vec<RxPacket> {
        let mut queue = self.queue.lock();
        let mut out = Vec::with_capacity(queue.len());
        while let Some(p) = queue.pop_front() {
            out.push(p);
        }
        out
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether no packet is queued
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Wait until a packet is pushed
    ///
    /// A push that happened while nobody was waiting completes the next call
    /// immediately.
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::packet::Datr;

    fn packet(tmst: u32) -> RxPacket {
        RxPacket {
            time: None,
            tmst,
            chan: 0,
            rfch: 0,
            freq: 868.1,
            stat: 1,
            modu: "LORA".into(),
            datr: Datr::Lora("SF7BW125".into()),
            codr: Some("4/5".into()),
            rssi: -60,
            lsnr: Some(7.0),
            size: 0,
            data: String::new(),
        }
    }

    #[test]
    fn full_buffer_drops_oldest() {
        let buffer = UplinkBuffer::new();
        for i in 0..(UPLINK_BUFFER_CAPACITY as u32 + 2) {
            buffer.push(packet(i));
        }
        let drained = buffer.drain();
        assert_eq!(drained.len(), UPLINK_BUFFER_CAPACITY);
        assert_eq!(drained[0].tmst, 2);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn push_before_wait_is_not_lost() {
        let buffer = UplinkBuffer::new();
        buffer.push(packet(1));
        tokio::time::timeout(std::time::Duration::from_millis(100), buffer.notified())
            .await
            .unwrap();
        assert_eq!(buffer.len(), 1);
    }
}
