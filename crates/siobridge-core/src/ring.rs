//! Lock-free single-producer single-consumer packet rings
//!
//! The request ring is filled from interrupt context and drained by the
//! dispatch loop; the response ring flows the other way. Each ring cursor
//! is written by exactly one context: the producer advances `write`, the
//! consumer advances `read`. Slot contents are made visible before the
//! index that publishes them (`Release` store, `Acquire` load), so no
//! mutex is needed under that discipline.
//!
//! Capacity is a power of two fixed at build time; cursors wrap with a
//! mask. The ring is empty when the cursors are equal and full when
//! advancing `write` would reach `read`, so it never overwrites an unread
//! slot - a saturated ring reports back-pressure through a failed enqueue.

use crate::protocol::Packet;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

/// Fixed-capacity SPSC ring of packet slots
///
/// `Sync` under the SPSC contract: at most one context enqueues and at
/// most one context dequeues at any time. [`PacketRing::reset`] is the
/// one exception and requires both sides to be quiescent.
pub struct PacketRing<const N: usize> {
    slots: [UnsafeCell<Packet>; N],
    write: AtomicU8,
    read: AtomicU8,
}

// SAFETY: slot access is serialized by the cursor protocol described above;
// a slot is only written while unpublished and only read after publication.
unsafe impl<const N: usize> Sync for PacketRing<N> {}

impl<const N: usize> PacketRing<N> {
    const CAPACITY_OK: () = assert!(N.is_power_of_two() && N <= 128);
    const MASK: u8 = (N - 1) as u8;

    /// Create an empty ring
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_OK;
        Self {
            slots: [const { UnsafeCell::new(Packet::zeroed()) }; N],
            write: AtomicU8::new(0),
            read: AtomicU8::new(0),
        }
    }

    /// Copy a packet into the next free slot (producer side)
    ///
    /// Returns false without mutating anything when the ring is full; the
    /// caller must treat that as back-pressure, not data loss.
    pub fn try_enqueue(&self, packet: &Packet) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let next = write.wrapping_add(1) & Self::MASK;
        if next == self.read.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: this slot is not published, so the consumer will not
        // touch it until the Release store below.
        unsafe {
            *self.slots[write as usize].get() = *packet;
        }
        self.write.store(next, Ordering::Release);
        true
    }

    /// Move the oldest packet out of the ring (consumer side)
    pub fn try_dequeue(&self) -> Option<Packet> {
        let read = self.read.load(Ordering::Relaxed);
        if read == self.write.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the Acquire load above synchronizes with the producer's
        // Release store, so the slot contents are fully visible.
        let packet = unsafe { *self.slots[read as usize].get() };
        self.read.store(read.wrapping_add(1) & Self::MASK, Ordering::Release);
        Some(packet)
    }

    /// True when no packets are queued
    pub fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    /// True when another enqueue would fail
    pub fn is_full(&self) -> bool {
        let write = self.write.load(Ordering::Acquire);
        (write.wrapping_add(1) & Self::MASK) == self.read.load(Ordering::Acquire)
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        (write.wrapping_sub(read) & Self::MASK) as usize
    }

    /// Reset both cursors to zero, discarding queued packets
    ///
    /// Only valid while neither context is operating on the ring (the
    /// bridge calls this on the disconnected edge, when the transport has
    /// stopped delivering).
    pub fn reset(&self) {
        self.read.store(0, Ordering::Release);
        self.write.store(0, Ordering::Release);
    }
}

impl<const N: usize> Default for PacketRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PACKET_SIZE;

    fn packet(tag: u8) -> Packet {
        let mut pkt = Packet::zeroed();
        pkt.0[0] = tag;
        pkt
    }

    #[test]
    fn fifo_order() {
        let ring: PacketRing<4> = PacketRing::new();
        assert!(ring.try_enqueue(&packet(1)));
        assert!(ring.try_enqueue(&packet(2)));
        assert!(ring.try_enqueue(&packet(3)));
        assert_eq!(ring.try_dequeue().unwrap().0[0], 1);
        assert_eq!(ring.try_dequeue().unwrap().0[0], 2);
        assert_eq!(ring.try_dequeue().unwrap().0[0], 3);
        assert!(ring.try_dequeue().is_none());
    }

    #[test]
    fn enqueue_fails_only_when_full() {
        let ring: PacketRing<4> = PacketRing::new();
        // One slot is sacrificed to distinguish full from empty.
        assert!(ring.try_enqueue(&packet(1)));
        assert!(ring.try_enqueue(&packet(2)));
        assert!(ring.try_enqueue(&packet(3)));
        assert!(ring.is_full());
        assert!(!ring.try_enqueue(&packet(4)));
        assert_eq!(ring.len(), 3);
        // Freeing one slot makes enqueue succeed again.
        assert_eq!(ring.try_dequeue().unwrap().0[0], 1);
        assert!(ring.try_enqueue(&packet(4)));
        assert!(!ring.try_enqueue(&packet(5)));
    }

    #[test]
    fn full_enqueue_leaves_contents_intact() {
        let ring: PacketRing<2> = PacketRing::new();
        assert!(ring.try_enqueue(&packet(0xAA)));
        assert!(!ring.try_enqueue(&packet(0xBB)));
        assert_eq!(ring.try_dequeue().unwrap().0[0], 0xAA);
    }

    #[test]
    fn wraparound_preserves_fifo() {
        let ring: PacketRing<4> = PacketRing::new();
        let mut next = 0u8;
        let mut expect = 0u8;
        for _ in 0..20 {
            while ring.try_enqueue(&packet(next)) {
                next = next.wrapping_add(1);
            }
            while let Some(pkt) = ring.try_dequeue() {
                assert_eq!(pkt.0[0], expect);
                expect = expect.wrapping_add(1);
            }
        }
        assert!(expect > 16, "ring should have cycled past its capacity");
    }

    #[test]
    fn dequeued_contents_match_enqueued() {
        let ring: PacketRing<4> = PacketRing::new();
        let mut pkt = Packet::zeroed();
        for (i, byte) in pkt.0.iter_mut().enumerate() {
            *byte = i as u8;
        }
        assert!(ring.try_enqueue(&pkt));
        let out = ring.try_dequeue().unwrap();
        assert_eq!(&out.0[..], &pkt.0[..]);
        assert_eq!(out.0.len(), PACKET_SIZE);
    }

    #[test]
    fn reset_discards_queued_packets() {
        let ring: PacketRing<4> = PacketRing::new();
        ring.try_enqueue(&packet(1));
        ring.try_enqueue(&packet(2));
        ring.reset();
        assert!(ring.is_empty());
        assert!(ring.try_dequeue().is_none());
        assert!(ring.try_enqueue(&packet(3)));
        assert_eq!(ring.try_dequeue().unwrap().0[0], 3);
    }

    #[test]
    fn concurrent_producer_consumer() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        static RING: PacketRing<4> = PacketRing::new();
        static DONE: AtomicBool = AtomicBool::new(false);

        const COUNT: u32 = 10_000;

        let producer = thread::spawn(|| {
            let mut n = 0u32;
            while n < COUNT {
                let mut pkt = Packet::zeroed();
                pkt.0[..4].copy_from_slice(&n.to_le_bytes());
                if RING.try_enqueue(&pkt) {
                    n += 1;
                } else {
                    thread::yield_now();
                }
            }
            DONE.store(true, Ordering::Release);
        });

        let mut expect = 0u32;
        while expect < COUNT {
            match RING.try_dequeue() {
                Some(pkt) => {
                    let mut bytes = [0u8; 4];
                    bytes.copy_from_slice(&pkt.0[..4]);
                    assert_eq!(u32::from_le_bytes(bytes), expect);
                    expect += 1;
                }
                None => {
                    if DONE.load(Ordering::Acquire) && RING.is_empty() && expect < COUNT {
                        thread::yield_now();
                    }
                }
            }
        }
        producer.join().unwrap();
    }
}
