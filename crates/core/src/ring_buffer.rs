//! Lock-free single-producer/single-consumer ring buffer for mono samples.
//!
//! Bridges the capture callback (writer) and the playback callback (reader).
//! The buffer is split into a [`RingProducer`] and a [`RingConsumer`] at
//! construction. Neither half is `Clone`, so there is always exactly one
//! writer and one reader.
//!
//! `held` is the only synchronisation point: each side loads it with
//! `Acquire` before touching the slots and publishes its change with
//! `Release` after advancing its own cursor. The writer owns `write_pos`, the
//! reader owns `read_pos`.
//!
//! Overflow drops the newest samples that do not fit. Underrun pads with
//! silence. Neither is an error.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared {
    slots: Box<[UnsafeCell<f32>]>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    held: AtomicUsize,
}

// SAFETY: the producer only writes slots in the vacant region starting at
// `write_pos`, the consumer only reads slots in the occupied region starting at
// `read_pos`. The acquire/release pairing on `held` keeps the two regions
// disjoint and makes every slot write visible before the reader can see it.
unsafe impl Sync for Shared {}

impl Shared {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// # Safety
    /// Caller must be the single producer and `start..start + src.len()` must lie
    /// inside the vacant region.
    unsafe fn copy_in(&self, start: usize, src: &[f32]) {
        let len = src.len();
        for (slot, &sample) in self.slots[start..start + len].iter().zip(src) {
            *slot.get() = sample;
        }
    }

    /// # Safety
    /// Caller must be the single consumer and `start..start + dst.len()` must lie
    /// inside the occupied region.
    unsafe fn copy_out(&self, start: usize, dst: &mut [f32]) {
        let len = dst.len();
        for (sample, slot) in dst.iter_mut().zip(&self.slots[start..start + len]) {
            *sample = *slot.get();
        }
    }
}

/// Constructor for a producer/consumer pair sharing one fixed buffer.
pub struct SampleRing;

impl SampleRing {
    /// Allocates a ring holding up to `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> (RingProducer, RingConsumer) {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(0.0f32))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let shared = Arc::new(Shared {
            slots,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            held: AtomicUsize::new(0),
        });

        (
            RingProducer {
                shared: Arc::clone(&shared),
            },
            RingConsumer { shared },
        )
    }
}

/// Writing half. Lives in the capture callback.
pub struct RingProducer {
    shared: Arc<Shared>,
}

/// Reading half. Lives in the playback callback.
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Appends as many of `samples` as fit and silently drops the rest.
    ///
    /// Returns the number of samples accepted. Never blocks.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let shared = &*self.shared;
        let capacity = shared.capacity();

        let held = shared.held.load(Ordering::Acquire);
        let count = samples.len().min(capacity - held);
        if count == 0 {
            return 0;
        }

        let start = shared.write_pos.load(Ordering::Relaxed);
        let first = count.min(capacity - start);
        // SAFETY: we are the only producer and `count <= capacity - held`, so both
        // segments are vacant slots the consumer cannot be reading.
        unsafe {
            shared.copy_in(start, &samples[..first]);
            shared.copy_in(0, &samples[first..count]);
        }

        shared
            .write_pos
            .store((start + count) % capacity, Ordering::Relaxed);
        shared.held.fetch_add(count, Ordering::Release);
        count
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn occupied_len(&self) -> usize {
        self.shared.held.load(Ordering::Acquire)
    }

    pub fn vacant_len(&self) -> usize {
        self.capacity() - self.occupied_len()
    }
}

impl RingConsumer {
    /// Fills all of `out`: held samples in FIFO order, then silence.
    ///
    /// Returns the number of real (non-padding) samples written.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let shared = &*self.shared;
        let capacity = shared.capacity();

        let held = shared.held.load(Ordering::Acquire);
        let count = out.len().min(held);

        if count > 0 {
            let start = shared.read_pos.load(Ordering::Relaxed);
            let first = count.min(capacity - start);
            let (head, tail) = out[..count].split_at_mut(first);
            // SAFETY: we are the only consumer and `count <= held`, so both segments
            // were published by the producer's release on `held`.
            unsafe {
                shared.copy_out(start, head);
                shared.copy_out(0, tail);
            }

            shared
                .read_pos
                .store((start + count) % capacity, Ordering::Relaxed);
            shared.held.fetch_sub(count, Ordering::Release);
        }

        out[count..].fill(0.0);
        count
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn occupied_len(&self) -> usize {
        self.shared.held.load(Ordering::Acquire)
    }

    pub fn vacant_len(&self) -> usize {
        self.capacity() - self.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied_len() == 0
    }
}
