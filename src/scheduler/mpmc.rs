//! Lock-free bounded MPMC ring buffer.
//!
//! The substrate for every `try_schedule` path. A fixed ring of slots, each
//! carrying an atomic version counter next to uninitialised storage. A slot
//! is writable when `version == tail`, readable when `version == head + 1`;
//! writers publish `tail + 1`, readers publish `head + capacity`. The
//! version release/acquire pair carries the data synchronisation, so the
//! head/tail counters themselves only need relaxed claims.
//!
//! Producers and consumers are wait-free in steady state: each operation
//! either claims a slot with one CAS or reports full/empty. Per-producer
//! FIFO order is preserved (a producer's items are claimed in the order it
//! pushed them).
//!
//! `head` and `tail` live on separate cache lines so producers and
//! consumers do not false-share.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Slot<T> {
    version: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A lock-free bounded multi-producer multi-consumer queue.
pub struct BoundedMpmc<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    slots: Box<[Slot<T>]>,
}

// SAFETY: slots are accessed only after winning the version/CAS claim
// protocol below, which hands each slot to exactly one thread at a time;
// values of T move across threads, hence T: Send.
unsafe impl<T: Send> Send for BoundedMpmc<T> {}
unsafe impl<T: Send> Sync for BoundedMpmc<T> {}

/// Default ring capacity used by the run-loop and thread-pool schedulers.
pub(crate) const DEFAULT_RING_CAPACITY: usize = 1024;

impl<T> BoundedMpmc<T> {
    /// Creates a queue with the default capacity of 1024 slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    /// Creates a queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        let slots = (0..capacity)
            .map(|i| Slot {
                version: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots,
        }
    }

    /// The number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Attempts to push without blocking. Returns the value back if the
    /// queue is full.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let capacity = self.capacity();
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[tail % capacity];
            let version = slot.version.load(Ordering::Acquire);
            let diff = version as isize - tail as isize;

            if diff == 0 {
                // Slot is writable; claim it by advancing the tail.
                match self
                    .tail
                    .compare_exchange_weak(tail, tail + 1, Ordering::Relaxed, Ordering::Relaxed)
                {
                    Ok(_) => {
                        // SAFETY: the CAS above made this thread the unique
                        // owner of the slot until the version store below.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.version.store(tail + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => tail = current,
                }
            } else if diff < 0 {
                // A full lap behind: the queue is full.
                return Err(value);
            } else {
                // Another producer is mid-claim on this slot; re-read.
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to pop without blocking. Returns `None` if the queue is
    /// empty.
    pub fn try_pop(&self) -> Option<T> {
        let capacity = self.capacity();
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[head % capacity];
            let version = slot.version.load(Ordering::Acquire);
            let diff = version as isize - (head + 1) as isize;

            if diff == 0 {
                // Slot is readable; claim it by advancing the head.
                match self
                    .head
                    .compare_exchange_weak(head, head + 1, Ordering::Relaxed, Ordering::Relaxed)
                {
                    Ok(_) => {
                        // SAFETY: the CAS above made this thread the unique
                        // owner of the slot; the producer's release store of
                        // `head + 1` happens-before the acquire load above,
                        // so the value is fully written.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.version.store(head + capacity, Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => head = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                // Another consumer is mid-claim; re-read.
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Whether the queue appears empty. Approximate under concurrency.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head == tail
    }

    /// Whether the queue appears full. Approximate under concurrency.
    #[must_use]
    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) >= self.capacity()
    }
}

impl<T> Default for BoundedMpmc<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for BoundedMpmc<T> {
    fn drop(&mut self) {
        // Drain whatever was published but never consumed.
        while self.try_pop().is_some() {}
    }
}

impl<T> std::fmt::Debug for BoundedMpmc<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedMpmc")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
