//! Single-producer single-consumer lock-free ring buffer.
//!
//! Carries shared frame handles from the capture loop to a downstream
//! consumer without blocking either side. A full ring drops the push
//! (the producer must never stall on a slow consumer), an empty ring
//! returns `None`.
//!
//! Contract: exactly one thread pushes and exactly one thread pops. The
//! type does not detect violations; it is `Sync` so a producer and a
//! consumer can share it behind an `Arc`, and the orderings below are
//! only sound under the one-in one-out discipline.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct SpscRing<T> {
    buf: Box<[UnsafeCell<Option<T>>]>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Slots are only touched by the single producer (writes) and the single
// consumer (takes), never concurrently on the same index: a slot is
// written before the head release-store publishes it and taken after
// the acquire-load observes it.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a ring holding at most `capacity` items, rounded up to the
    /// next power of two (minimum 2).
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = capacity.max(2).next_power_of_two();
        let mut buf = Vec::with_capacity(cap);
        buf.resize_with(cap, || UnsafeCell::new(None));
        Self {
            buf: buf.into_boxed_slice(),
            mask: cap - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Number of items currently in flight. Approximate when read from
    /// a third thread; exact for producer or consumer.
    pub fn len(&self) -> usize {
        self.head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer side. Returns `false` (dropping `value`) when full.
    pub fn push(&self, value: T) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = head.wrapping_add(1);
        if next.wrapping_sub(self.tail.load(Ordering::Acquire)) > self.capacity() {
            return false;
        }
        unsafe {
            *self.buf[head & self.mask].get() = Some(value);
        }
        self.head.store(next, Ordering::Release);
        true
    }

    /// Consumer side. Removes and returns the oldest item.
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let value = unsafe { (*self.buf[tail & self.mask].get()).take() };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        value
    }
}
