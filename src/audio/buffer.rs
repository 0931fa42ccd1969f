//! Lock-free ring buffer for audio data

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Storage shared by the producer and consumer halves
struct Shared<T> {
    buffer: Box<[UnsafeCell<T>]>,
    /// Number of published, not yet consumed elements
    used: AtomicUsize,
}

// SAFETY: the producer only touches free slots and the consumer only touches
// used slots; the `used` counter (release on publish, acquire on observe)
// keeps the two regions disjoint and hands slot contents across threads.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Pointer to the slot at `pos` (must be `< size`)
    fn slot_ptr(&self, pos: usize) -> *mut T {
        debug_assert!(pos < self.size());
        // SAFETY: pos is in bounds; raw_get does not create a reference
        unsafe { UnsafeCell::raw_get(self.buffer.as_ptr().add(pos)) }
    }
}

/// Fixed-capacity single-producer single-consumer ring buffer
///
/// Moves contiguous runs of `T` from exactly one producer thread to exactly one
/// consumer thread without locks, blocking, or allocation after construction.
/// Call [`split`](RingBuffer::split) to get the two halves; ownership of each
/// half is what enforces the single-producer/single-consumer rule.
pub struct RingBuffer<T> {
    shared: Arc<Shared<T>>,
    read_pos: usize,
    write_pos: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create an empty buffer holding up to `capacity` elements
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");

        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shared: Arc::new(Shared {
                buffer,
                used: AtomicUsize::new(0),
            }),
            read_pos: 0,
            write_pos: 0,
        }
    }
}

impl<T> RingBuffer<T> {
    /// Capacity in elements
    pub fn size(&self) -> usize {
        self.shared.size()
    }

    pub fn used(&self) -> usize {
        self.shared.used.load(Ordering::Relaxed)
    }

    pub fn free(&self) -> usize {
        self.size() - self.used()
    }

    /// Empty the buffer
    ///
    /// Takes `&mut self`: both halves must have been reunited first, which
    /// guarantees no producer or consumer is running.
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.shared.used.store(0, Ordering::Relaxed);
    }

    /// Split into the producer and consumer halves
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let producer = Producer {
            shared: Arc::clone(&self.shared),
            write_pos: self.write_pos,
            acquired: 0,
        };
        let consumer = Consumer {
            shared: self.shared,
            read_pos: self.read_pos,
            acquired: 0,
        };
        (producer, consumer)
    }

    /// Put the halves of one buffer back together
    ///
    /// Fails, handing both halves back, if they belong to different buffers.
    pub fn reunite(
        producer: Producer<T>,
        consumer: Consumer<T>,
    ) -> std::result::Result<Self, (Producer<T>, Consumer<T>)> {
        if !Arc::ptr_eq(&producer.shared, &consumer.shared) {
            return Err((producer, consumer));
        }

        Ok(Self {
            read_pos: consumer.read_pos,
            write_pos: producer.write_pos,
            shared: producer.shared,
        })
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("size", &self.size())
            .field("used", &self.used())
            .finish()
    }
}

/// Writing half of a [`RingBuffer`]
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    write_pos: usize,
    /// Length of the last acquired write region
    acquired: usize,
}

impl<T> Producer<T> {
    pub fn size(&self) -> usize {
        self.shared.size()
    }

    /// Snapshot of the used element count; may be stale by the time it is read
    pub fn used(&self) -> usize {
        self.shared.used.load(Ordering::Relaxed)
    }

    /// Snapshot of the free element count; may be stale by the time it is read
    pub fn free(&self) -> usize {
        self.size() - self.used()
    }

    /// Whether the consumer half has been dropped
    pub fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.shared) == 1
    }

    /// Borrow the next contiguous free region, at most `max_elems` long
    ///
    /// The region stops at the physical end of the buffer, so a second call may
    /// be needed after wrapping. An empty region means the buffer is full.
    pub fn acquire_write_region(&mut self, max_elems: usize) -> &mut [T] {
        let size = self.shared.size();
        let free = size - self.shared.used.load(Ordering::Acquire);
        let len = max_elems.min(free).min(size - self.write_pos);
        self.acquired = len;

        // SAFETY: [write_pos, write_pos + len) lies within the free part of the
        // buffer, which the consumer never reads until it is published.
        unsafe { std::slice::from_raw_parts_mut(self.shared.slot_ptr(self.write_pos), len) }
    }

    /// Publish `elems` elements written into the last acquired region
    ///
    /// # Panics
    /// If `elems` exceeds the length of the last acquired region.
    pub fn release_write_region(&mut self, elems: usize) {
        assert!(
            elems <= self.acquired,
            "released {} elements but only {} were acquired",
            elems,
            self.acquired
        );

        self.write_pos = (self.write_pos + elems) % self.shared.size();
        self.acquired = 0;
        self.shared.used.fetch_add(elems, Ordering::Release);
    }
}

impl<T: Copy> Producer<T> {
    /// Copy as much of `data` as fits; returns the number of elements written
    ///
    /// Partial writes are expected under backpressure.
    pub fn write(&mut self, mut data: &[T]) -> usize {
        let mut written = 0;

        while !data.is_empty() {
            let region = self.acquire_write_region(data.len());
            if region.is_empty() {
                break;
            }

            let n = region.len();
            region.copy_from_slice(&data[..n]);
            self.release_write_region(n);

            data = &data[n..];
            written += n;
        }

        written
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("size", &self.size())
            .field("write_pos", &self.write_pos)
            .finish()
    }
}

/// Reading half of a [`RingBuffer`]
///
/// `acquire_read_region` and `release_read_region` are O(1), never block and
/// never allocate, so they are safe to call from a device callback.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    read_pos: usize,
    /// Length of the last acquired read region
    acquired: usize,
}

impl<T> Consumer<T> {
    pub fn size(&self) -> usize {
        self.shared.size()
    }

    /// Snapshot of the used element count; may be stale by the time it is read
    pub fn used(&self) -> usize {
        self.shared.used.load(Ordering::Relaxed)
    }

    /// Snapshot of the free element count; may be stale by the time it is read
    pub fn free(&self) -> usize {
        self.size() - self.used()
    }

    /// Borrow the next contiguous readable region, at most `max_elems` long
    ///
    /// An empty region means the buffer is empty.
    pub fn acquire_read_region(&mut self, max_elems: usize) -> &[T] {
        let size = self.shared.size();
        let used = self.shared.used.load(Ordering::Acquire);
        let len = max_elems.min(used).min(size - self.read_pos);
        self.acquired = len;

        // SAFETY: [read_pos, read_pos + len) has been published by the producer
        // and is not handed out for writing until it is released here.
        unsafe { std::slice::from_raw_parts(self.shared.slot_ptr(self.read_pos), len) }
    }

    /// Return `elems` consumed elements of the last acquired region to the producer
    ///
    /// # Panics
    /// If `elems` exceeds the length of the last acquired region.
    pub fn release_read_region(&mut self, elems: usize) {
        assert!(
            elems <= self.acquired,
            "released {} elements but only {} were acquired",
            elems,
            self.acquired
        );

        self.read_pos = (self.read_pos + elems) % self.shared.size();
        self.acquired = 0;
        self.shared.used.fetch_sub(elems, Ordering::Release);
    }

    /// Feed up to `elems` elements to `consumer`, one contiguous region at a time
    ///
    /// Returns the number of elements consumed.
    pub fn consume<F>(&mut self, elems: usize, mut consumer: F) -> usize
    where
        F: FnMut(&[T]),
    {
        let mut consumed = 0;

        while consumed < elems {
            let region = self.acquire_read_region(elems - consumed);
            if region.is_empty() {
                break;
            }

            let n = region.len();
            consumer(region);
            self.release_read_region(n);
            consumed += n;
        }

        consumed
    }

    /// Feed everything currently readable to `consumer`
    pub fn consume_all<F>(&mut self, consumer: F) -> usize
    where
        F: FnMut(&[T]),
    {
        self.consume(usize::MAX, consumer)
    }
}

impl<T: Copy> Consumer<T> {
    /// Copy readable elements into `out`; returns the number copied
    pub fn read(&mut self, out: &mut [T]) -> usize {
        let mut copied = 0;
        self.consume(out.len(), |region| {
            out[copied..copied + region.len()].copy_from_slice(region);
            copied += region.len();
        })
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("size", &self.size())
            .field("read_pos", &self.read_pos)
            .finish()
    }
}
