//! Single producer, single consumer ring of stereo samples.
//!
//! The emulation thread produces whole frames, the host audio callback consumes one sample at a
//! time. A frame is published with a single release store, so the consumer never observes part
//! of it. Pushing into a queue without room for the whole frame drops the frame.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A stereo sample, in the `-1.0..=1.0` range.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo {
    pub left: f32,
    pub right: f32,
}

impl Stereo {
    pub const SILENCE: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    #[inline(always)]
    pub fn clamp(self) -> Self {
        Self {
            left: self.left.clamp(-1.0, 1.0),
            right: self.right.clamp(-1.0, 1.0),
        }
    }
}

impl std::ops::Add for Stereo {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            left: self.left + rhs.left,
            right: self.right + rhs.right,
        }
    }
}

impl std::ops::AddAssign for Stereo {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Mul<f32> for Stereo {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: f32) -> Self::Output {
        Self {
            left: self.left * rhs,
            right: self.right * rhs,
        }
    }
}

/// Result of reading a sample from a [`SampleConsumer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadSample {
    Sample(Stereo),
    /// Nothing was queued.
    Underrun,
}

impl ReadSample {
    /// The sample read, or silence on underrun.
    #[inline(always)]
    pub fn or_silence(self) -> Stereo {
        match self {
            Self::Sample(sample) => sample,
            Self::Underrun => Stereo::SILENCE,
        }
    }
}

struct Inner {
    // one extra slot so that head == tail always means empty
    buf: Box<[UnsafeCell<MaybeUninit<Stereo>>]>,
    cap: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// SAFETY: only the producer writes slots in `tail..head` (free region) and only the consumer
// reads slots in `head..tail` (filled region). Ownership of a slot changes hands through the
// release/acquire pairs on `head` and `tail`.
unsafe impl Sync for Inner {}

impl Inner {
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if head >= tail {
            head - tail
        } else {
            (self.cap - tail) + head
        }
    }

    fn capacity(&self) -> usize {
        self.cap - 1
    }

    #[inline(always)]
    fn wrap(&self, index: usize) -> usize {
        if index >= self.cap {
            index - self.cap
        } else {
            index
        }
    }
}

/// Producing half of a sample queue.
pub struct SampleProducer {
    inner: Arc<Inner>,
}

/// Consuming half of a sample queue. Can be sent to the audio thread.
pub struct SampleConsumer {
    inner: Arc<Inner>,
}

/// Creates a queue with room for `capacity` samples.
pub fn sample_queue(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let cap = capacity.saturating_add(1).max(2);
    let buf = (0..cap)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let inner = Arc::new(Inner {
        buf,
        cap,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });

    (
        SampleProducer {
            inner: Arc::clone(&inner),
        },
        SampleConsumer { inner },
    )
}

impl SampleProducer {
    /// Pushes a whole frame. Returns `false`, pushing nothing, if there isn't room for all of it.
    pub fn push_frame(&self, frame: &[Stereo]) -> bool {
        let inner = &*self.inner;
        if frame.len() > inner.capacity() - inner.len() {
            return false;
        }

        let head = inner.head.load(Ordering::Relaxed);
        for (offset, sample) in frame.iter().copied().enumerate() {
            let slot = inner.wrap(head + offset);

            // SAFETY: the slot is in the free region, which the consumer does not touch
            unsafe {
                (*inner.buf[slot].get()).write(sample);
            }
        }

        inner
            .head
            .store(inner.wrap(head + frame.len()), Ordering::Release);

        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl SampleConsumer {
    /// Pops the oldest sample. Never blocks.
    pub fn read_sample(&self) -> ReadSample {
        let inner = &*self.inner;
        let tail = inner.tail.load(Ordering::Relaxed);
        let head = inner.head.load(Ordering::Acquire);
        if tail == head {
            return ReadSample::Underrun;
        }

        // SAFETY: the slot is in the filled region and was initialized by the producer before
        // the release store of `head` we just acquired
        let sample = unsafe { (*inner.buf[tail].get()).assume_init_read() };
        inner.tail.store(inner.wrap(tail + 1), Ordering::Release);

        ReadSample::Sample(sample)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}
