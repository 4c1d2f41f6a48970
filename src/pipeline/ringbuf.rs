//! Bounded history of frames received by the host

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::capture::Frame;

/// Ring buffer keeping the most recent frames; the oldest frame is dropped
/// when a new one arrives on a full buffer.
pub struct FrameRingBuffer {
    ring: HeapRb<Frame>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicUsize,
    frames_read: AtomicUsize,
    frames_dropped: AtomicUsize,
}

/// Counters of a [`FrameRingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingStats {
    pub written: usize,
    pub read: usize,
    pub dropped: usize,
}

impl FrameRingBuffer {
    /// `capacity` is raised to at least one slot.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Store a frame, evicting the oldest one when full.
    pub fn push(&mut self, frame: Frame) {
        if self.ring.push_overwrite(frame).is_some() {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the oldest stored frame.
    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.ring.try_pop()?;
        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    /// Take every stored frame, oldest first.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(self.len());
        while let Some(frame) = self.pop() {
            frames.push(frame);
        }
        frames
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            written: self.stats.frames_written.load(Ordering::Relaxed),
            read: self.stats.frames_read.load(Ordering::Relaxed),
            dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}
