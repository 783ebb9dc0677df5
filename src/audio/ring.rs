//! Segment ring buffer shared by one capture thread and one reader.
//!
//! The producer publishes whole segments at `written % capacity` and bumps
//! `written`. A reader keeps its own counter and only copies slots strictly
//! behind `written`, so `read <= written` always holds. When a reader falls
//! more than `capacity` segments behind, the overwritten segments are
//! skipped and counted as lost.

use parking_lot::{Condvar, Mutex};
use tracing::warn;

struct RingState {
    samples: Vec<i16>,
    written: u64,
    stopped: bool,
}

/// Fixed-capacity array of fixed-size audio segments
pub struct SegmentRing {
    state: Mutex<RingState>,
    published: Condvar,
    segment_samples: usize,
    capacity: usize,
}

impl SegmentRing {
    /// Allocate `capacity` segments of `segment_samples` samples each
    pub fn new(segment_samples: usize, capacity: usize) -> Self {
        assert!(segment_samples > 0 && capacity > 0, "ring dimensions must be positive");

        Self {
            state: Mutex::new(RingState {
                samples: vec![0; segment_samples * capacity],
                written: 0,
                stopped: false,
            }),
            published: Condvar::new(),
            segment_samples,
            capacity,
        }
    }

    pub fn segment_samples(&self) -> usize {
        self.segment_samples
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of segments published so far
    pub fn written(&self) -> u64 {
        self.state.lock().written
    }

    /// Copy `segment` into the next slot and make it visible to readers.
    /// Returns the new write count.
    pub fn publish(&self, segment: &[i16]) -> u64 {
        debug_assert_eq!(segment.len(), self.segment_samples);

        let mut state = self.state.lock();
        let start = self.slot_offset(state.written);
        state.samples[start..start + self.segment_samples].copy_from_slice(segment);
        state.written += 1;
        let written = state.written;
        drop(state);

        self.published.notify_all();
        written
    }

    /// Copy of segment `index` if it has been written and not yet overwritten
    pub fn segment(&self, index: u64) -> Option<Vec<i16>> {
        let state = self.state.lock();
        if index >= state.written || index < oldest_valid(state.written, self.capacity) {
            return None;
        }
        let start = self.slot_offset(index);
        Some(state.samples[start..start + self.segment_samples].to_vec())
    }

    /// Raise the stop signal and wake every waiting reader
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.published.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Reader starting at segment 0
    pub fn reader(&self) -> RingReader<'_> {
        RingReader {
            ring: self,
            next: 0,
            lost: 0,
        }
    }

    fn slot_offset(&self, index: u64) -> usize {
        (index % self.capacity as u64) as usize * self.segment_samples
    }
}

fn oldest_valid(written: u64, capacity: usize) -> u64 {
    written.saturating_sub(capacity as u64)
}

/// The single consumer of a [`SegmentRing`]
pub struct RingReader<'a> {
    ring: &'a SegmentRing,
    next: u64,
    lost: u64,
}

impl RingReader<'_> {
    /// Block until a segment is available and copy it into `out`.
    ///
    /// Returns the segment's index, or `None` once the ring is stopped and
    /// every published segment has been read.
    pub fn read_into(&mut self, out: &mut [i16]) -> Option<u64> {
        debug_assert_eq!(out.len(), self.ring.segment_samples);

        let mut state = self.ring.state.lock();
        loop {
            if state.written > self.next {
                let oldest = oldest_valid(state.written, self.ring.capacity);
                if self.next < oldest {
                    let skipped = oldest - self.next;
                    warn!(
                        "Reader fell {} segments behind capture, {} segments lost",
                        state.written - self.next,
                        skipped
                    );
                    self.lost += skipped;
                    self.next = oldest;
                }

                let index = self.next;
                let start = self.ring.slot_offset(index);
                out.copy_from_slice(&state.samples[start..start + self.ring.segment_samples]);
                self.next += 1;
                return Some(index);
            }

            if state.stopped {
                return None;
            }
            self.ring.published.wait(&mut state);
        }
    }

    /// Index of the next segment this reader will return
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Segments overwritten before this reader got to them
    pub fn lost(&self) -> u64 {
        self.lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(value: i16) -> Vec<i16> {
        vec![value; 4]
    }

    #[test]
    fn test_read_in_publish_order() {
        let ring = SegmentRing::new(4, 8);
        for v in 0..3 {
            ring.publish(&segment(v));
        }
        ring.stop();

        let mut reader = ring.reader();
        let mut out = vec![0; 4];
        for v in 0..3 {
            assert_eq!(reader.read_into(&mut out), Some(v as u64));
            assert_eq!(out, segment(v));
        }
        assert_eq!(reader.read_into(&mut out), None);
        assert_eq!(reader.lost(), 0);
    }

    #[test]
    fn test_oldest_segment_overwritten_after_capacity_plus_one() {
        let capacity = 5;
        let ring = SegmentRing::new(4, capacity);
        for v in 0..=capacity as i16 {
            ring.publish(&segment(v));
        }

        assert_eq!(ring.written(), capacity as u64 + 1);
        assert!(ring.segment(0).is_none());
        assert_eq!(ring.segment(1), Some(segment(1)));
        assert_eq!(ring.segment(capacity as u64), Some(segment(capacity as i16)));
    }

    #[test]
    fn test_lagging_reader_skips_and_counts_loss() {
        let ring = SegmentRing::new(4, 3);
        for v in 0..7 {
            ring.publish(&segment(v));
        }

        let mut reader = ring.reader();
        let mut out = vec![0; 4];
        assert_eq!(reader.read_into(&mut out), Some(4));
        assert_eq!(out, segment(4));
        assert_eq!(reader.lost(), 4);
        assert!(reader.position() <= ring.written());
    }

    #[test]
    fn test_stop_wakes_waiting_reader() {
        let ring = SegmentRing::new(4, 3);
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let mut reader = ring.reader();
                let mut out = vec![0; 4];
                reader.read_into(&mut out)
            });
            std::thread::sleep(std::time::Duration::from_millis(20));
            ring.stop();
            assert_eq!(handle.join().unwrap(), None);
        });
    }

    #[test]
    fn test_unwritten_segment_not_available() {
        let ring = SegmentRing::new(4, 3);
        assert!(ring.segment(0).is_none());
        ring.publish(&segment(1));
        assert!(ring.segment(1).is_none());
    }
}
