//! # Delay Store (Multi-Channel Ring Buffer)
//!
//! The delay store keeps the most recent `capacity` samples of every audio
//! channel so the engine can read them back later. It is the "tape loop"
//! of the delay: a write head records incoming audio, a read head some
//! distance behind it plays it back.
//!
//! ## Block-Based Access
//!
//! Audio arrives in blocks (typically 64–1024 samples), so the store copies
//! whole segments rather than single samples. A segment that starts near the
//! end of the buffer runs past it and must continue at index 0:
//!
//! ```text
//! capacity = 10, write_cursor = 7, segment of 5 samples
//!
//!   index:  0  1  2  3  4  5  6  7  8  9
//!          [d  e  .  .  .  .  .  a  b  c]
//!           └─┬─┘                └──┬──┘
//!          second part          first part
//!          [0, 2)               [7, 10)
//! ```
//!
//! Every read and write goes through [`split_span`], which turns a
//! `(start, count)` pair into at most two in-bounds ranges. No other code in
//! the crate does modular index arithmetic on the buffers.
//!
//! ## Shared Write Cursor
//!
//! All channels advance together, so a single `write_cursor` is shared.
//! Writing a segment does NOT move the cursor; the engine calls
//! [`DelayStore::advance_write_cursor`] once every channel has been handled
//! for the current span of samples.

use std::ops::Range;

/// Split a span of `count` samples starting at `start` on a ring of
/// `capacity` samples into two contiguous, in-bounds ranges.
///
/// The second range is empty when the span does not cross the end of the
/// buffer. Callers must ensure `start < capacity` and `count <= capacity`.
///
/// Example: `start = 7`, `count = 5`, `capacity = 10`:
/// ```text
/// (7..10, 0..2)
/// ```
fn split_span(start: usize, count: usize, capacity: usize) -> (Range<usize>, Range<usize>) {
    debug_assert!(start < capacity, "span start {start} outside ring of {capacity}");
    debug_assert!(count <= capacity, "span of {count} exceeds ring of {capacity}");

    let first_len = count.min(capacity - start);
    (start..start + first_len, 0..count - first_len)
}

/// How a segment write combines with what is already in the buffer.
#[derive(Clone, Copy)]
enum Blend {
    /// Overwrite the stored samples (fill phase).
    Replace,
    /// Add onto the stored samples (feedback phase).
    Accumulate,
}

/// Apply `source * gain` to `dest`, where the gain starts at `gain` and grows
/// by `step` every sample. Returns the gain for the sample after the last one
/// so a split segment can continue the ramp where it left off.
#[inline]
fn ramp_into(dest: &mut [f32], source: &[f32], mut gain: f32, step: f32, blend: Blend) -> f32 {
    for (d, s) in dest.iter_mut().zip(source) {
        match blend {
            Blend::Replace => *d = s * gain,
            Blend::Accumulate => *d += s * gain,
        }
        gain += step;
    }
    gain
}

/// Per-channel circular sample buffers sharing one write cursor.
///
/// Buffers are allocated once in [`reset`](Self::reset) during session
/// setup. Every other method is O(count) and allocation-free, so they are
/// safe to call from the audio thread.
#[derive(Debug, Default)]
pub struct DelayStore {
    /// One buffer per channel, each exactly `capacity` samples long.
    channels: Vec<Vec<f32>>,

    /// Ring length in samples. Zero until the first `reset()`.
    capacity: usize,

    /// Where the next block of incoming audio is stored.
    /// Always in `[0, capacity)` once the store has been sized.
    write_cursor: usize,
}

impl DelayStore {
    /// Create an empty store. Call [`reset`](Self::reset) before using it.
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)allocate `channel_count` silent buffers of `capacity` samples and
    /// rewind the write cursor.
    ///
    /// This allocates, so it must only run during session setup, never while
    /// the audio thread is processing.
    pub fn reset(&mut self, channel_count: usize, capacity: usize) {
        assert!(capacity > 0, "delay store capacity must be > 0");

        self.channels = (0..channel_count).map(|_| vec![0.0; capacity]).collect();
        self.capacity = capacity;
        self.write_cursor = 0;
    }

    /// Silence every buffer and rewind the write cursor without reallocating.
    ///
    /// Called when the host stops the transport so old echoes don't bleed
    /// into the next playback.
    pub fn clear(&mut self) {
        for buffer in &mut self.channels {
            buffer.fill(0.0);
        }
        self.write_cursor = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Overwrite `source.len()` samples of `channel` starting at the write
    /// cursor, scaling them by a linear ramp from `gain_start` towards
    /// `gain_end`.
    ///
    /// Sample `i` is scaled by `gain_start + (gain_end - gain_start) * i / count`.
    /// When the segment wraps, the ramp carries on across the split exactly as
    /// if the buffer were contiguous. Passing the same value twice applies a
    /// constant gain.
    pub fn write_segment(&mut self, channel: usize, source: &[f32], gain_start: f32, gain_end: f32) {
        self.blend_segment(channel, source, gain_start, gain_end, Blend::Replace);
    }

    /// Like [`write_segment`](Self::write_segment), but adds onto the stored
    /// samples instead of replacing them.
    pub fn add_segment(&mut self, channel: usize, source: &[f32], gain_start: f32, gain_end: f32) {
        self.blend_segment(channel, source, gain_start, gain_end, Blend::Accumulate);
    }

    fn blend_segment(
        &mut self,
        channel: usize,
        source: &[f32],
        gain_start: f32,
        gain_end: f32,
        blend: Blend,
    ) {
        let count = source.len();
        if count == 0 {
            return;
        }
        assert!(count <= self.capacity, "segment of {count} exceeds capacity");

        let step = (gain_end - gain_start) / count as f32;
        let (first, second) = split_span(self.write_cursor, count, self.capacity);
        let (head, tail) = source.split_at(first.len());
        let buffer = &mut self.channels[channel];

        let gain = ramp_into(&mut buffer[first], head, gain_start, step, blend);
        ramp_into(&mut buffer[second], tail, gain, step, blend);
    }

    /// Copy `destination.len()` samples of `channel`, starting at
    /// `read_start`, into `destination`. Wraps at the buffer end the same way
    /// writes do. Never mutates the store.
    pub fn read_segment(&self, channel: usize, read_start: usize, destination: &mut [f32]) {
        let count = destination.len();
        if count == 0 {
            return;
        }
        assert!(read_start < self.capacity, "read start {read_start} out of range");
        assert!(count <= self.capacity, "segment of {count} exceeds capacity");

        let (first, second) = split_span(read_start, count, self.capacity);
        let (head, tail) = destination.split_at_mut(first.len());
        let buffer = &self.channels[channel];

        head.copy_from_slice(&buffer[first]);
        tail.copy_from_slice(&buffer[second]);
    }

    /// Index of the sample written `delay_samples` samples before the write
    /// cursor.
    ///
    /// ```text
    /// read_start = (write_cursor + capacity - delay_samples) % capacity
    /// ```
    ///
    /// Adding `capacity` before subtracting keeps the `usize` arithmetic
    /// non-negative. `delay_samples` must be below `capacity`.
    pub fn read_start(&self, delay_samples: usize) -> usize {
        debug_assert!(delay_samples < self.capacity);
        (self.write_cursor + self.capacity - delay_samples) % self.capacity
    }

    /// Move the write cursor forward by `count` samples, wrapping at the end
    /// of the ring.
    pub fn advance_write_cursor(&mut self, count: usize) {
        if self.capacity == 0 {
            return;
        }
        self.write_cursor = (self.write_cursor + count % self.capacity) % self.capacity;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store(channels: usize, capacity: usize) -> DelayStore {
        let mut store = DelayStore::new();
        store.reset(channels, capacity);
        store
    }

    #[test]
    fn test_split_span_without_wrap() {
        assert_eq!(split_span(2, 5, 10), (2..7, 0..0));
        assert_eq!(split_span(0, 10, 10), (0..10, 0..0));
    }

    #[test]
    fn test_split_span_with_wrap() {
        assert_eq!(split_span(7, 5, 10), (7..10, 0..2));
        assert_eq!(split_span(9, 10, 10), (9..10, 0..9));
    }

    #[test]
    fn test_reset_starts_silent() {
        let store = store(2, 8);
        assert_eq!(store.capacity(), 8);
        assert_eq!(store.channel_count(), 2);
        assert_eq!(store.write_cursor(), 0);

        let mut out = [1.0; 8];
        store.read_segment(1, 0, &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    /// Write a block that crosses the buffer end and read it back from the
    /// same start, for every cursor position and every block length.
    #[test]
    fn test_wrap_round_trip_every_offset() {
        const CAPACITY: usize = 16;
        let source: Vec<f32> = (1..=CAPACITY).map(|i| i as f32 * 0.25).collect();
        let mut out = [0.0; CAPACITY];

        for cursor in 0..CAPACITY {
            for len in 1..=CAPACITY {
                let mut store = store(1, CAPACITY);
                store.advance_write_cursor(cursor);
                assert_eq!(store.write_cursor(), cursor);

                store.write_segment(0, &source[..len], 1.0, 1.0);
                store.read_segment(0, cursor, &mut out[..len]);

                assert_eq!(
                    &out[..len],
                    &source[..len],
                    "cursor {cursor}, len {len} did not round-trip"
                );
            }
        }
    }

    #[test]
    fn test_write_does_not_move_cursor() {
        let mut store = store(1, 8);
        store.write_segment(0, &[1.0, 2.0, 3.0], 1.0, 1.0);
        assert_eq!(store.write_cursor(), 0);
    }

    #[test]
    fn test_advance_wraps() {
        let mut store = store(1, 8);
        store.advance_write_cursor(5);
        store.advance_write_cursor(5);
        assert_eq!(store.write_cursor(), 2);

        // Counts larger than the ring still land inside it.
        store.advance_write_cursor(8 * 3 + 1);
        assert_eq!(store.write_cursor(), 3);
    }

    #[test]
    fn test_constant_gain_applied() {
        let mut store = store(1, 4);
        store.write_segment(0, &[1.0, -1.0, 0.5, 2.0], 0.8, 0.8);

        let mut out = [0.0; 4];
        store.read_segment(0, 0, &mut out);
        for (got, want) in out.iter().zip([0.8, -0.8, 0.4, 1.6]) {
            assert!((got - want).abs() < 1e-6, "expected {want}, got {got}");
        }
    }

    /// The gain ramp must continue seamlessly across the wrap point.
    #[test]
    fn test_ramp_continues_across_split() {
        let mut store = store(1, 4);
        store.advance_write_cursor(2);
        store.write_segment(0, &[1.0; 4], 0.0, 1.0);

        // Gains 0.0, 0.25, 0.5, 0.75 written at indices 2, 3, 0, 1.
        let mut out = [0.0; 4];
        store.read_segment(0, 2, &mut out);
        for (got, want) in out.iter().zip([0.0, 0.25, 0.5, 0.75]) {
            assert!((got - want).abs() < 1e-6, "expected {want}, got {got}");
        }
    }

    #[test]
    fn test_add_segment_accumulates() {
        let mut store = store(1, 4);
        store.advance_write_cursor(3);
        store.write_segment(0, &[1.0, 1.0], 0.5, 0.5);
        store.add_segment(0, &[2.0, 4.0], 0.5, 0.5);

        let mut out = [0.0; 2];
        store.read_segment(0, 3, &mut out);
        assert!((out[0] - 1.5).abs() < 1e-6);
        assert!((out[1] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_read_start_wraps_backwards() {
        let mut store = store(1, 100);
        store.advance_write_cursor(5);

        // (5 + 100 - 10) % 100 = 95
        assert_eq!(store.read_start(10), 95);
        assert_eq!(store.read_start(0), 5);
        assert_eq!(store.read_start(99), 6);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut store = store(2, 4);
        store.write_segment(0, &[1.0, 1.0], 1.0, 1.0);

        let mut out = [9.0; 2];
        store.read_segment(1, 0, &mut out);
        assert_eq!(out, [0.0, 0.0]);
    }

    /// Nothing written before a reset may be read after it, even at the
    /// offsets that were written.
    #[test]
    fn test_no_stale_data_across_reset() {
        let mut store = store(1, 32);
        for cursor_step in [0, 7, 13] {
            store.advance_write_cursor(cursor_step);
            store.write_segment(0, &[0.9; 20], 1.0, 1.0);
        }

        store.reset(1, 32);
        let mut out = [1.0; 20];
        for start in 0..32 {
            store.read_segment(0, start, &mut out);
            assert!(out.iter().all(|s| *s == 0.0), "stale data at {start}");

            // Reading leaves the slot silent, then a write lands exactly there.
            let mut probe = DelayStore::new();
            probe.reset(1, 32);
            probe.advance_write_cursor(start);
            probe.read_segment(0, start, &mut out);
            assert!(out.iter().all(|s| *s == 0.0));
            probe.write_segment(0, &[0.5; 20], 1.0, 1.0);
            probe.read_segment(0, start, &mut out);
            assert!(out.iter().all(|s| *s == 0.5));
        }
    }

    #[test]
    fn test_clear_silences_without_resizing() {
        let mut store = store(2, 8);
        store.write_segment(1, &[1.0; 8], 1.0, 1.0);
        store.advance_write_cursor(3);
        store.clear();

        assert_eq!(store.capacity(), 8);
        assert_eq!(store.write_cursor(), 0);
        let mut out = [1.0; 8];
        store.read_segment(1, 0, &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_empty_segments_are_no_ops() {
        let mut store = store(1, 4);
        store.write_segment(0, &[], 1.0, 1.0);
        store.read_segment(0, 0, &mut []);
        assert_eq!(store.write_cursor(), 0);
    }

    #[test]
    #[should_panic]
    fn test_oversized_segment_rejected() {
        let mut store = store(1, 4);
        store.write_segment(0, &[1.0; 5], 1.0, 1.0);
    }
}
