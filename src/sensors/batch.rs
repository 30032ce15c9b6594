//! Batch aggregation of sensor reading streams.
//!
//! T040: Implement BatchWindow with count-mode flushing
//! T041: Implement interval-mode flushing keyed on sample timestamps
//!
//! A [`BatchWindow`] regroups a continuous per-sensor stream into discrete
//! batches. There are no background timers: flushing is purely a function of
//! the samples observed, so a sensor that stops transmitting never spuriously
//! flushes and never blocks any other sensor's window.

use serde::{Deserialize, Serialize};

/// Anything carrying a sample timestamp in seconds.
pub trait Timestamped {
    fn timestamp(&self) -> f64;
}

/// How a sensor's readings are grouped into batches.
///
/// Absence of a mode for a sensor means "no batching": the pipeline keeps the
/// latest value (and records it, if recording) but never buffers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// No batching for this sensor
    Disabled,
    /// Flush when the span of buffered sample timestamps reaches this many seconds
    ByTimeInterval(f64),
    /// Flush every N samples
    BySampleCount(usize),
}

/// Accumulates readings for one sensor and flushes complete batches.
///
/// Interval mode compares the incoming sample's own timestamp against the
/// window start (taken from the first buffered sample), so BLE delivery
/// jitter does not distort batch boundaries. Count mode flushes exactly the
/// first N buffered samples and retains any excess for the next window.
#[derive(Debug)]
pub struct BatchWindow<T> {
    mode: CollectionMode,
    buffer: Vec<T>,
    window_start: Option<f64>,
}

impl<T: Timestamped> BatchWindow<T> {
    /// Create a window with the given collection mode.
    pub fn new(mode: CollectionMode) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
            window_start: None,
        }
    }

    /// The configured collection mode.
    pub fn mode(&self) -> CollectionMode {
        self.mode
    }

    /// Number of currently buffered samples.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append a sample; returns a complete batch if this sample closed the window.
    pub fn push(&mut self, sample: T) -> Option<Vec<T>> {
        match self.mode {
            CollectionMode::Disabled => None,
            CollectionMode::ByTimeInterval(interval) => {
                let ts = sample.timestamp();
                let start = *self.window_start.get_or_insert(ts);
                self.buffer.push(sample);

                if ts - start >= interval {
                    // Next window starts at the flushing sample's timestamp,
                    // not at zero, so windows stay contiguous in sample time.
                    self.window_start = Some(ts);
                    Some(std::mem::take(&mut self.buffer))
                } else {
                    None
                }
            }
            CollectionMode::BySampleCount(count) => {
                self.buffer.push(sample);

                if count > 0 && self.buffer.len() >= count {
                    Some(self.buffer.drain(..count).collect())
                } else {
                    None
                }
            }
        }
    }

    /// Clear the buffer and window start.
    ///
    /// Called whenever the mode, sensor selection, or target value changes so
    /// no partially-filled buffer crosses a configuration boundary.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.window_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample(f64);

    impl Timestamped for Sample {
        fn timestamp(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_count_mode_exact_fill() {
        let mut window = BatchWindow::new(CollectionMode::BySampleCount(5));

        for i in 0..4 {
            assert!(window.push(Sample(i as f64)).is_none());
        }
        let batch = window.push(Sample(4.0)).unwrap();

        assert_eq!(batch.len(), 5);
        assert!(window.is_empty());
    }

    #[test]
    fn test_count_mode_retains_excess() {
        let mut window = BatchWindow::new(CollectionMode::BySampleCount(3));

        assert!(window.push(Sample(0.0)).is_none());
        assert!(window.push(Sample(1.0)).is_none());
        let batch = window.push(Sample(2.0)).unwrap();
        assert_eq!(batch, vec![Sample(0.0), Sample(1.0), Sample(2.0)]);

        // The N+1th sample starts the next window.
        assert!(window.push(Sample(3.0)).is_none());
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_count_mode_buffer_below_threshold_after_flush() {
        let mut window = BatchWindow::new(CollectionMode::BySampleCount(2));

        for i in 0..10 {
            let flushed = window.push(Sample(i as f64));
            assert!(window.len() < 2);
            if i % 2 == 1 {
                assert_eq!(flushed.unwrap().len(), 2);
            } else {
                assert!(flushed.is_none());
            }
        }
    }

    #[test]
    fn test_interval_mode_flushes_on_sample_time() {
        let mut window = BatchWindow::new(CollectionMode::ByTimeInterval(1.0));

        // 0.25 s apart; the fifth sample reaches the 1 s span.
        assert!(window.push(Sample(10.0)).is_none());
        assert!(window.push(Sample(10.25)).is_none());
        assert!(window.push(Sample(10.5)).is_none());
        assert!(window.push(Sample(10.75)).is_none());
        let batch = window.push(Sample(11.0)).unwrap();

        assert_eq!(batch.len(), 5);
        assert!(window.is_empty());
    }

    #[test]
    fn test_interval_mode_window_start_moves_to_flush_sample() {
        let mut window = BatchWindow::new(CollectionMode::ByTimeInterval(1.0));

        window.push(Sample(0.0));
        assert!(window.push(Sample(1.0)).is_some());

        // Next window is measured from t=1.0, so t=1.5 must not flush but
        // t=2.0 must.
        assert!(window.push(Sample(1.5)).is_none());
        let batch = window.push(Sample(2.0)).unwrap();
        assert_eq!(batch, vec![Sample(1.5), Sample(2.0)]);
    }

    #[test]
    fn test_interval_mode_gap_flushes_immediately() {
        let mut window = BatchWindow::new(CollectionMode::ByTimeInterval(2.0));

        window.push(Sample(0.0));
        // A single sample far past the interval closes the window on arrival,
        // regardless of how long the wall-clock delivery gap was.
        let batch = window.push(Sample(30.0)).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_reset_clears_window_start() {
        let mut window = BatchWindow::new(CollectionMode::ByTimeInterval(1.0));

        window.push(Sample(5.0));
        window.reset();
        assert!(window.is_empty());

        // After reset the window start is re-anchored on the next sample.
        assert!(window.push(Sample(100.0)).is_none());
        assert!(window.push(Sample(100.5)).is_none());
        assert!(window.push(Sample(101.0)).is_some());
    }

    #[test]
    fn test_disabled_mode_buffers_nothing() {
        let mut window = BatchWindow::new(CollectionMode::Disabled);

        for i in 0..100 {
            assert!(window.push(Sample(i as f64)).is_none());
        }
        assert!(window.is_empty());
    }
}
