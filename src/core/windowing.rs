//! Fixed-capacity sliding window over the most recent samples.

use crate::ingest::Sample;
use std::collections::VecDeque;

/// FIFO of the latest `capacity` samples.
///
/// Once full, every push evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, returning the evicted one if the window was full.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        if self.capacity == 0 {
            return Some(sample);
        }
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples oldest first, as one slice.
    pub fn samples(&mut self) -> &[Sample] {
        self.samples.make_contiguous()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: f64) -> Sample {
        Sample::new(v, 0.0, 0.0)
    }

    #[test]
    fn test_window_fills_then_slides() {
        let mut window = SampleWindow::new(4);
        for i in 1..=4 {
            assert!(!window.is_full());
            assert_eq!(window.push(sample(i as f64)), None);
        }
        assert!(window.is_full());

        // capacity + 1 pushes keep samples 2..=capacity+1
        assert_eq!(window.push(sample(5.0)), Some(sample(1.0)));
        let xs: Vec<f64> = window.samples().iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(window.len(), 4);
    }

    #[test]
    fn test_window_clear() {
        let mut window = SampleWindow::new(2);
        window.push(sample(1.0));
        window.push(sample(2.0));
        window.clear();
        assert!(window.is_empty());
        assert!(!window.is_full());
        assert_eq!(window.capacity(), 2);
    }
}
