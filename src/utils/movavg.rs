//! Fixed-window moving average helper.

use std::collections::VecDeque;

/// Fixed-window moving average over integer samples, e.g. inter-arrival
/// times in millisecs or per-round frequency deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovingAverage {
    /// Maximum number of samples retained.
    window: usize,

    /// Retained samples, oldest in front.
    samples: VecDeque<i64>,

    /// Running sum of retained samples.
    sum: i64,
}

impl MovingAverage {
    /// Creates a new empty moving average of given window size.
    pub fn new(window: usize) -> Self {
        if window == 0 {
            panic!("invalid moving average window {}", window);
        }
        MovingAverage {
            window,
            samples: VecDeque::with_capacity(window),
            sum: 0,
        }
    }

    /// Reconstructs a moving average from persisted samples (oldest first),
    /// keeping only the newest `window` of them.
    pub fn from_samples(samples: Vec<i64>, window: usize) -> Self {
        let mut avg = Self::new(window);
        for sample in samples {
            avg.add(sample);
        }
        avg
    }

    /// Adds a sample, evicting the oldest one if the window is full.
    pub fn add(&mut self, sample: i64) {
        if self.samples.len() == self.window {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
    }

    /// Returns the mean of currently retained samples; 0.0 if none yet.
    #[inline]
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum as f64 / self.samples.len() as f64
        }
    }

    /// Returns the number of currently retained samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns an ordered snapshot of retained samples, oldest first.
    pub fn samples(&self) -> Vec<i64> {
        self.samples.iter().copied().collect()
    }
}
