//! Scalar filters for noise reduction

use std::collections::VecDeque;

/// Sliding window median filter for spike removal
#[derive(Debug, Clone)]
pub struct MedianFilter {
    window: VecDeque<f64>,
    size: usize,
}

impl MedianFilter {
    /// Create a new median filter; even sizes are rounded up to the next odd size
    pub fn new(size: usize) -> Self {
        let size = size.max(1) | 1;
        Self {
            window: VecDeque::with_capacity(size),
            size,
        }
    }

    /// Add a value and get the filtered output
    pub fn filter(&mut self, value: f64) -> f64 {
        if self.window.len() == self.size {
            self.window.pop_front();
        }
        self.window.push_back(value);

        // Pass through until the window is filled
        if self.window.len() < self.size {
            return value;
        }

        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        sorted[self.size / 2]
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Arithmetic mean of the last N values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: VecDeque<f64>,
    size: usize,
    sum: f64,
}

impl MovingAverage {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            window: VecDeque::with_capacity(size),
            size,
            sum: 0.0,
        }
    }

    /// Add a value and get the mean of the current window
    pub fn filter(&mut self, value: f64) -> f64 {
        if self.window.len() == self.size {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }
        self.window.push_back(value);
        self.sum += value;
        self.sum / self.window.len() as f64
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}

/// Exponentially weighted moving average
#[derive(Debug, Clone)]
pub struct Ewma {
    /// Smoothing factor (0-1, higher = more weight on recent)
    alpha: f64,
    mean: Option<f64>,
}

impl Ewma {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            mean: None,
        }
    }

    /// Add a value and get the updated mean; the first value seeds the mean
    pub fn filter(&mut self, value: f64) -> f64 {
        let mean = match self.mean {
            Some(mean) => mean + self.alpha * (value - mean),
            None => value,
        };
        self.mean = Some(mean);
        mean
    }

    /// Current estimate
    pub fn mean(&self) -> Option<f64> {
        self.mean
    }

    pub fn reset(&mut self) {
        self.mean = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_filter_basic() {
        let mut filter = MedianFilter::new(5);

        filter.filter(10.0);
        filter.filter(12.0);
        filter.filter(11.0);
        filter.filter(100.0); // outlier
        filter.filter(13.0);

        // Median of [12, 11, 100, 13, 12] = 12
        let result = filter.filter(12.0);
        assert!((result - 12.0).abs() < 0.01);
    }

    #[test]
    fn test_median_filter_removes_spike() {
        let mut filter = MedianFilter::new(5);
        for val in [10.0, 11.0, 10.0, 100.0, 10.0] {
            filter.filter(val);
        }
        assert!(filter.filter(11.0) < 20.0);
    }

    #[test]
    fn test_moving_average_window() {
        let mut avg = MovingAverage::new(3);
        assert_eq!(avg.filter(3.0), 3.0);
        assert_eq!(avg.filter(6.0), 4.5);
        assert_eq!(avg.filter(9.0), 6.0);
        assert_eq!(avg.filter(12.0), 9.0);
        avg.reset();
        assert_eq!(avg.filter(1.0), 1.0);
    }

    #[test]
    fn test_ewma_converges() {
        let mut ewma = Ewma::new(0.5);
        assert_eq!(ewma.filter(10.0), 10.0);
        assert_eq!(ewma.filter(20.0), 15.0);
        for _ in 0..50 {
            ewma.filter(20.0);
        }
        assert!((ewma.mean().unwrap() - 20.0).abs() < 1e-6);
        ewma.reset();
        assert_eq!(ewma.mean(), None);
    }
}
