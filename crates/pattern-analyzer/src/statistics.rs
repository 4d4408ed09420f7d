//! Statistical Features Computation

use obd_protocol::{Parameter, Sample};

/// Summary statistics for one signal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticalFeatures {
    /// Number of values summarised
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Mean absolute change between consecutive values
    pub rate_of_change: f64,
}

impl StatisticalFeatures {
    /// Compute statistical features from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::MAX, f64::min);
        let max = values.iter().copied().fold(f64::MIN, f64::max);

        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        let rate_of_change = if values.len() >= 2 {
            let total: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
            total / (values.len() - 1) as f64
        } else {
            0.0
        };

        Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
            rate_of_change,
        }
    }

    /// Present values of one parameter, in sample order
    pub fn extract<'a>(samples: impl IntoIterator<Item = &'a Sample>, parameter: Parameter) -> Vec<f64> {
        samples
            .into_iter()
            .filter_map(|sample| sample.get(parameter))
            .collect()
    }

    /// Mean ± `k` standard deviations
    pub fn spread(&self, k: f64) -> (f64, f64) {
        (self.mean - k * self.std_dev, self.mean + k * self.std_dev)
    }
}
