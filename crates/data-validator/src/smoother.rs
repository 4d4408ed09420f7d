//! Per-parameter sample smoothing

use crate::filter::{Ewma, MedianFilter, MovingAverage};
use obd_protocol::{Parameter, Sample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Smoothing applied to every present value of a sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SmoothingMethod {
    /// Values pass through untouched
    #[default]
    None,
    /// Exponentially weighted moving average
    Ewma { alpha: f64 },
    /// Mean of the last `window` values
    MovingAverage { window: usize },
    /// Median of the last `window` values
    Median { window: usize },
}

#[derive(Debug, Clone)]
enum FilterState {
    Ewma(Ewma),
    MovingAverage(MovingAverage),
    Median(MedianFilter),
}

impl FilterState {
    fn filter(&mut self, value: f64) -> f64 {
        match self {
            FilterState::Ewma(f) => f.filter(value),
            FilterState::MovingAverage(f) => f.filter(value),
            FilterState::Median(f) => f.filter(value),
        }
    }
}

/// Stateful smoother keeping one filter per parameter
#[derive(Debug, Clone, Default)]
pub struct Smoother {
    method: SmoothingMethod,
    state: HashMap<Parameter, FilterState>,
}

impl Smoother {
    pub fn new(method: SmoothingMethod) -> Self {
        Self {
            method,
            state: HashMap::new(),
        }
    }

    pub fn method(&self) -> SmoothingMethod {
        self.method
    }

    fn new_filter(&self) -> Option<FilterState> {
        match self.method {
            SmoothingMethod::None => None,
            SmoothingMethod::Ewma { alpha } => Some(FilterState::Ewma(Ewma::new(alpha))),
            SmoothingMethod::MovingAverage { window } => {
                Some(FilterState::MovingAverage(MovingAverage::new(window)))
            }
            SmoothingMethod::Median { window } => Some(FilterState::Median(MedianFilter::new(window))),
        }
    }

    /// Replace every present value with its smoothed value
    pub fn smooth(&mut self, sample: &mut Sample) {
        if self.method == SmoothingMethod::None {
            return;
        }
        let present: Vec<(Parameter, f64)> = sample.iter().collect();
        for (parameter, value) in present {
            if !self.state.contains_key(&parameter) {
                if let Some(filter) = self.new_filter() {
                    self.state.insert(parameter, filter);
                }
            }
            if let Some(filter) = self.state.get_mut(&parameter) {
                sample.set(parameter, filter.filter(value));
            }
        }
    }

    /// Forget all filter history
    pub fn reset(&mut self) {
        self.state.clear();
    }
}
