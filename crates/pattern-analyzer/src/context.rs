//! Driving context classification

use obd_protocol::{Parameter, Sample};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the car is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingContext {
    CityTraffic,
    HighwayCruising,
    PerformanceDriving,
    NormalCruising,
    Deceleration,
    Transitional,
}

impl DrivingContext {
    pub const ALL: [DrivingContext; 6] = [
        DrivingContext::CityTraffic,
        DrivingContext::HighwayCruising,
        DrivingContext::PerformanceDriving,
        DrivingContext::NormalCruising,
        DrivingContext::Deceleration,
        DrivingContext::Transitional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DrivingContext::CityTraffic => "city_traffic",
            DrivingContext::HighwayCruising => "highway_cruising",
            DrivingContext::PerformanceDriving => "performance_driving",
            DrivingContext::NormalCruising => "normal_cruising",
            DrivingContext::Deceleration => "deceleration",
            DrivingContext::Transitional => "transitional",
        }
    }

    /// Steady-state cruising, counted towards efficiency
    pub fn is_cruising(self) -> bool {
        matches!(self, DrivingContext::HighwayCruising | DrivingContext::NormalCruising)
    }
}

impl fmt::Display for DrivingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification thresholds (throttle %, rpm, boost PSI, speed km/h)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextThresholds {
    pub performance_throttle: f64,
    pub performance_rpm: f64,
    pub performance_boost: f64,
    pub deceleration_throttle: f64,
    pub city_speed: f64,
    pub highway_speed: f64,
    pub highway_throttle: (f64, f64),
    pub cruise_throttle_max: f64,
}

impl Default for ContextThresholds {
    fn default() -> Self {
        Self {
            performance_throttle: 80.0,
            performance_rpm: 4000.0,
            performance_boost: 15.0,
            deceleration_throttle: 5.0,
            city_speed: 30.0,
            highway_speed: 80.0,
            highway_throttle: (10.0, 40.0),
            cruise_throttle_max: 40.0,
        }
    }
}

impl ContextThresholds {
    /// Classify a sample; the first matching rule wins
    pub fn classify(&self, sample: &Sample) -> DrivingContext {
        let throttle = sample.get(Parameter::ThrottlePosition);
        let rpm = sample.get(Parameter::Rpm);
        let boost = sample.get(Parameter::BoostPressure);

        let hard_throttle = matches!((throttle, rpm), (Some(t), Some(r))
            if t > self.performance_throttle && r > self.performance_rpm);
        if hard_throttle || boost.is_some_and(|b| b > self.performance_boost) {
            return DrivingContext::PerformanceDriving;
        }

        let Some(speed) = sample.get(Parameter::Speed) else {
            return DrivingContext::Transitional;
        };

        if throttle.is_some_and(|t| t < self.deceleration_throttle) && speed >= self.city_speed {
            return DrivingContext::Deceleration;
        }
        if speed < self.city_speed {
            return DrivingContext::CityTraffic;
        }

        let Some(throttle) = throttle else {
            return DrivingContext::Transitional;
        };
        let (low, high) = self.highway_throttle;
        if speed >= self.highway_speed && (low..=high).contains(&throttle) {
            DrivingContext::HighwayCruising
        } else if speed < self.highway_speed && throttle <= self.cruise_throttle_max {
            DrivingContext::NormalCruising
        } else {
            DrivingContext::Transitional
        }
    }
}
