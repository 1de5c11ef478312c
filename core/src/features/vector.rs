use serde::{Deserialize, Serialize};
use std::ops::Index;

pub const FEATURE_COUNT: usize = 6;

/// Classifier axes, in the fixed order used by every feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Size,
    Speed,
    DeltaV,
    TargetStrength,
    TimeOfDay,
    Current,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Size,
        Feature::Speed,
        Feature::DeltaV,
        Feature::TargetStrength,
        Feature::TimeOfDay,
        Feature::Current,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Size => "size",
            Feature::Speed => "speed",
            Feature::DeltaV => "deltav",
            Feature::TargetStrength => "target_strength",
            Feature::TimeOfDay => "time_of_day",
            Feature::Current => "current",
        }
    }
}

/// One value per classifier axis, addressable by [`Feature`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap<T> {
    pub size: T,
    pub speed: T,
    #[serde(rename = "deltav")]
    pub delta_v: T,
    pub target_strength: T,
    pub time_of_day: T,
    pub current: T,
}

impl<T> FeatureMap<T> {
    pub fn get(&self, feature: Feature) -> &T {
        match feature {
            Feature::Size => &self.size,
            Feature::Speed => &self.speed,
            Feature::DeltaV => &self.delta_v,
            Feature::TargetStrength => &self.target_strength,
            Feature::TimeOfDay => &self.time_of_day,
            Feature::Current => &self.current,
        }
    }
}

/// Inclusive `[lo, hi]` interval on one axis; either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange(pub f64, pub f64);

impl AxisRange {
    pub fn lo(&self) -> f64 {
        self.0
    }

    pub fn hi(&self) -> f64 {
        self.1
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.0 && value <= self.1
    }

    pub fn is_well_formed(&self) -> bool {
        !self.0.is_nan() && !self.1.is_nan() && self.0 <= self.1
    }
}

impl FeatureMap<AxisRange> {
    /// Maps raw values onto `[0, 1]` through `(value - min) / (max - min)`.
    pub fn scale(&self, raw: &FeatureVector) -> FeatureVector {
        let mut scaled = [0.0; FEATURE_COUNT];
        for feature in Feature::ALL {
            let bounds = self.get(feature);
            scaled[feature.index()] = (raw[feature] - bounds.lo()) / (bounds.hi() - bounds.lo());
        }
        FeatureVector(scaled)
    }

    pub fn unscale(&self, scaled: &FeatureVector) -> FeatureVector {
        let mut raw = [0.0; FEATURE_COUNT];
        for feature in Feature::ALL {
            let bounds = self.get(feature);
            raw[feature.index()] = scaled[feature] * (bounds.hi() - bounds.lo()) + bounds.lo();
        }
        FeatureVector(raw)
    }
}

/// `[size, speed, deltaV, strength, timeOfDay, current]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Index<Feature> for FeatureVector {
    type Output = f64;

    fn index(&self, feature: Feature) -> &f64 {
        &self.0[feature.index()]
    }
}
