//! Startup configuration for the fusion core.
//!
//! Everything here is loaded once, validated, and then handed to the engine
//! by value; nothing reads configuration from ambient state afterwards.

use crate::classification::{Label, OutlierRules};
use crate::features::{AxisRange, Feature, FeatureMap};
use crate::prelude::{FusionError, FusionResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Deployment site; classified targets are tagged `<site>_auto`.
    pub site_name: String,
    /// Instruments in the order their flags appear in a trigger command.
    pub instruments: Vec<InstrumentConfig>,
    pub save: SaveConfig,
    /// Ambient current (m/s) at or above which track-only targets may trigger.
    pub current_threshold: f64,
    pub interesting_labels: Vec<Label>,
    pub classifier: ClassifierConfig,
    pub eligibility: EligibilityConfig,
    pub retention: RetentionConfig,
    pub features: FeatureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    pub role: InstrumentRole,
    /// Seconds of data the instrument keeps in its rolling buffer.
    pub buffer_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentRole {
    /// Acoustic recorder (hydrophones).
    Acoustic,
    /// Wide-field sensor that covers the whole sonar sector.
    WideField,
    /// Close-range sensor (camera, short-range imager) with a maximum range in metres.
    RangeLimited { max_range: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub buffer_overlap: f64,
    pub min_time_between_targets: f64,
    pub time_before_target: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub labels: Vec<Label>,
    pub axis_bounds: FeatureMap<AxisRange>,
    /// Neighbour search radius in scaled feature space.
    pub initial_radius: f64,
    pub radius_increment: f64,
    /// Two opposing neighbours closer than this in distance count as a tie.
    pub tie_threshold: f64,
    pub reliability: ReliabilityWeights,
    pub hyperspaces: Vec<HyperspaceRule>,
    /// Classifications between refits of the neighbour index.
    pub refit_count: usize,
}

/// Vote multipliers by provenance of the historical neighbour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityWeights {
    pub home_manual: f64,
    pub home_auto: f64,
    pub foreign_manual: f64,
    pub foreign_auto: f64,
}

/// Axis-aligned fallback rule. Axes left out are unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperspaceRule {
    #[serde(rename = "classification")]
    pub label: Label,
    #[serde(flatten)]
    pub ranges: FeatureMap<Option<AxisRange>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    /// Aggregated pings after which a track target is classified.
    pub max_pings: usize,
    /// Seconds without a ping after which a track target is classified.
    pub track_max_dwell: f64,
    /// Seconds an acoustic event waits for a track before standing alone.
    pub acoustic_max_wait: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Seconds after `last_seen` at which a finished target is retired.
    pub drop_target_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Minimum spacing (seconds) between pings sampled for delta-v.
    pub min_sample_interval: f64,
    /// Direction the centre of the sonar sector faces, degrees from north.
    pub platform_heading_deg: f64,
    /// Angular width of the sonar sector in degrees.
    pub sensor_fov_deg: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            site_name: "MSL".into(),
            instruments: vec![
                InstrumentConfig {
                    name: "m3".into(),
                    role: InstrumentRole::WideField,
                    buffer_size: 15.0,
                },
                InstrumentConfig {
                    name: "blueview".into(),
                    role: InstrumentRole::RangeLimited { max_range: 10.0 },
                    buffer_size: 15.0,
                },
                InstrumentConfig {
                    name: "hydrophones".into(),
                    role: InstrumentRole::Acoustic,
                    buffer_size: 15.0,
                },
                InstrumentConfig {
                    name: "camera".into(),
                    role: InstrumentRole::RangeLimited { max_range: 8.0 },
                    buffer_size: 15.0,
                },
            ],
            save: SaveConfig::default(),
            current_threshold: 0.25,
            interesting_labels: vec![
                "Marine Mammal".into(),
                "Small Fish".into(),
                "Outliers".into(),
            ],
            classifier: ClassifierConfig::default(),
            eligibility: EligibilityConfig::default(),
            retention: RetentionConfig::default(),
            features: FeatureConfig::default(),
        }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            buffer_overlap: 2.0,
            min_time_between_targets: 5.0,
            time_before_target: 5.0,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let unbounded = Some(AxisRange(f64::NEG_INFINITY, f64::INFINITY));
        Self {
            labels: vec!["Marine Mammal".into(), "Small Fish".into(), "Outliers".into()],
            axis_bounds: FeatureMap {
                size: AxisRange(0.0, 3.0),
                speed: AxisRange(0.0, 5.0),
                delta_v: AxisRange(0.0, 4.0),
                target_strength: AxisRange(0.0, 150.0),
                time_of_day: AxisRange(0.0, 720.0),
                current: AxisRange(-2.0, 2.0),
            },
            initial_radius: 0.15,
            radius_increment: 0.1,
            tie_threshold: 0.02,
            reliability: ReliabilityWeights::default(),
            hyperspaces: vec![
                HyperspaceRule {
                    label: "Marine Mammal".into(),
                    ranges: FeatureMap {
                        size: Some(AxisRange(0.25, 3.0)),
                        speed: Some(AxisRange(1.0, 5.0)),
                        delta_v: Some(AxisRange(0.5, 4.0)),
                        target_strength: Some(AxisRange(90.0, 150.0)),
                        ..Default::default()
                    },
                },
                HyperspaceRule {
                    label: "Small Fish".into(),
                    ranges: FeatureMap {
                        size: Some(AxisRange(0.0, 0.25)),
                        speed: Some(AxisRange(0.0, 1.0)),
                        delta_v: Some(AxisRange(0.0, 0.5)),
                        target_strength: Some(AxisRange(0.0, 90.0)),
                        ..Default::default()
                    },
                },
                HyperspaceRule {
                    label: "Outliers".into(),
                    ranges: FeatureMap {
                        size: unbounded,
                        speed: unbounded,
                        delta_v: unbounded,
                        target_strength: unbounded,
                        time_of_day: unbounded,
                        current: unbounded,
                    },
                },
            ],
            refit_count: 10,
        }
    }
}

impl Default for ReliabilityWeights {
    fn default() -> Self {
        Self {
            home_manual: 1.0,
            home_auto: 0.8,
            foreign_manual: 0.7,
            foreign_auto: 0.5,
        }
    }
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            max_pings: 10,
            track_max_dwell: 5.0,
            acoustic_max_wait: 10.0,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            drop_target_time: 30.0,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_sample_interval: 1.0,
            platform_heading_deg: 0.0,
            sensor_fov_deg: 120.0,
        }
    }
}

impl FusionConfig {
    pub fn instrument_names(&self) -> Vec<&str> {
        self.instruments.iter().map(|i| i.name.as_str()).collect()
    }

    pub fn validate(&self) -> FusionResult<()> {
        if self.site_name.trim().is_empty() {
            return Err(config_error("site_name must not be empty"));
        }
        self.validate_instruments()?;
        self.save.validate()?;
        if !self.current_threshold.is_finite() {
            return Err(config_error("current_threshold must be finite"));
        }
        self.classifier.validate()?;
        for label in &self.interesting_labels {
            if !self.classifier.labels.contains(label) {
                return Err(config_error(&format!(
                    "interesting label {:?} is not a known label",
                    label.as_str()
                )));
            }
        }
        self.eligibility.validate()?;
        if !(self.retention.drop_target_time > 0.0) {
            return Err(config_error("retention.drop_target_time must be positive"));
        }
        self.features.validate()
    }

    fn validate_instruments(&self) -> FusionResult<()> {
        if self.instruments.is_empty() {
            return Err(config_error("at least one instrument is required"));
        }
        let mut names = HashSet::new();
        for instrument in &self.instruments {
            if !names.insert(instrument.name.as_str()) {
                return Err(config_error(&format!(
                    "duplicate instrument {:?}",
                    instrument.name
                )));
            }
            if !(instrument.buffer_size > 0.0) {
                return Err(config_error(&format!(
                    "instrument {:?} needs a positive buffer_size",
                    instrument.name
                )));
            }
            if instrument.buffer_size < self.save.buffer_overlap
                || instrument.buffer_size < self.save.time_before_target
            {
                return Err(config_error(&format!(
                    "instrument {:?} buffer is shorter than the save overlap or lead time",
                    instrument.name
                )));
            }
            if let InstrumentRole::RangeLimited { max_range } = instrument.role {
                if !(max_range >= 0.0) {
                    return Err(config_error(&format!(
                        "instrument {:?} has an invalid max_range",
                        instrument.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl SaveConfig {
    fn validate(&self) -> FusionResult<()> {
        for (name, value) in [
            ("buffer_overlap", self.buffer_overlap),
            ("min_time_between_targets", self.min_time_between_targets),
            ("time_before_target", self.time_before_target),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(config_error(&format!("save.{name} must be a non-negative number")));
            }
        }
        Ok(())
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> FusionResult<()> {
        if self.labels.is_empty() {
            return Err(config_error("classifier.labels must not be empty"));
        }
        let unique: HashSet<&Label> = self.labels.iter().collect();
        if unique.len() != self.labels.len() {
            return Err(config_error("classifier.labels contains duplicates"));
        }
        for feature in Feature::ALL {
            let bounds = self.axis_bounds.get(feature);
            if !bounds.lo().is_finite() || !bounds.hi().is_finite() || bounds.lo() >= bounds.hi() {
                return Err(config_error(&format!(
                    "axis bounds for {} must be finite with min < max",
                    feature.as_str()
                )));
            }
        }
        if !(self.initial_radius > 0.0) || !(self.radius_increment >= 0.0) {
            return Err(config_error("classifier radius settings must be positive"));
        }
        if !(self.tie_threshold >= 0.0) {
            return Err(config_error("classifier.tie_threshold must be non-negative"));
        }
        if self.refit_count == 0 {
            return Err(config_error("classifier.refit_count must be at least 1"));
        }
        self.reliability.validate()?;
        if !self.hyperspaces.is_empty() {
            OutlierRules::new(self.hyperspaces.clone(), &self.labels)?;
        }
        Ok(())
    }
}

impl ReliabilityWeights {
    fn validate(&self) -> FusionResult<()> {
        let ordered = self.home_manual > self.home_auto
            && self.home_auto >= self.foreign_manual
            && self.foreign_manual > self.foreign_auto
            && self.foreign_auto > 0.0;
        if !ordered {
            return Err(config_error(
                "reliability weights must satisfy home_manual > home_auto >= foreign_manual > foreign_auto > 0",
            ));
        }
        Ok(())
    }
}

impl EligibilityConfig {
    fn validate(&self) -> FusionResult<()> {
        if self.max_pings == 0 {
            return Err(config_error("eligibility.max_pings must be at least 1"));
        }
        if !(self.track_max_dwell > 0.0) || !(self.acoustic_max_wait >= 0.0) {
            return Err(config_error("eligibility waits must be positive"));
        }
        Ok(())
    }
}

impl FeatureConfig {
    fn validate(&self) -> FusionResult<()> {
        if !(self.min_sample_interval >= 0.0) {
            return Err(config_error("features.min_sample_interval must be non-negative"));
        }
        if !(self.sensor_fov_deg > 0.0) || !self.platform_heading_deg.is_finite() {
            return Err(config_error("features sensor geometry is invalid"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> FusionError {
    FusionError::Config(message.to_string())
}
