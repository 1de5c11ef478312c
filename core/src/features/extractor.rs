use crate::config::FeatureConfig;
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::instrument_interface::TrackRecord;
use crate::math::{GeometryHelper, StatsHelper};
use crate::prelude::{FusionResult, Timestamp};
use crate::targets::{Target, TargetRegistry};
use chrono::{DateTime, Timelike};

const MINUTES_PER_DAY: f64 = 1440.0;

/// Derives the classifier feature vector from a target's stored records.
///
/// Everything is read back from the registry tables, so repeating the call for
/// the same target yields the same vector.
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, registry: &TargetRegistry, target: &Target) -> FusionResult<FeatureVector> {
        let current = registry.current_of(target)?;
        let current_vector = current
            .map(|c| GeometryHelper::heading_vector(c.speed, c.heading))
            .unwrap_or((0.0, 0.0));
        let current_speed = current.map(|c| c.speed).unwrap_or(0.0);

        let mut features = [0.0; FEATURE_COUNT];
        let mut observed_at = target.first_seen;
        if let Some(aggregate) = registry.aggregate(target)? {
            let merged = &aggregate.merged;
            features[0] = merged.size_sq_m;
            features[1] = merged.speed_mps;
            features[3] = merged.target_strength;
            observed_at = merged.timestamp;

            let pings = registry.pings(target)?;
            features[2] = self.delta_v(&pings, current_vector);
        }
        features[4] = Self::time_of_day(observed_at);
        features[5] = current_speed;

        Ok(FeatureVector(features))
    }

    /// Minutes since midnight UTC, folded around noon so 23:50 sits next to 00:10.
    pub fn time_of_day(timestamp: Timestamp) -> f64 {
        let seconds = timestamp.floor() as i64;
        let minutes = DateTime::from_timestamp(seconds, 0)
            .map(|t| t.num_seconds_from_midnight() as f64 / 60.0)
            .unwrap_or(0.0);
        minutes.min(MINUTES_PER_DAY - minutes)
    }

    /// Largest speed of the track relative to the water between subsampled pings.
    fn delta_v(&self, pings: &[&TrackRecord], current: (f64, f64)) -> f64 {
        let mut ordered: Vec<&TrackRecord> = pings.to_vec();
        ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut samples: Vec<&TrackRecord> = Vec::with_capacity(ordered.len());
        for ping in ordered {
            match samples.last() {
                Some(last) if ping.timestamp - last.timestamp < self.config.min_sample_interval => {}
                _ => samples.push(ping),
            }
        }
        if samples.len() < 2 {
            return 0.0;
        }

        let position = |ping: &TrackRecord| {
            GeometryHelper::sector_to_cartesian(
                ping.last_pos_range,
                ping.last_pos_angle,
                self.config.platform_heading_deg,
                self.config.sensor_fov_deg,
            )
        };

        let deltas: Vec<f64> = samples
            .windows(2)
            .filter_map(|pair| {
                let elapsed = pair[1].timestamp - pair[0].timestamp;
                if elapsed <= 0.0 {
                    return None;
                }
                let (x0, y0) = position(pair[0]);
                let (x1, y1) = position(pair[1]);
                let velocity = ((x1 - x0) / elapsed, (y1 - y0) / elapsed);
                Some(StatsHelper::norm(&[velocity.0 - current.0, velocity.1 - current.1]))
            })
            .collect();

        if deltas.is_empty() {
            0.0
        } else {
            StatsHelper::max(&deltas)
        }
    }
}
