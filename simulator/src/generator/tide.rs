use fusioncore::instrument_interface::CurrentRecord;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Semi-diurnal tidal current seen by the current profiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TideProfile {
    /// Peak current speed in m/s.
    pub amplitude: f64,
    /// Full flood/ebb cycle in seconds.
    pub period: f64,
    /// Flood direction, radians clockwise from north.
    pub flood_heading: f64,
    /// Seconds between profiler bursts.
    pub interval: f64,
}

impl Default for TideProfile {
    fn default() -> Self {
        Self {
            amplitude: 0.6,
            period: 44_712.0,
            flood_heading: 0.35,
            interval: 30.0,
        }
    }
}

impl TideProfile {
    /// Current burst at `timestamp`; the heading flips on the ebb.
    pub fn sample(&self, timestamp: f64) -> CurrentRecord {
        let phase = (2.0 * PI * timestamp / self.period).sin();
        let heading = if phase >= 0.0 {
            self.flood_heading
        } else {
            (self.flood_heading + PI) % (2.0 * PI)
        };
        CurrentRecord {
            timestamp,
            speed: self.amplitude * phase.abs(),
            heading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_water_at_the_turn() {
        let tide = TideProfile::default();
        assert!(tide.sample(0.0).speed.abs() < 1e-12);
        let peak = tide.sample(tide.period / 4.0);
        assert!((peak.speed - tide.amplitude).abs() < 1e-9);
        assert_eq!(peak.heading, tide.flood_heading);
    }

    #[test]
    fn ebb_reverses_heading() {
        let tide = TideProfile::default();
        let ebb = tide.sample(tide.period * 0.75);
        assert!((ebb.heading - (tide.flood_heading + PI)).abs() < 1e-9);
        assert!(ebb.validate().is_ok());
    }
}
