use crate::prelude::{FusionError, FusionResult, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument streams the core accepts records from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Multibeam sonar tracker; the only identity-bearing stream.
    Track,
    /// Current profiler burst average.
    Current,
    /// Passive acoustic event detector.
    Acoustic,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Track => "track",
            StreamKind::Current => "current",
            StreamKind::Acoustic => "acoustic",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn missing_timestamp() -> Timestamp {
    f64::NAN
}

/// One sonar ping's view of a single track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    #[serde(default = "missing_timestamp")]
    pub timestamp: Timestamp,
    #[serde(rename = "id")]
    pub track_id: u32,
    pub pings_visible: u32,
    pub first_ping: u64,
    pub target_strength: f64,
    pub width: f64,
    pub height: f64,
    pub size_sq_m: f64,
    pub speed_mps: f64,
    pub min_angle_m: f64,
    pub min_range_m: f64,
    pub max_angle_m: f64,
    pub max_range_m: f64,
    pub last_pos_angle: f64,
    pub last_pos_range: f64,
}

impl TrackRecord {
    fn float_fields(&self) -> [(&'static str, f64); 13] {
        [
            ("timestamp", self.timestamp),
            ("target_strength", self.target_strength),
            ("width", self.width),
            ("height", self.height),
            ("size_sq_m", self.size_sq_m),
            ("speed_mps", self.speed_mps),
            ("min_angle_m", self.min_angle_m),
            ("min_range_m", self.min_range_m),
            ("max_angle_m", self.max_angle_m),
            ("max_range_m", self.max_range_m),
            ("last_pos_angle", self.last_pos_angle),
            ("last_pos_range", self.last_pos_range),
            ("pings_visible", self.pings_visible as f64),
        ]
    }

    pub fn validate(&self) -> FusionResult<()> {
        for (name, value) in self.float_fields() {
            if !value.is_finite() {
                return Err(malformed(StreamKind::Track, format!("{name} is not finite")));
            }
        }
        if self.min_range_m > self.max_range_m {
            return Err(malformed(
                StreamKind::Track,
                format!(
                    "min_range_m {} exceeds max_range_m {}",
                    self.min_range_m, self.max_range_m
                ),
            ));
        }
        if self.min_angle_m > self.max_angle_m {
            return Err(malformed(
                StreamKind::Track,
                format!(
                    "min_angle_m {} exceeds max_angle_m {}",
                    self.min_angle_m, self.max_angle_m
                ),
            ));
        }
        if self.last_pos_range < 0.0 {
            return Err(malformed(StreamKind::Track, "negative last_pos_range".into()));
        }
        Ok(())
    }
}

/// Burst-averaged ambient current. `heading` is radians clockwise from north.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentRecord {
    pub timestamp: Timestamp,
    pub speed: f64,
    pub heading: f64,
}

impl CurrentRecord {
    pub fn validate(&self) -> FusionResult<()> {
        if !self.timestamp.is_finite() || !self.speed.is_finite() || !self.heading.is_finite() {
            return Err(malformed(StreamKind::Current, "non-finite field".into()));
        }
        if self.speed < 0.0 {
            return Err(malformed(StreamKind::Current, "negative speed".into()));
        }
        Ok(())
    }
}

/// Detection reported by the passive acoustic monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcousticRecord {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub detection: String,
}

impl AcousticRecord {
    pub fn validate(&self) -> FusionResult<()> {
        if !self.timestamp.is_finite() {
            return Err(malformed(StreamKind::Acoustic, "non-finite timestamp".into()));
        }
        Ok(())
    }
}

/// Inbound record contract: `{"stream": "...", "timestamp": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum StreamRecord {
    Track(TrackRecord),
    Current(CurrentRecord),
    Acoustic(AcousticRecord),
}

impl StreamRecord {
    pub fn kind(&self) -> StreamKind {
        match self {
            StreamRecord::Track(_) => StreamKind::Track,
            StreamRecord::Current(_) => StreamKind::Current,
            StreamRecord::Acoustic(_) => StreamKind::Acoustic,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            StreamRecord::Track(r) => r.timestamp,
            StreamRecord::Current(r) => r.timestamp,
            StreamRecord::Acoustic(r) => r.timestamp,
        }
    }

    pub fn validate(&self) -> FusionResult<()> {
        match self {
            StreamRecord::Track(r) => r.validate(),
            StreamRecord::Current(r) => r.validate(),
            StreamRecord::Acoustic(r) => r.validate(),
        }
    }

    pub fn from_json(line: &str) -> FusionResult<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// All tracks reported by a single sonar ping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackBatch {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub tracks: Vec<TrackRecord>,
}

impl TrackBatch {
    pub fn from_json(line: &str) -> FusionResult<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Expands the batch into per-track records stamped with the ping time.
    pub fn into_records(self) -> Vec<StreamRecord> {
        let timestamp = self.timestamp;
        self.tracks
            .into_iter()
            .map(|mut track| {
                track.timestamp = timestamp;
                StreamRecord::Track(track)
            })
            .collect()
    }
}

fn malformed(stream: StreamKind, reason: String) -> FusionError {
    FusionError::MalformedRecord {
        stream: stream.to_string(),
        reason,
    }
}
