use crate::instrument_interface::TrackRecord;
use crate::math::StatsHelper;
use crate::prelude::{FusionError, FusionResult};

/// Merged view of every ping folded into one track target.
///
/// Column policy:
/// - min: `first_ping`, `min_angle_m`, `min_range_m`
/// - max: `timestamp`, `pings_visible`, `max_angle_m`, `max_range_m`
/// - identity: `track_id` (must agree)
/// - mean: `target_strength`, `width`, `height`, `size_sq_m`, `speed_mps`
/// - most recent: `last_pos_angle`, `last_pos_range`
#[derive(Debug, Clone, PartialEq)]
pub struct TrackAggregate {
    pub merged: TrackRecord,
    /// Sorted track-table indices of the constituent pings.
    pub indices: Vec<usize>,
}

impl TrackAggregate {
    /// Recomputes the aggregate from all constituent pings. Members are folded
    /// in index order, so the result does not depend on arrival order.
    pub fn merge(members: &[(usize, &TrackRecord)]) -> FusionResult<Self> {
        let Some(&(_, first)) = members.first() else {
            return Err(FusionError::Internal("merge called without pings".into()));
        };
        let track_id = first.track_id;
        let mut members = members.to_vec();
        members.sort_by_key(|(index, _)| *index);
        if let Some((_, stray)) = members.iter().find(|(_, r)| r.track_id != track_id) {
            return Err(FusionError::IdentityMismatch {
                expected: track_id,
                found: stray.track_id,
            });
        }

        let column = |get: fn(&TrackRecord) -> f64| -> Vec<f64> {
            members.iter().map(|(_, r)| get(r)).collect()
        };

        let latest = members
            .iter()
            .map(|(_, r)| *r)
            .reduce(|best, r| {
                let newer = (r.timestamp, r.pings_visible) >= (best.timestamp, best.pings_visible);
                if newer {
                    r
                } else {
                    best
                }
            })
            .unwrap_or(first);

        let merged = TrackRecord {
            timestamp: StatsHelper::max(&column(|r| r.timestamp)),
            track_id,
            pings_visible: members
                .iter()
                .map(|(_, r)| r.pings_visible)
                .max()
                .unwrap_or(first.pings_visible),
            first_ping: members
                .iter()
                .map(|(_, r)| r.first_ping)
                .min()
                .unwrap_or(first.first_ping),
            target_strength: StatsHelper::mean(&column(|r| r.target_strength)),
            width: StatsHelper::mean(&column(|r| r.width)),
            height: StatsHelper::mean(&column(|r| r.height)),
            size_sq_m: StatsHelper::mean(&column(|r| r.size_sq_m)),
            speed_mps: StatsHelper::mean(&column(|r| r.speed_mps)),
            min_angle_m: StatsHelper::min(&column(|r| r.min_angle_m)),
            min_range_m: StatsHelper::min(&column(|r| r.min_range_m)),
            max_angle_m: StatsHelper::max(&column(|r| r.max_angle_m)),
            max_range_m: StatsHelper::max(&column(|r| r.max_range_m)),
            last_pos_angle: latest.last_pos_angle,
            last_pos_range: latest.last_pos_range,
        };

        let mut indices: Vec<usize> = members.iter().map(|(index, _)| *index).collect();
        indices.dedup();

        Ok(Self { merged, indices })
    }

    pub fn ping_count(&self) -> usize {
        self.indices.len()
    }
}
