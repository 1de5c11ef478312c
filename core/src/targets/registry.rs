use crate::instrument_interface::{AcousticRecord, CurrentRecord, TrackRecord};
use crate::prelude::{FusionError, FusionResult, Timestamp};
use crate::storage::{TableKind, Tables};
use crate::targets::{Provenance, RecordRefs, Target, TargetId, TargetState, TrackAggregate};
use crate::telemetry::LogManager;
use std::collections::BTreeMap;

/// Live targets plus the tables their record references point into.
///
/// Every table slot is reference counted: a slot stays occupied while any
/// target (or the registry's own "latest" pointer) holds it, and is returned
/// to the free list only when the last holder releases it.
pub struct TargetRegistry {
    site: String,
    tables: Tables,
    targets: BTreeMap<TargetId, Target>,
    next_id: TargetId,
    latest_current: Option<usize>,
    latest_acoustic: Option<usize>,
    logger: LogManager,
}

impl TargetRegistry {
    pub fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            tables: Tables::new(),
            targets: BTreeMap::new(),
            next_id: 1,
            latest_current: None,
            latest_acoustic: None,
            logger: LogManager::new("registry"),
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut Tables {
        &mut self.tables
    }

    /// Targets created since startup, live or not.
    pub fn created(&self) -> usize {
        (self.next_id - 1) as usize
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, id: TargetId) -> FusionResult<&Target> {
        self.targets.get(&id).ok_or(FusionError::UnknownTarget(id))
    }

    pub fn get_mut(&mut self, id: TargetId) -> FusionResult<&mut Target> {
        self.targets.get_mut(&id).ok_or(FusionError::UnknownTarget(id))
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn ids_where(&self, predicate: impl Fn(&Target) -> bool) -> Vec<TargetId> {
        self.targets
            .values()
            .filter(|t| predicate(t))
            .map(|t| t.id)
            .collect()
    }

    /// Creates an `Open` target that already owns the slots named in `refs`.
    pub fn create_target(&mut self, seen: Timestamp, refs: RecordRefs) -> TargetId {
        let id = self.next_id;
        self.next_id += 1;
        let target = Target::new(id, Provenance::auto(&self.site), seen, refs);
        self.targets.insert(id, target);
        self.logger.detail(&format!("target {} created at {:.3}", id, seen));
        id
    }

    /// Live target currently carrying `track_id`, most recent first.
    pub fn find_by_track(&self, track_id: u32) -> Option<TargetId> {
        self.targets
            .values()
            .rev()
            .find(|t| t.track_id == Some(track_id))
            .map(|t| t.id)
    }

    /// Stores the first ping of a new track and wraps it in a target.
    pub fn start_track_target(&mut self, record: TrackRecord) -> FusionResult<TargetId> {
        let seen = record.timestamp;
        let track_id = record.track_id;
        let ping = self.tables.insert(record);
        let aggregate = {
            let first = self.tables.get::<TrackRecord>(ping)?;
            TrackAggregate::merge(&[(ping, first)])?
        };
        let aggregate = self.tables.insert(aggregate);
        let id = self.create_target(
            seen,
            RecordRefs {
                aggregate: Some(aggregate),
                ..Default::default()
            },
        );
        self.get_mut(id)?.track_id = Some(track_id);
        Ok(id)
    }

    /// Folds one more ping into the target's aggregate and returns the new ping count.
    pub fn merge_ping(&mut self, id: TargetId, record: TrackRecord) -> FusionResult<usize> {
        let aggregate_index = self
            .get(id)?
            .refs
            .aggregate
            .ok_or_else(|| FusionError::Internal(format!("target {} has no track aggregate", id)))?;
        let seen = record.timestamp;
        let ping = self.tables.insert(record);

        let merged = {
            let mut indices = self.tables.get::<TrackAggregate>(aggregate_index)?.indices.clone();
            indices.push(ping);
            let members = indices
                .iter()
                .map(|&index| self.tables.get::<TrackRecord>(index).map(|r| (index, r)))
                .collect::<FusionResult<Vec<_>>>()?;
            TrackAggregate::merge(&members)
        };
        let merged = match merged {
            Ok(merged) => merged,
            Err(err) => {
                self.tables.release::<TrackRecord>(ping)?;
                return Err(err);
            }
        };

        let count = merged.ping_count();
        self.tables.replace(aggregate_index, merged)?;
        self.get_mut(id)?.touch(seen);
        Ok(count)
    }

    pub fn aggregate(&self, target: &Target) -> FusionResult<Option<&TrackAggregate>> {
        target
            .refs
            .aggregate
            .map(|index| self.tables.get::<TrackAggregate>(index))
            .transpose()
    }

    /// Constituent pings of the target, in table-index order.
    pub fn pings(&self, target: &Target) -> FusionResult<Vec<&TrackRecord>> {
        match self.aggregate(target)? {
            Some(aggregate) => aggregate
                .indices
                .iter()
                .map(|&index| self.tables.get::<TrackRecord>(index))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the global latest-current pointer.
    pub fn set_latest_current(&mut self, record: CurrentRecord) -> FusionResult<usize> {
        let index = self.tables.insert(record);
        if let Some(previous) = self.latest_current.replace(index) {
            self.tables.release::<CurrentRecord>(previous)?;
        }
        Ok(index)
    }

    pub fn latest_current(&self) -> FusionResult<Option<&CurrentRecord>> {
        self.latest_current
            .map(|index| self.tables.get::<CurrentRecord>(index))
            .transpose()
    }

    /// Replaces the global latest-acoustic pointer.
    pub fn set_latest_acoustic(&mut self, record: AcousticRecord) -> FusionResult<usize> {
        let index = self.tables.insert(record);
        if let Some(previous) = self.latest_acoustic.replace(index) {
            self.tables.release::<AcousticRecord>(previous)?;
        }
        Ok(index)
    }

    pub fn latest_acoustic_index(&self) -> Option<usize> {
        self.latest_acoustic
    }

    /// Pins the latest current reading to the target, replacing any earlier pin.
    pub fn pin_current(&mut self, id: TargetId) -> FusionResult<()> {
        let latest = self.latest_current;
        if let Some(index) = latest {
            self.tables.retain::<CurrentRecord>(index)?;
        }
        let previous = std::mem::replace(&mut self.get_mut(id)?.refs.current, latest);
        if let Some(previous) = previous {
            self.tables.release::<CurrentRecord>(previous)?;
        }
        Ok(())
    }

    pub fn current_of(&self, target: &Target) -> FusionResult<Option<&CurrentRecord>> {
        target
            .refs
            .current
            .map(|index| self.tables.get::<CurrentRecord>(index))
            .transpose()
    }

    /// Gives the target its own reference on an acoustic slot. Returns false
    /// when the target already carries one.
    pub fn attach_acoustic(&mut self, id: TargetId, index: usize) -> FusionResult<bool> {
        if self.get(id)?.has_acoustic() {
            return Ok(false);
        }
        self.tables.retain::<AcousticRecord>(index)?;
        self.get_mut(id)?.refs.acoustic = Some(index);
        Ok(true)
    }

    pub fn acoustic_of(&self, target: &Target) -> FusionResult<Option<&AcousticRecord>> {
        target
            .refs
            .acoustic
            .map(|index| self.tables.get::<AcousticRecord>(index))
            .transpose()
    }

    /// Finished targets whose `last_seen` is older than `drop_after` seconds.
    pub fn retirable(&self, now: Timestamp, drop_after: f64) -> Vec<TargetId> {
        self.ids_where(|t| t.state.is_finished() && now - t.last_seen > drop_after)
    }

    /// Removes a finished target and releases every slot it referenced.
    pub fn retire(&mut self, id: TargetId) -> FusionResult<Target> {
        self.get_mut(id)?.transition(TargetState::Retired)?;
        let target = self
            .targets
            .remove(&id)
            .ok_or(FusionError::UnknownTarget(id))?;

        if let Some(aggregate_index) = target.refs.aggregate {
            let pings = self.tables.get::<TrackAggregate>(aggregate_index)?.indices.clone();
            for ping in pings {
                self.tables.release::<TrackRecord>(ping)?;
            }
            self.tables.release::<TrackAggregate>(aggregate_index)?;
        }
        if let Some(current) = target.refs.current {
            self.tables.release::<CurrentRecord>(current)?;
        }
        if let Some(acoustic) = target.refs.acoustic {
            self.tables.release::<AcousticRecord>(acoustic)?;
        }
        self.logger.detail(&format!(
            "target {} retired, {} track slots live",
            id,
            self.tables.live(TableKind::Track)
        ));
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(timestamp: f64, track_id: u32, pings_visible: u32) -> TrackRecord {
        TrackRecord {
            timestamp,
            track_id,
            pings_visible,
            target_strength: 80.0,
            size_sq_m: 0.2,
            speed_mps: 0.6,
            min_range_m: 4.0,
            max_range_m: 6.0,
            last_pos_range: 5.0,
            ..Default::default()
        }
    }

    fn finish(registry: &mut TargetRegistry, id: TargetId) {
        let target = registry.get_mut(id).unwrap();
        target.transition(TargetState::Abandoned).unwrap();
    }

    #[test]
    fn merge_grows_the_aggregate_and_refreshes_last_seen() {
        let mut registry = TargetRegistry::new("MSL");
        let id = registry.start_track_target(ping(1.0, 42, 1)).unwrap();
        assert_eq!(registry.merge_ping(id, ping(1.4, 42, 2)).unwrap(), 2);
        assert_eq!(registry.merge_ping(id, ping(1.8, 42, 3)).unwrap(), 3);

        let target = registry.get(id).unwrap();
        assert_eq!(target.last_seen, 1.8);
        assert_eq!(target.first_seen, 1.0);
        assert_eq!(target.track_id, Some(42));
        let aggregate = registry.aggregate(target).unwrap().unwrap();
        assert_eq!(aggregate.merged.pings_visible, 3);
        assert_eq!(registry.pings(target).unwrap().len(), 3);
        assert_eq!(registry.find_by_track(42), Some(id));
    }

    #[test]
    fn identity_mismatch_releases_the_rejected_ping() {
        let mut registry = TargetRegistry::new("MSL");
        let id = registry.start_track_target(ping(1.0, 42, 1)).unwrap();
        let err = registry.merge_ping(id, ping(1.5, 7, 2)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(registry.tables().live(TableKind::Track), 1);
    }

    #[test]
    fn retirement_frees_exactly_the_held_slots() {
        let mut registry = TargetRegistry::new("MSL");
        let first = registry.start_track_target(ping(1.0, 1, 1)).unwrap();
        registry.merge_ping(first, ping(2.0, 1, 2)).unwrap();
        let second = registry.start_track_target(ping(1.5, 2, 1)).unwrap();
        assert_eq!(registry.tables().live(TableKind::Track), 3);

        assert!(registry.retire(first).is_err());
        finish(&mut registry, first);
        let retired = registry.retire(first).unwrap();
        assert_eq!(retired.state, TargetState::Retired);
        assert_eq!(registry.tables().live(TableKind::Track), 1);
        assert_eq!(registry.tables().live(TableKind::TrackAggregate), 1);

        // Freed slots are reused without disturbing the surviving target.
        let third = registry.start_track_target(ping(3.0, 3, 1)).unwrap();
        let survivor = registry.get(second).unwrap();
        assert_eq!(registry.pings(survivor).unwrap()[0].track_id, 2);
        let fresh = registry.get(third).unwrap();
        assert_eq!(registry.pings(fresh).unwrap()[0].track_id, 3);
    }

    #[test]
    fn pinned_current_outlives_the_latest_pointer() {
        let mut registry = TargetRegistry::new("MSL");
        let id = registry.start_track_target(ping(1.0, 9, 1)).unwrap();
        registry
            .set_latest_current(CurrentRecord {
                timestamp: 1.0,
                speed: 0.3,
                heading: 0.0,
            })
            .unwrap();
        registry.pin_current(id).unwrap();
        registry
            .set_latest_current(CurrentRecord {
                timestamp: 2.0,
                speed: 0.1,
                heading: 0.0,
            })
            .unwrap();

        let target = registry.get(id).unwrap();
        assert_eq!(registry.current_of(target).unwrap().unwrap().speed, 0.3);
        assert_eq!(registry.latest_current().unwrap().unwrap().speed, 0.1);
        assert_eq!(registry.tables().live(TableKind::Current), 2);

        finish(&mut registry, id);
        registry.retire(id).unwrap();
        assert_eq!(registry.tables().live(TableKind::Current), 1);
    }

    #[test]
    fn acoustic_attaches_once_per_target() {
        let mut registry = TargetRegistry::new("MSL");
        let id = registry.start_track_target(ping(1.0, 5, 1)).unwrap();
        let index = registry
            .set_latest_acoustic(AcousticRecord {
                timestamp: 1.2,
                detection: "click".into(),
            })
            .unwrap();
        assert!(registry.attach_acoustic(id, index).unwrap());
        assert!(!registry.attach_acoustic(id, index).unwrap());
        assert_eq!(registry.tables().table::<AcousticRecord>().refs(index).unwrap(), 2);
    }
}
