use crate::instrument_interface::{AcousticRecord, CurrentRecord, TrackRecord};
use crate::prelude::FusionResult;
use crate::storage::RecordTable;
use crate::targets::TrackAggregate;

/// Tables held by the registry, one per stream plus the merged track view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Track,
    TrackAggregate,
    Current,
    Acoustic,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Track => "track",
            TableKind::TrackAggregate => "track_aggregate",
            TableKind::Current => "current",
            TableKind::Acoustic => "acoustic",
        }
    }
}

/// Record types with a dedicated table; the accessor is resolved at compile time.
pub trait TableRecord: Sized {
    const KIND: TableKind;

    fn table(tables: &Tables) -> &RecordTable<Self>;
    fn table_mut(tables: &mut Tables) -> &mut RecordTable<Self>;
}

pub struct Tables {
    tracks: RecordTable<TrackRecord>,
    aggregates: RecordTable<TrackAggregate>,
    currents: RecordTable<CurrentRecord>,
    acoustic: RecordTable<AcousticRecord>,
}

impl Tables {
    pub fn new() -> Self {
        Self {
            tracks: RecordTable::new(TableKind::Track.as_str()),
            aggregates: RecordTable::new(TableKind::TrackAggregate.as_str()),
            currents: RecordTable::new(TableKind::Current.as_str()),
            acoustic: RecordTable::new(TableKind::Acoustic.as_str()),
        }
    }

    pub fn table<R: TableRecord>(&self) -> &RecordTable<R> {
        R::table(self)
    }

    pub fn get<R: TableRecord>(&self, index: usize) -> FusionResult<&R> {
        R::table(self).get(index)
    }

    pub fn insert<R: TableRecord>(&mut self, record: R) -> usize {
        R::table_mut(self).insert(record)
    }

    pub fn replace<R: TableRecord>(&mut self, index: usize, record: R) -> FusionResult<R> {
        R::table_mut(self).replace(index, record)
    }

    pub fn retain<R: TableRecord>(&mut self, index: usize) -> FusionResult<()> {
        R::table_mut(self).retain(index)
    }

    pub fn release<R: TableRecord>(&mut self, index: usize) -> FusionResult<bool> {
        R::table_mut(self).release(index)
    }

    pub fn live(&self, kind: TableKind) -> usize {
        match kind {
            TableKind::Track => self.tracks.live(),
            TableKind::TrackAggregate => self.aggregates.live(),
            TableKind::Current => self.currents.live(),
            TableKind::Acoustic => self.acoustic.live(),
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRecord for TrackRecord {
    const KIND: TableKind = TableKind::Track;

    fn table(tables: &Tables) -> &RecordTable<Self> {
        &tables.tracks
    }

    fn table_mut(tables: &mut Tables) -> &mut RecordTable<Self> {
        &mut tables.tracks
    }
}

impl TableRecord for TrackAggregate {
    const KIND: TableKind = TableKind::TrackAggregate;

    fn table(tables: &Tables) -> &RecordTable<Self> {
        &tables.aggregates
    }

    fn table_mut(tables: &mut Tables) -> &mut RecordTable<Self> {
        &mut tables.aggregates
    }
}

impl TableRecord for CurrentRecord {
    const KIND: TableKind = TableKind::Current;

    fn table(tables: &Tables) -> &RecordTable<Self> {
        &tables.currents
    }

    fn table_mut(tables: &mut Tables) -> &mut RecordTable<Self> {
        &mut tables.currents
    }
}

impl TableRecord for AcousticRecord {
    const KIND: TableKind = TableKind::Acoustic;

    fn table(tables: &Tables) -> &RecordTable<Self> {
        &tables.acoustic
    }

    fn table_mut(tables: &mut Tables) -> &mut RecordTable<Self> {
        &mut tables.acoustic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_route_to_their_own_table() {
        let mut tables = Tables::new();
        let current = tables.insert(CurrentRecord {
            timestamp: 1.0,
            speed: 0.3,
            heading: 0.0,
        });
        let acoustic = tables.insert(AcousticRecord {
            timestamp: 2.0,
            detection: "click".into(),
        });
        assert_eq!((current, acoustic), (0, 0));
        assert_eq!(tables.get::<CurrentRecord>(current).unwrap().speed, 0.3);
        assert_eq!(
            tables.get::<AcousticRecord>(acoustic).unwrap().detection,
            "click"
        );
        assert_eq!(tables.live(TableKind::Current), 1);
        assert_eq!(tables.live(TableKind::Track), 0);
        assert!(tables.get::<TrackRecord>(0).is_err());
        assert_eq!(<TrackAggregate as TableRecord>::KIND.as_str(), "track_aggregate");
    }
}
