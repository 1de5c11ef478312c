use crate::prelude::{FusionError, FusionResult};

struct Slot<R> {
    record: Option<R>,
    refs: u32,
}

/// Append-capable record storage whose slots are reused once every holder
/// has released them.
///
/// Indices are stable for as long as a slot has at least one reference; a
/// slot only returns to the free list when its count drops to zero, so an
/// index held by a live target can never alias a newer record.
pub struct RecordTable<R> {
    name: &'static str,
    slots: Vec<Slot<R>>,
    free: Vec<usize>,
}

impl<R> RecordTable<R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stores a record in a free slot (or a new one) with a single reference
    /// owned by the caller.
    pub fn insert(&mut self, record: R) -> usize {
        let slot = Slot {
            record: Some(record),
            refs: 1,
        };
        if let Some(index) = self.free.pop() {
            self.slots[index] = slot;
            index
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        }
    }

    pub fn get(&self, index: usize) -> FusionResult<&R> {
        self.slot(index)?
            .record
            .as_ref()
            .ok_or(FusionError::EmptySlot {
                table: self.name,
                index,
            })
    }

    pub fn get_mut(&mut self, index: usize) -> FusionResult<&mut R> {
        let name = self.name;
        self.slot_mut(index)?
            .record
            .as_mut()
            .ok_or(FusionError::EmptySlot { table: name, index })
    }

    /// Overwrites a live slot in place, returning the previous record.
    pub fn replace(&mut self, index: usize, record: R) -> FusionResult<R> {
        let current = self.get_mut(index)?;
        Ok(std::mem::replace(current, record))
    }

    pub fn retain(&mut self, index: usize) -> FusionResult<()> {
        self.get(index)?;
        let slot = self.slot_mut(index)?;
        slot.refs += 1;
        Ok(())
    }

    /// Drops one reference; returns `true` when the slot was emptied.
    pub fn release(&mut self, index: usize) -> FusionResult<bool> {
        self.get(index)?;
        let slot = self.slot_mut(index)?;
        slot.refs -= 1;
        if slot.refs > 0 {
            return Ok(false);
        }
        slot.record = None;
        self.free.push(index);
        Ok(true)
    }

    pub fn refs(&self, index: usize) -> FusionResult<u32> {
        self.get(index)?;
        Ok(self.slot(index)?.refs)
    }

    pub fn is_live(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|slot| slot.record.is_some())
            .unwrap_or(false)
    }

    /// Number of slots ever allocated, live or free.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn slot(&self, index: usize) -> FusionResult<&Slot<R>> {
        let len = self.slots.len();
        self.slots.get(index).ok_or(FusionError::IndexOutOfBounds {
            table: self.name,
            index,
            len,
        })
    }

    fn slot_mut(&mut self, index: usize) -> FusionResult<&mut Slot<R>> {
        let len = self.slots.len();
        let name = self.name;
        self.slots.get_mut(index).ok_or(FusionError::IndexOutOfBounds {
            table: name,
            index,
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_slot_is_reused_by_next_insert() {
        let mut table = RecordTable::new("test");
        let a = table.insert(1);
        let b = table.insert(2);
        assert_eq!((a, b), (0, 1));

        assert!(table.release(a).unwrap());
        assert!(!table.is_live(a));
        assert_eq!(table.insert(3), a);
        assert_eq!(*table.get(a).unwrap(), 3);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn retained_slot_survives_single_release() {
        let mut table = RecordTable::new("test");
        let index = table.insert("ping");
        table.retain(index).unwrap();
        assert_eq!(table.refs(index).unwrap(), 2);

        assert!(!table.release(index).unwrap());
        assert_eq!(table.insert("other"), 1);
        assert!(table.release(index).unwrap());
        assert_eq!(table.live(), 1);
    }

    #[test]
    fn out_of_bounds_and_empty_slots_are_errors() {
        let mut table = RecordTable::new("test");
        assert!(matches!(
            table.get(4),
            Err(FusionError::IndexOutOfBounds { index: 4, len: 0, .. })
        ));
        let index = table.insert(9u8);
        table.release(index).unwrap();
        assert!(matches!(table.get(index), Err(FusionError::EmptySlot { .. })));
        assert!(table.release(index).is_err());
    }

    #[test]
    fn replace_keeps_index_and_refcount() {
        let mut table = RecordTable::new("test");
        let index = table.insert(String::from("old"));
        let previous = table.replace(index, String::from("new")).unwrap();
        assert_eq!(previous, "old");
        assert_eq!(table.get(index).unwrap(), "new");
        assert_eq!(table.refs(index).unwrap(), 1);
    }
}
