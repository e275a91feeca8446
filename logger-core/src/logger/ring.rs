//! Fixed-capacity record ring with per-slot occupancy.

use crate::record::LogRecord;

/// Ordered slots, oldest at the head and newest at the tail.
///
/// Inserting shifts every slot one position toward the head. A record still
/// sitting in the head slot at that moment is evicted and handed back.
#[derive(Clone, Debug)]
pub struct RecordRing<const CAP: usize> {
    slots: [Option<LogRecord>; CAP],
}

impl<const CAP: usize> RecordRing<CAP> {
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: [None; CAP] }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Appends `record` at the tail, returning the evicted head if it was
    /// still occupied.
    pub fn push(&mut self, record: LogRecord) -> Option<LogRecord> {
        let Some(head) = self.slots.first_mut() else {
            return Some(record);
        };
        let evicted = head.take();
        self.slots.rotate_left(1);
        if let Some(tail) = self.slots.last_mut() {
            *tail = Some(record);
        }
        evicted
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Occupied slots from oldest to newest. Clearing a slot marks it flushed.
    pub fn occupied_mut(&mut self) -> impl Iterator<Item = &mut Option<LogRecord>> {
        self.slots.iter_mut().filter(|slot| slot.is_some())
    }

    /// Occupied records from oldest to newest.
    pub fn records(&self) -> impl Iterator<Item = &LogRecord> {
        self.slots.iter().flatten()
    }

    /// Empties every slot and returns how many were occupied.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        for slot in &mut self.slots {
            if slot.take().is_some() {
                dropped += 1;
            }
        }
        dropped
    }
}

impl<const CAP: usize> Default for RecordRing<CAP> {
    fn default() -> Self {
        Self::new()
    }
}
