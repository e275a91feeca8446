//! Device event journal shared by firmware and host targets.
//!
//! Behaviors never print directly. They append [`DeviceEvent`]s to a bounded
//! [`Journal`] and the platform layer decides how to surface them: `defmt`
//! on the MCU, stdout in the emulator. Records carry a wrapping id so a
//! consumer can resume from the last entry it emitted.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::button::ButtonEvent;
use crate::logger::StorageFault;
use crate::scheduler::{InhibitMask, TaskId};
use crate::time::Millis;
use crate::tone::TonePattern;

/// Identifier attached to every journal record.
pub type EventId = u32;

/// Total number of journal entries retained in memory.
pub const JOURNAL_CAPACITY: usize = 64;

/// Discriminated events emitted by the orchestration core.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceEvent {
    Button(ButtonEvent),
    RecordingStarted { file_number: u32 },
    RecordingStopped { file_number: u32, discarded: u16 },
    FileOpenFailed { file_number: u32 },
    /// The active file filled up and the session continued in a new one.
    FileRolled { file_number: u32 },
    Flushed { written: u16, failed: u16 },
    Storage(StorageFault),
    RecordEvicted,
    SampleRejected,
    ToneStarted(TonePattern),
    ToneStopped,
    CalibrationStarted,
    CalibrationComplete,
    CalibrationSaveFailed,
    SensorReadFailed,
    InhibitionChanged(InhibitMask),
    SelfInhibitionIgnored(TaskId),
    ClockWrapped,
    OutboxOverflow,
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceEvent::Button(event) => write!(f, "button {event}"),
            DeviceEvent::RecordingStarted { file_number } => {
                write!(f, "recording-started file={file_number}")
            }
            DeviceEvent::RecordingStopped {
                file_number,
                discarded,
            } => write!(
                f,
                "recording-stopped file={file_number} discarded={discarded}"
            ),
            DeviceEvent::FileOpenFailed { file_number } => {
                write!(f, "file-open-failed file={file_number}")
            }
            DeviceEvent::FileRolled { file_number } => {
                write!(f, "file-rolled file={file_number}")
            }
            DeviceEvent::Flushed { written, failed } => {
                write!(f, "flushed written={written} failed={failed}")
            }
            DeviceEvent::Storage(fault) => write!(f, "storage-fault {fault}"),
            DeviceEvent::RecordEvicted => f.write_str("record-evicted"),
            DeviceEvent::SampleRejected => f.write_str("sample-rejected"),
            DeviceEvent::ToneStarted(pattern) => write!(f, "tone-started {pattern}"),
            DeviceEvent::ToneStopped => f.write_str("tone-stopped"),
            DeviceEvent::CalibrationStarted => f.write_str("calibration-started"),
            DeviceEvent::CalibrationComplete => f.write_str("calibration-complete"),
            DeviceEvent::CalibrationSaveFailed => f.write_str("calibration-save-failed"),
            DeviceEvent::SensorReadFailed => f.write_str("sensor-read-failed"),
            DeviceEvent::InhibitionChanged(mask) => write!(f, "inhibition {mask}"),
            DeviceEvent::SelfInhibitionIgnored(id) => {
                write!(f, "self-inhibition-ignored {id}")
            }
            DeviceEvent::ClockWrapped => f.write_str("clock-wrapped"),
            DeviceEvent::OutboxOverflow => f.write_str("outbox-overflow"),
        }
    }
}

/// Journal entry stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct JournalRecord {
    pub id: EventId,
    pub timestamp: Millis,
    pub event: DeviceEvent,
}

impl fmt::Display for JournalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} t={} {}", self.id, self.timestamp, self.event)
    }
}

/// Records device events into a fixed-size ring buffer.
pub struct Journal<const CAPACITY: usize = JOURNAL_CAPACITY> {
    ring: HistoryBuf<JournalRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> Journal<CAPACITY> {
    /// Creates an empty journal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Appends an event stamped with `timestamp`.
    pub fn record(&mut self, event: DeviceEvent, timestamp: Millis) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(JournalRecord {
            id,
            timestamp,
            event,
        });

        id
    }

    /// Returns an iterator over the retained records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, JournalRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the retained records whose id is at or after `cursor`.
    ///
    /// Ids wrap, so "after" is judged by the distance from the next id to be
    /// issued rather than by plain comparison.
    pub fn since(&self, cursor: EventId) -> impl Iterator<Item = &JournalRecord> {
        let backlog = self.next_event_id.wrapping_sub(cursor);
        let next = self.next_event_id;
        self.ring
            .oldest_ordered()
            .filter(move |record| next.wrapping_sub(record.id) <= backlog)
    }

    /// Id that the next recorded event will receive.
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Returns the most recent record, if any.
    pub fn latest(&self) -> Option<&JournalRecord> {
        self.ring.recent()
    }

    /// Returns the number of retained records.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns `true` when any retained record matches `predicate`.
    pub fn contains(&self, mut predicate: impl FnMut(&DeviceEvent) -> bool) -> bool {
        self.ring
            .oldest_ordered()
            .any(|record| predicate(&record.event))
    }
}

impl<const CAPACITY: usize> Default for Journal<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_events_in_order_with_increasing_ids() {
        let mut journal = Journal::<4>::new();

        let first = journal.record(DeviceEvent::ToneStopped, Millis::new(10));
        let second = journal.record(DeviceEvent::ClockWrapped, Millis::new(20));

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        let events: heapless::Vec<DeviceEvent, 4> =
            journal.oldest_first().map(|record| record.event).collect();
        assert_eq!(
            events.as_slice(),
            &[DeviceEvent::ToneStopped, DeviceEvent::ClockWrapped]
        );
        assert_eq!(journal.latest().map(|r| r.timestamp), Some(Millis::new(20)));
    }

    #[test]
    fn since_skips_already_consumed_records() {
        let mut journal = Journal::<8>::new();
        journal.record(DeviceEvent::RecordEvicted, Millis::new(1));
        let cursor = journal.next_id();
        journal.record(DeviceEvent::SampleRejected, Millis::new(2));
        journal.record(DeviceEvent::OutboxOverflow, Millis::new(3));

        let fresh: heapless::Vec<EventId, 8> = journal.since(cursor).map(|r| r.id).collect();
        assert_eq!(fresh.as_slice(), &[1, 2]);
        assert_eq!(journal.since(journal.next_id()).count(), 0);
    }

    #[test]
    fn oldest_records_fall_off_when_full() {
        let mut journal = Journal::<2>::new();
        for tick in 0..5 {
            journal.record(DeviceEvent::ToneStopped, Millis::new(tick));
        }

        assert_eq!(journal.len(), 2);
        assert_eq!(journal.oldest_first().next().map(|r| r.id), Some(3));
    }
}
