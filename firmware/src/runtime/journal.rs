use defmt::Display2Format;
use logger_core::telemetry::{DeviceEvent, EventId, Journal};

/// Prints journal records newer than `cursor` and returns the next cursor.
pub fn emit_since(journal: &Journal, cursor: EventId) -> EventId {
    for record in journal.since(cursor) {
        if is_fault(&record.event) {
            defmt::warn!("{}", Display2Format(record));
        } else {
            defmt::info!("{}", Display2Format(record));
        }
    }
    journal.next_id()
}

fn is_fault(event: &DeviceEvent) -> bool {
    matches!(
        event,
        DeviceEvent::FileOpenFailed { .. }
            | DeviceEvent::Storage(_)
            | DeviceEvent::RecordEvicted
            | DeviceEvent::CalibrationSaveFailed
            | DeviceEvent::SensorReadFailed
            | DeviceEvent::SelfInhibitionIgnored(_)
            | DeviceEvent::OutboxOverflow
    )
}
