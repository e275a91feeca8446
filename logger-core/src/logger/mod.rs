//! Ring-buffered log writer.
//!
//! Samples accumulate in a small [`RecordRing`] and are written to the open
//! log file in page-sized batches. A periodic tick flushes anything that has
//! waited longer than the auto-flush delay, and quiescing always flushes and
//! closes so nothing survives only in RAM.

mod naming;
mod ring;

use core::fmt;

pub use naming::{FILE_PREFIX, FILE_SUFFIX, FileName, MAX_FILE_NAME, file_name, parse_file_number};
pub use ring::RecordRing;

use crate::record::{LogRecord, RECORD_SIZE};
use crate::scheduler::{Behavior, TaskContext, TaskId};
use crate::telemetry::{DeviceEvent, Journal};
use crate::time::Millis;

/// Smallest efficient write unit of the backing flash.
pub const PAGE_SIZE: usize = 256;

/// Slots in the RAM ring: one page of records plus headroom.
pub const RING_CAPACITY: usize = PAGE_SIZE / RECORD_SIZE + 2;

pub const AUTO_FLUSH_DELAY_MS: u32 = 5_000;
pub const LOGGER_INTERVAL_MS: u32 = 500;

/// Writer timing knobs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoggerConfig {
    pub auto_flush_delay_ms: u32,
    pub tick_interval_ms: u32,
}

impl LoggerConfig {
    pub const DEFAULT: Self = Self {
        auto_flush_delay_ms: AUTO_FLUSH_DELAY_MS,
        tick_interval_ms: LOGGER_INTERVAL_MS,
    };
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Append-only file storage the writer persists records to.
pub trait LogStorage {
    type Handle;
    type Error: fmt::Debug;

    /// Opens `name` for appending, creating it when missing.
    fn open_append(&mut self, name: &str) -> Result<Self::Handle, Self::Error>;

    fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Forces buffered bytes out to the physical medium.
    fn sync(&mut self, handle: &mut Self::Handle) -> Result<(), Self::Error>;

    fn close(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;

    /// Calls `visitor` with the name and byte size of every stored file.
    fn visit(&mut self, visitor: &mut dyn FnMut(&str, u32)) -> Result<(), Self::Error>;

    fn remove(&mut self, name: &str) -> Result<(), Self::Error>;

    /// Returns `true` when `error` means the file cannot grow any further.
    ///
    /// The writer continues the session in a new file instead of retrying.
    fn is_full(_error: &Self::Error) -> bool {
        false
    }
}

/// Storage operation that failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StorageFault {
    Open,
    Write,
    Sync,
    Close,
    List,
    Remove,
    /// The file is open for the active recording.
    Busy,
    NotFound,
    /// A freshly opened file could not take a single record.
    Full,
}

impl fmt::Display for StorageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StorageFault::Open => "open failed",
            StorageFault::Write => "write failed",
            StorageFault::Sync => "sync failed",
            StorageFault::Close => "close failed",
            StorageFault::List => "listing failed",
            StorageFault::Remove => "remove failed",
            StorageFault::Busy => "file in use",
            StorageFault::NotFound => "no such file",
            StorageFault::Full => "file full",
        };
        f.write_str(label)
    }
}

/// Running counters exposed for diagnostics and tests.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LogStats {
    pub written: u32,
    pub write_failures: u32,
    pub evicted: u32,
    pub rejected: u32,
    pub flushes: u32,
    pub discarded: u32,
    pub open_failures: u32,
    /// Sessions continued in a new file because the old one filled up.
    pub rollovers: u32,
}

/// Result of one flush attempt.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FlushReport {
    pub written: u16,
    pub failed: u16,
    /// Slots still occupied afterwards.
    pub remaining: u16,
    pub fault: Option<StorageFault>,
    /// File the session moved to after the previous one filled up.
    pub rolled_to: Option<u32>,
}

impl FlushReport {
    /// Returns `true` when the flush touched storage or hit a fault.
    #[must_use]
    pub const fn is_notable(&self) -> bool {
        self.written > 0 || self.failed > 0 || self.fault.is_some() || self.rolled_to.is_some()
    }

    /// Journals a summary line plus any fault.
    pub fn record_into(&self, journal: &mut Journal, now: Millis) {
        if let Some(file_number) = self.rolled_to {
            journal.record(DeviceEvent::FileRolled { file_number }, now);
        }
        if self.written > 0 || self.failed > 0 {
            journal.record(
                DeviceEvent::Flushed {
                    written: self.written,
                    failed: self.failed,
                },
                now,
            );
        }
        if let Some(fault) = self.fault {
            journal.record(DeviceEvent::Storage(fault), now);
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StartOutcome {
    AlreadyRecording,
    Started { file_number: u32 },
    /// Session is active but the file could not be opened yet.
    OpenFailed { file_number: u32 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopOutcome {
    NotRecording,
    Stopped {
        file_number: u32,
        report: FlushReport,
        discarded: u16,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ToggleOutcome {
    Started(StartOutcome),
    Stopped(StopOutcome),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SampleOutcome {
    /// Dropped because no session is active.
    NotRecording,
    /// Dropped because a zero timestamp cannot be stored.
    Rejected,
    Buffered { evicted: bool },
    Flushed { evicted: bool, report: FlushReport },
}

/// File listing entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogFileInfo {
    pub name: FileName,
    pub number: u32,
    pub size: u32,
}

/// Outcome of one pass over the ring.
#[derive(Default)]
struct Batch {
    written: usize,
    failed: usize,
    full: bool,
    sync_failed: bool,
}

fn saturate(count: usize) -> u16 {
    u16::try_from(count).unwrap_or(u16::MAX)
}

/// Recording session state machine over a [`LogStorage`].
pub struct LogWriter<S: LogStorage, const CAP: usize = RING_CAPACITY> {
    id: TaskId,
    storage: S,
    config: LoggerConfig,
    ring: RecordRing<CAP>,
    handle: Option<S::Handle>,
    recording: bool,
    file_number: u32,
    file_name: FileName,
    last_allocated: u32,
    pending_since: Option<Millis>,
    stats: LogStats,
    last_fault: Option<StorageFault>,
}

impl<S: LogStorage, const CAP: usize> LogWriter<S, CAP> {
    pub fn new(id: TaskId, storage: S, config: LoggerConfig) -> Self {
        Self {
            id,
            storage,
            config,
            ring: RecordRing::new(),
            handle: None,
            recording: false,
            file_number: 0,
            file_name: FileName::new(),
            last_allocated: 0,
            pending_since: None,
            stats: LogStats::default(),
            last_fault: None,
        }
    }

    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Name of the session file while recording.
    pub fn current_file_name(&self) -> Option<&str> {
        self.recording.then_some(self.file_name.as_str())
    }

    pub const fn current_file_number(&self) -> Option<u32> {
        if self.recording {
            Some(self.file_number)
        } else {
            None
        }
    }

    pub const fn stats(&self) -> LogStats {
        self.stats
    }

    pub const fn last_error(&self) -> Option<StorageFault> {
        self.last_fault
    }

    /// Records waiting in RAM.
    pub fn buffered(&self) -> usize {
        self.ring.occupied()
    }

    /// Returns `true` while the session file is open.
    pub const fn has_open_file(&self) -> bool {
        self.handle.is_some()
    }

    pub const fn config(&self) -> LoggerConfig {
        self.config
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Releases the storage. Buffered records and any open handle are
    /// dropped, so stop or quiesce first.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Opens a freshly numbered file and begins a session.
    pub fn start_recording(&mut self) -> StartOutcome {
        if self.recording {
            return StartOutcome::AlreadyRecording;
        }

        let number = self.allocate_file_number();
        self.file_number = number;
        self.file_name = file_name(number);
        self.recording = true;
        self.pending_since = None;

        if self.open_current() {
            StartOutcome::Started {
                file_number: number,
            }
        } else {
            StartOutcome::OpenFailed {
                file_number: number,
            }
        }
    }

    /// Flushes, closes and ends the session.
    ///
    /// Records that still cannot be written are dropped and counted.
    pub fn stop_recording(&mut self, now: Millis) -> StopOutcome {
        if !self.recording {
            return StopOutcome::NotRecording;
        }

        let mut report = self.flush(now);
        if let Some(fault) = self.close_current() {
            report.fault.get_or_insert(fault);
        }

        let discarded = self.ring.clear();
        self.stats.discarded = self
            .stats
            .discarded
            .saturating_add(u32::try_from(discarded).unwrap_or(u32::MAX));
        self.recording = false;
        self.pending_since = None;

        StopOutcome::Stopped {
            file_number: self.file_number,
            report,
            discarded: saturate(discarded),
        }
    }

    pub fn toggle_recording(&mut self, now: Millis) -> ToggleOutcome {
        if self.recording {
            ToggleOutcome::Stopped(self.stop_recording(now))
        } else {
            ToggleOutcome::Started(self.start_recording())
        }
    }

    /// Buffers a sample, flushing once another record would overflow a page.
    pub fn log_sample(&mut self, record: LogRecord, now: Millis) -> SampleOutcome {
        if !self.recording {
            return SampleOutcome::NotRecording;
        }
        if record.is_unset() {
            self.stats.rejected = self.stats.rejected.saturating_add(1);
            return SampleOutcome::Rejected;
        }

        let evicted = self.ring.push(record).is_some();
        if evicted {
            self.stats.evicted = self.stats.evicted.saturating_add(1);
        }
        self.pending_since.get_or_insert(now);

        if (self.ring.occupied() + 1) * RECORD_SIZE > PAGE_SIZE {
            let report = self.flush(now);
            SampleOutcome::Flushed { evicted, report }
        } else {
            SampleOutcome::Buffered { evicted }
        }
    }

    /// Writes every buffered record, oldest first, then syncs the file.
    ///
    /// A failed record stays buffered for the next attempt while the rest of
    /// the batch is still written.
    pub fn flush(&mut self, now: Millis) -> FlushReport {
        let mut report = FlushReport::default();
        if self.ring.is_empty() {
            self.pending_since = None;
            return report;
        }

        if self.handle.is_none() && !(self.recording && self.open_current()) {
            report.remaining = saturate(self.ring.occupied());
            report.fault = Some(StorageFault::Open);
            self.pending_since = Some(now);
            return report;
        }
        let mut batch = self.write_buffered();
        if batch.full {
            report.rolled_to = Some(self.roll_over());
            let retry = self.write_buffered();
            batch.written += retry.written;
            batch.failed += retry.failed;
            batch.sync_failed |= retry.sync_failed;
            batch.full = retry.full;
            if self.handle.is_none() {
                report.fault = Some(StorageFault::Open);
            }
        }

        let Batch {
            written,
            failed,
            full,
            sync_failed,
        } = batch;
        if failed > 0 {
            report.fault = Some(StorageFault::Write);
        }
        if full {
            report.fault = Some(StorageFault::Full);
        }
        if sync_failed {
            report.fault.get_or_insert(StorageFault::Sync);
        }

        report.written = saturate(written);
        report.failed = saturate(failed);
        report.remaining = saturate(self.ring.occupied());

        self.stats.flushes = self.stats.flushes.saturating_add(1);
        self.stats.written = self
            .stats
            .written
            .saturating_add(u32::try_from(written).unwrap_or(u32::MAX));
        self.stats.write_failures = self
            .stats
            .write_failures
            .saturating_add(u32::try_from(failed).unwrap_or(u32::MAX));
        if report.fault.is_some() {
            self.last_fault = report.fault;
        }
        self.pending_since = if self.ring.is_empty() { None } else { Some(now) };

        report
    }

    /// Writes occupied slots in ring order into the open file, stopping at
    /// the first write the storage reports as full.
    fn write_buffered(&mut self) -> Batch {
        let mut batch = Batch::default();
        let Some(handle) = self.handle.as_mut() else {
            return batch;
        };

        for slot in self.ring.occupied_mut() {
            let Some(record) = slot.as_ref() else {
                continue;
            };
            match self.storage.write(handle, &record.encode()) {
                Ok(()) => {
                    *slot = None;
                    batch.written += 1;
                }
                Err(error) if S::is_full(&error) => {
                    batch.full = true;
                    break;
                }
                Err(_) => batch.failed += 1,
            }
        }

        if batch.written > 0 && self.storage.sync(handle).is_err() {
            batch.sync_failed = true;
        }
        batch
    }

    /// Closes the full session file and opens the next number.
    fn roll_over(&mut self) -> u32 {
        let _ = self.close_current();
        let number = self.allocate_file_number();
        self.file_number = number;
        self.file_name = file_name(number);
        self.stats.rollovers = self.stats.rollovers.saturating_add(1);
        self.open_current();
        number
    }

    /// Flushes when a record has waited longer than the auto-flush delay.
    pub fn tick(&mut self, now: Millis) -> Option<FlushReport> {
        let since = self.pending_since?;
        now.has_elapsed(since, self.config.auto_flush_delay_ms)
            .then(|| self.flush(now))
    }

    /// Flushes and closes the file. The session stays active and the next
    /// flush reopens the same file for appending.
    pub fn quiesce(&mut self, now: Millis) -> FlushReport {
        let mut report = self.flush(now);
        if let Some(fault) = self.close_current() {
            report.fault.get_or_insert(fault);
        }
        report
    }

    /// Lists stored log files in storage order, under the names the
    /// storage reports.
    pub fn list_files(
        &mut self,
        mut visitor: impl FnMut(LogFileInfo),
    ) -> Result<(), StorageFault> {
        let result = self.storage.visit(&mut |name, size| {
            if let Some(number) = parse_file_number(name)
                && let Ok(name) = FileName::try_from(name)
            {
                visitor(LogFileInfo { name, number, size });
            }
        });
        result.map_err(|_| self.fault(StorageFault::List))
    }

    /// Deletes a stored log file other than the active one.
    ///
    /// `name` must match a stored name exactly, apart from the leading `/`.
    pub fn delete_file(&mut self, name: &str) -> Result<(), StorageFault> {
        let wanted = name.trim_start_matches('/');
        if parse_file_number(wanted).is_none() {
            return Err(StorageFault::NotFound);
        }
        if self.recording && self.file_name.trim_start_matches('/') == wanted {
            return Err(StorageFault::Busy);
        }

        let mut stored: Option<FileName> = None;
        let scan = self.storage.visit(&mut |candidate, _| {
            if stored.is_none() && candidate.trim_start_matches('/') == wanted {
                stored = FileName::try_from(candidate).ok();
            }
        });
        scan.map_err(|_| self.fault(StorageFault::List))?;
        let stored = stored.ok_or(StorageFault::NotFound)?;

        self.storage
            .remove(&stored)
            .map_err(|_| self.fault(StorageFault::Remove))
    }

    fn allocate_file_number(&mut self) -> u32 {
        let mut highest = 0u32;
        let scan = self.storage.visit(&mut |name, _| {
            if let Some(number) = parse_file_number(name) {
                highest = highest.max(number);
            }
        });
        if scan.is_err() {
            self.fault(StorageFault::List);
        }

        let number = highest.max(self.last_allocated).wrapping_add(1);
        self.last_allocated = number;
        number
    }

    fn open_current(&mut self) -> bool {
        match self.storage.open_append(&self.file_name) {
            Ok(handle) => {
                self.handle = Some(handle);
                true
            }
            Err(_) => {
                self.stats.open_failures = self.stats.open_failures.saturating_add(1);
                self.fault(StorageFault::Open);
                false
            }
        }
    }

    fn close_current(&mut self) -> Option<StorageFault> {
        let handle = self.handle.take()?;
        self.storage
            .close(handle)
            .err()
            .map(|_| self.fault(StorageFault::Close))
    }

    fn fault(&mut self, fault: StorageFault) -> StorageFault {
        self.last_fault = Some(fault);
        fault
    }
}

impl<S, M, const CAP: usize> Behavior<M> for LogWriter<S, CAP>
where
    S: LogStorage,
{
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &'static str {
        "logger"
    }

    fn run_interval_ms(&self) -> u32 {
        self.config.tick_interval_ms
    }

    fn run(&mut self, ctx: &mut TaskContext<'_, M>) {
        let now = ctx.now();
        if let Some(report) = self.tick(now) {
            report.record_into(ctx.journal(), now);
        }
    }

    fn inhibited(&mut self, ctx: &mut TaskContext<'_, M>) {
        if self.handle.is_some() || !self.ring.is_empty() {
            let now = ctx.now();
            let report = self.quiesce(now);
            report.record_into(ctx.journal(), now);
        }
    }

    fn clock_wrapped(&mut self, now: Millis) {
        if self.pending_since.is_some() {
            self.pending_since = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    const STORE_BYTES: usize = 1024;

    struct File {
        name: FileName,
        bytes: Vec<u8, STORE_BYTES>,
    }

    #[derive(Default)]
    struct MockStorage {
        files: Vec<File, 8>,
        fail_open: bool,
        fail_list: bool,
        /// Fails this many upcoming writes.
        fail_writes: u32,
        syncs: u32,
        closes: u32,
    }

    impl MockStorage {
        fn file(&self, name: &str) -> Option<&[u8]> {
            self.files
                .iter()
                .find(|f| f.name.as_str() == name)
                .map(|f| f.bytes.as_slice())
        }

        fn touch(&mut self, name: &str) {
            let _ = self.files.push(File {
                name: FileName::try_from(name).unwrap(),
                bytes: Vec::new(),
            });
        }
    }

    impl LogStorage for MockStorage {
        type Handle = usize;
        type Error = ();

        fn open_append(&mut self, name: &str) -> Result<usize, ()> {
            if self.fail_open {
                return Err(());
            }
            if let Some(index) = self.files.iter().position(|f| f.name.as_str() == name) {
                return Ok(index);
            }
            self.touch(name);
            Ok(self.files.len() - 1)
        }

        fn write(&mut self, handle: &mut usize, bytes: &[u8]) -> Result<(), ()> {
            if self.fail_writes > 0 {
                self.fail_writes -= 1;
                return Err(());
            }
            self.files[*handle].bytes.extend_from_slice(bytes).map_err(|_| ())
        }

        fn sync(&mut self, _handle: &mut usize) -> Result<(), ()> {
            self.syncs += 1;
            Ok(())
        }

        fn close(&mut self, _handle: usize) -> Result<(), ()> {
            self.closes += 1;
            Ok(())
        }

        fn visit(&mut self, visitor: &mut dyn FnMut(&str, u32)) -> Result<(), ()> {
            if self.fail_list {
                return Err(());
            }
            for file in &self.files {
                visitor(file.name.as_str(), u32::try_from(file.bytes.len()).unwrap());
            }
            Ok(())
        }

        fn remove(&mut self, name: &str) -> Result<(), ()> {
            let index = self
                .files
                .iter()
                .position(|f| f.name.as_str() == name)
                .ok_or(())?;
            self.files.remove(index);
            Ok(())
        }
    }

    fn writer(storage: MockStorage) -> LogWriter<MockStorage> {
        LogWriter::new(TaskId::from_index(3), storage, LoggerConfig::DEFAULT)
    }

    fn sample(timestamp: u32) -> LogRecord {
        LogRecord {
            timestamp,
            accel_x: 1.0,
            flags: crate::record::FLAG_RECORDING,
            ..LogRecord::default()
        }
    }

    #[test]
    fn ring_capacity_slightly_exceeds_a_page() {
        assert_eq!(RING_CAPACITY, 10);
        assert!(RING_CAPACITY * RECORD_SIZE > PAGE_SIZE);
    }

    #[test]
    fn samples_outside_a_session_are_dropped() {
        let mut log = writer(MockStorage::default());
        assert_eq!(log.log_sample(sample(5), Millis::new(5)), SampleOutcome::NotRecording);
        assert_eq!(log.buffered(), 0);
    }

    #[test]
    fn eighth_record_triggers_a_page_flush() {
        let mut log = writer(MockStorage::default());
        assert_eq!(log.start_recording(), StartOutcome::Started { file_number: 1 });

        for t in 1..8 {
            assert_eq!(
                log.log_sample(sample(t), Millis::new(t)),
                SampleOutcome::Buffered { evicted: false }
            );
        }
        let outcome = log.log_sample(sample(8), Millis::new(8));
        let SampleOutcome::Flushed { report, .. } = outcome else {
            panic!("expected a flush, got {outcome:?}");
        };
        assert_eq!(report.written, 8);
        assert_eq!(report.remaining, 0);
        assert_eq!(log.storage().file("/mpulog1.bin").map(<[u8]>::len), Some(PAGE_SIZE));
        assert_eq!(log.storage().syncs, 1);
    }

    #[test]
    fn zero_timestamp_is_never_stored() {
        let mut log = writer(MockStorage::default());
        log.start_recording();
        assert_eq!(log.log_sample(sample(0), Millis::ZERO), SampleOutcome::Rejected);
        assert_eq!(log.stats().rejected, 1);
        assert_eq!(log.buffered(), 0);
    }

    #[test]
    fn failed_writes_stay_buffered_and_retry() {
        let mut log = writer(MockStorage::default());
        log.start_recording();
        for t in 1..=3 {
            log.log_sample(sample(t), Millis::new(t));
        }
        log.storage_mut().fail_writes = 1;

        let report = log.flush(Millis::new(10));
        assert_eq!((report.written, report.failed, report.remaining), (2, 1, 1));
        assert_eq!(report.fault, Some(StorageFault::Write));

        let retry = log.flush(Millis::new(20));
        assert_eq!((retry.written, retry.remaining), (1, 0));

        let stored = log.storage().file("/mpulog1.bin").unwrap();
        let order: Vec<u32, 3> = crate::record::RecordReader::new(stored)
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(order.as_slice(), &[2, 3, 1]);
    }

    #[test]
    fn tick_flushes_after_the_auto_flush_delay() {
        let mut log = writer(MockStorage::default());
        log.start_recording();
        log.log_sample(sample(100), Millis::new(100));

        assert!(log.tick(Millis::new(5_099)).is_none());
        let report = log.tick(Millis::new(5_100)).expect("delay elapsed");
        assert_eq!(report.written, 1);
        assert!(log.tick(Millis::new(20_000)).is_none());
    }

    #[test]
    fn open_failure_is_retried_on_flush() {
        let mut storage = MockStorage::default();
        storage.fail_open = true;
        let mut log = writer(storage);

        assert_eq!(log.start_recording(), StartOutcome::OpenFailed { file_number: 1 });
        assert!(log.is_recording());
        log.log_sample(sample(1), Millis::new(1));

        let report = log.flush(Millis::new(2));
        assert_eq!(report.fault, Some(StorageFault::Open));
        assert_eq!(report.remaining, 1);

        log.storage_mut().fail_open = false;
        let report = log.flush(Millis::new(3));
        assert_eq!(report.written, 1);
        assert!(log.has_open_file());
    }

    #[test]
    fn stop_discards_unwritable_records() {
        let mut log = writer(MockStorage::default());
        log.start_recording();
        log.log_sample(sample(1), Millis::new(1));
        log.log_sample(sample(2), Millis::new(2));
        log.storage_mut().fail_writes = 1;

        let StopOutcome::Stopped { discarded, report, .. } = log.stop_recording(Millis::new(3)) else {
            panic!("session was active");
        };
        assert_eq!(discarded, 1);
        assert_eq!(report.written, 1);
        assert_eq!(log.stats().discarded, 1);
        assert!(!log.is_recording());
        assert_eq!(log.storage().closes, 1);
    }

    #[test]
    fn numbering_uses_scan_and_memory() {
        let mut storage = MockStorage::default();
        storage.touch("/mpulog4.bin");
        storage.touch("/notes.txt");
        let mut log = writer(storage);

        log.start_recording();
        assert_eq!(log.current_file_name(), Some("/mpulog5.bin"));
        log.stop_recording(Millis::new(1));

        log.storage_mut().fail_list = true;
        log.start_recording();
        assert_eq!(log.current_file_number(), Some(6));
        assert_eq!(log.last_error(), Some(StorageFault::List));
    }

    #[test]
    fn quiesce_closes_and_reopens_same_file() {
        let mut log = writer(MockStorage::default());
        log.start_recording();
        log.log_sample(sample(1), Millis::new(1));

        let report = log.quiesce(Millis::new(2));
        assert_eq!(report.written, 1);
        assert!(!log.has_open_file());
        assert!(log.is_recording());

        log.log_sample(sample(3), Millis::new(3));
        log.flush(Millis::new(4));
        assert_eq!(log.storage().file("/mpulog1.bin").map(<[u8]>::len), Some(2 * RECORD_SIZE));
        assert_eq!(log.storage().files.len(), 1);
    }

    #[test]
    fn active_file_cannot_be_deleted() {
        let mut log = writer(MockStorage::default());
        log.start_recording();
        assert_eq!(log.delete_file("/mpulog1.bin"), Err(StorageFault::Busy));
        log.stop_recording(Millis::new(1));
        assert_eq!(log.delete_file("/mpulog1.bin"), Ok(()));
        assert_eq!(log.delete_file("/mpulog1.bin"), Err(StorageFault::NotFound));
    }

    #[test]
    fn stored_names_pass_through_listing_and_removal() {
        let mut storage = MockStorage::default();
        storage.touch("mpulog007.bin");
        storage.touch("/mpulog7.bin");
        let mut log = writer(storage);

        let mut listed: Vec<FileName, 4> = Vec::new();
        log.list_files(|info| {
            assert_eq!(info.number, 7);
            listed.push(info.name).unwrap();
        })
        .unwrap();
        assert_eq!(listed.as_slice(), ["mpulog007.bin", "/mpulog7.bin"]);

        assert_eq!(log.delete_file("mpulog007.bin"), Ok(()));
        assert!(log.storage().file("mpulog007.bin").is_none());
        assert!(log.storage().file("/mpulog7.bin").is_some());
        assert_eq!(log.delete_file("/mpulog07.bin"), Err(StorageFault::NotFound));
    }
}
