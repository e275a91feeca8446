//! Orchestration wiring for the motion logger.
//!
//! [`DeviceTasks`] owns every behavior in scheduling order and routes the
//! lateral [`Command`]s they post. [`Device`] pairs it with the scheduler and
//! the journal and exposes the read-only status the console and firmware report.

use crate::button::{ButtonEvent, ButtonInput, ButtonState, ButtonTask};
use crate::config::DeviceConfig;
use crate::logger::{
    LogStats, LogStorage, LogWriter, SampleOutcome, StartOutcome, StopOutcome, ToggleOutcome,
};
use crate::scheduler::{
    Behavior, InhibitMask, MAX_TASKS, PassReport, Scheduler, SchedulerError, TaskId, TaskSet,
};
use crate::sensor::{
    CalibrationStore, MotionReading, SensorProvider, SensorReport, SensorTask,
};
use crate::telemetry::{DeviceEvent, Journal};
use crate::time::Millis;
use crate::tone::{Buzzer, TonePattern, TonePlayer};

pub const SENSOR_TASK: TaskId = TaskId::from_index(0);
pub const BUTTON_TASK: TaskId = TaskId::from_index(1);
pub const TONE_TASK: TaskId = TaskId::from_index(2);
pub const LOGGER_TASK: TaskId = TaskId::from_index(3);

/// Lateral messages exchanged between behaviors.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    ToggleRecording,
    StartCalibration,
    CalibrationFinished { saved: bool },
    Sample(MotionReading),
}

impl From<ButtonEvent> for Command {
    fn from(event: ButtonEvent) -> Self {
        match event {
            ButtonEvent::ShortPress => Command::ToggleRecording,
            ButtonEvent::LongPress => Command::StartCalibration,
        }
    }
}

impl From<SensorReport> for Command {
    fn from(report: SensorReport) -> Self {
        match report {
            SensorReport::Sample(reading) => Command::Sample(reading),
            SensorReport::CalibrationFinished { saved } => Command::CalibrationFinished { saved },
        }
    }
}

/// Hardware collaborators the device is assembled from.
pub struct DeviceParts<P, C, I, B, S> {
    pub sensor: P,
    pub calibration: C,
    pub button: I,
    pub buzzer: B,
    pub storage: S,
}

/// Owning container of the device behaviors, in dispatch order.
pub struct DeviceTasks<P, C, I, B, S: LogStorage> {
    pub sensor: SensorTask<P, C>,
    pub button: ButtonTask<I>,
    pub tone: TonePlayer<B>,
    pub logger: LogWriter<S>,
}

impl<P, C, I, B, S> DeviceTasks<P, C, I, B, S>
where
    P: SensorProvider,
    C: CalibrationStore,
    I: ButtonInput,
    B: Buzzer,
    S: LogStorage,
{
    pub fn new(parts: DeviceParts<P, C, I, B, S>, config: &DeviceConfig) -> Self {
        Self {
            sensor: SensorTask::new(
                SENSOR_TASK,
                parts.sensor,
                parts.calibration,
                config.sensor_interval_ms,
            )
            .suppressing(InhibitMask::of(LOGGER_TASK))
            .with_calibration_samples(config.calibration_samples),
            button: ButtonTask::new(BUTTON_TASK, parts.button, config.button),
            tone: TonePlayer::new(TONE_TASK, parts.buzzer, config.tone_interval_ms),
            logger: LogWriter::new(LOGGER_TASK, parts.storage, config.logger),
        }
    }

    fn play(&mut self, pattern: TonePattern, now: Millis, journal: &mut Journal) {
        if self.tone.play(pattern, now) {
            journal.record(DeviceEvent::ToneStarted(pattern), now);
        }
    }

    fn toggle_recording(&mut self, now: Millis, journal: &mut Journal) {
        match self.logger.toggle_recording(now) {
            ToggleOutcome::Started(StartOutcome::Started { file_number }) => {
                journal.record(DeviceEvent::RecordingStarted { file_number }, now);
                self.play(TonePattern::RecordingStart, now, journal);
            }
            ToggleOutcome::Started(StartOutcome::OpenFailed { file_number }) => {
                journal.record(DeviceEvent::FileOpenFailed { file_number }, now);
                journal.record(DeviceEvent::RecordingStarted { file_number }, now);
                self.play(TonePattern::RecordingStart, now, journal);
            }
            ToggleOutcome::Stopped(StopOutcome::Stopped {
                file_number,
                report,
                discarded,
            }) => {
                report.record_into(journal, now);
                journal.record(
                    DeviceEvent::RecordingStopped {
                        file_number,
                        discarded,
                    },
                    now,
                );
                self.play(TonePattern::RecordingStop, now, journal);
            }
            ToggleOutcome::Started(StartOutcome::AlreadyRecording)
            | ToggleOutcome::Stopped(StopOutcome::NotRecording) => {}
        }
    }

    fn log_reading(&mut self, reading: MotionReading, now: Millis, journal: &mut Journal) {
        match self.logger.log_sample(reading.into_record(now), now) {
            SampleOutcome::NotRecording | SampleOutcome::Buffered { evicted: false } => {}
            SampleOutcome::Rejected => {
                journal.record(DeviceEvent::SampleRejected, now);
            }
            SampleOutcome::Buffered { evicted: true } => {
                journal.record(DeviceEvent::RecordEvicted, now);
            }
            SampleOutcome::Flushed { evicted, report } => {
                if evicted {
                    journal.record(DeviceEvent::RecordEvicted, now);
                }
                report.record_into(journal, now);
            }
        }
    }
}

impl<P, C, I, B, S> TaskSet for DeviceTasks<P, C, I, B, S>
where
    P: SensorProvider,
    C: CalibrationStore,
    I: ButtonInput,
    B: Buzzer,
    S: LogStorage,
{
    type Message = Command;

    fn len(&self) -> usize {
        4
    }

    fn task(&self, index: usize) -> Option<&dyn Behavior<Command>> {
        match index {
            0 => Some(&self.sensor as &dyn Behavior<Command>),
            1 => Some(&self.button as &dyn Behavior<Command>),
            2 => Some(&self.tone as &dyn Behavior<Command>),
            3 => Some(&self.logger as &dyn Behavior<Command>),
            _ => None,
        }
    }

    fn task_mut(&mut self, index: usize) -> Option<&mut dyn Behavior<Command>> {
        match index {
            0 => Some(&mut self.sensor as &mut dyn Behavior<Command>),
            1 => Some(&mut self.button as &mut dyn Behavior<Command>),
            2 => Some(&mut self.tone as &mut dyn Behavior<Command>),
            3 => Some(&mut self.logger as &mut dyn Behavior<Command>),
            _ => None,
        }
    }

    fn deliver(&mut self, message: Command, now: Millis, journal: &mut Journal) {
        match message {
            Command::ToggleRecording => self.toggle_recording(now, journal),
            Command::StartCalibration => {
                if self.sensor.start_calibration() {
                    journal.record(DeviceEvent::CalibrationStarted, now);
                    self.play(TonePattern::CalibrationStart, now, journal);
                }
            }
            Command::CalibrationFinished { .. } => {
                self.play(TonePattern::CalibrationComplete, now, journal);
            }
            Command::Sample(reading) => self.log_reading(reading, now, journal),
        }
    }
}

/// Scheduler, behaviors and journal assembled into one device.
pub struct Device<P, C, I, B, S: LogStorage> {
    scheduler: Scheduler<Command, MAX_TASKS>,
    tasks: DeviceTasks<P, C, I, B, S>,
    journal: Journal,
}

impl<P, C, I, B, S> Device<P, C, I, B, S>
where
    P: SensorProvider,
    C: CalibrationStore,
    I: ButtonInput,
    B: Buzzer,
    S: LogStorage,
{
    /// Builds the behaviors and validates them with the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if the task set cannot be scheduled.
    pub fn new(
        parts: DeviceParts<P, C, I, B, S>,
        config: &DeviceConfig,
    ) -> Result<Self, SchedulerError> {
        let tasks = DeviceTasks::new(parts, config);
        let scheduler = Scheduler::new(&tasks)?;
        Ok(Self {
            scheduler,
            tasks,
            journal: Journal::new(),
        })
    }

    /// Runs one scheduling pass at `now`.
    pub fn tick(&mut self, now: Millis) -> PassReport {
        self.scheduler.pass(&mut self.tasks, now, &mut self.journal)
    }

    /// Injects a command as if a behavior had posted it.
    pub fn command(&mut self, command: Command, now: Millis) {
        self.tasks.deliver(command, now, &mut self.journal);
    }

    /// Flushes and closes the log file and silences the buzzer.
    pub fn suspend(&mut self, now: Millis) {
        let report = self.tasks.logger.quiesce(now);
        report.record_into(&mut self.journal, now);
        if self.tasks.tone.stop() {
            self.journal.record(DeviceEvent::ToneStopped, now);
        }
    }

    pub const fn is_recording(&self) -> bool {
        self.tasks.logger.is_recording()
    }

    pub fn current_file_name(&self) -> Option<&str> {
        self.tasks.logger.current_file_name()
    }

    pub const fn log_stats(&self) -> LogStats {
        self.tasks.logger.stats()
    }

    pub const fn button_state(&self) -> ButtonState {
        self.tasks.button.state()
    }

    pub fn active_tone(&self) -> Option<TonePattern> {
        self.tasks.tone.current()
    }

    pub const fn is_calibrating(&self) -> bool {
        self.tasks.sensor.is_calibrating()
    }

    pub const fn is_calibrated(&self) -> bool {
        self.tasks.sensor.is_calibrated()
    }

    pub const fn latest_reading(&self) -> Option<MotionReading> {
        self.tasks.sensor.latest()
    }

    pub const fn journal(&self) -> &Journal {
        &self.journal
    }

    pub const fn scheduler(&self) -> &Scheduler<Command, MAX_TASKS> {
        &self.scheduler
    }

    pub const fn tasks(&self) -> &DeviceTasks<P, C, I, B, S> {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut DeviceTasks<P, C, I, B, S> {
        &mut self.tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_distinct_bits() {
        let all = [SENSOR_TASK, BUTTON_TASK, TONE_TASK, LOGGER_TASK];
        let mut mask = InhibitMask::EMPTY;
        for id in all {
            assert!(!mask.contains(id));
            mask |= InhibitMask::of(id);
        }
        assert_eq!(mask.bits(), 0b1111);
    }

    #[test]
    fn button_events_map_to_commands() {
        assert_eq!(Command::from(ButtonEvent::ShortPress), Command::ToggleRecording);
        assert_eq!(Command::from(ButtonEvent::LongPress), Command::StartCalibration);
    }
}
