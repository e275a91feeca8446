//! Non-blocking buzzer feedback.

use core::fmt;

use crate::scheduler::{Behavior, TaskContext, TaskId};
use crate::telemetry::DeviceEvent;
use crate::time::Millis;

pub const TONE_INTERVAL_MS: u32 = 10;

/// Feedback patterns the device can sound.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TonePattern {
    CalibrationStart,
    CalibrationComplete,
    RecordingStart,
    RecordingStop,
}

impl TonePattern {
    #[must_use]
    pub const fn frequency_hz(self) -> u32 {
        match self {
            TonePattern::CalibrationStart => 500,
            TonePattern::CalibrationComplete => 800,
            TonePattern::RecordingStart => 1_000,
            TonePattern::RecordingStop => 600,
        }
    }

    #[must_use]
    pub const fn duration_ms(self) -> u32 {
        match self {
            TonePattern::CalibrationStart => 500,
            TonePattern::CalibrationComplete
            | TonePattern::RecordingStart
            | TonePattern::RecordingStop => 100,
        }
    }

    /// State-change patterns replace whatever is sounding; the completion
    /// chime only plays into silence.
    #[must_use]
    pub const fn interrupts(self) -> bool {
        !matches!(self, TonePattern::CalibrationComplete)
    }
}

impl fmt::Display for TonePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TonePattern::CalibrationStart => "calibration-start",
            TonePattern::CalibrationComplete => "calibration-complete",
            TonePattern::RecordingStart => "recording-start",
            TonePattern::RecordingStop => "recording-stop",
        };
        f.write_str(label)
    }
}

/// Output stage driving the speaker.
pub trait Buzzer {
    fn start(&mut self, frequency_hz: u32);
    fn stop(&mut self);
}

/// Buzzer for boards without a speaker.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopBuzzer;

impl Buzzer for NoopBuzzer {
    fn start(&mut self, _frequency_hz: u32) {}

    fn stop(&mut self) {}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct ActiveTone {
    pattern: TonePattern,
    started: Millis,
}

/// Plays one pattern at a time and silences it once its duration expires.
pub struct TonePlayer<B> {
    id: TaskId,
    interval_ms: u32,
    buzzer: B,
    active: Option<ActiveTone>,
}

impl<B: Buzzer> TonePlayer<B> {
    pub const fn new(id: TaskId, buzzer: B, interval_ms: u32) -> Self {
        Self {
            id,
            interval_ms,
            buzzer,
            active: None,
        }
    }

    /// Starts `pattern` unless a non-interrupting pattern would cut into an
    /// active tone. Returns `true` when the buzzer was started.
    pub fn play(&mut self, pattern: TonePattern, now: Millis) -> bool {
        if self.active.is_some() && !pattern.interrupts() {
            return false;
        }
        self.buzzer.start(pattern.frequency_hz());
        self.active = Some(ActiveTone {
            pattern,
            started: now,
        });
        true
    }

    /// Silences the buzzer. Idempotent.
    pub fn stop(&mut self) -> bool {
        if self.active.take().is_some() {
            self.buzzer.stop();
            true
        } else {
            false
        }
    }

    /// Stops the active tone once its duration has elapsed.
    pub fn update(&mut self, now: Millis) -> bool {
        let Some(tone) = self.active else {
            return false;
        };
        now.has_elapsed(tone.started, tone.pattern.duration_ms()) && self.stop()
    }

    pub const fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<TonePattern> {
        self.active.map(|tone| tone.pattern)
    }

    pub const fn buzzer(&self) -> &B {
        &self.buzzer
    }
}

impl<B: Buzzer, M> Behavior<M> for TonePlayer<B> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &'static str {
        "tone"
    }

    fn run_interval_ms(&self) -> u32 {
        self.interval_ms
    }

    fn run(&mut self, ctx: &mut TaskContext<'_, M>) {
        if self.update(ctx.now()) {
            ctx.record(DeviceEvent::ToneStopped);
        }
    }

    fn inhibited(&mut self, ctx: &mut TaskContext<'_, M>) {
        if self.stop() {
            ctx.record(DeviceEvent::ToneStopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        frequency: Option<u32>,
        starts: u32,
        stops: u32,
    }

    impl Buzzer for Recorder {
        fn start(&mut self, frequency_hz: u32) {
            self.frequency = Some(frequency_hz);
            self.starts += 1;
        }

        fn stop(&mut self) {
            self.frequency = None;
            self.stops += 1;
        }
    }

    fn player() -> TonePlayer<Recorder> {
        TonePlayer::new(TaskId::from_index(2), Recorder::default(), TONE_INTERVAL_MS)
    }

    #[test]
    fn tone_expires_after_its_duration() {
        let mut tones = player();
        assert!(tones.play(TonePattern::RecordingStart, Millis::new(1_000)));
        assert_eq!(tones.buzzer().frequency, Some(1_000));

        assert!(!tones.update(Millis::new(1_099)));
        assert!(tones.update(Millis::new(1_100)));
        assert!(!tones.is_playing());
        assert_eq!(tones.buzzer().stops, 1);
    }

    #[test]
    fn state_changes_interrupt_but_chime_does_not() {
        let mut tones = player();
        tones.play(TonePattern::CalibrationStart, Millis::new(0));

        assert!(!tones.play(TonePattern::CalibrationComplete, Millis::new(10)));
        assert_eq!(tones.current(), Some(TonePattern::CalibrationStart));

        assert!(tones.play(TonePattern::RecordingStop, Millis::new(20)));
        assert_eq!(tones.buzzer().frequency, Some(600));

        tones.update(Millis::new(200));
        assert!(tones.play(TonePattern::CalibrationComplete, Millis::new(210)));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut tones = player();
        assert!(!tones.stop());
        tones.play(TonePattern::RecordingStart, Millis::new(5));
        assert!(tones.stop());
        assert!(!tones.stop());
        assert_eq!(tones.buzzer().stops, 1);
    }
}
