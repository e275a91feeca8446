//! Debounced push-button state machine and the behavior that samples it.

use core::fmt;

use crate::scheduler::{Behavior, TaskContext, TaskId};
use crate::telemetry::DeviceEvent;
use crate::time::Millis;

/// Timing windows for the debounced button.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonTiming {
    /// Minimum time a level must hold before it is believed.
    pub debounce_ms: u32,
    /// Press duration at which a long press fires.
    pub hold_ms: u32,
    /// Quiet window after a confirmed release.
    pub quiet_ms: u32,
}

impl ButtonTiming {
    pub const DEFAULT: Self = Self {
        debounce_ms: 50,
        hold_ms: 3_000,
        quiet_ms: 200,
    };

    /// Sampling cadence that gives several reads per debounce window.
    #[must_use]
    pub const fn sample_interval_ms(&self) -> u32 {
        self.debounce_ms / 4 + 1
    }
}

impl Default for ButtonTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Position of the debounced machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ButtonState {
    Idle,
    DebouncePressed,
    PressedHold,
    DebounceReleased,
    ReleasedInhibit,
}

impl fmt::Display for ButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ButtonState::Idle => "idle",
            ButtonState::DebouncePressed => "debounce-pressed",
            ButtonState::PressedHold => "pressed-hold",
            ButtonState::DebounceReleased => "debounce-released",
            ButtonState::ReleasedInhibit => "released-inhibit",
        };
        f.write_str(label)
    }
}

/// Discrete events recovered from the raw level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonEvent::ShortPress => f.write_str("short-press"),
            ButtonEvent::LongPress => f.write_str("long-press"),
        }
    }
}

/// Pure debouncing state machine fed with timestamped level samples.
///
/// At most one event is pending at a time. The machine only emits on the
/// transition into [`ButtonState::ReleasedInhibit`] and refuses to emit while
/// a previous event is still unconsumed.
#[derive(Clone, Debug)]
pub struct DebouncedButton {
    timing: ButtonTiming,
    state: ButtonState,
    press_start: Option<Millis>,
    release_start: Option<Millis>,
    pending: Option<ButtonEvent>,
    emitted_this_cycle: bool,
}

impl DebouncedButton {
    #[must_use]
    pub const fn new(timing: ButtonTiming) -> Self {
        Self {
            timing,
            state: ButtonState::Idle,
            press_start: None,
            release_start: None,
            pending: None,
            emitted_this_cycle: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ButtonState {
        self.state
    }

    #[must_use]
    pub const fn timing(&self) -> ButtonTiming {
        self.timing
    }

    /// Event waiting for a consumer, if any.
    #[must_use]
    pub const fn pending_event(&self) -> Option<ButtonEvent> {
        self.pending
    }

    /// Reads and clears the pending event.
    pub fn take_event(&mut self) -> Option<ButtonEvent> {
        self.pending.take()
    }

    /// Feeds one level sample. Returns the new state when it changed.
    pub fn update(&mut self, pressed: bool, now: Millis) -> Option<ButtonState> {
        let before = self.state;
        let timing = self.timing;

        match self.state {
            ButtonState::Idle => {
                if pressed {
                    self.press_start = Some(now);
                    self.emitted_this_cycle = false;
                    self.state = ButtonState::DebouncePressed;
                }
            }
            ButtonState::DebouncePressed => {
                if !pressed {
                    self.press_start = None;
                    self.state = ButtonState::Idle;
                } else if self.since_press(now) >= timing.debounce_ms {
                    self.state = ButtonState::PressedHold;
                }
            }
            ButtonState::PressedHold => {
                if !pressed {
                    self.release_start = Some(now);
                    self.state = ButtonState::DebounceReleased;
                } else if self.since_press(now) >= timing.hold_ms {
                    self.emit(ButtonEvent::LongPress);
                    self.release_start = Some(now);
                    self.state = ButtonState::ReleasedInhibit;
                }
            }
            ButtonState::DebounceReleased => {
                if pressed {
                    self.release_start = None;
                    self.state = ButtonState::PressedHold;
                } else if self.since_release(now) >= timing.debounce_ms {
                    let held = self.held_ms();
                    if held >= timing.hold_ms {
                        // Crossed the hold threshold between two samples.
                        self.emit(ButtonEvent::LongPress);
                    } else if held >= timing.debounce_ms {
                        self.emit(ButtonEvent::ShortPress);
                    }
                    self.release_start = Some(now);
                    self.state = ButtonState::ReleasedInhibit;
                }
            }
            ButtonState::ReleasedInhibit => {
                if pressed {
                    self.release_start = Some(now);
                } else if self.since_release(now) >= timing.quiet_ms {
                    self.press_start = None;
                    self.release_start = None;
                    self.state = ButtonState::Idle;
                }
            }
        }

        (self.state != before).then_some(self.state)
    }

    fn emit(&mut self, event: ButtonEvent) {
        if self.pending.is_none() && !self.emitted_this_cycle {
            self.pending = Some(event);
            self.emitted_this_cycle = true;
        }
    }

    fn since_press(&self, now: Millis) -> u32 {
        self.press_start.map_or(0, |start| now.elapsed_since(start))
    }

    fn since_release(&self, now: Millis) -> u32 {
        self.release_start.map_or(0, |start| now.elapsed_since(start))
    }

    fn held_ms(&self) -> u32 {
        match (self.press_start, self.release_start) {
            (Some(press), Some(release)) => release.elapsed_since(press),
            _ => 0,
        }
    }
}

impl Default for DebouncedButton {
    fn default() -> Self {
        Self::new(ButtonTiming::DEFAULT)
    }
}

/// Digital input the button behavior reads.
pub trait ButtonInput {
    /// Returns `true` while the button is physically held.
    fn is_pressed(&mut self) -> bool;
}

/// Input that is never pressed.
#[derive(Copy, Clone, Debug, Default)]
pub struct ReleasedInput;

impl ButtonInput for ReleasedInput {
    fn is_pressed(&mut self) -> bool {
        false
    }
}

/// Behavior that samples the input, runs the machine and forwards events.
///
/// The behavior is the sole consumer of its machine's events. Each event is
/// journaled and posted to the rest of the device as `M::from(event)`.
pub struct ButtonTask<I> {
    id: TaskId,
    input: I,
    machine: DebouncedButton,
    last_event: Option<ButtonEvent>,
    events: u32,
}

impl<I: ButtonInput> ButtonTask<I> {
    pub const fn new(id: TaskId, input: I, timing: ButtonTiming) -> Self {
        Self {
            id,
            input,
            machine: DebouncedButton::new(timing),
            last_event: None,
            events: 0,
        }
    }

    pub const fn state(&self) -> ButtonState {
        self.machine.state()
    }

    /// Most recent event the behavior forwarded.
    pub const fn last_event(&self) -> Option<ButtonEvent> {
        self.last_event
    }

    /// Number of events forwarded since boot.
    pub const fn event_count(&self) -> u32 {
        self.events
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }
}

impl<I, M> Behavior<M> for ButtonTask<I>
where
    I: ButtonInput,
    M: From<ButtonEvent>,
{
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &'static str {
        "button"
    }

    fn run_interval_ms(&self) -> u32 {
        self.machine.timing().sample_interval_ms()
    }

    fn run(&mut self, ctx: &mut TaskContext<'_, M>) {
        let pressed = self.input.is_pressed();
        self.machine.update(pressed, ctx.now());

        if let Some(event) = self.machine.take_event() {
            self.last_event = Some(event);
            self.events = self.events.wrapping_add(1);
            ctx.record(DeviceEvent::Button(event));
            ctx.post(M::from(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(
        button: &mut DebouncedButton,
        pressed: bool,
        from: u32,
        to: u32,
    ) -> Option<(ButtonEvent, u32)> {
        let mut seen = None;
        for t in from..to {
            button.update(pressed, Millis::new(t));
            if let Some(event) = button.take_event() {
                assert!(seen.is_none(), "second event at {t}ms");
                seen = Some((event, t));
            }
        }
        seen
    }

    #[test]
    fn noise_shorter_than_debounce_is_ignored() {
        let mut button = DebouncedButton::default();
        assert!(drive(&mut button, true, 0, 30).is_none());
        assert_eq!(button.state(), ButtonState::DebouncePressed);
        assert!(drive(&mut button, false, 30, 400).is_none());
        assert_eq!(button.state(), ButtonState::Idle);
    }

    #[test]
    fn release_bounce_returns_to_hold() {
        let mut button = DebouncedButton::default();
        drive(&mut button, true, 0, 80);
        assert_eq!(button.state(), ButtonState::PressedHold);

        button.update(false, Millis::new(80));
        assert_eq!(button.state(), ButtonState::DebounceReleased);
        button.update(true, Millis::new(85));
        assert_eq!(button.state(), ButtonState::PressedHold);
    }

    #[test]
    fn short_press_fires_once_after_release_debounce() {
        let mut button = DebouncedButton::default();
        assert!(drive(&mut button, true, 0, 120).is_none());
        let event = drive(&mut button, false, 120, 500);
        assert_eq!(event, Some((ButtonEvent::ShortPress, 170)));
        assert_eq!(button.state(), ButtonState::Idle);
    }

    #[test]
    fn presses_inside_quiet_window_extend_it() {
        let mut button = DebouncedButton::default();
        drive(&mut button, true, 0, 100);
        let event = drive(&mut button, false, 100, 160);
        assert_eq!(event, Some((ButtonEvent::ShortPress, 150)));
        assert_eq!(button.state(), ButtonState::ReleasedInhibit);

        assert!(drive(&mut button, true, 160, 260).is_none());
        assert_eq!(button.state(), ButtonState::ReleasedInhibit);
        assert!(drive(&mut button, false, 260, 459).is_none());
        assert_eq!(button.state(), ButtonState::ReleasedInhibit);
        button.update(false, Millis::new(459));
        assert_eq!(button.state(), ButtonState::Idle);
    }

    #[test]
    fn unconsumed_event_blocks_the_next_one() {
        let mut button = DebouncedButton::default();
        for t in 0..100 {
            button.update(true, Millis::new(t));
        }
        for t in 100..400 {
            button.update(false, Millis::new(t));
        }
        for t in 400..500 {
            button.update(true, Millis::new(t));
        }
        for t in 500..800 {
            button.update(false, Millis::new(t));
        }
        assert_eq!(button.take_event(), Some(ButtonEvent::ShortPress));
        assert_eq!(button.take_event(), None);
    }

    #[test]
    fn hold_crossing_between_samples_still_reads_as_long() {
        let mut button = DebouncedButton::default();
        button.update(true, Millis::new(0));
        button.update(true, Millis::new(60));
        button.update(false, Millis::new(3_100));
        button.update(false, Millis::new(3_160));
        assert_eq!(button.take_event(), Some(ButtonEvent::LongPress));
    }

    #[test]
    fn windows_span_a_clock_wrap() {
        let mut button = DebouncedButton::default();
        let start = Millis::new(u32::MAX - 20);
        button.update(true, start);
        button.update(true, start.wrapping_add(50));
        assert_eq!(button.state(), ButtonState::PressedHold);
        button.update(false, start.wrapping_add(90));
        button.update(false, start.wrapping_add(140));
        assert_eq!(button.take_event(), Some(ButtonEvent::ShortPress));
    }

    #[test]
    fn sample_interval_follows_debounce() {
        assert_eq!(ButtonTiming::DEFAULT.sample_interval_ms(), 13);
    }
}
