use logger_core::button::{ButtonEvent, ButtonState, ButtonTiming, DebouncedButton};
use logger_core::time::Millis;

const D: u32 = 50;
const H: u32 = 3_000;
const Q: u32 = 200;

struct Trace {
    events: Vec<(ButtonEvent, u32)>,
    idle_at: Option<u32>,
}

/// Feeds `levels` one millisecond apart starting at `start`, consuming
/// events as they appear.
fn run(
    button: &mut DebouncedButton,
    start: u32,
    levels: impl IntoIterator<Item = bool>,
) -> Trace {
    let mut trace = Trace {
        events: Vec::new(),
        idle_at: None,
    };
    for (offset, pressed) in (0u32..).zip(levels) {
        let now = start.wrapping_add(offset);
        if button.update(pressed, Millis::new(now)) == Some(ButtonState::Idle) {
            trace.idle_at = Some(now);
        }
        if let Some(event) = button.take_event() {
            trace.events.push((event, now));
        }
    }
    trace
}

fn held_then_released(held_ms: u32, released_ms: u32) -> impl Iterator<Item = bool> {
    core::iter::repeat_n(true, held_ms as usize)
        .chain(core::iter::repeat_n(false, released_ms as usize))
}

#[test]
fn hundred_ms_press_yields_one_short_press() {
    let mut button = DebouncedButton::new(ButtonTiming::DEFAULT);
    let release_at = 1_000 + 100;
    let trace = run(&mut button, 1_000, held_then_released(100, 1_000));

    assert_eq!(trace.events.len(), 1);
    assert_eq!(trace.events[0].0, ButtonEvent::ShortPress);

    let idle_at = trace.idle_at.expect("machine returns to idle");
    assert!(
        idle_at >= release_at + D + Q,
        "idle at {idle_at}, release at {release_at}"
    );
}

#[test]
fn long_hold_fires_before_release() {
    let mut button = DebouncedButton::new(ButtonTiming::DEFAULT);
    let trace = run(&mut button, 0, held_then_released(3_500, 1_000));

    assert_eq!(trace.events.len(), 1, "{:?}", trace.events);
    let (event, at) = trace.events[0];
    assert_eq!(event, ButtonEvent::LongPress);
    assert!(at < 3_500, "emitted at {at}ms, released at 3500ms");
    // The quiet window restarts on every sample that still reads pressed.
    let last_pressed = 3_499;
    assert!(trace.idle_at.is_some_and(|idle| idle >= last_pressed + Q));
}

#[test]
fn bounce_on_press_and_release_is_absorbed() {
    let mut button = DebouncedButton::new(ButtonTiming::DEFAULT);
    let noisy = [true, false, true, true, false]
        .into_iter()
        .chain(core::iter::repeat_n(true, 200))
        .chain([false, true, false, true])
        .chain(core::iter::repeat_n(false, 600));
    let trace = run(&mut button, 10, noisy);

    assert_eq!(trace.events.len(), 1);
    assert_eq!(trace.events[0].0, ButtonEvent::ShortPress);
}

#[test]
fn sampling_at_task_cadence_keeps_the_contract() {
    let timing = ButtonTiming::DEFAULT;
    let step = timing.sample_interval_ms();
    let mut button = DebouncedButton::new(timing);
    let mut events = Vec::new();

    let mut now = 0;
    while now < 2_000 {
        let pressed = (100..220).contains(&now);
        button.update(pressed, Millis::new(now));
        events.extend(button.take_event());
        now += step;
    }

    assert_eq!(events, vec![ButtonEvent::ShortPress]);
    assert_eq!(button.state(), ButtonState::Idle);
}

/// Small deterministic generator so the sequence test needs no extra crates.
struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u32) -> u32 {
        self.next() % bound
    }
}

#[test]
fn random_press_cycles_emit_the_expected_event() {
    let mut rng = XorShift(0x1234_5678);
    let mut button = DebouncedButton::new(ButtonTiming::DEFAULT);
    let mut now = 5u32;

    for cycle in 0..200 {
        // Stay clear of the exact threshold edges.
        let held = match rng.below(3) {
            0 => rng.below(D - 3),
            1 => D + 3 + rng.below(H - D - 6),
            _ => H + 3 + rng.below(1_500),
        };
        let gap = D + Q + 5 + rng.below(300);

        let trace = run(&mut button, now, held_then_released(held, gap));
        let expected = if held < D {
            None
        } else if held < H {
            Some(ButtonEvent::ShortPress)
        } else {
            Some(ButtonEvent::LongPress)
        };

        assert!(trace.events.len() <= 1, "cycle {cycle}: {:?}", trace.events);
        assert_eq!(
            trace.events.first().map(|(event, _)| *event),
            expected,
            "cycle {cycle} held {held}ms"
        );
        assert_eq!(button.state(), ButtonState::Idle, "cycle {cycle}");
        now = now.wrapping_add(held + gap);
    }
}
