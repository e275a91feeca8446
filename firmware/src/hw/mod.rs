//! Board adapters that implement the `logger-core` hardware traits.
//!
//! Pin assignment on the logger board:
//!
//! | signal  | pin  | notes                          |
//! |---------|------|--------------------------------|
//! | button  | PA0  | active low, internal pull-up   |
//! | buzzer  | PB4  | TIM3 CH1 square wave           |
//! | IMU SCL | PB8  | I2C1, 400 kHz                  |
//! | IMU SDA | PB9  |                                |

pub mod flash;
pub mod imu;

use embassy_stm32::gpio::Input;
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_time::Instant;
use logger_core::button::ButtonInput;
use logger_core::time::{Clock, Millis};
use logger_core::tone::Buzzer;

/// Push button wired between the pin and ground.
pub struct PinButton<'d> {
    pin: Input<'d>,
}

impl<'d> PinButton<'d> {
    pub fn new(pin: Input<'d>) -> Self {
        Self { pin }
    }
}

impl ButtonInput for PinButton<'_> {
    fn is_pressed(&mut self) -> bool {
        self.pin.is_low()
    }
}

/// Passive piezo driven with a 50% duty square wave.
pub struct PwmBuzzer<'d> {
    pwm: SimplePwm<'d, TIM3>,
}

impl<'d> PwmBuzzer<'d> {
    pub fn new(mut pwm: SimplePwm<'d, TIM3>) -> Self {
        pwm.ch1().disable();
        Self { pwm }
    }
}

impl Buzzer for PwmBuzzer<'_> {
    fn start(&mut self, frequency_hz: u32) {
        self.pwm.set_frequency(Hertz(frequency_hz));
        let mut channel = self.pwm.ch1();
        channel.set_duty_cycle_percent(50);
        channel.enable();
    }

    fn stop(&mut self) {
        self.pwm.ch1().disable();
    }
}

/// Millisecond clock derived from the embassy time driver.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Millis {
        // Truncation gives the wrapping 32-bit counter the core expects.
        #[allow(clippy::cast_possible_truncation)]
        let ticks = Instant::now().as_millis() as u32;
        Millis::new(ticks)
    }
}
