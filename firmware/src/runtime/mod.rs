use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Input, OutputType, Pull};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::time::{Hertz, khz};
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Ticker};
use logger_core::calibration::FlashCalibrationStore;
use logger_core::config::DeviceConfig;
use logger_core::device::{Device, DeviceParts};
use logger_core::flashfs::SlotLogFs;
use logger_core::time::Clock;
use static_cell::StaticCell;

use crate::hw::flash::{FlashWindow, LOG_SLOT_COUNT, LOG_SLOT_SIZE, SharedFlash};
use crate::hw::imu::Mpu6050;
use crate::hw::{EmbassyClock, PinButton, PwmBuzzer};

mod journal;

/// Scheduler pass period.
const PASS_PERIOD: Duration = Duration::from_millis(1);

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

static FLASH: StaticCell<SharedFlash> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(_spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PB4,
        PB8,
        PB9,
        I2C1,
        TIM3,
        FLASH: flash_peripheral,
        ..
    } = hal::init(config);

    let flash: &'static SharedFlash = FLASH.init(Mutex::new(RefCell::new(Flash::new_blocking(
        flash_peripheral,
    ))));

    let storage = match SlotLogFs::mount(FlashWindow::logs(flash), 0, LOG_SLOT_SIZE, LOG_SLOT_COUNT)
    {
        Ok(storage) => storage,
        Err(error) => halt("log storage mount failed", error).await,
    };

    let i2c = I2c::new_blocking(I2C1, PB8, PB9, Hertz(400_000), i2c::Config::default());
    let sensor = match Mpu6050::new(i2c) {
        Ok(sensor) => sensor,
        Err(error) => halt("imu init failed", error).await,
    };

    let pwm = SimplePwm::new(
        TIM3,
        Some(PwmPin::new(PB4, OutputType::PushPull)),
        None,
        None,
        None,
        khz(1),
        CountingMode::EdgeAlignedUp,
    );

    let parts = DeviceParts {
        sensor,
        calibration: FlashCalibrationStore::at_end(FlashWindow::calibration(flash)),
        button: PinButton::new(Input::new(PA0, Pull::Up)),
        buzzer: PwmBuzzer::new(pwm),
        storage,
    };
    let mut device = match Device::new(parts, &DeviceConfig::DEFAULT) {
        Ok(device) => device,
        Err(error) => halt("task set rejected", error).await,
    };
    defmt::info!(
        "motion logger ready, calibrated={}",
        device.is_calibrated()
    );

    let clock = EmbassyClock;
    let mut cursor = device.journal().next_id();
    let mut ticker = Ticker::every(PASS_PERIOD);
    loop {
        device.tick(clock.now());
        cursor = journal::emit_since(device.journal(), cursor);
        ticker.next().await;
    }
}

async fn halt<E: core::fmt::Debug>(context: &str, error: E) -> ! {
    defmt::error!("{}: {}", context, defmt::Debug2Format(&error));
    loop {
        core::future::pending::<()>().await;
    }
}
