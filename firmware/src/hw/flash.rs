//! Windows onto the internal flash shared by the log area and calibration.

use core::cell::RefCell;

use embassy_stm32::flash::Flash;
use embassy_stm32::mode::Blocking;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash, check_erase, check_read,
    check_write,
};

/// STM32G0 page size.
pub const PAGE_SIZE: u32 = 2048;
/// Double-word programming granularity.
pub const PROGRAM_SIZE: usize = 8;

/// Log slots start above the firmware image.
pub const LOG_REGION_OFFSET: u32 = 0x0006_0000;
pub const LOG_SLOT_SIZE: u32 = 16 * 1024;
pub const LOG_SLOT_COUNT: usize = 7;
pub const LOG_REGION_LEN: u32 = 0x0001_C000;
/// Last page of the device, below which the log slots end.
pub const CALIBRATION_OFFSET: u32 = 0x0007_F800;

pub type SharedFlash = Mutex<CriticalSectionRawMutex, RefCell<Flash<'static, Blocking>>>;

/// Byte range of the internal flash exposed as its own NOR device.
pub struct FlashWindow {
    flash: &'static SharedFlash,
    base: u32,
    len: u32,
}

impl FlashWindow {
    pub const fn new(flash: &'static SharedFlash, base: u32, len: u32) -> Self {
        Self { flash, base, len }
    }

    /// Window holding the log slots.
    pub const fn logs(flash: &'static SharedFlash) -> Self {
        Self::new(flash, LOG_REGION_OFFSET, LOG_REGION_LEN)
    }

    pub const fn calibration(flash: &'static SharedFlash) -> Self {
        Self::new(flash, CALIBRATION_OFFSET, PAGE_SIZE)
    }
}

impl ErrorType for FlashWindow {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for FlashWindow {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(&*self, offset, bytes.len())?;
        self.flash.lock(|flash| {
            flash
                .borrow_mut()
                .blocking_read(self.base + offset, bytes)
                .map_err(|error| error.kind())
        })
    }

    fn capacity(&self) -> usize {
        self.len as usize
    }
}

impl NorFlash for FlashWindow {
    const WRITE_SIZE: usize = PROGRAM_SIZE;
    const ERASE_SIZE: usize = PAGE_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(&*self, from, to)?;
        self.flash.lock(|flash| {
            flash
                .borrow_mut()
                .blocking_erase(self.base + from, self.base + to)
                .map_err(|error| error.kind())
        })
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(&*self, offset, bytes.len())?;
        self.flash.lock(|flash| {
            flash
                .borrow_mut()
                .blocking_write(self.base + offset, bytes)
                .map_err(|error| error.kind())
        })
    }
}
