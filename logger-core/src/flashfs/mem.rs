//! RAM-backed NOR flash for host tools and tests.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash, check_erase, check_read, check_write,
};

/// Erase granularity, matching a 2 KiB MCU flash page.
pub const MEM_ERASE_SIZE: usize = 2048;
/// Program granularity, matching double-word programming.
pub const MEM_WRITE_SIZE: usize = 8;

/// In-memory flash that follows NOR rules: erase sets bytes to `0xFF` and
/// programming can only clear bits.
#[derive(Clone)]
pub struct MemFlash<const SIZE: usize> {
    bytes: [u8; SIZE],
    erases: u32,
    fail_writes: bool,
}

impl<const SIZE: usize> MemFlash<SIZE> {
    /// Creates a fully erased device.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: [0xFF; SIZE],
            erases: 0,
            fail_writes: false,
        }
    }

    /// Raw contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of sector erases performed.
    #[must_use]
    pub const fn erase_count(&self) -> u32 {
        self.erases
    }

    /// Makes every following program operation fail.
    pub fn set_write_failure(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl<const SIZE: usize> Default for MemFlash<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> ErrorType for MemFlash<SIZE> {
    type Error = NorFlashErrorKind;
}

impl<const SIZE: usize> ReadNorFlash for MemFlash<SIZE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(&*self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.bytes[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize> NorFlash for MemFlash<SIZE> {
    const WRITE_SIZE: usize = MEM_WRITE_SIZE;
    const ERASE_SIZE: usize = MEM_ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(&*self, from, to)?;
        self.bytes[from as usize..to as usize].fill(0xFF);
        self.erases = self.erases.saturating_add(1);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(&*self, offset, bytes.len())?;
        if self.fail_writes {
            return Err(NorFlashErrorKind::Other);
        }
        let start = offset as usize;
        for (cell, byte) in self.bytes[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programming_only_clears_bits() {
        let mut flash = MemFlash::<MEM_ERASE_SIZE>::new();
        flash.write(0, &[0x0F; 8]).unwrap();
        flash.write(0, &[0xF3; 8]).unwrap();

        let mut out = [0u8; 8];
        flash.read(0, &mut out).unwrap();
        assert_eq!(out, [0x03; 8]);

        flash.erase(0, MEM_ERASE_SIZE as u32).unwrap();
        flash.read(0, &mut out).unwrap();
        assert_eq!(out, [0xFF; 8]);
    }

    #[test]
    fn misaligned_access_is_rejected() {
        let mut flash = MemFlash::<MEM_ERASE_SIZE>::new();
        assert_eq!(flash.write(3, &[0; 8]), Err(NorFlashErrorKind::NotAligned));
        assert_eq!(flash.erase(0, 100), Err(NorFlashErrorKind::NotAligned));
        let mut out = [0u8; 4];
        assert_eq!(
            flash.read(MEM_ERASE_SIZE as u32, &mut out),
            Err(NorFlashErrorKind::OutOfBounds)
        );
    }
}
