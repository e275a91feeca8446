//! Persisted calibration offsets.
//!
//! The blob is a packed 34-byte little-endian structure:
//! magic `u32`, version `u8`, flags `u8`, six `f32` offsets (accel x/y/z then
//! gyro x/y/z) and a `u32` checksum over every preceding byte.

use core::fmt;

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use crate::sensor::{Axes, CalibrationOffsets, CalibrationStore};

pub const CALIBRATION_MAGIC: u32 = 0x4341_4C45;
pub const CALIBRATION_VERSION: u8 = 1;
pub const FLAG_VALID: u8 = 0x01;
pub const BLOB_SIZE: usize = 34;

const CHECKSUM_OFFSET: usize = BLOB_SIZE - 4;
/// Largest program granularity the store pads the blob to.
const MAX_PADDED: usize = 64;

/// Reasons a stored blob is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlobError {
    Erased,
    BadMagic(u32),
    BadVersion(u8),
    NotValid,
    Checksum { stored: u32, computed: u32 },
    Flash(NorFlashErrorKind),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::Erased => f.write_str("no calibration stored"),
            BlobError::BadMagic(magic) => write!(f, "bad magic {magic:#010x}"),
            BlobError::BadVersion(version) => write!(f, "unsupported version {version}"),
            BlobError::NotValid => f.write_str("valid flag clear"),
            BlobError::Checksum { stored, computed } => {
                write!(f, "checksum mismatch stored={stored:#010x} computed={computed:#010x}")
            }
            BlobError::Flash(kind) => write!(f, "flash error: {kind:?}"),
        }
    }
}

/// Add each byte, then rotate the accumulator left by one bit.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &byte| {
        acc.wrapping_add(u32::from(byte)).rotate_left(1)
    })
}

/// Encoder and validator for the persisted calibration layout.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CalibrationBlob {
    pub offsets: CalibrationOffsets,
    pub flags: u8,
}

impl CalibrationBlob {
    #[must_use]
    pub const fn new(offsets: CalibrationOffsets) -> Self {
        Self {
            offsets,
            flags: FLAG_VALID,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; BLOB_SIZE] {
        let mut out = [0u8; BLOB_SIZE];
        out[0..4].copy_from_slice(&CALIBRATION_MAGIC.to_le_bytes());
        out[4] = CALIBRATION_VERSION;
        out[5] = self.flags | FLAG_VALID;

        let CalibrationOffsets { accel, gyro } = self.offsets;
        let values = [accel.x, accel.y, accel.z, gyro.x, gyro.y, gyro.z];
        for (chunk, value) in out[6..CHECKSUM_OFFSET].chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }

        let sum = checksum(&out[..CHECKSUM_OFFSET]);
        out[CHECKSUM_OFFSET..].copy_from_slice(&sum.to_le_bytes());
        out
    }

    /// Validates magic, version, flag and checksum before decoding.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub fn decode(bytes: &[u8; BLOB_SIZE]) -> Result<Self, BlobError> {
        if bytes.iter().all(|&byte| byte == 0xFF) {
            return Err(BlobError::Erased);
        }
        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];

        let magic = u32::from_le_bytes(word(0));
        if magic != CALIBRATION_MAGIC {
            return Err(BlobError::BadMagic(magic));
        }
        if bytes[4] != CALIBRATION_VERSION {
            return Err(BlobError::BadVersion(bytes[4]));
        }
        let flags = bytes[5];
        if flags & FLAG_VALID == 0 {
            return Err(BlobError::NotValid);
        }
        let stored = u32::from_le_bytes(word(CHECKSUM_OFFSET));
        let computed = checksum(&bytes[..CHECKSUM_OFFSET]);
        if stored != computed {
            return Err(BlobError::Checksum { stored, computed });
        }

        let float = |at: usize| f32::from_le_bytes(word(at));
        Ok(Self {
            offsets: CalibrationOffsets {
                accel: Axes::new(float(6), float(10), float(14)),
                gyro: Axes::new(float(18), float(22), float(26)),
            },
            flags,
        })
    }
}

/// Calibration store occupying one erase sector of NOR flash.
pub struct FlashCalibrationStore<F> {
    flash: F,
    offset: u32,
    last_error: Option<BlobError>,
}

impl<F: NorFlash> FlashCalibrationStore<F> {
    /// Uses the sector starting at `offset`.
    pub const fn new(flash: F, offset: u32) -> Self {
        Self {
            flash,
            offset,
            last_error: None,
        }
    }

    /// Uses the last erase sector of the device.
    pub fn at_end(flash: F) -> Self {
        let sector = u32::try_from(F::ERASE_SIZE).unwrap_or(u32::MAX);
        let capacity = u32::try_from(flash.capacity()).unwrap_or(u32::MAX);
        let offset = capacity.saturating_sub(sector);
        Self::new(flash, offset)
    }

    /// Why the most recent load or save failed.
    pub const fn last_error(&self) -> Option<BlobError> {
        self.last_error
    }

    /// Reads and validates the stored blob.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] when nothing valid is stored.
    pub fn read_blob(&mut self) -> Result<CalibrationBlob, BlobError> {
        let mut bytes = [0u8; BLOB_SIZE];
        self.flash
            .read(self.offset, &mut bytes)
            .map_err(|e| BlobError::Flash(e.kind()))?;
        CalibrationBlob::decode(&bytes)
    }

    /// Erases the sector so the next load falls back to raw readings.
    ///
    /// # Errors
    ///
    /// Propagates the flash failure.
    pub fn clear(&mut self) -> Result<(), BlobError> {
        let end = self.sector_end()?;
        self.flash
            .erase(self.offset, end)
            .map_err(|e| BlobError::Flash(e.kind()))
    }

    pub fn into_flash(self) -> F {
        self.flash
    }

    fn sector_end(&self) -> Result<u32, BlobError> {
        u32::try_from(F::ERASE_SIZE)
            .ok()
            .and_then(|size| self.offset.checked_add(size))
            .ok_or(BlobError::Flash(NorFlashErrorKind::OutOfBounds))
    }

    fn write_blob(&mut self, blob: &CalibrationBlob) -> Result<(), BlobError> {
        let padded = BLOB_SIZE.div_ceil(F::WRITE_SIZE) * F::WRITE_SIZE;
        if padded > MAX_PADDED {
            return Err(BlobError::Flash(NorFlashErrorKind::NotAligned));
        }
        let mut buffer = [0xFFu8; MAX_PADDED];
        buffer[..BLOB_SIZE].copy_from_slice(&blob.encode());

        self.clear()?;
        self.flash
            .write(self.offset, &buffer[..padded])
            .map_err(|e| BlobError::Flash(e.kind()))
    }
}

impl<F: NorFlash> CalibrationStore for FlashCalibrationStore<F> {
    type Error = BlobError;

    fn load(&mut self) -> Option<CalibrationOffsets> {
        match self.read_blob() {
            Ok(blob) => Some(blob.offsets),
            Err(error) => {
                self.last_error = Some(error);
                None
            }
        }
    }

    fn save(&mut self, offsets: &CalibrationOffsets) -> Result<(), BlobError> {
        let result = self.write_blob(&CalibrationBlob::new(*offsets));
        self.last_error = result.err();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashfs::{MEM_ERASE_SIZE, MemFlash};

    fn offsets() -> CalibrationOffsets {
        CalibrationOffsets {
            accel: Axes::new(0.12, -0.05, 0.31),
            gyro: Axes::new(0.001, 0.002, -0.003),
        }
    }

    #[test]
    fn checksum_rotates_after_each_byte() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1]), 2);
        assert_eq!(checksum(&[1, 1]), 6);
        assert_eq!(checksum(&[0x80, 0, 0, 0]), 0x0000_0800);
    }

    #[test]
    fn blob_layout_is_packed() {
        let bytes = CalibrationBlob::new(offsets()).encode();
        assert_eq!(&bytes[0..4], &CALIBRATION_MAGIC.to_le_bytes());
        assert_eq!(bytes[4], CALIBRATION_VERSION);
        assert_eq!(bytes[5], FLAG_VALID);
        assert_eq!(&bytes[6..10], &0.12f32.to_le_bytes());
        assert_eq!(&bytes[26..30], &(-0.003f32).to_le_bytes());

        let decoded = CalibrationBlob::decode(&bytes).unwrap();
        assert_eq!(decoded.offsets, offsets());
    }

    #[test]
    fn corrupted_blobs_are_rejected() {
        let good = CalibrationBlob::new(offsets()).encode();

        let mut flipped = good;
        flipped[7] ^= 0x10;
        assert!(matches!(
            CalibrationBlob::decode(&flipped),
            Err(BlobError::Checksum { .. })
        ));

        let mut old = good;
        old[4] = 2;
        assert_eq!(CalibrationBlob::decode(&old), Err(BlobError::BadVersion(2)));

        assert_eq!(
            CalibrationBlob::decode(&[0xFF; BLOB_SIZE]),
            Err(BlobError::Erased)
        );
    }

    #[test]
    fn flash_store_round_trips_and_clears() {
        let mut store = FlashCalibrationStore::at_end(MemFlash::<{ MEM_ERASE_SIZE * 2 }>::new());
        assert_eq!(store.load(), None);
        assert_eq!(store.last_error(), Some(BlobError::Erased));

        store.save(&offsets()).unwrap();
        store.save(&offsets()).unwrap();
        assert_eq!(store.load(), Some(offsets()));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
    }
}
