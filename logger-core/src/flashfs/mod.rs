//! Minimal append-only log file store on raw NOR flash.
//!
//! The region is split into equal slots, each a whole number of erase
//! sectors holding at most one file:
//!
//! ```text
//! slot:   [ header (32 B) | record | record | ... | 0xFF ... ]
//! header: "MLOG" | number (u32 LE) | !number (u32 LE) | 0xFF padding
//! ```
//!
//! Nothing besides the header is persisted. The append offset is recovered
//! at mount by scanning for the first fully erased record-sized chunk, so a
//! stored chunk of all `0xFF` bytes would end the file early. Real records
//! never look like that because their flag byte has at most two bits set.

mod mem;

use core::fmt;

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};
use heapless::Vec;

pub use mem::{MEM_ERASE_SIZE, MEM_WRITE_SIZE, MemFlash};

use crate::logger::{LogStorage, file_name, parse_file_number};
use crate::record::RECORD_SIZE;

pub const SLOT_MAGIC: [u8; 4] = *b"MLOG";
pub const HEADER_SIZE: usize = 32;
pub const MAX_SLOTS: usize = 32;

/// Failures reported by [`SlotLogFs`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FsError {
    /// The name is not a log file name.
    InvalidName,
    /// Geometry or write length does not match the flash granularity.
    Unaligned,
    /// The file has no room left in its slot.
    SlotFull,
    NotFound,
    Flash(NorFlashErrorKind),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::InvalidName => f.write_str("invalid file name"),
            FsError::Unaligned => f.write_str("unaligned flash access"),
            FsError::SlotFull => f.write_str("slot full"),
            FsError::NotFound => f.write_str("file not found"),
            FsError::Flash(kind) => write!(f, "flash error: {kind:?}"),
        }
    }
}

fn flash_err<E: NorFlashError>(error: E) -> FsError {
    FsError::Flash(error.kind())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct SlotEntry {
    number: Option<u32>,
    len: u32,
}

impl SlotEntry {
    const FREE: Self = Self {
        number: None,
        len: 0,
    };
}

/// Open file; only valid for the filesystem that issued it.
#[derive(Debug, Eq, PartialEq)]
pub struct SlotHandle {
    slot: usize,
}

/// Slot-per-file log storage over a [`NorFlash`] region.
pub struct SlotLogFs<F> {
    flash: F,
    base: u32,
    slot_size: u32,
    slots: Vec<SlotEntry, MAX_SLOTS>,
}

impl<F: NorFlash> SlotLogFs<F> {
    /// Mounts `slot_count` slots of `slot_size` bytes starting at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Unaligned`] when the geometry does not match the
    /// flash granularity, or a flash error from the mount scan.
    pub fn mount(flash: F, base: u32, slot_size: u32, slot_count: usize) -> Result<Self, FsError> {
        let erase = u32::try_from(F::ERASE_SIZE).map_err(|_| FsError::Unaligned)?;
        let aligned = erase != 0
            && base % erase == 0
            && slot_size % erase == 0
            && slot_size as usize > HEADER_SIZE
            && HEADER_SIZE % F::WRITE_SIZE == 0
            && RECORD_SIZE % F::WRITE_SIZE == 0
            && slot_count <= MAX_SLOTS;
        if !aligned {
            return Err(FsError::Unaligned);
        }
        let end = u64::from(base) + u64::from(slot_size) * slot_count as u64;
        if end > flash.capacity() as u64 {
            return Err(FsError::Flash(NorFlashErrorKind::OutOfBounds));
        }

        let mut fs = Self {
            flash,
            base,
            slot_size,
            slots: Vec::new(),
        };
        for index in 0..slot_count {
            let entry = fs.scan_slot(index)?;
            fs.slots.push(entry).map_err(|_| FsError::Unaligned)?;
        }
        Ok(fs)
    }

    /// Bytes of record data one slot can hold.
    #[must_use]
    pub fn file_capacity(&self) -> u32 {
        self.slot_size - HEADER_SIZE as u32
    }

    /// Byte length of a stored file.
    #[must_use]
    pub fn file_len(&self, name: &str) -> Option<u32> {
        let number = parse_file_number(name)?;
        self.find(number).map(|slot| self.slots[slot].len)
    }

    /// Reads file bytes starting at `offset`, returning how many were copied.
    ///
    /// # Errors
    ///
    /// Fails when the file does not exist or the flash read fails.
    pub fn read(&mut self, name: &str, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let number = parse_file_number(name).ok_or(FsError::InvalidName)?;
        let slot = self.find(number).ok_or(FsError::NotFound)?;
        let len = self.slots[slot].len;
        if offset >= len {
            return Ok(0);
        }
        let available = (len - offset) as usize;
        let count = available.min(buf.len());
        let start = self.data_start(slot) + offset;
        self.flash
            .read(start, &mut buf[..count])
            .map_err(flash_err)?;
        Ok(count)
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Releases the underlying flash device.
    pub fn into_flash(self) -> F {
        self.flash
    }

    fn slot_start(&self, slot: usize) -> u32 {
        self.base + self.slot_size * slot as u32
    }

    fn data_start(&self, slot: usize) -> u32 {
        self.slot_start(slot) + HEADER_SIZE as u32
    }

    fn find(&self, number: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|entry| entry.number == Some(number))
    }

    fn scan_slot(&mut self, slot: usize) -> Result<SlotEntry, FsError> {
        let mut header = [0u8; HEADER_SIZE];
        self.flash
            .read(self.slot_start(slot), &mut header)
            .map_err(flash_err)?;
        let Some(number) = parse_header(&header) else {
            return Ok(SlotEntry::FREE);
        };

        let mut len = 0u32;
        let mut chunk = [0u8; RECORD_SIZE];
        while len + RECORD_SIZE as u32 <= self.file_capacity() {
            self.flash
                .read(self.data_start(slot) + len, &mut chunk)
                .map_err(flash_err)?;
            if chunk.iter().all(|&byte| byte == 0xFF) {
                break;
            }
            len += RECORD_SIZE as u32;
        }

        Ok(SlotEntry {
            number: Some(number),
            len,
        })
    }

    fn erase_slot(&mut self, slot: usize) -> Result<(), FsError> {
        let start = self.slot_start(slot);
        self.flash
            .erase(start, start + self.slot_size)
            .map_err(flash_err)?;
        self.slots[slot] = SlotEntry::FREE;
        Ok(())
    }

    /// Picks a free slot, recycling the oldest file when all are taken.
    fn claim_slot(&self) -> Option<usize> {
        if let Some(free) = self.slots.iter().position(|entry| entry.number.is_none()) {
            return Some(free);
        }
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.number)
            .map(|(slot, _)| slot)
    }

    fn create(&mut self, number: u32) -> Result<usize, FsError> {
        let slot = self.claim_slot().ok_or(FsError::SlotFull)?;
        self.erase_slot(slot)?;

        let mut header = [0xFFu8; HEADER_SIZE];
        header[0..4].copy_from_slice(&SLOT_MAGIC);
        header[4..8].copy_from_slice(&number.to_le_bytes());
        header[8..12].copy_from_slice(&(!number).to_le_bytes());
        self.flash
            .write(self.slot_start(slot), &header)
            .map_err(flash_err)?;

        self.slots[slot] = SlotEntry {
            number: Some(number),
            len: 0,
        };
        Ok(slot)
    }
}

fn parse_header(header: &[u8; HEADER_SIZE]) -> Option<u32> {
    if header[0..4] != SLOT_MAGIC {
        return None;
    }
    let number = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let check = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    (number == !check).then_some(number)
}

impl<F: NorFlash> LogStorage for SlotLogFs<F> {
    type Handle = SlotHandle;
    type Error = FsError;

    fn open_append(&mut self, name: &str) -> Result<SlotHandle, FsError> {
        let number = parse_file_number(name).ok_or(FsError::InvalidName)?;
        let slot = match self.find(number) {
            Some(slot) => slot,
            None => self.create(number)?,
        };
        Ok(SlotHandle { slot })
    }

    fn write(&mut self, handle: &mut SlotHandle, bytes: &[u8]) -> Result<(), FsError> {
        if bytes.len() % F::WRITE_SIZE != 0 {
            return Err(FsError::Unaligned);
        }
        let entry = self.slots.get(handle.slot).copied().ok_or(FsError::NotFound)?;
        if entry.number.is_none() {
            return Err(FsError::NotFound);
        }
        let len = u32::try_from(bytes.len()).map_err(|_| FsError::SlotFull)?;
        if entry.len + len > self.file_capacity() {
            return Err(FsError::SlotFull);
        }

        self.flash
            .write(self.data_start(handle.slot) + entry.len, bytes)
            .map_err(flash_err)?;
        self.slots[handle.slot].len = entry.len + len;
        Ok(())
    }

    fn sync(&mut self, _handle: &mut SlotHandle) -> Result<(), FsError> {
        // Programming is synchronous; there is no cache to drain.
        Ok(())
    }

    fn close(&mut self, _handle: SlotHandle) -> Result<(), FsError> {
        Ok(())
    }

    fn visit(&mut self, visitor: &mut dyn FnMut(&str, u32)) -> Result<(), FsError> {
        for entry in &self.slots {
            if let Some(number) = entry.number {
                visitor(file_name(number).as_str(), entry.len);
            }
        }
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), FsError> {
        let number = parse_file_number(name).ok_or(FsError::InvalidName)?;
        let slot = self.find(number).ok_or(FsError::NotFound)?;
        self.erase_slot(slot)
    }

    fn is_full(error: &FsError) -> bool {
        matches!(error, FsError::SlotFull)
    }
}
