//! Fixed 32-byte little-endian sample record.
//!
//! Layout, offsets in bytes:
//!
//! | offset | field     | type  |
//! |--------|-----------|-------|
//! | 0      | timestamp | `u32` |
//! | 4      | accel x   | `f32` |
//! | 8      | accel y   | `f32` |
//! | 12     | accel z   | `f32` |
//! | 16     | yaw       | `f32` |
//! | 20     | pitch     | `f32` |
//! | 24     | roll      | `f32` |
//! | 28     | flags     | `u8`  |
//! | 29     | padding   | `u8`  |
//! | 30     | reserved  | 2     |
//!
//! Files are flat concatenations of records without a header.

/// Encoded size of one record.
pub const RECORD_SIZE: usize = 32;

/// Sample captured while a recording session was active.
pub const FLAG_RECORDING: u8 = 0x01;
/// Sample corrected with stored calibration offsets.
pub const FLAG_CALIBRATED: u8 = 0x02;

/// One motion sample as stored in a log file.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LogRecord {
    /// Milliseconds since boot; zero marks an unused slot.
    pub timestamp: u32,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub flags: u8,
    pub padding: u8,
}

impl LogRecord {
    /// Serialises the record into its wire layout.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.timestamp.to_le_bytes());

        let floats = [
            self.accel_x,
            self.accel_y,
            self.accel_z,
            self.yaw,
            self.pitch,
            self.roll,
        ];
        for (chunk, value) in out[4..28].chunks_exact_mut(4).zip(floats) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }

        out[28] = self.flags;
        out[29] = self.padding;
        out
    }

    /// Parses a record from its wire layout.
    #[must_use]
    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Self {
        let word = |offset: usize| {
            [
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]
        };
        let float = |offset: usize| f32::from_le_bytes(word(offset));

        Self {
            timestamp: u32::from_le_bytes(word(0)),
            accel_x: float(4),
            accel_y: float(8),
            accel_z: float(12),
            yaw: float(16),
            pitch: float(20),
            roll: float(24),
            flags: bytes[28],
            padding: bytes[29],
        }
    }

    /// Returns `true` for the zero-timestamp sentinel.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.timestamp == 0
    }

    #[must_use]
    pub const fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag == flag
    }

    /// Field-for-field bit equality, treating `NaN` payloads as values.
    #[must_use]
    pub fn bit_eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

/// Iterator over the records in a log file image.
pub struct RecordReader<'a> {
    bytes: &'a [u8],
}

impl<'a> RecordReader<'a> {
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Bytes of a trailing partial record left after iteration.
    #[must_use]
    pub fn remainder(&self) -> &'a [u8] {
        if self.bytes.len() < RECORD_SIZE {
            self.bytes
        } else {
            &[]
        }
    }
}

impl Iterator for RecordReader<'_> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let (head, tail) = self.bytes.split_first_chunk::<RECORD_SIZE>()?;
        self.bytes = tail;
        Some(LogRecord::decode(head))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.bytes.len() / RECORD_SIZE;
        (count, Some(count))
    }
}

/// Decodes a whole file image, ignoring a trailing partial record.
#[cfg(feature = "alloc")]
#[must_use]
pub fn decode_all(bytes: &[u8]) -> alloc::vec::Vec<LogRecord> {
    RecordReader::new(bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: u32) -> LogRecord {
        LogRecord {
            timestamp,
            accel_x: 0.25,
            accel_y: -1.5,
            accel_z: 0.981,
            yaw: 12.0,
            pitch: -45.5,
            roll: 180.0,
            flags: FLAG_RECORDING | FLAG_CALIBRATED,
            padding: 0,
        }
    }

    #[test]
    fn layout_is_little_endian_and_fixed() {
        let bytes = sample(0x0403_0201).encode();
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[4..8], &0.25f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &180.0f32.to_le_bytes());
        assert_eq!(bytes[28], 0x03);
        assert_eq!(&bytes[29..], &[0, 0, 0]);
    }

    #[test]
    fn decode_reverses_encode() {
        let record = sample(1_234);
        assert!(LogRecord::decode(&record.encode()).bit_eq(&record));
    }

    #[test]
    fn reader_reports_trailing_fragment() {
        let mut image = [0u8; RECORD_SIZE * 2 + 5];
        image[..RECORD_SIZE].copy_from_slice(&sample(10).encode());
        image[RECORD_SIZE..RECORD_SIZE * 2].copy_from_slice(&sample(20).encode());

        let mut reader = RecordReader::new(&image);
        assert_eq!(reader.size_hint(), (2, Some(2)));
        assert_eq!(reader.next().map(|r| r.timestamp), Some(10));
        assert_eq!(reader.next().map(|r| r.timestamp), Some(20));
        assert!(reader.next().is_none());
        assert_eq!(reader.remainder().len(), 5);
    }

    #[test]
    fn zero_timestamp_decodes_as_unset() {
        let stored = sample(0).encode();
        assert!(LogRecord::decode(&stored).is_unset());
    }
}
