//! Log file names: `/mpulog<number>.bin`.

use core::fmt::Write as _;

use heapless::String;

pub const FILE_PREFIX: &str = "/mpulog";
pub const FILE_SUFFIX: &str = ".bin";

/// Longest name the storage layer is asked to handle.
pub const MAX_FILE_NAME: usize = 32;

pub type FileName = String<MAX_FILE_NAME>;

/// Builds the name for log file `number`.
#[must_use]
pub fn file_name(number: u32) -> FileName {
    let mut name = FileName::new();
    // Prefix, suffix and ten digits always fit.
    let _ = write!(name, "{FILE_PREFIX}{number}{FILE_SUFFIX}");
    name
}

/// Extracts the numeric suffix of a log file name.
///
/// Directory listings may omit the leading slash, so both forms match.
#[must_use]
pub fn parse_file_number(name: &str) -> Option<u32> {
    let bare_prefix = FILE_PREFIX.trim_start_matches('/');
    let digits = name
        .trim_start_matches('/')
        .strip_prefix(bare_prefix)?
        .strip_suffix(FILE_SUFFIX)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_parser() {
        let name = file_name(42);
        assert_eq!(name.as_str(), "/mpulog42.bin");
        assert_eq!(parse_file_number(&name), Some(42));
        assert_eq!(parse_file_number("mpulog7.bin"), Some(7));
    }

    #[test]
    fn foreign_names_are_ignored() {
        for name in ["/mpulog.bin", "/mpulogx.bin", "/other3.bin", "/mpulog3.txt", "/mpulog+4.bin"] {
            assert_eq!(parse_file_number(name), None, "{name}");
        }
    }

    #[test]
    fn largest_number_fits() {
        assert_eq!(file_name(u32::MAX).as_str(), "/mpulog4294967295.bin");
    }
}
