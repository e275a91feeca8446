//! Wrapping millisecond clock shared by every behavior.
//!
//! The platform counter is a `u32` that rolls over roughly every 49.7 days.
//! All interval checks go through [`Millis::elapsed_since`], which uses
//! modular subtraction so a single wrap between two readings is harmless.

use core::fmt;

/// Reading of the platform's monotonic millisecond counter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Millis(u32);

impl Millis {
    /// The counter value right after boot or a wrap.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw counter value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Milliseconds from `earlier` to `self`, modulo 2^32.
    #[must_use]
    pub const fn elapsed_since(self, earlier: Self) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Returns `true` once at least `interval_ms` have passed since `earlier`.
    #[must_use]
    pub const fn has_elapsed(self, earlier: Self, interval_ms: u32) -> bool {
        self.elapsed_since(earlier) >= interval_ms
    }

    /// Advances the reading, wrapping at the counter modulus.
    #[must_use]
    pub const fn wrapping_add(self, delta_ms: u32) -> Self {
        Self(self.0.wrapping_add(delta_ms))
    }
}

impl From<u32> for Millis {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Source of [`Millis`] readings supplied by the platform.
pub trait Clock {
    /// Returns the current counter value.
    fn now(&self) -> Millis;
}
