// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use crate::error::{Error, Result};

/// One unit of integer-resolution virtual time.
///
/// All time math inside the engine is performed on `Ticks` to avoid the
/// floating-point drift that plagues second-based arithmetic
/// (`0.2 - 0.05 != 0.15` in IEEE doubles). Conversion to and from real
/// seconds happens only at the edges, through a [`Resolution`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticks(i64);

impl Ticks {
    /// The zero instant.
    pub const ZERO: Self = Self(0);

    /// The largest representable instant.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a tick count from a raw integer value.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Adds two tick counts, clamping at the numeric bounds.
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Subtracts two tick counts, clamping at the numeric bounds.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Ticks {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl Sub for Ticks {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The smallest distinguishable unit of virtual time.
///
/// Stored as the integer reciprocal of the resolution in seconds, so that
/// conversions are a single multiply-round or an int/int division. The
/// int/int division is deliberate: `100_000 * 0.000_001` is
/// `0.09999999999999999`, while `100_000 / 1_000_000` is exactly `0.1`.
///
/// # Range trade-off
///
/// A finer resolution shrinks the largest representable instant: with the
/// default microsecond resolution an `i64` tick count covers roughly
/// 292 000 years of virtual time, with a nanosecond resolution about
/// 292 years. The scale is capped so a practical ceiling instant always
/// stays representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    scale: i64,
}

/// Upper bound on the resolution reciprocal; keeps at least ~100 hours of
/// virtual time representable in an `i64` even at the finest setting.
const MAX_SCALE: f64 = 1e15;

impl Default for Resolution {
    fn default() -> Self {
        Self::MICROSECOND
    }
}

impl Resolution {
    /// One microsecond, the default resolution.
    pub const MICROSECOND: Self = Self { scale: 1_000_000 };

    /// Creates a resolution from its length in seconds.
    ///
    /// # Errors
    ///
    /// Fails when the value is non-finite, non-positive, coarser than one
    /// second, or finer than the supported range.
    pub fn from_seconds(resolution: f64) -> Result<Self> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(Error::config(format!(
                "the resolution must be a positive number of seconds, got {resolution}"
            )));
        }

        let scale = (1.0 / resolution).round();
        if scale < 1.0 {
            return Err(Error::config(format!(
                "the resolution must not be coarser than one second, got {resolution}"
            )));
        }
        if scale > MAX_SCALE {
            return Err(Error::out_of_range(format!(
                "the resolution {resolution} is too fine to keep time representable"
            )));
        }

        #[expect(
            clippy::cast_possible_truncation,
            reason = "the value is rounded and bounded by MAX_SCALE above"
        )]
        Ok(Self {
            scale: scale as i64,
        })
    }

    /// The integer reciprocal of the resolution.
    #[must_use]
    pub const fn scale(self) -> i64 {
        self.scale
    }

    /// Converts seconds to ticks, rounding to the nearest tick.
    ///
    /// # Errors
    ///
    /// Fails with an arithmetic-range error when the value is non-finite or
    /// does not fit the tick range; it is never silently truncated.
    pub fn ticks(self, seconds: f64) -> Result<Ticks> {
        if !seconds.is_finite() {
            return Err(Error::out_of_range(format!(
                "cannot express {seconds} seconds as an instant"
            )));
        }

        #[expect(
            clippy::cast_precision_loss,
            reason = "the scale is at most 1e15 and survives the f64 mantissa"
        )]
        let scaled = (seconds * self.scale as f64).round();

        #[expect(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            reason = "the range is checked right above the cast"
        )]
        if scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
            Err(Error::out_of_range(format!(
                "{seconds} seconds does not fit the {}-per-second tick range",
                self.scale
            )))
        } else {
            Ok(Ticks(scaled as i64))
        }
    }

    /// Converts seconds to ticks, clamping at the numeric bounds instead of
    /// failing. Used for values received from the host scheduler, which may
    /// legitimately report "practically infinite" deadlines.
    #[must_use]
    pub fn ticks_saturating(self, seconds: f64) -> Ticks {
        #[expect(
            clippy::cast_precision_loss,
            reason = "the scale is at most 1e15 and survives the f64 mantissa"
        )]
        let scaled = (seconds * self.scale as f64).round();

        #[expect(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            reason = "the range is checked right above the cast"
        )]
        if scaled.is_nan() {
            Ticks::ZERO
        } else if scaled <= i64::MIN as f64 {
            Ticks(i64::MIN)
        } else if scaled >= i64::MAX as f64 {
            Ticks::MAX
        } else {
            Ticks(scaled as i64)
        }
    }

    /// Converts ticks back to seconds.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "reporting seconds as f64 is the documented edge of the integer domain"
    )]
    pub fn seconds(self, ticks: Ticks) -> f64 {
        ticks.0 as f64 / self.scale as f64
    }

    /// Converts a non-negative tick delta to a real [`Duration`].
    /// Negative deltas clamp to zero.
    #[must_use]
    pub fn duration(self, ticks: Ticks) -> Duration {
        Duration::from_secs_f64(self.seconds(ticks.max(Ticks::ZERO)))
    }
}
