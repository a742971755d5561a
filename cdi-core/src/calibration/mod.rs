//! Calibration constants and selector inputs.
//!
//! The controller has no runtime configuration beyond four two-bit selector
//! switches and two enable switches. Everything else is a baked-in constant
//! tuned for the YZ125/250 family and lives here so the rest of the crate
//! never carries magic numbers.

use core::convert::TryFrom;
use core::fmt;
use core::time::Duration;

use crate::units::{Centidegrees, SpeedBucket, Ticks};

pub mod tables;

pub use tables::{DEG_TO_TICKS, DELAY_SCALE_SHIFT};

/// Number of entries in the ignition map (bucket 0..=130).
pub const MAP_BUCKETS: usize = 131;
/// Highest bucket the map covers.
pub const MAX_MAP_BUCKET: SpeedBucket = SpeedBucket(130);
/// At or below this bucket the hardware fixed-timing path fires the spark.
pub const FIXED_TIMING_BUCKET: SpeedBucket = SpeedBucket(15);

/// Angle of the primary pickup edge.
pub const PRIMARY_PICKUP_ANGLE: Centidegrees = Centidegrees(3500);
/// Angle of the secondary pickup edge, also the fixed low-speed timing.
pub const FIXED_LOW_SPEED_ANGLE: Centidegrees = Centidegrees(500);
/// Bucket where the high-speed retard ramp begins.
pub const RETARD_START_BUCKET: SpeedBucket = SpeedBucket(55);
/// Bucket where the high-speed retard ramp ends.
pub const RETARD_END_BUCKET: SpeedBucket = SpeedBucket(80);

pub const ADVANCE_START_TABLE: [SpeedBucket; 4] =
    [SpeedBucket(45), SpeedBucket(35), SpeedBucket(25), SpeedBucket(15)];
pub const MAX_ADVANCE_TABLE: [Centidegrees; 4] = [
    Centidegrees(FIXED_LOW_SPEED_ANGLE.0 + 2000),
    Centidegrees(FIXED_LOW_SPEED_ANGLE.0 + 1600),
    Centidegrees(FIXED_LOW_SPEED_ANGLE.0 + 1200),
    Centidegrees(FIXED_LOW_SPEED_ANGLE.0 + 800),
];
/// Width of the advance ramp, in buckets.
pub const ADVANCE_GRADIENT_TABLE: [u8; 4] = [40, 30, 20, 10];
pub const MIN_RETARD_TABLE: [Centidegrees; 4] = [
    Centidegrees(FIXED_LOW_SPEED_ANGLE.0 + 1000),
    Centidegrees(FIXED_LOW_SPEED_ANGLE.0 + 800),
    Centidegrees(FIXED_LOW_SPEED_ANGLE.0 + 600),
    Centidegrees(FIXED_LOW_SPEED_ANGLE.0 + 400),
];

/// Numerator turning `period >> 4` into a speed bucket.
pub const PERIOD_TO_BUCKET_NUMERATOR: u16 = 37_500;
/// Shift applied to the captured period before the division.
pub const PERIOD_SHIFT: u32 = 4;

/// A compare target closer than this to the current count fires immediately.
pub const COMPARE_GUARD: Ticks = Ticks(15);
/// Width of the ignition trigger pulse.
pub const IGNITION_PULSE: Duration = Duration::from_micros(60);

pub const REV_LIMIT_LOW: SpeedBucket = SpeedBucket(97);
pub const REV_LIMIT_MID: SpeedBucket = SpeedBucket(98);
pub const REV_LIMIT_HIGH: SpeedBucket = SpeedBucket(99);

pub const VALVE_ENABLED_ON: SpeedBucket = SpeedBucket(85);
pub const VALVE_ENABLED_OFF: SpeedBucket = SpeedBucket(83);
pub const VALVE_DISABLED_ON: SpeedBucket = SpeedBucket(30);
pub const VALVE_DISABLED_OFF: SpeedBucket = SpeedBucket(28);

/// Below this bucket a late secondary edge locks the ignition out.
pub const REVERSE_GUARD_CEILING: SpeedBucket = SpeedBucket(25);
/// Shift applied to the elapsed secondary interval before comparing.
pub const REVERSE_GUARD_SHIFT: u32 = 2;
/// Below this bucket the interrupt core may rebuild the map.
pub const RECALIBRATION_CEILING: SpeedBucket = SpeedBucket(40);

/// Position of a two-bit selector switch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SwitchPosition(u8);

impl SwitchPosition {
    pub const P0: SwitchPosition = SwitchPosition(0);
    pub const P1: SwitchPosition = SwitchPosition(1);
    pub const P2: SwitchPosition = SwitchPosition(2);
    pub const P3: SwitchPosition = SwitchPosition(3);

    /// Decodes the position wired as `(high << 1) | low`.
    #[must_use]
    pub const fn from_pins(high: bool, low: bool) -> Self {
        Self(((high as u8) << 1) | low as u8)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for SwitchPosition {
    type Error = SelectorError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= 3 {
            Ok(Self(value))
        } else {
            Err(SelectorError::OutOfRange(value))
        }
    }
}

/// Errors raised when decoding selector values that did not come from pins.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SelectorError {
    OutOfRange(u8),
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::OutOfRange(value) => {
                write!(f, "selector position {value} outside 0-3")
            }
        }
    }
}

/// The four calibration selectors that shape the ignition map.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CalibrationSelectors {
    pub advance_start: SwitchPosition,
    pub max_advance: SwitchPosition,
    pub advance_gradient: SwitchPosition,
    pub min_retard: SwitchPosition,
}

impl CalibrationSelectors {
    #[must_use]
    pub const fn new(
        advance_start: SwitchPosition,
        max_advance: SwitchPosition,
        advance_gradient: SwitchPosition,
        min_retard: SwitchPosition,
    ) -> Self {
        Self {
            advance_start,
            max_advance,
            advance_gradient,
            min_retard,
        }
    }

    /// Builds selectors from raw positions.
    ///
    /// # Errors
    /// Returns [`SelectorError`] if any position is above 3.
    pub fn from_raw(raw: [u8; 4]) -> Result<Self, SelectorError> {
        Ok(Self::new(
            SwitchPosition::try_from(raw[0])?,
            SwitchPosition::try_from(raw[1])?,
            SwitchPosition::try_from(raw[2])?,
            SwitchPosition::try_from(raw[3])?,
        ))
    }

    /// Positions assumed before the first switch poll.
    #[must_use]
    pub const fn power_on() -> Self {
        Self::new(
            SwitchPosition::P2,
            SwitchPosition::P3,
            SwitchPosition::P3,
            SwitchPosition::P3,
        )
    }

    const fn to_bits(self) -> u16 {
        (self.advance_start.0 as u16)
            | (self.max_advance.0 as u16) << 2
            | (self.advance_gradient.0 as u16) << 4
            | (self.min_retard.0 as u16) << 6
    }

    const fn from_bits(bits: u16) -> Self {
        Self::new(
            SwitchPosition((bits & 0b11) as u8),
            SwitchPosition(((bits >> 2) & 0b11) as u8),
            SwitchPosition(((bits >> 4) & 0b11) as u8),
            SwitchPosition(((bits >> 6) & 0b11) as u8),
        )
    }
}

impl Default for CalibrationSelectors {
    fn default() -> Self {
        Self::power_on()
    }
}

impl fmt::Display for CalibrationSelectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "adv={} max={} grad={} ret={}",
            self.advance_start.0, self.max_advance.0, self.advance_gradient.0, self.min_retard.0
        )
    }
}

/// Which power-valve hysteresis band is active.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum ValveBand {
    #[default]
    Enabled,
    Disabled,
}

/// Whether the rev limiter block runs at all.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum LimiterMode {
    #[default]
    Enabled,
    Disabled,
}

/// Complete snapshot of every selector the core consumes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SelectorInputs {
    pub calibration: CalibrationSelectors,
    pub valve_band: ValveBand,
    pub limiter: LimiterMode,
}

impl SelectorInputs {
    const VALVE_DISABLED_BIT: u16 = 1 << 8;
    const LIMITER_DISABLED_BIT: u16 = 1 << 9;

    #[must_use]
    pub const fn new(
        calibration: CalibrationSelectors,
        valve_band: ValveBand,
        limiter: LimiterMode,
    ) -> Self {
        Self {
            calibration,
            valve_band,
            limiter,
        }
    }

    /// Decodes the enable switches; a high pin selects the enabled band.
    #[must_use]
    pub const fn with_switches(calibration: CalibrationSelectors, valve: bool, limiter: bool) -> Self {
        Self::new(
            calibration,
            if valve {
                ValveBand::Enabled
            } else {
                ValveBand::Disabled
            },
            if limiter {
                LimiterMode::Enabled
            } else {
                LimiterMode::Disabled
            },
        )
    }

    /// Packs the snapshot into one word for an atomic latch.
    #[must_use]
    pub const fn to_bits(self) -> u16 {
        let mut bits = self.calibration.to_bits();
        if matches!(self.valve_band, ValveBand::Disabled) {
            bits |= Self::VALVE_DISABLED_BIT;
        }
        if matches!(self.limiter, LimiterMode::Disabled) {
            bits |= Self::LIMITER_DISABLED_BIT;
        }
        bits
    }

    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self::new(
            CalibrationSelectors::from_bits(bits),
            if bits & Self::VALVE_DISABLED_BIT != 0 {
                ValveBand::Disabled
            } else {
                ValveBand::Enabled
            },
            if bits & Self::LIMITER_DISABLED_BIT != 0 {
                LimiterMode::Disabled
            } else {
                LimiterMode::Enabled
            },
        )
    }
}
