//! Unit-tagged fixed-point quantities used throughout the ignition path.
//!
//! The controller works in three scales that are easy to confuse: crank
//! angles in hundredths of a degree, engine speed in 100 rpm buckets, and
//! timer ticks of the 1 µs time base. Each gets its own newtype so a delay
//! cannot be passed where an angle is expected. All arithmetic truncates,
//! matching the integer behavior the calibration tables were tuned against.

use core::fmt;
use core::ops::Sub;

/// Crank angle before top dead center, in hundredths of a degree.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Centidegrees(pub u16);

impl Centidegrees {
    /// Builds an angle from whole degrees.
    #[must_use]
    pub const fn from_degrees(degrees: u16) -> Self {
        Self(degrees * 100)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl Sub for Centidegrees {
    type Output = Centidegrees;

    fn sub(self, rhs: Self) -> Self::Output {
        Centidegrees(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Centidegrees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}deg", self.0 / 100, self.0 % 100)
    }
}

/// Engine speed bucket; one step is 100 rpm.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SpeedBucket(pub u8);

impl SpeedBucket {
    /// Bucket reported for periods too short to represent.
    pub const OVERSPEED: SpeedBucket = SpeedBucket(u8::MAX);

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Index into the ignition map.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Rpm-equivalent value of the bucket.
    #[must_use]
    pub const fn rpm(self) -> u32 {
        self.0 as u32 * 100
    }
}

impl fmt::Display for SpeedBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}rpm", self.rpm())
    }
}

/// Count of the 16-bit free-running time base (1 tick = 1 µs).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ticks(pub u16);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn saturating_sub(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}
