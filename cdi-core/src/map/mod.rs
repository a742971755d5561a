//! Ignition map construction.
//!
//! The map is a 131-entry table indexed by speed bucket that holds the delay
//! from the primary pickup edge to the spark, in timer ticks. It is derived
//! from an advance curve with four control points:
//!
//! ```text
//!  angle
//!    |          P2________P3
//!    |         /            \
//!    |        /              \______ P4
//!    |  _____/P1
//!    +------------------------------------ bucket
//!      15                                130
//! ```
//!
//! Slopes are computed once with truncating integer division. The segments
//! (hold, advance ramp, plateau, retard ramp, hold) are laid down in order and
//! a later segment overrides an earlier one where their ranges overlap, so an
//! advance ramp that runs past the retard start is cut off there. The retard
//! ramp always starts from the full-advance angle at P3.

use core::fmt;

use crate::calibration::{
    ADVANCE_GRADIENT_TABLE, ADVANCE_START_TABLE, CalibrationSelectors, DEG_TO_TICKS,
    DELAY_SCALE_SHIFT, FIXED_LOW_SPEED_ANGLE, FIXED_TIMING_BUCKET, MAP_BUCKETS,
    MAX_ADVANCE_TABLE, MAX_MAP_BUCKET, MIN_RETARD_TABLE, PRIMARY_PICKUP_ANGLE,
    RETARD_END_BUCKET, RETARD_START_BUCKET,
};
use crate::units::{Centidegrees, SpeedBucket, Ticks};

pub mod bank;

pub use bank::MapBank;

/// Point on the advance curve.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ControlPoint {
    pub bucket: SpeedBucket,
    pub angle: Centidegrees,
}

impl ControlPoint {
    const fn new(bucket: u8, angle: Centidegrees) -> Self {
        Self {
            bucket: SpeedBucket(bucket),
            angle,
        }
    }

    fn x(self) -> i32 {
        i32::from(self.bucket.0)
    }

    fn y(self) -> i32 {
        i32::from(self.angle.0)
    }
}

/// Control points and slopes of an advance curve.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AdvanceCurve {
    pub start: ControlPoint,
    pub full_advance: ControlPoint,
    pub retard_start: ControlPoint,
    pub retard_end: ControlPoint,
    /// Centidegrees gained per bucket on the advance ramp.
    pub rising_slope: i32,
    /// Centidegrees lost per bucket on the retard ramp.
    pub falling_slope: i32,
}

impl AdvanceCurve {
    /// Derives the curve for a selector combination.
    #[must_use]
    pub fn from_selectors(selectors: CalibrationSelectors) -> Self {
        let start_bucket = ADVANCE_START_TABLE[selectors.advance_start.index()].0;
        let width = ADVANCE_GRADIENT_TABLE[selectors.advance_gradient.index()];
        let max_advance = MAX_ADVANCE_TABLE[selectors.max_advance.index()];

        let start = ControlPoint::new(start_bucket, FIXED_LOW_SPEED_ANGLE);
        let full_advance = ControlPoint::new(start_bucket + width, max_advance);
        let retard_start = ControlPoint::new(RETARD_START_BUCKET.0, max_advance);
        let retard_end = ControlPoint::new(
            RETARD_END_BUCKET.0,
            MIN_RETARD_TABLE[selectors.min_retard.index()],
        );

        // Integer division truncates toward zero; the tables were tuned with it.
        let rising_slope = (full_advance.y() - start.y()) / (full_advance.x() - start.x());
        let falling_slope =
            (retard_start.y() - retard_end.y()) / (retard_end.x() - retard_start.x());

        Self {
            start,
            full_advance,
            retard_start,
            retard_end,
            rising_slope,
            falling_slope,
        }
    }

    /// Advance angle at a bucket.
    #[must_use]
    pub fn angle_at(&self, bucket: SpeedBucket) -> Centidegrees {
        let x = i32::from(bucket.0);
        // Latest segment first: it owns any range it shares with an earlier one.
        let angle = if x > self.retard_end.x() {
            self.retard_end.y()
        } else if x > self.retard_start.x() {
            self.retard_start.y() - self.falling_slope * (x - self.retard_start.x())
        } else if x > self.full_advance.x() {
            self.retard_start.y()
        } else if x > self.start.x() {
            self.start.y() + self.rising_slope * (x - self.start.x())
        } else {
            self.start.y()
        };
        // Every segment stays between two table angles, all of which fit.
        Centidegrees(u16::try_from(angle).unwrap_or(0))
    }
}

/// Delay from the primary pickup edge to a spark at `angle`.
#[must_use]
pub fn angle_to_delay(bucket: SpeedBucket, angle: Centidegrees) -> Ticks {
    let half_span = u32::from((PRIMARY_PICKUP_ANGLE - angle).0 >> 1);
    let coeff = u32::from(DEG_TO_TICKS[bucket.index()]);
    let ticks = (half_span * coeff) >> DELAY_SCALE_SHIFT;
    Ticks(u16::try_from(ticks).unwrap_or(u16::MAX))
}

/// Speed-indexed spark delay table.
#[derive(Clone, Eq, PartialEq)]
pub struct IgnitionMap {
    delays: [Ticks; MAP_BUCKETS],
}

impl IgnitionMap {
    /// Map with every delay at zero.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            delays: [Ticks::ZERO; MAP_BUCKETS],
        }
    }

    /// Builds the map for a selector combination.
    #[must_use]
    pub fn build(selectors: CalibrationSelectors) -> Self {
        let mut map = Self::empty();
        map.rebuild(selectors);
        map
    }

    /// Overwrites every live bucket for a selector combination.
    pub fn rebuild(&mut self, selectors: CalibrationSelectors) {
        let curve = AdvanceCurve::from_selectors(selectors);
        self.delays = [Ticks::ZERO; MAP_BUCKETS];
        for raw in FIXED_TIMING_BUCKET.0..=MAX_MAP_BUCKET.0 {
            let bucket = SpeedBucket(raw);
            self.delays[bucket.index()] = angle_to_delay(bucket, curve.angle_at(bucket));
        }
    }

    /// Delay for a bucket, or `None` outside the table.
    #[must_use]
    pub fn delay(&self, bucket: SpeedBucket) -> Option<Ticks> {
        self.delays.get(bucket.index()).copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Ticks] {
        &self.delays
    }

    pub fn copy_from(&mut self, other: &IgnitionMap) {
        self.delays = other.delays;
    }
}

impl Default for IgnitionMap {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for IgnitionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.delays.iter().map(|ticks| ticks.0))
            .finish()
    }
}
