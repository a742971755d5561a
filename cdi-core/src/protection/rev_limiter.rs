//! Progressive rev limiter.
//!
//! Three ascending thresholds select how many ignitions are cut: every
//! second one, every third one, or all of them. The first edge in a tier is
//! always cut, after which the counter lets `period - 1` ignitions through
//! before the next cut. Moving to another tier restarts the count.

use crate::calibration::{REV_LIMIT_HIGH, REV_LIMIT_LOW, REV_LIMIT_MID};
use crate::units::SpeedBucket;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RevTier {
    #[default]
    Normal,
    SkipEverySecond,
    SkipEveryThird,
    Suppressed,
}

impl RevTier {
    /// Tier for the current speed.
    #[must_use]
    pub fn for_speed(speed: SpeedBucket) -> Self {
        if speed > REV_LIMIT_HIGH {
            RevTier::Suppressed
        } else if speed > REV_LIMIT_MID {
            RevTier::SkipEveryThird
        } else if speed > REV_LIMIT_LOW {
            RevTier::SkipEverySecond
        } else {
            RevTier::Normal
        }
    }

    /// One ignition in `period` is cut; `None` means nothing is cut.
    const fn period(self) -> Option<u8> {
        match self {
            RevTier::Normal => None,
            RevTier::SkipEverySecond => Some(2),
            RevTier::SkipEveryThird => Some(3),
            RevTier::Suppressed => Some(1),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            RevTier::Normal => "normal",
            RevTier::SkipEverySecond => "skip-2",
            RevTier::SkipEveryThird => "skip-3",
            RevTier::Suppressed => "suppressed",
        }
    }
}

/// Outcome for one primary edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RevVerdict {
    Fire,
    Cut(RevTier),
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RevLimiter {
    tier: RevTier,
    /// Ignitions still allowed before the next cut.
    allowance: u8,
}

impl RevLimiter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tier: RevTier::Normal,
            allowance: 0,
        }
    }

    #[must_use]
    pub const fn tier(&self) -> RevTier {
        self.tier
    }

    /// Decides whether the ignition for this edge is cut.
    pub fn evaluate(&mut self, speed: SpeedBucket) -> RevVerdict {
        let tier = RevTier::for_speed(speed);
        if tier != self.tier {
            self.tier = tier;
            self.allowance = 0;
        }

        let Some(period) = tier.period() else {
            return RevVerdict::Fire;
        };

        if self.allowance == 0 {
            self.allowance = period - 1;
            RevVerdict::Cut(tier)
        } else {
            self.allowance -= 1;
            RevVerdict::Fire
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
