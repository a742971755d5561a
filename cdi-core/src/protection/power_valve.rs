//! Power-jet solenoid driver with hysteresis.

use crate::calibration::{
    VALVE_DISABLED_OFF, VALVE_DISABLED_ON, VALVE_ENABLED_OFF, VALVE_ENABLED_ON, ValveBand,
};
use crate::units::SpeedBucket;

/// Switching thresholds of one hysteresis band.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ValveThresholds {
    /// Solenoid turns on above this bucket.
    pub on_above: SpeedBucket,
    /// Solenoid turns off below this bucket.
    pub off_below: SpeedBucket,
}

impl ValveThresholds {
    #[must_use]
    pub const fn for_band(band: ValveBand) -> Self {
        match band {
            ValveBand::Enabled => Self {
                on_above: VALVE_ENABLED_ON,
                off_below: VALVE_ENABLED_OFF,
            },
            ValveBand::Disabled => Self {
                on_above: VALVE_DISABLED_ON,
                off_below: VALVE_DISABLED_OFF,
            },
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PowerValve {
    on: bool,
}

impl PowerValve {
    #[must_use]
    pub const fn new() -> Self {
        Self { on: false }
    }

    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.on
    }

    /// Applies the active band; returns the new state when it changed.
    pub fn update(&mut self, speed: SpeedBucket, band: ValveBand) -> Option<bool> {
        let thresholds = ValveThresholds::for_band(band);
        let next = if speed > thresholds.on_above {
            true
        } else if speed < thresholds.off_below {
            false
        } else {
            self.on
        };

        if next == self.on {
            None
        } else {
            self.on = next;
            Some(next)
        }
    }

    pub fn force_off(&mut self) {
        self.on = false;
    }
}
