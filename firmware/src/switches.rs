#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Pin-level view of the selector switches.

use cdi_core::calibration::{CalibrationSelectors, SelectorInputs, SwitchPosition};

/// Raw pin levels as sampled by the foreground, `(high, low)` per two-bit switch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SwitchLevels {
    pub advance_start: (bool, bool),
    pub max_advance: (bool, bool),
    pub gradient: (bool, bool),
    pub min_retard: (bool, bool),
    pub valve: bool,
    pub limiter: bool,
}

impl SwitchLevels {
    #[must_use]
    pub const fn decode(&self) -> SelectorInputs {
        let calibration = CalibrationSelectors::new(
            position(self.advance_start),
            position(self.max_advance),
            position(self.gradient),
            position(self.min_retard),
        );
        SelectorInputs::with_switches(calibration, self.valve, self.limiter)
    }
}

const fn position((high, low): (bool, bool)) -> SwitchPosition {
    SwitchPosition::from_pins(high, low)
}
