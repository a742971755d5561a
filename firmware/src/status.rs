#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The foreground publishes the debounced selector switches and the ignition
//! interrupt publishes a packed [`ControllerSnapshot`] after every event, so
//! neither side has to take the controller lock to read the other's state.

use cdi_core::calibration::{CalibrationSelectors, LimiterMode, SelectorInputs, ValveBand};
use cdi_core::telemetry::ControllerSnapshot;
use portable_atomic::{AtomicU16, AtomicU32, Ordering};

const POWER_ON_INPUTS: SelectorInputs = SelectorInputs::new(
    CalibrationSelectors::power_on(),
    ValveBand::Enabled,
    LimiterMode::Enabled,
);

/// Selector word written by the foreground, read by the interrupt core.
static SELECTORS: AtomicU16 = AtomicU16::new(POWER_ON_INPUTS.to_bits());
/// Snapshot word written by the interrupt core.
static STATUS: AtomicU32 = AtomicU32::new(0);

/// Stores the latest selector snapshot.
pub fn publish_selectors(inputs: SelectorInputs) {
    SELECTORS.store(inputs.to_bits(), Ordering::Relaxed);
}

/// Returns the most recently published selectors.
pub fn selectors() -> SelectorInputs {
    SelectorInputs::from_bits(SELECTORS.load(Ordering::Relaxed))
}

pub fn publish_snapshot(snapshot: ControllerSnapshot) {
    STATUS.store(snapshot.to_bits(), Ordering::Relaxed);
}

/// Returns the last snapshot published by the interrupt core.
pub fn snapshot() -> ControllerSnapshot {
    ControllerSnapshot::from_bits(STATUS.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdi_core::EngineState;
    use cdi_core::units::SpeedBucket;

    #[test]
    fn latches_start_at_power_on_values() {
        assert_eq!(selectors(), POWER_ON_INPUTS);
        assert_eq!(selectors().calibration, CalibrationSelectors::power_on());
    }

    #[test]
    fn snapshot_survives_the_latch() {
        let snapshot = ControllerSnapshot {
            state: EngineState::Run,
            speed: SpeedBucket(42),
            valve_on: true,
            ..ControllerSnapshot::default()
        };
        publish_snapshot(snapshot);
        assert_eq!(self::snapshot(), snapshot);
    }
}
