//! Peripheral capabilities the interrupt core is written against.
//!
//! The firmware implements [`IgnitionHardware`] over the timer, capture,
//! compare and GPIO blocks of the MCU; the simulator in [`crate::sim`]
//! implements it over a virtual time base so the core can be tested on the
//! host.

use core::time::Duration;

use crate::calibration::SelectorInputs;
use crate::units::Ticks;

/// Level of the ignition driver enable line.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GateLevel {
    #[default]
    Enabled,
    Disabled,
}

impl GateLevel {
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, GateLevel::Enabled)
    }
}

/// Hardware events funneled into the single interrupt context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// Primary pickup edge; `captured` is the time base latched by the capture unit.
    PrimaryEdge { captured: Ticks },
    /// The compare unit reached its target and raised the trigger output.
    CompareMatch,
    /// Secondary pickup edge.
    SecondaryEdge,
    /// The time base wrapped without an intervening primary edge.
    Overflow,
}

/// Abstraction over the capture, compare, timer and GPIO blocks.
pub trait IgnitionHardware {
    /// Current value of the free-running time base.
    fn counter(&self) -> Ticks;

    /// Restarts the time base from the latest primary capture and starts it counting.
    fn restart_counter(&mut self);

    /// Stops the time base and clears it.
    fn stop_counter(&mut self);

    /// Enables primary-edge capture.
    fn arm_capture(&mut self);

    /// Disables primary-edge capture.
    fn disarm_capture(&mut self);

    /// Programs the compare unit to raise the trigger at `target`.
    fn arm_compare(&mut self, target: Ticks);

    /// Cancels any pending compare.
    fn disarm_compare(&mut self);

    /// Drives the ignition trigger output.
    fn set_trigger(&mut self, active: bool);

    /// Drives the ignition enable gate.
    fn set_gate(&mut self, level: GateLevel);

    /// Drives the power-valve solenoid.
    fn set_power_valve(&mut self, on: bool);

    /// Busy-waits for a short, bounded interval.
    fn delay(&mut self, duration: Duration);

    /// Resets the watchdog.
    fn feed_watchdog(&mut self);

    /// Latest selector snapshot published by the foreground.
    fn inputs(&self) -> SelectorInputs;

    /// Raises the trigger for `width` and drops it again.
    fn pulse_trigger(&mut self, width: Duration) {
        self.set_trigger(true);
        self.delay(width);
        self.set_trigger(false);
    }
}
