//! Interrupt-owned ignition controller.
//!
//! [`Controller`] is the single owner of every piece of timing state. The
//! firmware funnels the four hardware event sources into
//! [`Controller::on_event`] from one non-reentrant interrupt context; the
//! host simulator does the same from its virtual time base. The foreground
//! only ever sees a [`ControllerSnapshot`] and hands finished maps over with
//! [`Controller::install_map`].

use crate::calibration::{
    CalibrationSelectors, COMPARE_GUARD, FIXED_TIMING_BUCKET, IGNITION_PULSE, LimiterMode,
    RECALIBRATION_CEILING,
};
use crate::hardware::{Event, GateLevel, IgnitionHardware};
use crate::map::{IgnitionMap, MapBank};
use crate::protection::{PowerValve, RevLimiter, RevVerdict, secondary_edge_is_late};
use crate::telemetry::{ControllerSnapshot, SparkMode, TelemetryEventKind, TelemetryLog};
use crate::units::{SpeedBucket, Ticks};

pub mod speed;

pub use speed::bucket_for_period;

/// Engine state machine phases.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum EngineState {
    /// Stopped or turning too slowly for the time base; waiting for an edge.
    #[default]
    Low,
    /// Primary edges arrive within one time-base period.
    Run,
}

impl EngineState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            EngineState::Low => "low",
            EngineState::Run => "run",
        }
    }
}

pub struct Controller<H> {
    hw: H,
    state: EngineState,
    /// `None` until a full period has been measured since entering RUN.
    speed: Option<SpeedBucket>,
    period: Ticks,
    capture_armed: bool,
    compare_armed: bool,
    gate: GateLevel,
    last_delay: Ticks,
    spark_mode: SparkMode,
    limiter: RevLimiter,
    valve: PowerValve,
    maps: MapBank,
    telemetry: TelemetryLog,
}

impl<H: IgnitionHardware> Controller<H> {
    /// Runs the startup sequence and returns a controller parked in LOW.
    ///
    /// The gate is enabled so the fixed-timing path can fire while cranking,
    /// the map is built from the current selectors and primary capture is
    /// armed.
    pub fn new(mut hw: H) -> Self {
        hw.set_trigger(false);
        hw.set_power_valve(false);
        hw.set_gate(GateLevel::Enabled);
        let inputs = hw.inputs();
        let maps = MapBank::new(inputs.calibration);
        hw.arm_capture();

        Self {
            hw,
            state: EngineState::Low,
            speed: None,
            period: Ticks::ZERO,
            capture_armed: true,
            compare_armed: false,
            gate: GateLevel::Enabled,
            last_delay: Ticks::ZERO,
            spark_mode: SparkMode::Fixed,
            limiter: RevLimiter::new(),
            valve: PowerValve::new(),
            maps,
            telemetry: TelemetryLog::new(),
        }
    }

    /// Handles one hardware event. Every entry feeds the watchdog.
    pub fn on_event(&mut self, event: Event) {
        self.hw.feed_watchdog();
        match event {
            Event::PrimaryEdge { captured } => self.on_primary_edge(captured),
            Event::CompareMatch => self.on_compare_match(),
            Event::SecondaryEdge => self.on_secondary_edge(),
            Event::Overflow => self.on_overflow(),
        }
    }

    /// Whether a new map may be installed: stopped, or below the
    /// recalibration ceiling.
    #[must_use]
    pub fn accepts_map_swap(&self) -> bool {
        self.speed.is_none_or(|speed| speed < RECALIBRATION_CEILING)
    }

    /// Swaps in a map the foreground built outside the interrupt context.
    pub fn install_map(&mut self, map: &IgnitionMap, selectors: CalibrationSelectors) {
        self.maps.install(map, selectors);
        self.record(TelemetryEventKind::MapSwapped {
            generation: self.maps.generation(),
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            speed: self.speed.unwrap_or_default(),
            mode: self.spark_mode,
            gate: self.gate,
            valve_on: self.valve.is_on(),
            tier: self.limiter.tier(),
            delay: self.last_delay,
        }
    }

    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    #[must_use]
    pub const fn speed(&self) -> Option<SpeedBucket> {
        self.speed
    }

    /// Most recently captured revolution period.
    #[must_use]
    pub const fn period(&self) -> Ticks {
        self.period
    }

    #[must_use]
    pub fn map(&self) -> &IgnitionMap {
        self.maps.active()
    }

    /// Selectors the active map was built from.
    #[must_use]
    pub const fn map_selectors(&self) -> CalibrationSelectors {
        self.maps.built_from()
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryLog {
        &self.telemetry
    }

    #[must_use]
    pub const fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    fn on_primary_edge(&mut self, captured: Ticks) {
        if !self.capture_armed {
            return;
        }
        match self.state {
            EngineState::Low => self.start_running(),
            EngineState::Run => self.measure_and_schedule(captured),
        }
    }

    fn start_running(&mut self) {
        self.hw.restart_counter();
        self.state = EngineState::Run;
        self.hw.set_trigger(false);
        self.cancel_compare();
        self.speed = None;
        self.period = Ticks::ZERO;
        self.record(TelemetryEventKind::EngineRunning);
    }

    fn measure_and_schedule(&mut self, captured: Ticks) {
        self.hw.restart_counter();
        self.disarm_capture();

        let speed = bucket_for_period(captured);
        self.speed = Some(speed);
        self.period = captured;

        let inputs = self.hw.inputs();
        let verdict = match inputs.limiter {
            LimiterMode::Enabled => self.limiter.evaluate(speed),
            LimiterMode::Disabled => {
                self.limiter.reset();
                RevVerdict::Fire
            }
        };

        match verdict {
            RevVerdict::Fire => self.schedule_spark(speed),
            RevVerdict::Cut(tier) => {
                self.cancel_compare();
                self.set_gate(GateLevel::Disabled);
                self.arm_capture();
                self.record(TelemetryEventKind::RevCut(tier));
            }
        }

        if let Some(on) = self.valve.update(speed, inputs.valve_band) {
            self.hw.set_power_valve(on);
            self.record(TelemetryEventKind::PowerValve(on));
        }
    }

    fn schedule_spark(&mut self, speed: SpeedBucket) {
        // A compare left over from the previous revolution must never fire.
        self.cancel_compare();
        self.set_gate(GateLevel::Enabled);

        let mapped = if speed > FIXED_TIMING_BUCKET {
            self.maps.active().delay(speed)
        } else {
            None
        };

        let mode = match mapped {
            Some(delay) => {
                self.last_delay = delay;
                if delay.saturating_sub(COMPARE_GUARD) > self.hw.counter() {
                    self.hw.arm_compare(delay);
                    self.compare_armed = true;
                } else {
                    self.hw.pulse_trigger(IGNITION_PULSE);
                    self.arm_capture();
                }
                SparkMode::Mapped
            }
            None => SparkMode::Fixed,
        };

        if mode != self.spark_mode {
            self.spark_mode = mode;
            self.record(TelemetryEventKind::SparkModeChanged(mode));
        }
    }

    fn on_compare_match(&mut self) {
        if !self.compare_armed {
            return;
        }
        self.cancel_compare();
        self.hw.delay(IGNITION_PULSE);
        self.hw.set_trigger(false);
        self.arm_capture();
        self.recalibrate();
    }

    fn on_secondary_edge(&mut self) {
        if self.state != EngineState::Run {
            return;
        }
        if let Some(speed) = self.speed
            && secondary_edge_is_late(speed, self.period, self.hw.counter())
        {
            self.set_gate(GateLevel::Disabled);
            self.record(TelemetryEventKind::ReverseLockout);
        }
        self.arm_capture();
        self.recalibrate();
    }

    fn on_overflow(&mut self) {
        let was_running = self.state == EngineState::Run;
        self.state = EngineState::Low;
        self.hw.stop_counter();
        self.hw.set_trigger(false);
        self.cancel_compare();
        self.valve.force_off();
        self.hw.set_power_valve(false);
        self.limiter.reset();
        self.arm_capture();
        if was_running {
            self.record(TelemetryEventKind::EngineStopped);
        }
        self.speed = None;
        self.period = Ticks::ZERO;
    }

    /// Rebuilds the map at low speed when the selectors moved.
    fn recalibrate(&mut self) {
        let Some(speed) = self.speed else {
            return;
        };
        if speed >= RECALIBRATION_CEILING {
            return;
        }
        let selectors = self.hw.inputs().calibration;
        if self.maps.refresh(selectors) {
            self.record(TelemetryEventKind::MapSwapped {
                generation: self.maps.generation(),
            });
        }
    }

    fn arm_capture(&mut self) {
        self.hw.arm_capture();
        self.capture_armed = true;
    }

    fn disarm_capture(&mut self) {
        self.hw.disarm_capture();
        self.capture_armed = false;
    }

    fn cancel_compare(&mut self) {
        self.hw.disarm_compare();
        self.compare_armed = false;
    }

    fn set_gate(&mut self, level: GateLevel) {
        self.hw.set_gate(level);
        self.gate = level;
    }

    fn record(&mut self, event: TelemetryEventKind) {
        self.telemetry.record(event, self.speed.unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;
    use crate::calibration::SelectorInputs;

    /// Records output levels and lets the test choose the counter value.
    #[derive(Default)]
    struct FakeHardware {
        counter: Ticks,
        latency: Ticks,
        capture: bool,
        compare: Option<Ticks>,
        trigger: bool,
        pulses: u32,
        gate: GateLevel,
        valve: bool,
        feeds: u32,
        inputs: SelectorInputs,
    }

    impl IgnitionHardware for FakeHardware {
        fn counter(&self) -> Ticks {
            self.counter
        }

        fn restart_counter(&mut self) {
            self.counter = self.latency;
        }

        fn stop_counter(&mut self) {
            self.counter = Ticks::ZERO;
        }

        fn arm_capture(&mut self) {
            self.capture = true;
        }

        fn disarm_capture(&mut self) {
            self.capture = false;
        }

        fn arm_compare(&mut self, target: Ticks) {
            self.compare = Some(target);
        }

        fn disarm_compare(&mut self) {
            self.compare = None;
        }

        fn set_trigger(&mut self, active: bool) {
            if active && !self.trigger {
                self.pulses += 1;
            }
            self.trigger = active;
        }

        fn set_gate(&mut self, level: GateLevel) {
            self.gate = level;
        }

        fn set_power_valve(&mut self, on: bool) {
            self.valve = on;
        }

        fn delay(&mut self, _duration: Duration) {}

        fn feed_watchdog(&mut self) {
            self.feeds += 1;
        }

        fn inputs(&self) -> SelectorInputs {
            self.inputs
        }
    }

    fn running_controller() -> Controller<FakeHardware> {
        let mut controller = Controller::new(FakeHardware::default());
        controller.on_event(Event::PrimaryEdge {
            captured: Ticks::ZERO,
        });
        controller
    }

    #[test]
    fn startup_parks_in_low_with_capture_armed() {
        let controller = Controller::new(FakeHardware::default());
        assert_eq!(controller.state(), EngineState::Low);
        assert!(controller.hardware().capture);
        assert_eq!(controller.hardware().gate, GateLevel::Enabled);
        assert_eq!(controller.map_selectors(), CalibrationSelectors::power_on());
    }

    #[test]
    fn first_edge_only_starts_the_time_base() {
        let controller = running_controller();
        assert_eq!(controller.state(), EngineState::Run);
        assert_eq!(controller.speed(), None);
        assert_eq!(controller.hardware().compare, None);
        assert_eq!(controller.hardware().feeds, 1);
    }

    #[test]
    fn mapped_edge_arms_compare_and_blanks_capture() {
        let mut controller = running_controller();
        controller.on_event(Event::PrimaryEdge {
            captured: Ticks(15_000),
        });
        let delay = controller
            .map()
            .delay(SpeedBucket(40))
            .expect("bucket in map");
        assert_eq!(controller.hardware().compare, Some(delay));
        assert!(!controller.hardware().capture);
        assert_eq!(controller.snapshot().mode, SparkMode::Mapped);

        // Blanked: a bounce on the primary pickup is ignored.
        controller.on_event(Event::PrimaryEdge {
            captured: Ticks(40),
        });
        assert_eq!(controller.speed(), Some(SpeedBucket(40)));
    }

    #[test]
    fn late_schedule_fires_immediately() {
        let mut controller = running_controller();
        // The edge is serviced 2 ms late; bucket 40 wants 1166 us.
        controller.hardware_mut().latency = Ticks(2_000);
        controller.on_event(Event::PrimaryEdge {
            captured: Ticks(15_000),
        });

        let hw = controller.hardware();
        assert_eq!(hw.pulses, 1);
        assert!(!hw.trigger);
        assert_eq!(hw.compare, None);
        assert!(hw.capture);
    }

    #[test]
    fn compare_match_ends_pulse_and_rearms_capture() {
        let mut controller = running_controller();
        controller.on_event(Event::PrimaryEdge {
            captured: Ticks(15_000),
        });
        controller.hardware_mut().trigger = true;
        controller.on_event(Event::CompareMatch);

        let hw = controller.hardware();
        assert!(!hw.trigger);
        assert_eq!(hw.compare, None);
        assert!(hw.capture);
    }

    #[test]
    fn overflow_forces_outputs_safe() {
        let mut controller = running_controller();
        controller.on_event(Event::PrimaryEdge {
            captured: Ticks(10_000),
        });
        controller.on_event(Event::Overflow);

        let hw = controller.hardware();
        assert_eq!(controller.state(), EngineState::Low);
        assert_eq!(hw.compare, None);
        assert!(!hw.trigger);
        assert!(!hw.valve);
        assert!(hw.capture);
        assert_eq!(
            controller.telemetry().latest().map(|record| record.event),
            Some(TelemetryEventKind::EngineStopped)
        );
    }

    #[test]
    fn stale_compare_match_is_ignored() {
        let mut controller = running_controller();
        controller.on_event(Event::CompareMatch);
        assert!(!controller.hardware().trigger);
        assert_eq!(controller.hardware().pulses, 0);
    }
}
