//! Simulated peripheral and test bench.
//!
//! [`SimulatedHardware`] implements [`IgnitionHardware`] over a virtual
//! microsecond clock. The time base restarts from the latched capture
//! instant, the way the timer's reset-on-capture mode behaves, so a handler
//! that runs late already sees the service latency on the counter.
//!
//! [`Bench`] owns a [`Controller`] wired to the simulated peripheral and
//! produces the pickup edges, compare matches and overflows in time order.

use core::time::Duration;

use heapless::HistoryBuf;

use crate::calibration::SelectorInputs;
use crate::engine::Controller;
use crate::hardware::{Event, GateLevel, IgnitionHardware};
use crate::units::Ticks;

/// Sparks retained by the simulated coil driver.
pub const SPARK_LOG_CAPACITY: usize = 64;

/// Length of the 16-bit time base before it overflows.
pub const TIME_BASE_SPAN_US: u64 = 1 << 16;

/// What discharged the capacitor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SparkSource {
    /// The digital trigger output.
    Trigger,
    /// The secondary pickup through the enabled gate (fixed timing).
    SecondaryPickup,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SparkRecord {
    pub at_us: u64,
    /// Time base value when the spark fired.
    pub counter: Ticks,
    pub source: SparkSource,
}

/// Each flag mirrors one independent pin or peripheral on the board.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug)]
pub struct SimulatedHardware {
    now_us: u64,
    last_edge_us: u64,
    counter_started_at: Option<u64>,
    capture_armed: bool,
    compare: Option<Ticks>,
    trigger: bool,
    gate: GateLevel,
    valve: bool,
    /// Whether the capacitor holds a charge since the last primary edge.
    charged: bool,
    inputs: SelectorInputs,
    sparks: HistoryBuf<SparkRecord, SPARK_LOG_CAPACITY>,
    spark_count: u32,
    watchdog_feeds: u32,
}

impl SimulatedHardware {
    #[must_use]
    pub fn new(inputs: SelectorInputs) -> Self {
        Self {
            now_us: 0,
            last_edge_us: 0,
            counter_started_at: None,
            capture_armed: false,
            compare: None,
            trigger: false,
            gate: GateLevel::Disabled,
            valve: false,
            charged: false,
            inputs,
            sparks: HistoryBuf::new(),
            spark_count: 0,
            watchdog_feeds: 0,
        }
    }

    #[must_use]
    pub const fn now_us(&self) -> u64 {
        self.now_us
    }

    #[must_use]
    pub const fn capture_armed(&self) -> bool {
        self.capture_armed
    }

    #[must_use]
    pub const fn compare_target(&self) -> Option<Ticks> {
        self.compare
    }

    #[must_use]
    pub const fn trigger(&self) -> bool {
        self.trigger
    }

    #[must_use]
    pub const fn gate(&self) -> GateLevel {
        self.gate
    }

    #[must_use]
    pub const fn power_valve(&self) -> bool {
        self.valve
    }

    #[must_use]
    pub const fn watchdog_feeds(&self) -> u32 {
        self.watchdog_feeds
    }

    /// Total sparks since construction.
    #[must_use]
    pub const fn spark_count(&self) -> u32 {
        self.spark_count
    }

    #[must_use]
    pub fn last_spark(&self) -> Option<&SparkRecord> {
        self.sparks.recent()
    }

    /// Retained sparks, oldest first.
    pub fn sparks(&self) -> impl Iterator<Item = &SparkRecord> {
        self.sparks.oldest_ordered()
    }

    pub fn set_inputs(&mut self, inputs: SelectorInputs) {
        self.inputs = inputs;
    }

    fn elapsed(&self) -> Option<u64> {
        self.counter_started_at
            .map(|start| self.now_us.saturating_sub(start))
    }

    fn spark(&mut self, source: SparkSource) {
        self.charged = false;
        self.spark_count = self.spark_count.wrapping_add(1);
        let counter = self.counter();
        self.sparks.write(SparkRecord {
            at_us: self.now_us,
            counter,
            source,
        });
    }

    /// Absolute time of the next compare match or overflow, if any.
    fn next_deadline(&self) -> Option<(u64, Event)> {
        let start = self.counter_started_at?;
        let overflow = (start + TIME_BASE_SPAN_US, Event::Overflow);
        let deadline = match self.compare {
            Some(target) => {
                let at = (start + u64::from(target.0)).max(self.now_us);
                if at < overflow.0 {
                    (at, Event::CompareMatch)
                } else {
                    overflow
                }
            }
            None => overflow,
        };
        Some(deadline)
    }
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new(SelectorInputs::default())
    }
}

impl IgnitionHardware for SimulatedHardware {
    fn counter(&self) -> Ticks {
        let elapsed = self.elapsed().unwrap_or(0);
        Ticks(u16::try_from(elapsed).unwrap_or(u16::MAX))
    }

    fn restart_counter(&mut self) {
        self.counter_started_at = Some(self.last_edge_us);
    }

    fn stop_counter(&mut self) {
        self.counter_started_at = None;
    }

    fn arm_capture(&mut self) {
        self.capture_armed = true;
    }

    fn disarm_capture(&mut self) {
        self.capture_armed = false;
    }

    fn arm_compare(&mut self, target: Ticks) {
        self.compare = Some(target);
    }

    fn disarm_compare(&mut self) {
        self.compare = None;
    }

    fn set_trigger(&mut self, active: bool) {
        if active && !self.trigger && self.charged {
            self.spark(SparkSource::Trigger);
        }
        self.trigger = active;
    }

    fn set_gate(&mut self, level: GateLevel) {
        self.gate = level;
    }

    fn set_power_valve(&mut self, on: bool) {
        self.valve = on;
    }

    fn delay(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.now_us = self.now_us.saturating_add(micros);
    }

    fn feed_watchdog(&mut self) {
        self.watchdog_feeds = self.watchdog_feeds.wrapping_add(1);
    }

    fn inputs(&self) -> SelectorInputs {
        self.inputs
    }
}

/// Controller plus simulated engine.
pub struct Bench {
    controller: Controller<SimulatedHardware>,
    latency_us: u64,
}

impl Bench {
    #[must_use]
    pub fn new(inputs: SelectorInputs) -> Self {
        Self {
            controller: Controller::new(SimulatedHardware::new(inputs)),
            latency_us: 0,
        }
    }

    #[must_use]
    pub const fn controller(&self) -> &Controller<SimulatedHardware> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller<SimulatedHardware> {
        &mut self.controller
    }

    #[must_use]
    pub const fn hardware(&self) -> &SimulatedHardware {
        self.controller.hardware()
    }

    #[must_use]
    pub const fn now_us(&self) -> u64 {
        self.hardware().now_us()
    }

    /// Delay between a primary edge and its handler running.
    pub fn set_isr_latency(&mut self, micros: u64) {
        self.latency_us = micros;
    }

    pub fn set_inputs(&mut self, inputs: SelectorInputs) {
        self.controller.hardware_mut().set_inputs(inputs);
    }

    /// Dispatches an event directly, bypassing the simulated timer.
    pub fn inject(&mut self, event: Event) {
        self.controller.on_event(event);
    }

    /// Primary pickup edge at the current instant.
    ///
    /// Dropped when capture is disarmed, as the peripheral would.
    pub fn primary_edge(&mut self) {
        let captured = self.hardware().counter();
        self.primary_edge_captured(captured);
    }

    /// Primary pickup edge whose capture latched `captured`.
    ///
    /// Lets a test present a period the simulated crank never produced, such
    /// as a glitch arriving while a compare is still pending.
    pub fn primary_edge_captured(&mut self, captured: Ticks) {
        let hw = self.controller.hardware_mut();
        hw.charged = true;
        if !hw.capture_armed {
            return;
        }
        hw.last_edge_us = hw.now_us;
        hw.now_us += self.latency_us;
        self.controller.on_event(Event::PrimaryEdge { captured });
    }

    /// Secondary pickup edge; fires the fixed-timing path when the gate allows.
    pub fn secondary_edge(&mut self) {
        let hw = self.controller.hardware_mut();
        if hw.gate.is_enabled() && hw.charged {
            hw.spark(SparkSource::SecondaryPickup);
        }
        self.controller.on_event(Event::SecondaryEdge);
    }

    /// Lets virtual time pass, servicing timer events in order.
    pub fn advance(&mut self, micros: u64) {
        let end = self.now_us().saturating_add(micros);
        self.advance_to(end);
    }

    /// Lets virtual time pass until `end_us`.
    pub fn advance_to(&mut self, end_us: u64) {
        while let Some((at, event)) = self.hardware().next_deadline() {
            if at > end_us {
                break;
            }
            let hw = self.controller.hardware_mut();
            hw.now_us = at;
            match event {
                Event::CompareMatch => {
                    hw.compare = None;
                    hw.set_trigger(true);
                }
                Event::Overflow => {
                    if let Some(start) = hw.counter_started_at.as_mut() {
                        *start += TIME_BASE_SPAN_US;
                    }
                }
                Event::PrimaryEdge { .. } | Event::SecondaryEdge => {}
            }
            self.controller.on_event(event);
        }
        let hw = self.controller.hardware_mut();
        hw.now_us = hw.now_us.max(end_us);
    }

    /// One crank revolution with the secondary pickup 30 degrees after the primary one.
    pub fn revolution(&mut self, period_us: u64) {
        self.revolution_with_secondary(period_us, period_us / 12);
    }

    /// One crank revolution with the secondary edge at `secondary_us` after the primary edge.
    pub fn revolution_with_secondary(&mut self, period_us: u64, secondary_us: u64) {
        let start = self.now_us();
        self.primary_edge();
        self.advance_to(start + secondary_us);
        self.secondary_edge();
        self.advance_to(start + period_us);
    }

    /// Runs `revs` revolutions at a steady rpm.
    pub fn run(&mut self, rpm: u32, revs: u32) {
        if rpm == 0 {
            return;
        }
        let period = 60_000_000 / u64::from(rpm);
        for _ in 0..revs {
            self.revolution(period);
        }
    }

    /// Stops the crank long enough for the time base to overflow.
    pub fn stall(&mut self) {
        self.advance(TIME_BASE_SPAN_US + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineState;

    #[test]
    fn overflow_fires_once_per_span_while_counting() {
        let mut bench = Bench::new(SelectorInputs::default());
        bench.primary_edge();
        assert_eq!(bench.controller().state(), EngineState::Run);

        bench.advance(TIME_BASE_SPAN_US - 1);
        assert_eq!(bench.controller().state(), EngineState::Run);
        bench.advance(1);
        assert_eq!(bench.controller().state(), EngineState::Low);

        // Stopped time base: nothing else is scheduled.
        assert_eq!(bench.hardware().next_deadline(), None);
    }

    #[test]
    fn cranking_sparks_through_the_secondary_pickup() {
        let mut bench = Bench::new(SelectorInputs::default());
        // 1200 rpm: below the fixed-timing threshold.
        bench.run(1_200, 4);
        let last = bench.hardware().last_spark().copied().expect("sparked");
        assert_eq!(last.source, SparkSource::SecondaryPickup);
        assert_eq!(bench.hardware().compare_target(), None);
    }

    #[test]
    fn pulse_width_advances_the_clock() {
        let mut hw = SimulatedHardware {
            charged: true,
            ..SimulatedHardware::default()
        };
        hw.pulse_trigger(Duration::from_micros(60));
        assert_eq!(hw.now_us(), 60);
        assert_eq!(hw.spark_count(), 1);
        assert!(!hw.trigger());
    }
}
