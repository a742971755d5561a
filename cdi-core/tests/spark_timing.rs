use cdi_core::calibration::{CalibrationSelectors, LimiterMode, SelectorInputs, ValveBand};
use cdi_core::sim::{Bench, SparkRecord, SparkSource};
use cdi_core::telemetry::{SparkMode, TelemetryEventKind};
use cdi_core::units::Ticks;
use cdi_core::{EngineState, Event, GateLevel};

/// 4000 rpm, bucket 40.
const PERIOD_BUCKET_40: u64 = 15_000;

fn reference_inputs() -> SelectorInputs {
    SelectorInputs::new(
        CalibrationSelectors::from_raw([1, 2, 1, 0]).expect("positions in range"),
        ValveBand::Enabled,
        LimiterMode::Enabled,
    )
}

fn warmed_bench(period_us: u64) -> Bench {
    let mut bench = Bench::new(reference_inputs());
    for _ in 0..3 {
        bench.revolution(period_us);
    }
    bench
}

fn trigger_sparks_since(bench: &Bench, since_us: u64) -> Vec<SparkRecord> {
    bench
        .hardware()
        .sparks()
        .filter(|spark| spark.at_us >= since_us && spark.source == SparkSource::Trigger)
        .copied()
        .collect()
}

#[test]
fn mapped_spark_fires_at_the_map_delay() {
    let mut bench = warmed_bench(PERIOD_BUCKET_40);
    let start = bench.now_us();
    bench.revolution(PERIOD_BUCKET_40);

    let sparks = trigger_sparks_since(&bench, start);
    assert_eq!(sparks.len(), 1);
    assert_eq!(sparks[0].counter, Ticks(1166));
    assert_eq!(sparks[0].at_us, start + 1166);

    let hw = bench.hardware();
    assert!(!hw.trigger());
    assert!(hw.capture_armed());
    assert_eq!(hw.compare_target(), None);

    let snapshot = bench.controller().snapshot();
    assert_eq!(snapshot.mode, SparkMode::Mapped);
    assert_eq!(snapshot.delay, Ticks(1166));
}

#[test]
fn late_handler_fires_immediately_instead_of_arming() {
    let mut bench = warmed_bench(PERIOD_BUCKET_40);
    bench.set_isr_latency(2_000);
    let start = bench.now_us();
    bench.revolution(PERIOD_BUCKET_40);

    let sparks = trigger_sparks_since(&bench, start);
    assert_eq!(sparks.len(), 1);
    assert_eq!(sparks[0].at_us, start + 2_000);
    assert_eq!(bench.hardware().compare_target(), None);
    assert!(!bench.hardware().trigger());
}

#[test]
fn new_edge_supersedes_a_pending_compare() {
    let mut bench = warmed_bench(PERIOD_BUCKET_40);
    let start = bench.now_us();

    bench.primary_edge();
    assert_eq!(bench.hardware().compare_target(), Some(Ticks(1166)));

    // Secondary edge re-arms capture before the compare is due.
    bench.advance(600);
    bench.secondary_edge();
    bench.advance(300);

    // A 12 ms period lands in bucket 50, which wants 800 us.
    bench.primary_edge_captured(Ticks(12_000));
    assert_eq!(bench.hardware().compare_target(), Some(Ticks(800)));
    bench.advance(3_000);

    let sparks = trigger_sparks_since(&bench, start);
    assert_eq!(sparks.len(), 1, "stale compare fired: {sparks:?}");
    assert_eq!(sparks[0].at_us, start + 900 + 800);
    assert_eq!(sparks[0].counter, Ticks(800));
}

#[test]
fn timeout_clears_an_armed_compare() {
    let mut bench = warmed_bench(PERIOD_BUCKET_40);
    let start = bench.now_us();

    bench.primary_edge();
    assert!(bench.hardware().compare_target().is_some());
    bench.inject(Event::Overflow);

    assert_eq!(bench.controller().state(), EngineState::Low);
    assert_eq!(bench.hardware().compare_target(), None);
    bench.advance(5_000);
    assert!(trigger_sparks_since(&bench, start).is_empty());
    assert!(!bench.hardware().trigger());
}

#[test]
fn stall_forces_outputs_safe_and_restart_resumes() {
    let mut bench = Bench::new(reference_inputs());
    bench.run(9_000, 3);
    assert!(bench.hardware().power_valve());

    bench.stall();
    assert_eq!(bench.controller().state(), EngineState::Low);
    assert!(!bench.hardware().power_valve());
    assert_eq!(bench.controller().speed(), None);
    assert_eq!(
        bench.controller().telemetry().latest().map(|record| record.event),
        Some(TelemetryEventKind::EngineStopped)
    );

    bench.run(4_000, 3);
    assert_eq!(bench.controller().state(), EngineState::Run);
    let running = bench
        .controller()
        .telemetry()
        .oldest_first()
        .filter(|record| record.event == TelemetryEventKind::EngineRunning)
        .count();
    assert_eq!(running, 2);
}

#[test]
fn cranking_speed_uses_fixed_timing() {
    let mut bench = Bench::new(reference_inputs());
    bench.run(1_200, 4);

    let hw = bench.hardware();
    assert_eq!(hw.compare_target(), None);
    assert_eq!(hw.gate(), GateLevel::Enabled);
    let last = hw.last_spark().copied().expect("sparked");
    assert_eq!(last.source, SparkSource::SecondaryPickup);
    assert_eq!(last.counter, Ticks(4_166));
    assert_eq!(bench.controller().snapshot().mode, SparkMode::Fixed);
}

#[test]
fn overspeed_without_limiter_falls_back_to_fixed_timing() {
    let mut inputs = reference_inputs();
    inputs.limiter = LimiterMode::Disabled;
    let mut bench = Bench::new(inputs);
    bench.run(14_000, 4);

    let hw = bench.hardware();
    assert_eq!(hw.compare_target(), None);
    assert_eq!(hw.gate(), GateLevel::Enabled);
    assert_eq!(
        hw.last_spark().map(|spark| spark.source),
        Some(SparkSource::SecondaryPickup)
    );
    assert_eq!(bench.controller().snapshot().mode, SparkMode::Fixed);
}

#[test]
fn every_event_feeds_the_watchdog() {
    let mut bench = warmed_bench(PERIOD_BUCKET_40);
    let before = bench.hardware().watchdog_feeds();
    bench.revolution(PERIOD_BUCKET_40);
    // Primary edge, compare match, secondary edge.
    assert_eq!(bench.hardware().watchdog_feeds() - before, 3);
}
