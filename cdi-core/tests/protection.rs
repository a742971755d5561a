use cdi_core::calibration::{CalibrationSelectors, LimiterMode, SelectorInputs, ValveBand};
use cdi_core::protection::RevTier;
use cdi_core::sim::Bench;
use cdi_core::telemetry::TelemetryEventKind;
use cdi_core::GateLevel;

/// Periods that land in the rev limiter's buckets.
const PERIOD_BUCKET_98: u64 = 6_112;
const PERIOD_BUCKET_99: u64 = 6_048;
const PERIOD_BUCKET_100: u64 = 6_000;

/// 2000 rpm, bucket 20.
const PERIOD_BUCKET_20: u64 = 30_000;

fn inputs(valve_band: ValveBand, limiter: LimiterMode) -> SelectorInputs {
    SelectorInputs::new(
        CalibrationSelectors::from_raw([1, 2, 1, 0]).expect("positions in range"),
        valve_band,
        limiter,
    )
}

/// Sparks produced by each of `revs` revolutions after one warm-up revolution.
fn spark_pattern(limiter: LimiterMode, period_us: u64, revs: usize) -> Vec<u32> {
    let mut bench = Bench::new(inputs(ValveBand::Enabled, limiter));
    bench.revolution(period_us);
    (0..revs)
        .map(|_| {
            let before = bench.hardware().spark_count();
            bench.revolution(period_us);
            bench.hardware().spark_count() - before
        })
        .collect()
}

#[test]
fn limiter_cuts_every_second_ignition_above_low_threshold() {
    assert_eq!(
        spark_pattern(LimiterMode::Enabled, PERIOD_BUCKET_98, 10),
        [0, 1, 0, 1, 0, 1, 0, 1, 0, 1]
    );
}

#[test]
fn limiter_cuts_every_third_ignition_above_mid_threshold() {
    assert_eq!(
        spark_pattern(LimiterMode::Enabled, PERIOD_BUCKET_99, 10),
        [0, 1, 1, 0, 1, 1, 0, 1, 1, 0]
    );
}

#[test]
fn limiter_cuts_everything_above_high_threshold() {
    assert_eq!(
        spark_pattern(LimiterMode::Enabled, PERIOD_BUCKET_100, 10),
        [0; 10]
    );
}

#[test]
fn disabled_limiter_never_cuts() {
    assert_eq!(
        spark_pattern(LimiterMode::Disabled, PERIOD_BUCKET_100, 10),
        [1; 10]
    );
}

#[test]
fn rev_cut_disables_the_gate_until_the_next_edge() {
    let mut bench = Bench::new(inputs(ValveBand::Enabled, LimiterMode::Enabled));
    bench.revolution(PERIOD_BUCKET_98);
    bench.primary_edge();

    let hw = bench.hardware();
    assert_eq!(hw.gate(), GateLevel::Disabled);
    assert_eq!(hw.compare_target(), None);
    assert!(hw.capture_armed());
    assert!(
        bench
            .controller()
            .telemetry()
            .oldest_first()
            .any(|record| record.event == TelemetryEventKind::RevCut(RevTier::SkipEverySecond))
    );

    bench.advance(PERIOD_BUCKET_98);
    bench.primary_edge();
    assert_eq!(bench.hardware().gate(), GateLevel::Enabled);
}

#[test]
fn power_valve_holds_inside_the_dead_zone() {
    let mut bench = Bench::new(inputs(ValveBand::Enabled, LimiterMode::Enabled));
    let steps = [
        (8_600, true),
        (8_400, true),
        (8_300, true),
        (8_200, false),
        (8_400, false),
        (8_500, false),
        (8_600, true),
    ];
    for (rpm, expected) in steps {
        bench.run(rpm, 2);
        assert_eq!(bench.hardware().power_valve(), expected, "{rpm} rpm");
    }
}

#[test]
fn disabled_band_switches_at_low_speed() {
    let mut bench = Bench::new(inputs(ValveBand::Disabled, LimiterMode::Enabled));
    let steps = [(3_100, true), (2_900, true), (2_700, false)];
    for (rpm, expected) in steps {
        bench.run(rpm, 2);
        assert_eq!(bench.hardware().power_valve(), expected, "{rpm} rpm");
    }
}

#[test]
fn late_secondary_edge_locks_out_ignition() {
    let mut bench = Bench::new(inputs(ValveBand::Enabled, LimiterMode::Enabled));
    bench.run(2_000, 3);
    assert_eq!(bench.hardware().gate(), GateLevel::Enabled);

    bench.revolution_with_secondary(PERIOD_BUCKET_20, 8_000);
    assert_eq!(bench.hardware().gate(), GateLevel::Disabled);
    assert_eq!(bench.controller().snapshot().gate, GateLevel::Disabled);
    assert!(
        bench
            .controller()
            .telemetry()
            .oldest_first()
            .any(|record| record.event == TelemetryEventKind::ReverseLockout)
    );

    // Normal sequencing resumes on the next primary edge.
    bench.revolution(PERIOD_BUCKET_20);
    assert_eq!(bench.hardware().gate(), GateLevel::Enabled);
}

#[test]
fn secondary_edge_timing_is_ignored_at_speed() {
    let mut bench = Bench::new(inputs(ValveBand::Enabled, LimiterMode::Enabled));
    // 4000 rpm, secondary edge half a revolution late.
    bench.run(4_000, 3);
    bench.revolution_with_secondary(15_000, 7_500);
    assert_eq!(bench.hardware().gate(), GateLevel::Enabled);
}

#[test]
fn selectors_rebuild_the_map_only_at_low_speed() {
    let mut bench = Bench::new(inputs(ValveBand::Enabled, LimiterMode::Enabled));
    bench.run(6_000, 3);
    let reference = bench.controller().map_selectors();

    let mut moved = inputs(ValveBand::Enabled, LimiterMode::Enabled);
    moved.calibration = CalibrationSelectors::power_on();
    bench.set_inputs(moved);
    bench.run(6_000, 3);
    assert_eq!(bench.controller().map_selectors(), reference);

    let cursor = bench.controller().telemetry().next_id();
    bench.run(2_000, 3);
    assert_eq!(
        bench.controller().map_selectors(),
        CalibrationSelectors::power_on()
    );
    let swapped = bench
        .controller()
        .telemetry()
        .since(cursor)
        .filter(|record| matches!(record.event, TelemetryEventKind::MapSwapped { .. }))
        .count();
    assert_eq!(swapped, 1);
}

#[test]
fn foreground_maps_are_refused_at_speed() {
    let mut bench = Bench::new(inputs(ValveBand::Enabled, LimiterMode::Enabled));
    assert!(bench.controller().accepts_map_swap());

    bench.run(6_000, 3);
    assert!(!bench.controller().accepts_map_swap());

    bench.run(3_000, 3);
    assert!(bench.controller().accepts_map_swap());

    bench.stall();
    assert!(bench.controller().accepts_map_swap());
}
