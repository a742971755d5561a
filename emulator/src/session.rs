use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant as HostInstant};

use cdi_core::calibration::{
    CalibrationSelectors, FIXED_TIMING_BUCKET, LimiterMode, MAX_MAP_BUCKET, SelectorInputs,
    ValveBand,
};
use cdi_core::map::{AdvanceCurve, IgnitionMap};
use cdi_core::protection::ValveThresholds;
use cdi_core::sim::{Bench, SparkSource};
use cdi_core::telemetry::{EventId, StatusFormatter};
use cdi_core::units::SpeedBucket;

use crate::grammar::{self, Command, CommandError};

/// Revolutions simulated by `run` when no count is given.
const DEFAULT_REVS: u32 = 10;
/// Upper bound on revolutions per `run` command.
const MAX_REVS: u32 = 100_000;
/// Buckets printed per `map` row.
const MAP_ROW_WIDTH: usize = 10;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("help", "help                       - list commands"),
    ("status", "status                     - engine, outputs and selectors"),
    ("map", "map [bucket]               - dump the active map or one bucket"),
    ("select", "select <adv> <max> <grad> <ret> - set calibration selectors (0-3)"),
    ("valve", "valve on|off               - power-valve band switch"),
    ("limiter", "limiter on|off             - rev limiter switch"),
    ("run", "run <rpm> [revs]           - spin the crank at a steady speed"),
    ("stall", "stall                      - stop the crank until the time base overflows"),
    ("log", "log                        - show retained controller events"),
    ("exit", "exit|quit                  - leave the emulator"),
];

pub struct Session {
    bench: Bench,
    inputs: SelectorInputs,
    log_cursor: EventId,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl Session {
    pub fn new(transcript: Option<PathBuf>) -> io::Result<Self> {
        let transcript = transcript
            .map(|path| TranscriptLogger::new(&path))
            .transpose()?;
        let inputs = SelectorInputs::default();
        let bench = Bench::new(inputs);
        let log_cursor = bench.controller().telemetry().next_id();

        Ok(Self {
            bench,
            inputs,
            log_cursor,
            transcript,
            started_at: HostInstant::now(),
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(elapsed, TranscriptRole::Host, trimmed)?;
        }

        let lines = match grammar::parse(trimmed).and_then(|command| self.execute(command)) {
            Ok(lines) => lines,
            Err(err) => vec![format!("ERR {err}")],
        };

        if let Some(transcript) = self.transcript.as_mut() {
            for line in &lines {
                transcript.append_line(elapsed, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(lines)
    }

    fn execute(&mut self, command: Command) -> Result<Vec<String>, CommandError> {
        let lines = match command {
            Command::Help => HELP_TOPICS
                .iter()
                .map(|(_, usage)| format!("  {usage}"))
                .collect(),
            Command::Status => self.status_lines(),
            Command::Map { bucket } => self.map_lines(bucket)?,
            Command::Select(raw) => {
                self.inputs.calibration = CalibrationSelectors::from_raw(raw)?;
                self.publish_inputs();
                vec![format!("OK selectors {}", self.inputs.calibration)]
            }
            Command::Valve(enabled) => {
                self.inputs.valve_band = if enabled {
                    ValveBand::Enabled
                } else {
                    ValveBand::Disabled
                };
                self.publish_inputs();
                let band = ValveThresholds::for_band(self.inputs.valve_band);
                vec![format!(
                    "OK valve band on>{} off<{}",
                    band.on_above, band.off_below
                )]
            }
            Command::Limiter(enabled) => {
                self.inputs.limiter = if enabled {
                    LimiterMode::Enabled
                } else {
                    LimiterMode::Disabled
                };
                self.publish_inputs();
                vec![format!("OK limiter {}", if enabled { "on" } else { "off" })]
            }
            Command::Run { rpm, revs } => self.run(rpm, revs.unwrap_or(DEFAULT_REVS))?,
            Command::Stall => {
                self.bench.stall();
                let mut lines = vec![format!(
                    "OK stalled engine={}",
                    self.bench.controller().state().label()
                )];
                lines.extend(self.drain_events());
                lines
            }
            Command::Log => self
                .bench
                .controller()
                .telemetry()
                .oldest_first()
                .map(|record| format!("  {record}"))
                .collect(),
        };
        Ok(lines)
    }

    /// Latches the selectors and hands over a freshly built map when needed,
    /// the way the firmware foreground does after each switch poll.
    fn publish_inputs(&mut self) {
        self.bench.set_inputs(self.inputs);
        let selectors = self.inputs.calibration;
        let controller = self.bench.controller();
        if controller.map_selectors() != selectors && controller.accepts_map_swap() {
            let map = IgnitionMap::build(selectors);
            self.bench.controller_mut().install_map(&map, selectors);
        }
    }

    fn run(&mut self, rpm: u32, revs: u32) -> Result<Vec<String>, CommandError> {
        if rpm == 0 {
            return Err(CommandError::Argument("rpm must be positive"));
        }
        if revs == 0 || revs > MAX_REVS {
            return Err(CommandError::Argument("revs must be 1-100000"));
        }

        let sparks_before = self.bench.hardware().spark_count();
        let started_us = self.bench.now_us();
        self.bench.run(rpm, revs);

        let hw = self.bench.hardware();
        let sparks = hw.spark_count().wrapping_sub(sparks_before);
        let fixed = hw
            .sparks()
            .filter(|spark| {
                spark.at_us >= started_us && spark.source == SparkSource::SecondaryPickup
            })
            .count();

        let period = self.bench.controller().period();
        let mut diagnostic = String::new();
        let snapshot = self.bench.controller().snapshot();
        StatusFormatter::new(&snapshot)
            .write_diagnostic_line(&mut diagnostic)
            .map_err(|_| CommandError::Argument("diagnostic line"))?;

        let mut lines = vec![
            format!(
                "OK ran {revs} revs at {rpm}rpm sparks={sparks} fixed-path={fixed} period={period}"
            ),
            format!("serial {diagnostic:?}"),
        ];
        if let Some(last) = hw.last_spark() {
            lines.push(format!(
                "last spark +{}us after pickup via {}",
                last.counter.get(),
                match last.source {
                    SparkSource::Trigger => "trigger",
                    SparkSource::SecondaryPickup => "secondary pickup",
                }
            ));
        }
        lines.extend(self.drain_events());
        Ok(lines)
    }

    fn status_lines(&self) -> Vec<String> {
        let controller = self.bench.controller();
        let snapshot = controller.snapshot();
        let formatter = StatusFormatter::new(&snapshot);

        let mut engine = String::new();
        let mut outputs = String::new();
        // Writing into a String cannot fail.
        let _ = formatter.write_engine_line(&mut engine);
        let _ = formatter.write_outputs_line(&mut outputs);

        vec![
            engine,
            outputs,
            format!(
                "selectors {} valve-band={} limiter={}",
                self.inputs.calibration,
                match self.inputs.valve_band {
                    ValveBand::Enabled => "enabled",
                    ValveBand::Disabled => "disabled",
                },
                match self.inputs.limiter {
                    LimiterMode::Enabled => "enabled",
                    LimiterMode::Disabled => "disabled",
                }
            ),
            format!(
                "map built-from {} events={}",
                controller.map_selectors(),
                controller.telemetry().len()
            ),
        ]
    }

    fn map_lines(&self, bucket: Option<u8>) -> Result<Vec<String>, CommandError> {
        let controller = self.bench.controller();
        let map = controller.map();

        if let Some(raw) = bucket {
            let bucket = SpeedBucket(raw);
            let delay = map
                .delay(bucket)
                .ok_or(CommandError::Argument("bucket must be 0-130"))?;
            let curve = AdvanceCurve::from_selectors(controller.map_selectors());
            let angle = curve.angle_at(bucket);
            return Ok(vec![format!(
                "map {bucket} angle={angle} delay={delay}",
            )]);
        }

        let live = &map.as_slice()[FIXED_TIMING_BUCKET.index()..=MAX_MAP_BUCKET.index()];
        let lines = live
            .chunks(MAP_ROW_WIDTH)
            .enumerate()
            .map(|(row, delays)| {
                let first = FIXED_TIMING_BUCKET.index() + row * MAP_ROW_WIDTH;
                let cells: Vec<String> = delays.iter().map(|delay| delay.get().to_string()).collect();
                format!("  {first:>3}: {}", cells.join(" "))
            })
            .collect();
        Ok(lines)
    }

    /// Controller events recorded since the last drain.
    fn drain_events(&mut self) -> Vec<String> {
        let telemetry = self.bench.controller().telemetry();
        let lines = telemetry
            .since(self.log_cursor)
            .map(|record| format!("event {record}"))
            .collect();
        self.log_cursor = telemetry.next_id();
        lines
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# CDI emulator transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(None).expect("session without transcript")
    }

    #[test]
    fn run_reports_the_serial_line() {
        let mut session = session();
        let lines = session.handle_command("run 4000").expect("io");
        assert!(lines[0].starts_with("OK ran 10 revs at 4000rpm"), "{lines:?}");
        assert!(lines[0].ends_with("period=15000us"), "{lines:?}");
        assert_eq!(lines[1], r#"serial "4000\r\n""#);
        assert!(lines.iter().any(|line| line.contains("engine-running")));
    }

    #[test]
    fn select_installs_a_new_map() {
        let mut session = session();
        let lines = session.handle_command("select 1 2 1 0").expect("io");
        assert_eq!(lines, ["OK selectors adv=1 max=2 grad=1 ret=0"]);

        let lines = session.handle_command("map 40").expect("io");
        assert_eq!(lines, ["map 4000rpm angle=7.00deg delay=1166us"]);
    }

    #[test]
    fn out_of_range_selector_is_rejected() {
        let mut session = session();
        let lines = session.handle_command("select 1 2 4 0").expect("io");
        assert_eq!(lines, ["ERR selector position 4 outside 0-3"]);
    }

    #[test]
    fn map_dump_covers_every_live_bucket() {
        let mut session = session();
        let lines = session.handle_command("map").expect("io");
        // Buckets 15..=130 in rows of ten.
        assert_eq!(lines.len(), 12);
        assert!(lines[0].starts_with("   15: "));
        assert!(lines[11].starts_with("  125: "));
    }

    #[test]
    fn stall_returns_to_low() {
        let mut session = session();
        session.handle_command("run 3000 5").expect("io");
        let lines = session.handle_command("stall").expect("io");
        assert_eq!(lines[0], "OK stalled engine=low");
        assert!(lines.iter().any(|line| line.contains("engine-stopped")));
    }

    #[test]
    fn unknown_commands_surface_syntax_errors() {
        let mut session = session();
        let lines = session.handle_command("reboot now").expect("io");
        assert!(lines[0].starts_with("ERR syntax"), "{lines:?}");
    }
}
