//! Foreground-visible controller status.
//!
//! The interrupt core publishes a [`ControllerSnapshot`] after every event.
//! It packs into a single word so the firmware can hand it to the
//! foreground through one atomic store; [`StatusFormatter`] keeps the text
//! rendering identical between the diagnostic UART line and the emulator.

use core::fmt;

use crate::engine::EngineState;
use crate::hardware::GateLevel;
use crate::protection::RevTier;
use crate::units::{SpeedBucket, Ticks};

/// Where the spark for the current speed comes from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SparkMode {
    /// Delay looked up from the ignition map.
    Mapped,
    /// Speed outside the map; the secondary pickup hardware path fires.
    #[default]
    Fixed,
}

impl SparkMode {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SparkMode::Mapped => "mapped",
            SparkMode::Fixed => "fixed",
        }
    }
}

/// Point-in-time view of the interrupt core.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ControllerSnapshot {
    pub state: EngineState,
    pub speed: SpeedBucket,
    pub mode: SparkMode,
    pub gate: GateLevel,
    pub valve_on: bool,
    pub tier: RevTier,
    /// Delay used for the most recent mapped spark.
    pub delay: Ticks,
}

impl ControllerSnapshot {
    const RUN_BIT: u32 = 1 << 0;
    const GATE_DISABLED_BIT: u32 = 1 << 1;
    const VALVE_BIT: u32 = 1 << 2;
    const FIXED_BIT: u32 = 1 << 3;
    const TIER_SHIFT: u32 = 4;
    const SPEED_SHIFT: u32 = 8;
    const DELAY_SHIFT: u32 = 16;

    /// Packs the snapshot into one word.
    #[must_use]
    pub const fn to_bits(&self) -> u32 {
        let mut bits = 0;
        if matches!(self.state, EngineState::Run) {
            bits |= Self::RUN_BIT;
        }
        if matches!(self.gate, GateLevel::Disabled) {
            bits |= Self::GATE_DISABLED_BIT;
        }
        if self.valve_on {
            bits |= Self::VALVE_BIT;
        }
        if matches!(self.mode, SparkMode::Fixed) {
            bits |= Self::FIXED_BIT;
        }
        let tier = match self.tier {
            RevTier::Normal => 0,
            RevTier::SkipEverySecond => 1,
            RevTier::SkipEveryThird => 2,
            RevTier::Suppressed => 3,
        };
        bits |= tier << Self::TIER_SHIFT;
        bits |= (self.speed.0 as u32) << Self::SPEED_SHIFT;
        bits |= (self.delay.0 as u32) << Self::DELAY_SHIFT;
        bits
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            state: if bits & Self::RUN_BIT != 0 {
                EngineState::Run
            } else {
                EngineState::Low
            },
            speed: SpeedBucket(((bits >> Self::SPEED_SHIFT) & 0xFF) as u8),
            mode: if bits & Self::FIXED_BIT != 0 {
                SparkMode::Fixed
            } else {
                SparkMode::Mapped
            },
            gate: if bits & Self::GATE_DISABLED_BIT != 0 {
                GateLevel::Disabled
            } else {
                GateLevel::Enabled
            },
            valve_on: bits & Self::VALVE_BIT != 0,
            tier: match (bits >> Self::TIER_SHIFT) & 0b11 {
                0 => RevTier::Normal,
                1 => RevTier::SkipEverySecond,
                2 => RevTier::SkipEveryThird,
                _ => RevTier::Suppressed,
            },
            delay: Ticks((bits >> Self::DELAY_SHIFT) as u16),
        }
    }
}

/// Renders a [`ControllerSnapshot`] into text lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a ControllerSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a ControllerSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the serial diagnostic line: rpm-equivalent speed and CRLF.
    ///
    /// # Errors
    /// Fails only if `writer` does.
    pub fn write_diagnostic_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let rpm = match self.snapshot.state {
            EngineState::Run => self.snapshot.speed.rpm(),
            EngineState::Low => 0,
        };
        write!(writer, "{rpm}\r\n")
    }

    /// Writes the engine line (e.g. `engine run 4500rpm mode=mapped delay=1166us`).
    ///
    /// # Errors
    /// Fails only if `writer` does.
    pub fn write_engine_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let snapshot = self.snapshot;
        write!(
            writer,
            "engine {} {} mode={} delay={}",
            snapshot.state.label(),
            snapshot.speed,
            snapshot.mode.label(),
            snapshot.delay
        )
    }

    /// Writes the outputs line (e.g. `outputs gate=enabled valve=off limiter=normal`).
    ///
    /// # Errors
    /// Fails only if `writer` does.
    pub fn write_outputs_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let snapshot = self.snapshot;
        writer.write_str("outputs gate=")?;
        writer.write_str(if snapshot.gate.is_enabled() {
            "enabled"
        } else {
            "disabled"
        })?;
        writer.write_str(" valve=")?;
        writer.write_str(if snapshot.valve_on { "on" } else { "off" })?;
        write!(writer, " limiter={}", snapshot.tier.label())
    }
}
