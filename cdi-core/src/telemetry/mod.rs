//! Telemetry event ring and status snapshots shared by firmware and host targets.
//!
//! The interrupt core records discrete transitions (engine start/stop, rev
//! cuts, reverse-rotation lockouts, valve switching, map swaps) into a
//! fixed-capacity ring. Records carry a wrapping id so a foreground reader
//! can drain only what it has not seen yet, without allocation and without
//! the ring ever blocking the interrupt path.

use core::fmt;

use heapless::HistoryBuf;

use crate::protection::RevTier;
use crate::units::SpeedBucket;

pub mod status;

pub use status::{ControllerSnapshot, SparkMode, StatusFormatter};

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Number of records retained by the controller.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

/// Discrete controller transitions worth surfacing to an operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    /// First primary edge after a quiet period.
    EngineRunning,
    /// The time base overflowed without a primary edge.
    EngineStopped,
    /// The spark source changed between the map and the fixed-timing path.
    SparkModeChanged(SparkMode),
    /// The rev limiter cut an ignition.
    RevCut(RevTier),
    /// A late secondary edge locked the ignition out.
    ReverseLockout,
    /// The power valve switched on or off.
    PowerValve(bool),
    /// A freshly built map became active.
    MapSwapped { generation: u32 },
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::EngineRunning => f.write_str("engine-running"),
            TelemetryEventKind::EngineStopped => f.write_str("engine-stopped"),
            TelemetryEventKind::SparkModeChanged(mode) => {
                write!(f, "spark-mode {}", mode.label())
            }
            TelemetryEventKind::RevCut(tier) => write!(f, "rev-cut {}", tier.label()),
            TelemetryEventKind::ReverseLockout => f.write_str("reverse-lockout"),
            TelemetryEventKind::PowerValve(on) => {
                write!(f, "power-valve {}", if *on { "on" } else { "off" })
            }
            TelemetryEventKind::MapSwapped { generation } => {
                write!(f, "map-swapped gen={generation}")
            }
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub event: TelemetryEventKind,
    /// Speed bucket current when the event was recorded.
    pub speed: SpeedBucket,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} at {}", self.id, self.event, self.speed)
    }
}

/// Fixed-capacity ring of controller events.
pub struct TelemetryLog {
    ring: HistoryBuf<TelemetryRecord, TELEMETRY_RING_CAPACITY>,
    next_event_id: EventId,
}

impl TelemetryLog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Records an event and returns its id.
    pub fn record(&mut self, event: TelemetryEventKind, speed: SpeedBucket) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord { id, event, speed });
        id
    }

    /// Iterates the retained records in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    /// Id the next record will receive; a reader stores it as its cursor.
    #[must_use]
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records with an id at or after `cursor`, oldest first.
    pub fn since(&self, cursor: EventId) -> impl Iterator<Item = &TelemetryRecord> {
        let next = self.next_event_id;
        let pending = next.wrapping_sub(cursor);
        self.oldest_first()
            .filter(move |record| next.wrapping_sub(record.id) <= pending)
    }
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TelemetryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.oldest_first()).finish()
    }
}
