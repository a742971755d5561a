//! Reverse-rotation guard.
//!
//! At low speed the secondary pickup should follow the primary one after a
//! small fraction of a revolution. A secondary edge arriving late relative to
//! the last period means the crank slowed violently or turned backwards
//! (stalling on a climb), so the ignition is locked out until the primary
//! sequence starts over.

use crate::calibration::{REVERSE_GUARD_CEILING, REVERSE_GUARD_SHIFT};
use crate::units::{SpeedBucket, Ticks};

/// Returns `true` when a secondary edge `elapsed` after the primary edge is
/// implausible for the previous `period`.
#[must_use]
pub fn secondary_edge_is_late(speed: SpeedBucket, period: Ticks, elapsed: Ticks) -> bool {
    if speed >= REVERSE_GUARD_CEILING {
        return false;
    }
    let remaining = u32::from(period.saturating_sub(elapsed).0);
    remaining < u32::from(elapsed.0) << REVERSE_GUARD_SHIFT
}
