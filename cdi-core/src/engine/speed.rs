//! Period to speed-bucket conversion.

use crate::calibration::{PERIOD_SHIFT, PERIOD_TO_BUCKET_NUMERATOR};
use crate::units::{SpeedBucket, Ticks};

/// Converts a captured revolution period into a speed bucket.
///
/// The period is shifted right before dividing so the numerator fits in 16
/// bits. Periods too short to represent saturate at
/// [`SpeedBucket::OVERSPEED`].
#[must_use]
pub fn bucket_for_period(period: Ticks) -> SpeedBucket {
    let divisor = period.0 >> PERIOD_SHIFT;
    if divisor == 0 {
        return SpeedBucket::OVERSPEED;
    }
    let quotient = PERIOD_TO_BUCKET_NUMERATOR / divisor;
    SpeedBucket(u8::try_from(quotient).unwrap_or(u8::MAX))
}
