//! Engine protection: rev limiter, power-valve driver and reverse-rotation guard.

pub mod power_valve;
pub mod reverse;
pub mod rev_limiter;

pub use power_valve::{PowerValve, ValveThresholds};
pub use reverse::secondary_edge_is_late;
pub use rev_limiter::{RevLimiter, RevTier, RevVerdict};
