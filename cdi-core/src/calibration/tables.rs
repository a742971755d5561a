//! Angle-to-delay conversion coefficients.
//!
//! Entry `n` is the time in ticks the crank needs to sweep 0.02 degrees at
//! bucket `n`, scaled by 1024 so the delay can be finished with a right shift:
//! `delay = ((reference - angle) >> 1) * coeff >> DELAY_SCALE_SHIFT`.
//! Buckets below [`FIXED_TIMING_BUCKET`](super::FIXED_TIMING_BUCKET) are
//! never addressed by the map and hold zero.

use super::MAP_BUCKETS;

/// Right shift that removes the 1024 scale from a coefficient product.
pub const DELAY_SCALE_SHIFT: u32 = 10;

#[rustfmt::skip]
pub const DEG_TO_TICKS: [u16; MAP_BUCKETS] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2276, 2133, 2008, 1896, 1796,
    1707, 1625, 1552, 1484, 1422, 1365, 1313, 1264, 1219, 1177, 1138, 1101, 1067, 1034, 1004, 975, 948, 923, 898, 875,
    853, 833, 813, 794, 776, 759, 742, 726, 711, 697, 683, 669, 656, 644, 632, 621, 610, 599, 589, 579,
    569, 560, 551, 542, 533, 525, 517, 509, 502, 495, 488, 481, 474, 468, 461, 455, 449, 443, 438, 432,
    427, 421, 416, 411, 406, 402, 397, 392, 388, 384, 379, 375, 371, 367, 363, 359, 356, 352, 348, 345,
    341, 338, 335, 331, 328, 325, 322, 319, 316, 313, 310, 308, 305, 302, 299, 297, 294, 292, 289, 287,
    284, 282, 280, 278, 275, 273, 271, 269, 267, 265, 263,
];
