//! Per-tick signal conditioning: voltage filtering, ppm conversion and
//! single-sample peak removal.

pub mod filter;
pub mod smoothing;

pub use filter::{FilterState, VoltageFilter};
pub use smoothing::smooth_peak;
