//! Hardware collaborators behind narrow, best-effort interfaces.

pub mod fan;

pub use fan::{FanDriver, FanGuard, FanOwnership, NullFan};
