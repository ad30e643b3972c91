//! Capture Scheduling — one-shot photograph triggers at fixed offsets past
//! the detected onset.
//!
//! The schedule owns three trigger slots. While the loop runs and the onset
//! is set, each tick is checked against `onset + offset` in slot order; the
//! first match fires and the rest of the slots are not considered that tick.
//! Every slot fires at most once per session; re-firing is an explicit error
//! so the invariant is enforceable, not silently absorbed.

pub mod camera;

pub use camera::CameraSink;

use std::path::PathBuf;
use thiserror::Error;

/// Capture subsystem errors.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// A one-shot trigger slot was asked to fire twice.
    #[error("capture slot {slot} already fired")]
    AlreadyFired { slot: u8 },

    #[error("failed to run camera binary: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("camera binary exited with {status}")]
    CommandFailed { status: std::process::ExitStatus },

    #[error("camera reported success but {path} was not written")]
    OutputMissing { path: PathBuf },
}

/// One image produced by a capture sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    /// Slot 0 is the pre-loop baseline shot; slots 1-3 are scheduled.
    pub slot: u8,
    /// Capture wall time, `%Y%m%d%H%M%S`.
    pub timestamp: String,
    pub path: PathBuf,
}

/// Destination for scheduled captures.
///
/// Implementations shell out to the camera binary (production) or record the
/// calls (tests). Errors are caught and logged by the measurement loop; a
/// missed capture never stops sampling.
pub trait CaptureSink {
    fn capture(&mut self, slot: u8, composite_id: &str, timestamp: &str)
        -> Result<(), CaptureError>;

    /// Images captured so far, in capture order.
    fn captured(&self) -> &[CapturedImage];
}

// ============================================================================
// Trigger Slots
// ============================================================================

/// A single scheduled photograph event.
#[derive(Debug, Clone)]
pub struct TriggerSlot {
    /// Slot id (1-3).
    pub slot: u8,
    /// Tick offset past the onset at which this slot fires.
    pub offset: usize,
    fired: bool,
}

impl TriggerSlot {
    fn fire(&mut self) -> Result<(), CaptureError> {
        if self.fired {
            return Err(CaptureError::AlreadyFired { slot: self.slot });
        }
        self.fired = true;
        Ok(())
    }

    pub const fn has_fired(&self) -> bool {
        self.fired
    }
}

/// The three one-shot capture triggers for a session.
#[derive(Debug, Clone)]
pub struct CaptureSchedule {
    slots: [TriggerSlot; 3],
}

impl CaptureSchedule {
    pub fn new(offsets: [usize; 3]) -> Self {
        let mut slot_id = 0u8;
        let slots = offsets.map(|offset| {
            slot_id += 1;
            TriggerSlot {
                slot: slot_id,
                offset,
                fired: false,
            }
        });
        Self { slots }
    }

    /// Check whether a slot is due at `tick` and mark it fired.
    ///
    /// Slots are evaluated in ascending offset order and at most one fires
    /// per tick. Returns the fired slot id. Must only be called once the
    /// onset is set.
    pub fn check(&mut self, onset: usize, tick: usize) -> Option<u8> {
        for slot in &mut self.slots {
            if tick == onset + slot.offset {
                match slot.fire() {
                    Ok(()) => return Some(slot.slot),
                    Err(e) => {
                        tracing::error!(error = %e, "trigger slot re-fire rejected");
                        return None;
                    }
                }
            }
        }
        None
    }

    pub fn slots(&self) -> &[TriggerSlot; 3] {
        &self.slots
    }

    /// Slot ids that have fired, ascending.
    pub fn fired_slots(&self) -> Vec<u8> {
        self.slots
            .iter()
            .filter(|s| s.fired)
            .map(|s| s.slot)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_fire_at_exact_offsets_in_order() {
        let mut schedule = CaptureSchedule::new([30, 60, 120]);
        let onset = 50;
        let mut fired = Vec::new();
        for tick in onset..=onset + 130 {
            if let Some(slot) = schedule.check(onset, tick) {
                fired.push((slot, tick));
            }
        }
        assert_eq!(fired, vec![(1, 80), (2, 110), (3, 170)]);
    }

    #[test]
    fn no_fire_off_by_one() {
        let mut schedule = CaptureSchedule::new([30, 60, 120]);
        assert_eq!(schedule.check(50, 79), None);
        assert_eq!(schedule.check(50, 81), None);
    }

    #[test]
    fn at_most_one_slot_per_tick() {
        // Duplicate offsets: only the first slot fires on the shared tick.
        let mut schedule = CaptureSchedule::new([30, 30, 120]);
        assert_eq!(schedule.check(0, 30), Some(1));
        assert_eq!(schedule.fired_slots(), vec![1]);
    }

    #[test]
    fn explicit_re_fire_is_an_error() {
        let mut slot = TriggerSlot {
            slot: 2,
            offset: 60,
            fired: false,
        };
        slot.fire().expect("first fire must succeed");
        let err = slot.fire().expect_err("re-fire must be rejected");
        assert!(matches!(err, CaptureError::AlreadyFired { slot: 2 }));
    }
}
