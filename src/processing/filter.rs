//! Voltage filtering and concentration conversion.
//!
//! Two filter strategies exist. The nonlinear despiking filter is the
//! production path: it smooths each new reading against the two most recent
//! raw predecessors and rejects single-sample glitches outright. The plain
//! exponential moving average is the fallback, selected once at session
//! configuration time when despiking is disabled — never probed per tick.

use crate::config::defaults::{FILTER_DEAD_BAND, FILTER_SPIKE_GAP};

/// Per-channel filter memory: the two most recent raw readings.
///
/// Exclusively owned by the measurement loop, one instance per channel.
/// For the despike filter `prev`/`prev_prev` hold raw history; for the EMA
/// fallback only `prev` is used and holds the last filtered value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterState {
    /// Previous reading (`b`).
    pub prev: f64,
    /// Reading from two steps ago (`a`).
    pub prev_prev: f64,
}

impl FilterState {
    pub const fn new() -> Self {
        Self {
            prev: 0.0,
            prev_prev: 0.0,
        }
    }
}

/// Filter strategy, fixed for the whole session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoltageFilter {
    /// Nonlinear 2-history despiking filter.
    Despike,
    /// First-order low-pass: `x = alpha * c + (1 - alpha) * prev`.
    Ema { alpha: f64 },
}

impl VoltageFilter {
    /// Filter one new raw reading `c`, advancing the channel state.
    pub fn apply(self, c: f64, state: &mut FilterState) -> f64 {
        match self {
            Self::Despike => {
                let (x, b_next, a_next) = despike(c, state.prev, state.prev_prev);
                state.prev = b_next;
                state.prev_prev = a_next;
                x
            }
            Self::Ema { alpha } => {
                let x = alpha * c + (1.0 - alpha) * state.prev;
                state.prev = x;
                x
            }
        }
    }
}

/// Despike one reading `c` against predecessors `b` (previous) and `a`
/// (two steps ago). Returns `(x, b_next, a_next)` where `(b_next, a_next)
/// = (c, b)` becomes the state for the next call.
///
/// Branch structure:
/// - `|c-b|` within the dead-band: reading is noise, hold `b`.
/// - `a == 0`: cold start, no second history sample yet, hold `b`.
/// - `|b-a|` within the dead-band: previous step was stable, hold `b`.
/// - direction reversed twice (`(a-b)(b-c) < 0`): likely a spike — take `a`,
///   or the `a`/`c` midpoint when the outer gap is small.
/// - consistent direction: take `a`.
pub fn despike(c: f64, b: f64, a: f64) -> (f64, f64, f64) {
    let x = if (c - b).abs() <= FILTER_DEAD_BAND {
        b
    } else if a == 0.0 {
        b
    } else if (b - a).abs() <= FILTER_DEAD_BAND {
        b
    } else if (a - b) * (b - c) < 0.0 {
        if (a - c).abs() > FILTER_SPIKE_GAP {
            a
        } else {
            (a + c) / 2.0
        }
    } else {
        a
    };
    (x, c, b)
}

/// Convert a filtered voltage to ppm: `(v - offset) * 1e6 / divisor`.
///
/// A zero divisor yields 0.0 (uncalibrated channel), never a division error.
pub fn voltage_to_ppm(v: f64, offset: f64, divisor: f64) -> f64 {
    if divisor == 0.0 {
        return 0.0;
    }
    (v - offset) * 1e6 / divisor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_band_holds_previous() {
        let (x, b, a) = despike(1.005, 1.0, 0.9);
        assert!((x - 1.0).abs() < f64::EPSILON);
        assert!((b - 1.005).abs() < f64::EPSILON);
        assert!((a - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cold_start_holds_previous() {
        let (x, _, _) = despike(1.5, 1.0, 0.0);
        assert!((x - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stable_previous_step_holds_previous() {
        // |b - a| = 0.005 <= dead band, but |c - b| large.
        let (x, _, _) = despike(1.5, 1.0, 0.995);
        assert!((x - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn double_reversal_with_wide_gap_takes_oldest() {
        // a=1.0, b=1.5, c=1.02: up then down, |a-c| = 0.02 > 0.009.
        let (x, _, _) = despike(1.02, 1.5, 1.0);
        assert!((x - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn double_reversal_with_narrow_gap_takes_midpoint() {
        // a=1.0, b=1.5, c=1.005: |a-c| = 0.005 <= 0.009.
        let (x, _, _) = despike(1.005, 1.5, 1.0);
        assert!((x - 1.0025).abs() < 1e-12);
    }

    #[test]
    fn consistent_trend_takes_oldest() {
        // a=1.0, b=1.2, c=1.4: (a-b)(b-c) = (-0.2)(-0.2) > 0.
        let (x, _, _) = despike(1.4, 1.2, 1.0);
        assert!((x - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn despike_converges_on_constant_input() {
        let mut state = FilterState::new();
        let filter = VoltageFilter::Despike;
        let mut x = 0.0;
        for _ in 0..3 {
            x = filter.apply(1.0, &mut state);
        }
        // By the third constant reading the dead-band holds the input value.
        assert!((x - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_converges_on_constant_input() {
        let mut state = FilterState::new();
        let filter = VoltageFilter::Ema { alpha: 0.1 };
        let mut x = 0.0;
        for _ in 0..100 {
            x = filter.apply(2.0, &mut state);
        }
        assert!((x - 2.0).abs() < 1e-3);
    }

    #[test]
    fn ema_matches_closed_form_first_step() {
        let mut state = FilterState::new();
        state.prev = 1.0;
        let x = VoltageFilter::Ema { alpha: 0.1 }.apply(2.0, &mut state);
        assert!((x - 1.1).abs() < 1e-12);
    }

    #[test]
    fn ppm_conversion_uses_offset_and_divisor() {
        let ppm = voltage_to_ppm(0.56, 0.5, 540_000.0);
        assert!((ppm - 0.111_111_111).abs() < 1e-6);
    }

    #[test]
    fn ppm_conversion_guards_zero_divisor() {
        assert!((voltage_to_ppm(1.0, 0.5, 0.0)).abs() < f64::EPSILON);
    }
}
