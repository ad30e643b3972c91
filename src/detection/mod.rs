//! Onset Detection — rolling noise metrics and the one-shot event flag.
//!
//! The detector watches the primary (H2S) concentration series through two
//! rolling difference sequences: lag-1 (tick-to-tick) and lag-5 (five ticks
//! back). Each attempt compares the newest difference either against a fixed
//! threshold (quiet history) or against 1.2x the historical maximum (noisy
//! history). Detection is one-shot per session: once the onset tick is set it
//! is frozen and all further calls are skipped.
//!
//! Both the lag-1 and lag-5 checks run on every attempt, and a lag-5 match
//! overwrites a lag-1 match made in the same call — including their slightly
//! different onset arithmetic. This order dependence is inherited from the
//! field-proven detector and is preserved as-is (see DESIGN.md).

use crate::config::defaults::{ADAPTIVE_MARGIN, NOISE_1_THRESHOLD};
use crate::config::DetectionConfig;
use thiserror::Error;

/// Detection state errors.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The one-shot onset flag was asked to transition twice. Re-detection
    /// is a programming error, not a recoverable condition.
    #[error("onset already detected at tick {existing}, attempted re-detection at tick {attempted}")]
    AlreadyDetected { existing: usize, attempted: usize },
}

// ============================================================================
// Noise Metrics
// ============================================================================

/// Rolling detection inputs: absolute lag-1 and lag-5 differences of the
/// concentration series. Append-only until the onset is detected, then
/// frozen and unused.
#[derive(Debug, Clone)]
pub struct NoiseMetrics {
    /// `|ppm[t] - ppm[t-1]|`, appended from tick 2 onward (seeded with one 0).
    pub lag1: Vec<f64>,
    /// `|ppm[t] - ppm[t-5]|`, appended from tick 5 onward (seeded with four
    /// placeholder zeros).
    pub lag5: Vec<f64>,
}

impl NoiseMetrics {
    pub fn new() -> Self {
        Self {
            lag1: vec![0.0],
            lag5: vec![0.0; 4],
        }
    }
}

impl Default for NoiseMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Onset State
// ============================================================================

/// One-shot detection flag: `Undetected -> Detected` is the only legal
/// transition and happens at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnsetState {
    Undetected,
    Detected { tick: usize },
}

impl OnsetState {
    /// Transition to `Detected`. Re-detection is rejected with an error so
    /// the invariant stays enforceable and testable.
    pub fn detect(&mut self, tick: usize) -> Result<(), DetectionError> {
        match *self {
            Self::Undetected => {
                *self = Self::Detected { tick };
                Ok(())
            }
            Self::Detected { tick: existing } => Err(DetectionError::AlreadyDetected {
                existing,
                attempted: tick,
            }),
        }
    }

    pub const fn onset(&self) -> Option<usize> {
        match *self {
            Self::Undetected => None,
            Self::Detected { tick } => Some(tick),
        }
    }

    pub const fn is_detected(&self) -> bool {
        matches!(self, Self::Detected { .. })
    }
}

// ============================================================================
// Onset Detector
// ============================================================================

/// Adaptive dual-lag onset detector over the primary concentration series.
#[derive(Debug)]
pub struct OnsetDetector {
    config: DetectionConfig,
    metrics: NoiseMetrics,
    state: OnsetState,
}

impl OnsetDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            metrics: NoiseMetrics::new(),
            state: OnsetState::Undetected,
        }
    }

    /// Detected onset tick, if any. Immutable once set.
    pub const fn onset(&self) -> Option<usize> {
        self.state.onset()
    }

    pub const fn is_detected(&self) -> bool {
        self.state.is_detected()
    }

    /// Read-only view of the rolling metrics (diagnostics, tests).
    pub const fn metrics(&self) -> &NoiseMetrics {
        &self.metrics
    }

    /// Observe the series through `tick` (`series[tick]` must be the newest
    /// value). Appends the rolling differences, then attempts detection once
    /// the baseline window has passed. Returns the onset tick when this call
    /// detected it.
    ///
    /// Calls before tick 2 or after detection are skipped entirely.
    pub fn observe(&mut self, tick: usize, series: &[f64]) -> Option<usize> {
        if self.state.is_detected() || tick <= 1 {
            return None;
        }

        self.metrics.lag1.push((series[tick] - series[tick - 1]).abs());
        if tick > 4 {
            self.metrics.lag5.push((series[tick] - series[tick - 5]).abs());
        }

        // Baseline still accumulating: no detection attempted yet.
        if tick <= self.config.baseline_window {
            return None;
        }

        let t = tick - 1;
        let mut candidate: Option<usize> = None;

        // Lag-1 check. The branch gate is the fixed factory threshold; only
        // the quiet-history comparison threshold is operator-tunable.
        let max1 = rolling_max(&self.metrics.lag1, t);
        if max1 > NOISE_1_THRESHOLD {
            if self.metrics.lag1[t] > max1 * ADAPTIVE_MARGIN {
                candidate = Some(tick - 2);
            }
        } else if self.metrics.lag1[t] > self.config.noise_1_threshold {
            candidate = Some(t - 2);
        }

        // Lag-5 check. Runs unconditionally and may overwrite the lag-1
        // candidate set just above.
        let max5 = rolling_max(&self.metrics.lag5, t);
        if max5 > self.config.noise_5_threshold_high {
            if self.metrics.lag5[t] > max5 * ADAPTIVE_MARGIN {
                candidate = Some(tick - 2);
            }
        } else if self.metrics.lag5[t] > self.config.noise_5_threshold {
            candidate = Some(tick - 2);
        }

        if let Some(onset) = candidate {
            if let Err(e) = self.state.detect(onset) {
                tracing::error!(error = %e, "onset transition rejected");
                return None;
            }
            tracing::info!(onset, tick, "Event onset detected");
            return Some(onset);
        }
        None
    }
}

/// Maximum of `values[0..t-2]`, or 0 when the window is still too short.
/// The sequences are non-negative by construction.
fn rolling_max(values: &[f64], t: usize) -> f64 {
    if t > 2 {
        values[..t - 2].iter().fold(0.0, |m, &v| m.max(v))
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(baseline_window: usize) -> OnsetDetector {
        OnsetDetector::new(DetectionConfig {
            baseline_window,
            ..DetectionConfig::default()
        })
    }

    /// Feed a full series tick by tick; return the first detection.
    fn run(series: &[f64], baseline_window: usize) -> Option<usize> {
        let mut det = detector(baseline_window);
        for tick in 2..series.len() {
            if let Some(onset) = det.observe(tick, &series[..=tick]) {
                return Some(onset);
            }
        }
        None
    }

    #[test]
    fn quiet_series_never_detects() {
        let series = vec![0.1; 40];
        assert_eq!(run(&series, 8), None);
    }

    #[test]
    fn no_detection_inside_baseline_window() {
        // A large step at tick 5 is ignored while the baseline accumulates.
        let mut det = detector(8);
        let series = [0.0, 0.0, 0.0, 0.0, 0.0, 0.5];
        for tick in 2..=5 {
            assert_eq!(det.observe(tick, &series[..=tick]), None);
        }
    }

    #[test]
    fn step_at_tick_10_detects_onset_8() {
        // Flat baseline, first lag-1 excursion at tick 10 large enough to
        // trip both checks: the lag-5 overwrite lands the onset at tick - 2.
        let mut series = vec![0.0; 10];
        series.push(0.02);
        series.push(0.02);
        assert_eq!(run(&series, 8), Some(8));
    }

    #[test]
    fn lag1_only_detection_uses_t_minus_2() {
        // A 0.008 step trips the lag-1 quiet threshold (0.006) but stays
        // under the lag-5 one (0.01), so the lag-1 arithmetic survives.
        let mut series = vec![0.0; 10];
        series.push(0.008);
        series.push(0.008);
        assert_eq!(run(&series, 8), Some(7));
    }

    #[test]
    fn adaptive_lag1_branch_detects_against_noisy_history() {
        // Oscillating history keeps max1 at 0.008 (> factory gate), so the
        // tick-10 jump must exceed 1.2 * 0.008. Values are chosen so the
        // lag-5 check stays silent and cannot overwrite.
        let series = [
            0.0, 0.0, 0.008, 0.0, 0.008, 0.008, 0.008, 0.0, 0.008, 0.008, 0.018,
        ];
        assert_eq!(run(&series, 8), Some(8));
    }

    #[test]
    fn onset_is_frozen_after_detection() {
        let mut series = vec![0.0; 10];
        series.extend_from_slice(&[0.02, 0.5, 1.0, 0.0, 2.0]);
        let mut det = detector(8);
        let mut first = None;
        for tick in 2..series.len() {
            if let Some(onset) = det.observe(tick, &series[..=tick]) {
                first = Some(onset);
            }
        }
        assert_eq!(first, Some(8));
        assert_eq!(det.onset(), Some(8));
    }

    #[test]
    fn metrics_freeze_after_detection() {
        let mut series = vec![0.0; 10];
        series.extend_from_slice(&[0.02, 0.9, 0.9]);
        let mut det = detector(8);
        for tick in 2..series.len() {
            det.observe(tick, &series[..=tick]);
        }
        // Appends stop at the detecting call (tick 10).
        assert_eq!(det.metrics().lag1.len(), 10);
    }

    #[test]
    fn explicit_re_detection_is_an_error() {
        let mut state = OnsetState::Undetected;
        state.detect(8).expect("first detection must succeed");
        let err = state.detect(9).expect_err("re-detection must be rejected");
        assert!(matches!(
            err,
            DetectionError::AlreadyDetected {
                existing: 8,
                attempted: 9
            }
        ));
    }
}
