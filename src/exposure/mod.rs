//! Exposure Integration — post-loop batch computation of absolute exposure
//! and channel ratios over the baseline-relative window.
//!
//! Runs exactly once after the measurement loop ends. The series is first
//! shifted so it starts `baseline_window` ticks before the onset, the time
//! axis is re-zeroed, then each channel is offset against its baseline value
//! and integrated with the trapezoidal rule.

use serde::{Deserialize, Serialize};

/// Concentration series and time axis shifted to `onset - baseline_window`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftedWindow {
    pub h2s_ppm: Vec<f64>,
    pub vocs_ppm: Vec<f64>,
    /// Seconds, re-zeroed to the window start.
    pub time_secs: Vec<f64>,
}

/// Final exposure metrics for one session. Computed once, immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureResult {
    /// Time-integral of the absolute H2S offset series (ppm*s).
    pub h2s_abs_exposure: f64,
    /// Time-integral of the absolute VOCs offset series (ppm*s).
    pub vocs_abs_exposure: f64,
    pub total_abs_exposure: f64,
    /// H2S share of the total exposure (%), 0 when the total is 0.
    pub h2s_ratio_pct: f64,
    /// VOCs share of the total exposure (%), 0 when the total is 0.
    pub vocs_ratio_pct: f64,
    /// Concentration at the baseline-window boundary (ppm).
    pub h2s_baseline_ppm: f64,
    pub vocs_baseline_ppm: f64,
    /// `|ppm - baseline|` per shifted index, zero before the boundary.
    pub h2s_offset_abs: Vec<f64>,
    pub vocs_offset_abs: Vec<f64>,
}

impl ExposureResult {
    /// All-zero result used when no meaningful exposure exists.
    pub fn degenerate(len: usize) -> Self {
        Self {
            h2s_abs_exposure: 0.0,
            vocs_abs_exposure: 0.0,
            total_abs_exposure: 0.0,
            h2s_ratio_pct: 0.0,
            vocs_ratio_pct: 0.0,
            h2s_baseline_ppm: 0.0,
            vocs_baseline_ppm: 0.0,
            h2s_offset_abs: vec![0.0; len],
            vocs_offset_abs: vec![0.0; len],
        }
    }
}

/// Shift the series and time axis to start at `onset - baseline_window`.
///
/// Returns `None` when the window is invalid — onset missing, onset inside
/// the baseline window, or the post-onset extension running past the series
/// end. Callers treat `None` as "detection failed" and fall back to the
/// degenerate result; nothing here ever indexes out of range.
pub fn shift_window(
    h2s_ppm: &[f64],
    vocs_ppm: &[f64],
    time_secs: &[f64],
    onset: Option<usize>,
    baseline_window: usize,
    extension_length: usize,
) -> Option<ShiftedWindow> {
    let onset = onset?;
    if onset < baseline_window || onset + extension_length > h2s_ppm.len() {
        return None;
    }
    let start = onset - baseline_window;
    let t0 = time_secs[start];
    Some(ShiftedWindow {
        h2s_ppm: h2s_ppm[start..].to_vec(),
        vocs_ppm: vocs_ppm[start..].to_vec(),
        time_secs: time_secs[start..].iter().map(|t| t - t0).collect(),
    })
}

/// Compute baseline, offset series, absolute exposures and ratios over a
/// shifted window.
///
/// A window no longer than the baseline itself yields the degenerate result.
pub fn compute_exposure(window: &ShiftedWindow, baseline_window: usize) -> ExposureResult {
    let n = window.h2s_ppm.len();
    if n <= baseline_window {
        return ExposureResult::degenerate(n);
    }

    let h2s_baseline = window.h2s_ppm[baseline_window];
    let vocs_baseline = window.vocs_ppm[baseline_window];

    let h2s_offset_abs = offset_abs(&window.h2s_ppm, baseline_window, h2s_baseline);
    let vocs_offset_abs = offset_abs(&window.vocs_ppm, baseline_window, vocs_baseline);

    let h2s_exposure = trapezoid(&h2s_offset_abs, &window.time_secs);
    let vocs_exposure = trapezoid(&vocs_offset_abs, &window.time_secs);
    let total = h2s_exposure + vocs_exposure;

    let (h2s_ratio, vocs_ratio) = if total == 0.0 {
        (0.0, 0.0)
    } else {
        (100.0 * h2s_exposure / total, 100.0 * vocs_exposure / total)
    };

    ExposureResult {
        h2s_abs_exposure: h2s_exposure,
        vocs_abs_exposure: vocs_exposure,
        total_abs_exposure: total,
        h2s_ratio_pct: h2s_ratio,
        vocs_ratio_pct: vocs_ratio,
        h2s_baseline_ppm: h2s_baseline,
        vocs_baseline_ppm: vocs_baseline,
        h2s_offset_abs,
        vocs_offset_abs,
    }
}

/// Absolute baseline-relative offsets: zero before the boundary index,
/// `|v[i] - baseline|` from it onward.
fn offset_abs(series: &[f64], boundary: usize, baseline: f64) -> Vec<f64> {
    let mut out = vec![0.0; boundary];
    out.extend(series[boundary..].iter().map(|v| (v - baseline).abs()));
    out
}

/// Trapezoidal integral of `y` over the (not necessarily uniform) axis `x`.
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 1..y.len().min(x.len()) {
        sum += (x[i] - x[i - 1]) * (y[i] + y[i - 1]) / 2.0;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trapezoid_matches_hand_computation() {
        // Unit steps: areas 0.5, 1.5, 2.5.
        let y = [0.0, 1.0, 2.0, 3.0];
        let x = [0.0, 1.0, 2.0, 3.0];
        assert!((trapezoid(&y, &x) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn trapezoid_handles_nonuniform_axis() {
        let y = [1.0, 1.0];
        let x = [0.0, 2.5];
        assert!((trapezoid(&y, &x) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn shift_rejects_onset_inside_baseline_window() {
        // Scenario: onset < baseline_window must not index out of range.
        let series = vec![0.0; 40];
        let time: Vec<f64> = (0..40).map(|i| i as f64).collect();
        assert!(shift_window(&series, &series, &time, Some(5), 8, 20).is_none());
    }

    #[test]
    fn shift_rejects_extension_past_series_end() {
        let series = vec![0.0; 40];
        let time: Vec<f64> = (0..40).map(|i| i as f64).collect();
        assert!(shift_window(&series, &series, &time, Some(30), 8, 20).is_none());
        assert!(shift_window(&series, &series, &time, None, 8, 20).is_none());
    }

    #[test]
    fn shift_rezeroes_time_axis() {
        let series: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let time: Vec<f64> = (0..30).map(|i| 2.0 * i as f64).collect();
        let window =
            shift_window(&series, &series, &time, Some(10), 8, 15).expect("valid window");
        assert!((window.time_secs[0]).abs() < f64::EPSILON);
        assert!((window.time_secs[1] - 2.0).abs() < f64::EPSILON);
        assert_eq!(window.h2s_ppm.len(), 28);
        assert!((window.h2s_ppm[0] - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn exposure_matches_hand_computation() {
        let window = ShiftedWindow {
            h2s_ppm: vec![1.0, 1.0, 1.0, 3.0, 5.0],
            vocs_ppm: vec![2.0, 2.0, 2.0, 2.0, 2.0],
            time_secs: vec![0.0, 1.0, 2.0, 3.0, 4.0],
        };
        let result = compute_exposure(&window, 2);
        // H2S offsets: [0, 0, 0, 2, 4] -> trapezoid 0 + 1 + 3 = 4.
        assert!((result.h2s_abs_exposure - 4.0).abs() < 1e-12);
        assert!((result.vocs_abs_exposure).abs() < f64::EPSILON);
        assert!((result.total_abs_exposure - 4.0).abs() < 1e-12);
        assert!((result.h2s_ratio_pct - 100.0).abs() < 1e-12);
        assert!((result.vocs_ratio_pct).abs() < f64::EPSILON);
        assert!((result.h2s_baseline_ppm - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_excursions_still_accumulate_exposure() {
        let window = ShiftedWindow {
            h2s_ppm: vec![1.0, 1.0, 1.0, -1.0, -3.0],
            vocs_ppm: vec![0.0; 5],
            time_secs: vec![0.0, 1.0, 2.0, 3.0, 4.0],
        };
        let result = compute_exposure(&window, 2);
        assert!(result.h2s_abs_exposure > 0.0);
        assert!(result.total_abs_exposure >= 0.0);
    }

    #[test]
    fn zero_total_exposure_means_zero_ratios() {
        let window = ShiftedWindow {
            h2s_ppm: vec![1.0; 10],
            vocs_ppm: vec![2.0; 10],
            time_secs: (0..10).map(|i| i as f64).collect(),
        };
        let result = compute_exposure(&window, 4);
        assert!((result.total_abs_exposure).abs() < f64::EPSILON);
        assert!((result.h2s_ratio_pct).abs() < f64::EPSILON);
        assert!((result.vocs_ratio_pct).abs() < f64::EPSILON);
    }

    #[test]
    fn short_window_degenerates() {
        let window = ShiftedWindow {
            h2s_ppm: vec![1.0, 2.0],
            vocs_ppm: vec![1.0, 2.0],
            time_secs: vec![0.0, 1.0],
        };
        let result = compute_exposure(&window, 2);
        assert_eq!(result, ExposureResult::degenerate(2));
        assert_eq!(result.h2s_offset_abs.len(), 2);
    }
}
