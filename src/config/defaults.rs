//! System-wide default constants.
//!
//! Centralises the calibration and detection magic numbers inherited from the
//! deployed devices. Grouped by subsystem for easy discovery. All of these
//! can be overridden per-device via `gas_sentinel.toml`.

// ============================================================================
// Channel Calibration
// ============================================================================

/// H2S ppm conversion divisor: `ppm = (v - VOLTAGE_OFFSET) * 1e6 / divisor`.
///
/// 120 * 4500, from the sensor head calibration sheet.
pub const H2S_DIVISOR: f64 = 540_000.0;

/// VOCs ppm conversion divisor. 35 * 1800.
pub const VOCS_DIVISOR: f64 = 63_000.0;

/// Voltage subtracted before ppm conversion (sensor zero point, volts).
pub const VOLTAGE_OFFSET: f64 = 0.5;

/// EMA coefficient for the fallback low-pass filter.
pub const FILTER_ALPHA: f64 = 0.1;

// ============================================================================
// Despike Filter
// ============================================================================

/// Readings closer than this to the previous one are rejected as noise (volts).
pub const FILTER_DEAD_BAND: f64 = 0.01;

/// Spike replacement picks the older sample outright when the outer gap
/// exceeds this, and the midpoint otherwise (volts).
pub const FILTER_SPIKE_GAP: f64 = 0.009;

// ============================================================================
// Onset Detection
// ============================================================================

/// Ticks used to establish the pre-event reference level.
pub const BASELINE_WINDOW: usize = 8;

/// Ticks measured past the detected onset before the loop ends.
pub const EXTENSION_LENGTH: usize = 180;

/// Lag-1 difference threshold when no prior noise reference exists (ppm).
pub const NOISE_1_THRESHOLD: f64 = 0.006;

/// Lag-5 difference threshold when the prior lag-5 noise is low (ppm).
pub const NOISE_5_THRESHOLD: f64 = 0.01;

/// Prior lag-5 noise above this switches to the adaptive comparison (ppm).
pub const NOISE_5_THRESHOLD_HIGH: f64 = 0.015;

/// Adaptive detection fires when the new difference exceeds the historical
/// maximum by this factor.
pub const ADAPTIVE_MARGIN: f64 = 1.2;

/// Endpoint gap below which a single-sample extremum is treated as a spike
/// by the peak smoother (ppm).
pub const STABLE_THRESHOLD: f64 = 0.004;

/// Floor for the product of the two one-sided deltas in the peak smoother.
pub const PEAK_DELTA_FLOOR: f64 = 0.005;

// ============================================================================
// Measurement Loop
// ============================================================================

/// Hard iteration cap. Force-terminates a loop that never detects an onset.
pub const MAX_ITERATIONS: usize = 3000;

/// One-shot settle delay right after onset detection (ms).
pub const SETTLE_DELAY_MS: u64 = 500;

// ============================================================================
// Capture Scheduling
// ============================================================================

/// Tick offsets past the onset at which capture slots 1, 2, 3 fire.
pub const CAPTURE_OFFSETS: [usize; 3] = [30, 60, 120];

/// `libcamera-still` capture timeout (ms).
pub const CAPTURE_TIMEOUT_MS: u64 = 2000;

// ============================================================================
// Exhaust Fan
// ============================================================================

/// PWM duty cycle while the loop runs (%).
pub const FAN_DUTY_CYCLE_PCT: u8 = 100;

/// BCM pin driving the fan.
pub const FAN_PIN: u8 = 12;

/// PWM frequency (Hz).
pub const FAN_FREQUENCY_HZ: u32 = 300;

/// Wait after starting the fan before the baseline capture (ms).
pub const FAN_STABILIZE_MS: u64 = 1000;

// ============================================================================
// Backend API
// ============================================================================

/// Measurement record POST path on the data API.
pub const MEASUREMENT_PATH: &str = "/mqtt/api/v1/measurement";

/// Device status GET/POST/PATCH path on the data API.
pub const DEVICE_STATUS_PATH: &str = "/mqtt/api/v1/device/status";

/// Image-analysis record POST path on the data API.
pub const IMAGE_ANALYSIS_PATH: &str = "/mqtt/api/v1/image_analysis";

/// HTTP client timeout for all backend requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 15;

/// Record version stamp for real measurements.
pub const GAS_VERSION: &str = "GV.1.1";

/// Record version stamp for simulated measurements.
pub const GAS_VERSION_SIMULATION: &str = "0.0.1";
