//! Session Configuration
//!
//! Provides per-device configuration loaded from TOML files, replacing the
//! scattered environment-variable constants of earlier firmware with typed,
//! operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `GAS_SENTINEL_CONFIG` environment variable (path to TOML file)
//! 2. `gas_sentinel.toml` in the current working directory
//! 3. Built-in defaults (matching the deployed calibration values)
//!
//! The loaded [`SessionConfig`] is passed by value into the session at start.
//! There is deliberately no process-global config: concurrent sessions (for
//! instance in tests) must never share mutable tuning state.

pub mod defaults;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration for one measurement session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub calibration: CalibrationConfig,
    pub detection: DetectionConfig,
    pub sampling: SamplingConfig,
    pub capture: CaptureConfig,
    pub fan: FanConfig,
    pub api: ApiConfig,
}

impl SessionConfig {
    /// Load configuration from the standard locations, falling back to
    /// built-in defaults when no file is present.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("GAS_SENTINEL_CONFIG") {
            return Self::load_from(Path::new(&path));
        }
        let cwd_path = Path::new("gas_sentinel.toml");
        if cwd_path.exists() {
            return Self::load_from(cwd_path);
        }
        tracing::info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Load configuration from a specific TOML file.
    ///
    /// A missing or malformed file logs a warning and yields defaults; a
    /// broken config must never prevent a commanded measurement from running.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded session config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Malformed config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read config, using defaults");
                Self::default()
            }
        }
    }
}

// ============================================================================
// Channel Calibration
// ============================================================================

/// Voltage-to-ppm conversion and filter strategy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// H2S ppm divisor.
    pub h2s_divisor: f64,
    /// VOCs ppm divisor.
    pub vocs_divisor: f64,
    /// Sensor zero point subtracted before conversion (volts).
    pub voltage_offset: f64,
    /// Use the nonlinear despiking filter. When `false`, readings go through
    /// the plain EMA low-pass instead.
    pub despike: bool,
    /// EMA coefficient for the fallback filter.
    pub filter_alpha: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            h2s_divisor: defaults::H2S_DIVISOR,
            vocs_divisor: defaults::VOCS_DIVISOR,
            voltage_offset: defaults::VOLTAGE_OFFSET,
            despike: true,
            filter_alpha: defaults::FILTER_ALPHA,
        }
    }
}

// ============================================================================
// Onset Detection
// ============================================================================

/// Thresholds for the rolling-noise onset detector and the peak smoother.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Ticks used to establish the pre-event reference level.
    pub baseline_window: usize,
    /// Lag-1 difference threshold (ppm).
    pub noise_1_threshold: f64,
    /// Lag-5 difference threshold (ppm).
    pub noise_5_threshold: f64,
    /// Prior lag-5 noise above this switches to adaptive comparison (ppm).
    pub noise_5_threshold_high: f64,
    /// Peak smoother endpoint gap (ppm).
    pub stable_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            baseline_window: defaults::BASELINE_WINDOW,
            noise_1_threshold: defaults::NOISE_1_THRESHOLD,
            noise_5_threshold: defaults::NOISE_5_THRESHOLD,
            noise_5_threshold_high: defaults::NOISE_5_THRESHOLD_HIGH,
            stable_threshold: defaults::STABLE_THRESHOLD,
        }
    }
}

// ============================================================================
// Measurement Loop
// ============================================================================

/// Loop termination and pacing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Ticks measured past the detected onset before the loop ends.
    pub extension_length: usize,
    /// Hard iteration cap (safety valve, not a normal exit).
    pub max_iterations: usize,
    /// One-shot settle delay right after onset detection (ms).
    pub settle_delay_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            extension_length: defaults::EXTENSION_LENGTH,
            max_iterations: defaults::MAX_ITERATIONS,
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
        }
    }
}

// ============================================================================
// Capture Scheduling
// ============================================================================

/// Camera trigger offsets and shell-out parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Tick offsets past the onset for slots 1, 2, 3 (ascending).
    pub offsets: [usize; 3],
    /// `libcamera-still` timeout (ms).
    pub timeout_ms: u64,
    /// Pass `--autofocus-on-capture` to the camera binary.
    pub autofocus: bool,
    /// Directory captured JPEGs are written to. Empty string means the
    /// current working directory.
    pub work_dir: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            offsets: defaults::CAPTURE_OFFSETS,
            timeout_ms: defaults::CAPTURE_TIMEOUT_MS,
            autofocus: true,
            work_dir: String::new(),
        }
    }
}

// ============================================================================
// Exhaust Fan
// ============================================================================

/// PWM parameters for the exhaust fan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    pub duty_cycle_pct: u8,
    pub pin: u8,
    pub frequency_hz: u32,
    /// Wait after starting the fan before the baseline capture (ms).
    pub stabilize_ms: u64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            duty_cycle_pct: defaults::FAN_DUTY_CYCLE_PCT,
            pin: defaults::FAN_PIN,
            frequency_hz: defaults::FAN_FREQUENCY_HZ,
            stabilize_ms: defaults::FAN_STABILIZE_MS,
        }
    }
}

// ============================================================================
// Backend API
// ============================================================================

/// Endpoints for status reporting, record upload and image analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Data API base URL. `None` disables all status/measurement reporting.
    pub data_api_url: Option<String>,
    pub measurement_path: String,
    pub device_status_path: String,
    pub image_analysis_path: String,
    /// Image upload server URL. `None` disables slot uploads.
    pub image_upload_url: Option<String>,
    /// Analysis result base URL (`{base}/{gas_id}/upload/{test_id}`).
    /// `None` means only an analysis payload embedded in the upload response
    /// is used.
    pub image_analysis_result_url: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            data_api_url: None,
            measurement_path: defaults::MEASUREMENT_PATH.to_string(),
            device_status_path: defaults::DEVICE_STATUS_PATH.to_string(),
            image_analysis_path: defaults::IMAGE_ANALYSIS_PATH.to_string(),
            image_upload_url: None,
            image_analysis_result_url: None,
            http_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}
