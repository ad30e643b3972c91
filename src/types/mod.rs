//! Core measurement types shared across the pipeline.

use serde::{Deserialize, Serialize};

// ============================================================================
// Raw Readings
// ============================================================================

/// One raw ADC read: both gas channels plus the start-switch channel.
///
/// The switch channel is carried for completeness (third ADC input on the
/// sensor head) but unused by the measurement loop — the start command has
/// replaced the physical switch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VoltageTriple {
    /// H2S cell voltage (V).
    pub h2s_v: f64,
    /// VOCs cell voltage (V).
    pub vocs_v: f64,
    /// Start switch voltage (V).
    pub switch_v: f64,
}

impl VoltageTriple {
    pub const ZERO: Self = Self {
        h2s_v: 0.0,
        vocs_v: 0.0,
        switch_v: 0.0,
    };

    pub const fn new(h2s_v: f64, vocs_v: f64, switch_v: f64) -> Self {
        Self {
            h2s_v,
            vocs_v,
            switch_v,
        }
    }
}

/// One tick's raw reading, stamped with its index and cumulative wall time.
///
/// Created once per tick and consumed immediately by the filter stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Tick index, starting at 0 and strictly increasing by 1.
    pub tick: usize,
    /// Cumulative measured wall time at the end of this tick (s).
    pub elapsed_secs: f64,
    /// Raw voltages read this tick.
    pub volts: VoltageTriple,
}

// ============================================================================
// Device Status
// ============================================================================

/// Session status reported to the backing API.
///
/// Advances monotonically: `Ready → Detecting → Measuring → Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Ready,
    Detecting,
    Measuring,
    Completed,
}

impl DeviceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Detecting => "detecting",
            Self::Measuring => "measuring",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Measurement Record
// ============================================================================

/// Final per-session record, shaped 1:1 to the backing DB schema.
///
/// Schema keys are always present (nullable columns serialize as `null`);
/// the image-analysis extras are appended only when the collaborators
/// returned payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub profile_id: Option<i64>,
    /// Device id (5 uppercase letters).
    pub gas_id: String,
    /// Run id (5 decimal digits).
    pub test_id: String,
    pub gas_version: String,
    pub h2s_abs_exposure: f64,
    /// Baseline H2S concentration subtracted when offsetting (ppm).
    pub h2s_offset_ppm: f64,
    /// Last H2S concentration in the shifted window (ppm).
    pub h2s_ppm: f64,
    pub h2s_ratio_value_pct: f64,
    /// Length of the shifted window (sample count).
    pub sort: usize,
    pub success: String,
    /// Duration of the shifted window (s).
    pub time_sec: f64,
    pub total_abs_exposure: f64,
    pub vocs_abs_exposure: f64,
    pub vocs_offset_ppm: f64,
    pub vocs_ppm: f64,
    pub vocs_ratio_value_pct: f64,
    /// Measurement completion time (ISO 8601 UTC), stamped just before upload.
    pub created_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_upload_response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_analysis: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_result_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_api_contract() {
        assert_eq!(DeviceStatus::Ready.as_str(), "ready");
        assert_eq!(DeviceStatus::Detecting.as_str(), "detecting");
        assert_eq!(DeviceStatus::Measuring.as_str(), "measuring");
        assert_eq!(DeviceStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn status_order_is_monotone() {
        assert!(DeviceStatus::Ready < DeviceStatus::Detecting);
        assert!(DeviceStatus::Detecting < DeviceStatus::Measuring);
        assert!(DeviceStatus::Measuring < DeviceStatus::Completed);
    }

    #[test]
    fn record_serializes_schema_keys_and_skips_absent_extras() {
        let record = MeasurementRecord {
            profile_id: None,
            gas_id: "FFFFF".into(),
            test_id: "00042".into(),
            gas_version: "GV.1.1".into(),
            h2s_abs_exposure: 1.5,
            h2s_offset_ppm: 0.2,
            h2s_ppm: 0.7,
            h2s_ratio_value_pct: 60.0,
            sort: 188,
            success: "Y".into(),
            time_sec: 190.0,
            total_abs_exposure: 2.5,
            vocs_abs_exposure: 1.0,
            vocs_offset_ppm: 0.1,
            vocs_ppm: 0.4,
            vocs_ratio_value_pct: 40.0,
            created_at: None,
            image_upload_response: None,
            image_analysis: None,
            image_result_url: None,
        };
        let json = serde_json::to_value(&record).expect("record should serialize");
        let obj = json.as_object().expect("record should be an object");
        assert!(obj.contains_key("profile_id"));
        assert!(obj.contains_key("time_sec"));
        assert!(obj.contains_key("created_at"));
        assert!(!obj.contains_key("image_analysis"));
        assert!(!obj.contains_key("image_result_url"));
    }
}
