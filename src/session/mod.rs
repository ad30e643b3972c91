//! Session Orchestration — one measurement run from command to record.
//!
//! Sequences the status progression `Ready → Detecting → Measuring →
//! Completed`, wires the measurement loop to its collaborators (sample
//! source, capture sink, fan, backend clients) and assembles the final
//! record. Hardware trouble never fails a commanded session: a missing
//! sample source degrades the whole run to the simulation path, and a failed
//! detection produces the simulation-shaped result instead of indexing an
//! invalid window.
//!
//! The only hard failure surfaced to the caller is a missing run id.

pub mod sim;

use crate::acquisition::SampleSource;
use crate::capture::camera::{capture_filename, capture_timestamp};
use crate::capture::CaptureSink;
use crate::config::defaults::GAS_VERSION;
use crate::config::SessionConfig;
use crate::exposure::{compute_exposure, shift_window, ExposureResult, ShiftedWindow};
use crate::hardware::{FanDriver, FanGuard};
use crate::pipeline::MeasurementLoop;
use crate::report::{ArtifactStore, RecordSink, StatusReporter};
use crate::types::{DeviceStatus, MeasurementRecord};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

/// Relative analysis-result location reported in the record.
const ANALYSIS_RESULT_BASE: &str = "image-analysis";

/// Session-level errors. Everything else degrades instead of failing.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("test_id is required (5-digit numeric string)")]
    MissingTestId,
}

// ============================================================================
// Session Identifiers
// ============================================================================

/// Normalized identifier pair for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIds {
    /// Device id: exactly 5 uppercase letters.
    pub gas_id: String,
    /// Run id: exactly 5 decimal digits.
    pub test_id: String,
}

impl SessionIds {
    /// Normalize both identifiers. The run id is required; its absence is a
    /// caller error, not something the pipeline works around.
    pub fn new(device_id: &str, test_id: Option<&str>) -> Result<Self, SessionError> {
        let test_id = test_id
            .and_then(normalize_test_id)
            .ok_or(SessionError::MissingTestId)?;
        Ok(Self {
            gas_id: normalize_gas_id(device_id),
            test_id,
        })
    }

    /// `<gas_id><test_id>`, used in capture filenames.
    pub fn composite(&self) -> String {
        format!("{}{}", self.gas_id, self.test_id)
    }
}

/// Force a device id into the 5-uppercase-letter form: strip everything
/// non-alphabetic, truncate, pad with `F`.
pub fn normalize_gas_id(raw: &str) -> String {
    let mut id: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .filter(char::is_ascii_uppercase)
        .take(5)
        .collect();
    while id.len() < 5 {
        id.push('F');
    }
    id
}

/// Force a run id into the 5-digit form: keep digits, take the last five,
/// left-pad with zeros. Returns `None` when no digits survive.
pub fn normalize_test_id(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let tail = if digits.len() > 5 {
        &digits[digits.len() - 5..]
    } else {
        digits.as_str()
    };
    Some(format!("{tail:0>5}"))
}

// ============================================================================
// Session Outcome
// ============================================================================

/// What happened to the final record upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No data API configured.
    Skipped,
    Posted,
    Failed,
}

/// Result of one orchestrated session.
#[derive(Debug)]
pub struct SessionOutcome {
    pub record: MeasurementRecord,
    /// The record came from simulation draws (no hardware, or detection
    /// failed).
    pub simulated: bool,
    pub upload: UploadOutcome,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs one measurement session end to end.
pub struct SessionOrchestrator {
    config: SessionConfig,
    ids: SessionIds,
    profile_id: Option<i64>,
    status: Option<Box<dyn StatusReporter>>,
    records: Option<Box<dyn RecordSink>>,
    artifacts: Option<Box<dyn ArtifactStore>>,
}

impl SessionOrchestrator {
    pub fn new(config: SessionConfig, ids: SessionIds, profile_id: Option<i64>) -> Self {
        Self {
            config,
            ids,
            profile_id,
            status: None,
            records: None,
            artifacts: None,
        }
    }

    pub fn with_status(mut self, reporter: Box<dyn StatusReporter>) -> Self {
        self.status = Some(reporter);
        self
    }

    pub fn with_record_sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.records = Some(sink);
        self
    }

    pub fn with_artifact_store(mut self, store: Box<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Run the session.
    ///
    /// `source = None` means hardware acquisition is unavailable: the whole
    /// session runs on the simulation path. The fan driver is only started
    /// on the real path.
    pub fn run(
        mut self,
        source: Option<Box<dyn SampleSource>>,
        capture: Option<Box<dyn CaptureSink>>,
        fan: Box<dyn FanDriver>,
        force_simulation: bool,
    ) -> SessionOutcome {
        info!(
            gas_id = %self.ids.gas_id,
            test_id = %self.ids.test_id,
            simulation = force_simulation,
            "Session starting"
        );
        self.report_status(DeviceStatus::Detecting);

        let (mut record, simulated) = match source {
            Some(mut src) if !force_simulation => self.run_hardware(&mut *src, capture, fan),
            _ => {
                if force_simulation {
                    info!("Simulation mode requested");
                } else {
                    warn!("No sample source available, degrading session to simulation");
                }
                (self.run_simulation(), true)
            }
        };

        record.created_at = Some(
            chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
        );

        let upload = self.post_record(&record);
        if upload == UploadOutcome::Posted {
            self.report_status(DeviceStatus::Completed);
        }
        info!(simulated, upload = ?upload, "Session finished");
        SessionOutcome {
            record,
            simulated,
            upload,
        }
    }

    /// Real path: fan → stabilize → baseline capture → loop → exposure →
    /// uploads → merge.
    fn run_hardware(
        &mut self,
        source: &mut dyn SampleSource,
        mut capture: Option<Box<dyn CaptureSink>>,
        fan: Box<dyn FanDriver>,
    ) -> (MeasurementRecord, bool) {
        let composite = self.ids.composite();

        let fan_guard = FanGuard::start(fan, &self.config.fan);
        let stabilize_ms = self.config.fan.stabilize_ms;
        if stabilize_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(stabilize_ms));
        }

        // Baseline shot (slot 0) before any gas excursion; never uploaded.
        if let Some(sink) = capture.as_deref_mut() {
            let timestamp = capture_timestamp();
            if let Err(e) = sink.capture(0, &composite, &timestamp) {
                warn!(error = %e, "Baseline capture failed");
            }
        }

        self.report_status(DeviceStatus::Measuring);

        let outcome = MeasurementLoop::new(&self.config, composite).run(
            source,
            capture.as_deref_mut(),
            Some(fan_guard),
        );

        let window = shift_window(
            &outcome.h2s_ppm,
            &outcome.vocs_ppm,
            &outcome.time_secs,
            outcome.onset,
            self.config.detection.baseline_window,
            self.config.sampling.extension_length,
        );

        let (mut record, simulated) = match window {
            Some(window) => {
                let result = compute_exposure(&window, self.config.detection.baseline_window);
                (self.measured_record(&window, &result), false)
            }
            None => {
                warn!(
                    onset = ?outcome.onset,
                    forced_stop = outcome.forced_stop,
                    "Detection failed, producing simulation-shaped result"
                );
                let mut rng = rand::thread_rng();
                (
                    sim::simulated_record(&mut rng, &self.ids, self.profile_id),
                    true,
                )
            }
        };

        let (upload_response, analysis) = self.upload_slots(capture.as_deref());
        record.image_upload_response = upload_response;
        record.image_analysis = analysis;
        record.image_result_url = Some(self.result_url_path());

        (record, simulated)
    }

    /// Simulation path: synthetic draws with the same output shape, plus the
    /// dummy image-analysis payload the backend expects.
    fn run_simulation(&mut self) -> MeasurementRecord {
        self.report_status(DeviceStatus::Measuring);

        let mut rng = rand::thread_rng();
        let mut record = sim::simulated_record(&mut rng, &self.ids, self.profile_id);
        let analysis = sim::simulated_image_analysis(&mut rng, &self.ids);

        let timestamp = capture_timestamp();
        let files: Vec<String> = (0u8..4)
            .map(|slot| capture_filename(&self.ids.composite(), &timestamp, slot))
            .collect();
        record.image_upload_response = Some(json!({ "files_processed": files }));
        record.image_analysis = Some(analysis.clone());
        record.image_result_url = Some(self.result_url_path());

        if let Some(records) = &self.records {
            if let Err(e) = records.post_image_analysis(&analysis) {
                warn!(error = %e, "Image-analysis record upload failed");
            }
        }
        record
    }

    /// Build the record for a successfully measured session.
    fn measured_record(
        &self,
        window: &ShiftedWindow,
        result: &ExposureResult,
    ) -> MeasurementRecord {
        MeasurementRecord {
            profile_id: self.profile_id,
            gas_id: self.ids.gas_id.clone(),
            test_id: self.ids.test_id.clone(),
            gas_version: GAS_VERSION.to_string(),
            h2s_abs_exposure: result.h2s_abs_exposure,
            h2s_offset_ppm: result.h2s_baseline_ppm,
            h2s_ppm: window.h2s_ppm.last().copied().unwrap_or(0.0),
            h2s_ratio_value_pct: result.h2s_ratio_pct,
            sort: window.h2s_ppm.len(),
            success: "Y".to_string(),
            time_sec: window.time_secs.last().copied().unwrap_or(0.0),
            total_abs_exposure: result.total_abs_exposure,
            vocs_abs_exposure: result.vocs_abs_exposure,
            vocs_offset_ppm: result.vocs_baseline_ppm,
            vocs_ppm: window.vocs_ppm.last().copied().unwrap_or(0.0),
            vocs_ratio_value_pct: result.vocs_ratio_pct,
            created_at: None,
            image_upload_response: None,
            image_analysis: None,
            image_result_url: None,
        }
    }

    /// Upload capture slots 1-3 and fetch the analysis result.
    ///
    /// Returns the last successful upload response and the analysis payload.
    /// When the result endpoint has nothing, an upload response that embeds
    /// the analysis fields stands in for it.
    fn upload_slots(&self, capture: Option<&dyn CaptureSink>) -> (Option<Value>, Option<Value>) {
        let Some(artifacts) = &self.artifacts else {
            return (None, None);
        };

        let mut last_ok: Option<Value> = None;
        if let Some(sink) = capture {
            for image in sink.captured().iter().filter(|i| (1..=3).contains(&i.slot)) {
                let filename = image.path.file_name().map_or_else(
                    || capture_filename(&self.ids.composite(), &image.timestamp, image.slot),
                    |f| f.to_string_lossy().to_string(),
                );
                match artifacts.upload_image(&image.path, &filename) {
                    Ok(resp) => {
                        last_ok = Some(resp);
                    }
                    Err(e) => {
                        warn!(slot = image.slot, filename, error = %e, "Image upload failed");
                    }
                }
            }
        }

        let analysis = artifacts
            .fetch_analysis(&self.ids.gas_id, &self.ids.test_id)
            .or_else(|| {
                last_ok
                    .as_ref()
                    .filter(|v| v.get("raw_bristol_type").is_some())
                    .cloned()
            });
        (last_ok, analysis)
    }

    fn result_url_path(&self) -> String {
        format!(
            "{ANALYSIS_RESULT_BASE}/{}/upload/{}",
            self.ids.gas_id, self.ids.test_id
        )
    }

    fn post_record(&self, record: &MeasurementRecord) -> UploadOutcome {
        match &self.records {
            None => {
                info!("No data API configured, skipping record upload");
                UploadOutcome::Skipped
            }
            Some(sink) => match sink.post_measurement(record) {
                Ok(()) => UploadOutcome::Posted,
                Err(e) => {
                    error!(error = %e, "Measurement record upload failed");
                    UploadOutcome::Failed
                }
            },
        }
    }

    fn report_status(&mut self, status: DeviceStatus) {
        if let Some(reporter) = &mut self.status {
            if let Err(e) = reporter.report(&self.ids.gas_id, status) {
                warn!(status = %status, error = %e, "Status report failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_id_is_stripped_upcased_padded_and_truncated() {
        assert_eq!(normalize_gas_id("ab1cd!e"), "ABCDE");
        assert_eq!(normalize_gas_id(""), "FFFFF");
        assert_eq!(normalize_gas_id("xy"), "XYFFF");
        assert_eq!(normalize_gas_id("abcdefgh"), "ABCDE");
        assert_eq!(normalize_gas_id("  zz9  "), "ZZFFF");
    }

    #[test]
    fn test_id_keeps_last_five_digits_zero_padded() {
        assert_eq!(normalize_test_id("42").as_deref(), Some("00042"));
        assert_eq!(normalize_test_id("1234567").as_deref(), Some("34567"));
        assert_eq!(normalize_test_id("0a0b742").as_deref(), Some("00742"));
        assert_eq!(normalize_test_id("abc"), None);
        assert_eq!(normalize_test_id(""), None);
    }

    #[test]
    fn missing_test_id_is_a_hard_error() {
        assert!(matches!(
            SessionIds::new("FFFFF", None),
            Err(SessionError::MissingTestId)
        ));
        assert!(matches!(
            SessionIds::new("FFFFF", Some("no digits")),
            Err(SessionError::MissingTestId)
        ));
    }

    #[test]
    fn composite_concatenates_both_ids() {
        let ids = SessionIds::new("abcde", Some("42")).expect("valid ids");
        assert_eq!(ids.composite(), "ABCDE00042");
    }
}
