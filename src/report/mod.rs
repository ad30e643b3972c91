//! Backend collaborators: device status reporting, measurement record
//! upload, image upload and analysis retrieval.
//!
//! Every collaborator sits behind a narrow trait so the orchestrator (and
//! the tests) never depend on the wire. The HTTP implementations use a
//! blocking reqwest client with a shared timeout; failures are returned to
//! the orchestrator, which logs them and carries on — no collaborator
//! failure may kill a measurement.

use crate::config::ApiConfig;
use crate::types::{DeviceStatus, MeasurementRecord};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Collaborator client errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("collaborator not configured: {0}")]
    NotConfigured(&'static str),
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Receives session status transitions (`ready → detecting → measuring →
/// completed`). Failures are logged by the caller, never fatal.
pub trait StatusReporter {
    fn report(&mut self, gas_id: &str, status: DeviceStatus) -> Result<(), ReportError>;
}

/// Receives the final measurement record and the (simulated) image-analysis
/// payload.
pub trait RecordSink {
    fn post_measurement(&self, record: &MeasurementRecord) -> Result<(), ReportError>;
    fn post_image_analysis(&self, payload: &Value) -> Result<(), ReportError>;
}

/// Uploads captured images and retrieves the analysis result.
pub trait ArtifactStore {
    /// Upload one JPEG; returns the server's response payload.
    fn upload_image(&self, path: &Path, filename: &str) -> Result<Value, ReportError>;

    /// Fetch the analysis result for a session, if the result endpoint is
    /// configured and has one.
    fn fetch_analysis(&self, gas_id: &str, test_id: &str) -> Option<Value>;
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn build_http(timeout_secs: u64) -> Result<reqwest::blocking::Client, ReportError> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ============================================================================
// Device Status
// ============================================================================

/// HTTP status reporter against the data API.
///
/// The first transition ensures the device record exists (`GET ?gas_id=`,
/// `POST` a `ready` record when missing), then every transition is a
/// `PATCH`.
pub struct StatusClient {
    http: reqwest::blocking::Client,
    base_url: String,
    status_path: String,
    ensured: bool,
}

impl StatusClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ReportError> {
        let base_url = config
            .data_api_url
            .clone()
            .ok_or(ReportError::NotConfigured("data_api_url"))?;
        Ok(Self {
            http: build_http(config.http_timeout_secs)?,
            base_url,
            status_path: config.device_status_path.clone(),
            ensured: false,
        })
    }

    fn status_url(&self) -> String {
        join_url(&self.base_url, &self.status_path)
    }

    fn exists(&self, gas_id: &str) -> Result<bool, ReportError> {
        let resp = self
            .http
            .get(self.status_url())
            .query(&[("gas_id", gas_id)])
            .send()?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let body: Value = resp.json()?;
        Ok(body.get("exists").and_then(Value::as_bool).unwrap_or(false))
    }

    fn create(&self, gas_id: &str, status: DeviceStatus) -> Result<(), ReportError> {
        let resp = self
            .http
            .post(self.status_url())
            .json(&serde_json::json!({ "gas_id": gas_id, "status": status }))
            .send()?;
        expect_success(resp.status())
    }

    fn update(&self, gas_id: &str, status: DeviceStatus) -> Result<(), ReportError> {
        let resp = self
            .http
            .patch(self.status_url())
            .json(&serde_json::json!({ "gas_id": gas_id, "status": status }))
            .send()?;
        expect_success(resp.status())
    }
}

impl StatusReporter for StatusClient {
    fn report(&mut self, gas_id: &str, status: DeviceStatus) -> Result<(), ReportError> {
        if !self.ensured {
            self.ensured = true;
            if !self.exists(gas_id)? {
                self.create(gas_id, DeviceStatus::Ready)?;
            }
        }
        self.update(gas_id, status)?;
        tracing::info!(gas_id, status = %status, "Device status reported");
        Ok(())
    }
}

// ============================================================================
// Measurement Records
// ============================================================================

/// HTTP record sink for the measurement and image-analysis endpoints.
pub struct MeasurementClient {
    http: reqwest::blocking::Client,
    base_url: String,
    measurement_path: String,
    image_analysis_path: String,
}

impl MeasurementClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ReportError> {
        let base_url = config
            .data_api_url
            .clone()
            .ok_or(ReportError::NotConfigured("data_api_url"))?;
        Ok(Self {
            http: build_http(config.http_timeout_secs)?,
            base_url,
            measurement_path: config.measurement_path.clone(),
            image_analysis_path: config.image_analysis_path.clone(),
        })
    }
}

impl RecordSink for MeasurementClient {
    fn post_measurement(&self, record: &MeasurementRecord) -> Result<(), ReportError> {
        let url = join_url(&self.base_url, &self.measurement_path);
        let resp = self.http.post(&url).json(record).send()?;
        let status = resp.status();
        if status.is_success() {
            tracing::info!(%url, "Measurement record posted");
            Ok(())
        } else {
            Err(ReportError::ServerError(status))
        }
    }

    fn post_image_analysis(&self, payload: &Value) -> Result<(), ReportError> {
        let url = join_url(&self.base_url, &self.image_analysis_path);
        let resp = self.http.post(&url).json(payload).send()?;
        expect_success(resp.status())
    }
}

// ============================================================================
// Image Upload / Analysis
// ============================================================================

/// HTTP artifact store for the image server.
pub struct ImageClient {
    http: reqwest::blocking::Client,
    upload_url: String,
    analysis_base_url: Option<String>,
}

impl ImageClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ReportError> {
        let upload_url = config
            .image_upload_url
            .clone()
            .ok_or(ReportError::NotConfigured("image_upload_url"))?;
        Ok(Self {
            http: build_http(config.http_timeout_secs)?,
            upload_url: upload_url.trim_end_matches('/').to_string(),
            analysis_base_url: config
                .image_analysis_result_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
        })
    }
}

impl ArtifactStore for ImageClient {
    fn upload_image(&self, path: &Path, filename: &str) -> Result<Value, ReportError> {
        let bytes = std::fs::read(path)?;
        let part = reqwest::blocking::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")?;
        let form = reqwest::blocking::multipart::Form::new().part("file", part);

        let resp = self.http.post(&self.upload_url).multipart(form).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ReportError::ServerError(status));
        }
        let body: Value = resp.json()?;
        tracing::info!(filename, "Image uploaded");
        Ok(body)
    }

    fn fetch_analysis(&self, gas_id: &str, test_id: &str) -> Option<Value> {
        let base = self.analysis_base_url.as_ref()?;
        let url = format!("{base}/{gas_id}/upload/{test_id}");
        match self.http.get(&url).send() {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>() {
                Ok(body) if body.is_object() => Some(body),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "Analysis response was not JSON");
                    None
                }
            },
            Ok(resp) => {
                tracing::warn!(%url, status = %resp.status(), "Analysis fetch rejected");
                None
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "Analysis fetch failed");
                None
            }
        }
    }
}

fn expect_success(status: reqwest::StatusCode) -> Result<(), ReportError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ReportError::ServerError(status))
    }
}
