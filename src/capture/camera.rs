//! Camera shell-out sink.
//!
//! Captures stills by invoking `libcamera-still`, the same binary the device
//! uses for its connection check. Files are written into the work directory
//! as `<composite_id>-<timestamp>-<slot>.jpg`; slot 0 is the pre-loop
//! baseline shot, slots 1-3 come from the capture schedule.

use super::{CaptureError, CaptureSink, CapturedImage};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Camera binary invoked for captures.
const CAMERA_BINARY: &str = "libcamera-still";

/// Current wall time formatted for capture filenames (`%Y%m%d%H%M%S`).
pub fn capture_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Build the capture filename for one slot.
pub fn capture_filename(composite_id: &str, timestamp: &str, slot: u8) -> String {
    format!("{composite_id}-{timestamp}-{slot}.jpg")
}

/// Shells out to `libcamera-still` and records every captured image.
pub struct CameraSink {
    work_dir: PathBuf,
    timeout_ms: u64,
    autofocus: bool,
    captured: Vec<CapturedImage>,
}

impl CameraSink {
    pub fn new(work_dir: PathBuf, timeout_ms: u64, autofocus: bool) -> Self {
        Self {
            work_dir,
            timeout_ms,
            autofocus,
            captured: Vec::new(),
        }
    }

    /// Run the camera binary once, writing to `path`.
    fn capture_to_file(&self, path: &Path) -> Result<(), CaptureError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut command = Command::new(CAMERA_BINARY);
        command.arg("-t").arg(self.timeout_ms.to_string());
        if self.autofocus {
            command.arg("--autofocus-on-capture");
        }
        command.arg("-o").arg(path);

        let status = command.status()?;
        if !status.success() {
            return Err(CaptureError::CommandFailed { status });
        }
        if !path.is_file() {
            return Err(CaptureError::OutputMissing {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

impl CaptureSink for CameraSink {
    fn capture(
        &mut self,
        slot: u8,
        composite_id: &str,
        timestamp: &str,
    ) -> Result<(), CaptureError> {
        let filename = capture_filename(composite_id, timestamp, slot);
        let path = self.work_dir.join(&filename);
        self.capture_to_file(&path)?;
        tracing::info!(slot, file = %path.display(), "Captured image");
        self.captured.push(CapturedImage {
            slot,
            timestamp: timestamp.to_string(),
            path,
        });
        Ok(())
    }

    fn captured(&self) -> &[CapturedImage] {
        &self.captured
    }
}
