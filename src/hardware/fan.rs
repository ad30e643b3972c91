//! Exhaust fan control.
//!
//! The fan keeps air moving over the sensor cells for the duration of the
//! measurement loop. Driving the PWM pin is a platform concern behind the
//! [`FanDriver`] trait; without hardware the [`NullFan`] no-op driver is
//! used. What this module guarantees is the lifecycle: a [`FanGuard`] stops
//! the fan exactly once on every exit path — normal termination, cap-forced
//! termination, or unwind — via `Drop`.
//!
//! A guard is either `Owned` (this session started the fan and also releases
//! the pin claim on stop) or `Adopted` (the caller started the fan and keeps
//! the pin claim; the guard still stops the rotation when the loop ends).

use crate::config::FanConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FanError {
    #[error("fan hardware unavailable: {0}")]
    Unavailable(String),
}

/// PWM fan driver contract. Both operations are best-effort: absence of
/// hardware must behave as a successful no-op.
pub trait FanDriver: Send {
    fn start(&mut self, duty_pct: u8, pin: u8, frequency_hz: u32) -> Result<(), FanError>;
    fn stop(&mut self) -> Result<(), FanError>;
    /// Drop the pin claim (drive low, free the PWM channel). Only owning
    /// guards call this.
    fn release(&mut self) -> Result<(), FanError>;
}

/// No-op driver for platforms without fan hardware.
#[derive(Debug, Default)]
pub struct NullFan;

impl FanDriver for NullFan {
    fn start(&mut self, _duty_pct: u8, _pin: u8, _frequency_hz: u32) -> Result<(), FanError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), FanError> {
        Ok(())
    }

    fn release(&mut self) -> Result<(), FanError> {
        Ok(())
    }
}

/// Who started the fan, and therefore how far teardown goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOwnership {
    /// This guard started the fan: stop it and release the pin claim.
    Owned,
    /// The caller started the fan: stop the rotation, leave the claim.
    Adopted,
}

/// Scoped fan acquisition with guaranteed release.
pub struct FanGuard {
    driver: Box<dyn FanDriver>,
    ownership: FanOwnership,
    stopped: bool,
}

impl FanGuard {
    /// Start the fan and take ownership of its teardown.
    ///
    /// A start failure is logged and absorbed: the measurement must run even
    /// when the fan cannot spin.
    pub fn start(mut driver: Box<dyn FanDriver>, config: &FanConfig) -> Self {
        if let Err(e) = driver.start(config.duty_cycle_pct, config.pin, config.frequency_hz) {
            tracing::warn!(error = %e, "Fan start failed, continuing without airflow");
        } else {
            tracing::info!(
                pin = config.pin,
                frequency_hz = config.frequency_hz,
                duty_pct = config.duty_cycle_pct,
                "Fan started"
            );
        }
        Self {
            driver,
            ownership: FanOwnership::Owned,
            stopped: false,
        }
    }

    /// Wrap an already-running fan started by the caller.
    pub fn adopt(driver: Box<dyn FanDriver>) -> Self {
        Self {
            driver,
            ownership: FanOwnership::Adopted,
            stopped: false,
        }
    }

    pub const fn ownership(&self) -> FanOwnership {
        self.ownership
    }

    /// Stop the fan now instead of at scope exit. Idempotent.
    pub fn stop_now(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(e) = self.driver.stop() {
            tracing::warn!(error = %e, "Fan stop failed");
        }
        if self.ownership == FanOwnership::Owned {
            if let Err(e) = self.driver.release() {
                tracing::warn!(error = %e, "Fan release failed");
            }
        }
        tracing::info!("Fan stopped");
    }
}

impl Drop for FanGuard {
    fn drop(&mut self) {
        self.stop_now();
    }
}
