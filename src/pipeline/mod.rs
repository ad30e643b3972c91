//! The Measurement Loop — fixed-cadence tick driver for one session.
//!
//! Per tick: read voltages → filter → append concentrations → (while
//! undetected) smooth the previous sample and attempt onset detection →
//! (once detected) evaluate the capture schedule → record measured wall
//! time → check termination. The loop owns every piece of mutable pipeline
//! state (filter memories, series, detector, schedule) for its lifetime and
//! hands the read-only outcome to the exposure integrator afterwards.
//!
//! Termination is `tick == onset + extension_length`; a hard iteration cap
//! force-terminates a loop whose onset never arrives. The exhaust fan is
//! held through an RAII guard and stops on every exit path, including
//! unwind.

use crate::acquisition::SampleSource;
use crate::capture::{camera::capture_timestamp, CaptureSchedule, CaptureSink};
use crate::config::SessionConfig;
use crate::detection::OnsetDetector;
use crate::hardware::FanGuard;
use crate::processing::filter::voltage_to_ppm;
use crate::processing::{smooth_peak, FilterState, VoltageFilter};
use crate::types::Sample;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Read-only result of one measurement loop.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// H2S concentration per tick (ppm).
    pub h2s_ppm: Vec<f64>,
    /// VOCs concentration per tick (ppm).
    pub vocs_ppm: Vec<f64>,
    /// Cumulative measured wall time per tick (s).
    pub time_secs: Vec<f64>,
    /// Detected onset tick, if any.
    pub onset: Option<usize>,
    /// Ticks executed.
    pub ticks: usize,
    /// The iteration cap ended the loop (safety abort, not a normal exit).
    pub forced_stop: bool,
    /// Capture slots that fired, ascending.
    pub fired_slots: Vec<u8>,
}

/// Drives the sampling loop for one session.
pub struct MeasurementLoop<'a> {
    config: &'a SessionConfig,
    /// `<gas_id><test_id>`, passed to the capture sink for filenames.
    composite_id: String,
}

impl<'a> MeasurementLoop<'a> {
    pub fn new(config: &'a SessionConfig, composite_id: String) -> Self {
        Self {
            config,
            composite_id,
        }
    }

    /// Run the loop to termination.
    ///
    /// `fan` is held for the duration and stopped on every exit path by its
    /// guard. Capture sink failures are isolated: they are logged and the
    /// tick continues.
    pub fn run(
        &self,
        source: &mut dyn SampleSource,
        mut capture_sink: Option<&mut (dyn CaptureSink + '_)>,
        fan: Option<FanGuard>,
    ) -> LoopOutcome {
        // Keep the guard alive until the end of this scope; `Drop` stops the
        // fan on normal return, cap abort, or unwind alike.
        let _fan = fan;

        let calibration = &self.config.calibration;
        let filter = if calibration.despike {
            VoltageFilter::Despike
        } else {
            VoltageFilter::Ema {
                alpha: calibration.filter_alpha,
            }
        };

        let mut h2s_state = FilterState::new();
        let mut vocs_state = FilterState::new();
        let mut detector = OnsetDetector::new(self.config.detection.clone());
        let mut schedule = CaptureSchedule::new(self.config.capture.offsets);

        let mut h2s_ppm: Vec<f64> = Vec::new();
        let mut vocs_ppm: Vec<f64> = Vec::new();
        let mut time_secs: Vec<f64> = Vec::new();
        let mut forced_stop = true;

        info!(
            source = source.source_name(),
            filter = ?filter,
            max_iterations = self.config.sampling.max_iterations,
            "Measurement loop starting"
        );

        for tick in 0..self.config.sampling.max_iterations {
            let tick_start = Instant::now();

            let volts = source.read();
            let h2s_filtered = filter.apply(volts.h2s_v, &mut h2s_state);
            let vocs_filtered = filter.apply(volts.vocs_v, &mut vocs_state);
            h2s_ppm.push(voltage_to_ppm(
                h2s_filtered,
                calibration.voltage_offset,
                calibration.h2s_divisor,
            ));
            vocs_ppm.push(voltage_to_ppm(
                vocs_filtered,
                calibration.voltage_offset,
                calibration.vocs_divisor,
            ));

            if !detector.is_detected() && tick > 1 {
                smooth_peak(
                    &mut h2s_ppm,
                    tick - 1,
                    self.config.detection.stable_threshold,
                );
                if detector.observe(tick, &h2s_ppm).is_some() {
                    // Settle once right after detection so the scheduled
                    // captures are not taken mid-transition.
                    let settle_ms = self.config.sampling.settle_delay_ms;
                    if settle_ms > 0 {
                        std::thread::sleep(std::time::Duration::from_millis(settle_ms));
                    }
                }
            }

            if let Some(onset) = detector.onset() {
                if let Some(sink) = capture_sink.as_mut() {
                    if let Some(slot) = schedule.check(onset, tick) {
                        let timestamp = capture_timestamp();
                        if let Err(e) = sink.capture(slot, &self.composite_id, &timestamp) {
                            warn!(slot, error = %e, "Capture failed, continuing loop");
                        }
                    }
                }
            }

            // Measured, not assumed-fixed-period: capture and read latency
            // belong to this tick's duration on the final time axis.
            let elapsed = tick_start.elapsed().as_secs_f64();
            let cumulative = time_secs.last().copied().unwrap_or(0.0) + elapsed;
            time_secs.push(cumulative);

            let sample = Sample {
                tick,
                elapsed_secs: cumulative,
                volts,
            };
            debug!(
                tick = sample.tick,
                h2s_v = sample.volts.h2s_v,
                vocs_v = sample.volts.vocs_v,
                elapsed = sample.elapsed_secs,
                "tick"
            );

            if let Some(onset) = detector.onset() {
                if tick == onset + self.config.sampling.extension_length {
                    forced_stop = false;
                    break;
                }
            }
        }

        if forced_stop {
            warn!(
                ticks = h2s_ppm.len(),
                "Iteration cap reached without completing the post-onset window"
            );
        }

        let outcome = LoopOutcome {
            onset: detector.onset(),
            ticks: h2s_ppm.len(),
            forced_stop,
            fired_slots: schedule.fired_slots(),
            h2s_ppm,
            vocs_ppm,
            time_secs,
        };
        info!(
            ticks = outcome.ticks,
            onset = ?outcome.onset,
            forced_stop = outcome.forced_stop,
            "Measurement loop finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ReplaySource;
    use crate::capture::{CaptureError, CapturedImage};
    use crate::config::{SamplingConfig, SessionConfig};
    use crate::types::VoltageTriple;

    struct RecordingSink {
        events: Vec<(u8, String, String)>,
        captured: Vec<CapturedImage>,
        fail: bool,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Self {
            Self {
                events: Vec::new(),
                captured: Vec::new(),
                fail,
            }
        }
    }

    impl CaptureSink for RecordingSink {
        fn capture(
            &mut self,
            slot: u8,
            composite_id: &str,
            timestamp: &str,
        ) -> Result<(), CaptureError> {
            self.events
                .push((slot, composite_id.to_string(), timestamp.to_string()));
            if self.fail {
                return Err(CaptureError::AlreadyFired { slot });
            }
            Ok(())
        }

        fn captured(&self) -> &[CapturedImage] {
            &self.captured
        }
    }

    fn test_config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.sampling = SamplingConfig {
            extension_length: 20,
            max_iterations: 60,
            settle_delay_ms: 0,
        };
        config.capture.offsets = [4, 6, 8];
        config
    }

    /// Flat baseline, voltage step at `step_tick`. The despike filter passes
    /// the step through one tick late and the quiet-history lag-1 branch
    /// places the onset two ticks before the step, at `step_tick - 2`.
    fn step_voltages(total: usize, step_tick: usize) -> Vec<VoltageTriple> {
        (0..total)
            .map(|i| {
                let v = if i < step_tick { 0.55 } else { 0.62 };
                VoltageTriple::new(v, v, 3.3)
            })
            .collect()
    }

    #[test]
    fn loop_terminates_at_onset_plus_extension() {
        let config = test_config();
        let mut source = ReplaySource::new(step_voltages(80, 10), 0);
        let outcome =
            MeasurementLoop::new(&config, "FFFFF00001".into()).run(&mut source, None, None);

        assert_eq!(outcome.onset, Some(8));
        assert!(!outcome.forced_stop);
        assert_eq!(outcome.ticks, 8 + 20 + 1);
        assert_eq!(outcome.h2s_ppm.len(), outcome.ticks);
        assert_eq!(outcome.time_secs.len(), outcome.ticks);
    }

    #[test]
    fn loop_without_onset_hits_iteration_cap() {
        let config = test_config();
        let mut source = ReplaySource::new(vec![VoltageTriple::ZERO; 100], 0);
        let outcome =
            MeasurementLoop::new(&config, "FFFFF00002".into()).run(&mut source, None, None);

        assert_eq!(outcome.onset, None);
        assert!(outcome.forced_stop);
        assert_eq!(outcome.ticks, config.sampling.max_iterations);
        assert!(outcome.fired_slots.is_empty());
    }

    #[test]
    fn time_axis_is_cumulative_and_monotone() {
        let config = test_config();
        let mut source = ReplaySource::new(step_voltages(80, 10), 0);
        let outcome =
            MeasurementLoop::new(&config, "FFFFF00003".into()).run(&mut source, None, None);

        for pair in outcome.time_secs.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn triggers_fire_at_onset_offsets_with_composite_id() {
        let config = test_config();
        let mut source = ReplaySource::new(step_voltages(80, 10), 0);
        let mut sink = RecordingSink::new(false);
        let outcome = MeasurementLoop::new(&config, "FFFFF00004".into()).run(
            &mut source,
            Some(&mut sink),
            None,
        );

        assert_eq!(outcome.onset, Some(8));
        assert_eq!(outcome.fired_slots, vec![1, 2, 3]);
        let slots: Vec<u8> = sink.events.iter().map(|(s, _, _)| *s).collect();
        assert_eq!(slots, vec![1, 2, 3]);
        assert!(sink.events.iter().all(|(_, id, _)| id == "FFFFF00004"));
    }

    #[test]
    fn capture_failures_do_not_stop_the_loop() {
        let config = test_config();
        let mut source = ReplaySource::new(step_voltages(80, 10), 0);
        let mut sink = RecordingSink::new(true);
        let outcome = MeasurementLoop::new(&config, "FFFFF00005".into()).run(
            &mut source,
            Some(&mut sink),
            None,
        );

        // All three capture attempts happen and the loop still completes.
        assert_eq!(sink.events.len(), 3);
        assert!(!outcome.forced_stop);
    }
}
