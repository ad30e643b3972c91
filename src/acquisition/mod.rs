//! Sample source abstraction for voltage acquisition.
//!
//! Provides a unified trait for reading per-tick voltage triples from
//! different sources: CSV replay files and a synthetic generator for
//! development without hardware. Physical ADC driving is out of scope; when
//! no source can be constructed the session degrades to simulation as a
//! whole rather than failing.

use crate::types::VoltageTriple;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Where per-tick voltage readings come from.
///
/// `read()` is infallible by contract: any hardware or data problem yields a
/// zero triple so a bad read can never abort a tick. Implementations handle
/// pacing internally.
pub trait SampleSource: Send {
    /// Read the next voltage triple.
    fn read(&mut self) -> VoltageTriple;

    /// Human-readable name for logging (e.g. "replay", "synthetic").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Replay Source (CSV)
// ============================================================================

/// Replays pre-loaded voltage triples with optional inter-tick delay.
///
/// Once the data runs out it keeps returning zero triples, the same shape a
/// failed hardware read produces.
pub struct ReplaySource {
    triples: std::vec::IntoIter<VoltageTriple>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(triples: Vec<VoltageTriple>, delay_ms: u64) -> Self {
        Self {
            triples: triples.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }

    /// Load a replay source from a CSV file (`h2s_v,vocs_v,switch_v`).
    pub fn from_csv(path: &str, delay_ms: u64) -> Self {
        Self::new(load_csv(path), delay_ms)
    }
}

impl SampleSource for ReplaySource {
    fn read(&mut self) -> VoltageTriple {
        // Delay between reads; skip it before the first one so replay
        // timing matches the device's read-then-wait cadence.
        if self.yielded_first && self.delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.delay_ms));
        }
        self.yielded_first = true;
        self.triples.next().unwrap_or(VoltageTriple::ZERO)
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

/// Read voltage triples from a CSV file.
///
/// Expected format: `h2s_v,vocs_v,switch_v` (switch column optional).
/// Malformed lines are logged and skipped; an unreadable file yields an
/// empty vector, which the replay source then serves as zero reads.
pub fn load_csv(path: &str) -> Vec<VoltageTriple> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to open replay CSV");
            return Vec::new();
        }
    };

    let reader = BufReader::new(file);
    let mut triples = Vec::new();
    let mut line_num = 0;

    for line_result in reader.lines() {
        line_num += 1;

        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "Error reading CSV line");
                continue;
            }
        };

        // Skip header and empty lines.
        if line_num == 1 && line.starts_with("h2s_v") {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        match parse_csv_line(&line) {
            Ok(triple) => triples.push(triple),
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "Error parsing CSV line");
            }
        }
    }

    tracing::info!(count = triples.len(), path = %path, "Loaded replay voltages");
    triples
}

fn parse_csv_line(line: &str) -> Result<VoltageTriple, String> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 2 {
        return Err(format!("expected at least 2 fields, got {}", fields.len()));
    }
    let h2s_v = parse_f64(fields[0], "h2s_v")?;
    let vocs_v = parse_f64(fields[1], "vocs_v")?;
    let switch_v = if fields.len() > 2 {
        parse_f64(fields[2], "switch_v")?
    } else {
        0.0
    };
    Ok(VoltageTriple::new(h2s_v, vocs_v, switch_v))
}

fn parse_f64(field: &str, name: &str) -> Result<f64, String> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad {name}: {e}"))
}

// ============================================================================
// Synthetic Source
// ============================================================================

/// Baseline voltage on the H2S channel (V).
const BASE_H2S_V: f64 = 0.55;
/// Baseline voltage on the VOCs channel (V).
const BASE_VOCS_V: f64 = 0.56;
/// Full event amplitude on the H2S channel (V).
const EVENT_H2S_STEP: f64 = 0.08;
/// Full event amplitude on the VOCs channel (V).
const EVENT_VOCS_STEP: f64 = 0.06;
/// Ticks over which the event ramps to full amplitude.
const EVENT_RAMP_TICKS: usize = 4;
/// Gaussian read noise, one sigma (V).
const NOISE_SIGMA: f64 = 0.001;
/// Switch channel reads as pressed.
const SWITCH_PRESSED_V: f64 = 3.3;

/// Generates a noisy flat baseline with a ramped gas event at a fixed tick.
///
/// Development stand-in for the sensor head: lets the full detection loop
/// run end-to-end on a desk.
pub struct SyntheticSource {
    rng: StdRng,
    noise: Normal<f64>,
    tick: usize,
    event_tick: usize,
}

impl SyntheticSource {
    pub fn new(event_tick: usize, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let noise = Normal::new(0.0, NOISE_SIGMA).expect("noise sigma is a positive constant");
        Self {
            rng,
            noise,
            tick: 0,
            event_tick,
        }
    }

    fn event_fraction(&self) -> f64 {
        if self.tick < self.event_tick {
            return 0.0;
        }
        let into = self.tick - self.event_tick;
        (into as f64 / EVENT_RAMP_TICKS as f64).min(1.0)
    }
}

impl SampleSource for SyntheticSource {
    fn read(&mut self) -> VoltageTriple {
        let fraction = self.event_fraction();
        let h2s_v = BASE_H2S_V + fraction * EVENT_H2S_STEP + self.noise.sample(&mut self.rng);
        let vocs_v = BASE_VOCS_V + fraction * EVENT_VOCS_STEP + self.noise.sample(&mut self.rng);
        let switch_v = SWITCH_PRESSED_V + self.rng.gen_range(-0.05..0.05);
        self.tick += 1;
        VoltageTriple::new(h2s_v, vocs_v, switch_v)
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replay_serves_data_then_zero_triples() {
        let mut source = ReplaySource::new(
            vec![VoltageTriple::new(0.5, 0.6, 3.3), VoltageTriple::new(0.51, 0.61, 3.3)],
            0,
        );
        assert!((source.read().h2s_v - 0.5).abs() < f64::EPSILON);
        assert!((source.read().h2s_v - 0.51).abs() < f64::EPSILON);
        assert_eq!(source.read(), VoltageTriple::ZERO);
        assert_eq!(source.read(), VoltageTriple::ZERO);
    }

    #[test]
    fn csv_skips_header_and_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "h2s_v,vocs_v,switch_v").expect("write");
        writeln!(file, "0.55,0.56,3.3").expect("write");
        writeln!(file, "not,a,number").expect("write");
        writeln!(file).expect("write");
        writeln!(file, "0.56,0.57").expect("write");
        let triples = load_csv(&file.path().display().to_string());
        assert_eq!(triples.len(), 2);
        assert!((triples[1].vocs_v - 0.57).abs() < f64::EPSILON);
        assert!((triples[1].switch_v).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_csv_yields_empty_replay() {
        let triples = load_csv("/nonexistent/replay.csv");
        assert!(triples.is_empty());
    }

    #[test]
    fn synthetic_event_raises_h2s_voltage() {
        let mut source = SyntheticSource::new(10, Some(7));
        let mut before = 0.0;
        let mut after = 0.0;
        for tick in 0..30 {
            let triple = source.read();
            if tick < 10 {
                before = triple.h2s_v;
            } else {
                after = triple.h2s_v;
            }
        }
        assert!(after - before > 0.05, "event step missing: {before} -> {after}");
    }

    #[test]
    fn synthetic_is_reproducible_with_seed() {
        let mut a = SyntheticSource::new(5, Some(42));
        let mut b = SyntheticSource::new(5, Some(42));
        for _ in 0..20 {
            assert_eq!(a.read(), b.read());
        }
    }
}
