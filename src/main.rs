//! Gas-Sentinel — gas exposure measurement session runner.
//!
//! One invocation runs one measurement session, typically triggered by a
//! start command from the device agent. The final measurement record is
//! printed to stdout as JSON; session progress is reported to the data API
//! when one is configured.
//!
//! # Usage
//!
//! ```bash
//! # Simulated session (no hardware, no camera)
//! gas-sentinel --simulation --test-id 42
//!
//! # Replay a recorded voltage log through the full pipeline
//! gas-sentinel --replay voltages.csv --test-id 42 --no-camera
//!
//! # Synthetic source with a gas event at tick 20
//! gas-sentinel --synthetic 20 --seed 7 --test-id 42 --no-camera
//! ```
//!
//! # Environment Variables
//!
//! - `DEVICE_ID`: device id (5 alphabetic characters)
//! - `GAS_SENTINEL_CONFIG`: path to the TOML config file
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;

use gas_sentinel::acquisition::{ReplaySource, SampleSource, SyntheticSource};
use gas_sentinel::capture::{CameraSink, CaptureSink};
use gas_sentinel::config::SessionConfig;
use gas_sentinel::hardware::NullFan;
use gas_sentinel::report::{ImageClient, MeasurementClient, StatusClient};
use gas_sentinel::session::{SessionIds, SessionOrchestrator, UploadOutcome};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "gas-sentinel")]
#[command(about = "Gas exposure monitoring and event detection")]
#[command(version)]
struct CliArgs {
    /// Run the whole session on the simulation path (no hardware access)
    #[arg(long, env = "GAS_SIMULATION")]
    simulation: bool,

    /// Replay voltage triples from a CSV file (h2s_v,vocs_v,switch_v)
    #[arg(long, value_name = "PATH")]
    replay: Option<String>,

    /// Inter-tick delay for replay input (ms)
    #[arg(long, default_value = "0")]
    replay_delay_ms: u64,

    /// Generate synthetic sensor input with a gas event at the given tick
    #[arg(long, value_name = "TICK")]
    synthetic: Option<usize>,

    /// Random seed for the synthetic source (reproducibility)
    #[arg(long)]
    seed: Option<u64>,

    /// Device id (5 alphabetic characters)
    #[arg(long, env = "DEVICE_ID", default_value = "FFFFF")]
    device_id: String,

    /// Run id (5-digit numeric string). Required.
    #[arg(long, env = "TEST_ID")]
    test_id: Option<String>,

    /// Profile id forwarded into the measurement record
    #[arg(long)]
    profile_id: Option<i64>,

    /// Path to the TOML config file (overrides GAS_SENTINEL_CONFIG)
    #[arg(short, long)]
    config: Option<String>,

    /// Skip camera captures on the real path
    #[arg(long)]
    no_camera: bool,
}

fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = args.config.as_ref().map_or_else(SessionConfig::load, |p| {
        SessionConfig::load_from(Path::new(p))
    });

    let ids = SessionIds::new(&args.device_id, args.test_id.as_deref())
        .context("a 5-digit --test-id (or TEST_ID) must accompany the start command")?;

    // Backend collaborators, each optional: a missing endpoint disables that
    // collaborator instead of failing the session.
    let mut orchestrator = SessionOrchestrator::new(config.clone(), ids, args.profile_id);
    match StatusClient::new(&config.api) {
        Ok(client) => orchestrator = orchestrator.with_status(Box::new(client)),
        Err(e) => info!(reason = %e, "Status reporting disabled"),
    }
    match MeasurementClient::new(&config.api) {
        Ok(client) => orchestrator = orchestrator.with_record_sink(Box::new(client)),
        Err(e) => info!(reason = %e, "Record upload disabled"),
    }
    match ImageClient::new(&config.api) {
        Ok(client) => orchestrator = orchestrator.with_artifact_store(Box::new(client)),
        Err(e) => info!(reason = %e, "Image upload disabled"),
    }

    // Sample source selection. None means hardware acquisition is
    // unavailable and the session degrades to simulation as a whole.
    let source: Option<Box<dyn SampleSource>> = if args.simulation {
        None
    } else if let Some(path) = &args.replay {
        Some(Box::new(ReplaySource::from_csv(path, args.replay_delay_ms)))
    } else {
        args.synthetic
            .map(|event_tick| -> Box<dyn SampleSource> {
                Box::new(SyntheticSource::new(event_tick, args.seed))
            })
    };

    let capture: Option<Box<dyn CaptureSink>> = if args.no_camera || args.simulation {
        None
    } else {
        let work_dir = if config.capture.work_dir.is_empty() {
            std::env::current_dir().context("cannot resolve capture work directory")?
        } else {
            config.capture.work_dir.clone().into()
        };
        Some(Box::new(CameraSink::new(
            work_dir,
            config.capture.timeout_ms,
            config.capture.autofocus,
        )))
    };

    let outcome = orchestrator.run(source, capture, Box::new(NullFan), args.simulation);

    // The record is the session's product; print it even when the backend
    // rejected it so the operator can recover the data.
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome.record).context("record serialization failed")?
    );

    Ok(match outcome.upload {
        UploadOutcome::Posted | UploadOutcome::Skipped => ExitCode::SUCCESS,
        UploadOutcome::Failed => ExitCode::FAILURE,
    })
}
