//! # PYRE Headless Simulation
//!
//! Steps every built-in scenario through the full frame loop on the
//! recording device and logs what each one did.
//!
//! Usage: `pyre_sim [config.toml]`
//!
//! Set `RUST_LOG=debug` for per-run detail.

use std::path::PathBuf;
use std::process::ExitCode;

use pyre::core::{DeterministicSimHarness, VfxResult};
use pyre::{builtin_scenarios, load_config, run_scenarios};
use tracing_subscriber::EnvFilter;

fn run() -> VfxResult<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;
    tracing::info!(
        "Budget {} particles, policy {:?}, {} frames in flight",
        config.total_budget,
        config.budget_policy,
        config.frames_in_flight
    );

    // Three seconds at 60 Hz: long enough for continuous emitters to settle.
    let harness = DeterministicSimHarness::new(180, 1.0 / 60.0, config.seed);
    let reports = run_scenarios(&config, &harness, &builtin_scenarios())?;

    let total_debris: u32 = reports.iter().map(|r| r.total_debris).sum();
    tracing::info!("{} scenarios done, {} debris events", reports.len(), total_debris);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("pyre_sim failed: {e}");
            ExitCode::FAILURE
        }
    }
}
