//! # PYRE
//!
//! Headless front end for the effect runtime.
//!
//! ```text
//! EngineConfig ──► run_scenarios ──► DeterministicSimHarness (per scenario)
//!                                        │
//!                                        └──► ScenarioReport
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

use std::path::Path;

pub use pyre_core as core;
pub use pyre_shared as shared;

use pyre_core::{DeterministicSimHarness, EngineConfig, SimulationTrace, VfxResult};
use pyre_shared::{
    BlendMode, EffectDescriptor, EmissionRate, EmitterShape, Force, NoiseForceConfig, ParticleInit,
    PhysicsHandoffConfig, RendererConfig, Vec3,
};

/// A named effect to step.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Scenario name.
    pub name: &'static str,
    /// Effect under test.
    pub descriptor: EffectDescriptor,
}

/// Summary of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: &'static str,
    /// Full trace.
    pub trace: SimulationTrace,
    /// Highest alive count seen.
    pub peak_alive: u32,
    /// Debris events forwarded over the run.
    pub total_debris: u32,
}

impl ScenarioReport {
    fn new(name: &'static str, trace: SimulationTrace) -> Self {
        let peak_alive = trace.alive_counts.iter().copied().max().unwrap_or(0);
        let total_debris = trace.debris_counts.iter().sum();
        Self {
            name,
            trace,
            peak_alive,
            total_debris,
        }
    }
}

/// Loads the config at `path`, or the defaults when there is none.
///
/// # Errors
///
/// Returns the loader's error for an unreadable or invalid file.
pub fn load_config(path: Option<&Path>) -> VfxResult<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

/// The built-in scenarios.
#[must_use]
pub fn builtin_scenarios() -> Vec<Scenario> {
    let burst = {
        let mut d = EffectDescriptor::new("burst", EmissionRate::burst(500));
        d.shape = Some(EmitterShape::sphere(0.5));
        d.forces = vec![Force::gravity(9.8)];
        d
    };

    let continuous = {
        let mut d = EffectDescriptor::new("continuous", EmissionRate::continuous(100.0));
        d.init = Some(ParticleInit::with_lifetime(1.0));
        d.renderer = Some(RendererConfig::billboard(BlendMode::Additive));
        d
    };

    let curl = {
        let mut d = EffectDescriptor::new("curl", EmissionRate::continuous(400.0));
        d.shape = Some(EmitterShape::sphere(5.0));
        d.forces = vec![
            Force::drag(0.3),
            Force::wind(Vec3::new(1.0, 0.0, 0.0), 2.0),
            Force::curl_noise(8.0, NoiseForceConfig::default()),
        ];
        d
    };

    let debris = {
        let mut d = EffectDescriptor::new("debris", EmissionRate::burst(40));
        d.init = Some(ParticleInit {
            speed_min: 6.0,
            speed_max: 12.0,
            ..ParticleInit::with_lifetime(0.25)
        });
        d.physics = Some(PhysicsHandoffConfig {
            enabled: true,
            speed_threshold: 5.0,
            mesh_id: "rubble".into(),
            material_tag: "stone".into(),
            mass: 1.5,
        });
        d
    };

    vec![
        Scenario { name: "burst", descriptor: burst },
        Scenario {
            name: "continuous",
            descriptor: continuous,
        },
        Scenario { name: "curl", descriptor: curl },
        Scenario { name: "debris", descriptor: debris },
    ]
}

/// Runs every scenario in `scenarios` with `harness`.
///
/// # Errors
///
/// Stops at the first scenario the harness rejects.
pub fn run_scenarios(
    config: &EngineConfig,
    harness: &DeterministicSimHarness,
    scenarios: &[Scenario],
) -> VfxResult<Vec<ScenarioReport>> {
    scenarios
        .iter()
        .map(|scenario| {
            let trace = harness.run(config, &scenario.descriptor)?;
            let report = ScenarioReport::new(scenario.name, trace);
            tracing::info!(
                "{}: peak {} alive, final {}, {} debris",
                report.name,
                report.peak_alive,
                report.trace.final_alive(),
                report.total_debris
            );
            Ok(report)
        })
        .collect()
}
