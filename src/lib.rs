//! Bayesian calibration of ordinary differential equation models against
//! replicated time-series data.
//!
//! The workflow mirrors a typical fitting session: parse and shape a
//! datafile into a [ReplicateSet], declare a [ModelSpec] over one of the
//! shipped systems (or any [OdeSystem]), run a [Calibrator] to obtain a
//! [Posterior], check it with [diagnose], and push draws through a
//! [PosteriorPredictor] for plotting.
//!
//! [ReplicateSet]: routines::data::ReplicateSet
//! [ModelSpec]: model::spec::ModelSpec
//! [OdeSystem]: model::ode::OdeSystem
//! [Calibrator]: routines::calibration::Calibrator
//! [Posterior]: structs::posterior::Posterior
//! [diagnose]: routines::diagnostics::diagnose
//! [PosteriorPredictor]: routines::prediction::PosteriorPredictor

pub mod error;
pub mod model;
pub mod routines;
pub mod simulator;
pub mod structs;

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::fit;
    pub use crate::model::ode::OdeSystem;
    pub use crate::model::prior::Prior;
    pub use crate::model::spec::{
        InitialCondition, ModelSpec, NoiseModel, ObservedVariable, Parameter,
    };
    pub use crate::model::systems::{Competition, Logistic, PredatorPrey, RecoveryTerm, Sir};
    pub use crate::routines::calibration::metropolis::Metropolis;
    pub use crate::routines::calibration::Calibrator;
    pub use crate::routines::data::parse::{read_datafile, shape};
    pub use crate::routines::data::{Constants, ReplicatePolicy, ReplicateSet, TimeSeries};
    pub use crate::routines::diagnostics::{diagnose, ConvergenceReport};
    pub use crate::routines::logger::setup_log;
    pub use crate::routines::prediction::{DrawSource, PosteriorPredictor};
    pub use crate::routines::settings::{read_settings, Settings};
    pub use crate::structs::posterior::Posterior;
}

use std::time::Instant;

use error::Result;
use model::spec::ModelSpec;
use routines::calibration::metropolis::Metropolis;
use routines::calibration::Calibrator;
use routines::data::ReplicateSet;
use routines::diagnostics::{diagnose, ConvergenceReport};
use routines::output::{write_convergence, write_posterior, write_settings};
use routines::settings::Settings;
use structs::posterior::Posterior;

/// Run a full calibration with the shipped sampler
///
/// Calibrates `spec` against `data`, diagnoses the chains, and writes the
/// posterior and convergence tables when an output folder is configured.
/// Logging is left to the caller; see [routines::logger::setup_log].
pub fn fit(
    spec: &ModelSpec,
    data: &ReplicateSet,
    settings: &Settings,
) -> Result<(Posterior, ConvergenceReport)> {
    let now = Instant::now();

    let calibrator = Metropolis::new(settings.sampler.clone());
    let posterior = calibrator.calibrate(spec, data)?;
    let report = diagnose(&posterior, settings.diagnostics.rhat_threshold);

    if !report.all_converged() {
        tracing::warn!(
            "{} of {} parameters did not reach rhat <= {}",
            report.parameters.iter().filter(|p| !p.converged).count(),
            report.parameters.len(),
            report.threshold
        );
    }

    if let Some(folder) = &settings.paths.output {
        write_settings(settings, folder)?;
        write_posterior(&posterior, folder)?;
        write_convergence(&report, folder)?;
    }

    tracing::info!("Total time: {:.2?}", now.elapsed());
    Ok((posterior, report))
}
