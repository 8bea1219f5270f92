//! Calibration: fitting a [ModelSpec] to a [ReplicateSet] by MCMC
//!
//! [Calibrator] is the boundary contract: any sampler that can score a
//! parameter vector by integrating the ODE across the observed time span can
//! sit behind it. [Metropolis](metropolis::Metropolis) is the shipped
//! implementation.

pub mod metropolis;

use ndarray::Array2;

use crate::error::Result;
use crate::model::spec::{ModelSpec, ParameterLayout};
use crate::routines::data::ReplicateSet;
use crate::simulator::{integrate_grid, IntegrationError};
use crate::structs::posterior::Posterior;

const LN_2PI: f64 = 1.837_877_066_409_345_4;

/// The external capability every sampler must satisfy
///
/// Guarantees required of implementations: reproducibility under a fixed
/// seed; every returned draw was scored through ODE integration over the full
/// observed time span; per-draw integration failures are absorbed by the
/// acceptance rule, with [Error::FatalIntegration](crate::error::Error) kept
/// for the case where the sampler cannot proceed at all.
pub trait Calibrator {
    fn calibrate(&self, spec: &ModelSpec, data: &ReplicateSet) -> Result<Posterior>;
}

/// Everything needed to score one parameter vector: the spec, the shaped
/// data, and the flattened parameter layout binding them together
///
/// Shared read-only across chains and predictive draws.
pub struct FitContext<'a> {
    spec: &'a ModelSpec,
    data: &'a ReplicateSet,
    layout: ParameterLayout,
}

impl<'a> FitContext<'a> {
    pub fn new(spec: &'a ModelSpec, data: &'a ReplicateSet) -> Result<Self> {
        let layout = spec.layout(data)?;
        Ok(FitContext { spec, data, layout })
    }

    pub fn spec(&self) -> &ModelSpec {
        self.spec
    }

    pub fn data(&self) -> &ReplicateSet {
        self.data
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Gaussian log-likelihood of the full parameter vector
    ///
    /// Integrates the ODE once per replicate over that replicate's observed
    /// time grid and scores every observation under the noise model. A solver
    /// failure surfaces as an [IntegrationError] for the caller's acceptance
    /// rule to absorb.
    pub fn log_likelihood(&self, full: &[f64]) -> std::result::Result<f64, IntegrationError> {
        let spec = self.spec;
        let ode = spec.ode();
        let mut total = 0.0;
        for (k, replicate) in self.data.iter().enumerate() {
            let params = self.layout.resolve(k, full);
            let y0 = spec.initial_state(replicate, &params);
            let trajectory = integrate_grid(
                ode,
                &params[..ode.nparams()],
                &replicate.constants,
                &y0,
                &replicate.times,
            )?;
            for i in 0..replicate.nobs() {
                let state = trajectory.row(i).to_vec();
                let predicted = spec.observe(&replicate.constants, &state);
                for (j, &pred) in predicted.iter().enumerate() {
                    let sd = spec.noise().sd(j, pred);
                    let z = (replicate.observations[(i, j)] - pred) / sd;
                    total += -0.5 * LN_2PI - sd.ln() - 0.5 * z * z;
                }
            }
        }
        Ok(total)
    }

    /// Log-posterior density, up to a constant
    ///
    /// A vector outside the prior support short-circuits to `-inf` without
    /// touching the solver.
    pub fn log_posterior(&self, full: &[f64]) -> std::result::Result<f64, IntegrationError> {
        let prior = self.layout.log_prior(full);
        if !prior.is_finite() {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(prior + self.log_likelihood(full)?)
    }
}

/// Output of one chain, assembled into a [Posterior] by the calibrator
pub(crate) struct ChainOutput {
    pub draws: Array2<f64>,
    pub logp: Vec<f64>,
    pub failed: usize,
    pub proposals: usize,
}
