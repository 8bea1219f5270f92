//! Adaptive random-walk Metropolis
//!
//! One independent chain per worker: each chain is a pure function of the run
//! seed and its chain index, walking the full estimated-parameter vector with
//! per-coordinate Gaussian proposals. Proposal scales adapt toward a healthy
//! acceptance rate during warm-up only, so the post-warmup kernel is a fixed,
//! valid Metropolis kernel. Proposals whose ODE integration fails are scored
//! `-inf` and rejected; the failure count travels with the posterior so
//! diagnostics can flag a degraded run.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::spec::ModelSpec;
use crate::routines::calibration::{Calibrator, ChainOutput, FitContext};
use crate::routines::data::ReplicateSet;
use crate::routines::initialization::chain_starts;
use crate::routines::settings::SamplerSettings;
use crate::structs::posterior::Posterior;

/// Adaptation window length during warm-up, in iterations
const ADAPT_WINDOW: usize = 50;
/// Acceptance-rate band the warm-up adaptation steers toward
const ACCEPT_LOW: f64 = 0.15;
const ACCEPT_HIGH: f64 = 0.45;

pub struct Metropolis {
    settings: SamplerSettings,
}

impl Metropolis {
    pub fn new(settings: SamplerSettings) -> Self {
        Metropolis { settings }
    }

    fn run_chain(
        &self,
        ctx: &FitContext,
        chain: usize,
        start: Vec<f64>,
    ) -> Result<ChainOutput> {
        let settings = &self.settings;
        let d = ctx.layout().len();
        // Offset past the initialization streams so warm-up does not replay
        // the start-search randomness
        let mut rng =
            StdRng::seed_from_u64(settings.seed.wrapping_add(1_000_003 * (chain as u64 + 1)));

        // Initial per-coordinate scales from the prior spread
        let mut scales: Vec<f64> = ctx
            .layout()
            .priors()
            .iter()
            .map(|p| 0.5 * p.sd() * 2.38 / (d as f64).sqrt())
            .collect();

        let mut x = start;
        let mut fx = match ctx.log_posterior(&x) {
            Ok(lp) if lp.is_finite() => lp,
            _ => {
                return Err(Error::FatalIntegration {
                    stage: "sampling",
                    reason: format!("chain {}: starting point has no finite log-posterior", chain),
                })
            }
        };

        let total_iters = settings.warmup + settings.draws;
        let mut draws = Array2::zeros((settings.draws, d));
        let mut logp = Vec::with_capacity(settings.draws);
        let mut failed = 0usize;
        let mut window_accepted = 0usize;

        for iter in 0..total_iters {
            let proposal: Vec<f64> = x
                .iter()
                .zip(scales.iter())
                .map(|(&xi, &s)| xi + s * rng.sample::<f64, _>(StandardNormal))
                .collect();

            let fy = match ctx.log_posterior(&proposal) {
                Ok(lp) => lp,
                Err(e) => {
                    failed += 1;
                    tracing::trace!("chain {}: rejected draw, integration failed {}", chain, e);
                    f64::NEG_INFINITY
                }
            };

            if fy.is_finite() && rng.gen::<f64>().ln() < fy - fx {
                x = proposal;
                fx = fy;
                window_accepted += 1;
            }

            let warming = iter < settings.warmup;
            if warming && (iter + 1) % ADAPT_WINDOW == 0 {
                let rate = window_accepted as f64 / ADAPT_WINDOW as f64;
                if rate < ACCEPT_LOW {
                    scales.iter_mut().for_each(|s| *s *= 0.7);
                } else if rate > ACCEPT_HIGH {
                    scales.iter_mut().for_each(|s| *s *= 1.4);
                }
                window_accepted = 0;
            }

            if !warming {
                let i = iter - settings.warmup;
                for (j, &v) in x.iter().enumerate() {
                    draws[(i, j)] = v;
                }
                logp.push(fx);
            }
        }

        if failed == total_iters {
            return Err(Error::FatalIntegration {
                stage: "sampling",
                reason: format!(
                    "chain {}: every proposal failed to integrate; the model may be systematically divergent",
                    chain
                ),
            });
        }

        tracing::debug!(
            "chain {}: {} draws, {} integration failures",
            chain,
            settings.draws,
            failed
        );

        Ok(ChainOutput {
            draws,
            logp,
            failed,
            proposals: total_iters,
        })
    }
}

impl Calibrator for Metropolis {
    fn calibrate(&self, spec: &ModelSpec, data: &ReplicateSet) -> Result<Posterior> {
        self.settings.validate()?;
        let ctx = FitContext::new(spec, data)?;
        let layout = ctx.layout();

        tracing::info!(
            "Calibrating {} parameter(s) against {} replicate(s) with {} observations",
            layout.len(),
            data.len(),
            data.nobs()
        );
        tracing::info!(
            "Running {} chain(s): {} warmup + {} draws, seed {}",
            self.settings.chains,
            self.settings.warmup,
            self.settings.draws,
            self.settings.seed
        );

        let starts = chain_starts(&ctx, &self.settings)?;

        let outputs: Result<Vec<ChainOutput>> = starts
            .into_par_iter()
            .enumerate()
            .map(|(chain, start)| self.run_chain(&ctx, chain, start))
            .collect();
        let outputs = outputs?;

        let failed = outputs.iter().map(|o| o.failed).sum();
        let proposals = outputs.iter().map(|o| o.proposals).sum();
        let (chains, logp): (Vec<_>, Vec<_>) =
            outputs.into_iter().map(|o| (o.draws, o.logp)).unzip();

        Posterior::new(
            layout.names().to_vec(),
            chains,
            logp,
            failed,
            proposals,
            self.settings.seed,
        )
    }
}
