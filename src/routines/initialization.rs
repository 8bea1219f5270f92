//! Chain starting points
//!
//! Every chain needs a start for which the log-posterior is finite, i.e. the
//! point is inside the prior support and the ODE integrates cleanly there.
//! Candidates come either from the priors themselves or from a Sobol sequence
//! over the priors' central intervals; candidates where integration fails are
//! skipped, and persistent failure is fatal.

use rand::rngs::StdRng;
use rand::SeedableRng;
use sobol_burley::sample;

use crate::error::{Error, Result};
use crate::routines::calibration::FitContext;
use crate::routines::settings::{Initializer, SamplerSettings};

const MAX_ATTEMPTS: usize = 200;

/// Produce one valid starting point per chain
pub fn chain_starts(ctx: &FitContext, settings: &SamplerSettings) -> Result<Vec<Vec<f64>>> {
    match &settings.initializer {
        Initializer::Prior => prior_starts(ctx, settings),
        Initializer::Sobol => sobol_starts(ctx, settings),
        Initializer::Fixed(starts) => fixed_starts(ctx, settings, starts),
    }
}

fn fixed_starts(
    ctx: &FitContext,
    settings: &SamplerSettings,
    starts: &[Vec<f64>],
) -> Result<Vec<Vec<f64>>> {
    if starts.len() != settings.chains {
        return Err(Error::Validation(format!(
            "{} fixed starting points supplied for {} chains",
            starts.len(),
            settings.chains
        )));
    }
    let nparams = ctx.layout().len();
    for (chain, start) in starts.iter().enumerate() {
        if start.len() != nparams {
            return Err(Error::Validation(format!(
                "fixed start for chain {} has {} values, the model estimates {}",
                chain,
                start.len(),
                nparams
            )));
        }
        if !is_valid(ctx, start) {
            return Err(Error::FatalIntegration {
                stage: "initialization",
                reason: format!(
                    "fixed start for chain {} has a non-finite log-posterior",
                    chain
                ),
            });
        }
    }
    Ok(starts.to_vec())
}

fn prior_starts(ctx: &FitContext, settings: &SamplerSettings) -> Result<Vec<Vec<f64>>> {
    let priors = ctx.layout().priors();
    let mut starts = Vec::with_capacity(settings.chains);
    for chain in 0..settings.chains {
        let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(chain as u64));
        let mut found = None;
        for _ in 0..MAX_ATTEMPTS {
            let candidate: Vec<f64> = priors.iter().map(|p| p.sample(&mut rng)).collect();
            if is_valid(ctx, &candidate) {
                found = Some(candidate);
                break;
            }
        }
        let start = found.ok_or_else(|| Error::FatalIntegration {
            stage: "initialization",
            reason: format!(
                "chain {}: no prior draw with a finite log-posterior in {} attempts",
                chain, MAX_ATTEMPTS
            ),
        })?;
        starts.push(start);
    }
    Ok(starts)
}

fn sobol_starts(ctx: &FitContext, settings: &SamplerSettings) -> Result<Vec<Vec<f64>>> {
    let bounds: Vec<(f64, f64)> = ctx
        .layout()
        .priors()
        .iter()
        .map(|p| p.central_interval())
        .collect();

    let mut starts = Vec::with_capacity(settings.chains);
    let mut index: u32 = 0;
    for chain in 0..settings.chains {
        let mut found = None;
        for _ in 0..MAX_ATTEMPTS {
            let candidate: Vec<f64> = bounds
                .iter()
                .enumerate()
                .map(|(j, &(low, high))| {
                    let unscaled = sample(index, j as u32, settings.seed as u32) as f64;
                    low + unscaled * (high - low)
                })
                .collect();
            index = index.wrapping_add(1);
            if is_valid(ctx, &candidate) {
                found = Some(candidate);
                break;
            }
        }
        let start = found.ok_or_else(|| Error::FatalIntegration {
            stage: "initialization",
            reason: format!(
                "chain {}: no Sobol point with a finite log-posterior in {} attempts",
                chain, MAX_ATTEMPTS
            ),
        })?;
        starts.push(start);
    }
    Ok(starts)
}

fn is_valid(ctx: &FitContext, candidate: &[f64]) -> bool {
    matches!(ctx.log_posterior(candidate), Ok(lp) if lp.is_finite())
}
