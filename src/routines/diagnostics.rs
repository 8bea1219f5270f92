//! Convergence diagnostics over a multi-chain [Posterior]
//!
//! Per parameter: the potential-scale-reduction statistic (comparing
//! between-chain and within-chain variance; ~1.0 at convergence) and an
//! effective-sample-size estimate from the chain autocorrelations, following
//! the usual Geyer initial-positive-sequence truncation. The input is never
//! mutated.

use ndarray::Array1;
use ndarray_stats::QuantileExt;

use crate::structs::posterior::Posterior;

/// Convergence statistics for one parameter
#[derive(Debug, Clone)]
pub struct ParameterDiagnostics {
    pub name: String,
    /// Potential-scale-reduction statistic
    pub rhat: f64,
    /// Effective sample size, pooled across chains
    pub ess: f64,
    pub converged: bool,
}

/// The full convergence report for a run
#[derive(Debug, Clone)]
pub struct ConvergenceReport {
    pub parameters: Vec<ParameterDiagnostics>,
    /// Threshold applied to the per-parameter statistic
    pub threshold: f64,
    /// Set when a majority of sampler proposals failed to integrate; results
    /// are usable but suspect
    pub degraded: bool,
}

impl ConvergenceReport {
    pub fn all_converged(&self) -> bool {
        self.parameters.iter().all(|p| p.converged)
    }

    pub fn max_rhat(&self) -> f64 {
        let rhats = Array1::from_iter(self.parameters.iter().map(|p| p.rhat));
        match rhats.max() {
            Ok(max) => *max,
            Err(_) => f64::NAN,
        }
    }
}

/// Compute the convergence report; `threshold` is the acceptance bound on the
/// scale-reduction statistic (conventionally 1.01 - 1.1)
pub fn diagnose(posterior: &Posterior, threshold: f64) -> ConvergenceReport {
    let m = posterior.nchains();

    let parameters = posterior
        .names()
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let columns: Vec<Array1<f64>> = (0..m)
                .map(|c| posterior.chain(c).column(j).to_owned())
                .collect();
            let rhat = potential_scale_reduction(&columns);
            let ess = effective_sample_size(&columns);
            ParameterDiagnostics {
                name: name.clone(),
                rhat,
                ess,
                converged: rhat.is_finite() && rhat <= threshold,
            }
        })
        .collect::<Vec<_>>();

    let total = posterior.total_proposals();
    let degraded = total > 0 && posterior.failed_draws() * 2 > total;
    if degraded {
        tracing::warn!(
            "Degraded run: {} of {} proposals were rejected because the ODE failed to integrate",
            posterior.failed_draws(),
            total
        );
    }
    for p in &parameters {
        if !p.converged {
            tracing::warn!(
                "Parameter '{}' has not converged: rhat = {:.4} (threshold {:.3}), ess = {:.0}",
                p.name,
                p.rhat,
                threshold,
                p.ess
            );
        }
    }

    ConvergenceReport {
        parameters,
        threshold,
        degraded,
    }
}

/// Between/within variance comparison
///
/// `sqrt((W + B/n) / W)`; exactly 1.0 when all chains are duplicates (B = 0),
/// whatever the draw count, and grows with the spread of the chain means.
fn potential_scale_reduction(columns: &[Array1<f64>]) -> f64 {
    let m = columns.len() as f64;
    let n = columns[0].len() as f64;
    if n < 2.0 {
        return f64::NAN;
    }

    let chain_means: Vec<f64> = columns
        .iter()
        .map(|c| c.mean().unwrap_or(f64::NAN))
        .collect();
    let grand = chain_means.iter().sum::<f64>() / m;

    // Within-chain variance (unbiased per chain)
    let w = columns
        .iter()
        .zip(chain_means.iter())
        .map(|(c, &mean)| c.mapv(|x| (x - mean).powi(2)).sum() / (n - 1.0))
        .sum::<f64>()
        / m;

    // Between-chain variance
    let b = if m > 1.0 {
        n * chain_means
            .iter()
            .map(|&mean| (mean - grand).powi(2))
            .sum::<f64>()
            / (m - 1.0)
    } else {
        0.0
    };

    if w == 0.0 {
        // Constant chains: identical chains are trivially converged
        return if b == 0.0 { 1.0 } else { f64::INFINITY };
    }

    ((w + b / n) / w).sqrt()
}

/// Multi-chain effective sample size from averaged autocovariances
fn effective_sample_size(columns: &[Array1<f64>]) -> f64 {
    let m = columns.len() as f64;
    let n = columns[0].len();
    if n < 4 {
        return f64::NAN;
    }

    let chain_means: Vec<f64> = columns
        .iter()
        .map(|c| c.mean().unwrap_or(f64::NAN))
        .collect();
    let grand = chain_means.iter().sum::<f64>() / m;

    // Biased autocovariances per chain
    let autocov = |c: &Array1<f64>, mean: f64, t: usize| -> f64 {
        let nn = c.len();
        (0..nn - t)
            .map(|i| (c[i] - mean) * (c[i + t] - mean))
            .sum::<f64>()
            / nn as f64
    };

    let w: f64 = columns
        .iter()
        .zip(chain_means.iter())
        .map(|(c, &mean)| autocov(c, mean, 0))
        .sum::<f64>()
        / m;
    let b_over_n: f64 = chain_means
        .iter()
        .map(|&mean| (mean - grand).powi(2))
        .sum::<f64>()
        / m;
    let var_plus = w * (n as f64 - 1.0) / n as f64 + b_over_n;
    if var_plus <= 0.0 {
        return m * n as f64;
    }

    // Geyer initial positive sequence over paired lags
    let max_lag = n - 1;
    let rho = |t: usize| -> f64 {
        let mean_cov: f64 = columns
            .iter()
            .zip(chain_means.iter())
            .map(|(c, &mean)| autocov(c, mean, t))
            .sum::<f64>()
            / m;
        1.0 - (w - mean_cov) / var_plus
    };

    let mut tau = 1.0;
    let mut t = 1;
    while t + 1 < max_lag {
        let pair = rho(t) + rho(t + 1);
        if pair <= 0.0 {
            break;
        }
        tau += 2.0 * pair;
        t += 2;
    }

    (m * n as f64 / tau).min(m * n as f64)
}
