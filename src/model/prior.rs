use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, LogNormal, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::routines::math::ln_gamma;

/// A prior distribution over a single parameter
///
/// The variants cover the families used by the population models: symmetric
/// beliefs ([Prior::Normal], [Prior::Uniform]) and strictly positive rates and
/// scales ([Prior::LogNormal], [Prior::Gamma], [Prior::HalfNormal],
/// [Prior::Exponential]).
///
/// Hyperparameters are validated by [Prior::validate], which is called when a
/// [ModelSpec](crate::model::spec::ModelSpec) is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Prior {
    Normal { mean: f64, sd: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Uniform { low: f64, high: f64 },
    /// Shape-rate parameterization
    Gamma { shape: f64, rate: f64 },
    /// Normal truncated to the non-negative half line
    HalfNormal { sd: f64 },
    Exponential { rate: f64 },
}

impl Prior {
    /// Check that the hyperparameters lie in the family's valid domain
    pub fn validate(&self, name: &str) -> Result<()> {
        let ok = match self {
            Prior::Normal { mean, sd } => mean.is_finite() && sd.is_finite() && *sd > 0.0,
            Prior::LogNormal { mu, sigma } => mu.is_finite() && sigma.is_finite() && *sigma > 0.0,
            Prior::Uniform { low, high } => low.is_finite() && high.is_finite() && low < high,
            Prior::Gamma { shape, rate } => {
                shape.is_finite() && rate.is_finite() && *shape > 0.0 && *rate > 0.0
            }
            Prior::HalfNormal { sd } => sd.is_finite() && *sd > 0.0,
            Prior::Exponential { rate } => rate.is_finite() && *rate > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "prior for parameter '{}' has hyperparameters outside the valid domain: {:?}",
                name, self
            )))
        }
    }

    /// Whether the support of the distribution is contained in `[0, ∞)`
    ///
    /// A positivity-constrained parameter must use a prior for which this
    /// returns `true`.
    pub fn support_nonnegative(&self) -> bool {
        match self {
            Prior::Normal { .. } => false,
            Prior::LogNormal { .. } => true,
            Prior::Uniform { low, .. } => *low >= 0.0,
            Prior::Gamma { .. } => true,
            Prior::HalfNormal { .. } => true,
            Prior::Exponential { .. } => true,
        }
    }

    /// Log-density at `x`; `-inf` outside the support
    pub fn log_pdf(&self, x: f64) -> f64 {
        if !x.is_finite() {
            return f64::NEG_INFINITY;
        }
        match self {
            Prior::Normal { mean, sd } => {
                let z = (x - mean) / sd;
                -0.5 * (2.0 * PI).ln() - sd.ln() - 0.5 * z * z
            }
            Prior::LogNormal { mu, sigma } => {
                if x <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                let z = (x.ln() - mu) / sigma;
                -x.ln() - sigma.ln() - 0.5 * (2.0 * PI).ln() - 0.5 * z * z
            }
            Prior::Uniform { low, high } => {
                if x < *low || x > *high {
                    f64::NEG_INFINITY
                } else {
                    -(high - low).ln()
                }
            }
            Prior::Gamma { shape, rate } => {
                if x <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                shape * rate.ln() - ln_gamma(*shape) + (shape - 1.0) * x.ln() - rate * x
            }
            Prior::HalfNormal { sd } => {
                if x < 0.0 {
                    return f64::NEG_INFINITY;
                }
                let z = x / sd;
                0.5 * (2.0 / PI).ln() - sd.ln() - 0.5 * z * z
            }
            Prior::Exponential { rate } => {
                if x < 0.0 {
                    f64::NEG_INFINITY
                } else {
                    rate.ln() - rate * x
                }
            }
        }
    }

    /// Draw one value from the prior
    ///
    /// Hyperparameters are assumed valid; call [Prior::validate] first.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            Prior::Normal { mean, sd } => {
                let dist = Normal::new(*mean, *sd).unwrap_or(Normal::new(0.0, 1.0).unwrap());
                dist.sample(rng)
            }
            Prior::LogNormal { mu, sigma } => {
                let dist = LogNormal::new(*mu, *sigma).unwrap_or(LogNormal::new(0.0, 1.0).unwrap());
                dist.sample(rng)
            }
            Prior::Uniform { low, high } => rng.gen_range(*low..*high),
            Prior::Gamma { shape, rate } => {
                let dist =
                    Gamma::new(*shape, 1.0 / rate).unwrap_or(Gamma::new(1.0, 1.0).unwrap());
                dist.sample(rng)
            }
            Prior::HalfNormal { sd } => {
                let dist = Normal::new(0.0, *sd).unwrap_or(Normal::new(0.0, 1.0).unwrap());
                dist.sample(rng).abs()
            }
            Prior::Exponential { rate } => {
                let dist = Exp::new(*rate).unwrap_or(Exp::new(1.0).unwrap());
                dist.sample(rng)
            }
        }
    }

    /// Mean of the distribution
    pub fn mean(&self) -> f64 {
        match self {
            Prior::Normal { mean, .. } => *mean,
            Prior::LogNormal { mu, sigma } => (mu + 0.5 * sigma * sigma).exp(),
            Prior::Uniform { low, high } => 0.5 * (low + high),
            Prior::Gamma { shape, rate } => shape / rate,
            Prior::HalfNormal { sd } => sd * (2.0 / PI).sqrt(),
            Prior::Exponential { rate } => 1.0 / rate,
        }
    }

    /// Standard deviation of the distribution
    pub fn sd(&self) -> f64 {
        match self {
            Prior::Normal { sd, .. } => *sd,
            Prior::LogNormal { mu, sigma } => {
                let s2 = sigma * sigma;
                ((s2.exp() - 1.0) * (2.0 * mu + s2).exp()).sqrt()
            }
            Prior::Uniform { low, high } => (high - low) / 12.0_f64.sqrt(),
            Prior::Gamma { shape, rate } => shape.sqrt() / rate,
            Prior::HalfNormal { sd } => sd * (1.0 - 2.0 / PI).sqrt(),
            Prior::Exponential { rate } => 1.0 / rate,
        }
    }

    /// A central box covering the bulk of the prior mass, used to seed
    /// Sobol-initialized chains
    ///
    /// Mean ± 2 standard deviations, clipped to the support boundary.
    pub fn central_interval(&self) -> (f64, f64) {
        if let Prior::Uniform { low, high } = self {
            return (*low, *high);
        }
        let mean = self.mean();
        let sd = self.sd();
        let mut low = mean - 2.0 * sd;
        let high = mean + 2.0 * sd;
        if self.support_nonnegative() && low < 0.0 {
            low = mean * 1e-3;
        }
        (low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_validate_rejects_bad_hyperparameters() {
        assert!(Prior::Normal { mean: 0.0, sd: -1.0 }.validate("a").is_err());
        assert!(Prior::Gamma {
            shape: 2.0,
            rate: -3.0
        }
        .validate("a")
        .is_err());
        assert!(Prior::Uniform {
            low: 1.0,
            high: 1.0
        }
        .validate("a")
        .is_err());
        assert!(Prior::Uniform {
            low: 0.0,
            high: 1.0
        }
        .validate("a")
        .is_ok());
    }

    #[test]
    fn test_support() {
        assert!(!Prior::Normal { mean: 0.0, sd: 1.0 }.support_nonnegative());
        assert!(Prior::Gamma {
            shape: 2.0,
            rate: 1.0
        }
        .support_nonnegative());
        assert!(Prior::Uniform {
            low: 0.0,
            high: 5.0
        }
        .support_nonnegative());
        assert!(!Prior::Uniform {
            low: -1.0,
            high: 5.0
        }
        .support_nonnegative());
    }

    #[test]
    fn test_normal_log_pdf() {
        // Standard normal at 0: -0.5*ln(2π)
        let p = Prior::Normal { mean: 0.0, sd: 1.0 };
        assert!((p.log_pdf(0.0) + 0.5 * (2.0 * PI).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_gamma_log_pdf() {
        // Gamma(1, λ) is Exponential(λ)
        let g = Prior::Gamma {
            shape: 1.0,
            rate: 2.0,
        };
        let e = Prior::Exponential { rate: 2.0 };
        assert!((g.log_pdf(0.7) - e.log_pdf(0.7)).abs() < 1e-10);
        assert!(g.log_pdf(-1.0).is_infinite());
    }

    #[test]
    fn test_sample_respects_support() {
        let mut rng = StdRng::seed_from_u64(42);
        let p = Prior::LogNormal {
            mu: 0.0,
            sigma: 1.0,
        };
        for _ in 0..100 {
            assert!(p.sample(&mut rng) > 0.0);
        }
    }

    #[test]
    fn test_sample_mean_close_to_analytical() {
        let mut rng = StdRng::seed_from_u64(7);
        let p = Prior::Gamma {
            shape: 4.0,
            rate: 2.0,
        };
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| p.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 2.0).abs() < 0.05);
    }
}
