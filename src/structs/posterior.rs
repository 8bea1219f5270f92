use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};

/// Posterior samples from one calibration run
///
/// One matrix per chain, draws in rows and parameters in columns, with the
/// per-draw log-posterior trace alongside. Produced by a
/// [Calibrator](crate::routines::calibration::Calibrator) and consumed
/// read-only by diagnostics and prediction.
#[derive(Debug, Clone)]
pub struct Posterior {
    names: Vec<String>,
    chains: Vec<Array2<f64>>,
    logp: Vec<Vec<f64>>,
    failed_draws: usize,
    total_proposals: usize,
    seed: u64,
}

/// Summary statistics for one parameter, pooled across chains
#[derive(Debug, Clone)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub median: f64,
    pub lower95: f64,
    pub upper95: f64,
}

impl Posterior {
    pub fn new(
        names: Vec<String>,
        chains: Vec<Array2<f64>>,
        logp: Vec<Vec<f64>>,
        failed_draws: usize,
        total_proposals: usize,
        seed: u64,
    ) -> Result<Self> {
        if chains.is_empty() {
            return Err(Error::validation("posterior requires at least one chain"));
        }
        let ndraws = chains[0].nrows();
        if ndraws == 0 {
            return Err(Error::validation(
                "posterior requires at least one retained draw per chain",
            ));
        }
        for (c, chain) in chains.iter().enumerate() {
            if chain.ncols() != names.len() {
                return Err(Error::Validation(format!(
                    "chain {} has {} columns for {} parameter names",
                    c,
                    chain.ncols(),
                    names.len()
                )));
            }
            if chain.nrows() != ndraws {
                return Err(Error::Validation(format!(
                    "chain {} has {} draws, expected {}",
                    c,
                    chain.nrows(),
                    ndraws
                )));
            }
        }
        if logp.len() != chains.len() || logp.iter().any(|l| l.len() != ndraws) {
            return Err(Error::validation(
                "log-posterior trace does not match the chain shape",
            ));
        }
        Ok(Posterior {
            names,
            chains,
            logp,
            failed_draws,
            total_proposals,
            seed,
        })
    }

    pub fn nchains(&self) -> usize {
        self.chains.len()
    }

    /// Draws per chain
    pub fn ndraws(&self) -> usize {
        self.chains[0].nrows()
    }

    pub fn nparams(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn chain(&self, c: usize) -> ArrayView2<'_, f64> {
        self.chains[c].view()
    }

    /// Per-draw log-posterior trace of chain `c`
    pub fn logp(&self, c: usize) -> &[f64] {
        &self.logp[c]
    }

    /// Proposals rejected because the ODE could not be integrated
    pub fn failed_draws(&self) -> usize {
        self.failed_draws
    }

    pub fn total_proposals(&self) -> usize {
        self.total_proposals
    }

    /// Total draw count pooled across chains
    pub fn total_draws(&self) -> usize {
        self.nchains() * self.ndraws()
    }

    /// The `index`-th pooled draw, chain-major
    pub fn draw(&self, index: usize) -> Vec<f64> {
        let n = self.ndraws();
        let chain = index / n;
        let row = index % n;
        self.chains[chain].row(row).to_vec()
    }

    /// All draws stacked into one (total draws × parameters) matrix
    pub fn pooled(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.total_draws(), self.nparams()));
        let n = self.ndraws();
        for (c, chain) in self.chains.iter().enumerate() {
            out.slice_mut(ndarray::s![c * n..(c + 1) * n, ..])
                .assign(chain);
        }
        out
    }

    /// Pooled mean of parameter `j`
    pub fn mean(&self, j: usize) -> f64 {
        let total: f64 = self
            .chains
            .iter()
            .map(|chain| chain.column(j).sum())
            .sum();
        total / self.total_draws() as f64
    }

    /// Pooled standard deviation of parameter `j`
    pub fn sd(&self, j: usize) -> f64 {
        let mean = self.mean(j);
        let ss: f64 = self
            .chains
            .iter()
            .map(|chain| chain.column(j).mapv(|x| (x - mean).powi(2)).sum())
            .sum();
        (ss / (self.total_draws() as f64 - 1.0)).sqrt()
    }

    /// Pooled summary per parameter: mean, sd, median and central 95% interval
    pub fn summary(&self) -> Vec<ParameterSummary> {
        let pooled = self.pooled();
        self.names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let mut values: Vec<f64> = pooled.column(j).to_vec();
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                ParameterSummary {
                    name: name.clone(),
                    mean: self.mean(j),
                    sd: self.sd(j),
                    median: percentile(&values, 0.5),
                    lower95: percentile(&values, 0.025),
                    upper95: percentile(&values, 0.975),
                }
            })
            .collect()
    }

    /// Per-chain means of parameter `j`, used by the convergence diagnostics
    pub fn chain_means(&self, j: usize) -> Vec<f64> {
        self.chains
            .iter()
            .map(|chain| chain.column(j).mean().unwrap_or(f64::NAN))
            .collect()
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_chain() -> Posterior {
        let a = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let b = array![[3.0, 30.0], [4.0, 40.0], [5.0, 50.0]];
        Posterior::new(
            vec!["x".to_string(), "y".to_string()],
            vec![a, b],
            vec![vec![0.0; 3], vec![0.0; 3]],
            0,
            0,
            42,
        )
        .unwrap()
    }

    #[test]
    fn test_shapes_validated() {
        let a = array![[1.0, 10.0]];
        let b = array![[1.0]];
        assert!(Posterior::new(
            vec!["x".to_string(), "y".to_string()],
            vec![a, b],
            vec![vec![0.0], vec![0.0]],
            0,
            0,
            0,
        )
        .is_err());
    }

    #[test]
    fn test_empty_chains_rejected() {
        // A zero-row chain would leave downstream draw picking with nothing
        // to index into
        let empty = Array2::<f64>::zeros((0, 1));
        assert!(Posterior::new(
            vec!["x".to_string()],
            vec![empty],
            vec![vec![]],
            0,
            0,
            0,
        )
        .is_err());
    }

    #[test]
    fn test_pooled_statistics() {
        let p = two_chain();
        assert_eq!(p.total_draws(), 6);
        assert!((p.mean(0) - 3.0).abs() < 1e-12);
        assert!((p.mean(1) - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_draw_indexing_is_chain_major() {
        let p = two_chain();
        assert_eq!(p.draw(0), vec![1.0, 10.0]);
        assert_eq!(p.draw(2), vec![3.0, 30.0]);
        assert_eq!(p.draw(3), vec![3.0, 30.0]);
        assert_eq!(p.draw(5), vec![5.0, 50.0]);
    }

    #[test]
    fn test_summary_quantiles() {
        let p = two_chain();
        let summary = p.summary();
        assert_eq!(summary[0].name, "x");
        assert!((summary[0].median - 3.0).abs() < 1e-12);
        assert!(summary[0].lower95 >= 1.0 && summary[0].upper95 <= 5.0);
    }
}
