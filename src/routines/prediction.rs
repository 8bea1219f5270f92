//! Posterior- and prior-predictive trajectory ensembles
//!
//! Each draw picks one parameter vector (uniformly from the pooled posterior,
//! or from the priors), integrates the ODE over a dense output grid for every
//! replicate, and yields the trajectories tagged with the draw index and
//! replicate id. Draws are independent and deterministically seeded by their
//! index, so the ensemble iterator is lazy, finite and restartable, and the
//! parallel collector produces the same trajectories as the iterator.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::spec::{ModelSpec, ParameterLayout};
use crate::routines::data::ReplicateSet;
use crate::simulator::integrate_grid;
use crate::structs::posterior::Posterior;

/// Where predictive parameter draws come from
#[derive(Clone, Copy)]
pub enum DrawSource<'a> {
    /// Uniform draws from the pooled posterior samples across chains
    Posterior(&'a Posterior),
    /// Independent draws from each parameter's prior; prior-predictive mode
    Prior,
}

/// One simulated trajectory: a parameter draw integrated over the output grid
/// for one replicate
#[derive(Debug, Clone)]
pub struct PredictiveTrajectory {
    pub draw: usize,
    pub replicate: String,
    pub times: Vec<f64>,
    /// Integrated states, (time point × state)
    pub states: Array2<f64>,
    /// Observed-variable view of the states, (time point × observed variable)
    pub observed: Array2<f64>,
}

/// All trajectories produced by one parameter draw
#[derive(Debug, Clone)]
pub struct PredictiveDraw {
    pub index: usize,
    pub parameters: Vec<f64>,
    pub trajectories: Vec<PredictiveTrajectory>,
}

pub struct PosteriorPredictor<'a> {
    spec: &'a ModelSpec,
    data: &'a ReplicateSet,
    layout: ParameterLayout,
    grid: Vec<f64>,
    seed: u64,
}

impl<'a> PosteriorPredictor<'a> {
    /// Set up prediction over `grid`; the grid is expected to start at the
    /// time the initial conditions refer to (normally the first observation)
    pub fn new(
        spec: &'a ModelSpec,
        data: &'a ReplicateSet,
        grid: Vec<f64>,
        seed: u64,
    ) -> Result<Self> {
        if grid.len() < 2 {
            return Err(Error::validation(
                "prediction requires an output grid with at least two points",
            ));
        }
        if grid.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::validation(
                "prediction output grid must be strictly increasing",
            ));
        }
        let layout = spec.layout(data)?;
        Ok(PosteriorPredictor {
            spec,
            data,
            layout,
            grid,
            seed,
        })
    }

    /// Lazy ensemble of exactly `n` predictive draws
    ///
    /// Restartable: calling this again with the same source and `n` replays
    /// the identical sequence.
    pub fn ensemble(&'a self, source: DrawSource<'a>, n: usize) -> Ensemble<'a> {
        Ensemble {
            predictor: self,
            source,
            n,
            next: 0,
        }
    }

    /// Collect `n` draws in parallel; same trajectories as [Self::ensemble],
    /// in the same order
    pub fn collect_par(&self, source: DrawSource<'_>, n: usize) -> Vec<Result<PredictiveDraw>> {
        (0..n)
            .into_par_iter()
            .map(|index| self.simulate_draw(source, index))
            .collect()
    }

    /// Simulate the `index`-th predictive draw
    ///
    /// An integration failure is returned as an error tagged with the draw
    /// index; it does not affect any other draw.
    pub fn simulate_draw(&self, source: DrawSource<'_>, index: usize) -> Result<PredictiveDraw> {
        let mut rng = StdRng::seed_from_u64(
            self.seed
                .wrapping_add(0x9E37_79B9_7F4A_7C15_u64.wrapping_mul(index as u64 + 1)),
        );

        let full: Vec<f64> = match source {
            DrawSource::Posterior(posterior) => {
                let pick = rng.gen_range(0..posterior.total_draws());
                posterior.draw(pick)
            }
            DrawSource::Prior => self
                .layout
                .priors()
                .iter()
                .map(|p| p.sample(&mut rng))
                .collect(),
        };

        let ode = self.spec.ode();
        let mut trajectories = Vec::with_capacity(self.data.len());
        for (k, replicate) in self.data.iter().enumerate() {
            let params = self.layout.resolve(k, &full);
            let y0 = self.spec.initial_state(replicate, &params);
            let states = integrate_grid(
                ode,
                &params[..ode.nparams()],
                &replicate.constants,
                &y0,
                &self.grid,
            )
            .map_err(|e| Error::Integration {
                draw: index,
                reason: format!("replicate '{}' {}", replicate.id, e),
            })?;

            let mut observed = Array2::zeros((self.grid.len(), self.spec.observed().len()));
            for i in 0..self.grid.len() {
                let row = states.row(i).to_vec();
                for (j, value) in self
                    .spec
                    .observe(&replicate.constants, &row)
                    .into_iter()
                    .enumerate()
                {
                    observed[(i, j)] = value;
                }
            }

            trajectories.push(PredictiveTrajectory {
                draw: index,
                replicate: replicate.id.clone(),
                times: self.grid.clone(),
                states,
                observed,
            });
        }

        Ok(PredictiveDraw {
            index,
            parameters: full,
            trajectories,
        })
    }
}

/// Lazy, finite iterator over predictive draws
pub struct Ensemble<'a> {
    predictor: &'a PosteriorPredictor<'a>,
    source: DrawSource<'a>,
    n: usize,
    next: usize,
}

impl Iterator for Ensemble<'_> {
    type Item = Result<PredictiveDraw>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.n {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.predictor.simulate_draw(self.source, index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Ensemble<'_> {}
