//! Numerical integration of an [OdeSystem] over an output time grid
//!
//! Integration is delegated to an adaptive Dormand-Prince 4(5) stepper. The
//! grid is walked interval by interval, carrying the state forward, so the
//! returned matrix holds the solution exactly at the requested times.

use ndarray::Array2;
use ode_solvers::{DVector, Dopri5};

use crate::model::ode::OdeSystem;
use crate::routines::data::Constants;

pub type T = f64;
pub type V = DVector<f64>;

const RTOL: f64 = 1e-6;
const ATOL: f64 = 1e-6;

/// A single-interval solver failure: divergence, step-size underflow, or a
/// non-finite state
///
/// This is deliberately not a [crate::error::Error]: the caller decides
/// whether the failure is a per-draw rejection or fatal, and tags it with its
/// draw index.
#[derive(Debug, Clone)]
pub struct IntegrationError {
    pub time: f64,
    pub reason: String,
}

impl std::fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at t = {}: {}", self.time, self.reason)
    }
}

#[derive(Clone, Copy)]
struct Model<'a> {
    ode: &'a dyn OdeSystem,
    params: &'a [f64],
    consts: &'a Constants,
}

impl ode_solvers::System<T, V> for Model<'_> {
    fn system(&self, t: T, y: &V, dy: &mut V) {
        self.ode
            .rhs(t, y.as_slice(), self.params, self.consts, dy.as_mut_slice());
    }
}

/// Advance the state from `ti` to `tf` with the adaptive stepper
fn step(model: Model, x: V, ti: f64, tf: f64) -> Result<V, IntegrationError> {
    if ti == tf {
        return Ok(x);
    }
    let mut stepper = Dopri5::new(model, ti, tf, tf - ti, x, RTOL, ATOL);
    match stepper.integrate() {
        Ok(_stats) => {
            let y = stepper
                .y_out()
                .last()
                .cloned()
                .ok_or_else(|| IntegrationError {
                    time: tf,
                    reason: "solver produced no output".to_string(),
                })?;
            if y.iter().any(|v| !v.is_finite()) {
                return Err(IntegrationError {
                    time: tf,
                    reason: "non-finite state".to_string(),
                });
            }
            Ok(y)
        }
        Err(e) => Err(IntegrationError {
            time: tf,
            reason: e.to_string(),
        }),
    }
}

/// Integrate the ODE from `y0` at `grid[0]` across the whole grid
///
/// Returns a (time point × state) matrix whose first row is `y0`. The grid
/// must be non-decreasing. A solver failure or a non-finite state anywhere in
/// the span fails the whole trajectory.
pub fn integrate_grid(
    ode: &dyn OdeSystem,
    params: &[f64],
    consts: &Constants,
    y0: &[f64],
    grid: &[f64],
) -> Result<Array2<f64>, IntegrationError> {
    let ndim = ode.ndim();
    debug_assert_eq!(y0.len(), ndim);

    if y0.iter().any(|v| !v.is_finite()) {
        return Err(IntegrationError {
            time: *grid.first().unwrap_or(&0.0),
            reason: "non-finite initial state".to_string(),
        });
    }

    let model = Model {
        ode,
        params,
        consts,
    };

    let mut out = Array2::zeros((grid.len(), ndim));
    if grid.is_empty() {
        return Ok(out);
    }
    let mut x = V::from_vec(y0.to_vec());
    for (j, &v) in y0.iter().enumerate() {
        out[(0, j)] = v;
    }
    for i in 1..grid.len() {
        let (ti, tf) = (grid[i - 1], grid[i]);
        if tf < ti {
            return Err(IntegrationError {
                time: tf,
                reason: "output grid is not increasing".to_string(),
            });
        }
        x = step(model, x, ti, tf)?;
        for (j, &v) in x.as_slice().iter().enumerate() {
            out[(i, j)] = v;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::systems::{Logistic, RecoveryTerm, Sir};

    #[test]
    fn test_logistic_matches_closed_form() {
        let grid: Vec<f64> = (0..=50).map(|i| i as f64).collect();
        let (r, k, n0) = (0.2, 500.0, 10.0);
        let traj = integrate_grid(&Logistic, &[r, k], &Constants::new(), &[n0], &grid).unwrap();

        // N(t) = K / (1 + (K/N0 - 1) exp(-rt))
        for (i, &t) in grid.iter().enumerate() {
            let expected = k / (1.0 + (k / n0 - 1.0) * (-r * t).exp());
            assert!(
                (traj[(i, 0)] - expected).abs() < 1e-3 * expected,
                "t = {}: {} vs {}",
                t,
                traj[(i, 0)],
                expected
            );
        }
    }

    #[test]
    fn test_first_row_is_initial_state() {
        let grid = vec![0.0, 1.0, 2.0];
        let traj = integrate_grid(
            &Logistic,
            &[0.2, 500.0],
            &Constants::new(),
            &[10.0],
            &grid,
        )
        .unwrap();
        assert_eq!(traj[(0, 0)], 10.0);
        assert_eq!(traj.nrows(), 3);
    }

    #[test]
    fn test_sir_mass_conserved() {
        let mut consts = Constants::new();
        consts.insert("n0", 763.0);
        let grid: Vec<f64> = (0..=14).map(|i| i as f64).collect();
        let traj = integrate_grid(
            &Sir::new(RecoveryTerm::GammaI),
            &[1.7, 0.45],
            &consts,
            &[760.0, 3.0],
            &grid,
        )
        .unwrap();
        for i in 0..traj.nrows() {
            let r = 763.0 - traj[(i, 0)] - traj[(i, 1)];
            assert!(r >= -1e-6, "derived R went negative at row {}", i);
        }
    }

    #[test]
    fn test_non_finite_initial_state_rejected() {
        let grid = vec![0.0, 1.0];
        let err = integrate_grid(
            &Logistic,
            &[0.2, 500.0],
            &Constants::new(),
            &[f64::NAN],
            &grid,
        )
        .unwrap_err();
        assert!(err.reason.contains("non-finite"));
    }
}
