use crate::routines::data::Constants;

/// Right-hand side of an ODE system `dy/dt = f(t, y; p)`
///
/// Implementations are pure: the derivative depends only on time, state,
/// parameters and the replicate-level [Constants]. The state and derivative
/// slices both have length [OdeSystem::ndim]; the parameter slice has length
/// [OdeSystem::nparams], in the order declared by the
/// [ModelSpec](crate::model::spec::ModelSpec).
pub trait OdeSystem: Send + Sync {
    /// Number of integrated state variables
    fn ndim(&self) -> usize;

    /// Number of parameters the derivative expects
    fn nparams(&self) -> usize;

    /// Evaluate `f(t, y; p)` and write the derivative into `dy`
    fn rhs(&self, t: f64, y: &[f64], p: &[f64], consts: &Constants, dy: &mut [f64]);
}

impl<F> OdeSystem for (usize, usize, F)
where
    F: Fn(f64, &[f64], &[f64], &Constants, &mut [f64]) + Send + Sync,
{
    fn ndim(&self) -> usize {
        self.0
    }

    fn nparams(&self) -> usize {
        self.1
    }

    fn rhs(&self, t: f64, y: &[f64], p: &[f64], consts: &Constants, dy: &mut [f64]) {
        (self.2)(t, y, p, consts, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_system() {
        // dy/dt = -k*y as a (ndim, nparams, closure) triple
        let sys = (1usize, 1usize, |_t: f64,
                                    y: &[f64],
                                    p: &[f64],
                                    _c: &Constants,
                                    dy: &mut [f64]| {
            dy[0] = -p[0] * y[0];
        });
        let mut dy = [0.0];
        sys.rhs(0.0, &[2.0], &[0.5], &Constants::new(), &mut dy);
        assert_eq!(dy[0], -1.0);
        assert_eq!(sys.ndim(), 1);
        assert_eq!(sys.nparams(), 1);
    }
}
