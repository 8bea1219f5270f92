//! Ready-made population models
//!
//! The four classical systems: logistic growth, two-species competition,
//! predator-prey, and an SIR epidemic. Each implements
//! [OdeSystem](super::ode::OdeSystem) with a documented parameter order.

use crate::model::ode::OdeSystem;
use crate::routines::data::Constants;

/// Logistic growth, `dN/dt = r N (1 - N/K)`
///
/// Parameters, in order: growth rate `r`, carrying capacity `K`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logistic;

impl OdeSystem for Logistic {
    fn ndim(&self) -> usize {
        1
    }

    fn nparams(&self) -> usize {
        2
    }

    fn rhs(&self, _t: f64, y: &[f64], p: &[f64], _consts: &Constants, dy: &mut [f64]) {
        let (r, k) = (p[0], p[1]);
        dy[0] = r * y[0] * (1.0 - y[0] / k);
    }
}

/// Two-species Lotka-Volterra competition
///
/// ```text
/// dN1/dt = r1 N1 (1 - (N1 + a12 N2) / K1)
/// dN2/dt = r2 N2 (1 - (N2 + a21 N1) / K2)
/// ```
///
/// Parameters, in order: `r1`, `K1`, `a12`, `r2`, `K2`, `a21`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Competition;

impl OdeSystem for Competition {
    fn ndim(&self) -> usize {
        2
    }

    fn nparams(&self) -> usize {
        6
    }

    fn rhs(&self, _t: f64, y: &[f64], p: &[f64], _consts: &Constants, dy: &mut [f64]) {
        let (r1, k1, a12, r2, k2, a21) = (p[0], p[1], p[2], p[3], p[4], p[5]);
        dy[0] = r1 * y[0] * (1.0 - (y[0] + a12 * y[1]) / k1);
        dy[1] = r2 * y[1] * (1.0 - (y[1] + a21 * y[0]) / k2);
    }
}

/// Lotka-Volterra predator-prey
///
/// ```text
/// dH/dt = r H - a H P
/// dP/dt = b a H P - m P
/// ```
///
/// Parameters, in order: prey growth `r`, attack rate `a`, conversion
/// efficiency `b`, predator mortality `m`. State order: prey `H`, predator `P`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredatorPrey;

impl OdeSystem for PredatorPrey {
    fn ndim(&self) -> usize {
        2
    }

    fn nparams(&self) -> usize {
        4
    }

    fn rhs(&self, _t: f64, y: &[f64], p: &[f64], _consts: &Constants, dy: &mut [f64]) {
        let (r, a, b, m) = (p[0], p[1], p[2], p[3]);
        let (h, pr) = (y[0], y[1]);
        dy[0] = r * h - a * h * pr;
        dy[1] = b * a * h * pr - m * pr;
    }
}

/// The recovery term of the [Sir] infection equation
///
/// Standard SIR takes the recovery flux as `gamma * I`, but course material
/// that integrates only (S, I) and derives R sometimes writes it as
/// `gamma * R = gamma * (N0 - S - I)`, likely a transcription slip. The two
/// models fit differently, so the choice is mandatory: there is no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTerm {
    /// Standard SIR: recovery flux `gamma * I`
    GammaI,
    /// Recovery flux `gamma * (N0 - S - I)`
    GammaR,
}

/// SIR epidemic with two integrated states (S, I)
///
/// ```text
/// dS/dt = -beta S I / N0
/// dI/dt =  beta S I / N0 - recovery
/// ```
///
/// R is never integrated; it is derived as `N0 - S - I`. The total population
/// `N0` is a replicate constant (column `n0!` in the datafile) and is held
/// fixed, enforcing S + I + R = N0. Parameters, in order: transmission rate
/// `beta`, recovery rate `gamma`.
#[derive(Debug, Clone, Copy)]
pub struct Sir {
    recovery: RecoveryTerm,
}

impl Sir {
    pub fn new(recovery: RecoveryTerm) -> Self {
        Sir { recovery }
    }

    /// Derived recovered compartment, `R = N0 - S - I`
    pub fn recovered(consts: &Constants, y: &[f64]) -> f64 {
        let n0 = consts.get("n0").unwrap_or(f64::NAN);
        n0 - y[0] - y[1]
    }
}

impl OdeSystem for Sir {
    fn ndim(&self) -> usize {
        2
    }

    fn nparams(&self) -> usize {
        2
    }

    fn rhs(&self, _t: f64, y: &[f64], p: &[f64], consts: &Constants, dy: &mut [f64]) {
        let (beta, gamma) = (p[0], p[1]);
        let n0 = consts.get("n0").unwrap_or(f64::NAN);
        let (s, i) = (y[0], y[1]);
        let infection = beta * s * i / n0;
        let recovery = match self.recovery {
            RecoveryTerm::GammaI => gamma * i,
            RecoveryTerm::GammaR => gamma * (n0 - s - i),
        };
        dy[0] = -infection;
        dy[1] = infection - recovery;
    }
}
