//! Declarative model specification
//!
//! A [ModelSpec] bundles the ODE system, the parameters with their priors,
//! the per-state initial-condition policy, the mapping from integrated state
//! to observed variables, and the observation noise model. It is built through
//! [ModelSpecBuilder] which validates the whole bundle before any sampling
//! run can start.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::ode::OdeSystem;
use crate::model::prior::Prior;
use crate::routines::data::{Constants, ReplicateSet, TimeSeries};

/// Whether a parameter is common to all replicates or free per replicate
///
/// Per-replicate parameters (typically estimated initial conditions) get one
/// slot in the estimated vector for every replicate in the fit; shared
/// parameters get exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterRole {
    Shared,
    PerReplicate,
}

/// A named parameter with its prior, domain constraint and role
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub prior: Prior,
    /// Strictly positive domain; requires a prior with non-negative support
    pub positive: bool,
    pub role: ParameterRole,
}

impl Parameter {
    pub fn new(name: impl Into<String>, prior: Prior) -> Self {
        Parameter {
            name: name.into(),
            prior,
            positive: false,
            role: ParameterRole::Shared,
        }
    }

    /// Constrain the parameter to the positive half line
    pub fn positive(mut self) -> Self {
        self.positive = true;
        self
    }

    /// Estimate the parameter independently for every replicate
    pub fn per_replicate(mut self) -> Self {
        self.role = ParameterRole::PerReplicate;
        self
    }
}

/// How one integrated state gets its initial value
#[derive(Clone)]
pub enum InitialCondition {
    /// The first observation of the given observed-variable column
    FirstObservation(usize),
    /// A fixed, known value
    Fixed(f64),
    /// The named parameter supplies the value; usually a per-replicate one
    Estimated(String),
    /// Algebraically derived from the replicate constants and the other
    /// states' initial values, e.g. `S0 = N0 - I0`. Evaluated after all
    /// non-derived policies; derived states may not depend on each other.
    Derived(fn(&Constants, &[f64]) -> f64),
}

impl std::fmt::Debug for InitialCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitialCondition::FirstObservation(v) => write!(f, "FirstObservation({})", v),
            InitialCondition::Fixed(x) => write!(f, "Fixed({})", x),
            InitialCondition::Estimated(p) => write!(f, "Estimated({})", p),
            InitialCondition::Derived(_) => write!(f, "Derived(..)"),
        }
    }
}

/// How one observed variable is read off the integrated state
#[derive(Clone)]
pub enum ObservedVariable {
    /// Directly one of the integrated states
    State(usize),
    /// Derived from the constants and the full state, e.g. R = N0 - S - I
    Derived(fn(&Constants, &[f64]) -> f64),
}

impl std::fmt::Debug for ObservedVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservedVariable::State(i) => write!(f, "State({})", i),
            ObservedVariable::Derived(_) => write!(f, "Derived(..)"),
        }
    }
}

/// Gaussian observation noise, applied independently to every observed value
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseModel {
    /// One shared scale for all observed variables
    Additive { sd: f64 },
    /// One scale per observed variable, in column order
    AdditivePerVariable { sd: Vec<f64> },
    /// Scale proportional to the predicted value
    Proportional { cv: f64 },
}

impl NoiseModel {
    fn validate(&self, nvars: usize) -> Result<()> {
        match self {
            NoiseModel::Additive { sd } => {
                if !(sd.is_finite() && *sd > 0.0) {
                    return Err(Error::Validation(format!(
                        "additive noise scale must be finite and positive, got {}",
                        sd
                    )));
                }
            }
            NoiseModel::AdditivePerVariable { sd } => {
                if sd.len() != nvars {
                    return Err(Error::Validation(format!(
                        "noise model declares {} scales for {} observed variables",
                        sd.len(),
                        nvars
                    )));
                }
                if sd.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                    return Err(Error::Validation(
                        "all per-variable noise scales must be finite and positive".to_string(),
                    ));
                }
            }
            NoiseModel::Proportional { cv } => {
                if !(cv.is_finite() && *cv > 0.0) {
                    return Err(Error::Validation(format!(
                        "proportional noise cv must be finite and positive, got {}",
                        cv
                    )));
                }
            }
        }
        Ok(())
    }

    /// Noise standard deviation for observed variable `j` given its prediction
    pub fn sd(&self, j: usize, prediction: f64) -> f64 {
        match self {
            NoiseModel::Additive { sd } => *sd,
            NoiseModel::AdditivePerVariable { sd } => sd[j],
            NoiseModel::Proportional { cv } => (cv * prediction.abs()).max(1e-10),
        }
    }
}

/// A validated model specification
///
/// Owns the ODE system and the parameter list. The first
/// [OdeSystem::nparams] declared parameters, in declaration order, are the
/// ones handed to the derivative; any further parameters may only serve
/// estimated initial conditions.
#[derive(Clone)]
pub struct ModelSpec {
    ode: Arc<dyn OdeSystem>,
    parameters: Vec<Parameter>,
    initial: Vec<InitialCondition>,
    observed: Vec<ObservedVariable>,
    noise: NoiseModel,
    by_name: HashMap<String, usize>,
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("ndim", &self.ode.ndim())
            .field("parameters", &self.parameters)
            .field("initial", &self.initial)
            .field("observed", &self.observed)
            .field("noise", &self.noise)
            .finish()
    }
}

impl ModelSpec {
    pub fn builder() -> ModelSpecBuilder {
        ModelSpecBuilder::default()
    }

    pub fn ode(&self) -> &dyn OdeSystem {
        self.ode.as_ref()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn observed(&self) -> &[ObservedVariable] {
        &self.observed
    }

    pub fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    /// Declared index of a parameter by name
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Initial state for one replicate, given the declared-order parameter
    /// values for that replicate
    pub fn initial_state(&self, replicate: &TimeSeries, params: &[f64]) -> Vec<f64> {
        let mut y0 = vec![0.0; self.ode.ndim()];
        for (j, policy) in self.initial.iter().enumerate() {
            y0[j] = match policy {
                InitialCondition::FirstObservation(v) => replicate.first_observation(*v),
                InitialCondition::Fixed(x) => *x,
                InitialCondition::Estimated(name) => {
                    // Existence checked at build time
                    params[self.by_name[name]]
                }
                InitialCondition::Derived(_) => 0.0,
            };
        }
        // Derived states see every non-derived state, whatever the order
        let snapshot = y0.clone();
        for (j, policy) in self.initial.iter().enumerate() {
            if let InitialCondition::Derived(f) = policy {
                y0[j] = f(&replicate.constants, &snapshot);
            }
        }
        y0
    }

    /// Map an integrated state vector to the observed-variable vector
    pub fn observe(&self, consts: &Constants, y: &[f64]) -> Vec<f64> {
        self.observed
            .iter()
            .map(|v| match v {
                ObservedVariable::State(i) => y[*i],
                ObservedVariable::Derived(f) => f(consts, y),
            })
            .collect()
    }

    /// Lay out the full estimated parameter vector for a given replicate set
    ///
    /// Shared parameters get one slot each; per-replicate parameters one slot
    /// per replicate, named `name.replicate`. Also checks that the observed
    /// variables declared here match the data's column count.
    pub fn layout(&self, data: &ReplicateSet) -> Result<ParameterLayout> {
        if self.observed.len() != data.nvars() {
            return Err(Error::Validation(format!(
                "model observes {} variable(s) but the data has {} column(s)",
                self.observed.len(),
                data.nvars()
            )));
        }

        let ids = data.ids();
        let mut names = Vec::new();
        let mut priors = Vec::new();
        let mut indices = vec![Vec::with_capacity(self.parameters.len()); ids.len()];

        for param in &self.parameters {
            match param.role {
                ParameterRole::Shared => {
                    let slot = names.len();
                    names.push(param.name.clone());
                    priors.push(param.prior);
                    for row in indices.iter_mut() {
                        row.push(slot);
                    }
                }
                ParameterRole::PerReplicate => {
                    for (k, id) in ids.iter().enumerate() {
                        let slot = names.len();
                        names.push(format!("{}.{}", param.name, id));
                        priors.push(param.prior);
                        indices[k].push(slot);
                    }
                }
            }
        }

        Ok(ParameterLayout {
            names,
            priors,
            indices,
        })
    }
}

/// The flattened estimated-parameter vector for one fit
///
/// Maps between the full vector the sampler walks in and the declared-order
/// per-replicate vectors the ODE and initial conditions consume.
#[derive(Debug, Clone)]
pub struct ParameterLayout {
    names: Vec<String>,
    priors: Vec<Prior>,
    /// `indices[replicate][declared] = slot in the full vector`
    indices: Vec<Vec<usize>>,
}

impl ParameterLayout {
    /// Length of the full estimated vector
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    /// Declared-order parameter values for replicate `k`
    pub fn resolve(&self, k: usize, full: &[f64]) -> Vec<f64> {
        self.indices[k].iter().map(|&slot| full[slot]).collect()
    }

    /// Sum of prior log-densities over the full vector
    pub fn log_prior(&self, full: &[f64]) -> f64 {
        self.priors
            .iter()
            .zip(full.iter())
            .map(|(prior, &x)| prior.log_pdf(x))
            .sum()
    }
}

/// Builder for [ModelSpec]; all validation happens in [ModelSpecBuilder::build]
#[derive(Default)]
pub struct ModelSpecBuilder {
    ode: Option<Arc<dyn OdeSystem>>,
    parameters: Vec<Parameter>,
    initial: Vec<InitialCondition>,
    observed: Vec<ObservedVariable>,
    noise: Option<NoiseModel>,
}

impl ModelSpecBuilder {
    pub fn ode(mut self, ode: impl OdeSystem + 'static) -> Self {
        self.ode = Some(Arc::new(ode));
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Initial-condition policy for the next state, in state order
    pub fn initial(mut self, policy: InitialCondition) -> Self {
        self.initial.push(policy);
        self
    }

    /// Declare the next observed variable, in datafile column order
    pub fn observe(mut self, variable: ObservedVariable) -> Self {
        self.observed.push(variable);
        self
    }

    pub fn noise(mut self, noise: NoiseModel) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn build(self) -> Result<ModelSpec> {
        let ode = self
            .ode
            .ok_or_else(|| Error::validation("no ODE system declared"))?;
        let noise = self
            .noise
            .ok_or_else(|| Error::validation("no noise model declared"))?;

        if ode.ndim() == 0 {
            return Err(Error::validation("ODE system has zero states"));
        }
        if self.parameters.len() < ode.nparams() {
            return Err(Error::Validation(format!(
                "ODE system expects {} parameter(s), only {} declared",
                ode.nparams(),
                self.parameters.len()
            )));
        }

        let mut by_name = HashMap::new();
        for (i, param) in self.parameters.iter().enumerate() {
            if by_name.insert(param.name.clone(), i).is_some() {
                return Err(Error::Validation(format!(
                    "duplicate parameter name '{}'",
                    param.name
                )));
            }
            param.prior.validate(&param.name)?;
            if param.positive && !param.prior.support_nonnegative() {
                return Err(Error::Validation(format!(
                    "parameter '{}' is positivity constrained but its prior {:?} has support over negative values",
                    param.name, param.prior
                )));
            }
        }

        if self.initial.len() != ode.ndim() {
            return Err(Error::Validation(format!(
                "ODE system has {} state(s) but {} initial condition(s) declared",
                ode.ndim(),
                self.initial.len()
            )));
        }
        for policy in &self.initial {
            if let InitialCondition::Estimated(name) = policy {
                if !by_name.contains_key(name.as_str()) {
                    return Err(Error::Validation(format!(
                        "initial condition refers to undeclared parameter '{}'",
                        name
                    )));
                }
            }
        }

        if self.observed.is_empty() {
            return Err(Error::validation("no observed variables declared"));
        }
        for variable in &self.observed {
            if let ObservedVariable::State(i) = variable {
                if *i >= ode.ndim() {
                    return Err(Error::Validation(format!(
                        "observed variable refers to state {} but the ODE has {} state(s)",
                        i,
                        ode.ndim()
                    )));
                }
            }
        }

        noise.validate(self.observed.len())?;

        Ok(ModelSpec {
            ode,
            parameters: self.parameters,
            initial: self.initial,
            observed: self.observed,
            noise,
            by_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::systems::{Logistic, RecoveryTerm, Sir};
    use ndarray::Array2;

    fn logistic_spec() -> ModelSpec {
        ModelSpec::builder()
            .ode(Logistic)
            .parameter(
                Parameter::new(
                    "r",
                    Prior::Uniform {
                        low: 0.0,
                        high: 1.0,
                    },
                )
                .positive(),
            )
            .parameter(
                Parameter::new(
                    "k",
                    Prior::Uniform {
                        low: 100.0,
                        high: 1000.0,
                    },
                )
                .positive(),
            )
            .initial(InitialCondition::FirstObservation(0))
            .observe(ObservedVariable::State(0))
            .noise(NoiseModel::Additive { sd: 5.0 })
            .build()
            .unwrap()
    }

    fn one_replicate(id: &str, n: usize) -> ReplicateSet {
        let times: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let obs = Array2::from_shape_fn((n, 1), |(i, _)| 10.0 + i as f64);
        let ts = TimeSeries::new(id, times, obs, Constants::new()).unwrap();
        ReplicateSet::new(vec![ts], vec!["n".to_string()]).unwrap()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ModelSpec::builder()
            .ode(Logistic)
            .parameter(Parameter::new(
                "r",
                Prior::Uniform {
                    low: 0.0,
                    high: 1.0,
                },
            ))
            .parameter(Parameter::new(
                "r",
                Prior::Uniform {
                    low: 0.0,
                    high: 2.0,
                },
            ))
            .initial(InitialCondition::FirstObservation(0))
            .observe(ObservedVariable::State(0))
            .noise(NoiseModel::Additive { sd: 1.0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_bad_hyperparameters_rejected_before_sampling() {
        let err = ModelSpec::builder()
            .ode(Logistic)
            .parameter(Parameter::new(
                "r",
                Prior::Gamma {
                    shape: 2.0,
                    rate: -1.0,
                },
            ))
            .parameter(Parameter::new(
                "k",
                Prior::Uniform {
                    low: 100.0,
                    high: 1000.0,
                },
            ))
            .initial(InitialCondition::FirstObservation(0))
            .observe(ObservedVariable::State(0))
            .noise(NoiseModel::Additive { sd: 1.0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_positivity_requires_nonnegative_support() {
        let err = ModelSpec::builder()
            .ode(Logistic)
            .parameter(Parameter::new("r", Prior::Normal { mean: 0.2, sd: 0.1 }).positive())
            .parameter(Parameter::new(
                "k",
                Prior::Uniform {
                    low: 100.0,
                    high: 1000.0,
                },
            ))
            .initial(InitialCondition::FirstObservation(0))
            .observe(ObservedVariable::State(0))
            .noise(NoiseModel::Additive { sd: 1.0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_arity_checked() {
        // Logistic has one state; two initial conditions must fail
        let err = ModelSpec::builder()
            .ode(Logistic)
            .parameter(Parameter::new(
                "r",
                Prior::Uniform {
                    low: 0.0,
                    high: 1.0,
                },
            ))
            .parameter(Parameter::new(
                "k",
                Prior::Uniform {
                    low: 100.0,
                    high: 1000.0,
                },
            ))
            .initial(InitialCondition::FirstObservation(0))
            .initial(InitialCondition::Fixed(0.0))
            .observe(ObservedVariable::State(0))
            .noise(NoiseModel::Additive { sd: 1.0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_layout_shared_only() {
        let spec = logistic_spec();
        let data = one_replicate("a", 5);
        let layout = spec.layout(&data).unwrap();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.names(), &["r".to_string(), "k".to_string()]);
        assert_eq!(layout.resolve(0, &[0.2, 500.0]), vec![0.2, 500.0]);
    }

    #[test]
    fn test_layout_per_replicate() {
        // SIR with shared beta/gamma and a per-replicate initial infected count
        let spec = ModelSpec::builder()
            .ode(Sir::new(RecoveryTerm::GammaI))
            .parameter(Parameter::new("beta", Prior::HalfNormal { sd: 1.0 }).positive())
            .parameter(Parameter::new("gamma", Prior::HalfNormal { sd: 1.0 }).positive())
            .parameter(
                Parameter::new(
                    "i0",
                    Prior::Uniform {
                        low: 0.0,
                        high: 20.0,
                    },
                )
                .positive()
                .per_replicate(),
            )
            .initial(InitialCondition::FirstObservation(0))
            .initial(InitialCondition::Estimated("i0".to_string()))
            .observe(ObservedVariable::State(0))
            .noise(NoiseModel::Additive { sd: 2.0 })
            .build()
            .unwrap();

        let times = vec![0.0, 1.0, 2.0];
        let obs = Array2::from_shape_fn((3, 1), |(i, _)| 760.0 - i as f64);
        let mut consts = Constants::new();
        consts.insert("n0", 763.0);
        let a = TimeSeries::new("a", times.clone(), obs.clone(), consts.clone()).unwrap();
        let b = TimeSeries::new("b", times, obs, consts).unwrap();
        let data = ReplicateSet::new(vec![a, b], vec!["s".to_string()]).unwrap();

        let layout = spec.layout(&data).unwrap();
        // beta, gamma, i0.a, i0.b
        assert_eq!(layout.len(), 4);
        assert_eq!(layout.names()[2], "i0.a");
        assert_eq!(layout.names()[3], "i0.b");

        let full = [0.4, 0.2, 3.0, 5.0];
        assert_eq!(layout.resolve(0, &full), vec![0.4, 0.2, 3.0]);
        assert_eq!(layout.resolve(1, &full), vec![0.4, 0.2, 5.0]);

        // Estimated initial condition resolves through the declared vector
        let y0 = spec.initial_state(data.get(1), &layout.resolve(1, &full));
        assert_eq!(y0, vec![760.0, 5.0]);
    }

    #[test]
    fn test_observed_mismatch_against_data() {
        let spec = logistic_spec();
        let times = vec![0.0, 1.0];
        let obs = Array2::from_shape_fn((2, 2), |_| 1.0);
        let ts = TimeSeries::new("a", times, obs, Constants::new()).unwrap();
        let data = ReplicateSet::new(vec![ts], vec!["x".to_string(), "y".to_string()]).unwrap();
        assert!(spec.layout(&data).is_err());
    }

    #[test]
    fn test_log_prior_sums() {
        let spec = logistic_spec();
        let data = one_replicate("a", 5);
        let layout = spec.layout(&data).unwrap();
        let lp = layout.log_prior(&[0.5, 500.0]);
        let expected = -(1.0_f64.ln()) - (900.0_f64.ln());
        assert!((lp - expected).abs() < 1e-12);
        assert!(layout.log_prior(&[-0.1, 500.0]).is_infinite());
    }
}
