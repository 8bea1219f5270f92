//! Tabular time-series data and its normalized, fit-ready shape
//!
//! A datafile holds rows of (time, replicate id, observed variables). The
//! shaper turns them into a [ReplicateSet]: one [TimeSeries] per replicate,
//! each carrying its replicate-level [Constants]. Validation happens here,
//! before any sampling is attempted.

pub mod parse;

use std::collections::HashMap;

use ndarray::Array2;

use crate::error::{Error, Result};

/// Replicate-level constants, e.g. a total population required by a
/// conservation law
///
/// Constants are held fixed during fitting; they are inputs to the ODE, never
/// estimated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constants {
    values: HashMap<String, f64>,
}

impl Constants {
    pub fn new() -> Self {
        Constants {
            values: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Fetch a constant the model requires, failing with the constant named
    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name).ok_or_else(|| {
            Error::Validation(format!("required replicate constant '{}' is missing", name))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The observations of one replicate: a strictly increasing time grid and a
/// (time point × observed variable) matrix
#[derive(Debug, Clone)]
pub struct TimeSeries {
    pub id: String,
    pub times: Vec<f64>,
    /// Rows are time points, columns observed variables
    pub observations: Array2<f64>,
    pub constants: Constants,
}

impl TimeSeries {
    pub fn new(
        id: impl Into<String>,
        times: Vec<f64>,
        observations: Array2<f64>,
        constants: Constants,
    ) -> Result<Self> {
        let id = id.into();
        if times.len() != observations.nrows() {
            return Err(Error::ShapeMismatch {
                replicate: id,
                expected: times.len(),
                found: observations.nrows(),
            });
        }
        if times.len() < 2 {
            return Err(Error::InsufficientData {
                replicate: id,
                nobs: times.len(),
            });
        }
        for w in times.windows(2) {
            if w[1] <= w[0] {
                return Err(Error::NonMonotonicTime {
                    replicate: id,
                    time: w[1],
                });
            }
        }
        Ok(TimeSeries {
            id,
            times,
            observations,
            constants,
        })
    }

    /// Number of time points
    pub fn nobs(&self) -> usize {
        self.times.len()
    }

    /// Number of observed variables
    pub fn nvars(&self) -> usize {
        self.observations.ncols()
    }

    /// First observation of variable `j`
    pub fn first_observation(&self, j: usize) -> f64 {
        self.observations[(0, j)]
    }
}

/// Which replicates of the datafile participate in the fit
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicatePolicy {
    /// Fit all replicates jointly; their time grids must have equal length
    All,
    /// Fit a single named replicate
    Single(String),
}

/// An ordered collection of [TimeSeries], the normalized input to the
/// calibrator
#[derive(Debug, Clone)]
pub struct ReplicateSet {
    replicates: Vec<TimeSeries>,
    /// Observed variable names, in datafile column order
    pub variables: Vec<String>,
}

impl ReplicateSet {
    /// Build a [ReplicateSet], enforcing the shape invariants
    ///
    /// When more than one replicate is present, all time grids must have the
    /// same number of points.
    pub fn new(replicates: Vec<TimeSeries>, variables: Vec<String>) -> Result<Self> {
        if replicates.is_empty() {
            return Err(Error::Validation(
                "a replicate set requires at least one replicate".to_string(),
            ));
        }
        for ts in &replicates {
            if ts.nvars() != variables.len() {
                return Err(Error::ShapeMismatch {
                    replicate: ts.id.clone(),
                    expected: variables.len(),
                    found: ts.nvars(),
                });
            }
        }
        if replicates.len() > 1 {
            let expected = replicates[0].nobs();
            for ts in &replicates[1..] {
                if ts.nobs() != expected {
                    return Err(Error::ShapeMismatch {
                        replicate: ts.id.clone(),
                        expected,
                        found: ts.nobs(),
                    });
                }
            }
        }
        Ok(ReplicateSet {
            replicates,
            variables,
        })
    }

    pub fn len(&self) -> usize {
        self.replicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimeSeries> {
        self.replicates.iter()
    }

    pub fn get(&self, index: usize) -> &TimeSeries {
        &self.replicates[index]
    }

    pub fn nvars(&self) -> usize {
        self.variables.len()
    }

    /// Total observation count across replicates
    pub fn nobs(&self) -> usize {
        self.replicates.iter().map(|r| r.nobs()).sum()
    }

    /// Replicate ids in order
    pub fn ids(&self) -> Vec<String> {
        self.replicates.iter().map(|r| r.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn series(id: &str, times: Vec<f64>) -> TimeSeries {
        let n = times.len();
        let obs = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        TimeSeries::new(id, times, obs, Constants::new()).unwrap()
    }

    #[test]
    fn test_insufficient_data() {
        let obs = array![[1.0]];
        let err = TimeSeries::new("a", vec![0.0], obs, Constants::new()).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { nobs: 1, .. }));
    }

    #[test]
    fn test_non_monotonic_time() {
        let obs = array![[1.0], [2.0], [3.0]];
        let err = TimeSeries::new("a", vec![0.0, 2.0, 1.0], obs, Constants::new()).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicTime { .. }));
    }

    #[test]
    fn test_mismatched_grids_rejected() {
        let a = series("a", vec![0.0, 1.0, 2.0]);
        let b = series("b", vec![0.0, 1.0]);
        let err = ReplicateSet::new(vec![a, b], vec!["n".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_equal_grids_accepted() {
        let a = series("a", vec![0.0, 1.0, 2.0]);
        let b = series("b", vec![0.0, 1.0, 2.0]);
        let set = ReplicateSet::new(vec![a, b], vec!["n".to_string()]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.nobs(), 6);
    }

    #[test]
    fn test_constants_require() {
        let mut c = Constants::new();
        c.insert("n0", 763.0);
        assert_eq!(c.require("n0").unwrap(), 763.0);
        assert!(c.require("k").is_err());
    }
}
