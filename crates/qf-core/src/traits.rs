//! Core traits for qtfit
//!
//! The chi-square engine depends only on these traits, never on a concrete
//! parameterisation or a concrete data source.

use std::sync::{Arc, RwLock};

use nalgebra::DMatrix;

use crate::{Kinematics, PlotLabels, Result};

/// Non-perturbative model function `f(x, b, zeta; ifun)`.
///
/// Evaluation must be pure: the same parameters and inputs always give the
/// same value and no state is mutated, so concurrent `evaluate` calls on a
/// shared reference are safe.
pub trait ModelFunction: Send + Sync {
    /// Model name
    fn name(&self) -> &str;

    /// Number of distinct functions selectable by `ifun`
    fn n_functions(&self) -> usize;

    /// Current parameter vector
    fn parameters(&self) -> &[f64];

    /// Number of free parameters
    fn n_parameters(&self) -> usize {
        self.parameters().len()
    }

    /// Parameter names, in parameter order
    fn parameter_names(&self) -> Vec<String> {
        (0..self.n_parameters()).map(|i| format!("p{i}")).collect()
    }

    /// Replace the parameter vector. Fails on a length mismatch.
    fn set_parameters(&mut self, params: &[f64]) -> Result<()>;

    /// Evaluate function `ifun` at `(x, b, zeta)`.
    ///
    /// Fails with [`crate::Error::IndexOutOfRange`] if `ifun >= n_functions()`.
    fn evaluate(&self, x: f64, b: f64, zeta: f64, ifun: usize) -> Result<f64>;
}

/// One model shared by the engine and every table it drives.
///
/// Evaluation passes hold a read guard for their whole duration; parameter
/// updates take the write guard, so an update can never interleave with a pass.
pub type SharedModel = Arc<RwLock<dyn ModelFunction>>;

/// Wrap a model into a [`SharedModel`] handle.
pub fn shared<M: ModelFunction + 'static>(model: M) -> SharedModel {
    Arc::new(RwLock::new(model))
}

/// Source of experimental data for one dataset.
pub trait DataProvider: Send + Sync {
    /// Dataset name
    fn name(&self) -> &str;

    /// Kinematics (qT values or boundaries, Q interval, integration flags)
    fn kinematics(&self) -> &Kinematics;

    /// Experimental central values, one per point
    fn mean_values(&self) -> &[f64];

    /// Uncorrelated uncertainties, one per point
    fn uncorrelated_unc(&self) -> &[f64];

    /// Relative correlated uncertainties (rows = points, columns = sources)
    fn correlated_unc(&self) -> &DMatrix<f64>;

    /// Lower-triangular factor `L` of the covariance matrix, `C = L L^T`
    fn cholesky_factor(&self) -> &DMatrix<f64>;

    /// Labels for reporting
    fn labels(&self) -> &PlotLabels;
}

/// Objective function for external minimizers
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate the objective at the given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Number of parameters the objective expects
    fn n_params(&self) -> usize;
}
