//! # qf-chi2
//!
//! Chi-square engine for fits of non-perturbative functions to qT spectra.
//!
//! The engine binds a list of (data provider, convolution table) blocks to
//! one shared model function and provides:
//! - decorrelated residuals per dataset ([`ChiSquare::residuals`])
//! - the mean chi-square per point over one or all datasets ([`ChiSquare::evaluate`])
//! - a per-dataset breakdown with correlated systematics profiled in closed
//!   form ([`ChiSquare::report`])

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Engine configuration.
pub mod config;
/// The chi-square engine.
pub mod chisquare;
/// Nuisance-parameter profiling.
pub mod profile;
/// Report tables and per-point diagnostics.
pub mod report;

pub use chisquare::{ChiSquare, DatasetBlock, DatasetSelection};
pub use config::ChiSquareConfig;
pub use profile::{SystematicProfile, profile_systematics};
pub use report::{ChiSquareReport, DatasetReport, PointDiagnostic};
