//! # qf-core
//!
//! Shared building blocks for qtfit:
//! - the error type used by every crate in the workspace
//! - the model-function and data-provider traits the chi-square engine is written against
//! - kinematic types
//! - small dense linear-algebra helpers (triangular and symmetric solves)

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;
/// Dense linear-algebra helpers.
pub mod linalg;
/// Model, data and objective traits.
pub mod traits;
/// Kinematics and labels.
pub mod types;

pub use error::{Error, Result};
pub use traits::{DataProvider, ModelFunction, ObjectiveFunction, SharedModel, shared};
pub use types::{Kinematics, PlotLabels};
