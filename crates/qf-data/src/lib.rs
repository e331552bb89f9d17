//! In-memory experimental datasets.
//!
//! [`DataSet`] is the reference [`qf_core::DataProvider`]: it validates the
//! shape of the inputs once and precomputes the covariance factor.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Dataset container and builder.
pub mod dataset;

pub use dataset::{CovarianceModel, DataSet, DataSetBuilder, DataSetDocument};
