//! # qf-fastinterface
//!
//! Precomputed interpolation tables that turn a non-perturbative model
//! function into qT-binned predictions without redoing the perturbative
//! integrals.
//!
//! A table stores, for every qT value, a weight tensor over
//! (quadrature node, Q node, xi node). A prediction is the weighted sum of
//! products of the model function evaluated at the two partonic legs.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Convolution table and its serialized grid form.
pub mod convolution_table;

pub use convolution_table::{ConvolutionTable, GridSource, ScalingIndex};
