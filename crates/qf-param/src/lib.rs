//! Non-perturbative parameterisations.
//!
//! Each parameterisation implements [`qf_core::ModelFunction`] and can be
//! handed to the chi-square engine through [`qf_core::shared`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Pavia 2019 parameterisation.
pub mod pv19;

pub use pv19::Pv19;
