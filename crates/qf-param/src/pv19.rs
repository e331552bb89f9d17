//! Pavia 2019 (PV19) non-perturbative function.
//!
//! ```text
//! f_NP(x, b, zeta) = exp(-g2 ln(zeta / Q0^2) b^2 / 2) / (1 + g1(x)^2 b^2)
//! g1(x)            = N1 (x^sigma + delta) / (xhat^sigma + delta) * ((1 - x) / (1 - xhat))^alpha
//! ```
//!
//! with `Q0^2 = 1 GeV^2` and `xhat = 0.1`. Both functions (`ifun = 0, 1`)
//! share the same form.

use qf_core::{Error, ModelFunction, Result};
use serde::{Deserialize, Serialize};

const N_FUNCTIONS: usize = 2;
const Q0_SQ: f64 = 1.0;
const X_HAT: f64 = 0.1;

const PARAMETER_NAMES: [&str; 6] = ["g2", "N1", "alpha", "sigma", "lambda", "delta"];

/// PV19 parameterisation with six free parameters.
///
/// `lambda` is carried in the parameter vector but does not enter the formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pv19 {
    pars: Vec<f64>,
}

impl Default for Pv19 {
    fn default() -> Self {
        Self { pars: vec![0.13, 0.285, 2.98, 0.173, 0.39, 0.0] }
    }
}

impl Pv19 {
    /// Create a parameterisation with an explicit parameter vector.
    pub fn new(params: &[f64]) -> Result<Self> {
        let mut p = Self::default();
        p.set_parameters(params)?;
        Ok(p)
    }

    /// LaTeX rendering of the functional form.
    pub fn latex_formula(&self) -> String {
        let mut formula = String::new();
        formula.push_str("$$f_{\\rm NP}(x,\\zeta, b_T)=\\frac{\\exp\\left[ - \\frac{1}{2} g_2 \\log\\left(\\frac{\\zeta}{Q_0^2}\\right) b_T^2 \\right]}{1 + g_1^2(x) b_T^2}$$\n");
        formula.push_str("$$g_1(x) = N_1 \\frac{x^{\\sigma}+\\delta}{\\hat{x}^{\\sigma}+\\delta}\\left(\\frac{1-x}{1-\\hat{x}}\\right)^{\\alpha}$$\n");
        formula.push_str("$$Q_0^2 = 1\\;{\\rm GeV}^2$$\n");
        formula.push_str("$$\\hat{x} = 0.1$$");
        formula
    }

    fn g1(&self, x: f64) -> f64 {
        let (n1, alpha, sigma, delta) = (self.pars[1], self.pars[2], self.pars[3], self.pars[5]);
        n1 * (x.powf(sigma) + delta) / (X_HAT.powf(sigma) + delta)
            * ((1.0 - x) / (1.0 - X_HAT)).powf(alpha)
    }
}

impl ModelFunction for Pv19 {
    fn name(&self) -> &str {
        "PV19"
    }

    fn n_functions(&self) -> usize {
        N_FUNCTIONS
    }

    fn parameters(&self) -> &[f64] {
        &self.pars
    }

    fn parameter_names(&self) -> Vec<String> {
        PARAMETER_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn set_parameters(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != self.pars.len() {
            return Err(Error::size_mismatch("PV19 parameters", self.pars.len(), params.len()));
        }
        self.pars.copy_from_slice(params);
        Ok(())
    }

    fn evaluate(&self, x: f64, b: f64, zeta: f64, ifun: usize) -> Result<f64> {
        if ifun >= N_FUNCTIONS {
            return Err(Error::index_out_of_range("function", ifun as i64, N_FUNCTIONS));
        }
        if x >= 1.0 {
            return Ok(0.0);
        }

        let g2 = self.pars[0];
        let g1b = self.g1(x) * b;
        Ok((-g2 * (zeta / Q0_SQ).ln() * b * b / 2.0).exp() / (1.0 + g1b * g1b))
    }
}
