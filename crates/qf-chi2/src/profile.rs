//! Closed-form profiling of correlated systematics.
//!
//! With relative correlated uncertainties `corr[j][a]`, central values
//! `mean[j]` and uncorrelated uncertainties `unc[j]`, the chi-square
//!
//! ```text
//! chi2(lambda) = sum_j ((r[j] - sum_a lambda[a] corr[j][a] mean[j]) / unc[j])^2 + sum_a lambda[a]^2
//! ```
//!
//! is quadratic in `lambda`; its minimum solves `A lambda = rho` with
//!
//! ```text
//! A[a][b] = delta[a][b] + sum_j corr[j][a] corr[j][b] mean[j]^2 / unc[j]^2
//! rho[a]  = sum_j r[j] corr[j][a] mean[j] / unc[j]^2
//! ```

use nalgebra::DMatrix;
use qf_core::linalg::solve_symmetric;
use qf_core::{Error, Result};

/// Outcome of profiling the systematics of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SystematicProfile {
    /// Best-fit nuisance parameters, one per correlated source.
    pub lambda: Vec<f64>,
    /// Systematic shift of each point, `sum_a lambda[a] corr[j][a] mean[j]`.
    pub shifts: Vec<f64>,
    /// `sum_j ((r[j] - shift[j]) / unc[j])^2`.
    pub chi2_d: f64,
    /// `sum_a lambda[a]^2`.
    pub penalty: f64,
}

impl SystematicProfile {
    /// `chi2_d + penalty`.
    pub fn chi2(&self) -> f64 {
        self.chi2_d + self.penalty
    }
}

/// Profile the correlated systematics given raw (not decorrelated) residuals.
///
/// Only the first `residuals.len()` points enter; `mean`, `unc` and the rows
/// of `corr` may be longer (points removed by the kinematic cut).
pub fn profile_systematics(
    residuals: &[f64],
    mean: &[f64],
    unc: &[f64],
    corr: &DMatrix<f64>,
) -> Result<SystematicProfile> {
    let nd = residuals.len();
    let nsys = corr.ncols();
    if mean.len() < nd {
        return Err(Error::size_mismatch("central values vs residuals", nd, mean.len()));
    }
    if unc.len() < nd {
        return Err(Error::size_mismatch("uncorrelated uncertainties vs residuals", nd, unc.len()));
    }
    if nsys > 0 && corr.nrows() < nd {
        return Err(Error::size_mismatch("correlated uncertainty rows vs residuals", nd, corr.nrows()));
    }
    if let Some(j) = unc[..nd].iter().position(|u| !(u.is_finite() && *u > 0.0)) {
        return Err(Error::Validation(format!(
            "uncorrelated uncertainty of point {j} must be finite and positive, got {}",
            unc[j]
        )));
    }

    let mut a = DMatrix::<f64>::identity(nsys, nsys);
    let mut rho = vec![0.0; nsys];
    for j in 0..nd {
        let w = mean[j] / (unc[j] * unc[j]);
        for alpha in 0..nsys {
            let c_a = corr[(j, alpha)];
            rho[alpha] += residuals[j] * c_a * w;
            for beta in 0..nsys {
                a[(alpha, beta)] += c_a * corr[(j, beta)] * mean[j] * w;
            }
        }
    }

    let lambda = solve_symmetric(&a, &rho)?;

    let shifts: Vec<f64> = (0..nd)
        .map(|j| (0..nsys).map(|alpha| lambda[alpha] * corr[(j, alpha)] * mean[j]).sum::<f64>())
        .collect();

    let chi2_d: f64 = (0..nd).map(|j| ((residuals[j] - shifts[j]) / unc[j]).powi(2)).sum();
    let penalty: f64 = lambda.iter().map(|l| l * l).sum();

    Ok(SystematicProfile { lambda, shifts, chi2_d, penalty })
}
