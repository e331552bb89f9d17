//! Dense solves used by the chi-square engine.
//!
//! - [`solve_lower_triangular`]: decorrelation of residuals against a covariance factor.
//! - [`solve_symmetric`]: the nuisance-parameter normal equations `A lambda = rho`.

use nalgebra::{DMatrix, DVector};

use crate::{Error, Result};

/// Solve `L y = rhs` by forward substitution.
///
/// Only the leading `rhs.len() x rhs.len()` block of `l` is used, so a factor
/// of the full covariance can decorrelate the residuals of a cut dataset.
/// Entries above the diagonal are ignored.
pub fn solve_lower_triangular(l: &DMatrix<f64>, rhs: &[f64]) -> Result<Vec<f64>> {
    let n = rhs.len();
    if l.nrows() < n || l.ncols() < n {
        return Err(Error::size_mismatch(
            "covariance factor smaller than residual vector",
            n,
            l.nrows().min(l.ncols()),
        ));
    }

    let mut y = vec![0.0; n];
    for i in 0..n {
        let pivot = l[(i, i)];
        if pivot == 0.0 || !pivot.is_finite() {
            return Err(Error::SingularSystem(format!(
                "covariance factor has invalid diagonal entry {pivot} at row {i}"
            )));
        }
        let mut s = rhs[i];
        for k in 0..i {
            s -= l[(i, k)] * y[k];
        }
        y[i] = s / pivot;
    }
    Ok(y)
}

/// Solve the symmetric system `A x = rhs`.
///
/// Tries a Cholesky factorisation first (the profiling matrix is SPD by
/// construction) and falls back to LU for indefinite input.
pub fn solve_symmetric(a: &DMatrix<f64>, rhs: &[f64]) -> Result<Vec<f64>> {
    let n = rhs.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(Error::size_mismatch("symmetric system dimension", n, a.nrows()));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let b = DVector::from_column_slice(rhs);
    let x = match a.clone().cholesky() {
        Some(chol) => chol.solve(&b),
        None => a.clone().lu().solve(&b).ok_or_else(|| {
            Error::SingularSystem(format!("{n}x{n} symmetric system is not invertible"))
        })?,
    };

    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularSystem(format!(
            "{n}x{n} symmetric system produced a non-finite solution"
        )));
    }
    Ok(x.iter().copied().collect())
}
