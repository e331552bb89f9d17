//! Convolution table.
//!
//! For a qT value the prediction is
//!
//! ```text
//! sigma(qT) = sum_{n,tau,alpha} W[qT][n][tau][alpha] * f1(V xi, b, zeta) * f2(V / xi, b, zeta)
//! b    = z[n] / qT
//! zeta = Q[tau]^2
//! V    = Q[tau] / sqrt(s)
//! ```
//!
//! i.e. an Ogata-quadrature Hankel transform whose perturbative kernel is
//! folded into `W`. Only the model function depends on the fit parameters.

use std::path::Path;

use qf_core::{Error, ModelFunction, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which node supplies `xi` for the weight `W[qT][n][tau][alpha]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingIndex {
    /// `xi = xi_grid[alpha]`.
    #[default]
    PerScalingNode,
    /// `xi = xi_grid[tau]`, as written by older grid producers. Requires the
    /// xi grid to be at least as long as the Q grid.
    PerMomentumNode,
}

/// Serialized grid as produced by the table generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSource {
    /// Table name.
    pub name: String,
    /// Centre-of-mass energy sqrt(s) [GeV].
    pub cme: f64,
    /// qT values (or bin boundaries for qT-integrated tables) [GeV].
    pub qt_bounds: Vec<f64>,
    /// Unscaled Ogata quadrature coordinates.
    pub ogata_coordinates: Vec<f64>,
    /// Q nodes [GeV].
    pub q_grid: Vec<f64>,
    /// Scaling-variable (xi) nodes.
    pub xi_grid: Vec<f64>,
    /// One `[n][tau][alpha]` tensor per entry of `qt_bounds`.
    pub weights: Vec<Vec<Vec<Vec<f64>>>>,
    /// Whether predictions are averages over qT bins.
    #[serde(default)]
    pub integrated_qt: bool,
    /// Which node supplies `xi`.
    #[serde(default)]
    pub scaling_index: ScalingIndex,
}

/// Immutable convolution table.
#[derive(Debug, Clone)]
pub struct ConvolutionTable {
    name: String,
    cme: f64,
    qt: Vec<f64>,
    z: Vec<f64>,
    q_grid: Vec<f64>,
    xi_grid: Vec<f64>,
    // Row-major (qT, n, tau, alpha).
    weights: Vec<f64>,
    integrated_qt: bool,
    scaling_index: ScalingIndex,
}

impl ConvolutionTable {
    /// Build a table from a grid, validating every tensor's shape.
    pub fn from_grid(grid: GridSource) -> Result<Self> {
        let (nz, nq, nxi) = (grid.ogata_coordinates.len(), grid.q_grid.len(), grid.xi_grid.len());
        let ctx = |what: String| Error::Validation(format!("table '{}': {what}", grid.name));

        if !(grid.cme.is_finite() && grid.cme > 0.0) {
            return Err(ctx(format!("centre-of-mass energy must be positive, got {}", grid.cme)));
        }
        if grid.weights.len() != grid.qt_bounds.len() {
            return Err(ctx(format!(
                "{} weight tensors for {} qT values",
                grid.weights.len(),
                grid.qt_bounds.len()
            )));
        }
        if grid.integrated_qt && grid.qt_bounds.len() < 2 {
            return Err(ctx("qT-integrated table needs at least two boundaries".to_string()));
        }
        if let Some(qt) = grid.qt_bounds.iter().find(|qt| !(qt.is_finite() && **qt > 0.0)) {
            return Err(ctx(format!("qT values must be finite and positive, got {qt}")));
        }
        if grid.integrated_qt {
            if let Some(pair) = grid.qt_bounds.windows(2).find(|pair| pair[1] <= pair[0]) {
                return Err(ctx(format!(
                    "qT bin boundaries must be strictly increasing, got {} after {}",
                    pair[1], pair[0]
                )));
            }
        }
        if grid.scaling_index == ScalingIndex::PerMomentumNode && nxi < nq {
            return Err(ctx(format!(
                "xi indexed by Q node needs at least {nq} xi nodes, got {nxi}"
            )));
        }

        let mut weights = Vec::with_capacity(grid.qt_bounds.len() * nz * nq * nxi);
        for (iqt, w) in grid.weights.iter().enumerate() {
            let bad = w.len() != nz
                || w.iter().any(|wn| wn.len() != nq || wn.iter().any(|wt| wt.len() != nxi));
            if bad {
                return Err(ctx(format!(
                    "weight tensor of qT = {} does not have shape [{nz}][{nq}][{nxi}]",
                    grid.qt_bounds[iqt]
                )));
            }
            weights.extend(w.iter().flatten().flatten().copied());
        }

        log::debug!(
            "convolution table '{}': {} qT values, {}x{}x{} nodes",
            grid.name,
            grid.qt_bounds.len(),
            nz,
            nq,
            nxi
        );

        Ok(Self {
            name: grid.name,
            cme: grid.cme,
            qt: grid.qt_bounds,
            z: grid.ogata_coordinates,
            q_grid: grid.q_grid,
            xi_grid: grid.xi_grid,
            weights,
            integrated_qt: grid.integrated_qt,
            scaling_index: grid.scaling_index,
        })
    }

    /// Parse a table from a JSON grid document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let grid: GridSource = serde_json::from_str(json)?;
        Self::from_grid(grid)
    }

    /// Load a table from a JSON grid file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Centre-of-mass energy.
    pub fn cme(&self) -> f64 {
        self.cme
    }

    /// qT values (or boundaries).
    pub fn qt_values(&self) -> &[f64] {
        &self.qt
    }

    /// Whether predictions are qT-bin averages.
    pub fn is_integrated_qt(&self) -> bool {
        self.integrated_qt
    }

    /// Number of predictions [`ConvolutionTable::predictions`] returns.
    pub fn n_points(&self) -> usize {
        if self.integrated_qt { self.qt.len().saturating_sub(1) } else { self.qt.len() }
    }

    /// Convolute the same function on both legs.
    pub fn convolute<F>(&self, f: F) -> Result<Vec<(f64, f64)>>
    where
        F: Fn(f64, f64, f64) -> Result<f64> + Sync,
    {
        self.convolute_pair(&f, &f)
    }

    /// Convolute `f1` on the first leg and `f2` on the second one.
    ///
    /// Returns `(qT, sigma(qT))` in table order. Bins are computed in
    /// parallel; within a bin the sum runs in fixed `(n, tau, alpha)` order,
    /// so results are reproducible bit for bit.
    pub fn convolute_pair<F1, F2>(&self, f1: F1, f2: F2) -> Result<Vec<(f64, f64)>>
    where
        F1: Fn(f64, f64, f64) -> Result<f64> + Sync,
        F2: Fn(f64, f64, f64) -> Result<f64> + Sync,
    {
        (0..self.qt.len())
            .into_par_iter()
            .map(|iqt| Ok((self.qt[iqt], self.convolute_bin(iqt, &f1, &f2)?)))
            .collect()
    }

    fn convolute_bin<F1, F2>(&self, iqt: usize, f1: &F1, f2: &F2) -> Result<f64>
    where
        F1: Fn(f64, f64, f64) -> Result<f64>,
        F2: Fn(f64, f64, f64) -> Result<f64>,
    {
        let (nz, nq, nxi) = (self.z.len(), self.q_grid.len(), self.xi_grid.len());
        let qt = self.qt[iqt];
        let w = &self.weights[iqt * nz * nq * nxi..(iqt + 1) * nz * nq * nxi];

        let mut cs = 0.0;
        for (n, &zn) in self.z.iter().enumerate() {
            let b = zn / qt;
            for (tau, &q) in self.q_grid.iter().enumerate() {
                let zeta = q * q;
                let v = q / self.cme;
                for alpha in 0..nxi {
                    let xi = match self.scaling_index {
                        ScalingIndex::PerScalingNode => self.xi_grid[alpha],
                        ScalingIndex::PerMomentumNode => self.xi_grid[tau],
                    };
                    let weight = w[(n * nq + tau) * nxi + alpha];
                    cs += weight * f1(v * xi, b, zeta)? * f2(v / xi, b, zeta)?;
                }
            }
        }
        Ok(cs)
    }

    /// Predictions for the current state of `model`, one per data point.
    ///
    /// Function 0 is used on both legs. For qT-integrated tables the
    /// convolution at each boundary is the cumulative cross section and the
    /// prediction is its average over the bin.
    pub fn predictions(&self, model: &dyn ModelFunction) -> Result<Vec<f64>> {
        let f = |x: f64, b: f64, zeta: f64| model.evaluate(x, b, zeta, 0);
        let cs = self.convolute(f)?;

        if !self.integrated_qt {
            return Ok(cs.into_iter().map(|(_, v)| v).collect());
        }
        Ok(cs
            .windows(2)
            .map(|pair| {
                let ((lo, c_lo), (hi, c_hi)) = (pair[0], pair[1]);
                (c_hi - c_lo) / (hi - lo)
            })
            .collect())
    }
}
