//! Chi-square report: one row per dataset plus totals, and per-point
//! diagnostics for plotting collaborators.

use std::fmt;
use std::io::Write;

use qf_core::Result;
use serde::{Deserialize, Serialize};

/// Diagnostics of one data point after profiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDiagnostic {
    /// Point index within the dataset.
    pub index: usize,
    /// qT of the point (bin centre for qT-integrated data).
    pub qt: f64,
    /// Prediction.
    pub prediction: f64,
    /// Experimental central value.
    pub experimental: f64,
    /// Uncorrelated uncertainty.
    pub uncertainty: f64,
    /// Systematic shift from the profiled nuisance parameters.
    pub shift: f64,
    /// `prediction + shift`.
    pub shifted_prediction: f64,
    /// `(experimental - prediction - shift) / uncertainty`.
    pub pull: f64,
}

/// Chi-square breakdown of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    /// Dataset name.
    pub name: String,
    /// Points passing the cut.
    pub n_points: usize,
    /// Chi-square of the shifted residuals.
    pub chi2_d: f64,
    /// Nuisance-parameter penalty `sum lambda^2`.
    pub penalty: f64,
    /// `(chi2_d + penalty) / n_points`.
    pub chi2_per_point: f64,
    /// Profiled nuisance parameters.
    pub nuisance: Vec<f64>,
    /// Per-point diagnostics.
    pub points: Vec<PointDiagnostic>,
}

impl DatasetReport {
    /// `chi2_d + penalty`.
    pub fn chi2(&self) -> f64 {
        self.chi2_d + self.penalty
    }
}

/// Full report over every dataset of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareReport {
    /// Per-dataset rows, in registration order.
    pub datasets: Vec<DatasetReport>,
    /// Total points passing the cut.
    pub n_points_total: usize,
    /// Sum of the per-dataset `chi2_d + penalty`.
    pub chi2_total: f64,
    /// `chi2_total / n_points_total`.
    pub chi2_per_point: f64,
}

impl ChiSquareReport {
    /// Aggregate the per-dataset rows. Every row has at least one point.
    pub(crate) fn from_datasets(datasets: Vec<DatasetReport>) -> Self {
        let n_points_total = datasets.iter().map(|d| d.n_points).sum::<usize>();
        let chi2_total = datasets.iter().map(DatasetReport::chi2).sum::<f64>();
        let chi2_per_point =
            if n_points_total == 0 { 0.0 } else { chi2_total / n_points_total as f64 };
        Self { datasets, n_points_total, chi2_total, chi2_per_point }
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the per-point diagnostics as tab-separated blocks, one per dataset.
    pub fn write_predictions<W: Write>(&self, mut out: W) -> Result<()> {
        for ds in &self.datasets {
            writeln!(
                out,
                "# Dataset name: {} [chi2 (using the shifts) = {:e}]",
                ds.name, ds.chi2_per_point
            )?;
            writeln!(out, "#\tqT [GeV]\tpred.\texp.\tunc.\tshift\tshifted pred.\tresiduals")?;
            for p in &ds.points {
                writeln!(
                    out,
                    "{}\t{:e}\t{:e}\t{:e}\t{:e}\t{:e}\t{:e}\t{:e}",
                    p.index,
                    p.qt,
                    p.prediction,
                    p.experimental,
                    p.uncertainty,
                    p.shift,
                    p.shifted_prediction,
                    p.pull
                )?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl fmt::Display for ChiSquareReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Table of $\\chi^2$'s")?;
        writeln!(
            f,
            "| Experiment | num. of points | $\\chi_D^2$ | $\\chi_\\lambda^2$ | $\\chi^2$ / n.d.p.|"
        )?;
        writeln!(
            f,
            "|:----------:|:--------------:|:-----------:|:------------------:|:-----------------:|"
        )?;
        for ds in &self.datasets {
            writeln!(
                f,
                "| {} | {} | {} | {} | {} |",
                ds.name, ds.n_points, ds.chi2_d, ds.penalty, ds.chi2_per_point
            )?;
        }
        writeln!(
            f,
            "| **Total** | **{}** | - | - | **{}** |",
            self.n_points_total, self.chi2_per_point
        )
    }
}
