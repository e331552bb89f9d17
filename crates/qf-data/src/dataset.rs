//! Dataset container.

use std::path::Path;

use nalgebra::{DMatrix, DVector};
use qf_core::{DataProvider, Error, Kinematics, PlotLabels, Result};
use serde::{Deserialize, Serialize};

/// Which covariance the precomputed factor `L` decomposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceModel {
    /// `C = diag(unc^2)`.
    Uncorrelated,
    /// `C = diag(unc^2) + B B^T` with `B[j][a] = corr[j][a] * mean[j]`.
    #[default]
    Total,
}

/// One experimental dataset held in memory.
#[derive(Debug, Clone)]
pub struct DataSet {
    name: String,
    kinematics: Kinematics,
    mean: Vec<f64>,
    unc: Vec<f64>,
    corr: DMatrix<f64>,
    factor: DMatrix<f64>,
    labels: PlotLabels,
}

impl DataSet {
    /// Start building a dataset.
    pub fn builder(name: impl Into<String>, kinematics: Kinematics) -> DataSetBuilder {
        DataSetBuilder {
            name: name.into(),
            kinematics,
            mean: Vec::new(),
            unc: Vec::new(),
            corr: None,
            factor: None,
            covariance: CovarianceModel::default(),
            labels: PlotLabels::default(),
        }
    }

    /// Build a dataset from its serialized document.
    pub fn from_document(doc: DataSetDocument) -> Result<Self> {
        let n = doc.mean.len();
        let nsys = doc.correlated.first().map_or(0, Vec::len);
        if doc.correlated.iter().any(|row| row.len() != nsys) {
            return Err(Error::Validation(format!(
                "dataset '{}': correlated uncertainty rows have inconsistent lengths",
                doc.name
            )));
        }
        let corr = if doc.correlated.is_empty() {
            DMatrix::zeros(n, 0)
        } else {
            DMatrix::from_fn(doc.correlated.len(), nsys, |j, a| doc.correlated[j][a])
        };

        Self::builder(doc.name, doc.kinematics)
            .mean_values(doc.mean)
            .uncorrelated_unc(doc.uncorrelated)
            .correlated_unc(corr)
            .covariance(doc.covariance)
            .labels(doc.labels)
            .build()
    }

    /// Parse a dataset from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: DataSetDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    /// Load a dataset from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Number of data points.
    pub fn n_points(&self) -> usize {
        self.mean.len()
    }

    /// Number of correlated systematic sources.
    pub fn n_systematics(&self) -> usize {
        self.corr.ncols()
    }
}

impl DataProvider for DataSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    fn mean_values(&self) -> &[f64] {
        &self.mean
    }

    fn uncorrelated_unc(&self) -> &[f64] {
        &self.unc
    }

    fn correlated_unc(&self) -> &DMatrix<f64> {
        &self.corr
    }

    fn cholesky_factor(&self) -> &DMatrix<f64> {
        &self.factor
    }

    fn labels(&self) -> &PlotLabels {
        &self.labels
    }
}

/// Builder for [`DataSet`].
#[derive(Debug, Clone)]
pub struct DataSetBuilder {
    name: String,
    kinematics: Kinematics,
    mean: Vec<f64>,
    unc: Vec<f64>,
    corr: Option<DMatrix<f64>>,
    factor: Option<DMatrix<f64>>,
    covariance: CovarianceModel,
    labels: PlotLabels,
}

impl DataSetBuilder {
    /// Experimental central values.
    pub fn mean_values(mut self, mean: Vec<f64>) -> Self {
        self.mean = mean;
        self
    }

    /// Uncorrelated uncertainties (absolute).
    pub fn uncorrelated_unc(mut self, unc: Vec<f64>) -> Self {
        self.unc = unc;
        self
    }

    /// Relative correlated uncertainties, rows = points, columns = sources.
    pub fn correlated_unc(mut self, corr: DMatrix<f64>) -> Self {
        self.corr = Some(corr);
        self
    }

    /// Use an explicit lower-triangular covariance factor instead of computing one.
    pub fn cholesky_factor(mut self, factor: DMatrix<f64>) -> Self {
        self.factor = Some(factor);
        self
    }

    /// Covariance decomposed when no explicit factor is given.
    pub fn covariance(mut self, model: CovarianceModel) -> Self {
        self.covariance = model;
        self
    }

    /// Reporting labels.
    pub fn labels(mut self, labels: PlotLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Validate the inputs and assemble the dataset.
    pub fn build(self) -> Result<DataSet> {
        let n = self.kinematics.n_points();
        let ctx = |what: &str| format!("dataset '{}': {what}", self.name);

        if self.mean.len() != n {
            return Err(Error::size_mismatch(ctx("mean values vs kinematics"), n, self.mean.len()));
        }
        if self.unc.len() != n {
            return Err(Error::size_mismatch(
                ctx("uncorrelated uncertainties vs kinematics"),
                n,
                self.unc.len(),
            ));
        }
        if let Some(j) = self.unc.iter().position(|u| !(u.is_finite() && *u > 0.0)) {
            return Err(Error::Validation(ctx(&format!(
                "uncorrelated uncertainty of point {j} must be finite and positive, got {}",
                self.unc[j]
            ))));
        }

        let corr = self.corr.unwrap_or_else(|| DMatrix::zeros(n, 0));
        if corr.nrows() != n {
            return Err(Error::size_mismatch(
                ctx("correlated uncertainty rows vs kinematics"),
                n,
                corr.nrows(),
            ));
        }

        let factor = match self.factor {
            Some(l) => {
                if l.nrows() != n || l.ncols() != n {
                    return Err(Error::size_mismatch(ctx("covariance factor dimension"), n, l.nrows()));
                }
                l
            }
            None => covariance_factor(&self.mean, &self.unc, &corr, self.covariance)
                .map_err(|e| Error::SingularSystem(ctx(&e.to_string())))?,
        };

        log::debug!(
            "dataset '{}' built: {} points, {} correlated sources",
            self.name,
            n,
            corr.ncols()
        );

        Ok(DataSet {
            name: self.name,
            kinematics: self.kinematics,
            mean: self.mean,
            unc: self.unc,
            corr,
            factor,
            labels: self.labels,
        })
    }
}

fn covariance_factor(
    mean: &[f64],
    unc: &[f64],
    corr: &DMatrix<f64>,
    model: CovarianceModel,
) -> Result<DMatrix<f64>> {
    let n = mean.len();
    let d2 = DVector::from_iterator(n, unc.iter().map(|u| u * u));
    let mut cov = DMatrix::from_diagonal(&d2);

    if model == CovarianceModel::Total && corr.ncols() > 0 {
        let b = DMatrix::from_fn(n, corr.ncols(), |j, a| corr[(j, a)] * mean[j]);
        cov += &b * b.transpose();
    }

    if n == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    let chol = cov
        .cholesky()
        .ok_or_else(|| Error::SingularSystem("covariance matrix not SPD".to_string()))?;
    Ok(chol.l())
}

/// Serialized form of a [`DataSet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSetDocument {
    /// Dataset name.
    pub name: String,
    /// Kinematics.
    pub kinematics: Kinematics,
    /// Central values.
    pub mean: Vec<f64>,
    /// Uncorrelated uncertainties.
    pub uncorrelated: Vec<f64>,
    /// Relative correlated uncertainties, one row per point.
    #[serde(default)]
    pub correlated: Vec<Vec<f64>>,
    /// Covariance decomposed into the factor.
    #[serde(default)]
    pub covariance: CovarianceModel,
    /// Reporting labels.
    #[serde(default)]
    pub labels: PlotLabels,
}
