//! The chi-square engine.

use std::ops::Range;
use std::sync::{Arc, RwLockReadGuard};

use qf_core::linalg::solve_lower_triangular;
use qf_core::{DataProvider, Error, ModelFunction, ObjectiveFunction, Result, SharedModel};
use qf_fastinterface::ConvolutionTable;
use rayon::prelude::*;

use crate::ChiSquareConfig;
use crate::profile::profile_systematics;
use crate::report::{ChiSquareReport, DatasetReport, PointDiagnostic};

/// Number of functions the bound model must expose.
const REQUIRED_FUNCTIONS: usize = 2;

/// One dataset paired with the table that predicts it.
#[derive(Clone)]
pub struct DatasetBlock {
    provider: Arc<dyn DataProvider>,
    table: Arc<ConvolutionTable>,
    n_cut_points: usize,
}

impl DatasetBlock {
    fn new(provider: Arc<dyn DataProvider>, table: Arc<ConvolutionTable>, qt_over_q_max: f64) -> Self {
        let n_cut_points = provider.kinematics().count_passing(qt_over_q_max);
        Self { provider, table, n_cut_points }
    }

    /// Data provider of the block.
    pub fn provider(&self) -> &Arc<dyn DataProvider> {
        &self.provider
    }

    /// Convolution table of the block.
    pub fn table(&self) -> &Arc<ConvolutionTable> {
        &self.table
    }

    /// Number of points passing the qT / Q cut.
    pub fn n_cut_points(&self) -> usize {
        self.n_cut_points
    }

    /// Predictions for every point, checked against the number of data points.
    fn predictions(&self, model: &dyn ModelFunction) -> Result<Vec<f64>> {
        let pred = self.table.predictions(model)?;
        let n_data = self.provider.mean_values().len();
        if pred.len() != n_data {
            return Err(Error::size_mismatch(
                format!(
                    "dataset '{}': data points vs predictions of table '{}'",
                    self.provider.name(),
                    self.table.name()
                ),
                n_data,
                pred.len(),
            ));
        }
        if self.n_cut_points > n_data {
            return Err(Error::size_mismatch(
                format!("dataset '{}': points passing the cut vs data points", self.provider.name()),
                n_data,
                self.n_cut_points,
            ));
        }
        Ok(pred)
    }

    /// `mean - prediction` for the points passing the cut.
    fn raw_residuals(&self, pred: &[f64]) -> Vec<f64> {
        let mean = self.provider.mean_values();
        (0..self.n_cut_points).map(|j| mean[j] - pred[j]).collect()
    }

    fn decorrelated_residuals(&self, model: &dyn ModelFunction) -> Result<Vec<f64>> {
        let pred = self.predictions(model)?;
        let res = self.raw_residuals(&pred);
        solve_lower_triangular(self.provider.cholesky_factor(), &res)
    }
}

impl std::fmt::Debug for DatasetBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetBlock")
            .field("provider", &self.provider.name())
            .field("table", &self.table.name())
            .field("n_cut_points", &self.n_cut_points)
            .finish()
    }
}

/// Which datasets an evaluation runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSelection {
    /// Every registered dataset.
    All,
    /// One dataset; an index outside the registered range selects all.
    Single(usize),
}

/// Chi-square of a shared model against a list of datasets.
pub struct ChiSquare {
    blocks: Vec<DatasetBlock>,
    model: SharedModel,
    config: ChiSquareConfig,
}

impl ChiSquare {
    /// Create an engine with no datasets.
    ///
    /// Fails with [`Error::ConfigurationMismatch`] unless the model exposes
    /// exactly two functions.
    pub fn new(model: SharedModel, config: ChiSquareConfig) -> Result<Self> {
        config.validate()?;
        {
            let m = read_model(&model)?;
            if m.n_functions() != REQUIRED_FUNCTIONS {
                return Err(Error::ConfigurationMismatch(format!(
                    "model '{}' has {} functions, the chi-square needs {REQUIRED_FUNCTIONS}",
                    m.name(),
                    m.n_functions()
                )));
            }
        }
        Ok(Self { blocks: Vec::new(), model, config })
    }

    /// Create an engine and register `blocks` in order.
    pub fn with_blocks(
        blocks: impl IntoIterator<Item = (Arc<dyn DataProvider>, Arc<ConvolutionTable>)>,
        model: SharedModel,
        config: ChiSquareConfig,
    ) -> Result<Self> {
        let mut chi2 = Self::new(model, config)?;
        for (provider, table) in blocks {
            chi2.add_block(provider, table);
        }
        Ok(chi2)
    }

    /// Register a dataset and its table.
    pub fn add_block(&mut self, provider: Arc<dyn DataProvider>, table: Arc<ConvolutionTable>) {
        let block = DatasetBlock::new(provider, table, self.config.qt_over_q_max);
        if block.n_cut_points == 0 {
            log::warn!(
                "dataset '{}' has no points with qT/Q < {}",
                block.provider.name(),
                self.config.qt_over_q_max
            );
        } else {
            log::debug!(
                "dataset '{}' registered: {} of {} points pass qT/Q < {}",
                block.provider.name(),
                block.n_cut_points,
                block.provider.mean_values().len(),
                self.config.qt_over_q_max
            );
        }
        self.blocks.push(block);
    }

    /// Change the qT / Q cut and recompute every block's passing-point count.
    pub fn set_qt_over_q_max(&mut self, qt_over_q_max: f64) -> Result<()> {
        let config = ChiSquareConfig { qt_over_q_max, ..self.config.clone() };
        config.validate()?;
        self.config = config;
        for block in &mut self.blocks {
            block.n_cut_points = block.provider.kinematics().count_passing(qt_over_q_max);
        }
        log::debug!("qT/Q cut set to {qt_over_q_max}, {} points pass", self.n_points_total());
        Ok(())
    }

    /// Engine configuration.
    pub fn config(&self) -> &ChiSquareConfig {
        &self.config
    }

    /// Shared model handle.
    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    /// Registered blocks, in registration order.
    pub fn blocks(&self) -> &[DatasetBlock] {
        &self.blocks
    }

    /// Number of registered datasets.
    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Number of points of dataset `ids` passing the cut.
    pub fn n_cut_points(&self, ids: usize) -> Result<usize> {
        Ok(self.block(ids)?.n_cut_points)
    }

    /// Total number of points passing the cut.
    pub fn n_points_total(&self) -> usize {
        self.blocks.iter().map(|b| b.n_cut_points).sum()
    }

    /// Replace the model parameters. Blocks until no evaluation is running.
    pub fn set_parameters(&self, params: &[f64]) -> Result<()> {
        self.model
            .write()
            .map_err(|_| Error::Computation("model lock poisoned".to_string()))?
            .set_parameters(params)
    }

    /// Decorrelated residuals of dataset `ids`, one per point passing the cut.
    ///
    /// Solves `L y = mean - prediction` with `L` the provider's covariance
    /// factor, so that `sum y^2` is the chi-square of the dataset.
    pub fn residuals(&self, ids: usize) -> Result<Vec<f64>> {
        let block = self.block(ids)?;
        let model = read_model(&self.model)?;
        block.decorrelated_residuals(&*model)
    }

    /// Mean chi-square per point over the selected datasets.
    ///
    /// The normalisation is the total number of selected points, so adding a
    /// dataset changes the denominator as well as the numerator.
    pub fn evaluate(&self, selection: DatasetSelection) -> Result<f64> {
        let range = self.selection_range(selection);
        let guard = read_model(&self.model)?;
        let model: &dyn ModelFunction = &*guard;
        let per_block = self.map_blocks(range, |block| {
            let x = block.decorrelated_residuals(model)?;
            Ok((x.iter().map(|v| v * v).sum::<f64>(), block.n_cut_points))
        })?;

        let (chi2, ntot) =
            per_block.iter().fold((0.0, 0usize), |(c, n), &(ci, ni)| (c + ci, n + ni));
        if ntot == 0 {
            return Err(Error::SingularSystem(
                "no data points pass the cut, chi-square per point is undefined".to_string(),
            ));
        }
        Ok(chi2 / ntot as f64)
    }

    /// Like [`ChiSquare::evaluate`] with a signed index: negative or
    /// out-of-range values select every dataset.
    pub fn evaluate_index(&self, ids: i64) -> Result<f64> {
        let selection = match usize::try_from(ids) {
            Ok(i) => DatasetSelection::Single(i),
            Err(_) => DatasetSelection::All,
        };
        self.evaluate(selection)
    }

    /// Mean chi-square per point of every dataset separately.
    pub fn evaluate_each(&self) -> Result<Vec<f64>> {
        (0..self.blocks.len()).map(|i| self.evaluate(DatasetSelection::Single(i))).collect()
    }

    /// Per-dataset breakdown with correlated systematics profiled.
    ///
    /// The nuisance parameters are solved afresh on every call. A dataset
    /// with no points passing the cut is an error.
    pub fn report(&self) -> Result<ChiSquareReport> {
        let guard = read_model(&self.model)?;
        let model: &dyn ModelFunction = &*guard;
        let datasets = self.map_blocks(0..self.blocks.len(), |block| dataset_report(block, model))?;
        Ok(ChiSquareReport::from_datasets(datasets))
    }

    fn block(&self, ids: usize) -> Result<&DatasetBlock> {
        self.blocks
            .get(ids)
            .ok_or_else(|| Error::index_out_of_range("dataset", ids as i64, self.blocks.len()))
    }

    fn selection_range(&self, selection: DatasetSelection) -> Range<usize> {
        match selection {
            DatasetSelection::Single(i) if i < self.blocks.len() => i..i + 1,
            _ => 0..self.blocks.len(),
        }
    }

    /// Apply `f` to the blocks in `range`, keeping block order.
    fn map_blocks<T, F>(&self, range: Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&DatasetBlock) -> Result<T> + Sync,
    {
        let blocks = &self.blocks[range];
        if self.config.parallel {
            blocks.par_iter().map(&f).collect()
        } else {
            blocks.iter().map(&f).collect()
        }
    }
}

impl std::fmt::Debug for ChiSquare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChiSquare")
            .field("blocks", &self.blocks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ObjectiveFunction for ChiSquare {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.set_parameters(params)?;
        self.evaluate(DatasetSelection::All)
    }

    fn n_params(&self) -> usize {
        match read_model(&self.model) {
            Ok(m) => m.n_parameters(),
            Err(e) => {
                log::warn!("reporting zero parameters: {e}");
                0
            }
        }
    }
}

fn read_model(model: &SharedModel) -> Result<RwLockReadGuard<'_, dyn ModelFunction>> {
    model.read().map_err(|_| Error::Computation("model lock poisoned".to_string()))
}

fn dataset_report(block: &DatasetBlock, model: &dyn ModelFunction) -> Result<DatasetReport> {
    let dp = &block.provider;
    let nd = block.n_cut_points;
    if nd == 0 {
        return Err(Error::SingularSystem(format!(
            "dataset '{}' has no points passing the cut, chi-square per point is undefined",
            dp.name()
        )));
    }

    let pred = block.predictions(model)?;
    let res = block.raw_residuals(&pred);
    let mean = dp.mean_values();
    let unc = dp.uncorrelated_unc();
    let profile = profile_systematics(&res, mean, unc, dp.correlated_unc())?;

    let kin = dp.kinematics();
    let points = (0..nd)
        .map(|j| {
            let qt = kin.point_qt(j).ok_or_else(|| {
                Error::size_mismatch(
                    format!("dataset '{}': kinematic points vs data points", dp.name()),
                    nd,
                    kin.n_points(),
                )
            })?;
            let shift = profile.shifts[j];
            Ok(PointDiagnostic {
                index: j,
                qt,
                prediction: pred[j],
                experimental: mean[j],
                uncertainty: unc[j],
                shift,
                shifted_prediction: pred[j] + shift,
                pull: (mean[j] - pred[j] - shift) / unc[j],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let chi2 = profile.chi2();
    log::debug!(
        "dataset '{}': chi2_D = {}, penalty = {}, chi2/N = {}",
        dp.name(),
        profile.chi2_d,
        profile.penalty,
        chi2 / nd as f64
    );

    Ok(DatasetReport {
        name: dp.name().to_string(),
        n_points: nd,
        chi2_d: profile.chi2_d,
        penalty: profile.penalty,
        chi2_per_point: chi2 / nd as f64,
        nuisance: profile.lambda,
        points,
    })
}
