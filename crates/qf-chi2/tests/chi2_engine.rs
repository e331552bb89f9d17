//! End-to-end tests of the chi-square engine with in-memory datasets and
//! convolution tables.
//!
//! Covers:
//! - total-covariance decorrelation agrees with closed-form profiling
//! - normalisation of the all-datasets chi-square
//! - degenerate datasets without correlated systematics
//! - qT-integrated binnings: cut count, bin averages and bin centres
//! - PV19 predictions through a real table, with parameter updates

use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::DMatrix;
use qf_chi2::{ChiSquare, ChiSquareConfig, DatasetSelection};
use qf_core::{
    DataProvider, Error, Kinematics, ModelFunction, ObjectiveFunction, Result, SharedModel, shared,
};
use qf_data::{CovarianceModel, DataSet};
use qf_fastinterface::{ConvolutionTable, GridSource, ScalingIndex};
use qf_param::Pv19;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Two-function model whose value is `sqrt(pars[0])`, so a unit table
/// predicts `pars[0]` at every point.
struct Level {
    pars: Vec<f64>,
}

impl ModelFunction for Level {
    fn name(&self) -> &str {
        "Level"
    }

    fn n_functions(&self) -> usize {
        2
    }

    fn parameters(&self) -> &[f64] {
        &self.pars
    }

    fn set_parameters(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != 1 {
            return Err(Error::size_mismatch("Level parameters", 1, params.len()));
        }
        self.pars[0] = params[0];
        Ok(())
    }

    fn evaluate(&self, _x: f64, _b: f64, _zeta: f64, ifun: usize) -> Result<f64> {
        if ifun >= 2 {
            return Err(Error::index_out_of_range("function", ifun as i64, 2));
        }
        Ok(self.pars[0].sqrt())
    }
}

fn level(value: f64) -> SharedModel {
    shared(Level { pars: vec![value] })
}

/// Table with one node per dimension and unit weight at every qT.
fn unit_table(qt: &[f64]) -> Arc<ConvolutionTable> {
    let grid = GridSource {
        name: "unit".into(),
        cme: 38.8,
        qt_bounds: qt.to_vec(),
        ogata_coordinates: vec![1.0],
        q_grid: vec![8.0],
        xi_grid: vec![1.0],
        weights: vec![vec![vec![vec![1.0]]]; qt.len()],
        integrated_qt: false,
        scaling_index: ScalingIndex::PerScalingNode,
    };
    Arc::new(ConvolutionTable::from_grid(grid).unwrap())
}

fn kinematics(qt: &[f64], q: f64) -> Kinematics {
    Kinematics { qt_values: qt.to_vec(), q_range: (q, q), integrated_q: false, integrated_qt: false }
}

fn dataset(
    name: &str,
    qt: &[f64],
    mean: Vec<f64>,
    unc: Vec<f64>,
    corr: DMatrix<f64>,
    covariance: CovarianceModel,
) -> Arc<dyn DataProvider> {
    Arc::new(
        DataSet::builder(name, kinematics(qt, 10.0))
            .mean_values(mean)
            .uncorrelated_unc(unc)
            .correlated_unc(corr)
            .covariance(covariance)
            .build()
            .unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn total_covariance_chi2_equals_profiled_chi2() {
    let qt = [0.5, 1.0, 1.5, 2.0, 2.5];
    let corr = DMatrix::from_row_slice(
        5,
        2,
        &[0.05, 0.02, 0.05, -0.01, 0.05, 0.03, 0.05, 0.00, 0.05, 0.04],
    );
    let ds = dataset(
        "E288",
        &qt,
        vec![10.0, 9.0, 11.5, 8.5, 10.5],
        vec![0.4, 0.5, 0.6, 0.5, 0.7],
        corr,
        CovarianceModel::Total,
    );

    // qT / 10 < 0.22 keeps the first four points.
    let mut chi2 = ChiSquare::new(level(9.7), ChiSquareConfig::with_cut(0.22)).unwrap();
    chi2.add_block(ds, unit_table(&qt));
    assert_eq!(chi2.n_cut_points(0).unwrap(), 4);

    let decorrelated = chi2.evaluate(DatasetSelection::Single(0)).unwrap();
    let report = chi2.report().unwrap();
    assert_relative_eq!(report.datasets[0].chi2_per_point, decorrelated, max_relative = 1e-10);
    assert_relative_eq!(report.chi2_per_point, decorrelated, max_relative = 1e-10);
    assert_eq!(report.datasets[0].points.len(), 4);
    assert_eq!(report.datasets[0].nuisance.len(), 2);
}

#[test]
fn all_datasets_chi2_is_normalised_by_total_points() {
    let a = dataset(
        "A",
        &[0.5],
        vec![12.0],
        vec![1.0],
        DMatrix::zeros(1, 0),
        CovarianceModel::Uncorrelated,
    );
    let b = dataset(
        "B",
        &[0.5, 1.0, 1.5],
        vec![10.0, 11.0, 9.0],
        vec![0.5, 0.5, 0.5],
        DMatrix::zeros(3, 0),
        CovarianceModel::Uncorrelated,
    );

    let chi2 = ChiSquare::with_blocks(
        vec![(a, unit_table(&[0.5])), (b, unit_table(&[0.5, 1.0, 1.5]))],
        level(10.0),
        ChiSquareConfig::with_cut(1.0),
    )
    .unwrap();

    let chi2_a = chi2.evaluate(DatasetSelection::Single(0)).unwrap();
    let chi2_b = chi2.evaluate(DatasetSelection::Single(1)).unwrap();
    assert_relative_eq!(chi2_a, 4.0, epsilon = 1e-12);
    assert_relative_eq!(chi2_b, (0.0 + 4.0 + 4.0) / 3.0, epsilon = 1e-12);

    let all = chi2.evaluate(DatasetSelection::All).unwrap();
    assert_relative_eq!(all, (chi2_a * 1.0 + chi2_b * 3.0) / 4.0, epsilon = 1e-12);
    assert_eq!(chi2.evaluate_each().unwrap().len(), 2);
}

#[test]
fn dataset_without_systematics_has_no_penalty() {
    let qt = [0.5, 1.0];
    let ds = dataset(
        "plain",
        &qt,
        vec![10.0, 6.0],
        vec![2.0, 1.0],
        DMatrix::zeros(2, 0),
        CovarianceModel::Total,
    );
    let mut chi2 = ChiSquare::new(level(8.0), ChiSquareConfig::with_cut(1.0)).unwrap();
    chi2.add_block(ds, unit_table(&qt));

    let report = chi2.report().unwrap();
    let row = &report.datasets[0];
    assert!(row.nuisance.is_empty());
    assert_eq!(row.penalty, 0.0);
    assert_relative_eq!(row.chi2_d, 1.0 + 4.0, epsilon = 1e-12);
    assert_relative_eq!(
        chi2.evaluate(DatasetSelection::All).unwrap(),
        row.chi2_per_point,
        epsilon = 1e-12
    );
}

#[test]
fn identity_correlations_give_single_variable_lambdas() {
    let qt = [0.5, 1.0];
    let ds = dataset(
        "two-sources",
        &qt,
        vec![10.0, 10.0],
        vec![2.0, 2.0],
        DMatrix::identity(2, 2),
        CovarianceModel::Uncorrelated,
    );
    let mut chi2 = ChiSquare::new(level(8.0), ChiSquareConfig::with_cut(1.0)).unwrap();
    chi2.add_block(ds, unit_table(&qt));

    let report = chi2.report().unwrap();
    let row = &report.datasets[0];
    for a in 0..2 {
        // residual 2, mean 10, uncertainty 2
        assert_relative_eq!(row.nuisance[a], 2.0 * 10.0 / (4.0 + 100.0), epsilon = 1e-12);
        let p = &row.points[a];
        assert_relative_eq!(p.shifted_prediction, p.prediction + p.shift, epsilon = 1e-12);
        assert_relative_eq!(
            p.pull,
            (p.experimental - p.prediction - p.shift) / p.uncertainty,
            epsilon = 1e-12
        );
    }
}

#[test]
fn zero_passing_points_fails_loudly() {
    let qt = [5.0, 6.0];
    let ds = dataset(
        "high-qt",
        &qt,
        vec![1.0, 1.0],
        vec![0.1, 0.1],
        DMatrix::zeros(2, 0),
        CovarianceModel::Total,
    );
    let mut chi2 = ChiSquare::new(level(1.0), ChiSquareConfig::default()).unwrap();
    chi2.add_block(ds, unit_table(&qt));

    assert_eq!(chi2.n_cut_points(0).unwrap(), 0);
    assert!(matches!(chi2.report(), Err(Error::SingularSystem(_))));
    assert!(matches!(chi2.evaluate(DatasetSelection::Single(0)), Err(Error::SingularSystem(_))));
}

#[test]
fn integrated_qt_dataset_runs_end_to_end() {
    // Cumulative unit weights 0, 1, 3, 6 at the boundaries: bin averages 1, 2, 3.
    let bounds = [1.0, 2.0, 3.0, 4.0];
    let grid = GridSource {
        name: "binned".into(),
        cme: 38.8,
        qt_bounds: bounds.to_vec(),
        ogata_coordinates: vec![1.0],
        q_grid: vec![10.0],
        xi_grid: vec![1.0],
        weights: [0.0, 1.0, 3.0, 6.0].iter().map(|&w| vec![vec![vec![w]]]).collect(),
        integrated_qt: true,
        scaling_index: ScalingIndex::PerScalingNode,
    };
    let table = Arc::new(ConvolutionTable::from_grid(grid).unwrap());

    let ds: Arc<dyn DataProvider> = Arc::new(
        DataSet::builder("binned", Kinematics {
            qt_values: bounds.to_vec(),
            q_range: (10.0, 10.0),
            integrated_q: false,
            integrated_qt: true,
        })
        .mean_values(vec![3.0, 4.0, 6.5])
        .uncorrelated_unc(vec![1.0, 1.0, 0.5])
        .covariance(CovarianceModel::Uncorrelated)
        .build()
        .unwrap(),
    );

    // qT / 10 < 0.35 keeps boundaries 1, 2, 3 and so the first two bins.
    let chi2 =
        ChiSquare::with_blocks(vec![(ds, table)], level(2.0), ChiSquareConfig::with_cut(0.35))
            .unwrap();
    assert_eq!(chi2.n_cut_points(0).unwrap(), 2);

    // predictions 2, 4: residuals 1, 0
    assert_relative_eq!(chi2.evaluate(DatasetSelection::All).unwrap(), 0.5, epsilon = 1e-12);

    let report = chi2.report().unwrap();
    let points = &report.datasets[0].points;
    assert_eq!(points.len(), 2);
    assert_relative_eq!(points[0].qt, 1.5, epsilon = 1e-15);
    assert_relative_eq!(points[1].qt, 2.5, epsilon = 1e-15);
    assert_relative_eq!(points[0].prediction, 2.0, epsilon = 1e-12);
    assert_relative_eq!(points[1].prediction, 4.0, epsilon = 1e-12);
    assert_relative_eq!(report.chi2_per_point, 0.5, epsilon = 1e-12);
}

#[test]
fn pv19_predictions_respond_to_parameters() {
    let qt = [0.5, 1.0, 1.5];
    let grid = GridSource {
        name: "E605_Q_7_8".into(),
        cme: 38.8,
        qt_bounds: qt.to_vec(),
        ogata_coordinates: vec![2.4048, 5.5201, 8.6537],
        q_grid: vec![7.25, 7.75],
        xi_grid: vec![0.9, 1.0, 1.1],
        weights: vec![vec![vec![vec![0.1, 0.2, 0.1]; 2]; 3]; qt.len()],
        integrated_qt: false,
        scaling_index: ScalingIndex::PerScalingNode,
    };
    let table = Arc::new(ConvolutionTable::from_grid(grid).unwrap());

    let model = shared(Pv19::default());
    let reference = table.predictions(&*model.read().unwrap()).unwrap();

    let ds: Arc<dyn DataProvider> = Arc::new(
        DataSet::builder("E605", Kinematics {
            qt_values: qt.to_vec(),
            q_range: (7.0, 8.0),
            integrated_q: true,
            integrated_qt: false,
        })
        .mean_values(reference.clone())
        .uncorrelated_unc(reference.iter().map(|v| 0.05 * v.abs() + 1e-6).collect())
        .build()
        .unwrap(),
    );

    let chi2 = ChiSquare::with_blocks(vec![(ds, table)], model, ChiSquareConfig::with_cut(0.2))
        .unwrap();
    // Q_ref = 7 for integrated Q: qT / 7 < 0.2 keeps 0.5 and 1.0.
    assert_eq!(chi2.n_points_total(), 2);
    assert_eq!(chi2.n_params(), 6);

    let at_truth = chi2.eval(Pv19::default().parameters()).unwrap();
    assert_relative_eq!(at_truth, 0.0, epsilon = 1e-20);

    let shifted = chi2.eval(&[0.3, 0.5, 2.98, 0.173, 0.39, 0.0]).unwrap();
    assert!(shifted > 0.0);
    assert!(shifted.is_finite());
}
