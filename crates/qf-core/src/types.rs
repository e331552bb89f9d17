//! Kinematic description of a dataset.

use serde::{Deserialize, Serialize};

/// Kinematics of one dataset.
///
/// `qt_values` holds either the qT value of each point (differential
/// measurements) or the qT bin boundaries (qT-integrated measurements, one
/// more boundary than points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    /// qT values or qT bin boundaries [GeV].
    pub qt_values: Vec<f64>,
    /// Q interval of the measurement [GeV].
    pub q_range: (f64, f64),
    /// Whether the measurement is integrated over `q_range`.
    #[serde(default)]
    pub integrated_q: bool,
    /// Whether the measurement is integrated over qT bins.
    #[serde(default)]
    pub integrated_qt: bool,
}

impl Kinematics {
    /// Reference Q used by the qT / Q cut: the lower edge of the Q interval
    /// when Q is integrated, the centre of the interval otherwise.
    pub fn reference_q(&self) -> f64 {
        if self.integrated_q { self.q_range.0 } else { 0.5 * (self.q_range.0 + self.q_range.1) }
    }

    /// Number of independent data points.
    pub fn n_points(&self) -> usize {
        if self.integrated_qt { self.qt_values.len().saturating_sub(1) } else { self.qt_values.len() }
    }

    /// qT coordinate of point `j` (bin centre for integrated bins).
    ///
    /// Returns `None` if `j` is not a valid point index.
    pub fn point_qt(&self, j: usize) -> Option<f64> {
        if self.integrated_qt {
            let lo = *self.qt_values.get(j)?;
            let hi = *self.qt_values.get(j + 1)?;
            Some(0.5 * (lo + hi))
        } else {
            self.qt_values.get(j).copied()
        }
    }

    /// Number of points passing `qT / Q_ref < qt_over_q_max`.
    ///
    /// For qT-integrated binnings the count is over boundaries, minus one,
    /// since the last passing boundary closes the last passing bin.
    pub fn count_passing(&self, qt_over_q_max: f64) -> usize {
        let q_ref = self.reference_q();
        let passing = self.qt_values.iter().filter(|&&qt| qt / q_ref < qt_over_q_max).count();
        if self.integrated_qt { passing.saturating_sub(1) } else { passing }
    }
}

/// Labels used by report and plotting collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotLabels {
    /// Plot title.
    pub title: String,
    /// x-axis label.
    pub xlabel: String,
    /// y-axis label.
    pub ylabel: String,
}
