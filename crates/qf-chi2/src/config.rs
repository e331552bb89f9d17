//! Engine configuration.

use qf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration of a [`crate::ChiSquare`] engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChiSquareConfig {
    /// Points with `qT / Q_ref` at or above this value are excluded.
    pub qt_over_q_max: f64,
    /// Evaluate datasets on the rayon thread pool.
    pub parallel: bool,
}

impl Default for ChiSquareConfig {
    fn default() -> Self {
        Self { qt_over_q_max: 0.2, parallel: false }
    }
}

impl ChiSquareConfig {
    /// Config with the given cut and sequential evaluation.
    pub fn with_cut(qt_over_q_max: f64) -> Self {
        Self { qt_over_q_max, ..Self::default() }
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check that the cut is a finite positive number.
    pub fn validate(&self) -> Result<()> {
        if !(self.qt_over_q_max.is_finite() && self.qt_over_q_max > 0.0) {
            return Err(Error::Validation(format!(
                "qt_over_q_max must be finite and positive, got {}",
                self.qt_over_q_max
            )));
        }
        Ok(())
    }
}
