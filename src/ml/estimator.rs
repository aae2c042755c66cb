//! Estimator capability consumed by the decoder
//!
//! An estimator is fitted on a flattened (trials × features) matrix and
//! exposes up to three prediction capabilities. [`PredictType`] selects
//! one of them at call time through a fixed adapter with a uniform
//! `(estimator, X) -> (trials × outputs)` signature.

use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::DecodingError;

/// Errors raised by estimators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("Model has not been fitted yet")]
    NotFitted,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Training data contains a single class")]
    SingleClass,

    #[error("Input contains NaN or infinite values")]
    NonFinite,

    #[error("Estimator does not implement {0}")]
    Unsupported(&'static str),

    #[error("Numerical failure: {0}")]
    Numerical(String),
}

/// A model that can be cloned, fitted and queried
///
/// Clones must be fully independent: the decoder fits one clone of a
/// template per (window, fold) cell, possibly on several threads.
pub trait Estimator: Clone + Send + Sync {
    /// Fit on `x` (samples × features) and targets `y`
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError>;

    /// Hard class label or regression value per sample
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, EstimatorError>;

    /// Signed distance to the decision boundary, one column per class
    /// (a single column for binary problems)
    fn decision_function(&self, _x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        Err(EstimatorError::Unsupported("decision_function"))
    }

    /// Class posteriors, one column per class in ascending label order
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        Err(EstimatorError::Unsupported("predict_proba"))
    }

    /// Discrete targets (true) or continuous ones (false)
    fn is_classifier(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Which prediction capability to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictType {
    /// Hard label or regression value (output dim 1)
    #[default]
    Label,
    /// Decision-function value
    Margin,
    /// Class probability
    Probability,
}

type Adapter<E> = fn(&E, &Array2<f64>) -> Result<Array2<f64>, EstimatorError>;

fn label_adapter<E: Estimator>(est: &E, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
    Ok(est.predict(x)?.insert_axis(Axis(1)))
}

fn margin_adapter<E: Estimator>(est: &E, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
    est.decision_function(x).map(collapse_binary)
}

fn probability_adapter<E: Estimator>(
    est: &E,
    x: &Array2<f64>,
) -> Result<Array2<f64>, EstimatorError> {
    est.predict_proba(x).map(collapse_binary)
}

/// Keep only the positive-class column of a two-column output
pub fn collapse_binary(output: Array2<f64>) -> Array2<f64> {
    if output.ncols() == 2 {
        output.slice(s![.., 1..2]).to_owned()
    } else {
        output
    }
}

impl PredictType {
    fn adapter<E: Estimator>(self) -> Adapter<E> {
        match self {
            PredictType::Label => label_adapter::<E>,
            PredictType::Margin => margin_adapter::<E>,
            PredictType::Probability => probability_adapter::<E>,
        }
    }

    /// Query `estimator` on `x`, returning a (samples × outputs) matrix
    pub fn apply<E: Estimator>(
        self,
        estimator: &E,
        x: &Array2<f64>,
    ) -> Result<Array2<f64>, EstimatorError> {
        (self.adapter::<E>())(estimator, x)
    }

    /// Label predictions are discrete (aggregated by vote)
    pub fn is_discrete(self) -> bool {
        self == PredictType::Label
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PredictType::Label => "label",
            PredictType::Margin => "margin",
            PredictType::Probability => "probability",
        }
    }
}

impl fmt::Display for PredictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictType {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "label" | "predict" => Ok(PredictType::Label),
            "margin" | "decision_function" => Ok(PredictType::Margin),
            "probability" | "predict_proba" => Ok(PredictType::Probability),
            other => Err(DecodingError::config(format!(
                "unknown predict type '{}' (expected label, margin or probability)",
                other
            ))),
        }
    }
}

/// Sorted distinct values of `y`
pub fn unique_labels(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().cloned().collect();
    classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    classes.dedup();
    classes
}

/// Common input checks for `fit`
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError> {
    if x.nrows() != y.len() {
        return Err(EstimatorError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(EstimatorError::Numerical("no training samples".to_string()));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(EstimatorError::NonFinite);
    }
    Ok(())
}
