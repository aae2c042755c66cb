//! Evaluation metrics for decoders
//!
//! Includes metrics for:
//! - Classification: accuracy, ROC AUC
//! - Regression: MSE, R²
//!
//! [`Scorer`] wraps them (or a caller function) behind the uniform
//! `(ground_truth, predictions) -> score` signature.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::estimator::unique_labels;

/// Errors raised by metric functions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("Arrays must have same length: {truth} truth values, {predictions} predictions")]
    LengthMismatch { truth: usize, predictions: usize },

    #[error("Cannot score an empty set")]
    Empty,

    #[error("Binary ground truth required, got {n_classes} classes")]
    NotBinary { n_classes: usize },

    #[error("Only one class present in ground truth")]
    SingleClass,
}

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<(), MetricError> {
    if y_true.len() != y_pred.len() {
        return Err(MetricError::LengthMismatch {
            truth: y_true.len(),
            predictions: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(MetricError::Empty);
    }
    Ok(())
}

/// Metrics calculator
pub struct Metrics;

impl Metrics {
    // ==================== Classification Metrics ====================

    /// Calculate accuracy: (correct predictions) / (total predictions)
    pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64, MetricError> {
        check_lengths(y_true, y_pred)?;

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| (*t - *p).abs() < 1e-10)
            .count();

        Ok(correct as f64 / y_true.len() as f64)
    }

    /// Area under the ROC curve for binary ground truth
    ///
    /// The larger of the two labels is the positive class. Computed as the
    /// normalized Mann-Whitney U statistic, ties counting one half.
    pub fn roc_auc(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64, MetricError> {
        check_lengths(y_true, y_score)?;

        let classes = unique_labels(y_true);
        match classes.len() {
            1 => return Err(MetricError::SingleClass),
            2 => {}
            n => return Err(MetricError::NotBinary { n_classes: n }),
        }
        let positive = classes[1];

        // Average ranks of the scores (1-based), ties sharing their mean rank
        let mut order: Vec<usize> = (0..y_score.len()).collect();
        order.sort_by(|&a, &b| {
            y_score[a]
                .partial_cmp(&y_score[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut ranks = vec![0.0; order.len()];
        let mut i = 0;
        while i < order.len() {
            let mut j = i;
            while j + 1 < order.len() && y_score[order[j + 1]] == y_score[order[i]] {
                j += 1;
            }
            let mean_rank = (i + j) as f64 / 2.0 + 1.0;
            for &idx in &order[i..=j] {
                ranks[idx] = mean_rank;
            }
            i = j + 1;
        }

        let n_pos = y_true.iter().filter(|&&t| t == positive).count() as f64;
        let n_neg = y_true.len() as f64 - n_pos;
        let rank_sum: f64 = y_true
            .iter()
            .zip(ranks.iter())
            .filter(|(&t, _)| t == positive)
            .map(|(_, &r)| r)
            .sum();

        Ok((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
    }

    // ==================== Regression Metrics ====================

    /// Mean Squared Error
    pub fn mse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64, MetricError> {
        check_lengths(y_true, y_pred)?;

        Ok(y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / y_true.len() as f64)
    }

    /// R² (coefficient of determination)
    pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64, MetricError> {
        check_lengths(y_true, y_pred)?;

        let mean = y_true.mean().unwrap_or(0.0);

        let ss_res: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum();

        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

        if ss_tot == 0.0 {
            Ok(0.0)
        } else {
            Ok(1.0 - ss_res / ss_tot)
        }
    }
}

/// Caller-provided scoring function
pub type ScoreFn = Arc<dyn Fn(&Array1<f64>, &Array1<f64>) -> Result<f64, MetricError> + Send + Sync>;

/// Scoring function applied to each generalization cell
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    Accuracy,
    RocAuc,
    MeanSquaredError,
    R2,
    /// Custom function; not serializable
    #[serde(skip)]
    Custom { name: String, func: ScoreFn },
}

impl Scorer {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Array1<f64>, &Array1<f64>) -> Result<f64, MetricError> + Send + Sync + 'static,
    {
        Scorer::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn evaluate(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64, MetricError> {
        match self {
            Scorer::Accuracy => Metrics::accuracy(y_true, y_pred),
            Scorer::RocAuc => Metrics::roc_auc(y_true, y_pred),
            Scorer::MeanSquaredError => Metrics::mse(y_true, y_pred),
            Scorer::R2 => Metrics::r2_score(y_true, y_pred),
            Scorer::Custom { func, .. } => func(y_true, y_pred),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Scorer::Accuracy => "accuracy",
            Scorer::RocAuc => "roc_auc",
            Scorer::MeanSquaredError => "mean_squared_error",
            Scorer::R2 => "r2",
            Scorer::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scorer({})", self.name())
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
