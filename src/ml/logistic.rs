//! Logistic Regression classifier
//!
//! Binary logistic regression fitted by gradient descent, extended to
//! multiclass problems with one-vs-rest. Labels may be any distinct f64
//! values; they are mapped to class indices in ascending order.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::estimator::{check_fit_input, unique_labels, Estimator, EstimatorError};

/// Regularization type for logistic regression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Regularization {
    /// No regularization
    None,
    /// L1 regularization (Lasso)
    L1(f64),
    /// L2 regularization (Ridge)
    L2(f64),
}

/// Logistic Regression classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Sorted class labels seen during fit
    classes: Vec<f64>,
    /// One row per binary sub-problem (1 for binary, n_classes otherwise)
    coefficients: Option<Array2<f64>>,
    intercepts: Option<Array1<f64>>,
    learning_rate: f64,
    max_iter: usize,
    tolerance: f64,
    regularization: Regularization,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(0.1, 500, 1e-6, Regularization::L2(1e-2))
    }
}

impl LogisticRegression {
    /// Create a new Logistic Regression model
    pub fn new(
        learning_rate: f64,
        max_iter: usize,
        tolerance: f64,
        regularization: Regularization,
    ) -> Self {
        Self {
            classes: Vec::new(),
            coefficients: None,
            intercepts: None,
            learning_rate,
            max_iter,
            tolerance,
            regularization,
        }
    }

    /// Create with L2 regularization of inverse strength `c`
    pub fn with_l2(c: f64) -> Self {
        Self::new(0.1, 500, 1e-6, Regularization::L2(1.0 / c))
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Sigmoid activation function
    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    /// Fit one binary sub-problem with targets in {0, 1}
    fn fit_binary(&self, x: &Array2<f64>, target: &Array1<f64>) -> (Array1<f64>, f64) {
        let n_samples = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let mut previous_cost = f64::INFINITY;

        for iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = linear.mapv(Self::sigmoid);

            let errors = &predictions - target;
            let mut dw = x.t().dot(&errors) / n_samples;
            let db = errors.sum() / n_samples;

            match self.regularization {
                Regularization::L2(alpha) => dw = dw + &weights * alpha,
                Regularization::L1(alpha) => dw = dw + weights.mapv(f64::signum) * alpha,
                Regularization::None => {}
            }

            weights = weights - dw * self.learning_rate;
            bias -= self.learning_rate * db;

            let cost = Self::log_loss(target, &predictions);
            if (previous_cost - cost).abs() < self.tolerance {
                debug!("Converged at iteration {}", iter);
                break;
            }
            previous_cost = cost;
        }

        (weights, bias)
    }

    /// Binary cross-entropy
    fn log_loss(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        -y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&y, &p)| {
                let p = p.clamp(eps, 1.0 - eps);
                y * p.ln() + (1.0 - y) * (1.0 - p).ln()
            })
            .sum::<f64>()
            / y_true.len() as f64
    }

    /// Raw log-odds, one column per sub-problem
    fn linear(&self, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        let weights = self.coefficients.as_ref().ok_or(EstimatorError::NotFitted)?;
        let intercepts = self.intercepts.as_ref().ok_or(EstimatorError::NotFitted)?;

        if x.ncols() != weights.ncols() {
            return Err(EstimatorError::DimensionMismatch {
                expected: weights.ncols(),
                got: x.ncols(),
            });
        }

        Ok(x.dot(&weights.t()) + intercepts)
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError> {
        check_fit_input(x, y)?;

        let classes = unique_labels(y);
        if classes.len() < 2 {
            return Err(EstimatorError::SingleClass);
        }

        // Binary: a single sub-problem for the larger label
        let positives: Vec<f64> = if classes.len() == 2 {
            vec![classes[1]]
        } else {
            classes.clone()
        };

        let mut weights = Array2::<f64>::zeros((positives.len(), x.ncols()));
        let mut intercepts = Array1::<f64>::zeros(positives.len());

        for (k, &positive) in positives.iter().enumerate() {
            let target = y.mapv(|v| if v == positive { 1.0 } else { 0.0 });
            let (w, b) = self.fit_binary(x, &target);
            if w.iter().any(|v| !v.is_finite()) || !b.is_finite() {
                return Err(EstimatorError::Numerical(
                    "gradient descent diverged".to_string(),
                ));
            }
            weights.row_mut(k).assign(&w);
            intercepts[k] = b;
        }

        self.classes = classes;
        self.coefficients = Some(weights);
        self.intercepts = Some(intercepts);

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, EstimatorError> {
        let scores = self.linear(x)?;

        if self.classes.len() == 2 {
            return Ok(scores
                .column(0)
                .mapv(|z| if z >= 0.0 { self.classes[1] } else { self.classes[0] }));
        }

        Ok(scores
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                self.classes[best]
            })
            .collect())
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        self.linear(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        let scores = self.linear(x)?;

        if self.classes.len() == 2 {
            let p = scores.column(0).mapv(Self::sigmoid);
            let mut proba = Array2::<f64>::zeros((x.nrows(), 2));
            proba.column_mut(0).assign(&p.mapv(|v| 1.0 - v));
            proba.column_mut(1).assign(&p);
            return Ok(proba);
        }

        // One-vs-rest probabilities, renormalized per sample
        let mut proba = scores.mapv(Self::sigmoid);
        for mut row in proba.axis_iter_mut(Axis(0)) {
            let total = row.sum();
            if total > 0.0 {
                row.mapv_inplace(|v| v / total);
            }
        }
        Ok(proba)
    }

    fn name(&self) -> &'static str {
        "LogisticRegression"
    }
}
