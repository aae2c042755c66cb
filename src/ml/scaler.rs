//! Feature standardization
//!
//! [`Standardized`] chains a [`StandardScaler`] in front of any estimator,
//! so the scaling statistics are learned on the training fold only.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::estimator::{Estimator, EstimatorError};
use super::logistic::LogisticRegression;

/// Zero-mean, unit-variance scaling per feature
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<(), EstimatorError> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| EstimatorError::Numerical("cannot scale an empty matrix".to_string()))?;
        // Constant features are left unscaled
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 { s } else { 1.0 });
        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        let mean = self.mean.as_ref().ok_or(EstimatorError::NotFitted)?;
        let scale = self.scale.as_ref().ok_or(EstimatorError::NotFitted)?;
        if x.ncols() != mean.len() {
            return Err(EstimatorError::DimensionMismatch {
                expected: mean.len(),
                got: x.ncols(),
            });
        }
        Ok((x - mean) / scale)
    }
}

/// Scaler followed by an estimator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Standardized<E> {
    scaler: StandardScaler,
    estimator: E,
}

impl<E: Estimator> Standardized<E> {
    pub fn new(estimator: E) -> Self {
        Self {
            scaler: StandardScaler::new(),
            estimator,
        }
    }

    pub fn inner(&self) -> &E {
        &self.estimator
    }
}

impl<E: Estimator> Estimator for Standardized<E> {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError> {
        super::estimator::check_fit_input(x, y)?;
        self.scaler.fit(x)?;
        let scaled = self.scaler.transform(x)?;
        self.estimator.fit(&scaled, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, EstimatorError> {
        self.estimator.predict(&self.scaler.transform(x)?)
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        self.estimator.decision_function(&self.scaler.transform(x)?)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        self.estimator.predict_proba(&self.scaler.transform(x)?)
    }

    fn is_classifier(&self) -> bool {
        self.estimator.is_classifier()
    }

    fn name(&self) -> &'static str {
        self.estimator.name()
    }
}

/// Default decoder: standardized logistic regression
pub type DefaultClassifier = Standardized<LogisticRegression>;
