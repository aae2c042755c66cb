//! K-Nearest Neighbors classifier and regressor
//!
//! A simple yet effective ML algorithm that classifies/predicts
//! based on the k closest training examples.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::estimator::{check_fit_input, unique_labels, Estimator, EstimatorError};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
}

impl DistanceMetric {
    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match *self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Minkowski(p) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).abs().powf(p))
                .sum::<f64>()
                .powf(1.0 / p),
        }
    }
}

/// Neighbor weighting scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weighting {
    /// All neighbors have equal weight
    Uniform,
    /// Weight by inverse of distance
    Distance,
}

impl Weighting {
    fn weight(&self, dist: f64) -> f64 {
        match self {
            Weighting::Uniform => 1.0,
            Weighting::Distance if dist > 0.0 => 1.0 / dist,
            Weighting::Distance => 1e10,
        }
    }
}

/// Stored training set shared by the classifier and the regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Neighbors {
    k: usize,
    metric: DistanceMetric,
    weights: Weighting,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl Neighbors {
    fn new(k: usize) -> Self {
        Self {
            k,
            metric: DistanceMetric::Euclidean,
            weights: Weighting::Uniform,
            x_train: None,
            y_train: None,
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError> {
        check_fit_input(x, y)?;
        if self.k == 0 {
            return Err(EstimatorError::Numerical("k must be at least 1".to_string()));
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    /// For each sample, its k nearest (label, weight) pairs
    fn query(&self, x: &Array2<f64>) -> Result<Vec<Vec<(f64, f64)>>, EstimatorError> {
        let x_train = self.x_train.as_ref().ok_or(EstimatorError::NotFitted)?;
        let y_train = self.y_train.as_ref().ok_or(EstimatorError::NotFitted)?;

        if x.ncols() != x_train.ncols() {
            return Err(EstimatorError::DimensionMismatch {
                expected: x_train.ncols(),
                got: x.ncols(),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|sample| {
                let mut distances: Vec<(usize, f64)> = x_train
                    .rows()
                    .into_iter()
                    .enumerate()
                    .map(|(i, train_sample)| (i, self.metric.distance(sample, train_sample)))
                    .collect();

                distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

                distances
                    .into_iter()
                    .take(self.k)
                    .map(|(idx, dist)| (y_train[idx], self.weights.weight(dist)))
                    .collect()
            })
            .collect())
    }
}

/// KNN Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    neighbors: Neighbors,
    classes: Vec<f64>,
}

impl KNNClassifier {
    /// Create a new KNN classifier
    ///
    /// # Arguments
    /// * `k` - Number of neighbors to consider
    pub fn new(k: usize) -> Self {
        Self {
            neighbors: Neighbors::new(k),
            classes: Vec::new(),
        }
    }

    /// Set the distance metric
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.neighbors.metric = metric;
        self
    }

    /// Set the weighting scheme
    pub fn with_weights(mut self, weights: Weighting) -> Self {
        self.neighbors.weights = weights;
        self
    }

    pub fn get_k(&self) -> usize {
        self.neighbors.k
    }

    /// Weighted class votes, one column per class
    fn votes(&self, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        let neighbors = self.neighbors.query(x)?;
        let mut votes = Array2::<f64>::zeros((x.nrows(), self.classes.len()));

        for (i, sample_neighbors) in neighbors.iter().enumerate() {
            for &(label, weight) in sample_neighbors {
                if let Some(c) = self.classes.iter().position(|&cl| cl == label) {
                    votes[[i, c]] += weight;
                }
            }
        }

        Ok(votes)
    }
}

impl Estimator for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError> {
        self.neighbors.fit(x, y)?;
        self.classes = unique_labels(y);
        Ok(())
    }

    /// Majority vote; ties go to the smallest label
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, EstimatorError> {
        let votes = self.votes(x)?;
        Ok(votes
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (c, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = c;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, EstimatorError> {
        let mut votes = self.votes(x)?;
        for mut row in votes.rows_mut() {
            let total = row.sum();
            if total > 0.0 {
                row.mapv_inplace(|v| v / total);
            }
        }
        Ok(votes)
    }

    fn name(&self) -> &'static str {
        "KNNClassifier"
    }
}

/// KNN Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    neighbors: Neighbors,
}

impl KNNRegressor {
    /// Create a new KNN regressor
    pub fn new(k: usize) -> Self {
        Self {
            neighbors: Neighbors::new(k),
        }
    }

    /// Set the distance metric
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.neighbors.metric = metric;
        self
    }

    /// Set the weighting scheme
    pub fn with_weights(mut self, weights: Weighting) -> Self {
        self.neighbors.weights = weights;
        self
    }
}

impl Estimator for KNNRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError> {
        self.neighbors.fit(x, y)
    }

    /// Weighted average of the neighbors' targets
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, EstimatorError> {
        let neighbors = self.neighbors.query(x)?;
        Ok(neighbors
            .iter()
            .map(|sample_neighbors| {
                let weight_sum: f64 = sample_neighbors.iter().map(|(_, w)| w).sum();
                let sum: f64 = sample_neighbors.iter().map(|(y, w)| y * w).sum();
                if weight_sum > 0.0 {
                    sum / weight_sum
                } else {
                    0.0
                }
            })
            .collect())
    }

    fn is_classifier(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "KNNRegressor"
    }
}
