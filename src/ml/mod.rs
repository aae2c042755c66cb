//! Estimators, cross-validation and metrics

pub mod cross_validation;
pub mod estimator;
pub mod knn;
pub mod logistic;
pub mod metrics;
pub mod scaler;

pub use cross_validation::{validate_folds, CvPolicy, Fold, KFold, Splitter, StratifiedKFold};
pub use estimator::{Estimator, EstimatorError, PredictType};
pub use knn::{DistanceMetric, KNNClassifier, KNNRegressor, Weighting};
pub use logistic::{LogisticRegression, Regularization};
pub use metrics::{MetricError, Metrics, Scorer};
pub use scaler::{DefaultClassifier, StandardScaler, Standardized};
