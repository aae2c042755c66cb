//! Prediction over the generalization grid
//!
//! Every fitted training window is evaluated at each of its test windows.
//! Two routing policies decide which fold estimator predicts which trial:
//!
//! - [`PredictMode::CrossValidation`]: a trial is predicted only by the
//!   estimator of the fold that held it out. The predicted data must be the
//!   fitted data (fold indices refer to it).
//! - [`PredictMode::MeanPrediction`]: every fold estimator predicts every
//!   trial and the fold outputs are aggregated, by vote for class labels
//!   and by mean otherwise.

use ndarray::{Array2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::fitter::{flatten_window, FittedModels, Parallelism, WindowModels};
use super::windows::{TestWindowGrid, Window};
use crate::error::{DecodingError, DecodingResult};
use crate::ml::estimator::{Estimator, PredictType};

/// Fold routing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictMode {
    /// Each trial predicted by its held-out fold's estimator
    #[default]
    CrossValidation,
    /// Each trial predicted by every fold's estimator, then aggregated
    MeanPrediction,
}

impl PredictMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PredictMode::CrossValidation => "cross-validation",
            PredictMode::MeanPrediction => "mean-prediction",
        }
    }
}

impl fmt::Display for PredictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictMode {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cross-validation" | "cross_validation" | "matched" => Ok(PredictMode::CrossValidation),
            "mean-prediction" | "mean_prediction" | "independent" => {
                Ok(PredictMode::MeanPrediction)
            }
            other => Err(DecodingError::config(format!(
                "unknown predict mode '{}' (expected cross-validation or mean-prediction)",
                other
            ))),
        }
    }
}

/// Prediction tensor indexed (train window, test window, trial, output)
///
/// The test-window axis is ragged: each training window owns its own
/// list of (trials × output_dim) matrices.
#[derive(Debug, Clone, Serialize)]
pub struct Predictions {
    values: Vec<Vec<Array2<f64>>>,
    covered: Vec<bool>,
    failed: Vec<bool>,
    output_dim: usize,
    predict_type: PredictType,
    mode: PredictMode,
}

impl Predictions {
    /// Predictions of training window `train` at its test window `test`
    pub fn get(&self, train: usize, test: usize) -> Option<&Array2<f64>> {
        self.values.get(train)?.get(test)
    }

    pub fn row(&self, train: usize) -> &[Array2<f64>] {
        &self.values[train]
    }

    pub fn n_train_windows(&self) -> usize {
        self.values.len()
    }

    pub fn n_test_windows(&self, train: usize) -> usize {
        self.values.get(train).map_or(0, Vec::len)
    }

    pub fn n_trials(&self) -> usize {
        self.covered.len()
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Trials that received a prediction
    ///
    /// Uncovered slots hold NaN and are excluded from scoring.
    pub fn covered(&self) -> &[bool] {
        &self.covered
    }

    /// Training windows whose estimators failed to fit
    pub fn is_failed(&self, train: usize) -> bool {
        self.failed.get(train).copied().unwrap_or(false)
    }

    pub fn predict_type(&self) -> PredictType {
        self.predict_type
    }

    pub fn mode(&self) -> PredictMode {
        self.mode
    }
}

/// Evaluates an estimator grid over test windows
pub struct PredictionEngine {
    pub predict_type: PredictType,
    pub mode: PredictMode,
    pub parallelism: Parallelism,
}

impl PredictionEngine {
    pub fn new(predict_type: PredictType, mode: PredictMode, parallelism: Parallelism) -> Self {
        Self {
            predict_type,
            mode,
            parallelism,
        }
    }

    /// Predict `data` (trials, features, samples) over `tests`
    pub fn predict<E: Estimator>(
        &self,
        models: &FittedModels<E>,
        data: ArrayView3<'_, f64>,
        tests: &TestWindowGrid,
    ) -> DecodingResult<Predictions> {
        let (n_trials, n_features, _) = data.dim();

        if n_features != models.n_features() {
            return Err(DecodingError::data(format!(
                "estimators were fitted on {} features but the data has {}",
                models.n_features(),
                n_features
            )));
        }
        if tests.n_train() != models.n_windows() {
            return Err(DecodingError::config(format!(
                "{} test window lists for {} training windows",
                tests.n_train(),
                models.n_windows()
            )));
        }

        let covered = match self.mode {
            PredictMode::CrossValidation => {
                if n_trials != models.n_trials() {
                    return Err(DecodingError::data(format!(
                        "cross-validation prediction needs the {} fitted trials, got {}; \
                         use mean-prediction for new data",
                        models.n_trials(),
                        n_trials
                    )));
                }
                Self::fold_coverage(models, n_trials)
            }
            PredictMode::MeanPrediction => vec![true; n_trials],
        };

        info!(
            "Predicting {} trials over {} training windows ({}, {})",
            n_trials,
            models.n_windows(),
            self.predict_type,
            self.mode
        );

        let rows: Vec<DecodingResult<Option<Vec<Array2<f64>>>>> = match self.parallelism {
            Parallelism::Sequential => (0..models.n_windows())
                .map(|w| self.predict_row(models, data, tests.row(w), w))
                .collect(),
            _ => (0..models.n_windows())
                .into_par_iter()
                .map(|w| self.predict_row(models, data, tests.row(w), w))
                .collect(),
        };
        let rows = rows.into_iter().collect::<DecodingResult<Vec<_>>>()?;

        let output_dim = Self::output_dim(&rows)?;
        let failed: Vec<bool> = rows.iter().map(Option::is_none).collect();
        let values = rows
            .into_iter()
            .enumerate()
            .map(|(w, row)| {
                row.unwrap_or_else(|| {
                    vec![Array2::from_elem((n_trials, output_dim), f64::NAN); tests.row(w).len()]
                })
            })
            .collect();

        Ok(Predictions {
            values,
            covered,
            failed,
            output_dim,
            predict_type: self.predict_type,
            mode: self.mode,
        })
    }

    /// Trials held out by some fold; warns on gaps and overlaps
    fn fold_coverage<E>(models: &FittedModels<E>, n_trials: usize) -> Vec<bool> {
        let mut hits = vec![0usize; n_trials];
        for fold in models.folds() {
            for &i in &fold.test_indices {
                hits[i] += 1;
            }
        }

        let uncovered = hits.iter().filter(|&&h| h == 0).count();
        if uncovered > 0 {
            warn!(
                "{} trials are in no test fold; they get no prediction and are not scored",
                uncovered
            );
        }
        if hits.iter().any(|&h| h > 1) {
            warn!("Test folds overlap; the last fold's prediction is kept");
        }

        hits.into_iter().map(|h| h > 0).collect()
    }

    /// All test windows of one training window; `None` if it failed to fit
    fn predict_row<E: Estimator>(
        &self,
        models: &FittedModels<E>,
        data: ArrayView3<'_, f64>,
        test_windows: &[Window],
        w: usize,
    ) -> DecodingResult<Option<Vec<Array2<f64>>>> {
        let estimators = match models.window_models(w) {
            Some(WindowModels::Fitted(estimators)) => estimators,
            _ => return Ok(None),
        };

        let row = test_windows
            .iter()
            .map(|test_window| match self.mode {
                PredictMode::CrossValidation => {
                    self.predict_matched(models, estimators, data, test_window, w)
                }
                PredictMode::MeanPrediction => {
                    self.predict_aggregated(estimators, data, test_window, w)
                }
            })
            .collect::<DecodingResult<Vec<_>>>()?;

        debug!("Predicted training window {} at {} test windows", w, row.len());
        Ok(Some(row))
    }

    fn query<E: Estimator>(
        &self,
        estimator: &E,
        x: &Array2<f64>,
        window: usize,
        fold: usize,
    ) -> DecodingResult<Array2<f64>> {
        let out = self
            .predict_type
            .apply(estimator, x)
            .map_err(|source| DecodingError::EstimatorPredict {
                window,
                fold,
                source,
            })?;
        if out.nrows() != x.nrows() {
            return Err(DecodingError::data(format!(
                "estimator returned {} predictions for {} trials",
                out.nrows(),
                x.nrows()
            )));
        }
        Ok(out)
    }

    fn predict_matched<E: Estimator>(
        &self,
        models: &FittedModels<E>,
        estimators: &[E],
        data: ArrayView3<'_, f64>,
        test_window: &Window,
        w: usize,
    ) -> DecodingResult<Array2<f64>> {
        let n_trials = data.len_of(Axis(0));
        let mut out: Option<Array2<f64>> = None;

        for (k, (fold, estimator)) in models.folds().iter().zip(estimators).enumerate() {
            if fold.test_indices.is_empty() {
                continue;
            }
            let x = flatten_window(data, test_window, &fold.test_indices);
            let pred = self.query(estimator, &x, w, k)?;

            let target =
                out.get_or_insert_with(|| Array2::from_elem((n_trials, pred.ncols()), f64::NAN));
            if target.ncols() != pred.ncols() {
                return Err(DecodingError::data(format!(
                    "fold {} returned {} output columns, expected {}",
                    k,
                    pred.ncols(),
                    target.ncols()
                )));
            }
            for (r, &trial) in fold.test_indices.iter().enumerate() {
                target.row_mut(trial).assign(&pred.row(r));
            }
        }

        // validate_folds rejects fold sets without any fold, so an empty
        // result only arises when every test fold is empty
        Ok(out.unwrap_or_else(|| Array2::from_elem((n_trials, 1), f64::NAN)))
    }

    fn predict_aggregated<E: Estimator>(
        &self,
        estimators: &[E],
        data: ArrayView3<'_, f64>,
        test_window: &Window,
        w: usize,
    ) -> DecodingResult<Array2<f64>> {
        let trials: Vec<usize> = (0..data.len_of(Axis(0))).collect();
        let x = flatten_window(data, test_window, &trials);

        let preds = estimators
            .iter()
            .enumerate()
            .map(|(k, estimator)| self.query(estimator, &x, w, k))
            .collect::<DecodingResult<Vec<_>>>()?;

        let vote = self.predict_type.is_discrete()
            && estimators.first().map_or(false, |e| e.is_classifier());
        aggregate_folds(&preds, vote)
    }

    /// Common column count of every non-failed prediction
    fn output_dim(rows: &[Option<Vec<Array2<f64>>>]) -> DecodingResult<usize> {
        let mut dims = rows.iter().flatten().flatten().map(|p| p.ncols());
        let first = dims.next().unwrap_or(1);
        if let Some(other) = dims.find(|&d| d != first) {
            return Err(DecodingError::data(format!(
                "estimators returned both {} and {} output columns",
                first, other
            )));
        }
        Ok(first)
    }
}

/// Combine per-fold predictions of the same trials
///
/// With `vote` each cell takes its most frequent value (ties go to the
/// smallest); otherwise the fold mean.
pub fn aggregate_folds(preds: &[Array2<f64>], vote: bool) -> DecodingResult<Array2<f64>> {
    let first = preds
        .first()
        .ok_or_else(|| DecodingError::data("no fold predictions to aggregate"))?;
    if let Some(p) = preds.iter().find(|p| p.dim() != first.dim()) {
        return Err(DecodingError::data(format!(
            "fold predictions of shape {:?} and {:?} cannot be combined",
            first.dim(),
            p.dim()
        )));
    }

    if !vote {
        let mut sum = Array2::zeros(first.dim());
        for p in preds {
            sum += p;
        }
        return Ok(sum / preds.len() as f64);
    }

    Ok(Array2::from_shape_fn(first.dim(), |idx| {
        let mut values: Vec<f64> = preds.iter().map(|p| p[idx]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let (mut best, mut best_count) = (values[0], 0);
        let mut i = 0;
        while i < values.len() {
            let j = values[i..].iter().take_while(|&&v| v == values[i]).count();
            if j > best_count {
                best = values[i];
                best_count = j;
            }
            i += j.max(1);
        }
        best
    }))
}
