//! Fold-aware fitting of one estimator per (training window, fold)

use ndarray::{s, Array1, Array2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use super::windows::{TimeWindows, Window};
use crate::error::{DecodingError, DecodingResult};
use crate::ml::cross_validation::{validate_folds, Fold};
use crate::ml::estimator::{unique_labels, Estimator};

/// Which axis of the fit grid runs in parallel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallelism {
    Sequential,
    /// One task per training window
    #[default]
    Windows,
    /// One task per fold, within each training window
    Folds,
}

/// What to do when an estimator fails to fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicy {
    /// Record the failure instead of aborting
    #[serde(default)]
    pub tolerate: bool,
    /// Score reported for every cell of a failed training window
    #[serde(default = "nan", deserialize_with = "nullable_score")]
    pub sentinel_score: f64,
}

fn nan() -> f64 {
    f64::NAN
}

// serde_json writes NaN as null
fn nullable_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::propagate()
    }
}

impl FailurePolicy {
    /// Abort on the first failure
    pub fn propagate() -> Self {
        Self {
            tolerate: false,
            sentinel_score: f64::NAN,
        }
    }

    pub fn tolerate(sentinel_score: f64) -> Self {
        Self {
            tolerate: true,
            sentinel_score,
        }
    }
}

/// Fitted estimators of one training window
#[derive(Debug, Clone)]
pub enum WindowModels<E> {
    /// One estimator per fold
    Fitted(Vec<E>),
    /// Some fold failed under a tolerant policy
    Failed { reason: String },
}

/// Estimator grid indexed by (training window, fold)
#[derive(Debug, Clone)]
pub struct FittedModels<E> {
    windows: TimeWindows,
    folds: Vec<Fold>,
    models: Vec<WindowModels<E>>,
    n_trials: usize,
    n_features: usize,
    classes: Option<Vec<f64>>,
}

impl<E> FittedModels<E> {
    pub fn windows(&self) -> &TimeWindows {
        &self.windows
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn n_windows(&self) -> usize {
        self.models.len()
    }

    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Trial count of the fitted data
    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    /// Feature (channel) count of the fitted data
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Training classes, `None` for regressors
    pub fn classes(&self) -> Option<&[f64]> {
        self.classes.as_deref()
    }

    pub fn window_models(&self, window: usize) -> Option<&WindowModels<E>> {
        self.models.get(window)
    }

    pub fn get(&self, window: usize, fold: usize) -> Option<&E> {
        match self.models.get(window)? {
            WindowModels::Fitted(models) => models.get(fold),
            WindowModels::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self, window: usize) -> bool {
        matches!(self.models.get(window), Some(WindowModels::Failed { .. }))
    }

    pub fn failed_windows(&self) -> Vec<usize> {
        (0..self.models.len()).filter(|&w| self.is_failed(w)).collect()
    }
}

/// Flatten the window's (features × samples) block of each selected trial
///
/// Features vary slowest: column `f * window.length + t` holds feature `f`
/// at sample `window.start + t`.
pub fn flatten_window(data: ArrayView3<'_, f64>, window: &Window, trials: &[usize]) -> Array2<f64> {
    let slab = data.slice(s![.., .., window.start..window.end()]);
    let n_features = slab.len_of(Axis(1)) * window.length;
    let mut out = Array2::zeros((trials.len(), n_features));

    for (row, &trial) in trials.iter().enumerate() {
        let block = slab.index_axis(Axis(0), trial);
        for (dst, &value) in out.row_mut(row).iter_mut().zip(block.iter()) {
            *dst = value;
        }
    }
    out
}

/// Fits the estimator grid
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldAwareFitter {
    pub parallelism: Parallelism,
    pub failures: FailurePolicy,
}

impl FoldAwareFitter {
    pub fn new(parallelism: Parallelism, failures: FailurePolicy) -> Self {
        Self {
            parallelism,
            failures,
        }
    }

    /// Fit a clone of `template` for every (window, fold) pair
    ///
    /// `data` is (trials, features, samples). Folds are validated before
    /// anything is fitted.
    pub fn fit<E: Estimator>(
        &self,
        template: &E,
        data: ArrayView3<'_, f64>,
        y: &Array1<f64>,
        windows: TimeWindows,
        folds: Vec<Fold>,
    ) -> DecodingResult<FittedModels<E>> {
        let (n_trials, n_features, n_samples) = data.dim();
        if y.len() != n_trials {
            return Err(DecodingError::data(format!(
                "{} trials but {} labels",
                n_trials,
                y.len()
            )));
        }
        validate_folds(&folds, n_trials)?;
        if let Some(w) = windows.iter().find(|w| w.end() > n_samples) {
            return Err(DecodingError::config(format!(
                "window [{}, {}) runs past the {} samples of the data",
                w.start,
                w.end(),
                n_samples
            )));
        }

        info!(
            "Fitting {} {} estimators: {} windows x {} folds ({:?})",
            windows.len() * folds.len(),
            template.name(),
            windows.len(),
            folds.len(),
            self.parallelism
        );

        let results: Vec<DecodingResult<Vec<E>>> = match self.parallelism {
            Parallelism::Windows => (0..windows.len())
                .into_par_iter()
                .map(|w| self.fit_window(template, data, y, &windows.windows()[w], w, &folds))
                .collect(),
            _ => windows
                .iter()
                .enumerate()
                .map(|(w, window)| self.fit_window(template, data, y, window, w, &folds))
                .collect(),
        };

        let mut models = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(fitted) => models.push(WindowModels::Fitted(fitted)),
                Err(err @ DecodingError::EstimatorFit { .. }) if self.failures.tolerate => {
                    warn!("{}; the window is scored as {}", err, self.failures.sentinel_score);
                    models.push(WindowModels::Failed {
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let classes = template.is_classifier().then(|| unique_labels(y));

        Ok(FittedModels {
            windows,
            folds,
            models,
            n_trials,
            n_features,
            classes,
        })
    }

    fn fit_window<E: Estimator>(
        &self,
        template: &E,
        data: ArrayView3<'_, f64>,
        y: &Array1<f64>,
        window: &Window,
        w: usize,
        folds: &[Fold],
    ) -> DecodingResult<Vec<E>> {
        let fit_fold = |(k, fold): (usize, &Fold)| -> DecodingResult<E> {
            let x_train = flatten_window(data, window, &fold.train_indices);
            let y_train: Array1<f64> = fold.train_indices.iter().map(|&i| y[i]).collect();

            let mut estimator = template.clone();
            estimator
                .fit(&x_train, &y_train)
                .map_err(|source| DecodingError::EstimatorFit {
                    window: w,
                    fold: k,
                    source,
                })?;
            debug!("Fitted window {} fold {} on {} trials", w, k, y_train.len());
            Ok(estimator)
        };

        match self.parallelism {
            Parallelism::Folds => folds.par_iter().enumerate().map(fit_fold).collect(),
            _ => folds.iter().enumerate().map(fit_fold).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::TimeAxis;
    use crate::gat::windows::{TimeWindowPlanner, WindowConfig};
    use crate::ml::estimator::EstimatorError;
    use crate::ml::KFold;
    use crate::ml::Splitter;
    use ndarray::{array, Array3};

    /// Remembers the mean of its training targets
    #[derive(Debug, Clone, Default)]
    struct MeanModel {
        mean: f64,
    }

    impl Estimator for MeanModel {
        fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError> {
            if x.iter().any(|v| *v < 0.0) {
                return Err(EstimatorError::Numerical("negative input".to_string()));
            }
            self.mean = y.mean().unwrap_or(0.0);
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, EstimatorError> {
            Ok(Array1::from_elem(x.nrows(), self.mean))
        }

        fn is_classifier(&self) -> bool {
            false
        }

        fn name(&self) -> &'static str {
            "MeanModel"
        }
    }

    fn setup(data: &Array3<f64>) -> (TimeWindows, Vec<Fold>, Array1<f64>) {
        let axis = TimeAxis::new(data.dim().2, 0.0, 0.01);
        let windows = TimeWindowPlanner::plan(&axis, &WindowConfig::new()).unwrap();
        let y: Array1<f64> = (0..data.dim().0).map(|i| i as f64).collect();
        let folds = KFold::new(2).split(&y).unwrap();
        (windows, folds, y)
    }

    #[test]
    fn test_flatten_window_layout() {
        let data = Array3::from_shape_fn((2, 2, 4), |(t, c, s)| (t * 100 + c * 10 + s) as f64);
        let x = flatten_window(data.view(), &Window::new(1, 2), &[1]);
        assert_eq!(x, array![[101.0, 102.0, 111.0, 112.0]]);
    }

    #[test]
    fn test_grid_shape() {
        let data = Array3::from_elem((6, 2, 3), 1.0);
        let (windows, folds, y) = setup(&data);

        for parallelism in [Parallelism::Sequential, Parallelism::Windows, Parallelism::Folds] {
            let fitter = FoldAwareFitter::new(parallelism, FailurePolicy::default());
            let grid = fitter
                .fit(&MeanModel::default(), data.view(), &y, windows.clone(), folds.clone())
                .unwrap();
            assert_eq!(grid.n_windows(), 3);
            assert_eq!(grid.n_folds(), 2);
            // First fold trains on trials 3..6
            assert_eq!(grid.get(0, 0).unwrap().mean, 4.0);
            assert!(grid.classes().is_none());
        }
    }

    #[test]
    fn test_fit_failure_propagates_with_context() {
        let mut data = Array3::from_elem((6, 2, 3), 1.0);
        data[[4, 0, 2]] = -1.0;
        let (windows, folds, y) = setup(&data);

        let err = FoldAwareFitter::default()
            .fit(&MeanModel::default(), data.view(), &y, windows, folds)
            .unwrap_err();
        assert!(matches!(err, DecodingError::EstimatorFit { window: 2, fold: 0, .. }));
    }

    #[test]
    fn test_fit_failure_tolerated() {
        let mut data = Array3::from_elem((6, 2, 3), 1.0);
        data[[4, 0, 2]] = -1.0;
        let (windows, folds, y) = setup(&data);

        let fitter = FoldAwareFitter::new(Parallelism::Sequential, FailurePolicy::tolerate(0.0));
        let grid = fitter
            .fit(&MeanModel::default(), data.view(), &y, windows, folds)
            .unwrap();
        assert_eq!(grid.failed_windows(), vec![2]);
        assert!(grid.get(2, 1).is_none());
        assert!(grid.get(1, 1).is_some());
    }

    #[test]
    fn test_empty_train_fold_fails_before_fitting() {
        let data = Array3::from_elem((4, 1, 2), -1.0);
        let (windows, _, y) = setup(&data);
        let folds = vec![Fold::new(vec![], vec![0, 1, 2, 3])];

        // MeanModel would reject the negative data if it were ever fitted
        let err = FoldAwareFitter::default()
            .fit(&MeanModel::default(), data.view(), &y, windows, folds)
            .unwrap_err();
        assert!(matches!(err, DecodingError::EmptyTrainFold { fold: 0 }));
    }

    #[test]
    fn test_failure_policy_json() {
        let policy: FailurePolicy = serde_json::from_str(r#"{"tolerate": true}"#).unwrap();
        assert!(policy.tolerate);
        assert!(policy.sentinel_score.is_nan());

        let json = serde_json::to_string(&FailurePolicy::default()).unwrap();
        let back: FailurePolicy = serde_json::from_str(&json).unwrap();
        assert!(back.sentinel_score.is_nan());
    }
}
