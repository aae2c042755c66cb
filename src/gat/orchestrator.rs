//! Generalization across time
//!
//! [`GeneralizationAcrossTime`] fits one estimator per training window and
//! fold, predicts every fitted window at every test window, and scores each
//! (train, test) cell. It moves through four states:
//!
//! ```text
//! Unfit --fit--> Fitted --predict--> Predicted --score--> Scored
//!                  ^                                        |
//!                  +------------------ fit -----------------+
//! ```
//!
//! Calling `fit` again discards the grid, predictions and scores.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use super::fitter::{FailurePolicy, FittedModels, FoldAwareFitter, Parallelism};
use super::predictor::{PredictMode, Predictions, PredictionEngine};
use super::scorer::{default_scorer, GridScorer, ScoreMatrix};
use super::windows::{TestWindowGrid, TestWindows, TimeWindowPlanner, TimeWindows, WindowConfig};
use crate::data::adapter::{ChannelSelector, DataAdapter};
use crate::data::types::TrialDataset;
use crate::error::{DecodingError, DecodingResult};
use crate::ml::cross_validation::{CvPolicy, Fold};
use crate::ml::estimator::{Estimator, PredictType};
use crate::ml::metrics::Scorer;
use crate::ml::scaler::DefaultClassifier;

/// Decoder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatConfig {
    /// Training windows
    pub train_windows: WindowConfig,
    /// Test windows; `None` tests on every training window
    pub test_windows: Option<TestWindows>,
    pub cv: CvPolicy,
    pub predict_type: PredictType,
    pub predict_mode: PredictMode,
    pub channels: ChannelSelector,
    pub parallelism: Parallelism,
    pub fit_failures: FailurePolicy,
}

/// Per-call overrides for [`GeneralizationAcrossTime::predict`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictOptions {
    pub test_windows: Option<TestWindows>,
    pub predict_type: Option<PredictType>,
    pub mode: Option<PredictMode>,
}

impl PredictOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test_windows(mut self, test_windows: TestWindows) -> Self {
        self.test_windows = Some(test_windows);
        self
    }

    pub fn with_predict_type(mut self, predict_type: PredictType) -> Self {
        self.predict_type = Some(predict_type);
        self
    }

    pub fn with_mode(mut self, mode: PredictMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

struct FitState<E> {
    models: FittedModels<E>,
    y: Array1<f64>,
}

struct PredictState {
    predictions: Predictions,
    test_windows: TestWindowGrid,
    options: PredictOptions,
    /// Labels carried by the predicted dataset
    labels: Option<Array1<f64>>,
}

struct ScoreState {
    scores: ScoreMatrix,
    scorer: Scorer,
}

enum GatState<E> {
    Unfit,
    Fitted {
        fit: FitState<E>,
    },
    Predicted {
        fit: FitState<E>,
        prediction: PredictState,
    },
    Scored {
        fit: FitState<E>,
        prediction: PredictState,
        score: ScoreState,
    },
}

impl<E> GatState<E> {
    fn fit(&self) -> Option<&FitState<E>> {
        match self {
            GatState::Unfit => None,
            GatState::Fitted { fit }
            | GatState::Predicted { fit, .. }
            | GatState::Scored { fit, .. } => Some(fit),
        }
    }

    fn prediction(&self) -> Option<&PredictState> {
        match self {
            GatState::Predicted { prediction, .. } | GatState::Scored { prediction, .. } => {
                Some(prediction)
            }
            _ => None,
        }
    }

    fn score(&self) -> Option<&ScoreState> {
        match self {
            GatState::Scored { score, .. } => Some(score),
            _ => None,
        }
    }

    fn into_parts(self) -> (Option<FitState<E>>, Option<PredictState>) {
        match self {
            GatState::Unfit => (None, None),
            GatState::Fitted { fit } => (Some(fit), None),
            GatState::Predicted { fit, prediction } | GatState::Scored { fit, prediction, .. } => {
                (Some(fit), Some(prediction))
            }
        }
    }
}

/// Temporal generalization decoder
pub struct GeneralizationAcrossTime<E = DefaultClassifier> {
    estimator: E,
    config: GatConfig,
    /// Channel indices, resolved on the first fit
    picks: Option<Vec<usize>>,
    state: GatState<E>,
}

impl GeneralizationAcrossTime<DefaultClassifier> {
    /// Decoder using standardized logistic regression
    pub fn new(config: GatConfig) -> Self {
        Self::with_estimator(DefaultClassifier::default(), config)
    }
}

impl<E: Estimator> GeneralizationAcrossTime<E> {
    pub fn with_estimator(estimator: E, config: GatConfig) -> Self {
        Self {
            estimator,
            config,
            picks: None,
            state: GatState::Unfit,
        }
    }

    pub fn config(&self) -> &GatConfig {
        &self.config
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Fit one estimator per (training window, fold)
    ///
    /// Labels default to the dataset's trial tags.
    pub fn fit<D: TrialDataset + ?Sized>(
        &mut self,
        data: &D,
        y: Option<&Array1<f64>>,
    ) -> DecodingResult<()> {
        self.state = GatState::Unfit;

        let picks = match self.picks {
            Some(ref picks) => picks.clone(),
            None => {
                let picks = self.config.channels.resolve(data.channels())?;
                self.picks = Some(picks.clone());
                picks
            }
        };

        let (x, y) = DataAdapter::adapt(data, y, &picks)?;
        let folds = self.config.cv.resolve(&y, self.estimator.is_classifier())?;
        let windows = TimeWindowPlanner::plan(&data.time_axis(), &self.config.train_windows)?;

        info!("Training windows: {}", windows);

        let fitter = FoldAwareFitter::new(self.config.parallelism, self.config.fit_failures);
        let models = fitter.fit(&self.estimator, x.view(), &y, windows, folds)?;

        self.state = GatState::Fitted {
            fit: FitState { models, y },
        };
        Ok(())
    }

    /// Predict `data` at the test windows of every training window
    pub fn predict<D: TrialDataset + ?Sized>(
        &mut self,
        data: &D,
        options: &PredictOptions,
    ) -> DecodingResult<&Predictions> {
        let fit = self.state.fit().ok_or(DecodingError::NotReady {
            operation: "predict",
            required: "fit",
        })?;
        let prediction = self.run_predict(fit, data, options)?;

        let (fit, _) = std::mem::replace(&mut self.state, GatState::Unfit).into_parts();
        if let Some(fit) = fit {
            self.state = GatState::Predicted { fit, prediction };
        }

        self.predictions().ok_or(DecodingError::NotReady {
            operation: "predict",
            required: "fit",
        })
    }

    fn run_predict<D: TrialDataset + ?Sized>(
        &self,
        fit: &FitState<E>,
        data: &D,
        options: &PredictOptions,
    ) -> DecodingResult<PredictState> {
        let picks = self.picks.as_deref().unwrap_or_default();
        let x = DataAdapter::extract(data, picks)?;

        let tests = options
            .test_windows
            .clone()
            .or_else(|| self.config.test_windows.clone())
            .unwrap_or_default();
        let test_windows =
            TimeWindowPlanner::plan_tests(fit.models.windows(), &data.time_axis(), &tests)?;
        info!("Test windows: {}", test_windows);

        let engine = PredictionEngine::new(
            options.predict_type.unwrap_or(self.config.predict_type),
            options.mode.unwrap_or(self.config.predict_mode),
            self.config.parallelism,
        );
        let predictions = engine.predict(&fit.models, x.view(), &test_windows)?;

        Ok(PredictState {
            predictions,
            test_windows,
            options: options.clone(),
            labels: DataAdapter::labels(data, None),
        })
    }

    /// Score the stored predictions
    ///
    /// Ground truth is `y`, else the labels of the predicted dataset, else
    /// (cross-validation mode on the fitted trials) the training labels.
    /// `scorer` defaults to accuracy for labels (R² for regressors) and
    /// ROC AUC for margins and probabilities.
    pub fn score(
        &mut self,
        y: Option<&Array1<f64>>,
        scorer: Option<Scorer>,
    ) -> DecodingResult<&ScoreMatrix> {
        let (fit, prediction) = match (self.state.fit(), self.state.prediction()) {
            (Some(fit), Some(prediction)) => (fit, prediction),
            _ => {
                return Err(DecodingError::NotReady {
                    operation: "score",
                    required: "predict",
                })
            }
        };

        let predictions = &prediction.predictions;
        let y_true = match (y, &prediction.labels) {
            (Some(y), _) => y.clone(),
            (None, Some(labels)) => labels.clone(),
            (None, None)
                if predictions.mode() == PredictMode::CrossValidation
                    && predictions.n_trials() == fit.y.len() =>
            {
                fit.y.clone()
            }
            (None, None) => {
                return Err(DecodingError::data(
                    "no ground truth: pass labels or predict a dataset that carries them",
                ))
            }
        };

        let scorer = scorer.unwrap_or_else(|| {
            default_scorer(predictions.predict_type(), self.estimator.is_classifier())
        });
        let scores = GridScorer {
            scorer: &scorer,
            classes: fit.models.classes(),
            sentinel: self.config.fit_failures.sentinel_score,
        }
        .score(predictions, &y_true)?;

        let (fit, prediction) = std::mem::replace(&mut self.state, GatState::Unfit).into_parts();
        if let (Some(fit), Some(prediction)) = (fit, prediction) {
            self.state = GatState::Scored {
                fit,
                prediction,
                score: ScoreState { scores, scorer },
            };
        }

        self.scores().ok_or(DecodingError::NotReady {
            operation: "score",
            required: "predict",
        })
    }

    /// Predict `data` again, with the options of the last prediction, then score
    pub fn score_with_data<D: TrialDataset + ?Sized>(
        &mut self,
        data: &D,
        y: Option<&Array1<f64>>,
        scorer: Option<Scorer>,
    ) -> DecodingResult<&ScoreMatrix> {
        let options = self
            .state
            .prediction()
            .map(|p| p.options.clone())
            .unwrap_or_default();
        self.predict(data, &options)?;
        self.score(y, scorer)
    }

    pub fn is_fitted(&self) -> bool {
        self.state.fit().is_some()
    }

    pub fn is_predicted(&self) -> bool {
        self.state.prediction().is_some()
    }

    pub fn is_scored(&self) -> bool {
        self.state.score().is_some()
    }

    /// Channel indices used for decoding, once fitted
    pub fn picks(&self) -> Option<&[usize]> {
        self.picks.as_deref()
    }

    pub fn train_windows(&self) -> Option<&TimeWindows> {
        self.state.fit().map(|f| f.models.windows())
    }

    pub fn folds(&self) -> Option<&[Fold]> {
        self.state.fit().map(|f| f.models.folds())
    }

    pub fn estimators(&self) -> Option<&FittedModels<E>> {
        self.state.fit().map(|f| &f.models)
    }

    pub fn test_windows(&self) -> Option<&TestWindowGrid> {
        self.state.prediction().map(|p| &p.test_windows)
    }

    pub fn predictions(&self) -> Option<&Predictions> {
        self.state.prediction().map(|p| &p.predictions)
    }

    pub fn scores(&self) -> Option<&ScoreMatrix> {
        self.state.score().map(|s| &s.scores)
    }

    pub fn scorer(&self) -> Option<&Scorer> {
        self.state.score().map(|s| &s.scorer)
    }
}

impl<E> fmt::Display for GeneralizationAcrossTime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<GAT | fitted: ")?;
        match self.state.fit() {
            Some(fit) => {
                let times = fit.models.windows().times();
                write!(
                    f,
                    "{} windows x {} folds",
                    fit.models.n_windows(),
                    fit.models.n_folds()
                )?;
                if let (Some(first), Some(last)) = (times.first(), times.last()) {
                    write!(f, " ({:.3} to {:.3} s)", first, last)?;
                }
            }
            None => write!(f, "no")?,
        }
        write!(f, ", predicted: ")?;
        match self.state.prediction() {
            Some(p) => write!(
                f,
                "{} trials ({})",
                p.predictions.n_trials(),
                p.predictions.predict_type()
            )?,
            None => write!(f, "no")?,
        }
        write!(f, ", scored: ")?;
        match self.state.score() {
            Some(s) => write!(f, "{}", s.scorer)?,
            None => write!(f, "no")?,
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::SyntheticEpochs;
    use crate::data::types::Epochs;

    fn epochs() -> Epochs {
        SyntheticEpochs {
            n_trials: 20,
            n_channels: 3,
            n_samples: 6,
            sfreq: 50.0,
            tmin: 0.0,
            effect_start: 0.04,
            effect_stop: 0.1,
            effect_size: 3.0,
            ..Default::default()
        }
        .generate()
        .unwrap()
    }

    fn config() -> GatConfig {
        GatConfig {
            cv: CvPolicy::KFold {
                n_splits: 2,
                shuffle: false,
                seed: 0,
            },
            parallelism: Parallelism::Sequential,
            ..Default::default()
        }
    }

    #[test]
    fn test_lifecycle() {
        let data = epochs();
        let mut gat = GeneralizationAcrossTime::new(config());
        assert_eq!(gat.to_string(), "<GAT | fitted: no, predicted: no, scored: no>");

        gat.fit(&data, None).unwrap();
        assert!(gat.is_fitted() && !gat.is_predicted());
        assert_eq!(gat.train_windows().unwrap().len(), 6);

        let preds = gat.predict(&data, &PredictOptions::new()).unwrap();
        assert_eq!(preds.n_train_windows(), 6);
        assert_eq!(preds.n_test_windows(0), 6);

        let scores = gat.score(None, None).unwrap();
        assert_eq!(scores.shape(), (6, 6));
        assert!(gat.is_scored());
        assert_eq!(gat.scorer().unwrap().name(), "accuracy");
        assert!(gat.to_string().ends_with("scored: accuracy>"));

        // Refitting drops predictions and scores
        gat.fit(&data, None).unwrap();
        assert!(!gat.is_predicted());
        assert!(gat.scores().is_none());
    }

    #[test]
    fn test_out_of_order_calls() {
        let data = epochs();
        let mut gat = GeneralizationAcrossTime::new(config());

        let err = gat.predict(&data, &PredictOptions::new()).unwrap_err();
        assert!(matches!(
            err,
            DecodingError::NotReady {
                operation: "predict",
                ..
            }
        ));

        gat.fit(&data, None).unwrap();
        let err = gat.score(None, None).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_failed_predict_keeps_fit() {
        let data = epochs();
        let mut gat = GeneralizationAcrossTime::new(config());
        gat.fit(&data, None).unwrap();

        let bad = PredictOptions::new().with_test_windows(TestWindows::Config(
            WindowConfig::new().with_length(0.04),
        ));
        assert!(gat.predict(&data, &bad).is_err());
        assert!(gat.is_fitted());
    }

    #[test]
    fn test_picks_resolved_once() {
        let mut data = epochs();
        let mut gat = GeneralizationAcrossTime::new(config());
        gat.fit(&data, None).unwrap();
        assert_eq!(gat.picks().unwrap(), &[0, 1, 2]);

        data.mark_bad("EEG 002");
        gat.fit(&data, None).unwrap();
        assert_eq!(gat.picks().unwrap(), &[0, 1, 2]);
    }

    #[test]
    fn test_score_with_new_labels() {
        let data = epochs();
        let mut gat = GeneralizationAcrossTime::new(config());
        gat.fit(&data, None).unwrap();
        gat.predict(&data, &PredictOptions::new().with_test_windows(TestWindows::Diagonal))
            .unwrap();

        let unseen = Array1::from_elem(data.n_trials(), 7.0);
        let err = gat.score(Some(&unseen), None).unwrap_err();
        assert!(matches!(err, DecodingError::Data(_)));

        let scores = gat.score_with_data(&data, None, Some(Scorer::Accuracy)).unwrap();
        assert_eq!(scores.shape(), (6, 1));
    }
}
