//! Integration tests for temporal generalization decoding

use approx::assert_relative_eq;
use ndarray::{s, Array1, Array2, Array3};
use temporal_decoding::gat::flatten_window;
use temporal_decoding::ml::{EstimatorError, Fold, Metrics};
use temporal_decoding::prelude::*;

fn epochs(n_trials: usize, n_channels: usize, n_samples: usize, seed: u64) -> Epochs {
    SyntheticEpochs {
        n_trials,
        n_channels,
        n_samples,
        sfreq: 100.0,
        tmin: 0.0,
        effect_start: 0.01,
        effect_stop: 0.02,
        effect_size: 2.0,
        seed,
        ..Default::default()
    }
    .generate()
    .unwrap()
}

fn kfold_config(n_splits: usize) -> GatConfig {
    GatConfig {
        cv: CvPolicy::KFold {
            n_splits,
            shuffle: false,
            seed: 0,
        },
        ..Default::default()
    }
}

#[test]
fn test_full_generalization_matrix() {
    let data = epochs(20, 4, 3, 7);
    let mut gat = GeneralizationAcrossTime::new(kfold_config(2));

    gat.fit(&data, None).unwrap();
    gat.predict(&data, &PredictOptions::new()).unwrap();
    let scores = gat.score(None, None).unwrap();

    assert_eq!(scores.shape(), (3, 3));
    assert!(scores.is_rectangular());
    for &s in scores.rows().iter().flatten() {
        assert!((0.0..=1.0).contains(&s), "score {} out of range", s);
    }
}

#[test]
fn test_diagonal_matches_full_matrix() {
    let data = epochs(20, 4, 3, 7);

    let mut full = GeneralizationAcrossTime::new(kfold_config(2));
    full.fit(&data, None).unwrap();
    full.predict(&data, &PredictOptions::new()).unwrap();
    let full_scores = full.score(None, None).unwrap().clone();

    let mut diag = GeneralizationAcrossTime::new(kfold_config(2));
    diag.fit(&data, None).unwrap();
    diag.predict(
        &data,
        &PredictOptions::new().with_test_windows(TestWindows::Diagonal),
    )
    .unwrap();
    let diag_scores = diag.score(None, None).unwrap();

    assert_eq!(diag_scores.shape(), (3, 1));
    for i in 0..3 {
        assert_relative_eq!(diag_scores[(i, 0)], full_scores[(i, i)]);
    }

    let tests = diag.test_windows().unwrap();
    let train = diag.train_windows().unwrap();
    for i in 0..train.len() {
        assert_eq!(tests.row(i), &[train.windows()[i]]);
    }
}

#[test]
fn test_start_before_first_sample() {
    let data = epochs(20, 4, 3, 7);
    let config = GatConfig {
        train_windows: WindowConfig::new().with_start(-0.05),
        ..kfold_config(2)
    };
    let mut gat = GeneralizationAcrossTime::new(config);

    let err = gat.fit(&data, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!gat.is_fitted());
}

#[test]
fn test_binary_probability_output_dim() {
    let data = epochs(20, 4, 3, 7);
    let mut gat = GeneralizationAcrossTime::new(kfold_config(2));
    gat.fit(&data, None).unwrap();

    let preds = gat
        .predict(
            &data,
            &PredictOptions::new().with_predict_type(PredictType::Probability),
        )
        .unwrap();
    assert_eq!(preds.output_dim(), 1);
    assert_eq!(preds.get(0, 2).unwrap().dim(), (20, 1));

    let scores = gat.score(None, None).unwrap().clone();
    assert_eq!(gat.scorer().unwrap().name(), "roc_auc");
    assert!(scores.rows().iter().flatten().all(|s| (0.0..=1.0).contains(s)));
}

#[test]
fn test_multiclass_probability_output_dim() {
    let data = SyntheticEpochs {
        n_trials: 30,
        n_channels: 4,
        n_samples: 3,
        n_classes: 3,
        ..Default::default()
    }
    .generate()
    .unwrap();

    let mut gat = GeneralizationAcrossTime::with_estimator(KNNClassifier::new(3), kfold_config(3));
    gat.fit(&data, None).unwrap();
    let preds = gat
        .predict(
            &data,
            &PredictOptions::new().with_predict_type(PredictType::Probability),
        )
        .unwrap();
    assert_eq!(preds.output_dim(), 3);

    let scores = gat.score(None, None).unwrap();
    assert_eq!(scores.shape(), (3, 3));
}

#[test]
fn test_binary_margin_output_dim() {
    let data = epochs(20, 4, 3, 7);
    let mut gat = GeneralizationAcrossTime::new(kfold_config(2));
    gat.fit(&data, None).unwrap();

    let preds = gat
        .predict(&data, &PredictOptions::new().with_predict_type(PredictType::Margin))
        .unwrap();
    assert_eq!(preds.output_dim(), 1);
    assert_eq!(preds.get(1, 0).unwrap().dim(), (20, 1));

    let scores = gat.score(None, None).unwrap().clone();
    assert_eq!(gat.scorer().unwrap().name(), "roc_auc");
    assert_eq!(scores.shape(), (3, 3));
    assert!(scores.rows().iter().flatten().all(|s| (0.0..=1.0).contains(s)));
}

#[test]
fn test_multiclass_margin_output_dim() {
    let data = SyntheticEpochs {
        n_trials: 30,
        n_channels: 4,
        n_samples: 3,
        n_classes: 3,
        ..Default::default()
    }
    .generate()
    .unwrap();

    let mut gat = GeneralizationAcrossTime::new(kfold_config(3));
    gat.fit(&data, None).unwrap();
    let preds = gat
        .predict(&data, &PredictOptions::new().with_predict_type(PredictType::Margin))
        .unwrap();
    assert_eq!(preds.output_dim(), 3);
    assert_eq!(preds.get(0, 2).unwrap().dim(), (30, 3));

    let scores = gat.score(None, None).unwrap();
    assert_eq!(scores.shape(), (3, 3));
    assert!(scores.rows().iter().flatten().all(|s| (0.0..=1.0).contains(s)));
}

#[test]
fn test_trials_without_prediction_are_not_scored() {
    let data = epochs(10, 2, 3, 5);
    // Trial 9 is never tested
    let folds = vec![
        Fold::new(vec![5, 6, 7, 8, 9], vec![0, 1, 2, 3, 4]),
        Fold::new(vec![0, 1, 2, 3, 4], vec![5, 6, 7, 8]),
    ];
    let config = GatConfig {
        cv: CvPolicy::Explicit { folds },
        ..Default::default()
    };
    let mut gat = GeneralizationAcrossTime::new(config);
    gat.fit(&data, None).unwrap();

    let preds = gat.predict(&data, &PredictOptions::new()).unwrap().clone();
    assert!(!preds.covered()[9]);
    assert!(preds.covered()[..9].iter().all(|&c| c));
    assert!(preds.get(0, 0).unwrap()[[9, 0]].is_nan());

    let y = data.trial_labels().unwrap();
    let scores = gat.score(None, None).unwrap().clone();
    for train in 0..3 {
        for test in 0..3 {
            let column = preds.get(train, test).unwrap().column(0).to_owned();
            let y_covered = y.slice(s![..9]).to_owned();
            let predicted = column.slice(s![..9]).to_owned();
            let expected = Metrics::accuracy(&y_covered, &predicted).unwrap();
            assert_relative_eq!(scores[(train, test)], expected, epsilon = 1e-12);
        }
    }

    // Relabelling the uncovered trial leaves every score unchanged
    let mut relabelled = y.clone();
    relabelled[9] = 1.0 - y[9];
    let rescored = gat.score(Some(&relabelled), None).unwrap();
    assert_eq!(rescored.rows(), scores.rows());
}

#[test]
fn test_empty_train_fold_fails_fast() {
    let data = epochs(10, 2, 3, 1);
    let folds = vec![
        Fold::new((0..10).collect(), vec![]),
        Fold::new(vec![], (0..10).collect()),
    ];
    let config = GatConfig {
        cv: CvPolicy::Explicit { folds },
        ..Default::default()
    };
    let mut gat = GeneralizationAcrossTime::new(config);

    let err = gat.fit(&data, None).unwrap_err();
    assert!(matches!(err, DecodingError::EmptyTrainFold { fold: 1 }));
    assert_eq!(err.kind(), ErrorKind::Fold);
    assert!(gat.estimators().is_none());
}

#[test]
fn test_matched_diagonal_equals_cross_validated_accuracy() {
    let data = epochs(24, 3, 4, 11);
    let y = data.trial_labels().unwrap();

    let mut gat = GeneralizationAcrossTime::new(kfold_config(3));
    gat.fit(&data, None).unwrap();
    gat.predict(&data, &PredictOptions::new()).unwrap();
    let scores = gat.score(None, None).unwrap().clone();

    let folds = KFold::new(3).split(&y).unwrap();
    let windows = gat.train_windows().unwrap().clone();
    for (w, window) in windows.iter().enumerate() {
        let mut predicted = Array1::zeros(y.len());
        for fold in &folds {
            let x_train = flatten_window(data.data(), window, &fold.train_indices);
            let y_train: Array1<f64> = fold.train_indices.iter().map(|&i| y[i]).collect();
            let mut model = DefaultClassifier::default();
            model.fit(&x_train, &y_train).unwrap();

            let x_test = flatten_window(data.data(), window, &fold.test_indices);
            for (p, &i) in model.predict(&x_test).unwrap().iter().zip(&fold.test_indices) {
                predicted[i] = *p;
            }
        }
        let accuracy = Metrics::accuracy(&y, &predicted).unwrap();
        assert_relative_eq!(scores[(w, w)], accuracy, epsilon = 1e-12);
    }
}

/// Fails to fit when any input exceeds a limit
#[derive(Clone)]
struct Picky {
    inner: DefaultClassifier,
    limit: f64,
}

impl Estimator for Picky {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), EstimatorError> {
        if x.iter().any(|v| v.abs() > self.limit) {
            return Err(EstimatorError::Numerical("input too large".to_string()));
        }
        self.inner.fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, EstimatorError> {
        self.inner.predict(x)
    }

    fn name(&self) -> &'static str {
        "Picky"
    }
}

fn spiky_epochs() -> Epochs {
    let mut data = Array3::from_shape_fn((12, 2, 3), |(t, c, s)| {
        ((t % 2) as f64 - 0.5) * (c + 1) as f64 + 0.01 * (t * 3 + s) as f64
    });
    data[[5, 0, 2]] = 100.0;
    let events = (0..12).map(|i| (i % 2) as f64).collect();
    Epochs::from_eeg(data, 0.0, 100.0, Some(events)).unwrap()
}

#[test]
fn test_fit_failure_propagates() {
    let estimator = Picky {
        inner: DefaultClassifier::default(),
        limit: 10.0,
    };
    let mut gat = GeneralizationAcrossTime::with_estimator(estimator, kfold_config(2));

    let err = gat.fit(&spiky_epochs(), None).unwrap_err();
    assert!(matches!(
        err,
        DecodingError::EstimatorFit {
            window: 2,
            fold: 1,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::EstimatorFit);
}

#[test]
fn test_fit_failure_tolerated_with_sentinel() {
    let estimator = Picky {
        inner: DefaultClassifier::default(),
        limit: 10.0,
    };
    let config = GatConfig {
        fit_failures: FailurePolicy::tolerate(-1.0),
        ..kfold_config(2)
    };
    let data = spiky_epochs();
    let mut gat = GeneralizationAcrossTime::with_estimator(estimator, config);

    gat.fit(&data, None).unwrap();
    assert_eq!(gat.estimators().unwrap().failed_windows(), vec![2]);

    gat.predict(&data, &PredictOptions::new()).unwrap();
    let scores = gat.score(None, None).unwrap();
    assert_eq!(scores.row(2), &[-1.0, -1.0, -1.0]);
    assert!(scores.row(0).iter().all(|s| (0.0..=1.0).contains(s)));
}

#[test]
fn test_predict_before_fit() {
    let data = epochs(10, 2, 3, 1);
    let mut gat = GeneralizationAcrossTime::new(GatConfig::default());

    let err = gat.predict(&data, &PredictOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err.is_data_error());

    let err = gat.score(None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
}

#[test]
fn test_mean_prediction_on_new_data() {
    let train = epochs(20, 4, 3, 7);
    let held_out = epochs(30, 4, 3, 8);

    let mut gat = GeneralizationAcrossTime::new(kfold_config(2));
    gat.fit(&train, None).unwrap();

    // Fold indices do not apply to other data
    let err = gat.predict(&held_out, &PredictOptions::new()).unwrap_err();
    assert!(err.is_data_error());

    let options = PredictOptions::new().with_mode(PredictMode::MeanPrediction);
    let preds = gat.predict(&held_out, &options).unwrap();
    assert_eq!(preds.n_trials(), 30);
    assert!(preds.covered().iter().all(|&c| c));

    let scores = gat.score(None, None).unwrap();
    assert_eq!(scores.shape(), (3, 3));
}

#[test]
fn test_regression_defaults_to_r2() {
    let data = epochs(20, 2, 3, 5);
    let y: Array1<f64> = (0..20).map(|i| i as f64 * 0.5).collect();

    let mut gat = GeneralizationAcrossTime::with_estimator(KNNRegressor::new(3), kfold_config(2));
    gat.fit(&data, Some(&y)).unwrap();
    gat.predict(&data, &PredictOptions::new()).unwrap();
    gat.score(Some(&y), None).unwrap();

    assert_eq!(gat.scorer().unwrap().name(), "r2");
}

#[test]
fn test_config_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let config = GatConfig {
        train_windows: WindowConfig::new().with_length(0.02).with_step(0.01),
        test_windows: Some(TestWindows::Diagonal),
        predict_type: PredictType::Margin,
        ..kfold_config(4)
    };
    DataLoader::save_json(&config, &path).unwrap();
    let loaded: GatConfig = DataLoader::load_json(&path).unwrap();

    assert_eq!(loaded.train_windows, config.train_windows);
    assert_eq!(loaded.test_windows, Some(TestWindows::Diagonal));
    assert_eq!(loaded.cv, config.cv);
    assert_eq!(loaded.predict_type, PredictType::Margin);
    assert!(!loaded.fit_failures.tolerate);
}

#[test]
fn test_generalization_across_conditions() {
    let data = epochs(24, 4, 3, 9);
    let labels = data.trial_labels().unwrap();
    let split = |class: f64| -> Epochs {
        let picks: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        data.select(&picks).unwrap()
    };
    let conditions = [split(0.0), split(1.0)];

    let options = TimeGeneralizationOptions {
        config: kfold_config(3),
        scorer: Some(Scorer::Accuracy),
    };
    let result = time_generalization(&conditions, None, &options).unwrap();

    assert_eq!(result.scores.shape(), (3, 3));
    assert!(result.scores_generalize.is_none());
    assert_relative_eq!(result.times[1], 0.01);
}
