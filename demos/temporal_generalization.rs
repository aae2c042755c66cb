//! Example: Generalization Across Time
//!
//! Demonstrates:
//! 1. Full train-time x test-time decoding with cross-validation
//! 2. Diagonal (time-resolved) decoding
//! 3. Probability outputs scored with ROC AUC
//! 4. Generalization to held-out conditions
//!
//! Run with: cargo run --example temporal_generalization

use temporal_decoding::prelude::*;

fn main() -> anyhow::Result<()> {
    println!("=== Generalization Across Time ===\n");

    let simulation = SyntheticEpochs {
        n_trials: 60,
        n_channels: 12,
        n_samples: 20,
        ..Default::default()
    };
    let epochs = simulation.generate()?;
    println!(
        "Simulated {} trials, {} channels, {} samples\n",
        epochs.n_trials(),
        epochs.n_channels(),
        epochs.time_axis().n_samples
    );

    // ===================
    // 1. Full matrix
    // ===================
    println!("=== 1. Full Generalization Matrix ===\n");

    let config = GatConfig {
        train_windows: WindowConfig::new().with_step(0.02),
        cv: CvPolicy::Stratified {
            n_splits: 5,
            shuffle: true,
            seed: 42,
        },
        ..Default::default()
    };
    let mut gat = GeneralizationAcrossTime::new(config.clone());
    gat.fit(&epochs, None)?;
    gat.predict(&epochs, &PredictOptions::new())?;
    let scores = gat.score(None, None)?.clone();

    if let Some(windows) = gat.train_windows() {
        println!("{}", windows);
    }
    println!("{}", gat);
    print!("{}", scores);

    // ===================
    // 2. Diagonal decoding
    // ===================
    println!("\n=== 2. Diagonal Decoding ===\n");

    let diagonal = PredictOptions::new().with_test_windows(TestWindows::Diagonal);
    gat.predict(&epochs, &diagonal)?;
    let diag_scores = gat.score(None, None)?.clone();
    let times = gat
        .train_windows()
        .map(|w| w.times())
        .unwrap_or_default();
    for (t, row) in times.iter().zip(diag_scores.rows()) {
        println!("  t = {:+.3} s  accuracy = {:.3}", t, row[0]);
    }

    // ===================
    // 3. Probabilities
    // ===================
    println!("\n=== 3. Probability Outputs (ROC AUC) ===\n");

    let proba = diagonal.with_predict_type(PredictType::Probability);
    gat.predict(&epochs, &proba)?;
    let auc = gat.score(None, None)?;
    let best = auc.rows().iter().flatten().cloned().fold(f64::NEG_INFINITY, f64::max);
    println!("  Best diagonal AUC: {:.3}", best);

    // ===================
    // 4. Held-out conditions
    // ===================
    println!("\n=== 4. Generalization Across Conditions ===\n");

    // First half of the trials for training, second half held out
    let conditions = by_condition(&epochs.slice_trials(0..30)?)?;
    let held_out = by_condition(&epochs.slice_trials(30..60)?)?;

    let options = TimeGeneralizationOptions {
        config: GatConfig {
            test_windows: Some(TestWindows::Diagonal),
            ..config
        },
        scorer: None,
    };
    let result = time_generalization(&conditions, Some(&held_out), &options)?;
    if let Some(generalize) = &result.scores_generalize {
        for ((t, cv), held) in result
            .times
            .iter()
            .zip(result.scores.rows())
            .zip(generalize.rows())
        {
            println!("  t = {:+.3} s  cv = {:.3}  held-out = {:.3}", t, cv[0], held[0]);
        }
    }

    Ok(())
}

/// One dataset per distinct trial label
fn by_condition(epochs: &Epochs) -> anyhow::Result<Vec<Epochs>> {
    let labels = epochs.trial_labels().unwrap_or_default();
    let mut classes: Vec<f64> = labels.to_vec();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();

    classes
        .iter()
        .map(|&class| {
            let picks: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
            Ok(epochs.select(&picks)?)
        })
        .collect()
}
