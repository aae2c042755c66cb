//! Temporal Decoding CLI
//!
//! ```bash
//! cargo run -- simulate --output epochs.json
//! cargo run -- run --data epochs.json --test-windows diagonal --csv scores.csv
//! cargo run --example temporal_generalization
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use temporal_decoding::data::{DataLoader, Epochs, SyntheticEpochs, TrialDataset};
use temporal_decoding::gat::{
    GatConfig, GeneralizationAcrossTime, PredictMode, PredictOptions, ScoreMatrix, TestWindows,
};
use temporal_decoding::ml::{CvPolicy, Estimator, KNNClassifier, PredictType};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "temporal_decoding")]
#[command(about = "Temporal generalization decoding of epoched recordings")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum EstimatorChoice {
    /// Standardized logistic regression
    Logistic,
    /// K-nearest neighbors
    Knn,
}

#[derive(Subcommand)]
enum Commands {
    /// Write synthetic evoked-response epochs to JSON
    Simulate {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "40")]
        trials: usize,

        #[arg(long, default_value = "8")]
        channels: usize,

        #[arg(long, default_value = "30")]
        samples: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Fit, predict and score a generalization-across-time decoder
    Run {
        /// Epochs JSON (synthetic data if omitted)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Decoder configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// "all" or "diagonal"
        #[arg(long)]
        test_windows: Option<String>,

        /// label, margin or probability
        #[arg(long)]
        predict_type: Option<String>,

        /// cross-validation or mean-prediction
        #[arg(long)]
        mode: Option<String>,

        /// Number of cross-validation folds
        #[arg(short, long)]
        folds: Option<usize>,

        /// Shuffle trials with this seed before splitting into folds
        #[arg(long)]
        cv_seed: Option<u64>,

        #[arg(short, long, value_enum, default_value = "logistic")]
        estimator: EstimatorChoice,

        /// Neighbors for the KNN estimator
        #[arg(short, long, default_value = "5")]
        k: usize,

        /// Write the score matrix as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write the score matrix as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder().with_max_level(level).init();

    match cli.command {
        Commands::Simulate {
            output,
            trials,
            channels,
            samples,
            seed,
        } => {
            let epochs = SyntheticEpochs {
                n_trials: trials,
                n_channels: channels,
                n_samples: samples,
                seed,
                ..Default::default()
            }
            .generate()?;

            DataLoader::save_epochs(&epochs, &output)
                .with_context(|| format!("writing {:?}", output))?;
            info!(
                "Saved {} trials x {} channels x {} samples to {:?}",
                epochs.n_trials(),
                epochs.n_channels(),
                epochs.time_axis().n_samples,
                output
            );
        }

        Commands::Run {
            data,
            config,
            test_windows,
            predict_type,
            mode,
            folds,
            cv_seed,
            estimator,
            k,
            json,
            csv,
        } => {
            let epochs = match data {
                Some(path) => DataLoader::load_epochs(&path)
                    .with_context(|| format!("loading epochs from {:?}", path))?,
                None => {
                    info!("No data file provided, simulating epochs");
                    SyntheticEpochs::default().generate()?
                }
            };
            info!(
                "Loaded {} trials x {} channels x {} samples",
                epochs.n_trials(),
                epochs.n_channels(),
                epochs.time_axis().n_samples
            );

            let mut config: GatConfig = match config {
                Some(path) => DataLoader::load_json(&path)
                    .with_context(|| format!("loading config from {:?}", path))?,
                None => GatConfig::default(),
            };
            if let Some(tw) = test_windows {
                config.test_windows = Some(tw.parse::<TestWindows>()?);
            }
            if let Some(pt) = predict_type {
                config.predict_type = pt.parse::<PredictType>()?;
            }
            if let Some(m) = mode {
                config.predict_mode = m.parse::<PredictMode>()?;
            }
            if folds.is_some() || cv_seed.is_some() {
                let n_splits = match (folds, &config.cv) {
                    (Some(n), _) => n,
                    (None, CvPolicy::Auto { n_splits, .. }) => *n_splits,
                    (None, _) => 5,
                };
                config.cv = CvPolicy::Auto {
                    n_splits,
                    seed: cv_seed,
                };
            }

            let scores = match estimator {
                EstimatorChoice::Logistic => {
                    decode(GeneralizationAcrossTime::new(config), &epochs)?
                }
                EstimatorChoice::Knn => decode(
                    GeneralizationAcrossTime::with_estimator(KNNClassifier::new(k), config),
                    &epochs,
                )?,
            };

            println!("\nGeneralization Across Time");
            println!("==========================");
            print!("{}", scores);
            let diagonal = scores.diagonal();
            if !diagonal.is_empty() {
                let best = diagonal.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                println!("\nBest diagonal score: {:.4}", best);
            }

            if let Some(path) = json {
                DataLoader::save_json(&scores, &path)?;
                info!("Saved scores to {:?}", path);
            }
            if let Some(path) = csv {
                DataLoader::save_scores_csv(&scores, &path)?;
                info!("Saved scores to {:?}", path);
            }
        }
    }

    Ok(())
}

fn decode<E: Estimator>(
    mut gat: GeneralizationAcrossTime<E>,
    epochs: &Epochs,
) -> anyhow::Result<ScoreMatrix> {
    gat.fit(epochs, None).context("fitting")?;
    gat.predict(epochs, &PredictOptions::new()).context("predicting")?;
    let scores = gat.score(None, None).context("scoring")?.clone();
    info!("{}", gat);
    Ok(scores)
}
