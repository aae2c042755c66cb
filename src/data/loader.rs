//! Data loading and saving utilities
//!
//! Epochs, configurations and score matrices are stored as JSON;
//! score matrices can also be exported as CSV.

use csv::Writer;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::types::{Epochs, TrialDataset};
use crate::error::DecodingResult;
use crate::gat::scorer::ScoreMatrix;

/// Data loader for JSON and CSV files
pub struct DataLoader;

impl DataLoader {
    /// Load any deserializable value from a JSON file
    pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> DecodingResult<T> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Save any serializable value to a JSON file
    pub fn save_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> DecodingResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, value)?;
        Ok(())
    }

    pub fn load_epochs<P: AsRef<Path>>(path: P) -> DecodingResult<Epochs> {
        let epochs: Epochs = Self::load_json(path)?;
        // Re-run the shape checks on deserialized data
        let events = epochs.events().map(|e| e.to_vec());
        let axis = epochs.time_axis();
        Epochs::new(
            epochs.data().to_owned(),
            axis.tmin,
            1.0 / axis.sampling_interval,
            epochs.channels().to_vec(),
            events,
        )
    }

    pub fn save_epochs<P: AsRef<Path>>(epochs: &Epochs, path: P) -> DecodingResult<()> {
        Self::save_json(epochs, path)
    }

    /// Write a score matrix as CSV, one row per training window
    ///
    /// Rows of a ragged matrix are padded with empty fields.
    pub fn save_scores_csv<P: AsRef<Path>>(scores: &ScoreMatrix, path: P) -> DecodingResult<()> {
        let mut writer = Writer::from_path(path)?;
        let width = scores.max_row_len();

        let mut header = vec!["train_window".to_string()];
        header.extend((0..width).map(|j| format!("test_{}", j)));
        writer.write_record(&header)?;

        for (i, row) in scores.rows().iter().enumerate() {
            let mut record = vec![i.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            record.resize(width + 1, String::new());
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::SyntheticEpochs;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_epochs() {
        let epochs = SyntheticEpochs {
            n_trials: 6,
            n_channels: 3,
            n_samples: 5,
            ..Default::default()
        }
        .generate()
        .unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("epochs.json");

        DataLoader::save_epochs(&epochs, &path).unwrap();
        let loaded = DataLoader::load_epochs(&path).unwrap();

        assert_eq!(loaded.n_trials(), 6);
        assert_eq!(loaded.events(), epochs.events());
        assert_eq!(loaded.channels(), epochs.channels());
        let diff = (&loaded.data() - &epochs.data()).mapv(f64::abs).sum();
        assert!(diff < 1e-9);
    }

    #[test]
    fn test_save_scores_csv_ragged() {
        let scores = ScoreMatrix::new(vec![vec![0.5, 0.75], vec![1.0]]);
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.csv");

        DataLoader::save_scores_csv(&scores, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "train_window,test_0,test_1");
        assert_eq!(lines[1], "0,0.5,0.75");
        assert_eq!(lines[2], "1,1,");
    }
}
