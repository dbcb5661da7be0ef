//! JSON weight snapshots.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use serde::Deserialize;

use super::CheckpointSource;
use super::weights::{WeightSet, WeightTensor};
use crate::errors::LoadError;

#[derive(Debug, Deserialize)]
struct StoredTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    variables: HashMap<String, StoredTensor>,
}

/// A checkpoint stored as `{"variables": {name: {"shape": [...], "data": [...]}}}`.
#[derive(Debug, Clone)]
pub struct SnapshotCheckpoint {
    path: PathBuf,
}

impl SnapshotCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CheckpointSource for SnapshotCheckpoint {
    fn load(&self) -> Result<WeightSet, LoadError> {
        if !self.path.exists() {
            return Err(LoadError::NotFound {
                path: self.path.clone(),
            });
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        from_snapshot(snapshot)
    }

    fn describe(&self) -> String {
        format!("snapshot:{}", self.path.display())
    }
}

/// Parses a snapshot held in memory.
pub fn decode_snapshot(json: &str) -> Result<WeightSet, LoadError> {
    let snapshot: Snapshot = serde_json::from_str(json)?;
    from_snapshot(snapshot)
}

fn from_snapshot(snapshot: Snapshot) -> Result<WeightSet, LoadError> {
    snapshot
        .variables
        .into_iter()
        .map(|(name, stored)| match WeightTensor::new(stored.shape, stored.data) {
            Ok(tensor) => Ok((name, tensor)),
            Err(err) => Err(LoadError::corrupt(format!("variable {}: {}", name, err))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_snapshot() {
        let json = r#"{"variables": {
            "generator/decoder_1/conv2d_transpose/bias": {"shape": [3], "data": [0.1, 0.2, 0.3]}
        }}"#;
        let weights = decode_snapshot(json).expect("snapshot should decode");
        let bias = weights
            .get("generator/decoder_1/conv2d_transpose/bias")
            .unwrap();
        assert_eq!(bias.shape(), &[3]);
        assert_eq!(bias.data(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_snapshot_with_wrong_length_is_corrupt() {
        let json = r#"{"variables": {"a": {"shape": [2, 2], "data": [1.0]}}}"#;
        assert!(matches!(
            decode_snapshot(json),
            Err(LoadError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_snapshot_file_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        std::fs::write(
            &path,
            r#"{"variables": {"a": {"shape": [1], "data": [2.0]}}}"#,
        )
        .unwrap();

        let weights = SnapshotCheckpoint::new(&path).load().unwrap();
        assert_eq!(weights.get("a").unwrap().data(), &[2.0]);
    }
}
