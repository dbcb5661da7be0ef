//! Decoder for packed `.pict` checkpoints.
//!
//! A `.pict` file is a sequence of parts, each prefixed by its byte length as
//! a big-endian `u32`:
//!
//! 1. a JSON manifest `[{"name": ..., "shape": [...]}, ...]`
//! 2. a quantization table of little-endian `f32` values
//! 3. one `u8` code per weight value, indexing into the table
//!
//! Variables take their values from the decoded stream in manifest order.

use std::path::PathBuf;

use serde::Deserialize;

use super::CheckpointSource;
use super::weights::{WeightSet, WeightTensor, element_count};
use crate::errors::LoadError;

/// Maximum number of entries a `u8` code can address.
const MAX_TABLE_ENTRIES: usize = 256;

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    shape: Vec<usize>,
}

/// A `.pict` checkpoint on disk.
#[derive(Debug, Clone)]
pub struct PictCheckpoint {
    path: PathBuf,
}

impl PictCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CheckpointSource for PictCheckpoint {
    fn load(&self) -> Result<WeightSet, LoadError> {
        if !self.path.exists() {
            return Err(LoadError::NotFound {
                path: self.path.clone(),
            });
        }
        let bytes = std::fs::read(&self.path)?;
        decode_pict(&bytes)
    }

    fn describe(&self) -> String {
        format!("pict:{}", self.path.display())
    }
}

/// Splits the buffer into its length-prefixed parts.
fn split_parts(bytes: &[u8]) -> Result<Vec<&[u8]>, LoadError> {
    let mut parts = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let header = bytes.get(offset..offset + 4).ok_or_else(|| {
            LoadError::corrupt(format!("truncated length prefix at byte {}", offset))
        })?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        offset += 4;

        let part = bytes.get(offset..offset + len).ok_or_else(|| {
            LoadError::corrupt(format!(
                "part {} declares {} bytes but only {} remain",
                parts.len(),
                len,
                bytes.len() - offset
            ))
        })?;
        parts.push(part);
        offset += len;
    }

    Ok(parts)
}

fn decode_table(part: &[u8]) -> Result<Vec<f32>, LoadError> {
    if part.len() % 4 != 0 {
        return Err(LoadError::corrupt(format!(
            "quantization table is {} bytes, not a multiple of 4",
            part.len()
        )));
    }
    let table: Vec<f32> = part
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if table.len() > MAX_TABLE_ENTRIES {
        return Err(LoadError::corrupt(format!(
            "quantization table has {} entries, at most {} are addressable",
            table.len(),
            MAX_TABLE_ENTRIES
        )));
    }
    Ok(table)
}

/// Decodes a complete `.pict` buffer into a weight set.
pub fn decode_pict(bytes: &[u8]) -> Result<WeightSet, LoadError> {
    let parts = split_parts(bytes)?;
    if parts.len() < 3 {
        return Err(LoadError::corrupt(format!(
            "expected 3 parts (manifest, table, codes), found {}",
            parts.len()
        )));
    }

    let manifest: Vec<ManifestEntry> = serde_json::from_slice(parts[0])?;
    let table = decode_table(parts[1])?;
    let codes = parts[2];

    let mut weights = WeightSet::new();
    let mut offset = 0;

    for entry in manifest {
        let size = element_count(&entry.shape);
        let slice = codes.get(offset..offset + size).ok_or_else(|| {
            LoadError::corrupt(format!(
                "variable {} needs {} values, only {} remain",
                entry.name,
                size,
                codes.len().saturating_sub(offset)
            ))
        })?;

        let data = slice
            .iter()
            .map(|&code| {
                table.get(code as usize).copied().ok_or_else(|| {
                    LoadError::corrupt(format!(
                        "code {} in {} is outside the {}-entry table",
                        code,
                        entry.name,
                        table.len()
                    ))
                })
            })
            .collect::<Result<Vec<f32>, LoadError>>()?;

        weights.insert(entry.name, WeightTensor::new(entry.shape, data)?);
        offset += size;
    }

    if offset < codes.len() {
        log::warn!(
            "pict checkpoint carries {} values beyond its manifest; ignoring them",
            codes.len() - offset
        );
    }

    Ok(weights)
}
