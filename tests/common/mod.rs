//! Synthetic generator checkpoints for integration tests.
//!
//! Every value is drawn from a small fixed table, so the same checkpoint can
//! be handed over in memory, as a JSON snapshot or as a `.pict` file and
//! decode to bit-identical weights.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage};
use pix2pix::graph::{ConvKind, GENERATOR_STAGES, IMAGE_CHANNELS, Param, StageInput, StageKind};
use pix2pix::{WeightSet, WeightTensor};

const GRID_LEN: u8 = 200;
/// Table index of 0.0.
pub const ZERO: u8 = 100;
/// Table index of 1.0.
pub const ONE: u8 = GRID_LEN;

/// Values in [-0.25, 0.25) plus a trailing 1.0 for batch norm scales.
pub fn table() -> Vec<f32> {
    (0..GRID_LEN)
        .map(|code| (code as f32 - ZERO as f32) / 400.0)
        .chain(std::iter::once(1.0))
        .collect()
}

/// Deterministic code stream.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_code(&mut self) -> u8 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) % GRID_LEN as u64) as u8
    }

    pub fn codes(&mut self, count: usize) -> Vec<u8> {
        (0..count).map(|_| self.next_code()).collect()
    }
}

pub struct Variable {
    pub name: String,
    pub shape: Vec<usize>,
    pub codes: Vec<u8>,
}

/// A full generator checkpoint in table-code form.
pub struct SyntheticCheckpoint {
    pub width: usize,
    pub kernel: usize,
    pub variables: Vec<Variable>,
}

impl SyntheticCheckpoint {
    /// Every stage outputs `width` channels except the last, which outputs RGB.
    pub fn new(width: usize, kernel: usize, seed: u64) -> Self {
        let mut rng = Lcg::new(seed);
        let mut variables = Vec::new();
        let mut channels: Vec<usize> = Vec::new();

        for spec in GENERATOR_STAGES {
            let in_channels = match spec.input {
                StageInput::NetworkInput => IMAGE_CHANNELS,
                StageInput::Previous => *channels.last().unwrap(),
                StageInput::PreviousWithSkip(skip) => channels.last().unwrap() + channels[skip],
            };
            let out = if spec.kind == StageKind::Decoder && spec.level == 1 {
                IMAGE_CHANNELS
            } else {
                width
            };
            let kernel_shape = match spec.conv {
                ConvKind::Conv2d => vec![kernel, kernel, in_channels, out],
                ConvKind::ConvTranspose2d => vec![kernel, kernel, out, in_channels],
            };

            let count = kernel_shape.iter().product();
            variables.push(Variable {
                name: spec.key(Param::Kernel).to_string(),
                shape: kernel_shape,
                codes: rng.codes(count),
            });
            variables.push(Variable {
                name: spec.key(Param::Bias).to_string(),
                shape: vec![out],
                codes: rng.codes(out),
            });
            if spec.batch_norm {
                variables.push(Variable {
                    name: spec.key(Param::Gamma).to_string(),
                    shape: vec![out],
                    codes: vec![ONE; out],
                });
                variables.push(Variable {
                    name: spec.key(Param::Beta).to_string(),
                    shape: vec![out],
                    codes: rng.codes(out),
                });
            }
            channels.push(out);
        }

        Self {
            width,
            kernel,
            variables,
        }
    }

    pub fn variable_mut(&mut self, name: &str) -> &mut Variable {
        self.variables
            .iter_mut()
            .find(|v| v.name == name)
            .unwrap_or_else(|| panic!("no variable {}", name))
    }

    /// Redraws the values of one variable.
    pub fn reseed(&mut self, name: &str, seed: u64) {
        let variable = self.variable_mut(name);
        variable.codes = Lcg::new(seed).codes(variable.codes.len());
    }

    /// Zeroes the part of every skip decoder kernel that reads the previous
    /// decoder, so each of them only sees its encoder skip input.
    pub fn skip_only_decoders(&mut self) {
        for spec in GENERATOR_STAGES {
            if !matches!(spec.input, StageInput::PreviousWithSkip(_)) {
                continue;
            }
            let previous = self.width;
            let variable = self.variable_mut(&spec.key(Param::Kernel).to_string());
            let in_channels = variable.shape[3];
            for (index, code) in variable.codes.iter_mut().enumerate() {
                if index % in_channels < previous {
                    *code = ZERO;
                }
            }
        }
    }

    pub fn weights(&self) -> WeightSet {
        let table = table();
        self.variables
            .iter()
            .map(|v| {
                let data = v.codes.iter().map(|&c| table[c as usize]).collect();
                (v.name.clone(), WeightTensor::new(v.shape.clone(), data).unwrap())
            })
            .collect()
    }

    pub fn pict_bytes(&self) -> Vec<u8> {
        let manifest: Vec<serde_json::Value> = self
            .variables
            .iter()
            .map(|v| serde_json::json!({"name": v.name, "shape": v.shape}))
            .collect();
        let manifest = serde_json::to_vec(&manifest).unwrap();
        let table: Vec<u8> = table().iter().flat_map(|v| v.to_le_bytes()).collect();
        let codes: Vec<u8> = self
            .variables
            .iter()
            .flat_map(|v| v.codes.iter().copied())
            .collect();

        let mut out = Vec::new();
        for part in [&manifest, &table, &codes] {
            out.extend_from_slice(&(part.len() as u32).to_be_bytes());
            out.extend_from_slice(part);
        }
        out
    }

    pub fn write_pict(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.pict_bytes()).unwrap();
        path
    }

    pub fn write_snapshot(&self, dir: &Path, name: &str) -> PathBuf {
        let weights = self.weights();
        let variables: BTreeMap<&str, &WeightTensor> = weights.iter().collect();
        let json = serde_json::json!({ "variables": variables });
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
        path
    }
}

pub fn gray_image(size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb([128, 128, 128])))
}

pub fn noise_image(size: u32, seed: u64) -> DynamicImage {
    let mut rng = Lcg::new(seed);
    DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |_, _| {
        Rgb([rng.next_code(), rng.next_code(), rng.next_code()])
    }))
}
