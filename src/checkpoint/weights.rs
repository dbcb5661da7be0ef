//! Host-side weight storage.

use std::collections::BTreeMap;

use burn::tensor::{Tensor, backend::Backend};
use serde::{Deserialize, Serialize};

use crate::errors::{IntegrityError, LoadError};

/// A single named variable from a checkpoint, kept on the host until the
/// generator uploads it to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl WeightTensor {
    /// Creates a tensor, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, LoadError> {
        let expected = element_count(&shape);
        if data.len() != expected {
            return Err(LoadError::corrupt(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Creates a tensor with every element set to `value`.
    pub fn filled(shape: Vec<usize>, value: f32) -> Self {
        let data = vec![value; element_count(&shape)];
        Self { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Uploads a rank-1 variable (bias, gamma, beta).
    pub(crate) fn to_tensor1<B: Backend>(
        &self,
        name: &str,
        device: &B::Device,
    ) -> Result<Tensor<B, 1>, IntegrityError> {
        self.expect_rank(name, 1)?;
        Ok(Tensor::<B, 1>::from_floats(self.data.as_slice(), device))
    }

    /// Uploads a rank-4 variable (kernels) in checkpoint layout.
    pub(crate) fn to_tensor4<B: Backend>(
        &self,
        name: &str,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, IntegrityError> {
        self.expect_rank(name, 4)?;
        let shape = [self.shape[0], self.shape[1], self.shape[2], self.shape[3]];
        Ok(Tensor::<B, 1>::from_floats(self.data.as_slice(), device).reshape(shape))
    }

    fn expect_rank(&self, name: &str, expected: usize) -> Result<(), IntegrityError> {
        if self.rank() != expected {
            return Err(IntegrityError::WeightRank {
                name: name.to_string(),
                expected,
                actual: self.rank(),
            });
        }
        Ok(())
    }
}

/// Number of values a shape holds. The empty shape is a scalar.
pub(crate) fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// The complete collection of named variables a generator is built from.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightSet {
    variables: BTreeMap<String, WeightTensor>,
}

impl WeightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable, replacing any previous one with the same name.
    pub fn with(mut self, name: impl Into<String>, tensor: WeightTensor) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: WeightTensor) {
        self.variables.insert(name.into(), tensor);
    }

    /// Removes a variable, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<WeightTensor> {
        self.variables.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&WeightTensor> {
        self.variables.get(name)
    }

    /// Looks up a variable the topology cannot run without.
    pub fn require(&self, name: &str) -> Result<&WeightTensor, IntegrityError> {
        self.get(name).ok_or_else(|| IntegrityError::MissingWeight {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterates variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WeightTensor)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.variables.values().map(|t| t.data.len()).sum()
    }
}

impl FromIterator<(String, WeightTensor)> for WeightSet {
    fn from_iter<I: IntoIterator<Item = (String, WeightTensor)>>(iter: I) -> Self {
        Self {
            variables: iter.into_iter().collect(),
        }
    }
}
