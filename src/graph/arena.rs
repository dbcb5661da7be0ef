//! Per-call ownership of intermediate activations.

use std::sync::atomic::{AtomicUsize, Ordering};

use burn::tensor::{Tensor, backend::Backend};

use crate::errors::IntegrityError;

/// Running totals of activations handed to and released by arenas.
#[derive(Debug, Default)]
pub struct ArenaStats {
    allocated: AtomicUsize,
    released: AtomicUsize,
}

impl ArenaStats {
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Activations currently held by a live arena.
    pub fn live(&self) -> usize {
        self.allocated().saturating_sub(self.released())
    }
}

/// Owns the ordered stage outputs of one forward pass.
///
/// Dropping the arena releases every activation it still holds, whether the
/// pass finished or bailed out early.
pub struct ActivationArena<'a, B: Backend> {
    layers: Vec<Tensor<B, 4>>,
    stats: &'a ArenaStats,
}

impl<'a, B: Backend> ActivationArena<'a, B> {
    pub fn new(stats: &'a ArenaStats, capacity: usize) -> Self {
        Self {
            layers: Vec::with_capacity(capacity),
            stats,
        }
    }

    /// Stores a stage output and returns its layer index.
    pub fn push(&mut self, activation: Tensor<B, 4>) -> usize {
        self.layers.push(activation);
        self.stats.allocated.fetch_add(1, Ordering::SeqCst);
        self.layers.len() - 1
    }

    pub fn get(&self, index: usize) -> Result<&Tensor<B, 4>, IntegrityError> {
        self.layers
            .get(index)
            .ok_or(IntegrityError::MissingActivation { index })
    }

    pub fn last(&self) -> Result<&Tensor<B, 4>, IntegrityError> {
        self.layers.last().ok_or(IntegrityError::MissingActivation {
            index: self.layers.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Hands every activation to the caller. They count as released from
    /// the arena's point of view.
    pub fn into_layers(mut self) -> Vec<Tensor<B, 4>> {
        let layers = std::mem::take(&mut self.layers);
        self.stats
            .released
            .fetch_add(layers.len(), Ordering::SeqCst);
        layers
    }
}

impl<B: Backend> Drop for ActivationArena<'_, B> {
    fn drop(&mut self) {
        if self.layers.is_empty() {
            return;
        }
        log::trace!("Releasing {} activations", self.layers.len());
        self.stats
            .released
            .fetch_add(self.layers.len(), Ordering::SeqCst);
        self.layers.clear();
    }
}
