//! ModelHandle - the asynchronously loaded, single-flight image translator.
//!
//! A handle starts `Unloaded`, moves to `Loading` when a checkpoint is
//! requested and settles on `Ready` or `Failed`. The state is published on a
//! watch channel, so callers can either poll [`ModelHandle::ready`] or await
//! the transition.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use burn::tensor::backend::Backend;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use tokio::sync::{Mutex, watch};

use crate::checkpoint::{CheckpointLoader, CheckpointSource, WeightSet, load_checkpoint};
use crate::config::{ConcurrencyPolicy, ModelConfig, ReadinessPolicy};
use crate::errors::{LoadError, ModelError};
use crate::graph::Generator;
use crate::pixels::{deprocess, image_to_tensor, preprocess, tensor_to_image};

/// Lifecycle of a model handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl ModelState {
    /// True once loading finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, ModelState::Ready | ModelState::Failed)
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
            ModelState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A pix2pix generator behind a load state machine and an inference guard.
///
/// At most one `transfer` runs per handle at a time; what happens to a second
/// caller is decided by [`ConcurrencyPolicy`].
pub struct ModelHandle<B: Backend> {
    config: ModelConfig,
    device: B::Device,
    state: watch::Sender<ModelState>,
    generator: OnceLock<Generator<B>>,
    failure: OnceLock<String>,
    inference: Mutex<()>,
}

impl<B: Backend> ModelHandle<B> {
    /// Creates an unloaded handle.
    pub fn new(config: ModelConfig, device: B::Device) -> Self {
        let (state, _) = watch::channel(ModelState::Unloaded);
        Self {
            config,
            device,
            state,
            generator: OnceLock::new(),
            failure: OnceLock::new(),
            inference: Mutex::new(()),
        }
    }

    /// Creates a handle and loads the checkpoint at `id`.
    pub async fn create(id: &str, config: ModelConfig, device: B::Device) -> Result<Self, ModelError> {
        let handle = Self::new(config, device);
        handle.load_path(id).await?;
        Ok(handle)
    }

    /// Loads weights from `source` and builds the generator.
    ///
    /// Only an `Unloaded` handle can load; a second call returns
    /// `ModelError::AlreadyLoaded`.
    pub async fn load(&self, source: Arc<dyn CheckpointSource>) -> Result<(), ModelError> {
        self.drive(load_checkpoint(source)).await
    }

    /// Loads the checkpoint file at `id` (`.pict` or `.json`).
    pub async fn load_path(&self, id: &str) -> Result<(), ModelError> {
        let source = CheckpointLoader::new().resolve(id);
        self.drive(async move {
            match source {
                Ok(source) => load_checkpoint(source).await,
                Err(err) => Err(err),
            }
        })
        .await
    }

    /// Loads `id` through `loader`, sharing its cached weight sets.
    pub async fn load_from(&self, loader: &CheckpointLoader, id: &str) -> Result<(), ModelError> {
        self.drive(loader.load(id)).await
    }

    /// Builds the generator from an already decoded weight set.
    pub async fn load_weights(&self, weights: Arc<WeightSet>) -> Result<(), ModelError> {
        self.drive(std::future::ready(Ok(weights))).await
    }

    /// Returns true once the model can run inference.
    pub fn ready(&self) -> bool {
        *self.state.borrow() == ModelState::Ready
    }

    pub fn state(&self) -> ModelState {
        *self.state.borrow()
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.state.subscribe()
    }

    /// Waits until loading settles. Resolves to an error if it failed.
    ///
    /// On a handle nobody loads this waits forever.
    pub async fn wait_ready(&self) -> Result<(), ModelError> {
        match self.settled_state().await {
            ModelState::Ready => Ok(()),
            _ => Err(self.load_failure()),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The compiled generator, once ready.
    pub fn generator(&self) -> Option<&Generator<B>> {
        self.generator.get()
    }

    /// Translates one image.
    ///
    /// The image is converted to RGB (alpha dropped), run through the
    /// generator and read back as an opaque RGBA image of the same size.
    /// Height and width must be multiples of 512.
    pub async fn transfer(&self, image: &DynamicImage) -> Result<RgbaImage, ModelError> {
        let generator = self.ready_generator().await?;

        let _guard = match self.config.concurrency {
            ConcurrencyPolicy::Reject => self.inference.try_lock().map_err(|_| {
                log::warn!("Rejected transfer: another inference is running");
                ModelError::InferenceInProgress
            })?,
            ConcurrencyPolicy::Queue => self.inference.lock().await,
        };

        self.run(generator, &image.to_rgb8()).await
    }

    async fn run(&self, generator: &Generator<B>, image: &RgbImage) -> Result<RgbaImage, ModelError> {
        let input = preprocess(image_to_tensor::<B>(image, &self.device));
        let output = deprocess(generator.forward(input)?);

        // Let other tasks in before the blocking readback.
        tokio::task::yield_now().await;

        tensor_to_image(output)
    }

    async fn ready_generator(&self) -> Result<&Generator<B>, ModelError> {
        let state = match self.config.readiness {
            ReadinessPolicy::Reject => self.state(),
            ReadinessPolicy::Wait => self.settled_state().await,
        };

        match state {
            ModelState::Ready => self
                .generator
                .get()
                .ok_or(ModelError::NotReady { state }),
            ModelState::Failed => Err(self.load_failure()),
            _ => {
                log::warn!("Rejected transfer: model is {}", state);
                Err(ModelError::NotReady { state })
            }
        }
    }

    async fn settled_state(&self) -> ModelState {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        match receiver.wait_for(ModelState::is_settled).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    fn load_failure(&self) -> ModelError {
        ModelError::LoadFailed {
            message: self.failure.get().cloned().unwrap_or_default(),
        }
    }

    async fn drive<F>(&self, weights: F) -> Result<(), ModelError>
    where
        F: Future<Output = Result<Arc<WeightSet>, LoadError>>,
    {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ModelState::Unloaded {
                *state = ModelState::Loading;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ModelError::AlreadyLoaded {
                state: self.state(),
            });
        }
        let mut claim = LoadClaim {
            state: &self.state,
            failure: &self.failure,
            settled: false,
        };
        log::info!("Loading model");

        match self.prepare(weights).await {
            Ok(generator) => {
                // Loading is claimed once, so the cell is still empty.
                let _ = self.generator.set(generator);
                claim.succeed();
                log::info!("Model ready");
                Ok(())
            }
            Err(err) => {
                log::warn!("Model failed to load: {}", err);
                claim.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn prepare<F>(&self, weights: F) -> Result<Generator<B>, ModelError>
    where
        F: Future<Output = Result<Arc<WeightSet>, LoadError>>,
    {
        let weights = weights.await?;
        let generator = Generator::new(&weights, self.config.encoder_bias, &self.device)?;

        if let Some(size) = self.config.warm_up {
            log::info!("Warming up on a {}x{} image", size, size);
            let blank = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));
            self.run(&generator, &blank).await?;
        }
        Ok(generator)
    }
}

/// The `Loading` state of one load call.
///
/// Dropped before settling (the load future was cancelled), it moves the
/// handle to `Failed` so waiters are released.
struct LoadClaim<'a> {
    state: &'a watch::Sender<ModelState>,
    failure: &'a OnceLock<String>,
    settled: bool,
}

impl LoadClaim<'_> {
    fn succeed(&mut self) {
        self.settled = true;
        self.state.send_replace(ModelState::Ready);
    }

    fn fail(&mut self, message: String) {
        self.settled = true;
        let _ = self.failure.set(message);
        self.state.send_replace(ModelState::Failed);
    }
}

impl Drop for LoadClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!("Model load was cancelled before it finished");
            self.fail("load cancelled".to_string());
        }
    }
}

impl<B: Backend> fmt::Debug for ModelHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
