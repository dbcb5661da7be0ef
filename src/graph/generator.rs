//! The U-Net generator built from a weight set.

use burn::tensor::{Tensor, backend::Backend};

use super::arena::{ActivationArena, ArenaStats};
use super::topology::{
    ConvKind, GENERATOR_STAGES, IMAGE_CHANNELS, Param, SIZE_MULTIPLE, STAGE_COUNT, STRIDE,
    StageInput, StageKind, StageSpec,
};
use crate::checkpoint::WeightSet;
use crate::config::EncoderBias;
use crate::errors::{IntegrityError, ModelError};
use crate::layers::{SameConv2d, SameConvTranspose2d, SpatialBatchNorm, kernel_to_engine_layout};

#[derive(Debug, Clone)]
enum StageConv<B: Backend> {
    Conv(SameConv2d<B>),
    Transpose(SameConvTranspose2d<B>),
}

impl<B: Backend> StageConv<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            StageConv::Conv(conv) => conv.forward(input),
            StageConv::Transpose(deconv) => deconv.forward(input),
        }
    }
}

/// One stage with its weights uploaded to the device.
#[derive(Debug, Clone)]
struct CompiledStage<B: Backend> {
    spec: StageSpec,
    conv: StageConv<B>,
    norm: Option<SpatialBatchNorm<B>>,
    out_channels: usize,
}

impl<B: Backend> CompiledStage<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let rectified = self.spec.pre_activation.apply(input);
        let convolved = self.conv.forward(rectified);
        let normalized = match &self.norm {
            Some(norm) => norm.forward(convolved),
            None => convolved,
        };
        self.spec.output_activation.apply(normalized)
    }
}

/// The pix2pix generator: 9 encoder stages, 9 decoder stages, skip
/// connections between matching levels.
///
/// Construction checks the whole weight set against the topology, so a
/// built generator never fails half-way through a pass because of weights.
#[derive(Debug)]
pub struct Generator<B: Backend> {
    stages: Vec<CompiledStage<B>>,
    stats: ArenaStats,
}

impl<B: Backend> Generator<B> {
    /// Validates `weights` and uploads them to `device`.
    pub fn new(
        weights: &WeightSet,
        encoder_bias: EncoderBias,
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        // Presence of every name first, before anything touches the device.
        for stage in &GENERATOR_STAGES {
            for key in stage.required_keys() {
                weights.require(&key.to_string())?;
            }
        }

        let mut layer_channels: Vec<usize> = Vec::with_capacity(STAGE_COUNT);
        let mut stages = Vec::with_capacity(STAGE_COUNT);

        for spec in GENERATOR_STAGES {
            let in_channels = match spec.input {
                StageInput::NetworkInput => IMAGE_CHANNELS,
                StageInput::Previous => previous_channels(&layer_channels)?,
                StageInput::PreviousWithSkip(skip) => {
                    let skip_channels = layer_channels
                        .get(skip)
                        .copied()
                        .ok_or(IntegrityError::MissingActivation { index: skip })?;
                    previous_channels(&layer_channels)? + skip_channels
                }
            };

            let stage = compile_stage(spec, in_channels, weights, encoder_bias, device)?;
            log::debug!(
                "Compiled {}: {} -> {} channels, {} / {}",
                spec.scope(),
                in_channels,
                stage.out_channels,
                spec.pre_activation.name(),
                spec.output_activation.name()
            );
            layer_channels.push(stage.out_channels);
            stages.push(stage);
        }

        let output_channels = previous_channels(&layer_channels)?;
        if output_channels != IMAGE_CHANNELS {
            return Err(IntegrityError::OutputChannels {
                actual: output_channels,
            }
            .into());
        }

        Ok(Self {
            stages,
            stats: ArenaStats::default(),
        })
    }

    /// Runs the full network and returns its output in [-1, 1].
    ///
    /// `input` is NCHW with 3 channels, already preprocessed to [-1, 1].
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 4>, ModelError> {
        let mut layers = self.forward_traced(input)?;
        layers.pop().ok_or_else(|| {
            IntegrityError::MissingActivation {
                index: STAGE_COUNT - 1,
            }
            .into()
        })
    }

    /// Runs the full network and returns the output of every stage, indexed
    /// like [`GENERATOR_STAGES`].
    pub fn forward_traced(&self, input: Tensor<B, 4>) -> Result<Vec<Tensor<B, 4>>, ModelError> {
        check_input_shape(&input.dims())?;

        let mut arena = ActivationArena::new(&self.stats, self.stages.len());
        let mut network_input = Some(input);

        for stage in &self.stages {
            let stage_input = match stage.spec.input {
                StageInput::NetworkInput => network_input
                    .take()
                    .ok_or(IntegrityError::MissingActivation { index: 0 })?,
                StageInput::Previous => arena.last()?.clone(),
                StageInput::PreviousWithSkip(skip) => {
                    let newer = arena.last()?.clone();
                    let older = arena.get(skip)?.clone();
                    Tensor::cat(vec![newer, older], 1)
                }
            };

            let output = stage.forward(stage_input);
            log::debug!("{} -> {:?}", stage.spec.scope(), output.dims());
            arena.push(output);
        }

        Ok(arena.into_layers())
    }

    /// The stage table this generator was built from.
    pub fn stages(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter().map(|stage| &stage.spec)
    }

    /// Output channels of every stage, indexed like [`GENERATOR_STAGES`].
    pub fn layer_channels(&self) -> Vec<usize> {
        self.stages.iter().map(|stage| stage.out_channels).collect()
    }

    /// Activation bookkeeping across all passes run by this generator.
    pub fn arena_stats(&self) -> &ArenaStats {
        &self.stats
    }
}

fn previous_channels(layer_channels: &[usize]) -> Result<usize, IntegrityError> {
    layer_channels
        .last()
        .copied()
        .ok_or(IntegrityError::MissingActivation { index: 0 })
}

/// Rejects inputs that cannot go through 9 halvings and come back the same size.
pub(crate) fn check_input_shape(dims: &[usize; 4]) -> Result<(), ModelError> {
    let [_, channels, height, width] = *dims;
    if channels != IMAGE_CHANNELS {
        return Err(ModelError::InputChannels { actual: channels });
    }
    let fits = |size: usize| size > 0 && size % SIZE_MULTIPLE == 0;
    if !fits(height) || !fits(width) {
        return Err(ModelError::ShapeMismatch {
            height,
            width,
            multiple: SIZE_MULTIPLE,
        });
    }
    Ok(())
}

fn expect_shape(name: &str, actual: &[usize], expected: &[usize]) -> Result<(), IntegrityError> {
    if actual != expected {
        return Err(IntegrityError::WeightShape {
            name: name.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

fn compile_stage<B: Backend>(
    spec: StageSpec,
    in_channels: usize,
    weights: &WeightSet,
    encoder_bias: EncoderBias,
    device: &B::Device,
) -> Result<CompiledStage<B>, IntegrityError> {
    let kernel_name = spec.key(Param::Kernel).to_string();
    let kernel = weights.require(&kernel_name)?;
    if kernel.rank() != 4 {
        return Err(IntegrityError::WeightRank {
            name: kernel_name,
            expected: 4,
            actual: kernel.rank(),
        });
    }

    // Checkpoint layouts: conv [kh, kw, in, out], transposed [kh, kw, out, in].
    let shape = kernel.shape();
    let (kernel_in, out_channels) = match spec.conv {
        ConvKind::Conv2d => (shape[2], shape[3]),
        ConvKind::ConvTranspose2d => (shape[3], shape[2]),
    };
    if kernel_in != in_channels {
        return Err(IntegrityError::ChannelMismatch {
            scope: spec.scope(),
            expected: kernel_in,
            actual: in_channels,
        });
    }
    // Zero-sized axes build fine but break the convolution at run time.
    if shape.contains(&0) {
        return Err(IntegrityError::WeightShape {
            name: kernel_name,
            expected: shape.iter().map(|&dim| dim.max(1)).collect(),
            actual: shape.to_vec(),
        });
    }

    let bias_name = spec.key(Param::Bias).to_string();
    let bias = weights.require(&bias_name)?;
    expect_shape(&bias_name, bias.shape(), &[out_channels])?;
    let apply_bias = spec.kind == StageKind::Decoder || encoder_bias == EncoderBias::Apply;
    let bias_tensor = if apply_bias {
        Some(bias.to_tensor1::<B>(&bias_name, device)?)
    } else {
        None
    };

    let kernel_tensor = kernel_to_engine_layout(kernel.to_tensor4::<B>(&kernel_name, device)?);
    let conv = match spec.conv {
        ConvKind::Conv2d => StageConv::Conv(SameConv2d::new(kernel_tensor, bias_tensor, STRIDE)),
        ConvKind::ConvTranspose2d => {
            StageConv::Transpose(SameConvTranspose2d::new(kernel_tensor, bias_tensor, STRIDE))
        }
    };

    let norm = if spec.batch_norm {
        let gamma_name = spec.key(Param::Gamma).to_string();
        let beta_name = spec.key(Param::Beta).to_string();
        let gamma = weights.require(&gamma_name)?;
        let beta = weights.require(&beta_name)?;
        expect_shape(&gamma_name, gamma.shape(), &[out_channels])?;
        expect_shape(&beta_name, beta.shape(), &[out_channels])?;
        Some(SpatialBatchNorm::new(
            gamma.to_tensor1::<B>(&gamma_name, device)?,
            beta.to_tensor1::<B>(&beta_name, device)?,
        ))
    } else {
        None
    };

    Ok(CompiledStage {
        spec,
        conv,
        norm,
        out_channels,
    })
}
