//! The fixed generator topology as an explicit stage table.
//!
//! Every stage of the U-Net is one [`StageSpec`] record. The generator walks
//! [`GENERATOR_STAGES`] in order; the position of a stage in the table is
//! also the index of its output in the activation list, which is what skip
//! connections refer to.

use std::fmt;

use crate::layers::Activation;
use crate::layers::Activation::{LeakyRelu, None as Linear, Tanh};
use StageInput::{NetworkInput, Previous, PreviousWithSkip};

/// Number of encoder levels (and decoder levels).
pub const DEPTH: usize = 9;

/// Stride of every convolution and transposed convolution.
pub const STRIDE: usize = 2;

/// Input height and width must be multiples of this (one halving per level).
pub const SIZE_MULTIPLE: usize = 1 << DEPTH;

/// Channels of the network input and output (RGB).
pub const IMAGE_CHANNELS: usize = 3;

/// Number of stages, encoder and decoder together.
pub const STAGE_COUNT: usize = 2 * DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Encoder,
    Decoder,
}

impl StageKind {
    fn scope_name(&self) -> &'static str {
        match self {
            StageKind::Encoder => "encoder",
            StageKind::Decoder => "decoder",
        }
    }
}

/// Where a stage takes its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    /// The preprocessed image.
    NetworkInput,
    /// The output of the stage right before.
    Previous,
    /// The previous output concatenated on the channel axis with the
    /// activation at the given layer index, in that order.
    PreviousWithSkip(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvKind {
    /// Strided convolution, halves height and width.
    Conv2d,
    /// Strided transposed convolution, doubles height and width.
    ConvTranspose2d,
}

impl ConvKind {
    fn scope_name(&self) -> &'static str {
        match self {
            ConvKind::Conv2d => "conv2d",
            ConvKind::ConvTranspose2d => "conv2d_transpose",
        }
    }
}

/// A trained variable of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Kernel,
    Bias,
    Gamma,
    Beta,
}

/// Name of one checkpoint variable, e.g. `generator/encoder_3/conv2d/kernel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeightKey {
    pub kind: StageKind,
    pub level: usize,
    pub conv: ConvKind,
    pub param: Param,
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generator/{}_{}/", self.kind.scope_name(), self.level)?;
        match self.param {
            Param::Kernel => write!(f, "{}/kernel", self.conv.scope_name()),
            Param::Bias => write!(f, "{}/bias", self.conv.scope_name()),
            Param::Gamma => f.write_str("batch_normalization/gamma"),
            Param::Beta => f.write_str("batch_normalization/beta"),
        }
    }
}

/// Configuration record for one generator stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub kind: StageKind,
    /// Level number used in the checkpoint scope (`encoder_<level>`).
    pub level: usize,
    pub input: StageInput,
    /// Applied to the stage input before the convolution.
    pub pre_activation: Activation,
    pub conv: ConvKind,
    pub batch_norm: bool,
    /// Applied to the stage output last.
    pub output_activation: Activation,
}

impl StageSpec {
    const fn encoder(level: usize, input: StageInput, pre: Activation, batch_norm: bool) -> Self {
        Self {
            kind: StageKind::Encoder,
            level,
            input,
            pre_activation: pre,
            conv: ConvKind::Conv2d,
            batch_norm,
            output_activation: Activation::None,
        }
    }

    const fn decoder(level: usize, input: StageInput, batch_norm: bool, out: Activation) -> Self {
        Self {
            kind: StageKind::Decoder,
            level,
            input,
            pre_activation: Activation::Relu,
            conv: ConvKind::ConvTranspose2d,
            batch_norm,
            output_activation: out,
        }
    }

    /// Checkpoint scope, e.g. `generator/decoder_4`.
    pub fn scope(&self) -> String {
        format!("generator/{}_{}", self.kind.scope_name(), self.level)
    }

    pub fn key(&self, param: Param) -> WeightKey {
        WeightKey {
            kind: self.kind,
            level: self.level,
            conv: self.conv,
            param,
        }
    }

    /// Every variable this stage reads.
    pub fn required_keys(&self) -> Vec<WeightKey> {
        let mut keys = vec![self.key(Param::Kernel), self.key(Param::Bias)];
        if self.batch_norm {
            keys.push(self.key(Param::Gamma));
            keys.push(self.key(Param::Beta));
        }
        keys
    }
}

/// The generator, in execution order.
///
/// Layer indices 0..=8 are encoder_1..=encoder_9, 9..=16 are decoder_9..=decoder_2,
/// 17 is decoder_1. Decoder level `i` (8..=2) concatenates encoder_i, which
/// sits at layer index `i - 1`.
pub const GENERATOR_STAGES: [StageSpec; STAGE_COUNT] = [
    StageSpec::encoder(1, NetworkInput, Linear, false),
    StageSpec::encoder(2, Previous, LeakyRelu, true),
    StageSpec::encoder(3, Previous, LeakyRelu, true),
    StageSpec::encoder(4, Previous, LeakyRelu, true),
    StageSpec::encoder(5, Previous, LeakyRelu, true),
    StageSpec::encoder(6, Previous, LeakyRelu, true),
    StageSpec::encoder(7, Previous, LeakyRelu, true),
    StageSpec::encoder(8, Previous, LeakyRelu, true),
    StageSpec::encoder(9, Previous, LeakyRelu, true),
    StageSpec::decoder(9, Previous, true, Linear),
    StageSpec::decoder(8, PreviousWithSkip(7), true, Linear),
    StageSpec::decoder(7, PreviousWithSkip(6), true, Linear),
    StageSpec::decoder(6, PreviousWithSkip(5), true, Linear),
    StageSpec::decoder(5, PreviousWithSkip(4), true, Linear),
    StageSpec::decoder(4, PreviousWithSkip(3), true, Linear),
    StageSpec::decoder(3, PreviousWithSkip(2), true, Linear),
    StageSpec::decoder(2, PreviousWithSkip(1), true, Linear),
    StageSpec::decoder(1, PreviousWithSkip(0), false, Tanh),
];

/// Every variable name the generator needs, in stage order.
pub fn required_weight_names() -> Vec<String> {
    GENERATOR_STAGES
        .iter()
        .flat_map(|stage| stage.required_keys())
        .map(|key| key.to_string())
        .collect()
}

/// Layer index holding the output of `encoder_<level>`.
pub fn encoder_layer_index(level: usize) -> usize {
    level - 1
}

/// Layer index holding the output of `decoder_<level>`.
pub fn decoder_layer_index(level: usize) -> usize {
    DEPTH + (DEPTH - level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_key_names() {
        let first = GENERATOR_STAGES[0];
        assert_eq!(
            first.key(Param::Kernel).to_string(),
            "generator/encoder_1/conv2d/kernel"
        );

        let decoder = GENERATOR_STAGES[decoder_layer_index(4)];
        assert_eq!(decoder.scope(), "generator/decoder_4");
        assert_eq!(
            decoder.key(Param::Bias).to_string(),
            "generator/decoder_4/conv2d_transpose/bias"
        );
        assert_eq!(
            decoder.key(Param::Gamma).to_string(),
            "generator/decoder_4/batch_normalization/gamma"
        );
    }

    #[test]
    fn test_required_weight_count() {
        // encoder_1 and decoder_1 have no batch norm
        let names = required_weight_names();
        assert_eq!(names.len(), 2 + 8 * 4 + 8 * 4 + 2);
        assert!(names.contains(&"generator/encoder_5/conv2d/kernel".to_string()));
        assert!(!names.contains(&"generator/encoder_1/batch_normalization/gamma".to_string()));
        assert!(!names.contains(&"generator/decoder_1/batch_normalization/beta".to_string()));
    }

    #[test]
    fn test_stage_order_and_levels() {
        for level in 1..=DEPTH {
            let encoder = GENERATOR_STAGES[encoder_layer_index(level)];
            assert_eq!(encoder.kind, StageKind::Encoder);
            assert_eq!(encoder.level, level);

            let decoder = GENERATOR_STAGES[decoder_layer_index(level)];
            assert_eq!(decoder.kind, StageKind::Decoder);
            assert_eq!(decoder.level, level);
        }
    }

    #[test]
    fn test_skip_connections_point_at_matching_encoder() {
        for level in 1..DEPTH {
            let decoder = GENERATOR_STAGES[decoder_layer_index(level)];
            assert_eq!(
                decoder.input,
                PreviousWithSkip(encoder_layer_index(level)),
                "decoder_{} must concatenate encoder_{}",
                level,
                level
            );
        }
        assert_eq!(GENERATOR_STAGES[decoder_layer_index(DEPTH)].input, Previous);
    }

    #[test]
    fn test_stage_activations() {
        assert_eq!(GENERATOR_STAGES[0].pre_activation, Activation::None);
        assert!(!GENERATOR_STAGES[0].batch_norm);
        assert!(
            GENERATOR_STAGES[1..DEPTH]
                .iter()
                .all(|s| s.pre_activation == Activation::LeakyRelu && s.batch_norm)
        );
        assert!(
            GENERATOR_STAGES[DEPTH..]
                .iter()
                .all(|s| s.pre_activation == Activation::Relu)
        );

        let last = GENERATOR_STAGES[STAGE_COUNT - 1];
        assert!(!last.batch_norm);
        assert_eq!(last.output_activation, Activation::Tanh);
        assert_eq!(SIZE_MULTIPLE, 512);
    }
}
