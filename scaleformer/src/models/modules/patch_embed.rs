//! # Patch Embedding
//!
//! Inverted-bottleneck (MBConv) embedding that opens every encoder stage.
//! When the stage downsamples, the depthwise convolution runs with stride 2 and
//! the shortcut is a 2×2 max pool (followed by a pointwise convolution when the
//! widths differ).

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig,
    },
    prelude::*,
};

use super::conv_bn::{ConvBn, ConvBnConfig};
use crate::config::Activation;

/// Expansion of the inverted bottleneck.
const EXPAND_RATIO: usize = 4;

/// Configuration for the `PatchEmbed` module.
#[derive(Config, Debug)]
pub struct PatchEmbedConfig {
    in_channels: usize,
    out_channels: usize,
    /// Halve the resolution.
    #[config(default = "false")]
    downsample: bool,
}

impl PatchEmbedConfig {
    /// Initializes a new `PatchEmbed` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> PatchEmbed<B> {
        let hidden = self.in_channels * EXPAND_RATIO;
        let stride = if self.downsample { 2 } else { 1 };

        let pool = self
            .downsample
            .then(|| MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init());
        let proj = (self.in_channels != self.out_channels).then(|| {
            Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1]).init(device)
        });

        PatchEmbed {
            norm: BatchNormConfig::new(self.in_channels).init(device),
            expand: ConvBnConfig::new(self.in_channels, hidden)
                .with_activation(Activation::HardSwish)
                .init(device),
            depthwise: ConvBnConfig::new(hidden, hidden)
                .with_kernel_size(3)
                .with_stride(stride)
                .with_padding(1)
                .with_groups(hidden)
                .with_activation(Activation::HardSwish)
                .init(device),
            project: ConvBnConfig::new(hidden, self.out_channels)
                .with_bn_weight_init(0.0)
                .init(device),
            shortcut: Shortcut { pool, proj },
        }
    }
}

#[derive(Module, Debug)]
struct Shortcut<B: Backend> {
    pool: Option<MaxPool2d>,
    proj: Option<Conv2d<B>>,
}

impl<B: Backend> Shortcut<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        };
        match &self.proj {
            Some(proj) => proj.forward(x),
            None => x,
        }
    }
}

/// Pre-normalized MBConv with a pooled shortcut.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, out_channels, height / s, width / s]`, `s = 2` when downsampling
#[derive(Module, Debug)]
pub struct PatchEmbed<B: Backend> {
    norm: BatchNorm<B, 2>,
    expand: ConvBn<B>,
    depthwise: ConvBn<B>,
    project: ConvBn<B>,
    shortcut: Shortcut<B>,
}

impl<B: Backend> PatchEmbed<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = self.shortcut.forward(x.clone());

        let x = self.norm.forward(x);
        let x = self.expand.forward(x);
        let x = self.depthwise.forward(x);
        let x = self.project.forward(x);
        x + shortcut
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;
    use rstest::rstest;

    use super::*;
    use crate::tests::TestBackend;

    #[rstest]
    #[case(16, 16, false, [2, 16, 8, 8])]
    #[case(16, 32, true, [2, 32, 4, 4])]
    #[case(16, 16, true, [2, 16, 4, 4])]
    #[case(16, 24, false, [2, 24, 8, 8])]
    fn patch_embed_output_shape(
        #[case] in_channels: usize,
        #[case] out_channels: usize,
        #[case] downsample: bool,
        #[case] expected: [usize; 4],
    ) {
        let device = Default::default();
        let embed = PatchEmbedConfig::new(in_channels, out_channels)
            .with_downsample(downsample)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random(
            [2, in_channels, 8, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        assert_eq!(embed.forward(x).dims(), expected);
    }

    #[test]
    fn fresh_embedding_reduces_to_its_shortcut() {
        // The projection starts with a zero normalization scale
        let device = Default::default();
        let embed = PatchEmbedConfig::new(8, 8)
            .with_downsample(true)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random(
            [1, 8, 8, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let pooled = MaxPool2dConfig::new([2, 2])
            .with_strides([2, 2])
            .init()
            .forward(x.clone());
        let diff = (embed.forward(x) - pooled).abs().max().into_scalar();
        assert!(diff < 1e-6, "unexpected main-branch contribution: {diff}");
    }
}
