//! # Hierarchical Multi-Path Encoder
//!
//! The encoder turns an image into four feature maps at 1/4, 1/8, 1/16 and
//! 1/32 of the input resolution:
//!
//! - `Stem`: two stride-2 `ConvBn` layers with hard-swish.
//! - `EncoderStage`: patch embedding, a stack of `MultiPathEncoder` layers and a
//!   pointwise projection to the next stage's width.
//! - `MultiPathEncoder`: splits channels into paths, runs a windowed attention
//!   block per path, concatenates them in order and mixes the paths with a
//!   global grid attention block.

use burn::prelude::*;

use super::modules::{
    AttentionBlock, AttentionBlockConfig, ConvBn, ConvBnConfig, PatchEmbed, PatchEmbedConfig,
};
use crate::config::{mlp_hidden, Activation, ModelConfig, NUM_STAGES};

/// Configuration for the `Stem` module.
#[derive(Config, Debug)]
pub struct StemConfig {
    in_channels: usize,
    out_channels: usize,
}

impl StemConfig {
    /// Initializes a new `Stem` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Stem<B> {
        let mid = self.out_channels / 2;
        let layer = |in_channels, out_channels| {
            ConvBnConfig::new(in_channels, out_channels)
                .with_kernel_size(3)
                .with_stride(2)
                .with_padding(1)
                .with_activation(Activation::HardSwish)
                .init(device)
        };

        Stem {
            conv1: layer(self.in_channels, mid),
            conv2: layer(mid, self.out_channels),
        }
    }
}

/// Two stride-2 convolutions: `[B, C, H, W]` → `[B, E0, H/4, W/4]`.
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    conv1: ConvBn<B>,
    conv2: ConvBn<B>,
}

impl<B: Backend> Stem<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv2.forward(self.conv1.forward(x))
    }
}

/// Configuration for the `MultiPathEncoder` module.
#[derive(Config, Debug)]
pub struct MultiPathEncoderConfig {
    /// Channel width of the stage.
    channels: usize,
    /// Attention heads of each per-path block.
    num_heads: usize,
    /// MLP expansion ratio.
    mlp_ratio: f64,
    /// Window size of each path; its length is the number of paths.
    window_sizes: Vec<usize>,
    #[config(default = "0.0")]
    drop_path: f64,
}

impl MultiPathEncoderConfig {
    /// Initializes a new `MultiPathEncoder` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MultiPathEncoder<B> {
        let num_path = self.window_sizes.len();
        let path_channels = self.channels / num_path;

        let paths = self
            .window_sizes
            .iter()
            .map(|&window_size| {
                AttentionBlockConfig::new(
                    path_channels,
                    self.num_heads,
                    mlp_hidden(path_channels, self.mlp_ratio),
                )
                .with_window_size(Some(window_size))
                .with_drop_path(self.drop_path)
                .init(device)
            })
            .collect();

        MultiPathEncoder {
            paths,
            grid: AttentionBlockConfig::new(
                self.channels,
                num_path,
                mlp_hidden(self.channels, self.mlp_ratio),
            )
            .with_drop_path(self.drop_path)
            .init(device),
        }
    }
}

/// Per-path windowed attention followed by cross-path grid attention.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct MultiPathEncoder<B: Backend> {
    paths: Vec<AttentionBlock<B>>,
    grid: AttentionBlock<B>,
}

impl<B: Backend> MultiPathEncoder<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.grid.forward(self.forward_paths(x))
    }

    /// Runs every path on its own contiguous channel slice and concatenates the
    /// results in split order.
    pub fn forward_paths(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let chunks = x.chunk(self.paths.len(), 1);
        let outputs = chunks
            .into_iter()
            .zip(&self.paths)
            .map(|(chunk, path)| path.forward(chunk))
            .collect();
        Tensor::cat(outputs, 1)
    }

}

/// Configuration for the `EncoderStage` module.
#[derive(Config, Debug)]
pub struct EncoderStageConfig {
    /// Width of the stage input and of its attention layers.
    channels: usize,
    /// Width after the final projection.
    out_channels: usize,
    /// Halve the resolution in the patch embedding.
    downsample: bool,
    num_heads: usize,
    mlp_ratio: f64,
    window_sizes: Vec<usize>,
    /// Stochastic depth rate of each layer; its length is the layer count.
    drop_path: Vec<f64>,
}

impl EncoderStageConfig {
    /// Initializes a new `EncoderStage` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> EncoderStage<B> {
        let layers = self
            .drop_path
            .iter()
            .map(|&rate| {
                MultiPathEncoderConfig::new(
                    self.channels,
                    self.num_heads,
                    self.mlp_ratio,
                    self.window_sizes.clone(),
                )
                .with_drop_path(rate)
                .init(device)
            })
            .collect();

        EncoderStage {
            patch_embed: PatchEmbedConfig::new(self.channels, self.channels)
                .with_downsample(self.downsample)
                .init(device),
            layers,
            projection: ConvBnConfig::new(self.channels, self.out_channels)
                .with_activation(Activation::Gelu)
                .init(device),
        }
    }
}

/// Patch embedding → multi-path layers → projection.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, out_channels, height / s, width / s]`, `s = 2` when downsampling
#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    patch_embed: PatchEmbed<B>,
    layers: Vec<MultiPathEncoder<B>>,
    projection: ConvBn<B>,
}

impl<B: Backend> EncoderStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.patch_embed.forward(x);
        let x = self
            .layers
            .iter()
            .fold(x, |x, layer| layer.forward(x));
        self.projection.forward(x)
    }
}

/// Configuration for the `HierarchicalEncoder` module.
#[derive(Config, Debug)]
pub struct HierarchicalEncoderConfig {
    /// The main model configuration.
    config: ModelConfig,
}

impl HierarchicalEncoderConfig {
    /// Initializes a new `HierarchicalEncoder` module.
    ///
    /// The configuration is expected to be validated.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> HierarchicalEncoder<B> {
        let encoder = &self.config.encoder;
        let out_channels = encoder.stage_out_channels();
        let schedule = encoder.drop_path_schedule();

        let stages = (0..NUM_STAGES)
            .zip(schedule)
            .map(|(idx, drop_path)| {
                EncoderStageConfig::new(
                    encoder.embed_dims[idx],
                    out_channels[idx],
                    idx > 0,
                    encoder.num_heads[idx],
                    encoder.mlp_ratios[idx],
                    encoder.window_sizes[idx].clone(),
                    drop_path,
                )
                .init(device)
            })
            .collect();

        HierarchicalEncoder {
            stem: StemConfig::new(self.config.in_chans, encoder.embed_dims[0]).init(device),
            stages,
        }
    }
}

/// Stem followed by the four encoder stages.
#[derive(Module, Debug)]
pub struct HierarchicalEncoder<B: Backend> {
    stem: Stem<B>,
    stages: Vec<EncoderStage<B>>,
}

impl<B: Backend> HierarchicalEncoder<B> {
    /// Returns one feature map per stage, from the finest to the coarsest.
    pub fn forward(&self, x: Tensor<B, 4>) -> [Tensor<B, 4>; NUM_STAGES] {
        let mut x = self.stem.forward(x);

        core::array::from_fn(|idx| {
            let feature = self.stages[idx].forward(x.clone());
            tracing::trace!("encoder stage {idx}: {:?}", feature.dims());
            x = feature.clone();
            feature
        })
    }
}
