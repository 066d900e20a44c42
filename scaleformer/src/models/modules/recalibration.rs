//! # Recalibration Gates
//!
//! Squeeze-and-excite style channel gate and channel-pooled spatial gate.
//! Both return the gate only; callers multiply it against the features.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d, Relu, Sigmoid,
    },
    prelude::*,
};

use crate::error::{ScaleFormerError, ScaleFormerResult};

/// Configuration for the `ChannelAttention` module.
#[derive(Config, Debug)]
pub struct ChannelAttentionConfig {
    /// Number of channels of the gated features.
    channels: usize,
    /// Bottleneck reduction of the shared MLP.
    #[config(default = "4")]
    reduction: usize,
}

impl ChannelAttentionConfig {
    /// Initializes a new `ChannelAttention` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ChannelAttention<B> {
        let hidden = (self.channels / self.reduction).max(1);
        ChannelAttention {
            fc1: Conv2dConfig::new([self.channels, hidden], [1, 1])
                .with_bias(false)
                .init(device),
            relu: Relu::new(),
            fc2: Conv2dConfig::new([hidden, self.channels], [1, 1])
                .with_bias(false)
                .init(device),
            sigmoid: Sigmoid::new(),
        }
    }
}

/// Per-channel gate from average and max pooled descriptors.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, 1, 1]`
#[derive(Module, Debug)]
pub struct ChannelAttention<B: Backend> {
    fc1: Conv2d<B>,
    relu: Relu,
    fc2: Conv2d<B>,
    sigmoid: Sigmoid,
}

impl<B: Backend> ChannelAttention<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let avg = x.clone().mean_dim(2).mean_dim(3);
        let max = x.max_dim(2).max_dim(3);
        self.sigmoid
            .forward(self.shared_mlp(avg) + self.shared_mlp(max))
    }

    fn shared_mlp(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.fc2.forward(self.relu.forward(self.fc1.forward(x)))
    }
}

/// Configuration for the `SpatialAttention` module.
#[derive(Config, Debug)]
pub struct SpatialAttentionConfig {
    /// Kernel of the pooled-map convolution, 3 or 7.
    #[config(default = "7")]
    kernel_size: usize,
}

impl SpatialAttentionConfig {
    /// Initializes a new `SpatialAttention` module.
    ///
    /// # Errors
    ///
    /// Returns `Err(ScaleFormerError::UnsupportedKernelSize)` for kernels other than 3 or 7.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ScaleFormerResult<SpatialAttention<B>> {
        if !matches!(self.kernel_size, 3 | 7) {
            return Err(ScaleFormerError::UnsupportedKernelSize {
                kernel_size: self.kernel_size,
            });
        }
        let padding = self.kernel_size / 2;

        Ok(SpatialAttention {
            conv: Conv2dConfig::new([2, 1], [self.kernel_size, self.kernel_size])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_bias(false)
                .init(device),
            sigmoid: Sigmoid::new(),
        })
    }
}

/// Per-pixel gate from channel-wise mean and max maps.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, 1, height, width]`
#[derive(Module, Debug)]
pub struct SpatialAttention<B: Backend> {
    conv: Conv2d<B>,
    sigmoid: Sigmoid,
}

impl<B: Backend> SpatialAttention<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let avg = x.clone().mean_dim(1);
        let max = x.max_dim(1);
        let pooled = Tensor::cat(vec![avg, max], 1);
        self.sigmoid.forward(self.conv.forward(pooled))
    }
}
