//! # Convolution + Batch Normalization
//!
//! The leaf building block of ScaleFormer: a bias-free convolution followed by
//! batch normalization and an optional activation.

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Gelu, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use burn_extra_ops::HardSwish;

use crate::config::Activation;

/// Activation layer resolved from an [`Activation`] at construction time.
#[derive(Module, Debug, Clone)]
pub enum ActivationLayer {
    Relu(Relu),
    Gelu(Gelu),
    HardSwish(HardSwish),
}

impl ActivationLayer {
    /// Returns `None` for [`Activation::Identity`].
    pub fn new(activation: &Activation) -> Option<Self> {
        match activation {
            Activation::Identity => None,
            Activation::Relu => Some(Self::Relu(Relu::new())),
            Activation::Gelu => Some(Self::Gelu(Gelu::new())),
            Activation::HardSwish => Some(Self::HardSwish(HardSwish::new())),
        }
    }

    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Relu(act) => act.forward(x),
            Self::Gelu(act) => act.forward(x),
            Self::HardSwish(act) => act.forward(x),
        }
    }
}

/// Configuration for the `ConvBn` module.
#[derive(Config, Debug)]
pub struct ConvBnConfig {
    /// Number of input channels.
    in_channels: usize,
    /// Number of output channels.
    out_channels: usize,
    #[config(default = "1")]
    kernel_size: usize,
    #[config(default = "1")]
    stride: usize,
    #[config(default = "0")]
    padding: usize,
    #[config(default = "1")]
    dilation: usize,
    #[config(default = "1")]
    groups: usize,
    /// Initial value of the normalization scale.
    #[config(default = "1.0")]
    bn_weight_init: f64,
    #[config(default = "Activation::Identity")]
    activation: Activation,
}

impl ConvBnConfig {
    /// Initializes a new `ConvBn` module.
    ///
    /// Convolution weights are drawn from `N(0, sqrt(2 / fan_out))` with
    /// `fan_out = k * k * out_channels`; the normalization scale starts at
    /// `bn_weight_init` and the offset at zero.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvBn<B> {
        let fan_out = self.kernel_size * self.kernel_size * self.out_channels;
        let std = (2.0 / fan_out as f64).sqrt();

        let conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
        .with_dilation([self.dilation, self.dilation])
        .with_groups(self.groups)
        .with_bias(false)
        .with_initializer(Initializer::Normal { mean: 0.0, std })
        .init(device);

        let mut bn = BatchNormConfig::new(self.out_channels).init(device);
        bn.gamma = Param::from_tensor(Tensor::full(
            [self.out_channels],
            self.bn_weight_init,
            device,
        ));

        ConvBn {
            conv,
            bn,
            act: ActivationLayer::new(&self.activation),
        }
    }
}

/// Convolution (no bias) → batch normalization → activation.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, out_channels, height', width']`
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    act: Option<ActivationLayer>,
}

impl<B: Backend> ConvBn<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        match &self.act {
            Some(act) => act.forward(x),
            None => x,
        }
    }
}

/// Configuration for the `ConvBnRelu` module.
#[derive(Config, Debug)]
pub struct ConvBnReluConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = "3")]
    kernel_size: usize,
}

impl ConvBnReluConfig {
    /// Initializes a `ConvBnRelu` module with "same" padding.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvBnRelu<B> {
        let padding = self.kernel_size / 2;
        ConvBnRelu {
            conv: Conv2dConfig::new(
                [self.in_channels, self.out_channels],
                [self.kernel_size, self.kernel_size],
            )
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .init(device),
            bn: BatchNormConfig::new(self.out_channels).init(device),
            relu: Relu::new(),
        }
    }
}

/// Convolution (with bias) → batch normalization → ReLU.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}
