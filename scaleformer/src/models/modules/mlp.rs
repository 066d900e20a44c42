//! # Channel-Mixing MLP
//!
//! Two pointwise convolution + normalization stages with a nonlinearity and dropout
//! between them. Operates independently at every spatial position.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig,
    },
    prelude::*,
};

use super::conv_bn::ActivationLayer;
use crate::config::Activation;

/// Configuration for the `Mlp` module.
#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Number of input channels.
    in_channels: usize,
    /// Hidden width. Defaults to `in_channels`.
    #[config(default = "None")]
    hidden_channels: Option<usize>,
    /// Output width. Defaults to `in_channels`.
    #[config(default = "None")]
    out_channels: Option<usize>,
    #[config(default = "Activation::Gelu")]
    activation: Activation,
    #[config(default = "0.0")]
    drop: f64,
}

impl MlpConfig {
    /// Initializes a new `Mlp` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Mlp<B> {
        let hidden = self.hidden_channels.unwrap_or(self.in_channels);
        let out = self.out_channels.unwrap_or(self.in_channels);

        Mlp {
            fc1: Conv2dConfig::new([self.in_channels, hidden], [1, 1]).init(device),
            bn1: BatchNormConfig::new(hidden).init(device),
            act: ActivationLayer::new(&self.activation),
            fc2: Conv2dConfig::new([hidden, out], [1, 1]).init(device),
            bn2: BatchNormConfig::new(out).init(device),
            drop: DropoutConfig::new(self.drop).init(),
        }
    }
}

/// Pointwise channel mixer: `C → H → O`.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, out_channels, height, width]`
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    fc1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    act: Option<ActivationLayer>,
    fc2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    drop: Dropout,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.bn1.forward(self.fc1.forward(x));
        let x = match &self.act {
            Some(act) => act.forward(x),
            None => x,
        };
        let x = self.drop.forward(x);
        let x = self.bn2.forward(self.fc2.forward(x));
        self.drop.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;
    use rstest::rstest;

    use super::*;
    use crate::tests::TestBackend;

    #[rstest]
    #[case(32, None, None, 32)]
    #[case(32, Some(128), None, 32)]
    #[case(48, Some(192), Some(24), 24)]
    fn mlp_maps_channels_and_keeps_resolution(
        #[case] in_channels: usize,
        #[case] hidden: Option<usize>,
        #[case] out: Option<usize>,
        #[case] expected_out: usize,
    ) {
        let device = Default::default();
        let mlp = MlpConfig::new(in_channels)
            .with_hidden_channels(hidden)
            .with_out_channels(out)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::random(
            [2, in_channels, 7, 5],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert_eq!(mlp.forward(input).dims(), [2, expected_out, 7, 5]);
    }

    #[test]
    fn mlp_does_not_mix_spatial_positions() {
        let device = Default::default();
        let mlp = MlpConfig::new(8)
            .with_hidden_channels(Some(16))
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 8, 4, 4],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let full = mlp.forward(input.clone());

        // A single pixel processed alone gives the same result as inside the map
        let pixel = input.slice([0..1, 0..8, 2..3, 1..2]);
        let alone = mlp.forward(pixel);
        let inside = full.slice([0..1, 0..8, 2..3, 1..2]);

        let diff = (alone - inside).abs().max().into_scalar();
        assert!(diff < 1e-5, "spatial mixing detected: {diff}");
    }
}
