//! Core configuration structures for ScaleFormer.
//!
//! This module contains the configuration structures that fix the channel-width
//! schedule, the multi-path layout of every encoder stage and the decoder options.
//! Every structural contract between blocks is checked by [`ModelConfig::validate`]
//! before any weight is allocated.

use burn::prelude::*;

use super::enums::UpsampleMode;
use crate::error::{ScaleFormerError, ScaleFormerResult};

/// Number of encoder stages the decoder wiring is built for.
pub const NUM_STAGES: usize = 4;

/// Total downsampling of the stem (two stride-2 convolutions).
pub const STEM_STRIDE: usize = 4;

/// Main configuration for the ScaleFormer model.
///
/// The defaults reproduce the reference ScaleFormer setup: a single-channel
/// 224×224 input, widths `[128, 288, 384, 480]`, paths `[4, 4, 2, 2]`.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Nominal input resolution. Informational; the forward pass validates the
    /// actual input instead.
    #[config(default = "224")]
    pub img_size: usize,
    /// Number of input image channels.
    #[config(default = "1")]
    pub in_chans: usize,
    /// Number of segmentation classes.
    #[config(default = "4")]
    pub num_classes: usize,
    /// Encoder configuration.
    #[config(default = "EncoderConfig::new()")]
    pub encoder: EncoderConfig,
    /// Decoder configuration.
    #[config(default = "DecoderConfig::new()")]
    pub decoder: DecoderConfig,
}

/// Encoder configuration: the stage channel schedule and the multi-path layout.
///
/// All per-stage lists must have exactly `num_stages` entries.
#[derive(Config, Debug)]
pub struct EncoderConfig {
    /// Number of encoder stages.
    #[config(default = "4")]
    pub num_stages: usize,
    /// Parallel attention paths per stage.
    #[config(default = "vec![4, 4, 2, 2]")]
    pub num_path: Vec<usize>,
    /// Multi-path encoder layers per stage.
    #[config(default = "vec![1, 2, 4, 2]")]
    pub num_layers: Vec<usize>,
    /// Channel width of each stage.
    #[config(default = "vec![128, 288, 384, 480]")]
    pub embed_dims: Vec<usize>,
    /// MLP expansion ratio per stage.
    #[config(default = "vec![4.0, 4.0, 4.0, 4.0]")]
    pub mlp_ratios: Vec<f64>,
    /// Attention heads of the per-path blocks of each stage.
    #[config(default = "vec![4, 4, 2, 2]")]
    pub num_heads: Vec<usize>,
    /// Attention window size of every path of every stage.
    #[config(default = "vec![vec![1, 2, 4, 7], vec![1, 2, 4, 7], vec![1, 7], vec![1, 7]]")]
    pub window_sizes: Vec<Vec<usize>>,
    /// Stochastic depth rate, scheduled linearly over all layers.
    #[config(default = "0.0")]
    pub drop_path_rate: f64,
}

/// Decoder configuration.
#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// MLP expansion ratio inside the bottleneck and decoder blocks.
    #[config(default = "4")]
    pub mlp_ratio: usize,
    /// Kernel size of the spatial attention gate (3 or 7).
    #[config(default = "7")]
    pub spatial_kernel_size: usize,
    /// Reuse one spatial attention gate at every recalibration point.
    #[config(default = "true")]
    pub share_spatial_attention: bool,
    /// Channel reduction ratio of the channel attention gate.
    #[config(default = "4")]
    pub channel_reduction: usize,
    /// Upsampling of the attention-gated decoder blocks.
    #[config(default = "UpsampleMode::Nearest")]
    pub block_upsample: UpsampleMode,
    /// Upsampling of the two plain decoder stages fused with stem features.
    #[config(default = "UpsampleMode::Bilinear")]
    pub plain_upsample: UpsampleMode,
}

impl ModelConfig {
    /// Validate the configuration and return appropriate errors for invalid settings.
    ///
    /// # Errors
    ///
    /// Returns `Err(ScaleFormerError::InvalidConfiguration)` if any structural contract
    /// between blocks is violated.
    /// Returns `Err(ScaleFormerError::UnsupportedKernelSize)` if the spatial attention
    /// kernel is not 3 or 7.
    pub fn validate(&self) -> ScaleFormerResult<()> {
        if self.in_chans == 0 || self.num_classes == 0 {
            return Err(invalid(format!(
                "in_chans and num_classes must be positive, got {} and {}",
                self.in_chans, self.num_classes
            )));
        }
        self.encoder.validate(self.decoder.channel_reduction)?;
        self.decoder.validate()
    }

    /// Output width of each encoder stage.
    ///
    /// Stage `i` projects to the width of stage `i + 1`; the last stage keeps its own.
    #[must_use]
    pub fn stage_out_channels(&self) -> [usize; NUM_STAGES] {
        self.encoder.stage_out_channels()
    }

    /// Width of the two shallow stem-derived feature maps `[full, half]` resolution.
    #[must_use]
    pub fn shallow_channels(&self) -> [usize; 2] {
        let e0 = self.encoder.embed_dims[0];
        [e0 / 2, e0]
    }

    /// Spatial divisor the input height and width must satisfy.
    #[must_use]
    pub fn input_divisor(&self) -> usize {
        STEM_STRIDE << (self.encoder.num_stages - 1)
    }
}

impl EncoderConfig {
    fn validate(&self, channel_reduction: usize) -> ScaleFormerResult<()> {
        if self.num_stages != NUM_STAGES {
            return Err(invalid(format!(
                "num_stages must be {NUM_STAGES}, got {}",
                self.num_stages
            )));
        }

        let lengths = [
            ("num_path", self.num_path.len()),
            ("num_layers", self.num_layers.len()),
            ("embed_dims", self.embed_dims.len()),
            ("mlp_ratios", self.mlp_ratios.len()),
            ("num_heads", self.num_heads.len()),
            ("window_sizes", self.window_sizes.len()),
        ];
        for (name, len) in lengths {
            if len != self.num_stages {
                return Err(invalid(format!(
                    "{name} must have {} entries, got {len}",
                    self.num_stages
                )));
            }
        }

        if !(0.0..1.0).contains(&self.drop_path_rate) {
            return Err(invalid(format!(
                "drop_path_rate must be in [0, 1), got {}",
                self.drop_path_rate
            )));
        }

        let e0 = self.embed_dims[0];
        if e0 % 2 != 0 {
            return Err(invalid(format!(
                "embed_dims[0] must be even for the stem, got {e0}"
            )));
        }

        for idx in 0..self.num_stages {
            let dim = self.embed_dims[idx];
            let paths = self.num_path[idx];
            let heads = self.num_heads[idx];

            if dim < channel_reduction {
                return Err(invalid(format!(
                    "embed_dims[{idx}] = {dim} is smaller than the channel attention reduction {channel_reduction}"
                )));
            }
            if paths == 0 || dim % paths != 0 {
                return Err(invalid(format!(
                    "embed_dims[{idx}] = {dim} is not divisible by num_path[{idx}] = {paths}"
                )));
            }
            let path_dim = dim / paths;
            if heads == 0 || path_dim % heads != 0 {
                return Err(invalid(format!(
                    "path width {path_dim} of stage {idx} is not divisible by num_heads[{idx}] = {heads}"
                )));
            }
            if self.num_layers[idx] == 0 {
                return Err(invalid(format!("num_layers[{idx}] must be positive")));
            }
            let ratio = self.mlp_ratios[idx];
            // per-path blocks are the narrowest MLP of the stage
            if ratio <= 0.0 || mlp_hidden(path_dim, ratio) == 0 {
                return Err(invalid(format!(
                    "mlp_ratios[{idx}] = {ratio} gives an empty hidden layer for path width {path_dim}"
                )));
            }

            let windows = &self.window_sizes[idx];
            if windows.len() != paths {
                return Err(invalid(format!(
                    "window_sizes[{idx}] must have one entry per path ({paths}), got {}",
                    windows.len()
                )));
            }
            if windows.contains(&0) {
                return Err(invalid(format!(
                    "window_sizes[{idx}] contains a zero window"
                )));
            }
        }

        Ok(())
    }

    /// Output width of each encoder stage.
    #[must_use]
    pub fn stage_out_channels(&self) -> [usize; NUM_STAGES] {
        core::array::from_fn(|idx| {
            let next = (idx + 1).min(self.num_stages - 1);
            self.embed_dims[next]
        })
    }

    /// Stochastic depth rate of every layer, grouped per stage.
    ///
    /// Rates rise linearly from 0 to `drop_path_rate` over all layers of all stages.
    #[must_use]
    pub fn drop_path_schedule(&self) -> Vec<Vec<f64>> {
        let total: usize = self.num_layers.iter().sum();
        let step = if total > 1 {
            self.drop_path_rate / (total - 1) as f64
        } else {
            0.0
        };

        let mut cur = 0;
        self.num_layers
            .iter()
            .map(|&layers| {
                let rates = (cur..cur + layers).map(|i| i as f64 * step).collect();
                cur += layers;
                rates
            })
            .collect()
    }
}

impl DecoderConfig {
    fn validate(&self) -> ScaleFormerResult<()> {
        if !matches!(self.spatial_kernel_size, 3 | 7) {
            return Err(ScaleFormerError::UnsupportedKernelSize {
                kernel_size: self.spatial_kernel_size,
            });
        }
        if self.mlp_ratio == 0 || self.channel_reduction == 0 {
            return Err(invalid(
                "decoder mlp_ratio and channel_reduction must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hidden width of an MLP with expansion `ratio` on a `dim`-wide input.
pub(crate) fn mlp_hidden(dim: usize, ratio: f64) -> usize {
    (dim as f64 * ratio) as usize
}

fn invalid(reason: String) -> ScaleFormerError {
    ScaleFormerError::InvalidConfiguration { reason }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        let config = ModelConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.stage_out_channels(), [288, 384, 480, 480]);
        assert_eq!(config.shallow_channels(), [64, 128]);
        assert_eq!(config.input_divisor(), 32);
    }

    #[test]
    fn test_stage_count_must_be_four() {
        let config = ModelConfig::new().with_encoder(EncoderConfig::new().with_num_stages(3));

        match config.validate() {
            Err(ScaleFormerError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("num_stages must be 4"));
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[rstest]
    #[case(EncoderConfig::new().with_num_path(vec![4, 4, 2]), "num_path must have 4 entries")]
    #[case(EncoderConfig::new().with_embed_dims(vec![128, 288, 384, 481]), "not divisible by num_path[3]")]
    #[case(EncoderConfig::new().with_num_heads(vec![4, 4, 2, 7]), "not divisible by num_heads[3]")]
    #[case(EncoderConfig::new().with_embed_dims(vec![130, 288, 384, 480]), "not divisible by num_path[0]")]
    #[case(EncoderConfig::new().with_window_sizes(vec![vec![1, 2, 4, 7], vec![1, 2, 4, 7], vec![1, 7], vec![7]]), "one entry per path")]
    #[case(EncoderConfig::new().with_window_sizes(vec![vec![1, 2, 4, 0], vec![1, 2, 4, 7], vec![1, 7], vec![1, 7]]), "zero window")]
    #[case(EncoderConfig::new().with_drop_path_rate(1.0), "drop_path_rate")]
    #[case(EncoderConfig::new().with_num_layers(vec![1, 0, 4, 2]), "num_layers[1]")]
    #[case(EncoderConfig::new().with_mlp_ratios(vec![4.0, 4.0, 0.0, 4.0]), "mlp_ratios[2]")]
    #[case(EncoderConfig::new().with_mlp_ratios(vec![0.01, 4.0, 4.0, 4.0]), "path width 32")]
    fn invalid_encoder_configurations_are_rejected(
        #[case] encoder: EncoderConfig,
        #[case] expected: &str,
    ) {
        let config = ModelConfig::new().with_encoder(encoder);

        match config.validate() {
            Err(ScaleFormerError::InvalidConfiguration { reason }) => {
                assert!(
                    reason.contains(expected),
                    "reason `{reason}` does not mention `{expected}`"
                );
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn odd_stem_width_is_rejected() {
        let config = ModelConfig::new().with_encoder(
            EncoderConfig::new()
                .with_num_path(vec![1, 4, 2, 2])
                .with_num_heads(vec![1, 4, 2, 2])
                .with_window_sizes(vec![vec![1], vec![1, 2, 4, 7], vec![1, 7], vec![1, 7]])
                .with_embed_dims(vec![127, 288, 384, 480]),
        );

        match config.validate() {
            Err(ScaleFormerError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("must be even"));
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_spatial_kernel_is_rejected() {
        let config =
            ModelConfig::new().with_decoder(DecoderConfig::new().with_spatial_kernel_size(5));

        match config.validate() {
            Err(ScaleFormerError::UnsupportedKernelSize { kernel_size }) => {
                assert_eq!(kernel_size, 5);
            }
            other => panic!("Expected UnsupportedKernelSize error, got {other:?}"),
        }
    }

    #[test]
    fn zero_classes_are_rejected() {
        let config = ModelConfig::new().with_num_classes(0);
        assert!(matches!(
            config.validate(),
            Err(ScaleFormerError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn drop_path_schedule_is_linear_across_stages() {
        let encoder = EncoderConfig::new()
            .with_num_layers(vec![1, 2, 4, 2])
            .with_drop_path_rate(0.8);

        let schedule = encoder.drop_path_schedule();
        let lengths: Vec<usize> = schedule.iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![1, 2, 4, 2]);

        let flat: Vec<f64> = schedule.into_iter().flatten().collect();
        assert_eq!(flat.len(), 9);
        assert!(flat[0].abs() < 1e-12);
        assert!((flat[8] - 0.8).abs() < 1e-12);
        for pair in flat.windows(2) {
            assert!((pair[1] - pair[0] - 0.1).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_drop_path_rate_gives_all_zero_schedule() {
        let schedule = EncoderConfig::new().drop_path_schedule();
        assert!(schedule.iter().flatten().all(|rate| *rate == 0.0));
    }

    #[test]
    fn stage_out_channels_shift_to_next_width() {
        let encoder = EncoderConfig::new().with_embed_dims(vec![16, 32, 48, 64]);
        assert_eq!(encoder.stage_out_channels(), [32, 48, 64, 64]);
        assert_eq!(mlp_hidden(16, encoder.mlp_ratios[0]), 64);
    }
}
