//! # ScaleFormer Model Implementation
//!
//! This module defines the top-level `ScaleFormer` segmentation model, which
//! combines the hierarchical multi-path encoder, the shallow image branch and the
//! attention-gated decoder.
//!
//! ## Core Components
//!
//! - `ScaleFormerConfig`: validated, optionally seeded construction of the model.
//! - `ScaleFormer`: the model; `forward` returns the primary logits and three
//!   deep-supervision maps, all at input resolution.
//!
//! Parameters are persisted with Burn's named MessagePack recorder.

use std::path::PathBuf;

use burn::{
    module::Ignored,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use super::{
    decoder::{
        SegmentationDecoder, SegmentationDecoderConfig, SegmentationOutput, ShallowBranch,
        ShallowBranchConfig,
    },
    encoder::{HierarchicalEncoder, HierarchicalEncoderConfig},
};
use crate::{
    config::{ModelConfig, NUM_STAGES, STEM_STRIDE},
    error::{ScaleFormerError, ScaleFormerResult},
};

/// Configuration for the `ScaleFormer` model.
#[derive(Config, Debug)]
pub struct ScaleFormerConfig {
    /// The detailed model configuration.
    pub config: ModelConfig,
    /// Seed for the backend RNG, applied once before any weight is drawn.
    #[config(default = "None")]
    pub seed: Option<u64>,
}

impl ScaleFormerConfig {
    /// Initializes a `ScaleFormer` model with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to create the model on.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration violates any structural contract.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ScaleFormerResult<ScaleFormer<B>> {
        self.config.validate()?;

        if let Some(seed) = self.seed {
            B::seed(seed);
        }

        let encoder = &self.config.encoder;
        tracing::debug!(
            embed_dims = ?encoder.embed_dims,
            stage_out_channels = ?self.config.stage_out_channels(),
            num_path = ?encoder.num_path,
            num_layers = ?encoder.num_layers,
            "building ScaleFormer encoder"
        );
        tracing::debug!(schedule = ?encoder.drop_path_schedule(), "drop path schedule");

        let model = ScaleFormer {
            shallow: ShallowBranchConfig::new(
                self.config.in_chans,
                self.config.shallow_channels(),
            )
            .init(device),
            encoder: HierarchicalEncoderConfig::new(self.config.clone()).init(device),
            decoder: SegmentationDecoderConfig::new(self.config.clone()).init(device)?,
            in_chans: self.config.in_chans,
            input_divisor: self.config.input_divisor(),
            window_sizes: Ignored(encoder.window_sizes.clone()),
        };

        tracing::debug!(num_params = model.num_params(), "ScaleFormer initialized");
        Ok(model)
    }

    /// Initializes the model and loads its parameters from a record file.
    ///
    /// # Errors
    ///
    /// Returns `Err(ScaleFormerError::WeightLoadingFailed)` if the record cannot be
    /// read, in addition to the errors of [`ScaleFormerConfig::init`].
    pub fn init_from_record<B: Backend>(
        &self,
        path: impl Into<PathBuf>,
        device: &Device<B>,
    ) -> ScaleFormerResult<ScaleFormer<B>> {
        let path = path.into();
        let model = self.init(device)?;

        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.clone(), device)
            .map_err(|err| ScaleFormerError::WeightLoadingFailed {
                reason: format!("{}: {err}", path.display()),
            })?;

        tracing::info!(path = %path.display(), "loaded ScaleFormer weights");
        Ok(model.load_record(record))
    }
}

/// The ScaleFormer segmentation model.
#[derive(Module, Debug)]
pub struct ScaleFormer<B: Backend> {
    /// Full and half resolution maps computed from the raw image.
    shallow: ShallowBranch<B>,
    /// Stem and the four multi-path stages.
    encoder: HierarchicalEncoder<B>,
    /// Bottleneck, gated decoder blocks, plain decoders and heads.
    decoder: SegmentationDecoder<B>,
    in_chans: usize,
    /// Multiple that input height and width must be.
    input_divisor: usize,
    window_sizes: Ignored<Vec<Vec<usize>>>,
}

impl<B: Backend> ScaleFormer<B> {
    /// Runs the encoder only.
    ///
    /// # Returns
    ///
    /// Four feature maps at 1/4, 1/8, 1/16 and 1/32 of the input resolution.
    ///
    /// # Errors
    ///
    /// Returns `Err(ScaleFormerError::InvalidTensorShape)` if the input does not
    /// satisfy [`ScaleFormer::check_input`].
    pub fn forward_features(
        &self,
        x: Tensor<B, 4>,
    ) -> ScaleFormerResult<[Tensor<B, 4>; NUM_STAGES]> {
        self.check_input(&x.dims())?;
        Ok(self.encoder.forward(x))
    }

    /// Performs the full forward pass.
    ///
    /// # Shapes
    ///   - input: `[batch_size, in_chans, height, width]`
    ///   - output: four maps of `[batch_size, num_classes, height, width]`
    ///
    /// # Errors
    ///
    /// Returns `Err(ScaleFormerError::InvalidTensorShape)` if the input does not
    /// satisfy [`ScaleFormer::check_input`].
    pub fn forward(&self, x: Tensor<B, 4>) -> ScaleFormerResult<SegmentationOutput<B>> {
        let features = self.forward_features(x.clone())?;
        let shallow = self.shallow.forward(x);
        Ok(self.decoder.forward(features, shallow))
    }

    /// Checks an input shape against the model.
    ///
    /// The channel count must equal `in_chans`, height and width must be positive
    /// multiples of the total encoder stride (32), and every stage resolution must be divisible by each of
    /// that stage's window sizes.
    ///
    /// # Errors
    ///
    /// Returns `Err(ScaleFormerError::InvalidTensorShape)` describing the first
    /// violated condition.
    pub fn check_input(&self, dims: &[usize; 4]) -> ScaleFormerResult<()> {
        let [_, channels, h, w] = *dims;
        let divisor = self.input_divisor;

        let shape_error = |expected: String| ScaleFormerError::InvalidTensorShape {
            expected,
            actual: format!("{dims:?}"),
        };

        if channels != self.in_chans {
            return Err(shape_error(format!(
                "[batch, {}, height, width]",
                self.in_chans
            )));
        }
        if h == 0 || w == 0 || h % divisor != 0 || w % divisor != 0 {
            return Err(shape_error(format!(
                "height and width as positive multiples of {divisor}"
            )));
        }

        for (idx, windows) in self.window_sizes.0.iter().enumerate() {
            let scale = STEM_STRIDE << idx;
            let (sh, sw) = (h / scale, w / scale);
            if let Some(window) = windows.iter().find(|&&p| sh % p != 0 || sw % p != 0) {
                return Err(shape_error(format!(
                    "stage {idx} resolution {sh}x{sw} divisible by window size {window}"
                )));
            }
        }

        Ok(())
    }

    /// Saves the parameters to a record file.
    ///
    /// # Errors
    ///
    /// Returns `Err(ScaleFormerError::WeightSavingFailed)` if writing fails.
    pub fn save(&self, path: impl Into<PathBuf>) -> ScaleFormerResult<()> {
        let path = path.into();
        self.clone()
            .save_file(path.clone(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
            .map_err(|err| ScaleFormerError::WeightSavingFailed {
                reason: format!("{}: {err}", path.display()),
            })?;

        tracing::info!(path = %path.display(), "saved ScaleFormer weights");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;
    use rstest::rstest;

    use super::*;
    use crate::{
        config::{DecoderConfig, EncoderConfig},
        tests::TestBackend,
    };

    fn small_config() -> ModelConfig {
        ModelConfig::new()
            .with_img_size(64)
            .with_encoder(
                EncoderConfig::new()
                    .with_num_path(vec![2, 2, 2, 2])
                    .with_num_layers(vec![1, 1, 2, 1])
                    .with_embed_dims(vec![16, 32, 32, 48])
                    .with_num_heads(vec![2, 2, 2, 2])
                    .with_window_sizes(vec![vec![1, 2]; 4]),
            )
    }

    fn small_model(seed: u64) -> ScaleFormer<TestBackend> {
        ScaleFormerConfig::new(small_config())
            .with_seed(Some(seed))
            .init::<TestBackend>(&Default::default())
            .expect("small configuration is valid")
    }

    #[test]
    fn forward_returns_four_maps_at_input_resolution() {
        let model = small_model(42);
        let x = Tensor::<TestBackend, 4>::random(
            [2, 1, 64, 64],
            Distribution::Normal(0.0, 1.0),
            &Default::default(),
        );

        let output = model.forward(x).expect("valid input");
        for map in output.into_array() {
            assert_eq!(map.dims(), [2, 4, 64, 64]);
        }
    }

    #[test]
    fn forward_features_follow_the_stage_schedule() {
        let model = small_model(7);
        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 64, 128], &Default::default());

        let dims = model
            .forward_features(x)
            .expect("valid input")
            .map(|feature| feature.dims());
        assert_eq!(
            dims,
            [[1, 32, 16, 32], [1, 32, 8, 16], [1, 48, 4, 8], [1, 48, 2, 4]]
        );
    }

    #[test]
    fn forward_is_deterministic_on_inference_backend() {
        let model = small_model(3);
        let x = Tensor::<TestBackend, 4>::random(
            [1, 1, 64, 64],
            Distribution::Normal(0.0, 1.0),
            &Default::default(),
        );

        let first = model.forward(x.clone()).expect("valid input").into_array();
        let second = model.forward(x).expect("valid input").into_array();
        for (a, b) in first.into_iter().zip(second) {
            assert_eq!((a - b).abs().max().into_scalar(), 0.0);
        }
    }

    #[rstest]
    #[case([1, 3, 64, 64], "[batch, 1, height, width]")]
    #[case([1, 1, 48, 64], "multiples of 32")]
    #[case([1, 1, 64, 0], "multiples of 32")]
    fn invalid_inputs_are_rejected(#[case] dims: [usize; 4], #[case] expected: &str) {
        let model = small_model(0);

        match model.check_input(&dims) {
            Err(ScaleFormerError::InvalidTensorShape { expected: e, .. }) => {
                assert!(e.contains(expected), "`{e}` does not mention `{expected}`");
            }
            other => panic!("Expected InvalidTensorShape error, got {other:?}"),
        }
    }

    #[test]
    fn window_sizes_must_divide_stage_resolution() {
        let config = small_config().with_encoder(
            EncoderConfig::new()
                .with_num_path(vec![2, 2, 2, 2])
                .with_num_layers(vec![1, 1, 1, 1])
                .with_embed_dims(vec![16, 32, 32, 48])
                .with_num_heads(vec![2, 2, 2, 2])
                .with_window_sizes(vec![vec![1, 2], vec![1, 2], vec![1, 2], vec![1, 7]]),
        );
        let model = ScaleFormerConfig::new(config)
            .init::<TestBackend>(&Default::default())
            .expect("valid configuration");

        // 224 puts the last stage at 7×7
        assert!(model.check_input(&[1, 1, 224, 224]).is_ok());

        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 64, 64], &Default::default());
        match model.forward(x) {
            Err(ScaleFormerError::InvalidTensorShape { expected, .. }) => {
                assert!(expected.contains("window size 7"));
            }
            other => panic!("Expected InvalidTensorShape error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_configuration_fails_before_allocation() {
        let config = small_config()
            .with_decoder(DecoderConfig::new().with_spatial_kernel_size(5));

        let result = ScaleFormerConfig::new(config).init::<TestBackend>(&Default::default());
        assert!(matches!(
            result,
            Err(ScaleFormerError::UnsupportedKernelSize { kernel_size: 5 })
        ));
    }

    #[test]
    fn input_divisor_comes_from_the_configuration() {
        let model = small_model(1);
        assert_eq!(model.input_divisor, small_config().input_divisor());

        let divisor = model.input_divisor;
        assert!(model.check_input(&[1, 1, 4 * divisor, 2 * divisor]).is_ok());
        assert!(model.check_input(&[1, 1, 2 * divisor + 16, 2 * divisor]).is_err());
    }

    #[test]
    fn saved_record_round_trips() {
        let path = std::env::temp_dir().join(format!("scaleformer-{}", std::process::id()));
        let model = small_model(5);
        model.save(&path).expect("record is written");

        let restored = ScaleFormerConfig::new(small_config())
            .with_seed(Some(6))
            .init_from_record::<TestBackend>(&path, &Default::default())
            .expect("record is read");

        let x = Tensor::<TestBackend, 4>::ones([1, 1, 64, 64], &Default::default());
        let expected = model.forward(x.clone()).expect("valid input").logits;
        let actual = restored.forward(x).expect("valid input").logits;
        assert!((expected - actual).abs().max().into_scalar() < 1e-6);

        let _ = std::fs::remove_file(path.with_extension("mpk"));
    }

    #[test]
    fn loading_a_missing_record_fails() {
        let result = ScaleFormerConfig::new(small_config()).init_from_record::<TestBackend>(
            std::env::temp_dir().join("scaleformer-missing-record"),
            &Default::default(),
        );
        assert!(matches!(
            result,
            Err(ScaleFormerError::WeightLoadingFailed { .. })
        ));
    }

    #[test]
    #[cfg_attr(
        debug_assertions,
        ignore = "reference 224×224 configuration is slow on CPU without optimizations"
    )]
    fn reference_configuration_on_zero_input() {
        let model = ScaleFormerConfig::new(ModelConfig::new().with_num_classes(4).with_in_chans(1))
            .init::<TestBackend>(&Default::default())
            .expect("reference configuration is valid");

        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 224, 224], &Default::default());
        let features = model
            .forward_features(x.clone())
            .expect("valid input")
            .map(|feature| feature.dims());
        assert_eq!(
            features,
            [
                [1, 288, 56, 56],
                [1, 384, 28, 28],
                [1, 480, 14, 14],
                [1, 480, 7, 7]
            ]
        );

        for map in model.forward(x).expect("valid input").into_array() {
            assert_eq!(map.dims(), [1, 4, 224, 224]);
        }
    }
}
