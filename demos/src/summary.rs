//! Human-readable description of a ScaleFormer configuration.

use std::fmt;

use scaleformer_burn::{ModelConfig, NUM_STAGES, STEM_STRIDE};

/// Shape schedule of one encoder stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub width: usize,
    pub out_width: usize,
    pub resolution: usize,
    pub num_path: usize,
    pub num_layers: usize,
    pub window_sizes: Vec<usize>,
    pub drop_path: Vec<f64>,
}

/// Shape schedule of the whole model for a square input.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub image_size: usize,
    pub in_chans: usize,
    pub num_classes: usize,
    pub stages: Vec<StageSummary>,
}

impl ModelSummary {
    /// Builds the summary of `config` for an `image_size × image_size` input.
    pub fn new(config: &ModelConfig, image_size: usize) -> Self {
        let encoder = &config.encoder;
        let out_widths = config.stage_out_channels();
        let schedule = encoder.drop_path_schedule();

        let stages = schedule
            .into_iter()
            .take(NUM_STAGES)
            .enumerate()
            .map(|(idx, drop_path)| StageSummary {
                width: encoder.embed_dims[idx],
                out_width: out_widths[idx],
                resolution: image_size / (STEM_STRIDE << idx),
                num_path: encoder.num_path[idx],
                num_layers: encoder.num_layers[idx],
                window_sizes: encoder.window_sizes[idx].clone(),
                drop_path,
            })
            .collect();

        Self {
            image_size,
            in_chans: config.in_chans,
            num_classes: config.num_classes,
            stages,
        }
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ScaleFormer {}x{}x{} -> {} classes",
            self.in_chans, self.image_size, self.image_size, self.num_classes
        )?;
        for (idx, stage) in self.stages.iter().enumerate() {
            writeln!(
                f,
                "  stage {idx}: {:>4} -> {:>4} ch @ {:>3}x{:<3} paths {} layers {} windows {:?} drop path {:?}",
                stage.width,
                stage.out_width,
                stage.resolution,
                stage.resolution,
                stage.num_path,
                stage.num_layers,
                stage.window_sizes,
                stage.drop_path,
            )?;
        }
        Ok(())
    }
}
