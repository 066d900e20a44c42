//! Run configuration for the ScaleFormer tools.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use scaleformer_burn::{ModelConfig, ScaleFormerConfig};
use serde::{Deserialize, Serialize};

/// Everything a tool invocation needs besides its command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Model configuration.
    pub model: ModelConfig,
    /// Seed for weight initialization.
    pub seed: Option<u64>,
    /// Batch size of the synthetic input.
    pub batch_size: usize,
    /// Height and width of the synthetic input.
    pub image_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        let model = ModelConfig::new();
        Self {
            image_size: model.img_size,
            model,
            seed: Some(42),
            batch_size: 1,
        }
    }
}

impl RunConfig {
    /// Loads a JSON configuration; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parses a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads `path` when given, the defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// The model builder for this run.
    pub fn model_config(&self) -> ScaleFormerConfig {
        ScaleFormerConfig::new(self.model.clone()).with_seed(self.seed)
    }
}
