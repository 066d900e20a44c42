//! Configuration module for ScaleFormer.
//!
//! This module provides configuration structures and enums for the ScaleFormer model.
//! It is organized into two submodules:
//! - `core`: the main configuration structures, the stage constants and validation
//! - `enums`: enumeration types used in configurations

mod core;
mod enums;

pub(crate) use core::mlp_hidden;
pub use core::{DecoderConfig, EncoderConfig, ModelConfig, NUM_STAGES, STEM_STRIDE};

pub use enums::{Activation, UpsampleMode};
