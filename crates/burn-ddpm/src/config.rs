//! Experiment configuration
//!
//! One JSON document holds everything needed to reproduce a run: the
//! network shape, the noise schedule, the optimizer settings and the data
//! pipeline. Missing fields take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use burn_ddpm_core::DiffusionError;
use burn_ddpm_samplers::ScheduleConfig;
use burn_ddpm_unet::{PixelUNetConfig, DOWNSAMPLE_FACTOR};

use crate::train::TrainingConfig;

/// Errors from loading or saving a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Values that fail validation
    #[error(transparent)]
    Invalid(#[from] DiffusionError),
}

/// Image pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Images are resized to `image_size x image_size`
    pub image_size: usize,
    /// Reshuffle the image order every epoch
    pub shuffle: bool,
    /// Random horizontal flip augmentation
    pub horizontal_flip: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            image_size: 64,
            shuffle: true,
            horizontal_flip: true,
        }
    }
}

impl DataConfig {
    /// Image size must survive two 2x downsamples
    pub fn validate(&self) -> Result<(), DiffusionError> {
        if self.image_size == 0 || self.image_size % DOWNSAMPLE_FACTOR != 0 {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "image_size {} must be a positive multiple of {DOWNSAMPLE_FACTOR}",
                self.image_size
            )));
        }
        Ok(())
    }
}

/// Complete configuration of a training/sampling run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Network shape
    pub model: PixelUNetConfig,
    /// Noise schedule
    pub schedule: ScheduleConfig,
    /// Optimizer and loop settings
    pub training: TrainingConfig,
    /// Image pipeline
    pub data: DataConfig,
}

impl ExperimentConfig {
    /// Validates every section
    pub fn validate(&self) -> Result<(), DiffusionError> {
        self.model.validate()?;
        self.schedule.validate()?;
        self.training.validate()?;
        self.data.validate()
    }

    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: ExperimentConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
