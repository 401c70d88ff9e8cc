//! Checkpoint persistence
//!
//! A checkpoint is a directory holding:
//!
//! - `model.bin` - network parameters written by Burn's [`BinFileRecorder`]
//! - `checkpoint.json` - [`CheckpointMeta`]: the network and schedule
//!   configs needed to rebuild the model, plus training progress
//!
//! ```ignore
//! save_checkpoint(&unet, "checkpoints/epoch_10", &meta)?;
//! let (unet, meta) = load_checkpoint::<Backend, _>("checkpoints/epoch_10", &device)?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use burn_ddpm_core::DiffusionError;
use burn_ddpm_samplers::{NoiseSchedule, ScheduleConfig};
use burn_ddpm_unet::{PixelUNet, PixelUNetConfig};

/// Parameter file stem; the recorder adds the `.bin` extension
pub const MODEL_FILE: &str = "model";
/// Metadata file name
pub const META_FILE: &str = "checkpoint.json";

/// Error type for checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the Burn recorder
    #[error("Record error: {0}")]
    Record(#[from] RecorderError),

    /// Stored configuration is not usable
    #[error(transparent)]
    Diffusion(#[from] DiffusionError),
}

/// Checkpoint metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Network shape
    pub model: PixelUNetConfig,
    /// Schedule the network was trained with
    pub schedule: ScheduleConfig,
    /// Completed training epochs
    pub epoch: usize,
    /// Mean loss of every completed epoch
    pub loss_history: Vec<f32>,
}

impl CheckpointMeta {
    /// Metadata for an untrained model
    pub fn new(model: PixelUNetConfig, schedule: ScheduleConfig) -> Self {
        Self {
            model,
            schedule,
            epoch: 0,
            loss_history: Vec::new(),
        }
    }

    /// Rebuilds the noise schedule
    pub fn noise_schedule(&self) -> Result<NoiseSchedule, DiffusionError> {
        NoiseSchedule::from_config(&self.schedule)
    }

    /// Loss of the last completed epoch
    pub fn last_loss(&self) -> Option<f32> {
        self.loss_history.last().copied()
    }

    /// Reads `checkpoint.json` from a checkpoint directory
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, CheckpointError> {
        let content = fs::read_to_string(dir.as_ref().join(META_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes `checkpoint.json` into a checkpoint directory
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), CheckpointError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.as_ref().join(META_FILE), content)?;
        Ok(())
    }
}

/// Path of the parameter file inside a checkpoint directory
pub fn model_path<P: AsRef<Path>>(dir: P) -> PathBuf {
    dir.as_ref().join(MODEL_FILE).with_extension("bin")
}

/// Writes parameters and metadata into `dir`, creating it if needed
pub fn save_checkpoint<B: Backend, P: AsRef<Path>>(
    model: &PixelUNet<B>,
    dir: P,
    meta: &CheckpointMeta,
) -> Result<(), CheckpointError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model.clone().save_file(dir.join(MODEL_FILE), &recorder)?;
    meta.save(dir)?;

    info!("Saved checkpoint (epoch {}) to {}", meta.epoch, dir.display());
    Ok(())
}

/// Rebuilds the network from `dir` on `device`
pub fn load_checkpoint<B: Backend, P: AsRef<Path>>(
    dir: P,
    device: &B::Device,
) -> Result<(PixelUNet<B>, CheckpointMeta), CheckpointError> {
    let dir = dir.as_ref();
    let meta = CheckpointMeta::load(dir)?;
    meta.schedule.validate()?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = meta
        .model
        .init::<B>(device)?
        .load_file(dir.join(MODEL_FILE), &recorder, device)?;

    info!("Loaded checkpoint (epoch {}) from {}", meta.epoch, dir.display());
    Ok((model, meta))
}
