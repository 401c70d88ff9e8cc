//! Training loop for pixel-space DDPM
//!
//! Per batch: draw timesteps and noise, compute the denoising loss, backpropagate
//! and apply one optimizer update. The loss is fully computed (and checked for
//! finiteness) before the update, so a failing batch never touches the
//! parameters.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use burn_ddpm_core::{DiffusionError, NoiseSource};
use burn_ddpm_samplers::{DiffusionProcess, NoiseSchedule};
use burn_ddpm_unet::PixelUNet;

use crate::checkpoint::{save_checkpoint, CheckpointError, CheckpointMeta};
use crate::dataset::{DatasetError, ImageFolderLoader};

/// Optimizer and loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Passes over the dataset
    pub num_epochs: usize,
    /// Images per batch
    pub batch_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Seed for noise, timesteps, shuffling and flips (entropy when absent)
    pub seed: Option<u64>,
    /// Save a checkpoint every N epochs
    pub checkpoint_every: Option<usize>,
    /// Log a batch line every N batches
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs: 50,
            batch_size: 64,
            learning_rate: 1e-4,
            seed: None,
            checkpoint_every: None,
            log_every: 10,
        }
    }
}

impl TrainingConfig {
    /// Rejects settings the loop cannot run with
    pub fn validate(&self) -> Result<(), DiffusionError> {
        if self.num_epochs == 0 || self.batch_size == 0 || self.log_every == 0 {
            return Err(DiffusionError::InvalidConfiguration(
                "num_epochs, batch_size and log_every must be positive".into(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.checkpoint_every == Some(0) {
            return Err(DiffusionError::InvalidConfiguration(
                "checkpoint_every must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Error type for training
#[derive(Debug, Error)]
pub enum TrainError {
    /// Invalid input or configuration
    #[error(transparent)]
    Diffusion(#[from] DiffusionError),

    /// A batch could not be loaded
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// A checkpoint could not be written
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The loss diverged; no update was applied
    #[error("Loss is not finite: {0}")]
    NonFiniteLoss(f32),

    /// The loader yielded no batches
    #[error("Epoch produced no batches")]
    EmptyEpoch,
}

/// Reported after every optimizer update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchReport {
    /// Batch index within the epoch (0-indexed)
    pub batch: usize,
    /// Batches in the epoch
    pub num_batches: usize,
    /// Loss of this batch
    pub loss: f32,
}

/// Reported after every epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// Completed epochs so far (1-indexed)
    pub epoch: usize,
    /// Epochs in this run
    pub num_epochs: usize,
    /// Mean batch loss of the epoch
    pub loss: f32,
}

/// Trainer for a [`PixelUNet`]
pub struct Trainer<B: AutodiffBackend, O> {
    model: PixelUNet<B>,
    schedule: NoiseSchedule,
    optimizer: O,
    config: TrainingConfig,
    checkpoint_dir: Option<PathBuf>,
    loss_history: Vec<f32>,
}

/// Trainer with the Adam optimizer
pub fn adam_trainer<B: AutodiffBackend>(
    model: PixelUNet<B>,
    schedule: NoiseSchedule,
    config: TrainingConfig,
) -> Result<Trainer<B, impl Optimizer<PixelUNet<B>, B>>, TrainError> {
    let optimizer = AdamConfig::new().init::<B, PixelUNet<B>>();
    Trainer::new(model, schedule, optimizer, config)
}

impl<B: AutodiffBackend, O: Optimizer<PixelUNet<B>, B>> Trainer<B, O> {
    /// Create a new trainer
    pub fn new(
        model: PixelUNet<B>,
        schedule: NoiseSchedule,
        optimizer: O,
        config: TrainingConfig,
    ) -> Result<Self, TrainError> {
        config.validate()?;
        Ok(Self {
            model,
            schedule,
            optimizer,
            config,
            checkpoint_dir: None,
            loss_history: Vec::new(),
        })
    }

    /// Continues the epoch count and loss history of a loaded checkpoint
    pub fn with_history(mut self, loss_history: Vec<f32>) -> Self {
        self.loss_history = loss_history;
        self
    }

    /// Directory for periodic checkpoints (`epoch_NNNN` subdirectories)
    pub fn with_checkpoint_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.checkpoint_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The model being trained
    pub fn model(&self) -> &PixelUNet<B> {
        &self.model
    }

    /// The noise schedule used for training
    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    /// Loop settings
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Mean loss of every completed epoch
    pub fn loss_history(&self) -> &[f32] {
        &self.loss_history
    }

    /// Number of completed epochs
    pub fn epochs_completed(&self) -> usize {
        self.loss_history.len()
    }

    /// Metadata describing the current training state
    pub fn checkpoint_meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            model: self.model.config(),
            schedule: self.schedule.config().clone(),
            epoch: self.epochs_completed(),
            loss_history: self.loss_history.clone(),
        }
    }

    /// Saves the current model and progress into `dir`
    pub fn save_checkpoint<P: AsRef<Path>>(&self, dir: P) -> Result<(), TrainError> {
        save_checkpoint(&self.model, dir, &self.checkpoint_meta())?;
        Ok(())
    }

    /// One optimizer update on a batch of clean images in `[0, 1]`
    ///
    /// Returns the batch loss.
    pub fn train_step(&mut self, images: Tensor<B, 4>, rng: &mut NoiseSource) -> Result<f32, TrainError> {
        let loss = {
            let process = DiffusionProcess::new(self.schedule.clone(), &self.model);
            process.loss(images, rng)?
        };

        let value = loss.clone().into_scalar().elem::<f32>();
        if !value.is_finite() {
            return Err(TrainError::NonFiniteLoss(value));
        }

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optimizer
            .step(self.config.learning_rate, self.model.clone(), grads);

        Ok(value)
    }

    /// One pass over `loader`, returning the mean batch loss
    pub fn train_epoch<F>(
        &mut self,
        loader: &ImageFolderLoader<B>,
        rng: &mut NoiseSource,
        mut on_batch: F,
    ) -> Result<f32, TrainError>
    where
        F: FnMut(BatchReport),
    {
        let batches = loader.epoch(rng);
        let num_batches = batches.len();

        let mut total = 0.0f32;
        let mut count = 0usize;
        for (batch, item) in batches.enumerate() {
            let (images, ()) = item?;
            let loss = self.train_step(images, rng)?;
            total += loss;
            count += 1;

            if batch % self.config.log_every == 0 {
                debug!("Batch {}/{}: Loss = {:.6}", batch + 1, num_batches, loss);
            }
            on_batch(BatchReport {
                batch,
                num_batches,
                loss,
            });
        }

        if count == 0 {
            return Err(TrainError::EmptyEpoch);
        }
        Ok(total / count as f32)
    }

    /// Runs `num_epochs` epochs, returning the loss history of this run
    pub fn fit<F>(
        &mut self,
        loader: &ImageFolderLoader<B>,
        rng: &mut NoiseSource,
        mut on_epoch: F,
    ) -> Result<Vec<f32>, TrainError>
    where
        F: FnMut(EpochReport),
    {
        let num_epochs = self.config.num_epochs;
        let mut losses = Vec::with_capacity(num_epochs);
        let mut best = f32::INFINITY;

        info!(
            "Training for {} epochs on {} images ({} batches per epoch)",
            num_epochs,
            loader.folder().len(),
            loader.num_batches()
        );

        for epoch in 1..=num_epochs {
            let loss = self.train_epoch(loader, rng, |_| {})?;
            losses.push(loss);
            self.loss_history.push(loss);
            best = best.min(loss);

            info!("Epoch {}/{} | Loss: {:.6} | Best: {:.6}", epoch, num_epochs, loss, best);
            on_epoch(EpochReport {
                epoch,
                num_epochs,
                loss,
            });

            if let (Some(every), Some(dir)) = (self.config.checkpoint_every, &self.checkpoint_dir) {
                if epoch % every == 0 {
                    let dir = dir.join(format!("epoch_{:04}", self.epochs_completed()));
                    self.save_checkpoint(dir)?;
                }
            }
        }

        Ok(losses)
    }

    /// Mean loss over `loader` without updating parameters
    ///
    /// Runs on the inner backend, so no autodiff graph is recorded.
    pub fn evaluate(&self, loader: &ImageFolderLoader<B>, rng: &mut NoiseSource) -> Result<f32, TrainError> {
        let model = self.model.valid();
        let process = DiffusionProcess::new(self.schedule.clone(), &model);

        let mut total = 0.0f32;
        let mut count = 0usize;
        for item in loader.epoch(rng) {
            let (images, ()) = item?;
            let loss = process.loss(images.inner(), rng)?;
            total += loss.into_scalar().elem::<f32>();
            count += 1;
        }

        if count == 0 {
            return Err(TrainError::EmptyEpoch);
        }
        let loss = total / count as f32;
        info!("Evaluation loss: {:.6} over {} batches", loss, count);
        Ok(loss)
    }
}
