//! Noise schedule for pixel-space DDPM
//!
//! The schedule is a table of `n_steps` triples `(β_t, α_t, ᾱ_t)` with
//! `α_t = 1 - β_t` and `ᾱ_t = ∏_{s≤t} α_s`. It is computed once on the host in
//! `f64` and shared read-only afterwards: clones point at the same table.

use std::sync::Arc;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use burn_ddpm_core::{batch_timesteps, DiffusionError};

/// Noise schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Number of diffusion timesteps
    pub num_train_steps: usize,
    /// First beta value (β_0)
    pub beta_start: f64,
    /// Last beta value (β_{n-1})
    pub beta_end: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            num_train_steps: 1000,
            beta_start: 1e-4,
            beta_end: 0.02,
        }
    }
}

impl ScheduleConfig {
    /// Checks the configuration without building the table
    pub fn validate(&self) -> Result<(), DiffusionError> {
        if self.num_train_steps == 0 {
            return Err(DiffusionError::InvalidConfiguration(
                "n_steps must be positive".into(),
            ));
        }
        if !(self.beta_start.is_finite() && self.beta_end.is_finite()) {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "betas must be finite, got [{}, {}]",
                self.beta_start, self.beta_end
            )));
        }
        if self.beta_start >= self.beta_end {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "beta_start ({}) must be smaller than beta_end ({})",
                self.beta_start, self.beta_end
            )));
        }
        if self.beta_start <= 0.0 || self.beta_end >= 1.0 {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "betas must lie in (0, 1), got [{}, {}]",
                self.beta_start, self.beta_end
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ScheduleTable {
    betas: Vec<f64>,
    alphas: Vec<f64>,
    alphas_cumprod: Vec<f64>,
}

/// Precomputed linear noise schedule
#[derive(Debug, Clone)]
pub struct NoiseSchedule {
    config: ScheduleConfig,
    table: Arc<ScheduleTable>,
}

impl NoiseSchedule {
    /// Creates a linear beta schedule
    ///
    /// β is spaced linearly over `num_steps` values from `beta_start` to
    /// `beta_end`, both inclusive.
    pub fn linear(num_steps: usize, beta_start: f64, beta_end: f64) -> Result<Self, DiffusionError> {
        Self::from_config(&ScheduleConfig {
            num_train_steps: num_steps,
            beta_start,
            beta_end,
        })
    }

    /// Creates a schedule from its configuration
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, DiffusionError> {
        config.validate()?;

        let n = config.num_train_steps;
        let betas: Vec<f64> = (0..n)
            .map(|i| {
                if n == 1 {
                    return config.beta_start;
                }
                let t = i as f64 / (n - 1) as f64;
                config.beta_start + t * (config.beta_end - config.beta_start)
            })
            .collect();

        let alphas: Vec<f64> = betas.iter().map(|b| 1.0 - b).collect();

        let mut alphas_cumprod = Vec::with_capacity(n);
        let mut cumprod = 1.0f64;
        for &alpha in &alphas {
            cumprod *= alpha;
            alphas_cumprod.push(cumprod);
        }

        Ok(Self {
            config: config.clone(),
            table: Arc::new(ScheduleTable {
                betas,
                alphas,
                alphas_cumprod,
            }),
        })
    }

    /// The configuration this schedule was built from
    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Number of timesteps
    pub fn num_steps(&self) -> usize {
        self.table.betas.len()
    }

    /// Fails with `OutOfRange` unless `t < num_steps`
    pub fn check_timestep(&self, t: usize) -> Result<(), DiffusionError> {
        if t >= self.num_steps() {
            return Err(DiffusionError::OutOfRange {
                timestep: t,
                n_steps: self.num_steps(),
            });
        }
        Ok(())
    }

    /// β_t
    pub fn beta(&self, t: usize) -> Result<f64, DiffusionError> {
        self.check_timestep(t)?;
        Ok(self.table.betas[t])
    }

    /// α_t = 1 - β_t
    pub fn alpha(&self, t: usize) -> Result<f64, DiffusionError> {
        self.check_timestep(t)?;
        Ok(self.table.alphas[t])
    }

    /// ᾱ_t, the running product of α up to and including t
    pub fn alpha_bar(&self, t: usize) -> Result<f64, DiffusionError> {
        self.check_timestep(t)?;
        Ok(self.table.alphas_cumprod[t])
    }

    /// All betas, indexed by timestep
    pub fn betas(&self) -> &[f64] {
        &self.table.betas
    }

    /// All alphas, indexed by timestep
    pub fn alphas(&self) -> &[f64] {
        &self.table.alphas
    }

    /// All alpha_bar values, indexed by timestep
    pub fn alphas_cumprod(&self) -> &[f64] {
        &self.table.alphas_cumprod
    }

    /// Forward corruption `√ᾱ_t · x0 + √(1-ᾱ_t) · noise`
    ///
    /// `timesteps` holds one entry per batch element or a single entry shared by
    /// the batch; each coefficient is broadcast over channels and pixels.
    pub fn add_noise<B: Backend>(
        &self,
        x0: Tensor<B, 4>,
        timesteps: &[usize],
        noise: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>, DiffusionError> {
        let dims = x0.dims();
        if noise.dims() != dims {
            return Err(DiffusionError::ShapeMismatch(format!(
                "noise shape {:?} differs from image shape {:?}",
                noise.dims(),
                dims
            )));
        }

        let timesteps = batch_timesteps(timesteps, dims[0])?;
        for &t in &timesteps {
            self.check_timestep(t)?;
        }

        let device = x0.device();
        let signal = self.per_sample(&timesteps, |ab| ab.sqrt(), &device);
        let noise_level = self.per_sample(&timesteps, |ab| (1.0 - ab).sqrt(), &device);

        Ok(x0 * signal + noise * noise_level)
    }

    /// Builds a `[batch, 1, 1, 1]` tensor of `f(ᾱ_t)` for already validated timesteps
    fn per_sample<B: Backend>(
        &self,
        timesteps: &[usize],
        f: impl Fn(f64) -> f64,
        device: &B::Device,
    ) -> Tensor<B, 4> {
        let values: Vec<f32> = timesteps
            .iter()
            .map(|&t| f(self.table.alphas_cumprod[t]) as f32)
            .collect();
        Tensor::<B, 1>::from_data(TensorData::new(values, [timesteps.len()]), device)
            .reshape([timesteps.len(), 1, 1, 1])
    }
}
