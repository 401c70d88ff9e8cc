//! DDPM (Denoising Diffusion Probabilistic Models) reverse step
//!
//! One ancestral step from x_t to x_{t-1} given the predicted noise ε:
//!
//! ```text
//! μ = (x_t - (1 - α_t) / √(1 - ᾱ_t) · ε) / √α_t
//! x_{t-1} = μ + √β_t · z,   z ~ N(0, I)   for t > 0
//! x_{t-1} = μ                              for t = 0
//! ```

use burn::prelude::*;

use burn_ddpm_core::{DiffusionError, NoiseSource};

use crate::scheduler::NoiseSchedule;

/// DDPM sampler
///
/// Holds the schedule and applies the reverse-step update to a model output.
/// The variance of the injected noise is fixed to β_t.
#[derive(Debug, Clone)]
pub struct DdpmSampler {
    schedule: NoiseSchedule,
}

impl DdpmSampler {
    /// Create a new DDPM sampler
    pub fn new(schedule: NoiseSchedule) -> Self {
        Self { schedule }
    }

    /// The underlying noise schedule
    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    /// Timesteps visited by ancestral sampling, from n_steps - 1 down to 0
    pub fn timesteps(&self) -> Vec<usize> {
        (0..self.schedule.num_steps()).rev().collect()
    }

    /// Posterior mean μ for x_{t-1}
    pub fn mean<B: Backend>(
        &self,
        model_output: Tensor<B, 4>,
        timestep: usize,
        sample: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>, DiffusionError> {
        if model_output.dims() != sample.dims() {
            return Err(DiffusionError::ShapeMismatch(format!(
                "model output {:?} differs from sample {:?}",
                model_output.dims(),
                sample.dims()
            )));
        }

        let alpha_t = self.schedule.alpha(timestep)?;
        let alpha_bar_t = self.schedule.alpha_bar(timestep)?;

        let eps_coeff = (1.0 - alpha_t) / (1.0 - alpha_bar_t).sqrt();
        let mean = (sample - model_output * eps_coeff) / alpha_t.sqrt();

        Ok(mean)
    }

    /// Standard deviation of the injected noise at `timestep` (zero at t = 0)
    pub fn noise_scale(&self, timestep: usize) -> Result<f64, DiffusionError> {
        if timestep == 0 {
            self.schedule.check_timestep(timestep)?;
            return Ok(0.0);
        }
        Ok(self.schedule.beta(timestep)?.sqrt())
    }

    /// Perform one DDPM step, drawing fresh noise when t > 0
    pub fn step<B: Backend>(
        &self,
        model_output: Tensor<B, 4>,
        timestep: usize,
        sample: Tensor<B, 4>,
        rng: &mut NoiseSource,
    ) -> Result<Tensor<B, 4>, DiffusionError> {
        let mean = self.mean(model_output, timestep, sample)?;
        if timestep == 0 {
            return Ok(mean);
        }
        let noise = rng.standard_normal_like(&mean);
        self.add_variance(mean, timestep, noise)
    }

    /// Perform one DDPM step with caller-supplied noise
    ///
    /// `noise` is ignored at t = 0, where the step is deterministic.
    pub fn step_with_noise<B: Backend>(
        &self,
        model_output: Tensor<B, 4>,
        timestep: usize,
        sample: Tensor<B, 4>,
        noise: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>, DiffusionError> {
        let mean = self.mean(model_output, timestep, sample)?;
        if timestep == 0 {
            return Ok(mean);
        }
        self.add_variance(mean, timestep, noise)
    }

    fn add_variance<B: Backend>(
        &self,
        mean: Tensor<B, 4>,
        timestep: usize,
        noise: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>, DiffusionError> {
        if noise.dims() != mean.dims() {
            return Err(DiffusionError::ShapeMismatch(format!(
                "noise shape {:?} differs from sample {:?}",
                noise.dims(),
                mean.dims()
            )));
        }
        let sigma = self.noise_scale(timestep)?;
        Ok(mean + noise * sigma)
    }
}
