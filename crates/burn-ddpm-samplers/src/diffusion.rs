//! Diffusion process: forward corruption, training loss and ancestral sampling
//!
//! [`DiffusionProcess`] pairs a [`DdpmSampler`] with a [`Denoiser`]. All
//! randomness comes from a caller-provided [`NoiseSource`], so a fixed seed
//! and fixed parameters reproduce every draw.
//!
//! Reverse sampling walks the Markov chain strictly from t = n_steps - 1
//! down to t = 0, feeding each step the previous output.

use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::*;
use tracing::{debug, info};

use burn_ddpm_core::{batch_timesteps, Denoiser, DiffusionError, NoiseSource};

use crate::ddpm::DdpmSampler;
use crate::scheduler::NoiseSchedule;

/// Progress of a reverse-sampling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingState {
    /// The next reverse step to apply is at this timestep
    Sampling(usize),
    /// Every timestep has been visited
    Done,
}

impl SamplingState {
    /// State on entry to sampling
    pub fn start(num_steps: usize) -> Self {
        match num_steps {
            0 => Self::Done,
            n => Self::Sampling(n - 1),
        }
    }

    /// State after the current step completes
    pub fn advance(self) -> Self {
        match self {
            Self::Sampling(0) | Self::Done => Self::Done,
            Self::Sampling(t) => Self::Sampling(t - 1),
        }
    }
}

/// Reported after each completed reverse step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    /// Current step (0-indexed)
    pub step: usize,
    /// Total number of steps
    pub total_steps: usize,
    /// Timestep that was just denoised
    pub timestep: usize,
}

/// Pixel-space DDPM around a noise-predicting network
#[derive(Debug, Clone)]
pub struct DiffusionProcess<D> {
    sampler: DdpmSampler,
    denoiser: D,
}

impl<D> DiffusionProcess<D> {
    /// Combines a schedule and a denoiser
    pub fn new(schedule: NoiseSchedule, denoiser: D) -> Self {
        Self {
            sampler: DdpmSampler::new(schedule),
            denoiser,
        }
    }

    /// The noise schedule
    pub fn schedule(&self) -> &NoiseSchedule {
        self.sampler.schedule()
    }

    /// Number of diffusion timesteps
    pub fn num_steps(&self) -> usize {
        self.sampler.schedule().num_steps()
    }

    /// The wrapped denoiser
    pub fn denoiser(&self) -> &D {
        &self.denoiser
    }

    /// Forward corruption q(x_t | x_0)
    ///
    /// Returns `√ᾱ_t · x0 + √(1-ᾱ_t) · noise`. When `noise` is `None` it is
    /// drawn from `rng` with the shape of `x0`.
    pub fn q_sample<B: Backend>(
        &self,
        x0: Tensor<B, 4>,
        timesteps: &[usize],
        noise: Option<Tensor<B, 4>>,
        rng: &mut NoiseSource,
    ) -> Result<Tensor<B, 4>, DiffusionError> {
        let noise = match noise {
            Some(noise) => noise,
            None => rng.standard_normal_like(&x0),
        };
        self.schedule().add_noise(x0, timesteps, noise)
    }

    /// Training loss with random timesteps and noise
    ///
    /// Draws one timestep per batch element uniformly from `[0, n_steps)`,
    /// corrupts `x0` and returns the mean squared error between the predicted
    /// and the true noise.
    pub fn loss<B: Backend>(
        &self,
        x0: Tensor<B, 4>,
        rng: &mut NoiseSource,
    ) -> Result<Tensor<B, 1>, DiffusionError>
    where
        D: Denoiser<B>,
    {
        self.denoiser.check_input(x0.dims())?;

        let [batch, _, _, _] = x0.dims();
        let timesteps = rng.timesteps(batch, self.num_steps());
        let noise = rng.standard_normal_like(&x0);

        self.loss_with(x0, &timesteps, noise)
    }

    /// Training loss for given timesteps and noise
    pub fn loss_with<B: Backend>(
        &self,
        x0: Tensor<B, 4>,
        timesteps: &[usize],
        noise: Tensor<B, 4>,
    ) -> Result<Tensor<B, 1>, DiffusionError>
    where
        D: Denoiser<B>,
    {
        let [batch, _, _, _] = x0.dims();
        let timesteps = batch_timesteps(timesteps, batch)?;

        let x_t = self.schedule().add_noise(x0, &timesteps, noise.clone())?;
        let noise_pred = self.denoiser.predict(x_t, &timesteps)?;

        Ok(MseLoss::new().forward(noise_pred, noise, Reduction::Mean))
    }

    /// Mean of the reverse step p(x_{t-1} | x_t)
    pub fn p_mean<B: Backend>(&self, xt: Tensor<B, 4>, timestep: usize) -> Result<Tensor<B, 4>, DiffusionError>
    where
        D: Denoiser<B>,
    {
        self.schedule().check_timestep(timestep)?;
        let eps = self.denoiser.predict(xt.clone(), &[timestep])?;
        self.sampler.mean(eps, timestep, xt)
    }

    /// One reverse step x_t → x_{t-1}
    ///
    /// Adds `√β_t` times fresh standard-normal noise for t > 0; the final step
    /// at t = 0 returns the mean unchanged.
    pub fn p_sample<B: Backend>(
        &self,
        xt: Tensor<B, 4>,
        timestep: usize,
        rng: &mut NoiseSource,
    ) -> Result<Tensor<B, 4>, DiffusionError>
    where
        D: Denoiser<B>,
    {
        self.schedule().check_timestep(timestep)?;
        let eps = self.denoiser.predict(xt.clone(), &[timestep])?;
        self.sampler.step(eps, timestep, xt, rng)
    }

    /// One reverse step with caller-supplied noise (ignored at t = 0)
    pub fn p_sample_with_noise<B: Backend>(
        &self,
        xt: Tensor<B, 4>,
        timestep: usize,
        noise: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>, DiffusionError>
    where
        D: Denoiser<B>,
    {
        self.schedule().check_timestep(timestep)?;
        let eps = self.denoiser.predict(xt.clone(), &[timestep])?;
        self.sampler.step_with_noise(eps, timestep, xt, noise)
    }

    /// Generates a batch by ancestral sampling from pure noise
    pub fn sample<B: Backend>(
        &self,
        shape: [usize; 4],
        device: &B::Device,
        rng: &mut NoiseSource,
    ) -> Result<Tensor<B, 4>, DiffusionError>
    where
        D: Denoiser<B>,
    {
        self.sample_with_callback::<B, _>(shape, device, rng, |_| {})
    }

    /// Generates a batch, calling `on_step` after every reverse step
    pub fn sample_with_callback<B: Backend, F>(
        &self,
        shape: [usize; 4],
        device: &B::Device,
        rng: &mut NoiseSource,
        mut on_step: F,
    ) -> Result<Tensor<B, 4>, DiffusionError>
    where
        D: Denoiser<B>,
        F: FnMut(StepInfo),
    {
        self.denoiser.check_input(shape)?;

        let total_steps = self.num_steps();
        info!(?shape, total_steps, "starting ancestral sampling");

        let mut x = rng.standard_normal::<B, 4>(shape, device);
        let mut state = SamplingState::start(total_steps);
        let mut step = 0;

        while let SamplingState::Sampling(timestep) = state {
            x = self.p_sample(x, timestep, rng)?;
            debug!(step, timestep, "reverse step");

            on_step(StepInfo {
                step,
                total_steps,
                timestep,
            });

            state = state.advance();
            step += 1;
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_walks_down() {
        let mut state = SamplingState::start(3);
        let mut visited = Vec::new();
        while let SamplingState::Sampling(t) = state {
            visited.push(t);
            state = state.advance();
        }
        assert_eq!(visited, vec![2, 1, 0]);
        assert_eq!(state, SamplingState::Done);
        assert_eq!(state.advance(), SamplingState::Done);
    }

    #[test]
    fn test_empty_schedule_is_done() {
        assert_eq!(SamplingState::start(0), SamplingState::Done);
    }
}
