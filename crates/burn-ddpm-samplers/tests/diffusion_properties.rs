//! Behavioural properties of the diffusion process using stand-in denoisers.

use std::cell::RefCell;

use burn::prelude::*;
use burn_ndarray::NdArray;

use burn_ddpm_core::{check_spatial_divisible, Denoiser, DiffusionError, NoiseSource};
use burn_ddpm_samplers::{DiffusionProcess, NoiseSchedule, StepInfo};

type TestBackend = NdArray<f32>;

/// Predicts zero noise and records every timestep batch it is asked about
#[derive(Default)]
struct RecordingDenoiser {
    calls: RefCell<Vec<Vec<usize>>>,
}

impl Denoiser<TestBackend> for RecordingDenoiser {
    fn predict(
        &self,
        x: Tensor<TestBackend, 4>,
        timesteps: &[usize],
    ) -> Result<Tensor<TestBackend, 4>, DiffusionError> {
        self.calls.borrow_mut().push(timesteps.to_vec());
        Ok(x.zeros_like())
    }
}

/// Deterministic stand-in: predicts half of its input as noise
struct HalfDenoiser;

impl Denoiser<TestBackend> for HalfDenoiser {
    fn predict(
        &self,
        x: Tensor<TestBackend, 4>,
        _timesteps: &[usize],
    ) -> Result<Tensor<TestBackend, 4>, DiffusionError> {
        Ok(x * 0.5)
    }

    fn check_input(&self, dims: [usize; 4]) -> Result<(), DiffusionError> {
        check_spatial_divisible(dims, 4)
    }
}

fn to_vec(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
    tensor.into_data().to_vec().unwrap()
}

fn schedule(n: usize) -> NoiseSchedule {
    NoiseSchedule::linear(n, 1e-4, 0.02).unwrap()
}

#[test]
fn test_sample_visits_every_timestep_once_in_decreasing_order() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(5), RecordingDenoiser::default());
    let mut rng = NoiseSource::seeded(0);
    let mut steps: Vec<StepInfo> = Vec::new();

    let out = process
        .sample_with_callback::<TestBackend, _>([2, 3, 4, 4], &device, &mut rng, |info| {
            steps.push(info)
        })
        .unwrap();

    assert_eq!(out.dims(), [2, 3, 4, 4]);
    let calls = process.denoiser().calls.borrow();
    assert_eq!(*calls, vec![vec![4], vec![3], vec![2], vec![1], vec![0]]);

    let visited: Vec<usize> = steps.iter().map(|s| s.timestep).collect();
    assert_eq!(visited, vec![4, 3, 2, 1, 0]);
    assert!(steps.iter().enumerate().all(|(i, s)| s.step == i && s.total_steps == 5));
}

#[test]
fn test_sample_is_reproducible_under_fixed_seed() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(20), HalfDenoiser);

    let a = process
        .sample::<TestBackend>([1, 3, 8, 8], &device, &mut NoiseSource::seeded(42))
        .unwrap();
    let b = process
        .sample::<TestBackend>([1, 3, 8, 8], &device, &mut NoiseSource::seeded(42))
        .unwrap();
    let c = process
        .sample::<TestBackend>([1, 3, 8, 8], &device, &mut NoiseSource::seeded(43))
        .unwrap();

    let a = to_vec(a);
    assert_eq!(a, to_vec(b));
    assert_ne!(a, to_vec(c));
}

#[test]
fn test_sample_rejects_unsupported_shape_before_drawing() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(3), HalfDenoiser);
    let result = process.sample::<TestBackend>([1, 3, 6, 8], &device, &mut NoiseSource::seeded(1));
    assert!(matches!(result, Err(DiffusionError::ShapeMismatch(_))));
}

#[test]
fn test_q_sample_shape_and_determinism_with_explicit_noise() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(100), HalfDenoiser);
    let mut rng = NoiseSource::seeded(5);

    let x0 = rng.standard_normal::<TestBackend, 4>([3, 3, 8, 8], &device);
    let noise = rng.standard_normal::<TestBackend, 4>([3, 3, 8, 8], &device);

    let a = process
        .q_sample(x0.clone(), &[10, 50, 99], Some(noise.clone()), &mut NoiseSource::seeded(1))
        .unwrap();
    let b = process
        .q_sample(x0, &[10, 50, 99], Some(noise), &mut NoiseSource::seeded(2))
        .unwrap();

    assert_eq!(a.dims(), [3, 3, 8, 8]);
    assert_eq!(to_vec(a), to_vec(b));
}

#[test]
fn test_q_sample_without_noise_at_first_step() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(10), HalfDenoiser);
    let x0 = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device) * 2.0;
    let zeros = Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device);

    let out = process
        .q_sample(x0, &[0], Some(zeros), &mut NoiseSource::seeded(0))
        .unwrap();

    let expected = (2.0 * process.schedule().alpha_bar(0).unwrap().sqrt()) as f32;
    assert!(to_vec(out).iter().all(|v| (v - expected).abs() < 1e-6));
}

#[test]
fn test_q_sample_half_alpha_bar_scenario() {
    let device = Default::default();
    // two steps starting at beta = 0.5 give alpha_bar[0] = 0.5
    let process = DiffusionProcess::new(NoiseSchedule::linear(2, 0.5, 0.6).unwrap(), HalfDenoiser);
    let x0 = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &device);
    let noise = Tensor::<TestBackend, 4>::ones([2, 3, 4, 4], &device);

    let out = process
        .q_sample(x0, &[0, 0], Some(noise), &mut NoiseSource::seeded(0))
        .unwrap();

    assert!(to_vec(out).iter().all(|v| (v - 0.70710677).abs() < 1e-6));
}

#[test]
fn test_q_sample_draws_noise_when_missing() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(10), HalfDenoiser);
    let x0 = Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device);

    let a = process
        .q_sample(x0.clone(), &[5], None, &mut NoiseSource::seeded(9))
        .unwrap();
    let b = process.q_sample(x0, &[5], None, &mut NoiseSource::seeded(9)).unwrap();
    let a = to_vec(a);
    assert!(a.iter().any(|v| *v != 0.0));
    assert_eq!(a, to_vec(b));
}

#[test]
fn test_p_sample_final_step_is_deterministic() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(10), HalfDenoiser);
    let xt = NoiseSource::seeded(3).standard_normal::<TestBackend, 4>([1, 3, 4, 4], &device);

    let a = process.p_sample(xt.clone(), 0, &mut NoiseSource::seeded(1)).unwrap();
    let b = process.p_sample(xt.clone(), 0, &mut NoiseSource::seeded(2)).unwrap();
    let mean = process.p_mean(xt, 0).unwrap();

    let a = to_vec(a);
    assert_eq!(a, to_vec(b));
    assert_eq!(a, to_vec(mean));
}

#[test]
fn test_p_sample_injects_noise_after_mean() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(10), HalfDenoiser);
    let mut rng = NoiseSource::seeded(3);
    let xt = rng.standard_normal::<TestBackend, 4>([1, 3, 4, 4], &device);
    let noise_a = rng.standard_normal::<TestBackend, 4>([1, 3, 4, 4], &device);
    let noise_b = rng.standard_normal::<TestBackend, 4>([1, 3, 4, 4], &device);

    let mean_a = process.p_mean(xt.clone(), 5).unwrap();
    let mean_b = process.p_mean(xt.clone(), 5).unwrap();
    assert_eq!(to_vec(mean_a.clone()), to_vec(mean_b));

    let out_a = process.p_sample_with_noise(xt.clone(), 5, noise_a.clone()).unwrap();
    let out_b = process.p_sample_with_noise(xt, 5, noise_b).unwrap();
    assert_ne!(to_vec(out_a.clone()), to_vec(out_b));

    // realized sample = mean + sqrt(beta) * noise
    let sigma = process.schedule().beta(5).unwrap().sqrt();
    let expected = to_vec(mean_a + noise_a * sigma);
    for (e, a) in expected.iter().zip(to_vec(out_a)) {
        assert!((e - a).abs() < 1e-6);
    }
}

#[test]
fn test_p_sample_out_of_range() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(10), RecordingDenoiser::default());
    let xt = Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device);

    let result = process.p_sample(xt, 10, &mut NoiseSource::seeded(0));
    assert_eq!(
        result.err(),
        Some(DiffusionError::OutOfRange {
            timestep: 10,
            n_steps: 10
        })
    );
    // the network is never consulted for an invalid timestep
    assert!(process.denoiser().calls.borrow().is_empty());
}

#[test]
fn test_loss_is_non_negative_and_uses_uniform_timesteps() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(50), RecordingDenoiser::default());
    let mut rng = NoiseSource::seeded(11);

    for _ in 0..5 {
        let x0 = rng.standard_normal::<TestBackend, 4>([4, 3, 4, 4], &device);
        let loss = process.loss(x0, &mut rng).unwrap();
        let value: f32 = loss.into_scalar();
        assert!(value >= 0.0);
    }

    let calls = process.denoiser().calls.borrow();
    assert_eq!(calls.len(), 5);
    assert!(calls.iter().all(|t| t.len() == 4 && t.iter().all(|&t| t < 50)));
}

#[test]
fn test_loss_with_zero_prediction_is_noise_power() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(50), RecordingDenoiser::default());
    let x0 = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &device);
    let noise = Tensor::<TestBackend, 4>::ones([2, 3, 4, 4], &device) * 2.0;

    let loss = process.loss_with(x0, &[3, 7], noise).unwrap();
    let value: f32 = loss.into_scalar();
    assert!((value - 4.0).abs() < 1e-6);
}

#[test]
fn test_loss_rejects_timestep_batch_mismatch() {
    let device = Default::default();
    let process = DiffusionProcess::new(schedule(50), RecordingDenoiser::default());
    let x0 = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &device);
    let noise = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &device);

    let result = process.loss_with(x0, &[1, 2, 3], noise);
    assert!(matches!(result, Err(DiffusionError::ShapeMismatch(_))));
    assert!(process.denoiser().calls.borrow().is_empty());
}
