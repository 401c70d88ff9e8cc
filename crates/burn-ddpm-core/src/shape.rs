//! Shape checks performed before any tensor work starts

use crate::error::DiffusionError;

/// Resolves the timestep list for a batch
///
/// A single timestep broadcasts over the whole batch; otherwise there must be
/// exactly one timestep per batch element.
pub fn batch_timesteps(timesteps: &[usize], batch: usize) -> Result<Vec<usize>, DiffusionError> {
    match timesteps.len() {
        1 => Ok(vec![timesteps[0]; batch]),
        n if n == batch => Ok(timesteps.to_vec()),
        n => Err(DiffusionError::shape(format!(
            "got {n} timesteps for a batch of {batch}"
        ))),
    }
}

/// Rejects an empty batch
pub fn check_batch(dims: [usize; 4]) -> Result<(), DiffusionError> {
    if dims[0] == 0 {
        return Err(DiffusionError::shape(format!("empty batch {dims:?}")));
    }
    Ok(())
}

/// Checks that height and width of an NCHW shape are divisible by `factor`
pub fn check_spatial_divisible(dims: [usize; 4], factor: usize) -> Result<(), DiffusionError> {
    let [_, _, h, w] = dims;
    if h == 0 || w == 0 || h % factor != 0 || w % factor != 0 {
        return Err(DiffusionError::shape(format!(
            "spatial size {h}x{w} is not divisible by {factor}"
        )));
    }
    Ok(())
}
