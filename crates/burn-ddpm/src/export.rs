//! Generated image export
//!
//! Generated tensors are `[batch, 3, height, width]` with values nominally in
//! `[0, 1]`; anything outside is clipped before conversion to 8-bit RGB.

use std::path::{Path, PathBuf};

use burn::prelude::*;
use image::{ImageBuffer, RgbImage};
use thiserror::Error;
use tracing::info;

/// Error type for image export
#[derive(Debug, Error)]
pub enum ExportError {
    /// Tensor is not a batch of RGB images
    #[error("Cannot export tensor of shape {0:?}: expected [batch, 3, height, width]")]
    Shape([usize; 4]),

    /// Batch index past the end
    #[error("Image index {index} out of range for a batch of {batch}")]
    Index {
        /// Requested index
        index: usize,
        /// Batch size
        batch: usize,
    },

    /// Tensor data could not be read back as f32
    #[error("Tensor data error: {0}")]
    Data(String),

    /// Encoding or writing the file failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts the first image of a batch to interleaved RGB bytes (HWC)
///
/// Values are clamped to `[0, 1]` and scaled to `[0, 255]`.
pub fn tensor_to_rgb<B: Backend>(tensor: Tensor<B, 4>) -> Result<Vec<u8>, ExportError> {
    let dims = tensor.dims();
    let [batch, channels, h, w] = dims;
    if batch == 0 || channels != 3 {
        return Err(ExportError::Shape(dims));
    }

    let tensor = tensor.slice([0..1, 0..3, 0..h, 0..w]).clamp(0.0, 1.0) * 255.0;
    let floats: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|err| ExportError::Data(format!("{err:?}")))?;

    let mut rgb = Vec::with_capacity(h * w * 3);
    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                let idx = c * h * w + y * w + x;
                rgb.push(floats[idx].round() as u8);
            }
        }
    }

    Ok(rgb)
}

/// Converts batch element `index` to an [`RgbImage`]
pub fn to_rgb_image<B: Backend>(tensor: Tensor<B, 4>, index: usize) -> Result<RgbImage, ExportError> {
    let dims = tensor.dims();
    let [batch, channels, h, w] = dims;
    if channels != 3 {
        return Err(ExportError::Shape(dims));
    }
    if index >= batch {
        return Err(ExportError::Index { index, batch });
    }

    let rgb = tensor_to_rgb(tensor.slice([index..index + 1, 0..3, 0..h, 0..w]))?;
    ImageBuffer::from_raw(w as u32, h as u32, rgb).ok_or(ExportError::Shape(dims))
}

/// Writes batch element `index` to `path` (format from the extension)
pub fn save_image<B: Backend, P: AsRef<Path>>(
    tensor: Tensor<B, 4>,
    index: usize,
    path: P,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    to_rgb_image(tensor, index)?.save(path)?;
    info!("Saved image to {}", path.display());
    Ok(())
}

/// Writes every batch element as `{prefix}_{index:03}.png` under `dir`
pub fn save_batch<B: Backend, P: AsRef<Path>>(
    tensor: Tensor<B, 4>,
    dir: P,
    prefix: &str,
) -> Result<Vec<PathBuf>, ExportError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let [batch, _, _, _] = tensor.dims();
    let mut paths = Vec::with_capacity(batch);
    for index in 0..batch {
        let path = dir.join(format!("{prefix}_{index:03}.png"));
        to_rgb_image(tensor.clone(), index)?.save(&path)?;
        paths.push(path);
    }

    info!("Saved {} images to {}", batch, dir.display());
    Ok(paths)
}
