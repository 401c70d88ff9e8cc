//! Image folder batch source
//!
//! [`ImageFolder`] indexes the images in one directory. [`ImageFolderLoader`]
//! turns it into `(images, ())` batches of shape `[batch, 3, size, size]`
//! with values in `[0, 1]`. Shuffling and flips are drawn from the caller's
//! [`NoiseSource`] when an epoch starts, so a seeded run visits the same
//! batches every time.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use image::imageops::FilterType;
use image::RgbImage;
use thiserror::Error;
use tracing::info;

use burn_ddpm_core::{DiffusionError, NoiseSource};
use burn_ddpm_unet::DOWNSAMPLE_FACTOR;

/// File extensions recognized as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// Errors from reading images
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The directory does not exist
    #[error("Directory does not exist: {0}")]
    NotFound(PathBuf),

    /// The directory has no image files
    #[error("No images found in directory: {0}")]
    Empty(PathBuf),

    /// IO error while listing the directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An image could not be decoded
    #[error("Failed to load image {path}: {source}")]
    Image {
        /// Offending file
        path: PathBuf,
        /// Decoder error
        #[source]
        source: image::ImageError,
    },

    /// Index past the end of the folder
    #[error("Index {index} out of bounds (size: {len})")]
    OutOfBounds {
        /// Requested index
        index: usize,
        /// Number of images
        len: usize,
    },

    /// Invalid image size or batch size
    #[error(transparent)]
    Config(#[from] DiffusionError),
}

/// Sorted list of the images in a directory
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    paths: Vec<PathBuf>,
    image_size: usize,
}

impl ImageFolder {
    /// Scans `dir` (not recursively) for image files
    pub fn open<P: AsRef<Path>>(dir: P, image_size: usize) -> Result<Self, DatasetError> {
        let root = dir.as_ref().to_path_buf();
        if image_size == 0 || image_size % DOWNSAMPLE_FACTOR != 0 {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "image_size {image_size} must be a positive multiple of {DOWNSAMPLE_FACTOR}"
            ))
            .into());
        }
        if !root.is_dir() {
            return Err(DatasetError::NotFound(root));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                paths.push(path);
            }
        }

        if paths.is_empty() {
            return Err(DatasetError::Empty(root));
        }
        paths.sort();

        info!("Found {} images in {}", paths.len(), root.display());

        Ok(Self {
            root,
            paths,
            image_size,
        })
    }

    /// Directory the images were read from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Image files in load order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always false for an opened folder
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Side length images are resized to
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Decodes and resizes one image to CHW floats in `[0, 1]`
    pub fn load(&self, index: usize, flip: bool) -> Result<Vec<f32>, DatasetError> {
        let path = self.paths.get(index).ok_or(DatasetError::OutOfBounds {
            index,
            len: self.paths.len(),
        })?;

        let size = self.image_size as u32;
        let img = image::open(path)
            .map_err(|source| DatasetError::Image {
                path: path.clone(),
                source,
            })?
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        Ok(to_chw(&img, flip))
    }

    /// Loads one image as a `[1, 3, size, size]` tensor
    pub fn get<B: Backend>(&self, index: usize, device: &B::Device) -> Result<Tensor<B, 4>, DatasetError> {
        self.batch(&[index], &[false], device)
    }

    /// Loads several images into one batch
    ///
    /// `flips[i]` mirrors image `indices[i]` horizontally; missing entries
    /// mean no flip.
    pub fn batch<B: Backend>(
        &self,
        indices: &[usize],
        flips: &[bool],
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, DatasetError> {
        let size = self.image_size;
        let mut data = Vec::with_capacity(indices.len() * 3 * size * size);
        for (i, &index) in indices.iter().enumerate() {
            let flip = flips.get(i).copied().unwrap_or(false);
            data.extend(self.load(index, flip)?);
        }

        Ok(Tensor::from_data(
            TensorData::new(data, [indices.len(), 3, size, size]),
            device,
        ))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn to_chw(img: &RgbImage, flip: bool) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let mut data = Vec::with_capacity(3 * (w * h) as usize);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                let src_x = if flip { w - 1 - x } else { x };
                data.push(img.get_pixel(src_x, y)[c] as f32 / 255.0);
            }
        }
    }
    data
}

/// Batches over an [`ImageFolder`] on a fixed device
#[derive(Debug, Clone)]
pub struct ImageFolderLoader<B: Backend> {
    folder: ImageFolder,
    batch_size: usize,
    shuffle: bool,
    horizontal_flip: bool,
    device: B::Device,
}

impl<B: Backend> ImageFolderLoader<B> {
    /// Creates a loader without shuffling or augmentation
    pub fn new(folder: ImageFolder, batch_size: usize, device: &B::Device) -> Result<Self, DatasetError> {
        if batch_size == 0 {
            return Err(DiffusionError::InvalidConfiguration("batch_size must be positive".into()).into());
        }
        Ok(Self {
            folder,
            batch_size,
            shuffle: false,
            horizontal_flip: false,
            device: device.clone(),
        })
    }

    /// Reshuffle the order at the start of each epoch
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Mirror each image with probability 1/2
    pub fn with_horizontal_flip(mut self, flip: bool) -> Self {
        self.horizontal_flip = flip;
        self
    }

    /// The underlying folder
    pub fn folder(&self) -> &ImageFolder {
        &self.folder
    }

    /// Images per batch (the last batch may be smaller)
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch
    pub fn num_batches(&self) -> usize {
        self.folder.len().div_ceil(self.batch_size)
    }

    /// Starts an epoch, drawing its order and flips from `rng`
    pub fn epoch(&self, rng: &mut NoiseSource) -> Batches<'_, B> {
        let mut order: Vec<usize> = (0..self.folder.len()).collect();
        if self.shuffle {
            rng.shuffle(&mut order);
        }
        let flips = order
            .iter()
            .map(|_| self.horizontal_flip && rng.coin_flip())
            .collect();

        Batches {
            loader: self,
            order,
            flips,
            cursor: 0,
        }
    }
}

/// Iterator over the batches of one epoch
pub struct Batches<'a, B: Backend> {
    loader: &'a ImageFolderLoader<B>,
    order: Vec<usize>,
    flips: Vec<bool>,
    cursor: usize,
}

impl<B: Backend> Iterator for Batches<'_, B> {
    type Item = Result<(Tensor<B, 4>, ()), DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let range = self.cursor..end;
        self.cursor = end;

        let batch = self
            .loader
            .folder
            .batch(&self.order[range.clone()], &self.flips[range], &self.loader.device)
            .map(|images| (images, ()));
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for Batches<'_, B> {}
