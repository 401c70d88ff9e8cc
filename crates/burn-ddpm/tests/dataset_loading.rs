//! Image folder scanning and batching

use std::path::Path;

use burn::prelude::*;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use burn_ddpm::{DatasetError, DiffusionError, ImageFolder, ImageFolderLoader, NoiseSource};

type TestBackend = NdArray<f32>;

fn write_image(dir: &Path, name: &str, color: [u8; 3]) {
    RgbImage::from_pixel(8, 8, Rgb(color)).save(dir.join(name)).unwrap();
}

fn folder_with_images(n: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    for i in 0..n {
        write_image(dir.path(), &format!("img_{i}.png"), [(i * 40) as u8, 0, 255]);
    }
    std::fs::write(dir.path().join("README.txt"), "not an image").unwrap();
    dir
}

#[test]
fn test_open_lists_only_images_sorted() {
    let dir = folder_with_images(3);
    let folder = ImageFolder::open(dir.path(), 8).unwrap();

    assert_eq!(folder.len(), 3);
    let names: Vec<_> = folder
        .paths()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["img_0.png", "img_1.png", "img_2.png"]);
}

#[test]
fn test_missing_and_empty_directories() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        ImageFolder::open(dir.path().join("nope"), 8),
        Err(DatasetError::NotFound(_))
    ));
    assert!(matches!(
        ImageFolder::open(dir.path(), 8),
        Err(DatasetError::Empty(_))
    ));
}

#[test]
fn test_image_size_must_be_multiple_of_four() {
    let dir = folder_with_images(1);
    assert!(matches!(
        ImageFolder::open(dir.path(), 10),
        Err(DatasetError::Config(DiffusionError::InvalidConfiguration(_)))
    ));
}

#[test]
fn test_images_are_resized_to_unit_range_chw() {
    let dir = TempDir::new().unwrap();
    RgbImage::from_pixel(20, 12, Rgb([255, 0, 51])).save(dir.path().join("a.png")).unwrap();

    let device = Default::default();
    let folder = ImageFolder::open(dir.path(), 4).unwrap();
    let image = folder.get::<TestBackend>(0, &device).unwrap();
    assert_eq!(image.dims(), [1, 3, 4, 4]);

    let values: Vec<f32> = image.into_data().to_vec().unwrap();
    assert!(values[..16].iter().all(|v| (v - 1.0).abs() < 1e-6));
    assert!(values[16..32].iter().all(|v| v.abs() < 1e-6));
    assert!(values[32..].iter().all(|v| (v - 0.2).abs() < 1e-6));
}

#[test]
fn test_loader_keeps_partial_last_batch() {
    let dir = folder_with_images(5);
    let device = Default::default();
    let folder = ImageFolder::open(dir.path(), 8).unwrap();
    let loader = ImageFolderLoader::<TestBackend>::new(folder, 2, &device).unwrap();
    assert_eq!(loader.num_batches(), 3);

    let mut rng = NoiseSource::seeded(0);
    let sizes: Vec<usize> = loader
        .epoch(&mut rng)
        .map(|batch| batch.unwrap().0.dims()[0])
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[test]
fn test_zero_batch_size_rejected() {
    let dir = folder_with_images(1);
    let folder = ImageFolder::open(dir.path(), 8).unwrap();
    assert!(ImageFolderLoader::<TestBackend>::new(folder, 0, &Default::default()).is_err());
}

#[test]
fn test_shuffled_epochs_are_reproducible() {
    let dir = folder_with_images(6);
    let device = Default::default();
    let folder = ImageFolder::open(dir.path(), 8).unwrap();
    let loader = ImageFolderLoader::<TestBackend>::new(folder, 6, &device)
        .unwrap()
        .with_shuffle(true)
        .with_horizontal_flip(true);

    let collect = |seed| -> Vec<f32> {
        let mut rng = NoiseSource::seeded(seed);
        let (images, ()) = loader.epoch(&mut rng).next().unwrap().unwrap();
        images.into_data().to_vec().unwrap()
    };
    assert_eq!(collect(7), collect(7));
}

#[test]
fn test_flip_mirrors_columns() {
    let dir = TempDir::new().unwrap();
    let img = RgbImage::from_fn(8, 8, |x, _| if x < 4 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) });
    img.save(dir.path().join("half.png")).unwrap();

    let device = Default::default();
    let folder = ImageFolder::open(dir.path(), 8).unwrap();
    let plain = folder.batch::<TestBackend>(&[0], &[false], &device).unwrap();
    let flipped = folder.batch::<TestBackend>(&[0], &[true], &device).unwrap();

    let plain: Vec<f32> = plain.into_data().to_vec().unwrap();
    let flipped: Vec<f32> = flipped.into_data().to_vec().unwrap();
    // first row, first and last column of the red channel
    assert!((plain[0] - 1.0).abs() < 1e-6 && plain[7].abs() < 1e-6);
    assert!(flipped[0].abs() < 1e-6 && (flipped[7] - 1.0).abs() < 1e-6);
}
