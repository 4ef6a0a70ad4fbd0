use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use image::RgbImage;
use std::{fs, path::Path};

use crate::data::transform::ImageTransform;
use crate::domain::label::parse_file_name;

/// One transformed image with its label code.
/// `image` is CHW, length 3 × height × width.
#[derive(Debug, Clone)]
pub struct EventSample {
    pub image: Vec<f32>,
    pub label: String,
}

/// Rendered plots decoded up front; only the transform runs per item.
#[derive(Debug)]
pub struct EventImageDataset {
    items: Vec<(RgbImage, String)>,
    transform: ImageTransform,
}

impl EventImageDataset {
    /// Decode `names` under `dir`. Every name must carry a label code
    /// and every file must be a readable image.
    pub fn open(dir: impl AsRef<Path>, names: &[String], transform: ImageTransform) -> Result<Self> {
        let dir = dir.as_ref();
        let items = names
            .iter()
            .map(|name| {
                let (_, code) = parse_file_name(name)?;
                Ok((decode(&dir.join(name))?, code))
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("Decoded {} images from '{}'", items.len(), dir.display());
        Ok(Self { items, transform })
    }
}

fn decode(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("Cannot decode '{}'", path.display()))?
        .to_rgb8())
}

impl Dataset<EventSample> for EventImageDataset {
    fn get(&self, index: usize) -> Option<EventSample> {
        let (image, label) = self.items.get(index)?;
        let image = self.transform.apply(image.clone(), &mut rand::thread_rng());
        Some(EventSample { image, label: label.clone() })
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Sorted `*.png` file names in `dir`.
pub fn list_image_names(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Cannot read directory '{}'", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::transform::TransformMode;
    use image::Rgb;

    fn write_png(dir: &Path, name: &str) {
        RgbImage::from_pixel(8, 4, Rgb([255, 255, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_get_returns_transformed_image_and_label() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "s1&37.png");
        write_png(dir.path(), "s2&no.png");

        let names = list_image_names(dir.path()).unwrap();
        assert_eq!(names, vec!["s1&37.png", "s2&no.png"]);

        let transform = ImageTransform::new(TransformMode::Eval, 4, 8);
        let ds = EventImageDataset::open(dir.path(), &names, transform).unwrap();
        assert_eq!(ds.len(), 2);

        let s = ds.get(0).unwrap();
        assert_eq!(s.label, "37");
        assert_eq!(s.image.len(), 3 * 4 * 8);
        // white pixel, red channel: (1 - 0.485) / 0.229
        assert!((s.image[0] - (1.0 - 0.485) / 0.229).abs() < 1e-4);
        assert_eq!(ds.get(1).unwrap().label, "no");
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_open_rejects_unlabelled_names() {
        let transform = ImageTransform::new(TransformMode::Eval, 4, 8);
        let names = vec!["nolabel.png".to_string()];
        assert!(EventImageDataset::open("/tmp", &names, transform).is_err());
    }

    #[test]
    fn test_open_fails_on_corrupt_image() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            write_png(dir.path(), &format!("s{i}&1{i}.png"));
        }
        fs::write(dir.path().join("s1&11.png"), b"not a png").unwrap();

        let names = list_image_names(dir.path()).unwrap();
        let transform = ImageTransform::new(TransformMode::Eval, 4, 8);
        let err = EventImageDataset::open(dir.path(), &names, transform).unwrap_err();
        assert!(format!("{err:#}").contains("s1&11.png"));
    }

    #[test]
    fn test_loader_sees_every_sample() {
        use crate::data::batcher::CrnnBatcher;
        use burn::backend::NdArray;
        use burn::data::dataloader::DataLoaderBuilder;

        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            write_png(dir.path(), &format!("s{i}&1{i}.png"));
        }
        let names = list_image_names(dir.path()).unwrap();
        let transform = ImageTransform::new(TransformMode::Eval, 4, 8);
        let ds = EventImageDataset::open(dir.path(), &names, transform).unwrap();

        let batcher = CrnnBatcher::<NdArray>::new(Default::default(), 4, 8);
        let loader = DataLoaderBuilder::new(batcher).batch_size(2).build(ds);
        let seen: usize = loader.iter().map(|b| b.labels.len()).sum();
        assert_eq!(seen, 6);
    }
}
