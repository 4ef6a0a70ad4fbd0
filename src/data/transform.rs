// ============================================================
// Layer 4 — Image Transform Pipeline
// ============================================================
// Converts a decoded RGB plot into the normalised CHW floats the
// backbone expects. Stages run in a fixed order:
//
//   1. resize            → configured (height, width), only if needed
//   2. horizontal flip   → p = 0.5, training mode only
//   3. to tensor         → u8 HWC → f32 CHW in [0, 1]
//   4. normalise         → (x - mean[c]) / std[c]
//
// The mean/std are the ImageNet statistics the ResNet backbone
// was pretrained with.

use image::{imageops, RgbImage};
use rand::Rng;

pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];
pub const FLIP_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// Random augmentation enabled
    Train,
    /// Deterministic
    Eval,
}

#[derive(Debug, Clone)]
pub struct ImageTransform {
    pub mode: TransformMode,
    pub height: usize,
    pub width: usize,
}

impl ImageTransform {
    pub fn new(mode: TransformMode, height: usize, width: usize) -> Self {
        Self { mode, height, width }
    }

    /// Number of floats produced per image
    pub fn output_len(&self) -> usize {
        3 * self.height * self.width
    }

    pub fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> Vec<f32> {
        let image = self.resize(image);
        let image = match self.mode {
            TransformMode::Train if rng.gen_bool(FLIP_PROBABILITY) => {
                imageops::flip_horizontal(&image)
            }
            _ => image,
        };
        normalize(to_chw(&image))
    }

    fn resize(&self, image: RgbImage) -> RgbImage {
        let (w, h) = (self.width as u32, self.height as u32);
        if image.dimensions() == (w, h) {
            image
        } else {
            imageops::resize(&image, w, h, imageops::FilterType::Triangle)
        }
    }
}

/// HWC u8 → CHW f32 in [0, 1]
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let plane = (w * h) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (x, y, px) in image.enumerate_pixels() {
        let offset = (y * w + x) as usize;
        for c in 0..3 {
            out[c * plane + offset] = px[c] as f32 / 255.0;
        }
    }
    out
}

/// In-place channel normalisation of a CHW buffer
pub fn normalize(mut chw: Vec<f32>) -> Vec<f32> {
    let plane = chw.len() / 3;
    for (c, channel) in chw.chunks_mut(plane.max(1)).enumerate().take(3) {
        for v in channel {
            *v = (*v - MEAN[c]) / STD[c];
        }
    }
    chw
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::{rngs::StdRng, SeedableRng};

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| Rgb([(x * 10) as u8, 0, 255]))
    }

    #[test]
    fn test_to_chw_layout() {
        let img = RgbImage::from_fn(2, 1, |x, _| Rgb([x as u8 * 255, 0, 51]));
        let chw = to_chw(&img);
        // R plane, G plane, B plane
        assert_eq!(chw, vec![0.0, 1.0, 0.0, 0.0, 0.2, 0.2]);
    }

    #[test]
    fn test_normalize_uses_channel_stats() {
        let out = normalize(vec![MEAN[0], 1.0, MEAN[2]]);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - (1.0 - MEAN[1]) / STD[1]).abs() < 1e-6);
        assert!(out[2].abs() < 1e-6);
    }

    #[test]
    fn test_eval_mode_never_flips() {
        let t = ImageTransform::new(TransformMode::Eval, 1, 4);
        let mut rng = StdRng::seed_from_u64(7);
        let first = t.apply(gradient(4, 1), &mut rng);
        for _ in 0..20 {
            assert_eq!(t.apply(gradient(4, 1), &mut rng), first);
        }
    }

    #[test]
    fn test_train_mode_flips_sometimes() {
        let t = ImageTransform::new(TransformMode::Train, 1, 4);
        let eval = ImageTransform::new(TransformMode::Eval, 1, 4);
        let mut rng = StdRng::seed_from_u64(3);
        let plain = eval.apply(gradient(4, 1), &mut rng);
        let flipped: Vec<bool> = (0..40)
            .map(|_| t.apply(gradient(4, 1), &mut rng) != plain)
            .collect();
        assert!(flipped.iter().any(|&f| f));
        assert!(flipped.iter().any(|&f| !f));
    }

    #[test]
    fn test_resizes_to_configured_shape() {
        let t = ImageTransform::new(TransformMode::Eval, 5, 8);
        let out = t.apply(gradient(16, 10), &mut StdRng::seed_from_u64(0));
        assert_eq!(out.len(), t.output_len());
    }
}
