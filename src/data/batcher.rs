// ============================================================
// Layer 4 — Batchers
// ============================================================
// Implement Burn's Batcher trait to stack EventSamples into
// device tensors.
//
//   CrnnBatcher  → images [N, 3, H, W] + label strings
//                  (labels are encoded later, by the CTC codec)
//   HeadsBatcher → images [N, 3, H, W] + targets [N, heads]
//
// Every sample image is already resized to (H, W) by the
// transform, so stacking is a flat copy plus a reshape.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::EventSample;
use crate::domain::label::{head_targets, NO_EVENT_CLASS};

/// A CTC training batch
#[derive(Debug, Clone)]
pub struct CrnnBatch<B: Backend> {
    /// [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Ground truth label codes, in batch order
    pub labels: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct CrnnBatcher<B: Backend> {
    pub device: B::Device,
    pub height: usize,
    pub width: usize,
}

impl<B: Backend> CrnnBatcher<B> {
    pub fn new(device: B::Device, height: usize, width: usize) -> Self {
        Self { device, height, width }
    }
}

impl<B: Backend> Batcher<EventSample, CrnnBatch<B>> for CrnnBatcher<B> {
    fn batch(&self, items: Vec<EventSample>) -> CrnnBatch<B> {
        let images = stack_images(&items, self.height, self.width, &self.device);
        let labels = items.into_iter().map(|s| s.label).collect();
        CrnnBatch { images, labels }
    }
}

/// A multi-head classification batch
#[derive(Debug, Clone)]
pub struct HeadsBatch<B: Backend> {
    /// [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// [batch_size, heads], one class index per head
    pub targets: Tensor<B, 2, Int>,
}

#[derive(Clone, Debug)]
pub struct HeadsBatcher<B: Backend> {
    pub device: B::Device,
    pub height: usize,
    pub width: usize,
    pub heads: usize,
}

impl<B: Backend> HeadsBatcher<B> {
    pub fn new(device: B::Device, height: usize, width: usize, heads: usize) -> Self {
        Self { device, height, width, heads }
    }
}

impl<B: Backend> Batcher<EventSample, HeadsBatch<B>> for HeadsBatcher<B> {
    fn batch(&self, items: Vec<EventSample>) -> HeadsBatch<B> {
        let images = stack_images(&items, self.height, self.width, &self.device);

        // Labels are validated before training starts; anything that
        // still fails to parse is counted as no-event.
        let targets: Vec<i64> = items
            .iter()
            .flat_map(|s| {
                head_targets(&s.label, self.heads).unwrap_or_else(|e| {
                    tracing::error!("{e:#}");
                    vec![NO_EVENT_CLASS; self.heads]
                })
            })
            .map(|c| c as i64)
            .collect();
        let targets = Tensor::<B, 2, Int>::from_data(
            TensorData::new(targets, [items.len(), self.heads]),
            &self.device,
        );

        HeadsBatch { images, targets }
    }
}

fn stack_images<B: Backend>(
    items: &[EventSample],
    height: usize,
    width: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let flat: Vec<f32> = items.iter().flat_map(|s| s.image.iter().copied()).collect();
    Tensor::<B, 4>::from_data(TensorData::new(flat, [items.len(), 3, height, width]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn sample(value: f32, label: &str) -> EventSample {
        EventSample { image: vec![value; 3 * 2 * 4], label: label.to_string() }
    }

    #[test]
    fn test_crnn_batch_shapes() {
        let batcher = CrnnBatcher::<TestBackend>::new(Default::default(), 2, 4);
        let batch = batcher.batch(vec![sample(0.0, "37"), sample(1.0, "no")]);
        assert_eq!(batch.images.dims(), [2, 3, 2, 4]);
        assert_eq!(batch.labels, vec!["37".to_string(), "no".to_string()]);

        let second: Vec<f32> = batch.images.slice([1..2]).into_data().to_vec().unwrap();
        assert!(second.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_heads_batch_targets() {
        let batcher = HeadsBatcher::<TestBackend>::new(Default::default(), 2, 4, 2);
        let batch = batcher.batch(vec![sample(0.0, "37"), sample(0.0, "no")]);
        assert_eq!(batch.targets.dims(), [2, 2]);
        let t: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(t, vec![3, 7, 10, 10]);
    }
}
