//! Multi-view batches and the data loader collaborator.
//!
//! A `ViewBatch` holds `n_views` tensors of shape `(B, C, H, W)`, one per
//! augmentation, all indexed by the same source images. The real augmentation
//! pipeline lives outside this crate; `SyntheticViewLoader` stands in for it by
//! perturbing fixed random source images with uniform noise.

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::ConfigError;
use crate::model::bridge::images_to_tensor;

/// One batch: `views[v][i]` is the v-th augmentation of image `i`.
#[derive(Debug, Clone)]
pub struct ViewBatch<B: Backend> {
    pub views: Vec<Tensor<B, 4>>,
    /// Dataset labels, unused by the contrastive objective.
    pub labels: Vec<usize>,
}

impl<B: Backend> ViewBatch<B> {
    pub fn n_views(&self) -> usize {
        self.views.len()
    }

    /// Images per view (B); 0 for an empty batch.
    pub fn batch_size(&self) -> usize {
        self.views.first().map(|v| v.dims()[0]).unwrap_or(0)
    }

    /// Concatenate the views along the batch dimension: `(N * B, C, H, W)`.
    ///
    /// Rows `v * B .. (v + 1) * B` hold view `v`.
    pub fn flatten(self, expected_views: usize) -> Result<Tensor<B, 4>, ConfigError> {
        if self.views.len() != expected_views {
            return Err(ConfigError::ViewCount {
                expected: expected_views,
                got: self.views.len(),
            });
        }
        Ok(Tensor::cat(self.views, 0))
    }
}

/// Data loader collaborator: a finite, lazy sequence of batches per epoch.
pub trait ViewLoader<B: Backend> {
    /// Batches per epoch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a fresh pass over the data.
    fn epoch(&mut self) -> Box<dyn Iterator<Item = ViewBatch<B>> + '_>;
}

/// Configuration for [`SyntheticViewLoader`].
#[derive(Config, Debug)]
pub struct SyntheticDataConfig {
    /// Number of distinct source images.
    #[config(default = 512)]
    pub num_images: usize,
    /// Images per batch; the remainder is dropped.
    #[config(default = 256)]
    pub batch_size: usize,
    /// Augmentations per image.
    #[config(default = 2)]
    pub n_views: usize,
    /// Image shape `[C, H, W]`.
    #[config(default = "[3, 8, 8]")]
    pub shape: [usize; 3],
    /// Half-width of the uniform noise added to each view.
    #[config(default = 0.1)]
    pub noise: f32,
    #[config(default = 0)]
    pub seed: u64,
}

impl SyntheticDataConfig {
    /// Reject shapes and noise levels the loader cannot sample from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape.contains(&0) {
            return Err(ConfigError::ImageShape(self.shape));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize(self.batch_size));
        }
        if !self.noise.is_finite() || self.noise < 0.0 {
            return Err(ConfigError::Noise(self.noise));
        }
        Ok(())
    }
}

/// Loader that serves noisy copies of fixed random source images.
///
/// Batches are drawn in a reshuffled order every epoch and incomplete final
/// batches are dropped, so every batch has exactly `batch_size` images.
pub struct SyntheticViewLoader<B: Backend> {
    config: SyntheticDataConfig,
    sources: Vec<Vec<f32>>,
    rng: StdRng,
    device: B::Device,
}

impl<B: Backend> SyntheticViewLoader<B> {
    pub fn new(config: SyntheticDataConfig, device: &B::Device) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let pixels: usize = config.shape.iter().product();
        let sources = (0..config.num_images)
            .map(|_| (0..pixels).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        Self {
            config,
            sources,
            rng,
            device: device.clone(),
        }
    }

    pub fn config(&self) -> &SyntheticDataConfig {
        &self.config
    }

    fn make_batch(&mut self, indices: &[usize]) -> ViewBatch<B> {
        let noise = self.config.noise;
        let mut views = Vec::with_capacity(self.config.n_views);
        for _ in 0..self.config.n_views {
            let images: Vec<Vec<f32>> = indices
                .iter()
                .map(|&i| {
                    self.sources[i]
                        .iter()
                        .map(|&p| {
                            if noise > 0.0 {
                                p + self.rng.gen_range(-noise..noise)
                            } else {
                                p
                            }
                        })
                        .collect()
                })
                .collect();
            views.push(images_to_tensor::<B>(&images, self.config.shape, &self.device));
        }
        ViewBatch {
            views,
            labels: indices.to_vec(),
        }
    }
}

impl<B: Backend> ViewLoader<B> for SyntheticViewLoader<B> {
    fn len(&self) -> usize {
        if self.config.batch_size == 0 {
            return 0;
        }
        self.config.num_images / self.config.batch_size
    }

    fn epoch(&mut self) -> Box<dyn Iterator<Item = ViewBatch<B>> + '_> {
        let mut order: Vec<usize> = (0..self.config.num_images).collect();
        order.shuffle(&mut self.rng);
        let batch_size = self.config.batch_size;
        let batches = self.len();
        Box::new((0..batches).map(move |b| {
            let indices = &order[b * batch_size..(b + 1) * batch_size];
            self.make_batch(indices)
        }))
    }
}
