//! InfoNCE pair construction and the default cross-entropy criterion.
//!
//! A flattened batch stacks `n_views` blocks of `batch_size` embeddings, so row
//! `r` belongs to source image `r % batch_size`. Every other row with the same
//! source is a positive; all remaining rows are negatives. The self-similarity
//! on the diagonal is dropped, leaving `rows - 1` candidates per row with the
//! positives placed first.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::ConfigError;

/// Row bookkeeping for a flattened `(n_views * batch_size, D)` feature batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairLayout {
    batch_size: usize,
    n_views: usize,
}

impl PairLayout {
    /// Validate the batch geometry. At least two views are needed for a positive.
    pub fn new(batch_size: usize, n_views: usize) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::BatchSize(batch_size));
        }
        if n_views < 2 {
            return Err(ConfigError::TooFewViews(n_views));
        }
        Ok(Self {
            batch_size,
            n_views,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn n_views(&self) -> usize {
        self.n_views
    }

    /// Total rows in the flattened batch (`N * B`).
    pub fn rows(&self) -> usize {
        self.batch_size * self.n_views
    }

    /// Candidates per row after removing the diagonal (`N * B - 1`).
    pub fn candidates(&self) -> usize {
        self.rows() - 1
    }

    pub fn positives_per_row(&self) -> usize {
        self.n_views - 1
    }

    pub fn negatives_per_row(&self) -> usize {
        self.rows() - self.n_views
    }

    /// Source image index of every row: `0..B` tiled `N` times.
    pub fn source_ids(&self) -> Vec<usize> {
        (0..self.n_views)
            .flat_map(|_| 0..self.batch_size)
            .collect()
    }

    /// Same-source mask with the diagonal removed, shape `(rows, rows - 1)`.
    pub fn label_mask(&self) -> Vec<Vec<bool>> {
        let ids = self.source_ids();
        ids.iter()
            .enumerate()
            .map(|(i, src)| {
                ids.iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, other)| other == src)
                    .collect()
            })
            .collect()
    }

    /// Column of the full similarity matrix feeding each logit, row-major.
    ///
    /// Per row: positives in ascending column order, then negatives in
    /// ascending column order. Shape `(rows, rows - 1)` when reshaped.
    pub fn gather_columns(&self) -> Vec<i64> {
        let rows = self.rows();
        let mut columns = Vec::with_capacity(rows * self.candidates());
        for i in 0..rows {
            let src = i % self.batch_size;
            let (positives, negatives): (Vec<usize>, Vec<usize>) = (0..rows)
                .filter(|&j| j != i)
                .partition(|&j| j % self.batch_size == src);
            columns.extend(positives.into_iter().map(|j| j as i64));
            columns.extend(negatives.into_iter().map(|j| j as i64));
        }
        columns
    }
}

/// L2-normalize each row. Rows with zero norm stay zero.
pub fn l2_normalize<B: Backend>(features: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = features
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .sqrt()
        .clamp_min(1e-12);
    features / norm
}

/// Full pairwise cosine similarity matrix `(rows, rows)`.
pub fn cosine_similarity_matrix<B: Backend>(features: Tensor<B, 2>) -> Tensor<B, 2> {
    let normalized = l2_normalize(features);
    normalized.clone().matmul(normalized.transpose())
}

/// Build InfoNCE logits and labels from a flattened feature batch.
///
/// # Arguments
/// - `features`: shape `(n_views * batch_size, D)`
/// - `layout`: batch geometry
/// - `temperature`: divisor applied to the cosine similarities, must be > 0
///
/// # Returns
/// `(logits, labels)` with logits of shape `(rows, rows - 1)`, positives
/// first, and labels an all-zero Int vector of length `rows`.
pub fn info_nce_logits<B: Backend>(
    features: Tensor<B, 2>,
    layout: &PairLayout,
    temperature: f64,
) -> Result<(Tensor<B, 2>, Tensor<B, 1, Int>), ConfigError> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(ConfigError::Temperature(temperature));
    }
    let [rows, _dim] = features.dims();
    if rows != layout.rows() {
        return Err(ConfigError::FeatureRows {
            expected: layout.rows(),
            got: rows,
        });
    }

    let device = features.device();
    let similarity = cosine_similarity_matrix(features); // (rows, rows)

    let columns = Tensor::<B, 2, Int>::from_data(
        TensorData::new(layout.gather_columns(), [rows, layout.candidates()]),
        &device,
    );
    let logits = similarity.gather(1, columns).div_scalar(temperature);
    let labels = Tensor::<B, 1, Int>::zeros([rows], &device);

    Ok((logits, labels))
}

/// Default criterion: multi-class cross-entropy over positive-vs-negatives logits.
///
/// Returns a scalar loss tensor of shape `(1,)`.
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let device = logits.device();
    CrossEntropyLossConfig::new()
        .init(&device)
        .forward(logits, labels)
}
