//! Tensor bridge: host `Vec<f32>` buffers to burn tensors and back.
//!
//! Loaders produce plain `f32` pixel buffers; the encoder needs
//! `Tensor<B, 4>` image batches, and metrics read embeddings back as rows.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Convert a batch of flat image buffers into a `(batch, C, H, W)` tensor.
///
/// # Panics
/// Panics if `images` is empty or any buffer length differs from `C * H * W`.
pub fn images_to_tensor<B: Backend>(
    images: &[Vec<f32>],
    shape: [usize; 3],
    device: &B::Device,
) -> Tensor<B, 4> {
    assert!(!images.is_empty(), "images must not be empty");
    let [c, h, w] = shape;
    let pixels = c * h * w;
    assert!(pixels > 0, "image shape must be non-empty");
    for (i, img) in images.iter().enumerate() {
        assert_eq!(
            img.len(),
            pixels,
            "image {i} has {} values, expected {pixels}",
            img.len()
        );
    }

    let flat: Vec<f32> = images.iter().flat_map(|v| v.iter().copied()).collect();
    Tensor::from_data(TensorData::new(flat, [images.len(), c, h, w]), device)
}

/// Read a 2D tensor back as one `Vec<f32>` per row.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, cols] = tensor.dims();
    if cols == 0 {
        return Vec::new();
    }
    let flat: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .unwrap_or_default();
    flat.chunks(cols).map(|c| c.to_vec()).collect()
}
