//! Model collaborator interface, the default projection encoder, and the
//! host/tensor bridge.

pub mod bridge;
pub mod projection;

use burn::prelude::*;

/// Anything that maps a flat image batch to one embedding row per image.
///
/// Input shape: `(rows, C, H, W)`. Output shape: `(rows, D)`.
pub trait ContrastiveEncoder<B: Backend> {
    fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}
