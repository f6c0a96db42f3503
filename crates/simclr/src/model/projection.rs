use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::model::ContrastiveEncoder;

/// Configuration for the default `ProjectionEncoder`.
///
/// ```text
/// (batch, C, H, W) → flatten → (batch, d_input)
///   → Linear(d_input→d_hidden) → ReLU          (backbone)
///   → Linear(d_hidden→d_hidden) → ReLU
///   → Linear(d_hidden→d_out)                   (projection head)
///   → embedding: (batch, d_out)
/// ```
#[derive(Config, Debug)]
pub struct ProjectionEncoderConfig {
    /// Flattened image size `C * H * W`.
    pub d_input: usize,
    /// Backbone and head hidden width.
    #[config(default = 512)]
    pub d_hidden: usize,
    /// Embedding dimension fed to the contrastive loss.
    #[config(default = 128)]
    pub d_out: usize,
}

/// MLP backbone followed by a two-layer projection head.
#[derive(Module, Debug)]
pub struct ProjectionEncoder<B: Backend> {
    backbone: Linear<B>,
    head_hidden: Linear<B>,
    head_out: Linear<B>,
    activation: Relu,
}

impl ProjectionEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ProjectionEncoder<B> {
        ProjectionEncoder {
            backbone: LinearConfig::new(self.d_input, self.d_hidden).init(device),
            head_hidden: LinearConfig::new(self.d_hidden, self.d_hidden).init(device),
            head_out: LinearConfig::new(self.d_hidden, self.d_out).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ProjectionEncoder<B> {
    /// Input shape: `(batch, d_input)`. Output shape: `(batch, d_out)`.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.backbone.forward(x));
        let x = self.activation.forward(self.head_hidden.forward(x));
        self.head_out.forward(x)
    }
}

impl<B: Backend> ContrastiveEncoder<B> for ProjectionEncoder<B> {
    fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images.flatten::<2>(1, 3))
    }
}
