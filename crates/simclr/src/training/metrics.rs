//! Top-k accuracy of the positive logit and per-step / per-epoch summaries.

use burn::prelude::*;

use crate::model::bridge::tensor_to_rows;

/// Result of one optimizer step, returned by value from `train_step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    /// Criterion value before the backward pass.
    pub loss: f64,
    /// Percentage of rows whose positive logit ranks first.
    pub top1: f64,
    /// Percentage of rows whose positive logit ranks in the top five.
    pub top5: f64,
    /// False when the scaled strategy skipped the update on overflow.
    pub applied: bool,
    /// Global L2 norm of the unscaled gradients.
    pub grad_norm: f64,
}

/// Top-k accuracy (in percent) of label 0 for a `(rows, candidates)` logits tensor.
///
/// A row counts as correct at `k` when fewer than `k` candidates score strictly
/// above the positive logit at column 0. `k` larger than the candidate count
/// always counts as correct.
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, topk: &[usize]) -> Vec<f64> {
    let [rows, cols] = logits.dims();
    if rows == 0 || cols == 0 {
        return vec![0.0; topk.len()];
    }

    let ranks: Vec<usize> = tensor_to_rows(logits)
        .iter()
        .map(|row| {
            let positive = row[0];
            row[1..].iter().filter(|&&v| v > positive).count()
        })
        .collect();

    topk.iter()
        .map(|&k| {
            let correct = ranks.iter().filter(|&&rank| rank < k).count();
            correct as f64 * 100.0 / rows as f64
        })
        .collect()
}

/// Aggregated view of one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub steps: usize,
    pub skipped_steps: usize,
    pub mean_loss: f64,
    pub mean_top1: f64,
    pub mean_top5: f64,
    /// Output of the final step in the epoch.
    pub last: StepOutput,
}

/// Running average accumulator over the steps of an epoch.
#[derive(Debug, Default)]
pub struct RunningAvg {
    loss: f64,
    top1: f64,
    top5: f64,
    skipped: usize,
    count: usize,
    last: Option<StepOutput>,
}

impl RunningAvg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, step: &StepOutput) {
        self.loss += step.loss;
        self.top1 += step.top1;
        self.top5 += step.top5;
        if !step.applied {
            self.skipped += 1;
        }
        self.count += 1;
        self.last = Some(*step);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Summarize the accumulated steps; `None` when the epoch had no batches.
    pub fn summary(&self, epoch: usize) -> Option<EpochSummary> {
        let last = self.last?;
        let n = self.count as f64;
        Some(EpochSummary {
            epoch,
            steps: self.count,
            skipped_steps: self.skipped,
            mean_loss: self.loss / n,
            mean_top1: self.top1 / n,
            mean_top5: self.top5 / n,
            last,
        })
    }
}
