//! Integration tests for the SimCLR crate.
//!
//! These tests drive the full training loop: synthetic multi-view loader →
//! encoder → InfoNCE → optimizer → tracker → checkpoint. All use the NdArray
//! backend, synthetic data, and in-memory trackers.

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::module::Param;
use burn::optim::{AdamWConfig, SgdConfig};
use burn::prelude::*;
use tempfile::TempDir;

use simclr::model::projection::ProjectionEncoderConfig;
use simclr::tracking::mocks::{FailingTracker, RecordingTracker, TrackerEvent};
use simclr::training::checkpoint::{load_meta, load_model};
use simclr::training::data::{SyntheticDataConfig, SyntheticViewLoader, ViewLoader};
use simclr::training::loss::cross_entropy;
use simclr::training::schedule::{ConstantLr, EpochScheduler};
use simclr::{train, ConfigError, ContrastiveEncoder, RunContext, SimClrConfig, TrainError};

type TestAutodiffBackend = Autodiff<NdArray<f32>>;

/// Stub encoder: the (fixed-seed random) image pixels times one learnable scale.
#[derive(Module, Debug)]
struct StubEncoder<B: Backend> {
    scale: Param<Tensor<B, 1>>,
}

impl<B: Backend> StubEncoder<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            scale: Param::from_tensor(Tensor::ones([1], device)),
        }
    }
}

impl<B: Backend> ContrastiveEncoder<B> for StubEncoder<B> {
    fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        images.flatten::<2>(1, 3) * self.scale.val().unsqueeze::<2>()
    }
}

/// Scheduler that counts how often it was advanced.
struct CountingScheduler {
    steps: usize,
}

impl EpochScheduler for CountingScheduler {
    fn step(&mut self) {
        self.steps += 1;
    }

    fn lr(&self) -> f64 {
        0.0
    }
}

fn synthetic_loader(
    num_images: usize,
    batch_size: usize,
    n_views: usize,
    seed: u64,
) -> SyntheticViewLoader<TestAutodiffBackend> {
    let config = SyntheticDataConfig::new()
        .with_num_images(num_images)
        .with_batch_size(batch_size)
        .with_n_views(n_views)
        .with_shape([1, 2, 2])
        .with_noise(0.05)
        .with_seed(seed);
    SyntheticViewLoader::new(config, &Default::default())
}

fn small_config(epochs: usize, log_every: usize) -> SimClrConfig {
    SimClrConfig::new()
        .with_batch_size(4)
        .with_n_views(2)
        .with_temperature(0.5)
        .with_train_epochs(epochs)
        .with_log_every_n_steps(log_every)
        .with_arch("stub".to_string())
        .with_project("integration".to_string())
}

fn checkpoint_dirs(run_dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(run_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("checkpoint_"))
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Test 1: two-epoch run with stub collaborators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_epoch_run_logs_and_checkpoints() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let config = small_config(2, 3);

    let tracker = RecordingTracker::new();
    let mut ctx = RunContext::start(tmp.path(), &config, Box::new(tracker.clone()))
        .await
        .unwrap();

    let model = StubEncoder::<TestAutodiffBackend>::new(&device);
    let mut optimizer = SgdConfig::new().init();
    let mut scheduler = ConstantLr(0.0);
    // 12 images / batch 4 = 3 steps per epoch, 6 steps total
    let mut loader = synthetic_loader(12, 4, 2, 42);

    let outcome = train(
        &config,
        model,
        &mut optimizer,
        &mut scheduler,
        &mut loader,
        &cross_entropy,
        &mut ctx,
    )
    .await
    .unwrap();
    ctx.finish().await;

    assert_eq!(outcome.global_step, 6);
    assert_eq!(outcome.epochs.len(), 2);
    assert!(outcome.epochs.iter().all(|e| e.steps == 3 && e.skipped_steps == 0));

    // Steps 0 and 3 hit the logging interval
    let metrics = tracker.metrics();
    assert_eq!(metrics.len(), 2, "expected one event per interval, got {metrics:?}");
    assert_eq!(metrics[0].global_step, 0);
    assert_eq!(metrics[1].global_step, 3);
    for m in &metrics {
        assert!(m.loss.is_finite());
        assert!((0.0..=100.0).contains(&m.top1));
        assert!(m.top5 >= m.top1);
        assert!(m.grad_norm.is_finite() && m.grad_norm >= 0.0, "grad_norm = {}", m.grad_norm);
        // lr 0 leaves the single scale parameter at 1
        assert!((m.param_norm - 1.0).abs() < 1e-6, "param_norm = {}", m.param_norm);
    }

    // Exactly one checkpoint carrying the final epoch count
    assert_eq!(checkpoint_dirs(tmp.path()), vec!["checkpoint_0002".to_string()]);
    let meta = load_meta(&outcome.checkpoint).unwrap();
    assert_eq!(meta.epoch, 2);
    assert_eq!(meta.arch, "stub");
    assert_eq!(meta.global_step, 6);
    assert_eq!(tracker.artifacts(), vec![outcome.checkpoint.clone()]);

    let events = tracker.events();
    assert!(matches!(events.first(), Some(TrackerEvent::Start { .. })));
    assert_eq!(events.last(), Some(&TrackerEvent::Finish));
}

// ---------------------------------------------------------------------------
// Test 2: tracker failures never abort training
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unreachable_tracker_still_checkpoints() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let config = small_config(1, 1);

    let mut ctx = RunContext::start(tmp.path(), &config, Box::new(FailingTracker))
        .await
        .unwrap();

    let mut optimizer = SgdConfig::new().init();
    let outcome = train(
        &config,
        StubEncoder::<TestAutodiffBackend>::new(&device),
        &mut optimizer,
        &mut ConstantLr(0.01),
        &mut synthetic_loader(8, 4, 2, 1),
        &cross_entropy,
        &mut ctx,
    )
    .await
    .unwrap();

    // start + 2 metric events + artifact
    assert_eq!(ctx.tracker_failures(), 4);
    assert!(outcome.checkpoint.join("model.mpk").exists());
    assert!(outcome.checkpoint.join("optimizer.mpk").exists());
    assert_eq!(load_meta(&outcome.checkpoint).unwrap().epoch, 1);
}

#[tokio::test]
async fn test_checkpoint_write_failure_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let config = small_config(1, 1);
    // A regular file where the staging directory goes makes the save fail.
    std::fs::write(tmp.path().join("checkpoint_0001.tmp"), b"not a directory").unwrap();

    let tracker = RecordingTracker::new();
    let mut ctx = RunContext::start(tmp.path(), &config, Box::new(tracker.clone()))
        .await
        .unwrap();
    let mut optimizer = SgdConfig::new().init();

    let result = train(
        &config,
        StubEncoder::<TestAutodiffBackend>::new(&device),
        &mut optimizer,
        &mut ConstantLr(0.01),
        &mut synthetic_loader(8, 4, 2, 2),
        &cross_entropy,
        &mut ctx,
    )
    .await;

    assert!(matches!(result, Err(TrainError::Checkpoint(_))));
    assert!(!tmp.path().join("checkpoint_0001").exists());
    assert!(tracker.artifacts().is_empty(), "nothing to mirror after a failed save");
    // training itself ran before the save
    assert_eq!(tracker.metrics().len(), 2);
}

// ---------------------------------------------------------------------------
// Test 3: scheduler advances once per epoch, only after warm-up
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scheduler_suppressed_during_warmup() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let config = small_config(4, 100).with_warmup_epochs(1);

    let mut ctx = RunContext::start(tmp.path(), &config, Box::new(RecordingTracker::new()))
        .await
        .unwrap();
    let mut scheduler = CountingScheduler { steps: 0 };
    let mut optimizer = SgdConfig::new().init();

    train(
        &config,
        StubEncoder::<TestAutodiffBackend>::new(&device),
        &mut optimizer,
        &mut scheduler,
        &mut synthetic_loader(12, 4, 2, 3),
        &cross_entropy,
        &mut ctx,
    )
    .await
    .unwrap();

    // 4 epochs, epoch 0 is warm-up, 12 steps total: advanced 3 times, not per step
    assert_eq!(scheduler.steps, 3);
}

// ---------------------------------------------------------------------------
// Test 4: invalid configuration fails before training starts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_view_config_rejected_before_training() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let config = small_config(2, 1).with_n_views(1);

    let tracker = RecordingTracker::new();
    let mut ctx = RunContext::start(tmp.path(), &config, Box::new(tracker.clone()))
        .await
        .unwrap();
    let mut optimizer = SgdConfig::new().init();

    let result = train(
        &config,
        StubEncoder::<TestAutodiffBackend>::new(&device),
        &mut optimizer,
        &mut ConstantLr(0.1),
        &mut synthetic_loader(8, 4, 1, 0),
        &cross_entropy,
        &mut ctx,
    )
    .await;

    assert!(matches!(result, Err(TrainError::Config(ConfigError::TooFewViews(1)))));
    assert!(tracker.metrics().is_empty());
    assert!(checkpoint_dirs(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_batch_size_mismatch_is_config_error() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    // Loader serves 3 images per batch but the run expects 4
    let config = small_config(1, 1);

    let mut ctx = RunContext::start(tmp.path(), &config, Box::new(RecordingTracker::new()))
        .await
        .unwrap();
    let mut optimizer = SgdConfig::new().init();

    let result = train(
        &config,
        StubEncoder::<TestAutodiffBackend>::new(&device),
        &mut optimizer,
        &mut ConstantLr(0.1),
        &mut synthetic_loader(6, 3, 2, 0),
        &cross_entropy,
        &mut ctx,
    )
    .await;

    assert!(matches!(
        result,
        Err(TrainError::Config(ConfigError::FeatureRows { expected: 8, got: 6 }))
    ));
}

// ---------------------------------------------------------------------------
// Test 5: real encoder learns; checkpoint reloads into a fresh model
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_projection_encoder_loss_decreases() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let config = SimClrConfig::new()
        .with_batch_size(8)
        .with_n_views(2)
        .with_temperature(0.5)
        .with_train_epochs(15)
        .with_log_every_n_steps(5)
        .with_warmup_epochs(100);

    let encoder_config = ProjectionEncoderConfig::new(16).with_d_hidden(32).with_d_out(16);
    let model = encoder_config.init::<TestAutodiffBackend>(&device);
    let mut optimizer = AdamWConfig::new().with_weight_decay(0.0).init();

    let data = SyntheticDataConfig::new()
        .with_num_images(16)
        .with_batch_size(8)
        .with_n_views(2)
        .with_shape([1, 4, 4])
        .with_noise(0.05)
        .with_seed(11);
    let mut loader = SyntheticViewLoader::<TestAutodiffBackend>::new(data, &device);
    assert_eq!(loader.len(), 2);

    let tracker = RecordingTracker::new();
    let mut ctx = RunContext::start(tmp.path(), &config, Box::new(tracker.clone()))
        .await
        .unwrap();
    let outcome = train(
        &config,
        model,
        &mut optimizer,
        &mut ConstantLr(1e-2),
        &mut loader,
        &cross_entropy,
        &mut ctx,
    )
    .await
    .unwrap();

    let first = outcome.epochs.first().unwrap().mean_loss;
    let last = outcome.epochs.last().unwrap().mean_loss;
    assert!(
        last < first,
        "loss should decrease with training: first={first}, last={last}"
    );

    // 30 steps, logged every 5: parameter and gradient norms ride along
    let metrics = tracker.metrics();
    assert_eq!(metrics.len(), 6);
    assert!(metrics.iter().all(|m| m.grad_norm.is_finite() && m.grad_norm > 0.0));
    assert!(metrics.iter().all(|m| m.param_norm > 0.0));

    let fresh = encoder_config.init::<TestAutodiffBackend>(&device);
    let restored = load_model(&outcome.checkpoint, fresh, &device).unwrap();
    let input = Tensor::<TestAutodiffBackend, 4>::ones([2, 1, 4, 4], &device);
    let a: Vec<f32> = outcome.model.embed(input.clone()).into_data().to_vec().unwrap();
    let b: Vec<f32> = restored.embed(input).into_data().to_vec().unwrap();
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-5, "restored model differs: {x} vs {y}");
    }
}

// ---------------------------------------------------------------------------
// Test 6: loss-scaled strategy trains without skipping on f32
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fp16_strategy_runs() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let config = small_config(2, 2).with_fp16_precision(true);

    let tracker = RecordingTracker::new();
    let mut ctx = RunContext::start(tmp.path(), &config, Box::new(tracker.clone()))
        .await
        .unwrap();
    let mut optimizer = SgdConfig::new().init();

    let outcome = train(
        &config,
        StubEncoder::<TestAutodiffBackend>::new(&device),
        &mut optimizer,
        &mut ConstantLr(0.01),
        &mut synthetic_loader(8, 4, 2, 5),
        &cross_entropy,
        &mut ctx,
    )
    .await
    .unwrap();

    assert_eq!(outcome.global_step, 4);
    assert!(outcome.epochs.iter().all(|e| e.skipped_steps == 0));
    assert_eq!(tracker.metrics().len(), 2);
}
