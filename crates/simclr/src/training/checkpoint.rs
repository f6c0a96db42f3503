//! Checkpoint records: model weights, optimizer state, and run metadata.
//!
//! Layout of `<run_dir>/checkpoint_NNNN/`:
//! - `model.mpk` model record
//! - `optimizer.mpk` optimizer record
//! - `meta.json` [`CheckpointMeta`]
//!
//! Files are written into `checkpoint_NNNN.tmp/` and the directory is renamed
//! once all three are on disk.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;

/// Metadata stored next to the weights.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMeta {
    /// Epochs completed when the checkpoint was written.
    pub epoch: usize,
    /// Architecture identifier from the run config.
    pub arch: String,
    /// Optimizer steps taken.
    pub global_step: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("recorder error at {path}: {message}")]
    Recorder { path: PathBuf, message: String },

    #[error("invalid checkpoint metadata: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Deterministic checkpoint directory name for an epoch count.
pub fn checkpoint_name(epoch: usize) -> String {
    format!("checkpoint_{epoch:04}")
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Write model, optimizer, and metadata under `run_dir`.
///
/// Returns the final checkpoint directory. An existing checkpoint with the
/// same name is replaced only after the new one is fully written.
pub fn save_checkpoint<B, M, O>(
    run_dir: &Path,
    meta: &CheckpointMeta,
    model: &M,
    optimizer: &O,
) -> Result<PathBuf, CheckpointError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let name = checkpoint_name(meta.epoch);
    let final_dir = run_dir.join(&name);
    let tmp_dir = run_dir.join(format!("{name}.tmp"));
    if tmp_dir.exists() {
        std::fs::remove_dir_all(&tmp_dir)?;
    }
    std::fs::create_dir_all(&tmp_dir)?;

    let model_path = tmp_dir.join("model");
    model
        .clone()
        .save_file(model_path.clone(), &recorder())
        .map_err(|e| CheckpointError::Recorder {
            path: model_path,
            message: e.to_string(),
        })?;

    let optim_path = tmp_dir.join("optimizer");
    Recorder::<B>::record(&recorder(), optimizer.to_record(), optim_path.clone())
        .map_err(|e| CheckpointError::Recorder {
            path: optim_path,
            message: e.to_string(),
        })?;

    let meta_file = std::fs::File::create(tmp_dir.join("meta.json"))?;
    serde_json::to_writer_pretty(meta_file, meta)?;

    // Keep the previous checkpoint until the new one is in place.
    let old_dir = run_dir.join(format!("{name}.old"));
    let replaced = final_dir.exists();
    if replaced {
        if old_dir.exists() {
            std::fs::remove_dir_all(&old_dir)?;
        }
        std::fs::rename(&final_dir, &old_dir)?;
    }
    if let Err(e) = std::fs::rename(&tmp_dir, &final_dir) {
        if replaced {
            let _ = std::fs::rename(&old_dir, &final_dir);
        }
        return Err(e.into());
    }
    if replaced {
        std::fs::remove_dir_all(&old_dir)?;
    }

    tracing::info!(
        path = %final_dir.display(),
        epoch = meta.epoch,
        global_step = meta.global_step,
        "Checkpoint saved (model + optimizer + meta)"
    );
    Ok(final_dir)
}

/// Read `meta.json` from a checkpoint directory.
pub fn load_meta(dir: &Path) -> Result<CheckpointMeta, CheckpointError> {
    let file = std::fs::File::open(dir.join("meta.json"))?;
    Ok(serde_json::from_reader(file)?)
}

/// Load saved weights on top of a freshly initialized model.
pub fn load_model<B: Backend, M: Module<B>>(
    dir: &Path,
    model: M,
    device: &B::Device,
) -> Result<M, CheckpointError> {
    let path = dir.join("model");
    model
        .load_file(path.clone(), &recorder(), device)
        .map_err(|e| CheckpointError::Recorder {
            path,
            message: e.to_string(),
        })
}

/// Restore optimizer state saved by [`save_checkpoint`].
pub fn load_optimizer<B, M, O>(dir: &Path, optimizer: O, device: &B::Device) -> Result<O, CheckpointError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let path = dir.join("optimizer");
    let record = Recorder::<B>::load(&recorder(), path.clone(), device).map_err(|e| {
        CheckpointError::Recorder {
            path,
            message: e.to_string(),
        }
    })?;
    Ok(optimizer.load_record(record))
}
