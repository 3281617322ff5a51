//! Step execution.
//!
//! Execution is strictly sequential: steps run one at a time in DAG order,
//! each blocking until its commands exit. There is no retry, no rollback and
//! no concurrency between steps — the only parallelism lives inside the
//! compilers a step invokes. The first failure is terminal: it is recorded,
//! every later step is recorded as skipped with the failed dependency named,
//! and execution stops.

pub mod process;
pub mod steps;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{error, info, warn};

use crate::dag::StepDag;
use crate::error::CoreError;
use crate::manifest::Manifest;

pub use steps::execute_step;

/// Errors that can occur during step execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// Command execution failed.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  /// HTTP request failed while fetching a tarball source.
  #[error("fetch failed for {url}: {message}")]
  FetchFailed { url: String, message: String },

  /// SHA-256 mismatch after download.
  #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  /// Repository clone or revision checkout failed.
  #[error("checkout of {url} at {rev} failed: {message}")]
  CheckoutFailed { url: String, rev: String, message: String },

  /// Archive format not supported.
  #[error("unsupported archive: {0}")]
  UnsupportedArchive(String),

  /// A package specifier without a version or revision pin.
  #[error("package specifier is not pinned: {0}")]
  UnpinnedPackage(String),

  /// I/O error during execution.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Configuration for step execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// GPU compute-capability targets for native builds. Empty means the
  /// build tool's default target set.
  pub cuda_archs: Vec<u32>,

  /// Parallel job count for native builds. None means build-tool default.
  pub jobs: Option<usize>,

  /// Install prefix native builds install under.
  pub prefix: PathBuf,

  /// Root directory for source checkouts.
  pub work_dir: PathBuf,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      cuda_archs: Vec::new(),
      jobs: None,
      prefix: kiln_platform::paths::install_prefix(),
      work_dir: kiln_platform::paths::work_dir(),
    }
  }
}

/// Record of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
  /// Step id from the manifest.
  pub id: String,

  /// Step kind for display.
  pub kind: String,

  /// Commands the step ran.
  pub commands: Vec<String>,

  /// Wall-clock duration.
  pub duration_ms: u64,
}

/// Result of running the pipeline.
#[derive(Debug, Default)]
pub struct PipelineResult {
  /// Steps that completed, in execution order.
  pub completed: Vec<StepReport>,

  /// The step that failed, if any (at most one: execution stops there).
  pub failed: Option<(String, ExecuteError)>,

  /// Steps that never ran because an earlier step failed.
  /// Pairs of (skipped step id, failed dependency id).
  pub skipped: Vec<(String, String)>,
}

impl PipelineResult {
  /// Returns true if every step completed.
  pub fn is_success(&self) -> bool {
    self.failed.is_none() && self.skipped.is_empty()
  }

  /// Total number of steps accounted for.
  pub fn total(&self) -> usize {
    self.completed.len() + self.failed.iter().count() + self.skipped.len()
  }
}

/// Execute every step in a manifest, strictly in order.
///
/// The work dir is created up front; each step's preconditions beyond that
/// are established by the steps before it. The first failure aborts the
/// pipeline.
pub async fn execute_manifest(manifest: &Manifest, config: &ExecuteConfig) -> Result<PipelineResult, CoreError> {
  info!(steps = manifest.steps.len(), "starting pipeline");

  let dag = StepDag::from_manifest(manifest)?;
  let order = dag.execution_order()?;

  fs::create_dir_all(&config.work_dir).await.map_err(ExecuteError::Io)?;

  let mut result = PipelineResult::default();

  for (position, &idx) in order.iter().enumerate() {
    let def = &manifest.steps[idx];

    info!(step = %def.id, kind = def.step.kind(), "executing step");

    match execute_step(def, config).await {
      Ok(report) => {
        info!(step = %def.id, duration_ms = report.duration_ms, "step completed");
        result.completed.push(report);
      }
      Err(e) => {
        error!(step = %def.id, error = %e, "step failed");

        for &skipped_idx in &order[position + 1..] {
          let skipped = &manifest.steps[skipped_idx];
          warn!(step = %skipped.id, failed_dep = %def.id, "skipping step due to failed dependency");
          result.skipped.push((skipped.id.clone(), def.id.clone()));
        }

        result.failed = Some((def.id.clone(), e));
        break;
      }
    }
  }

  info!(
    completed = result.completed.len(),
    failed = result.failed.is_some(),
    skipped = result.skipped.len(),
    "pipeline finished"
  );

  Ok(result)
}
