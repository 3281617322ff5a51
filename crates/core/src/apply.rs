//! Apply orchestration.
//!
//! The full flow behind `kiln apply`:
//!
//! 1. Evaluate the recipe into a manifest
//! 2. Compute and validate the plan
//! 3. Execute every step strictly in order
//! 4. On full success: write the activation script and the apply report
//!
//! The build is all-or-nothing. A failed step leaves no report and no
//! activation script from this run; the container build layer it ran in is
//! aborted by the non-zero exit.

use std::path::{Path, PathBuf};

use tracing::info;

use kiln_lua::EvalOptions;
use kiln_platform::Shell;

use crate::env::EnvTable;
use crate::error::CoreError;
use crate::execute::{ExecuteConfig, PipelineResult, execute_manifest};
use crate::manifest::Manifest;
use crate::plan::{Plan, compute_plan};
use crate::report::ApplyReport;

/// Options for the apply operation.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
  /// Execution configuration (compute-capability targets, jobs, paths).
  pub execute: ExecuteConfig,

  /// Where the activation script is written.
  pub env_script: PathBuf,

  /// Where the apply report is written.
  pub state_dir: PathBuf,

  /// Plan and validate but do not execute.
  pub dry_run: bool,
}

impl Default for ApplyOptions {
  fn default() -> Self {
    Self {
      execute: ExecuteConfig::default(),
      env_script: kiln_platform::paths::env_script(),
      state_dir: kiln_platform::paths::state_dir(),
      dry_run: false,
    }
  }
}

/// Result of an apply operation.
#[derive(Debug)]
pub struct ApplyOutcome {
  /// The validated plan.
  pub plan: Plan,

  /// Execution result; empty for a dry run.
  pub result: PipelineResult,

  /// The report, present only when every step completed.
  pub report: Option<ApplyReport>,
}

/// Apply a recipe.
///
/// Returns an outcome whose `result` records any failure; the caller decides
/// the process exit code. Errors are reserved for invalid recipes and
/// infrastructure problems (unreadable recipe, unwritable state dir).
pub async fn apply(recipe_path: &Path, eval: &EvalOptions, options: &ApplyOptions) -> Result<ApplyOutcome, CoreError> {
  info!(recipe = %recipe_path.display(), "starting apply");

  let manifest = Manifest::from_recipe(recipe_path, eval)?;
  let plan = compute_plan(&manifest)?;

  info!(
    steps = plan.step_count(),
    manifest_hash = %plan.manifest_hash,
    "plan computed"
  );

  if options.dry_run {
    info!("dry run - not executing");
    return Ok(ApplyOutcome {
      plan,
      result: PipelineResult::default(),
      report: None,
    });
  }

  let result = execute_manifest(&manifest, &options.execute).await?;

  if !result.is_success() {
    return Ok(ApplyOutcome {
      plan,
      result,
      report: None,
    });
  }

  // Activate the runtime environment: the preload list and search paths land
  // ahead of the base image's own values for every subsequent process.
  let table = EnvTable::from_decls(&manifest.envs)?;
  if !table.is_empty() {
    table.write_script(&options.env_script, &Shell::Sh)?;
  }

  let report = ApplyReport {
    manifest_hash: plan.manifest_hash.to_string(),
    finished_at: chrono::Utc::now(),
    base: manifest.base.clone(),
    steps: result.completed.clone(),
    envs: manifest.envs.clone(),
    env_script: options.env_script.clone(),
  };
  report.save(&options.state_dir)?;

  Ok(ApplyOutcome {
    plan,
    result,
    report: Some(report),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn write_recipe(temp: &TempDir, content: &str) -> PathBuf {
    let path = temp.path().join("kiln.lua");
    fs::write(&path, content).unwrap();
    path
  }

  fn test_options(temp: &TempDir) -> ApplyOptions {
    ApplyOptions {
      execute: ExecuteConfig {
        cuda_archs: Vec::new(),
        jobs: None,
        prefix: temp.path().join("prefix"),
        work_dir: temp.path().join("src"),
      },
      env_script: temp.path().join("etc/kiln.sh"),
      state_dir: temp.path().join("state"),
      dry_run: false,
    }
  }

  #[tokio::test]
  async fn apply_writes_script_and_report() {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(
      &temp,
      r#"
        post_install { run = { "true" } }
        runtime_env {
            LD_PRELOAD = { prepend = { "/usr/local/lib/libshim.so", "/usr/local/lib/libnccl.so" } },
        }
      "#,
    );

    let options = test_options(&temp);
    let outcome = apply(&recipe, &EvalOptions::default(), &options).await.unwrap();

    assert!(outcome.result.is_success());
    assert!(outcome.report.is_some());

    let script = fs::read_to_string(&options.env_script).unwrap();
    assert!(script.contains("libshim.so:/usr/local/lib/libnccl.so${LD_PRELOAD:+:$LD_PRELOAD}"));

    let loaded = ApplyReport::load(&options.state_dir).unwrap().unwrap();
    assert_eq!(loaded.manifest_hash, outcome.plan.manifest_hash.to_string());
  }

  #[tokio::test]
  async fn failed_apply_leaves_no_report() {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(
      &temp,
      r#"
        post_install { name = "broken", run = { "exit 1" } }
      "#,
    );

    let options = test_options(&temp);
    let outcome = apply(&recipe, &EvalOptions::default(), &options).await.unwrap();

    assert!(!outcome.result.is_success());
    assert!(outcome.report.is_none());
    assert!(ApplyReport::load(&options.state_dir).unwrap().is_none());
  }

  #[tokio::test]
  async fn dry_run_executes_nothing() {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(
      &temp,
      r#"
        post_install { run = { "touch ran" } }
      "#,
    );

    let mut options = test_options(&temp);
    options.dry_run = true;

    let outcome = apply(&recipe, &EvalOptions::default(), &options).await.unwrap();

    assert_eq!(outcome.plan.step_count(), 1);
    assert_eq!(outcome.result.total(), 0);
    assert!(!options.execute.work_dir.join("ran").exists());
  }

  #[tokio::test]
  async fn missing_recipe_is_an_error() {
    let temp = TempDir::new().unwrap();
    let options = test_options(&temp);

    let result = apply(Path::new("/nonexistent/kiln.lua"), &EvalOptions::default(), &options).await;
    assert!(matches!(result, Err(CoreError::Recipe(_))));
  }
}
