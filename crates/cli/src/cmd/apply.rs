//! Implementation of the `kiln apply` command.
//!
//! Evaluates the recipe, prints the plan, executes every step strictly in
//! order and activates the runtime environment. All-or-nothing: a failed
//! step prints the failure, reports the skipped steps and exits non-zero so
//! the enclosing image build aborts with no usable artifact recorded.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use kiln_core::apply::{ApplyOptions, apply};

use crate::output::{self, symbols};

use super::{build_config, map_core_err};

/// Execute the apply command.
pub fn cmd_apply(recipe: &Path, arch: &[u32], jobs: Option<usize>, dry_run: bool) -> Result<()> {
  let (eval, execute) = build_config(arch, jobs);

  let options = ApplyOptions {
    execute,
    dry_run,
    ..ApplyOptions::default()
  };

  let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
  let outcome = map_core_err(rt.block_on(apply(recipe, &eval, &options))).context("apply failed")?;

  output::print_info(&format!(
    "Applying {} ({} step(s), manifest {})",
    recipe.display(),
    outcome.plan.step_count(),
    outcome.plan.manifest_hash
  ));

  if dry_run {
    println!();
    output::print_success("Dry run - nothing executed");
    return Ok(());
  }

  for report in &outcome.result.completed {
    println!(
      "  {} {} ({})",
      symbols::SUCCESS,
      report.id,
      output::format_duration(Duration::from_millis(report.duration_ms))
    );
  }

  if let Some((failed_id, err)) = &outcome.result.failed {
    println!("  {} {}", symbols::ERROR, failed_id);
    for (skipped_id, dep) in &outcome.result.skipped {
      println!("  - {} (skipped: {} failed)", skipped_id, dep);
    }

    println!();
    output::print_error(&format!("step '{}' failed: {}", failed_id, err));
    std::process::exit(1);
  }

  println!();
  output::print_success("Apply complete");
  output::print_stat("Steps", &outcome.result.completed.len().to_string());
  if let Some(report) = &outcome.report {
    output::print_stat("Env vars", &report.envs.len().to_string());
    output::print_stat("Activation", &report.env_script.display().to_string());
    info!(manifest_hash = %report.manifest_hash, "apply report saved");
  }

  Ok(())
}
