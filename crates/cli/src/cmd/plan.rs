//! Implementation of the `kiln plan` command.
//!
//! Evaluates a recipe, validates it and prints the ordered step plan. No
//! side effects; an invalid recipe exits non-zero.

use std::path::Path;

use anyhow::{Context, Result};

use kiln_core::{Manifest, compute_plan};

use crate::output::{self, OutputFormat, symbols};

use super::{build_config, map_core_err};

/// Execute the plan command.
pub fn cmd_plan(recipe: &Path, arch: &[u32], jobs: Option<usize>, format: OutputFormat) -> Result<()> {
  let (eval, _) = build_config(arch, jobs);

  let manifest = map_core_err(Manifest::from_recipe(recipe, &eval))
    .with_context(|| format!("failed to evaluate {}", recipe.display()))?;
  let plan = map_core_err(compute_plan(&manifest)).context("invalid recipe")?;

  if format.is_json() {
    return output::print_json(&plan);
  }

  output::print_info(&format!("Plan for {}", recipe.display()));
  output::print_stat("Manifest", &plan.manifest_hash.to_string());
  if let Some(base) = &plan.base {
    output::print_stat("Base image", base);
  }
  println!();

  for (idx, step) in plan.steps.iter().enumerate() {
    println!("  {}. [{}] {} {} {}", idx + 1, step.kind, step.id, symbols::ARROW, step.summary);
  }

  if !plan.envs.is_empty() {
    println!();
    output::print_info("Runtime environment");
    for env in &plan.envs {
      println!("    {}", env);
    }
  }

  println!();
  output::print_success(&format!("{} step(s) planned", plan.step_count()));

  Ok(())
}
