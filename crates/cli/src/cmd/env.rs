//! Implementation of the `kiln env` command.
//!
//! Renders the activation script for a recipe's runtime environment. With
//! `--print` the script goes to stdout (for `eval "$(kiln env --print)"` or
//! baking into an image without a login shell); otherwise it is written to
//! the activation script path.

use std::path::Path;

use anyhow::{Context, Result};

use kiln_core::{EnvTable, Manifest};
use kiln_lua::EvalOptions;
use kiln_platform::Shell;

use crate::output;

use super::map_core_err;

/// Execute the env command.
pub fn cmd_env(recipe: &Path, print: bool) -> Result<()> {
  let manifest = map_core_err(Manifest::from_recipe(recipe, &EvalOptions::default()))
    .with_context(|| format!("failed to evaluate {}", recipe.display()))?;

  let table = map_core_err(EnvTable::from_decls(&manifest.envs)).context("invalid runtime environment")?;

  if table.is_empty() {
    output::print_info("No runtime environment declared in recipe");
    return Ok(());
  }

  if print {
    print!("{}", table.render_script(&Shell::Sh));
    return Ok(());
  }

  let script_path = kiln_platform::paths::env_script();
  table
    .write_script(&script_path, &Shell::Sh)
    .with_context(|| format!("failed to write {}", script_path.display()))?;

  output::print_success(&format!(
    "Activation script for {} var(s) written to {}",
    table.entries().len(),
    script_path.display()
  ));
  println!();
  println!("Processes started outside a login shell can pick it up with:");
  println!();
  println!("  . {}", script_path.display());

  Ok(())
}
