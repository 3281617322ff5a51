//! Recipe evaluation

use crate::error::RecipeError;
use crate::globals::{
  Declarations, setup_base_image_function, setup_env_function, setup_kiln_global, setup_step_functions,
};
use crate::types::{BaseImageDecl, EnvDecl, StepDecl};
use mlua::Lua;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;
use kiln_platform::Platform;

/// Build configuration exposed to the recipe via the `kiln` global.
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
  /// GPU compute-capability targets (e.g. [80, 90]). Empty means the native
  /// build falls back to the build tool's default target set.
  pub cuda_archs: Vec<u32>,

  /// Parallel job count for native builds. None means build-tool default.
  pub jobs: Option<usize>,
}

/// Result of evaluating a recipe
pub struct EvalResult {
  /// Base-image contract, if declared
  pub base: Option<BaseImageDecl>,
  /// Provisioning steps in declaration order
  pub steps: Vec<StepDecl>,
  /// Runtime environment declarations in declaration order
  pub envs: Vec<EnvDecl>,
}

/// Evaluate a recipe file and return the collected declarations
///
/// # Example
///
/// ```ignore
/// use kiln_lua::{EvalOptions, evaluate_recipe};
/// use std::path::Path;
///
/// let result = evaluate_recipe(Path::new("kiln.lua"), &EvalOptions::default())?;
/// for step in result.steps {
///     println!("step: {}", step.kind());
/// }
/// ```
pub fn evaluate_recipe(recipe_path: &Path, opts: &EvalOptions) -> Result<EvalResult, RecipeError> {
  if !recipe_path.exists() {
    return Err(RecipeError::RecipeNotFound(recipe_path.display().to_string()));
  }

  let source = std::fs::read_to_string(recipe_path)?;

  evaluate_recipe_string(&source, opts)
}

/// Evaluate a recipe from a string
///
/// This is useful for testing or when the recipe is embedded.
pub fn evaluate_recipe_string(source: &str, opts: &EvalOptions) -> Result<EvalResult, RecipeError> {
  let lua = Lua::new();
  let platform = Platform::current();

  // Set up the global kiln table
  setup_kiln_global(&lua, &platform, opts)?;

  // Create shared declarations state
  let declarations = Rc::new(RefCell::new(Declarations::new()));

  // Set up the declaration functions
  setup_base_image_function(&lua, declarations.clone())?;
  setup_step_functions(&lua, declarations.clone())?;
  setup_env_function(&lua, declarations.clone())?;

  // Execute the recipe
  lua.load(source).exec()?;

  // Extract the declarations
  let decls = declarations.borrow();

  debug!(
    steps = decls.steps.len(),
    envs = decls.envs.len(),
    has_base = decls.base.is_some(),
    "recipe evaluated"
  );

  Ok(EvalResult {
    base: decls.base.clone(),
    steps: decls.steps.clone(),
    envs: decls.envs.clone(),
  })
}
