//! kiln-lua: recipe evaluation for kiln.
//!
//! A recipe is a Lua file that declares provisioning steps in the order they
//! must run. Evaluating it produces a flat list of declarations; everything
//! downstream (validation, planning, execution) happens in kiln-core.

mod error;
mod eval;
mod globals;
mod types;

pub use error::RecipeError;
pub use eval::{EvalOptions, EvalResult, evaluate_recipe, evaluate_recipe_string};
pub use types::{
  BaseImageDecl, EnvDecl, EnvMergeStrategy, EnvValue, HookDecl, NativeBuildDecl, PackagesDecl, PipInstallDecl,
  SourceDecl, StepDecl,
};
