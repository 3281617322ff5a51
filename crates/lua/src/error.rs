//! Error types for kiln-lua

use thiserror::Error;

/// Errors that can occur while evaluating a recipe
#[derive(Debug, Error)]
pub enum RecipeError {
  #[error("recipe not found: {0}")]
  RecipeNotFound(String),

  #[error("Lua error: {0}")]
  Lua(#[from] mlua::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}
