//! Error types for kiln-core

use thiserror::Error;

use crate::execute::ExecuteError;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
  #[error("recipe error: {0}")]
  Recipe(#[from] kiln_lua::RecipeError),

  #[error("execution error: {0}")]
  Execute(#[from] ExecuteError),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("duplicate step id: {0}")]
  DuplicateStepId(String),

  #[error("step '{step}' references unknown source '{source_name}'")]
  UnknownSource { step: String, source_name: String },

  #[error("step ordering cycle: '{step}' references source '{source_name}' declared after it")]
  ForwardReference { step: String, source_name: String },

  #[error("environment variable '{0}' has more than one writer")]
  EnvConflict(String),

  #[error("environment variable '{name}' is invalid: {message}")]
  InvalidEnv { name: String, message: String },
}
