//! Post-install hook step.
//!
//! Runs whatever registration or codegen the freshly installed library
//! requires after packaging. Commands run in the referenced source tree when
//! one is named, otherwise in the work dir.

use std::path::Path;

use tracing::info;

use kiln_lua::HookDecl;

use super::super::ExecuteError;
use super::super::process::run_cmd;

/// Execute a post-install hook step.
pub async fn run_hook(decl: &HookDecl, cwd: &Path) -> Result<Vec<String>, ExecuteError> {
  info!(commands = decl.run.len(), cwd = %cwd.display(), "running post-install hook");

  let mut ran = Vec::with_capacity(decl.run.len());

  for cmd in &decl.run {
    run_cmd(cmd, &decl.env, cwd).await?;
    ran.push(cmd.clone());
  }

  Ok(ran)
}
