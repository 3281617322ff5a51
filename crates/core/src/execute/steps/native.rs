//! Native library build step.
//!
//! Drives the build system of a previously acquired source tree (make,
//! cmake, whatever the declaration's commands say) with the configured
//! compute-capability targets and job count injected via placeholders and,
//! optionally, a named environment variable. Build commands run first, then
//! install commands; outputs land under the install prefix so the dynamic
//! loader finds them once the runtime environment is activated.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use kiln_lua::NativeBuildDecl;

use super::super::ExecuteError;
use super::super::process::run_cmd;
use crate::placeholder::{expand, gencode_flags};

/// Values a native build is parameterized over.
pub struct NativeBuildContext<'a> {
  pub source_dir: &'a Path,
  pub prefix: &'a Path,
  /// Compute-capability targets; empty means the build tool's default set.
  pub cuda_archs: &'a [u32],
  /// Configured job count; the declaration's own `jobs` wins over this.
  pub jobs: Option<usize>,
}

/// Build the expanded command sequence for a native build step.
pub fn build_commands(decl: &NativeBuildDecl, ctx: &NativeBuildContext<'_>) -> Vec<(String, BTreeMap<String, String>)> {
  let gencode = gencode_flags(ctx.cuda_archs);
  let jobs = decl.jobs.or(ctx.jobs);

  let mut vars: BTreeMap<&str, String> = BTreeMap::new();
  vars.insert("gencode", gencode.clone());
  vars.insert("jobs", jobs.map(|j| j.to_string()).unwrap_or_default());
  vars.insert("jobs_flag", jobs.map(|j| format!("-j{}", j)).unwrap_or_default());
  vars.insert("prefix", ctx.prefix.display().to_string());
  vars.insert("source_dir", ctx.source_dir.display().to_string());

  let mut env = decl.env.clone();
  if let Some(var) = &decl.gencode_var {
    env.insert(var.clone(), gencode);
  }

  decl
    .build
    .iter()
    .chain(decl.install.iter())
    .map(|cmd| (expand(cmd, &vars), env.clone()))
    .collect()
}

/// Execute a native build step in its source directory.
///
/// Returns the commands that ran, for the step report.
pub async fn run_native_build(decl: &NativeBuildDecl, ctx: &NativeBuildContext<'_>) -> Result<Vec<String>, ExecuteError> {
  info!(
    source = %decl.source,
    archs = ?ctx.cuda_archs,
    "building native library"
  );

  let commands = build_commands(decl, ctx);
  let mut ran = Vec::with_capacity(commands.len());

  for (cmd, env) in &commands {
    run_cmd(cmd, env, ctx.source_dir).await?;
    ran.push(cmd.clone());
  }

  Ok(ran)
}
