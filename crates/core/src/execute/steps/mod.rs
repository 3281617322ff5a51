//! Step executors, one module per step kind.

pub mod hook;
pub mod native;
pub mod packages;
pub mod python;
pub mod source;

use std::path::PathBuf;

use kiln_lua::StepDecl;

use crate::manifest::StepDef;

use super::{ExecuteConfig, ExecuteError, StepReport};
use native::NativeBuildContext;

/// Execute a single step and return its report.
pub async fn execute_step(def: &StepDef, config: &ExecuteConfig) -> Result<StepReport, ExecuteError> {
  let started = std::time::Instant::now();

  let commands = match &def.step {
    StepDecl::Packages(decl) => packages::install_packages(decl, &config.work_dir).await?,
    StepDecl::Source(decl) => {
      let dest = source::acquire_source(decl, &config.work_dir).await?;
      vec![format!("checkout {}", dest.display())]
    }
    StepDecl::NativeBuild(decl) => {
      let source_dir = source_dir(config, &decl.source);
      let ctx = NativeBuildContext {
        source_dir: &source_dir,
        prefix: &config.prefix,
        cuda_archs: &config.cuda_archs,
        jobs: config.jobs,
      };
      native::run_native_build(decl, &ctx).await?
    }
    StepDecl::PipInstall(decl) => {
      let dir = decl.source.as_deref().map(|name| source_dir(config, name));
      python::run_pip_install(decl, dir.as_deref(), &config.work_dir).await?
    }
    StepDecl::Hook(decl) => {
      let cwd = decl
        .source
        .as_deref()
        .map(|name| source_dir(config, name))
        .unwrap_or_else(|| config.work_dir.clone());
      hook::run_hook(decl, &cwd).await?
    }
  };

  Ok(StepReport {
    id: def.id.clone(),
    kind: def.step.kind().to_string(),
    commands,
    duration_ms: started.elapsed().as_millis() as u64,
  })
}

/// Directory a named source checkout lives in.
fn source_dir(config: &ExecuteConfig, name: &str) -> PathBuf {
  config.work_dir.join(name)
}
