//! Plan computation.
//!
//! Planning validates a manifest (step references, ordering, environment
//! writers) and renders it into the ordered, human-readable form `kiln plan`
//! prints. Nothing here touches the system; the plan is also what `apply`
//! shows before executing.

use serde::Serialize;

use kiln_lua::{EnvMergeStrategy, StepDecl};

use crate::dag::StepDag;
use crate::env::EnvTable;
use crate::error::CoreError;
use crate::hash::{Hashable, ObjectHash};
use crate::manifest::Manifest;

/// A planned step, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct StepPlan {
  /// Step id from the manifest.
  pub id: String,

  /// Step kind for display.
  pub kind: String,

  /// One-line description of what the step will do.
  pub summary: String,
}

/// The ordered plan for a manifest.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
  /// Hash identifying the manifest; identical recipes and configuration
  /// produce identical hashes.
  pub manifest_hash: ObjectHash,

  /// Base-image contract, rendered for display.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub base: Option<String>,

  /// Steps in execution order.
  pub steps: Vec<StepPlan>,

  /// Environment declarations, rendered for display.
  pub envs: Vec<String>,
}

impl Plan {
  /// Number of steps in the plan.
  pub fn step_count(&self) -> usize {
    self.steps.len()
  }
}

/// Compute the plan for a manifest, validating it along the way.
pub fn compute_plan(manifest: &Manifest) -> Result<Plan, CoreError> {
  manifest.validate()?;

  let dag = StepDag::from_manifest(manifest)?;
  let order = dag.execution_order()?;

  // Env declarations must form a valid table even when only planning.
  let _ = EnvTable::from_decls(&manifest.envs)?;

  let steps = order
    .into_iter()
    .map(|idx| {
      let def = &manifest.steps[idx];
      StepPlan {
        id: def.id.clone(),
        kind: def.step.kind().to_string(),
        summary: step_summary(&def.step),
      }
    })
    .collect();

  let envs = manifest.envs.iter().map(env_summary).collect();

  Ok(Plan {
    manifest_hash: manifest.compute_hash()?,
    base: manifest.base.as_ref().map(|b| {
      let tag = b.tag.as_deref().unwrap_or("latest");
      format!("{}:{}", b.name, tag)
    }),
    steps,
    envs,
  })
}

/// One-line description of a step.
fn step_summary(step: &StepDecl) -> String {
  match step {
    StepDecl::Packages(p) => format!("install {} OS package(s)", p.packages.len()),
    StepDecl::Source(s) => match (&s.git, &s.url) {
      (Some(git), _) => format!("clone {} @ {}", git, s.rev.as_deref().unwrap_or("HEAD")),
      (_, Some(url)) => format!("fetch {}", url),
      _ => "acquire source".to_string(),
    },
    StepDecl::NativeBuild(b) => format!(
      "build {} ({} command(s), {} install command(s))",
      b.source,
      b.build.len(),
      b.install.len()
    ),
    StepDecl::PipInstall(p) => {
      if let Some(source) = &p.source {
        format!("pip install from source {}", source)
      } else {
        format!("pip install {}", p.packages.join(" "))
      }
    }
    StepDecl::Hook(h) => format!("run {} command(s)", h.run.len()),
  }
}

/// One-line description of an environment declaration.
fn env_summary(env: &kiln_lua::EnvDecl) -> String {
  let rendered: Vec<String> = env
    .values
    .iter()
    .map(|v| match v.strategy {
      EnvMergeStrategy::Replace => format!("= {}", v.value),
      EnvMergeStrategy::Prepend => format!("prepend {}", v.value),
      EnvMergeStrategy::Append => format!("append {}", v.value),
    })
    .collect();

  format!("{} {}", env.name, rendered.join(", "))
}
