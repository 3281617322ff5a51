//! Manifest types representing the desired image state
//!
//! The manifest is the intermediate representation produced by evaluating a
//! recipe: the base-image contract, the ordered provisioning steps and the
//! runtime environment declarations. It carries everything planning and
//! execution need, and its hash is the determinism witness for a build.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use kiln_lua::{BaseImageDecl, EnvDecl, EvalOptions, EvalResult, SourceDecl, StepDecl};

use crate::error::CoreError;
use crate::hash::Hashable;

/// Re-export of the step payload for downstream matching.
pub type Step = StepDecl;

/// A provisioning step with its assigned id.
///
/// Ids come from the declaration (`name` fields, source names) and are made
/// unique with a numeric suffix when a recipe repeats a kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepDef {
  pub id: String,
  pub step: Step,
}

impl Hashable for StepDef {}

/// A manifest representing the desired image state
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Manifest {
  /// Base-image contract, if the recipe declared one
  #[serde(skip_serializing_if = "Option::is_none")]
  pub base: Option<BaseImageDecl>,

  /// Provisioning steps in execution order
  pub steps: Vec<StepDef>,

  /// Runtime environment declarations
  pub envs: Vec<EnvDecl>,
}

impl Hashable for Manifest {}

impl Manifest {
  /// Create a manifest from a recipe file
  pub fn from_recipe(recipe_path: &Path, opts: &EvalOptions) -> Result<Self, CoreError> {
    let result = kiln_lua::evaluate_recipe(recipe_path, opts)?;
    Self::from_eval(result)
  }

  /// Create a manifest from an evaluation result, assigning step ids and
  /// validating cross-references.
  pub fn from_eval(result: EvalResult) -> Result<Self, CoreError> {
    let steps = assign_ids(result.steps);

    let manifest = Self {
      base: result.base,
      steps,
      envs: result.envs,
    };

    manifest.validate()?;
    Ok(manifest)
  }

  /// Validate the manifest:
  /// - step ids are unique
  /// - every referenced source exists
  /// - every environment variable has exactly one writer
  pub fn validate(&self) -> Result<(), CoreError> {
    let mut seen = BTreeSet::new();
    for def in &self.steps {
      if !seen.insert(def.id.as_str()) {
        return Err(CoreError::DuplicateStepId(def.id.clone()));
      }
    }

    for def in &self.steps {
      if let Some(source) = referenced_source(&def.step)
        && self.get_source(source).is_none()
      {
        return Err(CoreError::UnknownSource {
          step: def.id.clone(),
          source_name: source.to_string(),
        });
      }
    }

    let mut env_names = BTreeSet::new();
    for env in &self.envs {
      if !env_names.insert(env.name.as_str()) {
        return Err(CoreError::EnvConflict(env.name.clone()));
      }
    }

    Ok(())
  }

  /// Look up a source declaration by name.
  pub fn get_source(&self, name: &str) -> Option<&SourceDecl> {
    self.steps.iter().find_map(|def| match &def.step {
      StepDecl::Source(s) if s.name == name => Some(s),
      _ => None,
    })
  }

  /// Index of the step a given step references, if any.
  pub fn reference_index(&self, def: &StepDef) -> Option<usize> {
    let source = referenced_source(&def.step)?;
    self.steps.iter().position(|other| match &other.step {
      StepDecl::Source(s) => s.name == source,
      _ => false,
    })
  }
}

/// The source name a step references, if the step kind has one.
pub fn referenced_source(step: &Step) -> Option<&str> {
  match step {
    StepDecl::NativeBuild(b) => Some(b.source.as_str()),
    StepDecl::PipInstall(p) => p.source.as_deref(),
    StepDecl::Hook(h) => h.source.as_deref(),
    StepDecl::Packages(_) | StepDecl::Source(_) => None,
  }
}

/// Assign unique ids to steps in declaration order.
fn assign_ids(steps: Vec<StepDecl>) -> Vec<StepDef> {
  let mut taken: BTreeSet<String> = BTreeSet::new();
  let mut defs = Vec::with_capacity(steps.len());

  for step in steps {
    let base = default_id(&step);
    let mut id = base.clone();
    let mut n = 2;
    while taken.contains(&id) {
      id = format!("{}-{}", base, n);
      n += 1;
    }
    taken.insert(id.clone());
    defs.push(StepDef { id, step });
  }

  defs
}

/// The id a step gets when the recipe does not name it.
fn default_id(step: &StepDecl) -> String {
  match step {
    StepDecl::Packages(_) => "packages".to_string(),
    StepDecl::Source(s) => s.name.clone(),
    StepDecl::NativeBuild(b) => b.name.clone().unwrap_or_else(|| format!("build-{}", b.source)),
    StepDecl::PipInstall(p) => p
      .name
      .clone()
      .or_else(|| p.source.as_ref().map(|s| format!("pip-{}", s)))
      .unwrap_or_else(|| "pip-install".to_string()),
    StepDecl::Hook(h) => h.name.clone().unwrap_or_else(|| "post-install".to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use kiln_lua::evaluate_recipe_string;

  fn manifest_from(src: &str) -> Result<Manifest, CoreError> {
    let result = evaluate_recipe_string(src, &EvalOptions::default()).unwrap();
    Manifest::from_eval(result)
  }

  #[test]
  fn ids_follow_declarations() {
    let manifest = manifest_from(
      r#"
        packages { "git" }
        source { name = "nccl", git = "https://example.com/nccl.git" }
        native_build { source = "nccl", build = { "make" } }
        pip_install { packages = { "accelmath==0.27.2" } }
        post_install { run = { "true" } }
      "#,
    )
    .unwrap();

    let ids: Vec<_> = manifest.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["packages", "nccl", "build-nccl", "pip-install", "post-install"]);
  }

  #[test]
  fn repeated_kinds_get_suffixed_ids() {
    let manifest = manifest_from(
      r#"
        packages { "git" }
        packages { "vim" }
      "#,
    )
    .unwrap();

    let ids: Vec<_> = manifest.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["packages", "packages-2"]);
  }

  #[test]
  fn unknown_source_reference_is_rejected() {
    let result = manifest_from(
      r#"
        native_build { source = "missing", build = { "make" } }
      "#,
    );

    assert!(matches!(
      result,
      Err(CoreError::UnknownSource { source_name: ref source, .. }) if source == "missing"
    ));
  }

  #[test]
  fn env_single_writer_enforced() {
    let result = manifest_from(
      r#"
        runtime_env { LD_LIBRARY_PATH = { "/usr/local/lib" } }
        runtime_env { LD_LIBRARY_PATH = { "/opt/lib" } }
      "#,
    );

    assert!(matches!(result, Err(CoreError::EnvConflict(ref name)) if name == "LD_LIBRARY_PATH"));
  }

  #[test]
  fn get_source_resolves_by_name() {
    let manifest = manifest_from(
      r#"
        source { name = "amp", git = "https://example.com/amp.git", rev = "v0.2.0" }
      "#,
    )
    .unwrap();

    let source = manifest.get_source("amp").unwrap();
    assert_eq!(source.rev.as_deref(), Some("v0.2.0"));
    assert!(manifest.get_source("other").is_none());
  }

  #[test]
  fn manifest_hash_is_stable_across_evaluations() {
    let src = r#"
      packages { "git", "cmake" }
      source { name = "nccl", git = "https://example.com/nccl.git", rev = "v2.17.1-1" }
      runtime_env { LD_LIBRARY_PATH = { "/usr/local/lib" } }
    "#;

    let a = manifest_from(src).unwrap().compute_hash().unwrap();
    let b = manifest_from(src).unwrap().compute_hash().unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn manifest_hash_tracks_pin_changes() {
    let a = manifest_from(r#"source { name = "nccl", git = "https://example.com/nccl.git", rev = "v2.17.1-1" }"#)
      .unwrap()
      .compute_hash()
      .unwrap();
    let b = manifest_from(r#"source { name = "nccl", git = "https://example.com/nccl.git", rev = "v2.18.3-1" }"#)
      .unwrap()
      .compute_hash()
      .unwrap();

    assert_ne!(a, b);
  }
}
