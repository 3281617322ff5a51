//! Declaration types collected from a recipe

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The base-image contract a recipe targets.
///
/// Purely descriptive: the compatibility between the base image's bundled
/// CUDA/communication-library versions and the pinned packages a recipe
/// installs is a manually maintained matrix. kiln records the contract in the
/// manifest and surfaces it in `plan`/`status` output, but never enforces it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BaseImageDecl {
  /// Image name, e.g. "nvcr.io/nvidia/pytorch"
  pub name: String,

  /// Image tag, e.g. "24.03-py3"
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,

  /// CUDA toolkit version the image ships
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cuda: Option<String>,

  /// Python version the image ships
  #[serde(skip_serializing_if = "Option::is_none")]
  pub python: Option<String>,

  /// Framework version the image ships
  #[serde(skip_serializing_if = "Option::is_none")]
  pub torch: Option<String>,
}

/// An OS package installation step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackagesDecl {
  /// Package names, installed in one transaction.
  pub packages: Vec<String>,

  /// Refresh the package index first (default true).
  pub update: bool,

  /// Clean the package cache afterwards to bound image size (default true).
  pub clean: bool,
}

impl PackagesDecl {
  pub fn validate(&self) -> Result<(), String> {
    if self.packages.is_empty() {
      return Err("packages{} requires at least one package name".to_string());
    }
    Ok(())
  }
}

/// A source acquisition step: a git repository at a pinned revision, or a
/// tarball with a SHA-256 pin. Exactly one of `git` / `url` must be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDecl {
  /// Checkout name; also the subdirectory under the work dir.
  pub name: String,

  /// Git URL to clone.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub git: Option<String>,

  /// Revision to check out (branch, tag, or commit hash).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rev: Option<String>,

  /// Initialize submodules recursively (default false).
  pub submodules: bool,

  /// Tarball URL to download and unpack.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,

  /// Expected SHA-256 of the tarball (lowercase hex). Required with `url`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sha256: Option<String>,
}

impl SourceDecl {
  /// Validate that exactly one acquisition method is configured.
  pub fn validate(&self) -> Result<(), String> {
    match (self.git.is_some(), self.url.is_some()) {
      (false, false) => Err(format!("source '{}' must specify one of: git, url", self.name)),
      (true, true) => Err(format!("source '{}' cannot specify both git and url", self.name)),
      (true, false) => {
        if self.sha256.is_some() {
          return Err(format!("source '{}': sha256 applies to url sources only", self.name));
        }
        Ok(())
      }
      (false, true) => {
        if self.sha256.is_none() {
          return Err(format!("source '{}': url sources require a sha256 pin", self.name));
        }
        if self.rev.is_some() || self.submodules {
          return Err(format!("source '{}': rev/submodules apply to git sources only", self.name));
        }
        Ok(())
      }
    }
  }

  /// Get a description of the acquisition method for display
  pub fn kind(&self) -> &'static str {
    if self.git.is_some() { "git" } else { "tarball" }
  }
}

/// A native library build step, run inside a previously acquired source tree.
///
/// Command strings may use placeholders expanded at execution time:
/// `${gencode}` (the compute-capability flag list, empty when no targets are
/// configured), `${jobs}` / `${jobs_flag}` (parallel job count), `${prefix}`
/// (install prefix) and `${source_dir}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NativeBuildDecl {
  /// Step name; defaults to "build-<source>".
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  /// Name of the `source{}` step providing the working tree.
  pub source: String,

  /// Build commands, run in order in the source directory.
  pub build: Vec<String>,

  /// Install commands, run after the build commands succeed.
  pub install: Vec<String>,

  /// Environment variable the expanded gencode flag list is exported as
  /// (e.g. "NVCC_GENCODE"), in addition to placeholder expansion.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub gencode_var: Option<String>,

  /// Parallel job count override for this build.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub jobs: Option<usize>,

  /// Extra environment for every command in this step.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
}

impl NativeBuildDecl {
  pub fn validate(&self) -> Result<(), String> {
    if self.build.is_empty() {
      return Err(format!("native_build '{}' requires at least one build command", self.source));
    }
    Ok(())
  }
}

/// A pinned Python package installation step.
///
/// Either a list of pinned specifiers (`pkg==1.2.3`, `git+https://...@tag`)
/// or an already-acquired source tree to install from. Native extensions are
/// compiled with `MAX_JOBS` capped (default 1) to bound peak memory.
///
/// This is where a mismatch between the base image's bundled communication
/// library and the pinned package's expected interface surfaces; that
/// compatibility is documented in the base-image contract, not detected here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipInstallDecl {
  /// Step name; defaults to "pip-install" / the source name.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  /// Pinned package specifiers.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub packages: Vec<String>,

  /// Name of a `source{}` step to install from instead of specifiers.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,

  /// Install the source tree in editable mode (default false).
  pub editable: bool,

  /// `MAX_JOBS` cap for native-extension compilation (default 1).
  pub jobs: usize,

  /// Extra environment for the install command.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
}

impl PipInstallDecl {
  /// Validate that exactly one of packages / source is configured.
  pub fn validate(&self) -> Result<(), String> {
    match (self.packages.is_empty(), self.source.is_none()) {
      (true, true) => Err("pip_install{} requires packages or a source".to_string()),
      (false, false) => Err("pip_install{} cannot specify both packages and a source".to_string()),
      _ => {
        if self.editable && self.source.is_none() {
          return Err("pip_install{}: editable requires a source".to_string());
        }
        Ok(())
      }
    }
  }
}

/// A post-install hook step: commands the installed library requires after
/// packaging (kernel/library registration, codegen).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HookDecl {
  /// Step name; defaults to "post-install".
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  /// Commands, run in order.
  pub run: Vec<String>,

  /// Name of a `source{}` step to run in; defaults to the work dir.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,

  /// Extra environment for every command in this step.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
}

impl HookDecl {
  pub fn validate(&self) -> Result<(), String> {
    if self.run.is_empty() {
      return Err("post_install{} requires at least one command".to_string());
    }
    Ok(())
  }
}

/// A provisioning step declaration, in recipe order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepDecl {
  Packages(PackagesDecl),
  Source(SourceDecl),
  NativeBuild(NativeBuildDecl),
  PipInstall(PipInstallDecl),
  Hook(HookDecl),
}

impl StepDecl {
  /// Short kind name for display and default ids.
  pub fn kind(&self) -> &'static str {
    match self {
      StepDecl::Packages(_) => "packages",
      StepDecl::Source(_) => "source",
      StepDecl::NativeBuild(_) => "native-build",
      StepDecl::PipInstall(_) => "pip-install",
      StepDecl::Hook(_) => "post-install",
    }
  }
}

/// How to combine an environment value with a pre-existing one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EnvMergeStrategy {
  /// Replace any existing value
  #[default]
  Replace,
  /// Prepend to a separator-joined variable; the existing value stays as a
  /// fallback behind the new entries
  Prepend,
  /// Append to a separator-joined variable
  Append,
}

/// A single environment variable value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvValue {
  /// The value to set
  pub value: String,
  /// How to merge with an existing value
  #[serde(default)]
  pub strategy: EnvMergeStrategy,
}

impl EnvValue {
  /// Create a new replace-style env value
  pub fn replace(value: impl Into<String>) -> Self {
    Self {
      value: value.into(),
      strategy: EnvMergeStrategy::Replace,
    }
  }

  /// Create a new prepend-style env value
  pub fn prepend(value: impl Into<String>) -> Self {
    Self {
      value: value.into(),
      strategy: EnvMergeStrategy::Prepend,
    }
  }

  /// Create a new append-style env value
  pub fn append(value: impl Into<String>) -> Self {
    Self {
      value: value.into(),
      strategy: EnvMergeStrategy::Append,
    }
  }
}

/// A runtime environment variable declaration.
///
/// Order matters twice over: declarations render into the activation script
/// in recipe order, and the values within one declaration keep their order —
/// which is what fixes the preload list as "shim first, communication library
/// second".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvDecl {
  /// Environment variable name
  pub name: String,
  /// Values to set (multiple for separator-joined prepend/append)
  pub values: Vec<EnvValue>,
}

impl EnvDecl {
  /// Create a new environment variable with a single replace value
  pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      values: vec![EnvValue::replace(value)],
    }
  }

  /// Create a new separator-joined variable with prepend values
  pub fn prepend(name: impl Into<String>, values: Vec<String>) -> Self {
    Self {
      name: name.into(),
      values: values.into_iter().map(EnvValue::prepend).collect(),
    }
  }

  /// Check if this is a separator-joined variable (has prepend/append values)
  pub fn is_path_like(&self) -> bool {
    self
      .values
      .iter()
      .any(|v| matches!(v.strategy, EnvMergeStrategy::Prepend | EnvMergeStrategy::Append))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn source_decl_git_valid() {
    let decl = SourceDecl {
      name: "nccl".to_string(),
      git: Some("https://github.com/example/nccl.git".to_string()),
      rev: Some("v2.17.1-1".to_string()),
      submodules: true,
      url: None,
      sha256: None,
    };
    assert!(decl.validate().is_ok());
    assert_eq!(decl.kind(), "git");
  }

  #[test]
  fn source_decl_tarball_requires_sha256() {
    let decl = SourceDecl {
      name: "blob".to_string(),
      git: None,
      rev: None,
      submodules: false,
      url: Some("https://example.com/blob.tar.gz".to_string()),
      sha256: None,
    };
    assert!(decl.validate().is_err());
  }

  #[test]
  fn source_decl_rejects_both_methods() {
    let decl = SourceDecl {
      name: "x".to_string(),
      git: Some("https://example.com/x.git".to_string()),
      rev: None,
      submodules: false,
      url: Some("https://example.com/x.tar.gz".to_string()),
      sha256: Some("ab".repeat(32)),
    };
    assert!(decl.validate().is_err());
  }

  #[test]
  fn source_decl_rejects_neither_method() {
    let decl = SourceDecl {
      name: "x".to_string(),
      git: None,
      rev: None,
      submodules: false,
      url: None,
      sha256: None,
    };
    assert!(decl.validate().is_err());
  }

  #[test]
  fn pip_install_requires_exactly_one_input() {
    let mut decl = PipInstallDecl {
      name: None,
      packages: vec![],
      source: None,
      editable: false,
      jobs: 1,
      env: BTreeMap::new(),
    };
    assert!(decl.validate().is_err());

    decl.packages = vec!["accelmath==0.27.2".to_string()];
    assert!(decl.validate().is_ok());

    decl.source = Some("amp".to_string());
    assert!(decl.validate().is_err());
  }

  #[test]
  fn pip_install_editable_requires_source() {
    let decl = PipInstallDecl {
      name: None,
      packages: vec!["a==1.0".to_string()],
      source: None,
      editable: true,
      jobs: 1,
      env: BTreeMap::new(),
    };
    assert!(decl.validate().is_err());
  }

  #[test]
  fn env_decl_simple() {
    let decl = EnvDecl::new("MAX_JOBS", "1");
    assert_eq!(decl.name, "MAX_JOBS");
    assert_eq!(decl.values.len(), 1);
    assert!(!decl.is_path_like());
  }

  #[test]
  fn env_decl_prepend_preserves_order() {
    let decl = EnvDecl::prepend(
      "LD_PRELOAD",
      vec!["/usr/local/lib/libshim.so".to_string(), "/usr/local/lib/libnccl.so".to_string()],
    );
    assert!(decl.is_path_like());
    assert_eq!(decl.values[0].value, "/usr/local/lib/libshim.so");
    assert_eq!(decl.values[1].value, "/usr/local/lib/libnccl.so");
  }

  #[test]
  fn env_merge_strategy_default_is_replace() {
    assert!(matches!(EnvMergeStrategy::default(), EnvMergeStrategy::Replace));
  }
}
