//! Pinned Python package installation step.
//!
//! Installs exact-version or VCS-pinned specifiers, or an acquired source
//! tree, with `MAX_JOBS` capped to bound peak memory while native extensions
//! compile. The most likely failure here is an interface mismatch between
//! the base image's bundled communication library and what the pinned
//! package was built against; that compatibility is part of the base-image
//! contract the recipe documents, and nothing here tries to detect it.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use kiln_lua::PipInstallDecl;

use super::super::ExecuteError;
use super::super::process::run_cmd;

/// Validate that every specifier carries a pin.
///
/// Accepted forms: `name==version` (version checked against semver when it
/// parses as one; pip's post/dev suffixes are tolerated) and VCS refs with a
/// revision (`git+https://...@rev`).
pub fn validate_pins(packages: &[String]) -> Result<(), ExecuteError> {
  for spec in packages {
    if let Some((name, version)) = spec.split_once("==") {
      if name.is_empty() || version.is_empty() {
        return Err(ExecuteError::UnpinnedPackage(spec.clone()));
      }
      if semver::Version::parse(version).is_err() {
        // Not fatal: pip versions are a superset of semver (e.g. 0.27.post1).
        warn!(spec = %spec, "version is not semver; relying on pip to resolve it");
      }
    } else if spec.contains("+") {
      let Some((_, rev)) = spec.rsplit_once('@') else {
        return Err(ExecuteError::UnpinnedPackage(spec.clone()));
      };
      if rev.is_empty() {
        return Err(ExecuteError::UnpinnedPackage(spec.clone()));
      }
    } else {
      return Err(ExecuteError::UnpinnedPackage(spec.clone()));
    }
  }

  Ok(())
}

/// Build the install command and environment for a pip step.
pub fn pip_command(decl: &PipInstallDecl, source_dir: Option<&Path>) -> (String, BTreeMap<String, String>) {
  let mut env = decl.env.clone();
  // Cap native-extension build parallelism to bound peak memory.
  env.insert("MAX_JOBS".to_string(), decl.jobs.to_string());

  let cmd = if let Some(dir) = source_dir {
    let editable = if decl.editable { "-e " } else { "" };
    format!("python -m pip install --no-cache-dir {}{}", editable, dir.display())
  } else {
    format!("python -m pip install --no-cache-dir {}", decl.packages.join(" "))
  };

  (cmd, env)
}

/// Execute a pip install step.
pub async fn run_pip_install(
  decl: &PipInstallDecl,
  source_dir: Option<&Path>,
  cwd: &Path,
) -> Result<Vec<String>, ExecuteError> {
  validate_pins(&decl.packages)?;

  info!(
    packages = decl.packages.len(),
    source = decl.source.as_deref().unwrap_or(""),
    max_jobs = decl.jobs,
    "installing Python packages"
  );

  let (cmd, env) = pip_command(decl, source_dir);
  run_cmd(&cmd, &env, cwd).await?;

  Ok(vec![cmd])
}
