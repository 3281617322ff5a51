//! Post-apply verification.
//!
//! Confirms that the activated runtime environment holds: every preload
//! entry resolves to a file on disk, the declared preload order is the order
//! the dynamic loader will see, library-path entries exist, and the custom
//! entries sit ahead of whatever the base environment exports.

use std::path::Path;

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use kiln_lua::EnvMergeStrategy;

use crate::env::EnvTable;
use crate::error::CoreError;
use crate::report::ApplyReport;

/// A single verification check.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyCheck {
  pub name: String,
  pub ok: bool,
  pub detail: String,
}

/// Result of verifying an apply report.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
  /// Individual checks, in evaluation order.
  pub checks: Vec<VerifyCheck>,

  /// The preload entries in effective order.
  pub preload: Vec<String>,

  /// Number of shared objects found under the install prefix.
  pub shared_objects: usize,
}

impl VerifyReport {
  /// Returns true if every check passed.
  pub fn is_success(&self) -> bool {
    self.checks.iter().all(|c| c.ok)
  }
}

/// Verify the environment a previous apply activated.
pub fn verify_report(report: &ApplyReport, prefix: &Path) -> Result<VerifyReport, CoreError> {
  let table = EnvTable::from_decls(&report.envs)?;

  let mut checks = Vec::new();

  checks.push(VerifyCheck {
    name: "activation script".to_string(),
    ok: report.env_script.exists(),
    detail: report.env_script.display().to_string(),
  });

  // Every preload entry must resolve to a file on disk.
  let preload = declared_values(&table, "LD_PRELOAD");
  for entry in &preload {
    let path = Path::new(entry);
    checks.push(VerifyCheck {
      name: "preload entry".to_string(),
      ok: path.is_file(),
      detail: entry.clone(),
    });
  }

  // Library-path entries must be directories.
  for entry in declared_values(&table, "LD_LIBRARY_PATH") {
    let path = Path::new(&entry);
    checks.push(VerifyCheck {
      name: "library path".to_string(),
      ok: path.is_dir(),
      detail: entry,
    });
  }

  // Custom entries must precede whatever the base environment exports, so
  // the custom libraries win resolution while the base stays a fallback.
  if let Some(decl) = table.get("LD_PRELOAD") {
    let declared = decl
      .values
      .iter()
      .filter(|v| matches!(v.strategy, EnvMergeStrategy::Prepend))
      .map(|v| v.value.clone())
      .collect::<Vec<_>>()
      .join(":");

    let resolved = table.resolve(|name| std::env::var(name).ok());
    let effective = resolved.get("LD_PRELOAD").cloned().unwrap_or_default();

    checks.push(VerifyCheck {
      name: "preload precedence".to_string(),
      ok: effective.starts_with(&declared),
      detail: effective,
    });
  }

  let shared_objects = count_shared_objects(&prefix.join("lib"));
  debug!(prefix = %prefix.display(), shared_objects, "scanned install prefix");

  Ok(VerifyReport {
    checks,
    preload,
    shared_objects,
  })
}

/// The values a declaration contributes, in declared order.
fn declared_values(table: &EnvTable, name: &str) -> Vec<String> {
  table
    .get(name)
    .map(|decl| decl.values.iter().map(|v| v.value.clone()).collect())
    .unwrap_or_default()
}

/// Count shared objects under a lib directory.
fn count_shared_objects(lib_dir: &Path) -> usize {
  if !lib_dir.is_dir() {
    return 0;
  }

  WalkDir::new(lib_dir)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter(|e| {
      e.file_name()
        .to_str()
        .map(|name| name.contains(".so"))
        .unwrap_or(false)
    })
    .count()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::path::PathBuf;
  use kiln_lua::EnvDecl;
  use tempfile::TempDir;

  fn report_with(envs: Vec<EnvDecl>, env_script: PathBuf) -> ApplyReport {
    ApplyReport {
      manifest_hash: "a1b2c3d4e5f6a7b8c9d0".to_string(),
      finished_at: chrono::Utc::now(),
      base: None,
      steps: vec![],
      envs,
      env_script,
    }
  }

  #[test]
  fn all_checks_pass_with_resolvable_libraries() {
    let temp = TempDir::new().unwrap();
    let prefix = temp.path().join("prefix");
    let lib_dir = prefix.join("lib");
    fs::create_dir_all(&lib_dir).unwrap();

    let shim = lib_dir.join("libdist_shim.so");
    let nccl = lib_dir.join("libnccl.so");
    fs::write(&shim, "").unwrap();
    fs::write(&nccl, "").unwrap();

    let script = temp.path().join("kiln.sh");
    fs::write(&script, "#!/bin/sh\n").unwrap();

    let report = report_with(
      vec![
        EnvDecl::prepend("LD_LIBRARY_PATH", vec![lib_dir.display().to_string()]),
        EnvDecl::prepend(
          "LD_PRELOAD",
          vec![shim.display().to_string(), nccl.display().to_string()],
        ),
      ],
      script,
    );

    let verify = verify_report(&report, &prefix).unwrap();

    assert!(verify.is_success(), "checks: {:?}", verify.checks);
    assert_eq!(verify.preload.len(), 2);
    assert_eq!(verify.shared_objects, 2);
    // Declared order is effective order: shim first.
    assert!(verify.preload[0].ends_with("libdist_shim.so"));
  }

  #[test]
  fn missing_preload_entry_fails() {
    let temp = TempDir::new().unwrap();
    let prefix = temp.path().join("prefix");

    let script = temp.path().join("kiln.sh");
    fs::write(&script, "#!/bin/sh\n").unwrap();

    let report = report_with(
      vec![EnvDecl::prepend(
        "LD_PRELOAD",
        vec![temp.path().join("lib/libmissing.so").display().to_string()],
      )],
      script,
    );

    let verify = verify_report(&report, &prefix).unwrap();

    assert!(!verify.is_success());
    let failed: Vec<_> = verify.checks.iter().filter(|c| !c.ok).collect();
    assert!(failed.iter().any(|c| c.name == "preload entry"));
  }

  #[test]
  fn missing_activation_script_fails() {
    let temp = TempDir::new().unwrap();
    let report = report_with(vec![], temp.path().join("nope.sh"));

    let verify = verify_report(&report, temp.path()).unwrap();

    assert!(!verify.is_success());
  }

  #[test]
  fn shared_object_census_ignores_other_files() {
    let temp = TempDir::new().unwrap();
    let lib_dir = temp.path().join("lib");
    fs::create_dir_all(&lib_dir).unwrap();
    fs::write(lib_dir.join("libnccl.so.2.17.1"), "").unwrap();
    fs::write(lib_dir.join("libnccl.a"), "").unwrap();
    fs::write(lib_dir.join("README"), "").unwrap();

    assert_eq!(count_shared_objects(&lib_dir), 1);
  }
}
