//! Placeholder expansion for step command strings.
//!
//! Build and install commands in a recipe may reference values only known at
//! execution time: the configured compute-capability flags, the parallel job
//! count, the install prefix and the source directory. Placeholders use the
//! `${name}` form; unknown names are left untouched so shell parameter
//! expansion in the same string keeps working.

use std::collections::BTreeMap;

/// Expand `${name}` placeholders in a command template.
pub fn expand(template: &str, vars: &BTreeMap<&str, String>) -> String {
  let mut out = template.to_string();
  for (key, value) in vars {
    out = out.replace(&format!("${{{}}}", key), value);
  }
  out
}

/// Render the NVCC gencode flag list for a compute-capability set.
///
/// `[80, 90]` becomes
/// `-gencode=arch=compute_80,code=sm_80 -gencode=arch=compute_90,code=sm_90`.
/// An empty set renders empty, leaving the build tool's default target set
/// in effect.
pub fn gencode_flags(archs: &[u32]) -> String {
  archs
    .iter()
    .map(|cc| format!("-gencode=arch=compute_{cc},code=sm_{cc}"))
    .collect::<Vec<_>>()
    .join(" ")
}
