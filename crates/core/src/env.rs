//! The runtime environment table and activation script.
//!
//! `runtime_env{}` declarations merge into a single table with one writer
//! per variable. Activation renders the table into a POSIX script; prepends
//! land ahead of whatever value the base image already exported, so the
//! custom libraries win symbol resolution while the base defaults remain a
//! fallback. Rendering is deterministic: declaration order in, line order
//! out.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::info;

use kiln_lua::{EnvDecl, EnvMergeStrategy};
use kiln_platform::Shell;

use crate::error::CoreError;

/// A validated set of runtime environment declarations.
#[derive(Debug, Clone, Default)]
pub struct EnvTable {
  entries: Vec<EnvDecl>,
}

impl EnvTable {
  /// Build the table, enforcing the single-writer invariant and rejecting
  /// declarations that mix replace with prepend/append values.
  pub fn from_decls(decls: &[EnvDecl]) -> Result<Self, CoreError> {
    let mut names = BTreeSet::new();

    for decl in decls {
      if !names.insert(decl.name.as_str()) {
        return Err(CoreError::EnvConflict(decl.name.clone()));
      }

      if decl.values.is_empty() {
        return Err(CoreError::InvalidEnv {
          name: decl.name.clone(),
          message: "no values".to_string(),
        });
      }

      let replaces = decl
        .values
        .iter()
        .filter(|v| matches!(v.strategy, EnvMergeStrategy::Replace))
        .count();
      if replaces > 0 && replaces != decl.values.len() {
        return Err(CoreError::InvalidEnv {
          name: decl.name.clone(),
          message: "cannot mix replace with prepend/append".to_string(),
        });
      }
      if replaces > 1 {
        return Err(CoreError::InvalidEnv {
          name: decl.name.clone(),
          message: "multiple replace values".to_string(),
        });
      }
    }

    Ok(Self {
      entries: decls.to_vec(),
    })
  }

  /// Whether the table has any declarations.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Declarations in render order.
  pub fn entries(&self) -> &[EnvDecl] {
    &self.entries
  }

  /// Look up a declaration by variable name.
  pub fn get(&self, name: &str) -> Option<&EnvDecl> {
    self.entries.iter().find(|e| e.name == name)
  }

  /// Render the activation script.
  pub fn render_script(&self, shell: &Shell) -> String {
    let mut script = String::new();
    script.push_str(shell.header());
    script.push('\n');
    script.push_str("# Generated by kiln - do not edit\n\n");

    for decl in &self.entries {
      for line in render_decl(decl, shell) {
        script.push_str(&line);
        script.push('\n');
      }
    }

    script
  }

  /// Write the activation script to `path`, creating parent directories.
  pub fn write_script(&self, path: &Path, shell: &Shell) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }

    fs::write(path, self.render_script(shell))?;
    info!(path = %path.display(), vars = self.entries.len(), "activation script written");

    Ok(())
  }

  /// Compute the final value of every variable given a base environment.
  ///
  /// Mirrors what sourcing the rendered script would produce; used by
  /// verification and tests.
  pub fn resolve<F>(&self, base: F) -> BTreeMap<String, String>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut resolved = BTreeMap::new();

    for decl in &self.entries {
      let existing = base(&decl.name).filter(|v| !v.is_empty());

      let mut prepends = Vec::new();
      let mut appends = Vec::new();
      let mut replace = None;

      for value in &decl.values {
        match value.strategy {
          EnvMergeStrategy::Replace => replace = Some(value.value.clone()),
          EnvMergeStrategy::Prepend => prepends.push(value.value.clone()),
          EnvMergeStrategy::Append => appends.push(value.value.clone()),
        }
      }

      let value = if let Some(replace) = replace {
        replace
      } else {
        let mut parts = prepends;
        if let Some(existing) = existing {
          parts.push(existing);
        }
        parts.extend(appends);
        parts.join(":")
      };

      resolved.insert(decl.name.clone(), value);
    }

    resolved
  }
}

/// Render a single declaration into script lines.
fn render_decl(decl: &EnvDecl, shell: &Shell) -> Vec<String> {
  let mut prepends = Vec::new();
  let mut appends = Vec::new();

  for value in &decl.values {
    match value.strategy {
      EnvMergeStrategy::Replace => {
        return vec![shell.export_var(&decl.name, &value.value)];
      }
      EnvMergeStrategy::Prepend => prepends.push(value.value.as_str()),
      EnvMergeStrategy::Append => appends.push(value.value.as_str()),
    }
  }

  let mut lines = Vec::new();
  if !prepends.is_empty() {
    // One statement per variable keeps the declared order intact: the first
    // declared entry is the first the dynamic loader sees.
    lines.push(shell.prepend_var(&decl.name, &prepends.join(":")));
  }
  if !appends.is_empty() {
    lines.push(shell.append_var(&decl.name, &appends.join(":")));
  }

  lines
}
