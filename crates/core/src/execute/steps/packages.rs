//! OS package installation step.
//!
//! The vendor GPU base images are Ubuntu, so this drives apt-get: refresh
//! the index, install in one transaction, then drop the index and cache so
//! the layer stays small. `apt-get install` is idempotent; re-running the
//! step on an image that already has the packages is a no-op.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use kiln_lua::PackagesDecl;

use super::super::ExecuteError;
use super::super::process::run_cmd;

/// Build the command sequence for a package installation step.
pub fn package_commands(decl: &PackagesDecl) -> Vec<(String, BTreeMap<String, String>)> {
  let mut env = BTreeMap::new();
  env.insert("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string());

  let mut commands = Vec::new();

  if decl.update {
    commands.push(("apt-get update".to_string(), env.clone()));
  }

  commands.push((
    format!("apt-get install -y --no-install-recommends {}", decl.packages.join(" ")),
    env.clone(),
  ));

  if decl.clean {
    commands.push(("apt-get clean && rm -rf /var/lib/apt/lists/*".to_string(), env));
  }

  commands
}

/// Execute a package installation step.
///
/// Returns the commands that ran, for the step report.
pub async fn install_packages(decl: &PackagesDecl, cwd: &Path) -> Result<Vec<String>, ExecuteError> {
  info!(count = decl.packages.len(), "installing OS packages");

  let commands = package_commands(decl);
  let mut ran = Vec::with_capacity(commands.len());

  for (cmd, env) in &commands {
    run_cmd(cmd, env, cwd).await?;
    ran.push(cmd.clone());
  }

  Ok(ran)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn decl(packages: &[&str], update: bool, clean: bool) -> PackagesDecl {
    PackagesDecl {
      packages: packages.iter().map(|s| s.to_string()).collect(),
      update,
      clean,
    }
  }

  #[test]
  fn full_sequence_with_update_and_clean() {
    let commands = package_commands(&decl(&["build-essential", "git"], true, true));

    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0].0, "apt-get update");
    assert_eq!(commands[1].0, "apt-get install -y --no-install-recommends build-essential git");
    assert!(commands[2].0.starts_with("apt-get clean"));
  }

  #[test]
  fn install_only() {
    let commands = package_commands(&decl(&["vim"], false, false));

    assert_eq!(commands.len(), 1);
    assert!(commands[0].0.contains("vim"));
  }

  #[test]
  fn noninteractive_frontend_is_set() {
    let commands = package_commands(&decl(&["git"], true, true));

    for (_, env) in &commands {
      assert_eq!(env.get("DEBIAN_FRONTEND").map(String::as_str), Some("noninteractive"));
    }
  }
}
