//! Shell command execution for provisioning steps.
//!
//! Unlike a hermetic build sandbox, provisioning composes with the container
//! environment it runs in: the package manager, compilers and interpreters
//! all come from the base image, so commands inherit the process environment
//! and only overlay step-specific variables on top.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use super::ExecuteError;

/// Execute a shell command, capturing output.
///
/// Runs `/bin/sh -c <cmd>` in `cwd` with the inherited environment plus the
/// given overlay. Returns trimmed stdout on success.
pub async fn run_cmd(cmd: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<String, ExecuteError> {
  info!(cmd = %cmd, cwd = %cwd.display(), "executing command");

  let mut command = Command::new("/bin/sh");
  command.arg("-c").arg(cmd).current_dir(cwd);

  for (key, value) in env {
    command.env(key, value);
  }

  let output = command.output().await?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(ExecuteError::CmdFailed {
      cmd: cmd.to_string(),
      code: output.status.code(),
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(stdout)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn execute_simple_command() {
    let temp = TempDir::new().unwrap();

    let result = run_cmd("echo hello", &BTreeMap::new(), temp.path()).await.unwrap();

    assert_eq!(result, "hello");
  }

  #[tokio::test]
  async fn execute_command_with_env_overlay() {
    let temp = TempDir::new().unwrap();

    let mut env = BTreeMap::new();
    env.insert("MAX_JOBS".to_string(), "1".to_string());

    let result = run_cmd("echo $MAX_JOBS", &env, temp.path()).await.unwrap();

    assert_eq!(result, "1");
  }

  #[tokio::test]
  async fn environment_is_inherited() {
    let temp = TempDir::new().unwrap();

    // PATH comes from the parent process, not from the overlay.
    let result = run_cmd("echo $PATH", &BTreeMap::new(), temp.path()).await.unwrap();

    assert!(!result.is_empty());
  }

  #[tokio::test]
  async fn execute_command_with_cwd() {
    let temp = TempDir::new().unwrap();

    run_cmd("touch marker", &BTreeMap::new(), temp.path()).await.unwrap();

    assert!(temp.path().join("marker").exists());
  }

  #[tokio::test]
  async fn execute_command_failure() {
    let temp = TempDir::new().unwrap();

    let result = run_cmd("exit 1", &BTreeMap::new(), temp.path()).await;

    assert!(matches!(result, Err(ExecuteError::CmdFailed { code: Some(1), .. })));
  }

  #[tokio::test]
  async fn execute_multiline_command() {
    let temp = TempDir::new().unwrap();

    let cmd = r#"
      x=1
      y=2
      echo $((x + y))
    "#;

    let result = run_cmd(cmd, &BTreeMap::new(), temp.path()).await.unwrap();

    assert_eq!(result, "3");
  }
}
