//! Shell syntax emission for the generated activation script.
//!
//! Target images are Linux containers, so only POSIX sh and bash are
//! supported. The prepend/append forms guard against an unset variable so a
//! fresh environment never ends up with a dangling separator.

use std::env;
use std::path::PathBuf;

/// Supported shell dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shell {
  #[default]
  Sh,
  Bash,
}

impl Shell {
  /// Detect the current shell from `$SHELL`, falling back to POSIX sh.
  pub fn detect() -> Self {
    if let Ok(shell) = env::var("SHELL") {
      let shell_name = PathBuf::from(&shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

      if shell_name.contains("bash") {
        return Shell::Bash;
      }
    }

    Shell::Sh
  }

  /// Get the shell name as a string
  pub fn as_str(&self) -> &'static str {
    match self {
      Shell::Sh => "sh",
      Shell::Bash => "bash",
    }
  }

  /// Generate the script header/shebang
  pub fn header(&self) -> &'static str {
    match self {
      Shell::Sh => "#!/bin/sh",
      Shell::Bash => "#!/usr/bin/env bash",
    }
  }

  /// Generate an export statement replacing any existing value
  pub fn export_var(&self, name: &str, value: &str) -> String {
    format!("export {}=\"{}\"", name, value)
  }

  /// Generate a prepend statement for a separator-joined variable.
  ///
  /// The existing value stays reachable behind the new entries, so whatever
  /// the base environment shipped remains a fallback:
  /// `export PATH="/usr/local/bin${PATH:+:$PATH}"`.
  pub fn prepend_var(&self, name: &str, value: &str) -> String {
    format!("export {name}=\"{value}${{{name}:+:${name}}}\"")
  }

  /// Generate an append statement for a separator-joined variable
  pub fn append_var(&self, name: &str, value: &str) -> String {
    format!("export {name}=\"${{{name}:+${name}:}}{value}\"")
  }
}

impl std::fmt::Display for Shell {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
