//! Well-known paths for the provisioner.
//!
//! Every location has a baked-in default matching the layout of a typical
//! GPU base image, and an environment override so tests (and unusual images)
//! can relocate it:
//!
//! | Path              | Default (elevated)       | Override          |
//! |-------------------|--------------------------|-------------------|
//! | install prefix    | `/usr/local`             | `KILN_PREFIX`     |
//! | source tree root  | `/opt/kiln/src`          | `KILN_WORK_DIR`   |
//! | state directory   | `/var/lib/kiln`          | `KILN_STATE_DIR`  |
//! | activation script | `/etc/profile.d/kiln.sh` | `KILN_ENV_SCRIPT` |
//!
//! Inside a container build the process is root and the system locations
//! apply. Run unelevated (planning a recipe on a workstation), state and the
//! activation script fall back to the user's local data directory instead.

use std::env;
use std::path::PathBuf;

use crate::platform::is_elevated;

/// Environment variable overriding the install prefix.
pub const PREFIX_ENV: &str = "KILN_PREFIX";

/// Environment variable overriding the source checkout root.
pub const WORK_DIR_ENV: &str = "KILN_WORK_DIR";

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "KILN_STATE_DIR";

/// Environment variable overriding the activation script path.
pub const ENV_SCRIPT_ENV: &str = "KILN_ENV_SCRIPT";

/// The install prefix native builds install under (`lib/`, `include/`, `bin/`).
pub fn install_prefix() -> PathBuf {
  env::var_os(PREFIX_ENV)
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("/usr/local"))
}

/// Root directory source checkouts are placed under, one subdirectory per
/// `source{}` declaration.
pub fn work_dir() -> PathBuf {
  env::var_os(WORK_DIR_ENV)
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("/opt/kiln/src"))
}

/// Directory the apply report is written to.
pub fn state_dir() -> PathBuf {
  if let Some(dir) = env::var_os(STATE_DIR_ENV) {
    return PathBuf::from(dir);
  }

  if is_elevated() {
    PathBuf::from("/var/lib/kiln")
  } else {
    user_data_dir()
  }
}

/// Path of the generated activation script.
///
/// `/etc/profile.d` is sourced by login shells; images that start processes
/// without a login shell bake the same variables in with `kiln env --print`.
pub fn env_script() -> PathBuf {
  if let Some(path) = env::var_os(ENV_SCRIPT_ENV) {
    return PathBuf::from(path);
  }

  if is_elevated() {
    PathBuf::from("/etc/profile.d/kiln.sh")
  } else {
    user_data_dir().join("env.sh")
  }
}

/// Per-user fallback for unelevated runs.
fn user_data_dir() -> PathBuf {
  dirs::data_local_dir()
    .unwrap_or_else(env::temp_dir)
    .join("kiln")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_without_overrides() {
    temp_env::with_vars(
      [
        (PREFIX_ENV, None::<&str>),
        (WORK_DIR_ENV, None),
        (STATE_DIR_ENV, None),
        (ENV_SCRIPT_ENV, None),
      ],
      || {
        assert_eq!(install_prefix(), PathBuf::from("/usr/local"));
        assert_eq!(work_dir(), PathBuf::from("/opt/kiln/src"));

        // State and activation land in system or per-user locations
        // depending on elevation; both end under a kiln directory.
        assert!(state_dir().to_string_lossy().contains("kiln"));
        assert!(env_script().to_string_lossy().contains("kiln"));
      },
    );
  }

  #[test]
  fn env_overrides_take_precedence() {
    temp_env::with_vars(
      [
        (PREFIX_ENV, Some("/tmp/prefix")),
        (WORK_DIR_ENV, Some("/tmp/src")),
        (STATE_DIR_ENV, Some("/tmp/state")),
        (ENV_SCRIPT_ENV, Some("/tmp/env.sh")),
      ],
      || {
        assert_eq!(install_prefix(), PathBuf::from("/tmp/prefix"));
        assert_eq!(work_dir(), PathBuf::from("/tmp/src"));
        assert_eq!(state_dir(), PathBuf::from("/tmp/state"));
        assert_eq!(env_script(), PathBuf::from("/tmp/env.sh"));
      },
    );
  }
}
