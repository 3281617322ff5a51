//! Platform and architecture detection

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
  Linux,
  Darwin,
}

impl Os {
  /// Detect the current operating system at compile time
  #[cfg(target_os = "linux")]
  pub const fn current() -> Self {
    Os::Linux
  }

  #[cfg(target_os = "macos")]
  pub const fn current() -> Self {
    Os::Darwin
  }

  /// Returns the OS name as used in platform strings
  pub const fn as_str(&self) -> &'static str {
    match self {
      Os::Linux => "linux",
      Os::Darwin => "darwin",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
  X86_64,
  Aarch64,
}

impl Arch {
  /// Detect the current architecture at compile time
  #[cfg(target_arch = "x86_64")]
  pub const fn current() -> Self {
    Arch::X86_64
  }

  #[cfg(target_arch = "aarch64")]
  pub const fn current() -> Self {
    Arch::Aarch64
  }

  /// Returns the architecture name as used in platform strings
  pub const fn as_str(&self) -> &'static str {
    match self {
      Arch::X86_64 => "x86_64",
      Arch::Aarch64 => "aarch64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Combined platform identifier (e.g., "x86_64-linux")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Create a new platform identifier
  pub const fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at compile time
  pub const fn current() -> Self {
    Self {
      arch: Arch::current(),
      os: Os::current(),
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.arch, self.os)
  }
}

/// Host information gathered at runtime for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
  pub platform: Platform,
  pub os: Os,
  pub arch: Arch,
  pub hostname: String,
  pub username: String,
  /// Total physical memory in bytes.
  pub total_memory: u64,
  /// Logical CPU count.
  pub cpus: usize,
}

impl HostInfo {
  /// Gather current host information
  pub fn current() -> Self {
    let platform = Platform::current();
    let sys = sysinfo::System::new_all();

    debug!(platform = %platform, cpus = sys.cpus().len(), "host detected");

    Self {
      platform,
      os: platform.os,
      arch: platform.arch,
      hostname: whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string()),
      username: whoami::username(),
      total_memory: sys.total_memory(),
      cpus: sys.cpus().len(),
    }
  }

  /// Check if running on Linux
  pub fn is_linux(&self) -> bool {
    self.os == Os::Linux
  }
}

/// Check whether the current process runs with elevated privileges.
///
/// Provisioning installs OS packages and writes under the install prefix, so
/// inside a container build this is expected to be true.
#[cfg(unix)]
pub fn is_elevated() -> bool {
  nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
  false
}
