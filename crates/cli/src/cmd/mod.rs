//! Subcommand implementations.

pub mod apply;
pub mod env;
pub mod init;
pub mod plan;
pub mod status;
pub mod verify;

use kiln_core::ExecuteConfig;
use kiln_lua::EvalOptions;

/// Convert a core result into an `anyhow::Result` by rendering the error.
///
/// `CoreError` transitively holds an `mlua::Error`, which is not `Send + Sync`,
/// so it cannot flow through anyhow's `Context` directly. Rendering it to a
/// string yields a `Send + Sync` `anyhow::Error` while preserving the message.
pub fn map_core_err<T, E: std::fmt::Display>(result: Result<T, E>) -> anyhow::Result<T> {
  result.map_err(|e| anyhow::anyhow!("{e}"))
}

/// Environment variable carrying comma-separated compute-capability targets.
pub const CUDA_ARCHS_ENV: &str = "KILN_CUDA_ARCHS";

/// Environment variable carrying the native-build job count.
pub const BUILD_JOBS_ENV: &str = "KILN_BUILD_JOBS";

/// Resolve the build configuration from CLI flags with environment
/// fallbacks. Flags win; unset means build-tool defaults.
pub fn build_config(arch: &[u32], jobs: Option<usize>) -> (EvalOptions, ExecuteConfig) {
  let cuda_archs = if arch.is_empty() { archs_from_env() } else { arch.to_vec() };
  let jobs = jobs.or_else(jobs_from_env);

  let eval = EvalOptions {
    cuda_archs: cuda_archs.clone(),
    jobs,
  };

  let execute = ExecuteConfig {
    cuda_archs,
    jobs,
    ..ExecuteConfig::default()
  };

  (eval, execute)
}

fn archs_from_env() -> Vec<u32> {
  std::env::var(CUDA_ARCHS_ENV)
    .ok()
    .map(|value| {
      value
        .split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .collect()
    })
    .unwrap_or_default()
}

fn jobs_from_env() -> Option<usize> {
  std::env::var(BUILD_JOBS_ENV).ok().and_then(|v| v.trim().parse().ok())
}
