//! Implementation of the `kiln status` command.

use anyhow::{Context, Result};

use kiln_core::ApplyReport;
use kiln_platform::HostInfo;

use crate::output;

use super::map_core_err;

/// Execute the status command.
///
/// Prints platform information and a summary of the last apply report, if
/// one exists.
pub fn cmd_status() -> Result<()> {
  let host = HostInfo::current();

  output::print_info(&format!("kiln v{}", env!("CARGO_PKG_VERSION")));
  println!();
  output::print_stat("Platform", &host.platform.to_string());
  output::print_stat("Hostname", &host.hostname);
  output::print_stat("User", &host.username);
  output::print_stat("Memory", &output::format_bytes(host.total_memory));
  output::print_stat("CPUs", &host.cpus.to_string());
  output::print_stat("Elevated", if kiln_platform::is_elevated() { "yes" } else { "no" });

  let state_dir = kiln_platform::paths::state_dir();
  let report = map_core_err(ApplyReport::load(&state_dir)).context("failed to load apply report")?;

  println!();
  match report {
    Some(report) => {
      output::print_info("Last apply");
      output::print_stat("Manifest", &report.manifest_hash);
      output::print_stat("Finished", &report.finished_at.to_rfc3339());
      output::print_stat("Steps", &report.steps.len().to_string());
      if let Some(base) = &report.base {
        let tag = base.tag.as_deref().unwrap_or("latest");
        output::print_stat("Base image", &format!("{}:{}", base.name, tag));
      }
      output::print_stat("Activation", &report.env_script.display().to_string());
    }
    None => {
      output::print_info("No apply recorded");
    }
  }

  Ok(())
}
