//! Implementation of the `kiln verify` command.
//!
//! Loads the last apply report and checks that the activated environment
//! still holds: preload entries resolve on disk in their declared order,
//! library paths exist, and the custom entries precede the base image's own
//! values. Exits non-zero when any check fails.

use anyhow::{Context, Result};

use kiln_core::{ApplyReport, verify_report};

use crate::output::{self, symbols};

/// Execute the verify command.
pub fn cmd_verify() -> Result<()> {
  let state_dir = kiln_platform::paths::state_dir();

  let report = ApplyReport::load(&state_dir).context("failed to load apply report")?;
  let Some(report) = report else {
    output::print_error(&format!(
      "no apply report found in {}; run `kiln apply` first",
      state_dir.display()
    ));
    std::process::exit(1);
  };

  let prefix = kiln_platform::paths::install_prefix();
  let verify = verify_report(&report, &prefix).context("verification failed")?;

  output::print_info(&format!("Verifying apply {} ", report.manifest_hash));
  println!();

  for check in &verify.checks {
    let symbol = if check.ok { symbols::SUCCESS } else { symbols::ERROR };
    println!("  {} {}: {}", symbol, check.name, check.detail);
  }

  println!();
  output::print_stat("Preload order", &verify.preload.join(" -> "));
  output::print_stat("Shared objects under prefix", &verify.shared_objects.to_string());

  println!();
  if verify.is_success() {
    output::print_success("Runtime environment verified");
    Ok(())
  } else {
    output::print_error("Verification failed");
    std::process::exit(1);
  }
}
