//! The apply report.
//!
//! Written to the state directory only after every step has completed — a
//! failed build leaves no report, so nothing ever records a partial image as
//! usable. `kiln status` and `kiln verify` read it back.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kiln_lua::{BaseImageDecl, EnvDecl};

use crate::error::CoreError;
use crate::execute::StepReport;

/// File name of the report inside the state directory.
const REPORT_FILE: &str = "report.json";

/// Record of a completed apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
  /// Manifest hash of the applied recipe.
  pub manifest_hash: String,

  /// When the apply finished.
  pub finished_at: DateTime<Utc>,

  /// Base-image contract from the recipe.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub base: Option<BaseImageDecl>,

  /// Step reports in execution order.
  pub steps: Vec<StepReport>,

  /// The runtime environment declarations that were activated.
  pub envs: Vec<EnvDecl>,

  /// Where the activation script was written.
  pub env_script: PathBuf,
}

impl ApplyReport {
  /// Persist the report into the state directory.
  pub fn save(&self, state_dir: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(state_dir)?;

    let path = state_dir.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(self)?;
    fs::write(&path, json)?;

    info!(path = %path.display(), "apply report saved");
    Ok(())
  }

  /// Load the report from the state directory, if one exists.
  pub fn load(state_dir: &Path) -> Result<Option<Self>, CoreError> {
    let path = state_dir.join(REPORT_FILE);

    if !path.exists() {
      debug!(path = %path.display(), "no apply report found");
      return Ok(None);
    }

    let json = fs::read_to_string(&path)?;
    let report = serde_json::from_str(&json)?;
    Ok(Some(report))
  }
}
