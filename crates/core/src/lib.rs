//! kiln-core: manifest, planning and execution for kiln.
//!
//! A recipe evaluates to a [`Manifest`]: an ordered list of provisioning
//! steps plus the runtime environment the finished image should activate.
//! Planning builds the step DAG and renders the ordered plan; applying
//! executes the steps strictly in order, first failure terminal, and on full
//! success writes the activation script and the apply report.

pub mod apply;
pub mod dag;
pub mod env;
mod error;
pub mod execute;
pub mod hash;
pub mod manifest;
pub mod placeholder;
pub mod plan;
pub mod report;
pub mod verify;

pub use apply::{ApplyOptions, ApplyOutcome, apply};
pub use dag::StepDag;
pub use env::EnvTable;
pub use error::CoreError;
pub use execute::{ExecuteConfig, ExecuteError, PipelineResult, StepReport, execute_manifest};
pub use hash::{Hashable, ObjectHash};
pub use manifest::{Manifest, Step, StepDef};
pub use plan::{Plan, StepPlan, compute_plan};
pub use report::ApplyReport;
pub use verify::{VerifyCheck, VerifyReport, verify_report};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
