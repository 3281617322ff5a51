use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use output::OutputFormat;

/// kiln - recipe-driven container image provisioner for GPU training stacks
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show the ordered step plan for a recipe (dry, no side effects)
  Plan {
    /// Path to the recipe file (default: kiln.lua)
    #[arg(default_value = "kiln.lua")]
    recipe: PathBuf,

    /// GPU compute-capability targets (repeatable, e.g. -a 80 -a 90)
    #[arg(short = 'a', long = "arch")]
    arch: Vec<u32>,

    /// Parallel job count for native builds
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
  },

  /// Apply a recipe: execute every step in order, then activate the runtime
  /// environment
  Apply {
    /// Path to the recipe file (default: kiln.lua)
    #[arg(default_value = "kiln.lua")]
    recipe: PathBuf,

    /// GPU compute-capability targets (repeatable, e.g. -a 80 -a 90)
    #[arg(short = 'a', long = "arch")]
    arch: Vec<u32>,

    /// Parallel job count for native builds
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Plan and validate but do not execute
    #[arg(long)]
    dry_run: bool,
  },

  /// Render the activation script for a recipe
  Env {
    /// Path to the recipe file (default: kiln.lua)
    #[arg(default_value = "kiln.lua")]
    recipe: PathBuf,

    /// Print the script instead of writing it
    #[arg(long)]
    print: bool,
  },

  /// Check that the last apply's runtime environment resolves
  Verify,

  /// Show platform info and the last apply report
  Status,

  /// Scaffold a starter recipe
  Init {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    dir: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  // Initialize logging; --verbose raises the default filter.
  let default_filter = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
    .without_time()
    .init();

  match cli.command {
    Commands::Plan {
      recipe,
      arch,
      jobs,
      format,
    } => cmd::plan::cmd_plan(&recipe, &arch, jobs, format),
    Commands::Apply {
      recipe,
      arch,
      jobs,
      dry_run,
    } => cmd::apply::cmd_apply(&recipe, &arch, jobs, dry_run),
    Commands::Env { recipe, print } => cmd::env::cmd_env(&recipe, print),
    Commands::Verify => cmd::verify::cmd_verify(),
    Commands::Status => cmd::status::cmd_status(),
    Commands::Init { dir } => cmd::init::cmd_init(&dir),
  }
}
