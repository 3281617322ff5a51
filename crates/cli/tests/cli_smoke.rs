//! CLI smoke tests for kiln.
//!
//! These tests verify that all CLI commands run without panicking and
//! return appropriate exit codes. Recipes used here only declare hook and
//! runtime_env steps so nothing touches the package manager or the network.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the kiln binary.
fn kiln_cmd() -> Command {
  cargo_bin_cmd!("kiln")
}

/// Create a temp directory with a recipe file.
fn temp_recipe(content: &str) -> TempDir {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("kiln.lua"), content).unwrap();
  temp
}

/// Apply isolation env vars so nothing escapes the temp directory.
fn isolate(cmd: &mut Command, temp: &TempDir) {
  cmd
    .env("KILN_STATE_DIR", temp.path().join("state"))
    .env("KILN_WORK_DIR", temp.path().join("src"))
    .env("KILN_PREFIX", temp.path().join("prefix"))
    .env("KILN_ENV_SCRIPT", temp.path().join("etc/kiln.sh"));
}

/// Recipe that provisions nothing but exercises the full flow.
const HOOK_RECIPE: &str = r#"
post_install { name = "noop", run = { "true" } }

runtime_env {
    LD_LIBRARY_PATH = { "/usr/local/lib" },
    LD_PRELOAD = { prepend = { "/usr/local/lib/libdist_shim.so", "/usr/local/lib/libnccl.so" } },
}
"#;

/// Recipe whose single step fails.
const FAILING_RECIPE: &str = r#"
post_install { name = "ok", run = { "true" } }
post_install { name = "broken", run = { "exit 1" } }
post_install { name = "after", run = { "true" } }
"#;

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  kiln_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  kiln_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("kiln"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["plan", "apply", "env", "verify", "status", "init"] {
    kiln_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// init
// =============================================================================

#[test]
#[serial]
fn init_creates_recipe_files() {
  let temp = TempDir::new().unwrap();
  let dir = temp.path().join("image");

  kiln_cmd().arg("init").arg(&dir).assert().success();

  assert!(dir.join("kiln.lua").exists());
  assert!(dir.join(".luarc.json").exists());
  assert!(dir.join(".kiln/types/globals.d.lua").exists());
}

#[test]
#[serial]
fn init_fails_if_recipe_exists() {
  let temp = temp_recipe(HOOK_RECIPE);

  kiln_cmd()
    .arg("init")
    .arg(temp.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("already exists"));
}

#[test]
#[serial]
fn init_template_plans_cleanly() {
  let temp = TempDir::new().unwrap();
  let dir = temp.path().join("image");

  kiln_cmd().arg("init").arg(&dir).assert().success();

  kiln_cmd()
    .arg("plan")
    .arg(dir.join("kiln.lua"))
    .assert()
    .success()
    .stdout(predicate::str::contains("step(s) planned"));
}

// =============================================================================
// plan
// =============================================================================

#[test]
#[serial]
fn plan_with_hook_recipe() {
  let temp = temp_recipe(HOOK_RECIPE);

  kiln_cmd()
    .arg("plan")
    .arg(temp.path().join("kiln.lua"))
    .assert()
    .success()
    .stdout(predicate::str::contains("1 step(s) planned"));
}

#[test]
#[serial]
fn plan_json_output() {
  let temp = temp_recipe(HOOK_RECIPE);

  kiln_cmd()
    .arg("plan")
    .arg(temp.path().join("kiln.lua"))
    .arg("--format")
    .arg("json")
    .assert()
    .success()
    .stdout(predicate::str::contains("manifest_hash"));
}

#[test]
#[serial]
fn plan_nonexistent_recipe_fails() {
  kiln_cmd().arg("plan").arg("/nonexistent/path/kiln.lua").assert().failure();
}

#[test]
#[serial]
fn plan_invalid_lua_fails() {
  let temp = temp_recipe("this is not valid lua {{{");

  kiln_cmd().arg("plan").arg(temp.path().join("kiln.lua")).assert().failure();
}

#[test]
#[serial]
fn plan_forward_reference_fails() {
  let temp = temp_recipe(
    r#"
      native_build { source = "later", build = { "make" } }
      source { name = "later", git = "https://example.com/later.git" }
    "#,
  );

  kiln_cmd().arg("plan").arg(temp.path().join("kiln.lua")).assert().failure();
}

// =============================================================================
// apply
// =============================================================================

#[test]
#[serial]
fn apply_hook_recipe_succeeds() {
  let temp = temp_recipe(HOOK_RECIPE);

  let mut cmd = kiln_cmd();
  isolate(&mut cmd, &temp);
  cmd
    .arg("apply")
    .arg(temp.path().join("kiln.lua"))
    .assert()
    .success()
    .stdout(predicate::str::contains("Apply complete"));

  // The activation script landed with the preload order intact.
  let script = std::fs::read_to_string(temp.path().join("etc/kiln.sh")).unwrap();
  assert!(script.contains("libdist_shim.so:/usr/local/lib/libnccl.so"));

  // The report landed in the state dir.
  assert!(temp.path().join("state/report.json").exists());
}

#[test]
#[serial]
fn apply_failing_recipe_exits_nonzero() {
  let temp = temp_recipe(FAILING_RECIPE);

  let mut cmd = kiln_cmd();
  isolate(&mut cmd, &temp);
  cmd
    .arg("apply")
    .arg(temp.path().join("kiln.lua"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("broken"));

  // No report: nothing records a partial image as usable.
  assert!(!temp.path().join("state/report.json").exists());
}

#[test]
#[serial]
fn apply_dry_run_executes_nothing() {
  let temp = temp_recipe(HOOK_RECIPE);

  let mut cmd = kiln_cmd();
  isolate(&mut cmd, &temp);
  cmd
    .arg("apply")
    .arg(temp.path().join("kiln.lua"))
    .arg("--dry-run")
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"));

  assert!(!temp.path().join("state/report.json").exists());
}

#[test]
#[serial]
fn apply_nonexistent_recipe_fails() {
  let temp = TempDir::new().unwrap();

  let mut cmd = kiln_cmd();
  isolate(&mut cmd, &temp);
  cmd.arg("apply").arg("/nonexistent/path/kiln.lua").assert().failure();
}

// =============================================================================
// env
// =============================================================================

#[test]
#[serial]
fn env_print_renders_script() {
  let temp = temp_recipe(HOOK_RECIPE);

  kiln_cmd()
    .arg("env")
    .arg(temp.path().join("kiln.lua"))
    .arg("--print")
    .assert()
    .success()
    .stdout(predicate::str::contains("export LD_PRELOAD="))
    .stdout(predicate::str::contains("${LD_PRELOAD:+:$LD_PRELOAD}"));
}

#[test]
#[serial]
fn env_without_declarations() {
  let temp = temp_recipe(r#"post_install { run = { "true" } }"#);

  kiln_cmd()
    .arg("env")
    .arg(temp.path().join("kiln.lua"))
    .arg("--print")
    .assert()
    .success()
    .stdout(predicate::str::contains("No runtime environment"));
}

// =============================================================================
// verify
// =============================================================================

#[test]
#[serial]
fn verify_without_report_fails() {
  let temp = TempDir::new().unwrap();

  let mut cmd = kiln_cmd();
  isolate(&mut cmd, &temp);
  cmd
    .arg("verify")
    .assert()
    .failure()
    .stderr(predicate::str::contains("no apply report"));
}

#[test]
#[serial]
fn verify_after_apply_reports_missing_libraries() {
  let temp = temp_recipe(HOOK_RECIPE);

  let mut apply = kiln_cmd();
  isolate(&mut apply, &temp);
  apply.arg("apply").arg(temp.path().join("kiln.lua")).assert().success();

  // The preload entries point at libraries no step installed, so
  // verification must fail and name them.
  let mut verify = kiln_cmd();
  isolate(&mut verify, &temp);
  verify
    .arg("verify")
    .assert()
    .failure()
    .stdout(predicate::str::contains("libdist_shim.so"));
}

// =============================================================================
// status
// =============================================================================

#[test]
#[serial]
fn status_shows_platform() {
  let temp = TempDir::new().unwrap();

  let mut cmd = kiln_cmd();
  isolate(&mut cmd, &temp);
  cmd
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("Platform"))
    .stdout(predicate::str::contains("No apply recorded"));
}

#[test]
#[serial]
fn status_shows_last_apply() {
  let temp = temp_recipe(HOOK_RECIPE);

  let mut apply = kiln_cmd();
  isolate(&mut apply, &temp);
  apply.arg("apply").arg(temp.path().join("kiln.lua")).assert().success();

  let mut status = kiln_cmd();
  isolate(&mut status, &temp);
  status
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("Last apply"));
}
