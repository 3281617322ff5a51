//! Implementation of the `kiln init` command.
//!
//! Scaffolds a starter recipe plus LuaLS editor configuration so recipe
//! authors get completion for the kiln globals.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::output;

/// Template for the kiln.lua starter recipe
const RECIPE_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../lua/template.lua"));

/// Embedded globals.d.lua type definitions
const GLOBALS_D_LUA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../lua/globals.d.lua"));

/// Template for .luarc.json (LuaLS configuration)
const LUARC_JSON: &str = r#"{
  "$schema": "https://raw.githubusercontent.com/LuaLS/vscode-lua/master/setting/schema.json",
  "runtime": {
    "version": "Lua 5.4"
  },
  "workspace": {
    "library": [
      ".kiln/types"
    ],
    "checkThirdParty": false
  },
  "diagnostics": {
    "globals": ["kiln"]
  }
}
"#;

/// Execute the init command.
pub fn cmd_init(dir: &Path) -> Result<()> {
  let recipe_path = dir.join("kiln.lua");
  if recipe_path.exists() {
    bail!("{} already exists", recipe_path.display());
  }

  fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

  fs::write(&recipe_path, RECIPE_TEMPLATE).with_context(|| format!("failed to write {}", recipe_path.display()))?;

  let types_dir = dir.join(".kiln/types");
  fs::create_dir_all(&types_dir)?;
  fs::write(types_dir.join("globals.d.lua"), GLOBALS_D_LUA)?;

  fs::write(dir.join(".luarc.json"), LUARC_JSON)?;

  output::print_success(&format!("Initialized {}", recipe_path.display()));
  println!();
  println!("Next steps:");
  println!("  1. Edit {} with your pins and build commands", recipe_path.display());
  println!("  2. kiln plan");
  println!("  3. kiln apply --arch 80 --arch 90");

  Ok(())
}
