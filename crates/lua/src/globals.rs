//! Global Lua functions and the kiln table

use crate::eval::EvalOptions;
use crate::types::{
  BaseImageDecl, EnvDecl, EnvMergeStrategy, EnvValue, HookDecl, NativeBuildDecl, PackagesDecl, PipInstallDecl,
  SourceDecl, StepDecl,
};
use mlua::{Lua, Result as LuaResult, Table, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use kiln_platform::Platform;

/// Shared state for collecting declarations during recipe evaluation
#[derive(Default)]
pub struct Declarations {
  pub base: Option<BaseImageDecl>,
  pub steps: Vec<StepDecl>,
  pub envs: Vec<EnvDecl>,
}

impl Declarations {
  pub fn new() -> Self {
    Self::default()
  }
}

/// Set up the read-only `kiln` global table with platform and build
/// configuration the recipe may branch on.
pub fn setup_kiln_global(lua: &Lua, platform: &Platform, opts: &EvalOptions) -> LuaResult<()> {
  let kiln = lua.create_table()?;

  kiln.set("platform", platform.to_string())?;
  kiln.set("os", platform.os.as_str())?;
  kiln.set("arch", platform.arch.as_str())?;
  kiln.set("version", env!("CARGO_PKG_VERSION"))?;

  // Build configuration (compute-capability targets, parallel jobs)
  kiln.set("cuda_archs", opts.cuda_archs.clone())?;
  kiln.set("jobs", opts.jobs)?;

  lua.globals().set("kiln", kiln)?;

  Ok(())
}

/// Set up the base_image{} global function.
///
/// At most one declaration per recipe; it records the contract only.
pub fn setup_base_image_function(lua: &Lua, declarations: Rc<RefCell<Declarations>>) -> LuaResult<()> {
  let base_fn = lua.create_function(move |_, spec: Table| {
    let name: String = spec
      .get::<String>("name")
      .map_err(|_| mlua::Error::runtime("base_image{} requires 'name' field"))?;

    let decl = BaseImageDecl {
      name,
      tag: spec.get("tag").ok(),
      cuda: spec.get("cuda").ok(),
      python: spec.get("python").ok(),
      torch: spec.get("torch").ok(),
    };

    let mut decls = declarations.borrow_mut();
    if decls.base.is_some() {
      return Err(mlua::Error::runtime("base_image{} declared more than once"));
    }
    decls.base = Some(decl);

    Ok(())
  })?;

  lua.globals().set("base_image", base_fn)?;

  Ok(())
}

/// Set up the step-declaring global functions: packages{}, source{},
/// native_build{}, pip_install{}, post_install{}.
///
/// Declaration order is step order; each function pushes onto the shared
/// ordered list.
pub fn setup_step_functions(lua: &Lua, declarations: Rc<RefCell<Declarations>>) -> LuaResult<()> {
  // packages { "build-essential", "git", update = true, clean = true }
  let decls = declarations.clone();
  let packages_fn = lua.create_function(move |_, spec: Table| {
    let mut packages = Vec::new();
    for item in spec.clone().sequence_values::<String>() {
      packages.push(item?);
    }

    let decl = PackagesDecl {
      packages,
      update: spec.get::<Option<bool>>("update")?.unwrap_or(true),
      clean: spec.get::<Option<bool>>("clean")?.unwrap_or(true),
    };

    decl.validate().map_err(mlua::Error::runtime)?;
    decls.borrow_mut().steps.push(StepDecl::Packages(decl));

    Ok(())
  })?;
  lua.globals().set("packages", packages_fn)?;

  // source { name = "nccl", git = "...", rev = "v2.17.1-1", submodules = true }
  // source { name = "blob", url = "...", sha256 = "..." }
  let decls = declarations.clone();
  let source_fn = lua.create_function(move |_, spec: Table| {
    let name: String = spec
      .get::<String>("name")
      .map_err(|_| mlua::Error::runtime("source{} requires 'name' field"))?;

    let decl = SourceDecl {
      name,
      git: spec.get("git").ok(),
      rev: spec.get("rev").ok(),
      submodules: spec.get::<Option<bool>>("submodules")?.unwrap_or(false),
      url: spec.get("url").ok(),
      sha256: spec.get("sha256").ok(),
    };

    decl.validate().map_err(mlua::Error::runtime)?;
    decls.borrow_mut().steps.push(StepDecl::Source(decl));

    Ok(())
  })?;
  lua.globals().set("source", source_fn)?;

  // native_build { source = "nccl", build = { "make ${jobs_flag} src.build" }, install = { ... } }
  let decls = declarations.clone();
  let native_fn = lua.create_function(move |_, spec: Table| {
    let source: String = spec
      .get::<String>("source")
      .map_err(|_| mlua::Error::runtime("native_build{} requires 'source' field"))?;
    let build: Vec<String> = spec
      .get::<Vec<String>>("build")
      .map_err(|_| mlua::Error::runtime("native_build{} requires 'build' command list"))?;

    let decl = NativeBuildDecl {
      name: spec.get("name").ok(),
      source,
      build,
      install: spec.get::<Option<Vec<String>>>("install")?.unwrap_or_default(),
      gencode_var: spec.get("gencode_var").ok(),
      jobs: spec.get::<Option<usize>>("jobs")?,
      env: get_env_map(&spec)?,
    };

    decl.validate().map_err(mlua::Error::runtime)?;
    decls.borrow_mut().steps.push(StepDecl::NativeBuild(decl));

    Ok(())
  })?;
  lua.globals().set("native_build", native_fn)?;

  // pip_install { packages = { "accelmath==0.27.2" } }
  // pip_install { source = "amp", editable = true, jobs = 1 }
  let decls = declarations.clone();
  let pip_fn = lua.create_function(move |_, spec: Table| {
    let decl = PipInstallDecl {
      name: spec.get("name").ok(),
      packages: spec.get::<Option<Vec<String>>>("packages")?.unwrap_or_default(),
      source: spec.get("source").ok(),
      editable: spec.get::<Option<bool>>("editable")?.unwrap_or(false),
      jobs: spec.get::<Option<usize>>("jobs")?.unwrap_or(1),
      env: get_env_map(&spec)?,
    };

    decl.validate().map_err(mlua::Error::runtime)?;
    decls.borrow_mut().steps.push(StepDecl::PipInstall(decl));

    Ok(())
  })?;
  lua.globals().set("pip_install", pip_fn)?;

  // post_install { source = "amp", run = { "make postinstall" } }
  let decls = declarations.clone();
  let hook_fn = lua.create_function(move |_, spec: Table| {
    let run: Vec<String> = spec
      .get::<Vec<String>>("run")
      .map_err(|_| mlua::Error::runtime("post_install{} requires 'run' command list"))?;

    let decl = HookDecl {
      name: spec.get("name").ok(),
      run,
      source: spec.get("source").ok(),
      env: get_env_map(&spec)?,
    };

    decl.validate().map_err(mlua::Error::runtime)?;
    decls.borrow_mut().steps.push(StepDecl::Hook(decl));

    Ok(())
  })?;
  lua.globals().set("post_install", hook_fn)?;

  Ok(())
}

/// Set up the runtime_env{} global function
///
/// Usage from Lua:
/// ```lua
/// runtime_env {
///     MAX_JOBS = "1",                              -- simple value (replaces existing)
///     PATH = { "/usr/local/bin" },                 -- array = prepend
///     LD_PRELOAD = { prepend = { "/usr/local/lib/libshim.so" } },
///     MANPATH = { append = "/usr/share/man" },     -- explicit append
/// }
/// ```
pub fn setup_env_function(lua: &Lua, declarations: Rc<RefCell<Declarations>>) -> LuaResult<()> {
  let env_fn = lua.create_function(move |_, spec: Table| {
    for pair in spec.pairs::<String, Value>() {
      let (name, value) = pair?;

      let env_decl = parse_env_value(&name, value)?;
      declarations.borrow_mut().envs.push(env_decl);
    }

    Ok(())
  })?;

  lua.globals().set("runtime_env", env_fn)?;

  Ok(())
}

/// Extract the optional `env` table field as a sorted map.
fn get_env_map(spec: &Table) -> Result<BTreeMap<String, String>, mlua::Error> {
  Ok(spec.get::<Option<BTreeMap<String, String>>>("env")?.unwrap_or_default())
}

/// Parse a Lua value into an EnvDecl
fn parse_env_value(name: &str, value: Value) -> Result<EnvDecl, mlua::Error> {
  match value {
    // Simple string value: MAX_JOBS = "1"
    Value::String(s) => {
      let value_str = s.to_str()?.to_string();
      Ok(EnvDecl::new(name, value_str))
    }

    // Array of strings: PATH = { "/usr/local/bin" } means prepend
    Value::Table(t) => {
      let prepend_val: Value = t.get("prepend")?;
      if !matches!(prepend_val, Value::Nil) {
        return parse_strategy_value(name, prepend_val, EnvMergeStrategy::Prepend);
      }

      let append_val: Value = t.get("append")?;
      if !matches!(append_val, Value::Nil) {
        return parse_strategy_value(name, append_val, EnvMergeStrategy::Append);
      }

      // Otherwise treat as array of prepend values
      let mut values = Vec::new();
      for item in t.sequence_values::<String>() {
        values.push(EnvValue::prepend(item?));
      }

      if values.is_empty() {
        return Err(mlua::Error::runtime(format!("env var '{}' has empty array value", name)));
      }

      Ok(EnvDecl {
        name: name.to_string(),
        values,
      })
    }

    _ => Err(mlua::Error::runtime(format!(
      "env var '{}' must be a string or table, got {:?}",
      name,
      value.type_name()
    ))),
  }
}

/// Parse a value with an explicit merge strategy
fn parse_strategy_value(name: &str, value: Value, strategy: EnvMergeStrategy) -> Result<EnvDecl, mlua::Error> {
  match value {
    Value::String(s) => {
      let value_str = s.to_str()?.to_string();
      Ok(EnvDecl {
        name: name.to_string(),
        values: vec![EnvValue {
          value: value_str,
          strategy,
        }],
      })
    }
    Value::Table(t) => {
      let mut values = Vec::new();
      for item in t.sequence_values::<String>() {
        values.push(EnvValue {
          value: item?,
          strategy: strategy.clone(),
        });
      }
      Ok(EnvDecl {
        name: name.to_string(),
        values,
      })
    }
    _ => Err(mlua::Error::runtime(format!(
      "env var '{}' strategy value must be a string or array",
      name
    ))),
  }
}
