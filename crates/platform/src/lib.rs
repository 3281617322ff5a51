//! kiln-platform: host detection and well-known paths for kiln.
//!
//! This crate answers the questions the provisioner has to ask about the
//! environment it runs in: what platform is this, are we elevated, where do
//! the install prefix / source tree / state / activation script live, and
//! how do we emit shell syntax for the target shell.

mod platform;
pub mod paths;
mod shell;

pub use platform::{Arch, HostInfo, Os, Platform, is_elevated};
pub use shell::Shell;
