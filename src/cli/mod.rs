//! Command-line interface definitions for the `kitchen-linode` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};

/// Top-level CLI for the `kitchen-linode` binary.
#[derive(Debug, Parser)]
#[command(
    name = "kitchen-linode",
    about = "Create and destroy Linode instances for test-kitchen suites",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create an instance and record it in the state file.
    #[command(name = "create", about = "Create an instance and record it in the state file")]
    Create(InstanceArgs),
    /// Destroy the instance recorded in the state file.
    #[command(name = "destroy", about = "Destroy the instance recorded in the state file")]
    Destroy(InstanceArgs),
}

/// Shell family of the target platform.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum ShellType {
    /// POSIX shell; post-boot setup runs.
    #[default]
    Bourne,
    /// PowerShell; post-boot setup is skipped.
    Powershell,
}

/// Arguments shared by `create` and `destroy`.
#[derive(Debug, Args)]
pub(crate) struct InstanceArgs {
    /// JSON file holding the instance state between invocations.
    #[arg(long, value_name = "PATH")]
    pub(crate) state: PathBuf,
    /// Kitchen instance name, used in the default label and host name.
    #[arg(long, value_name = "NAME", default_value = "default")]
    pub(crate) instance: String,
    /// Platform name, used as the image when none is configured.
    #[arg(long, value_name = "NAME")]
    pub(crate) platform: Option<String>,
    /// Root of the kitchen project; its directory name stands in for the
    /// job name outside CI.
    #[arg(long, value_name = "PATH")]
    pub(crate) kitchen_root: Option<PathBuf>,
    /// Shell family of the platform.
    #[arg(long, value_enum, default_value_t = ShellType::Bourne)]
    pub(crate) shell: ShellType,
}
