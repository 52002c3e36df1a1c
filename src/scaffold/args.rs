//! Command-line definition shared by the standalone CLI and `Execute`

use std::path::PathBuf;

use clap::Parser;

use crate::domain::{PartialConfig, PLUGIN_NAME};
use crate::logging::LogLevel;

use super::ScaffoldError;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "ti-scaffold")]
#[command(version, about = "Scaffold a new Titanium plugin")]
#[command(
    long_about = "Scaffold creates a new Titanium plugin project with the necessary boilerplate code.\n\n\
                  Without --dev the binary serves itself as a plugin to a Titanium host."
)]
pub struct ScaffoldArgs {
    /// Run in development mode (bypass the plugin server)
    #[arg(long)]
    pub dev: bool,

    /// Name of the plugin to scaffold
    #[arg(long)]
    pub name: Option<String>,

    /// Package of the generated sources
    #[arg(long)]
    pub package: Option<String>,

    /// Config file (YAML, TOML or JSON); must exist when given
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level [default: info, or TI_SCAFFOLD_LOG_LEVEL]
    ///
    /// Only the process that installs the subscriber uses this; an `Execute`
    /// call accepts the flag and leaves logging unchanged.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}

impl ScaffoldArgs {
    /// Parses `args` as if they followed the program name on a command line
    pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ScaffoldError> {
        let argv = std::iter::once(PLUGIN_NAME).chain(args.iter().map(AsRef::as_ref));
        Self::try_parse_from(argv).map_err(|e| ScaffoldError::InvalidArgs(e.to_string().trim().to_string()))
    }

    /// The flag layer of the configuration
    pub fn flag_layer(&self) -> PartialConfig {
        PartialConfig::new(self.name.clone(), self.package.clone())
    }
}
