//! ti-scaffold - Titanium plugin that scaffolds new plugin projects
//!
//! Renders a fixed set of embedded templates into `output/` from a
//! configuration merged from flags, environment and a config file. Runs
//! either standalone (`--dev`) or as a plugin served to a Titanium host.

pub mod cli;
pub mod domain;
pub mod logging;
pub mod plugin;
pub mod scaffold;
pub mod storage;
pub mod template;

pub use domain::{PartialConfig, PluginIdentity, ScaffoldConfig, TemplateSpec};
pub use scaffold::{DispatchContext, Dispatcher, ScaffoldError, ScaffoldOutcome};
