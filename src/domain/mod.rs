//! Domain models for ti-scaffold
//!
//! Plain data without any I/O concerns.

mod config;
mod identity;
mod template_spec;

pub use config::{PartialConfig, ScaffoldConfig, ValidationError};
pub use identity::{PluginIdentity, PLUGIN_NAME, PLUGIN_VERSION};
pub use template_spec::{TemplateSpec, OUTPUT_DIR, TEMPLATE_EXTENSION, TEMPLATE_SPECS};
