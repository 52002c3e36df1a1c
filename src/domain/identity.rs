//! Compiled-in plugin identity

use serde::{Deserialize, Serialize};

/// Name reported to the host on every `Name` query
pub const PLUGIN_NAME: &str = "ti-scaffold";

/// Version reported to the host on every `Version` query
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plugin name and version, fixed at build time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginIdentity {
    pub name: String,
    pub version: String,
}

impl PluginIdentity {
    pub fn current() -> Self {
        Self {
            name: PLUGIN_NAME.to_string(),
            version: PLUGIN_VERSION.to_string(),
        }
    }
}

impl Default for PluginIdentity {
    fn default() -> Self {
        Self::current()
    }
}
