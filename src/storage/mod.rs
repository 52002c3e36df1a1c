//! # Configuration Sources
//!
//! Reads the layers a scaffold configuration is merged from.
//!
//! | Layer | Source | Precedence |
//! |-------|--------|------------|
//! | Flags | `--name`, `--package` | highest |
//! | Environment | `NAME`, `PACKAGE` (any case) | |
//! | File | `--config <path>` or `./scaffold.{yaml,yml,toml,json}` | |
//! | Default | empty | lowest |
//!
//! ## Key Types
//!
//! - [`ConfigSource`] - Explicit or conventional config file
//! - [`EnvLayer`] - Environment snapshot
//! - [`resolve`] - Merges and validates all layers

mod config;

pub use config::{
    load_file, resolve, ConfigError, ConfigFormat, ConfigSource, EnvLayer, DEFAULT_CONFIG_FILES,
};
