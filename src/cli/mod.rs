//! # Command-Line Interface
//!
//! | Invocation | Behavior |
//! |------------|----------|
//! | `ti-scaffold` | Serve as a plugin (requires the host handshake) |
//! | `ti-scaffold --dev --name N --package P` | Scaffold directly |
//!
//! Flags: `--name`, `--package`, `--config <path>`,
//! `--log-level <debug|info|warn|error>`.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute.

mod app;

pub use app::run;
