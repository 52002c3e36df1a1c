//! Main CLI application structure

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, info_span};

use crate::domain::PLUGIN_NAME;
use crate::logging;
use crate::plugin::{self, Broker, HandshakeConfig, PluginService, PLUGIN_SERVICE};
use crate::scaffold::{DispatchContext, Dispatcher, ScaffoldArgs};

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let args = ScaffoldArgs::parse();
    let level = logging::resolve_level(args.log_level, |key| std::env::var(key).ok())
        .map_err(|e| anyhow!(e))?;
    logging::init(level);

    let _span = info_span!("plugin", plugin = PLUGIN_NAME).entered();

    if args.dev {
        info!("Running in development mode...");
        run_dev(&args)
    } else {
        info!("Starting plugin...");
        serve_plugin()
    }
}

/// Runs the dispatcher directly against the process arguments
fn run_dev(args: &ScaffoldArgs) -> Result<()> {
    let ctx = DispatchContext::from_process().context("Failed to read working directory")?;
    let outcome = Dispatcher::new().run(&ctx, args)?;

    for file in &outcome.files {
        println!("Created {}", file.display());
    }
    println!(
        "Scaffolded plugin '{}' (package {})",
        outcome.config.name, outcome.config.package
    );

    Ok(())
}

/// Publishes the plugin service to the host
fn serve_plugin() -> Result<()> {
    let ctx = DispatchContext::from_process().context("Failed to read working directory")?;
    let service = PluginService::new(Dispatcher::new(), ctx);

    let mut broker = Broker::new();
    broker.register(PLUGIN_SERVICE, Arc::new(service));

    plugin::serve(HandshakeConfig::titanium(), broker)?;
    Ok(())
}
