//! # Command Dispatcher
//!
//! Single entry point for a scaffold run. The standalone CLI (`--dev`) and
//! the plugin's `Execute` call both funnel through [`Dispatcher::dispatch`].
//!
//! ## Steps
//!
//! 1. Parse the argument list with [`ScaffoldArgs`]
//! 2. Select the config file ([`ConfigSource`])
//! 3. Merge file, environment and flag layers; validate
//! 4. Create the output directory
//! 5. Render [`TEMPLATE_SPECS`] in order, stopping at the first failure
//!
//! Nothing is written before validation succeeds. A failure in a later
//! template leaves the files of earlier templates on disk.
//!
//! Arguments, working directory and environment are passed in through
//! [`DispatchContext`]; the dispatcher reads no process-global state.

mod args;
mod error;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span};

use crate::domain::{ScaffoldConfig, OUTPUT_DIR, TEMPLATE_SPECS};
use crate::storage::{self, ConfigSource, EnvLayer};
use crate::template::{EmbeddedTemplates, Renderer, TemplateSource};

pub use args::ScaffoldArgs;
pub use error::ScaffoldError;

/// Everything a dispatch reads from its surroundings
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Directory the config file is looked up in and output is written under
    pub working_dir: PathBuf,

    /// Environment layer of the configuration
    pub env: EnvLayer,
}

impl DispatchContext {
    pub fn new(working_dir: impl Into<PathBuf>, env: EnvLayer) -> Self {
        Self {
            working_dir: working_dir.into(),
            env,
        }
    }

    /// Snapshot of the current directory and environment
    pub fn from_process() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?, EnvLayer::from_process()))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.working_dir.join(OUTPUT_DIR)
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldOutcome {
    pub config: ScaffoldConfig,

    /// Generated files, in render order
    pub files: Vec<PathBuf>,
}

/// Runs scaffold invocations against a template source
#[derive(Clone)]
pub struct Dispatcher {
    templates: Arc<dyn TemplateSource>,
}

impl Dispatcher {
    /// Dispatcher using the templates embedded in the binary
    pub fn new() -> Self {
        Self::with_templates(Arc::new(EmbeddedTemplates))
    }

    pub fn with_templates(templates: Arc<dyn TemplateSource>) -> Self {
        Self { templates }
    }

    /// Parses `args` like a fresh command line and runs the scaffold
    pub fn dispatch<S: AsRef<str>>(
        &self,
        ctx: &DispatchContext,
        args: &[S],
    ) -> Result<ScaffoldOutcome, ScaffoldError> {
        let args = ScaffoldArgs::parse_args(args)?;
        self.run(ctx, &args)
    }

    /// Runs the scaffold for already-parsed arguments
    pub fn run(
        &self,
        ctx: &DispatchContext,
        args: &ScaffoldArgs,
    ) -> Result<ScaffoldOutcome, ScaffoldError> {
        let _span = info_span!("dispatch", working_dir = %ctx.working_dir.display()).entered();

        let source = ConfigSource::select(args.config.as_deref(), &ctx.working_dir);
        debug!(?source, "selected config source");

        let config = storage::resolve(&source, &ctx.env, args.flag_layer())?;
        info!(name = %config.name, package = %config.package, "creating plugin");

        let files = self.render(&config, &ctx.output_dir())?;

        Ok(ScaffoldOutcome { config, files })
    }

    fn render(
        &self,
        config: &ScaffoldConfig,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ScaffoldError> {
        let renderer = Renderer::new(self.templates.as_ref(), output_dir);
        Ok(renderer.render_all(&TEMPLATE_SPECS, config)?)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
