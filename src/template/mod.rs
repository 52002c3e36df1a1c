//! # Template Rendering
//!
//! Renders the fixed list of [`TemplateSpec`]s against a [`ScaffoldConfig`]
//! and writes one output file per template.
//!
//! ## Pipeline
//!
//! ```text
//! TemplateSource ── load ──> source text
//!                               │ parse (minijinja)
//!                               ▼
//!                           Template ── render(config) ──> RenderedFile
//!                                                              │ write
//!                                                              ▼
//!                                                  output/<key without .tmpl>
//! ```
//!
//! Templates are rendered one at a time, in order. The first failure aborts
//! the run; files written by earlier templates stay on disk.
//!
//! ## Key Types
//!
//! - [`TemplateSource`] - Where template text comes from
//! - [`EmbeddedTemplates`] - Templates compiled into the binary
//! - [`InMemoryTemplates`] - Caller-supplied templates
//! - [`Renderer`] - Parses, renders and writes

mod source;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use minijinja::{Environment, UndefinedBehavior};
use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::domain::{ScaffoldConfig, TemplateSpec};

pub use source::{EmbeddedTemplates, InMemoryTemplates, TemplateSource};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("template not found: {template}")]
    Missing { template: String },

    #[error("failed to parse template {template}: {source}")]
    Parse {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to execute template {template}: {source}")]
    Execute {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RenderError {
    /// Template the failure belongs to, if any
    pub fn template(&self) -> Option<&str> {
        match self {
            RenderError::Missing { template }
            | RenderError::Parse { template, .. }
            | RenderError::Execute { template, .. } => Some(template),
            RenderError::OutputDir { .. } | RenderError::Write { .. } => None,
        }
    }
}

/// Output of one template, held in memory until written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl RenderedFile {
    pub fn write(&self) -> Result<(), RenderError> {
        fs::write(&self.path, &self.contents).map_err(|source| RenderError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Renders templates from a [`TemplateSource`] into an output directory
pub struct Renderer<'a> {
    source: &'a dyn TemplateSource,
    output_dir: PathBuf,
}

impl<'a> Renderer<'a> {
    pub fn new(source: &'a dyn TemplateSource, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Creates the output directory (and parents) if missing
    pub fn prepare_output_dir(&self) -> Result<(), RenderError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| RenderError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })
    }

    /// Parses and executes one template without touching the filesystem
    pub fn render(
        &self,
        spec: &TemplateSpec,
        config: &ScaffoldConfig,
    ) -> Result<RenderedFile, RenderError> {
        let text = self
            .source
            .load(spec.source_key)
            .ok_or_else(|| RenderError::Missing {
                template: spec.source_key.to_string(),
            })?;

        let env = environment();
        let template = env
            .template_from_named_str(spec.source_key, &*text)
            .map_err(|source| RenderError::Parse {
                template: spec.source_key.to_string(),
                source,
            })?;

        let rendered = template
            .render(config)
            .map_err(|source| RenderError::Execute {
                template: spec.source_key.to_string(),
                source,
            })?;

        Ok(RenderedFile {
            path: spec.destination(&self.output_dir),
            contents: rendered.into_bytes(),
        })
    }

    /// Renders and writes every template in order, stopping at the first failure
    pub fn render_all(
        &self,
        specs: &[TemplateSpec],
        config: &ScaffoldConfig,
    ) -> Result<Vec<PathBuf>, RenderError> {
        self.prepare_output_dir()?;

        let mut written = Vec::with_capacity(specs.len());
        for spec in specs {
            let _span = info_span!("template", key = spec.source_key).entered();

            let file = self.render(spec, config)?;
            debug!(bytes = file.contents.len(), "rendered template");

            file.write()?;
            info!(path = %file.path.display(), "wrote generated file");
            written.push(file.path);
        }

        Ok(written)
    }
}

fn environment<'s>() -> Environment<'s> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TEMPLATE_SPECS;
    use tempfile::TempDir;

    fn config() -> ScaffoldConfig {
        ScaffoldConfig {
            name: "foo".to_string(),
            package: "bar".to_string(),
        }
    }

    #[test]
    fn renders_config_fields() {
        let templates = InMemoryTemplates::new([("hello.txt.tmpl", "{{ name }} in {{ package }}\n")]);
        let renderer = Renderer::new(&templates, "out");

        let file = renderer
            .render(&TemplateSpec::new("hello.txt.tmpl"), &config())
            .unwrap();
        assert_eq!(file.path, PathBuf::from("out").join("hello.txt"));
        assert_eq!(file.contents, b"foo in bar\n");
    }

    #[test]
    fn parse_error_names_template() {
        let templates = InMemoryTemplates::new([("bad.tmpl", "{% if %}")]);
        let renderer = Renderer::new(&templates, "out");

        let err = renderer
            .render(&TemplateSpec::new("bad.tmpl"), &config())
            .unwrap_err();
        assert!(matches!(err, RenderError::Parse { .. }));
        assert_eq!(err.template(), Some("bad.tmpl"));
    }

    #[test]
    fn undefined_variable_fails_execution() {
        let templates = InMemoryTemplates::new([("x.tmpl", "{{ author.email }}")]);
        let renderer = Renderer::new(&templates, "out");

        let err = renderer
            .render(&TemplateSpec::new("x.tmpl"), &config())
            .unwrap_err();
        assert!(matches!(err, RenderError::Execute { .. }));
        assert!(err.to_string().contains("x.tmpl"));
    }

    #[test]
    fn missing_template() {
        let templates = InMemoryTemplates::default();
        let renderer = Renderer::new(&templates, "out");

        let err = renderer
            .render(&TemplateSpec::new("nope.tmpl"), &config())
            .unwrap_err();
        assert!(matches!(err, RenderError::Missing { .. }));
    }

    #[test]
    fn render_all_writes_in_order() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("output");
        let templates = EmbeddedTemplates;
        let renderer = Renderer::new(&templates, &out);

        let written = renderer.render_all(&TEMPLATE_SPECS, &config()).unwrap();
        assert_eq!(written, vec![out.join("base.go"), out.join("plugin.go")]);

        let base = fs::read_to_string(out.join("base.go")).unwrap();
        assert!(base.contains("package bar"));
        assert!(base.contains("const PluginName = \"foo\""));
    }

    #[test]
    fn failure_keeps_earlier_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("output");
        let templates = InMemoryTemplates::new([
            ("base.go.tmpl", "package {{ package }}\n"),
            ("plugin.go.tmpl", "{% for %}"),
        ]);
        let renderer = Renderer::new(&templates, &out);

        let err = renderer.render_all(&TEMPLATE_SPECS, &config()).unwrap_err();
        assert_eq!(err.template(), Some("plugin.go.tmpl"));
        assert!(out.join("base.go").is_file());
        assert!(!out.join("plugin.go").exists());
    }

    #[test]
    fn write_failure_names_path_and_keeps_earlier_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("output");
        fs::create_dir_all(out.join("plugin.go")).unwrap();

        let templates = EmbeddedTemplates;
        let renderer = Renderer::new(&templates, &out);
        let err = renderer.render_all(&TEMPLATE_SPECS, &config()).unwrap_err();

        assert!(matches!(err, RenderError::Write { .. }));
        assert!(err.to_string().contains("plugin.go"));
        assert!(out.join("base.go").is_file());
    }

    #[test]
    fn output_dir_creation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let templates = EmbeddedTemplates;
        let renderer = Renderer::new(&templates, dir.path().join("a").join("b"));

        renderer.prepare_output_dir().unwrap();
        renderer.prepare_output_dir().unwrap();
        assert!(renderer.output_dir().is_dir());
    }

    #[test]
    fn output_dir_blocked_by_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("output");
        fs::write(&blocker, "not a directory").unwrap();

        let templates = EmbeddedTemplates;
        let renderer = Renderer::new(&templates, &blocker);
        let err = renderer.render_all(&TEMPLATE_SPECS, &config()).unwrap_err();
        assert!(matches!(err, RenderError::OutputDir { .. }));
    }
}
