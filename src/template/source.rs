//! Template sources

use std::borrow::Cow;
use std::collections::BTreeMap;

use include_dir::{include_dir, Dir};

static TEMPLATES_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates");

/// Provides template text by key
pub trait TemplateSource: Send + Sync {
    /// Returns the template text for `key`, or `None` if unknown
    fn load(&self, key: &str) -> Option<Cow<'_, str>>;
}

/// Templates compiled into the binary from the `templates/` directory
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedTemplates;

impl EmbeddedTemplates {
    /// Keys of every embedded template, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = TEMPLATES_DIR
            .files()
            .filter_map(|f| f.path().to_str().map(String::from))
            .collect();
        keys.sort();
        keys
    }
}

impl TemplateSource for EmbeddedTemplates {
    fn load(&self, key: &str) -> Option<Cow<'_, str>> {
        TEMPLATES_DIR
            .get_file(key)
            .and_then(|f| f.contents_utf8())
            .map(Cow::Borrowed)
    }
}

/// Templates held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplates {
    templates: BTreeMap<String, String>,
}

impl InMemoryTemplates {
    pub fn new<I, K, V>(templates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            templates: templates
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(key.into(), text.into());
    }
}

impl TemplateSource for InMemoryTemplates {
    fn load(&self, key: &str) -> Option<Cow<'_, str>> {
        self.templates.get(key).map(|t| Cow::Borrowed(t.as_str()))
    }
}
