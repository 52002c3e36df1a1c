//! Static list of templates rendered on every scaffold run

use std::path::{Path, PathBuf};

/// Extension carried by every embedded template source
pub const TEMPLATE_EXTENSION: &str = ".tmpl";

/// Directory, relative to the working directory, receiving generated files
pub const OUTPUT_DIR: &str = "output";

/// Pairs an embedded template source with its generated output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateSpec {
    /// Key of the template in the embedded template set
    pub source_key: &'static str,
}

impl TemplateSpec {
    pub const fn new(source_key: &'static str) -> Self {
        Self { source_key }
    }

    /// Output file name: the source key with its template extension stripped
    pub fn output_relative_path(&self) -> PathBuf {
        let file_name = Path::new(self.source_key)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(self.source_key);

        PathBuf::from(
            file_name
                .strip_suffix(TEMPLATE_EXTENSION)
                .unwrap_or(file_name),
        )
    }

    /// Destination of this template's output under `output_dir`
    pub fn destination(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.output_relative_path())
    }
}

/// Templates in render order: the base package file first, then the plugin
pub const TEMPLATE_SPECS: [TemplateSpec; 2] = [
    TemplateSpec::new("base.go.tmpl"),
    TemplateSpec::new("plugin.go.tmpl"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_base_then_plugin() {
        let keys: Vec<_> = TEMPLATE_SPECS.iter().map(|s| s.source_key).collect();
        assert_eq!(keys, vec!["base.go.tmpl", "plugin.go.tmpl"]);
    }

    #[test]
    fn output_path_strips_extension() {
        assert_eq!(
            TEMPLATE_SPECS[0].output_relative_path(),
            PathBuf::from("base.go")
        );
        assert_eq!(
            TEMPLATE_SPECS[1].destination(Path::new("out")),
            PathBuf::from("out").join("plugin.go")
        );
    }

    #[test]
    fn nested_key_maps_to_file_name() {
        let spec = TemplateSpec::new("nested/dir/main.rs.tmpl");
        assert_eq!(spec.output_relative_path(), PathBuf::from("main.rs"));
    }
}
