//! Scaffold configuration records
//!
//! Configuration arrives in layers (CLI flags, environment, config file).
//! Each layer yields a [`PartialConfig`]; layers are merged by override and
//! only then validated into a [`ScaffoldConfig`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("plugin name is required")]
    MissingName,

    #[error("package name is required")]
    MissingPackage,
}

/// Resolved configuration driving template rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaffoldConfig {
    /// Name of the plugin being scaffolded
    pub name: String,

    /// Package the generated sources belong to
    pub package: String,
}

/// One configuration layer; unset fields fall through to lower layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub package: Option<String>,
}

impl PartialConfig {
    pub fn new(name: Option<String>, package: Option<String>) -> Self {
        Self {
            name: normalize(name),
            package: normalize(package),
        }
    }

    /// Layers `higher` over `self`: fields set in `higher` win
    pub fn merge(self, higher: PartialConfig) -> PartialConfig {
        PartialConfig {
            name: normalize(higher.name).or(normalize(self.name)),
            package: normalize(higher.package).or(normalize(self.package)),
        }
    }

    /// Merges layers given from lowest to highest precedence
    pub fn layered<I>(layers: I) -> PartialConfig
    where
        I: IntoIterator<Item = PartialConfig>,
    {
        layers
            .into_iter()
            .fold(PartialConfig::default(), PartialConfig::merge)
    }

    /// Validates the merged layers; the built-in default for both fields is empty
    pub fn resolve(self) -> Result<ScaffoldConfig, ValidationError> {
        let name = self.name.unwrap_or_default();
        if name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }

        let package = self.package.unwrap_or_default();
        if package.trim().is_empty() {
            return Err(ValidationError::MissingPackage);
        }

        Ok(ScaffoldConfig { name, package })
    }
}

/// Empty strings count as unset
fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layer(name: Option<&str>, package: Option<&str>) -> PartialConfig {
        PartialConfig::new(name.map(String::from), package.map(String::from))
    }

    #[test]
    fn higher_layer_wins() {
        let file = layer(Some("A"), Some("file.pkg"));
        let env = layer(Some("B"), None);
        let flags = layer(Some("C"), None);

        let merged = PartialConfig::layered([file, env, flags]);
        assert_eq!(merged.name.as_deref(), Some("C"));
        assert_eq!(merged.package.as_deref(), Some("file.pkg"));
    }

    #[test]
    fn empty_value_does_not_override() {
        let merged = layer(Some("A"), None).merge(layer(Some(""), None));
        assert_eq!(merged.name.as_deref(), Some("A"));
    }

    #[test]
    fn missing_name_is_reported_first() {
        let err = PartialConfig::default().resolve().unwrap_err();
        assert_eq!(err, ValidationError::MissingName);
        assert_eq!(err.to_string(), "plugin name is required");
    }

    #[test]
    fn missing_package() {
        let err = layer(Some("foo"), None).resolve().unwrap_err();
        assert_eq!(err, ValidationError::MissingPackage);
        assert_eq!(err.to_string(), "package name is required");
    }

    #[test]
    fn whitespace_only_name_is_invalid() {
        let err = layer(Some("   "), Some("bar")).resolve().unwrap_err();
        assert_eq!(err, ValidationError::MissingName);
    }

    #[test]
    fn resolves_complete_config() {
        let config = layer(Some("foo"), Some("bar")).resolve().unwrap();
        assert_eq!(
            config,
            ScaffoldConfig {
                name: "foo".to_string(),
                package: "bar".to_string()
            }
        );
    }

    fn opt_value() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[a-z]{0,6}")
    }

    proptest! {
        #[test]
        fn flags_beat_env_beat_file(
            file in opt_value(),
            env in opt_value(),
            flag in opt_value(),
        ) {
            let merged = PartialConfig::layered([
                PartialConfig::new(file.clone(), None),
                PartialConfig::new(env.clone(), None),
                PartialConfig::new(flag.clone(), None),
            ]);

            let expected = [flag, env, file]
                .into_iter()
                .flatten()
                .find(|v| !v.is_empty());
            prop_assert_eq!(merged.name, expected);
        }
    }
}
