//! Scaffold failures

use thiserror::Error;

use crate::domain::ValidationError;
use crate::storage::ConfigError;
use crate::template::RenderError;

/// Any failure of a scaffold run
///
/// Every variant keeps the failing path or template in its message and maps
/// to a stable [`code`](ScaffoldError::code) for callers that need to branch
/// on the kind of failure.
#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ScaffoldError {
    pub fn code(&self) -> &'static str {
        match self {
            ScaffoldError::InvalidArgs(_) => "invalid_args",
            ScaffoldError::Config(err) => match err {
                ConfigError::NotFound(_) => "config_not_found",
                ConfigError::Read { .. } => "config_read",
                ConfigError::Parse { .. } => "config_parse",
                ConfigError::Invalid(ValidationError::MissingName) => "missing_name",
                ConfigError::Invalid(ValidationError::MissingPackage) => "missing_package",
            },
            ScaffoldError::Render(err) => match err {
                RenderError::OutputDir { .. } => "output_dir",
                RenderError::Missing { .. } => "template_missing",
                RenderError::Parse { .. } => "template_parse",
                RenderError::Execute { .. } => "template_execute",
                RenderError::Write { .. } => "write",
            },
        }
    }

    /// True for failures the caller can fix by re-invoking with other input
    pub fn is_validation(&self) -> bool {
        matches!(self, ScaffoldError::Config(ConfigError::Invalid(_)))
    }
}

impl From<ValidationError> for ScaffoldError {
    fn from(err: ValidationError) -> Self {
        ScaffoldError::Config(ConfigError::Invalid(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn validation_messages_pass_through() {
        let err = ScaffoldError::from(ValidationError::MissingName);
        assert_eq!(err.to_string(), "plugin name is required");
        assert_eq!(err.code(), "missing_name");
        assert!(err.is_validation());
    }

    #[test]
    fn config_not_found_code() {
        let err = ScaffoldError::from(ConfigError::NotFound(PathBuf::from("x.yaml")));
        assert_eq!(err.code(), "config_not_found");
        assert!(!err.is_validation());
    }
}
