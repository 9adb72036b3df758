//! # Errors
//!
//! Every fallible operation in the crate returns [`Result`], carrying a [`PromptError`].

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PromptError>;

#[derive(Debug, Error)]
pub enum PromptError {
    /// A template or data file needs resolving but no prompts root was configured.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown prompt: {0:?}")]
    NotFound(String),

    #[error("Override {variant:?} for {name:?} not found. Available: {available:?}")]
    OverrideNotFound {
        name: String,
        variant: String,
        available: Vec<String>,
    },

    #[error("Duplicate prompt name {name:?}: {first} and {second}")]
    Collision {
        name: String,
        first: String,
        second: String,
    },

    #[error("Failed to import module {module:?}: {reason}")]
    Import { module: String, reason: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Parse template error: {0}")]
    Parse(String),

    #[error("Invalid node: {0}")]
    InvalidNode(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid registry config: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

impl PromptError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PromptError::NotFound(_) | PromptError::OverrideNotFound { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PromptError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn yaml(path: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
        PromptError::Yaml {
            path: path.into(),
            source,
        }
    }
}
