use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Settings file not found. Looked in:\n\
        - the current directory: vplexflow.local.yaml, .vplexflow.local.yaml, vplexflow.yaml, .vplexflow.yaml\n\
        - ./.vplexflow/\n\
        - ~/.config/vplexflow/vplexflow.yaml\n\
        Set VPLEXFLOW_CONFIG to point at a file directly"
    )]
    SettingsFileNotFound,

    #[error("VPLEXFLOW_CONFIG points at {0}, which does not exist")]
    ExplicitPathMissing(PathBuf),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
