use thiserror::Error;

/// Errors surfaced by field construction, configuration and GPU setup.
///
/// Undefined field regions are not errors: queries over missing data return `None`.
#[derive(Debug, Error)]
pub enum FieldError {
    /// Malformed or mismatched grid headers. Fatal to that build attempt only.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Shader compile/validation failure or a missing device capability.
    /// Callers fall back to the CPU animator or disable the layer.
    #[error("gpu resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("failed to parse grid records: {0}")]
    GridParse(#[from] serde_json::Error),
}

pub type FieldResult<T> = Result<T, FieldError>;
