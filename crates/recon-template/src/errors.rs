use thiserror::Error;

/// Failures raised by the variable registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("variable name must not be empty")]
    EmptyName,

    #[error("unsupported export/persistence format: {format}")]
    UnsupportedFormat { format: String },

    #[error("failed to read registry file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize registry: {source}")]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}
