//! Error taxonomy for the tool config store, security validator and output
//! parser registry.
//!
//! Mirrors the shape of a conventional `thiserror` error enum: one variant
//! per failure mode, each carrying exactly the context a caller needs to
//! report it without re-deriving anything.

use thiserror::Error;

/// Failures raised by the tool config store.
#[derive(Debug, Error, Clone)]
pub enum ConfigStoreError {
    #[error("no config registered for tool '{name}'")]
    ToolConfigNotFound { name: String },

    #[error("config for tool '{name}' declares no modes")]
    ToolConfigInvalid { name: String },
}

/// Failures raised by the argv/executable security gates.
///
/// `sample` is always truncated to 50 characters before it reaches this
/// type, so it is safe to include verbatim in logs and user-facing errors.
#[derive(Debug, Error, Clone)]
pub enum SecurityError {
    #[error("security violation: {reason} (sample: {sample:?})")]
    Violation { reason: String, sample: String },
}

impl SecurityError {
    pub fn violation(reason: impl Into<String>, sample: &str) -> Self {
        let mut truncated = sample.to_string();
        truncated.truncate(50);
        SecurityError::Violation {
            reason: reason.into(),
            sample: truncated,
        }
    }
}

/// Failures raised while loading tool definition files (the ambient config
/// loader, not part of the core tool-config contract).
#[derive(Debug, Error)]
pub enum ToolFileError {
    #[error("failed to read tool file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse tool file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
