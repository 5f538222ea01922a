use thiserror::Error;

/// Failures raised while waiting for a concurrency slot.
#[derive(Debug, Error, Clone, Copy)]
pub enum ConcurrencyError {
    #[error("request cancelled before a slot was granted")]
    Cancelled,
}
