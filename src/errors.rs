//! Error types for flowproxy

use thiserror::Error;

/// Errors produced while importing an OpenAPI document.
///
/// `InvalidSpec` and `CyclicReference` abort the whole import; no partial
/// collection is ever returned for them. `UnsupportedOperation` is recovered
/// per operation by the collection builder, which skips the operation with a
/// diagnostic and keeps going.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Invalid specification: {0}")]
    InvalidSpec(String),

    #[error("Cyclic reference: {0}")]
    CyclicReference(String),

    #[error("Unsupported operation {method} {path}: {reason}")]
    UnsupportedOperation {
        method: String,
        path: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ImportError>;
