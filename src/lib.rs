//! flowproxy library interface
//!
//! Imports OpenAPI documents into executable request collections and proxies
//! fully-specified HTTP requests from a trusted server process, with bounded
//! deadlines and classified outcomes.
//!
//! # Module Organization
//!
//! - [`openapi`] - Document validation and `$ref` resolution
//! - [`collection`] - Compiled request collections (Collection, RequestNode)
//! - [`proxy`] - Deadline-bound request execution and multipart encoding
//! - [`errors`] - Import error types (ImportError, Result)

pub mod collection;
pub mod errors;
pub mod openapi;
pub mod proxy;

pub use collection::{Collection, RequestNode};
pub use errors::{ImportError, Result};
pub use openapi::SpecFormat;
pub use proxy::{execute, ExecutionOutcome, MultipartField, RequestBody, RequestDescription};

/// Import a raw OpenAPI document into a [`Collection`].
///
/// Validation, reference resolution and compilation in one call. Performs no
/// I/O beyond reading `raw_text`; persisting the returned collection is the
/// caller's responsibility.
pub fn import_collection(name: &str, raw_text: &str) -> Result<Collection> {
    let document = openapi::parse_document(raw_text)?;
    let format = openapi::validate_document(&document)?;
    let resolved = openapi::resolve(&document)?;
    Ok(collection::build(name, raw_text, format, &resolved))
}
