//! OpenAPI document validation and reference resolution

mod resolver;
mod validate;

pub use resolver::{resolve, ResolvedSpec, SchemaView};
pub use validate::{parse_document, validate_document, SpecFormat};
