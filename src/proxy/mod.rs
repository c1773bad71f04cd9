//! Proxied request execution

mod executor;
pub mod multipart;

pub use executor::{execute, ExecutionOutcome, RequestBody, RequestDescription};
pub use multipart::{MultipartError, MultipartField, MultipartPayload};
