//! Multipart form data encoding
//!
//! Materializes a declarative part list into one `multipart/form-data`
//! content-type string and one byte body. Pure transform: no I/O, usable
//! (and testable) without the executor.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One declared part of a multipart body.
///
/// A part with a `filename` is binary: its `value` is a base64 data
/// reference (`data:<mime>;base64,<payload>` or bare base64) decoded to raw
/// bytes before inclusion. A part without one is plain text, sent verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Explicit part content type; overrides the data reference MIME and
    /// the filename extension guess.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl MultipartField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        MultipartField {
            name: name.into(),
            value: value.into(),
            filename: None,
            content_type: None,
        }
    }

    pub fn binary(
        name: impl Into<String>,
        data_reference: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        MultipartField {
            name: name.into(),
            value: data_reference.into(),
            filename: Some(filename.into()),
            content_type: None,
        }
    }
}

/// Multipart encoding failure. Raised before any network I/O so a bad part
/// can never produce a truncated or corrupt request body.
#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("Invalid base64 payload for part '{field}': {detail}")]
    InvalidPayload { field: String, detail: String },

    #[error("Invalid MIME type '{mime}' for part '{field}'")]
    InvalidMime { field: String, mime: String },
}

/// An encoded multipart body: the content-type header value (carrying the
/// boundary) and the full body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPayload {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Encode a part list with a fresh random boundary.
pub fn encode(fields: &[MultipartField]) -> Result<MultipartPayload, MultipartError> {
    let boundary = format!("flowproxy-{}", Uuid::new_v4().simple());
    encode_with_boundary(fields, &boundary)
}

/// Encode a part list with a caller-chosen boundary (deterministic tests).
pub fn encode_with_boundary(
    fields: &[MultipartField],
    boundary: &str,
) -> Result<MultipartPayload, MultipartError> {
    let mut body = Vec::new();

    for field in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());

        match &field.filename {
            Some(filename) => {
                let (reference_mime, bytes) = decode_data_reference(field)?;
                let content_type = field
                    .content_type
                    .clone()
                    .or(reference_mime)
                    .unwrap_or_else(|| guess_mime_type(extension_of(filename)).to_string());
                validate_mime(&field.name, &content_type)?;

                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        escape_quoted(&field.name),
                        escape_quoted(filename)
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
                body.extend_from_slice(&bytes);
            }
            None => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n",
                        escape_quoted(&field.name)
                    )
                    .as_bytes(),
                );
                if let Some(content_type) = &field.content_type {
                    validate_mime(&field.name, content_type)?;
                    body.extend_from_slice(
                        format!("Content-Type: {}\r\n", content_type).as_bytes(),
                    );
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(field.value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Ok(MultipartPayload {
        content_type: format!("multipart/form-data; boundary={}", boundary),
        body,
    })
}

/// Decode a binary part's data reference into (declared MIME, raw bytes).
fn decode_data_reference(field: &MultipartField) -> Result<(Option<String>, Vec<u8>), MultipartError> {
    let invalid = |detail: String| MultipartError::InvalidPayload {
        field: field.name.clone(),
        detail,
    };

    // data:<mime>;base64,<payload>
    if let Some(rest) = field.value.strip_prefix("data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| invalid("data reference without ',' separator".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| invalid("data reference is not base64-encoded".to_string()))?;
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| invalid(e.to_string()))?;
        let mime = if mime.is_empty() {
            None
        } else {
            Some(mime.to_string())
        };
        return Ok((mime, bytes));
    }

    // Bare base64 payload.
    let bytes = BASE64
        .decode(field.value.trim())
        .map_err(|e| invalid(e.to_string()))?;
    Ok((None, bytes))
}

fn validate_mime(field: &str, content_type: &str) -> Result<(), MultipartError> {
    content_type
        .parse::<mime::Mime>()
        .map(|_| ())
        .map_err(|_| MultipartError::InvalidMime {
            field: field.to_string(),
            mime: content_type.to_string(),
        })
}

fn extension_of(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

/// Quoted-string escaping for Content-Disposition values.
fn escape_quoted(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Guess MIME type from file extension
fn guess_mime_type(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_field_encoding() {
        let fields = [MultipartField::text("key", "value")];
        let payload = encode_with_boundary(&fields, "b").unwrap();

        assert_eq!(payload.content_type, "multipart/form-data; boundary=b");
        let body = String::from_utf8(payload.body).unwrap();
        assert_eq!(
            body,
            "--b\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\nvalue\r\n--b--\r\n"
        );
    }

    #[test]
    fn test_binary_field_round_trip() {
        let raw = b"\x89PNG\r\n\x1a\nrest";
        let reference = format!("data:image/png;base64,{}", BASE64.encode(raw));
        let fields = [
            MultipartField::text("key", "value"),
            MultipartField::binary("file", reference, "f.png"),
        ];

        let payload = encode_with_boundary(&fields, "b").unwrap();
        let body = payload.body;

        let disposition = b"Content-Disposition: form-data; name=\"file\"; filename=\"f.png\"";
        assert!(contains(&body, disposition));
        assert!(contains(&body, b"Content-Type: image/png"));
        assert!(contains(&body, raw));
        assert!(body.ends_with(b"--b--\r\n"));
    }

    #[test]
    fn test_bare_base64_uses_extension_mime() {
        let fields = [MultipartField::binary("file", BASE64.encode(b"data"), "report.pdf")];
        let payload = encode_with_boundary(&fields, "b").unwrap();
        assert!(contains(&payload.body, b"Content-Type: application/pdf"));
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let mut field = MultipartField::binary("file", BASE64.encode(b"data"), "f.png");
        field.content_type = Some("application/x-custom".to_string());
        let payload = encode_with_boundary(&[field], "b").unwrap();
        assert!(contains(&payload.body, b"Content-Type: application/x-custom"));
    }

    #[test]
    fn test_invalid_mime_fails() {
        let mut field = MultipartField::text("k", "v");
        field.content_type = Some("not a mime".to_string());
        assert!(matches!(
            encode(&[field]).unwrap_err(),
            MultipartError::InvalidMime { .. }
        ));
    }

    #[test]
    fn test_invalid_base64_fails() {
        let fields = [MultipartField::binary("file", "not-base64!!!", "f.png")];
        let err = encode(&fields).unwrap_err();
        assert!(err.to_string().contains("file"));
    }

    #[test]
    fn test_non_base64_data_reference_fails() {
        let fields = [MultipartField::binary("file", "data:image/png,rawbytes", "f.png")];
        assert!(encode(&fields).is_err());
    }

    #[test]
    fn test_random_boundary_is_fresh() {
        let fields = [MultipartField::text("k", "v")];
        let first = encode(&fields).unwrap();
        let second = encode(&fields).unwrap();
        assert_ne!(first.content_type, second.content_type);
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }
}
