//! OpenAPI document parsing and validation
//!
//! Validation runs before reference resolution: resolving the references of
//! an invalid document is undefined, so the structural checks here must pass
//! first.

use serde_json::Value;

use crate::errors::ImportError;

/// Maximum raw spec size (16 MB)
const MAX_SPEC_SIZE: usize = 16 * 1024 * 1024;

/// Declared specification format, detected from the document itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    /// OpenAPI 3.x (`openapi: "3.x.y"`)
    OpenApi3,
    /// Swagger 2.0 (`swagger: "2.0"`)
    Swagger2,
}

impl std::fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecFormat::OpenApi3 => write!(f, "OpenAPI 3.x"),
            SpecFormat::Swagger2 => write!(f, "Swagger 2.0"),
        }
    }
}

/// Parse raw specification text into a JSON value.
///
/// Accepts JSON or YAML; tries JSON first, then YAML, so extension-less
/// input works either way.
pub fn parse_document(raw: &str) -> Result<Value, ImportError> {
    if raw.len() > MAX_SPEC_SIZE {
        return Err(ImportError::InvalidSpec(format!(
            "Spec too large: {} bytes (max {} bytes)",
            raw.len(),
            MAX_SPEC_SIZE
        )));
    }

    serde_json::from_str(raw)
        .or_else(|_| serde_yaml::from_str(raw))
        .map_err(|e| ImportError::InvalidSpec(format!("Failed to parse spec: {}", e)))
}

/// Validate the document's structure and detect its format.
pub fn validate_document(document: &Value) -> Result<SpecFormat, ImportError> {
    let root = document
        .as_object()
        .ok_or_else(|| ImportError::InvalidSpec("Document is not an object".to_string()))?;

    let format = detect_format(document)?;

    let info = root
        .get("info")
        .ok_or_else(|| ImportError::InvalidSpec("Missing 'info' field".to_string()))?;
    let info = info
        .as_object()
        .ok_or_else(|| ImportError::InvalidSpec("'info' is not an object".to_string()))?;

    for field in ["title", "version"] {
        if !info.get(field).map_or(false, Value::is_string) {
            return Err(ImportError::InvalidSpec(format!(
                "Missing or non-string 'info.{}' field",
                field
            )));
        }
    }

    if let Some(paths) = root.get("paths") {
        let paths = paths
            .as_object()
            .ok_or_else(|| ImportError::InvalidSpec("'paths' is not an object".to_string()))?;
        for (path, item) in paths {
            if !item.is_object() {
                return Err(ImportError::InvalidSpec(format!(
                    "Path item '{}' is not an object",
                    path
                )));
            }
        }
    }

    Ok(format)
}

/// Detect the spec format from the `openapi`/`swagger` version field.
fn detect_format(document: &Value) -> Result<SpecFormat, ImportError> {
    if let Some(version) = document.get("openapi") {
        let version = version.as_str().ok_or_else(|| {
            ImportError::InvalidSpec("'openapi' version is not a string".to_string())
        })?;
        if version.starts_with("3.") {
            return Ok(SpecFormat::OpenApi3);
        }
        return Err(ImportError::InvalidSpec(format!(
            "Unsupported OpenAPI version: {}",
            version
        )));
    }

    if let Some(version) = document.get("swagger") {
        let version = version.as_str().ok_or_else(|| {
            ImportError::InvalidSpec("'swagger' version is not a string".to_string())
        })?;
        if version == "2.0" {
            return Ok(SpecFormat::Swagger2);
        }
        return Err(ImportError::InvalidSpec(format!(
            "Unsupported Swagger version: {}",
            version
        )));
    }

    Err(ImportError::InvalidSpec(
        "Unknown spec format: missing 'openapi' or 'swagger' field".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_openapi_3() {
        let doc = json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "paths": {}
        });
        assert_eq!(validate_document(&doc).unwrap(), SpecFormat::OpenApi3);
    }

    #[test]
    fn test_detects_swagger_2() {
        let doc = json!({
            "swagger": "2.0",
            "info": {"title": "t", "version": "1"},
            "paths": {}
        });
        assert_eq!(validate_document(&doc).unwrap(), SpecFormat::Swagger2);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let doc = json!({"openapi": "4.0.0", "info": {"title": "t", "version": "1"}});
        let err = validate_document(&doc).unwrap_err();
        assert!(matches!(err, ImportError::InvalidSpec(_)));
        assert!(err.to_string().contains("Unsupported OpenAPI version"));
    }

    #[test]
    fn test_rejects_missing_info() {
        let doc = json!({"openapi": "3.1.0", "paths": {}});
        let err = validate_document(&doc).unwrap_err();
        assert!(err.to_string().contains("Missing 'info' field"));
    }

    #[test]
    fn test_rejects_non_string_title() {
        let doc = json!({"openapi": "3.0.0", "info": {"title": 7, "version": "1"}});
        let err = validate_document(&doc).unwrap_err();
        assert!(err.to_string().contains("info.title"));
    }

    #[test]
    fn test_rejects_non_object_path_item() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {"/pets": "oops"}
        });
        let err = validate_document(&doc).unwrap_err();
        assert!(err.to_string().contains("/pets"));
    }

    #[test]
    fn test_parses_yaml_fallback() {
        let raw = "openapi: 3.0.0\ninfo:\n  title: t\n  version: '1'\npaths: {}\n";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc["openapi"], "3.0.0");
    }

    #[test]
    fn test_parse_garbage_fails() {
        let err = parse_document("{not json: [").unwrap_err();
        assert!(matches!(err, ImportError::InvalidSpec(_)));
    }
}
