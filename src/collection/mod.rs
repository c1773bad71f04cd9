//! Compiled request collections
//!
//! A [`Collection`] is the output of one import run: the original spec text
//! retained verbatim plus an ordered set of self-contained [`RequestNode`]s.
//! Nodes are immutable once built; re-imports replace them wholesale.

mod builder;

pub use builder::build;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A named, ordered set of request definitions compiled from one spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    /// Original raw spec text, kept verbatim for re-export and audit.
    pub spec_text: String,
    pub nodes: Vec<RequestNode>,
}

/// One API operation, fully described.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestNode {
    /// Deterministic id derived from method + path; stable across re-imports
    /// of an unchanged spec.
    pub id: String,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBodySpec>,
    /// Status code -> response shape, in declaration order.
    pub responses: IndexMap<String, ResponseShape>,
}

/// Parameter definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Where a parameter is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    /// Parse an OpenAPI `in` value.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(ParamLocation::Path),
            "query" => Some(ParamLocation::Query),
            "header" => Some(ParamLocation::Header),
            "cookie" => Some(ParamLocation::Cookie),
            _ => None,
        }
    }
}

/// Request body definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBodySpec {
    pub content_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Response shape for one status code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseShape {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Deterministic node id from method + path.
///
/// Readable slug plus an 8-hex digest suffix so paths that sanitize to the
/// same slug still get distinct ids.
pub fn node_id(method: &str, path: &str) -> String {
    let digest = Sha256::digest(format!("{} {}", method.to_uppercase(), path).as_bytes());
    let suffix = hex::encode(&digest[..4]);

    let mut slug = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        format!("{}-{}", method.to_lowercase(), suffix)
    } else {
        format!("{}-{}-{}", method.to_lowercase(), slug, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_deterministic() {
        assert_eq!(node_id("GET", "/pets/{petId}"), node_id("GET", "/pets/{petId}"));
        assert_eq!(node_id("get", "/pets/{petId}"), node_id("GET", "/pets/{petId}"));
    }

    #[test]
    fn test_node_id_readable_slug() {
        let id = node_id("GET", "/pets/{petId}");
        assert!(id.starts_with("get-pets-petid-"), "id: {}", id);
    }

    #[test]
    fn test_node_id_distinct_per_method_and_path() {
        assert_ne!(node_id("GET", "/pets"), node_id("POST", "/pets"));
        assert_ne!(node_id("GET", "/pets"), node_id("GET", "/pet/s"));
    }

    #[test]
    fn test_node_id_root_path() {
        let id = node_id("GET", "/");
        assert!(id.starts_with("get-"), "id: {}", id);
    }
}
