//! Compiling a resolved spec into a collection
//!
//! Walks every (path, method) pair in document declaration order, which is
//! the only ordering guarantee the collection makes. Operations whose shape
//! cannot be represented as a request node are skipped with a diagnostic so
//! one malformed operation never aborts the whole import.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::errors::ImportError;
use crate::openapi::{ResolvedSpec, SchemaView, SpecFormat};

use super::{
    node_id, Collection, ParamLocation, Parameter, RequestBodySpec, RequestNode, ResponseShape,
};

/// Recognized operation keys on a path item; everything else on the item
/// (parameters, summary, extensions) is not an operation.
const HTTP_METHODS: [&str; 8] = [
    "get", "post", "put", "patch", "delete", "head", "options", "trace",
];

/// Compile a resolved spec into a [`Collection`].
///
/// Infallible by design: fatal problems were already rejected by validation
/// and resolution, and per-operation problems are recovered locally.
pub fn build(name: &str, spec_text: &str, format: SpecFormat, spec: &ResolvedSpec) -> Collection {
    let mut nodes = Vec::new();

    if let Some(paths) = spec.root().get("paths") {
        for (path, item) in paths.entries() {
            if !item.is_object() {
                warn!(path, "skipping non-object path item");
                continue;
            }

            // Parameters declared at the path-item level apply to every
            // operation beneath it, losing to operation-level declarations
            // on name+location collision.
            let shared = match item.get("parameters") {
                Some(list) => match collect_parameters(list, format) {
                    Ok(collected) => collected,
                    Err(reason) => {
                        warn!(path, %reason, "skipping path item with malformed shared parameters");
                        continue;
                    }
                },
                None => Collected::default(),
            };

            for (key, operation) in item.entries() {
                let method = key.to_ascii_lowercase();
                if !HTTP_METHODS.contains(&method.as_str()) {
                    continue;
                }
                match build_node(&method, path, operation, &shared, format) {
                    Ok(node) => nodes.push(node),
                    Err(err) => warn!(error = %err, "skipping unsupported operation"),
                }
            }
        }
    }

    Collection {
        name: name.to_string(),
        spec_text: spec_text.to_string(),
        nodes,
    }
}

/// Build one request node, or report why the operation is unrepresentable.
fn build_node(
    method: &str,
    path: &str,
    operation: SchemaView<'_>,
    shared: &Collected,
    format: SpecFormat,
) -> Result<RequestNode, ImportError> {
    let unsupported = |reason: String| ImportError::UnsupportedOperation {
        method: method.to_uppercase(),
        path: path.to_string(),
        reason,
    };

    if !operation.is_object() {
        return Err(unsupported("operation is not an object".to_string()));
    }

    let mut collected = shared.clone();
    if let Some(list) = operation.get("parameters") {
        let own = collect_parameters(list, format).map_err(&unsupported)?;
        for (key, param) in own.params {
            collected.params.insert(key, param);
        }
        if own.body.is_some() {
            collected.body = own.body;
        }
    }

    let summary = operation
        .get("summary")
        .and_then(|s| s.as_str())
        .or_else(|| operation.get("operationId").and_then(|s| s.as_str()))
        .map(str::to_string);

    let deprecated = operation
        .get("deprecated")
        .and_then(|d| d.as_bool())
        .unwrap_or(false);

    let request_body = match format {
        SpecFormat::OpenApi3 => operation.get("requestBody").and_then(extract_request_body_v3),
        SpecFormat::Swagger2 => collected.body.take().map(|mut body| {
            if let Some(consumes) = first_consumes(operation) {
                body.content_type = consumes;
            }
            body
        }),
    };

    Ok(RequestNode {
        id: node_id(method, path),
        method: method.to_uppercase(),
        path: path.to_string(),
        summary,
        deprecated,
        parameters: collected.params.into_values().collect(),
        request_body,
        responses: extract_responses(operation.get("responses"), format),
    })
}

/// Parameters gathered from one `parameters` list. Swagger 2.0 declares the
/// request body as a parameter with `in: body`, so it lands here too.
#[derive(Debug, Default, Clone)]
struct Collected {
    params: IndexMap<(String, ParamLocation), Parameter>,
    body: Option<RequestBodySpec>,
}

fn collect_parameters(list: SchemaView<'_>, format: SpecFormat) -> Result<Collected, String> {
    let mut collected = Collected::default();

    for param in list.items() {
        if !param.is_object() {
            return Err("parameter is not an object".to_string());
        }

        let location = param
            .get("in")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "parameter without 'in' location".to_string())?;

        if format == SpecFormat::Swagger2 && location == "body" {
            collected.body = Some(RequestBodySpec {
                content_type: "application/json".to_string(),
                required: param
                    .get("required")
                    .and_then(|r| r.as_bool())
                    .unwrap_or(false),
                schema: param.get("schema").map(|s| s.materialize()),
            });
            continue;
        }
        if format == SpecFormat::Swagger2 && location == "formData" {
            // No path/query/header/cookie location to map this to.
            continue;
        }

        let Some(location) = ParamLocation::parse(location) else {
            continue;
        };

        let name = param
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "parameter without 'name'".to_string())?;

        let schema = match format {
            SpecFormat::OpenApi3 => param.get("schema").map(|s| s.materialize()),
            SpecFormat::Swagger2 => inline_v2_schema(param),
        };

        collected.params.insert(
            (name.to_string(), location),
            Parameter {
                name: name.to_string(),
                location,
                required: param
                    .get("required")
                    .and_then(|r| r.as_bool())
                    .unwrap_or(false),
                schema,
            },
        );
    }

    Ok(collected)
}

/// Swagger 2.0 parameters carry schema keywords inline on the parameter.
fn inline_v2_schema(param: SchemaView<'_>) -> Option<Value> {
    const SCHEMA_KEYS: [&str; 9] = [
        "type", "format", "items", "enum", "minimum", "maximum", "minLength", "maxLength",
        "pattern",
    ];

    let mut map = serde_json::Map::new();
    for key in SCHEMA_KEYS {
        if let Some(value) = param.get(key) {
            map.insert(key.to_string(), value.materialize());
        }
    }

    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

/// First declared content type wins when an operation offers several.
fn extract_request_body_v3(body: SchemaView<'_>) -> Option<RequestBodySpec> {
    let required = body
        .get("required")
        .and_then(|r| r.as_bool())
        .unwrap_or(false);
    let (content_type, media) = body.get("content")?.entries().next()?;

    Some(RequestBodySpec {
        content_type: content_type.to_string(),
        required,
        schema: media.get("schema").map(|s| s.materialize()),
    })
}

fn first_consumes(operation: SchemaView<'_>) -> Option<String> {
    operation
        .get("consumes")?
        .items()
        .next()?
        .as_str()
        .map(str::to_string)
}

fn extract_responses(
    responses: Option<SchemaView<'_>>,
    format: SpecFormat,
) -> IndexMap<String, ResponseShape> {
    let mut out = IndexMap::new();

    let Some(responses) = responses else {
        return out;
    };

    for (status, response) in responses.entries() {
        let shape = match format {
            SpecFormat::OpenApi3 => {
                match response.get("content").and_then(|c| c.entries().next()) {
                    Some((content_type, media)) => ResponseShape {
                        content_type: Some(content_type.to_string()),
                        schema: media.get("schema").map(|s| s.materialize()),
                    },
                    None => ResponseShape {
                        content_type: None,
                        schema: None,
                    },
                }
            }
            SpecFormat::Swagger2 => {
                let schema = response.get("schema").map(|s| s.materialize());
                ResponseShape {
                    content_type: schema
                        .is_some()
                        .then(|| "application/json".to_string()),
                    schema,
                }
            }
        };
        out.insert(status.to_string(), shape);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::{resolve, validate_document};
    use serde_json::json;

    fn build_from(doc: serde_json::Value) -> Collection {
        let format = validate_document(&doc).unwrap();
        let resolved = resolve(&doc).unwrap();
        build("test", &doc.to_string(), format, &resolved)
    }

    #[test]
    fn test_declaration_order_preserved() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/z": {"post": {"responses": {}}, "get": {"responses": {}}},
                "/a": {"get": {"responses": {}}}
            }
        });

        let collection = build_from(doc);
        let listing: Vec<String> = collection
            .nodes
            .iter()
            .map(|n| format!("{} {}", n.method, n.path))
            .collect();
        // No reordering by path or method.
        assert_eq!(listing, ["POST /z", "GET /z", "GET /a"]);
    }

    #[test]
    fn test_operation_parameters_win_over_path_level() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/pets/{petId}": {
                    "parameters": [
                        {"name": "petId", "in": "path", "required": false},
                        {"name": "verbose", "in": "query"}
                    ],
                    "get": {
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true,
                             "schema": {"type": "string"}}
                        ],
                        "responses": {}
                    }
                }
            }
        });

        let collection = build_from(doc);
        let node = &collection.nodes[0];
        assert_eq!(node.parameters.len(), 2);

        let pet_id = node
            .parameters
            .iter()
            .find(|p| p.name == "petId")
            .unwrap();
        assert!(pet_id.required);
        assert_eq!(pet_id.location, ParamLocation::Path);
        assert_eq!(pet_id.schema, Some(json!({"type": "string"})));
    }

    #[test]
    fn test_request_body_first_content_type() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/pets": {
                    "post": {
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/xml": {"schema": {"type": "object"}},
                                "application/json": {"schema": {"type": "object"}}
                            }
                        },
                        "responses": {}
                    }
                }
            }
        });

        let collection = build_from(doc);
        let body = collection.nodes[0].request_body.as_ref().unwrap();
        assert_eq!(body.content_type, "application/xml");
        assert!(body.required);
    }

    #[test]
    fn test_swagger2_body_parameter_becomes_request_body() {
        let doc = json!({
            "swagger": "2.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/pets": {
                    "post": {
                        "consumes": ["application/xml"],
                        "parameters": [
                            {"name": "pet", "in": "body", "required": true,
                             "schema": {"type": "object"}},
                            {"name": "dryRun", "in": "query", "type": "boolean"}
                        ],
                        "responses": {}
                    }
                }
            }
        });

        let collection = build_from(doc);
        let node = &collection.nodes[0];

        let body = node.request_body.as_ref().unwrap();
        assert_eq!(body.content_type, "application/xml");
        assert!(body.required);
        assert_eq!(body.schema, Some(json!({"type": "object"})));

        assert_eq!(node.parameters.len(), 1);
        assert_eq!(node.parameters[0].name, "dryRun");
        assert_eq!(node.parameters[0].schema, Some(json!({"type": "boolean"})));
    }

    #[test]
    fn test_response_shapes_by_status() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/pets": {
                    "get": {
                        "responses": {
                            "200": {
                                "content": {
                                    "application/json": {"schema": {"type": "array"}}
                                }
                            },
                            "404": {"description": "not found"}
                        }
                    }
                }
            }
        });

        let collection = build_from(doc);
        let responses = &collection.nodes[0].responses;
        assert_eq!(
            responses.get("200").unwrap().content_type.as_deref(),
            Some("application/json")
        );
        assert!(responses.get("404").unwrap().schema.is_none());
    }

    #[test]
    fn test_malformed_operation_skipped() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/good": {"get": {"responses": {}}},
                "/bad": {"get": {"parameters": [{"in": "query"}], "responses": {}}}
            }
        });

        let collection = build_from(doc);
        assert_eq!(collection.nodes.len(), 1);
        assert_eq!(collection.nodes[0].path, "/good");
    }

    #[test]
    fn test_summary_falls_back_to_operation_id() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/pets": {"get": {"operationId": "listPets", "responses": {}}}
            }
        });

        let collection = build_from(doc);
        assert_eq!(collection.nodes[0].summary.as_deref(), Some("listPets"));
    }
}
