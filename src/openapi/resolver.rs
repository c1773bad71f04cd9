//! `$ref` resolution over parsed OpenAPI documents
//!
//! Resolution replaces every same-document reference with a handle into an
//! arena of resolved subtrees. Two references to the same target share one
//! arena entry instead of deep copies, which makes the resolved document a
//! DAG; true cycles are detected against the resolution stack and reported
//! as [`ImportError::CyclicReference`].
//!
//! Consumers never see handles directly: [`SchemaView`] is an immutable
//! cursor over the resolved document that follows handles transparently.
//! There is no mutable access path to resolved nodes.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::ImportError;

/// Key marking an inlined reference in the resolved tree. Only ever produced
/// by the resolver and only ever consumed through [`SchemaView`]: literal
/// occurrences of this key in input data are escaped with an extra leading
/// `$` during rewrite and unescaped on read, so no input object can
/// masquerade as a handle.
const HANDLE_KEY: &str = "$resolved-handle";

/// `"$resolved-handle"` -> `Some(0)`, `"$$resolved-handle"` -> `Some(1)`
/// (one escape level), and so on; `None` for every other key.
fn marker_depth(key: &str) -> Option<usize> {
    let dollars = key.strip_suffix("resolved-handle")?;
    if dollars.is_empty() || !dollars.bytes().all(|b| b == b'$') {
        return None;
    }
    Some(dollars.len() - 1)
}

/// Escaped form of a key that could be mistaken for (an escape of) the
/// marker; `None` when the key needs no escaping.
fn escape_key(key: &str) -> Option<String> {
    marker_depth(key).map(|_| format!("${}", key))
}

/// Strip one escape level off a stored key. Subslice, never allocates.
fn unescape_key(key: &str) -> &str {
    match marker_depth(key) {
        Some(depth) if depth >= 1 => &key[1..],
        _ => key,
    }
}

/// An OpenAPI document with every `$ref` resolved.
///
/// Holds the rewritten root plus the arena of resolved reference targets.
/// Owned by one import call and discarded once the collection is built.
#[derive(Debug)]
pub struct ResolvedSpec {
    root: Value,
    arena: Vec<Value>,
}

impl ResolvedSpec {
    /// Immutable view of the document root.
    pub fn root(&self) -> SchemaView<'_> {
        SchemaView {
            spec: self,
            node: &self.root,
        }
    }

    /// Number of distinct reference targets that were resolved.
    pub fn resolved_targets(&self) -> usize {
        self.arena.len()
    }

    /// Follow handle markers until a real node is reached.
    ///
    /// Marker chains are acyclic (cycles fail resolution), so this
    /// terminates.
    fn follow<'a>(&'a self, node: &'a Value) -> &'a Value {
        let mut current = node;
        while let Some(handle) = handle_of(current) {
            current = &self.arena[handle];
        }
        current
    }
}

/// Extract the arena index if `node` is a handle marker.
fn handle_of(node: &Value) -> Option<usize> {
    let map = node.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(HANDLE_KEY)?.as_u64().map(|h| h as usize)
}

/// Read-only cursor over a [`ResolvedSpec`].
///
/// All accessors dereference handle markers before looking at the node, so
/// callers traverse the document as if every reference had been inlined.
#[derive(Debug, Clone, Copy)]
pub struct SchemaView<'a> {
    spec: &'a ResolvedSpec,
    node: &'a Value,
}

impl<'a> SchemaView<'a> {
    fn value(&self) -> &'a Value {
        self.spec.follow(self.node)
    }

    fn wrap(&self, node: &'a Value) -> SchemaView<'a> {
        SchemaView {
            spec: self.spec,
            node,
        }
    }

    /// Child of an object node by key.
    pub fn get(&self, key: &str) -> Option<SchemaView<'a>> {
        let stored = escape_key(key);
        let lookup = stored.as_deref().unwrap_or(key);
        self.value()
            .as_object()
            .and_then(|map| map.get(lookup))
            .map(|child| self.wrap(child))
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.value().as_str()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value().as_bool()
    }

    pub fn is_object(&self) -> bool {
        self.value().is_object()
    }

    /// Object entries in declaration order; empty for non-objects.
    pub fn entries(&self) -> impl Iterator<Item = (&'a str, SchemaView<'a>)> + 'a {
        let spec = self.spec;
        self.value()
            .as_object()
            .into_iter()
            .flatten()
            .map(move |(key, child)| (unescape_key(key.as_str()), SchemaView { spec, node: child }))
    }

    /// Array items in order; empty for non-arrays.
    pub fn items(&self) -> impl Iterator<Item = SchemaView<'a>> + 'a {
        let spec = self.spec;
        self.value()
            .as_array()
            .into_iter()
            .flatten()
            .map(move |child| SchemaView { spec, node: child })
    }

    /// Copy this subtree out as a plain value with every handle inlined.
    ///
    /// Shared targets are duplicated here, which is what makes the output
    /// self-contained; safe because resolution already rejected cycles.
    pub fn materialize(&self) -> Value {
        match self.value() {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, child)| {
                        (unescape_key(key).to_string(), self.wrap(child).materialize())
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|child| self.wrap(child).materialize())
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Resolve every `$ref` in a validated document.
pub fn resolve(document: &Value) -> Result<ResolvedSpec, ImportError> {
    let mut resolver = Resolver {
        source: document,
        arena: Vec::new(),
        by_pointer: HashMap::new(),
        stack: Vec::new(),
    };

    let root = resolver.rewrite(document)?;
    debug!(
        targets = resolver.arena.len(),
        "resolved specification references"
    );

    Ok(ResolvedSpec {
        root,
        arena: resolver.arena,
    })
}

struct Resolver<'a> {
    source: &'a Value,
    arena: Vec<Value>,
    /// Normalized pointer -> arena index, deduplicating shared targets.
    by_pointer: HashMap<String, usize>,
    /// Pointers currently being resolved, for cycle detection.
    stack: Vec<String>,
}

impl Resolver<'_> {
    /// Clone `node` with every `$ref` object replaced by a handle marker.
    fn rewrite(&mut self, node: &Value) -> Result<Value, ImportError> {
        match node {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    let handle = self.resolve_reference(reference)?;
                    let mut marker = Map::new();
                    marker.insert(HANDLE_KEY.to_string(), Value::from(handle as u64));
                    return Ok(Value::Object(marker));
                }

                let mut out = Map::new();
                for (key, child) in map {
                    let stored = escape_key(key).unwrap_or_else(|| key.clone());
                    out.insert(stored, self.rewrite(child)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for child in items {
                    out.push(self.rewrite(child)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolve one `$ref` string to an arena handle.
    fn resolve_reference(&mut self, reference: &str) -> Result<usize, ImportError> {
        let Some(pointer) = reference.strip_prefix('#') else {
            return Err(ImportError::InvalidSpec(format!(
                "External reference '{}' is not supported",
                reference
            )));
        };

        if let Some(&handle) = self.by_pointer.get(pointer) {
            return Ok(handle);
        }

        if self.stack.iter().any(|entry| entry == pointer) {
            let mut chain: Vec<&str> = self.stack.iter().map(String::as_str).collect();
            chain.push(pointer);
            return Err(ImportError::CyclicReference(chain.join(" -> ")));
        }

        let target = self.source.pointer(pointer).ok_or_else(|| {
            ImportError::InvalidSpec(format!("Reference '{}' does not exist", reference))
        })?;

        self.stack.push(pointer.to_string());
        let resolved = self.rewrite(target);
        self.stack.pop();

        let handle = self.arena.len();
        self.arena.push(resolved?);
        self.by_pointer.insert(pointer.to_string(), handle);
        Ok(handle)
    }
}
