//! Lazy response tree over raw API payloads.
//!
//! Every CRUD call returns a [`Response`]: a recursive wrapper around the
//! JSON value the API produced. Construction normalizes mapping keys from
//! the wire's camelCase/PascalCase to lower_snake exactly once, so field
//! access uses one predictable convention from then on.
//!
//! Mapping nodes understand the Ed-Fi hypermedia convention: a field named
//! `<x>_reference` holding `{link: {href: ...}}` marks a related resource.
//! [`Response::resolve_reference`] follows such links through the client
//! the tree is bound to, caching the resolved subtree per node and per
//! href; [`Response::refresh_reference`] evicts and re-fetches. The bound
//! client is a weak back-reference shared by construction and rewritable
//! via [`Response::attach_client`] — the tree never owns a client.
//!
//! Serialization ([`Response::to_value`]) is a pure structural fold: it
//! reverses the wrapping without touching the reference cache or the
//! network, even when unresolved `_reference` fields are present.

use indexmap::IndexMap;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::EdFiClient;
use crate::error::{EdFiError, Result};
use crate::inflect;
use crate::transport::QueryMap;

/// A wrapped API response node: scalar, mapping, or sequence.
pub struct Response {
    node: Node,
}

enum Node {
    Scalar(Value),
    Mapping(MappingNode),
    Sequence(SequenceNode),
}

struct MappingNode {
    client: ClientHandle,
    entries: IndexMap<String, Response>,
    /// Resolved references, keyed by href. Scoped to this node and living
    /// as long as it. The mutex is held across the resolving fetch so an
    /// evict + re-populate pair is atomic (no lost update between them).
    references: Mutex<HashMap<String, Arc<Response>>>,
}

struct SequenceNode {
    client: ClientHandle,
    items: Vec<Response>,
}

/// Weak back-reference to the client that produced (or was attached to)
/// this subtree. Weak by design: response trees never keep a client alive.
struct ClientHandle(RwLock<Weak<EdFiClient>>);

impl ClientHandle {
    fn new(weak: Weak<EdFiClient>) -> Self {
        ClientHandle(RwLock::new(weak))
    }

    fn set(&self, weak: Weak<EdFiClient>) {
        let mut slot = self.0.write().unwrap_or_else(|e| e.into_inner());
        *slot = weak;
    }

    fn upgrade(&self) -> Option<Arc<EdFiClient>> {
        self.0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .upgrade()
    }
}

impl Response {
    /// Wraps a raw payload with no bound client.
    ///
    /// The top level must be a JSON object or array; anything else fails
    /// with an argument error. Reference traversal on the result fails
    /// until a client is attached via [`Response::attach_client`].
    pub fn wrap(raw: Value) -> Result<Response> {
        Response::wrap_bound(raw, Weak::new())
    }

    /// Wraps a raw payload and binds every node to `client`.
    pub fn wrap_bound(raw: Value, client: Weak<EdFiClient>) -> Result<Response> {
        match raw {
            Value::Object(map) => Ok(Response::from_object(map, &client)),
            Value::Array(items) => Ok(Response::from_array(items, &client)),
            other => Err(EdFiError::argument(format!(
                "unexpected response shape: {}",
                value_kind(&other)
            ))),
        }
    }

    fn from_value(value: Value, client: &Weak<EdFiClient>) -> Response {
        match value {
            Value::Object(map) => Response::from_object(map, client),
            Value::Array(items) => Response::from_array(items, client),
            scalar => Response {
                node: Node::Scalar(scalar),
            },
        }
    }

    fn from_object(map: Map<String, Value>, client: &Weak<EdFiClient>) -> Response {
        let entries = map
            .into_iter()
            .map(|(key, value)| {
                (
                    inflect::to_snake_case(&key),
                    Response::from_value(value, client),
                )
            })
            .collect();

        Response {
            node: Node::Mapping(MappingNode {
                client: ClientHandle::new(client.clone()),
                entries,
                references: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn from_array(items: Vec<Value>, client: &Weak<EdFiClient>) -> Response {
        let items = items
            .into_iter()
            .map(|item| Response::from_value(item, client))
            .collect();

        Response {
            node: Node::Sequence(SequenceNode {
                client: ClientHandle::new(client.clone()),
                items,
            }),
        }
    }

    // ── field access ───────────────────────────────────────────────────

    /// Returns a declared mapping field by its normalized (lower_snake)
    /// name. Fails with [`EdFiError::FieldNotFound`] on undeclared fields
    /// and on non-mapping nodes; reference traversal is a separate,
    /// explicitly named operation ([`Response::resolve_reference`]).
    pub fn get(&self, field: &str) -> Result<&Response> {
        match &self.node {
            Node::Mapping(map) => map
                .entries
                .get(field)
                .ok_or_else(|| EdFiError::field_not_found(field)),
            _ => Err(EdFiError::field_not_found(field)),
        }
    }

    /// Whether the mapping declares `field` (normalized name).
    pub fn contains(&self, field: &str) -> bool {
        match &self.node {
            Node::Mapping(map) => map.entries.contains_key(field),
            _ => false,
        }
    }

    /// Whether `field` is traversable as a reference: a
    /// `<field>_reference.link.href` string exists on this mapping node.
    /// Does not require a bound client and performs no fetch.
    pub fn has_reference(&self, field: &str) -> bool {
        match &self.node {
            Node::Mapping(map) => map.reference_href(field).is_some(),
            _ => false,
        }
    }

    // ── reference traversal ────────────────────────────────────────────

    /// Resolves the `<field>_reference` hypermedia link on this mapping
    /// node, fetching through the bound client on first access and
    /// returning the per-node cached subtree on every later one.
    ///
    /// Fails with [`EdFiError::FieldNotFound`] when the reference shape is
    /// missing or malformed, or when no live client is bound — the same
    /// behavior as an undeclared field. Transport and API errors from the
    /// fetch propagate unchanged.
    pub async fn resolve_reference(&self, field: &str) -> Result<Arc<Response>> {
        self.traverse_reference(field, false).await
    }

    /// Like [`Response::resolve_reference`], but evicts any cached entry
    /// for the link's href first, so the result is always freshly fetched
    /// and replaces the previous cache entry.
    pub async fn refresh_reference(&self, field: &str) -> Result<Arc<Response>> {
        self.traverse_reference(field, true).await
    }

    async fn traverse_reference(&self, field: &str, force: bool) -> Result<Arc<Response>> {
        let Node::Mapping(map) = &self.node else {
            return Err(EdFiError::field_not_found(field));
        };

        let href = map
            .reference_href(field)
            .ok_or_else(|| EdFiError::field_not_found(field))?;
        let client = map
            .client
            .upgrade()
            .ok_or_else(|| EdFiError::field_not_found(field))?;

        // Holding the lock across the fetch serializes resolution per
        // node, making the evict/re-populate pair atomic for refreshes.
        let mut references = map.references.lock().await;

        if force {
            references.remove(&href);
        }

        if let Some(cached) = references.get(&href) {
            return Ok(Arc::clone(cached));
        }

        debug!(href = %href, field = %field, "resolving reference");
        let resolved = Arc::new(client.get(&href, HeaderMap::new(), &QueryMap::new()).await?);
        references.insert(href, Arc::clone(&resolved));
        Ok(resolved)
    }

    // ── client binding ─────────────────────────────────────────────────

    /// Rebinds this subtree to `client`, walking depth-first and
    /// overwriting the handle on every mapping and sequence node.
    ///
    /// Existing reference caches are intentionally left intact: entries
    /// already resolved stay usable under the new binding and are only
    /// re-fetched through [`Response::refresh_reference`].
    pub fn attach_client(&self, client: &Arc<EdFiClient>) {
        self.bind(&Arc::downgrade(client));
    }

    fn bind(&self, weak: &Weak<EdFiClient>) {
        match &self.node {
            Node::Mapping(map) => {
                map.client.set(weak.clone());
                for value in map.entries.values() {
                    value.bind(weak);
                }
            }
            Node::Sequence(seq) => {
                seq.client.set(weak.clone());
                for item in &seq.items {
                    item.bind(weak);
                }
            }
            Node::Scalar(_) => {}
        }
    }

    // ── structural operations ──────────────────────────────────────────

    /// Entry count of a mapping, element count of a sequence, 0 for a
    /// scalar.
    pub fn len(&self) -> usize {
        match &self.node {
            Node::Mapping(map) => map.entries.len(),
            Node::Sequence(seq) => seq.items.len(),
            Node::Scalar(_) => 0,
        }
    }

    /// Whether the node has no entries or elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence element by position; `None` on other node kinds or out of
    /// range.
    pub fn at(&self, index: usize) -> Option<&Response> {
        match &self.node {
            Node::Sequence(seq) => seq.items.get(index),
            _ => None,
        }
    }

    /// Iterates the elements of a sequence node (empty otherwise).
    pub fn iter(&self) -> impl Iterator<Item = &Response> {
        const EMPTY: &[Response] = &[];
        match &self.node {
            Node::Sequence(seq) => seq.items.iter(),
            _ => EMPTY.iter(),
        }
    }

    /// Iterates a mapping's normalized keys in wire order (empty for
    /// other node kinds).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        match &self.node {
            Node::Mapping(map) => Some(map.entries.keys().map(String::as_str)),
            _ => None,
        }
        .into_iter()
        .flatten()
    }

    /// True when this node is a mapping.
    pub fn is_mapping(&self) -> bool {
        matches!(self.node, Node::Mapping(_))
    }

    /// True when this node is a sequence.
    pub fn is_sequence(&self) -> bool {
        matches!(self.node, Node::Sequence(_))
    }

    // ── scalar views ───────────────────────────────────────────────────

    /// String view of a scalar node.
    pub fn as_str(&self) -> Option<&str> {
        match &self.node {
            Node::Scalar(value) => value.as_str(),
            _ => None,
        }
    }

    /// Integer view of a scalar node.
    pub fn as_i64(&self) -> Option<i64> {
        match &self.node {
            Node::Scalar(value) => value.as_i64(),
            _ => None,
        }
    }

    /// Float view of a scalar node.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.node {
            Node::Scalar(value) => value.as_f64(),
            _ => None,
        }
    }

    /// Boolean view of a scalar node.
    pub fn as_bool(&self) -> Option<bool> {
        match &self.node {
            Node::Scalar(value) => value.as_bool(),
            _ => None,
        }
    }

    /// True when the scalar is JSON `null`.
    pub fn is_null(&self) -> bool {
        matches!(&self.node, Node::Scalar(Value::Null))
    }

    // ── serialization ──────────────────────────────────────────────────

    /// Unwraps the tree back into a plain JSON value.
    ///
    /// A pure structural fold: mapping keys come out in their normalized
    /// lower_snake form, no reference is ever traversed, and no network
    /// activity can occur.
    pub fn to_value(&self) -> Value {
        match &self.node {
            Node::Scalar(value) => value.clone(),
            Node::Mapping(map) => Value::Object(
                map.entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_value()))
                    .collect(),
            ),
            Node::Sequence(seq) => {
                Value::Array(seq.items.iter().map(Response::to_value).collect())
            }
        }
    }

    /// Like [`Response::to_value`], with every mapping key re-camelized to
    /// the wire convention. Equally pure.
    pub fn to_wire_value(&self) -> Value {
        inflect::camelize_keys(&self.to_value())
    }
}

impl MappingNode {
    /// Extracts the `<field>_reference.link.href` string, if the full
    /// shape is present and well-formed.
    fn reference_href(&self, field: &str) -> Option<String> {
        let reference = self.entries.get(&format!("{field}_reference"))?;
        let href = reference.get("link").ok()?.get("href").ok()?;
        href.as_str().map(str::to_string)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Response").field(&self.to_value()).finish()
    }
}

impl PartialEq for Response {
    /// Structural equality over the serialized form. Client bindings and
    /// reference caches do not participate.
    fn eq(&self, other: &Self) -> bool {
        self.to_value() == other.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(raw: Value) -> Response {
        Response::wrap(raw).expect("test payload should wrap")
    }

    #[test]
    fn top_level_scalar_is_rejected() {
        for raw in [json!(42), json!("plain"), json!(true), Value::Null] {
            let err = Response::wrap(raw).unwrap_err();
            assert!(
                matches!(err, EdFiError::Argument { .. }),
                "bare scalars must fail construction, got {err:?}"
            );
        }
    }

    #[test]
    fn wrap_normalizes_keys_recursively() {
        let r = wrap(json!({
            "Some_Field": 1,
            "Nested_Thing": {"Inner_Value": 2},
        }));
        assert_eq!(r.get("some_field").unwrap().as_i64(), Some(1));
        assert_eq!(
            r.get("nested_thing").unwrap().get("inner_value").unwrap().as_i64(),
            Some(2)
        );
    }

    #[test]
    fn wrap_normalizes_camel_case_keys() {
        let r = wrap(json!({"studentUniqueId": "s-1", "schoolYear": 2026}));
        assert_eq!(r.get("student_unique_id").unwrap().as_str(), Some("s-1"));
        assert_eq!(r.get("school_year").unwrap().as_i64(), Some(2026));
    }

    #[test]
    fn wrap_descends_into_sequences() {
        let r = wrap(json!([{"FirstName": "Ada"}, {"FirstName": "Grace"}]));
        assert!(r.is_sequence());
        assert_eq!(r.len(), 2);
        assert_eq!(r.at(0).unwrap().get("first_name").unwrap().as_str(), Some("Ada"));
        assert_eq!(r.at(1).unwrap().get("first_name").unwrap().as_str(), Some("Grace"));
    }

    #[test]
    fn undeclared_field_is_field_not_found() {
        let r = wrap(json!({"known": 1}));
        let err = r.get("unknown").unwrap_err();
        match err {
            EdFiError::FieldNotFound { field } => assert_eq!(field, "unknown"),
            other => panic!("expected FieldNotFound, got {other:?}"),
        }
    }

    #[test]
    fn get_on_sequence_is_field_not_found() {
        let r = wrap(json!([1, 2, 3]));
        assert!(matches!(
            r.get("anything").unwrap_err(),
            EdFiError::FieldNotFound { .. }
        ));
    }

    #[test]
    fn has_reference_requires_full_link_shape() {
        let r = wrap(json!({
            "school_reference": {"link": {"href": "/schools/1"}},
            "broken_reference": {"link": {}},
            "flat_reference": "/schools/2",
        }));
        assert!(r.has_reference("school"));
        assert!(!r.has_reference("broken"), "missing href must not resolve");
        assert!(!r.has_reference("flat"), "non-mapping reference must not resolve");
        assert!(!r.has_reference("absent"));
    }

    #[tokio::test]
    async fn unbound_reference_traversal_is_field_not_found() {
        // A valid link shape with no attached client falls through to the
        // undeclared-field behavior.
        let r = wrap(json!({"school_reference": {"link": {"href": "/schools/1"}}}));
        let err = r.resolve_reference("school").await.unwrap_err();
        assert!(matches!(err, EdFiError::FieldNotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_reference_traversal_is_field_not_found() {
        let r = wrap(json!({"school_reference": {"href": "/schools/1"}}));
        let err = r.resolve_reference("school").await.unwrap_err();
        assert!(matches!(err, EdFiError::FieldNotFound { .. }));
    }

    #[test]
    fn to_value_reverses_wrapping() {
        let r = wrap(json!({
            "Name": "Lincoln High",
            "GradeLevels": [{"GradeLevelDescriptor": "Ninth grade"}],
        }));
        assert_eq!(
            r.to_value(),
            json!({
                "name": "Lincoln High",
                "grade_levels": [{"grade_level_descriptor": "Ninth grade"}],
            })
        );
    }

    #[test]
    fn to_wire_value_restores_camel_case() {
        let r = wrap(json!({"StudentUniqueId": "s-1", "BirthData": {"BirthDate": "2010-01-01"}}));
        assert_eq!(
            r.to_wire_value(),
            json!({"studentUniqueId": "s-1", "birthData": {"birthDate": "2010-01-01"}})
        );
    }

    #[test]
    fn serialization_keeps_unresolved_references_inline() {
        // The _reference mapping serializes as plain data; nothing is
        // traversed. (The zero-network property is asserted end-to-end in
        // tests/response_flow.rs with a mock server expecting no calls.)
        let r = wrap(json!({"school_reference": {"link": {"href": "/schools/1"}}}));
        assert_eq!(
            r.to_value(),
            json!({"school_reference": {"link": {"href": "/schools/1"}}})
        );
    }

    #[test]
    fn display_uses_serialized_form() {
        let r = wrap(json!({"Id": 7}));
        assert_eq!(r.to_string(), r#"{"id":7}"#);
    }

    #[test]
    fn keys_preserve_wire_order() {
        let r = wrap(json!({"Zeta": 1, "Alpha": 2, "Mid": 3}));
        let keys: Vec<&str> = r.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn structural_equality_ignores_binding() {
        let a = wrap(json!({"Id": 1}));
        let b = wrap(json!({"id": 1}));
        assert_eq!(a, b, "normalized trees with equal data must compare equal");
    }
}
