//! C1 — KeyGen. Derives an [`EntityKey`] from a typed object and a
//! [`FieldKey`] from `(fieldName, args)` (`spec.md` §3, §4.1).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::value::{ObjectValue, Value};

/// `Type:id`, a root sentinel (`Query`/`Mutation`/`Subscription`), or a
/// synthesized embedded-object key (`parent.field`). Never constructed
/// directly outside this module and [`EntityKey::embedded`] — an embedded
/// key must never be referenced by a `Link` from outside its parent
/// (`spec.md` §3 invariants).
///
/// The typename is carried alongside the opaque identity string rather than
/// parsed back out of it: a keyed entity's `id` half may itself contain a
/// `:`, and an embedded key's `parent.field` form has no typename in it at
/// all, so splitting on `:` (as the identity string's own `Type:id`
/// convention might suggest) only works for the keyed case.
#[derive(Debug, Clone)]
pub struct EntityKey {
    id: Arc<str>,
    typename: Arc<str>,
}

impl EntityKey {
    pub(crate) fn raw(id: impl Into<Arc<str>>, typename: impl Into<Arc<str>>) -> Self {
        EntityKey {
            id: id.into(),
            typename: typename.into(),
        }
    }

    /// The well-known sentinel for a root operation type.
    pub fn for_root(root_typename: &str) -> Self {
        EntityKey::raw(root_typename.to_owned(), root_typename.to_owned())
    }

    /// Synthesizes a child key for an object KeyGen decided to embed:
    /// identified by parent key + field path, never by a standalone key.
    pub(crate) fn embedded(parent: &EntityKey, field: &FieldKey, typename: &str) -> Self {
        EntityKey::raw(format!("{parent}.{field}"), typename.to_owned())
    }

    pub fn typename(&self) -> &str {
        &self.typename
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityKey {}

impl std::hash::Hash for EntityKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for EntityKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// `fieldName` or `fieldName(<canonical-json-args>)` (`spec.md` §3, §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey(Arc<str>);

impl FieldKey {
    /// `args` must already have variables bound and default-valued entries
    /// stripped — that's the document analyzer's job (§4.3), not KeyGen's.
    pub fn new(field_name: &str, args: &ObjectValue) -> Self {
        if args.is_empty() {
            return FieldKey(Arc::from(field_name));
        }
        let mut pairs: Vec<(&str, &Value)> = args.iter().map(|(k, v)| (k.as_str(), v)).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let mut canonical = String::from("{");
        for (i, (k, v)) in pairs.iter().enumerate() {
            if i > 0 {
                canonical.push(',');
            }
            canonical.push_str(&serde_json::to_string(k).expect("string key serializes"));
            canonical.push(':');
            canonical.push_str(&canonical_json(v));
        }
        canonical.push('}');
        FieldKey(Arc::from(format!("{field_name}({canonical})")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic JSON rendering: sorted object keys, stable number
/// formatting. Values here are caller-supplied argument values, not
/// store records, so recursing through `serde_json_bytes::Value` directly
/// (rather than `to_string`, which does not sort keys) is what makes
/// canonicalization stable across runs.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&str, &Value)> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = String::from("{");
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).expect("string key serializes"));
                out.push(':');
                out.push_str(&canonical_json(v));
            }
            out.push('}');
            out
        }
        Value::Array(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonical_json(item));
            }
            out.push(']');
            out
        }
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_owned()),
    }
}

/// Result of applying a typename's keying function to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The keying function (or the `id`/`_id` fallback) produced a
    /// non-empty identifier.
    Id(String),
    /// The keying function explicitly returned empty, or no identifier was
    /// found: the object is embedded.
    Embed,
}

/// `(object) -> id | empty` (`spec.md` §6). Boxed so `CacheOptions` can hold
/// one per typename without a generic parameter leaking through the whole
/// crate.
pub type KeyingFn = Arc<dyn Fn(&ObjectValue) -> KeyOutcome + Send + Sync>;

#[derive(Default, Clone)]
pub struct KeyGenConfig {
    pub(crate) keys: HashMap<String, KeyingFn>,
}

impl KeyGenConfig {
    pub fn new(keys: HashMap<String, KeyingFn>) -> Self {
        Self { keys }
    }
}

/// Derives the entity key for an object of type `typename`, or `None` if the
/// object is embedded (`spec.md` §4.1).
pub fn entity_key(config: &KeyGenConfig, typename: &str, object: &ObjectValue) -> Option<EntityKey> {
    if let Some(keying_fn) = config.keys.get(typename) {
        return match keying_fn(object) {
            KeyOutcome::Id(id) if !id.is_empty() => {
                Some(EntityKey::raw(format!("{typename}:{id}"), typename.to_owned()))
            }
            _ => None,
        };
    }
    let id = scalar_id(object, "id").or_else(|| scalar_id(object, "_id"))?;
    Some(EntityKey::raw(format!("{typename}:{id}"), typename.to_owned()))
}

fn scalar_id(object: &ObjectValue, field: &str) -> Option<String> {
    match object.get(field)? {
        Value::String(s) => Some(s.as_str().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ByteString;

    fn obj(pairs: &[(&str, Value)]) -> ObjectValue {
        let mut m = ObjectValue::new();
        for (k, v) in pairs {
            m.insert(ByteString::from(*k), v.clone());
        }
        m
    }

    #[test]
    fn default_keying_prefers_id_over_underscore_id() {
        let cfg = KeyGenConfig::default();
        let object = obj(&[
            ("id", Value::String("1".into())),
            ("_id", Value::String("2".into())),
        ]);
        assert_eq!(
            entity_key(&cfg, "Author", &object),
            Some(EntityKey::raw("Author:1", "Author"))
        );
    }

    #[test]
    fn embedded_key_reports_its_own_typename_not_the_parent() {
        let parent = EntityKey::raw("Todo:1", "Todo");
        let field = FieldKey::new("author", &Default::default());
        let embedded = EntityKey::embedded(&parent, &field, "Address");
        assert_eq!(embedded.typename(), "Address");
        assert_eq!(embedded.as_str(), "Todo:1.author");
    }

    #[test]
    fn missing_id_is_embedded() {
        let cfg = KeyGenConfig::default();
        let object = obj(&[("name", Value::String("A".into()))]);
        assert_eq!(entity_key(&cfg, "Address", &object), None);
    }

    #[test]
    fn custom_keying_fn_can_force_embedding() {
        let mut keys: HashMap<String, KeyingFn> = HashMap::new();
        keys.insert(
            "Author".to_owned(),
            Arc::new(|_obj: &ObjectValue| KeyOutcome::Embed),
        );
        let cfg = KeyGenConfig::new(keys);
        let object = obj(&[("id", Value::String("1".into()))]);
        assert_eq!(entity_key(&cfg, "Author", &object), None);
    }

    #[test]
    fn field_key_canonicalizes_arg_order() {
        let a = obj(&[
            ("b", Value::Number(2.into())),
            ("a", Value::Number(1.into())),
        ]);
        let b = obj(&[
            ("a", Value::Number(1.into())),
            ("b", Value::Number(2.into())),
        ]);
        assert_eq!(FieldKey::new("f", &a), FieldKey::new("f", &b));
    }

    #[test]
    fn field_key_with_no_args_is_bare_name() {
        assert_eq!(FieldKey::new("name", &ObjectValue::new()).as_str(), "name");
    }
}
