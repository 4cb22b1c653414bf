//! Shared fixtures for the scenario tests (`spec.md` §8). Not a test binary
//! itself — `mod.rs` is excluded from Cargo's integration-test autodiscovery.

use std::sync::Arc;

use apollo_compiler::{ExecutableDocument, Schema};
use graphql_cache::{
    CacheOptions, Effect, EmittedResult, IncomingOperation, IncomingResult, ObjectValue,
    OperationKey, OperationKind, RequestPolicy, Value,
};

pub const SCHEMA_SDL: &str = r#"
directive @_required on FIELD
directive @_optional on FIELD

type Query {
  author(id: ID): Author
  authors: [Author]
  todos: [Todo]
}

type Mutation {
  setName(id: ID, name: String): Author
}

type Subscription {
  onAuthorChanged: Author
}

type Author {
  id: ID!
  name: String
}

type Todo {
  id: ID!
  text: String
  completed: Boolean
  author: Author
}
"#;

pub fn schema() -> Schema {
    Schema::parse_and_validate(SCHEMA_SDL, "schema.graphql")
        .unwrap()
        .into_inner()
}

/// Parses `source` against [`SCHEMA_SDL`] and hands back the single
/// operation it declares, ready to hang off an [`IncomingOperation`].
pub fn document(source: &str) -> Arc<ExecutableDocument> {
    let schema = Schema::parse_and_validate(SCHEMA_SDL, "schema.graphql").unwrap();
    let doc = ExecutableDocument::parse_and_validate(&schema, source, "operation.graphql").unwrap();
    Arc::new(doc.into_inner())
}

pub fn options() -> CacheOptions {
    CacheOptions::builder().schema(schema()).build()
}

pub fn query_op(key: &str, source: &str, request_policy: RequestPolicy) -> IncomingOperation {
    IncomingOperation {
        key: OperationKey::new(key),
        kind: OperationKind::Query,
        document: document(source),
        operation_name: None,
        variables: ObjectValue::new(),
        request_policy,
    }
}

pub fn mutation_op(key: &str, source: &str) -> IncomingOperation {
    IncomingOperation {
        key: OperationKey::new(key),
        kind: OperationKind::Mutation,
        document: document(source),
        operation_name: None,
        variables: ObjectValue::new(),
        request_policy: RequestPolicy::NetworkOnly,
    }
}

pub fn subscription_op(key: &str, source: &str) -> IncomingOperation {
    IncomingOperation {
        key: OperationKey::new(key),
        kind: OperationKind::Subscription,
        document: document(source),
        operation_name: None,
        variables: ObjectValue::new(),
        request_policy: RequestPolicy::NetworkOnly,
    }
}

pub fn result(key: &str, data: Value) -> IncomingResult {
    IncomingResult {
        key: OperationKey::new(key),
        data: Some(data),
        error: None,
        errored_fields: Vec::new(),
        has_next: false,
        path: Vec::new(),
    }
}

/// Builds an `IncomingResult` for a deferred `incremental` patch: `path`
/// names where `data` belongs, mirroring the response's own `path` array.
pub fn incremental_result(key: &str, path: Vec<graphql_cache::PathSegment>, data: Value, has_next: bool) -> IncomingResult {
    IncomingResult {
        key: OperationKey::new(key),
        data: Some(data),
        error: None,
        errored_fields: Vec::new(),
        has_next,
        path,
    }
}

pub fn emissions_for<'a>(effects: &'a [Effect], key: &str) -> Vec<&'a EmittedResult> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Emit(r) if r.operation.as_str() == key => Some(r),
            _ => None,
        })
        .collect()
}

pub fn forwards_for(effects: &[Effect], key: &str) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Forward { operation, .. } if operation.as_str() == key))
        .count()
}

pub fn error_result(key: &str, error: Value) -> IncomingResult {
    IncomingResult {
        key: OperationKey::new(key),
        data: None,
        error: Some(error),
        errored_fields: Vec::new(),
        has_next: false,
        path: Vec::new(),
    }
}

pub fn obj(pairs: &[(&str, Value)]) -> Value {
    let mut map = ObjectValue::new();
    for (k, v) in pairs {
        map.insert(*k, v.clone());
    }
    Value::Object(map)
}

pub fn get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        _ => None,
    }
}

pub fn jstr(s: &str) -> Value {
    Value::String(s.into())
}

/// An `Author` payload object, `__typename` included the way a real client
/// auto-appends it to every selection so normalization can key off it
/// regardless of what the caller's own selection set asked for.
pub fn author(id: &str, name: &str) -> Value {
    obj(&[("__typename", jstr("Author")), ("id", jstr(id)), ("name", jstr(name))])
}

pub fn todo(id: &str, text: &str) -> Value {
    obj(&[("__typename", jstr("Todo")), ("id", jstr(id)), ("text", jstr(text))])
}
