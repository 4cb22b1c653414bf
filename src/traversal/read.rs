//! C5 — Read Traversal. Walks a selection set against the store, producing
//! a denormalized result, a dependency set and a completeness classification
//! (`spec.md` §4.5).

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::cache_api::{CacheApi, FieldInfo};
use crate::document::AnalyzedSelectionSet;
use crate::key::{entity_key, EntityKey, FieldKey, KeyGenConfig};
use crate::store::Link;
use crate::value::{JsonMap, ObjectValue, Value};

/// A read result that preserves object identity on unchanged subtrees
/// (`spec.md` §4.5, §8 property 2): callers compare `Arc::ptr_eq` on
/// [`OutputValue::Object`]/[`OutputValue::List`] to detect reuse, rather
/// than deep-comparing JSON.
#[derive(Debug, Clone)]
pub enum OutputValue {
    Null,
    Scalar(Value),
    Object(Arc<indexmap::IndexMap<String, OutputValue>>),
    List(Arc<Vec<OutputValue>>),
}

impl OutputValue {
    pub fn to_json(&self) -> Value {
        match self {
            OutputValue::Null => Value::Null,
            OutputValue::Scalar(v) => v.clone(),
            OutputValue::Object(fields) => {
                let mut map = JsonMap::new();
                for (k, v) in fields.iter() {
                    map.insert(k.as_str(), v.to_json());
                }
                Value::Object(map)
            }
            OutputValue::List(items) => Value::Array(items.iter().map(OutputValue::to_json).collect()),
        }
    }

    /// Reference-identity check used by the reexecution scheduler (§4.7
    /// step 2: "If the new output differs from the prior one (by value or
    /// dependency set)...").
    pub fn identical(&self, other: &OutputValue) -> bool {
        match (self, other) {
            (OutputValue::Object(a), OutputValue::Object(b)) => Arc::ptr_eq(a, b),
            (OutputValue::List(a), OutputValue::List(b)) => Arc::ptr_eq(a, b),
            (OutputValue::Null, OutputValue::Null) => true,
            (OutputValue::Scalar(a), OutputValue::Scalar(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Hit,
    Partial,
    Miss,
}

pub struct ReadOutcome {
    pub data: Option<OutputValue>,
    pub completeness: Completeness,
    pub dependencies: IndexSet<(EntityKey, FieldKey)>,
    pub stale: bool,
}

struct Signals {
    partial: bool,
    stale: bool,
}

/// Reads `selection` rooted at `root` with no reuse context — used by the
/// mediated cache API's `readFragment`/`readQuery` (§6), which don't
/// participate in the operation-level reexecution/reuse bookkeeping.
pub fn read_root(
    ctx: &mut CacheApi<'_>,
    root: &EntityKey,
    root_typename: &str,
    selection: &AnalyzedSelectionSet,
) -> ReadOutcome {
    read_selection(
        ctx,
        root,
        root_typename,
        selection,
        None,
        &HashSet::new(),
        &HashSet::new(),
    )
}

/// Full read entry point used by the operation controller (§4.5, §4.7).
///
/// - `prior`: the previous emission for this same operation, for
///   reference-reuse.
/// - `changed`: the `(entity, field)` pairs a write transaction just
///   touched — subtrees that read none of these keep their prior identity.
/// - `invalidated_types`: typenames flagged stale by a mutation result whose
///   typename wasn't already known to the store (§4.4 item 7); any entity
///   of one of these types marks the read `stale`.
pub fn read_selection(
    ctx: &mut CacheApi<'_>,
    root: &EntityKey,
    root_typename: &str,
    selection: &AnalyzedSelectionSet,
    prior: Option<&OutputValue>,
    changed: &HashSet<(EntityKey, FieldKey)>,
    invalidated_types: &HashSet<String>,
) -> ReadOutcome {
    let mut deps = IndexSet::new();
    let mut signals = Signals {
        partial: false,
        stale: false,
    };
    let prior_object = match prior {
        Some(OutputValue::Object(fields)) => Some(fields),
        _ => None,
    };
    let data = read_object(
        ctx,
        root,
        root_typename,
        selection,
        prior_object,
        changed,
        invalidated_types,
        &mut deps,
        &mut signals,
    );
    let completeness = match &data {
        None => Completeness::Miss,
        Some(_) if signals.partial => Completeness::Partial,
        Some(_) => Completeness::Hit,
    };
    ReadOutcome {
        data: data.map(OutputValue::Object),
        completeness,
        dependencies: deps,
        stale: signals.stale,
    }
}

#[allow(clippy::too_many_arguments)]
fn read_object(
    ctx: &mut CacheApi<'_>,
    entity: &EntityKey,
    typename: &str,
    selection: &AnalyzedSelectionSet,
    prior: Option<&Arc<indexmap::IndexMap<String, OutputValue>>>,
    changed: &HashSet<(EntityKey, FieldKey)>,
    invalidated_types: &HashSet<String>,
    deps: &mut IndexSet<(EntityKey, FieldKey)>,
    signals: &mut Signals,
) -> Option<Arc<indexmap::IndexMap<String, OutputValue>>> {
    if invalidated_types.contains(typename) {
        signals.stale = true;
    }

    let mut out = indexmap::IndexMap::with_capacity(selection.fields.len());
    let mut any_field_changed = prior.is_none();

    for (response_key, field) in &selection.fields {
        if let Some(cond) = &field.type_condition {
            if cond != typename {
                continue;
            }
        }

        let field_key = field.field_key.clone();
        let this_dep_changed = changed.contains(&(entity.clone(), field_key.clone()));
        let prior_value = prior.and_then(|p| p.get(response_key));

        // Sibling fields resolved earlier in this same selection are visible
        // to a resolver as `parent` (`spec.md` §6); fields later in
        // iteration order are not yet known and so aren't included.
        let mut parent_so_far = JsonMap::new();
        for (key, value) in out.iter() {
            parent_so_far.insert(key.as_str(), value.to_json());
        }
        let parent = Value::Object(parent_so_far);

        let resolved = read_field(
            ctx,
            entity,
            typename,
            field,
            this_dep_changed,
            prior_value,
            changed,
            invalidated_types,
            deps,
            signals,
            &parent,
        );
        deps.insert((entity.clone(), field_key));

        match resolved {
            Some(value) => {
                if this_dep_changed || prior_value.is_none() || !value.identical(prior_value.unwrap()) {
                    any_field_changed = true;
                }
                out.insert(response_key.clone(), value);
            }
            None => {
                if field.tolerate_missing {
                    signals.partial = true;
                    any_field_changed = any_field_changed || this_dep_changed;
                    out.insert(response_key.clone(), OutputValue::Null);
                } else {
                    return None;
                }
            }
        }
    }

    if !any_field_changed {
        if let Some(prior) = prior {
            if prior.len() == out.len() {
                return Some(Arc::clone(prior));
            }
        }
    }
    Some(Arc::new(out))
}

#[allow(clippy::too_many_arguments)]
fn read_field(
    ctx: &mut CacheApi<'_>,
    entity: &EntityKey,
    typename: &str,
    field: &crate::document::AnalyzedField,
    changed_here: bool,
    prior: Option<&OutputValue>,
    changed: &HashSet<(EntityKey, FieldKey)>,
    invalidated_types: &HashSet<String>,
    deps: &mut IndexSet<(EntityKey, FieldKey)>,
    signals: &mut Signals,
    parent: &Value,
) -> Option<OutputValue> {
    if let Some(resolver) = ctx
        .options
        .resolvers
        .get(&(typename.to_owned(), field.field_name.clone()))
    {
        let info = FieldInfo {
            parent_typename: typename,
            field_name: &field.field_name,
            field_key: &field.field_key,
        };
        let value = resolver(parent, &field.args, ctx, &info);
        return continue_into_resolved(ctx, field, &value, prior, changed, invalidated_types, deps, signals);
    }

    if let Some(child_selection) = &field.selection {
        if let Some(link) = ctx.store.read_link(entity, &field.field_key).cloned() {
            return match link {
                Link::Null => None,
                Link::Single(child_key) => {
                    let child_typename = child_key.typename().to_owned();
                    let prior_children = match prior {
                        Some(OutputValue::Object(o)) => Some(o),
                        _ => None,
                    };
                    read_object(
                        ctx,
                        &child_key,
                        &child_typename,
                        child_selection,
                        prior_children,
                        changed,
                        invalidated_types,
                        deps,
                        signals,
                    )
                    .map(OutputValue::Object)
                }
                Link::List(items) => {
                    let prior_list = match prior {
                        Some(OutputValue::List(items)) => Some(items),
                        _ => None,
                    };
                    let mut out = Vec::with_capacity(items.len());
                    let mut list_changed = changed_here || prior_list.is_none();
                    for (i, item) in items.iter().enumerate() {
                        match item {
                            None => out.push(OutputValue::Null),
                            Some(child_key) => {
                                let child_typename = child_key.typename().to_owned();
                                let prior_child = prior_list.and_then(|l| l.get(i));
                                let prior_children = match prior_child {
                                    Some(OutputValue::Object(o)) => Some(o),
                                    _ => None,
                                };
                                match read_object(
                                    ctx,
                                    child_key,
                                    &child_typename,
                                    child_selection,
                                    prior_children,
                                    changed,
                                    invalidated_types,
                                    deps,
                                    signals,
                                ) {
                                    Some(obj) => {
                                        if prior_child.map_or(true, |p| !OutputValue::Object(obj.clone()).identical(p)) {
                                            list_changed = true;
                                        }
                                        out.push(OutputValue::Object(obj));
                                    }
                                    None => {
                                        if !field.tolerate_missing {
                                            return None;
                                        }
                                        signals.partial = true;
                                        list_changed = true;
                                        out.push(OutputValue::Null);
                                    }
                                }
                            }
                        }
                    }
                    if !list_changed {
                        if let Some(prior_list) = prior_list {
                            return Some(OutputValue::List(Arc::clone(prior_list)));
                        }
                    }
                    Some(OutputValue::List(Arc::new(out)))
                }
            };
        }
        ctx.store.log_missing_field(entity, &field.field_name, &field.args);
        None
    } else {
        match ctx.store.read_record(entity, &field.field_key) {
            Some(value) => Some(OutputValue::Scalar(value.clone())),
            None => {
                ctx.store.log_missing_field(entity, &field.field_name, &field.args);
                None
            }
        }
    }
}

/// Continues traversal into whatever a resolver returned (`spec.md` §4.5: a
/// resolver's return value becomes the field's effective value, but if it
/// names an object with a selection underneath it, that object may itself
/// be a synthesized keyed reference — continue reading from the store at
/// that key rather than returning the resolver's raw value verbatim).
#[allow(clippy::too_many_arguments)]
fn continue_into_resolved(
    ctx: &mut CacheApi<'_>,
    field: &crate::document::AnalyzedField,
    value: &Value,
    prior: Option<&OutputValue>,
    changed: &HashSet<(EntityKey, FieldKey)>,
    invalidated_types: &HashSet<String>,
    deps: &mut IndexSet<(EntityKey, FieldKey)>,
    signals: &mut Signals,
) -> Option<OutputValue> {
    let Some(child_selection) = &field.selection else {
        return Some(OutputValue::Scalar(value.clone()));
    };
    match value {
        Value::Null => None,
        Value::Object(child_object) => resolve_object_or_literal(
            ctx,
            child_object,
            field,
            child_selection,
            prior,
            changed,
            invalidated_types,
            deps,
            signals,
        ),
        Value::Array(items) => {
            let prior_list = match prior {
                Some(OutputValue::List(items)) => Some(items),
                _ => None,
            };
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Null => out.push(OutputValue::Null),
                    Value::Object(child_object) => {
                        let prior_item = prior_list.and_then(|l| l.get(i));
                        match resolve_object_or_literal(
                            ctx,
                            child_object,
                            field,
                            child_selection,
                            prior_item,
                            changed,
                            invalidated_types,
                            deps,
                            signals,
                        ) {
                            Some(v) => out.push(v),
                            None => {
                                if !field.tolerate_missing {
                                    return None;
                                }
                                signals.partial = true;
                                out.push(OutputValue::Null);
                            }
                        }
                    }
                    _ => return None,
                }
            }
            Some(OutputValue::List(Arc::new(out)))
        }
        _ => Some(OutputValue::Scalar(value.clone())),
    }
}

/// A resolver-returned object with a selection under it is either a keyed
/// reference into the store (the common case — continue the normal
/// store-backed read and pick up dependency tracking/reuse along the way)
/// or, lacking a stable key, a literal value the resolver synthesized on the
/// spot, projected directly off the object with no store participation.
#[allow(clippy::too_many_arguments)]
fn resolve_object_or_literal(
    ctx: &mut CacheApi<'_>,
    child_object: &ObjectValue,
    field: &crate::document::AnalyzedField,
    child_selection: &AnalyzedSelectionSet,
    prior: Option<&OutputValue>,
    changed: &HashSet<(EntityKey, FieldKey)>,
    invalidated_types: &HashSet<String>,
    deps: &mut IndexSet<(EntityKey, FieldKey)>,
    signals: &mut Signals,
) -> Option<OutputValue> {
    let child_typename = child_object
        .get("__typename")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| field.field_name.clone());
    let key_config = KeyGenConfig {
        keys: ctx.options.keys.clone(),
    };
    match entity_key(&key_config, &child_typename, child_object) {
        Some(child_key) => {
            let prior_children = match prior {
                Some(OutputValue::Object(o)) => Some(o),
                _ => None,
            };
            read_object(
                ctx,
                &child_key,
                &child_typename,
                child_selection,
                prior_children,
                changed,
                invalidated_types,
                deps,
                signals,
            )
            .map(OutputValue::Object)
        }
        None => project_literal(&child_typename, child_object, child_selection, signals).map(OutputValue::Object),
    }
}

/// Projects a selection directly off a literal object with no store
/// backing — a resolver's synthesized, keyless result. No dependency or
/// reuse tracking applies: there is no entity identity here to track.
fn project_literal(
    typename: &str,
    object: &ObjectValue,
    selection: &AnalyzedSelectionSet,
    signals: &mut Signals,
) -> Option<Arc<indexmap::IndexMap<String, OutputValue>>> {
    let mut out = indexmap::IndexMap::with_capacity(selection.fields.len());
    for (response_key, field) in &selection.fields {
        if let Some(cond) = &field.type_condition {
            if cond != typename {
                continue;
            }
        }
        let resolved = match object.get(response_key.as_str()) {
            None | Some(Value::Null) => None,
            Some(value) => project_literal_value(value, field, signals),
        };
        match resolved {
            Some(v) => {
                out.insert(response_key.clone(), v);
            }
            None => {
                if field.tolerate_missing {
                    signals.partial = true;
                    out.insert(response_key.clone(), OutputValue::Null);
                } else {
                    return None;
                }
            }
        }
    }
    Some(Arc::new(out))
}

fn project_literal_value(
    value: &Value,
    field: &crate::document::AnalyzedField,
    signals: &mut Signals,
) -> Option<OutputValue> {
    match (&field.selection, value) {
        (None, v) => Some(OutputValue::Scalar(v.clone())),
        (Some(_), Value::Null) => None,
        (Some(child_selection), Value::Object(child_object)) => {
            let child_typename = child_object
                .get("__typename")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| field.field_name.clone());
            project_literal(&child_typename, child_object, child_selection, signals).map(OutputValue::Object)
        }
        (Some(child_selection), Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Null => out.push(OutputValue::Null),
                    Value::Object(child_object) => {
                        let child_typename = child_object
                            .get("__typename")
                            .and_then(|v| v.as_str())
                            .map(str::to_owned)
                            .unwrap_or_else(|| field.field_name.clone());
                        match project_literal(&child_typename, child_object, child_selection, signals) {
                            Some(obj) => out.push(OutputValue::Object(obj)),
                            None => {
                                if !field.tolerate_missing {
                                    return None;
                                }
                                signals.partial = true;
                                out.push(OutputValue::Null);
                            }
                        }
                    }
                    _ => return None,
                }
            }
            Some(OutputValue::List(Arc::new(out)))
        }
        _ => None,
    }
}
