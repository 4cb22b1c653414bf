//! C4 — Write Traversal. Normalizes a GraphQL result (or a user-supplied
//! fragment payload) into the store: derives child entity/embedded keys via
//! KeyGen, enforces record/link disjointness, invokes `updates` callbacks,
//! and folds `@defer`/`hasNext` partial payloads in (`spec.md` §4.4).

use crate::cache_api::{CacheApi, FieldInfo};
use crate::config::CacheOptions;
use crate::document::AnalyzedSelectionSet;
use crate::error::{CacheError, CacheResult};
use crate::key::{entity_key, EntityKey, FieldKey, KeyGenConfig};
use crate::store::{LayerId, Link, Store, WriteTransaction};
use crate::value::{ObjectValue, Value};

/// Normalizes `data` (the object found at `root`'s selection) into `layer`,
/// recursing into nested selections and deriving child keys as it goes.
/// This is the engine behind `writeFragment`/`writeQuery`/mutation-result
/// ingestion alike — callers differ only in which selection/root/layer they
/// pass in.
pub fn write_object(
    store: &mut Store,
    options: &CacheOptions,
    txn: &mut WriteTransaction,
    layer: &LayerId,
    root: &EntityKey,
    root_typename: &str,
    selection: &AnalyzedSelectionSet,
    data: &Value,
    track_novelty: bool,
) -> CacheResult<()> {
    let Value::Object(object) = data else {
        return Err(CacheError::Document(format!(
            "expected an object at entity \"{root}\", got {data:?}"
        )));
    };
    write_fields(store, options, txn, layer, root, root_typename, selection, object, track_novelty)
}

#[allow(clippy::too_many_arguments)]
fn write_fields(
    store: &mut Store,
    options: &CacheOptions,
    txn: &mut WriteTransaction,
    layer: &LayerId,
    entity: &EntityKey,
    typename: &str,
    selection: &AnalyzedSelectionSet,
    object: &ObjectValue,
    track_novelty: bool,
) -> CacheResult<()> {
    let key_config = KeyGenConfig {
        keys: options.keys.clone(),
    };

    for (response_key, field) in &selection.fields {
        if let Some(cond) = &field.type_condition {
            if cond != typename {
                continue;
            }
        }
        let Some(incoming) = object.get(response_key.as_str()) else {
            // Missing from the payload entirely (as opposed to explicit
            // `null`) — nothing to normalize; a subsequent read reports
            // this as a miss unless an earlier write already populated it.
            continue;
        };

        if track_novelty && store.observe_type_field(typename, &field.field_key) {
            txn.invalidate_type(typename.to_owned());
        }

        write_value(
            store,
            options,
            &key_config,
            txn,
            layer,
            entity,
            field,
            incoming,
            track_novelty,
        )?;

        if let Some(updater) = options.updates.get(&(typename.to_owned(), field.field_name.clone())) {
            let mut api = CacheApi::new(store, options, txn, layer.clone());
            let info = FieldInfo {
                parent_typename: typename,
                field_name: &field.field_name,
                field_key: &field.field_key,
            };
            let object_snapshot = Value::Object(object.clone());
            let args = field.args.clone();
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                updater(&object_snapshot, &args, &mut api, &info)
            })) {
                Ok(()) => {}
                Err(payload) => {
                    store.report_updater_panic(typename, &field.field_name, &payload);
                }
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_value(
    store: &mut Store,
    options: &CacheOptions,
    key_config: &KeyGenConfig,
    txn: &mut WriteTransaction,
    layer: &LayerId,
    entity: &EntityKey,
    field: &crate::document::AnalyzedField,
    incoming: &Value,
    track_novelty: bool,
) -> CacheResult<()> {
    match (&field.selection, incoming) {
        (None, _) => {
            store.write_record(layer, entity.clone(), field.field_key.clone(), incoming.clone(), txn);
            Ok(())
        }
        (Some(_), Value::Null) => {
            store.write_link(layer, entity.clone(), field.field_key.clone(), Link::Null, txn);
            Ok(())
        }
        (Some(child_selection), Value::Object(child_object)) => {
            let child_typename = child_object
                .get("__typename")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| field.field_name.clone());
            let child_key = entity_key(key_config, &child_typename, child_object)
                .unwrap_or_else(|| EntityKey::embedded(entity, &field.field_key, &child_typename));
            store.write_link(
                layer,
                entity.clone(),
                field.field_key.clone(),
                Link::Single(child_key.clone()),
                txn,
            );
            write_fields(
                store,
                options,
                txn,
                layer,
                &child_key,
                &child_typename,
                child_selection,
                child_object,
                track_novelty,
            )
        }
        (Some(child_selection), Value::Array(items)) => {
            let mut links = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Null => links.push(None),
                    Value::Object(child_object) => {
                        let child_typename = child_object
                            .get("__typename")
                            .and_then(|v| v.as_str())
                            .map(str::to_owned)
                            .unwrap_or_else(|| field.field_name.clone());
                        let item_field = FieldKey::new(
                            &format!("{}.{i}", field.field_key.as_str()),
                            &ObjectValue::new(),
                        );
                        let child_key = entity_key(key_config, &child_typename, child_object)
                            .unwrap_or_else(|| EntityKey::embedded(entity, &item_field, &child_typename));
                        write_fields(
                            store,
                            options,
                            txn,
                            layer,
                            &child_key,
                            &child_typename,
                            child_selection,
                            child_object,
                            track_novelty,
                        )?;
                        links.push(Some(child_key));
                    }
                    other => {
                        return Err(store.report_invariant_violation(
                            entity,
                            &field.field_key,
                            format!("expected a list of objects or nulls, found {other:?}"),
                        ))
                    }
                }
            }
            store.write_link(layer, entity.clone(), field.field_key.clone(), Link::List(links), txn);
            Ok(())
        }
        (Some(_), other) => Err(store.report_invariant_violation(
            entity,
            &field.field_key,
            format!("expected an object, list, or null for a selected field, found {other:?}"),
        )),
    }
}

/// Folds a `@defer` payload's `incremental` entry into the store at the
/// path it declares (`spec.md` §4.4 item 6). `path` is resolved against the
/// already-written parent object, the same way the deferred payload's
/// `path` array names a position in the prior, non-deferred response.
pub fn write_incremental(
    store: &mut Store,
    options: &CacheOptions,
    txn: &mut WriteTransaction,
    layer: &LayerId,
    parent: &EntityKey,
    parent_typename: &str,
    selection: &AnalyzedSelectionSet,
    response_key: &str,
    data: &Value,
) -> CacheResult<()> {
    let field = selection.fields.get(response_key).ok_or_else(|| {
        CacheError::Document(format!(
            "deferred payload names unknown field \"{response_key}\" on \"{parent_typename}\""
        ))
    })?;
    let key_config = KeyGenConfig {
        keys: options.keys.clone(),
    };
    write_value(store, options, &key_config, txn, layer, parent, field, data, false)
}
