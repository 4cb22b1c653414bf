//! The mediated handle given to user resolvers, updaters and optimistic
//! functions (`spec.md` §5, §6). Direct mutation of store internals from
//! user code is forbidden; every write a callback makes goes through here
//! and lands in the transaction/layer the engine is currently processing.

use std::sync::Arc;

use crate::config::CacheOptions;
use crate::document::AnalyzedSelectionSet;
use crate::error::CacheError;
use crate::key::{entity_key, EntityKey, FieldKey};
use crate::store::{LayerId, Link, Store, WriteTransaction};
use crate::traversal::{read, write};
use crate::value::{ObjectValue, Value};

/// What a resolver/updater/optimistic function is told about the field it
/// was invoked for — the "info" argument of §6's callback signatures.
pub struct FieldInfo<'a> {
    pub parent_typename: &'a str,
    pub field_name: &'a str,
    pub field_key: &'a FieldKey,
}

pub type ResolverFn =
    Arc<dyn Fn(&Value, &ObjectValue, &mut CacheApi<'_>, &FieldInfo<'_>) -> Value + Send + Sync>;
pub type UpdaterFn =
    Arc<dyn Fn(&Value, &ObjectValue, &mut CacheApi<'_>, &FieldInfo<'_>) + Send + Sync>;
pub type OptimisticFn =
    Arc<dyn Fn(&ObjectValue, &mut CacheApi<'_>, &FieldInfo<'_>) -> Value + Send + Sync>;

/// What `resolve()` found at `(entity, field)` (§6).
#[derive(Debug, Clone)]
pub enum ResolvedField {
    Record(Value),
    Entity(EntityKey),
    Entities(Vec<Option<EntityKey>>),
    ExplicitNull,
}

/// The mediated cache API (§6). Holds exclusive, reentrant-safe borrows of
/// the engine's working state for the duration of a single traversal —
/// there is never more than one of these alive at a time because the store
/// is single-writer and traversals never suspend (§5).
pub struct CacheApi<'a> {
    pub(crate) store: &'a mut Store,
    pub(crate) options: &'a CacheOptions,
    pub(crate) txn: &'a mut WriteTransaction,
    pub(crate) layer: LayerId,
}

impl<'a> CacheApi<'a> {
    pub(crate) fn new(
        store: &'a mut Store,
        options: &'a CacheOptions,
        txn: &'a mut WriteTransaction,
        layer: LayerId,
    ) -> Self {
        CacheApi {
            store,
            options,
            txn,
            layer,
        }
    }

    fn reborrow(&mut self) -> CacheApi<'_> {
        CacheApi {
            store: self.store,
            options: self.options,
            txn: self.txn,
            layer: self.layer.clone(),
        }
    }

    pub fn key_of_entity(&self, typename: &str, object: &ObjectValue) -> Option<EntityKey> {
        entity_key(&crate::key::KeyGenConfig { keys: self.options.keys.clone() }, typename, object)
    }

    /// `invalidate(entityOrKey)` — drops every known field of the entity.
    pub fn invalidate(&mut self, entity: &EntityKey) {
        self.store.invalidate_entity(entity, self.txn);
    }

    /// `invalidate(entityOrKey, fieldName, args)` — drops a single field.
    pub fn invalidate_field(&mut self, entity: &EntityKey, field_name: &str, args: &ObjectValue) {
        let field = FieldKey::new(field_name, args);
        // Modeled as an explicit-null link/record removal: a subsequent read
        // sees "absent", matching `invalidateEntity`'s per-field semantics.
        self.store
            .write_link(&self.layer, entity.clone(), field, Link::Null, self.txn);
    }

    pub fn inspect_fields(&self, entity: &EntityKey) -> Vec<FieldKey> {
        self.store.inspect_fields(entity)
    }

    pub fn resolve(&self, parent: &EntityKey, field_name: &str, args: &ObjectValue) -> Option<ResolvedField> {
        let field = FieldKey::new(field_name, args);
        if let Some(link) = self.store.read_link(parent, &field) {
            return Some(match link {
                Link::Single(key) => ResolvedField::Entity(key.clone()),
                Link::Null => ResolvedField::ExplicitNull,
                Link::List(items) => ResolvedField::Entities(items.clone()),
            });
        }
        self.store
            .read_record(parent, &field)
            .map(|value| ResolvedField::Record(value.clone()))
    }

    /// `writeFragment(fragmentDocument, data)` — here, an already-analyzed
    /// selection set plus the concrete root it should be written under.
    pub fn write_fragment(
        &mut self,
        selection: &Arc<AnalyzedSelectionSet>,
        root_typename: &str,
        root: EntityKey,
        data: &Value,
    ) -> Result<(), CacheError> {
        write::write_object(
            self.store,
            self.options,
            self.txn,
            &self.layer,
            &root,
            root_typename,
            selection,
            data,
            false,
        )
    }

    pub fn read_fragment(
        &mut self,
        selection: &Arc<AnalyzedSelectionSet>,
        root_typename: &str,
        root: EntityKey,
    ) -> Option<Value> {
        let mut inner = self.reborrow();
        let outcome = read::read_root(&mut inner, &root, root_typename, selection);
        outcome.data.map(|v| v.to_json())
    }

    /// `updateQuery({query, variables}, updater)` — reads the query's
    /// current cached shape, lets `updater` transform it, and writes the
    /// result back under the query's root.
    pub fn update_query(
        &mut self,
        root_kind: crate::document::RootKind,
        selection: &Arc<AnalyzedSelectionSet>,
        updater: impl FnOnce(Option<Value>) -> Option<Value>,
    ) -> Result<(), CacheError> {
        let root = EntityKey::for_root(root_kind.root_typename());
        let current = {
            let mut inner = self.reborrow();
            read::read_root(&mut inner, &root, root_kind.root_typename(), selection)
                .data
                .map(|v| v.to_json())
        };
        if let Some(updated) = updater(current) {
            self.write_fragment(selection, root_kind.root_typename(), root, &updated)?;
        }
        Ok(())
    }
}
