//! C2 — Store. In-memory normalized records plus link graph, with layered
//! reads/writes, garbage collection, and dependency tracking (`spec.md`
//! §3, §4.2).

mod layer;

use std::collections::HashSet;

use indexmap::IndexSet;

pub use layer::{Layer, LayerId, Link};
use layer::Slot;

use crate::error::{CacheError, Severity};
use crate::key::{EntityKey, FieldKey};
use crate::value::Value;

/// What a single write (one result, one updater pass, one invalidation)
/// touched: the `(entity, field)` pairs written, plus any typenames whose
/// entities should be treated as stale regardless of which fields changed
/// (`spec.md` §4.4 item 7). Handed to the dependency index (C7) once the
/// traversal finishes.
#[derive(Debug, Default)]
pub struct WriteTransaction {
    pub touched: IndexSet<(EntityKey, FieldKey)>,
    pub invalidated_types: IndexSet<String>,
}

impl WriteTransaction {
    pub fn invalidate_type(&mut self, typename: impl Into<String>) {
        self.invalidated_types.insert(typename.into());
    }
}

pub struct Store {
    base: Layer,
    overlays: indexmap::IndexMap<LayerId, Layer>,
    /// Read order, topmost (highest precedence) first. Does not include
    /// `Base`, which is implicitly consulted last.
    order: Vec<LayerId>,
    logger: crate::config::Logger,
    /// Every `(typename, field)` pair ever written, across all layers and
    /// all of history — including fields belonging to entities since
    /// garbage-collected. Used only to detect the *first* appearance of a
    /// field for a typename (`spec.md` §4.4 item 7); never consulted for
    /// reads.
    known_type_fields: HashSet<(String, FieldKey)>,
}

impl Store {
    pub fn new(logger: crate::config::Logger) -> Self {
        Store {
            base: Layer::new(LayerId::Base),
            overlays: indexmap::IndexMap::new(),
            order: Vec::new(),
            logger,
            known_type_fields: HashSet::new(),
        }
    }

    /// Records that `typename` now has a known value for `field`. Returns
    /// `true` the first time this pair is observed for this typename
    /// (`spec.md` §4.4 item 7: "a field not present in the store for that
    /// typename").
    pub(crate) fn observe_type_field(&mut self, typename: &str, field: &FieldKey) -> bool {
        self.known_type_fields.insert((typename.to_owned(), field.clone()))
    }

    // -- layer lifecycle, driven by the layer controller (C6) --------------

    pub fn ensure_layer(&mut self, id: LayerId) -> bool {
        if self.overlays.contains_key(&id) {
            return false;
        }
        self.overlays.insert(id.clone(), Layer::new(id));
        true
    }

    pub fn remove_layer(&mut self, id: &LayerId) -> Option<Layer> {
        self.order.retain(|existing| existing != id);
        self.overlays.shift_remove(id)
    }

    pub fn set_order(&mut self, order: Vec<LayerId>) {
        debug_assert!(order.iter().all(|id| *id != LayerId::Base));
        self.order = order;
    }

    pub fn order(&self) -> &[LayerId] {
        &self.order
    }

    /// Squashes `id`'s contents onto base and drops the layer.
    pub fn merge_layer_into_base(&mut self, id: &LayerId) {
        if let Some(layer) = self.remove_layer(id) {
            layer.merge_into(&mut self.base);
        }
    }

    // -- writes --------------------------------------------------------

    pub fn write_record(
        &mut self,
        layer_id: &LayerId,
        entity: EntityKey,
        field: FieldKey,
        value: Value,
        txn: &mut WriteTransaction,
    ) {
        txn.touched.insert((entity.clone(), field.clone()));
        self.layer_mut(layer_id).write_record(entity, field, value);
    }

    pub fn write_link(
        &mut self,
        layer_id: &LayerId,
        entity: EntityKey,
        field: FieldKey,
        link: Link,
        txn: &mut WriteTransaction,
    ) {
        txn.touched.insert((entity.clone(), field.clone()));
        self.layer_mut(layer_id).write_link(entity, field, link);
    }

    fn layer_mut(&mut self, id: &LayerId) -> &mut Layer {
        if *id == LayerId::Base {
            &mut self.base
        } else {
            self.overlays
                .get_mut(id)
                .unwrap_or_else(|| panic!("write to unknown layer {id:?}"))
        }
    }

    /// Marks every known field of `entity` as absent in a fresh write
    /// transaction (`spec.md` §4.2). Only the base layer is invalidated —
    /// overlays represent in-flight operations that haven't committed yet
    /// and are left alone.
    pub fn invalidate_entity(&mut self, entity: &EntityKey, txn: &mut WriteTransaction) {
        for field in self.base.clear_entity(entity) {
            txn.touched.insert((entity.clone(), field));
        }
    }

    // -- reads -----------------------------------------------------------

    pub fn read_record(&self, entity: &EntityKey, field: &FieldKey) -> Option<&Value> {
        let slot = Slot::new(entity.clone(), field.clone());
        for id in &self.order {
            if let Some(layer) = self.overlays.get(id) {
                if let Some(value) = layer.read_record(&slot) {
                    return Some(value);
                }
                if layer.read_link(&slot).is_some() {
                    return None;
                }
            }
        }
        self.base.read_record(&slot)
    }

    pub fn read_link(&self, entity: &EntityKey, field: &FieldKey) -> Option<&Link> {
        let slot = Slot::new(entity.clone(), field.clone());
        for id in &self.order {
            if let Some(layer) = self.overlays.get(id) {
                if let Some(link) = layer.read_link(&slot) {
                    return Some(link);
                }
                if layer.read_record(&slot).is_some() {
                    return None;
                }
            }
        }
        self.base.read_link(&slot)
    }

    /// `true` if any of `deps` is shadowed by a currently active optimistic
    /// layer (`spec.md` §4.8: "if overlapping mutation optimistic layer
    /// currently covers any of `deps`: forward is suppressed... downgraded
    /// to `cache-first`").
    pub fn covered_by_optimistic(&self, deps: &indexmap::IndexSet<(EntityKey, FieldKey)>) -> bool {
        for id in &self.order {
            if !matches!(id, LayerId::Optimistic(_)) {
                continue;
            }
            let Some(layer) = self.overlays.get(id) else { continue };
            for (entity, field) in deps {
                let slot = Slot::new(entity.clone(), field.clone());
                if layer.read_record(&slot).is_some() || layer.read_link(&slot).is_some() {
                    return true;
                }
            }
        }
        false
    }

    /// `true` if the slot is known (as a record or a link) in *some* layer
    /// currently in the read stack, i.e. it is not a cache miss.
    pub fn has_value(&self, entity: &EntityKey, field: &FieldKey) -> bool {
        let slot = Slot::new(entity.clone(), field.clone());
        for id in &self.order {
            if let Some(layer) = self.overlays.get(id) {
                if layer.read_record(&slot).is_some() || layer.read_link(&slot).is_some() {
                    return true;
                }
            }
        }
        self.base.read_record(&slot).is_some() || self.base.read_link(&slot).is_some()
    }

    pub fn inspect_fields(&self, entity: &EntityKey) -> Vec<FieldKey> {
        let mut seen = IndexSet::new();
        for id in &self.order {
            if let Some(layer) = self.overlays.get(id) {
                seen.extend(layer.fields_of(entity).cloned());
            }
        }
        seen.extend(self.base.fields_of(entity).cloned());
        seen.into_iter().collect()
    }

    pub(crate) fn report_invariant_violation(&self, entity: &EntityKey, field: &FieldKey, message: impl Into<String>) -> CacheError {
        let error = CacheError::InvariantViolation {
            entity: entity.clone(),
            field: field.clone(),
            message: message.into(),
        };
        self.logger.log(Severity::Error, &error.to_string());
        error
    }

    /// Classifies a caught `panic!` from a user-supplied updater/optimistic
    /// callback as a `CacheError::UpdaterException` and logs it (`spec.md`
    /// §7: "the cache never throws to its caller"). The panic payload is
    /// downcast to a displayable message on a best-effort basis.
    pub(crate) fn report_updater_panic(
        &self,
        owner: &str,
        field: &str,
        payload: &(dyn std::any::Any + Send),
    ) -> CacheError {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "updater panicked with a non-string payload".to_owned()
        };
        let error = CacheError::UpdaterException {
            owner: owner.to_owned(),
            field: field.to_owned(),
            message,
        };
        self.logger.log(Severity::Error, &error.to_string());
        error
    }

    pub fn log_missing_field(&self, entity: &EntityKey, field_name: &str, args: &crate::value::ObjectValue) {
        let message = if args.is_empty() {
            format!("No value for field \"{field_name}\" on entity \"{entity}\"")
        } else {
            format!("No value for field \"{field_name}\" with args {args:?} on entity \"{entity}\"")
        };
        self.logger.log(Severity::Debug, &message);
    }

    // -- garbage collection -----------------------------------------------

    /// Best-effort mark-and-sweep (`spec.md` §4.2): an entity survives if it
    /// is `roots` (referenced by some live operation's dependency set) or is
    /// reachable from a root by following links, across base and every
    /// overlay currently in the stack.
    pub fn gc(&mut self, roots: &HashSet<EntityKey>) {
        let mut live: HashSet<EntityKey> = roots.clone();
        let mut frontier: Vec<EntityKey> = roots.iter().cloned().collect();
        while let Some(entity) = frontier.pop() {
            for target in self.link_targets_of(&entity) {
                if live.insert(target.clone()) {
                    frontier.push(target);
                }
            }
        }
        let dead: Vec<EntityKey> = self
            .base
            .entities()
            .filter(|e| !live.contains(*e))
            .cloned()
            .collect();
        for entity in dead {
            self.base.remove_entity_entirely(&entity);
        }
    }

    fn link_targets_of(&self, entity: &EntityKey) -> Vec<EntityKey> {
        let mut targets = Vec::new();
        for field in self.inspect_fields(entity) {
            if let Some(link) = self.read_link(entity, &field) {
                match link {
                    Link::Single(key) => targets.push(key.clone()),
                    Link::Null => {}
                    Link::List(items) => targets.extend(items.iter().flatten().cloned()),
                }
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Logger;

    fn store() -> Store {
        Store::new(Logger::noop())
    }

    #[test]
    fn base_read_write_roundtrip() {
        let mut s = store();
        let mut txn = WriteTransaction::default();
        let entity = EntityKey::raw("Author:1", "Author");
        let field = FieldKey::new("name", &Default::default());
        s.write_record(&LayerId::Base, entity.clone(), field.clone(), Value::String("A".into()), &mut txn);
        assert_eq!(s.read_record(&entity, &field), Some(&Value::String("A".into())));
        assert!(txn.touched.contains(&(entity, field)));
    }

    #[test]
    fn overlay_shadows_base_until_removed() {
        let mut s = store();
        let mut txn = WriteTransaction::default();
        let entity = EntityKey::raw("Author:1", "Author");
        let field = FieldKey::new("name", &Default::default());
        s.write_record(&LayerId::Base, entity.clone(), field.clone(), Value::String("A".into()), &mut txn);

        let overlay = LayerId::Optimistic(crate::ids::OperationKey::new("m1"));
        s.ensure_layer(overlay.clone());
        s.set_order(vec![overlay.clone()]);
        s.write_record(&overlay, entity.clone(), field.clone(), Value::String("OFFLINE".into()), &mut txn);
        assert_eq!(s.read_record(&entity, &field), Some(&Value::String("OFFLINE".into())));

        s.remove_layer(&overlay);
        assert_eq!(s.read_record(&entity, &field), Some(&Value::String("A".into())));
    }

    #[test]
    fn invalidate_entity_clears_base_fields() {
        let mut s = store();
        let mut txn = WriteTransaction::default();
        let entity = EntityKey::raw("Author:1", "Author");
        let field = FieldKey::new("name", &Default::default());
        s.write_record(&LayerId::Base, entity.clone(), field.clone(), Value::String("A".into()), &mut txn);

        let mut txn2 = WriteTransaction::default();
        s.invalidate_entity(&entity, &mut txn2);
        assert_eq!(s.read_record(&entity, &field), None);
        assert!(txn2.touched.contains(&(entity, field)));
    }

    #[test]
    fn gc_sweeps_unreachable_entities() {
        let mut s = store();
        let mut txn = WriteTransaction::default();
        let root = EntityKey::raw("Query", "Query");
        let author = EntityKey::raw("Author:1", "Author");
        let orphan = EntityKey::raw("Author:2", "Author");
        let field = FieldKey::new("author", &Default::default());
        s.write_link(&LayerId::Base, root.clone(), field, Link::Single(author.clone()), &mut txn);
        s.write_record(&LayerId::Base, author.clone(), FieldKey::new("name", &Default::default()), Value::String("A".into()), &mut txn);
        s.write_record(&LayerId::Base, orphan.clone(), FieldKey::new("name", &Default::default()), Value::String("B".into()), &mut txn);

        let mut roots = HashSet::new();
        roots.insert(root);
        s.gc(&roots);

        assert!(s.inspect_fields(&author).len() > 0);
        assert!(s.inspect_fields(&orphan).is_empty());
    }
}
