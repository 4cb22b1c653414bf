use indexmap::IndexMap;

use crate::ids::OperationKey;
use crate::key::{EntityKey, FieldKey};
use crate::value::Value;

/// A link target: one entity, an ordered list of entity-or-null, or an
/// explicit null link (`spec.md` §3). Disjoint from a record at the same
/// slot in the same layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Single(EntityKey),
    Null,
    List(Vec<Option<EntityKey>>),
}

/// Identifies a layer. `Optimistic`/`Ordered` both carry the operation that
/// owns the layer; whether an `Ordered` layer is squashed automatically
/// (a plain query result that arrived out of issue order) or kept alive
/// across multiple writes (a subscription or `@defer` continuation) is
/// bookkeeping the layer controller owns, not something encoded here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayerId {
    Base,
    Optimistic(OperationKey),
    Ordered(OperationKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Slot {
    pub entity: EntityKey,
    pub field: FieldKey,
}

impl Slot {
    pub fn new(entity: EntityKey, field: FieldKey) -> Self {
        Slot { entity, field }
    }
}

/// One overlay's records and links (`spec.md` §3 `Layer`).
#[derive(Debug, Clone)]
pub struct Layer {
    pub(crate) id: LayerId,
    records: IndexMap<Slot, Value>,
    links: IndexMap<Slot, Link>,
}

impl Layer {
    pub fn new(id: LayerId) -> Self {
        Layer {
            id,
            records: IndexMap::new(),
            links: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.links.is_empty()
    }

    pub(crate) fn write_record(&mut self, entity: EntityKey, field: FieldKey, value: Value) {
        let slot = Slot::new(entity, field);
        self.links.shift_remove(&slot);
        self.records.insert(slot, value);
    }

    pub(crate) fn write_link(&mut self, entity: EntityKey, field: FieldKey, link: Link) {
        let slot = Slot::new(entity, field);
        self.records.shift_remove(&slot);
        self.links.insert(slot, link);
    }

    pub(crate) fn read_record(&self, slot: &Slot) -> Option<&Value> {
        self.records.get(slot)
    }

    pub(crate) fn read_link(&self, slot: &Slot) -> Option<&Link> {
        self.links.get(slot)
    }

    /// Removes every record/link belonging to `entity`, returning the field
    /// keys that were cleared (used by `invalidate_entity`, §4.2).
    pub(crate) fn clear_entity(&mut self, entity: &EntityKey) -> Vec<FieldKey> {
        let mut cleared = Vec::new();
        self.records.retain(|slot, _| {
            let keep = &slot.entity != entity;
            if !keep {
                cleared.push(slot.field.clone());
            }
            keep
        });
        self.links.retain(|slot, _| {
            let keep = &slot.entity != entity;
            if !keep {
                cleared.push(slot.field.clone());
            }
            keep
        });
        cleared
    }

    /// All field keys currently known for `entity` in this layer, for
    /// `inspectFields` (§6) and garbage collection.
    pub(crate) fn fields_of(&self, entity: &EntityKey) -> impl Iterator<Item = &FieldKey> {
        self.records
            .keys()
            .chain(self.links.keys())
            .filter(move |slot| &slot.entity == entity)
            .map(|slot| &slot.field)
    }

    /// Every `(entity, field)` slot this layer holds a record or link for —
    /// used to synthesize a reexecution signal when a layer is discarded
    /// without ever merging into base (an optimistic rollback, `spec.md`
    /// §4.6) rather than written over.
    pub(crate) fn touched_slots(&self) -> impl Iterator<Item = (EntityKey, FieldKey)> + '_ {
        self.records
            .keys()
            .chain(self.links.keys())
            .map(|slot| (slot.entity.clone(), slot.field.clone()))
    }

    pub(crate) fn entities(&self) -> impl Iterator<Item = &EntityKey> {
        self.records.keys().map(|s| &s.entity).chain(self.links.keys().map(|s| &s.entity))
    }

    /// Squashes this layer's contents onto `base` in place (§4.6). Used both
    /// for committing an optimistic mutation result and for squashing a
    /// resolved commutative/owned layer.
    pub(crate) fn merge_into(self, base: &mut Layer) {
        for (slot, value) in self.records {
            base.records.shift_remove(&slot);
            base.links.shift_remove(&slot);
            base.records.insert(slot, value);
        }
        for (slot, link) in self.links {
            base.records.shift_remove(&slot);
            base.links.shift_remove(&slot);
            base.links.insert(slot, link);
        }
    }

    pub(crate) fn remove_entity_entirely(&mut self, entity: &EntityKey) {
        self.records.retain(|slot, _| &slot.entity != entity);
        self.links.retain(|slot, _| &slot.entity != entity);
    }
}
