//! C7 — Dependency Index & Reexecution. Maps `(entity, field)` pairs and
//! invalidated typenames back to the operations that read them, computes
//! the reexecution set after a write, and guards against reexecution loops
//! via a per-operation generation counter (`spec.md` §4.7).

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::ids::{Generation, OperationKey};
use crate::key::{EntityKey, FieldKey};

#[derive(Default)]
pub struct DependencyIndex {
    by_slot: HashMap<(EntityKey, FieldKey), IndexSet<OperationKey>>,
    by_typename: HashMap<String, IndexSet<OperationKey>>,
    deps_of: HashMap<OperationKey, IndexSet<(EntityKey, FieldKey)>>,
    generations: HashMap<OperationKey, Generation>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `op`'s recorded dependency set with `deps` (the set a read
    /// traversal accumulated), removing stale index entries for slots `op`
    /// no longer reads (`spec.md` §4.7: "each read replaces the operation's
    /// prior dependency set wholesale").
    pub fn record(&mut self, op: OperationKey, deps: IndexSet<(EntityKey, FieldKey)>) {
        if let Some(prior) = self.deps_of.remove(&op) {
            for slot in &prior {
                if !deps.contains(slot) {
                    self.unindex_slot(slot, &op);
                }
            }
        }
        for slot in &deps {
            self.by_slot.entry(slot.clone()).or_default().insert(op.clone());
        }
        self.deps_of.insert(op, deps);
    }

    /// Associates `op` with `typename` so it reexecutes whenever that
    /// typename is invalidated outright (§4.4 item 7) even though no
    /// specific field slot was touched.
    pub fn record_typename_interest(&mut self, op: OperationKey, typename: impl Into<String>) {
        self.by_typename.entry(typename.into()).or_default().insert(op);
    }

    fn unindex_slot(&mut self, slot: &(EntityKey, FieldKey), op: &OperationKey) {
        if let Some(ops) = self.by_slot.get_mut(slot) {
            ops.shift_remove(op);
            if ops.is_empty() {
                self.by_slot.remove(slot);
            }
        }
    }

    pub fn remove_operation(&mut self, op: &OperationKey) {
        if let Some(deps) = self.deps_of.remove(op) {
            for slot in &deps {
                self.unindex_slot(slot, op);
            }
        }
        for ops in self.by_typename.values_mut() {
            ops.shift_remove(op);
        }
        self.generations.remove(op);
    }

    /// Operations to reexecute after a write touching `touched` slots and
    /// invalidating `invalidated_types`, minus `exclude` (the operation
    /// whose own write this is, which applies its result directly instead
    /// of reexecuting — §4.7: "excluding the operation that produced the
    /// write, if any").
    pub fn reexecution_set(
        &self,
        touched: &IndexSet<(EntityKey, FieldKey)>,
        invalidated_types: &HashSet<String>,
        exclude: Option<&OperationKey>,
    ) -> IndexSet<OperationKey> {
        let mut set = IndexSet::new();
        for slot in touched {
            if let Some(ops) = self.by_slot.get(slot) {
                set.extend(ops.iter().cloned());
            }
        }
        for typename in invalidated_types {
            if let Some(ops) = self.by_typename.get(typename) {
                set.extend(ops.iter().cloned());
            }
        }
        if let Some(exclude) = exclude {
            set.shift_remove(exclude);
        }
        set
    }

    /// Bumps and returns `op`'s generation. A caller driving reexecution
    /// compares the generation it's acting on against the *current* value
    /// after the reexecuting read completes; if they differ, a newer write
    /// already superseded this pass and its output must be discarded rather
    /// than emitted (§4.7: "a reexecution whose generation is stale on
    /// completion is dropped, not emitted").
    pub fn advance_generation(&mut self, op: &OperationKey) -> Generation {
        let next = self.generations.get(op).copied().unwrap_or_default().next();
        self.generations.insert(op.clone(), next);
        next
    }

    pub fn current_generation(&self, op: &OperationKey) -> Generation {
        self.generations.get(op).copied().unwrap_or_default()
    }
}

#[derive(Default)]
pub struct TypeIndex(IndexMap<String, IndexSet<EntityKey>>);

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, entity: &EntityKey) {
        self.0
            .entry(entity.typename().to_owned())
            .or_default()
            .insert(entity.clone());
    }
}
