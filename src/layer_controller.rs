//! C6 — Layer Controller. Owns the overlay stack bookkeeping: optimistic
//! mutation push/commit/discard, and the issue-order squash algorithm that
//! lets results from commutative operations (plain queries, subscription
//! events) land in any arrival order while the store converges on the same
//! final state (`spec.md` §4.6, §9).
//!
//! Both halves report *which* layers are active; [`crate::operation::Cache`]
//! is the one place that knows how to combine them into the single
//! precedence order `Store::set_order` expects (optimistic layers, most
//! recently pushed first, above commutative layers, highest issue order
//! first) — `spec.md` §3's `LayerKind` ordering invariant.
//!
//! The ordering problem (§9 open question, exercised by §8 property 5 and
//! scenario S6): a result for issue order `N` must not become visible ahead
//! of any still-outstanding result for an earlier issue order, because an
//! intervening earlier result could still change what `N`'s write depends
//! on. Concretely: each commutative operation is assigned a strictly
//! increasing `order` at issue time; its result materializes an `Ordered`
//! layer instead of writing straight to base; a `threshold` tracks the
//! lowest order still outstanding; a layer squashes into base only once
//! `threshold` reaches its own order, draining any lower orders that were
//! already waiting at the same time.

use indexmap::IndexMap;

use crate::ids::OperationKey;
use crate::store::{LayerId, Store};

#[derive(Default)]
pub struct LayerController {
    /// Issue orders without a terminal result yet. An order with
    /// `hasNext: true` patches still outstanding stays in here across
    /// multiple `materialize` calls for the same order.
    pending: std::collections::BTreeSet<u64>,
    /// Layers currently materialized in the store, keyed by issue order.
    layers: IndexMap<u64, LayerId>,
    next_order: u64,
}

impl LayerController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next issue order for a commutative operation (query or
    /// subscription). The result is what `materialize`/`resolve` must be
    /// called with once results for this operation arrive.
    pub fn issue(&mut self) -> u64 {
        let order = self.next_order;
        self.next_order += 1;
        self.pending.insert(order);
        order
    }

    /// Registers (or re-registers, for a repeated `@defer` patch) the layer
    /// that `order`'s result was written into.
    pub fn materialize(&mut self, order: u64, id: LayerId) {
        self.layers.insert(order, id);
    }

    fn threshold(&self) -> Option<u64> {
        self.pending.iter().next().copied()
    }

    /// Marks `order` fully resolved (no further `hasNext` patches coming)
    /// and squashes it, and any lower orders that were waiting on it, into
    /// base in ascending order. Returns the squashed layer ids in merge
    /// order.
    pub fn resolve(&mut self, order: u64, store: &mut Store) -> Vec<LayerId> {
        self.pending.remove(&order);
        self.drain_ready(store)
    }

    /// Drops an outstanding order without ever producing a terminal result
    /// (operation torn down before its result arrived). Unblocks any
    /// layers waiting on it the same way `resolve` would.
    pub fn abandon(&mut self, order: u64, store: &mut Store) -> Vec<LayerId> {
        self.pending.remove(&order);
        self.layers.shift_remove(&order);
        self.drain_ready(store)
    }

    fn drain_ready(&mut self, store: &mut Store) -> Vec<LayerId> {
        let mut squashed = Vec::new();
        loop {
            let Some(&lowest) = self.layers.keys().min() else {
                break;
            };
            let ready = match self.threshold() {
                Some(t) => lowest < t,
                None => true,
            };
            if !ready {
                break;
            }
            let id = self.layers.shift_remove(&lowest).unwrap();
            store.merge_layer_into_base(&id);
            squashed.push(id);
        }
        squashed
    }

    /// The commutative layers currently active, highest issue order first
    /// (`spec.md` §3: "`L(k,n)` reads-ordered strictly above all
    /// commutative layers with order `< n`").
    pub fn ids(&self) -> Vec<LayerId> {
        let mut orders: Vec<u64> = self.layers.keys().copied().collect();
        orders.sort_unstable_by(|a, b| b.cmp(a));
        orders.into_iter().map(|o| self.layers[&o].clone()).collect()
    }
}

/// Optimistic-mutation layer lifecycle (§4.4 item 5, §4.6): pushed before
/// the mutation's optimistic response is written, replaced by the real
/// result on success, discarded (with no trace) on failure.
#[derive(Default)]
pub struct OptimisticLayers {
    stack: Vec<OperationKey>,
}

impl OptimisticLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new optimistic layer for `mutation_key` atop the current
    /// stack and returns its `LayerId`. Concurrent optimistic mutations
    /// stack in push order (§4.6).
    pub fn push(&mut self, mutation_key: OperationKey, store: &mut Store) -> LayerId {
        let id = LayerId::Optimistic(mutation_key.clone());
        store.ensure_layer(id.clone());
        self.stack.push(mutation_key);
        id
    }

    /// Removes `mutation_key`'s layer from the stack. Callers handle the
    /// store-side squash (commit) or plain removal (discard) themselves
    /// before or after this, since both paths need `Store::remove_layer`.
    pub fn retire(&mut self, mutation_key: &OperationKey) {
        self.stack.retain(|k| k != mutation_key);
    }

    /// Optimistic layers currently active, most recently pushed first.
    pub fn ids(&self) -> Vec<LayerId> {
        self.stack.iter().rev().map(|k| LayerId::Optimistic(k.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Logger;

    #[test]
    fn out_of_order_resolution_squashes_once_unblocked() {
        let mut store = Store::new(Logger::noop());
        let mut ctl = LayerController::new();

        let o1 = ctl.issue();
        let o2 = ctl.issue();
        let o3 = ctl.issue();

        let l2 = LayerId::Ordered(OperationKey::new("op2"));
        store.ensure_layer(l2.clone());
        ctl.materialize(o2, l2.clone());
        let squashed = ctl.resolve(o2, &mut store);
        assert!(squashed.is_empty(), "order 2 can't squash before order 1");

        let l1 = LayerId::Ordered(OperationKey::new("op1"));
        store.ensure_layer(l1.clone());
        ctl.materialize(o1, l1.clone());
        let squashed = ctl.resolve(o1, &mut store);
        assert_eq!(squashed, vec![l1, l2]);

        let l3 = LayerId::Ordered(OperationKey::new("op3"));
        store.ensure_layer(l3.clone());
        ctl.materialize(o3, l3.clone());
        let squashed = ctl.resolve(o3, &mut store);
        assert_eq!(squashed, vec![l3]);
    }

    #[test]
    fn optimistic_layers_stack_most_recent_first() {
        let mut store = Store::new(Logger::noop());
        let mut layers = OptimisticLayers::new();
        let a = OperationKey::new("a");
        let b = OperationKey::new("b");
        layers.push(a.clone(), &mut store);
        layers.push(b.clone(), &mut store);
        assert_eq!(layers.ids(), vec![LayerId::Optimistic(b), LayerId::Optimistic(a.clone())]);
        layers.retire(&a);
        assert_eq!(layers.ids(), vec![LayerId::Optimistic(OperationKey::new("b"))]);
    }
}
