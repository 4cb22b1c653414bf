//! C8 — Operation Controller. The externally-visible state machine:
//! `operation()` / `result()` / `teardown()`, wiring C2–C7 together
//! (`spec.md` §4.8).

use std::sync::Arc;

use apollo_compiler::executable::ExecutableDocument;
use indexmap::IndexSet;

use crate::cache_api::{CacheApi, FieldInfo};
use crate::config::CacheOptions;
use crate::dependency::{DependencyIndex, TypeIndex};
use crate::document::{AnalyzedSelectionSet, DocumentAnalyzer};
use crate::error::Severity;
use crate::ids::{Generation, OperationKey};
use crate::key::{EntityKey, FieldKey};
use crate::layer_controller::{LayerController, OptimisticLayers};
use crate::store::{LayerId, Link, Store, WriteTransaction};
use crate::traversal::{read, write, OutputValue};
use crate::value::{ObjectValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestPolicy {
    #[default]
    CacheFirst,
    CacheAndNetwork,
    CacheOnly,
    NetworkOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Partial,
}

pub struct IncomingOperation {
    pub key: OperationKey,
    pub kind: OperationKind,
    pub document: Arc<ExecutableDocument>,
    pub operation_name: Option<String>,
    pub variables: ObjectValue,
    pub request_policy: RequestPolicy,
}

pub struct IncomingResult {
    pub key: OperationKey,
    pub data: Option<Value>,
    /// Verbatim passthrough network error, if any (§7: "retained verbatim
    /// on the emitted result").
    pub error: Option<Value>,
    /// Top-level response keys named in `error.path` (§7: "recorded as
    /// known null in the store"). Resolving a full JSON pointer path is
    /// left to the host pipeline; this cache only distinguishes "which
    /// root selection fields errored" from "which came back null because
    /// the server said so", which is all the store needs to avoid
    /// re-reporting them as cache misses.
    pub errored_fields: Vec<String>,
    pub has_next: bool,
    /// Empty for an ordinary (or initial `@defer`) payload, whose `data`
    /// is written at the operation's root via the normal selection walk.
    /// Non-empty for a deferred `incremental` patch: names the position
    /// `data` belongs at, the same way the response's own `path` array
    /// does (`spec.md` §4.4 item 6).
    pub path: Vec<PathSegment>,
}

/// One step of an incremental payload's `path` array: either a response key
/// into an object's selection, or an index into a list field's items.
#[derive(Debug, Clone)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone)]
pub struct EmittedResult {
    pub operation: OperationKey,
    pub data: Option<Value>,
    pub error: Option<Value>,
    pub stale: bool,
    pub has_next: bool,
    pub cache_outcome: Option<CacheOutcome>,
}

#[derive(Debug, Clone)]
pub enum Effect {
    Emit(EmittedResult),
    Forward {
        operation: OperationKey,
        request_policy: RequestPolicy,
    },
}

struct PendingOperation {
    kind: OperationKind,
    root: EntityKey,
    root_typename: String,
    selection: Arc<AnalyzedSelectionSet>,
    last_output: Option<OutputValue>,
    last_dependencies: IndexSet<(EntityKey, FieldKey)>,
    generation: Generation,
    /// Whether this operation's last (re)read came back `partial`/`miss`
    /// (`spec.md` §4.7 loop protection). Gating reexecution itself falls
    /// out structurally — the dependency index only nominates an operation
    /// when one of its actual dependencies was touched — so this is
    /// exposed state for callers/tests, not consulted to skip a candidate.
    reexecutions_blocked: bool,
    /// `Some` for query/subscription operations: their slot in the
    /// commutative issue order (§4.6).
    issue_order: Option<u64>,
    /// Consecutive reexecutions that left this operation's output unchanged.
    /// Reset to `0` the moment a reexecution actually changes something;
    /// capped by `CacheDebugConfig::max_blind_reexecutions`.
    blind_reexecutions: u32,
}

/// The cache. Owns the store and every index/controller C2–C7 need;
/// `operation`/`result`/`teardown` are the only entry points the host
/// pipeline calls (§6, §5: single-threaded, cooperative, no suspension).
pub struct Cache {
    store: Store,
    options: CacheOptions,
    documents: DocumentAnalyzer,
    dependencies: DependencyIndex,
    types: TypeIndex,
    layers: LayerController,
    optimistic: OptimisticLayers,
    pending: indexmap::IndexMap<OperationKey, PendingOperation>,
}

impl Cache {
    pub fn new(options: CacheOptions) -> Self {
        let store = Store::new(options.logger.clone());
        Cache {
            store,
            options,
            documents: DocumentAnalyzer::new(),
            dependencies: DependencyIndex::new(),
            types: TypeIndex::new(),
            layers: LayerController::new(),
            optimistic: OptimisticLayers::new(),
            pending: indexmap::IndexMap::new(),
        }
    }

    /// Indexes `deps` both by exact `(entity, field)` slot and by the
    /// typenames of entities it touched, so a later `invalidateType`-style
    /// write (§4.4 item 7) can find every operation with a stake in that
    /// type even where the exact field it reads hasn't changed.
    fn record_dependencies(&mut self, op_key: &OperationKey, deps: IndexSet<(EntityKey, FieldKey)>) {
        for (entity, _) in &deps {
            self.types.observe(entity);
            self.dependencies
                .record_typename_interest(op_key.clone(), entity.typename().to_owned());
        }
        self.dependencies.record(op_key.clone(), deps);
    }

    fn recompute_store_order(&mut self) {
        let mut order = self.optimistic.ids();
        order.extend(self.layers.ids());
        self.store.set_order(order);
    }

    fn analyze(
        &mut self,
        op: &IncomingOperation,
    ) -> Option<Arc<crate::document::DocumentInfo>> {
        match self.documents.analyze(
            &op.document,
            op.operation_name.as_deref(),
            self.options.schema.as_deref(),
            &op.variables,
            self.options.debug.schema_aware_nullability,
        ) {
            Ok(info) => Some(info),
            Err(err) => {
                self.options.logger.log(Severity::Error, &err.to_string());
                None
            }
        }
    }

    // -- operation(op) ----------------------------------------------------

    pub fn operation(&mut self, op: IncomingOperation) -> Vec<Effect> {
        let Some(info) = self.analyze(&op) else {
            return vec![Effect::Emit(EmittedResult {
                operation: op.key,
                data: None,
                error: None,
                stale: false,
                has_next: false,
                cache_outcome: Some(CacheOutcome::Miss),
            })];
        };

        match op.kind {
            OperationKind::Query => self.start_query(op, info),
            OperationKind::Mutation => self.start_mutation(op, info),
            OperationKind::Subscription => self.start_subscription(op, info),
        }
    }

    fn start_query(
        &mut self,
        op: IncomingOperation,
        info: Arc<crate::document::DocumentInfo>,
    ) -> Vec<Effect> {
        let root = EntityKey::for_root(info.root_kind.root_typename());
        let issue_order = self.layers.issue();
        // A repeat call with a key already pending (the same live operation
        // re-querying, e.g. a re-rendered component) carries its last output
        // forward as reuse context instead of starting cold (`spec.md` §8
        // property 1, scenario S1) — dropping it here would make every
        // "repeat" look like a brand new read with no prior to reuse Arcs
        // from.
        let carried = self.pending.get(&op.key).and_then(|p| p.last_output.clone());
        self.pending.insert(
            op.key.clone(),
            PendingOperation {
                kind: OperationKind::Query,
                root: root.clone(),
                root_typename: info.root_kind.root_typename().to_owned(),
                selection: Arc::clone(&info.selection),
                last_output: carried.clone(),
                last_dependencies: IndexSet::new(),
                generation: Generation::default(),
                reexecutions_blocked: false,
                issue_order: Some(issue_order),
                blind_reexecutions: 0,
            },
        );

        let outcome = read_for(
            &mut self.store,
            &self.options,
            &root,
            info.root_kind.root_typename(),
            &info.selection,
            carried.as_ref(),
            &std::collections::HashSet::new(),
            &std::collections::HashSet::new(),
        );
        self.record_dependencies(&op.key, outcome.dependencies.clone());
        let cache_outcome = classify(&outcome.completeness);
        let suppressed = self.store.covered_by_optimistic(&outcome.dependencies);
        if let Some(pending) = self.pending.get_mut(&op.key) {
            pending.last_output = outcome.data.clone();
            pending.last_dependencies = outcome.dependencies;
        }

        let data = outcome.data.map(|v| v.to_json());
        let effective_policy = if suppressed {
            RequestPolicy::CacheFirst
        } else {
            op.request_policy
        };

        let mut effects = Vec::new();
        match effective_policy {
            RequestPolicy::CacheOnly => effects.push(Effect::Emit(EmittedResult {
                operation: op.key,
                data,
                error: None,
                stale: outcome.stale,
                has_next: false,
                cache_outcome: Some(cache_outcome),
            })),
            RequestPolicy::CacheFirst => {
                if cache_outcome == CacheOutcome::Hit {
                    effects.push(Effect::Emit(EmittedResult {
                        operation: op.key,
                        data,
                        error: None,
                        stale: outcome.stale,
                        has_next: false,
                        cache_outcome: Some(cache_outcome),
                    }));
                } else {
                    effects.push(Effect::Emit(EmittedResult {
                        operation: op.key.clone(),
                        data,
                        error: None,
                        stale: true,
                        has_next: false,
                        cache_outcome: Some(cache_outcome),
                    }));
                    effects.push(Effect::Forward {
                        operation: op.key,
                        request_policy: RequestPolicy::CacheFirst,
                    });
                }
            }
            RequestPolicy::CacheAndNetwork => {
                effects.push(Effect::Emit(EmittedResult {
                    operation: op.key.clone(),
                    data,
                    error: None,
                    stale: outcome.stale,
                    has_next: false,
                    cache_outcome: Some(cache_outcome),
                }));
                effects.push(Effect::Forward {
                    operation: op.key,
                    request_policy: RequestPolicy::CacheAndNetwork,
                });
            }
            RequestPolicy::NetworkOnly => effects.push(Effect::Forward {
                operation: op.key,
                request_policy: RequestPolicy::NetworkOnly,
            }),
        }
        effects
    }

    fn start_mutation(
        &mut self,
        op: IncomingOperation,
        info: Arc<crate::document::DocumentInfo>,
    ) -> Vec<Effect> {
        let root = EntityKey::for_root("Mutation");
        self.pending.insert(
            op.key.clone(),
            PendingOperation {
                kind: OperationKind::Mutation,
                root: root.clone(),
                root_typename: "Mutation".to_owned(),
                selection: Arc::clone(&info.selection),
                last_output: None,
                last_dependencies: IndexSet::new(),
                generation: Generation::default(),
                reexecutions_blocked: false,
                issue_order: None,
                blind_reexecutions: 0,
            },
        );

        let has_optimistic = info
            .selection
            .fields
            .values()
            .any(|f| self.options.optimistic.contains_key(&f.field_name));

        let mut effects = Vec::new();
        if has_optimistic {
            let layer_id = self.optimistic.push(op.key.clone(), &mut self.store);
            self.recompute_store_order();
            let mut txn = WriteTransaction::default();
            let mut synthesized = ObjectValue::new();
            for (response_key, field) in info.selection.fields.iter() {
                if let Some(optimistic_fn) = self.options.optimistic.get(&field.field_name).cloned() {
                    let mut api = CacheApi::new(&mut self.store, &self.options, &mut txn, layer_id.clone());
                    let field_info = FieldInfo {
                        parent_typename: "Mutation",
                        field_name: &field.field_name,
                        field_key: &field.field_key,
                    };
                    let args = field.args.clone();
                    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        optimistic_fn(&args, &mut api, &field_info)
                    })) {
                        Ok(value) => {
                            synthesized.insert(response_key.as_str(), value);
                        }
                        Err(payload) => {
                            self.store.report_updater_panic("Mutation", &field.field_name, &payload);
                        }
                    }
                }
            }
            let _ = write::write_object(
                &mut self.store,
                &self.options,
                &mut txn,
                &layer_id,
                &root,
                "Mutation",
                &info.selection,
                &Value::Object(synthesized),
                false,
            );
            effects.extend(self.issue_reexecutions(&txn, Some(&op.key)));
        }

        effects.push(Effect::Forward {
            operation: op.key,
            request_policy: RequestPolicy::NetworkOnly,
        });
        effects
    }

    fn start_subscription(
        &mut self,
        op: IncomingOperation,
        info: Arc<crate::document::DocumentInfo>,
    ) -> Vec<Effect> {
        let root = EntityKey::for_root(info.root_kind.root_typename());
        self.store.ensure_layer(LayerId::Ordered(op.key.clone()));
        self.pending.insert(
            op.key.clone(),
            PendingOperation {
                kind: OperationKind::Subscription,
                root,
                root_typename: info.root_kind.root_typename().to_owned(),
                selection: Arc::clone(&info.selection),
                last_output: None,
                last_dependencies: IndexSet::new(),
                generation: Generation::default(),
                reexecutions_blocked: false,
                issue_order: None,
                blind_reexecutions: 0,
            },
        );
        vec![Effect::Forward {
            operation: op.key,
            request_policy: RequestPolicy::NetworkOnly,
        }]
    }

    // -- result(res) --------------------------------------------------------

    pub fn result(&mut self, res: IncomingResult) -> Vec<Effect> {
        let Some(kind) = self.pending.get(&res.key).map(|p| p.kind) else {
            return Vec::new();
        };

        match kind {
            OperationKind::Mutation => self.apply_mutation_result(res),
            OperationKind::Query => self.apply_ordered_result(res),
            OperationKind::Subscription => self.apply_subscription_result(res),
        }
    }

    fn apply_mutation_result(&mut self, res: IncomingResult) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut txn = WriteTransaction::default();
        let discarded_optimistic = self.store.remove_layer(&LayerId::Optimistic(res.key.clone()));
        if let Some(layer) = discarded_optimistic {
            self.optimistic.retire(&res.key);
            self.recompute_store_order();
            if res.data.is_none() {
                // Rollback, not a commit: nothing gets written to base, so
                // nominate every slot the optimistic layer held for
                // reexecution ourselves — otherwise a dependent query that
                // only ever saw the optimistic value never learns the real
                // (pre-mutation) value is back (`spec.md` §4.6, §8
                // property 6).
                txn.touched.extend(layer.touched_slots());
            }
        }

        let Some(pending) = self.pending.get(&res.key) else {
            return effects;
        };
        let root = pending.root.clone();
        let root_typename = pending.root_typename.clone();
        let selection = Arc::clone(&pending.selection);

        if res.path.is_empty() && res.data.is_some() {
            mark_known_nulls(&mut self.store, &root, &selection, &res.errored_fields, &mut txn);
        }
        write_result_data(
            &mut self.store,
            &self.options,
            &mut txn,
            &LayerId::Base,
            &root,
            &root_typename,
            &selection,
            &res,
            true,
        );

        effects.extend(self.issue_reexecutions(&txn, Some(&res.key)));

        let emitted = self.reread(&res.key, &txn);
        if let Some(mut emitted) = emitted {
            emitted.error = res.error;
            emitted.cache_outcome = None;
            effects.push(Effect::Emit(emitted));
        }
        effects
    }

    fn apply_ordered_result(&mut self, res: IncomingResult) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(pending) = self.pending.get(&res.key) else {
            return effects;
        };
        let order = pending.issue_order.expect("query pending entry always carries an issue order");
        let root = pending.root.clone();
        let root_typename = pending.root_typename.clone();
        let selection = Arc::clone(&pending.selection);

        let layer_id = LayerId::Ordered(res.key.clone());
        self.store.ensure_layer(layer_id.clone());
        self.layers.materialize(order, layer_id.clone());

        let mut txn = WriteTransaction::default();
        if res.path.is_empty() && res.data.is_some() {
            mark_known_nulls(&mut self.store, &root, &selection, &res.errored_fields, &mut txn);
        }
        write_result_data(
            &mut self.store,
            &self.options,
            &mut txn,
            &layer_id,
            &root,
            &root_typename,
            &selection,
            &res,
            false,
        );
        self.recompute_store_order();

        if !res.has_next {
            self.layers.resolve(order, &mut self.store);
            self.recompute_store_order();
        }

        effects.extend(self.issue_reexecutions(&txn, Some(&res.key)));

        let emitted = self.reread(&res.key, &txn);
        if let Some(mut emitted) = emitted {
            emitted.error = res.error;
            emitted.cache_outcome = None;
            emitted.has_next = res.has_next;
            effects.push(Effect::Emit(emitted));
        }
        effects
    }

    fn apply_subscription_result(&mut self, res: IncomingResult) -> Vec<Effect> {
        // Subscriptions always win over concurrent queries (§4.6): write
        // straight through the operation's own layer and squash immediately
        // rather than queuing behind commutative ordering.
        let mut effects = Vec::new();
        let Some(pending) = self.pending.get(&res.key) else {
            return effects;
        };
        let root = pending.root.clone();
        let root_typename = pending.root_typename.clone();
        let selection = Arc::clone(&pending.selection);
        let layer_id = LayerId::Ordered(res.key.clone());
        self.store.ensure_layer(layer_id.clone());

        let mut txn = WriteTransaction::default();
        if res.path.is_empty() && res.data.is_some() {
            mark_known_nulls(&mut self.store, &root, &selection, &res.errored_fields, &mut txn);
        }
        write_result_data(
            &mut self.store,
            &self.options,
            &mut txn,
            &layer_id,
            &root,
            &root_typename,
            &selection,
            &res,
            false,
        );
        self.store.merge_layer_into_base(&layer_id);

        effects.extend(self.issue_reexecutions(&txn, Some(&res.key)));

        let emitted = self.reread(&res.key, &txn);
        if let Some(mut emitted) = emitted {
            emitted.error = res.error;
            emitted.cache_outcome = None;
            emitted.has_next = res.has_next;
            effects.push(Effect::Emit(emitted));
        }
        effects
    }

    /// Best-effort sweep (`spec.md` §4.2, §14): an entity survives if some
    /// live operation's root or last-read dependency set names it.
    pub fn gc(&mut self) {
        let mut roots = std::collections::HashSet::new();
        for pending in self.pending.values() {
            roots.insert(pending.root.clone());
            for (entity, _) in &pending.last_dependencies {
                roots.insert(entity.clone());
            }
        }
        self.store.gc(&roots);
    }

    // -- teardown(op) -------------------------------------------------------

    pub fn teardown(&mut self, key: &OperationKey) -> Vec<Effect> {
        if let Some(pending) = self.pending.shift_remove(key) {
            if let Some(order) = pending.issue_order {
                let squashed = self.layers.abandon(order, &mut self.store);
                if !squashed.is_empty() {
                    self.recompute_store_order();
                }
            }
            if matches!(pending.kind, OperationKind::Subscription) {
                // Own layer, if still present (no terminal result arrived):
                // collapse into base rather than discard (§5: "collapses
                // that layer into base").
                self.store.merge_layer_into_base(&LayerId::Ordered(key.clone()));
            }
        }
        self.dependencies.remove_operation(key);
        Vec::new()
    }

    // -- reexecution (§4.7) --------------------------------------------------

    fn issue_reexecutions(&mut self, txn: &WriteTransaction, exclude: Option<&OperationKey>) -> Vec<Effect> {
        if txn.touched.is_empty() && txn.invalidated_types.is_empty() {
            return Vec::new();
        }
        for (entity, _) in &txn.touched {
            self.types.observe(entity);
        }
        let touched_types: std::collections::HashSet<String> =
            txn.invalidated_types.iter().cloned().collect();

        let candidates = self.dependencies.reexecution_set(&txn.touched, &touched_types, exclude);
        let mut effects = Vec::new();
        let max_blind = self.options.debug.max_blind_reexecutions;
        for op_key in candidates {
            let Some(pending) = self.pending.get(&op_key) else { continue };
            if max_blind > 0 && pending.blind_reexecutions >= max_blind {
                self.options.logger.log(
                    Severity::Debug,
                    &format!("skipping reexecution of \"{op_key}\": blind-reexecution cap ({max_blind}) reached"),
                );
                continue;
            }
            let generation = self.dependencies.advance_generation(&op_key);
            let root = pending.root.clone();
            let root_typename = pending.root_typename.clone();
            let selection = Arc::clone(&pending.selection);
            let prior = pending.last_output.clone();

            let outcome = read_for(
                &mut self.store,
                &self.options,
                &root,
                &root_typename,
                &selection,
                prior.as_ref(),
                &txn.touched.iter().cloned().collect(),
                &touched_types,
            );
            if self.dependencies.current_generation(&op_key) != generation {
                // Superseded by a newer write while we were re-reading.
                continue;
            }
            self.record_dependencies(&op_key, outcome.dependencies.clone());

            let changed = match (&prior, &outcome.data) {
                (Some(p), Some(n)) => !p.identical(n) && p.to_json() != n.to_json(),
                (None, None) => false,
                _ => true,
            };

            let cache_outcome = classify(&outcome.completeness);
            let blocked_now = matches!(outcome.completeness, read::Completeness::Partial | read::Completeness::Miss);

            if let Some(pending) = self.pending.get_mut(&op_key) {
                pending.last_output = outcome.data.clone();
                pending.last_dependencies = outcome.dependencies;
                pending.generation = generation;
                pending.reexecutions_blocked = blocked_now;
                pending.blind_reexecutions = if changed { 0 } else { pending.blind_reexecutions + 1 };
            }

            if !changed && !outcome.stale {
                continue;
            }

            effects.push(Effect::Emit(EmittedResult {
                operation: op_key,
                data: outcome.data.map(|v| v.to_json()),
                error: None,
                stale: outcome.stale || blocked_now,
                has_next: false,
                cache_outcome: Some(cache_outcome),
            }));
        }
        effects
    }

    /// Re-reads `key`'s current cached shape for emission after a write
    /// that this operation itself caused (§4.8: "re-reading its data from
    /// the cache so that resolvers/normalization are applied
    /// consistently"). `txn` is the write that triggered this reread, so a
    /// typename it invalidated (§4.4 item 7) is still visible as `stale`
    /// even though this operation produced the write itself.
    fn reread(&mut self, key: &OperationKey, txn: &WriteTransaction) -> Option<EmittedResult> {
        let pending = self.pending.get(key)?;
        let root = pending.root.clone();
        let root_typename = pending.root_typename.clone();
        let selection = Arc::clone(&pending.selection);
        let prior = pending.last_output.clone();

        let changed: std::collections::HashSet<_> = txn.touched.iter().cloned().collect();
        let invalidated_types: std::collections::HashSet<_> = txn.invalidated_types.iter().cloned().collect();
        let outcome = read_for(
            &mut self.store,
            &self.options,
            &root,
            &root_typename,
            &selection,
            prior.as_ref(),
            &changed,
            &invalidated_types,
        );
        self.record_dependencies(key, outcome.dependencies.clone());
        let cache_outcome = classify(&outcome.completeness);
        let stale = outcome.stale;
        if let Some(pending) = self.pending.get_mut(key) {
            pending.last_output = outcome.data.clone();
            pending.last_dependencies = outcome.dependencies;
        }
        Some(EmittedResult {
            operation: key.clone(),
            data: outcome.data.map(|v| v.to_json()),
            error: None,
            stale,
            has_next: false,
            cache_outcome: Some(cache_outcome),
        })
    }
}

fn classify(completeness: &read::Completeness) -> CacheOutcome {
    match completeness {
        read::Completeness::Hit => CacheOutcome::Hit,
        read::Completeness::Partial => CacheOutcome::Partial,
        read::Completeness::Miss => CacheOutcome::Miss,
    }
}

fn read_for(
    store: &mut Store,
    options: &CacheOptions,
    root: &EntityKey,
    root_typename: &str,
    selection: &AnalyzedSelectionSet,
    prior: Option<&OutputValue>,
    changed: &std::collections::HashSet<(EntityKey, FieldKey)>,
    invalidated_types: &std::collections::HashSet<String>,
) -> read::ReadOutcome {
    let mut txn = WriteTransaction::default();
    let mut api = CacheApi::new(store, options, &mut txn, LayerId::Base);
    read::read_selection(&mut api, root, root_typename, selection, prior, changed, invalidated_types)
}

struct IncrementalTarget {
    parent: EntityKey,
    parent_typename: String,
    selection: Arc<AnalyzedSelectionSet>,
    response_key: String,
}

/// Walks `path` from `root` through links already present in the store to
/// find where a deferred patch's `data` belongs: the parent entity, its
/// typename, the selection in force at that position, and the response key
/// `data` fills in. Returns `None` if any step of the path doesn't resolve
/// against what's currently written — the non-deferred parts of the
/// response this patch belongs to are expected to have landed first.
fn locate_incremental_target(
    store: &Store,
    root: &EntityKey,
    root_typename: &str,
    selection: &Arc<AnalyzedSelectionSet>,
    path: &[PathSegment],
) -> Option<IncrementalTarget> {
    let (last, init) = path.split_last()?;
    let PathSegment::Field(final_key) = last else {
        return None;
    };

    let mut entity = root.clone();
    let mut typename = root_typename.to_owned();
    let mut current = Arc::clone(selection);

    let mut i = 0;
    while i < init.len() {
        let PathSegment::Field(response_key) = &init[i] else {
            return None;
        };
        let field = current.fields.get(response_key)?;
        let child_selection = field.selection.clone()?;
        let link = store.read_link(&entity, &field.field_key)?;
        let child_key = if let Some(PathSegment::Index(idx)) = init.get(i + 1) {
            let Link::List(items) = link else { return None };
            let key = items.get(*idx)?.clone()?;
            i += 1;
            key
        } else {
            let Link::Single(key) = link else { return None };
            key.clone()
        };
        typename = child_key.typename().to_owned();
        entity = child_key;
        current = child_selection;
        i += 1;
    }

    Some(IncrementalTarget {
        parent: entity,
        parent_typename: typename,
        selection: current,
        response_key: final_key.clone(),
    })
}

/// Normalizes one `result()` payload's `data`, dispatching between a full
/// selection write and a deferred-patch write depending on whether `res`
/// names a `path` (`spec.md` §4.4 item 6). `track_novelty` is forwarded to
/// `write::write_object` for the full-write case only — incremental patches
/// never invalidate a typename outright, since they fill in fields the
/// initial payload already declared would eventually exist.
#[allow(clippy::too_many_arguments)]
fn write_result_data(
    store: &mut Store,
    options: &CacheOptions,
    txn: &mut WriteTransaction,
    layer: &LayerId,
    root: &EntityKey,
    root_typename: &str,
    selection: &Arc<AnalyzedSelectionSet>,
    res: &IncomingResult,
    track_novelty: bool,
) {
    let Some(data) = &res.data else { return };
    if res.path.is_empty() {
        let _ = write::write_object(store, options, txn, layer, root, root_typename, selection, data, track_novelty);
        return;
    }
    match locate_incremental_target(store, root, root_typename, selection, &res.path) {
        Some(target) => {
            let _ = write::write_incremental(
                store,
                options,
                txn,
                layer,
                &target.parent,
                &target.parent_typename,
                &target.selection,
                &target.response_key,
                data,
            );
        }
        None => {
            store.log_missing_field(root, "<incremental path did not resolve>", &ObjectValue::new());
        }
    }
}

/// §7: "fields reported in `error.path` are recorded as 'known null' in
/// the store so future reads do not re-mark them as cache misses" — writes
/// an explicit null for each top-level root selection field GraphQL errored
/// on, ahead of normalizing the (necessarily null-at-that-key) data.
fn mark_known_nulls(
    store: &mut Store,
    root: &EntityKey,
    selection: &AnalyzedSelectionSet,
    errored_fields: &[String],
    txn: &mut WriteTransaction,
) {
    for response_key in errored_fields {
        if let Some(field) = selection.fields.get(response_key) {
            store.write_record(&LayerId::Base, root.clone(), field.field_key.clone(), Value::Null, txn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::{ExecutableDocument as Doc, Schema};

    const SDL: &str = r#"
        type Query { todos: [Todo] }
        type Todo { id: ID! text: String }
    "#;

    fn selection_for(source: &str) -> Arc<AnalyzedSelectionSet> {
        let schema = Schema::parse_and_validate(SDL, "s.graphql").unwrap();
        let doc = Arc::new(Doc::parse_and_validate(&schema, source, "op.graphql").unwrap().into_inner());
        let mut analyzer = DocumentAnalyzer::new();
        let info = analyzer.analyze(&doc, None, Some(&schema), &ObjectValue::new(), true).unwrap();
        Arc::clone(&info.selection)
    }

    fn todo_object(id: &str) -> Value {
        let mut object = ObjectValue::new();
        object.insert("__typename", Value::String("Todo".into()));
        object.insert("id", Value::String(id.into()));
        Value::Object(object)
    }

    #[test]
    fn locates_a_list_index_target_for_an_incremental_patch() {
        let selection = selection_for("{ todos { id text } }");
        let options = CacheOptions::default();
        let mut store = Store::new(crate::config::Logger::noop());
        let mut txn = WriteTransaction::default();
        let root = EntityKey::for_root("Query");

        let mut initial = ObjectValue::new();
        initial.insert("todos", Value::Array(vec![todo_object("1"), todo_object("2")]));
        write::write_object(
            &mut store,
            &options,
            &mut txn,
            &LayerId::Base,
            &root,
            "Query",
            &selection,
            &Value::Object(initial),
            false,
        )
        .unwrap();

        let path = vec![
            PathSegment::Field("todos".to_owned()),
            PathSegment::Index(1),
            PathSegment::Field("text".to_owned()),
        ];
        let target = locate_incremental_target(&store, &root, "Query", &selection, &path)
            .expect("path resolves against the already-written list");
        assert_eq!(target.parent.as_str(), "Todo:2");
        assert_eq!(target.parent_typename, "Todo");
        assert_eq!(target.response_key, "text");

        let patch = Value::String("wash the car".into());
        write::write_incremental(
            &mut store,
            &options,
            &mut txn,
            &LayerId::Base,
            &target.parent,
            &target.parent_typename,
            &target.selection,
            &target.response_key,
            &patch,
        )
        .unwrap();

        let field = FieldKey::new("text", &Default::default());
        assert_eq!(store.read_record(&target.parent, &field), Some(&Value::String("wash the car".into())));
        let other = EntityKey::raw("Todo:1", "Todo");
        assert_eq!(store.read_record(&other, &field), None);
    }

    #[test]
    fn missing_link_fails_to_locate_the_target() {
        let selection = selection_for("{ todos { id text } }");
        let store = Store::new(crate::config::Logger::noop());
        let root = EntityKey::for_root("Query");
        let path = vec![
            PathSegment::Field("todos".to_owned()),
            PathSegment::Index(0),
            PathSegment::Field("text".to_owned()),
        ];
        assert!(locate_incremental_target(&store, &root, "Query", &selection, &path).is_none());
    }
}
