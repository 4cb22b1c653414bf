//! Constructor options (`spec.md` §6), grounded in
//! `query_plan/query_planner.rs`'s `QueryPlannerConfig` /
//! `QueryPlannerDebugConfig` split: user-facing knobs at the top level,
//! rarely-touched ones grouped in a nested `debug` struct.

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::Schema;

use crate::cache_api::{OptimisticFn, ResolverFn, UpdaterFn};
use crate::error::Severity;
use crate::key::KeyingFn;

/// `logger: Fn(severity, message)` (§6). An injected callback rather than a
/// `tracing`/`log` sink — logging is one of this cache's external
/// collaborators (§1), and this type *is* the interface to it.
#[derive(Clone)]
pub struct Logger(Arc<dyn Fn(Severity, &str) + Send + Sync>);

impl Logger {
    pub fn new(f: impl Fn(Severity, &str) + Send + Sync + 'static) -> Self {
        Logger(Arc::new(f))
    }

    pub fn noop() -> Self {
        Logger(Arc::new(|_, _| {}))
    }

    pub fn log(&self, severity: Severity, message: &str) {
        (self.0)(severity, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::noop()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Logger(..)")
    }
}

/// Rarely-touched knobs, mirroring `QueryPlannerDebugConfig`'s role of
/// keeping experimental/testing-only switches out of the main options
/// struct.
#[derive(Clone)]
pub struct CacheDebugConfig {
    /// When `true` and a `schema` was supplied, a field the schema declares
    /// nullable is tolerated as missing the same way `@_optional` would be
    /// (§4.3). Defaults to `true`; implementations embedding this cache in
    /// a strict-schema pipeline may want to turn it off to surface misses
    /// more aggressively during development.
    pub schema_aware_nullability: bool,
    /// Upper bound on how many times a single operation may be reexecuted
    /// in response to writes that don't change its dependencies, before the
    /// loop-protection in §4.7 kicks in early. `0` disables the limit
    /// (protection still applies once a generation repeats).
    pub max_blind_reexecutions: u32,
}

impl Default for CacheDebugConfig {
    fn default() -> Self {
        CacheDebugConfig {
            schema_aware_nullability: true,
            max_blind_reexecutions: 0,
        }
    }
}

/// Constructor options (`spec.md` §6).
#[derive(Clone, Default)]
pub struct CacheOptions {
    pub keys: HashMap<String, KeyingFn>,
    pub resolvers: HashMap<(String, String), ResolverFn>,
    pub updates: HashMap<(String, String), UpdaterFn>,
    pub optimistic: HashMap<String, OptimisticFn>,
    pub schema: Option<Arc<Schema>>,
    pub logger: Logger,
    pub debug: CacheDebugConfig,
}

impl CacheOptions {
    pub fn builder() -> CacheOptionsBuilder {
        CacheOptionsBuilder::default()
    }
}

#[derive(Default)]
pub struct CacheOptionsBuilder {
    options: CacheOptions,
}

impl CacheOptionsBuilder {
    pub fn key(mut self, typename: impl Into<String>, f: KeyingFn) -> Self {
        self.options.keys.insert(typename.into(), f);
        self
    }

    pub fn resolver(mut self, typename: impl Into<String>, field: impl Into<String>, f: ResolverFn) -> Self {
        self.options.resolvers.insert((typename.into(), field.into()), f);
        self
    }

    pub fn update(mut self, typename: impl Into<String>, field: impl Into<String>, f: UpdaterFn) -> Self {
        self.options.updates.insert((typename.into(), field.into()), f);
        self
    }

    pub fn optimistic(mut self, field: impl Into<String>, f: OptimisticFn) -> Self {
        self.options.optimistic.insert(field.into(), f);
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.options.schema = Some(Arc::new(schema));
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.options.logger = logger;
        self
    }

    pub fn debug(mut self, debug: CacheDebugConfig) -> Self {
        self.options.debug = debug;
        self
    }

    pub fn build(self) -> CacheOptions {
        self.options
    }
}
