//! A normalized, layered, document-aware GraphQL client cache.
//!
//! Entities are stored by `Type:id`, fields by canonicalized
//! `fieldName(args)` (C1, [`key`]). Reads and writes go through a layered
//! store (C2, [`store`]) so in-flight optimistic mutations and
//! out-of-issue-order query/subscription/`@defer` results can be kept apart
//! from the committed base state until they're ready to merge (C6,
//! [`layer_controller`]). A document analyzer (C3, [`document`]) caches the
//! per-operation shape so the read (C5, [`traversal::read`]) and write (C4,
//! [`traversal::write`]) traversals don't re-walk the AST on every call. A
//! dependency index (C7, [`dependency`]) drives reexecution of affected
//! in-flight operations after a write. [`operation::Cache`] (C8) wires all
//! of this into the three calls a host pipeline makes: `operation`,
//! `result`, `teardown`.

pub mod cache_api;
pub mod config;
pub mod dependency;
pub mod document;
pub mod error;
pub mod ids;
pub mod key;
pub mod layer_controller;
pub mod operation;
pub mod store;
pub(crate) mod traversal;
pub mod value;

pub use crate::cache_api::{CacheApi, FieldInfo, ResolvedField, ResolverFn, UpdaterFn, OptimisticFn};
pub use crate::config::{CacheDebugConfig, CacheOptions, CacheOptionsBuilder, Logger};
pub use crate::document::RootKind;
pub use crate::error::{CacheError, Severity};
pub use crate::ids::{Generation, OperationKey};
pub use crate::key::{EntityKey, FieldKey, KeyGenConfig, KeyOutcome, KeyingFn};
pub use crate::operation::{
    Cache, CacheOutcome, Effect, EmittedResult, IncomingOperation, IncomingResult, OperationKind,
    PathSegment, RequestPolicy,
};
pub use crate::store::LayerId;
pub use crate::value::{ByteString, JsonMap, ObjectValue, Value};
