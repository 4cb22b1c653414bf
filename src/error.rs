use std::fmt;

use crate::key::{EntityKey, FieldKey};

/// Severity levels accepted by the logger callback (`spec.md` §6). The cache
/// only ever emits `Debug` and `Error`; `Warn` exists for completeness of the
/// logger's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Debug => "debug",
            Severity::Warn => "warn",
            Severity::Error => "error",
        })
    }
}

/// Internal failure taxonomy (`spec.md` §7). None of these ever escape the
/// cache's public operation API: `OperationController` downgrades every
/// variant into a logger call plus a classification on the emitted result.
/// The type still exists, and is threaded through internal `Result`s, the
/// same way `apollo-federation`'s `FederationError` threads through its
/// internals before flattening it at a crate boundary.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A record and a link were about to coexist at the same
    /// `(EntityKey, FieldKey)` in the same layer, or a typename was required
    /// but absent from a written object.
    #[error("invariant violation on entity \"{entity}\", field \"{field}\": {message}")]
    InvariantViolation {
        entity: EntityKey,
        field: FieldKey,
        message: String,
    },

    /// A user-supplied updater/resolver/optimistic function panicked or
    /// returned an error. Isolated: only that callback's pending writes are
    /// discarded.
    #[error("updater for {owner}.{field} failed: {message}")]
    UpdaterException {
        owner: String,
        field: String,
        message: String,
    },

    /// The document analyzer was handed a document it cannot make sense of
    /// (e.g. an operation name that doesn't exist in the document).
    #[error("document error: {0}")]
    Document(String),

    /// `keyOfEntity`/`resolve` on the mediated cache API was asked about a
    /// typename with no keying function and no `id`/`_id` field — the object
    /// has no stable key to report.
    #[error("entity of type \"{0}\" has no stable key")]
    NoStableKey(String),
}

/// What got classified at the spot the failure occurred, so a read traversal
/// can keep walking instead of aborting (`spec.md` §7, `InvariantViolation`
/// is "treated as a miss at that location").
pub(crate) type CacheResult<T> = Result<T, CacheError>;
