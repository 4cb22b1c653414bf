//! C4/C5 — write and read traversal over the store, driven by an
//! [`AnalyzedSelectionSet`](crate::document::AnalyzedSelectionSet)
//! (`spec.md` §4.4, §4.5).

pub mod read;
pub mod write;

pub use read::{Completeness, OutputValue, ReadOutcome};
