//! The JSON-ish value type records, links and denormalized results are built
//! from. Grounded in `apollo-federation`'s choice of `serde_json_bytes` (see
//! its `Cargo.toml`): cheap `Clone` via reference-counted strings, preserved
//! key order, and a `Value`/`Map` split that matches the shape of a parsed
//! GraphQL response.

pub use serde_json_bytes::{ByteString, Map as JsonMap, Value};

pub type ObjectValue = JsonMap<ByteString, Value>;
