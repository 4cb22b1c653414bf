//! `spec.md` §8 S2.

mod common;

use graphql_cache::{Cache, CacheOutcome, RequestPolicy};

#[test]
fn cache_only_on_empty_store_emits_once_with_no_forward() {
    let mut cache = Cache::new(common::options());

    let effects = cache.operation(common::query_op(
        "op1",
        "{ author(id: \"123\") { id name } }",
        RequestPolicy::CacheOnly,
    ));

    assert_eq!(common::forwards_for(&effects, "op1"), 0);
    let emissions = common::emissions_for(&effects, "op1");
    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].data, None);
    assert_eq!(emissions[0].cache_outcome, Some(CacheOutcome::Miss));
}
