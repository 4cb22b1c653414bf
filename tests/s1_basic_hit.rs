//! `spec.md` §8 S1 / property 1 (idempotence).

mod common;

use graphql_cache::{Cache, CacheOutcome, RequestPolicy};

#[test]
fn repeat_query_is_a_hit_with_no_forward() {
    let mut cache = Cache::new(common::options());

    let effects = cache.operation(common::query_op(
        "op1",
        "{ author(id: \"123\") { id name } }",
        RequestPolicy::CacheFirst,
    ));
    assert_eq!(common::forwards_for(&effects, "op1"), 1);

    let effects = cache.result(common::result(
        "op1",
        common::obj(&[("author", common::author("123", "A"))]),
    ));
    let first = common::emissions_for(&effects, "op1")
        .into_iter()
        .next()
        .expect("write-triggered re-read emits once");
    let first_data = first.data.clone().expect("data present");

    // Re-issuing the same live operation finds everything already in the
    // store: zero forwards, a hit, and the same observed value.
    let effects = cache.operation(common::query_op(
        "op1",
        "{ author(id: \"123\") { id name } }",
        RequestPolicy::CacheFirst,
    ));
    assert_eq!(common::forwards_for(&effects, "op1"), 0);
    let second = common::emissions_for(&effects, "op1")
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(second.cache_outcome, Some(CacheOutcome::Hit));
    assert_eq!(second.data, Some(first_data));
}
