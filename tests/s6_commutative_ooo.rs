//! `spec.md` §8 S6 / property 5 (commutativity).
//!
//! Three concurrently in-flight queries against the same field are issued
//! in order (issue orders 0, 1, 2); their results arrive out of order
//! (2, 1, 3 — i.e. issue order 1 first, then 0, then 2). No read anywhere
//! in the sequence may observe issue order 0's value once issue order 1's
//! has landed, and the field converges on issue order 2's value.

mod common;

use graphql_cache::{Cache, Effect, RequestPolicy};

const QUERY: &str = "{ author(id: \"1\") { id name } }";

fn observed_names(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Emit(r) => r.data.as_ref(),
            _ => None,
        })
        .filter_map(|data| common::get(data, "author").and_then(|a| common::get(a, "name")))
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect()
}

#[test]
fn out_of_order_results_never_regress_and_converge_on_the_latest() {
    let mut cache = Cache::new(common::options());

    cache.operation(common::query_op("q1", QUERY, RequestPolicy::CacheFirst));
    cache.operation(common::query_op("q2", QUERY, RequestPolicy::CacheFirst));
    cache.operation(common::query_op("q3", QUERY, RequestPolicy::CacheFirst));

    let mut seen = Vec::new();

    let effects = cache.result(common::result("q2", common::obj(&[("author", common::author("1", "2"))])));
    seen.extend(observed_names(&effects));
    assert!(seen.contains(&"2".to_owned()), "key 2's payload must be observable once it lands");

    let effects = cache.result(common::result("q1", common::obj(&[("author", common::author("1", "1"))])));
    seen.extend(observed_names(&effects));

    let effects = cache.result(common::result("q3", common::obj(&[("author", common::author("1", "3"))])));
    seen.extend(observed_names(&effects));

    assert!(
        !seen.contains(&"1".to_owned()),
        "issue order 0's value must never be observable once issue order 1's result has landed: {seen:?}"
    );

    let verify = cache.operation(common::query_op("verify", QUERY, RequestPolicy::CacheOnly));
    let final_value = common::emissions_for(&verify, "verify")[0]
        .data
        .as_ref()
        .and_then(|d| common::get(d, "author"))
        .and_then(|a| common::get(a, "name"))
        .and_then(|v| v.as_str())
        .map(str::to_owned);
    assert_eq!(final_value, Some("3".to_owned()));
}
