//! `spec.md` §8 S3 / property 3 (dependency completeness).

mod common;

use graphql_cache::{Cache, RequestPolicy, Value};

#[test]
fn overlapping_write_reexecutes_exactly_once() {
    let mut cache = Cache::new(common::options());

    let effects = cache.operation(common::query_op(
        "op1",
        "{ author(id: \"123\") { id name } }",
        RequestPolicy::CacheFirst,
    ));
    assert_eq!(common::forwards_for(&effects, "op1"), 1);

    cache.result(common::result(
        "op1",
        common::obj(&[("author", common::author("123", "X"))]),
    ));

    let effects = cache.operation(common::query_op(
        "op2",
        "{ authors { id name } }",
        RequestPolicy::CacheFirst,
    ));
    assert_eq!(common::forwards_for(&effects, "op2"), 1);

    // op2's result overlaps op1's dependency on Author:123.name.
    let effects = cache.result(common::result(
        "op2",
        common::obj(&[("authors", Value::Array(vec![common::author("123", "Y")]))]),
    ));

    let op1_emissions = common::emissions_for(&effects, "op1");
    assert_eq!(op1_emissions.len(), 1, "op1 must reexecute exactly once");
    let data = op1_emissions[0].data.as_ref().expect("data present");
    assert_eq!(
        common::get(data, "author").and_then(|a| common::get(a, "name")),
        Some(&common::jstr("Y"))
    );
}
