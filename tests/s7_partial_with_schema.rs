//! `spec.md` §8 S7: a superset query over data written by a narrower one
//! reports a schema-tolerated partial hit instead of a miss, nulling the
//! fields nobody ever wrote, and forwards to the network exactly once.

mod common;

use graphql_cache::{Cache, CacheOutcome, RequestPolicy, Value};

#[test]
fn superset_query_is_partial_not_miss_and_forwards_once() {
    let mut cache = Cache::new(common::options());

    cache.operation(common::query_op("op1", "{ todos { id text } }", RequestPolicy::CacheFirst));
    cache.result(common::result(
        "op1",
        common::obj(&[("todos", Value::Array(vec![common::todo("1", "buy milk")]))]),
    ));

    let effects = cache.operation(common::query_op(
        "op2",
        "{ todos { id text completed author { id name } } }",
        RequestPolicy::CacheFirst,
    ));
    let emissions = common::emissions_for(&effects, "op2");
    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].cache_outcome, Some(CacheOutcome::Partial));
    assert!(emissions[0].stale);

    let todos = common::get(emissions[0].data.as_ref().unwrap(), "todos").unwrap();
    let first = match todos {
        Value::Array(items) => &items[0],
        _ => panic!("todos must be an array"),
    };
    assert_eq!(common::get(first, "text"), Some(&common::jstr("buy milk")));
    assert_eq!(common::get(first, "completed"), Some(&Value::Null));
    assert_eq!(common::get(first, "author"), Some(&Value::Null));

    assert_eq!(
        common::forwards_for(&effects, "op2"),
        1,
        "a partial hit forwards exactly once, not once per missing field"
    );
}
