//! `spec.md` §8 S8: a field the server never supplies, explicitly marked
//! `@_required` so the schema's own nullability doesn't tolerate it, leaves
//! the operation permanently a miss — writes to unrelated entities must not
//! keep re-nominating it for reexecution.

mod common;

use graphql_cache::{Cache, CacheOutcome, RequestPolicy};

#[test]
fn required_field_never_supplied_does_not_thrash_on_unrelated_writes() {
    let mut cache = Cache::new(common::options());

    let effects = cache.operation(common::query_op(
        "op1",
        "{ author(id: \"1\") { id name @_required } }",
        RequestPolicy::CacheFirst,
    ));
    let first = common::emissions_for(&effects, "op1");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].cache_outcome, Some(CacheOutcome::Miss));
    assert_eq!(first[0].data, None);

    // The server never sends "name" for Author:1.
    cache.result(common::result(
        "op1",
        common::obj(&[(
            "author",
            common::obj(&[("__typename", common::jstr("Author")), ("id", common::jstr("1"))]),
        )]),
    ));

    // Repeated writes to an entirely unrelated entity must never re-nominate
    // op1 — it has no dependency on them.
    for i in 0..5 {
        cache.operation(common::query_op(&format!("other{i}"), "{ author(id: \"2\") { id name } }", RequestPolicy::CacheFirst));
        let effects = cache.result(common::result(
            &format!("other{i}"),
            common::obj(&[("author", common::author("2", "someone else"))]),
        ));
        assert!(
            common::emissions_for(&effects, "op1").is_empty(),
            "op1 must not be reexecuted by a write to an unrelated entity"
        );
    }

    // A write that does touch Author:1's "name" is a different story: now it
    // resolves and op1 is told about it exactly once.
    let effects = cache.operation(common::mutation_op(
        "m1",
        "mutation { setName(id: \"1\", name: \"Ada\") { id name } }",
    ));
    let optimistic = common::emissions_for(&effects, "op1");
    assert!(optimistic.is_empty(), "no optimistic updater is registered for setName here");

    let effects = cache.result(common::result("m1", common::obj(&[("setName", common::author("1", "Ada"))])));
    let resolved = common::emissions_for(&effects, "op1");
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].cache_outcome, Some(CacheOutcome::Hit));
    assert_eq!(
        common::get(resolved[0].data.as_ref().unwrap(), "author").and_then(|a| common::get(a, "name")),
        Some(&common::jstr("Ada"))
    );
}
