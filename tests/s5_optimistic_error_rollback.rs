//! `spec.md` §8 S5.

mod common;

use std::sync::Arc;

use graphql_cache::{Cache, CacheApi, CacheOptions, FieldInfo, ObjectValue, RequestPolicy, Value};

fn options_with_optimistic() -> CacheOptions {
    CacheOptions::builder()
        .schema(common::schema())
        .optimistic(
            "setName",
            Arc::new(|args: &ObjectValue, _ctx: &mut CacheApi<'_>, _info: &FieldInfo<'_>| -> Value {
                let id = args.get("id").cloned().unwrap_or(Value::String("123".into()));
                common::obj(&[
                    ("__typename", common::jstr("Author")),
                    ("id", id),
                    ("name", common::jstr("OFFLINE")),
                ])
            }),
        )
        .build()
}

#[test]
fn mutation_error_rolls_back_to_pre_mutation_value() {
    let mut cache = Cache::new(options_with_optimistic());

    cache.operation(common::query_op(
        "op1",
        "{ author(id: \"123\") { id name } }",
        RequestPolicy::CacheFirst,
    ));
    cache.result(common::result("op1", common::obj(&[("author", common::author("123", "A"))])));

    let effects = cache.operation(common::mutation_op(
        "m1",
        "mutation { setName(id: \"123\", name: \"ONLINE\") { id name } }",
    ));
    assert_eq!(
        common::get(common::emissions_for(&effects, "op1")[0].data.as_ref().unwrap(), "author")
            .and_then(|a| common::get(a, "name")),
        Some(&common::jstr("OFFLINE"))
    );

    let effects = cache.result(common::error_result(
        "m1",
        common::obj(&[("message", common::jstr("backend unavailable"))]),
    ));
    let rollback = common::emissions_for(&effects, "op1");
    assert_eq!(rollback.len(), 1);
    assert_eq!(
        common::get(rollback[0].data.as_ref().unwrap(), "author")
            .and_then(|a| common::get(a, "name")),
        Some(&common::jstr("A"))
    );
}
