//! `spec.md` §8 S4 / property 6 (optimistic layering).

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
fn optimistic_value_then_real_value_each_reexecute_the_dependent_query_once() {
    let mut cache = Cache::new(options_with_optimistic());

    let effects = cache.operation(common::query_op(
        "op1",
        "{ author(id: \"123\") { id name } }",
        RequestPolicy::CacheFirst,
    ));
    assert_eq!(common::forwards_for(&effects, "op1"), 1);
    cache.result(common::result("op1", common::obj(&[("author", common::author("123", "A"))])));

    let effects = cache.operation(common::mutation_op(
        "m1",
        "mutation { setName(id: \"123\", name: \"ONLINE\") { id name } }",
    ));
    let optimistic_emissions = common::emissions_for(&effects, "op1");
    assert_eq!(optimistic_emissions.len(), 1);
    assert_eq!(
        common::get(optimistic_emissions[0].data.as_ref().unwrap(), "author")
            .and_then(|a| common::get(a, "name")),
        Some(&common::jstr("OFFLINE"))
    );

    let effects = cache.result(common::result(
        "m1",
        common::obj(&[("setName", common::author("123", "ONLINE"))]),
    ));
    let real_emissions = common::emissions_for(&effects, "op1");
    assert_eq!(real_emissions.len(), 1);
    assert_eq!(
        common::get(real_emissions[0].data.as_ref().unwrap(), "author")
            .and_then(|a| common::get(a, "name")),
        Some(&common::jstr("ONLINE"))
    );

    assert_eq!(common::forwards_for(&effects, "op1"), 0, "query never re-forwards on its own");
}
