//! Coverage for the resolver and updater hooks (§6 "Resolver contract" /
//! "Updater contract"): a registered `Resolver` supplying a field the store
//! never wrote, and a registered `Updater` rewriting the store after a
//! mutation write.

use apollo_compiler::ast::Document;
use apollo_compiler::Schema;
use graphcache_core::read_operation;
use graphcache_core::write_operation;
use graphcache_core::ApolloSchemaOracle;
use graphcache_core::CacheFacade;
use graphcache_core::ResolverValue;
use graphcache_core::Store;
use graphcache_core::StoreView;
use serde_json::json;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

const SCHEMA_SRC: &str = r#"
type Query {
  doubled(n: Int!): Int
  todos: [Todo]
}

type Mutation {
  removeTodo(id: ID!): Boolean
}

type Todo {
  id: ID!
  text: String!
}

schema {
  query: Query
  mutation: Mutation
}
"#;

fn schema() -> ApolloSchemaOracle {
    let schema = Schema::parse_and_validate(SCHEMA_SRC, "schema.graphql").expect("valid schema");
    ApolloSchemaOracle::new(schema)
}

#[test]
fn resolver_supplies_a_field_the_store_never_wrote() {
    let store: Store = Store::builder()
        .resolver(
            "Query",
            "doubled",
            |_parent: &JsonMap<String, JsonValue>,
             args: &JsonMap<String, JsonValue>,
             _store: &StoreView<'_, ()>,
             _ctx: &()| {
                let n = args.get("n").and_then(JsonValue::as_i64).unwrap_or(0);
                ResolverValue::Scalar(json!(n * 2))
            },
        )
        .build();

    let doc = Document::parse("query { doubled(n: 21) }", "test.graphql")
        .expect("valid document");
    let outcome = read_operation(&store, &doc, None, &Default::default(), None, &()).unwrap();

    assert!(!outcome.partial);
    assert_eq!(outcome.data.unwrap(), json!({ "doubled": 42 }));
}

#[test]
fn resolver_returning_missing_without_a_schema_oracle_poisons_the_read() {
    let store: Store = Store::builder()
        .resolver(
            "Query",
            "doubled",
            |_parent: &JsonMap<String, JsonValue>,
             _args: &JsonMap<String, JsonValue>,
             _store: &StoreView<'_, ()>,
             _ctx: &()| ResolverValue::Missing,
        )
        .build();

    let doc = Document::parse("query { doubled(n: 1) }", "test.graphql")
        .expect("valid document");
    let outcome = read_operation(&store, &doc, None, &Default::default(), None, &()).unwrap();

    // No schema oracle to say `doubled` is nullable, so the miss poisons the
    // whole read (§4.4 step 5) rather than being tolerated as partial.
    assert!(outcome.data.is_none());
}

#[test]
fn updater_evicts_entity_named_by_mutation_args() {
    let oracle = schema();
    let mut store: Store = Store::builder()
        .schema(std::sync::Arc::new(oracle))
        .updater(
            "Mutation",
            "removeTodo",
            |result: &JsonValue,
             args: &JsonMap<String, JsonValue>,
             cache: &mut CacheFacade<'_, ()>,
             _ctx: &()| {
                if result.as_bool() != Some(true) {
                    return;
                }
                if let Some(id) = args.get("id").and_then(JsonValue::as_str) {
                    cache.evict_entity(&format!("Todo:{id}"));
                }
            },
        )
        .build();

    let todos_doc = Document::parse("query { todos { id text } }", "test.graphql")
        .expect("valid document");
    let todos_result = json!({
        "todos": [
            { "__typename": "Todo", "id": "1", "text": "a" },
            { "__typename": "Todo", "id": "2", "text": "b" },
        ]
    });
    write_operation(&mut store, &todos_doc, None, &Default::default(), &todos_result, &()).unwrap();

    assert!(store.get_record("Todo:1", "text").is_some());
    assert!(store.get_record("Todo:2", "text").is_some());

    let mutation_doc = Document::parse("mutation { removeTodo(id: \"1\") }", "test.graphql")
        .expect("valid document");
    write_operation(
        &mut store,
        &mutation_doc,
        None,
        &Default::default(),
        &json!({ "removeTodo": true }),
        &(),
    )
    .unwrap();

    assert!(store.get_record("Todo:1", "text").is_none());
    assert!(store.get_record("Todo:2", "text").is_some());
}
