//! The write path (§4.3): traverses an operation's selection set against a
//! result tree, producing entity keys, records, and link topology.

use apollo_compiler::ast::Field;
use apollo_compiler::ast::Selection;
use apollo_compiler::Node;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::ast_utils::field_arguments;
use crate::ast_utils::find_operation;
use crate::ast_utils::flatten_selections;
use crate::ast_utils::response_key;
use crate::ast_utils::root_key_for;
use crate::ast_utils::FragmentMap;
use crate::ast_utils::ParsedDocument;
use crate::error::CacheError;
use crate::error::Result;
use crate::internal_error;
use crate::keys::join_keys;
use crate::keys::key_of_field;
use crate::store::DependencySet;
use crate::store::Store;
use crate::value::Link;

/// Normalizes `result` (the server's response to `document`) into `store`.
/// Returns the set of dependency keys the write touched.
pub fn write_operation<Ctx>(
    store: &mut Store<Ctx>,
    document: &ParsedDocument,
    operation_name: Option<&str>,
    variables: &JsonMap<String, JsonValue>,
    result: &JsonValue,
    ctx: &Ctx,
) -> Result<DependencySet> {
    let operation = find_operation(document, operation_name).ok_or(CacheError::EmptyOperation)?;
    let root_key = root_key_for(operation.operation_type);
    let result_map = result
        .as_object()
        .ok_or_else(|| internal_error!("write result must be a JSON object"))?;
    let fragments = FragmentMap::from_document(document);

    store.init_dependencies();
    let top_fields = write_selection_set(
        store,
        &operation.selection_set,
        root_key,
        result_map,
        variables,
        &fragments,
        ctx,
    )?;

    for field in top_fields {
        let Some(updater) = store.updater_for(root_key, field.name.as_str()) else {
            continue;
        };
        let args = field_arguments(field, variables);
        let response_value = result_map
            .get(response_key(field))
            .cloned()
            .unwrap_or(JsonValue::Null);
        let mut facade = store.facade();
        updater.update(&response_value, &args, &mut facade, ctx);
    }

    Ok(store.clear_dependencies())
}

/// Writes every field of `selections` against `result_map`, addressed under
/// `entity_key` (a real entity key or an embedded addressing prefix — the
/// two are indistinguishable once chosen; see DESIGN.md). Returns the
/// flattened top-level field list, used by the caller to drive updaters.
fn write_selection_set<'doc, Ctx>(
    store: &mut Store<Ctx>,
    selections: &'doc [Selection],
    entity_key: &str,
    result_map: &JsonMap<String, JsonValue>,
    variables: &JsonMap<String, JsonValue>,
    fragments: &FragmentMap<'doc>,
    ctx: &Ctx,
) -> Result<Vec<&'doc Node<Field>>> {
    if let Some(typename) = result_map.get("__typename") {
        store.write_record(entity_key, "__typename", typename.clone());
        store.add_dependency(entity_key);
    }

    let concrete_typename = result_map.get("__typename").and_then(JsonValue::as_str);
    let schema = store.schema_oracle();
    let mut applies = |type_condition: Option<&str>, _frag_selections: &'doc [Selection]| -> bool {
        let Some(type_condition) = type_condition else {
            return true;
        };
        match concrete_typename {
            Some(concrete) => match schema {
                Some(oracle) => oracle.is_interface_of_type(type_condition, concrete),
                None => concrete == type_condition,
            },
            // No concrete typename on this value: nothing to discriminate
            // against, so don't exclude the fragment.
            None => true,
        }
    };

    let fields = flatten_selections(selections, variables, fragments, &mut applies);
    for field in &fields {
        write_field(store, entity_key, field, result_map, variables, fragments, ctx)?;
    }
    Ok(fields)
}

fn write_field<'doc, Ctx>(
    store: &mut Store<Ctx>,
    entity_key: &str,
    field: &'doc Node<Field>,
    result_map: &JsonMap<String, JsonValue>,
    variables: &JsonMap<String, JsonValue>,
    fragments: &FragmentMap<'doc>,
    ctx: &Ctx,
) -> Result<()> {
    let Some(value) = result_map.get(response_key(field)) else {
        // The result tree doesn't carry this field at all; nothing to
        // normalize (§1: the core trusts the document/result pairing).
        return Ok(());
    };

    let args = field_arguments(field, variables);
    let field_key = key_of_field(field.name.as_str(), Some(&args));
    let full_key = join_keys(entity_key, &field_key);
    store.add_dependency(entity_key);

    if field.selection_set.is_empty() {
        store.write_record(entity_key, &field_key, value.clone());
        return Ok(());
    }

    let link = write_link_value(
        store,
        &full_key,
        value,
        &field.selection_set,
        variables,
        fragments,
        ctx,
    )?;
    store.write_link(&full_key, link);
    Ok(())
}

fn write_link_value<'doc, Ctx>(
    store: &mut Store<Ctx>,
    addressing_key: &str,
    value: &JsonValue,
    selections: &'doc [Selection],
    variables: &JsonMap<String, JsonValue>,
    fragments: &FragmentMap<'doc>,
    ctx: &Ctx,
) -> Result<Link> {
    match value {
        JsonValue::Null => Ok(Link::Null),
        JsonValue::Array(items) => {
            let mut links = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let indexed_key = join_keys(addressing_key, &index.to_string());
                links.push(write_link_value(
                    store,
                    &indexed_key,
                    item,
                    selections,
                    variables,
                    fragments,
                    ctx,
                )?);
            }
            Ok(Link::List(links))
        }
        JsonValue::Object(map) => {
            let child_key = store
                .key_of_entity(map)
                .unwrap_or_else(|| addressing_key.to_owned());
            write_selection_set(store, selections, &child_key, map, variables, fragments, ctx)?;
            Ok(Link::Key(child_key))
        }
        _scalar => {
            tracing::warn!(
                field = addressing_key,
                "scalar value written where a selection set was expected; dropping"
            );
            Ok(Link::Null)
        }
    }
}
