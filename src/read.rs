//! The read path (§4.4): traverses the selection set against the store,
//! honoring fragments, resolvers, schema-driven partial results, and
//! re-emitting dependencies.

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
use crate::keys::join_keys;
use crate::keys::key_of_field;
use crate::resolver::ResolverValue;
use crate::store::DependencySet;
use crate::store::Store;
use crate::value::Link;

/// `{ data, partial, dependencies }` from §4.4.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub data: Option<JsonValue>,
    pub partial: bool,
    pub dependencies: DependencySet,
}

/// Tries to satisfy `document`/`variables` from `store`.
pub fn read_operation<Ctx>(
    store: &Store<Ctx>,
    document: &ParsedDocument,
    operation_name: Option<&str>,
    variables: &JsonMap<String, JsonValue>,
    prior: Option<&JsonValue>,
    ctx: &Ctx,
) -> Result<ReadOutcome> {
    let operation = find_operation(document, operation_name).ok_or(CacheError::EmptyOperation)?;
    let root_key = root_key_for(operation.operation_type);
    let fragments = FragmentMap::from_document(document);
    let rc = ReadContext {
        store,
        variables,
        fragments: &fragments,
        ctx,
    };

    store.init_dependencies();
    let mut partial = false;

    let prior_map = prior.and_then(JsonValue::as_object).filter(|map| {
        map.get("__typename").is_some_and(JsonValue::is_string)
    });

    let data = if let Some(prior_map) = prior_map {
        read_root_merge(&rc, prior_map, &operation.selection_set, true, &mut partial)
    } else {
        read_entity(&rc, root_key, &operation.selection_set, true, &mut partial)
    };

    let dependencies = store.clear_dependencies();

    let data = match data {
        Some(map) if map.is_empty() && partial => None,
        Some(map) => Some(JsonValue::Object(map)),
        None => None,
    };

    Ok(ReadOutcome {
        data,
        partial,
        dependencies,
    })
}

struct ReadContext<'a, 'doc, Ctx> {
    store: &'a Store<Ctx>,
    variables: &'a JsonMap<String, JsonValue>,
    fragments: &'a FragmentMap<'doc>,
    ctx: &'a Ctx,
}

/// Normalized read: materializes `entity_key` against `selections`, honoring
/// resolvers and the partial-result discipline (§4.4 step 5). Returns `None`
/// if an uncached, non-nullable field poisoned the selection.
fn read_entity<'doc, Ctx>(
    rc: &ReadContext<'_, 'doc, Ctx>,
    entity_key: &str,
    selections: &'doc [Selection],
    is_root: bool,
    partial: &mut bool,
) -> Option<JsonMap<String, JsonValue>> {
    rc.store.add_dependency(entity_key);

    let typename = rc
        .store
        .get_record(entity_key, "__typename")
        .and_then(JsonValue::as_str)
        .map(str::to_owned);
    let typename_for_lookup = typename.clone().unwrap_or_else(|| entity_key.to_owned());

    let schema = rc.store.schema_oracle();
    let store = rc.store;
    let mut applies = |type_condition: Option<&str>, frag_selections: &'doc [Selection]| -> bool {
        let Some(type_condition) = type_condition else {
            return true;
        };
        match (schema, typename.as_deref()) {
            (Some(oracle), Some(concrete)) => oracle.is_interface_of_type(type_condition, concrete),
            (Some(_), None) => true,
            (None, concrete) => {
                if concrete == Some(type_condition) {
                    true
                } else {
                    heuristic_fragment_matches(
                        frag_selections,
                        rc.variables,
                        rc.fragments,
                        entity_key,
                        store,
                    )
                }
            }
        }
    };

    let fields = flatten_selections(selections, rc.variables, rc.fragments, &mut applies);

    let mut data = JsonMap::new();
    if let Some(typename) = &typename {
        data.insert("__typename".to_owned(), JsonValue::String(typename.clone()));
    }

    for field in fields {
        let args = field_arguments(field, rc.variables);
        let field_key = key_of_field(field.name.as_str(), Some(&args));
        let full_key = join_keys(entity_key, &field_key);
        let alias = response_key(field).to_owned();

        if is_root {
            rc.store.add_dependency(full_key.clone());
        }

        let outcome = read_field(rc, entity_key, &typename_for_lookup, field, &field_key, &full_key, &args, partial);
        match outcome {
            FieldOutcome::Value(value) => {
                data.insert(alias, value);
            }
            FieldOutcome::Missing => {
                if !tolerate_miss(rc, &typename_for_lookup, field.name.as_str(), partial) {
                    return None;
                }
                data.insert(alias, JsonValue::Null);
            }
        }
    }

    Some(data)
}

enum FieldOutcome {
    Value(JsonValue),
    Missing,
}

fn tolerate_miss<Ctx>(
    rc: &ReadContext<'_, '_, Ctx>,
    typename: &str,
    field_name: &str,
    partial: &mut bool,
) -> bool {
    match rc.store.schema_oracle() {
        Some(oracle) if oracle.is_field_nullable(typename, field_name) => {
            *partial = true;
            true
        }
        _ => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn read_field<'doc, Ctx>(
    rc: &ReadContext<'_, 'doc, Ctx>,
    entity_key: &str,
    typename_for_lookup: &str,
    field: &'doc Node<Field>,
    field_key: &str,
    full_key: &str,
    args: &JsonMap<String, JsonValue>,
    partial: &mut bool,
) -> FieldOutcome {
    if let Some(resolver) = rc.store.resolver_for(typename_for_lookup, field.name.as_str()) {
        let mut parent = JsonMap::new();
        if let Some(raw) = rc.store.get_record(entity_key, field_key) {
            parent.insert(response_key(field).to_owned(), raw.clone());
        }
        let resolved = resolver.resolve(&parent, args, &rc.store.view(), rc.ctx);
        return read_resolved(rc, full_key, field, resolved, partial);
    }

    if field.selection_set.is_empty() {
        return match rc.store.get_record(entity_key, field_key) {
            Some(value) => FieldOutcome::Value(value.clone()),
            None => FieldOutcome::Missing,
        };
    }

    match rc.store.get_link(full_key) {
        Some(Link::Null) => FieldOutcome::Value(JsonValue::Null),
        Some(link) => read_link(rc, link, &field.selection_set, partial),
        None => match rc.store.get_record(entity_key, field_key) {
            // Legacy path: a nested mapping stored directly in the record
            // rather than as a link (§4.4 step 4, final bullet).
            Some(value @ JsonValue::Object(_)) => FieldOutcome::Value(value.clone()),
            _ => FieldOutcome::Missing,
        },
    }
}

fn read_link<'doc, Ctx>(
    rc: &ReadContext<'_, 'doc, Ctx>,
    link: &Link,
    selections: &'doc [Selection],
    partial: &mut bool,
) -> FieldOutcome {
    match link {
        Link::Null => FieldOutcome::Value(JsonValue::Null),
        Link::Key(child_key) => match read_entity(rc, child_key, selections, false, partial) {
            Some(nested) => FieldOutcome::Value(JsonValue::Object(nested)),
            None => FieldOutcome::Missing,
        },
        Link::List(items) => {
            let mut array = Vec::with_capacity(items.len());
            for item in items {
                match read_link(rc, item, selections, partial) {
                    FieldOutcome::Value(value) => array.push(value),
                    FieldOutcome::Missing => return FieldOutcome::Missing,
                }
            }
            FieldOutcome::Value(JsonValue::Array(array))
        }
    }
}

fn read_resolved<'doc, Ctx>(
    rc: &ReadContext<'_, 'doc, Ctx>,
    full_key: &str,
    field: &'doc Node<Field>,
    resolved: ResolverValue,
    partial: &mut bool,
) -> FieldOutcome {
    match resolved {
        ResolverValue::Missing => FieldOutcome::Missing,
        ResolverValue::Scalar(value) => {
            if field.selection_set.is_empty() {
                FieldOutcome::Value(value)
            } else if value.is_null() {
                FieldOutcome::Value(JsonValue::Null)
            } else {
                tracing::warn!(
                    field = full_key,
                    "resolver returned a scalar where a selection set was expected"
                );
                FieldOutcome::Missing
            }
        }
        ResolverValue::EntityRef(key) => {
            match read_entity(rc, &key, &field.selection_set, false, partial) {
                Some(nested) => FieldOutcome::Value(JsonValue::Object(nested)),
                None => FieldOutcome::Missing,
            }
        }
        ResolverValue::Embedded(map) => {
            let child_key = rc.store.key_of_entity(&map).unwrap_or_else(|| full_key.to_owned());
            match read_entity(rc, &child_key, &field.selection_set, false, partial) {
                Some(nested) => FieldOutcome::Value(JsonValue::Object(nested)),
                None => FieldOutcome::Missing,
            }
        }
        ResolverValue::List(items) => {
            let mut array = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                let indexed_key = join_keys(full_key, &index.to_string());
                match read_resolved_item(rc, &indexed_key, field, item, partial) {
                    FieldOutcome::Value(value) => array.push(value),
                    FieldOutcome::Missing => return FieldOutcome::Missing,
                }
            }
            FieldOutcome::Value(JsonValue::Array(array))
        }
    }
}

fn read_resolved_item<'doc, Ctx>(
    rc: &ReadContext<'_, 'doc, Ctx>,
    indexed_key: &str,
    field: &'doc Node<Field>,
    item: ResolverValue,
    partial: &mut bool,
) -> FieldOutcome {
    match item {
        ResolverValue::EntityRef(key) => match read_entity(rc, &key, &field.selection_set, false, partial) {
            Some(nested) => FieldOutcome::Value(JsonValue::Object(nested)),
            None => FieldOutcome::Missing,
        },
        ResolverValue::Embedded(map) => {
            let child_key = rc
                .store
                .key_of_entity(&map)
                .unwrap_or_else(|| indexed_key.to_owned());
            match read_entity(rc, &child_key, &field.selection_set, false, partial) {
                Some(nested) => FieldOutcome::Value(JsonValue::Object(nested)),
                None => FieldOutcome::Missing,
            }
        }
        other => read_resolved(rc, indexed_key, field, other, partial),
    }
}

/// No-schema fragment heuristic (§4.5): a fragment applies if every field it
/// selects is already present in the store under the current entity key.
fn heuristic_fragment_matches<'doc, Ctx>(
    selections: &'doc [Selection],
    variables: &JsonMap<String, JsonValue>,
    fragments: &FragmentMap<'doc>,
    entity_key: &str,
    store: &Store<Ctx>,
) -> bool {
    let mut always = |_: Option<&str>, _: &'doc [Selection]| true;
    let fields = flatten_selections(selections, variables, fragments, &mut always);
    fields.into_iter().all(|field| {
        let args = field_arguments(field, variables);
        let field_key = key_of_field(field.name.as_str(), Some(&args));
        store.has_field(entity_key, &field_key)
    })
}

/// Root-merge read (§4.4 step 3): preserves the shape of `prior`, refreshing
/// only the sub-fields whose values resolve against real (keyed) entities.
/// Fields whose prior value has no discoverable entity key are returned
/// verbatim, since there's nothing in the store to refresh them against.
fn read_root_merge<'doc, Ctx>(
    rc: &ReadContext<'_, 'doc, Ctx>,
    prior_map: &JsonMap<String, JsonValue>,
    selections: &'doc [Selection],
    is_root: bool,
    partial: &mut bool,
) -> Option<JsonMap<String, JsonValue>> {
    let root_typename = prior_map.get("__typename").and_then(JsonValue::as_str);
    let entity_key = root_typename.map(str::to_owned).unwrap_or_default();
    if !entity_key.is_empty() {
        rc.store.add_dependency(entity_key.clone());
    }

    let mut always = |_: Option<&str>, _: &'doc [Selection]| true;
    let fields = flatten_selections(selections, rc.variables, rc.fragments, &mut always);

    let mut data = JsonMap::new();
    if let Some(typename) = root_typename {
        data.insert("__typename".to_owned(), JsonValue::String(typename.to_owned()));
    }

    for field in fields {
        let alias = response_key(field).to_owned();
        let args = field_arguments(field, rc.variables);
        let field_key = key_of_field(field.name.as_str(), Some(&args));
        if is_root && !entity_key.is_empty() {
            rc.store.add_dependency(join_keys(&entity_key, &field_key));
        }

        let prior_value = prior_map.get(&alias);
        let merged = match prior_value {
            None | Some(JsonValue::Null) => prior_value.cloned().unwrap_or(JsonValue::Null),
            Some(value) if field.selection_set.is_empty() => value.clone(),
            Some(JsonValue::Object(child)) => {
                match refresh_object(rc, child, &field.selection_set, partial) {
                    Some(refreshed) => refreshed,
                    None => return None,
                }
            }
            Some(JsonValue::Array(items)) => {
                let mut array = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        JsonValue::Object(child) => match refresh_object(rc, child, &field.selection_set, partial) {
                            Some(refreshed) => array.push(refreshed),
                            None => return None,
                        },
                        other => array.push(other.clone()),
                    }
                }
                JsonValue::Array(array)
            }
            Some(other) => other.clone(),
        };
        data.insert(alias, merged);
    }

    Some(data)
}

fn refresh_object<'doc, Ctx>(
    rc: &ReadContext<'_, 'doc, Ctx>,
    child: &JsonMap<String, JsonValue>,
    selections: &'doc [Selection],
    partial: &mut bool,
) -> Option<JsonValue> {
    match rc.store.key_of_entity(child) {
        Some(key) => read_entity(rc, &key, selections, false, partial).map(JsonValue::Object),
        None => Some(JsonValue::Object(child.clone())),
    }
}
