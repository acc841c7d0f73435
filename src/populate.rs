//! The query-populate transform (§4.6): observes active queries' concrete
//! shapes per typename, then rewrites `@populate`-annotated mutation and
//! subscription fields to request those shapes back.
//!
//! The transform never touches the store directly — it only produces
//! rewritten documents. It needs a [`SchemaOracle`] to resolve a field's
//! return type and expand interfaces/unions into concrete object types;
//! without one, every `@populate` field falls back to a bare `__typename`
//! selection (§4.6 "no schema" case).

use apollo_compiler::ast::Definition;
use apollo_compiler::ast::Document;
use apollo_compiler::ast::Field;
use apollo_compiler::ast::FragmentDefinition;
use apollo_compiler::ast::FragmentSpread;
use apollo_compiler::ast::OperationDefinition;
use apollo_compiler::ast::Selection;
use apollo_compiler::Name;
use apollo_compiler::Node;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::ast_utils::has_directive;
use crate::ast_utils::root_key_for;
use crate::ast_utils::ParsedDocument;
use crate::error::CacheError;
use crate::error::Result;
use crate::schema::SchemaOracle;

/// One query operation's contribution to the active set: the typenames its
/// selections reach, keyed by the operation's own identity (§4.6 "observing
/// a query").
#[derive(Default, Clone)]
struct ObservedQuery {
    /// typename -> the fragments this query contributed for that typename.
    fragments_by_type: IndexMap<String, Vec<Node<FragmentDefinition>>>,
}

/// Tracks every observed query's contribution and the synthesized fragments
/// they've produced, so `@populate` fields can be rewritten deterministically
/// and a torn-down query's fragments can be withdrawn again.
///
/// Grounded on the teacher's `api_schema.rs`/`merge.rs` pattern of
/// hand-constructing `Node<...>` AST literals, and on the "populate" design
/// in §4.6.
#[derive(Default)]
pub struct PopulateTransform {
    observed: IndexMap<String, ObservedQuery>,
    /// typename -> fragment name -> (fragment, origin query key), merged
    /// across every currently-observed query, in first-seen order.
    active_by_type: IndexMap<String, IndexMap<String, (Node<FragmentDefinition>, String)>>,
    /// `userFragments` (§4.6): every fragment definition name seen across any
    /// observed query's document, so a user fragment spread inside a
    /// synthesized fragment (itself copied verbatim from the query's
    /// selection, per S3) can still be reattached to the rewritten mutation
    /// even though the mutation document never defined it itself. Accumulates
    /// for the transform's lifetime; a name that's since fallen out of every
    /// live query's selections is simply never referenced by a rewrite, so
    /// leaving it here is harmless.
    user_fragments: IndexMap<String, Node<FragmentDefinition>>,
}

impl PopulateTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the concrete shape `document`'s operation `operation_name`
    /// requests for each typename it touches, keyed under `query_key` (a
    /// caller-chosen stable identity for this query, e.g. its operation
    /// name or a hash of its source text).
    ///
    /// For every selection set whose parent field's return type resolves
    /// (via `schema`) to one or more concrete object types, a fragment named
    /// `<Typename>_PopulateFragment_<query_key>` is synthesized from that
    /// selection set and filed under each concrete typename it can apply to.
    /// Re-observing the same `query_key` replaces its prior contribution.
    pub fn observe_query(
        &mut self,
        query_key: &str,
        document: &ParsedDocument,
        operation_name: Option<&str>,
        schema: &dyn SchemaOracle,
    ) {
        self.teardown_query(query_key);

        let Some(operation) = find_operation_named(document, operation_name) else {
            return;
        };
        let root_type = root_key_for(operation.operation_type).to_owned();
        let mut observed = ObservedQuery::default();
        let mut site = 0usize;
        collect_fragments(
            &root_type,
            &operation.selection_set,
            query_key,
            schema,
            &mut site,
            &mut observed,
        );

        for (typename, fragments) in &observed.fragments_by_type {
            let slot = self.active_by_type.entry(typename.clone()).or_default();
            for fragment in fragments {
                slot.insert(fragment.name.to_string(), (fragment.clone(), query_key.to_owned()));
            }
        }
        for definition in &document.definitions {
            if let Definition::FragmentDefinition(fragment) = definition {
                self.user_fragments
                    .insert(fragment.name.to_string(), fragment.clone());
            }
        }
        self.observed.insert(query_key.to_owned(), observed);
    }

    /// Withdraws a previously observed query's contribution. A no-op if
    /// `query_key` was never observed (or was already torn down).
    pub fn teardown_query(&mut self, query_key: &str) {
        let Some(observed) = self.observed.shift_remove(query_key) else {
            return;
        };
        for (typename, fragments) in observed.fragments_by_type {
            if let Some(slot) = self.active_by_type.get_mut(&typename) {
                for fragment in fragments {
                    slot.shift_remove(fragment.name.as_str());
                }
                if slot.is_empty() {
                    self.active_by_type.shift_remove(&typename);
                }
            }
        }
    }

    /// Rewrites every `@populate`-directed field in `document`'s operation
    /// `operation_name`: its selection set is replaced by fragment spreads
    /// for each concrete type its return type can take (merged with its own
    /// user-written selections), falling back to a bare `__typename` field
    /// if no fragments currently apply. Synthesized and user fragment
    /// definitions referenced by the rewrite are appended to the returned
    /// document. Returns `Ok(None)` if `operation_name` does not resolve, and
    /// `Err(CacheError::UnresolvableReturnType)` if a `@populate` field's
    /// return type can't be resolved against `schema` (§7: this is the one
    /// case where the core treats a schema/document mismatch as an error
    /// rather than a fallback, since populate has no sensible selection to
    /// fall back to without knowing what it's fanning out over).
    pub fn rewrite_document(
        &self,
        document: &ParsedDocument,
        operation_name: Option<&str>,
        schema: &dyn SchemaOracle,
    ) -> Result<Option<Document>> {
        let Some(operation) = find_operation_named(document, operation_name) else {
            return Ok(None);
        };
        let root_type = root_key_for(operation.operation_type).to_owned();

        let mut used_fragments = IndexSet::new();
        let mut new_selection_set = Vec::with_capacity(operation.selection_set.len());
        for selection in &operation.selection_set {
            new_selection_set.push(self.rewrite_selection(
                &root_type,
                selection,
                schema,
                &mut used_fragments,
            )?);
        }

        let mut new_operation = (**operation).clone();
        new_operation.selection_set = new_selection_set;

        let mut out = Document::new();
        out.definitions.push(Definition::OperationDefinition(Node::new(new_operation)));

        // Fragments reachable only through a spread *inside* a synthesized
        // fragment's own body (S3: a synthesized fragment spreads a user
        // fragment the query wrote) aren't in `used_fragments` yet, since
        // `rewrite_selection` never descends into synthesized fragment
        // bodies. Close over them before emitting anything.
        self.close_transitive_fragments(document, &mut used_fragments);

        // User fragments the rewritten selection set still references,
        // whether defined in this document or accumulated from an observed
        // query's document (`userFragments`, §4.6).
        let mut emitted = IndexSet::new();
        for definition in &document.definitions {
            if let Definition::FragmentDefinition(fragment) = definition {
                if used_fragments.contains(fragment.name.as_str()) && emitted.insert(fragment.name.to_string()) {
                    out.definitions.push(Definition::FragmentDefinition(fragment.clone()));
                }
            }
        }
        for (name, fragment) in &self.user_fragments {
            if used_fragments.contains(name.as_str()) && emitted.insert(name.clone()) {
                out.definitions.push(Definition::FragmentDefinition(fragment.clone()));
            }
        }
        // Synthesized fragments, in deterministic typename-then-key order.
        for typename in self.active_by_type.keys() {
            let Some(slot) = self.active_by_type.get(typename) else {
                continue;
            };
            for (name, (fragment, _origin)) in slot {
                if used_fragments.contains(name.as_str()) && emitted.insert(name.clone()) {
                    out.definitions.push(Definition::FragmentDefinition(fragment.clone()));
                }
            }
        }
        Ok(Some(out))
    }

    /// Expands `used` to a fixed point: any fragment spread reachable from a
    /// fragment already in `used` (synthesized, user-defined in `document`,
    /// or accumulated in `self.user_fragments`) is added too.
    fn close_transitive_fragments(&self, document: &Document, used: &mut IndexSet<String>) {
        loop {
            let mut newly_found = Vec::new();
            for name in used.iter() {
                if let Some(selections) = self.fragment_body(document, name) {
                    collect_spread_names(selections, &mut newly_found);
                }
            }
            let mut added = false;
            for name in newly_found {
                added |= used.insert(name);
            }
            if !added {
                break;
            }
        }
    }

    fn fragment_body<'a>(&'a self, document: &'a Document, name: &str) -> Option<&'a [Selection]> {
        if let Some((fragment, _origin)) = self
            .active_by_type
            .values()
            .find_map(|slot| slot.get(name))
        {
            return Some(&fragment.selection_set);
        }
        if let Some(fragment) = self.user_fragments.get(name) {
            return Some(&fragment.selection_set);
        }
        document.definitions.iter().find_map(|definition| match definition {
            Definition::FragmentDefinition(fragment) if fragment.name.as_str() == name => {
                Some(fragment.selection_set.as_slice())
            }
            _ => None,
        })
    }

    fn rewrite_selection(
        &self,
        parent_type: &str,
        selection: &Selection,
        schema: &dyn SchemaOracle,
        used_fragments: &mut IndexSet<String>,
    ) -> Result<Selection> {
        match selection {
            Selection::Field(field) if has_directive(&field.directives, "populate") => {
                Ok(Selection::Field(Node::new(self.rewrite_populate_field(
                    parent_type,
                    field,
                    schema,
                    used_fragments,
                )?)))
            }
            Selection::Field(field) => {
                let mut rewritten = (**field).clone();
                let Some(return_type) = schema.field_return_type(parent_type, field.name.as_str())
                else {
                    return Ok(Selection::Field(Node::new(rewritten)));
                };
                rewritten.selection_set = field
                    .selection_set
                    .iter()
                    .map(|s| self.rewrite_selection(&return_type, s, schema, used_fragments))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Selection::Field(Node::new(rewritten)))
            }
            Selection::InlineFragment(inline) => {
                let type_condition = inline
                    .type_condition
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| parent_type.to_owned());
                let mut rewritten = (**inline).clone();
                rewritten.selection_set = inline
                    .selection_set
                    .iter()
                    .map(|s| self.rewrite_selection(&type_condition, s, schema, used_fragments))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Selection::InlineFragment(Node::new(rewritten)))
            }
            Selection::FragmentSpread(spread) => {
                used_fragments.insert(spread.fragment_name.to_string());
                Ok(Selection::FragmentSpread(spread.clone()))
            }
        }
    }

    /// Builds the replacement selection set for an `@populate` field: one
    /// fragment spread per concrete type its return type resolves to (for
    /// whichever of those types have active synthesized fragments), plus the
    /// field's own user-written selections verbatim. Falls back to a bare
    /// `__typename` if nothing applies. Errors if the field's return type
    /// can't be resolved against `schema` at all (§7).
    fn rewrite_populate_field(
        &self,
        parent_type: &str,
        field: &Field,
        schema: &dyn SchemaOracle,
        used_fragments: &mut IndexSet<String>,
    ) -> Result<Field> {
        let mut rewritten = field.clone();
        let return_type = schema.field_return_type(parent_type, field.name.as_str()).ok_or_else(|| {
            CacheError::UnresolvableReturnType {
                typename: parent_type.to_owned(),
                field: field.name.to_string(),
            }
        })?;
        let concrete_types = schema.concrete_types_of(&return_type);

        let mut spreads = Vec::new();
        for typename in &concrete_types {
            let Some(slot) = self.active_by_type.get(typename) else {
                continue;
            };
            for name in slot.keys() {
                used_fragments.insert(name.clone());
                spreads.push(Selection::FragmentSpread(Node::new(FragmentSpread {
                    fragment_name: unchecked_name(name),
                    directives: Default::default(),
                })));
            }
        }

        let mut new_selection_set: Vec<Selection> = field.selection_set.clone();
        new_selection_set.extend(spreads);
        if new_selection_set.is_empty() {
            new_selection_set.push(Selection::Field(Node::new(Field {
                alias: None,
                name: unchecked_name("__typename"),
                arguments: Vec::new(),
                directives: Default::default(),
                selection_set: Vec::new(),
            })));
        }
        rewritten.selection_set = new_selection_set;
        Ok(rewritten)
    }
}

/// Descends `selections`, synthesizing one fragment per selection set whose
/// parent field resolves to a concrete object type (directly, or via
/// interface/union expansion), and recursing into nested selections under
/// their own return type.
///
/// `site` numbers each synthesized-fragment *site* (not each fragment) so
/// that a query touching the same typename through two different selection
/// sets gets two distinct fragment names rather than a name collision.
fn collect_fragments(
    parent_type: &str,
    selections: &[Selection],
    query_key: &str,
    schema: &dyn SchemaOracle,
    site: &mut usize,
    observed: &mut ObservedQuery,
) {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                if field.selection_set.is_empty() {
                    continue;
                }
                let Some(return_type) = schema.field_return_type(parent_type, field.name.as_str())
                else {
                    continue;
                };
                let concrete_types = schema.concrete_types_of(&return_type);
                if !concrete_types.is_empty() {
                    let key = format!("{query_key}_{site}");
                    *site += 1;
                    for concrete in concrete_types {
                        let fragment_name = format!("{concrete}_PopulateFragment_{key}");
                        let fragment = Node::new(FragmentDefinition {
                            name: unchecked_name(&fragment_name),
                            type_condition: unchecked_name(&concrete),
                            directives: Default::default(),
                            selection_set: field.selection_set.clone(),
                        });
                        observed
                            .fragments_by_type
                            .entry(concrete)
                            .or_default()
                            .push(fragment);
                    }
                }
                collect_fragments(&return_type, &field.selection_set, query_key, schema, site, observed);
            }
            Selection::InlineFragment(inline) => {
                let type_condition = inline
                    .type_condition
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| parent_type.to_owned());
                collect_fragments(&type_condition, &inline.selection_set, query_key, schema, site, observed);
            }
            // User fragment spreads aren't descended into here: their
            // shapes are whatever the user already wrote, not something
            // populate needs to synthesize a copy of.
            Selection::FragmentSpread(_) => {}
        }
    }
}

/// Collects every fragment-spread name reachable from `selections`, descending
/// through inline fragments and nested field selections (but not through
/// other fragment spreads — the caller iterates to a fixed point for that).
fn collect_spread_names(selections: &[Selection], out: &mut Vec<String>) {
    for selection in selections {
        match selection {
            Selection::FragmentSpread(spread) => out.push(spread.fragment_name.to_string()),
            Selection::InlineFragment(inline) => collect_spread_names(&inline.selection_set, out),
            Selection::Field(field) => collect_spread_names(&field.selection_set, out),
        }
    }
}

fn find_operation_named<'doc>(
    document: &'doc Document,
    operation_name: Option<&str>,
) -> Option<&'doc Node<OperationDefinition>> {
    crate::ast_utils::find_operation(document, operation_name)
}

fn unchecked_name(value: &str) -> Name {
    Name::new_unchecked(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::ast::Document;
    use std::collections::HashMap;

    struct FakeSchema {
        field_types: HashMap<(&'static str, &'static str), &'static str>,
        concrete: HashMap<&'static str, Vec<&'static str>>,
    }

    impl SchemaOracle for FakeSchema {
        fn is_field_nullable(&self, _typename: &str, _field_name: &str) -> bool {
            true
        }

        fn is_interface_of_type(&self, type_condition: &str, concrete: &str) -> bool {
            type_condition == concrete
        }

        fn field_return_type(&self, typename: &str, field_name: &str) -> Option<String> {
            self.field_types
                .get(&(typename, field_name))
                .map(|s| s.to_string())
        }

        fn concrete_types_of(&self, typename: &str) -> Vec<String> {
            self.concrete
                .get(typename)
                .cloned()
                .unwrap_or_else(|| vec![typename.to_owned()])
                .into_iter()
                .map(String::from)
                .collect()
        }
    }

    fn schema() -> FakeSchema {
        let mut field_types = HashMap::new();
        field_types.insert(("Query", "todos"), "Todo");
        field_types.insert(("Mutation", "addTodo"), "Todo");
        let mut concrete = HashMap::new();
        concrete.insert("Todo", vec!["Todo"]);
        FakeSchema { field_types, concrete }
    }

    fn parse(src: &str) -> Document {
        Document::parse(src, "test.graphql").expect("valid document")
    }

    #[test]
    fn observe_then_populate_spreads_synthesized_fragment() {
        let schema = schema();
        let query = parse("query Todos { todos { id text } }");
        let mutation = parse("mutation Add { addTodo @populate { id } }");

        let mut transform = PopulateTransform::new();
        transform.observe_query("Todos", &query, None, &schema);

        let rewritten = transform
            .rewrite_document(&mutation, None, &schema)
            .expect("rewrite succeeds")
            .expect("operation found");

        let op = find_operation_named(&rewritten, None).unwrap();
        let Selection::Field(field) = &op.selection_set[0] else {
            panic!("expected field")
        };
        let spread_names: Vec<_> = field
            .selection_set
            .iter()
            .filter_map(|s| match s {
                Selection::FragmentSpread(spread) => Some(spread.fragment_name.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(spread_names, vec!["Todo_PopulateFragment_Todos_0".to_string()]);

        let fragment_names: Vec<_> = rewritten
            .definitions
            .iter()
            .filter_map(|d| match d {
                Definition::FragmentDefinition(f) => Some(f.name.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(fragment_names, vec!["Todo_PopulateFragment_Todos_0".to_string()]);
    }

    #[test]
    fn teardown_removes_contributed_fragment() {
        let schema = schema();
        let query = parse("query Todos { todos { id text } }");
        let mutation = parse("mutation Add { addTodo @populate { id } }");

        let mut transform = PopulateTransform::new();
        transform.observe_query("Todos", &query, None, &schema);
        transform.teardown_query("Todos");

        let rewritten = transform
            .rewrite_document(&mutation, None, &schema)
            .expect("rewrite succeeds")
            .expect("operation found");
        let op = find_operation_named(&rewritten, None).unwrap();
        let Selection::Field(field) = &op.selection_set[0] else {
            panic!("expected field")
        };
        // No active fragments: falls back to a bare __typename.
        assert_eq!(field.selection_set.len(), 1);
        let Selection::Field(inner) = &field.selection_set[0] else {
            panic!("expected field")
        };
        assert_eq!(inner.name.as_str(), "__typename");
    }

    #[test]
    fn populate_with_no_active_queries_falls_back_to_typename() {
        let schema = schema();
        let mutation = parse("mutation Add { addTodo @populate { id } }");
        let transform = PopulateTransform::new();

        let rewritten = transform
            .rewrite_document(&mutation, None, &schema)
            .expect("rewrite succeeds")
            .expect("operation found");
        let op = find_operation_named(&rewritten, None).unwrap();
        let Selection::Field(field) = &op.selection_set[0] else {
            panic!("expected field")
        };
        assert_eq!(field.selection_set.len(), 1);
    }
}
