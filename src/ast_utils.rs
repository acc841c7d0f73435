//! AST utilities (§4.5, §4.1): selection-set accessors, field-argument
//! extraction with variable substitution, `@skip`/`@include` evaluation,
//! fragment lookup and flattening.

use std::collections::HashMap;

use apollo_compiler::ast::Definition;
use apollo_compiler::ast::Document;
use apollo_compiler::ast::Field;
use apollo_compiler::ast::FragmentDefinition;
use apollo_compiler::ast::OperationDefinition;
use apollo_compiler::ast::OperationType;
use apollo_compiler::ast::Selection;
use apollo_compiler::ast::Value as AstValue;
use apollo_compiler::Node;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::keys::ast_arguments_to_json;

pub type ParsedDocument = Document;

/// Maps fragment definition name to its node, built once per document.
pub struct FragmentMap<'doc> {
    by_name: HashMap<&'doc str, &'doc Node<FragmentDefinition>>,
}

impl<'doc> FragmentMap<'doc> {
    pub fn from_document(document: &'doc Document) -> Self {
        let mut by_name = HashMap::new();
        for definition in &document.definitions {
            if let Definition::FragmentDefinition(fragment) = definition {
                by_name.insert(fragment.name.as_str(), fragment);
            }
        }
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&'doc Node<FragmentDefinition>> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'doc str, &'doc Node<FragmentDefinition>)> + '_ {
        self.by_name.iter().map(|(k, v)| (*k, *v))
    }
}

/// Resolves the operation to execute: the one named `operation_name`, or the
/// sole operation in the document if `operation_name` is `None` and there is
/// exactly one.
pub fn find_operation<'doc>(
    document: &'doc Document,
    operation_name: Option<&str>,
) -> Option<&'doc Node<OperationDefinition>> {
    let mut operations = document.definitions.iter().filter_map(|def| match def {
        Definition::OperationDefinition(op) => Some(op),
        _ => None,
    });
    match operation_name {
        Some(name) => operations.find(|op| op.name.as_deref() == Some(name)),
        None => {
            let first = operations.next()?;
            if operations.next().is_none() {
                Some(first)
            } else {
                None
            }
        }
    }
}

/// The root key (`"Query"`/`"Mutation"`/`"Subscription"`) for an operation
/// kind.
pub fn root_key_for(operation_type: OperationType) -> &'static str {
    match operation_type {
        OperationType::Query => "Query",
        OperationType::Mutation => "Mutation",
        OperationType::Subscription => "Subscription",
    }
}

/// `getFieldArguments(fieldNode, variables)`: extracts a field's arguments as
/// a canonical JSON object with variables substituted.
pub fn field_arguments(
    field: &Field,
    variables: &JsonMap<String, JsonValue>,
) -> JsonMap<String, JsonValue> {
    ast_arguments_to_json(&field.arguments, variables)
}

/// The alias under which a field's value is stored in the result/record
/// (`alias` if present, else `name`).
pub fn response_key(field: &Field) -> &str {
    field.alias.as_deref().unwrap_or(&field.name)
}

/// Evaluates `@skip`/`@include` against `variables`; `true` means the field
/// or fragment should be omitted from traversal.
pub fn is_skipped(directives: &apollo_compiler::ast::DirectiveList, variables: &JsonMap<String, JsonValue>) -> bool {
    if let Some(skip) = directives.get("skip") {
        if directive_if_argument(skip, variables) {
            return true;
        }
    }
    if let Some(include) = directives.get("include") {
        if !directive_if_argument(include, variables) {
            return true;
        }
    }
    false
}

fn directive_if_argument(
    directive: &Node<apollo_compiler::ast::Directive>,
    variables: &JsonMap<String, JsonValue>,
) -> bool {
    let Some(argument) = directive
        .arguments
        .iter()
        .find(|arg| arg.name == "if")
    else {
        return false;
    };
    match argument.value.as_ref() {
        AstValue::Boolean(b) => *b,
        AstValue::Variable(name) => variables
            .get(name.as_str())
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
        _ => false,
    }
}

/// True iff `directives` contains a bare directive named `name` (used for
/// `@populate`, which takes no arguments).
pub fn has_directive(directives: &apollo_compiler::ast::DirectiveList, name: &str) -> bool {
    directives.get(name).is_some()
}

/// Flattens a selection set into an ordered list of field nodes, descending
/// transparently into fragment spreads and inline fragments, per §4.5.
///
/// `fragment_applies` decides, for a given type condition and the fragment's
/// own selection set, whether the fragment should be descended into at the
/// current position. `__typename` fields are omitted (handled once per
/// entity by the caller).
pub fn flatten_selections<'doc>(
    selections: &'doc [Selection],
    variables: &JsonMap<String, JsonValue>,
    fragments: &FragmentMap<'doc>,
    fragment_applies: &mut dyn FnMut(Option<&str>, &'doc [Selection]) -> bool,
) -> Vec<&'doc Node<Field>> {
    let mut out = Vec::new();
    for selection in selections.iter() {
        match selection {
            Selection::Field(field) => {
                if is_skipped(&field.directives, variables) {
                    continue;
                }
                if field.name == "__typename" {
                    continue;
                }
                out.push(field);
            }
            Selection::FragmentSpread(spread) => {
                if is_skipped(&spread.directives, variables) {
                    continue;
                }
                let Some(fragment) = fragments.get(spread.fragment_name.as_str()) else {
                    continue;
                };
                if fragment_applies(Some(fragment.type_condition.as_str()), &fragment.selection_set) {
                    out.extend(flatten_selections(
                        &fragment.selection_set,
                        variables,
                        fragments,
                        fragment_applies,
                    ));
                }
            }
            Selection::InlineFragment(inline) => {
                if is_skipped(&inline.directives, variables) {
                    continue;
                }
                let type_condition = inline.type_condition.as_ref().map(|t| t.as_str());
                if fragment_applies(type_condition, &inline.selection_set) {
                    out.extend(flatten_selections(
                        &inline.selection_set,
                        variables,
                        fragments,
                        fragment_applies,
                    ));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::ast::Document;

    fn parse(src: &str) -> Document {
        Document::parse(src, "test.graphql").expect("valid document")
    }

    #[test]
    fn finds_sole_operation() {
        let doc = parse("query { todos { id } }");
        assert!(find_operation(&doc, None).is_some());
    }

    #[test]
    fn finds_named_operation() {
        let doc = parse("query A { a } query B { b }");
        let op = find_operation(&doc, Some("B")).unwrap();
        assert_eq!(op.name.as_deref(), Some("B"));
    }

    #[test]
    fn skip_include_evaluate_against_variables() {
        let doc = parse("query($drop: Boolean!) { a @skip(if: $drop) }");
        let op = find_operation(&doc, None).unwrap();
        let Selection::Field(field) = &op.selection_set[0] else {
            panic!("expected field")
        };
        let mut vars = JsonMap::new();
        vars.insert("drop".into(), JsonValue::Bool(true));
        assert!(is_skipped(&field.directives, &vars));
        vars.insert("drop".into(), JsonValue::Bool(false));
        assert!(!is_skipped(&field.directives, &vars));
    }
}
