//! The schema oracle (§4, §6): an optional collaborator the core consults
//! for nullability and abstract-type membership. The core never builds one
//! from a raw introspection response — it accepts a validated schema,
//! typically produced upstream from introspection (see DESIGN.md).
//!
//! The [`SchemaOracle`] trait itself is always available — `Store` holds an
//! `Option<Arc<dyn SchemaOracle>>` regardless of features, since §6 makes the
//! oracle optional at the type level, not a compile-time toggle. The
//! `apollo-compiler`-backed implementation, [`ApolloSchemaOracle`], is gated
//! behind the `schema-oracle` feature (on by default) for callers who supply
//! their own oracle and would rather not carry `apollo_compiler::validation`
//! in their dependency graph.

#[cfg(feature = "schema-oracle")]
use apollo_compiler::schema::ExtendedType;
#[cfg(feature = "schema-oracle")]
use apollo_compiler::validation::Valid;
#[cfg(feature = "schema-oracle")]
use apollo_compiler::Schema;

/// `isFieldNullable` / `isInterfaceOfType` from §6.
pub trait SchemaOracle: Send + Sync {
    /// True when `field_name` on `typename` is a nullable field.
    fn is_field_nullable(&self, typename: &str, field_name: &str) -> bool;

    /// True when `concrete` satisfies `type_condition` as a GraphQL type
    /// condition: identical typename, or `concrete` implements/participates
    /// in the interface/union named by `type_condition`.
    fn is_interface_of_type(&self, type_condition: &str, concrete: &str) -> bool;

    /// The named return type of `field_name` on `typename`, with `List`/
    /// `NonNull` wrappers stripped. Used by the populate transform to
    /// resolve a mutation field's return type.
    fn field_return_type(&self, typename: &str, field_name: &str) -> Option<String>;

    /// Expands `typename` into the concrete object typenames it can be at
    /// runtime: itself if already concrete, or every implementor/member if
    /// it names an interface or union.
    fn concrete_types_of(&self, typename: &str) -> Vec<String>;
}

/// A [`SchemaOracle`] backed by a validated `apollo-compiler` schema.
#[cfg(feature = "schema-oracle")]
pub struct ApolloSchemaOracle {
    schema: Valid<Schema>,
}

#[cfg(feature = "schema-oracle")]
impl ApolloSchemaOracle {
    pub fn new(schema: Valid<Schema>) -> Self {
        Self { schema }
    }

    fn field_type(&self, typename: &str, field_name: &str) -> Option<&apollo_compiler::ast::Type> {
        match self.schema.types.get(typename)? {
            ExtendedType::Object(object) => object.fields.get(field_name).map(|f| &f.ty),
            ExtendedType::Interface(iface) => iface.fields.get(field_name).map(|f| &f.ty),
            _ => None,
        }
    }
}

#[cfg(feature = "schema-oracle")]
impl SchemaOracle for ApolloSchemaOracle {
    fn is_field_nullable(&self, typename: &str, field_name: &str) -> bool {
        match self.field_type(typename, field_name) {
            Some(ty) => !ty.is_non_null(),
            // Unknown field: conservatively treat as non-nullable so a read
            // doesn't silently paper over a schema/document mismatch.
            None => false,
        }
    }

    fn is_interface_of_type(&self, type_condition: &str, concrete: &str) -> bool {
        if type_condition == concrete {
            return true;
        }
        match self.schema.types.get(type_condition) {
            Some(ExtendedType::Interface(_)) => self
                .schema
                .implementers_map()
                .get(type_condition)
                .is_some_and(|implementers| {
                    implementers.objects.iter().any(|name| name == concrete)
                        || implementers.interfaces.iter().any(|name| name == concrete)
                }),
            Some(ExtendedType::Union(union_)) => {
                union_.members.iter().any(|member| member.name == concrete)
            }
            _ => false,
        }
    }

    fn field_return_type(&self, typename: &str, field_name: &str) -> Option<String> {
        self.field_type(typename, field_name)
            .map(|ty| ty.inner_named_type().to_string())
    }

    fn concrete_types_of(&self, typename: &str) -> Vec<String> {
        match self.schema.types.get(typename) {
            Some(ExtendedType::Object(_)) => vec![typename.to_owned()],
            Some(ExtendedType::Interface(_)) => self
                .schema
                .implementers_map()
                .get(typename)
                .map(|implementers| implementers.objects.iter().map(|n| n.to_string()).collect())
                .unwrap_or_default(),
            Some(ExtendedType::Union(union_)) => {
                union_.members.iter().map(|m| m.name.to_string()).collect()
            }
            _ => Vec::new(),
        }
    }
}
