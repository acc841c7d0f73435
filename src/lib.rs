//! `graphcache-core`: a normalized, in-memory GraphQL document cache.
//!
//! The crate has four collaborating subsystems, one module each:
//!
//! - [`store`]: the normalized record/link table, the resolver and updater
//!   registries, and the schema oracle slot.
//! - [`write`]: normalizes an operation's result into the store.
//! - [`read`]: materializes an operation's data back out of the store,
//!   honoring resolvers, fragments, and schema-driven partial results.
//! - [`populate`]: rewrites `@populate`-annotated mutation/subscription
//!   fields to request the shapes active queries currently need.
//!
//! None of these subsystems parse GraphQL themselves; documents are parsed
//! with `apollo_compiler::ast::Document::parse` and handed in by the caller,
//! which also owns the transport, scheduling, and any schema-introspection
//! step that produces a [`schema::SchemaOracle`].

pub mod ast_utils;
pub mod error;
pub mod keys;
pub mod populate;
pub mod read;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod value;
pub mod write;

pub use ast_utils::ParsedDocument;
pub use error::CacheError;
pub use error::Result;
pub use keys::key_of_entity;
pub use keys::key_of_field;
pub use keys::join_keys;
pub use keys::EntityKey;
pub use keys::FieldKey;
pub use populate::PopulateTransform;
pub use read::read_operation;
pub use read::ReadOutcome;
pub use resolver::Resolver;
pub use resolver::ResolverValue;
pub use resolver::Updater;
#[cfg(feature = "schema-oracle")]
pub use schema::ApolloSchemaOracle;
pub use schema::SchemaOracle;
pub use store::CacheFacade;
pub use store::DependencySet;
pub use store::Store;
pub use store::StoreBuilder;
pub use store::StoreView;
pub use value::Link;
pub use write::write_operation;
