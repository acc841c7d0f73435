//! The normalized store (§3, §4.2): records, links, resolvers, updaters, and
//! the dependency-tracking side channel.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::IndexSet;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::keys::key_of_entity;
use crate::keys::EntityKey;
use crate::keys::FieldKey;
use crate::resolver::Resolver;
use crate::resolver::Updater;
use crate::schema::SchemaOracle;
use crate::value::Link;

/// The three GraphQL operation roots a document can target.
pub const ROOT_KEYS: [&str; 3] = ["Query", "Mutation", "Subscription"];

/// A captured dependency set, in first-touched order (§3 "Dependencies").
pub type DependencySet = IndexSet<String>;

/// mapping from entity key to its flat field-key -> scalar record.
type RecordTable = IndexMap<EntityKey, IndexMap<FieldKey, JsonValue>>;
/// mapping from `joinKeys(entityKey, fieldKey)` to its link.
type LinkTable = IndexMap<String, Link>;

/// The normalized record/link store plus its resolver, updater, and schema
/// collaborators.
///
/// `Ctx` is an application-defined context threaded through to resolvers and
/// updaters (`()` if unused).
pub struct Store<Ctx = ()> {
    records: RecordTable,
    links: LinkTable,
    resolvers: IndexMap<String, IndexMap<String, Arc<dyn Resolver<Ctx>>>>,
    updaters: IndexMap<String, IndexMap<String, Arc<dyn Updater<Ctx>>>>,
    schema: Option<Arc<dyn SchemaOracle>>,
    dependencies: RefCell<Option<DependencySet>>,
}

impl<Ctx> Default for Store<Ctx> {
    fn default() -> Self {
        Self {
            records: IndexMap::new(),
            links: IndexMap::new(),
            resolvers: IndexMap::new(),
            updaters: IndexMap::new(),
            schema: None,
            dependencies: RefCell::new(None),
        }
    }
}

/// Builder for [`Store`] (§6 "Store construction").
pub struct StoreBuilder<Ctx = ()> {
    store: Store<Ctx>,
}

impl<Ctx> Default for StoreBuilder<Ctx> {
    fn default() -> Self {
        Self { store: Store::default() }
    }
}

impl<Ctx> StoreBuilder<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolver(mut self, typename: impl Into<String>, field: impl Into<String>, resolver: impl Resolver<Ctx> + 'static) -> Self {
        self.store
            .resolvers
            .entry(typename.into())
            .or_default()
            .insert(field.into(), Arc::new(resolver));
        self
    }

    pub fn updater(mut self, root: impl Into<String>, field: impl Into<String>, updater: impl Updater<Ctx> + 'static) -> Self {
        self.store
            .updaters
            .entry(root.into())
            .or_default()
            .insert(field.into(), Arc::new(updater));
        self
    }

    pub fn schema(mut self, schema: Arc<dyn SchemaOracle>) -> Self {
        self.store.schema = Some(schema);
        self
    }

    pub fn build(self) -> Store<Ctx> {
        self.store
    }
}

impl<Ctx> Store<Ctx> {
    pub fn builder() -> StoreBuilder<Ctx> {
        StoreBuilder::new()
    }

    pub fn schema_oracle(&self) -> Option<&dyn SchemaOracle> {
        self.schema.as_deref()
    }

    pub fn resolver_for(&self, typename: &str, field: &str) -> Option<&Arc<dyn Resolver<Ctx>>> {
        self.resolvers.get(typename)?.get(field)
    }

    pub fn updater_for(&self, root: &str, field: &str) -> Option<&Arc<dyn Updater<Ctx>>> {
        self.updaters.get(root)?.get(field)
    }

    /// `keyOfEntity` (§4.2).
    pub fn key_of_entity(&self, data: &JsonMap<String, JsonValue>) -> Option<EntityKey> {
        key_of_entity(data, &ROOT_KEYS)
    }

    pub fn get_record(&self, entity_key: &str, field_key: &str) -> Option<&JsonValue> {
        self.records.get(entity_key)?.get(field_key)
    }

    pub fn write_record(&mut self, entity_key: &str, field_key: &str, value: JsonValue) {
        self.records
            .entry(entity_key.to_owned())
            .or_default()
            .insert(field_key.to_owned(), value);
    }

    pub fn get_link(&self, full_key: &str) -> Option<&Link> {
        self.links.get(full_key)
    }

    pub fn write_link(&mut self, full_key: &str, link: Link) {
        self.links.insert(full_key.to_owned(), link);
    }

    /// `getField` (§4.2): convenience lookup over records for a field
    /// invocation, computing the field key from name and (already
    /// canonicalized) args.
    pub fn get_field(&self, entity_key: &str, field_key: &str) -> Option<&JsonValue> {
        self.get_record(entity_key, field_key)
    }

    /// `hasField` (§4.2): presence check used by the no-schema fragment
    /// heuristic (§4.5).
    pub fn has_field(&self, entity_key: &str, field_key: &str) -> bool {
        self.records
            .get(entity_key)
            .is_some_and(|record| record.contains_key(field_key))
            || self.links.contains_key(&crate::keys::join_keys(entity_key, field_key))
    }

    /// Removes every record field and link rooted at `entity_key`. Exposed
    /// for updaters that need to evict an entity outright.
    pub fn evict_entity(&mut self, entity_key: &str) {
        self.records.shift_remove(entity_key);
        let prefix = format!("{entity_key}.");
        self.links.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn evict_field(&mut self, entity_key: &str, field_key: &str) {
        if let Some(record) = self.records.get_mut(entity_key) {
            record.shift_remove(field_key);
        }
        self.links.shift_remove(&crate::keys::join_keys(entity_key, field_key));
    }

    // --- dependency-tracking side channel (§4.2, §5) ---

    /// Begins capture. Panics in debug builds if a capture is already
    /// active: nested reads/writes are not supported (§5).
    pub(crate) fn init_dependencies(&self) {
        let mut slot = self.dependencies.borrow_mut();
        debug_assert!(slot.is_none(), "dependency capture is not reentrant (§5)");
        *slot = Some(DependencySet::new());
    }

    pub(crate) fn add_dependency(&self, key: impl Into<String>) {
        if let Some(set) = self.dependencies.borrow_mut().as_mut() {
            set.insert(key.into());
        }
    }

    pub(crate) fn clear_dependencies(&self) -> DependencySet {
        self.dependencies.borrow_mut().take().unwrap_or_default()
    }

    pub fn view(&self) -> StoreView<'_, Ctx> {
        StoreView { store: self }
    }

    pub fn facade(&mut self) -> CacheFacade<'_, Ctx> {
        CacheFacade { store: self }
    }
}

/// Read-only facade handed to [`Resolver`]s (§6: "Resolvers may call
/// `store.keyOfEntity`, `store.getField`, `store.getLink`... they may not
/// mutate").
pub struct StoreView<'a, Ctx> {
    store: &'a Store<Ctx>,
}

impl<'a, Ctx> StoreView<'a, Ctx> {
    pub fn key_of_entity(&self, data: &JsonMap<String, JsonValue>) -> Option<EntityKey> {
        self.store.key_of_entity(data)
    }

    pub fn get_field(&self, entity_key: &str, field_key: &str) -> Option<&JsonValue> {
        self.store.get_field(entity_key, field_key)
    }

    pub fn get_link(&self, full_key: &str) -> Option<&Link> {
        self.store.get_link(full_key)
    }

    pub fn has_field(&self, entity_key: &str, field_key: &str) -> bool {
        self.store.has_field(entity_key, field_key)
    }
}

/// Read-write facade handed to [`Updater`]s. Unlike resolvers, updaters are
/// allowed to rewrite the store (§6: "may call store-facade methods to
/// invalidate or rewrite entries").
pub struct CacheFacade<'a, Ctx> {
    store: &'a mut Store<Ctx>,
}

impl<'a, Ctx> CacheFacade<'a, Ctx> {
    pub fn get_field(&self, entity_key: &str, field_key: &str) -> Option<&JsonValue> {
        self.store.get_field(entity_key, field_key)
    }

    pub fn get_link(&self, full_key: &str) -> Option<&Link> {
        self.store.get_link(full_key)
    }

    pub fn write_record(&mut self, entity_key: &str, field_key: &str, value: JsonValue) {
        self.store.write_record(entity_key, field_key, value);
    }

    pub fn write_link(&mut self, full_key: &str, link: Link) {
        self.store.write_link(full_key, link);
    }

    pub fn evict_entity(&mut self, entity_key: &str) {
        self.store.evict_entity(entity_key);
    }

    pub fn evict_field(&mut self, entity_key: &str, field_key: &str) {
        self.store.evict_field(entity_key, field_key);
    }

    pub fn key_of_entity(&self, data: &JsonMap<String, JsonValue>) -> Option<EntityKey> {
        self.store.key_of_entity(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_field_checks_records_and_links() {
        let mut store: Store = Store::default();
        store.write_record("Todo:1", "text", JsonValue::String("a".into()));
        assert!(store.has_field("Todo:1", "text"));
        assert!(!store.has_field("Todo:1", "done"));
        store.write_link("Todo:1.creator", Link::Key("User:1".into()));
        assert!(store.has_field("Todo:1", "creator"));
    }

    #[test]
    fn evict_entity_removes_record_and_prefixed_links() {
        let mut store: Store = Store::default();
        store.write_record("Todo:1", "text", JsonValue::String("a".into()));
        store.write_link("Todo:1.creator", Link::Key("User:1".into()));
        store.evict_entity("Todo:1");
        assert!(store.get_record("Todo:1", "text").is_none());
        assert!(store.get_link("Todo:1.creator").is_none());
    }
}
