//! Resolver and updater contracts (§6, §9).
//!
//! Per the "resolver polymorphism" design note, a resolver returns a tagged
//! variant rather than relying on dynamic dispatch over an opaque value's
//! runtime shape.

use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::keys::EntityKey;
use crate::store::CacheFacade;
use crate::store::StoreView;

/// The tagged return of a resolver invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverValue {
    /// A plain scalar (including arrays of scalars).
    Scalar(JsonValue),
    /// An entity key string: the resolver is pointing at an existing entity.
    EntityRef(EntityKey),
    /// An entity-shaped mapping (must carry `__typename` to be usable as a
    /// link target; otherwise it is addressed as embedded data).
    Embedded(JsonMap<String, JsonValue>),
    /// A list of any of the above, recursively.
    List(Vec<ResolverValue>),
    /// Cache miss: treated exactly like an absent record/link.
    Missing,
}

impl ResolverValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, ResolverValue::Missing)
    }
}

/// `(parent, args, store, ctx) -> value` from §6.
///
/// Resolvers receive a read-only [`StoreView`] and MUST NOT mutate the
/// store; they assist the read path by calling `key_of_entity`, `get_field`,
/// or `get_link`.
pub trait Resolver<Ctx = ()>: Send + Sync {
    fn resolve(
        &self,
        parent: &JsonMap<String, JsonValue>,
        args: &JsonMap<String, JsonValue>,
        store: &StoreView<'_, Ctx>,
        ctx: &Ctx,
    ) -> ResolverValue;
}

impl<Ctx, F> Resolver<Ctx> for F
where
    F: Fn(&JsonMap<String, JsonValue>, &JsonMap<String, JsonValue>, &StoreView<'_, Ctx>, &Ctx) -> ResolverValue
        + Send
        + Sync,
{
    fn resolve(
        &self,
        parent: &JsonMap<String, JsonValue>,
        args: &JsonMap<String, JsonValue>,
        store: &StoreView<'_, Ctx>,
        ctx: &Ctx,
    ) -> ResolverValue {
        self(parent, args, store, ctx)
    }
}

/// `(result, args, store, ctx)` invoked after a write at an operation root
/// (§4.3 step 4). Updaters may call [`CacheFacade`] methods to invalidate or
/// rewrite entries that the normalized write alone wouldn't touch (e.g.
/// removing a deleted entity from a list it's still linked from).
pub trait Updater<Ctx = ()>: Send + Sync {
    fn update(
        &self,
        result: &JsonValue,
        args: &JsonMap<String, JsonValue>,
        cache: &mut CacheFacade<'_, Ctx>,
        ctx: &Ctx,
    );
}

impl<Ctx, F> Updater<Ctx> for F
where
    F: Fn(&JsonValue, &JsonMap<String, JsonValue>, &mut CacheFacade<'_, Ctx>, &Ctx) + Send + Sync,
{
    fn update(
        &self,
        result: &JsonValue,
        args: &JsonMap<String, JsonValue>,
        cache: &mut CacheFacade<'_, Ctx>,
        ctx: &Ctx,
    ) {
        self(result, args, cache, ctx)
    }
}
