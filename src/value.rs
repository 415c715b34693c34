//! Resource values and the data-store seams.
//!
//! The dispatch core never talks to a database directly. Values flow through
//! [`ValueAccessor`] (reads used during path resolution) and [`DataSource`]
//! (the full CRUD surface used by resolved actions). Both receive a
//! [`ResolveStep`] describing the route step being materialized.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::router::RouteNode;

/// A materialized resource instance: its concrete runtime type plus its
/// JSON representation.
///
/// The concrete type tag is what conflict resolution inspects; it may be a
/// subtype of the statically declared resource type of the route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceValue {
    /// Concrete (runtime) resource-type name, lowercase.
    pub type_name: Arc<str>,
    /// JSON document representation of the instance.
    pub data: Value,
}

impl ResourceValue {
    #[must_use]
    pub fn new(type_name: &str, data: Value) -> Self {
        Self {
            type_name: Arc::from(type_name.to_ascii_lowercase().as_str()),
            data,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// One step of path resolution handed to the value accessor.
///
/// `parent` is the nearest ancestor single-resource value, already
/// materialized by the same request (never fetched twice). `collection` is
/// the URL segment of the collection this step selects from, when the step is
/// a collection query or an item-by-id lookup.
pub struct ResolveStep<'a> {
    /// The static route node being materialized.
    pub node: Arc<RouteNode>,
    /// The percent-decoded path segment that matched this node. The synthetic
    /// root consumed no segment.
    pub segment: Option<&'a str>,
    pub parent: Option<&'a ResourceValue>,
    pub collection: Option<Arc<str>>,
}

/// Read access to the backing store, used while resolving a path.
///
/// Implementations are invoked at most once per match node per request; the
/// match tree memoizes results.
pub trait ValueAccessor: Send + Sync {
    /// The single value a step represents, `None` when the resource does not exist.
    fn get(&self, step: &ResolveStep<'_>) -> anyhow::Result<Option<ResourceValue>>;

    /// The queryable collection a step represents.
    fn query(&self, step: &ResolveStep<'_>) -> anyhow::Result<Vec<ResourceValue>>;
}

/// Full CRUD surface executed by resolved actions.
pub trait DataSource: ValueAccessor {
    fn create(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue>;

    /// Replace the resource or writable property a step addresses.
    fn update(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue>;

    /// Merge-patch the resource a step addresses.
    fn patch(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue>;

    fn delete(&self, step: &ResolveStep<'_>) -> anyhow::Result<()>;
}
