use dashmap::DashMap;
use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::router::{RouteNode, RouteNodeId};
use crate::value::{ResolveStep, ResourceValue};

/// What a resolved action does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// GET on the synthetic root: the service document listing root collections.
    GetRoot,
    /// GET on a collection route.
    QueryCollection,
    /// POST on a collection route.
    CreateResource,
    /// GET on an item-by-id route.
    GetResource,
    /// PUT on an item-by-id route.
    ReplaceResource,
    /// PATCH on an item-by-id route.
    PatchResource,
    /// DELETE on an item-by-id route.
    DeleteResource,
    /// GET on a property route.
    GetProperty,
    /// PUT on a writable property route.
    ReplaceProperty,
    /// A fluent-registered custom handler.
    InvokeHandler,
}

/// What a custom handler produces.
pub enum ActionOutcome {
    Single(ResourceValue),
    Many(Vec<ResourceValue>),
    Raw(Value),
    NoContent,
}

/// Execution context handed to custom handler functions.
pub struct ActionContext<'a> {
    pub step: ResolveStep<'a>,
    pub method: &'a Method,
    pub body: Option<&'a Value>,
}

/// A fluent-registered handler override or custom method body.
pub type HandlerFn = dyn Fn(ActionContext<'_>) -> anyhow::Result<ActionOutcome> + Send + Sync;

/// The executable handler resolved for one (route, HTTP method) pairing.
pub struct ResolvedAction {
    pub kind: ActionKind,
    pub route: RouteNodeId,
    pub method: Method,
    /// Present only for [`ActionKind::InvokeHandler`].
    pub handler: Option<Arc<HandlerFn>>,
    /// Name of the resolver that produced this action, for logs.
    pub resolved_by: &'static str,
}

impl std::fmt::Debug for ResolvedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAction")
            .field("kind", &self.kind)
            .field("route", &self.route)
            .field("method", &self.method)
            .field("resolved_by", &self.resolved_by)
            .finish()
    }
}

/// One link of the resolver chain: examines a route's shape and result item
/// type and yields zero or more candidate actions for a method.
pub trait ActionResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, route: &RouteNode, method: &Method) -> SmallVec<[ResolvedAction; 1]>;
}

/// Ordered chain of [`ActionResolver`]s with a shared per-(route, method)
/// result cache.
///
/// Chain order matters: resolvers for fluent-registered handlers run before
/// the generic data-source resolver, so a custom handler silently overrides
/// the default behavior for the same (type, method) pair. Results - including
/// "no resolver claimed it" - are cached for the process lifetime; routes are
/// structural, so recomputation can never change the answer.
pub struct ActionResolverChain {
    resolvers: Vec<Arc<dyn ActionResolver>>,
    cache: DashMap<(RouteNodeId, Method), Option<Arc<ResolvedAction>>>,
}

impl ActionResolverChain {
    #[must_use]
    pub fn new(resolvers: Vec<Arc<dyn ActionResolver>>) -> Self {
        Self {
            resolvers,
            cache: DashMap::new(),
        }
    }

    /// Resolve the action for a (route, method) pair, consulting the cache
    /// first. Concurrent first access computes under the cache shard's entry
    /// lock, so the chain runs at most once per pair.
    #[must_use]
    pub fn resolve(&self, route: &RouteNode, method: &Method) -> Option<Arc<ResolvedAction>> {
        self.cache
            .entry((route.id, method.clone()))
            .or_insert_with(|| self.run(route, method))
            .clone()
    }

    fn run(&self, route: &RouteNode, method: &Method) -> Option<Arc<ResolvedAction>> {
        for resolver in &self.resolvers {
            let candidates = resolver.resolve(route, method);
            if let Some(action) = candidates.into_iter().next() {
                debug!(
                    route = %route.id,
                    method = %method,
                    resolver = resolver.name(),
                    kind = ?action.kind,
                    "Action resolved"
                );
                return Some(Arc::new(action));
            }
        }
        // Method passed the allowed-methods gate but no resolver claimed the
        // route: a configuration gap, logged as a server-side condition.
        warn!(
            route = %route.id,
            shape = route.shape(),
            method = %method,
            "No action resolver claimed route"
        );
        None
    }

    /// Number of cached (route, method) entries, for diagnostics.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
