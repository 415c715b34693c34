//! Dispatcher core module - hot path for request dispatch.

use http::Method;
use serde_json::{json, Value};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::actions::{
    ActionContext, ActionKind, ActionResolver, ActionResolverChain, CustomHandlerResolver,
    DataSourceResolver, HandlerRegistry, ResolvedAction,
};
use crate::ids::RequestId;
use crate::matcher::{ConflictResolver, MatchNodeId, MatchTree};
use crate::router::{RouteKind, RouteNodeId, RouteTree};
use crate::schema::{MethodSet, PropertyKind, TypeRef};
use crate::value::{DataSource, ValueAccessor};

/// Maximum inline response headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 4;

/// Stack-allocated header storage for the hot path.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Cooperative cancellation for one request's resolution loop.
///
/// Carries a shared flag (caller disconnect) and an optional deadline. The
/// conflict-resolution loop and the dispatcher check it between stages;
/// an in-flight fetch is allowed to finish after cancellation fires.
#[derive(Clone, Debug)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A token that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self::new()
    }

    /// A token that fires once the given duration has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Signal cancellation, e.g. on caller disconnect.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<(), DispatchError> {
        if self.is_cancelled() {
            Err(DispatchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request dispatch failure taxonomy.
///
/// Every variant is raised at the point of detection and translated to an
/// HTTP-shaped [`ResponseEnvelope`] at the dispatcher boundary; nothing is
/// swallowed or retried internally.
#[derive(Debug)]
pub enum DispatchError {
    /// Zero final-match candidates, or conflict resolution eliminated all
    /// candidates (or could not reduce them to one). Never retried.
    ResourceNotFound,
    /// Terminal route resolved but the method is not admitted; carries the
    /// `Allow` header value for client guidance.
    MethodNotAllowed { allow: String },
    /// Method admitted at the route level but no resolver in the chain
    /// claimed the pair: a server-side configuration gap.
    ActionResolutionFailure { route: String },
    /// The request's cancel token fired.
    Cancelled,
    /// The backing data store failed.
    Accessor(anyhow::Error),
}

impl DispatchError {
    /// HTTP-equivalent status for this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::ResourceNotFound => 404,
            DispatchError::MethodNotAllowed { .. } => 405,
            DispatchError::ActionResolutionFailure { .. } => 403,
            DispatchError::Cancelled => 499,
            DispatchError::Accessor(_) => 500,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::ResourceNotFound => write!(f, "resource not found"),
            DispatchError::MethodNotAllowed { allow } => {
                write!(f, "method not allowed (allow: {allow})")
            }
            DispatchError::ActionResolutionFailure { route } => {
                write!(f, "no action resolver claimed route {route}")
            }
            DispatchError::Cancelled => write!(f, "request cancelled"),
            DispatchError::Accessor(e) => write!(f, "data source failure: {e}"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// HTTP-shaped response produced by the dispatcher.
///
/// Carries the status, the JSON body, content negotiation hints, and the
/// resolved route's result type for downstream serialization (out of this
/// core's scope).
#[derive(Debug)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub body: Option<Value>,
    pub result_type: TypeRef,
    pub headers: HeaderVec,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn json(status: u16, body: Value, result_type: TypeRef) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            body: Some(body),
            result_type,
            headers,
        }
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
            result_type: TypeRef::Void,
            headers: HeaderVec::new(),
        }
    }

    /// Translate a dispatch failure into its HTTP shape.
    #[must_use]
    pub fn from_error(err: &DispatchError) -> Self {
        let mut envelope = Self::json(
            err.status(),
            json!({ "error": err.to_string() }),
            TypeRef::Void,
        );
        if let DispatchError::MethodNotAllowed { allow } = err {
            envelope.set_header("allow", allow.clone());
        }
        envelope
    }

    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header (case-insensitive name match).
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }
}

/// Queryable metadata of one resolved route, for documentation and tooling.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub id: RouteNodeId,
    pub shape: &'static str,
    pub allowed_methods: MethodSet,
    pub result_type: TypeRef,
    pub match_value: Option<Arc<str>>,
    /// Content type the envelope will carry for this route.
    pub content_type: &'static str,
}

/// Orchestrates the full request lifecycle: parse path, build the match
/// tree, resolve conflicts, gate the method, resolve and execute the action,
/// and wrap the result in a response envelope.
pub struct Dispatcher {
    tree: Arc<RouteTree>,
    chain: Arc<ActionResolverChain>,
    data: Arc<dyn DataSource>,
}

impl Dispatcher {
    /// Build a dispatcher with the default resolver chain: fluent-registered
    /// handlers first, generic data-source CRUD second.
    #[must_use]
    pub fn new(
        tree: Arc<RouteTree>,
        data: Arc<dyn DataSource>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        let resolvers: Vec<Arc<dyn ActionResolver>> = vec![
            Arc::new(CustomHandlerResolver::new(handlers)),
            Arc::new(DataSourceResolver),
        ];
        Self::with_resolvers(tree, data, resolvers)
    }

    /// Build a dispatcher with a caller-supplied resolver chain.
    #[must_use]
    pub fn with_resolvers(
        tree: Arc<RouteTree>,
        data: Arc<dyn DataSource>,
        resolvers: Vec<Arc<dyn ActionResolver>>,
    ) -> Self {
        Self {
            tree,
            chain: Arc::new(ActionResolverChain::new(resolvers)),
            data,
        }
    }

    #[must_use]
    pub fn route_tree(&self) -> &Arc<RouteTree> {
        &self.tree
    }

    /// Metadata of a resolved route, for documentation endpoints.
    #[must_use]
    pub fn route_info(&self, id: RouteNodeId) -> RouteInfo {
        let node = self.tree.node(id);
        RouteInfo {
            id,
            shape: node.shape(),
            allowed_methods: node.allowed_methods,
            result_type: node.result_type.clone(),
            match_value: node.match_value().cloned(),
            content_type: "application/json",
        }
    }

    /// Dispatch a request, translating any failure into its HTTP shape.
    #[must_use]
    pub fn dispatch(&self, method: Method, path: &str) -> ResponseEnvelope {
        match self.try_dispatch(&method, path, None, &CancelToken::never()) {
            Ok(envelope) => envelope,
            Err(err) => ResponseEnvelope::from_error(&err),
        }
    }

    /// Dispatch with a request body, translating failures into HTTP shapes.
    #[must_use]
    pub fn dispatch_with_body(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ResponseEnvelope {
        match self.try_dispatch(&method, path, body, &CancelToken::never()) {
            Ok(envelope) => envelope,
            Err(err) => ResponseEnvelope::from_error(&err),
        }
    }

    /// Dispatch a request, surfacing the typed failure to the caller.
    pub fn try_dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<Value>,
        cancel: &CancelToken,
    ) -> Result<ResponseEnvelope, DispatchError> {
        let request_id = RequestId::new();
        debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            "Route match attempt"
        );
        let start = Instant::now();

        let mut tree = MatchTree::build(Arc::clone(&self.tree), path);
        if tree.match_count() == 0 {
            warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                duration_us = start.elapsed().as_micros() as u64,
                "No route matched"
            );
            return Err(DispatchError::ResourceNotFound);
        }

        let accessor: &dyn ValueAccessor = self.data.as_ref();
        let terminal = ConflictResolver::new(accessor, cancel).resolve(&mut tree)?;
        let route = tree.route_node(terminal);
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            route = %route.id,
            shape = route.shape(),
            match_count = tree.match_count(),
            "Route matched"
        );

        // Method gate runs before the resolver chain
        if !route.allowed_methods.contains(method) {
            return Err(DispatchError::MethodNotAllowed {
                allow: route.allowed_methods.allow_header(),
            });
        }

        let action = self.chain.resolve(&route, method).ok_or_else(|| {
            DispatchError::ActionResolutionFailure {
                route: route.id.to_string(),
            }
        })?;
        cancel.check()?;

        let envelope = self.execute(&action, &mut tree, terminal, body.as_ref())?;
        let latency = start.elapsed();
        if latency > Duration::from_millis(100) {
            warn!(
                request_id = %request_id,
                status = envelope.status,
                latency_ms = latency.as_millis() as u64,
                "Slow dispatch detected"
            );
        } else {
            info!(
                request_id = %request_id,
                status = envelope.status,
                latency_us = latency.as_micros() as u64,
                "Dispatch complete"
            );
        }
        Ok(envelope)
    }

    fn execute(
        &self,
        action: &ResolvedAction,
        tree: &mut MatchTree,
        terminal: MatchNodeId,
        body: Option<&Value>,
    ) -> Result<ResponseEnvelope, DispatchError> {
        let route = tree.route_node(terminal);
        let accessor: &dyn ValueAccessor = self.data.as_ref();
        match action.kind {
            ActionKind::GetRoot => {
                let collections: Vec<Value> = self
                    .tree
                    .registry()
                    .roots()
                    .iter()
                    .map(|(url, type_name)| {
                        json!({ "name": url.as_ref(), "type": type_name.as_ref() })
                    })
                    .collect();
                Ok(ResponseEnvelope::json(
                    200,
                    json!({ "collections": collections }),
                    TypeRef::Void,
                ))
            }
            ActionKind::QueryCollection => {
                let values = tree
                    .load_query(terminal, accessor)
                    .map_err(DispatchError::Accessor)?;
                let items: Vec<Value> = values.into_iter().map(|v| v.data).collect();
                Ok(ResponseEnvelope::json(
                    200,
                    Value::Array(items),
                    route.result_type.clone(),
                ))
            }
            ActionKind::GetResource => {
                match tree
                    .load_value(terminal, accessor)
                    .map_err(DispatchError::Accessor)?
                {
                    Some(value) => Ok(ResponseEnvelope::json(
                        200,
                        value.data,
                        route.result_type.clone(),
                    )),
                    None => Err(DispatchError::ResourceNotFound),
                }
            }
            ActionKind::GetProperty => self.get_property(tree, terminal, body),
            ActionKind::CreateResource => {
                let parts = tree
                    .step_parts(terminal, accessor)
                    .map_err(DispatchError::Accessor)?;
                let created = self
                    .data
                    .create(&parts.as_step(), body.cloned().unwrap_or(Value::Null))
                    .map_err(DispatchError::Accessor)?;
                Ok(ResponseEnvelope::json(
                    201,
                    created.data,
                    route.result_type.clone(),
                ))
            }
            ActionKind::ReplaceResource | ActionKind::ReplaceProperty => {
                let parts = tree
                    .step_parts(terminal, accessor)
                    .map_err(DispatchError::Accessor)?;
                let updated = self
                    .data
                    .update(&parts.as_step(), body.cloned().unwrap_or(Value::Null))
                    .map_err(DispatchError::Accessor)?;
                Ok(ResponseEnvelope::json(
                    200,
                    updated.data,
                    route.result_type.clone(),
                ))
            }
            ActionKind::PatchResource => {
                let parts = tree
                    .step_parts(terminal, accessor)
                    .map_err(DispatchError::Accessor)?;
                let patched = self
                    .data
                    .patch(&parts.as_step(), body.cloned().unwrap_or(Value::Null))
                    .map_err(DispatchError::Accessor)?;
                Ok(ResponseEnvelope::json(
                    200,
                    patched.data,
                    route.result_type.clone(),
                ))
            }
            ActionKind::DeleteResource => {
                let parts = tree
                    .step_parts(terminal, accessor)
                    .map_err(DispatchError::Accessor)?;
                self.data
                    .delete(&parts.as_step())
                    .map_err(DispatchError::Accessor)?;
                Ok(ResponseEnvelope::no_content())
            }
            ActionKind::InvokeHandler => {
                let handler = match &action.handler {
                    Some(f) => Arc::clone(f),
                    None => {
                        error!(route = %route.id, "Resolved handler action without a handler fn");
                        return Err(DispatchError::ActionResolutionFailure {
                            route: route.id.to_string(),
                        });
                    }
                };
                let parts = tree
                    .step_parts(terminal, accessor)
                    .map_err(DispatchError::Accessor)?;
                let ctx = ActionContext {
                    step: parts.as_step(),
                    method: &action.method,
                    body,
                };
                match handler(ctx).map_err(DispatchError::Accessor)? {
                    crate::actions::ActionOutcome::Single(v) => Ok(ResponseEnvelope::json(
                        200,
                        v.data,
                        route.result_type.clone(),
                    )),
                    crate::actions::ActionOutcome::Many(vs) => Ok(ResponseEnvelope::json(
                        200,
                        Value::Array(vs.into_iter().map(|v| v.data).collect()),
                        route.result_type.clone(),
                    )),
                    crate::actions::ActionOutcome::Raw(v) => {
                        Ok(ResponseEnvelope::json(200, v, route.result_type.clone()))
                    }
                    crate::actions::ActionOutcome::NoContent => Ok(ResponseEnvelope::no_content()),
                }
            }
        }
    }

    /// Plain-value properties read straight out of the parent document;
    /// resource-valued properties go through the accessor.
    fn get_property(
        &self,
        tree: &mut MatchTree,
        terminal: MatchNodeId,
        _body: Option<&Value>,
    ) -> Result<ResponseEnvelope, DispatchError> {
        let route = tree.route_node(terminal);
        let accessor: &dyn ValueAccessor = self.data.as_ref();
        let RouteKind::Property { property, .. } = &route.kind else {
            return Err(DispatchError::ResourceNotFound);
        };
        match &property.kind {
            PropertyKind::Value => {
                let parts = tree
                    .step_parts(terminal, accessor)
                    .map_err(DispatchError::Accessor)?;
                let Some(parent) = &parts.parent else {
                    return Err(DispatchError::ResourceNotFound);
                };
                let field = parent
                    .field(property.name.as_ref())
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(ResponseEnvelope::json(200, field, TypeRef::Value))
            }
            PropertyKind::Resource(_) => {
                match tree
                    .load_value(terminal, accessor)
                    .map_err(DispatchError::Accessor)?
                {
                    Some(value) => Ok(ResponseEnvelope::json(
                        200,
                        value.data,
                        route.result_type.clone(),
                    )),
                    None => Err(DispatchError::ResourceNotFound),
                }
            }
            PropertyKind::Collection(_) => {
                let values = tree
                    .load_query(terminal, accessor)
                    .map_err(DispatchError::Accessor)?;
                let items: Vec<Value> = values.into_iter().map(|v| v.data).collect();
                Ok(ResponseEnvelope::json(
                    200,
                    Value::Array(items),
                    route.result_type.clone(),
                ))
            }
        }
    }
}
