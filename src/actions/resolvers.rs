//! The built-in resolver chain links.
//!
//! [`CustomHandlerResolver`] consults the fluent-registered handler registry
//! and runs first; [`DataSourceResolver`] maps route shapes to generic CRUD
//! actions and runs last. An unregistered custom route resolves to nothing,
//! which the dispatcher reports as an action-resolution failure.

use http::Method;
use smallvec::{smallvec, SmallVec};
use std::collections::HashMap;
use std::sync::Arc;

use super::core::{ActionKind, ActionResolver, HandlerFn, ResolvedAction};
use crate::router::{RouteKind, RouteNode};
use crate::schema::PropertyKind;

/// Fluent-registered handler functions, keyed by resource type.
///
/// Two registration surfaces: custom methods (literal route segments declared
/// in the type metadata) and CRUD overrides (replace the generic data-source
/// behavior for one (type, method) pair). Built once at startup, then shared
/// read-only.
#[derive(Default)]
pub struct HandlerRegistry {
    custom: HashMap<(String, String), Arc<HandlerFn>>,
    overrides: HashMap<(String, Method), Arc<HandlerFn>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body of a custom method declared on `type_name` under
    /// the given segment name.
    pub fn register_custom<F>(&mut self, type_name: &str, segment: &str, f: F)
    where
        F: Fn(super::core::ActionContext<'_>) -> anyhow::Result<super::core::ActionOutcome>
            + Send
            + Sync
            + 'static,
    {
        self.custom.insert(
            (
                type_name.to_ascii_lowercase(),
                segment.to_ascii_lowercase(),
            ),
            Arc::new(f),
        );
    }

    /// Override the generic CRUD behavior for one (type, method) pair.
    pub fn register_override<F>(&mut self, type_name: &str, method: Method, f: F)
    where
        F: Fn(super::core::ActionContext<'_>) -> anyhow::Result<super::core::ActionOutcome>
            + Send
            + Sync
            + 'static,
    {
        self.overrides
            .insert((type_name.to_ascii_lowercase(), method), Arc::new(f));
    }

    fn custom_for(&self, type_name: &str, segment: &str) -> Option<&Arc<HandlerFn>> {
        self.custom
            .get(&(type_name.to_ascii_lowercase(), segment.to_ascii_lowercase()))
    }

    fn override_for(&self, type_name: &str, method: &Method) -> Option<&Arc<HandlerFn>> {
        self.overrides
            .get(&(type_name.to_ascii_lowercase(), method.clone()))
    }
}

/// Resolver for fluent-registered handlers; runs before the generic CRUD
/// resolver so registrations shadow default behavior.
pub struct CustomHandlerResolver {
    handlers: Arc<HandlerRegistry>,
}

impl CustomHandlerResolver {
    #[must_use]
    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }
}

impl ActionResolver for CustomHandlerResolver {
    fn name(&self) -> &'static str {
        "custom_handler"
    }

    fn resolve(&self, route: &RouteNode, method: &Method) -> SmallVec<[ResolvedAction; 1]> {
        let handler = match &route.kind {
            RouteKind::Custom {
                match_value,
                declaring_type,
                handler,
            } if handler.method == *method => {
                self.handlers.custom_for(declaring_type, match_value)
            }
            RouteKind::Collection { .. } | RouteKind::Item { .. } | RouteKind::Property { .. } => {
                route
                    .result_item_type()
                    .and_then(|t| self.handlers.override_for(t, method))
            }
            _ => None,
        };
        match handler {
            Some(f) => smallvec![ResolvedAction {
                kind: ActionKind::InvokeHandler,
                route: route.id,
                method: method.clone(),
                handler: Some(Arc::clone(f)),
                resolved_by: self.name(),
            }],
            None => SmallVec::new(),
        }
    }
}

/// Generic CRUD resolver: maps the route's shape and method straight onto a
/// data-source operation. Never claims custom routes.
pub struct DataSourceResolver;

impl ActionResolver for DataSourceResolver {
    fn name(&self) -> &'static str {
        "data_source"
    }

    fn resolve(&self, route: &RouteNode, method: &Method) -> SmallVec<[ResolvedAction; 1]> {
        let kind = match &route.kind {
            RouteKind::Root if *method == Method::GET => Some(ActionKind::GetRoot),
            RouteKind::Collection { .. } if *method == Method::GET => {
                Some(ActionKind::QueryCollection)
            }
            RouteKind::Collection { .. } if *method == Method::POST => {
                Some(ActionKind::CreateResource)
            }
            RouteKind::Item { .. } if *method == Method::GET => Some(ActionKind::GetResource),
            RouteKind::Item { .. } if *method == Method::PUT => Some(ActionKind::ReplaceResource),
            RouteKind::Item { .. } if *method == Method::PATCH => Some(ActionKind::PatchResource),
            RouteKind::Item { .. } if *method == Method::DELETE => Some(ActionKind::DeleteResource),
            RouteKind::Property { property, .. } if *method == Method::GET => {
                Some(match property.kind {
                    PropertyKind::Collection(_) => ActionKind::QueryCollection,
                    _ => ActionKind::GetProperty,
                })
            }
            RouteKind::Property { property, .. }
                if *method == Method::POST
                    && matches!(property.kind, PropertyKind::Collection(_)) =>
            {
                Some(ActionKind::CreateResource)
            }
            RouteKind::Property { property, .. }
                if *method == Method::PUT && property.writable =>
            {
                Some(ActionKind::ReplaceProperty)
            }
            _ => None,
        };
        match kind {
            Some(kind) => smallvec![ResolvedAction {
                kind,
                route: route.id,
                method: method.clone(),
                handler: None,
                resolved_by: self.name(),
            }],
            None => SmallVec::new(),
        }
    }
}
