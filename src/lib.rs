//! # treeroute
//!
//! **treeroute** is a type-metadata-driven routing and dispatch core for
//! hypermedia-style REST APIs. URL structure is never configured by hand:
//! it is derived lazily from a registry of resource types, their primary
//! keys, exposed properties, and custom methods.
//!
//! ## Overview
//!
//! Two trees cooperate to serve a request:
//!
//! - A long-lived **route tree** ([`router::RouteTree`]) whose nodes are
//!   derived from type metadata on demand. Children are computed once per
//!   node and memoized, which lets cyclic resource graphs (a `Critter`
//!   whose `weapons` each link back to a `Critter`) produce an unbounded
//!   URL space from finite metadata.
//! - A short-lived per-request **match tree** ([`matcher::MatchTree`])
//!   holding every candidate interpretation of the request path at once.
//!   Dead ends are pruned at build time; ambiguity that survives static
//!   matching is settled by runtime-type narrowing in
//!   [`matcher::ConflictResolver`].
//!
//! Once a single terminal route remains, the [`dispatcher::Dispatcher`]
//! gates the HTTP method, resolves an action through a cached resolver
//! chain (custom handlers first, generic CRUD second), executes it against
//! the application's [`value::DataSource`], and returns a
//! [`dispatcher::ResponseEnvelope`].
//!
//! ## Architecture
//!
//! - **[`schema`]** - resource type metadata: registry, inheritance,
//!   primary keys, properties, method sets
//! - **[`router`]** - the lazily expanded, memoized route tree
//! - **[`matcher`]** - per-request match tree and conflict resolution
//! - **[`actions`]** - action resolver chain and the resolution cache
//! - **[`dispatcher`]** - request orchestration, errors, response envelopes
//! - **[`value`]** - data-source traits the application implements
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use treeroute::actions::HandlerRegistry;
//! use treeroute::dispatcher::Dispatcher;
//! use treeroute::router::RouteTree;
//! use treeroute::schema::{KeyKind, TypeRegistryBuilder};
//! # struct MyStore;
//! # impl treeroute::value::ValueAccessor for MyStore {
//! #     fn get(&self, _: &treeroute::value::ResolveStep<'_>) -> anyhow::Result<Option<treeroute::value::ResourceValue>> { Ok(None) }
//! #     fn query(&self, _: &treeroute::value::ResolveStep<'_>) -> anyhow::Result<Vec<treeroute::value::ResourceValue>> { Ok(vec![]) }
//! # }
//! # impl treeroute::value::DataSource for MyStore {
//! #     fn create(&self, _: &treeroute::value::ResolveStep<'_>, _: serde_json::Value) -> anyhow::Result<treeroute::value::ResourceValue> { unimplemented!() }
//! #     fn update(&self, _: &treeroute::value::ResolveStep<'_>, _: serde_json::Value) -> anyhow::Result<treeroute::value::ResourceValue> { unimplemented!() }
//! #     fn patch(&self, _: &treeroute::value::ResolveStep<'_>, _: serde_json::Value) -> anyhow::Result<treeroute::value::ResourceValue> { unimplemented!() }
//! #     fn delete(&self, _: &treeroute::value::ResolveStep<'_>) -> anyhow::Result<()> { Ok(()) }
//! # }
//!
//! let mut types = TypeRegistryBuilder::new();
//! types
//!     .resource("critter")
//!     .primary_key("id", KeyKind::Int)
//!     .value_property("name")
//!     .expose_root("critters");
//! let registry = types.build().expect("valid type metadata");
//!
//! let tree = Arc::new(RouteTree::new(registry));
//! let dispatcher = Dispatcher::new(
//!     tree,
//!     Arc::new(MyStore),
//!     Arc::new(HandlerRegistry::new()),
//! );
//! let response = dispatcher.dispatch(http::Method::GET, "/critters/42");
//! assert_eq!(response.status, 404); // MyStore holds no data
//! ```
//!
//! ## Key Properties
//!
//! - **Deterministic**: identical metadata, path, and data yield identical
//!   resolution; candidate order follows declaration order.
//! - **Fail-closed**: ambiguity that narrowing cannot settle is a 404,
//!   never an arbitrary pick.
//! - **Bounded I/O**: each match node's value is fetched at most once per
//!   request, and narrowing only fetches when the static type is actually
//!   polymorphic.

pub mod actions;
pub mod dispatcher;
pub mod ids;
pub mod matcher;
pub mod router;
pub mod schema;
pub mod value;

pub use dispatcher::{CancelToken, DispatchError, Dispatcher, ResponseEnvelope};
pub use router::{RouteNode, RouteNodeId, RouteTree};
pub use schema::{KeyKind, MethodSet, TypeRef, TypeRegistry, TypeRegistryBuilder};
pub use value::{DataSource, ResolveStep, ResourceValue, ValueAccessor};
