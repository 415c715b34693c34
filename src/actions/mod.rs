//! # Actions Module
//!
//! Maps a uniquely resolved route node and an HTTP method to the executable
//! handler that will produce the response.
//!
//! Resolution runs through an ordered [`ActionResolverChain`]: each link
//! examines the route's shape (root, collection, item-by-id, property,
//! custom) and its result item type, and yields candidate actions. The first
//! link to claim the pair wins, so [`CustomHandlerResolver`] placed ahead of
//! [`DataSourceResolver`] lets fluent-registered handlers silently override
//! generic CRUD behavior.
//!
//! Chain results are cached per (route, method) in a concurrent map for the
//! process lifetime; routes are structural, so the answer never changes.

mod core;
mod resolvers;

pub use self::core::{
    ActionContext, ActionKind, ActionOutcome, ActionResolver, ActionResolverChain, HandlerFn,
    ResolvedAction,
};
pub use resolvers::{CustomHandlerResolver, DataSourceResolver, HandlerRegistry};
