//! # Schema Module
//!
//! Resource-type metadata: the statically-typed object graph the route tree
//! is derived from. A [`TypeRegistry`] holds one [`ResourceType`] per mapped
//! type, with its primary key, exposed properties, custom handler methods and
//! subtype relations.
//!
//! The registry is built once at startup via [`TypeRegistryBuilder`] and
//! validated as a whole; a collection whose item type has no primary key is a
//! configuration error surfaced here, not per request.

mod registry;
mod types;

pub use registry::{ResourceTypeBuilder, TypeRegistry, TypeRegistryBuilder};
pub use types::{
    HandlerMeta, KeyKind, MethodSet, PrimaryKey, PropertyKind, PropertyMeta, ResourceType, TypeRef,
};
