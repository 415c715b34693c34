//! # Router Module
//!
//! The static route tree: one [`RouteNode`] per possible URL path step,
//! derived from resource-type metadata and shared by every request for the
//! process lifetime.
//!
//! ## Architecture
//!
//! The tree is an arena of nodes addressed by [`RouteNodeId`]. Construction
//! is lazy: a node's children are computed from the [`TypeRegistry`] the
//! first time any request walks through it, then memoized forever. Matching
//! a path segment against a node is a two-step affair:
//!
//! 1. **Literal lookup** - O(1) case-insensitive lookup in the node's
//!    lowercase literal map. Several siblings can share one literal slot
//!    when sibling subtypes expose a same-named member; all of them are
//!    returned and the ambiguity is left to the per-request matcher.
//! 2. **Pattern scan** - only segments absent from the literal map are
//!    tested against pattern (id) children, which match when the segment
//!    parses as the primary-key type.
//!
//! Literal children carry priority 0, id-pattern children priority 10:
//! literal matches always outrank pattern matches at equal depth.
//!
//! [`TypeRegistry`]: crate::schema::TypeRegistry

mod node;
mod tree;

pub use node::{ChildSet, RouteKind, RouteNode, RouteNodeId};
pub use tree::RouteTree;
