//! # Matcher Module
//!
//! Per-request path matching on top of the shared route tree.
//!
//! For each incoming request a [`MatchTree`] is built by walking the path
//! segments against the [`RouteTree`](crate::router::RouteTree): one node
//! per candidate route step, with dead-end subtrees pruned as they appear.
//! The tree owns all per-request lazy state - the memoized
//! backing value of each node and the `selected_child` pointers that record
//! which branch the request actually takes.
//!
//! Branches that stay ambiguous after static matching are handed to the
//! [`ConflictResolver`], which loads the actual runtime type of the
//! conflicting node's value and narrows by `input_type` assignability.

mod conflict;
mod tree;

pub use conflict::ConflictResolver;
pub use tree::{MatchNodeId, MatchTree, StepParts};
