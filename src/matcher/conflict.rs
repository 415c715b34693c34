//! Actual-type conflict resolution.
//!
//! Multiple literal route children can legitimately share one path segment
//! when sibling subtypes each expose a same-named member. Static matching
//! cannot pick between them; only the concrete runtime type of the
//! intermediate resource decides which child's `input_type` is satisfied.
//! This module walks the selected-child chain, fetches the actual type at
//! each conflict (at most one fetch per node, memoized), and narrows.
//!
//! Narrowing goes one level deep: if more than one child survives the
//! actual-type filter, resolution fails closed with not-found rather than
//! guessing. Deeper disambiguation strategies are not attempted.

use tracing::{debug, info, warn};

use super::tree::{MatchNodeId, MatchTree};
use crate::dispatcher::{CancelToken, DispatchError};
use crate::value::ValueAccessor;

/// Walks a request's match tree and resolves ambiguous branches by loading
/// actual runtime types through the value accessor.
///
/// Conflicts are processed strictly sequentially: a later conflict only
/// becomes visible once an earlier one has been resolved, because it lives
/// below the selected child. Already-loaded values are never re-fetched, so
/// resuming after partial progress is cheap.
pub struct ConflictResolver<'a> {
    accessor: &'a dyn ValueAccessor,
    cancel: &'a CancelToken,
}

impl<'a> ConflictResolver<'a> {
    #[must_use]
    pub fn new(accessor: &'a dyn ValueAccessor, cancel: &'a CancelToken) -> Self {
        Self { accessor, cancel }
    }

    /// Resolve every conflict on the selected-child chain and return the
    /// unique terminal (last-segment) match node.
    pub fn resolve(&self, tree: &mut MatchTree) -> Result<MatchNodeId, DispatchError> {
        if tree.match_count() == 0 {
            return Err(DispatchError::ResourceNotFound);
        }
        let mut cur = tree.root();
        loop {
            self.cancel.check()?;
            if tree.is_final(cur) {
                return Ok(cur);
            }
            if let Some(selected) = tree.selected_child(cur) {
                cur = selected;
                continue;
            }
            cur = self.narrow(tree, cur)?;
        }
    }

    /// Resolve one conflict node: fetch the actual type and filter children
    /// by `input_type` assignability.
    fn narrow(
        &self,
        tree: &mut MatchTree,
        node: MatchNodeId,
    ) -> Result<MatchNodeId, DispatchError> {
        let candidates: Vec<MatchNodeId> = tree.children(node).to_vec();
        if candidates.is_empty() {
            // Cannot happen after pruning, but fail closed rather than panic
            return Err(DispatchError::ResourceNotFound);
        }
        debug!(
            candidates = candidates.len(),
            route = %tree.route_node(node).id,
            "Conflict encountered"
        );

        let actual = match tree
            .resolve_actual_type(node, self.accessor)
            .map_err(DispatchError::Accessor)?
        {
            Some(actual) => actual,
            None => {
                info!(route = %tree.route_node(node).id, "No backing value at conflict node");
                return Err(DispatchError::ResourceNotFound);
            }
        };

        let registry = tree.route_tree().registry();
        let mut survivors = Vec::with_capacity(1);
        for candidate in &candidates {
            let input = tree.route_node(*candidate).input_type.clone();
            let satisfied = match input.item_type() {
                Some(expected) => registry.is_assignable(expected, &actual),
                None => true,
            };
            if satisfied {
                survivors.push(*candidate);
            }
        }

        match survivors.as_slice() {
            [winner] => {
                debug!(
                    actual_type = %actual,
                    route = %tree.route_node(*winner).id,
                    "Conflict resolved by actual type"
                );
                tree.select_child(node, *winner);
                Ok(*winner)
            }
            [] => {
                info!(
                    actual_type = %actual,
                    candidates = candidates.len(),
                    "Actual type satisfies no candidate"
                );
                Err(DispatchError::ResourceNotFound)
            }
            _ => {
                // Documented limitation: one level of narrowing, then fail closed
                warn!(
                    actual_type = %actual,
                    survivors = survivors.len(),
                    "Ambiguity persists after actual-type narrowing"
                );
                Err(DispatchError::ResourceNotFound)
            }
        }
    }
}
