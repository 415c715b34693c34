//! Per-request match tree - hot path for path resolution.

use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

use crate::router::{RouteKind, RouteNode, RouteNodeId, RouteTree};
use crate::schema::TypeRef;
use crate::value::{ResolveStep, ResourceValue, ValueAccessor};

/// Index handle of a [`MatchNode`] inside its request-scoped [`MatchTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchNodeId(u32);

/// Explicit lazy-field state: not yet computed, or computed exactly once.
#[derive(Debug, Clone)]
pub(crate) enum Slot<T> {
    Pending,
    Ready(T),
}

impl<T> Slot<T> {
    fn ready(&self) -> Option<&T> {
        match self {
            Slot::Ready(v) => Some(v),
            Slot::Pending => None,
        }
    }
}

/// Memoized backing value of a match node.
#[derive(Debug, Clone)]
pub(crate) enum NodeValue {
    /// Single-resource steps: `None` when the resource does not exist.
    Single(Option<ResourceValue>),
    /// Collection steps.
    Many(Vec<ResourceValue>),
}

/// One matched path segment of one request.
///
/// Mirrors a [`RouteNode`] but is request-scoped: it owns the lazily-loaded
/// backing value and the conflict-resolution state for its children. Callers
/// only ever see [`MatchNodeId`] handles; the nodes themselves stay internal.
#[derive(Debug)]
pub(crate) struct MatchNode {
    route: RouteNodeId,
    /// Number of path segments consumed up to and including this node. The
    /// synthetic root consumes zero.
    consumed: usize,
    parent: Option<MatchNodeId>,
    children: SmallVec<[MatchNodeId; 2]>,
    /// Set exactly once: at build time when exactly one child survives
    /// pruning, otherwise only by the conflict resolver.
    selected_child: Option<MatchNodeId>,
    value: Slot<NodeValue>,
    actual_type: Slot<Arc<str>>,
}

/// Request-scoped tree of match nodes built by walking the path segments
/// against the shared [`RouteTree`].
///
/// Single-writer by construction: the request that built the tree is the only
/// one mutating it, so no locking is needed. Subtrees that cannot reach the
/// final path segment are pruned during the build; without that, polymorphic
/// resource hierarchies expand combinatorially.
pub struct MatchTree {
    route_tree: Arc<RouteTree>,
    segments: Vec<String>,
    nodes: Vec<MatchNode>,
    root: MatchNodeId,
    match_count: usize,
}

impl MatchTree {
    /// Split, percent-decode, and match the path against the route tree.
    ///
    /// An undecodable segment can never correspond to typed metadata, so it
    /// yields an empty tree (`match_count == 0`) rather than an error.
    #[must_use]
    pub fn build(route_tree: Arc<RouteTree>, path: &str) -> Self {
        let mut segments = Vec::new();
        let mut decodable = true;
        for raw in path.split('/').filter(|s| !s.is_empty()) {
            match urlencoding::decode(raw) {
                Ok(decoded) => segments.push(decoded.into_owned()),
                Err(_) => {
                    decodable = false;
                    break;
                }
            }
        }

        let root_route = route_tree.root();
        let mut tree = Self {
            route_tree,
            segments,
            nodes: Vec::new(),
            root: MatchNodeId(0),
            match_count: 0,
        };
        if decodable {
            tree.expand(root_route, 0, None);
        } else {
            // Keep a root node so accessors stay total
            tree.push_node(root_route, 0, None);
        }
        debug!(
            segments = tree.segments.len(),
            nodes = tree.nodes.len(),
            match_count = tree.match_count,
            "Match tree built"
        );
        tree
    }

    fn push_node(
        &mut self,
        route: RouteNodeId,
        consumed: usize,
        parent: Option<MatchNodeId>,
    ) -> MatchNodeId {
        let id = MatchNodeId(self.nodes.len() as u32);
        self.nodes.push(MatchNode {
            route,
            consumed,
            parent,
            children: SmallVec::new(),
            selected_child: None,
            value: Slot::Pending,
            actual_type: Slot::Pending,
        });
        id
    }

    /// Recursively expand one route candidate. Returns `None` when the whole
    /// subtree is a dead end (no descendant consumes the last segment).
    fn expand(
        &mut self,
        route: RouteNodeId,
        consumed: usize,
        parent: Option<MatchNodeId>,
    ) -> Option<MatchNodeId> {
        let id = self.push_node(route, consumed, parent);
        if consumed == self.segments.len() {
            self.match_count += 1;
            return Some(id);
        }

        let segment = self.segments[consumed].clone();
        let candidates = self.route_tree.match_children(route, &segment);
        let mut kept: SmallVec<[MatchNodeId; 2]> = SmallVec::new();
        for candidate in candidates {
            if let Some(child) = self.expand(candidate, consumed + 1, Some(id)) {
                kept.push(child);
            }
        }
        if kept.is_empty() {
            // Dead-end pruning; the orphaned arena entry is never referenced
            return None;
        }
        if kept.len() == 1 && self.statically_satisfied(route, kept[0]) {
            self.nodes[id.0 as usize].selected_child = Some(kept[0]);
        }
        self.nodes[id.0 as usize].children = kept;
        Some(id)
    }

    /// A lone surviving child may be selected at build time only when its
    /// input type is already satisfied by the parent's static result type.
    /// A child declared on a strict subtype still needs runtime narrowing,
    /// even without siblings.
    fn statically_satisfied(&self, parent_route: RouteNodeId, child: MatchNodeId) -> bool {
        let child_route = self.route_tree.node(self.nodes[child.0 as usize].route);
        let Some(input) = child_route.input_type.item_type() else {
            return true;
        };
        let parent = self.route_tree.node(parent_route);
        match parent.result_item_type() {
            Some(static_type) => self.route_tree.registry().is_assignable(input, static_type),
            None => true,
        }
    }

    #[must_use]
    pub fn root(&self) -> MatchNodeId {
        self.root
    }

    #[must_use]
    pub fn route_tree(&self) -> &Arc<RouteTree> {
        &self.route_tree
    }

    /// Number of final-match candidates across all surviving leaves; zero
    /// means not-found.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.match_count
    }

    /// Whether the node consumes the last path segment.
    #[must_use]
    pub fn is_final(&self, id: MatchNodeId) -> bool {
        self.match_count > 0 && self.nodes[id.0 as usize].consumed == self.segments.len()
    }

    #[must_use]
    pub fn children(&self, id: MatchNodeId) -> &[MatchNodeId] {
        &self.nodes[id.0 as usize].children
    }

    #[must_use]
    pub fn selected_child(&self, id: MatchNodeId) -> Option<MatchNodeId> {
        self.nodes[id.0 as usize].selected_child
    }

    /// Record the conflict resolver's choice. The selection is made at most
    /// once and always names a genuine child.
    pub(crate) fn select_child(&mut self, parent: MatchNodeId, child: MatchNodeId) {
        let node = &mut self.nodes[parent.0 as usize];
        debug_assert!(node.selected_child.is_none(), "selection made twice");
        debug_assert!(node.children.contains(&child), "selection is not a child");
        node.selected_child = Some(child);
    }

    #[must_use]
    pub fn route_node(&self, id: MatchNodeId) -> Arc<RouteNode> {
        self.route_tree.node(self.nodes[id.0 as usize].route)
    }

    /// The path segment this node matched; the synthetic root matched none.
    #[must_use]
    pub fn segment(&self, id: MatchNodeId) -> Option<&str> {
        let consumed = self.nodes[id.0 as usize].consumed;
        consumed
            .checked_sub(1)
            .and_then(|i| self.segments.get(i))
            .map(String::as_str)
    }

    /// The terminal node found by following `selected_child` pointers from
    /// the root, when every conflict on the way has been resolved.
    #[must_use]
    pub fn selected_final(&self) -> Option<MatchNodeId> {
        let mut cur = self.root;
        loop {
            if self.is_final(cur) {
                return Some(cur);
            }
            cur = self.selected_child(cur)?;
        }
    }

    /// Nearest ancestor whose route step produces a single resource.
    fn nearest_resource_ancestor(&self, id: MatchNodeId) -> Option<MatchNodeId> {
        let mut cur = self.nodes[id.0 as usize].parent;
        while let Some(pid) = cur {
            let route = self.route_node(pid);
            if matches!(route.result_type, TypeRef::Resource(_)) {
                return Some(pid);
            }
            cur = self.nodes[pid.0 as usize].parent;
        }
        None
    }

    /// The collection URL segment a step selects from, when applicable.
    fn collection_segment(&self, id: MatchNodeId) -> Option<Arc<str>> {
        let route = self.route_node(id);
        match &route.kind {
            RouteKind::Item { .. } => {
                let parent = self.nodes[id.0 as usize].parent?;
                self.route_node(parent).match_value().cloned()
            }
            RouteKind::Collection { match_value } => Some(Arc::clone(match_value)),
            RouteKind::Property { match_value, .. } if !route.result_type.is_single() => {
                Some(Arc::clone(match_value))
            }
            _ => None,
        }
    }

    /// Owned ingredients of a [`ResolveStep`] for this node, materializing
    /// the ancestor value chain as needed.
    pub fn step_parts(
        &mut self,
        id: MatchNodeId,
        accessor: &dyn ValueAccessor,
    ) -> anyhow::Result<StepParts> {
        let parent = match self.nearest_resource_ancestor(id) {
            Some(pid) => self.load_value(pid, accessor)?,
            None => None,
        };
        Ok(StepParts {
            node: self.route_node(id),
            segment: self.segment(id).map(str::to_string),
            parent,
            collection: self.collection_segment(id),
        })
    }

    /// The single value this node represents, fetched through the accessor
    /// at most once per request.
    pub fn load_value(
        &mut self,
        id: MatchNodeId,
        accessor: &dyn ValueAccessor,
    ) -> anyhow::Result<Option<ResourceValue>> {
        if let Some(NodeValue::Single(v)) = self.nodes[id.0 as usize].value.ready() {
            return Ok(v.clone());
        }
        let parts = self.step_parts(id, accessor)?;
        let step = ResolveStep {
            node: parts.node,
            segment: parts.segment.as_deref(),
            parent: parts.parent.as_ref(),
            collection: parts.collection,
        };
        let value = accessor.get(&step)?;
        self.nodes[id.0 as usize].value = Slot::Ready(NodeValue::Single(value.clone()));
        Ok(value)
    }

    /// The queryable collection this node represents, fetched at most once.
    pub fn load_query(
        &mut self,
        id: MatchNodeId,
        accessor: &dyn ValueAccessor,
    ) -> anyhow::Result<Vec<ResourceValue>> {
        if let Some(NodeValue::Many(vs)) = self.nodes[id.0 as usize].value.ready() {
            return Ok(vs.clone());
        }
        let parts = self.step_parts(id, accessor)?;
        let step = ResolveStep {
            node: parts.node,
            segment: parts.segment.as_deref(),
            parent: parts.parent.as_ref(),
            collection: parts.collection,
        };
        let values = accessor.query(&step)?;
        self.nodes[id.0 as usize].value = Slot::Ready(NodeValue::Many(values.clone()));
        Ok(values)
    }

    /// The concrete runtime type of the node's value.
    ///
    /// For non-polymorphic result item types this is the static type and no
    /// fetch happens; polymorphic types require loading the value and
    /// inspecting its concrete type tag. `Ok(None)` means the backing value
    /// does not exist.
    pub fn resolve_actual_type(
        &mut self,
        id: MatchNodeId,
        accessor: &dyn ValueAccessor,
    ) -> anyhow::Result<Option<Arc<str>>> {
        if let Some(t) = self.nodes[id.0 as usize].actual_type.ready() {
            return Ok(Some(Arc::clone(t)));
        }
        let route = self.route_node(id);
        let Some(static_type) = route.result_item_type().cloned() else {
            return Ok(None);
        };
        let actual = if self.route_tree.registry().is_polymorphic(&static_type) {
            match self.load_value(id, accessor)? {
                Some(value) => value.type_name,
                None => return Ok(None),
            }
        } else {
            static_type
        };
        self.nodes[id.0 as usize].actual_type = Slot::Ready(Arc::clone(&actual));
        Ok(Some(actual))
    }
}

/// Owned pieces of a [`ResolveStep`]; borrow them to build the step itself.
pub struct StepParts {
    pub node: Arc<RouteNode>,
    pub segment: Option<String>,
    pub parent: Option<ResourceValue>,
    pub collection: Option<Arc<str>>,
}

impl StepParts {
    #[must_use]
    pub fn as_step(&self) -> ResolveStep<'_> {
        ResolveStep {
            node: Arc::clone(&self.node),
            segment: self.segment.as_deref(),
            parent: self.parent.as_ref(),
            collection: self.collection.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyKind, TypeRegistryBuilder};

    fn park() -> Arc<RouteTree> {
        let mut b = TypeRegistryBuilder::new();
        b.resource("critter")
            .primary_key("id", KeyKind::Int)
            .value_property("name")
            .expose_root("critters");
        b.resource("bear")
            .base("critter")
            .collection_property("weapons", "weapon");
        b.resource("wolf")
            .base("critter")
            .collection_property("weapons", "weapon");
        b.resource("weapon")
            .primary_key("id", KeyKind::Int)
            .value_property("model");
        Arc::new(RouteTree::new(b.build().expect("valid registry")))
    }

    #[test]
    fn unambiguous_path_preselects_chain() {
        let mt = MatchTree::build(park(), "/critters/42");
        assert_eq!(mt.match_count(), 1);
        let terminal = mt.selected_final().expect("preselected chain");
        assert!(mt.is_final(terminal));
        assert_eq!(mt.segment(terminal), Some("42"));
        assert_eq!(mt.route_node(terminal).shape(), "item");
    }

    #[test]
    fn unknown_segment_yields_zero_matches() {
        let mt = MatchTree::build(park(), "/critters/42/teeth");
        assert_eq!(mt.match_count(), 0);
        assert!(mt.selected_final().is_none());
    }

    #[test]
    fn ambiguous_siblings_block_selection() {
        let mt = MatchTree::build(park(), "/critters/42/weapons");
        // bear and wolf both contribute a `weapons` child
        assert_eq!(mt.match_count(), 2);
        assert!(mt.selected_final().is_none());
        let item = mt.selected_child(mt.selected_child(mt.root()).expect("collection")).expect("item");
        assert_eq!(mt.children(item).len(), 2);
        assert!(mt.selected_child(item).is_none());
    }

    #[test]
    fn dead_end_subtrees_are_pruned() {
        let mt = MatchTree::build(park(), "/critters/42/weapons/7/model");
        // both weapons branches survive; each reaches the final segment
        assert_eq!(mt.match_count(), 2);
    }

    #[test]
    fn empty_path_matches_root() {
        let mt = MatchTree::build(park(), "/");
        assert_eq!(mt.match_count(), 1);
        let terminal = mt.selected_final().expect("root is final");
        assert!(mt.route_node(terminal).is_root());
    }

    #[test]
    fn percent_decoding_applies_to_segments() {
        let mt = MatchTree::build(park(), "/%63ritters");
        assert_eq!(mt.match_count(), 1);
    }

    #[test]
    fn undecodable_segment_is_not_found() {
        let mt = MatchTree::build(park(), "/critters/%zz");
        assert_eq!(mt.match_count(), 0);
    }
}
