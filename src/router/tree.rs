//! Route tree construction and segment matching - hot path for request routing.

use once_cell::sync::OnceCell;
use smallvec::SmallVec;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::node::{ChildSet, RouteKind, RouteNode, RouteNodeId, LITERAL_PRIORITY, PATTERN_PRIORITY};
use crate::schema::{MethodSet, PropertyKind, TypeRef, TypeRegistry};

/// Process-lifetime route tree derived from a validated [`TypeRegistry`].
///
/// Nodes live in an arena addressed by [`RouteNodeId`]. Children of a node
/// are expanded lazily from the type metadata on first access and memoized;
/// lazy expansion is what keeps cyclic resource graphs (a critter whose
/// property links back to critters) finite. After a path has been traversed
/// once, re-traversing it touches no locks beyond the arena's read lock.
pub struct RouteTree {
    registry: Arc<TypeRegistry>,
    nodes: RwLock<Vec<Arc<RouteNode>>>,
    root: RouteNodeId,
}

impl RouteTree {
    /// Build the tree root from a validated registry.
    ///
    /// Metadata validation (primary keys, base links) already happened when
    /// the registry was built; everything reachable from here is derived
    /// deterministically from that metadata.
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        let root = Arc::new(RouteNode {
            id: RouteNodeId(0),
            parent: None,
            kind: RouteKind::Root,
            priority: LITERAL_PRIORITY,
            allowed_methods: MethodSet::GET,
            input_type: TypeRef::Void,
            result_type: TypeRef::Void,
            children: OnceCell::new(),
        });
        let tree = Self {
            registry,
            nodes: RwLock::new(vec![root]),
            root: RouteNodeId(0),
        };
        debug!(roots = tree.registry.roots().len(), "Route tree created");
        tree
    }

    #[must_use]
    pub fn root(&self) -> RouteNodeId {
        self.root
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Fetch a node by handle.
    ///
    /// # Panics
    ///
    /// A `RouteNodeId` is only ever produced by this tree, so the index is
    /// always in bounds.
    #[must_use]
    pub fn node(&self, id: RouteNodeId) -> Arc<RouteNode> {
        #[allow(clippy::expect_used)]
        let guard = self.nodes.read().expect("route arena lock poisoned");
        Arc::clone(&guard[id.0 as usize])
    }

    fn alloc(
        &self,
        parent: RouteNodeId,
        kind: RouteKind,
        priority: u8,
        allowed_methods: MethodSet,
        input_type: TypeRef,
        result_type: TypeRef,
    ) -> RouteNodeId {
        #[allow(clippy::expect_used)]
        let mut guard = self.nodes.write().expect("route arena lock poisoned");
        let id = RouteNodeId(guard.len() as u32);
        guard.push(Arc::new(RouteNode {
            id,
            parent: Some(parent),
            kind,
            priority,
            allowed_methods,
            input_type,
            result_type,
            children: OnceCell::new(),
        }));
        id
    }

    /// Children of a node, expanding and memoizing them on first access.
    ///
    /// Expansion is pure over the registry, so a race on first access costs a
    /// duplicate computation at worst; `OnceCell` publishes exactly one
    /// consistent result.
    #[must_use]
    pub fn children(&self, id: RouteNodeId) -> Arc<ChildSet> {
        let node = self.node(id);
        Arc::clone(node.children.get_or_init(|| {
            let set = self.expand(&node);
            debug!(
                node = %node.id,
                shape = node.shape(),
                literal_children = set.literals.len(),
                pattern_children = set.patterns.len(),
                "Route children expanded"
            );
            Arc::new(set)
        }))
    }

    /// Every child matching the given path segment, literal matches first.
    ///
    /// Literal lookup is O(1) on the lowercased segment; only segments absent
    /// from the literal map fall through to a linear scan of pattern
    /// children. An id-pattern child matches only if the segment parses as
    /// its key type.
    #[must_use]
    pub fn match_children(&self, id: RouteNodeId, segment: &str) -> SmallVec<[RouteNodeId; 2]> {
        let children = self.children(id);
        let mut out: SmallVec<[RouteNodeId; 2]> = SmallVec::new();
        if let Some(ids) = children.literals.get(&segment.to_ascii_lowercase()) {
            out.extend(ids.iter().copied());
        }
        if out.is_empty() {
            for pattern_id in &children.patterns {
                let node = self.node(*pattern_id);
                if let RouteKind::Item { key } = &node.kind {
                    if key.kind.parses(segment) {
                        out.push(*pattern_id);
                    }
                }
            }
        }
        out
    }

    fn expand(&self, node: &RouteNode) -> ChildSet {
        let mut set = ChildSet::default();
        match (&node.kind, &node.result_type) {
            (RouteKind::Root, _) => self.expand_root(node, &mut set),
            (RouteKind::Custom { .. }, _) => {}
            (_, TypeRef::Collection(item)) => self.expand_collection(node, item, &mut set),
            (_, TypeRef::Resource(t)) => self.expand_resource(node, t, &mut set),
            _ => {}
        }
        set
    }

    /// One literal collection child per root-exposed resource type.
    fn expand_root(&self, node: &RouteNode, set: &mut ChildSet) {
        for (url, type_name) in self.registry.roots() {
            let methods = self
                .registry
                .get(type_name)
                .map(|t| t.collection_methods)
                .unwrap_or_else(MethodSet::collection_default);
            let id = self.alloc(
                node.id,
                RouteKind::Collection {
                    match_value: Arc::clone(url),
                },
                LITERAL_PRIORITY,
                methods,
                TypeRef::Void,
                TypeRef::Collection(Arc::clone(type_name)),
            );
            set.push_literal(url, id);
        }
    }

    /// An id-pattern child keyed by the item type's primary key, plus any
    /// collection-scoped handler methods of the item type.
    fn expand_collection(&self, node: &RouteNode, item: &Arc<str>, set: &mut ChildSet) {
        if let Some(rt) = self.registry.get(item) {
            for handler in rt.handlers.iter().filter(|h| h.on_collection) {
                let id = self.alloc(
                    node.id,
                    RouteKind::Custom {
                        match_value: Arc::clone(&handler.name),
                        declaring_type: Arc::clone(item),
                        handler: handler.clone(),
                    },
                    LITERAL_PRIORITY,
                    MethodSet::from_method(&handler.method),
                    TypeRef::Collection(Arc::clone(item)),
                    TypeRef::Value,
                );
                set.push_literal(&handler.name, id);
            }
        }
        // Registry validation guarantees a key on any collection item type.
        if let Some(key) = self.registry.primary_key(item) {
            let methods = self
                .registry
                .get(item)
                .map(|t| t.item_methods)
                .unwrap_or_else(MethodSet::item_default);
            let id = self.alloc(
                node.id,
                RouteKind::Item { key },
                PATTERN_PRIORITY,
                methods,
                TypeRef::Resource(Arc::clone(item)),
                TypeRef::Resource(Arc::clone(item)),
            );
            set.push_pattern(id);
        }
    }

    /// Literal property and handler children contributed by the static item
    /// type, its base chain, and every subtype.
    ///
    /// Subtype contributions are where textual duplicates come from: two
    /// sibling subtypes each exposing a same-named member produce two literal
    /// children sharing one match value, distinguished only by `input_type`.
    fn expand_resource(&self, node: &RouteNode, type_name: &Arc<str>, set: &mut ChildSet) {
        let mut sources = self.registry.ancestors_and_self(type_name);
        sources.extend(self.registry.all_subtypes(type_name));
        for source in sources {
            let Some(rt) = self.registry.get(&source) else {
                continue;
            };
            for prop in &rt.properties {
                let result_type = match &prop.kind {
                    PropertyKind::Value => TypeRef::Value,
                    PropertyKind::Resource(r) => TypeRef::Resource(Arc::clone(r)),
                    PropertyKind::Collection(c) => TypeRef::Collection(Arc::clone(c)),
                };
                // Collection-valued properties behave like collections:
                // they admit the item type's collection methods, not just GET
                let mut methods = match &prop.kind {
                    PropertyKind::Collection(c) => self
                        .registry
                        .get(c)
                        .map(|t| t.collection_methods)
                        .unwrap_or_else(MethodSet::collection_default),
                    _ => MethodSet::GET,
                };
                if prop.writable {
                    methods = methods | MethodSet::PUT;
                }
                let id = self.alloc(
                    node.id,
                    RouteKind::Property {
                        match_value: Arc::clone(&prop.name),
                        declaring_type: Arc::clone(&rt.name),
                        property: prop.clone(),
                    },
                    LITERAL_PRIORITY,
                    methods,
                    TypeRef::Resource(Arc::clone(&rt.name)),
                    result_type,
                );
                set.push_literal(&prop.name, id);
            }
            for handler in rt.handlers.iter().filter(|h| !h.on_collection) {
                let id = self.alloc(
                    node.id,
                    RouteKind::Custom {
                        match_value: Arc::clone(&handler.name),
                        declaring_type: Arc::clone(&rt.name),
                        handler: handler.clone(),
                    },
                    LITERAL_PRIORITY,
                    MethodSet::from_method(&handler.method),
                    TypeRef::Resource(Arc::clone(&rt.name)),
                    TypeRef::Value,
                );
                set.push_literal(&handler.name, id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyKind, TypeRegistryBuilder};
    use http::Method;

    fn park_tree() -> RouteTree {
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
        RouteTree::new(b.build().expect("valid registry"))
    }

    #[test]
    fn root_exposes_literal_collections() {
        let tree = park_tree();
        let matches = tree.match_children(tree.root(), "critters");
        assert_eq!(matches.len(), 1);
        let node = tree.node(matches[0]);
        assert_eq!(node.shape(), "collection");
        assert!(!node.is_single());
    }

    #[test]
    fn literal_lookup_is_case_insensitive() {
        let tree = park_tree();
        assert_eq!(tree.match_children(tree.root(), "CrItTeRs").len(), 1);
        assert!(tree.match_children(tree.root(), "dogs").is_empty());
    }

    #[test]
    fn id_segment_matches_pattern_child_only_when_it_parses() {
        let tree = park_tree();
        let collection = tree.match_children(tree.root(), "critters")[0];
        let item = tree.match_children(collection, "42");
        assert_eq!(item.len(), 1);
        assert_eq!(tree.node(item[0]).shape(), "item");
        assert!(tree.match_children(collection, "fluffy").is_empty());
    }

    #[test]
    fn subtype_siblings_share_one_literal_slot() {
        let tree = park_tree();
        let collection = tree.match_children(tree.root(), "critters")[0];
        let item = tree.match_children(collection, "42")[0];
        let weapons = tree.match_children(item, "weapons");
        // bear and wolf each contribute a textually identical child
        assert_eq!(weapons.len(), 2);
        let inputs: Vec<String> = weapons
            .iter()
            .map(|id| tree.node(*id).input_type.to_string())
            .collect();
        assert!(inputs.contains(&"bear".to_string()));
        assert!(inputs.contains(&"wolf".to_string()));
    }

    #[test]
    fn inherited_property_is_unambiguous() {
        let tree = park_tree();
        let collection = tree.match_children(tree.root(), "critters")[0];
        let item = tree.match_children(collection, "42")[0];
        let name = tree.match_children(item, "name");
        assert_eq!(name.len(), 1);
        assert_eq!(tree.node(name[0]).allowed_methods.allow_header(), "GET");
    }

    #[test]
    fn children_are_memoized() {
        let tree = park_tree();
        let first = tree.children(tree.root());
        let second = tree.children(tree.root());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn collection_handler_is_a_literal_child() {
        let mut b = TypeRegistryBuilder::new();
        b.resource("critter")
            .primary_key("id", KeyKind::Int)
            .collection_handler("search", Method::GET)
            .expose_root("critters");
        let tree = RouteTree::new(b.build().expect("valid registry"));
        let collection = tree.match_children(tree.root(), "critters")[0];
        let custom = tree.match_children(collection, "search");
        assert_eq!(custom.len(), 1);
        assert_eq!(tree.node(custom[0]).shape(), "custom");
    }
}
