use once_cell::sync::OnceCell;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::schema::{HandlerMeta, MethodSet, PrimaryKey, PropertyMeta, TypeRef};

/// Index handle of a [`RouteNode`] inside its [`RouteTree`](super::RouteTree).
///
/// Parent/child links are stored as handles rather than owning references, so
/// the bidirectional tree never forms a reference cycle and upward walks stay
/// O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteNodeId(pub(crate) u32);

impl fmt::Display for RouteNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of path step a route node describes.
#[derive(Debug, Clone)]
pub enum RouteKind {
    /// Synthetic root; matches the empty path.
    Root,
    /// A collection exposed under a literal segment (e.g. `critters`).
    Collection { match_value: Arc<str> },
    /// Item-by-id pattern child of a collection; matches any segment that
    /// parses as the primary key type.
    Item { key: PrimaryKey },
    /// An exposed property, matched by literal (case-insensitive) name.
    /// `declaring_type` is the resource type that declares the property,
    /// which for subtype-contributed properties differs from the parent
    /// route's static item type.
    Property {
        match_value: Arc<str>,
        declaring_type: Arc<str>,
        property: PropertyMeta,
    },
    /// A custom handler method exposed as a literal segment.
    Custom {
        match_value: Arc<str>,
        declaring_type: Arc<str>,
        handler: HandlerMeta,
    },
}

/// Literal path segments outrank pattern (id) segments at equal depth.
pub const LITERAL_PRIORITY: u8 = 0;
pub const PATTERN_PRIORITY: u8 = 10;

/// Immutable, process-lifetime description of one step of a possible URL path.
///
/// Children are computed once on first access from the type metadata and then
/// memoized; the tree is effectively copy-on-read and safe for arbitrarily
/// many concurrent lookups.
#[derive(Debug)]
pub struct RouteNode {
    pub id: RouteNodeId,
    pub parent: Option<RouteNodeId>,
    pub kind: RouteKind,
    /// Lower value matches before higher.
    pub priority: u8,
    pub allowed_methods: MethodSet,
    /// The type a value must have for this route step to apply to it.
    pub input_type: TypeRef,
    /// What this step produces: a single resource, a collection, or a value.
    pub result_type: TypeRef,
    pub(crate) children: OnceCell<Arc<ChildSet>>,
}

impl RouteNode {
    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self.kind, RouteKind::Root)
    }

    /// True when the result is not a collection.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.result_type.is_single()
    }

    /// The literal text this node matches, `None` for pattern and root nodes.
    #[must_use]
    pub fn match_value(&self) -> Option<&Arc<str>> {
        match &self.kind {
            RouteKind::Collection { match_value }
            | RouteKind::Property { match_value, .. }
            | RouteKind::Custom { match_value, .. } => Some(match_value),
            RouteKind::Root | RouteKind::Item { .. } => None,
        }
    }

    /// Per-element resource type of the result, `None` for void/value results.
    #[must_use]
    pub fn result_item_type(&self) -> Option<&Arc<str>> {
        self.result_type.item_type()
    }

    /// Short human tag for logs and route listings.
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self.kind {
            RouteKind::Root => "root",
            RouteKind::Collection { .. } => "collection",
            RouteKind::Item { .. } => "item",
            RouteKind::Property { .. } => "property",
            RouteKind::Custom { .. } => "custom",
        }
    }
}

/// Memoized, priority-ordered children of one route node.
///
/// Literal children sit in a lowercase-keyed map for O(1) case-insensitive
/// lookup; a single map slot can hold several siblings when subtypes expose
/// a same-named member. Only segments absent from the literal map fall
/// through to the pattern scan.
#[derive(Debug, Default)]
pub struct ChildSet {
    pub(crate) literals: HashMap<String, SmallVec<[RouteNodeId; 2]>>,
    pub(crate) patterns: SmallVec<[RouteNodeId; 2]>,
    /// All children sorted by priority, for listings.
    pub(crate) ordered: Vec<RouteNodeId>,
}

impl ChildSet {
    pub(crate) fn push_literal(&mut self, match_value: &str, id: RouteNodeId) {
        self.literals
            .entry(match_value.to_ascii_lowercase())
            .or_default()
            .push(id);
        self.ordered.push(id);
    }

    pub(crate) fn push_pattern(&mut self, id: RouteNodeId) {
        self.patterns.push(id);
        self.ordered.push(id);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// All children, literals (priority 0) before patterns (priority 10).
    #[must_use]
    pub fn ordered(&self) -> &[RouteNodeId] {
        &self.ordered
    }
}
