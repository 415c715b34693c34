use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Semantic type descriptor attached to every route node.
///
/// Describes what a route step consumes or produces: nothing, a plain
/// (non-resource) value, a single resource, or a queryable collection of
/// resources. Resource and collection descriptors carry the resource-type
/// name registered in the [`TypeRegistry`](super::TypeRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Void,
    Value,
    Resource(Arc<str>),
    Collection(Arc<str>),
}

impl TypeRef {
    /// True when the descriptor is a single resource or plain value, not a collection.
    #[must_use]
    pub fn is_single(&self) -> bool {
        !matches!(self, TypeRef::Collection(_))
    }

    /// The resource-type name this descriptor resolves to per element.
    ///
    /// For a collection this is the item type; for a single resource it is the
    /// resource type itself. `None` for void and plain values.
    #[must_use]
    pub fn item_type(&self) -> Option<&Arc<str>> {
        match self {
            TypeRef::Resource(name) | TypeRef::Collection(name) => Some(name),
            TypeRef::Void | TypeRef::Value => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => write!(f, "void"),
            TypeRef::Value => write!(f, "value"),
            TypeRef::Resource(name) => write!(f, "{name}"),
            TypeRef::Collection(name) => write!(f, "[{name}]"),
        }
    }
}

/// Wire representation of a primary key value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Int,
    Uuid,
    Str,
}

impl KeyKind {
    /// Whether a raw path segment parses as this key kind.
    ///
    /// Used by id-pattern route nodes: a segment that does not parse is simply
    /// not a match for that child, it falls through to other candidates.
    #[must_use]
    pub fn parses(&self, segment: &str) -> bool {
        match self {
            KeyKind::Int => segment.parse::<i64>().is_ok(),
            KeyKind::Uuid => {
                // 8-4-4-4-12 hex groups; good enough without pulling a uuid crate
                let bytes = segment.as_bytes();
                bytes.len() == 36
                    && segment.split('-').map(|g| g.len()).eq([8, 4, 4, 4, 12])
                    && bytes
                        .iter()
                        .all(|b| b.is_ascii_hexdigit() || *b == b'-')
            }
            KeyKind::Str => !segment.is_empty(),
        }
    }
}

/// Primary key metadata of a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub name: Arc<str>,
    pub kind: KeyKind,
}

/// What an exposed property resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// A plain serializable value (string, number, nested document).
    Value,
    /// A single linked resource of the named type.
    Resource(Arc<str>),
    /// A queryable collection of the named item type.
    Collection(Arc<str>),
}

/// One URL-exposed member of a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMeta {
    /// Member name; matched case-insensitively as a literal path segment.
    pub name: Arc<str>,
    pub kind: PropertyKind,
    /// Writable properties accept PUT in addition to GET.
    pub writable: bool,
}

/// A custom handler method exposed as a literal child segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerMeta {
    /// Segment name, matched case-insensitively.
    pub name: Arc<str>,
    pub method: Method,
    /// Handlers either hang off the collection route or the item route.
    pub on_collection: bool,
}

/// Bitset over the HTTP methods a route admits.
///
/// `Display` renders the `Allow` header value in canonical order, e.g.
/// `GET, PUT, PATCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodSet(u8);

impl MethodSet {
    const ORDER: [(u8, &'static str); 7] = [
        (1 << 0, "GET"),
        (1 << 1, "POST"),
        (1 << 2, "PUT"),
        (1 << 3, "PATCH"),
        (1 << 4, "DELETE"),
        (1 << 5, "HEAD"),
        (1 << 6, "OPTIONS"),
    ];

    pub const GET: MethodSet = MethodSet(1 << 0);
    pub const POST: MethodSet = MethodSet(1 << 1);
    pub const PUT: MethodSet = MethodSet(1 << 2);
    pub const PATCH: MethodSet = MethodSet(1 << 3);
    pub const DELETE: MethodSet = MethodSet(1 << 4);
    pub const HEAD: MethodSet = MethodSet(1 << 5);
    pub const OPTIONS: MethodSet = MethodSet(1 << 6);

    #[must_use]
    pub fn empty() -> Self {
        MethodSet(0)
    }

    /// Default method set for a collection route.
    #[must_use]
    pub fn collection_default() -> Self {
        MethodSet::GET | MethodSet::POST
    }

    /// Default method set for an item-by-id route.
    #[must_use]
    pub fn item_default() -> Self {
        MethodSet::GET | MethodSet::PUT | MethodSet::PATCH | MethodSet::DELETE
    }

    fn bit(method: &Method) -> Option<u8> {
        if *method == Method::GET {
            Some(1 << 0)
        } else if *method == Method::POST {
            Some(1 << 1)
        } else if *method == Method::PUT {
            Some(1 << 2)
        } else if *method == Method::PATCH {
            Some(1 << 3)
        } else if *method == Method::DELETE {
            Some(1 << 4)
        } else if *method == Method::HEAD {
            Some(1 << 5)
        } else if *method == Method::OPTIONS {
            Some(1 << 6)
        } else {
            None
        }
    }

    #[must_use]
    pub fn from_method(method: &Method) -> Self {
        MethodSet(Self::bit(method).unwrap_or(0))
    }

    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        Self::bit(method).is_some_and(|b| self.0 & b != 0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn without(self, method: &Method) -> Self {
        MethodSet(self.0 & !Self::bit(method).unwrap_or(0))
    }

    /// Render the `Allow` header value for this set.
    #[must_use]
    pub fn allow_header(&self) -> String {
        let mut out = String::new();
        for (bit, name) in Self::ORDER {
            if self.0 & bit != 0 {
                if !out.is_empty() {
                    out.push_str(", ");
                }
                out.push_str(name);
            }
        }
        out
    }
}

impl std::ops::BitOr for MethodSet {
    type Output = MethodSet;

    fn bitor(self, rhs: MethodSet) -> MethodSet {
        MethodSet(self.0 | rhs.0)
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.allow_header())
    }
}

/// Metadata for one mapped resource type.
///
/// Built through [`TypeRegistryBuilder`](super::TypeRegistryBuilder); the
/// fields here are everything the route tree needs to derive URL-addressable
/// continuations for the type.
#[derive(Debug, Clone)]
pub struct ResourceType {
    /// Canonical (lowercase) type name, e.g. `bear`.
    pub name: Arc<str>,
    /// Base type name when this type is a subtype, e.g. `critter` for `bear`.
    pub base: Option<Arc<str>>,
    pub primary_key: Option<PrimaryKey>,
    /// Properties declared on this type itself (inherited ones live on the base).
    pub properties: Vec<PropertyMeta>,
    pub handlers: Vec<HandlerMeta>,
    /// Methods admitted on this type's collection routes.
    pub collection_methods: MethodSet,
    /// Methods admitted on this type's item-by-id routes.
    pub item_methods: MethodSet,
}

impl ResourceType {
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyMeta> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_int_parses_digits_only() {
        assert!(KeyKind::Int.parses("42"));
        assert!(KeyKind::Int.parses("-7"));
        assert!(!KeyKind::Int.parses("42x"));
        assert!(!KeyKind::Int.parses("weapons"));
    }

    #[test]
    fn key_kind_uuid_shape() {
        assert!(KeyKind::Uuid.parses("6ba7b810-9dad-11d1-80b4-00c04fd430c8"));
        assert!(!KeyKind::Uuid.parses("6ba7b810-9dad-11d1-80b4"));
        assert!(!KeyKind::Uuid.parses("not-a-uuid-at-all-really-not-one-no"));
    }

    #[test]
    fn method_set_allow_header_order() {
        let set = MethodSet::PATCH | MethodSet::GET | MethodSet::PUT;
        assert_eq!(set.allow_header(), "GET, PUT, PATCH");
        assert!(set.contains(&Method::GET));
        assert!(!set.contains(&Method::DELETE));
    }

    #[test]
    fn method_set_without() {
        let set = MethodSet::item_default().without(&Method::DELETE);
        assert_eq!(set.allow_header(), "GET, PUT, PATCH");
    }
}
