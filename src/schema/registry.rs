//! Resource-type registry and builder.
//!
//! The registry is the metadata source the route tree is derived from. It is
//! assembled once at startup through [`TypeRegistryBuilder`]; `build()`
//! validates the whole graph so that configuration mistakes (a collection of
//! a keyless item type, a dangling base link) fail at startup, never during a
//! request.

use anyhow::{anyhow, bail, Context};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::types::{
    HandlerMeta, KeyKind, MethodSet, PrimaryKey, PropertyKind, PropertyMeta, ResourceType,
};
use http::Method;

/// Immutable, validated resource-type metadata graph.
#[derive(Debug)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<ResourceType>>,
    /// Root-exposed types, in registration order: (collection url segment, type name).
    roots: Vec<(Arc<str>, Arc<str>)>,
    /// Direct subtypes keyed by base type name.
    subtypes: HashMap<String, Vec<Arc<str>>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ResourceType>> {
        self.types.get(&name.to_ascii_lowercase())
    }

    /// Root collections exposed at the URL root, in registration order.
    #[must_use]
    pub fn roots(&self) -> &[(Arc<str>, Arc<str>)] {
        &self.roots
    }

    /// Direct subtypes of `name`, empty when the type is a leaf.
    #[must_use]
    pub fn direct_subtypes(&self, name: &str) -> &[Arc<str>] {
        self.subtypes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The base chain of `name` starting at `name` itself, nearest base first.
    #[must_use]
    pub fn ancestors_and_self(&self, name: &str) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        let mut cur = self.get(name).cloned();
        while let Some(t) = cur {
            out.push(Arc::clone(&t.name));
            cur = t.base.as_deref().and_then(|b| self.get(b)).cloned();
        }
        out
    }

    /// All transitive subtypes of `name`, depth-first, excluding `name` itself.
    #[must_use]
    pub fn all_subtypes(&self, name: &str) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        let mut stack: Vec<Arc<str>> = self.direct_subtypes(name).to_vec();
        while let Some(sub) = stack.pop() {
            stack.extend(self.direct_subtypes(&sub).iter().cloned());
            out.push(sub);
        }
        out
    }

    /// Whether a value of concrete type `actual` satisfies a route expecting
    /// `expected` (`actual` is `expected` or transitively derives from it).
    #[must_use]
    pub fn is_assignable(&self, expected: &str, actual: &str) -> bool {
        let mut cur = actual.to_ascii_lowercase();
        let expected = expected.to_ascii_lowercase();
        loop {
            if cur == expected {
                return true;
            }
            match self.types.get(&cur).and_then(|t| t.base.clone()) {
                Some(base) => cur = base.to_ascii_lowercase(),
                None => return false,
            }
        }
    }

    /// Whether `name` has subtypes, i.e. a value statically typed as `name`
    /// may be of a more derived concrete type at runtime.
    #[must_use]
    pub fn is_polymorphic(&self, name: &str) -> bool {
        !self.direct_subtypes(name).is_empty()
    }

    /// Primary key of a type, following base links for inherited keys.
    #[must_use]
    pub fn primary_key(&self, name: &str) -> Option<PrimaryKey> {
        let mut cur = self.get(name)?;
        loop {
            if let Some(pk) = &cur.primary_key {
                return Some(pk.clone());
            }
            cur = self.get(cur.base.as_deref()?)?;
        }
    }
}

/// Builder for one resource type inside a [`TypeRegistryBuilder`].
pub struct ResourceTypeBuilder {
    name: Arc<str>,
    base: Option<Arc<str>>,
    primary_key: Option<PrimaryKey>,
    properties: Vec<PropertyMeta>,
    handlers: Vec<HandlerMeta>,
    collection_methods: MethodSet,
    item_methods: MethodSet,
    root: Option<Arc<str>>,
}

impl ResourceTypeBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name.to_ascii_lowercase().as_str()),
            base: None,
            primary_key: None,
            properties: Vec::new(),
            handlers: Vec::new(),
            collection_methods: MethodSet::collection_default(),
            item_methods: MethodSet::item_default(),
            root: None,
        }
    }

    /// Declare this type a subtype of `base`.
    pub fn base(&mut self, base: &str) -> &mut Self {
        self.base = Some(Arc::from(base.to_ascii_lowercase().as_str()));
        self
    }

    pub fn primary_key(&mut self, name: &str, kind: KeyKind) -> &mut Self {
        self.primary_key = Some(PrimaryKey {
            name: Arc::from(name),
            kind,
        });
        self
    }

    /// Expose a plain-value property (terminal route segment).
    pub fn value_property(&mut self, name: &str) -> &mut Self {
        self.push_property(name, PropertyKind::Value, false)
    }

    pub fn writable_value_property(&mut self, name: &str) -> &mut Self {
        self.push_property(name, PropertyKind::Value, true)
    }

    /// Expose a single-resource property of the given resource type.
    pub fn resource_property(&mut self, name: &str, resource_type: &str) -> &mut Self {
        self.push_property(
            name,
            PropertyKind::Resource(Arc::from(resource_type.to_ascii_lowercase().as_str())),
            false,
        )
    }

    /// Expose a collection property of the given item type.
    pub fn collection_property(&mut self, name: &str, item_type: &str) -> &mut Self {
        self.push_property(
            name,
            PropertyKind::Collection(Arc::from(item_type.to_ascii_lowercase().as_str())),
            false,
        )
    }

    fn push_property(&mut self, name: &str, kind: PropertyKind, writable: bool) -> &mut Self {
        self.properties.push(PropertyMeta {
            name: Arc::from(name),
            kind,
            writable,
        });
        self
    }

    /// Expose a custom handler method as a literal child of the item route.
    pub fn handler(&mut self, name: &str, method: Method) -> &mut Self {
        self.handlers.push(HandlerMeta {
            name: Arc::from(name),
            method,
            on_collection: false,
        });
        self
    }

    /// Expose a custom handler method as a literal child of the collection route.
    pub fn collection_handler(&mut self, name: &str, method: Method) -> &mut Self {
        self.handlers.push(HandlerMeta {
            name: Arc::from(name),
            method,
            on_collection: true,
        });
        self
    }

    /// Restrict the methods admitted on this type's collection routes.
    pub fn collection_methods(&mut self, methods: MethodSet) -> &mut Self {
        self.collection_methods = methods;
        self
    }

    /// Restrict the methods admitted on this type's item routes.
    pub fn item_methods(&mut self, methods: MethodSet) -> &mut Self {
        self.item_methods = methods;
        self
    }

    /// Expose this type as a root collection under the given URL segment.
    pub fn expose_root(&mut self, url_segment: &str) -> &mut Self {
        self.root = Some(Arc::from(url_segment.to_ascii_lowercase().as_str()));
        self
    }
}

/// Mutable registry under construction.
#[derive(Default)]
pub struct TypeRegistryBuilder {
    types: Vec<ResourceTypeBuilder>,
}

impl TypeRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or continue) declaring a resource type.
    pub fn resource(&mut self, name: &str) -> &mut ResourceTypeBuilder {
        let key = name.to_ascii_lowercase();
        if let Some(idx) = self.types.iter().position(|t| t.name.as_ref() == key) {
            return &mut self.types[idx];
        }
        self.types.push(ResourceTypeBuilder::new(name));
        // Just pushed, cannot be empty
        let last = self.types.len() - 1;
        &mut self.types[last]
    }

    /// Assemble and validate the registry.
    ///
    /// Validation covers the whole metadata graph: every referenced type must
    /// exist, base links must be acyclic, and every type reachable through a
    /// collection (root or property) must carry a primary key. These are
    /// configuration errors and fail here, at startup.
    pub fn build(self) -> anyhow::Result<Arc<TypeRegistry>> {
        let mut types = HashMap::new();
        let mut roots = Vec::new();
        let mut subtypes: HashMap<String, Vec<Arc<str>>> = HashMap::new();

        for builder in &self.types {
            if let Some(url) = &builder.root {
                roots.push((Arc::clone(url), Arc::clone(&builder.name)));
            }
            if let Some(base) = &builder.base {
                subtypes
                    .entry(base.to_string())
                    .or_default()
                    .push(Arc::clone(&builder.name));
            }
            let rt = ResourceType {
                name: Arc::clone(&builder.name),
                base: builder.base.clone(),
                primary_key: builder.primary_key.clone(),
                properties: builder.properties.clone(),
                handlers: builder.handlers.clone(),
                collection_methods: builder.collection_methods,
                item_methods: builder.item_methods,
            };
            if types
                .insert(builder.name.to_string(), Arc::new(rt))
                .is_some()
            {
                bail!("resource type '{}' registered twice", builder.name);
            }
        }

        let registry = TypeRegistry {
            types,
            roots,
            subtypes,
        };
        registry.validate()?;

        info!(
            types = registry.types.len(),
            roots = registry.roots.len(),
            "Type registry built"
        );
        Ok(Arc::new(registry))
    }
}

impl TypeRegistry {
    fn validate(&self) -> anyhow::Result<()> {
        for (name, rt) in &self.types {
            // Base links must resolve and be acyclic
            if let Some(base) = &rt.base {
                self.get(base)
                    .ok_or_else(|| anyhow!("type '{name}' derives from unknown type '{base}'"))?;
                let mut seen = vec![name.clone()];
                let mut cur = base.to_string();
                loop {
                    if seen.contains(&cur) {
                        bail!("inheritance cycle through type '{cur}'");
                    }
                    seen.push(cur.clone());
                    match self.get(&cur).and_then(|t| t.base.clone()) {
                        Some(next) => cur = next.to_string(),
                        None => break,
                    }
                }
            }
            for prop in &rt.properties {
                match &prop.kind {
                    PropertyKind::Value => {}
                    PropertyKind::Resource(target) => {
                        self.get(target).ok_or_else(|| {
                            anyhow!(
                                "property '{}.{}' references unknown type '{target}'",
                                name,
                                prop.name
                            )
                        })?;
                    }
                    PropertyKind::Collection(item) => {
                        self.get(item).ok_or_else(|| {
                            anyhow!(
                                "collection property '{}.{}' references unknown type '{item}'",
                                name,
                                prop.name
                            )
                        })?;
                        self.require_primary_key(item).with_context(|| {
                            format!("collection property '{}.{}'", name, prop.name)
                        })?;
                    }
                }
            }
        }
        for (url, type_name) in &self.roots {
            self.get(type_name)
                .ok_or_else(|| anyhow!("root collection '{url}' of unknown type '{type_name}'"))?;
            self.require_primary_key(type_name)
                .with_context(|| format!("root collection '{url}'"))?;
        }
        Ok(())
    }

    fn require_primary_key(&self, type_name: &str) -> anyhow::Result<()> {
        if self.primary_key(type_name).is_none() {
            bail!("item type '{type_name}' is exposed through a collection but has no primary key");
        }
        Ok(())
    }
}
