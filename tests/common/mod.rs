//! Shared fixture: a small "critter park" type graph with an in-memory
//! data source, used across the integration test suites.
//!
//! The graph exercises the interesting corners of metadata-driven routing:
//! `bear` and `wolf` both extend `critter` and both expose a `weapons`
//! collection, so `/critters/{id}/weapons` is ambiguous until the critter's
//! concrete type is known. `critter` and `bear` both declare a `diet`
//! property, so `/critters/{bear-id}/diet` stays ambiguous even after
//! narrowing.

// Not every test binary exercises every fixture helper.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use http::Method;
use serde_json::{json, Value};
use treeroute::router::RouteKind;
use treeroute::schema::{KeyKind, TypeRegistry, TypeRegistryBuilder};
use treeroute::value::{DataSource, ResolveStep, ResourceValue, ValueAccessor};

static TRACING: Once = Once::new();

/// Install a per-test-capture subscriber once per test binary. Honors
/// `RUST_LOG` so a failing test can be re-run with the dispatch stages
/// visible.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn park_registry() -> Arc<TypeRegistry> {
    init_tracing();
    let mut types = TypeRegistryBuilder::new();
    types
        .resource("critter")
        .primary_key("id", KeyKind::Int)
        .value_property("name")
        .writable_value_property("diet")
        .expose_root("critters");
    types
        .resource("bear")
        .base("critter")
        .collection_property("weapons", "weapon")
        .value_property("diet")
        .handler("growl", Method::POST);
    types
        .resource("wolf")
        .base("critter")
        .collection_property("weapons", "weapon");
    types
        .resource("weapon")
        .primary_key("id", KeyKind::Int)
        .value_property("model")
        .resource_property("owner", "critter");
    types.build().expect("park fixture metadata is valid")
}

/// In-memory store over the park fixture's data.
pub struct ParkStore {
    critters: Mutex<BTreeMap<String, ResourceValue>>,
    /// Weapons keyed by owning critter id.
    weapons: Mutex<BTreeMap<String, Vec<ResourceValue>>>,
    next_id: AtomicUsize,
}

impl ParkStore {
    pub fn seeded() -> Self {
        let mut critters = BTreeMap::new();
        critters.insert(
            "42".to_string(),
            ResourceValue::new("bear", json!({ "id": 42, "name": "Bjorn", "diet": "fish" })),
        );
        critters.insert(
            "7".to_string(),
            ResourceValue::new("wolf", json!({ "id": 7, "name": "Fenris", "diet": "elk" })),
        );
        let mut weapons = BTreeMap::new();
        weapons.insert(
            "42".to_string(),
            vec![
                ResourceValue::new("weapon", json!({ "id": 1, "model": "claws" })),
                ResourceValue::new("weapon", json!({ "id": 2, "model": "teeth" })),
            ],
        );
        weapons.insert(
            "7".to_string(),
            vec![ResourceValue::new("weapon", json!({ "id": 3, "model": "fangs" }))],
        );
        Self {
            critters: Mutex::new(critters),
            weapons: Mutex::new(weapons),
            next_id: AtomicUsize::new(100),
        }
    }

    pub fn empty() -> Self {
        Self {
            critters: Mutex::new(BTreeMap::new()),
            weapons: Mutex::new(BTreeMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    fn owner_id(step: &ResolveStep<'_>) -> Option<String> {
        step.parent
            .and_then(|p| p.field("id"))
            .map(std::string::ToString::to_string)
    }
}

impl ValueAccessor for ParkStore {
    fn get(&self, step: &ResolveStep<'_>) -> anyhow::Result<Option<ResourceValue>> {
        match step.collection.as_deref() {
            Some("critters") => {
                let segment = step.segment.unwrap_or_default();
                Ok(self.critters.lock().unwrap().get(segment).cloned())
            }
            Some("weapons") => {
                let owner = Self::owner_id(step)
                    .ok_or_else(|| anyhow::anyhow!("weapon lookup without an owner"))?;
                let segment = step.segment.unwrap_or_default();
                Ok(self
                    .weapons
                    .lock()
                    .unwrap()
                    .get(&owner)
                    .and_then(|ws| {
                        ws.iter()
                            .find(|w| w.field("id").map(ToString::to_string).as_deref()
                                == Some(segment))
                            .cloned()
                    }))
            }
            other => anyhow::bail!("unknown collection {other:?}"),
        }
    }

    fn query(&self, step: &ResolveStep<'_>) -> anyhow::Result<Vec<ResourceValue>> {
        match step.collection.as_deref() {
            Some("critters") => Ok(self.critters.lock().unwrap().values().cloned().collect()),
            Some("weapons") => {
                let owner = Self::owner_id(step)
                    .ok_or_else(|| anyhow::anyhow!("weapon query without an owner"))?;
                Ok(self
                    .weapons
                    .lock()
                    .unwrap()
                    .get(&owner)
                    .cloned()
                    .unwrap_or_default())
            }
            other => anyhow::bail!("unknown collection {other:?}"),
        }
    }
}

impl DataSource for ParkStore {
    fn create(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut data = body;
        if let Some(obj) = data.as_object_mut() {
            obj.insert("id".to_string(), json!(id));
        }
        match step.collection.as_deref() {
            Some("critters") => {
                let type_name = data
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("critter")
                    .to_string();
                let value = ResourceValue::new(&type_name, data);
                self.critters
                    .lock()
                    .unwrap()
                    .insert(id.to_string(), value.clone());
                Ok(value)
            }
            Some("weapons") => {
                let owner = Self::owner_id(step)
                    .ok_or_else(|| anyhow::anyhow!("weapon create without an owner"))?;
                let value = ResourceValue::new("weapon", data);
                self.weapons
                    .lock()
                    .unwrap()
                    .entry(owner)
                    .or_default()
                    .push(value.clone());
                Ok(value)
            }
            other => anyhow::bail!("unknown collection {other:?}"),
        }
    }

    fn update(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue> {
        match &step.node.kind {
            RouteKind::Item { .. } => {
                let segment = step.segment.unwrap_or_default();
                let mut critters = self.critters.lock().unwrap();
                let existing = critters
                    .get(segment)
                    .ok_or_else(|| anyhow::anyhow!("no critter {segment}"))?;
                let id = existing.field("id").cloned().unwrap_or(Value::Null);
                let mut data = body;
                if let Some(obj) = data.as_object_mut() {
                    obj.insert("id".to_string(), id);
                }
                let updated = ResourceValue::new(existing.type_name.as_ref(), data);
                critters.insert(segment.to_string(), updated.clone());
                Ok(updated)
            }
            RouteKind::Property { property, .. } => {
                let owner = Self::owner_id(step)
                    .ok_or_else(|| anyhow::anyhow!("property write without an owner"))?;
                let mut critters = self.critters.lock().unwrap();
                let existing = critters
                    .get_mut(&owner)
                    .ok_or_else(|| anyhow::anyhow!("no critter {owner}"))?;
                if let Some(obj) = existing.data.as_object_mut() {
                    obj.insert(property.name.to_string(), body);
                }
                Ok(existing.clone())
            }
            _ => anyhow::bail!("unsupported update target"),
        }
    }

    fn patch(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue> {
        let segment = step.segment.unwrap_or_default();
        let mut critters = self.critters.lock().unwrap();
        let existing = critters
            .get_mut(segment)
            .ok_or_else(|| anyhow::anyhow!("no critter {segment}"))?;
        if let (Some(target), Some(delta)) = (existing.data.as_object_mut(), body.as_object()) {
            for (k, v) in delta {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(existing.clone())
    }

    fn delete(&self, step: &ResolveStep<'_>) -> anyhow::Result<()> {
        let segment = step.segment.unwrap_or_default();
        let mut critters = self.critters.lock().unwrap();
        if critters.remove(segment).is_none() {
            anyhow::bail!("no critter {segment}");
        }
        self.weapons.lock().unwrap().remove(segment);
        Ok(())
    }
}

/// Wrapper that counts accessor fetches, for asserting I/O bounds.
pub struct CountingStore {
    inner: ParkStore,
    pub gets: AtomicUsize,
    pub queries: AtomicUsize,
}

impl CountingStore {
    pub fn seeded() -> Self {
        Self {
            inner: ParkStore::seeded(),
            gets: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ValueAccessor for CountingStore {
    fn get(&self, step: &ResolveStep<'_>) -> anyhow::Result<Option<ResourceValue>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(step)
    }

    fn query(&self, step: &ResolveStep<'_>) -> anyhow::Result<Vec<ResourceValue>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(step)
    }
}

impl DataSource for CountingStore {
    fn create(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue> {
        self.inner.create(step, body)
    }

    fn update(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue> {
        self.inner.update(step, body)
    }

    fn patch(&self, step: &ResolveStep<'_>, body: Value) -> anyhow::Result<ResourceValue> {
        self.inner.patch(step, body)
    }

    fn delete(&self, step: &ResolveStep<'_>) -> anyhow::Result<()> {
        self.inner.delete(step)
    }
}
