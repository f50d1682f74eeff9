//! Entity pool: typed entities materialized from a snapshot
//!
//! A pool is built from one [`Snapshot`]. Entities requested directly
//! (every entity of the selected types, or ones asked for by id) live in
//! the pool's own map; entities pulled in only to satisfy a reference or a
//! passive relation live in a second map.
//!
//! Forward references to entities that are not in the pool yet are queued
//! by target id. Whatever path later adds the target drains its queue, so
//! each waiting reference is filled exactly once. References whose target
//! has no facts in the snapshot stay unresolved, which is not an error.

use crate::core::fact::{Fact, FactPattern, Literal, Node, PropertyId, ResourceId};
use crate::core::temporal::{TimeInstant, TimeSpan};
use crate::entity::filter::{EntityFilter, ResourceFilter};
use crate::entity::model::{EmbeddedValue, Entity, PropertyValue};
use crate::entity::schema::{PropertyDescriptor, PropertyKind, SchemaRegistry, TypeDescriptor, TypeId};
use crate::error::{Error, Result};
use crate::storage::fact_set::FactSet;
use crate::storage::graph_store::Snapshot;
use crate::vocab;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Notifications recorded while the pool grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// An entity was added to the pool
    Materialized {
        id: ResourceId,
        type_id: TypeId,
        direct: bool,
    },
    /// A queued forward reference was filled
    ReferenceResolved {
        holder: ResourceId,
        property: PropertyId,
        target: ResourceId,
    },
    /// A passive relation found `source` pointing at `holder`
    EntityLoaded {
        holder: ResourceId,
        property: PropertyId,
        source: ResourceId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingReference {
    holder: ResourceId,
    property: PropertyId,
}

pub struct EntityPool<'s> {
    registry: Arc<SchemaRegistry>,
    snapshot: &'s Snapshot<'s>,
    span: TimeSpan,
    entities: BTreeMap<ResourceId, Entity>,
    referenced: BTreeMap<ResourceId, Entity>,
    pending: BTreeMap<ResourceId, Vec<PendingReference>>,
    /// Targets known to have no facts in the snapshot
    unresolvable: BTreeSet<ResourceId>,
    events: Vec<PoolEvent>,
    resource_filter: Option<Box<dyn ResourceFilter + 's>>,
    entity_filter: Option<Box<dyn EntityFilter + 's>>,
}

/// Configures which entities a pool materializes up front.
pub struct EntityPoolBuilder<'s> {
    registry: Arc<SchemaRegistry>,
    snapshot: &'s Snapshot<'s>,
    types: Option<Vec<TypeId>>,
    resource_filter: Option<Box<dyn ResourceFilter + 's>>,
    entity_filter: Option<Box<dyn EntityFilter + 's>>,
}

impl<'s> EntityPoolBuilder<'s> {
    /// Only materialize these types (default: every registered type)
    pub fn types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeId>,
    {
        self.types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn resource_filter(mut self, filter: impl ResourceFilter + 's) -> Self {
        self.resource_filter = Some(Box::new(filter));
        self
    }

    pub fn entity_filter(mut self, filter: impl EntityFilter + 's) -> Self {
        self.entity_filter = Some(Box::new(filter));
        self
    }

    pub fn build(self) -> Result<EntityPool<'s>> {
        let descriptors: Vec<Arc<TypeDescriptor>> = match &self.types {
            Some(ids) => ids
                .iter()
                .map(|id| self.registry.require(id.as_str()).cloned())
                .collect::<Result<_>>()?,
            None => self.registry.types().cloned().collect(),
        };

        let mut pool = EntityPool {
            span: self.snapshot.validity()?,
            registry: self.registry,
            snapshot: self.snapshot,
            entities: BTreeMap::new(),
            referenced: BTreeMap::new(),
            pending: BTreeMap::new(),
            unresolvable: BTreeSet::new(),
            events: Vec::new(),
            resource_filter: self.resource_filter,
            entity_filter: self.entity_filter,
        };
        for descriptor in &descriptors {
            pool.load_type(descriptor)?;
        }

        debug!(
            span = %pool.span,
            entities = pool.entities.len(),
            pending = pool.pending_references(),
            "Materialized entity pool"
        );
        Ok(pool)
    }
}

impl<'s> EntityPool<'s> {
    /// Materialize every entity of every registered type in the snapshot.
    pub fn materialize(registry: Arc<SchemaRegistry>, snapshot: &'s Snapshot<'s>) -> Result<Self> {
        Self::builder(registry, snapshot).build()
    }

    /// A pool with nothing loaded; entities come in through [`request`](Self::request).
    pub fn empty(registry: Arc<SchemaRegistry>, snapshot: &'s Snapshot<'s>) -> Result<Self> {
        Self::builder(registry, snapshot)
            .types(std::iter::empty::<TypeId>())
            .build()
    }

    pub fn builder(registry: Arc<SchemaRegistry>, snapshot: &'s Snapshot<'s>) -> EntityPoolBuilder<'s> {
        EntityPoolBuilder {
            registry,
            snapshot,
            types: None,
            resource_filter: None,
            entity_filter: None,
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> &'s Snapshot<'s> {
        self.snapshot
    }

    /// Validity of every entity this pool produces
    pub fn span(&self) -> &TimeSpan {
        &self.span
    }

    fn load_type(&mut self, descriptor: &TypeDescriptor) -> Result<()> {
        let candidates = self.snapshot.facts().subjects(
            &PropertyId::new(vocab::RDF_TYPE),
            &Node::Resource(descriptor.id.clone()),
        );
        for id in candidates {
            if self.entities.contains_key(&id) {
                continue;
            }
            if let Some(filter) = &self.resource_filter {
                if !filter.accept(&id, &descriptor.id) {
                    trace!(%id, "Resource filtered out");
                    continue;
                }
            }
            let Some(entity) = self.fetch(&id)? else {
                continue;
            };
            if let Some(filter) = &self.entity_filter {
                if !filter.accept(&entity) {
                    trace!(%id, "Entity filtered out");
                    continue;
                }
            }
            self.place(entity, true);
        }
        Ok(())
    }

    /// Build an entity from the snapshot's facts about `id`. `None` when
    /// the snapshot knows nothing about it.
    fn fetch(&self, id: &ResourceId) -> Result<Option<Entity>> {
        let facts = self.snapshot.find(&FactPattern::any().subject(id));
        if facts.is_empty() {
            return Ok(None);
        }
        let descriptor = self.type_of(id, &facts)?;
        let mut entity = Entity::new(descriptor.clone(), id.clone(), self.span);
        for property in descriptor.direct_properties() {
            self.load_property(&mut entity, property, &facts);
        }
        trace!(%id, type_id = %descriptor.id, "Loaded entity");
        Ok(Some(entity))
    }

    /// The single registered type among the resource's type facts.
    fn type_of(&self, id: &ResourceId, facts: &[Fact]) -> Result<Arc<TypeDescriptor>> {
        let declared: Vec<&ResourceId> = facts
            .iter()
            .filter(|fact| fact.predicate.as_str() == vocab::RDF_TYPE)
            .filter_map(|fact| fact.object.as_resource())
            .collect();
        let registered: Vec<&Arc<TypeDescriptor>> = declared
            .iter()
            .filter_map(|type_id| self.registry.get(type_id.as_str()))
            .collect();
        match registered.as_slice() {
            [descriptor] => Ok((*descriptor).clone()),
            [] if declared.is_empty() => Err(Error::Corruption(format!(
                "{id} has facts but no type"
            ))),
            [] => Err(Error::Corruption(format!(
                "{id} has no registered type (declared: {})",
                declared
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
            _ => Err(Error::Corruption(format!(
                "{id} has {} registered types",
                registered.len()
            ))),
        }
    }

    fn load_property(&self, entity: &mut Entity, property: &PropertyDescriptor, facts: &[Fact]) {
        let candidates: Vec<&Fact> = facts
            .iter()
            .filter(|fact| fact.predicate == property.id)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let literals: Vec<&Fact> = candidates
            .iter()
            .copied()
            .filter(|fact| fact.object.as_literal().is_some())
            .collect();
        let resources: Vec<&Fact> = candidates
            .iter()
            .copied()
            .filter(|fact| fact.object.as_resource().is_some())
            .collect();
        let id = property.id.clone();

        match &property.kind {
            PropertyKind::Literal => {
                if let Some(literal) = self.pick(&literals).and_then(|f| f.object.as_literal()) {
                    entity.put(id, PropertyValue::Literal(literal.clone()));
                }
            }
            PropertyKind::LiteralSet => {
                let values: BTreeSet<Literal> = literals
                    .iter()
                    .filter_map(|f| f.object.as_literal())
                    .cloned()
                    .collect();
                if !values.is_empty() {
                    entity.put(id, PropertyValue::Literals(values));
                }
            }
            PropertyKind::Reference { .. } => {
                if let Some(target) = self.pick(&resources).and_then(|f| f.object.as_resource()) {
                    entity.mark_unresolved(id, target.clone());
                }
            }
            PropertyKind::ReferenceSet { .. } => {
                for target in self.members(&resources) {
                    entity.mark_unresolved(id.clone(), target);
                }
            }
            PropertyKind::Embedded => {
                if let Some(node) = self.pick(&resources).and_then(|f| f.object.as_resource()) {
                    let value = self.embedded(node);
                    if !value.is_empty() {
                        entity.put(id, PropertyValue::Embedded(value));
                    }
                }
            }
            PropertyKind::EmbeddedSet => {
                let values: Vec<EmbeddedValue> = resources
                    .iter()
                    .filter_map(|f| f.object.as_resource())
                    .map(|node| self.embedded(node))
                    .filter(|value| !value.is_empty())
                    .collect();
                if !values.is_empty() {
                    entity.put(id, PropertyValue::EmbeddedSet(values));
                }
            }
            PropertyKind::PassiveLink { .. } | PropertyKind::PassiveBag { .. } => {}
        }
        if literals.len() + resources.len() < candidates.len() {
            trace!(property = %property.id, "Ignored facts of the wrong shape");
        }
    }

    /// Among candidate facts for a single-valued property, the one from the
    /// narrowest source partition; ties go to the greatest fact.
    fn pick<'f>(&self, facts: &[&'f Fact]) -> Option<&'f Fact> {
        let narrowness = |fact: &Fact| -> (TimeInstant, Reverse<TimeInstant>) {
            let span = self
                .snapshot
                .source_span(fact)
                .copied()
                .unwrap_or_else(TimeSpan::universal);
            (span.begin(), Reverse(span.end()))
        };
        facts
            .iter()
            .copied()
            .max_by(|a, b| narrowness(a).cmp(&narrowness(b)).then_with(|| a.cmp(b)))
    }

    /// Targets of a reference set: the members of each bag node, or the
    /// node itself when it is neither typed as a bag nor has members.
    fn members(&self, facts: &[&Fact]) -> BTreeSet<ResourceId> {
        let member = PropertyId::new(vocab::RDF_MEMBER);
        let mut targets = BTreeSet::new();
        for node in facts.iter().filter_map(|f| f.object.as_resource()) {
            let members: Vec<ResourceId> = self
                .snapshot
                .facts()
                .objects(node, &member)
                .into_iter()
                .filter_map(|object| object.as_resource().cloned())
                .collect();
            let is_bag =
                self.snapshot
                    .contains(&Fact::link(node.clone(), vocab::RDF_TYPE, vocab::RDF_BAG));
            if members.is_empty() && !is_bag {
                targets.insert(node.clone());
            } else {
                targets.extend(members);
            }
        }
        targets
    }

    fn embedded(&self, node: &ResourceId) -> EmbeddedValue {
        let mut value = EmbeddedValue::new();
        for fact in self.snapshot.find(&FactPattern::any().subject(node)) {
            if let Node::Literal(literal) = fact.object {
                value.insert(fact.predicate, literal);
            }
        }
        value
    }

    /// Store an entity and settle references in both directions: its own
    /// references to entities already here, and queued references to it.
    fn place(&mut self, mut entity: Entity, direct: bool) {
        let id = entity.id().clone();
        let outgoing: Vec<(PropertyId, ResourceId)> =
            entity.unresolved_references().cloned().collect();
        for (property, target) in outgoing {
            if self.contains(target.as_str()) {
                entity.resolve_reference(&property, &target);
                self.events.push(PoolEvent::ReferenceResolved {
                    holder: id.clone(),
                    property,
                    target,
                });
            } else {
                self.pending.entry(target).or_default().push(PendingReference {
                    holder: id.clone(),
                    property,
                });
            }
        }

        self.events.push(PoolEvent::Materialized {
            id: id.clone(),
            type_id: entity.type_id().clone(),
            direct,
        });
        if direct {
            self.referenced.remove(&id);
            self.entities.insert(id.clone(), entity);
        } else {
            self.referenced.insert(id.clone(), entity);
        }
        self.drain_pending(&id);
    }

    fn drain_pending(&mut self, target: &ResourceId) {
        let Some(waiting) = self.pending.remove(target) else {
            return;
        };
        for PendingReference { holder, property } in waiting {
            // The holder may have been removed since it queued the reference.
            let Some(entity) = self.get_mut(holder.as_str()) else {
                continue;
            };
            if entity.resolve_reference(&property, target) {
                self.events.push(PoolEvent::ReferenceResolved {
                    holder,
                    property,
                    target: target.clone(),
                });
            }
        }
    }

    /// Add an entity to the pool's own map, filling any references queued
    /// for it.
    pub fn insert(&mut self, entity: Entity) {
        self.place(entity, true);
    }

    /// Directly request an entity by id, loading it from the snapshot if
    /// needed. `NotFound` if the snapshot has no facts about it; `None` if
    /// the pool's filters reject it.
    pub fn request(&mut self, id: &str) -> Result<Option<&Entity>> {
        if self.entities.contains_key(id) {
            return Ok(self.entities.get(id));
        }
        if let Some(entity) = self.referenced.remove(id) {
            self.entities.insert(entity.id().clone(), entity);
            return Ok(self.entities.get(id));
        }

        let resource = ResourceId::new(id);
        let entity = self
            .fetch(&resource)?
            .ok_or_else(|| Error::NotFound(format!("{id} is not in the snapshot")))?;
        let accepted = self
            .resource_filter
            .as_ref()
            .map_or(true, |filter| filter.accept(&resource, entity.type_id()))
            && self
                .entity_filter
                .as_ref()
                .map_or(true, |filter| filter.accept(&entity));
        if !accepted {
            return Ok(None);
        }
        self.place(entity, true);
        Ok(self.entities.get(id))
    }

    /// Load referenced entities until no queued reference can make progress.
    /// Returns how many entities were pulled in; a second call with nothing
    /// new to load returns 0.
    pub fn resolve_direct_references(&mut self) -> Result<usize> {
        let mut loaded = 0;
        loop {
            let targets: Vec<ResourceId> = self
                .pending
                .keys()
                .filter(|target| !self.unresolvable.contains(*target))
                .cloned()
                .collect();
            if targets.is_empty() {
                break;
            }
            for target in targets {
                if self.contains(target.as_str()) {
                    self.drain_pending(&target);
                    continue;
                }
                match self.fetch(&target)? {
                    Some(entity) => {
                        self.place(entity, false);
                        loaded += 1;
                    }
                    None => {
                        trace!(%target, "Reference target not in snapshot");
                        self.unresolvable.insert(target);
                    }
                }
            }
        }
        debug!(loaded, pending = self.pending_references(), "Resolved direct references");
        Ok(loaded)
    }

    /// Values of a passive property, loading the entity's passive relations
    /// on first access.
    pub fn passive(&mut self, id: &str, property: &str) -> Result<Vec<ResourceId>> {
        let loaded = {
            let entity = self.entity(id)?;
            let declared = entity.descriptor().property(property).ok_or_else(|| {
                Error::NotFound(format!("type {} has no property {property}", entity.type_id()))
            })?;
            if !declared.kind.is_passive() {
                return Err(Error::Validation(format!(
                    "{property} of {} is not a passive property",
                    entity.type_id()
                )));
            }
            entity.is_passive_loaded()
        };
        if !loaded {
            self.load_passive(id)?;
        }
        Ok(self
            .entity(id)?
            .references(property)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Run the reverse lookups for every passive property of an entity.
    /// Entities found this way join the pool as referenced entities.
    /// Returns the number of matches; 0 if already loaded.
    pub fn load_passive(&mut self, id: &str) -> Result<usize> {
        let entity = self.entity(id)?;
        if entity.is_passive_loaded() {
            return Ok(0);
        }
        let descriptor = entity.descriptor().clone();
        let holder = entity.id().clone();

        let mut matches: Vec<(PropertyId, ResourceId)> = Vec::new();
        for property in descriptor.passive_properties() {
            let sources = match &property.kind {
                PropertyKind::PassiveLink { source, predicate } => {
                    self.sources(predicate, &holder, source)
                }
                PropertyKind::PassiveBag { source, predicate } => {
                    let bags = self.snapshot.facts().subjects(
                        &PropertyId::new(vocab::RDF_MEMBER),
                        &Node::Resource(holder.clone()),
                    );
                    let mut sources = self.sources(predicate, &holder, source);
                    for bag in bags {
                        sources.extend(self.sources(predicate, &bag, source));
                    }
                    sources
                }
                _ => continue,
            };
            matches.extend(sources.into_iter().map(|s| (property.id.clone(), s)));
        }

        for (_, source) in &matches {
            if !self.contains(source.as_str()) {
                if let Some(entity) = self.fetch(source)? {
                    self.place(entity, false);
                }
            }
        }

        let entity = self
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("{id} is not in the pool")))?;
        for (property, source) in &matches {
            entity.add_passive(property, source.clone());
        }
        entity.set_passive_loaded();

        let count = matches.len();
        for (property, source) in matches {
            self.events.push(PoolEvent::EntityLoaded {
                holder: holder.clone(),
                property,
                source,
            });
        }
        debug!(%holder, matches = count, "Loaded passive relations");
        Ok(count)
    }

    /// Subjects of `(?, predicate, object)` typed as `source_type`
    fn sources(&self, predicate: &PropertyId, object: &ResourceId, source_type: &TypeId) -> BTreeSet<ResourceId> {
        self.snapshot
            .facts()
            .subjects(predicate, &Node::Resource(object.clone()))
            .into_iter()
            .filter(|subject| {
                self.snapshot
                    .contains(&Fact::link(subject.clone(), vocab::RDF_TYPE, source_type.clone()))
            })
            .collect()
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        if self.entities.contains_key(id) {
            return self.entities.get_mut(id);
        }
        self.referenced.get_mut(id)
    }

    /// Entity in either map
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id).or_else(|| self.referenced.get(id))
    }

    pub fn entity(&self, id: &str) -> Result<&Entity> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("{id} is not in the pool")))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id) || self.referenced.contains_key(id)
    }

    /// Directly requested entities, in id order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities present only to satisfy references or passive relations
    pub fn referenced_entities(&self) -> impl Iterator<Item = &Entity> {
        self.referenced.values()
    }

    pub fn of_type<'a>(&'a self, type_id: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities
            .values()
            .filter(move |entity| entity.type_id().as_str() == type_id)
    }

    /// Remove an entity from the pool. References other entities already
    /// hold to it are left as they are.
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        self.entities
            .remove(id)
            .or_else(|| self.referenced.remove(id))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// No entity in the pool waits on a forward reference.
    pub fn is_fully_resolved(&self) -> bool {
        self.entities
            .values()
            .chain(self.referenced.values())
            .all(Entity::is_direct_references_resolved)
    }

    pub fn pending_references(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::graph_store::TemporalGraphStore;

    fn at(s: &str) -> TimeInstant {
        s.parse().unwrap()
    }

    fn span(s: &str) -> TimeSpan {
        s.parse().unwrap()
    }

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(
            SchemaRegistry::from_json_str(
                r#"{"types": [
                    {"id": "ex:Person", "properties": [
                        {"id": "ex:name", "kind": "literal"},
                        {"id": "ex:nick", "kind": "literal_set"},
                        {"id": "ex:employer", "kind": "reference", "target": "ex:Company"},
                        {"id": "ex:address", "kind": "embedded"}
                    ]},
                    {"id": "ex:Company", "properties": [
                        {"id": "ex:name", "kind": "literal"},
                        {"id": "ex:boards", "kind": "reference_set", "target": "ex:Person"},
                        {"id": "ex:staff", "kind": "passive_link", "source": "ex:Person", "predicate": "ex:employer"}
                    ]},
                    {"id": "ex:Club", "properties": [
                        {"id": "ex:members", "kind": "reference_set", "target": "ex:Person"}
                    ]}
                ]}"#,
            )
            .unwrap(),
        )
    }

    fn store() -> TemporalGraphStore {
        let always = TimeSpan::universal();
        let mut store = TemporalGraphStore::default();
        for fact in [
            Fact::link("ex:alice", vocab::RDF_TYPE, "ex:Person"),
            Fact::link("ex:bob", vocab::RDF_TYPE, "ex:Person"),
            Fact::link("ex:acme", vocab::RDF_TYPE, "ex:Company"),
            Fact::literal("ex:acme", "ex:name", "Acme"),
            Fact::literal("ex:bob", "ex:name", "Bob"),
            Fact::literal("ex:alice", "ex:nick", "Al"),
            Fact::literal("ex:alice", "ex:nick", "Ali"),
            Fact::link("ex:alice", "ex:address", "ex:addr1"),
            Fact::literal("ex:addr1", "ex:city", "Paris"),
            Fact::literal("ex:addr1", "ex:zip", "75001"),
            Fact::link("ex:acme", "ex:boards", "ex:board1"),
            Fact::link("ex:board1", vocab::RDF_TYPE, vocab::RDF_BAG),
            Fact::link("ex:board1", vocab::RDF_MEMBER, "ex:alice"),
            Fact::link("ex:board1", vocab::RDF_MEMBER, "ex:bob"),
        ] {
            store.add(&always, fact).unwrap();
        }
        store
            .add(&span("1900/1950"), Fact::literal("ex:alice", "ex:name", "Alice"))
            .unwrap();
        store
            .add(&span("1920/1930"), Fact::literal("ex:alice", "ex:name", "Alicia"))
            .unwrap();
        store
            .add(&span("1910/1940"), Fact::link("ex:alice", "ex:employer", "ex:acme"))
            .unwrap();
        store
            .add(&span("1910/1940"), Fact::link("ex:bob", "ex:employer", "ex:acme"))
            .unwrap();
        store
    }

    #[test]
    fn test_materialize_all_types() {
        let store = store();
        let snapshot = store.snapshot_at(at("1915"));
        let pool = EntityPool::materialize(registry(), &snapshot).unwrap();

        assert_eq!(pool.len(), 3);
        assert!(pool.is_fully_resolved());
        let alice = pool.entity("ex:alice").unwrap();
        assert_eq!(alice.text("ex:name"), Some("Alice"));
        assert_eq!(alice.reference("ex:employer").map(|r| r.as_str()), Some("ex:acme"));
        assert!(matches!(alice.value("ex:nick"), Some(PropertyValue::Literals(n)) if n.len() == 2));
        let Some(PropertyValue::Embedded(address)) = alice.value("ex:address") else {
            panic!("address not loaded");
        };
        assert_eq!(address.first("ex:city"), Some(&Literal::from("Paris")));
        assert_eq!(alice.span(), &span("1910/1920"));

        let acme = pool.entity("ex:acme").unwrap();
        assert_eq!(acme.references("ex:boards").len(), 2);
        assert_eq!(pool.of_type("ex:Person").count(), 2);
    }

    #[test]
    fn test_narrowest_partition_wins() {
        let store = store();
        let snapshot = store.snapshot_at(at("1925"));
        let pool = EntityPool::materialize(registry(), &snapshot).unwrap();
        assert_eq!(pool.entity("ex:alice").unwrap().text("ex:name"), Some("Alicia"));
    }

    #[test]
    fn test_partition_boundary_takes_the_new_value() {
        let mut store = TemporalGraphStore::default();
        store
            .add(&TimeSpan::universal(), Fact::link("ex:alice", vocab::RDF_TYPE, "ex:Person"))
            .unwrap();
        for (s, fact) in [
            ("1900/1950", Fact::literal("ex:alice", "ex:name", "Alice")),
            ("1920/1930", Fact::literal("ex:alice", "ex:name", "Alicia")),
            ("1900/1920", Fact::literal("ex:alice", "ex:nick", "X")),
            ("1920/1960", Fact::literal("ex:alice", "ex:nick", "Y")),
        ] {
            store.add(&span(s), fact).unwrap();
        }
        let nicks = |entity: &Entity| match entity.value("ex:nick") {
            Some(PropertyValue::Literals(values)) => values.iter().cloned().collect::<Vec<_>>(),
            _ => Vec::new(),
        };

        let snapshot = store.snapshot_at(at("1920"));
        let pool = EntityPool::materialize(registry(), &snapshot).unwrap();
        let alice = pool.entity("ex:alice").unwrap();
        assert_eq!(alice.text("ex:name"), Some("Alicia"));
        assert_eq!(nicks(alice), vec![Literal::from("Y")]);
        assert_eq!(alice.span(), &span("1920/1930"));

        let snapshot = store.snapshot_at(at("1930"));
        let pool = EntityPool::materialize(registry(), &snapshot).unwrap();
        let alice = pool.entity("ex:alice").unwrap();
        assert_eq!(alice.text("ex:name"), Some("Alice"));
        assert_eq!(alice.span(), &span("1930/1950"));

        let snapshot = store.snapshot_at(at("1950"));
        let pool = EntityPool::materialize(registry(), &snapshot).unwrap();
        let alice = pool.entity("ex:alice").unwrap();
        assert_eq!(alice.text("ex:name"), Some("Alice"));
        assert_eq!(nicks(alice), vec![Literal::from("Y")]);
        assert_eq!(alice.span(), &span("1930/1950"));
    }

    #[test]
    fn test_forward_reference_resolves_when_target_arrives() {
        let store = store();
        let snapshot = store.snapshot_at(at("1915"));
        let mut pool = EntityPool::builder(registry(), &snapshot)
            .types(["ex:Person"])
            .build()
            .unwrap();

        let alice = pool.entity("ex:alice").unwrap();
        assert!(!alice.is_direct_references_resolved());
        assert_eq!(alice.reference("ex:employer"), None);
        assert_eq!(pool.pending_references(), 2);

        pool.request("ex:acme").unwrap();
        assert_eq!(pool.resolve_direct_references().unwrap(), 0);
        let alice = pool.entity("ex:alice").unwrap();
        assert!(alice.is_direct_references_resolved());
        assert_eq!(alice.reference("ex:employer").map(|r| r.as_str()), Some("ex:acme"));

        let resolved = pool
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, PoolEvent::ReferenceResolved { .. }))
            .count();
        assert_eq!(resolved, 4);
    }

    #[test]
    fn test_resolution_pulls_in_referenced_entities() {
        let store = store();
        let snapshot = store.snapshot_at(at("1915"));
        let mut pool = EntityPool::builder(registry(), &snapshot)
            .types(["ex:Company"])
            .build()
            .unwrap();
        assert_eq!(pool.len(), 1);
        assert!(!pool.is_fully_resolved());

        assert_eq!(pool.resolve_direct_references().unwrap(), 2);
        assert!(pool.is_fully_resolved());
        assert_eq!(pool.referenced_entities().count(), 2);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.resolve_direct_references().unwrap(), 0);
    }

    #[test]
    fn test_empty_bag_has_no_members() {
        let mut store = store();
        for fact in [
            Fact::link("ex:initech", vocab::RDF_TYPE, "ex:Company"),
            Fact::link("ex:initech", "ex:boards", "ex:board2"),
            Fact::link("ex:board2", vocab::RDF_TYPE, vocab::RDF_BAG),
        ] {
            store.add(&TimeSpan::universal(), fact).unwrap();
        }
        let snapshot = store.snapshot_at(at("1915"));
        let mut pool = EntityPool::materialize(registry(), &snapshot).unwrap();
        pool.resolve_direct_references().unwrap();

        let initech = pool.entity("ex:initech").unwrap();
        assert!(initech.is_direct_references_resolved());
        assert!(initech.references("ex:boards").is_empty());
        assert!(pool.get("ex:board2").is_none());
        assert!(pool.is_fully_resolved());
    }

    #[test]
    fn test_dangling_reference_is_not_an_error() {
        let mut store = store();
        store
            .add(&TimeSpan::universal(), Fact::link("ex:carol", vocab::RDF_TYPE, "ex:Person"))
            .unwrap();
        store
            .add(&TimeSpan::universal(), Fact::link("ex:carol", "ex:employer", "ex:ghost"))
            .unwrap();
        let snapshot = store.snapshot_at(at("1800"));
        let mut pool = EntityPool::materialize(registry(), &snapshot).unwrap();
        assert_eq!(pool.resolve_direct_references().unwrap(), 0);
        let carol = pool.entity("ex:carol").unwrap();
        assert!(!carol.is_direct_references_resolved());
        assert_eq!(carol.reference("ex:employer"), None);
        assert_eq!(pool.resolve_direct_references().unwrap(), 0);
    }

    #[test]
    fn test_passive_link_loads_on_first_access() {
        let store = store();
        let snapshot = store.snapshot_at(at("1915"));
        let mut pool = EntityPool::builder(registry(), &snapshot)
            .types(["ex:Company"])
            .build()
            .unwrap();
        assert!(!pool.entity("ex:acme").unwrap().is_passive_loaded());

        let staff = pool.passive("ex:acme", "ex:staff").unwrap();
        assert_eq!(staff, vec![ResourceId::new("ex:alice"), ResourceId::new("ex:bob")]);
        assert!(pool.entity("ex:acme").unwrap().is_passive_loaded());
        assert!(pool.get("ex:bob").is_some());
        assert_eq!(pool.load_passive("ex:acme").unwrap(), 0);

        let loaded = pool
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, PoolEvent::EntityLoaded { .. }))
            .count();
        assert_eq!(loaded, 2);

        assert!(pool.passive("ex:acme", "ex:name").is_err());
        assert!(pool.passive("ex:acme", "ex:nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_passive_bag() {
        let registry = Arc::new(
            SchemaRegistry::build([
                TypeDescriptor::new("ex:Person").with_property(
                    "ex:clubs",
                    PropertyKind::PassiveBag {
                        source: "ex:Club".into(),
                        predicate: "ex:members".into(),
                    },
                ),
                TypeDescriptor::new("ex:Club").with_property(
                    "ex:members",
                    PropertyKind::ReferenceSet {
                        target: "ex:Person".into(),
                    },
                ),
            ])
            .unwrap(),
        );
        let always = TimeSpan::universal();
        let mut store = TemporalGraphStore::default();
        for fact in [
            Fact::link("ex:alice", vocab::RDF_TYPE, "ex:Person"),
            Fact::link("ex:chess", vocab::RDF_TYPE, "ex:Club"),
            Fact::link("ex:chess", "ex:members", "ex:bag"),
            Fact::link("ex:bag", vocab::RDF_MEMBER, "ex:alice"),
            Fact::link("ex:golf", vocab::RDF_TYPE, "ex:Club"),
            Fact::link("ex:golf", "ex:members", "ex:alice"),
        ] {
            store.add(&always, fact).unwrap();
        }
        let snapshot = store.snapshot_at(at("2000"));
        let mut pool = EntityPool::builder(registry, &snapshot)
            .types(["ex:Person"])
            .build()
            .unwrap();
        let clubs = pool.passive("ex:alice", "ex:clubs").unwrap();
        assert_eq!(clubs, vec![ResourceId::new("ex:chess"), ResourceId::new("ex:golf")]);
    }

    #[test]
    fn test_filters_apply_to_direct_entities_only() {
        let store = store();
        let snapshot = store.snapshot_at(at("1915"));
        let mut pool = EntityPool::builder(registry(), &snapshot)
            .resource_filter(|id: &ResourceId, _: &TypeId| id.as_str() != "ex:bob")
            .entity_filter(|entity: &Entity| entity.type_id().as_str() != "ex:Company")
            .build()
            .unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool.get("ex:acme").is_none());

        pool.resolve_direct_references().unwrap();
        assert!(pool.get("ex:acme").is_some());
        assert_eq!(pool.entities().count(), 1);
        assert!(pool.request("ex:bob").unwrap().is_none());
    }

    #[test]
    fn test_request_unknown_is_not_found() {
        let store = store();
        let snapshot = store.snapshot_at(at("1915"));
        let mut pool = EntityPool::empty(registry(), &snapshot).unwrap();
        assert!(pool.is_empty());
        assert!(pool.request("ex:nobody").unwrap_err().is_not_found());
        assert!(pool.request("ex:alice").unwrap().is_some());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_type_corruption() {
        let mut store = store();
        store
            .add(&TimeSpan::universal(), Fact::link("ex:bob", vocab::RDF_TYPE, "ex:Company"))
            .unwrap();
        let snapshot = store.snapshot_at(at("1915"));
        let err = EntityPool::materialize(registry(), &snapshot).err().unwrap();
        assert!(err.is_corruption());

        let mut store = TemporalGraphStore::default();
        store
            .add(&TimeSpan::universal(), Fact::link("ex:x", vocab::RDF_TYPE, "ex:Robot"))
            .unwrap();
        let snapshot = store.snapshot_at(at("1915"));
        let mut pool = EntityPool::empty(registry(), &snapshot).unwrap();
        assert!(pool.request("ex:x").unwrap_err().is_corruption());
    }

    #[test]
    fn test_materialization_is_repeatable() {
        let store = store();
        let snapshot = store.snapshot_at(at("1925"));
        let mut first = EntityPool::materialize(registry(), &snapshot).unwrap();
        let mut second = EntityPool::materialize(registry(), &snapshot).unwrap();
        first.resolve_direct_references().unwrap();
        second.resolve_direct_references().unwrap();
        let a: Vec<&Entity> = first.entities().collect();
        let b: Vec<&Entity> = second.entities().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_removed_holder_keeps_queue_harmless() {
        let store = store();
        let snapshot = store.snapshot_at(at("1915"));
        let mut pool = EntityPool::builder(registry(), &snapshot)
            .types(["ex:Person"])
            .build()
            .unwrap();
        let removed = pool.remove("ex:bob").unwrap();
        assert_eq!(removed.id().as_str(), "ex:bob");
        pool.request("ex:acme").unwrap();
        assert!(pool.entity("ex:alice").unwrap().is_direct_references_resolved());
        assert!(pool.get("ex:bob").is_none());
    }
}
