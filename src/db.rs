//! Main database implementation

use crate::core::fact::Fact;
use crate::core::temporal::{TimeInstant, TimeSpan};
use crate::core::timeline::Timeline;
use crate::entity::{Entity, EntityPool, SchemaRegistry};
use crate::error::Result;
use crate::index::PartitionId;
use crate::storage::{MemoryFactSet, StoreImage, TemporalGraphStore};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Assemble the timeline of one entity from a store.
///
/// The lifespan is cut at every partition boundary strictly inside it. Each
/// elementary segment is materialized from a snapshot over that segment and
/// merged into the timeline, which is compacted at the end. Returns `None`
/// if no segment knows the entity.
pub fn build_timeline(
    store: &TemporalGraphStore,
    registry: &Arc<SchemaRegistry>,
    id: &str,
    lifespan: TimeSpan,
) -> Result<Option<Timeline>> {
    let (first, last) = (lifespan.begin(), lifespan.end());
    let mut cuts = vec![first];
    for boundary in store.index().boundaries() {
        if !(boundary.strictly_after(&first) && last.strictly_after(&boundary)) {
            continue;
        }
        if cuts.last().is_some_and(|cut| cut.can_unify(&boundary)) {
            continue;
        }
        cuts.push(boundary);
    }
    cuts.push(last);

    let mut timeline: Option<Timeline> = None;
    let mut segments = 0;
    for pair in cuts.windows(2) {
        let (begin, end) = (pair[0], pair[1]);
        let segment = if begin.is_big_bang() && end.is_dooms_day() {
            TimeSpan::universal()
        } else {
            TimeSpan::between(begin, end)?
        };
        let snapshot = store.snapshot_during(segment);
        let mut pool = EntityPool::empty(Arc::clone(registry), &snapshot)?;
        let found = match pool.request(id) {
            Ok(found) => found.is_some(),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };
        if !found {
            continue;
        }
        pool.resolve_direct_references()?;
        pool.load_passive(id)?;
        let entity = pool.entity(id)?;

        if timeline.is_none() {
            timeline = Some(Timeline::new(
                registry,
                id,
                entity.type_id().as_str(),
                lifespan,
            )?);
        }
        if let Some(timeline) = timeline.as_mut() {
            timeline.add_entity(entity)?;
        }
        segments += 1;
    }

    let timeline = timeline.map(|mut timeline| {
        timeline.compact();
        timeline
    });
    debug!(%id, %lifespan, segments, "Built timeline");
    Ok(timeline)
}

/// Main temporal database
///
/// Writes take the store's write lock one at a time; reads share the read
/// lock and see the store as of the last completed write.
#[derive(Clone)]
pub struct TemporalDB {
    store: Arc<RwLock<TemporalGraphStore>>,
    registry: Arc<SchemaRegistry>,
}

impl TemporalDB {
    /// Create a new in-memory database with the default store configuration
    pub fn in_memory(registry: impl Into<Arc<SchemaRegistry>>) -> Result<Self> {
        Ok(Self::with_store(TemporalGraphStore::default(), registry))
    }

    pub fn with_store(store: TemporalGraphStore, registry: impl Into<Arc<SchemaRegistry>>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            registry: registry.into(),
        }
    }

    /// Load a database from a store image file
    pub async fn open(
        path: impl AsRef<Path>,
        registry: impl Into<Arc<SchemaRegistry>>,
    ) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let image: StoreImage = serde_json::from_str(&raw)?;
        let store = TemporalGraphStore::from_image(image)?;
        info!(path = %path.as_ref().display(), partitions = store.index().len(), "Opened store");
        Ok(Self::with_store(store, registry))
    }

    /// Write the store image to `path`
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = self.store.read().await.to_image();
        let json = serde_json::to_string_pretty(&image)?;
        tokio::fs::write(path.as_ref(), json).await?;
        info!(path = %path.as_ref().display(), facts = image.fact_count(), "Saved store");
        Ok(())
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Add a fact valid during `span`; returns the partition it landed in
    pub async fn add(&self, span: TimeSpan, fact: Fact) -> Result<PartitionId> {
        self.store.write().await.add(&span, fact)
    }

    pub async fn remove(&self, span: TimeSpan, fact: &Fact) -> Result<bool> {
        self.store.write().await.remove(&span, fact)
    }

    /// Facts valid at an instant
    pub async fn facts_at(&self, instant: TimeInstant) -> MemoryFactSet {
        self.store.read().await.snapshot_at(instant).into_facts()
    }

    /// Facts valid throughout a span
    pub async fn facts_during(&self, span: TimeSpan) -> MemoryFactSet {
        self.store.read().await.snapshot_during(span).into_facts()
    }

    /// Every entity of every registered type at an instant, with direct
    /// references resolved
    pub async fn materialize_at(&self, instant: TimeInstant) -> Result<Vec<Entity>> {
        let store = self.store.read().await;
        let snapshot = store.snapshot_at(instant);
        let mut pool = EntityPool::materialize(Arc::clone(&self.registry), &snapshot)?;
        pool.resolve_direct_references()?;
        Ok(pool.entities().cloned().collect())
    }

    /// One entity at an instant, with references and passive relations
    /// loaded. `None` if the snapshot knows nothing about it.
    pub async fn entity_at(&self, id: &str, instant: TimeInstant) -> Result<Option<Entity>> {
        let store = self.store.read().await;
        let snapshot = store.snapshot_at(instant);
        let mut pool = EntityPool::empty(Arc::clone(&self.registry), &snapshot)?;
        match pool.request(id) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        }
        pool.resolve_direct_references()?;
        pool.load_passive(id)?;
        Ok(pool.get(id).cloned())
    }

    /// The merged timeline of one entity over `lifespan`
    pub async fn timeline(&self, id: &str, lifespan: TimeSpan) -> Result<Option<Timeline>> {
        let store = self.store.read().await;
        build_timeline(&store, &self.registry, id, lifespan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FactSet;
    use crate::vocab;

    fn at(s: &str) -> TimeInstant {
        s.parse().unwrap()
    }

    fn span(s: &str) -> TimeSpan {
        s.parse().unwrap()
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_json_str(
            r#"{"types": [
                {"id": "ex:Person", "properties": [
                    {"id": "ex:name", "kind": "literal"},
                    {"id": "ex:employer", "kind": "reference", "target": "ex:Company"}
                ]},
                {"id": "ex:Company", "properties": [
                    {"id": "ex:name", "kind": "literal"},
                    {"id": "ex:staff", "kind": "passive_link", "source": "ex:Person", "predicate": "ex:employer"}
                ]}
            ]}"#,
        )
        .unwrap()
    }

    async fn sample() -> TemporalDB {
        let db = TemporalDB::in_memory(registry()).unwrap();
        let always = TimeSpan::universal();
        db.add(always, Fact::link("ex:alice", vocab::RDF_TYPE, "ex:Person"))
            .await
            .unwrap();
        db.add(always, Fact::link("ex:acme", vocab::RDF_TYPE, "ex:Company"))
            .await
            .unwrap();
        db.add(always, Fact::literal("ex:acme", "ex:name", "Acme"))
            .await
            .unwrap();
        db.add(span("1900/1950"), Fact::literal("ex:alice", "ex:name", "Alice"))
            .await
            .unwrap();
        db.add(span("1920/1930"), Fact::literal("ex:alice", "ex:name", "Alicia"))
            .await
            .unwrap();
        db.add(span("1920/1930"), Fact::link("ex:alice", "ex:employer", "ex:acme"))
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_add_and_query_facts() {
        let db = sample().await;
        let name = Fact::literal("ex:alice", "ex:name", "Alice");

        assert!(db.facts_at(at("1910")).await.contains(&name));
        assert!(!db.facts_at(at("1960")).await.contains(&name));
        assert!(db.facts_during(span("1920/1925")).await.contains(&name));
        assert!(!db.facts_during(span("1940/1960")).await.contains(&name));

        assert!(db.remove(span("1900/1950"), &name).await.unwrap());
        assert!(!db.facts_at(at("1910")).await.contains(&name));
    }

    #[tokio::test]
    async fn test_universal_facts_land_in_universal_partition() {
        let db = TemporalDB::in_memory(registry()).unwrap();
        let id = db
            .add(TimeSpan::universal(), Fact::literal("ex:x", "ex:name", "X"))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "urn:partition:universal");
    }

    #[tokio::test]
    async fn test_materialize_at() {
        let db = sample().await;
        let entities = db.materialize_at(at("1925")).await.unwrap();
        assert_eq!(entities.len(), 2);
        let alice = entities.iter().find(|e| e.id().as_str() == "ex:alice").unwrap();
        assert_eq!(alice.text("ex:name"), Some("Alicia"));
        assert_eq!(alice.reference("ex:employer").map(|r| r.as_str()), Some("ex:acme"));
        assert_eq!(alice.span(), &span("1920/1930"));
    }

    #[tokio::test]
    async fn test_entity_at() {
        let db = sample().await;
        let acme = db.entity_at("ex:acme", at("1925")).await.unwrap().unwrap();
        assert_eq!(acme.references("ex:staff").len(), 1);
        let acme = db.entity_at("ex:acme", at("1910")).await.unwrap().unwrap();
        assert!(acme.references("ex:staff").is_empty());
        assert!(db.entity_at("ex:nobody", at("1925")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timeline_from_store() {
        let db = sample().await;
        let timeline = db
            .timeline("ex:alice", TimeSpan::universal())
            .await
            .unwrap()
            .unwrap();

        let names: Vec<Option<String>> = timeline
            .stages()
            .map(|stage| stage.text("ex:name").map(str::to_string))
            .collect();
        assert_eq!(
            names,
            vec![
                None,
                Some("Alice".to_string()),
                Some("Alicia".to_string()),
                Some("Alice".to_string()),
                None,
            ]
        );
        let stage = timeline.entity_at(at("1925")).unwrap();
        assert_eq!(stage.reference("ex:employer").map(|r| r.as_str()), Some("ex:acme"));
        assert_eq!(stage.span(), &span("1920/1930"));

        assert!(db
            .timeline("ex:nobody", TimeSpan::universal())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_boundary_instants_agree_with_timeline() {
        let db = sample().await;
        let timeline = db
            .timeline("ex:alice", TimeSpan::universal())
            .await
            .unwrap()
            .unwrap();
        for instant in ["1900", "1920", "1930", "1950"] {
            let from_store = db.entity_at("ex:alice", at(instant)).await.unwrap().unwrap();
            let from_timeline = timeline.entity_at(at(instant)).unwrap();
            assert_eq!(
                from_store.text("ex:name"),
                from_timeline.text("ex:name"),
                "name at {instant}"
            );
            assert_eq!(from_store.span(), from_timeline.span(), "span at {instant}");
        }
        let alice = db.entity_at("ex:alice", at("1930")).await.unwrap().unwrap();
        assert_eq!(alice.text("ex:name"), Some("Alice"));
        assert_eq!(alice.span(), &span("1930/1950"));
    }

    #[tokio::test]
    async fn test_timeline_universal_values_are_compacted() {
        let db = sample().await;
        let timeline = db
            .timeline("ex:acme", span("1900/2000"))
            .await
            .unwrap()
            .unwrap();
        assert!(timeline
            .universal_properties()
            .contains_key("ex:name"));
        assert!(timeline.records_for("ex:name").is_empty());
        assert_eq!(timeline.records_for("ex:staff").len(), 1);
    }

    #[tokio::test]
    async fn test_save_and_open() {
        let db = sample().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        db.save(&path).await.unwrap();

        let reopened = TemporalDB::open(&path, registry()).await.unwrap();
        assert_eq!(
            reopened.facts_at(at("1925")).await,
            db.facts_at(at("1925")).await
        );
        let entities = reopened.materialize_at(at("1925")).await.unwrap();
        assert_eq!(entities.len(), 2);
    }
}
