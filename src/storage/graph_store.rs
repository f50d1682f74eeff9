//! Temporal graph store: time-partitioned fact sets and flat snapshots

use crate::config::StoreConfig;
use crate::core::fact::{Fact, FactPattern, PropertyId, ResourceId};
use crate::core::temporal::{TimeInstant, TimeSpan};
use crate::error::{Error, Result};
use crate::index::{PartitionId, TimeDimensionIndex};
use crate::storage::fact_set::{FactSet, MemoryFactSet};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Owns every partition, the universal partition and the description set.
///
/// Writes take `&mut self`; a partition is created, described and indexed
/// in one step so the index and the storage always agree.
#[derive(Debug, Clone)]
pub struct TemporalGraphStore {
    config: StoreConfig,
    universal: MemoryFactSet,
    partitions: BTreeMap<PartitionId, MemoryFactSet>,
    description: MemoryFactSet,
    index: TimeDimensionIndex,
}

impl Default for TemporalGraphStore {
    fn default() -> Self {
        Self {
            config: StoreConfig::default(),
            universal: MemoryFactSet::new(),
            partitions: BTreeMap::new(),
            description: MemoryFactSet::new(),
            index: TimeDimensionIndex::new(),
        }
    }
}

/// Narrower of two spans: the later begin, then the earlier end.
fn is_narrower(candidate: &TimeSpan, current: &TimeSpan) -> bool {
    candidate.begin() > current.begin()
        || (candidate.begin() == current.begin() && candidate.end() < current.end())
}

/// Add a snapshot fact, keeping the narrowest span it was found under.
fn collect(
    facts: &mut MemoryFactSet,
    provenance: &mut HashMap<Fact, TimeSpan>,
    fact: &Fact,
    span: &TimeSpan,
) {
    facts.insert(fact.clone());
    provenance
        .entry(fact.clone())
        .and_modify(|current: &mut TimeSpan| {
            if is_narrower(span, current) {
                *current = *span;
            }
        })
        .or_insert(*span);
}

impl TemporalGraphStore {
    /// Create an empty store
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Reassemble a store from its parts, rebuilding the index from the
    /// description set. A described partition without facts comes back
    /// empty; facts in an undescribed partition are corruption.
    pub(crate) fn from_parts(
        config: StoreConfig,
        universal: MemoryFactSet,
        mut partitions: BTreeMap<PartitionId, MemoryFactSet>,
        description: MemoryFactSet,
    ) -> Result<Self> {
        config.validate()?;
        let index = TimeDimensionIndex::build(&description)?;
        for reserved in [&config.universal_partition, &config.description_graph] {
            let reserved = PartitionId::new(reserved.as_str());
            if index.span_of(&reserved).is_some() {
                return Err(Error::Corruption(format!(
                    "reserved partition {reserved} appears in the description set"
                )));
            }
        }
        if let Some(id) = partitions.keys().find(|id| index.span_of(id).is_none()) {
            return Err(Error::Corruption(format!(
                "partition {id} holds facts but has no description"
            )));
        }
        for (id, _) in index.iter() {
            if !partitions.contains_key(id) {
                warn!(partition = %id, "Described partition has no facts; creating it empty");
                partitions.insert(id.clone(), MemoryFactSet::new());
            }
        }
        Ok(Self {
            config,
            universal,
            partitions,
            description,
            index,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn universal_id(&self) -> PartitionId {
        PartitionId::new(self.config.universal_partition.as_str())
    }

    /// Name of the fact set holding partition descriptions
    pub fn description_id(&self) -> PartitionId {
        PartitionId::new(self.config.description_graph.as_str())
    }

    /// Add a fact valid during `span`, creating its partition if needed.
    /// Returns the partition the fact went to.
    pub fn add(&mut self, span: &TimeSpan, fact: Fact) -> Result<PartitionId> {
        if span.is_universal() {
            trace!(%fact, "Adding universal fact");
            self.universal.insert(fact);
            return Ok(self.universal_id());
        }

        let span = span.canonicalize();
        if let Some(id) = self.index.partition_for(&span).cloned() {
            trace!(%fact, partition = %id, "Adding fact");
            self.partitions.entry(id.clone()).or_default().insert(fact);
            return Ok(id);
        }

        let id = PartitionId::new(format!(
            "{}{}",
            self.config.partition_prefix,
            uuid::Uuid::new_v4()
        ));
        // Describe first: nothing is touched if the span cannot be indexed.
        let description = TimeDimensionIndex::describe(&id, &span)?;
        self.description.extend(description);
        self.index.register(id.clone(), span);
        self.partitions
            .insert(id.clone(), std::iter::once(fact).collect());
        debug!(partition = %id, %span, "Created partition");
        Ok(id)
    }

    /// Remove a fact from the partition for `span`. Returns `false` when
    /// there was no such fact. Emptied partitions stay until
    /// [`prune_empty_partitions`](Self::prune_empty_partitions).
    pub fn remove(&mut self, span: &TimeSpan, fact: &Fact) -> Result<bool> {
        if span.is_universal() {
            return Ok(self.universal.remove(fact));
        }
        let span = span.canonicalize();
        let Some(id) = self.index.partition_for(&span) else {
            return Ok(false);
        };
        Ok(self
            .partitions
            .get_mut(id)
            .is_some_and(|facts| facts.remove(fact)))
    }

    /// Every fact valid at `instant`, with the universal facts.
    pub fn snapshot_at(&self, instant: TimeInstant) -> Snapshot<'_> {
        let ids = self.index.partitions_at(&instant);
        self.assemble(SnapshotScope::At(instant), ids)
    }

    /// Every fact valid throughout `span`, with the universal facts.
    pub fn snapshot_during(&self, span: TimeSpan) -> Snapshot<'_> {
        let ids = self.index.partitions_covering(&span);
        self.assemble(SnapshotScope::During(span), ids)
    }

    /// Flatten the universal partition and the matched partitions.
    ///
    /// For an instant snapshot, a partition whose span ends at the instant
    /// (and does not also begin there) only contributes facts whose subject
    /// and predicate get no value from any other source. Where one value
    /// ends and another begins, the snapshot sees the new one.
    fn assemble(&self, scope: SnapshotScope, ids: Vec<PartitionId>) -> Snapshot<'_> {
        let instant = match scope {
            SnapshotScope::At(instant) => Some(instant),
            SnapshotScope::During(_) => None,
        };
        let ends_here = |span: &TimeSpan| {
            instant.is_some_and(|t| span.end().can_unify(&t) && !span.begin().can_unify(&t))
        };
        let begins_here =
            |span: &TimeSpan| instant.is_some_and(|t| span.begin().can_unify(&t));

        let mut facts = MemoryFactSet::new();
        let mut provenance = HashMap::new();
        for fact in self.universal.iter() {
            collect(&mut facts, &mut provenance, fact, &TimeSpan::universal());
        }

        let mut ending = Vec::new();
        let mut opening = false;
        for id in &ids {
            let (Some(span), Some(partition)) = (self.index.span_of(id), self.partitions.get(id))
            else {
                continue;
            };
            if ends_here(span) {
                ending.push((span, partition));
                continue;
            }
            opening |= begins_here(span) && !partition.is_empty();
            for fact in partition.iter() {
                collect(&mut facts, &mut provenance, fact, span);
            }
        }

        let live: HashSet<(ResourceId, PropertyId)> = facts
            .iter()
            .map(|fact| (fact.subject.clone(), fact.predicate.clone()))
            .collect();
        let mut closing = false;
        for (span, partition) in ending {
            for fact in partition.iter() {
                if live.contains(&(fact.subject.clone(), fact.predicate.clone())) {
                    trace!(%fact, "Superseded at the snapshot instant");
                    opening |= !facts.contains(fact);
                    continue;
                }
                collect(&mut facts, &mut provenance, fact, span);
                closing = true;
            }
        }

        debug!(
            scope = %scope,
            partitions = ids.len(),
            facts = facts.len(),
            "Assembled snapshot"
        );
        Snapshot {
            store: self,
            scope,
            facts,
            provenance,
            partitions: ids,
            closing: closing && !opening,
        }
    }

    /// Identifiers of all indexed partitions (the universal one excluded)
    pub fn partition_ids(&self) -> impl Iterator<Item = &PartitionId> {
        self.partitions.keys()
    }

    pub fn partition_span(&self, id: &PartitionId) -> Result<&TimeSpan> {
        self.index
            .span_of(id)
            .ok_or_else(|| Error::NotFound(format!("partition {id}")))
    }

    /// Facts of one partition. The universal and description identifiers
    /// name the universal set and the description set.
    pub fn facts_in(&self, id: &PartitionId) -> Result<&MemoryFactSet> {
        if *id == self.universal_id() {
            return Ok(&self.universal);
        }
        if *id == self.description_id() {
            return Ok(&self.description);
        }
        self.partitions
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("partition {id}")))
    }

    pub fn universal_facts(&self) -> &MemoryFactSet {
        &self.universal
    }

    /// The description fact set the index is built from
    pub fn description(&self) -> &MemoryFactSet {
        &self.description
    }

    pub fn index(&self) -> &TimeDimensionIndex {
        &self.index
    }

    /// Drop empty partitions from storage, index and description together.
    pub fn prune_empty_partitions(&mut self) -> Vec<PartitionId> {
        let empty: Vec<PartitionId> = self
            .partitions
            .iter()
            .filter(|(_, facts)| facts.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &empty {
            let subject = ResourceId::from(id);
            for fact in self.description.find(&FactPattern::any().subject(subject)) {
                self.description.remove(&fact);
            }
            self.index.unregister(id);
            self.partitions.remove(id);
        }
        if !empty.is_empty() {
            debug!(pruned = empty.len(), "Pruned empty partitions");
        }
        empty
    }

    /// Rebuild the index from the description set. Fails, leaving the
    /// current index in place, if the rebuilt index and storage disagree.
    pub fn rebuild_index(&mut self) -> Result<()> {
        let index = TimeDimensionIndex::build(&self.description)?;
        for id in self.partitions.keys() {
            if index.span_of(id).is_none() {
                return Err(Error::Corruption(format!(
                    "partition {id} has no description"
                )));
            }
        }
        if let Some((id, _)) = index.iter().find(|(id, _)| !self.partitions.contains_key(id)) {
            return Err(Error::Corruption(format!(
                "description names partition {id} which is not stored"
            )));
        }
        debug!(partitions = index.len(), "Rebuilt time dimension index");
        self.index = index;
        Ok(())
    }

    /// From the earliest partition begin to the latest partition end.
    pub fn extent(&self) -> Option<TimeSpan> {
        let begin = self.index.iter().map(|(_, span)| span.begin()).min()?;
        let end = self.index.iter().map(|(_, span)| span.end()).max()?;
        TimeSpan::between(begin, end).ok()
    }

    pub(crate) fn partitions(&self) -> &BTreeMap<PartitionId, MemoryFactSet> {
        &self.partitions
    }
}

/// What a snapshot was taken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotScope {
    At(TimeInstant),
    During(TimeSpan),
}

impl std::fmt::Display for SnapshotScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotScope::At(instant) => write!(f, "at {instant}"),
            SnapshotScope::During(span) => write!(f, "during {span}"),
        }
    }
}

/// A flat, read-only view of the facts valid at an instant or throughout
/// a span, with a back-reference to the store it came from.
#[derive(Debug, Clone)]
pub struct Snapshot<'a> {
    store: &'a TemporalGraphStore,
    scope: SnapshotScope,
    facts: MemoryFactSet,
    provenance: HashMap<Fact, TimeSpan>,
    partitions: Vec<PartitionId>,
    // Holds values that end at the instant and nothing that starts there.
    closing: bool,
}

impl<'a> Snapshot<'a> {
    pub fn store(&self) -> &'a TemporalGraphStore {
        self.store
    }

    pub fn scope(&self) -> SnapshotScope {
        self.scope
    }

    /// Partitions matched by the snapshot, besides the universal one
    pub fn partitions(&self) -> &[PartitionId] {
        &self.partitions
    }

    pub fn facts(&self) -> &MemoryFactSet {
        &self.facts
    }

    pub fn into_facts(self) -> MemoryFactSet {
        self.facts
    }

    pub fn find(&self, pattern: &FactPattern) -> Vec<Fact> {
        self.facts.find(pattern)
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Span of the narrowest partition the fact was found in.
    pub fn source_span(&self, fact: &Fact) -> Option<&TimeSpan> {
        self.provenance.get(fact)
    }

    /// The stretch of time this snapshot stays unchanged over.
    ///
    /// A span snapshot is valid over its span. An instant snapshot is valid
    /// from the nearest partition boundary at or before the instant up to
    /// the next boundary after it, unless it only holds values that end at
    /// the instant; then it is the stage that closes there.
    pub fn validity(&self) -> Result<TimeSpan> {
        let instant = match self.scope {
            SnapshotScope::During(span) => return Ok(span),
            SnapshotScope::At(instant) => instant,
        };
        let boundaries = self.store.index().boundaries();
        if self.closing {
            let end = boundaries
                .iter()
                .find(|b| b.can_unify(&instant))
                .copied()
                .unwrap_or(instant);
            let begin = boundaries
                .iter()
                .rev()
                .find(|b| b.at_or_before(&instant) && !b.can_unify(&instant))
                .copied()
                .unwrap_or(TimeInstant::BigBang);
            return TimeSpan::between(begin, end);
        }
        let begin = boundaries
            .iter()
            .rev()
            .find(|b| b.at_or_before(&instant))
            .copied()
            .unwrap_or(TimeInstant::BigBang);
        let end = boundaries
            .iter()
            .find(|b| b.strictly_after(&instant))
            .copied()
            .unwrap_or(TimeInstant::DoomsDay);
        if begin.is_big_bang() && end.is_dooms_day() {
            return Ok(TimeSpan::universal());
        }
        TimeSpan::between(begin, end)
    }
}
