//! Timeline: the merged, per-property history of one entity

use crate::core::fact::{PropertyId, ResourceId};
use crate::core::temporal::{TimeInstant, TimeSpan};
use crate::entity::{Entity, PropertyValue, SchemaRegistry, TypeDescriptor, TypeId};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

/// One property value stored under a sub-interval of the lifespan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyRecord {
    pub property: PropertyId,
    pub value: PropertyValue,
}

/// Timeline folds per-interval entity states into one property-level
/// history over a lifespan.
///
/// Values valid for the whole lifespan are kept apart from values that
/// change over sub-intervals. Sub-intervals of the same property never
/// overlap, and every sub-interval lies inside the lifespan.
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    #[serde(skip)]
    descriptor: Arc<TypeDescriptor>,
    entity_id: ResourceId,
    lifespan: TimeSpan,
    universal: BTreeMap<PropertyId, PropertyValue>,
    intervals: BTreeMap<TimeSpan, Vec<PropertyRecord>>,
}

impl Timeline {
    /// Create an empty timeline for an entity of a registered type
    pub fn new(
        registry: &SchemaRegistry,
        entity_id: impl Into<ResourceId>,
        type_id: &str,
        lifespan: TimeSpan,
    ) -> Result<Self> {
        Ok(Self {
            descriptor: registry.require(type_id)?.clone(),
            entity_id: entity_id.into(),
            lifespan,
            universal: BTreeMap::new(),
            intervals: BTreeMap::new(),
        })
    }

    pub fn entity_id(&self) -> &ResourceId {
        &self.entity_id
    }

    pub fn type_id(&self) -> &TypeId {
        &self.descriptor.id
    }

    pub fn lifespan(&self) -> &TimeSpan {
        &self.lifespan
    }

    /// Values valid for the whole lifespan
    pub fn universal_properties(&self) -> &BTreeMap<PropertyId, PropertyValue> {
        &self.universal
    }

    pub fn intervals(&self) -> &BTreeMap<TimeSpan, Vec<PropertyRecord>> {
        &self.intervals
    }

    /// Sub-interval entries of one property, in span order
    pub fn records_for(&self, property: &str) -> Vec<(&TimeSpan, &PropertyValue)> {
        self.intervals
            .iter()
            .flat_map(|(span, records)| {
                records
                    .iter()
                    .filter(move |r| r.property.as_str() == property)
                    .map(move |r| (span, &r.value))
            })
            .collect()
    }

    /// Merge every value of a materialized entity over the entity's span.
    pub fn add_entity(&mut self, entity: &Entity) -> Result<()> {
        if entity.id() != &self.entity_id {
            return Err(Error::Validation(format!(
                "entity {} does not belong to the timeline of {}",
                entity.id(),
                self.entity_id
            )));
        }
        if entity.type_id() != &self.descriptor.id {
            return Err(Error::Validation(format!(
                "entity {} has type {}, timeline expects {}",
                entity.id(),
                entity.type_id(),
                self.descriptor.id
            )));
        }
        for (property, value) in entity.properties() {
            self.add_property(entity.span(), property.clone(), value.clone())?;
        }
        Ok(())
    }

    /// Record `value` for `property` over `span`, trimming older entries of
    /// the same property so that none overlap.
    pub fn add_property(
        &mut self,
        span: &TimeSpan,
        property: impl Into<PropertyId>,
        value: PropertyValue,
    ) -> Result<()> {
        let property = property.into();
        let declared = self.descriptor.property(property.as_str()).ok_or_else(|| {
            Error::NotFound(format!(
                "type {} has no property {property}",
                self.descriptor.id
            ))
        })?;
        if !value.fits(&declared.kind) {
            return Err(Error::Validation(format!(
                "value {value} does not fit property {property}"
            )));
        }

        if *span == self.lifespan {
            self.set_universal(property, value);
            return Ok(());
        }
        let span = span.canonicalize();
        if !self.lifespan.contains_span(&span) {
            return Err(Error::Validation(format!(
                "span {span} is outside the lifespan {} of {}",
                self.lifespan, self.entity_id
            )));
        }
        let span = self.snap(span);
        if span == self.lifespan {
            self.set_universal(property, value);
            return Ok(());
        }

        self.reconcile(&property, &span)?;
        trace!(entity = %self.entity_id, %property, %span, "Added property interval");
        self.intervals
            .entry(span)
            .or_default()
            .push(PropertyRecord { property, value });
        Ok(())
    }

    fn set_universal(&mut self, property: PropertyId, value: PropertyValue) {
        for records in self.intervals.values_mut() {
            records.retain(|r| r.property != property);
        }
        self.intervals.retain(|_, records| !records.is_empty());
        self.universal.insert(property, value);
    }

    /// Pull bounds that unify with the lifespan's bounds onto them.
    fn snap(&self, span: TimeSpan) -> TimeSpan {
        let begin = if span.begin().can_unify(&self.lifespan.begin()) {
            self.lifespan.begin()
        } else {
            span.begin()
        };
        let end = if span.end().can_unify(&self.lifespan.end()) {
            self.lifespan.end()
        } else {
            span.end()
        };
        if (begin, end) == (span.begin(), span.end()) || begin.can_unify(&end) {
            return span;
        }
        TimeSpan::between(begin, end)
            .map(|snapped| snapped.canonicalize())
            .unwrap_or(span)
    }

    /// Cut older entries of `property` back to the parts `span` leaves
    /// uncovered.
    fn reconcile(&mut self, property: &PropertyId, span: &TimeSpan) -> Result<()> {
        let mut leftovers = Vec::new();
        for (old, records) in self.intervals.iter_mut() {
            if !old.overlaps(span) {
                continue;
            }
            let Some(position) = records.iter().position(|r| r.property == *property) else {
                continue;
            };
            let record = records.remove(position);
            if span.contains_span(old) {
                continue;
            }
            if old.begin() < span.begin() && !old.begin().can_unify(&span.begin()) {
                leftovers.push((
                    TimeSpan::between(old.begin(), span.begin())?.canonicalize(),
                    record.clone(),
                ));
            }
            if span.end() < old.end() && !span.end().can_unify(&old.end()) {
                leftovers.push((
                    TimeSpan::between(span.end(), old.end())?.canonicalize(),
                    record,
                ));
            }
        }
        self.intervals.retain(|_, records| !records.is_empty());
        for (leftover, record) in leftovers {
            self.intervals.entry(leftover).or_default().push(record);
        }
        Ok(())
    }

    /// The entity as it was at `instant`. `NotFound` outside the lifespan.
    pub fn entity_at(&self, instant: TimeInstant) -> Result<Entity> {
        if !self.lifespan.contains(&instant) {
            return Err(Error::NotFound(format!(
                "{instant} is outside the lifespan {} of {}",
                self.lifespan, self.entity_id
            )));
        }
        Ok(self.stage_at(instant, true))
    }

    /// The entity at `instant`.
    ///
    /// Where entries of one property meet, the one starting at the instant
    /// wins. An entry ending at the instant still applies when nothing else
    /// for its property carries on from there, unless `keep_ending` is off
    /// and the instant is not the lifespan end; then the stage starting at
    /// the instant is produced instead.
    fn stage_at(&self, instant: TimeInstant, keep_ending: bool) -> Entity {
        type Chosen<'a> = BTreeMap<&'a PropertyId, (&'a TimeSpan, &'a PropertyValue)>;
        let mut carrying: Chosen<'_> = BTreeMap::new();
        let mut ending: Chosen<'_> = BTreeMap::new();
        for (span, records) in &self.intervals {
            if !span.contains(&instant) {
                continue;
            }
            let ends_here = span.end().can_unify(&instant) && !span.begin().can_unify(&instant);
            let chosen = if ends_here { &mut ending } else { &mut carrying };
            for record in records {
                match chosen.get(&record.property) {
                    Some((current, _)) if current.begin() >= span.begin() => {}
                    _ => {
                        chosen.insert(&record.property, (span, &record.value));
                    }
                }
            }
        }

        let keep_ending = keep_ending || instant.can_unify(&self.lifespan.end());
        ending.retain(|property, _| keep_ending && !carrying.contains_key(property));
        let opening = carrying
            .values()
            .any(|(span, _)| span.begin().can_unify(&instant));
        let stage = if !ending.is_empty() && !opening {
            self.closing_span(instant)
        } else {
            self.stage_span(instant)
        };

        let mut entity = Entity::new(self.descriptor.clone(), self.entity_id.clone(), stage);
        for (property, value) in &self.universal {
            entity.put(property.clone(), value.clone());
        }
        for (property, (_, value)) in carrying.into_iter().chain(ending) {
            entity.put(property.clone(), value.clone());
        }
        entity
    }

    /// The stage that ends at `instant`.
    fn closing_span(&self, instant: TimeInstant) -> TimeSpan {
        let boundaries = self.boundaries();
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
            .unwrap_or(self.lifespan.begin());
        TimeSpan::between(begin, end).unwrap_or(self.lifespan)
    }

    fn stage_span(&self, instant: TimeInstant) -> TimeSpan {
        let boundaries = self.boundaries();
        let end = self.lifespan.end();
        let begin = boundaries
            .iter()
            .rev()
            .find(|b| **b != end && b.at_or_before(&instant))
            .copied()
            .unwrap_or(self.lifespan.begin());
        let next = boundaries
            .iter()
            .find(|b| b.strictly_after(&instant))
            .copied()
            .unwrap_or(end);
        TimeSpan::between(begin, next).unwrap_or(self.lifespan)
    }

    /// Every distinct begin and end instant, lifespan bounds included
    fn boundaries(&self) -> Vec<TimeInstant> {
        let mut boundaries = BTreeSet::from([self.lifespan.begin(), self.lifespan.end()]);
        for span in self.intervals.keys() {
            boundaries.insert(span.begin());
            boundaries.insert(span.end());
        }
        boundaries.into_iter().collect()
    }

    /// Lazily iterate the entity's life stages: the stage starting at each
    /// distinct boundary.
    pub fn stages(&self) -> Stages<'_> {
        let end = self.lifespan.end();
        let boundaries: Vec<TimeInstant> = self
            .boundaries()
            .into_iter()
            .filter(|b| *b != end)
            .collect();
        Stages {
            timeline: self,
            boundaries: boundaries.into_iter(),
            previous: None,
        }
    }

    /// Merge adjacent entries that carry the same value, promote a property
    /// whose entries cover the whole lifespan with one value, and drop
    /// entries that repeat the universal value.
    pub fn compact(&mut self) {
        let mut by_property: BTreeMap<PropertyId, Vec<(TimeSpan, PropertyValue)>> =
            BTreeMap::new();
        for (span, records) in std::mem::take(&mut self.intervals) {
            for record in records {
                by_property
                    .entry(record.property)
                    .or_default()
                    .push((span, record.value));
            }
        }

        for (property, entries) in by_property {
            let mut runs: Vec<(TimeSpan, PropertyValue)> = Vec::new();
            for (span, value) in entries {
                let merged = match runs.last() {
                    Some((last, last_value))
                        if *last_value == value && last.end().can_unify(&span.begin()) =>
                    {
                        TimeSpan::between(last.begin(), span.end())
                            .ok()
                            .map(|merged| merged.canonicalize())
                    }
                    _ => None,
                };
                match (merged, runs.last_mut()) {
                    (Some(merged), Some(last)) => last.0 = merged,
                    _ => runs.push((span, value)),
                }
            }

            if runs.len() == 1 && runs[0].0.can_unify(&self.lifespan) {
                if let Some((_, value)) = runs.pop() {
                    self.universal.insert(property, value);
                }
                continue;
            }
            let universal = self.universal.get(&property);
            for (span, value) in runs {
                if universal == Some(&value) {
                    continue;
                }
                self.intervals.entry(span).or_default().push(PropertyRecord {
                    property: property.clone(),
                    value,
                });
            }
        }
    }
}

/// Forward-only iterator over a timeline's life stages
pub struct Stages<'a> {
    timeline: &'a Timeline,
    boundaries: std::vec::IntoIter<TimeInstant>,
    previous: Option<TimeInstant>,
}

impl Iterator for Stages<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        loop {
            let boundary = self.boundaries.next()?;
            if let Some(previous) = self.previous {
                if previous.can_unify(&boundary) {
                    continue;
                }
            }
            self.previous = Some(boundary);
            return Some(self.timeline.stage_at(boundary, false));
        }
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = Entity;
    type IntoIter = Stages<'a>;

    fn into_iter(self) -> Stages<'a> {
        self.stages()
    }
}
