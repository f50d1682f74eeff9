//! Time dimension index: partition identifiers to the span they cover

use crate::core::fact::{Fact, Literal, ResourceId};
use crate::core::temporal::{SpanDuration, TimeInstant, TimeSpan};
use crate::error::{Error, Result};
use crate::storage::fact_set::FactSet;
use crate::vocab;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Opaque name of a partition (a fact set valid during one span).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PartitionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&PartitionId> for ResourceId {
    fn from(id: &PartitionId) -> Self {
        ResourceId::new(id.as_str())
    }
}

/// Maps partition identifiers to their spans and answers the reverse
/// questions (which partitions hold an instant, which hold a whole span).
///
/// Lookups are linear scans. Partition counts stay small next to fact
/// counts; the `BTreeMap` keeps results in identifier order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeDimensionIndex {
    spans: BTreeMap<PartitionId, TimeSpan>,
}

fn corrupt(id: &ResourceId, detail: impl fmt::Display) -> Error {
    Error::Corruption(format!("partition description for {id}: {detail}"))
}

/// Integer value of one description field; absent is `None`, anything but
/// a single integer literal is corruption.
fn field<S: FactSet + ?Sized>(
    description: &S,
    id: &ResourceId,
    predicate: &str,
) -> Result<Option<i64>> {
    let values = description.objects(id, &ResourceId::new(predicate));
    match values.as_slice() {
        [] => Ok(None),
        [value] => value
            .as_literal()
            .and_then(Literal::as_integer)
            .map(Some)
            .ok_or_else(|| corrupt(id, format!("{predicate} is not an integer ({value})"))),
        _ => Err(corrupt(id, format!("{predicate} has {} values", values.len()))),
    }
}

fn narrow<T: TryFrom<i64>>(id: &ResourceId, predicate: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| corrupt(id, format!("{predicate} {value} out of range")))
}

fn read_span<S: FactSet + ?Sized>(description: &S, id: &ResourceId) -> Result<TimeSpan> {
    let year = field(description, id, vocab::START_YEAR)?
        .ok_or_else(|| corrupt(id, "missing start year"))?;
    let mut begin = TimeInstant::from_year(narrow(id, vocab::START_YEAR, year)?);
    if let Some(month) = field(description, id, vocab::START_MONTH)? {
        begin = begin
            .with_month(Some(narrow(id, vocab::START_MONTH, month)?))
            .map_err(|e| corrupt(id, e))?;
    }
    if let Some(day) = field(description, id, vocab::START_DAY)? {
        begin = begin
            .with_day(Some(narrow(id, vocab::START_DAY, day)?))
            .map_err(|e| corrupt(id, e))?;
    }

    let years = field(description, id, vocab::DURATION_YEARS)?;
    let months = field(description, id, vocab::DURATION_MONTHS)?;
    let days = field(description, id, vocab::DURATION_DAYS)?;
    if years.is_none() && months.is_none() && days.is_none() {
        return TimeSpan::open(begin).map_err(|e| corrupt(id, e));
    }
    let duration = SpanDuration::new(
        years.map(|v| narrow(id, vocab::DURATION_YEARS, v)).transpose()?,
        months.map(|v| narrow(id, vocab::DURATION_MONTHS, v)).transpose()?,
        days.map(|v| narrow(id, vocab::DURATION_DAYS, v)).transpose()?,
    )
    .map_err(|e| corrupt(id, e))?;
    TimeSpan::new(begin, Some(duration)).map_err(|e| corrupt(id, e))
}

impl TimeDimensionIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from a description fact set.
    ///
    /// Every subject typed as a partition, or carrying any description
    /// field, must describe a valid span. One bad entry fails the whole
    /// build.
    pub fn build<S: FactSet + ?Sized>(description: &S) -> Result<Self> {
        let fields = [
            vocab::START_YEAR,
            vocab::START_MONTH,
            vocab::START_DAY,
            vocab::DURATION_YEARS,
            vocab::DURATION_MONTHS,
            vocab::DURATION_DAYS,
        ];
        let mut subjects = BTreeSet::new();
        for fact in description.facts() {
            let typed = fact.predicate.as_str() == vocab::RDF_TYPE
                && fact
                    .object
                    .as_resource()
                    .is_some_and(|t| t.as_str() == vocab::PARTITION);
            if typed || fields.contains(&fact.predicate.as_str()) {
                subjects.insert(fact.subject.clone());
            }
        }

        let mut index = Self::new();
        for subject in subjects {
            let span = read_span(description, &subject)?;
            index.spans.insert(PartitionId::new(subject.as_str()), span);
        }
        debug!(partitions = index.len(), "Built time dimension index");
        Ok(index)
    }

    /// Description facts recording `span` for partition `id`.
    ///
    /// The span is stored in begin+duration form, so its begin must be a
    /// calendar point with a year.
    pub fn describe(id: &PartitionId, span: &TimeSpan) -> Result<Vec<Fact>> {
        let span = span.canonicalize();
        let begin = span.begin();
        let year = begin.year().ok_or_else(|| {
            Error::Validation(format!("span {span} has no start year and cannot be indexed"))
        })?;
        let subject = ResourceId::from(id);
        let mut facts = vec![
            Fact::link(subject.clone(), vocab::RDF_TYPE, vocab::PARTITION),
            Fact::literal(subject.clone(), vocab::START_YEAR, i64::from(year)),
        ];
        if let Some(month) = begin.month() {
            facts.push(Fact::literal(subject.clone(), vocab::START_MONTH, i64::from(month)));
        }
        if let Some(day) = begin.day() {
            facts.push(Fact::literal(subject.clone(), vocab::START_DAY, i64::from(day)));
        }

        match span.duration() {
            Some(duration) => {
                if let Some(years) = duration.years() {
                    facts.push(Fact::literal(subject.clone(), vocab::DURATION_YEARS, i64::from(years)));
                }
                if let Some(months) = duration.months() {
                    facts.push(Fact::literal(subject.clone(), vocab::DURATION_MONTHS, i64::from(months)));
                }
                if let Some(days) = duration.days() {
                    facts.push(Fact::literal(subject, vocab::DURATION_DAYS, i64::from(days)));
                }
            }
            None if span.is_open() => {}
            None => {
                return Err(Error::Validation(format!(
                    "span {span} has no begin+duration form and cannot be indexed"
                )))
            }
        }
        Ok(facts)
    }

    /// Record the span of a partition, replacing any previous entry.
    pub fn register(&mut self, id: PartitionId, span: TimeSpan) -> Option<TimeSpan> {
        self.spans.insert(id, span)
    }

    pub fn unregister(&mut self, id: &PartitionId) -> Option<TimeSpan> {
        self.spans.remove(id)
    }

    pub fn span_of(&self, id: &PartitionId) -> Option<&TimeSpan> {
        self.spans.get(id)
    }

    /// Partition registered for exactly this interval, if any.
    pub fn partition_for(&self, span: &TimeSpan) -> Option<&PartitionId> {
        self.spans
            .iter()
            .find(|(_, candidate)| *candidate == span)
            .map(|(id, _)| id)
    }

    /// Partitions whose span contains `instant`.
    pub fn partitions_at(&self, instant: &TimeInstant) -> Vec<PartitionId> {
        self.spans
            .iter()
            .filter(|(_, span)| span.contains(instant))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Partitions whose span contains the whole of `span`.
    pub fn partitions_covering(&self, span: &TimeSpan) -> Vec<PartitionId> {
        self.spans
            .iter()
            .filter(|(_, candidate)| candidate.contains_span(span))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every distinct begin and end instant, sorted.
    pub fn boundaries(&self) -> Vec<TimeInstant> {
        let mut boundaries = BTreeSet::new();
        for span in self.spans.values() {
            boundaries.insert(span.begin());
            boundaries.insert(span.end());
        }
        boundaries.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PartitionId, &TimeSpan)> {
        self.spans.iter()
    }
}
