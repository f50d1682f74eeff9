//! Fact sets: the storage unit behind every partition

use crate::core::fact::{Fact, FactPattern, Node, PropertyId, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Trait for fact set implementations
pub trait FactSet: Send + Sync {
    /// Find all facts matching a pattern, in fact order
    fn find(&self, pattern: &FactPattern) -> Vec<Fact>;

    /// Add a fact; returns `false` if it was already present
    fn insert(&mut self, fact: Fact) -> bool;

    /// Remove a fact; returns `false` if it was absent
    fn remove(&mut self, fact: &Fact) -> bool;

    fn contains(&self, fact: &Fact) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every fact, in fact order
    fn facts(&self) -> Box<dyn Iterator<Item = &Fact> + '_>;

    /// Objects of `(subject, predicate, ?)`
    fn objects(&self, subject: &ResourceId, predicate: &PropertyId) -> Vec<Node> {
        self.find(
            &FactPattern::any()
                .subject(subject)
                .predicate(predicate),
        )
        .into_iter()
        .map(|fact| fact.object)
        .collect()
    }

    /// Subjects of `(?, predicate, object)`
    fn subjects(&self, predicate: &PropertyId, object: &Node) -> Vec<ResourceId> {
        self.find(
            &FactPattern::any()
                .predicate(predicate)
                .object(object.clone()),
        )
        .into_iter()
        .map(|fact| fact.subject)
        .collect()
    }
}

/// In-memory fact set ordered by subject, with a secondary index by object
/// for reverse lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Fact>", into = "Vec<Fact>")]
pub struct MemoryFactSet {
    facts: BTreeSet<Fact>,
    by_object: HashMap<Node, BTreeSet<Fact>>,
}

impl MemoryFactSet {
    /// Create a new, empty fact set
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    /// Add every fact of `other`
    pub fn extend_from(&mut self, other: &MemoryFactSet) {
        for fact in other.iter() {
            self.insert(fact.clone());
        }
    }
}

impl FactSet for MemoryFactSet {
    fn find(&self, pattern: &FactPattern) -> Vec<Fact> {
        if let Some(subject) = &pattern.subject {
            return self
                .facts
                .range(Fact::lower_bound(subject)..)
                .take_while(|fact| fact.subject == *subject)
                .filter(|fact| pattern.matches(fact))
                .cloned()
                .collect();
        }
        if let Some(object) = &pattern.object {
            return self
                .by_object
                .get(object)
                .map(|facts| {
                    facts
                        .iter()
                        .filter(|fact| pattern.matches(fact))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
        }
        self.facts
            .iter()
            .filter(|fact| pattern.matches(fact))
            .cloned()
            .collect()
    }

    fn insert(&mut self, fact: Fact) -> bool {
        if self.facts.contains(&fact) {
            return false;
        }
        self.by_object
            .entry(fact.object.clone())
            .or_default()
            .insert(fact.clone());
        self.facts.insert(fact)
    }

    fn remove(&mut self, fact: &Fact) -> bool {
        if !self.facts.remove(fact) {
            return false;
        }
        if let Some(facts) = self.by_object.get_mut(&fact.object) {
            facts.remove(fact);
            if facts.is_empty() {
                self.by_object.remove(&fact.object);
            }
        }
        true
    }

    fn contains(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    fn len(&self) -> usize {
        self.facts.len()
    }

    fn facts(&self) -> Box<dyn Iterator<Item = &Fact> + '_> {
        Box::new(self.facts.iter())
    }
}

impl FromIterator<Fact> for MemoryFactSet {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        let mut set = Self::new();
        for fact in iter {
            set.insert(fact);
        }
        set
    }
}

impl Extend<Fact> for MemoryFactSet {
    fn extend<I: IntoIterator<Item = Fact>>(&mut self, iter: I) {
        for fact in iter {
            self.insert(fact);
        }
    }
}

impl From<Vec<Fact>> for MemoryFactSet {
    fn from(facts: Vec<Fact>) -> Self {
        facts.into_iter().collect()
    }
}

impl From<MemoryFactSet> for Vec<Fact> {
    fn from(set: MemoryFactSet) -> Self {
        set.facts.into_iter().collect()
    }
}
