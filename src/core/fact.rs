//! Facts: subject-predicate-object triples over opaque identifiers

use crate::core::temporal::TimeInstant;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opaque identifier of a graph resource (entity, type, property, bag node).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

/// Properties are resources too.
pub type PropertyId = ResourceId;

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&ResourceId> for ResourceId {
    fn from(id: &ResourceId) -> Self {
        id.clone()
    }
}

/// A literal value in object position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Instant(TimeInstant),
}

impl Literal {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Literal::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integers, and text that parses as one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Literal::Integer(n) => Some(*n),
            Literal::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Literal::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_instant(&self) -> Option<TimeInstant> {
        match self {
            Literal::Instant(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Text(s.to_string())
    }
}
impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Text(s)
    }
}
impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Integer(n)
    }
}
impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Integer(i64::from(n))
    }
}
impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}
impl From<TimeInstant> for Literal {
    fn from(i: TimeInstant) -> Self {
        Literal::Instant(i)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => write!(f, "{s:?}"),
            Literal::Integer(n) => write!(f, "{n}"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Instant(i) => write!(f, "{i}"),
        }
    }
}

/// The object of a fact: another resource or a literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Resource(ResourceId),
    Literal(Literal),
}

impl Node {
    pub fn resource(id: impl Into<ResourceId>) -> Self {
        Node::Resource(id.into())
    }

    pub fn as_resource(&self) -> Option<&ResourceId> {
        match self {
            Node::Resource(id) => Some(id),
            Node::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Node::Literal(lit) => Some(lit),
            Node::Resource(_) => None,
        }
    }
}

impl From<ResourceId> for Node {
    fn from(id: ResourceId) -> Self {
        Node::Resource(id)
    }
}

impl From<Literal> for Node {
    fn from(lit: Literal) -> Self {
        Node::Literal(lit)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Resource(id) => write!(f, "<{id}>"),
            Node::Literal(lit) => write!(f, "{lit}"),
        }
    }
}

/// A single subject-predicate-object triple. Validity in time is a property
/// of the partition holding the fact, not of the fact itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub subject: ResourceId,
    pub predicate: PropertyId,
    pub object: Node,
}

impl Fact {
    pub fn new(
        subject: impl Into<ResourceId>,
        predicate: impl Into<PropertyId>,
        object: impl Into<Node>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Fact whose object is a literal
    pub fn literal(
        subject: impl Into<ResourceId>,
        predicate: impl Into<PropertyId>,
        value: impl Into<Literal>,
    ) -> Self {
        Self::new(subject, predicate, Node::Literal(value.into()))
    }

    /// Fact whose object is another resource
    pub fn link(
        subject: impl Into<ResourceId>,
        predicate: impl Into<PropertyId>,
        target: impl Into<ResourceId>,
    ) -> Self {
        Self::new(subject, predicate, Node::Resource(target.into()))
    }

    /// Smallest fact about `subject` in fact order; used as a range bound.
    pub(crate) fn lower_bound(subject: &ResourceId) -> Self {
        Self {
            subject: subject.clone(),
            predicate: ResourceId::new(""),
            object: Node::Resource(ResourceId::new("")),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> {}", self.subject, self.predicate, self.object)
    }
}

/// Pattern over facts; unset slots match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactPattern {
    pub subject: Option<ResourceId>,
    pub predicate: Option<PropertyId>,
    pub object: Option<Node>,
}

impl FactPattern {
    /// Matches every fact
    pub fn any() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: impl Into<ResourceId>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn predicate(mut self, predicate: impl Into<PropertyId>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn object(mut self, object: impl Into<Node>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn matches(&self, fact: &Fact) -> bool {
        self.subject.as_ref().map_or(true, |s| *s == fact.subject)
            && self.predicate.as_ref().map_or(true, |p| *p == fact.predicate)
            && self.object.as_ref().map_or(true, |o| *o == fact.object)
    }
}
