//! Materialized entities and their property values

use crate::core::fact::{Literal, PropertyId, ResourceId};
use crate::core::temporal::TimeSpan;
use crate::entity::schema::{PropertyKind, TypeDescriptor, TypeId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A structured value kept on its own node: predicate to literals.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddedValue {
    properties: BTreeMap<PropertyId, Vec<Literal>>,
}

impl EmbeddedValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, property: impl Into<PropertyId>, value: Literal) {
        self.properties.entry(property.into()).or_default().push(value);
    }

    pub fn get(&self, property: &str) -> &[Literal] {
        self.properties
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn first(&self, property: &str) -> Option<&Literal> {
        self.get(property).first()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyId, &Vec<Literal>)> {
        self.properties.iter()
    }
}

/// The value of one property; one variant per storage shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Literal(Literal),
    Literals(BTreeSet<Literal>),
    Reference(ResourceId),
    References(BTreeSet<ResourceId>),
    Embedded(EmbeddedValue),
    EmbeddedSet(Vec<EmbeddedValue>),
    /// Entities found by reverse lookup
    Passive(BTreeSet<ResourceId>),
}

impl PropertyValue {
    /// Whether this value can be held by a property of `kind`.
    pub fn fits(&self, kind: &PropertyKind) -> bool {
        match (self, kind) {
            (Self::Literal(_), PropertyKind::Literal)
            | (Self::Literals(_), PropertyKind::LiteralSet)
            | (Self::Reference(_), PropertyKind::Reference { .. })
            | (Self::References(_), PropertyKind::ReferenceSet { .. })
            | (Self::Embedded(_), PropertyKind::Embedded)
            | (Self::EmbeddedSet(_), PropertyKind::EmbeddedSet)
            | (Self::Passive(_), PropertyKind::PassiveLink { .. })
            | (Self::Passive(_), PropertyKind::PassiveBag { .. }) => true,
            _ => false,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ResourceId> {
        match self {
            Self::Reference(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = T>) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, "]")
        }
        match self {
            Self::Literal(literal) => write!(f, "{literal}"),
            Self::Literals(literals) => list(f, literals.iter()),
            Self::Reference(id) => write!(f, "<{id}>"),
            Self::References(ids) | Self::Passive(ids) => list(f, ids.iter().map(|id| format!("<{id}>"))),
            Self::Embedded(value) => {
                write!(f, "{}", serde_json::to_string(value).map_err(|_| fmt::Error)?)
            }
            Self::EmbeddedSet(values) => {
                write!(f, "{}", serde_json::to_string(values).map_err(|_| fmt::Error)?)
            }
        }
    }
}

/// A typed record materialized from facts, valid during `span`.
///
/// Forward references whose target has not been materialized yet are kept
/// in a separate unresolved list; the property stays unset until the pool
/// resolves them. Passive properties are filled on demand.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    id: ResourceId,
    #[serde(rename = "type")]
    type_id: TypeId,
    span: TimeSpan,
    properties: BTreeMap<PropertyId, PropertyValue>,
    #[serde(skip)]
    unresolved: BTreeSet<(PropertyId, ResourceId)>,
    #[serde(skip)]
    passive_loaded: bool,
    #[serde(skip)]
    descriptor: Arc<TypeDescriptor>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.type_id == other.type_id
            && self.span == other.span
            && self.properties == other.properties
            && self.unresolved == other.unresolved
    }
}

impl Eq for Entity {}

impl Entity {
    /// An empty entity of the described type
    pub fn new(descriptor: Arc<TypeDescriptor>, id: impl Into<ResourceId>, span: TimeSpan) -> Self {
        Self {
            id: id.into(),
            type_id: descriptor.id.clone(),
            span,
            properties: BTreeMap::new(),
            unresolved: BTreeSet::new(),
            passive_loaded: false,
            descriptor,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn type_id(&self) -> &TypeId {
        &self.type_id
    }

    pub fn span(&self) -> &TimeSpan {
        &self.span
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    fn kind_of(&self, property: &str) -> Result<&PropertyKind> {
        self.descriptor
            .property(property)
            .map(|p| &p.kind)
            .ok_or_else(|| {
                Error::NotFound(format!("type {} has no property {property}", self.type_id))
            })
    }

    /// Value of a declared property; `NotFound` for undeclared ones.
    pub fn get(&self, property: &str) -> Result<Option<&PropertyValue>> {
        self.kind_of(property)?;
        Ok(self.properties.get(property))
    }

    /// Set a declared property to a value of the matching shape.
    pub fn set(&mut self, property: impl Into<PropertyId>, value: PropertyValue) -> Result<()> {
        let property = property.into();
        if !value.fits(self.kind_of(property.as_str())?) {
            return Err(Error::Validation(format!(
                "value {value} does not fit property {property} of {}",
                self.type_id
            )));
        }
        self.properties.insert(property, value);
        Ok(())
    }

    pub fn clear(&mut self, property: &str) -> Result<Option<PropertyValue>> {
        self.kind_of(property)?;
        Ok(self.properties.remove(property))
    }

    /// Value without the declaration check
    pub fn value(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&PropertyId, &PropertyValue)> {
        self.properties.iter()
    }

    pub fn literal(&self, property: &str) -> Option<&Literal> {
        self.value(property).and_then(PropertyValue::as_literal)
    }

    pub fn text(&self, property: &str) -> Option<&str> {
        self.literal(property).and_then(Literal::as_text)
    }

    pub fn integer(&self, property: &str) -> Option<i64> {
        self.literal(property).and_then(Literal::as_integer)
    }

    pub fn reference(&self, property: &str) -> Option<&ResourceId> {
        self.value(property).and_then(PropertyValue::as_reference)
    }

    /// Members of a reference set or passive property, in identifier order.
    pub fn references(&self, property: &str) -> Vec<&ResourceId> {
        match self.value(property) {
            Some(PropertyValue::References(ids)) | Some(PropertyValue::Passive(ids)) => {
                ids.iter().collect()
            }
            Some(PropertyValue::Reference(id)) => vec![id],
            _ => Vec::new(),
        }
    }

    /// `true` once every forward reference points at a materialized entity.
    pub fn is_direct_references_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// `(property, target)` pairs still waiting for their target
    pub fn unresolved_references(&self) -> impl Iterator<Item = &(PropertyId, ResourceId)> {
        self.unresolved.iter()
    }

    pub fn is_passive_loaded(&self) -> bool {
        self.passive_loaded
    }

    /// Store a value already checked against the descriptor.
    pub(crate) fn put(&mut self, property: PropertyId, value: PropertyValue) {
        self.properties.insert(property, value);
    }

    pub(crate) fn mark_unresolved(&mut self, property: PropertyId, target: ResourceId) {
        self.unresolved.insert((property, target));
    }

    /// Fill in a forward reference once its target exists. Returns `false`
    /// if the reference was not pending.
    pub(crate) fn resolve_reference(&mut self, property: &PropertyId, target: &ResourceId) -> bool {
        if !self.unresolved.remove(&(property.clone(), target.clone())) {
            return false;
        }
        let collection = matches!(
            self.descriptor.property(property.as_str()).map(|p| &p.kind),
            Some(PropertyKind::ReferenceSet { .. })
        );
        if collection {
            match self.properties.get_mut(property) {
                Some(PropertyValue::References(ids)) => {
                    ids.insert(target.clone());
                }
                _ => {
                    self.properties.insert(
                        property.clone(),
                        PropertyValue::References(BTreeSet::from([target.clone()])),
                    );
                }
            }
        } else {
            self.properties
                .insert(property.clone(), PropertyValue::Reference(target.clone()));
        }
        true
    }

    pub(crate) fn add_passive(&mut self, property: &PropertyId, source: ResourceId) {
        match self.properties.get_mut(property) {
            Some(PropertyValue::Passive(ids)) => {
                ids.insert(source);
            }
            _ => {
                self.properties
                    .insert(property.clone(), PropertyValue::Passive(BTreeSet::from([source])));
            }
        }
    }

    pub(crate) fn set_passive_loaded(&mut self) {
        self.passive_loaded = true;
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> a <{}> during {}", self.id, self.type_id, self.span)?;
        for (property, value) in &self.properties {
            write!(f, "\n  {property} = {value}")?;
        }
        Ok(())
    }
}
