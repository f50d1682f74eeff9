//! Schema registry: entity types and the shapes of their properties

use crate::core::fact::{PropertyId, ResourceId};
use crate::core::temporal::TimeSpan;
use crate::entity::model::Entity;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Entity types are resources too.
pub type TypeId = ResourceId;

/// How a property's value is stored in the graph and what it holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// One literal object
    Literal,
    /// Any number of literal objects
    LiteralSet,
    /// One resource object, an entity of type `target`
    Reference { target: TypeId },
    /// A bag node whose members are entities of type `target`. A plain
    /// resource object counts as a single member.
    ReferenceSet { target: TypeId },
    /// One node whose literal facts form a value
    Embedded,
    EmbeddedSet,
    /// Entities of type `source` pointing at this one through `predicate`
    PassiveLink { source: TypeId, predicate: PropertyId },
    /// Entities of type `source` holding this one in the bag they point at
    /// through `predicate`
    PassiveBag { source: TypeId, predicate: PropertyId },
}

impl PropertyKind {
    /// Passive properties are derived by reverse lookup, never stored.
    pub fn is_passive(&self) -> bool {
        matches!(self, Self::PassiveLink { .. } | Self::PassiveBag { .. })
    }

    pub fn is_collection(&self) -> bool {
        !matches!(self, Self::Literal | Self::Reference { .. } | Self::Embedded)
    }

    /// The type a stored reference points at
    pub fn reference_target(&self) -> Option<&TypeId> {
        match self {
            Self::Reference { target } | Self::ReferenceSet { target } => Some(target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub id: PropertyId,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

/// Declared properties of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub id: TypeId,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl TypeDescriptor {
    pub fn new(id: impl Into<TypeId>) -> Self {
        Self {
            id: id.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, id: impl Into<PropertyId>, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDescriptor {
            id: id.into(),
            kind,
        });
        self
    }

    pub fn property(&self, id: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.id.as_str() == id)
    }

    /// Properties loaded straight from an entity's own facts
    pub fn direct_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| !p.kind.is_passive())
    }

    pub fn passive_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.kind.is_passive())
    }
}

#[derive(Deserialize)]
struct SchemaFile {
    types: Vec<TypeDescriptor>,
}

/// Every entity type the engine can materialize.
///
/// Constructed once and shared read-only (usually as an `Arc`) by pools
/// and timelines.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<TypeId, Arc<TypeDescriptor>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and validate a complete set of types
    pub fn build(types: impl IntoIterator<Item = TypeDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in types {
            registry.register(descriptor)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Parse a `{"types": [...]}` document and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: SchemaFile = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid schema: {e}")))?;
        Self::build(file.types)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<()> {
        if self.types.contains_key(&descriptor.id) {
            return Err(Error::Configuration(format!(
                "type {} registered twice",
                descriptor.id
            )));
        }
        self.types.insert(descriptor.id.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Arc<TypeDescriptor>> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("type {id} is not registered")))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.types.contains_key(id)
    }

    /// Registered types in identifier order
    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// An empty entity of a registered type
    pub fn instantiate(
        &self,
        type_id: &str,
        id: impl Into<ResourceId>,
        span: TimeSpan,
    ) -> Result<Entity> {
        Ok(Entity::new(self.require(type_id)?.clone(), id, span))
    }

    /// Check that every type is internally consistent and that every
    /// cross-type link names a registered type with a matching declaration.
    pub fn validate(&self) -> Result<()> {
        for descriptor in self.types.values() {
            let mut seen = HashSet::new();
            for property in &descriptor.properties {
                if !seen.insert(&property.id) {
                    return Err(Error::Configuration(format!(
                        "type {} declares property {} twice",
                        descriptor.id, property.id
                    )));
                }
                match &property.kind {
                    PropertyKind::Reference { target } | PropertyKind::ReferenceSet { target } => {
                        self.require_configured(target, descriptor, property)?;
                    }
                    PropertyKind::PassiveLink { source, predicate } => {
                        self.check_passive(descriptor, property, source, predicate, false)?;
                    }
                    PropertyKind::PassiveBag { source, predicate } => {
                        self.check_passive(descriptor, property, source, predicate, true)?;
                    }
                    PropertyKind::Literal
                    | PropertyKind::LiteralSet
                    | PropertyKind::Embedded
                    | PropertyKind::EmbeddedSet => {}
                }
            }
        }
        Ok(())
    }

    fn require_configured(
        &self,
        target: &TypeId,
        owner: &TypeDescriptor,
        property: &PropertyDescriptor,
    ) -> Result<&Arc<TypeDescriptor>> {
        self.get(target.as_str()).ok_or_else(|| {
            Error::Configuration(format!(
                "{}.{} names unregistered type {target}",
                owner.id, property.id
            ))
        })
    }

    /// The source type must declare `predicate` as a reference of the
    /// matching shape to the owning type.
    fn check_passive(
        &self,
        owner: &TypeDescriptor,
        property: &PropertyDescriptor,
        source: &TypeId,
        predicate: &PropertyId,
        bag: bool,
    ) -> Result<()> {
        let source_type = self.require_configured(source, owner, property)?;
        let declared = source_type.property(predicate.as_str()).map(|p| &p.kind);
        let matches = match declared {
            Some(PropertyKind::Reference { target }) => !bag && *target == owner.id,
            Some(PropertyKind::ReferenceSet { target }) => bag && *target == owner.id,
            _ => false,
        };
        if !matches {
            let expected = if bag { "reference_set" } else { "reference" };
            return Err(Error::Configuration(format!(
                "{}.{}: {source}.{predicate} must be a {expected} to {}",
                owner.id, property.id, owner.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "types": [
            {
                "id": "ex:Person",
                "properties": [
                    {"id": "ex:name", "kind": "literal"},
                    {"id": "ex:employer", "kind": "reference", "target": "ex:Company"}
                ]
            },
            {
                "id": "ex:Company",
                "properties": [
                    {"id": "ex:name", "kind": "literal"},
                    {"id": "ex:staff", "kind": "passive_link", "source": "ex:Person", "predicate": "ex:employer"}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_schema() {
        let registry = SchemaRegistry::from_json_str(SCHEMA).unwrap();
        assert_eq!(registry.len(), 2);
        let company = registry.require("ex:Company").unwrap();
        assert_eq!(company.passive_properties().count(), 1);
        assert_eq!(company.direct_properties().count(), 1);
        assert_eq!(
            registry.require("ex:Person").unwrap().property("ex:employer").unwrap().kind,
            PropertyKind::Reference {
                target: "ex:Company".into()
            }
        );
        assert!(registry.require("ex:Robot").unwrap_err().is_not_found());
    }

    #[test]
    fn test_duplicate_declarations() {
        let mut registry = SchemaRegistry::new();
        registry.register(TypeDescriptor::new("ex:T")).unwrap();
        assert!(matches!(
            registry.register(TypeDescriptor::new("ex:T")),
            Err(Error::Configuration(_))
        ));

        let err = SchemaRegistry::build([TypeDescriptor::new("ex:T")
            .with_property("ex:p", PropertyKind::Literal)
            .with_property("ex:p", PropertyKind::LiteralSet)])
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_dangling_target() {
        let err = SchemaRegistry::build([TypeDescriptor::new("ex:T").with_property(
            "ex:p",
            PropertyKind::Reference {
                target: "ex:Missing".into(),
            },
        )])
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_passive_shape_must_match() {
        let person = TypeDescriptor::new("ex:Person").with_property(
            "ex:employer",
            PropertyKind::Reference {
                target: "ex:Company".into(),
            },
        );
        let company = TypeDescriptor::new("ex:Company").with_property(
            "ex:staff",
            PropertyKind::PassiveBag {
                source: "ex:Person".into(),
                predicate: "ex:employer".into(),
            },
        );
        let err = SchemaRegistry::build([person, company]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_kind_json_shape() {
        let property = PropertyDescriptor {
            id: "ex:members".into(),
            kind: PropertyKind::ReferenceSet {
                target: "ex:Person".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&property).unwrap(),
            serde_json::json!({"id": "ex:members", "kind": "reference_set", "target": "ex:Person"})
        );
    }
}
