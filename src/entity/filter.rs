//! Filters applied to directly requested entities

use crate::core::fact::ResourceId;
use crate::entity::model::Entity;
use crate::entity::schema::TypeId;

/// Decides, before loading, whether a typed resource becomes an entity.
pub trait ResourceFilter: Send + Sync {
    fn accept(&self, id: &ResourceId, type_id: &TypeId) -> bool;
}

impl<F> ResourceFilter for F
where
    F: Fn(&ResourceId, &TypeId) -> bool + Send + Sync,
{
    fn accept(&self, id: &ResourceId, type_id: &TypeId) -> bool {
        self(id, type_id)
    }
}

/// Decides, after loading, whether a materialized entity is kept.
pub trait EntityFilter: Send + Sync {
    fn accept(&self, entity: &Entity) -> bool;
}

impl<F> EntityFilter for F
where
    F: Fn(&Entity) -> bool + Send + Sync,
{
    fn accept(&self, entity: &Entity) -> bool {
        self(entity)
    }
}
