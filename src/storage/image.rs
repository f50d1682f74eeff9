//! Store images: a serializable copy of a whole store

use crate::config::StoreConfig;
use crate::core::fact::Fact;
use crate::error::Result;
use crate::index::PartitionId;
use crate::storage::fact_set::{FactSet, MemoryFactSet};
use crate::storage::graph_store::TemporalGraphStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Everything needed to rebuild a store. The index is not part of the
/// image; it is rebuilt from the description facts on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreImage {
    #[serde(default)]
    pub config: StoreConfig,
    #[serde(default)]
    pub universal: Vec<Fact>,
    #[serde(default)]
    pub description: Vec<Fact>,
    #[serde(default)]
    pub partitions: BTreeMap<PartitionId, Vec<Fact>>,
}

impl StoreImage {
    /// Write the image as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "Saved store image");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn fact_count(&self) -> usize {
        self.universal.len() + self.partitions.values().map(Vec::len).sum::<usize>()
    }
}

impl TemporalGraphStore {
    pub fn to_image(&self) -> StoreImage {
        StoreImage {
            config: self.config().clone(),
            universal: self.universal_facts().iter().cloned().collect(),
            description: self.description().iter().cloned().collect(),
            partitions: self
                .partitions()
                .iter()
                .map(|(id, facts)| (id.clone(), facts.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Rebuild a store from an image, index included.
    pub fn from_image(image: StoreImage) -> Result<Self> {
        let partitions = image
            .partitions
            .into_iter()
            .map(|(id, facts)| (id, MemoryFactSet::from(facts)))
            .collect();
        let store = Self::from_parts(
            image.config,
            image.universal.into(),
            partitions,
            image.description.into(),
        )?;
        debug!(
            partitions = store.index().len(),
            universal = store.universal_facts().len(),
            "Loaded store from image"
        );
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_image().save(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_image(StoreImage::load(path)?)
    }
}
