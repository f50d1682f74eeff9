//! JSON datasets: a list of facts with optional validity spans

use crate::config::StoreConfig;
use crate::core::fact::Fact;
use crate::core::temporal::TimeSpan;
use crate::error::Result;
use crate::storage::TemporalGraphStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFact {
    /// Missing or null means valid at all times
    #[serde(default)]
    pub span: Option<TimeSpan>,
    #[serde(flatten)]
    pub fact: Fact,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub config: Option<StoreConfig>,
    #[serde(default)]
    pub facts: Vec<DatasetFact>,
}

impl Dataset {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Build a store holding every fact of the dataset
    pub fn into_store(self) -> Result<TemporalGraphStore> {
        let mut store = TemporalGraphStore::new(self.config.unwrap_or_default())?;
        let count = self.facts.len();
        for DatasetFact { span, fact } in self.facts {
            store.add(&span.unwrap_or_else(TimeSpan::universal), fact)?;
        }
        debug!(facts = count, partitions = store.index().len(), "Loaded dataset");
        Ok(store)
    }
}
