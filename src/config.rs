//! Store configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Naming of the reserved and generated partitions of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Identifier of the partition holding facts valid at all times
    pub universal_partition: String,
    /// Prefix of generated partition identifiers; a v4 UUID follows it
    pub partition_prefix: String,
    /// Name of the fact set holding partition descriptions
    pub description_graph: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            universal_partition: "urn:partition:universal".to_string(),
            partition_prefix: "urn:partition:".to_string(),
            description_graph: "urn:partition:description".to_string(),
        }
    }
}

impl StoreConfig {
    /// Parse and validate a JSON config. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid store config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Reject names that would collide with generated partition identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.partition_prefix.is_empty() {
            return Err(Error::Configuration(
                "partition_prefix must not be empty".to_string(),
            ));
        }
        if self.universal_partition.is_empty() {
            return Err(Error::Configuration(
                "universal_partition must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("universal_partition", &self.universal_partition),
            ("description_graph", &self.description_graph),
        ] {
            if is_generated_name(&self.partition_prefix, value) {
                return Err(Error::Configuration(format!(
                    "{name} {value:?} collides with generated partition ids (prefix {:?})",
                    self.partition_prefix
                )));
            }
        }
        Ok(())
    }
}

/// Whether `name` has the shape `prefix` + UUID.
fn is_generated_name(prefix: &str, name: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|suffix| uuid::Uuid::parse_str(suffix).is_ok())
}
